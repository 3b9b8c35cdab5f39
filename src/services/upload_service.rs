use crate::{
    config::AppConfig,
    utils::{AppError, AppResult},
};
use actix_multipart::Multipart;
use futures::TryStreamExt;
use std::path::{Path, PathBuf};

pub const PUBLIC_PREFIX: &str = "/uploads";

/// Accepted image types and the extension they are stored under.
const ALLOWED_TYPES: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/webp", "webp"),
    ("image/gif", "gif"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadFolder {
    Products,
    Avatars,
}

impl UploadFolder {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadFolder::Products => "products",
            UploadFolder::Avatars => "avatars",
        }
    }
}

pub fn extension_for(content_type: &str) -> Option<&'static str> {
    ALLOWED_TYPES
        .iter()
        .find(|(mime, _)| *mime == content_type)
        .map(|(_, ext)| *ext)
}

/// Detects the image type from magic bytes.
pub fn sniff_image(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => Some("image/png"),
        [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => Some("image/gif"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some("image/webp"),
        _ => None,
    }
}

/// Declared type must be allowed and agree with the file contents.
pub fn check_image(declared: Option<&str>, bytes: &[u8], max_bytes: usize) -> AppResult<&'static str> {
    if bytes.is_empty() {
        return Err(AppError::Validation("Uploaded file is empty".to_string()));
    }
    if bytes.len() > max_bytes {
        return Err(AppError::Validation(format!(
            "File exceeds the {} byte upload limit",
            max_bytes
        )));
    }
    let declared = declared
        .filter(|d| extension_for(d).is_some())
        .ok_or_else(|| {
            AppError::Validation("Only JPEG, PNG, WebP and GIF images are accepted".to_string())
        })?;
    match sniff_image(bytes) {
        Some(actual) if actual == declared => extension_for(actual)
            .ok_or_else(|| AppError::Internal("Unmapped image type".to_string())),
        _ => Err(AppError::Validation(
            "File contents do not match the declared image type".to_string(),
        )),
    }
}

fn multipart_error(e: actix_multipart::MultipartError) -> AppError {
    AppError::Validation(format!("Invalid multipart payload: {}", e))
}

/// Reads every file part of the payload, validates and stores it, and
/// returns the public urls. Non-file parts are ignored.
pub async fn save_images(
    mut payload: Multipart,
    config: &AppConfig,
    folder: UploadFolder,
    max_files: usize,
) -> AppResult<Vec<String>> {
    let dir = Path::new(&config.upload_dir).join(folder.as_str());
    tokio::fs::create_dir_all(&dir).await?;

    let mut pending: Vec<(Vec<u8>, &'static str)> = Vec::new();

    while let Some(mut field) = payload.try_next().await.map_err(multipart_error)? {
        let is_file = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .is_some();
        if !is_file {
            continue;
        }
        if pending.len() == max_files {
            return Err(AppError::Validation(format!(
                "At most {} file(s) can be uploaded at once",
                max_files
            )));
        }

        let declared = field.content_type().map(|m| m.essence_str().to_string());
        let mut bytes: Vec<u8> = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(multipart_error)? {
            if bytes.len() + chunk.len() > config.max_upload_bytes {
                return Err(AppError::Validation(format!(
                    "File exceeds the {} byte upload limit",
                    config.max_upload_bytes
                )));
            }
            bytes.extend_from_slice(&chunk);
        }

        let ext = check_image(declared.as_deref(), &bytes, config.max_upload_bytes)?;
        pending.push((bytes, ext));
    }

    if pending.is_empty() {
        return Err(AppError::Validation("No file was uploaded".to_string()));
    }

    let mut urls = Vec::with_capacity(pending.len());
    for (bytes, ext) in pending {
        let file_name = format!("{}.{}", uuid::Uuid::new_v4(), ext);
        tokio::fs::write(dir.join(&file_name), &bytes).await?;
        urls.push(format!("{}/{}/{}", PUBLIC_PREFIX, folder.as_str(), file_name));
    }

    log::info!("📤 Stored {} file(s) in {}", urls.len(), dir.display());
    Ok(urls)
}

/// Maps a public `/uploads/...` url back to a path under the upload directory.
pub fn local_path(upload_dir: &str, url: &str) -> Option<PathBuf> {
    let relative = url.strip_prefix(PUBLIC_PREFIX)?.strip_prefix('/')?;
    if relative.is_empty() || relative.split('/').any(|part| part.is_empty() || part == "..") {
        return None;
    }
    Some(Path::new(upload_dir).join(relative))
}

/// Best effort; external urls and missing files are ignored.
pub async fn delete_file(config: &AppConfig, url: &str) {
    let Some(path) = local_path(&config.upload_dir, url) else {
        return;
    };
    match tokio::fs::remove_file(&path).await {
        Ok(()) => log::info!("🗑️ Removed upload {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("⚠️ Could not remove {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];
    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10];

    #[test]
    fn test_sniff_image() {
        assert_eq!(sniff_image(PNG), Some("image/png"));
        assert_eq!(sniff_image(JPEG), Some("image/jpeg"));
        assert_eq!(sniff_image(b"GIF89a...."), Some("image/gif"));
        assert_eq!(sniff_image(b"RIFF\0\0\0\0WEBPVP8 "), Some("image/webp"));
        assert_eq!(sniff_image(b"%PDF-1.7"), None);
    }

    #[test]
    fn test_check_image() {
        assert_eq!(check_image(Some("image/png"), PNG, 1024).unwrap(), "png");
        assert_eq!(check_image(Some("image/jpeg"), JPEG, 1024).unwrap(), "jpg");

        // declared type disagrees with contents
        assert!(check_image(Some("image/jpeg"), PNG, 1024).is_err());
        assert!(check_image(Some("application/pdf"), b"%PDF-1.7", 1024).is_err());
        assert!(check_image(None, PNG, 1024).is_err());
        assert!(check_image(Some("image/png"), PNG, 4).is_err());
        assert!(check_image(Some("image/png"), &[], 1024).is_err());
    }

    #[test]
    fn test_local_path() {
        assert_eq!(
            local_path("./uploads", "/uploads/products/a.png"),
            Some(PathBuf::from("./uploads/products/a.png"))
        );
        assert_eq!(local_path("./uploads", "/uploads/../secret"), None);
        assert_eq!(local_path("./uploads", "/uploads/"), None);
        assert_eq!(local_path("./uploads", "https://cdn.example.com/a.png"), None);
        assert_eq!(local_path("./uploads", "/uploadsX/a.png"), None);
    }
}
