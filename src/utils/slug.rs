/// Lowercase ASCII slug: alphanumerics kept, everything else collapsed into single dashes.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;

    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Men's T-Shirts"), "men-s-t-shirts");
        assert_eq!(slugify("  Summer   Sale 2024!! "), "summer-sale-2024");
        assert_eq!(slugify("---"), "");
    }
}
