use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 100;

/// `?page=&limit=` as sent by clients; both optional.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

impl PageQuery {
    pub fn page(&self) -> u64 {
        self.page.filter(|p| *p > 0).unwrap_or(1)
    }

    pub fn limit(&self) -> u64 {
        self.limit
            .filter(|l| *l > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .min(MAX_PAGE_SIZE)
    }

    /// Capped to what the driver can send as a signed 64-bit skip.
    pub fn skip(&self) -> u64 {
        (self.page() - 1)
            .saturating_mul(self.limit())
            .min(i64::MAX as u64)
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub success: bool,
    pub items: Vec<T>,
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, query: &PageQuery, total: u64) -> Self {
        let limit = query.limit();
        Page {
            success: true,
            items,
            page: query.page(),
            limit,
            total,
            total_pages: total.div_ceil(limit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let q = PageQuery::default();
        assert_eq!(q.page(), 1);
        assert_eq!(q.limit(), DEFAULT_PAGE_SIZE);
        assert_eq!(q.skip(), 0);
    }

    #[test]
    fn test_limit_is_capped_and_zero_ignored() {
        let q = PageQuery { page: Some(0), limit: Some(500) };
        assert_eq!(q.page(), 1);
        assert_eq!(q.limit(), MAX_PAGE_SIZE);

        let q = PageQuery { page: Some(3), limit: Some(0) };
        assert_eq!(q.limit(), DEFAULT_PAGE_SIZE);
        assert_eq!(q.skip(), 40);
    }

    #[test]
    fn test_skip_saturates_on_huge_page() {
        let q = PageQuery { page: Some(u64::MAX), limit: Some(100) };
        assert_eq!(q.skip(), i64::MAX as u64);
    }

    #[test]
    fn test_total_pages_rounds_up() {
        let q = PageQuery { page: Some(2), limit: Some(10) };
        let page = Page::new(vec![1, 2, 3], &q, 21);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.page, 2);

        let empty: Page<i32> = Page::new(vec![], &q, 0);
        assert_eq!(empty.total_pages, 0);
    }
}
