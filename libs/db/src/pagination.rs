//! Pagination types for list operations

use serde::{Deserialize, Serialize};

/// Hard cap on page size
pub const MAX_LIMIT: i64 = 100;

/// Default page size
pub const DEFAULT_LIMIT: i64 = 20;

/// Pagination parameters for list queries
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pagination {
    /// Maximum number of items to return (default 20, max 100)
    #[serde(default = "default_limit")]
    pub limit: i64,
    /// Number of items to skip (default 0)
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl Pagination {
    /// Build pagination from optional query values, clamping both bounds.
    #[must_use]
    pub fn from_query(limit: Option<i64>, offset: Option<i64>) -> Self {
        Self {
            limit: limit.unwrap_or(DEFAULT_LIMIT),
            offset: offset.unwrap_or(0).max(0),
        }
    }

    /// Limit clamped into `1..=100`.
    #[must_use]
    pub fn clamped_limit(&self) -> i64 {
        self.limit.clamp(1, MAX_LIMIT)
    }
}

/// A page of results from a list query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Total number of items matching the query
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

impl<T> Page<T> {
    /// Build a page from items and the pagination that produced them.
    #[must_use]
    pub fn new(items: Vec<T>, total: i64, pagination: &Pagination) -> Self {
        Self {
            items,
            total,
            limit: pagination.clamped_limit(),
            offset: pagination.offset,
        }
    }

    /// Whether more items exist past this page.
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.offset + (self.items.len() as i64) < self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamped_limit() {
        let p = Pagination {
            limit: 500,
            offset: 0,
        };
        assert_eq!(p.clamped_limit(), 100);

        let p = Pagination {
            limit: 0,
            offset: 0,
        };
        assert_eq!(p.clamped_limit(), 1);
    }

    #[test]
    fn test_from_query_clamps_negative_offset() {
        let p = Pagination::from_query(None, Some(-5));
        assert_eq!(p.offset, 0);
        assert_eq!(p.limit, DEFAULT_LIMIT);
    }

    #[test]
    fn test_page_has_more() {
        let pagination = Pagination::default();
        let page: Page<i32> = Page::new(vec![1, 2, 3], 50, &pagination);
        assert!(page.has_more());

        let page: Page<i32> = Page::new(vec![1, 2, 3], 3, &pagination);
        assert!(!page.has_more());
    }
}
