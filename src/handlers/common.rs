use serde::{Deserialize, Serialize};
use utoipa::IntoParams;

/// Pagination parameters for list operations
#[derive(Debug, Deserialize, Serialize, IntoParams)]
pub struct PaginationParams {
    /// Page number, starting at 1
    #[serde(default = "default_page")]
    pub page: u64,
    /// Items per page; defaults to the configured page size
    #[serde(default)]
    pub limit: Option<u64>,
}

fn default_page() -> u64 {
    1
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: default_page(),
            limit: None,
        }
    }
}

impl PaginationParams {
    /// Resolves the page size against the configured default and ceiling.
    pub fn resolve(&self, default_limit: u64, max_limit: u64) -> (u64, u64) {
        let limit = self
            .limit
            .unwrap_or(default_limit)
            .clamp(1, max_limit.max(1));
        (self.page.max(1), limit)
    }
}

pub fn total_pages(total: u64, limit: u64) -> u64 {
    if total == 0 || limit == 0 {
        0
    } else {
        total.div_ceil(limit)
    }
}
