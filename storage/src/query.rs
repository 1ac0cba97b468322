use serde::{Deserialize, Serialize};

use crate::error::{Result, StorageError};

pub const DEFAULT_PER_PAGE: u32 = 50;
pub const HISTORY_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 1_000;

/// Newest-first listing with an optional exact label filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionQuery {
    pub label: Option<String>,
    pub page: u32,
    pub per_page: u32,
}

impl Default for PredictionQuery {
    fn default() -> Self {
        Self::new()
    }
}

impl PredictionQuery {
    pub fn new() -> Self {
        Self {
            label: None,
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.page == 0 {
            return Err(StorageError::invalid_query("page starts at 1"));
        }
        if self.per_page == 0 || self.per_page > MAX_PER_PAGE {
            return Err(StorageError::invalid_query(format!(
                "per_page must be between 1 and {MAX_PER_PAGE}"
            )));
        }
        Ok(())
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub pages: u64,
}

impl Pagination {
    pub fn new(page: u32, per_page: u32, total: u64) -> Self {
        let per_page_u64 = u64::from(per_page.max(1));
        Self {
            page,
            per_page,
            total,
            pages: total.div_ceil(per_page_u64),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            pagination: self.pagination,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
