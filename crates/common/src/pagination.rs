//! Page requests and paged results for list operations.

use serde::{Deserialize, Serialize};

/// Bounds applied to every page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLimits {
    /// Page size used when the caller asks for none (or zero).
    pub default_page_size: u32,
    /// Largest page size a caller may ask for.
    pub max_page_size: u32,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_page_size: 10,
            max_page_size: 100,
        }
    }
}

/// A caller's page request, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PageRequest {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: Some(page),
            page_size: Some(page_size),
        }
    }

    /// Returns the request with the page defaulted to 1 and the size clamped
    /// into `1..=limits.max_page_size`.
    pub fn normalize(self, limits: PageLimits) -> PageRequest {
        let page = self.page.unwrap_or(1).max(1);
        let size = match self.page_size {
            None | Some(0) => limits.default_page_size,
            Some(size) => size,
        }
        .clamp(1, limits.max_page_size.max(1));

        PageRequest {
            page: Some(page),
            page_size: Some(size),
        }
    }

    /// 1-based page number (1 if unset).
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    /// Page size (the default limit if unset).
    pub fn page_size(&self) -> u32 {
        self.page_size
            .unwrap_or(PageLimits::default().default_page_size)
    }

    /// Number of rows to skip.
    pub fn offset(&self) -> u64 {
        u64::from(self.page() - 1) * u64::from(self.page_size())
    }

    /// Number of rows to fetch.
    pub fn limit(&self) -> u64 {
        u64::from(self.page_size())
    }
}

/// One page of results plus the total number of matching rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, request: PageRequest) -> Self {
        Self {
            items,
            total,
            page: request.page(),
            page_size: request.page_size(),
        }
    }

    /// Total number of pages for the current page size.
    pub fn total_pages(&self) -> u64 {
        if self.page_size == 0 {
            return 0;
        }
        self.total.div_ceil(u64::from(self.page_size))
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            page_size: self.page_size,
        }
    }
}
