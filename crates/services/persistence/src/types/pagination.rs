//! Pagination types for list queries.

use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_PAGE_NUMBER, DEFAULT_PAGE_SIZE, DEFAULT_SORT_COLUMN, MAX_PAGE_SIZE};

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl From<SortOrder> for sea_orm::Order {
    fn from(order: SortOrder) -> Self {
        match order {
            SortOrder::Asc => sea_orm::Order::Asc,
            SortOrder::Desc => sea_orm::Order::Desc,
        }
    }
}

/// Pagination query parameters (reusable across all list queries).
///
/// Raw values are kept as given; accessors apply the normalisation rules:
/// page 0 becomes 1, page size 0 becomes the default and is capped at the
/// maximum, a missing sort column means `created_at`, a missing order
/// means descending.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Pagination {
    #[serde(default)]
    pub page: u64,
    #[serde(default)]
    pub page_size: u64,
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default)]
    pub order: Option<SortOrder>,
}

impl Pagination {
    pub fn new(page: u64, page_size: u64) -> Self {
        Self {
            page,
            page_size,
            sort: None,
            order: None,
        }
    }

    /// Set the sort column and direction
    pub fn sorted_by(mut self, column: impl Into<String>, order: SortOrder) -> Self {
        self.sort = Some(column.into());
        self.order = Some(order);
        self
    }

    /// Apply a default sort only when the caller did not choose one
    pub fn with_default_sort(mut self, column: &str, order: SortOrder) -> Self {
        if self.sort.as_deref().map_or(true, str::is_empty) {
            self.sort = Some(column.to_string());
            if self.order.is_none() {
                self.order = Some(order);
            }
        }
        self
    }

    /// 1-indexed page number
    pub fn page(&self) -> u64 {
        if self.page == 0 {
            DEFAULT_PAGE_NUMBER
        } else {
            self.page
        }
    }

    /// Items per page, capped at maximum
    pub fn limit(&self) -> u64 {
        if self.page_size == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            self.page_size.min(MAX_PAGE_SIZE)
        }
    }

    /// Calculate offset for database query
    pub fn offset(&self) -> u64 {
        (self.page() - 1) * self.limit()
    }

    /// Column name to sort by
    pub fn sort_column(&self) -> &str {
        match self.sort.as_deref() {
            Some(column) if !column.is_empty() => column,
            _ => DEFAULT_SORT_COLUMN,
        }
    }

    pub fn sort_order(&self) -> SortOrder {
        self.order.unwrap_or_default()
    }
}

/// Paginated result wrapper (reusable for all list results)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub meta: PaginationMeta,
}

/// Pagination metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginationMeta {
    pub page: u64,
    pub page_size: u64,
    pub total: u64,
    pub total_pages: u64,
}

impl<T> Paginated<T> {
    /// Create new paginated result
    pub fn new(data: Vec<T>, page: u64, page_size: u64, total: u64) -> Self {
        let total_pages = if page_size > 0 {
            total.div_ceil(page_size)
        } else {
            0
        };

        Self {
            data,
            meta: PaginationMeta {
                page,
                page_size,
                total,
                total_pages,
            },
        }
    }

    /// Convert every row while keeping the metadata
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginated<U> {
        Paginated {
            data: self.data.into_iter().map(f).collect(),
            meta: self.meta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_values_fall_back_to_defaults() {
        let p = Pagination::new(0, 0);
        assert_eq!(p.page(), 1);
        assert_eq!(p.limit(), 10);
        assert_eq!(p.offset(), 0);
        assert_eq!(p.sort_column(), "created_at");
        assert_eq!(p.sort_order(), SortOrder::Desc);
    }

    #[test]
    fn page_size_is_capped() {
        let p = Pagination::new(3, 500);
        assert_eq!(p.limit(), 100);
        assert_eq!(p.offset(), 200);
    }

    #[test]
    fn default_sort_does_not_override_caller_choice() {
        let p = Pagination::new(1, 10)
            .sorted_by("title", SortOrder::Asc)
            .with_default_sort("username", SortOrder::Asc);
        assert_eq!(p.sort_column(), "title");

        let p = Pagination::new(1, 10).with_default_sort("username", SortOrder::Asc);
        assert_eq!(p.sort_column(), "username");
        assert_eq!(p.sort_order(), SortOrder::Asc);
    }

    #[test]
    fn total_pages_rounds_up() {
        let page: Paginated<u8> = Paginated::new(vec![], 1, 10, 21);
        assert_eq!(page.meta.total_pages, 3);

        let empty: Paginated<u8> = Paginated::new(vec![], 1, 10, 0);
        assert_eq!(empty.meta.total_pages, 0);
    }
}
