//! Query parameter and result types shared by all repositories.

mod filter;
mod pagination;

pub use filter::{resolve_column, Filter};
pub use pagination::{Paginated, Pagination, PaginationMeta, SortOrder};
