//! Read-only data sources.

pub mod search;

pub use search::SearchDataSource;
