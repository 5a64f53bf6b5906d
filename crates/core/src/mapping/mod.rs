//! Internal category to provider account resolution.

pub mod error;
pub mod mapper;
pub mod types;

pub use error::MappingError;
pub use mapper::{CategoryMapper, CategoryMappingRepository};
pub use types::{CategoryMapping, MappedLineItem};
