pub(crate) mod executor;
pub mod registry;
pub mod types;

pub use registry::DbService;
pub use types::{categorize_type, row_to_map, TypeCategory};
