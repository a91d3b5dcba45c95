// Submodules for separation of concerns
mod eval;
mod exec;
pub mod features;
pub mod geo;
mod parse;
mod types;

// Public API re-exports
pub use eval::{compare_bson, compare_docs, eval_filter, get_path, project};
pub use exec::{count_docs, find_docs, find_one};
pub use features::QueryBuilder;
pub use parse::{InferCaster, ValueCaster, infer_value, parse_param_key};
pub use types::{CmpOp, Filter, FindOptions, Order, Projection, SortSpec};
