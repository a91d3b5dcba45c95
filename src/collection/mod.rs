mod core;
mod index;
mod ops;

pub use self::core::Collection;
pub use index::UniqueIndex;
pub use ops::Swap;
