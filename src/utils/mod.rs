// Utility functions
pub mod error;
pub mod money;
pub mod pagination;
pub mod slug;
pub mod time;

pub use error::*;
pub use pagination::*;
