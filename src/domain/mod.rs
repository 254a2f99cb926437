pub mod execution;
pub mod health;
pub mod plan;

pub use execution::*;
pub use health::*;
pub use plan::*;
