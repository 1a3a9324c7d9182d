#![forbid(unsafe_code)]

pub mod math;
pub mod options;
pub mod problem;
pub mod solution;
pub mod stats;
pub mod traits;

pub use math::*;
pub use options::*;
pub use problem::*;
pub use solution::*;
pub use stats::*;
pub use traits::*;
