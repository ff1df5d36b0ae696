//! Primitive value types shared by the audit and network subsystems.
//!
//! - [`vector`]: a single `(value, timestamp)` sample from a metrics query
//! - [`window`]: a closed-open time interval with union semantics

pub mod vector;
pub mod window;

pub use vector::Vector;
pub use window::{Window, WindowError};
