//! Utility helpers: generational allocation, math extensions, and logging.

pub mod allocator;
pub mod logging;
pub mod math;

pub use allocator::{Arena, Handle};
pub use math::*;
