//! Controller firmware protocols
//!
//! Only GRBL is supported.

pub mod grbl;

pub use grbl::{MotionProtocol, StatusParser};
