//! Event-stream identifiers and the ranges built from them.

pub mod point;
pub mod range;

pub use point::{ParsePointIdError, PointFlags, PointId, Timestamp, OPEN_TOKEN};
pub use range::IdRange;
