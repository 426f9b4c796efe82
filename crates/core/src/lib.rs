//! Core value types shared by every layer of the table engine.
//!
//! Nothing in here knows about tables, events or undo history: points and
//! ranges are plain arithmetic, ids come from an explicitly owned allocator.

pub mod column;
pub mod id;
pub mod range;

pub use column::{column_name, Align, ColumnNaming};
pub use id::IdAllocator;
pub use range::{Boundary, Point, Range};
