//! Device-resident columns.
//!
//! # Layout contract
//!
//! A column is a typed, contiguous device buffer plus an optional validity
//! bitmask:
//!
//! ```text
//! data:      [  value[0]  |  value[1]  | ... |  value[n-1]  ]
//! null_mask: [ b7..b0 | b15..b8 | ... ]   (bit set = valid)
//! ```
//!
//! String columns carry no data of their own; their values live in an
//! `int32` offsets child and an `int8` characters child.

pub mod arrow_convert;
pub mod bitmask;
pub mod column_buffer;
pub mod logical_type;

pub use arrow_convert::{
    array_to_column, column_to_array, columns_to_record_batch, record_batch_to_columns,
};
pub use column_buffer::{ColumnBuffer, ColumnContents, InvalidArgument, CHARS_CHILD, OFFSETS_CHILD};
pub use logical_type::{LogicalType, UnknownTypeName};
