//! The closed set of logical column types and the name registry.

use arrow_schema::{DataType, TimeUnit};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

/// The declared element type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalType {
    Empty,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Bool8,
    TimestampDays,
    TimestampSeconds,
    TimestampMilliseconds,
    TimestampMicroseconds,
    TimestampNanoseconds,
    DurationDays,
    DurationSeconds,
    DurationMilliseconds,
    DurationMicroseconds,
    DurationNanoseconds,
    Dictionary32,
    String,
    List,
    Decimal32,
    Decimal64,
}

/// Returned when a name is not in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid dtype: '{0}'")]
pub struct UnknownTypeName(pub String);

impl LogicalType {
    pub const ALL: [LogicalType; 27] = [
        LogicalType::Empty,
        LogicalType::Int8,
        LogicalType::Int16,
        LogicalType::Int32,
        LogicalType::Int64,
        LogicalType::UInt8,
        LogicalType::UInt16,
        LogicalType::UInt32,
        LogicalType::UInt64,
        LogicalType::Float32,
        LogicalType::Float64,
        LogicalType::Bool8,
        LogicalType::TimestampDays,
        LogicalType::TimestampSeconds,
        LogicalType::TimestampMilliseconds,
        LogicalType::TimestampMicroseconds,
        LogicalType::TimestampNanoseconds,
        LogicalType::DurationDays,
        LogicalType::DurationSeconds,
        LogicalType::DurationMilliseconds,
        LogicalType::DurationMicroseconds,
        LogicalType::DurationNanoseconds,
        LogicalType::Dictionary32,
        LogicalType::String,
        LogicalType::List,
        LogicalType::Decimal32,
        LogicalType::Decimal64,
    ];

    /// The registry name of this type.
    pub fn name(self) -> &'static str {
        match self {
            LogicalType::Empty => "empty",
            LogicalType::Int8 => "int8",
            LogicalType::Int16 => "int16",
            LogicalType::Int32 => "int32",
            LogicalType::Int64 => "int64",
            LogicalType::UInt8 => "uint8",
            LogicalType::UInt16 => "uint16",
            LogicalType::UInt32 => "uint32",
            LogicalType::UInt64 => "uint64",
            LogicalType::Float32 => "float32",
            LogicalType::Float64 => "float64",
            LogicalType::Bool8 => "bool8",
            LogicalType::TimestampDays => "timestamp_days",
            LogicalType::TimestampSeconds => "timestamp_seconds",
            LogicalType::TimestampMilliseconds => "timestamp_milliseconds",
            LogicalType::TimestampMicroseconds => "timestamp_microseconds",
            LogicalType::TimestampNanoseconds => "timestamp_nanoseconds",
            LogicalType::DurationDays => "duration_days",
            LogicalType::DurationSeconds => "duration_seconds",
            LogicalType::DurationMilliseconds => "duration_milliseconds",
            LogicalType::DurationMicroseconds => "duration_microseconds",
            LogicalType::DurationNanoseconds => "duration_nanoseconds",
            LogicalType::Dictionary32 => "dictionary32",
            LogicalType::String => "string",
            LogicalType::List => "list",
            LogicalType::Decimal32 => "decimal32",
            LogicalType::Decimal64 => "decimal64",
        }
    }

    /// Look a type up by its exact registry name.
    ///
    /// Matching is case-sensitive and there are no aliases.
    pub fn resolve(name: &str) -> Result<Self, UnknownTypeName> {
        registry()
            .get(name)
            .copied()
            .ok_or_else(|| UnknownTypeName(name.to_string()))
    }

    /// Byte width of one element, or `None` for types whose values live in
    /// child columns.
    pub fn byte_width(self) -> Option<usize> {
        match self {
            LogicalType::Empty => Some(0),
            LogicalType::Int8 | LogicalType::UInt8 | LogicalType::Bool8 => Some(1),
            LogicalType::Int16 | LogicalType::UInt16 => Some(2),
            LogicalType::Int32
            | LogicalType::UInt32
            | LogicalType::Float32
            | LogicalType::TimestampDays
            | LogicalType::DurationDays
            | LogicalType::Decimal32 => Some(4),
            LogicalType::Int64
            | LogicalType::UInt64
            | LogicalType::Float64
            | LogicalType::TimestampSeconds
            | LogicalType::TimestampMilliseconds
            | LogicalType::TimestampMicroseconds
            | LogicalType::TimestampNanoseconds
            | LogicalType::DurationSeconds
            | LogicalType::DurationMilliseconds
            | LogicalType::DurationMicroseconds
            | LogicalType::DurationNanoseconds
            | LogicalType::Decimal64 => Some(8),
            LogicalType::Dictionary32 | LogicalType::String | LogicalType::List => None,
        }
    }

    pub fn is_fixed_width(self) -> bool {
        !matches!(self, LogicalType::Empty) && self.byte_width().is_some()
    }

    /// The Arrow type used when exporting a column of this type.
    pub fn to_arrow(self) -> Option<DataType> {
        let dt = match self {
            LogicalType::Empty => DataType::Null,
            LogicalType::Int8 => DataType::Int8,
            LogicalType::Int16 => DataType::Int16,
            LogicalType::Int32 => DataType::Int32,
            LogicalType::Int64 => DataType::Int64,
            LogicalType::UInt8 => DataType::UInt8,
            LogicalType::UInt16 => DataType::UInt16,
            LogicalType::UInt32 => DataType::UInt32,
            LogicalType::UInt64 => DataType::UInt64,
            LogicalType::Float32 => DataType::Float32,
            LogicalType::Float64 => DataType::Float64,
            LogicalType::Bool8 => DataType::Boolean,
            LogicalType::TimestampDays => DataType::Date32,
            LogicalType::TimestampSeconds => DataType::Timestamp(TimeUnit::Second, None),
            LogicalType::TimestampMilliseconds => DataType::Timestamp(TimeUnit::Millisecond, None),
            LogicalType::TimestampMicroseconds => DataType::Timestamp(TimeUnit::Microsecond, None),
            LogicalType::TimestampNanoseconds => DataType::Timestamp(TimeUnit::Nanosecond, None),
            LogicalType::DurationSeconds => DataType::Duration(TimeUnit::Second),
            LogicalType::DurationMilliseconds => DataType::Duration(TimeUnit::Millisecond),
            LogicalType::DurationMicroseconds => DataType::Duration(TimeUnit::Microsecond),
            LogicalType::DurationNanoseconds => DataType::Duration(TimeUnit::Nanosecond),
            LogicalType::String => DataType::Utf8,
            // No lossless Arrow counterpart without extra metadata (scale,
            // child types, dictionary keys).
            LogicalType::DurationDays
            | LogicalType::Dictionary32
            | LogicalType::List
            | LogicalType::Decimal32
            | LogicalType::Decimal64 => return None,
        };
        Some(dt)
    }

    /// Map an Arrow `DataType` back to a logical type.
    pub fn from_arrow(dt: &DataType) -> Option<Self> {
        LogicalType::ALL
            .into_iter()
            .find(|t| t.to_arrow().as_ref() == Some(dt))
    }
}

fn registry() -> &'static HashMap<&'static str, LogicalType> {
    static REGISTRY: OnceLock<HashMap<&'static str, LogicalType>> = OnceLock::new();
    REGISTRY.get_or_init(|| LogicalType::ALL.iter().map(|&t| (t.name(), t)).collect())
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LogicalType {
    type Err = UnknownTypeName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LogicalType::resolve(s)
    }
}
