//! Host values and per-operation argument marshaling.
//!
//! Host calls arrive as positional, dynamically typed [`CallArgs`]. Each
//! operation declares a typed argument struct implementing [`FromCallArgs`];
//! its validation checks the slot count and every slot's type before the
//! engine is touched.

use gpu_column::LogicalType;
use std::fmt;
use std::path::PathBuf;

use crate::error::{BindingError, Result};

/// A value received from, or returned to, the host runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    BigInt(i128),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<HostValue>),
}

impl HostValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            HostValue::Undefined => "undefined",
            HostValue::Null => "null",
            HostValue::Bool(_) => "boolean",
            HostValue::Number(_) => "number",
            HostValue::BigInt(_) => "bigint",
            HostValue::String(_) => "string",
            HostValue::Bytes(_) => "bytes",
            HostValue::Array(_) => "array",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// A non-negative integer, from either a whole number or a bigint.
    pub fn as_count(&self) -> Option<usize> {
        match *self {
            HostValue::Number(n) if n >= 0.0 && n.fract() == 0.0 && n <= usize::MAX as f64 => {
                Some(n as usize)
            }
            HostValue::BigInt(n) => usize::try_from(n).ok(),
            _ => None,
        }
    }
}

impl fmt::Display for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Undefined => f.write_str("undefined"),
            HostValue::Null => f.write_str("null"),
            HostValue::Bool(b) => write!(f, "{}", b),
            HostValue::Number(n) => write!(f, "{}", n),
            HostValue::BigInt(n) => write!(f, "{}n", n),
            HostValue::String(s) => write!(f, "{:?}", s),
            HostValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            HostValue::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        HostValue::String(s.to_string())
    }
}

impl From<String> for HostValue {
    fn from(s: String) -> Self {
        HostValue::String(s)
    }
}

impl From<f64> for HostValue {
    fn from(n: f64) -> Self {
        HostValue::Number(n)
    }
}

impl From<bool> for HostValue {
    fn from(b: bool) -> Self {
        HostValue::Bool(b)
    }
}

impl From<Vec<u8>> for HostValue {
    fn from(bytes: Vec<u8>) -> Self {
        HostValue::Bytes(bytes)
    }
}

impl From<&[u8]> for HostValue {
    fn from(bytes: &[u8]) -> Self {
        HostValue::Bytes(bytes.to_vec())
    }
}

/// Positional arguments of one host call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    values: Vec<HostValue>,
}

static UNDEFINED: HostValue = HostValue::Undefined;

impl CallArgs {
    pub fn new(values: Vec<HostValue>) -> Self {
        Self { values }
    }

    /// Number of arguments the caller passed.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Slot `index`, `undefined` when not passed.
    pub fn get(&self, index: usize) -> &HostValue {
        self.values.get(index).unwrap_or(&UNDEFINED)
    }

    fn expect_len(&self, op: &str, expected: std::ops::RangeInclusive<usize>, usage: &str) -> Result<()> {
        if expected.contains(&self.len()) {
            Ok(())
        } else {
            Err(BindingError::InvalidArgument(format!(
                "{} expects {}, got {} argument(s)",
                op,
                usage,
                self.len()
            )))
        }
    }

    fn string(&self, op: &str, index: usize, name: &str) -> Result<String> {
        match self.get(index) {
            HostValue::String(s) => Ok(s.clone()),
            other => Err(wrong_type(op, name, "a string", other)),
        }
    }

    fn bytes(&self, op: &str, index: usize, name: &str) -> Result<Vec<u8>> {
        match self.get(index) {
            HostValue::Bytes(b) => Ok(b.clone()),
            other => Err(wrong_type(op, name, "a byte buffer", other)),
        }
    }

    fn count(&self, op: &str, index: usize, name: &str) -> Result<usize> {
        let value = self.get(index);
        value
            .as_count()
            .ok_or_else(|| wrong_type(op, name, "a non-negative integer", value))
    }
}

impl From<Vec<HostValue>> for CallArgs {
    fn from(values: Vec<HostValue>) -> Self {
        Self::new(values)
    }
}

fn wrong_type(op: &str, name: &str, expected: &str, got: &HostValue) -> BindingError {
    BindingError::InvalidArgument(format!(
        "{}: {} must be {}, got {} ({})",
        op,
        name,
        expected,
        got.type_name(),
        got
    ))
}

/// Typed arguments of one host operation.
pub trait FromCallArgs: Sized {
    const OP: &'static str;

    fn from_call_args(args: &CallArgs) -> Result<Self>;
}

/// `new Column(typeName, _unused, data)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnArgs {
    pub dtype: LogicalType,
    pub data: Vec<u8>,
}

impl FromCallArgs for ColumnArgs {
    const OP: &'static str = "Column";

    fn from_call_args(args: &CallArgs) -> Result<Self> {
        args.expect_len(Self::OP, 3..=3, "(type, _, data)")?;
        let type_name = args.string(Self::OP, 0, "type")?;
        let dtype = LogicalType::resolve(&type_name)?;
        // Slot 1 is reserved and ignored.
        let data = args.bytes(Self::OP, 2, "data")?;
        Ok(Self { dtype, data })
    }
}

/// `column.split(delimiter)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitArgs {
    pub delimiter: String,
}

impl FromCallArgs for SplitArgs {
    const OP: &'static str = "split";

    fn from_call_args(args: &CallArgs) -> Result<Self> {
        args.expect_len(Self::OP, 1..=1, "a delimiter")?;
        Ok(Self {
            delimiter: args.string(Self::OP, 0, "delimiter")?,
        })
    }
}

/// `read_text(filename, delimiter)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadTextArgs {
    pub path: PathBuf,
    pub delimiter: String,
}

impl FromCallArgs for ReadTextArgs {
    const OP: &'static str = "read_text";

    fn from_call_args(args: &CallArgs) -> Result<Self> {
        args.expect_len(Self::OP, 2..=2, "a filename and a delimiter")?;
        Ok(Self {
            path: PathBuf::from(args.string(Self::OP, 0, "filename")?),
            delimiter: args.string(Self::OP, 1, "delimiter")?,
        })
    }
}

/// `column.set_null_count(n)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetNullCountArgs {
    pub null_count: usize,
}

impl FromCallArgs for SetNullCountArgs {
    const OP: &'static str = "set_null_count";

    fn from_call_args(args: &CallArgs) -> Result<Self> {
        args.expect_len(Self::OP, 1..=1, "a null count")?;
        Ok(Self {
            null_count: args.count(Self::OP, 0, "null count")?,
        })
    }
}

/// `column.set_null_mask(mask[, nullCount])`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetNullMaskArgs {
    pub mask: Vec<u8>,
    pub null_count: Option<usize>,
}

impl FromCallArgs for SetNullMaskArgs {
    const OP: &'static str = "set_null_mask";

    fn from_call_args(args: &CallArgs) -> Result<Self> {
        args.expect_len(Self::OP, 1..=2, "a mask and an optional null count")?;
        let mask = args.bytes(Self::OP, 0, "mask")?;
        let null_count = match args.get(1) {
            HostValue::Undefined | HostValue::Null => None,
            _ => Some(args.count(Self::OP, 1, "null count")?),
        };
        Ok(Self { mask, null_count })
    }
}

/// `column.get_value(index)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetValueArgs {
    pub index: usize,
}

impl FromCallArgs for GetValueArgs {
    const OP: &'static str = "get_value";

    fn from_call_args(args: &CallArgs) -> Result<Self> {
        args.expect_len(Self::OP, 1..=1, "an index")?;
        Ok(Self {
            index: args.count(Self::OP, 0, "index")?,
        })
    }
}

/// `column.gather(indices)`, indices given as a host array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatherArgs {
    pub indices: Vec<usize>,
}

impl FromCallArgs for GatherArgs {
    const OP: &'static str = "gather";

    fn from_call_args(args: &CallArgs) -> Result<Self> {
        args.expect_len(Self::OP, 1..=1, "an array of row indices")?;
        let items = match args.get(0) {
            HostValue::Array(items) => items,
            other => return Err(wrong_type(Self::OP, "indices", "an array", other)),
        };
        let indices = items
            .iter()
            .map(|item| {
                item.as_count()
                    .ok_or_else(|| wrong_type(Self::OP, "index", "a non-negative integer", item))
            })
            .collect::<Result<_>>()?;
        Ok(Self { indices })
    }
}

/// `column.get_child(index)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetChildArgs {
    pub index: usize,
}

impl FromCallArgs for GetChildArgs {
    const OP: &'static str = "get_child";

    fn from_call_args(args: &CallArgs) -> Result<Self> {
        args.expect_len(Self::OP, 1..=1, "a child index")?;
        Ok(Self {
            index: args.count(Self::OP, 0, "child index")?,
        })
    }
}

/// Methods that take no arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoArgs;

impl NoArgs {
    pub fn check(op: &str, args: &CallArgs) -> Result<Self> {
        args.expect_len(op, 0..=0, "no arguments")?;
        Ok(NoArgs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: Vec<HostValue>) -> CallArgs {
        CallArgs::new(values)
    }

    #[test]
    fn column_args_resolve_type_first() {
        let parsed = ColumnArgs::from_call_args(&args(vec![
            "int32".into(),
            HostValue::Undefined,
            vec![0u8; 8].into(),
        ]))
        .unwrap();
        assert_eq!(parsed.dtype, LogicalType::Int32);
        assert_eq!(parsed.data.len(), 8);

        let err = ColumnArgs::from_call_args(&args(vec![
            "INT32".into(),
            HostValue::Null,
            HostValue::Number(1.0),
        ]))
        .unwrap_err();
        assert_eq!(err, BindingError::InvalidType { name: "INT32".into() });
    }

    #[test]
    fn column_args_require_three_slots() {
        let err = ColumnArgs::from_call_args(&args(vec!["int32".into(), vec![1u8].into()]))
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidArgumentError");
    }

    #[test]
    fn split_requires_a_delimiter() {
        let err = SplitArgs::from_call_args(&CallArgs::default()).unwrap_err();
        assert_eq!(err.kind(), "InvalidArgumentError");
        assert!(SplitArgs::from_call_args(&args(vec![",".into(), ";".into()])).is_err());
        assert!(SplitArgs::from_call_args(&args(vec![HostValue::Number(1.0)])).is_err());
        assert_eq!(
            SplitArgs::from_call_args(&args(vec!["".into()])).unwrap().delimiter,
            ""
        );
    }

    #[test]
    fn read_text_has_no_default_delimiter() {
        let err = ReadTextArgs::from_call_args(&args(vec!["file.txt".into()])).unwrap_err();
        assert_eq!(err.kind(), "InvalidArgumentError");
        let parsed =
            ReadTextArgs::from_call_args(&args(vec!["file.txt".into(), "\n".into()])).unwrap();
        assert_eq!(parsed.path, PathBuf::from("file.txt"));
    }

    #[test]
    fn counts_must_be_non_negative_integers() {
        for bad in [HostValue::Number(-1.0), HostValue::Number(1.5), HostValue::BigInt(-3), "2".into()] {
            assert!(SetNullCountArgs::from_call_args(&args(vec![bad])).is_err());
        }
        let parsed = SetNullCountArgs::from_call_args(&args(vec![HostValue::BigInt(4)])).unwrap();
        assert_eq!(parsed.null_count, 4);
    }

    #[test]
    fn null_mask_count_is_optional() {
        let parsed = SetNullMaskArgs::from_call_args(&args(vec![vec![0xffu8].into()])).unwrap();
        assert_eq!(parsed.null_count, None);
        let parsed = SetNullMaskArgs::from_call_args(&args(vec![
            vec![0x01u8].into(),
            HostValue::Number(7.0),
        ]))
        .unwrap();
        assert_eq!(parsed.null_count, Some(7));
    }

    #[test]
    fn gather_indices_come_from_an_array() {
        let parsed = GatherArgs::from_call_args(&args(vec![HostValue::Array(vec![
            HostValue::Number(2.0),
            HostValue::BigInt(0),
        ])]))
        .unwrap();
        assert_eq!(parsed.indices, vec![2, 0]);

        let err = GatherArgs::from_call_args(&args(vec![HostValue::Array(vec![
            HostValue::Number(1.0),
            HostValue::Number(-1.0),
        ])]))
        .unwrap_err();
        assert_eq!(err.kind(), "InvalidArgumentError");
        assert!(GatherArgs::from_call_args(&args(vec![vec![0u8].into()])).is_err());
        assert_eq!(
            HostValue::Array(vec![HostValue::Number(1.0), "x".into()]).to_string(),
            "[1, \"x\"]"
        );
    }

    #[test]
    fn no_args_rejects_extras() {
        assert!(NoArgs::check("size", &CallArgs::default()).is_ok());
        assert!(NoArgs::check("size", &args(vec![HostValue::Null])).is_err());
    }
}
