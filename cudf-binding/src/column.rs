//! The `Column` wrapper exposed to the host.

use arrow_array::{Array, ArrayRef};
use gpu_column::{ColumnBuffer, LogicalType};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::args::{
    CallArgs, ColumnArgs, FromCallArgs, GatherArgs, GetChildArgs, GetValueArgs, HostValue, NoArgs,
    SetNullCountArgs, SetNullMaskArgs, SplitArgs,
};
use crate::context::EngineContext;
use crate::error::{BindingError, Result};

/// An owning handle to one engine column.
///
/// The handle is either active or released. Releasing (or dropping) frees the
/// native resource exactly once; afterwards only [`Column::type_name`] still
/// answers. Handles are never cloned, so no two wrappers share a buffer.
pub struct Column {
    dtype: LogicalType,
    buffer: Option<ColumnBuffer>,
    ctx: Arc<EngineContext>,
}

/// What a dynamically dispatched method hands back to the host.
#[derive(Debug)]
pub enum HostReturn {
    Value(HostValue),
    Column(Column),
}

impl Column {
    /// `new Column(typeName, _unused, data)` from host arguments.
    pub fn new(ctx: &Arc<EngineContext>, args: &CallArgs) -> Result<Self> {
        let ColumnArgs { dtype, data } = ColumnArgs::from_call_args(args)?;
        Self::with_type(ctx, dtype, &data)
    }

    /// Build a column of `type_name` from raw little-endian bytes.
    ///
    /// The type is resolved before anything is allocated.
    pub fn from_bytes(ctx: &Arc<EngineContext>, type_name: &str, data: &[u8]) -> Result<Self> {
        let dtype = LogicalType::resolve(type_name)?;
        Self::with_type(ctx, dtype, data)
    }

    /// Copy an Arrow array into a new column.
    pub fn from_arrow(ctx: &Arc<EngineContext>, array: &dyn Array) -> Result<Self> {
        let buffer = ctx.call("from_arrow", |_, mr| gpu_column::array_to_column(mr, array))?;
        Ok(Self::from_buffer(ctx.clone(), buffer))
    }

    fn with_type(ctx: &Arc<EngineContext>, dtype: LogicalType, data: &[u8]) -> Result<Self> {
        let buffer = ctx.call("Column", |_, mr| ColumnBuffer::from_host_bytes(mr, dtype, data))?;
        debug!("constructed {} column with {} rows", dtype, buffer.size());
        Ok(Self::from_buffer(ctx.clone(), buffer))
    }

    pub(crate) fn from_buffer(ctx: Arc<EngineContext>, buffer: ColumnBuffer) -> Self {
        Self {
            dtype: buffer.dtype(),
            buffer: Some(buffer),
            ctx,
        }
    }

    /// Declared type name. Still answers after release.
    pub fn type_name(&self) -> &'static str {
        self.dtype.name()
    }

    pub fn dtype(&self) -> LogicalType {
        self.dtype
    }

    pub fn is_released(&self) -> bool {
        self.buffer.is_none()
    }

    pub fn size(&self) -> Result<usize> {
        Ok(self.buffer("size")?.size())
    }

    pub fn null_count(&self) -> Result<usize> {
        Ok(self.buffer("null_count")?.null_count())
    }

    pub fn has_nulls(&self) -> Result<bool> {
        Ok(self.buffer("has_nulls")?.has_nulls())
    }

    /// Override the cached null count.
    ///
    /// Unlike a raw cache write, values above `size()` are rejected so the
    /// cache can never claim more nulls than rows.
    pub fn set_null_count(&mut self, null_count: usize) -> Result<()> {
        self.buffer_mut("set_null_count")?
            .set_null_count(null_count)
            .map_err(BindingError::from_engine)
    }

    /// Attach a packed validity mask (bit set = valid).
    pub fn set_null_mask(&mut self, mask: &[u8], null_count: Option<usize>) -> Result<()> {
        self.buffer("set_null_mask")?;
        let device_mask = self
            .ctx
            .call("set_null_mask", |_, mr| mr.allocate_from_host(mask))?;
        self.buffer_mut("set_null_mask")?
            .set_null_mask(device_mask, null_count)
            .map_err(BindingError::from_engine)
    }

    /// Row `index` as a host value, `null` when the row is null.
    pub fn get_value(&self, index: usize) -> Result<HostValue> {
        decode_value(self.buffer("get_value")?, index)
    }

    /// Deep copy into a new, independently owned column.
    pub fn copy(&self) -> Result<Column> {
        let buffer = self.buffer("copy")?;
        let copied = self.ctx.call("copy", |_, _| buffer.try_clone())?;
        Ok(Self::from_buffer(self.ctx.clone(), copied))
    }

    /// Keep the rows where `mask` is true.
    pub fn apply_boolean_mask(&self, mask: &Column) -> Result<Column> {
        let buffer = self.buffer("apply_boolean_mask")?;
        let mask_buffer = mask.buffer("apply_boolean_mask")?;
        let mut out = self.ctx.call("apply_boolean_mask", |engine, mr| {
            engine.apply_boolean_mask(&[buffer], mask_buffer, mr)
        })?;
        match out.pop() {
            Some(filtered) => Ok(Self::from_buffer(self.ctx.clone(), filtered)),
            None => Err(BindingError::Engine(
                "apply_boolean_mask returned no columns".to_string(),
            )),
        }
    }

    /// Rows at the positions held by the integer column `indices`.
    pub fn gather(&self, indices: &Column) -> Result<Column> {
        let rows = row_indices(indices.buffer("gather")?)?;
        self.gather_rows(&rows)
    }

    /// Rows at `indices`, in that order. Indices may repeat.
    pub fn gather_rows(&self, indices: &[usize]) -> Result<Column> {
        let buffer = self.buffer("gather")?;
        let out = self
            .ctx
            .call("gather", |engine, mr| engine.gather(buffer, indices, mr))?;
        Ok(Self::from_buffer(self.ctx.clone(), out))
    }

    /// A deep copy of child `index` as a column of its own.
    pub fn get_child(&self, index: usize) -> Result<Column> {
        let buffer = self.buffer("get_child")?;
        let child = buffer.child(index).ok_or_else(|| {
            BindingError::InvalidArgument(format!(
                "get_child: index {} is out of bounds for {} children",
                index,
                buffer.children().len()
            ))
        })?;
        let copied = self.ctx.call("get_child", |_, _| child.try_clone())?;
        Ok(Self::from_buffer(self.ctx.clone(), copied))
    }

    /// Export as an Arrow array.
    pub fn to_arrow(&self) -> Result<ArrayRef> {
        gpu_column::column_to_array(self.buffer("to_arrow")?).map_err(BindingError::from_engine)
    }

    /// Free the native resource. Releasing twice is a no-op.
    pub fn release(&mut self) {
        match self.buffer.take() {
            Some(buffer) => {
                debug!(
                    "releasing {} column ({} rows, {} bytes)",
                    self.dtype,
                    buffer.size(),
                    buffer.memory_size()
                );
                drop(buffer.release());
            }
            None => debug!("release on an already released {} column", self.dtype),
        }
    }

    /// Dispatch a host method call by name.
    pub fn call(&mut self, method: &str, args: &CallArgs) -> Result<HostReturn> {
        let value = match method {
            "type" => {
                NoArgs::check(method, args)?;
                HostValue::from(self.type_name())
            }
            "size" => {
                NoArgs::check(method, args)?;
                count_value(self.size()?)
            }
            "null_count" => {
                NoArgs::check(method, args)?;
                count_value(self.null_count()?)
            }
            "has_nulls" => {
                NoArgs::check(method, args)?;
                HostValue::Bool(self.has_nulls()?)
            }
            "set_null_count" => {
                let parsed = SetNullCountArgs::from_call_args(args)?;
                self.set_null_count(parsed.null_count)?;
                HostValue::Undefined
            }
            "set_null_mask" => {
                let parsed = SetNullMaskArgs::from_call_args(args)?;
                self.set_null_mask(&parsed.mask, parsed.null_count)?;
                HostValue::Undefined
            }
            "get_value" => {
                let parsed = GetValueArgs::from_call_args(args)?;
                self.get_value(parsed.index)?
            }
            "release" => {
                NoArgs::check(method, args)?;
                self.release();
                HostValue::Undefined
            }
            "copy" => {
                NoArgs::check(method, args)?;
                return Ok(HostReturn::Column(self.copy()?));
            }
            "split" => {
                let parsed = SplitArgs::from_call_args(args)?;
                return Ok(HostReturn::Column(self.split(&parsed.delimiter)?));
            }
            "gather" => {
                let parsed = GatherArgs::from_call_args(args)?;
                return Ok(HostReturn::Column(self.gather_rows(&parsed.indices)?));
            }
            "get_child" => {
                let parsed = GetChildArgs::from_call_args(args)?;
                return Ok(HostReturn::Column(self.get_child(parsed.index)?));
            }
            other => {
                return Err(BindingError::InvalidArgument(format!(
                    "Column has no method '{}'",
                    other
                )))
            }
        };
        Ok(HostReturn::Value(value))
    }

    pub(crate) fn buffer(&self, op: &'static str) -> Result<&ColumnBuffer> {
        self.buffer
            .as_ref()
            .ok_or(BindingError::UseAfterRelease { op })
    }

    fn buffer_mut(&mut self, op: &'static str) -> Result<&mut ColumnBuffer> {
        self.buffer
            .as_mut()
            .ok_or(BindingError::UseAfterRelease { op })
    }

    pub(crate) fn context(&self) -> &Arc<EngineContext> {
        &self.ctx
    }
}

impl fmt::Debug for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Column")
            .field("type", &self.type_name())
            .field("buffer", &self.buffer)
            .finish()
    }
}

fn count_value(n: usize) -> HostValue {
    HostValue::Number(n as f64)
}

fn decode_value(buffer: &ColumnBuffer, index: usize) -> Result<HostValue> {
    if index >= buffer.size() {
        return Err(BindingError::InvalidArgument(format!(
            "get_value: index {} is out of bounds for {} rows",
            index,
            buffer.size()
        )));
    }
    if !buffer.is_valid(index) {
        return Ok(HostValue::Null);
    }

    let dtype = buffer.dtype();
    if dtype == LogicalType::String {
        let value = buffer.string_at(index).map_err(BindingError::from_engine)?;
        return Ok(HostValue::String(value.unwrap_or_default().to_string()));
    }

    let bytes = buffer.value_bytes(index).map_err(BindingError::from_engine)?;
    let value = match dtype {
        LogicalType::Bool8 => HostValue::Bool(bytes[0] != 0),
        LogicalType::Int8 => HostValue::Number(i8::from_le_bytes(le(bytes)) as f64),
        LogicalType::UInt8 => HostValue::Number(bytes[0] as f64),
        LogicalType::Int16 => HostValue::Number(i16::from_le_bytes(le(bytes)) as f64),
        LogicalType::UInt16 => HostValue::Number(u16::from_le_bytes(le(bytes)) as f64),
        LogicalType::Int32
        | LogicalType::TimestampDays
        | LogicalType::DurationDays
        | LogicalType::Decimal32 => HostValue::Number(i32::from_le_bytes(le(bytes)) as f64),
        LogicalType::UInt32 => HostValue::Number(u32::from_le_bytes(le(bytes)) as f64),
        LogicalType::Float32 => HostValue::Number(f32::from_le_bytes(le(bytes)) as f64),
        LogicalType::Float64 => HostValue::Number(f64::from_le_bytes(le(bytes))),
        LogicalType::UInt64 => HostValue::BigInt(u64::from_le_bytes(le(bytes)) as i128),
        LogicalType::Int64
        | LogicalType::TimestampSeconds
        | LogicalType::TimestampMilliseconds
        | LogicalType::TimestampMicroseconds
        | LogicalType::TimestampNanoseconds
        | LogicalType::DurationSeconds
        | LogicalType::DurationMilliseconds
        | LogicalType::DurationMicroseconds
        | LogicalType::DurationNanoseconds
        | LogicalType::Decimal64 => HostValue::BigInt(i64::from_le_bytes(le(bytes)) as i128),
        other => {
            return Err(BindingError::InvalidArgument(format!(
                "get_value is not supported for {} columns",
                other
            )))
        }
    };
    Ok(value)
}

fn row_indices(indices: &ColumnBuffer) -> Result<Vec<usize>> {
    let dtype = indices.dtype();
    (0..indices.size())
        .map(|i| {
            if !indices.is_valid(i) {
                return Err(BindingError::InvalidArgument(format!(
                    "gather: index row {} is null",
                    i
                )));
            }
            let bytes = indices.value_bytes(i).map_err(BindingError::from_engine)?;
            let raw = match dtype {
                LogicalType::Int8 => i8::from_le_bytes(le(bytes)) as i128,
                LogicalType::Int16 => i16::from_le_bytes(le(bytes)) as i128,
                LogicalType::Int32 => i32::from_le_bytes(le(bytes)) as i128,
                LogicalType::Int64 => i64::from_le_bytes(le(bytes)) as i128,
                LogicalType::UInt8 => bytes[0] as i128,
                LogicalType::UInt16 => u16::from_le_bytes(le(bytes)) as i128,
                LogicalType::UInt32 => u32::from_le_bytes(le(bytes)) as i128,
                LogicalType::UInt64 => u64::from_le_bytes(le(bytes)) as i128,
                other => {
                    return Err(BindingError::InvalidArgument(format!(
                        "gather expects an integer index column, got {}",
                        other
                    )))
                }
            };
            usize::try_from(raw).map_err(|_| {
                BindingError::InvalidArgument(format!("gather: index {} is negative", raw))
            })
        })
        .collect()
}

fn le<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut raw = [0u8; N];
    raw.copy_from_slice(&bytes[..N]);
    raw
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpu_kernels::HostEngine;
    use gpu_memory_manager::SlabAllocator;

    fn ctx() -> Arc<EngineContext> {
        let memory = SlabAllocator::new(&[256, 4096], 16, 1 << 20).unwrap();
        Arc::new(EngineContext::new(Box::new(HostEngine::default()), memory))
    }

    fn int32_bytes(values: &[i32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn construct_and_inspect() {
        let ctx = ctx();
        let col = Column::from_bytes(&ctx, "int32", &int32_bytes(&[1, -2, 3])).unwrap();
        assert_eq!(col.type_name(), "int32");
        assert_eq!(col.size().unwrap(), 3);
        assert_eq!(col.null_count().unwrap(), 0);
        assert!(!col.has_nulls().unwrap());
        assert_eq!(col.get_value(1).unwrap(), HostValue::Number(-2.0));
    }

    #[test]
    fn invalid_type_allocates_nothing() {
        let ctx = ctx();
        let err = Column::from_bytes(&ctx, "int128", &[0u8; 16]).unwrap_err();
        assert_eq!(err.kind(), "InvalidTypeError");
        assert_eq!(ctx.memory_stats().live_buffers, 0);
    }

    #[test]
    fn ragged_bytes_are_an_argument_error() {
        let ctx = ctx();
        let err = Column::from_bytes(&ctx, "float64", &[0u8; 12]).unwrap_err();
        assert_eq!(err.kind(), "InvalidArgumentError");
        assert_eq!(ctx.memory_stats().live_buffers, 0);
    }

    #[test]
    fn release_is_idempotent_and_final() {
        let ctx = ctx();
        let mut col = Column::from_bytes(&ctx, "int64", &[0u8; 16]).unwrap();
        col.release();
        col.release();
        assert!(col.is_released());
        assert_eq!(col.type_name(), "int64");
        assert_eq!(col.size().unwrap_err(), BindingError::UseAfterRelease { op: "size" });
        assert_eq!(col.null_count().unwrap_err().kind(), "UseAfterReleaseError");
        assert_eq!(col.has_nulls().unwrap_err().kind(), "UseAfterReleaseError");
        assert_eq!(col.set_null_count(0).unwrap_err().kind(), "UseAfterReleaseError");
        assert_eq!(col.split(",").unwrap_err().kind(), "UseAfterReleaseError");
        assert_eq!(ctx.memory_stats().live_buffers, 0);
    }

    #[test]
    fn drop_frees_the_resource() {
        let ctx = ctx();
        {
            let _col = Column::from_bytes(&ctx, "uint8", &[1, 2, 3]).unwrap();
            assert_eq!(ctx.memory_stats().live_buffers, 1);
        }
        assert_eq!(ctx.memory_stats().live_buffers, 0);
    }

    #[test]
    fn null_count_override_is_range_checked() {
        let ctx = ctx();
        let mut col = Column::from_bytes(&ctx, "int8", &[1, 2, 3]).unwrap();
        col.set_null_count(2).unwrap();
        assert_eq!(col.null_count().unwrap(), 2);
        assert!(col.has_nulls().unwrap());
        let err = col.set_null_count(4).unwrap_err();
        assert_eq!(err.kind(), "InvalidArgumentError");
        assert_eq!(col.null_count().unwrap(), 2);
    }

    #[test]
    fn null_mask_drives_values() {
        let ctx = ctx();
        let mut col = Column::from_bytes(&ctx, "int32", &int32_bytes(&[7, 8, 9])).unwrap();
        col.set_null_mask(&[0b101], None).unwrap();
        assert_eq!(col.null_count().unwrap(), 1);
        assert_eq!(col.get_value(1).unwrap(), HostValue::Null);
        assert_eq!(col.get_value(2).unwrap(), HostValue::Number(9.0));
        assert_eq!(col.get_value(3).unwrap_err().kind(), "InvalidArgumentError");
    }

    #[test]
    fn dynamic_dispatch() {
        let ctx = ctx();
        let mut col = Column::new(
            &ctx,
            &CallArgs::new(vec!["uint16".into(), HostValue::Undefined, vec![1u8, 0, 2, 0].into()]),
        )
        .unwrap();
        match col.call("size", &CallArgs::default()).unwrap() {
            HostReturn::Value(v) => assert_eq!(v, HostValue::Number(2.0)),
            other => panic!("unexpected {:?}", other),
        }
        col.call("set_null_count", &CallArgs::new(vec![HostValue::Number(1.0)]))
            .unwrap();
        match col.call("has_nulls", &CallArgs::default()).unwrap() {
            HostReturn::Value(v) => assert_eq!(v, HostValue::Bool(true)),
            other => panic!("unexpected {:?}", other),
        }
        assert!(col.call("frobnicate", &CallArgs::default()).is_err());
        col.call("release", &CallArgs::default()).unwrap();
        match col.call("type", &CallArgs::default()).unwrap() {
            HostReturn::Value(v) => assert_eq!(v, HostValue::from("uint16")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn copy_is_independent() {
        let ctx = ctx();
        let mut original = Column::from_bytes(&ctx, "int32", &int32_bytes(&[4, 5])).unwrap();
        let copy = original.copy().unwrap();
        original.release();
        assert_eq!(copy.get_value(1).unwrap(), HostValue::Number(5.0));
    }

    #[test]
    fn gather_by_index_column() {
        let ctx = ctx();
        let values = Column::from_bytes(&ctx, "int32", &int32_bytes(&[10, 20, 30])).unwrap();
        let indices = Column::from_bytes(&ctx, "int32", &int32_bytes(&[2, 0, 2])).unwrap();
        let out = values.gather(&indices).unwrap();
        assert_eq!(out.size().unwrap(), 3);
        assert_eq!(out.get_value(0).unwrap(), HostValue::Number(30.0));
        assert_eq!(out.get_value(1).unwrap(), HostValue::Number(10.0));

        let empty = Column::from_bytes(&ctx, "uint8", &[]).unwrap();
        assert_eq!(values.gather(&empty).unwrap().size().unwrap(), 0);
    }

    #[test]
    fn gather_rejects_bad_indices() {
        let ctx = ctx();
        let values = Column::from_bytes(&ctx, "int8", &[1, 2, 3]).unwrap();
        let out_of_bounds = Column::from_bytes(&ctx, "uint8", &[3]).unwrap();
        assert_eq!(values.gather(&out_of_bounds).unwrap_err().kind(), "InvalidArgumentError");
        let negative = Column::from_bytes(&ctx, "int8", &[0xff]).unwrap();
        assert_eq!(values.gather(&negative).unwrap_err().kind(), "InvalidArgumentError");
        let floats = Column::from_bytes(&ctx, "float32", &0f32.to_le_bytes()).unwrap();
        assert_eq!(values.gather(&floats).unwrap_err().kind(), "InvalidArgumentError");
    }

    #[test]
    fn string_children_are_owned_copies() {
        let ctx = ctx();
        let mut strings = Column::from_bytes(&ctx, "string", b"ab").unwrap();
        let offsets = strings.get_child(0).unwrap();
        let chars = strings.get_child(1).unwrap();
        assert_eq!(strings.get_child(2).unwrap_err().kind(), "InvalidArgumentError");
        strings.release();

        assert_eq!(offsets.type_name(), "int32");
        assert_eq!(offsets.size().unwrap(), 2);
        assert_eq!(offsets.get_value(1).unwrap(), HostValue::Number(2.0));
        assert_eq!(chars.type_name(), "int8");
        assert_eq!(chars.get_value(0).unwrap(), HostValue::Number(b'a' as f64));
    }

    #[test]
    fn wide_values_are_bigints() {
        let ctx = ctx();
        let col = Column::from_bytes(&ctx, "uint64", &u64::MAX.to_le_bytes()).unwrap();
        assert_eq!(col.get_value(0).unwrap(), HostValue::BigInt(u64::MAX as i128));
        let col = Column::from_bytes(&ctx, "timestamp_nanoseconds", &(-5i64).to_le_bytes()).unwrap();
        assert_eq!(col.get_value(0).unwrap(), HostValue::BigInt(-5));
    }
}
