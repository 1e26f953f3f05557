//! Conversion between device columns and Arrow arrays.

use anyhow::{bail, Context, Result};
use arrow_array::types::{
    Date32Type, DurationMicrosecondType, DurationMillisecondType, DurationNanosecondType,
    DurationSecondType, Float32Type, Float64Type, Int16Type, Int32Type, Int64Type, Int8Type,
    TimestampMicrosecondType, TimestampMillisecondType, TimestampNanosecondType,
    TimestampSecondType, UInt16Type, UInt32Type, UInt64Type, UInt8Type,
};
use arrow_array::{
    new_empty_array, Array, ArrayRef, ArrowPrimitiveType, BooleanArray, PrimitiveArray,
    RecordBatch, StringArray,
};
use arrow_buffer::{BooleanBuffer, Buffer, NullBuffer, ScalarBuffer};
use arrow_schema::{DataType, Field, Schema};
use gpu_memory_manager::SlabAllocator;
use std::sync::Arc;

use crate::bitmask;
use crate::column_buffer::ColumnBuffer;
use crate::logical_type::LogicalType;

// ---------------------------------------------------------------------------
// Device → Arrow
// ---------------------------------------------------------------------------

/// Copy a device column into an Arrow array.
pub fn column_to_array(col: &ColumnBuffer) -> Result<ArrayRef> {
    let array: ArrayRef = match col.dtype() {
        LogicalType::Empty => new_empty_array(&DataType::Null),
        LogicalType::Int8 => primitive::<Int8Type>(col)?,
        LogicalType::Int16 => primitive::<Int16Type>(col)?,
        LogicalType::Int32 => primitive::<Int32Type>(col)?,
        LogicalType::Int64 => primitive::<Int64Type>(col)?,
        LogicalType::UInt8 => primitive::<UInt8Type>(col)?,
        LogicalType::UInt16 => primitive::<UInt16Type>(col)?,
        LogicalType::UInt32 => primitive::<UInt32Type>(col)?,
        LogicalType::UInt64 => primitive::<UInt64Type>(col)?,
        LogicalType::Float32 => primitive::<Float32Type>(col)?,
        LogicalType::Float64 => primitive::<Float64Type>(col)?,
        LogicalType::TimestampDays => primitive::<Date32Type>(col)?,
        LogicalType::TimestampSeconds => primitive::<TimestampSecondType>(col)?,
        LogicalType::TimestampMilliseconds => primitive::<TimestampMillisecondType>(col)?,
        LogicalType::TimestampMicroseconds => primitive::<TimestampMicrosecondType>(col)?,
        LogicalType::TimestampNanoseconds => primitive::<TimestampNanosecondType>(col)?,
        LogicalType::DurationSeconds => primitive::<DurationSecondType>(col)?,
        LogicalType::DurationMilliseconds => primitive::<DurationMillisecondType>(col)?,
        LogicalType::DurationMicroseconds => primitive::<DurationMicrosecondType>(col)?,
        LogicalType::DurationNanoseconds => primitive::<DurationNanosecondType>(col)?,
        LogicalType::Bool8 => {
            let data = col.data();
            let values: BooleanArray = (0..col.size())
                .map(|i| col.is_valid(i).then(|| data[i] != 0))
                .collect();
            Arc::new(values)
        }
        LogicalType::String => {
            let values = (0..col.size())
                .map(|i| col.string_at(i))
                .collect::<Result<Vec<_>>>()?;
            Arc::new(StringArray::from(values))
        }
        other => bail!("No Arrow representation for {} columns", other),
    };
    Ok(array)
}

fn primitive<T: ArrowPrimitiveType>(col: &ColumnBuffer) -> Result<ArrayRef> {
    let values = ScalarBuffer::<T::Native>::new(Buffer::from_slice_ref(col.data()), 0, col.size());
    let nulls = col
        .null_mask()
        .map(|mask| NullBuffer::new(BooleanBuffer::new(Buffer::from_slice_ref(mask), 0, col.size())));
    let array = PrimitiveArray::<T>::try_new(values, nulls)
        .with_context(|| format!("Building Arrow array from {} column", col.dtype()))?;
    Ok(Arc::new(array))
}

/// Export columns as a `RecordBatch` with the given column names.
pub fn columns_to_record_batch(names: &[&str], columns: &[&ColumnBuffer]) -> Result<RecordBatch> {
    if names.len() != columns.len() {
        bail!("{} names given for {} columns", names.len(), columns.len());
    }

    let mut fields = Vec::with_capacity(columns.len());
    let mut arrays = Vec::with_capacity(columns.len());
    for (name, col) in names.iter().zip(columns) {
        let array = column_to_array(col).with_context(|| format!("Converting column '{}'", name))?;
        fields.push(Field::new(*name, array.data_type().clone(), col.nullable()));
        arrays.push(array);
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)
        .context("Building RecordBatch from device columns")
}

// ---------------------------------------------------------------------------
// Arrow → Device
// ---------------------------------------------------------------------------

/// Copy an Arrow array into a new device column.
pub fn array_to_column(mr: &SlabAllocator, array: &dyn Array) -> Result<ColumnBuffer> {
    let Some(dtype) = LogicalType::from_arrow(array.data_type()) else {
        bail!("Unsupported Arrow DataType for device columns: {:?}", array.data_type());
    };

    match dtype {
        LogicalType::Bool8 => {
            let Some(values) = array.as_any().downcast_ref::<BooleanArray>() else {
                bail!("Expected a BooleanArray");
            };
            ColumnBuffer::from_bools(mr, values.iter())
        }
        LogicalType::String => {
            let Some(values) = array.as_any().downcast_ref::<StringArray>() else {
                bail!("Expected a StringArray");
            };
            ColumnBuffer::from_strings(mr, values.iter())
        }
        LogicalType::Empty => {
            if !array.is_empty() {
                bail!("Null arrays with {} rows have no device layout", array.len());
            }
            ColumnBuffer::from_host_bytes(mr, LogicalType::Empty, &[])
        }
        _ => {
            let width = dtype.byte_width().unwrap_or(0);
            let data = array.to_data();
            let start = data.offset() * width;
            let end = start + data.len() * width;
            let bytes = &data.buffers()[0].as_slice()[start..end];

            let mut col = ColumnBuffer::from_host_bytes(mr, dtype, bytes)?;
            if array.null_count() > 0 {
                let mask = bitmask::pack((0..array.len()).map(|i| array.is_valid(i)));
                col.set_null_mask(mr.allocate_from_host(&mask)?, Some(array.null_count()))?;
            }
            Ok(col)
        }
    }
}

/// Import every column of a `RecordBatch`.
pub fn record_batch_to_columns(mr: &SlabAllocator, batch: &RecordBatch) -> Result<Vec<ColumnBuffer>> {
    batch
        .schema()
        .fields()
        .iter()
        .zip(batch.columns())
        .map(|(field, array)| {
            array_to_column(mr, array.as_ref())
                .with_context(|| format!("Converting column '{}'", field.name()))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_array::{Int32Array, TimestampMillisecondArray};

    fn mr() -> SlabAllocator {
        SlabAllocator::new(&[256, 4096], 8, 1 << 20).unwrap()
    }

    #[test]
    fn int32_with_nulls_round_trip() {
        let mr = mr();
        let source = Int32Array::from(vec![Some(1), None, Some(3)]);
        let col = array_to_column(&mr, &source).unwrap();
        assert_eq!(col.dtype(), LogicalType::Int32);
        assert_eq!(col.size(), 3);
        assert_eq!(col.null_count(), 1);

        let back = column_to_array(&col).unwrap();
        let back = back.as_any().downcast_ref::<Int32Array>().unwrap();
        assert_eq!(back, &source);
    }

    #[test]
    fn sliced_array_uses_its_offset() {
        let mr = mr();
        let source = Int32Array::from(vec![10, 20, 30, 40]);
        let sliced = source.slice(1, 2);
        let col = array_to_column(&mr, &sliced).unwrap();
        assert_eq!(col.size(), 2);
        assert_eq!(col.value_bytes(0).unwrap(), &20i32.to_le_bytes());
    }

    #[test]
    fn strings_and_bools() {
        let mr = mr();
        let strings = StringArray::from(vec![Some("a"), None, Some("ccc")]);
        let col = array_to_column(&mr, &strings).unwrap();
        assert_eq!(col.string_at(2).unwrap(), Some("ccc"));
        let back = column_to_array(&col).unwrap();
        assert_eq!(back.as_any().downcast_ref::<StringArray>().unwrap(), &strings);

        let bools = BooleanArray::from(vec![Some(true), Some(false), None]);
        let col = array_to_column(&mr, &bools).unwrap();
        assert_eq!(col.dtype(), LogicalType::Bool8);
        let back = column_to_array(&col).unwrap();
        assert_eq!(back.as_any().downcast_ref::<BooleanArray>().unwrap(), &bools);
    }

    #[test]
    fn timestamps_keep_their_unit() {
        let mr = mr();
        let ts = TimestampMillisecondArray::from(vec![1_700_000_000_000i64, 0]);
        let col = array_to_column(&mr, &ts).unwrap();
        assert_eq!(col.dtype(), LogicalType::TimestampMilliseconds);
        let back = column_to_array(&col).unwrap();
        assert_eq!(back.data_type(), ts.data_type());
    }

    #[test]
    fn record_batch_round_trip_metadata() {
        let mr = mr();
        let a = ColumnBuffer::from_strings(&mr, [Some("x"), Some("y")]).unwrap();
        let b = ColumnBuffer::from_bools(&mr, [Some(true), None]).unwrap();
        let batch = columns_to_record_batch(&["a", "b"], &[&a, &b]).unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert!(!batch.schema().field(0).is_nullable());
        assert!(batch.schema().field(1).is_nullable());

        let cols = record_batch_to_columns(&mr, &batch).unwrap();
        assert_eq!(cols.len(), 2);
        assert_eq!(cols[1].null_count(), 1);
    }

    #[test]
    fn unsupported_types_error() {
        let mr = mr();
        let col = ColumnBuffer::from_host_bytes(&mr, LogicalType::Decimal32, &[0u8; 4]).unwrap();
        assert!(column_to_array(&col).is_err());
    }
}
