//! Stream compaction: keep the rows selected by a boolean mask.

use anyhow::{bail, Context, Result};
use gpu_column::bitmask;
use gpu_column::{ColumnBuffer, InvalidArgument, LogicalType};
use gpu_memory_manager::SlabAllocator;
use tracing::debug;

/// Filter every column of a table by `boolean_mask`.
///
/// A row survives when the mask is valid and true there; null mask entries
/// drop the row. Surviving rows keep their relative order.
pub fn apply_boolean_mask(
    columns: &[&ColumnBuffer],
    boolean_mask: &ColumnBuffer,
    mr: &SlabAllocator,
) -> Result<Vec<ColumnBuffer>> {
    if boolean_mask.dtype() != LogicalType::Bool8 {
        bail!(InvalidArgument(format!(
            "apply_boolean_mask expects a bool8 mask, got {}",
            boolean_mask.dtype()
        )));
    }
    for (idx, col) in columns.iter().enumerate() {
        if col.size() != boolean_mask.size() {
            bail!(InvalidArgument(format!(
                "mask has {} rows but column {} has {}",
                boolean_mask.size(),
                idx,
                col.size()
            )));
        }
    }

    let flags = boolean_mask.data();
    let keep: Vec<usize> = (0..boolean_mask.size())
        .filter(|&i| boolean_mask.is_valid(i) && flags[i] != 0)
        .collect();
    debug!(
        "apply_boolean_mask keeps {} of {} rows across {} columns",
        keep.len(),
        boolean_mask.size(),
        columns.len()
    );

    columns
        .iter()
        .enumerate()
        .map(|(idx, col)| gather(col, &keep, mr).with_context(|| format!("Compacting column {}", idx)))
        .collect()
}

/// Build a new column from the rows of `col` at `indices`, in that order.
pub fn gather(col: &ColumnBuffer, indices: &[usize], mr: &SlabAllocator) -> Result<ColumnBuffer> {
    if let Some(&bad) = indices.iter().find(|&&i| i >= col.size()) {
        bail!(InvalidArgument(format!(
            "gather index {} is out of bounds for {} rows",
            bad,
            col.size()
        )));
    }

    let validity = col
        .nullable()
        .then(|| bitmask::pack(indices.iter().map(|&i| col.is_valid(i))));

    match col.dtype() {
        LogicalType::String => {
            let mut offsets = Vec::with_capacity(indices.len() + 1);
            let mut chars = Vec::new();
            offsets.push(0i32);
            for &i in indices {
                chars.extend_from_slice(col.string_bytes(i)?);
                let Ok(end) = i32::try_from(chars.len()) else {
                    bail!("gather: output exceeds the 2 GiB string column limit");
                };
                offsets.push(end);
            }
            ColumnBuffer::new_strings(mr, &offsets, &chars, validity.as_deref())
        }
        dtype if dtype.byte_width().is_some() => {
            let mut bytes = Vec::with_capacity(indices.len() * dtype.byte_width().unwrap_or(0));
            for &i in indices {
                bytes.extend_from_slice(col.value_bytes(i)?);
            }
            let mut out = ColumnBuffer::from_host_bytes(mr, dtype, &bytes)?;
            if let Some(mask) = validity {
                out.set_null_mask(mr.allocate_from_host(&mask)?, None)?;
            }
            Ok(out)
        }
        other => bail!("gather is not implemented for {} columns", other),
    }
}
