//! Tables: equally sized columns filtered and exported together.

use arrow_array::RecordBatch;
use gpu_column::ColumnBuffer;
use std::sync::Arc;

use crate::column::Column;
use crate::context::EngineContext;
use crate::error::{BindingError, Result};

/// An ordered set of equally sized columns.
#[derive(Debug)]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let mut rows = None;
        for (i, col) in columns.iter().enumerate() {
            let size = col.size()?;
            match rows {
                None => rows = Some(size),
                Some(expected) if expected != size => {
                    return Err(BindingError::InvalidArgument(format!(
                        "column {} has {} rows, expected {}",
                        i, size, expected
                    )))
                }
                Some(_) => {}
            }
        }
        Ok(Self { columns })
    }

    pub fn num_rows(&self) -> Result<usize> {
        match self.columns.first() {
            Some(col) => col.size(),
            None => Ok(0),
        }
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    /// Import every column of an Arrow record batch.
    pub fn from_record_batch(ctx: &Arc<EngineContext>, batch: &RecordBatch) -> Result<Self> {
        let buffers = ctx.call("from_record_batch", |_, mr| {
            gpu_column::record_batch_to_columns(mr, batch)
        })?;
        Ok(Self::from_buffers(ctx, buffers))
    }

    /// Keep the rows where `mask` is true, across every column.
    pub fn apply_boolean_mask(&self, mask: &Column) -> Result<Table> {
        let buffers = self.buffers("apply_boolean_mask")?;
        let mask_buffer = mask.buffer("apply_boolean_mask")?;
        let rows = self.num_rows()?;
        if mask_buffer.size() != rows {
            return Err(BindingError::InvalidArgument(format!(
                "boolean mask has {} rows but the table has {}",
                mask_buffer.size(),
                rows
            )));
        }
        let ctx = mask.context();
        let out = ctx.call("apply_boolean_mask", |engine, mr| {
            engine.apply_boolean_mask(&buffers, mask_buffer, mr)
        })?;
        Ok(Self::from_buffers(ctx, out))
    }

    /// Export as an Arrow record batch with the given column names.
    pub fn to_record_batch(&self, names: &[&str]) -> Result<RecordBatch> {
        let buffers = self.buffers("to_record_batch")?;
        gpu_column::columns_to_record_batch(names, &buffers).map_err(BindingError::from_engine)
    }

    /// Release every column. Idempotent like [`Column::release`].
    pub fn release(&mut self) {
        for col in &mut self.columns {
            col.release();
        }
    }

    fn buffers(&self, op: &'static str) -> Result<Vec<&ColumnBuffer>> {
        self.columns.iter().map(|col| col.buffer(op)).collect()
    }

    fn from_buffers(ctx: &Arc<EngineContext>, buffers: Vec<ColumnBuffer>) -> Self {
        let columns = buffers
            .into_iter()
            .map(|buffer| Column::from_buffer(ctx.clone(), buffer))
            .collect();
        Self { columns }
    }
}
