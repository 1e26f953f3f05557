//! Delimiter splitting of in-memory strings and text files.

use gpu_column::LogicalType;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::column::Column;
use crate::context::EngineContext;
use crate::error::{BindingError, Result};

impl Column {
    /// Split this string column's character data on `delimiter`.
    ///
    /// The characters of every row are treated as one contiguous text. The
    /// result is a new string column with one row per field, delimiters
    /// removed and empty fields kept.
    pub fn split(&self, delimiter: &str) -> Result<Column> {
        let buffer = self.buffer("split")?;
        if buffer.dtype() != LogicalType::String {
            return Err(BindingError::InvalidArgument(format!(
                "split expects a string column, got {}",
                buffer.dtype()
            )));
        }
        let ctx = self.context();
        let out = ctx.call("split", |engine, mr| engine.split_column(buffer, delimiter, mr))?;
        Ok(Column::from_buffer(ctx.clone(), out))
    }
}

/// Read `path` and split its contents on `delimiter`.
pub fn read_text(ctx: &Arc<EngineContext>, path: &Path, delimiter: &str) -> Result<Column> {
    let out = ctx.call("read_text", |engine, mr| engine.read_text(path, delimiter, mr))?;
    info!("read {} rows from {}", out.size(), path.display());
    Ok(Column::from_buffer(ctx.clone(), out))
}
