//! A typed, owned device column.

use anyhow::{bail, Result};
use gpu_memory_manager::{DeviceBuffer, SlabAllocator};
use std::cell::Cell;
use std::fmt;
use thiserror::Error;
use tracing::debug;

use crate::bitmask;
use crate::logical_type::LogicalType;

/// Index of the offsets child of a string column.
pub const OFFSETS_CHILD: usize = 0;
/// Index of the characters child of a string column.
pub const CHARS_CHILD: usize = 1;

/// A caller broke a column contract (bad length, bad type, out of range).
///
/// Raised through `anyhow` so callers can tell contract violations apart from
/// engine failures with `downcast_ref`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct InvalidArgument(pub String);

macro_rules! invalid {
    ($($arg:tt)*) => {
        ::anyhow::bail!($crate::column_buffer::InvalidArgument(format!($($arg)*)))
    };
}

/// One contiguous typed sequence of values plus an optional validity mask.
///
/// Fixed-width columns keep their values in `data`. String columns keep an
/// empty `data` buffer and two children: `int32` offsets (`size + 1` entries)
/// and `int8` characters.
pub struct ColumnBuffer {
    dtype: LogicalType,
    size: usize,
    data: DeviceBuffer,
    null_mask: Option<DeviceBuffer>,
    /// `None` means unknown: recomputed from the mask on the next read.
    null_count: Cell<Option<usize>>,
    children: Vec<ColumnBuffer>,
}

/// The buffers of a released column.
#[derive(Debug)]
pub struct ColumnContents {
    pub data: DeviceBuffer,
    pub null_mask: Option<DeviceBuffer>,
    pub children: Vec<ColumnBuffer>,
}

impl ColumnBuffer {
    /// Wrap an existing fixed-width data buffer.
    pub fn new_fixed_width(
        dtype: LogicalType,
        size: usize,
        data: DeviceBuffer,
        null_mask: Option<DeviceBuffer>,
        null_count: Option<usize>,
    ) -> Result<Self> {
        let Some(width) = dtype.byte_width() else {
            invalid!("{} is not a fixed-width type", dtype);
        };
        if data.len() != size * width {
            invalid!(
                "ColumnBuffer size mismatch: expected {} bytes for {} rows of {}, got {}",
                size * width,
                size,
                dtype,
                data.len()
            );
        }
        let mut column = Self {
            dtype,
            size,
            data,
            null_mask: None,
            null_count: Cell::new(Some(0)),
            children: Vec::new(),
        };
        if let Some(mask) = null_mask {
            column.set_null_mask(mask, null_count)?;
        }
        Ok(column)
    }

    /// Build a column from raw host bytes.
    ///
    /// Fixed-width types take `bytes.len() / width` rows. A `string` column
    /// becomes a single row holding all of `bytes`. `empty` accepts only an
    /// empty slice.
    pub fn from_host_bytes(mr: &SlabAllocator, dtype: LogicalType, bytes: &[u8]) -> Result<Self> {
        match dtype {
            LogicalType::String => {
                let len = i32::try_from(bytes.len()).map_err(|_| {
                    InvalidArgument(format!("string data of {} bytes is too large", bytes.len()))
                })?;
                Self::new_strings(mr, &[0, len], bytes, None)
            }
            LogicalType::Empty => {
                if !bytes.is_empty() {
                    invalid!("an empty column cannot hold {} bytes", bytes.len());
                }
                Self::new_fixed_width(dtype, 0, mr.allocate(0)?, None, None)
            }
            LogicalType::Dictionary32 | LogicalType::List => {
                invalid!("{} columns cannot be built from raw bytes", dtype)
            }
            _ => {
                let width = dtype.byte_width().unwrap_or(1);
                if bytes.len() % width != 0 {
                    invalid!(
                        "{} bytes is not a whole number of {} elements ({} bytes each)",
                        bytes.len(),
                        dtype,
                        width
                    );
                }
                let data = mr.allocate_from_host(bytes)?;
                Self::new_fixed_width(dtype, bytes.len() / width, data, None, None)
            }
        }
    }

    /// Build a string column from host offsets and characters.
    pub fn new_strings(
        mr: &SlabAllocator,
        offsets: &[i32],
        chars: &[u8],
        null_mask: Option<&[u8]>,
    ) -> Result<Self> {
        let Some((&first, rest)) = offsets.split_first() else {
            invalid!("string offsets must hold at least one entry");
        };
        if first != 0 {
            invalid!("string offsets must start at 0, got {}", first);
        }
        let mut prev = first;
        for &offset in rest {
            if offset < prev {
                invalid!("string offsets must be non-decreasing ({} after {})", offset, prev);
            }
            prev = offset;
        }
        if prev as usize != chars.len() {
            invalid!(
                "last string offset {} does not match {} character bytes",
                prev,
                chars.len()
            );
        }

        let size = offsets.len() - 1;
        let offset_bytes: Vec<u8> = offsets.iter().flat_map(|o| o.to_le_bytes()).collect();
        let offsets_child = Self::new_fixed_width(
            LogicalType::Int32,
            offsets.len(),
            mr.allocate_from_host(&offset_bytes)?,
            None,
            None,
        )?;
        let chars_child = Self::new_fixed_width(
            LogicalType::Int8,
            chars.len(),
            mr.allocate_from_host(chars)?,
            None,
            None,
        )?;

        let mut column = Self {
            dtype: LogicalType::String,
            size,
            data: mr.allocate(0)?,
            null_mask: None,
            null_count: Cell::new(Some(0)),
            children: vec![offsets_child, chars_child],
        };
        if let Some(mask) = null_mask {
            column.set_null_mask(mr.allocate_from_host(mask)?, None)?;
        }
        Ok(column)
    }

    /// Build a string column from optional host strings.
    pub fn from_strings<'a, I>(mr: &SlabAllocator, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        let mut offsets = vec![0i32];
        let mut chars = Vec::new();
        let mut validity = Vec::new();
        for value in values {
            if let Some(s) = value {
                chars.extend_from_slice(s.as_bytes());
            }
            let end = i32::try_from(chars.len())
                .map_err(|_| InvalidArgument("string data exceeds 2 GiB".to_string()))?;
            offsets.push(end);
            validity.push(value.is_some());
        }
        let mask = validity
            .iter()
            .any(|valid| !valid)
            .then(|| bitmask::pack(validity.iter().copied()));
        Self::new_strings(mr, &offsets, &chars, mask.as_deref())
    }

    /// Build a `bool8` column from optional host booleans.
    pub fn from_bools<I>(mr: &SlabAllocator, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = Option<bool>>,
    {
        let values: Vec<Option<bool>> = values.into_iter().collect();
        let bytes: Vec<u8> = values.iter().map(|v| u8::from(v.unwrap_or(false))).collect();
        let data = mr.allocate_from_host(&bytes)?;
        let mask = if values.iter().any(Option::is_none) {
            Some(mr.allocate_from_host(&bitmask::pack(values.iter().map(Option::is_some)))?)
        } else {
            None
        };
        Self::new_fixed_width(LogicalType::Bool8, values.len(), data, mask, None)
    }

    pub fn dtype(&self) -> LogicalType {
        self.dtype
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Raw bytes of the data buffer.
    pub fn data(&self) -> &[u8] {
        self.data.as_slice()
    }

    pub fn null_mask(&self) -> Option<&[u8]> {
        self.null_mask.as_ref().map(DeviceBuffer::as_slice)
    }

    pub fn nullable(&self) -> bool {
        self.null_mask.is_some()
    }

    pub fn children(&self) -> &[ColumnBuffer] {
        &self.children
    }

    pub fn child(&self, index: usize) -> Option<&ColumnBuffer> {
        self.children.get(index)
    }

    /// The allocator that owns this column's data buffer.
    pub fn allocator(&self) -> SlabAllocator {
        self.data.allocator()
    }

    /// Null count, recomputed from the mask and cached when unknown.
    pub fn null_count(&self) -> usize {
        if let Some(count) = self.null_count.get() {
            return count;
        }
        let count = match &self.null_mask {
            Some(mask) => bitmask::count_unset_bits(mask.as_slice(), self.size),
            None => 0,
        };
        self.null_count.set(Some(count));
        count
    }

    pub fn has_nulls(&self) -> bool {
        self.null_count() > 0
    }

    /// Override the cached null count without looking at the mask.
    pub fn set_null_count(&mut self, null_count: usize) -> Result<()> {
        if null_count > self.size {
            invalid!(
                "null count {} is out of range for a column of {} rows",
                null_count,
                self.size
            );
        }
        self.null_count.set(Some(null_count));
        Ok(())
    }

    /// Forget the cached null count; the next read recomputes it.
    pub fn invalidate_null_count(&self) {
        self.null_count.set(None);
    }

    /// Attach a validity mask. With `null_count == None` the count is
    /// recomputed lazily.
    pub fn set_null_mask(&mut self, mask: DeviceBuffer, null_count: Option<usize>) -> Result<()> {
        let needed = bitmask::bitmask_bytes(self.size);
        if mask.len() < needed {
            invalid!(
                "null mask of {} bytes is too small for {} rows ({} bytes needed)",
                mask.len(),
                self.size,
                needed
            );
        }
        if let Some(count) = null_count {
            if count > self.size {
                invalid!(
                    "null count {} is out of range for a column of {} rows",
                    count,
                    self.size
                );
            }
        }
        debug!(
            "attaching {} byte null mask to {} column of {} rows",
            mask.len(),
            self.dtype,
            self.size
        );
        self.null_mask = Some(mask);
        match null_count {
            Some(count) => self.null_count.set(Some(count)),
            None => self.invalidate_null_count(),
        }
        Ok(())
    }

    /// Whether row `index` holds a value.
    pub fn is_valid(&self, index: usize) -> bool {
        match &self.null_mask {
            Some(mask) => bitmask::get_bit(mask.as_slice(), index),
            None => true,
        }
    }

    /// Little-endian bytes of fixed-width row `index`.
    pub fn value_bytes(&self, index: usize) -> Result<&[u8]> {
        let Some(width) = self.dtype.byte_width().filter(|&w| w > 0) else {
            invalid!("{} columns have no fixed-width values", self.dtype);
        };
        if index >= self.size {
            invalid!("index {} is out of bounds for {} rows", index, self.size);
        }
        Ok(&self.data.as_slice()[index * width..(index + 1) * width])
    }

    /// Character bytes of a string column, all rows concatenated.
    pub fn chars(&self) -> Result<&[u8]> {
        self.expect_strings()?;
        Ok(self.children[CHARS_CHILD].data())
    }

    /// Byte offset of string row boundary `index` (`0..=size`).
    pub fn offset_at(&self, index: usize) -> Result<usize> {
        self.expect_strings()?;
        let bytes = self.children[OFFSETS_CHILD].value_bytes(index)?;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(bytes);
        Ok(i32::from_le_bytes(raw) as usize)
    }

    /// Raw bytes of string row `index`.
    pub fn string_bytes(&self, index: usize) -> Result<&[u8]> {
        if index >= self.size {
            invalid!("index {} is out of bounds for {} rows", index, self.size);
        }
        let start = self.offset_at(index)?;
        let end = self.offset_at(index + 1)?;
        Ok(&self.chars()?[start..end])
    }

    /// String row `index`, or `None` when the row is null.
    pub fn string_at(&self, index: usize) -> Result<Option<&str>> {
        let bytes = self.string_bytes(index)?;
        if !self.is_valid(index) {
            return Ok(None);
        }
        match std::str::from_utf8(bytes) {
            Ok(s) => Ok(Some(s)),
            Err(e) => bail!("string row {} is not valid UTF-8: {}", index, e),
        }
    }

    /// Deep copy into fresh buffers from the same allocator.
    pub fn try_clone(&self) -> Result<Self> {
        let null_mask = match &self.null_mask {
            Some(mask) => Some(mask.try_clone()?),
            None => None,
        };
        let children = self
            .children
            .iter()
            .map(ColumnBuffer::try_clone)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            dtype: self.dtype,
            size: self.size,
            data: self.data.try_clone()?,
            null_mask,
            null_count: Cell::new(self.null_count.get()),
            children,
        })
    }

    /// Total bytes held by this column and its children.
    pub fn memory_size(&self) -> usize {
        self.data.len()
            + self.null_mask.as_ref().map_or(0, DeviceBuffer::len)
            + self.children.iter().map(ColumnBuffer::memory_size).sum::<usize>()
    }

    /// Give up ownership of the underlying buffers.
    pub fn release(self) -> ColumnContents {
        debug!(
            "releasing {} column buffers ({} bytes)",
            self.dtype,
            self.memory_size()
        );
        ColumnContents {
            data: self.data,
            null_mask: self.null_mask,
            children: self.children,
        }
    }

    fn expect_strings(&self) -> Result<()> {
        if self.dtype != LogicalType::String {
            invalid!("expected a string column, got {}", self.dtype);
        }
        Ok(())
    }
}

impl fmt::Debug for ColumnBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnBuffer")
            .field("dtype", &self.dtype)
            .field("size", &self.size)
            .field("null_count", &self.null_count.get())
            .field("nullable", &self.nullable())
            .field("children", &self.children.len())
            .finish()
    }
}
