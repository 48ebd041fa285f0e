//! Bidirectional byte archive.
//!
//! One `Archive` either reads an input buffer (load) or appends to an output
//! buffer (save). Every primitive has the same signature in both directions:
//! it takes the document slot holding the decoded value, fills it on load and
//! reads it on save. Callers only ask [`Archive::is_loading`] when they must.

mod codec;

use serde_json::Value;

use crate::error::{ErrorKind, Result, TransformError};

use codec::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Load,
    Save,
}

#[derive(Debug, Clone)]
struct Region {
    /// Offset of the `i32` length field.
    slot: usize,
    /// Declared length read on load.
    declared: Option<usize>,
    /// Counter value when the region opened (after an optional reset).
    start: usize,
    /// Outer counter saved when the region reset the counter.
    saved: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct Archive {
    direction: Direction,
    buf: Vec<u8>,
    pos: usize,
    counter: usize,
    regions: Vec<Region>,
}

impl Archive {
    pub fn loading(bytes: Vec<u8>) -> Self {
        Self {
            direction: Direction::Load,
            buf: bytes,
            pos: 0,
            counter: 0,
            regions: Vec::new(),
        }
    }

    pub fn saving() -> Self {
        Self {
            direction: Direction::Save,
            buf: Vec::new(),
            pos: 0,
            counter: 0,
            regions: Vec::new(),
        }
    }

    #[inline]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    #[inline]
    pub fn is_loading(&self) -> bool {
        self.direction == Direction::Load
    }

    /// Current offset: bytes consumed on load, bytes produced on save.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Unconsumed input on load; always zero on save.
    #[inline]
    pub fn remaining(&self) -> usize {
        match self.direction {
            Direction::Load => self.buf.len().saturating_sub(self.pos),
            Direction::Save => 0,
        }
    }

    /// Bytes counted since the innermost resetting region began.
    #[inline]
    pub fn bytes_counted(&self) -> usize {
        self.counter
    }

    #[inline]
    pub fn region_depth(&self) -> usize {
        self.regions.len()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Run one primitive; its width counts toward the open region only when `counted`.
    pub fn counted<T>(&mut self, counted: bool, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let before = self.pos;
        let out = op(self)?;
        if counted {
            self.counter += self.pos - before;
        }
        Ok(out)
    }

    fn fail(&self, kind: ErrorKind) -> TransformError {
        TransformError::at_offset(kind, self.pos)
    }

    fn read_with<T>(&mut self, read: impl FnOnce(&[u8], &mut usize) -> std::result::Result<T, ErrorKind>) -> Result<T> {
        let mut cursor = self.pos;
        let value = read(&self.buf, &mut cursor).map_err(|kind| self.fail(kind))?;
        self.pos = cursor;
        Ok(value)
    }

    fn write_with(&mut self, write: impl FnOnce(&mut Vec<u8>) -> std::result::Result<(), ErrorKind>) -> Result<()> {
        let offset = self.pos;
        write(&mut self.buf).map_err(|kind| TransformError::at_offset(kind, offset))?;
        self.pos = self.buf.len();
        Ok(())
    }

    pub fn int32(&mut self, slot: &mut Value) -> Result<()> {
        match self.direction {
            Direction::Load => {
                *slot = Value::from(self.read_with(read_i32)?);
                Ok(())
            }
            Direction::Save => {
                let wide = value_to_i64(slot, "i32").map_err(|kind| self.fail(kind))?;
                let narrow = i32::try_from(wide).map_err(|_| self.fail(overflow("i32", wide)))?;
                self.write_with(|out| {
                    write_i32(out, narrow);
                    Ok(())
                })
            }
        }
    }

    pub fn int64(&mut self, slot: &mut Value) -> Result<()> {
        match self.direction {
            Direction::Load => {
                *slot = Value::from(self.read_with(read_i64)?);
                Ok(())
            }
            Direction::Save => {
                let wide = value_to_i64(slot, "i64").map_err(|kind| self.fail(kind))?;
                self.write_with(|out| {
                    write_i64(out, wide);
                    Ok(())
                })
            }
        }
    }

    pub fn byte(&mut self, slot: &mut Value) -> Result<()> {
        match self.direction {
            Direction::Load => {
                *slot = Value::from(self.read_with(read_u8)?);
                Ok(())
            }
            Direction::Save => {
                let wide = value_to_i64(slot, "u8").map_err(|kind| self.fail(kind))?;
                let narrow = u8::try_from(wide).map_err(|_| self.fail(overflow("u8", wide)))?;
                self.write_with(|out| {
                    out.push(narrow);
                    Ok(())
                })
            }
        }
    }

    pub fn float32(&mut self, slot: &mut Value) -> Result<()> {
        match self.direction {
            Direction::Load => {
                *slot = f32_to_value(self.read_with(read_f32)?);
                Ok(())
            }
            Direction::Save => {
                let value = value_to_f32(slot).map_err(|kind| self.fail(kind))?;
                self.write_with(|out| {
                    write_f32(out, value);
                    Ok(())
                })
            }
        }
    }

    pub fn string(&mut self, slot: &mut Value) -> Result<()> {
        match self.direction {
            Direction::Load => {
                *slot = Value::String(self.read_with(read_string)?);
                Ok(())
            }
            Direction::Save => {
                let text = value_to_str(slot).map_err(|kind| self.fail(kind))?;
                let mut scratch = Vec::new();
                write_string(&mut scratch, text).map_err(|kind| self.fail(kind))?;
                self.write_with(|out| {
                    out.extend_from_slice(&scratch);
                    Ok(())
                })
            }
        }
    }

    /// Exactly `width` raw bytes, represented as lowercase hex text.
    pub fn fixed_hex(&mut self, width: usize, slot: &mut Value) -> Result<()> {
        match self.direction {
            Direction::Load => {
                let raw = self.read_with(|bytes, cursor| take(bytes, cursor, width).map(hex::encode))?;
                *slot = Value::String(raw);
                Ok(())
            }
            Direction::Save => {
                let raw = hex_to_bytes(slot).map_err(|kind| self.fail(kind))?;
                if raw.len() != width {
                    return Err(self.fail(overflow(format!("hex[{}]", width), format!("{} bytes", raw.len()))));
                }
                self.write_with(|out| {
                    out.extend_from_slice(&raw);
                    Ok(())
                })
            }
        }
    }

    /// Raw bytes whose length is only known at run time. Save writes the
    /// slot's bytes verbatim whatever `len` says.
    pub fn variable_hex(&mut self, len: usize, slot: &mut Value) -> Result<()> {
        match self.direction {
            Direction::Load => {
                let raw = self.read_with(|bytes, cursor| take(bytes, cursor, len).map(hex::encode))?;
                *slot = Value::String(raw);
                Ok(())
            }
            Direction::Save => {
                let raw = hex_to_bytes(slot).map_err(|kind| self.fail(kind))?;
                self.write_with(|out| {
                    out.extend_from_slice(&raw);
                    Ok(())
                })
            }
        }
    }

    /// Open a length-tracked region. The `i32` length field itself counts
    /// toward the enclosing region. On load `length` receives the declared
    /// length; on save four bytes are reserved and backfilled by `end_region`.
    pub fn begin_region(&mut self, length: &mut Value, reset: bool) -> Result<()> {
        let declared = match self.direction {
            Direction::Load => {
                let offset = self.pos;
                let raw = self.counted(true, |ar| ar.read_with(read_i32))?;
                let declared = usize::try_from(raw).map_err(|_| {
                    TransformError::at_offset(
                        ErrorKind::StructuralMismatch(format!("negative region length {}", raw)),
                        offset,
                    )
                })?;
                *length = Value::from(raw);
                Some(declared)
            }
            Direction::Save => {
                self.counted(true, |ar| {
                    ar.write_with(|out| {
                        write_i32(out, 0);
                        Ok(())
                    })
                })?;
                None
            }
        };
        let saved = reset.then(|| std::mem::replace(&mut self.counter, 0));
        self.regions.push(Region {
            slot: self.pos - 4,
            declared,
            start: self.counter,
            saved,
        });
        Ok(())
    }

    /// Close the innermost region and return its measured length. Save
    /// backfills the reserved slot; load checks the declared length.
    pub fn end_region(&mut self) -> Result<usize> {
        let region = self
            .regions
            .pop()
            .ok_or_else(|| self.fail(ErrorKind::StructuralMismatch("buffer end without buffer start".into())))?;
        let measured = self.counter - region.start;
        self.close(&region);
        match self.direction {
            Direction::Load => {
                if let Some(declared) = region.declared
                    && declared != measured
                {
                    return Err(self.fail(ErrorKind::StructuralMismatch(format!(
                        "region declared {} bytes but {} were read",
                        declared, measured
                    ))));
                }
            }
            Direction::Save => {
                let len = i32::try_from(measured).map_err(|_| self.fail(overflow("i32", measured)))?;
                self.buf[region.slot..region.slot + 4].copy_from_slice(&len.to_le_bytes());
            }
        }
        Ok(measured)
    }

    /// Drop regions opened past `depth` without reconciling them. Used when a
    /// `Break` leaves a loop iteration mid-region.
    pub fn abandon_regions(&mut self, depth: usize) {
        while self.regions.len() > depth {
            if let Some(region) = self.regions.pop() {
                self.close(&region);
            }
        }
    }

    /// Hand the counter back to the enclosing region. Everything the closed
    /// region spans counts there, including its own uncounted bytes.
    fn close(&mut self, region: &Region) {
        let base = region.saved.unwrap_or(region.start);
        self.counter = base + (self.pos - (region.slot + 4));
    }

    /// Whether a load has used up the innermost declared region, or the
    /// whole input when no region is open.
    pub fn region_exhausted(&self) -> bool {
        if !self.is_loading() {
            return false;
        }
        if self.remaining() == 0 {
            return true;
        }
        match self.regions.last() {
            Some(Region {
                declared: Some(declared),
                start,
                ..
            }) => self.counter - start >= *declared,
            _ => false,
        }
    }
}
