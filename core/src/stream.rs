use std::io::Read;

use anyhow::{Context as _, Result, bail};

use crate::config::EngineOptions;
use crate::engine::{Input, TransformationEngine, Transformed};
use crate::error::Warning;

const READ_CHUNK: usize = 64 * 1024;

/// Feeds a byte stream to an engine chunk by chunk.
///
/// The traversal needs the whole buffer, so chunks are collected until
/// [`ChunkedTransform::finish`] runs the load and closes the session.
#[derive(Debug)]
pub struct ChunkedTransform {
    engine: TransformationEngine,
    buffer: Vec<u8>,
}

impl ChunkedTransform {
    /// Prepares `engine` eagerly so broken rules fail before any input is read.
    pub fn new(mut engine: TransformationEngine) -> Result<Self> {
        engine.prepare(true).context("failed to compile rules")?;
        Ok(Self {
            engine,
            buffer: Vec::new(),
        })
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drain `reader` into the buffer; returns the number of bytes read.
    pub fn read_from(&mut self, mut reader: impl Read) -> Result<usize> {
        let mut chunk = vec![0u8; READ_CHUNK];
        let mut total = 0;
        loop {
            let n = reader.read(&mut chunk).context("failed to read input")?;
            if n == 0 {
                return Ok(total);
            }
            self.push(&chunk[..n]);
            total += n;
        }
    }

    pub fn finish(mut self) -> Result<Transformed> {
        let bytes = std::mem::take(&mut self.buffer);
        let len = bytes.len();
        let out = self
            .engine
            .transform(Input::Bytes(bytes))
            .with_context(|| format!("failed to decode {} byte(s)", len))?;
        self.engine.end()?;
        enforce_counts(self.engine.options(), &out.warnings)?;
        Ok(out)
    }
}

/// Fail on the first warning when `strict_counts` is set.
pub fn enforce_counts(options: &EngineOptions, warnings: &[Warning]) -> Result<()> {
    if options.strict_counts
        && let Some(first) = warnings.first()
    {
        bail!("{} ({} warning(s) in strict mode)", first, warnings.len());
    }
    Ok(())
}
