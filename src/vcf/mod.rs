pub mod decoder;

use crate::core::error::FormatError;
use crate::core::io::open_read_maybe_gz;
use anyhow::{Context, Result};
use bstr::ByteSlice;
use indexmap::IndexSet;
use std::io::BufRead;
use std::path::{Path, PathBuf};

pub use decoder::{Call, LineDecoder, SampleGenotype, Site};

/// Header of a VCF: the raw `#` lines plus the sample names of `#CHROM`.
#[derive(Debug, Clone, Default)]
pub struct VcfHeader {
    raw: Vec<u8>,
    samples: IndexSet<String>,
}

impl VcfHeader {
    /// Header bytes as read, each line terminated by `\n`.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn samples(&self) -> &IndexSet<String> {
        &self.samples
    }

    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    fn parse_sample_line(&mut self, line: &[u8]) -> Result<(), FormatError> {
        for name in line.split_str("\t").skip(9) {
            let name = name.to_str().map_err(|_| FormatError::Encoding)?;
            if !self.samples.insert(name.to_string()) {
                return Err(FormatError::DuplicateSample(name.to_string()));
            }
        }
        Ok(())
    }
}

/// Line-oriented VCF reader over a plain or gzip-compressed file.
///
/// Data lines are handed out as byte slices borrowed from an internal
/// buffer that is refilled on every call.
pub struct VcfReader {
    inner: Box<dyn BufRead + Send>,
    header: VcfHeader,
    path: PathBuf,
    buf: Vec<u8>,
    pending: bool,
    line_number: u64,
}

impl VcfReader {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let inner = open_read_maybe_gz(&path)?;
        let mut reader = Self {
            inner,
            header: VcfHeader::default(),
            path,
            buf: Vec::new(),
            pending: false,
            line_number: 0,
        };
        reader
            .read_header()
            .with_context(|| format!("Failed to read VCF header: {}", reader.path.display()))?;
        Ok(reader)
    }

    fn read_header(&mut self) -> Result<()> {
        let mut seen_samples_line = false;
        while self.fill_line()? {
            if !self.buf.starts_with(b"#") {
                if !seen_samples_line {
                    return Err(FormatError::MissingHeader.into());
                }
                self.pending = true;
                return Ok(());
            }
            if self.buf.starts_with(b"#CHROM") {
                self.header.parse_sample_line(&self.buf)?;
                seen_samples_line = true;
            }
            self.header.raw.extend_from_slice(&self.buf);
            self.header.raw.push(b'\n');
        }
        if !seen_samples_line {
            return Err(FormatError::MissingHeader.into());
        }
        Ok(())
    }

    /// Read the next non-empty line into `buf`, stripping the line terminator.
    fn fill_line(&mut self) -> Result<bool> {
        loop {
            self.buf.clear();
            let n = self.inner.read_until(b'\n', &mut self.buf)?;
            if n == 0 {
                return Ok(false);
            }
            self.line_number += 1;
            while matches!(self.buf.last(), Some(b'\n' | b'\r')) {
                self.buf.pop();
            }
            if !self.buf.is_empty() {
                return Ok(true);
            }
        }
    }

    pub fn header(&self) -> &VcfHeader {
        &self.header
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 1-based number of the line most recently returned.
    pub fn line_number(&self) -> u64 {
        self.line_number
    }

    /// Chromosome of the first data line, without consuming it.
    pub fn first_chromosome(&self) -> Option<String> {
        if !self.pending {
            return None;
        }
        self.buf
            .split_str("\t")
            .next()
            .and_then(|chrom| chrom.to_str().ok())
            .map(str::to_string)
    }

    /// Next data line without its terminator, or `None` at end of file.
    pub fn read_line(&mut self) -> Result<Option<&[u8]>> {
        if self.pending {
            self.pending = false;
            return Ok(Some(&self.buf));
        }
        if self.fill_line()? {
            Ok(Some(&self.buf))
        } else {
            Ok(None)
        }
    }
}
