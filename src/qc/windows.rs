//! Sliding set of open output chunks over one position-sorted stream.

use crate::core::io::{index_path_for, BgzfVcfWriter};
use crate::core::region::ChunkGrid;
use crate::qc::chunk::{ChunkBounds, ChunkStats, ChunkSummary};
use crate::qc::config::{OutputPaths, QcConfig};
use crate::vcf::Site;
use anyhow::{Context, Result};
use log::{debug, trace};
use std::collections::BTreeMap;

/// A chunk whose output file is still being written.
pub struct OpenChunk {
    pub bounds: ChunkBounds,
    pub stats: ChunkStats,
    writer: BgzfVcfWriter,
}

impl OpenChunk {
    /// Append the site's original line to the chunk VCF.
    pub fn write_site(&mut self, site: &Site) -> Result<()> {
        self.writer.write_record(
            &site.chromosome,
            site.position,
            site.reference.len(),
            site.raw_line(),
        )
    }
}

/// Open chunks keyed by chunk number, at most two at a time.
///
/// Each call to [`ChunkWindowManager::advance`] first closes every chunk
/// whose extended end lies behind the new position, then opens the chunk
/// holding the position and, once its overlap region is reached, the next.
pub struct ChunkWindowManager<'a> {
    label: String,
    config: &'a QcConfig,
    grid: ChunkGrid,
    header: Vec<u8>,
    num_samples: usize,
    paths: &'a OutputPaths,
    open: BTreeMap<u64, OpenChunk>,
}

impl<'a> ChunkWindowManager<'a> {
    pub fn new(
        label: &str,
        config: &'a QcConfig,
        header: &[u8],
        num_samples: usize,
        paths: &'a OutputPaths,
    ) -> Self {
        Self {
            label: label.to_string(),
            config,
            grid: ChunkGrid::new(config.chunk_size),
            header: header.to_vec(),
            num_samples,
            paths,
            open: BTreeMap::new(),
        }
    }

    /// Move the scan to `position`; returns the chunks closed on the way.
    pub fn advance(&mut self, position: u64) -> Result<Vec<ChunkSummary>> {
        let closed = self.close_passed(position)?;

        let number = self.grid.chunk_number(position);
        self.open_chunk(number)?;
        let next_start = self.grid.start(number + 1);
        if position >= next_start.saturating_sub(self.config.phasing_window) {
            self.open_chunk(number + 1)?;
        }

        Ok(closed)
    }

    /// Chunks currently accepting sites, in position order.
    pub fn open_chunks_mut(&mut self) -> impl Iterator<Item = &mut OpenChunk> {
        self.open.values_mut()
    }

    pub fn num_open(&self) -> usize {
        self.open.len()
    }

    /// Close every chunk left at the end of the stream.
    pub fn finish(mut self) -> Result<Vec<ChunkSummary>> {
        let mut closed = Vec::new();
        while let Some((_, chunk)) = self.open.pop_first() {
            if let Some(summary) = self.close(chunk)? {
                closed.push(summary);
            }
        }
        Ok(closed)
    }

    fn close_passed(&mut self, position: u64) -> Result<Vec<ChunkSummary>> {
        let window = self.config.phasing_window;
        let mut closed = Vec::new();
        while let Some(entry) = self.open.first_entry() {
            if !entry.get().bounds.is_passed(position, window) {
                break;
            }
            let chunk = entry.remove();
            if let Some(summary) = self.close(chunk)? {
                closed.push(summary);
            }
        }
        Ok(closed)
    }

    fn open_chunk(&mut self, number: u64) -> Result<()> {
        if self.open.contains_key(&number) {
            return Ok(());
        }
        let bounds = ChunkBounds {
            label: self.label.clone(),
            number,
            start: self.grid.start(number),
            end: self.grid.end(number),
        };
        let path = self.paths.chunk_vcf(&bounds.id());
        trace!("Opening {}", bounds.id());
        let writer = BgzfVcfWriter::create(&path, &self.header)?;
        self.open.insert(
            number,
            OpenChunk {
                bounds,
                stats: ChunkStats::new(self.num_samples),
                writer,
            },
        );
        Ok(())
    }

    /// Flush a chunk and apply the acceptance policy. Chunks that never saw a
    /// retained site in their core interval are removed and yield `None`.
    fn close(&self, chunk: OpenChunk) -> Result<Option<ChunkSummary>> {
        let OpenChunk {
            bounds,
            stats,
            writer,
        } = chunk;
        let vcf_path = writer.path().to_path_buf();

        if stats.last_pos < bounds.start {
            debug!("Discarding empty {}", bounds.id());
            writer.finish_unindexed()?;
            std::fs::remove_file(&vcf_path)
                .with_context(|| format!("Failed to remove {}", vcf_path.display()))?;
            return Ok(None);
        }

        writer
            .finish()
            .with_context(|| format!("Failed to close {}", bounds.id()))?;
        let verdict = stats.evaluate(self.config);
        Ok(Some(ChunkSummary {
            index_path: index_path_for(&vcf_path),
            vcf_path,
            bounds,
            stats,
            verdict,
        }))
    }
}
