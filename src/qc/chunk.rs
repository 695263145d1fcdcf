//! Chunk bounds, running counters and the acceptance policy.

use crate::qc::config::QcConfig;
use crate::vcf::Site;
use std::fmt;

/// Core interval of one chunk on one region label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkBounds {
    pub label: String,
    pub number: u64,
    pub start: u64,
    pub end: u64,
}

impl ChunkBounds {
    /// `chunk_<label>_<start>_<end>`
    pub fn id(&self) -> String {
        format!("chunk_{}_{}_{}", self.label, self.start, self.end)
    }

    /// Position lies in `[start, end]`.
    pub fn contains_core(&self, position: u64) -> bool {
        position >= self.start && position <= self.end
    }

    /// Position lies in `[start - window, end + window]`.
    pub fn contains_extended(&self, position: u64, window: u64) -> bool {
        position >= self.start.saturating_sub(window) && position <= self.end + window
    }

    /// The scan has moved past this chunk's extended end.
    pub fn is_passed(&self, position: u64, window: u64) -> bool {
        self.end + window < position
    }
}

/// Counters of one open chunk, covering its core interval only.
#[derive(Debug, Clone, Default)]
pub struct ChunkStats {
    pub overall_snps: usize,
    pub found_in_legend: usize,
    pub not_found_in_legend: usize,
    pub valid_snps: usize,
    /// Called-genotype count per sample over `overall_snps`.
    pub snps_per_sample: Vec<usize>,
    /// Last unfiltered position seen, for duplicate detection.
    pub last_pos: u64,
}

impl ChunkStats {
    pub fn new(num_samples: usize) -> Self {
        Self {
            snps_per_sample: vec![0; num_samples],
            ..Default::default()
        }
    }

    /// Count an accepted in-core site.
    pub fn add_accepted(&mut self, site: &Site, in_legend: bool) {
        self.overall_snps += 1;
        if in_legend {
            self.valid_snps += 1;
        }
        for idx in site.called.iter_ones() {
            if let Some(count) = self.snps_per_sample.get_mut(idx) {
                *count += 1;
            }
        }
    }

    /// Fraction of legend lookups that were found.
    pub fn overlap(&self) -> f64 {
        let total = self.found_in_legend + self.not_found_in_legend;
        if total == 0 {
            0.0
        } else {
            self.found_in_legend as f64 / total as f64
        }
    }

    /// Samples whose call rate over this chunk falls below `threshold`.
    pub fn low_call_rate_samples(&self, threshold: f64) -> usize {
        if self.overall_snps == 0 {
            return 0;
        }
        let overall = self.overall_snps as f64;
        self.snps_per_sample
            .iter()
            .filter(|&&called| (called as f64 / overall) < threshold)
            .count()
    }

    /// Apply the acceptance policy. Reasons are checked in priority order and
    /// the first failing one is reported.
    pub fn evaluate(&self, config: &QcConfig) -> ChunkVerdict {
        let low_call_rate_samples = self.low_call_rate_samples(config.sample_call_rate);

        let rejection = if self.overlap() < config.reference_overlap {
            Some(ChunkRejection::LowReferenceOverlap)
        } else if self.found_in_legend < config.min_snps || self.valid_snps < config.min_snps {
            Some(ChunkRejection::TooFewSnps)
        } else if low_call_rate_samples > 0 {
            Some(ChunkRejection::LowSampleCallRate)
        } else {
            None
        };

        ChunkVerdict {
            rejection,
            overlap: self.overlap(),
            low_call_rate_samples,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChunkRejection {
    LowReferenceOverlap,
    TooFewSnps,
    LowSampleCallRate,
}

impl fmt::Display for ChunkRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChunkRejection::LowReferenceOverlap => "low reference overlap",
            ChunkRejection::TooFewSnps => "too few SNPs",
            ChunkRejection::LowSampleCallRate => "low sample call rate",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChunkVerdict {
    pub rejection: Option<ChunkRejection>,
    pub overlap: f64,
    pub low_call_rate_samples: usize,
}

impl ChunkVerdict {
    pub fn is_accepted(&self) -> bool {
        self.rejection.is_none()
    }
}

/// A closed chunk with its final counters and verdict.
#[derive(Debug, Clone)]
pub struct ChunkSummary {
    pub bounds: ChunkBounds,
    pub stats: ChunkStats,
    pub verdict: ChunkVerdict,
    pub vcf_path: std::path::PathBuf,
    pub index_path: std::path::PathBuf,
}
