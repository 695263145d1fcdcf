use crate::core::error::ConfigError;
use std::fmt;
use std::str::FromStr;

/// Reference genome build; decides where the X chromosome's PARs lie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Build {
    #[default]
    Hg19,
    Hg38,
}

impl Build {
    /// Inclusive bounds of the non-pseudo-autosomal region of chromosome X.
    pub fn non_par_bounds(self) -> (u64, u64) {
        match self {
            Build::Hg19 => (2_699_521, 154_931_043),
            Build::Hg38 => (2_781_480, 155_701_382),
        }
    }
}

impl FromStr for Build {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hg19" | "grch37" => Ok(Build::Hg19),
            "hg38" | "grch38" => Ok(Build::Hg38),
            _ => Err(ConfigError::UnknownBuild(s.to_string())),
        }
    }
}

impl fmt::Display for Build {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Build::Hg19 => write!(f, "hg19"),
            Build::Hg38 => write!(f, "hg38"),
        }
    }
}

/// Sub-region of chromosome X processed as its own stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum XRegion {
    Par1,
    NonPar,
    Par2,
}

impl XRegion {
    pub const ALL: [XRegion; 3] = [XRegion::Par1, XRegion::NonPar, XRegion::Par2];

    pub fn for_position(position: u64, build: Build) -> Self {
        let (start, end) = build.non_par_bounds();
        if position < start {
            XRegion::Par1
        } else if position <= end {
            XRegion::NonPar
        } else {
            XRegion::Par2
        }
    }

    /// Label used in place of the chromosome name for chunks and manifests.
    pub fn label(self) -> &'static str {
        match self {
            XRegion::Par1 => "X.PAR1",
            XRegion::NonPar => "X.nonPAR",
            XRegion::Par2 => "X.PAR2",
        }
    }
}

impl fmt::Display for XRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub fn is_chromosome_x(chromosome: &str) -> bool {
    matches!(chromosome_without_prefix(chromosome), "X" | "23")
}

fn chromosome_without_prefix(chromosome: &str) -> &str {
    chromosome.strip_prefix("chr").unwrap_or(chromosome)
}

/// Chromosome name used to locate the legend for a region label.
///
/// `chr20` → `20`; `X.PAR1`, `chrX`, `23` → `X`.
pub fn legend_chromosome(label: &str) -> &str {
    let name = chromosome_without_prefix(label);
    if name.starts_with("X.") || name == "X" || name == "23" {
        "X"
    } else {
        name
    }
}

/// Fixed-width chunk grid over one region label. Chunk `n` covers
/// `[n * size + 1, (n + 1) * size]`, 1-based inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkGrid {
    pub size: u64,
}

impl ChunkGrid {
    pub fn new(size: u64) -> Self {
        Self { size }
    }

    #[inline]
    pub fn chunk_number(&self, position: u64) -> u64 {
        (position - 1) / self.size
    }

    #[inline]
    pub fn start(&self, number: u64) -> u64 {
        number * self.size + 1
    }

    #[inline]
    pub fn end(&self, number: u64) -> u64 {
        (number + 1) * self.size
    }
}
