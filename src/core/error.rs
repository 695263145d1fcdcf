use std::path::PathBuf;
use thiserror::Error;

/// A malformed VCF line or header. Fatal for the file being scanned.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("expected at least 10 tab-separated columns, found {0}")]
    ColumnCount(usize),
    #[error("FORMAT column '{0}' has no GT field")]
    MissingGenotypeField(String),
    #[error("expected {expected} samples, found {found}")]
    SampleCount { expected: usize, found: usize },
    #[error("invalid position '{0}'")]
    InvalidPosition(String),
    #[error("line is not valid UTF-8")]
    Encoding,
    #[error("position {position} follows {previous}; input must be sorted by position")]
    Unsorted { previous: u64, position: u64 },
    #[error("found chromosome '{found}' in a file of chromosome '{expected}'; split input by chromosome")]
    MixedChromosomes { expected: String, found: String },
    #[error("data line found before the #CHROM header line")]
    MissingHeader,
    #[error("duplicate sample name '{0}' in #CHROM header")]
    DuplicateSample(String),
}

/// Missing or inconsistent run configuration. Fatal for the chromosome it concerns.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("legend file for chromosome {chromosome} not found: {}", path.display())]
    LegendNotFound { chromosome: String, path: PathBuf },
    #[error("population '{population}' has no '{population}.aaf' column in legend {}", path.display())]
    PopulationNotFound { population: String, path: PathBuf },
    #[error("chromosome {0} appears in more than one input file")]
    DuplicateChromosome(String),
    #[error("unknown genome build '{0}', expected hg19 or hg38")]
    UnknownBuild(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
