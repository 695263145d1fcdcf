use crate::core::error::ConfigError;
use crate::core::region::Build;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};

/// Population label that disables the allele-frequency comparison.
pub const MIXED_POPULATION: &str = "mixed";

/// Thresholds and chunking parameters for one QC run.
///
/// Passed explicitly to every stream so that different chromosomes can run
/// with different settings.
#[derive(Debug, Clone, PartialEq)]
pub struct QcConfig {
    /// Chunk width in base pairs.
    pub chunk_size: u64,
    /// Flanking bases written around each chunk for phasing context.
    pub phasing_window: u64,
    /// Legend population (`<population>.aaf`), or `mixed`.
    pub population: String,
    /// Sample size behind the legend frequencies.
    pub reference_samples: usize,
    pub build: Build,
    /// Monomorphic sites are only removed when a file has more samples than this.
    pub min_samples_monomorphic: usize,
    /// Minimum legend-found and valid SNPs per chunk.
    pub min_snps: usize,
    /// Minimum fraction of a chunk's SNPs every sample must have called.
    pub sample_call_rate: f64,
    /// Minimum fraction of a chunk's SNPs found in the legend.
    pub reference_overlap: f64,
    /// Maximum no-call fraction at a site.
    pub max_site_missing_rate: f64,
    /// Maximum per-sample rate of half-missing genotypes in chrX nonPAR.
    pub mixed_genotypes_threshold: f64,
}

impl Default for QcConfig {
    fn default() -> Self {
        Self {
            chunk_size: 20_000_000,
            phasing_window: 5_000_000,
            population: MIXED_POPULATION.to_string(),
            reference_samples: 2_504,
            build: Build::Hg19,
            min_samples_monomorphic: 1,
            min_snps: 3,
            sample_call_rate: 0.5,
            reference_overlap: 0.5,
            max_site_missing_rate: 0.1,
            mixed_genotypes_threshold: 0.1,
        }
    }
}

impl QcConfig {
    /// Population used for frequency checks, `None` when `mixed`.
    pub fn population(&self) -> Option<&str> {
        if self.population.eq_ignore_ascii_case(MIXED_POPULATION) {
            None
        } else {
            Some(&self.population)
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk size must be positive".into()));
        }
        for (name, value) in [
            ("sample call rate", self.sample_call_rate),
            ("reference overlap", self.reference_overlap),
            ("site missing rate", self.max_site_missing_rate),
            ("mixed genotypes threshold", self.mixed_genotypes_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{} must lie in [0, 1], got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Locations of every file a run produces.
#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub chunks_dir: Utf8PathBuf,
    pub manifest_dir: Utf8PathBuf,
    pub statistics_dir: Utf8PathBuf,
}

impl OutputPaths {
    /// `<outdir>/chunks`, `<outdir>/manifests` and `<outdir>/statistics`.
    pub fn from_outdir(outdir: &Utf8Path) -> Self {
        Self {
            chunks_dir: outdir.join("chunks"),
            manifest_dir: outdir.join("manifests"),
            statistics_dir: outdir.join("statistics"),
        }
    }

    pub fn create_dirs(&self) -> Result<()> {
        for dir in [&self.chunks_dir, &self.manifest_dir, &self.statistics_dir] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create output directory: {}", dir))?;
        }
        Ok(())
    }

    pub fn chunk_vcf(&self, chunk_id: &str) -> Utf8PathBuf {
        self.chunks_dir.join(format!("{}.vcf.gz", chunk_id))
    }

    pub fn manifest(&self, label: &str) -> Utf8PathBuf {
        self.manifest_dir.join(format!("{}.chunks.txt", label))
    }

    pub fn excluded_sites(&self) -> Utf8PathBuf {
        self.statistics_dir.join("snps-excluded.txt")
    }

    pub fn excluded_chunks(&self) -> Utf8PathBuf {
        self.statistics_dir.join("chunks-excluded.txt")
    }

    pub fn maf(&self) -> Utf8PathBuf {
        self.statistics_dir.join("maf.txt")
    }

    pub fn typed_only(&self) -> Utf8PathBuf {
        self.statistics_dir.join("typed-only.txt")
    }

    pub fn chrx_info(&self) -> Utf8PathBuf {
        self.statistics_dir.join("chrX-info.txt")
    }

    pub fn statistics(&self) -> Utf8PathBuf {
        self.statistics_dir.join("statistics.txt")
    }
}
