use anyhow::{bail, Context, Result};
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use imputeqc::core::region::Build;
use imputeqc::core::utils::init_logging;
use imputeqc::legend::LegendSource;
use imputeqc::qc::config::{OutputPaths, QcConfig};
use log::{info, warn};
use std::path::PathBuf;

/// Genotype VCF quality control and chunking for imputation
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Quality control and chunking of genotype VCFs ahead of phasing and imputation"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check input VCFs against a reference panel and split them into chunks
    Run(RunArgs),
    /// Split a chromosome X VCF into PAR1, nonPAR and PAR2 files
    SplitChrx(SplitChrxArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SharedOptions {
    /// Number of threads to use for parallel processing
    #[arg(short = 't', long = "threads", default_value_t = 1)]
    pub threads: usize,

    /// Genome build of the input (hg19 or hg38)
    #[arg(short = 'b', long = "build", default_value_t = Build::Hg19)]
    pub build: Build,

    /// Maximum per-sample rate of half-missing genotypes in chrX nonPAR
    #[arg(long = "mixed-genotypes-threshold", default_value_t = 0.1)]
    pub mixed_genotypes_threshold: f64,
}

impl SharedOptions {
    /// Initialize thread pool
    pub fn initialize_threading(&self) -> Result<()> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build_global()?;
        Ok(())
    }
}

/// Check input VCFs against a reference panel and split them into chunks
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Input VCF files (plain or gzipped), one chromosome per file
    #[arg(required = true)]
    pub input: Vec<PathBuf>,

    /// Output directory for chunks, manifests and statistics
    #[arg(short = 'o', long = "outdir", required = true)]
    pub outdir: Utf8PathBuf,

    /// Legend file path with `$chr` standing in for the chromosome
    #[arg(short = 'l', long = "legend", required = true)]
    pub legend: String,

    /// Chunk size (base pairs)
    #[arg(long = "chunk-size", default_value_t = 20_000_000)]
    pub chunk_size: u64,

    /// Flanking bases written around each chunk
    #[arg(short = 'w', long = "phasing-window", default_value_t = 5_000_000)]
    pub phasing_window: u64,

    /// Legend population for allele frequency checks, or `mixed` to skip them
    #[arg(short = 'p', long = "population", default_value = "mixed")]
    pub population: String,

    /// Number of samples behind the legend frequencies
    #[arg(long = "reference-samples", default_value_t = 2_504)]
    pub reference_samples: usize,

    /// Only remove monomorphic sites when there are more samples than this
    #[arg(long = "min-samples-monomorphic", default_value_t = 1)]
    pub min_samples_monomorphic: usize,

    /// Minimum number of reference and valid SNPs per chunk
    #[arg(long = "min-snps", default_value_t = 3)]
    pub min_snps: usize,

    /// Minimum call rate of every sample within a chunk
    #[arg(long = "sample-call-rate", default_value_t = 0.5)]
    pub sample_call_rate: f64,

    /// Minimum fraction of chunk SNPs found in the reference panel
    #[arg(long = "reference-overlap", default_value_t = 0.5)]
    pub reference_overlap: f64,

    /// Maximum fraction of missing genotypes at a site
    #[arg(long = "max-site-missing-rate", default_value_t = 0.1)]
    pub max_site_missing_rate: f64,

    /// Exit with an error when no chunk passes or chrX checks fail
    #[arg(long = "strict")]
    pub strict: bool,

    /// Shared options
    #[command(flatten)]
    pub shared: SharedOptions,
}

/// Split a chromosome X VCF into PAR1, nonPAR and PAR2 files
#[derive(Args, Debug)]
pub struct SplitChrxArgs {
    /// Input chromosome X VCF
    #[arg(required = true)]
    pub input: PathBuf,

    /// Output directory for the region files and chrX-info.txt
    #[arg(short = 'o', long = "outdir", required = true)]
    pub outdir: Utf8PathBuf,

    /// Shared options
    #[command(flatten)]
    pub shared: SharedOptions,
}

impl RunArgs {
    pub fn run(self) -> Result<()> {
        use imputeqc::qc::run_qc;

        self.shared.initialize_threading()?;

        let config = QcConfig {
            chunk_size: self.chunk_size,
            phasing_window: self.phasing_window,
            population: self.population,
            reference_samples: self.reference_samples,
            build: self.shared.build,
            min_samples_monomorphic: self.min_samples_monomorphic,
            min_snps: self.min_snps,
            sample_call_rate: self.sample_call_rate,
            reference_overlap: self.reference_overlap,
            max_site_missing_rate: self.max_site_missing_rate,
            mixed_genotypes_threshold: self.shared.mixed_genotypes_threshold,
        };
        let paths = OutputPaths::from_outdir(&self.outdir);
        let legends = LegendSource::new(self.legend);

        let report = run_qc(&self.input, &config, &legends, &paths)?;
        info!("Run statistics:\n{}", report.statistics);

        if self.strict {
            let statistics = &report.statistics;
            if statistics.all_chunks_rejected() {
                bail!("No chunk passed quality control");
            }
            if statistics.chrx_ploidy_error {
                bail!(
                    "Chromosome X nonPAR ploidy is ambiguous, see {}",
                    paths.chrx_info()
                );
            }
            if statistics.chrx_missing_rate_error {
                bail!(
                    "Chromosome X nonPAR mixed genotype rate too high, see {}",
                    paths.chrx_info()
                );
            }
        }
        Ok(())
    }
}

impl SplitChrxArgs {
    pub fn run(self) -> Result<()> {
        use imputeqc::chrx::split_chromosome_x;
        use imputeqc::qc::writer::write_chrx_log;

        self.shared.initialize_threading()?;

        std::fs::create_dir_all(&self.outdir)
            .with_context(|| format!("Failed to create output directory: {}", self.outdir))?;

        let split = split_chromosome_x(
            &self.input,
            self.shared.build,
            &self.outdir,
            self.shared.mixed_genotypes_threshold,
        )?;
        write_chrx_log(&self.outdir.join("chrX-info.txt"), &split.report.problems)?;

        for stream in &split.streams {
            println!("{}\t{}\t{}", stream.region, stream.sites, stream.path.display());
        }
        if split.report.ploidy_error {
            warn!("Ploidy ambiguity found in chrX nonPAR");
        }
        if split.report.missing_rate_error {
            warn!("Mixed genotype rate above threshold in chrX nonPAR");
        }
        Ok(())
    }
}

// Main entry point
pub fn main() -> Result<()> {
    init_logging()?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => args.run(),
        Commands::SplitChrx(args) => args.run(),
    }
}
