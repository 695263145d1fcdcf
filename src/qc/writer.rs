//! Tab-delimited log and manifest writers.
//!
//! Every stream writes its rows into anonymous temporary files; the run-level
//! files are created with their header lines and the stream files appended in
//! input order, so output does not depend on which stream finished first.

use crate::chrx::ChrxProblem;
use crate::qc::chunk::ChunkSummary;
use crate::qc::config::OutputPaths;
use crate::qc::filters::Rejection;
use crate::qc::frequency::FrequencyRecord;
use anyhow::{Context, Result};
use camino::Utf8Path;
use serde::{Serialize, Serializer};
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};

const EXCLUDED_SITES_HEADER: [&str; 3] = ["#Position", "FilterType", "Info"];
const EXCLUDED_CHUNKS_HEADER: [&str; 4] = [
    "#Chunk",
    "SNPs",
    "Reference Overlap",
    "Low Sample Call Rates",
];
const MAF_HEADER: [&str; 13] = [
    "ID",
    "Position",
    "AlleleA",
    "AlleleB",
    "FreqA",
    "FreqB",
    "RefAlleleA",
    "RefAlleleB",
    "RefFreqA",
    "RefFreqB",
    "Chisq",
    "OverlapWithReference",
    "Type",
];
const TYPED_ONLY_HEADER: [&str; 1] = ["#Position"];
const CHRX_HEADER: [&str; 3] = ["#Sample", "Position", "Problem"];

fn fixed4<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("{:.4}", value))
}

fn create_tsv_writer<W: Write>(inner: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_writer(inner)
}

#[derive(Debug, Serialize)]
struct ExcludedSiteRow<'a> {
    id: &'a str,
    filter_type: &'static str,
    info: &'a str,
}

#[derive(Debug, Serialize)]
struct ExcludedChunkRow<'a> {
    chunk: &'a str,
    snps: usize,
    #[serde(serialize_with = "fixed4")]
    overlap: f64,
    low_call_rate_samples: usize,
}

#[derive(Debug, Serialize)]
struct ManifestRow<'a> {
    label: &'a str,
    start: u64,
    end: u64,
    kind: &'static str,
    vcf: &'a str,
    index: &'a str,
    snps: usize,
    in_reference: usize,
}

/// Per-stream log rows, buffered in anonymous temporary files.
pub struct StreamLogs {
    excluded_sites: csv::Writer<File>,
    excluded_chunks: csv::Writer<File>,
    maf: csv::Writer<File>,
    typed_only: csv::Writer<File>,
}

impl StreamLogs {
    pub fn new() -> Result<Self> {
        let scratch = || -> Result<csv::Writer<File>> {
            let file = tempfile::tempfile().context("Failed to create temporary log file")?;
            Ok(create_tsv_writer(file))
        };
        Ok(Self {
            excluded_sites: scratch()?,
            excluded_chunks: scratch()?,
            maf: scratch()?,
            typed_only: scratch()?,
        })
    }

    pub fn excluded_site(&mut self, id: &str, rejection: &Rejection) -> Result<()> {
        self.excluded_sites.serialize(ExcludedSiteRow {
            id,
            filter_type: rejection.reason.label(),
            info: rejection.info.as_deref().unwrap_or(""),
        })?;
        Ok(())
    }

    pub fn excluded_chunk(&mut self, chunk: &ChunkSummary) -> Result<()> {
        self.excluded_chunks.serialize(ExcludedChunkRow {
            chunk: &chunk.bounds.id(),
            snps: chunk.stats.overall_snps,
            overlap: chunk.verdict.overlap,
            low_call_rate_samples: chunk.verdict.low_call_rate_samples,
        })?;
        Ok(())
    }

    pub fn frequency(&mut self, record: &FrequencyRecord) -> Result<()> {
        self.maf.serialize(record)?;
        Ok(())
    }

    pub fn typed_only(&mut self, id: &str) -> Result<()> {
        self.typed_only.write_record([id])?;
        Ok(())
    }

    fn into_files(self) -> Result<[File; 4]> {
        let rewind = |writer: csv::Writer<File>| -> Result<File> {
            let mut file = writer
                .into_inner()
                .map_err(|e| e.into_error())
                .context("Failed to flush temporary log file")?;
            file.seek(SeekFrom::Start(0))?;
            Ok(file)
        };
        Ok([
            rewind(self.excluded_sites)?,
            rewind(self.excluded_chunks)?,
            rewind(self.maf)?,
            rewind(self.typed_only)?,
        ])
    }
}

fn create_with_header<const N: usize>(path: &Utf8Path, header: [&str; N]) -> Result<BufWriter<File>> {
    let file =
        File::create(path).with_context(|| format!("Failed to create output file: {}", path))?;
    let mut writer = create_tsv_writer(BufWriter::new(file));
    writer.write_record(header)?;
    writer
        .into_inner()
        .map_err(|e| e.into_error())
        .with_context(|| format!("Failed to write header: {}", path))
}

/// Run-level statistics files.
pub struct RunLogs {
    excluded_sites: BufWriter<File>,
    excluded_chunks: BufWriter<File>,
    maf: Option<BufWriter<File>>,
    typed_only: BufWriter<File>,
}

impl RunLogs {
    /// Create every file with its header. The MAF file is only created when
    /// frequencies are computed.
    pub fn create(paths: &OutputPaths, with_maf: bool) -> Result<Self> {
        let maf = if with_maf {
            Some(create_with_header(&paths.maf(), MAF_HEADER)?)
        } else {
            None
        };
        Ok(Self {
            excluded_sites: create_with_header(&paths.excluded_sites(), EXCLUDED_SITES_HEADER)?,
            excluded_chunks: create_with_header(
                &paths.excluded_chunks(),
                EXCLUDED_CHUNKS_HEADER,
            )?,
            maf,
            typed_only: create_with_header(&paths.typed_only(), TYPED_ONLY_HEADER)?,
        })
    }

    /// Append one stream's rows.
    pub fn append(&mut self, logs: StreamLogs) -> Result<()> {
        let [mut sites, mut chunks, mut maf, mut typed] = logs.into_files()?;
        std::io::copy(&mut sites, &mut self.excluded_sites)?;
        std::io::copy(&mut chunks, &mut self.excluded_chunks)?;
        if let Some(writer) = &mut self.maf {
            std::io::copy(&mut maf, writer)?;
        }
        std::io::copy(&mut typed, &mut self.typed_only)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.excluded_sites.flush()?;
        self.excluded_chunks.flush()?;
        if let Some(writer) = &mut self.maf {
            writer.flush()?;
        }
        self.typed_only.flush()?;
        Ok(())
    }
}

/// Write the chrX ploidy and mixed-genotype log.
pub fn write_chrx_log(path: &Utf8Path, problems: &[ChrxProblem]) -> Result<()> {
    let mut writer = create_tsv_writer(create_with_header(path, CHRX_HEADER)?);
    for problem in problems {
        writer.serialize(problem)?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write chrX log: {}", path))?;
    Ok(())
}

/// Write the accepted chunks of one region label to its manifest.
pub fn write_manifest(
    path: &Utf8Path,
    label: &str,
    phased: bool,
    chunks: &[ChunkSummary],
) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("Failed to create manifest: {}", path))?;
    let mut writer = create_tsv_writer(BufWriter::new(file));
    let kind = if phased { "VCF-PHASED" } else { "VCF-UNPHASED" };
    for chunk in chunks {
        writer.serialize(ManifestRow {
            label,
            start: chunk.bounds.start,
            end: chunk.bounds.end,
            kind,
            vcf: &chunk.vcf_path.to_string_lossy(),
            index: &chunk.index_path.to_string_lossy(),
            snps: chunk.stats.overall_snps,
            in_reference: chunk.stats.found_in_legend,
        })?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write manifest: {}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qc::chunk::{ChunkBounds, ChunkRejection, ChunkStats, ChunkVerdict};
    use crate::qc::filters::SiteRejection;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    fn summary(start: u64, end: u64, rejection: Option<ChunkRejection>) -> ChunkSummary {
        let bounds = ChunkBounds {
            label: "20".to_string(),
            number: 0,
            start,
            end,
        };
        let vcf_path = std::path::PathBuf::from(format!("/out/{}.vcf.gz", bounds.id()));
        ChunkSummary {
            index_path: crate::core::io::index_path_for(&vcf_path),
            vcf_path,
            bounds,
            stats: ChunkStats {
                overall_snps: 7,
                found_in_legend: 5,
                not_found_in_legend: 2,
                valid_snps: 5,
                snps_per_sample: vec![7],
                last_pos: start,
            },
            verdict: ChunkVerdict {
                rejection,
                overlap: 5.0 / 7.0,
                low_call_rate_samples: 0,
            },
        }
    }

    fn paths(tmp: &TempDir) -> OutputPaths {
        let outdir = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap();
        let paths = OutputPaths::from_outdir(&outdir);
        paths.create_dirs().unwrap();
        paths
    }

    #[test]
    fn test_manifest_columns() -> Result<()> {
        let tmp = TempDir::new()?;
        let path = Utf8PathBuf::from_path_buf(tmp.path().join("20.chunks.txt")).unwrap();
        write_manifest(&path, "20", true, &[summary(1, 100, None)])?;
        let content = std::fs::read_to_string(&path)?;
        assert_eq!(
            content,
            "20\t1\t100\tVCF-PHASED\t/out/chunk_20_1_100.vcf.gz\t/out/chunk_20_1_100.vcf.gz.tbi\t7\t5\n"
        );
        Ok(())
    }

    #[test]
    fn test_streams_appended_in_order() -> Result<()> {
        let tmp = TempDir::new()?;
        let paths = paths(&tmp);
        let mut run = RunLogs::create(&paths, false)?;

        let mut first = StreamLogs::new()?;
        first.excluded_site(
            "20:5:A:C",
            &Rejection {
                reason: SiteRejection::NonSnp,
                info: None,
            },
        )?;
        first.excluded_chunk(&summary(1, 100, Some(ChunkRejection::TooFewSnps)))?;
        let mut second = StreamLogs::new()?;
        second.excluded_site(
            "21:9:A:T",
            &Rejection {
                reason: SiteRejection::FilterFlag,
                info: Some("LowQual".to_string()),
            },
        )?;
        second.typed_only("21:10:G:T")?;

        run.append(first)?;
        run.append(second)?;
        run.flush()?;

        assert_eq!(
            std::fs::read_to_string(paths.excluded_sites())?,
            "#Position\tFilterType\tInfo\n20:5:A:C\tInDel\t\n21:9:A:T\tFILTER\tLowQual\n"
        );
        assert_eq!(
            std::fs::read_to_string(paths.excluded_chunks())?,
            "#Chunk\tSNPs\tReference Overlap\tLow Sample Call Rates\nchunk_20_1_100\t7\t0.7143\t0\n"
        );
        assert_eq!(
            std::fs::read_to_string(paths.typed_only())?,
            "#Position\n21:10:G:T\n"
        );
        assert!(!paths.maf().exists());
        Ok(())
    }

    #[test]
    fn test_chrx_log_and_maf_header() -> Result<()> {
        let tmp = TempDir::new()?;
        let paths = paths(&tmp);
        write_chrx_log(
            &paths.chrx_info(),
            &[ChrxProblem {
                sample: "S17".to_string(),
                position: "X:2800000".to_string(),
                problem: "Ploidy".to_string(),
            }],
        )?;
        assert_eq!(
            std::fs::read_to_string(paths.chrx_info())?,
            "#Sample\tPosition\tProblem\nS17\tX:2800000\tPloidy\n"
        );

        RunLogs::create(&paths, true)?.flush()?;
        assert!(paths.maf().exists());
        Ok(())
    }
}
