pub mod chunk;
pub mod concordance;
pub mod config;
pub mod filters;
pub mod frequency;
pub mod stats;
pub mod windows;
pub mod writer;

use crate::chrx::{split_chromosome_x, ChrxProblem};
use crate::core::error::{ConfigError, FormatError};
use crate::core::region::is_chromosome_x;
use crate::core::utils::{create_progress_bar, create_spinner};
use crate::legend::LegendSource;
use crate::qc::chunk::{ChunkStats, ChunkSummary};
use crate::qc::concordance::Concordance;
use crate::qc::config::{OutputPaths, QcConfig};
use crate::qc::filters::{FilterCascade, SiteOutcome};
use crate::qc::stats::RunStatistics;
use crate::qc::windows::ChunkWindowManager;
use crate::qc::writer::{write_chrx_log, write_manifest, RunLogs, StreamLogs};
use crate::vcf::{LineDecoder, Site, VcfReader};
use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use fnv::FnvHashSet;
use log::{debug, info, warn};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// One single-chromosome stream and the label its chunks are named after.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInput {
    pub path: PathBuf,
    pub label: String,
}

/// Result of one stream, before its logs are merged into the run files.
pub struct StreamResult {
    pub label: String,
    pub phased: bool,
    pub accepted: Vec<ChunkSummary>,
    pub statistics: RunStatistics,
    logs: StreamLogs,
}

/// What a finished run hands back to its caller.
#[derive(Debug, Clone)]
pub struct QcReport {
    pub statistics: RunStatistics,
    pub manifests: Vec<Utf8PathBuf>,
}

/// Quality-control and chunk every input file.
///
/// Files holding chromosome X are first split into their PAR1, nonPAR and
/// PAR2 regions. Streams are processed in parallel; logs and manifests are
/// written in input order.
pub fn run_qc(
    inputs: &[PathBuf],
    config: &QcConfig,
    legends: &LegendSource,
    paths: &OutputPaths,
) -> Result<QcReport> {
    config.validate()?;
    paths.create_dirs()?;

    let scratch = tempfile::Builder::new()
        .prefix("imputeqc-chrx")
        .tempdir()
        .context("Failed to create scratch directory")?;

    let mut streams = Vec::new();
    let mut chrx_problems: Vec<ChrxProblem> = Vec::new();
    let mut chrx_flags = RunStatistics::default();
    for path in inputs {
        let Some(chromosome) = VcfReader::from_path(path)?.first_chromosome() else {
            warn!("{} has no data lines, skipping", path.display());
            continue;
        };

        if is_chromosome_x(&chromosome) {
            let spinner = create_spinner(&format!("Splitting {}", path.display()));
            let split = split_chromosome_x(
                path,
                config.build,
                scratch.path(),
                config.mixed_genotypes_threshold,
            )?;
            spinner.finish_and_clear();

            chrx_flags.chrx_ploidy_error |= split.report.ploidy_error;
            chrx_flags.chrx_missing_rate_error |= split.report.missing_rate_error;
            chrx_problems.extend(split.report.problems);
            streams.extend(split.streams.into_iter().map(|s| StreamInput {
                path: s.path,
                label: s.region.label().to_string(),
            }));
        } else {
            streams.push(StreamInput {
                path: path.clone(),
                label: chromosome,
            });
        }
    }

    let mut labels = FnvHashSet::default();
    for stream in &streams {
        if !labels.insert(stream.label.as_str()) {
            return Err(ConfigError::DuplicateChromosome(stream.label.clone()).into());
        }
    }

    let pb = create_progress_bar(streams.len(), "streams");
    let results = streams
        .par_iter()
        .map(|stream| {
            let result = process_stream(stream, config, legends, paths)?;
            pb.inc(1);
            Ok::<_, anyhow::Error>(result)
        })
        .collect::<Result<Vec<_>>>()?;
    pb.finish_with_message("Processing complete");

    let spinner = create_spinner("Writing results...");
    let mut run_logs = RunLogs::create(paths, config.population().is_some())?;
    let mut statistics = chrx_flags;
    let mut manifests = Vec::with_capacity(results.len());
    for result in results {
        let manifest = paths.manifest(&result.label);
        write_manifest(&manifest, &result.label, result.phased, &result.accepted)?;
        manifests.push(manifest);
        run_logs.append(result.logs)?;
        statistics += &result.statistics;
    }
    run_logs.flush()?;
    write_chrx_log(&paths.chrx_info(), &chrx_problems)?;

    let statistics_path = paths.statistics();
    std::fs::write(&statistics_path, format!("{}\n", statistics))
        .with_context(|| format!("Failed to write {}", statistics_path))?;
    spinner.finish_with_message("Results written");

    info!(
        "{} of {} chunks accepted across {} streams",
        statistics.accepted_chunks,
        statistics.total_chunks(),
        statistics.streams
    );
    if statistics.all_chunks_rejected() {
        warn!("No chunk passed quality control");
    }

    Ok(QcReport {
        statistics,
        manifests,
    })
}

/// Single pass over one stream: decode, filter, window and summarise.
pub fn process_stream(
    stream: &StreamInput,
    config: &QcConfig,
    legends: &LegendSource,
    paths: &OutputPaths,
) -> Result<StreamResult> {
    let path = stream.path.as_path();
    let mut reader = VcfReader::from_path(path)?;
    let num_samples = reader.header().num_samples();
    let legend = legends
        .load(&stream.label, config.population())
        .with_context(|| format!("Failed to load legend for {}", stream.label))?;
    debug!("{}: {} legend sites", stream.label, legend.len());

    let decoder = LineDecoder::new(num_samples);
    let cascade = FilterCascade::new(config, &legend, num_samples);
    let mut manager = ChunkWindowManager::new(
        &stream.label,
        config,
        reader.header().raw(),
        num_samples,
        paths,
    );

    let mut result = StreamResult {
        label: stream.label.clone(),
        phased: false,
        accepted: Vec::new(),
        statistics: RunStatistics {
            samples: num_samples,
            streams: 1,
            ..Default::default()
        },
        logs: StreamLogs::new()?,
    };

    let mut site = Site::default();
    let mut chromosome: Option<String> = None;
    let mut previous = 0;

    while let Some(line) = reader.read_line()? {
        decoder
            .decode_into(line, &mut site)
            .with_context(|| line_context(path, reader.line_number()))?;
        check_order(&site, &mut chromosome, previous, &mut result.phased)
            .with_context(|| line_context(path, reader.line_number()))?;
        previous = site.position;
        result.statistics.sites += 1;

        for summary in manager.advance(site.position)? {
            result.record_chunk(summary)?;
        }

        for chunk in manager.open_chunks_mut() {
            let in_core = chunk.bounds.contains_core(site.position);
            let outcome = cascade.evaluate(&site, &mut chunk.stats.last_pos, in_core);

            if in_core {
                result.record_site(&site, &outcome, &mut chunk.stats)?;
            }
            if outcome.is_accepted()
                && chunk
                    .bounds
                    .contains_extended(site.position, config.phasing_window)
            {
                chunk.write_site(&site)?;
            }
        }
    }

    for summary in manager.finish()? {
        result.record_chunk(summary)?;
    }

    info!(
        "{}: {} sites, {} of {} chunks accepted",
        result.label,
        result.statistics.sites,
        result.statistics.accepted_chunks,
        result.statistics.total_chunks()
    );

    Ok(result)
}

fn line_context(path: &Path, line: u64) -> String {
    format!("{}:{}: invalid record", path.display(), line)
}

/// One chromosome per stream, ascending positions. The first data line
/// decides whether the stream is phased.
fn check_order(
    site: &Site,
    chromosome: &mut Option<String>,
    previous: u64,
    phased: &mut bool,
) -> Result<(), FormatError> {
    let Some(expected) = chromosome.as_deref() else {
        *chromosome = Some(site.chromosome.clone());
        *phased = site.is_phased();
        return Ok(());
    };
    if expected != site.chromosome {
        return Err(FormatError::MixedChromosomes {
            expected: expected.to_string(),
            found: site.chromosome.clone(),
        });
    }
    if site.position < previous {
        return Err(FormatError::Unsorted {
            previous,
            position: site.position,
        });
    }
    Ok(())
}

impl StreamResult {
    fn record_site(
        &mut self,
        site: &Site,
        outcome: &SiteOutcome,
        counters: &mut ChunkStats,
    ) -> Result<()> {
        let id = site.id();
        match outcome {
            SiteOutcome::Rejected(rejection) => {
                self.statistics.count_site_rejection(rejection.reason);
                self.logs.excluded_site(&id, rejection)?;
            }
            SiteOutcome::NotInLegend => {
                counters.not_found_in_legend += 1;
                self.statistics.not_found_in_legend += 1;
                self.logs.typed_only(&id)?;
                counters.add_accepted(site, false);
            }
            SiteOutcome::InLegend {
                concordance,
                frequency,
                rejection,
            } => {
                counters.found_in_legend += 1;
                self.statistics.found_in_legend += 1;
                match concordance {
                    Concordance::AlleleSwitch => self.statistics.allele_switches += 1,
                    Concordance::Complicated => self.statistics.complicated += 1,
                    _ => {}
                }
                if let Some(record) = frequency {
                    self.logs.frequency(record)?;
                }
                match rejection {
                    Some(rejection) => {
                        self.statistics.count_site_rejection(rejection.reason);
                        self.logs.excluded_site(&id, rejection)?;
                    }
                    None => counters.add_accepted(site, true),
                }
            }
        }
        Ok(())
    }

    fn record_chunk(&mut self, summary: ChunkSummary) -> Result<()> {
        self.statistics.count_chunk(summary.verdict.rejection);
        match summary.verdict.rejection {
            None => {
                debug!(
                    "{} accepted: {} SNPs, {} in reference",
                    summary.bounds.id(),
                    summary.stats.overall_snps,
                    summary.stats.found_in_legend
                );
                self.accepted.push(summary);
            }
            Some(reason) => {
                info!(
                    "{} rejected ({}): {} SNPs, overlap {:.4}, {} low call rate samples",
                    summary.bounds.id(),
                    reason,
                    summary.stats.overall_snps,
                    summary.verdict.overlap,
                    summary.verdict.low_call_rate_samples
                );
                self.logs.excluded_chunk(&summary)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io::{index_path_for, open_read_maybe_gz};
    use std::io::BufRead;
    use tempfile::TempDir;

    const HEADER: &str = "##fileformat=VCFv4.2\n#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\tS2\n";

    struct Fixture {
        _tmp: TempDir,
        dir: PathBuf,
        paths: OutputPaths,
        legends: LegendSource,
    }

    fn fixture(legend: &str) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().to_path_buf();
        std::fs::write(dir.join("20.legend"), legend).unwrap();
        let outdir = Utf8PathBuf::from_path_buf(dir.join("out")).unwrap();
        Fixture {
            paths: OutputPaths::from_outdir(&outdir),
            legends: LegendSource::new(dir.join("$chr.legend").to_string_lossy()),
            dir,
            _tmp: tmp,
        }
    }

    fn write_vcf(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("{}{}\n", HEADER, lines.join("\n"))).unwrap();
        path
    }

    fn small_config() -> QcConfig {
        QcConfig {
            chunk_size: 100,
            phasing_window: 10,
            min_snps: 2,
            ..Default::default()
        }
    }

    fn data_lines(path: &Path) -> Vec<String> {
        open_read_maybe_gz(path)
            .unwrap()
            .lines()
            .map(|l| l.unwrap())
            .filter(|l| !l.starts_with('#'))
            .collect()
    }

    const LEGEND: &str = "id position a0 a1\n\
                          rs1 10 A G\n\
                          rs2 20 C T\n\
                          rs3 95 A G\n\
                          rs4 105 A G\n\
                          rs5 150 G T\n\
                          rs6 160 C A\n";

    #[test]
    fn test_process_stream_chunks_and_overlap() -> Result<()> {
        let f = fixture(LEGEND);
        let vcf = write_vcf(
            &f.dir,
            "in.vcf",
            &[
                "20\t10\t.\tA\tG\t.\tPASS\t.\tGT\t0|1\t0|0",
                "20\t20\t.\tC\tT\t.\tPASS\t.\tGT\t1|1\t0|1",
                "20\t30\t.\tAT\tA\t.\tPASS\t.\tGT\t0|1\t0|1",
                "20\t95\t.\tA\tG\t.\tPASS\t.\tGT\t0|1\t0|0",
                "20\t105\t.\tA\tG\t.\tPASS\t.\tGT\t0|1\t0|0",
                "20\t150\t.\tG\tT\t.\tPASS\t.\tGT\t0|1\t0|0",
                "20\t160\t.\tA\tC\t.\tPASS\t.\tGT\t0|1\t0|0",
            ],
        );
        f.paths.create_dirs()?;
        let config = small_config();
        let stream = StreamInput {
            path: vcf,
            label: "20".to_string(),
        };
        let result = process_stream(&stream, &config, &f.legends, &f.paths)?;

        assert!(result.phased);
        assert_eq!(result.statistics.sites, 7);
        assert_eq!(result.statistics.non_snps, 1);
        // 160 A/C against C/A is an allele switch.
        assert_eq!(result.statistics.allele_switches, 1);
        assert_eq!(result.accepted.len(), 2);

        let first = &result.accepted[0];
        assert_eq!(first.bounds.id(), "chunk_20_1_100");
        assert_eq!(first.stats.overall_snps, 3);
        assert_eq!(first.stats.found_in_legend, 3);
        // Site 105 lies in chunk 1's overlap and is written to chunk 0 too.
        let positions: Vec<_> = data_lines(&first.vcf_path)
            .iter()
            .map(|l| l.split('\t').nth(1).unwrap().to_string())
            .collect();
        assert_eq!(positions, vec!["10", "20", "95", "105"]);

        let second = &result.accepted[1];
        assert_eq!(second.bounds.id(), "chunk_20_101_200");
        assert_eq!(second.stats.overall_snps, 3);
        assert_eq!(data_lines(&second.vcf_path).len(), 4);
        Ok(())
    }

    #[test]
    fn test_unsorted_input_is_format_error() {
        let f = fixture(LEGEND);
        let vcf = write_vcf(
            &f.dir,
            "in.vcf",
            &[
                "20\t20\t.\tC\tT\t.\tPASS\t.\tGT\t1|1\t0|1",
                "20\t10\t.\tA\tG\t.\tPASS\t.\tGT\t0|1\t0|0",
            ],
        );
        f.paths.create_dirs().unwrap();
        let stream = StreamInput {
            path: vcf,
            label: "20".to_string(),
        };
        let err = process_stream(&stream, &small_config(), &f.legends, &f.paths)
            .err()
            .unwrap();
        assert_eq!(
            err.downcast_ref::<FormatError>(),
            Some(&FormatError::Unsorted {
                previous: 20,
                position: 10
            })
        );
    }

    #[test]
    fn test_mixed_chromosomes_is_format_error() {
        let f = fixture(LEGEND);
        let vcf = write_vcf(
            &f.dir,
            "in.vcf",
            &[
                "20\t10\t.\tA\tG\t.\tPASS\t.\tGT\t0|1\t0|0",
                "21\t20\t.\tC\tT\t.\tPASS\t.\tGT\t1|1\t0|1",
            ],
        );
        let inputs = vec![vcf];
        let err = run_qc(&inputs, &small_config(), &f.legends, &f.paths)
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<FormatError>(),
            Some(FormatError::MixedChromosomes { .. })
        ));
    }

    #[test]
    fn test_duplicate_chromosome_is_config_error() {
        let f = fixture(LEGEND);
        let line = ["20\t10\t.\tA\tG\t.\tPASS\t.\tGT\t0|1\t0|0"];
        let inputs = vec![
            write_vcf(&f.dir, "a.vcf", &line),
            write_vcf(&f.dir, "b.vcf", &line),
        ];
        let err = run_qc(&inputs, &small_config(), &f.legends, &f.paths)
            .err()
            .unwrap();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::DuplicateChromosome("20".to_string()))
        );
    }

    #[test]
    fn test_missing_legend_is_config_error() {
        let f = fixture(LEGEND);
        let inputs = vec![write_vcf(
            &f.dir,
            "in.vcf",
            &["22\t10\t.\tA\tG\t.\tPASS\t.\tGT\t0|1\t0|0"],
        )];
        let err = run_qc(&inputs, &small_config(), &f.legends, &f.paths)
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::LegendNotFound { .. })
        ));
    }

    #[test]
    fn test_run_writes_outputs_and_is_idempotent() -> Result<()> {
        let f = fixture(LEGEND);
        let vcf = write_vcf(
            &f.dir,
            "in.vcf",
            &[
                "20\t10\t.\tA\tG\t.\tPASS\t.\tGT\t0/1\t0/0",
                "20\t20\t.\tC\tT\t.\tPASS\t.\tGT\t1/1\t0/1",
                "20\t25\t.\tC\tT\t.\tLowQual\t.\tGT\t1/1\t0/1",
                "20\t95\t.\tA\tG\t.\tPASS\t.\tGT\t0/1\t0/0",
                "20\t150\t.\tA\tC\t.\tPASS\t.\tGT\t0/1\t0/0",
            ],
        );
        let inputs = vec![vcf];
        let config = small_config();

        let report = run_qc(&inputs, &config, &f.legends, &f.paths)?;
        assert_eq!(report.statistics.accepted_chunks, 1);
        assert_eq!(report.statistics.too_few_snps_chunks, 1);
        assert_eq!(report.statistics.filter_flag, 1);
        assert_eq!(report.statistics.strand_flips, 0);
        assert_eq!(report.statistics.strand_flip_and_switches, 1);
        assert!(!report.statistics.all_chunks_rejected());

        let manifest = std::fs::read_to_string(f.paths.manifest("20"))?;
        let columns: Vec<_> = manifest.trim_end().split('\t').collect();
        assert_eq!(columns[..4], ["20", "1", "100", "VCF-UNPHASED"]);
        assert_eq!(columns[6..], ["3", "3"]);

        let excluded_sites = std::fs::read_to_string(f.paths.excluded_sites())?;
        assert!(excluded_sites.contains("20:25:C:T\tFILTER\tLowQual"));
        assert!(excluded_sites.contains("20:150:A:C\tStrand flip and Allele switch\tG/T"));
        let excluded_chunks = std::fs::read_to_string(f.paths.excluded_chunks())?;
        assert!(excluded_chunks.contains("chunk_20_101_200\t0\t1.0000\t0"));
        assert!(f.paths.statistics().exists());
        assert!(!f.paths.maf().exists());

        let first = (manifest, excluded_sites, excluded_chunks);
        run_qc(&inputs, &config, &f.legends, &f.paths)?;
        let second = (
            std::fs::read_to_string(f.paths.manifest("20"))?,
            std::fs::read_to_string(f.paths.excluded_sites())?,
            std::fs::read_to_string(f.paths.excluded_chunks())?,
        );
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn test_chunk_with_only_rejected_sites_is_closed() -> Result<()> {
        let f = fixture(LEGEND);
        let vcf = write_vcf(
            &f.dir,
            "in.vcf",
            &["20\t10\t.\tAT\tA\t.\tPASS\t.\tGT\t0|1\t0|0"],
        );

        let report = run_qc(&[vcf], &small_config(), &f.legends, &f.paths)?;
        assert_eq!(report.statistics.non_snps, 1);
        assert_eq!(report.statistics.low_overlap_chunks, 1);
        assert!(report.statistics.all_chunks_rejected());

        let chunk = f.paths.chunk_vcf("chunk_20_1_100");
        assert!(data_lines(chunk.as_std_path()).is_empty());
        assert!(index_path_for(chunk.as_std_path()).exists());
        let excluded_chunks = std::fs::read_to_string(f.paths.excluded_chunks())?;
        assert!(excluded_chunks.contains("chunk_20_1_100\t0\t0.0000\t0"));
        assert!(std::fs::read_to_string(f.paths.manifest("20"))?.is_empty());
        Ok(())
    }
}
