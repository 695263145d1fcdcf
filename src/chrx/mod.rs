//! Splits an X chromosome file into PAR1, nonPAR and PAR2 sub-streams.

pub mod ploidy;

use crate::core::io::BgzfVcfWriter;
use crate::core::region::{Build, XRegion};
use crate::vcf::{LineDecoder, Site, VcfReader};
use anyhow::{Context, Result};
use log::info;
use std::path::{Path, PathBuf};

pub use ploidy::{normalize_haploid, ChrxProblem, PloidyReport, PloidyTracker};

/// One non-empty region written by the splitter.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitStream {
    pub region: XRegion,
    pub path: PathBuf,
    pub sites: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChrxSplit {
    /// Non-empty regions in PAR1, nonPAR, PAR2 order.
    pub streams: Vec<SplitStream>,
    pub report: PloidyReport,
}

struct RegionOutput {
    writer: BgzfVcfWriter,
    sites: usize,
}

/// Split `input` by region into bgzipped VCFs under `outdir`, normalising
/// haploid nonPAR genotypes and checking nonPAR ploidy on the way.
///
/// Sub-files are named `<stem>.<region label>.vcf.gz`.
pub fn split_chromosome_x<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    build: Build,
    outdir: Q,
    mixed_threshold: f64,
) -> Result<ChrxSplit> {
    let input = input.as_ref();
    let mut reader = VcfReader::from_path(input)?;
    let header = reader.header().clone();
    let decoder = LineDecoder::new(header.num_samples());
    let stem = file_stem(input);

    let mut outputs: [Option<RegionOutput>; 3] = [None, None, None];
    let mut tracker = PloidyTracker::new(header.num_samples());
    let mut site = Site::default();
    let mut normalized = Vec::new();

    while let Some(line) = reader.read_line()? {
        decoder.decode_into(line, &mut site).with_context(|| {
            format!("{}:{}: invalid record", input.display(), reader.line_number())
        })?;

        let region = XRegion::for_position(site.position, build);
        let slot = &mut outputs[region as usize];
        if slot.is_none() {
            let path = outdir
                .as_ref()
                .join(format!("{}.{}.vcf.gz", stem, region.label()));
            *slot = Some(RegionOutput {
                writer: BgzfVcfWriter::create(&path, header.raw())?,
                sites: 0,
            });
        }
        let Some(output) = slot.as_mut() else {
            continue;
        };

        let record = if region == XRegion::NonPar {
            tracker.observe(&site, header.samples());
            normalize_haploid(site.raw_line(), &mut normalized);
            normalized.as_slice()
        } else {
            site.raw_line()
        };
        output
            .writer
            .write_record(&site.chromosome, site.position, site.reference.len(), record)?;
        output.sites += 1;
    }

    let mut streams = Vec::new();
    for (region, output) in XRegion::ALL.into_iter().zip(outputs) {
        let Some(output) = output else {
            continue;
        };
        let path = output.writer.path().to_path_buf();
        output.writer.finish()?;
        info!("{}: {} sites written to {}", region, output.sites, path.display());
        streams.push(SplitStream {
            region,
            path,
            sites: output.sites,
        });
    }

    Ok(ChrxSplit {
        streams,
        report: tracker.finish(header.samples(), mixed_threshold),
    })
}

fn file_stem(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "chrX".to_string());
    for suffix in [".vcf.gz", ".vcf.bgz", ".vcf"] {
        if let Some(stem) = name.strip_suffix(suffix) {
            return stem.to_string();
        }
    }
    name
}
