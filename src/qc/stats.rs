use crate::qc::chunk::ChunkRejection;
use crate::qc::filters::SiteRejection;
use std::fmt;
use std::ops::AddAssign;

/// Counters of one stream, or of a whole run once streams are summed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStatistics {
    pub samples: usize,
    pub streams: usize,
    pub sites: usize,
    pub found_in_legend: usize,
    pub not_found_in_legend: usize,
    pub multiallelic: usize,
    pub invalid_alleles: usize,
    pub duplicates: usize,
    pub filter_flag: usize,
    pub non_snps: usize,
    pub monomorphic: usize,
    pub allele_mismatch: usize,
    pub strand_flips: usize,
    pub strand_flip_and_switches: usize,
    pub allele_switches: usize,
    pub complicated: usize,
    pub low_call_rate: usize,
    pub accepted_chunks: usize,
    pub low_overlap_chunks: usize,
    pub too_few_snps_chunks: usize,
    pub low_sample_call_rate_chunks: usize,
    pub chrx_ploidy_error: bool,
    pub chrx_missing_rate_error: bool,
}

impl RunStatistics {
    pub fn count_site_rejection(&mut self, reason: SiteRejection) {
        let counter = match reason {
            SiteRejection::Multiallelic => &mut self.multiallelic,
            SiteRejection::InvalidAlleles => &mut self.invalid_alleles,
            SiteRejection::Duplicate => &mut self.duplicates,
            SiteRejection::FilterFlag => &mut self.filter_flag,
            SiteRejection::NonSnp => &mut self.non_snps,
            SiteRejection::Monomorphic => &mut self.monomorphic,
            SiteRejection::AlleleMismatch => &mut self.allele_mismatch,
            SiteRejection::StrandFlip => &mut self.strand_flips,
            SiteRejection::StrandFlipAndSwitch => &mut self.strand_flip_and_switches,
            SiteRejection::LowCallRate => &mut self.low_call_rate,
        };
        *counter += 1;
    }

    pub fn count_chunk(&mut self, rejection: Option<ChunkRejection>) {
        match rejection {
            None => self.accepted_chunks += 1,
            Some(ChunkRejection::LowReferenceOverlap) => self.low_overlap_chunks += 1,
            Some(ChunkRejection::TooFewSnps) => self.too_few_snps_chunks += 1,
            Some(ChunkRejection::LowSampleCallRate) => self.low_sample_call_rate_chunks += 1,
        }
    }

    pub fn rejected_chunks(&self) -> usize {
        self.low_overlap_chunks + self.too_few_snps_chunks + self.low_sample_call_rate_chunks
    }

    pub fn total_chunks(&self) -> usize {
        self.accepted_chunks + self.rejected_chunks()
    }

    pub fn filtered_sites(&self) -> usize {
        self.multiallelic
            + self.invalid_alleles
            + self.duplicates
            + self.filter_flag
            + self.non_snps
            + self.monomorphic
            + self.allele_mismatch
            + self.strand_flips
            + self.strand_flip_and_switches
            + self.low_call_rate
    }

    /// No chunk of the run survived the acceptance policy.
    pub fn all_chunks_rejected(&self) -> bool {
        self.accepted_chunks == 0
    }

    /// Any condition a caller would normally turn into a failed run.
    pub fn has_run_level_condition(&self) -> bool {
        self.all_chunks_rejected() || self.chrx_ploidy_error || self.chrx_missing_rate_error
    }
}

impl AddAssign<&RunStatistics> for RunStatistics {
    fn add_assign(&mut self, other: &RunStatistics) {
        // Streams of one run share their sample set.
        self.samples = self.samples.max(other.samples);
        self.streams += other.streams;
        self.sites += other.sites;
        self.found_in_legend += other.found_in_legend;
        self.not_found_in_legend += other.not_found_in_legend;
        self.multiallelic += other.multiallelic;
        self.invalid_alleles += other.invalid_alleles;
        self.duplicates += other.duplicates;
        self.filter_flag += other.filter_flag;
        self.non_snps += other.non_snps;
        self.monomorphic += other.monomorphic;
        self.allele_mismatch += other.allele_mismatch;
        self.strand_flips += other.strand_flips;
        self.strand_flip_and_switches += other.strand_flip_and_switches;
        self.allele_switches += other.allele_switches;
        self.complicated += other.complicated;
        self.low_call_rate += other.low_call_rate;
        self.accepted_chunks += other.accepted_chunks;
        self.low_overlap_chunks += other.low_overlap_chunks;
        self.too_few_snps_chunks += other.too_few_snps_chunks;
        self.low_sample_call_rate_chunks += other.low_sample_call_rate_chunks;
        self.chrx_ploidy_error |= other.chrx_ploidy_error;
        self.chrx_missing_rate_error |= other.chrx_missing_rate_error;
    }
}

impl fmt::Display for RunStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Samples: {}", self.samples)?;
        writeln!(f, "Streams: {}", self.streams)?;
        writeln!(f, "Sites: {}", self.sites)?;
        writeln!(f, "Found in reference panel: {}", self.found_in_legend)?;
        writeln!(f, "Not found in reference panel: {}", self.not_found_in_legend)?;
        writeln!(f, "Allele switches: {}", self.allele_switches)?;
        writeln!(f, "Ambiguous A/T and C/G sites: {}", self.complicated)?;
        writeln!(f, "Filtered sites: {}", self.filtered_sites())?;
        writeln!(f, "  Multiallelic: {}", self.multiallelic)?;
        writeln!(f, "  Invalid alleles: {}", self.invalid_alleles)?;
        writeln!(f, "  Duplicates: {}", self.duplicates)?;
        writeln!(f, "  FILTER flag: {}", self.filter_flag)?;
        writeln!(f, "  InDels: {}", self.non_snps)?;
        writeln!(f, "  Monomorphic: {}", self.monomorphic)?;
        writeln!(f, "  Allele mismatches: {}", self.allele_mismatch)?;
        writeln!(f, "  Strand flips: {}", self.strand_flips)?;
        writeln!(
            f,
            "  Strand flips and allele switches: {}",
            self.strand_flip_and_switches
        )?;
        writeln!(f, "  Low call rate: {}", self.low_call_rate)?;
        writeln!(f, "Chunks: {}", self.total_chunks())?;
        writeln!(f, "  Accepted: {}", self.accepted_chunks)?;
        writeln!(f, "  Low reference overlap: {}", self.low_overlap_chunks)?;
        writeln!(f, "  Too few SNPs: {}", self.too_few_snps_chunks)?;
        writeln!(
            f,
            "  Low sample call rate: {}",
            self.low_sample_call_rate_chunks
        )?;
        writeln!(f, "chrX ploidy error: {}", self.chrx_ploidy_error)?;
        write!(f, "chrX missing rate error: {}", self.chrx_missing_rate_error)
    }
}
