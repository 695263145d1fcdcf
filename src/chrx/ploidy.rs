//! Per-sample ploidy and mixed-genotype tracking over chrX nonPAR sites.

use crate::vcf::decoder::genotype_offset;
use crate::vcf::Site;
use bitvec::prelude::*;
use bstr::ByteSlice;
use indexmap::IndexSet;
use log::warn;
use serde::Serialize;

pub const PLOIDY_PROBLEM: &str = "Ploidy";
pub const MIXED_GENOTYPES_PROBLEM: &str = "Mixed genotypes";

/// One row of the chrX log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChrxProblem {
    pub sample: String,
    pub position: String,
    pub problem: String,
}

/// Outcome of the nonPAR checks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PloidyReport {
    pub non_par_sites: usize,
    pub problems: Vec<ChrxProblem>,
    /// Some sample was seen diploid after being seen haploid.
    pub ploidy_error: bool,
    /// Some sample's mixed-genotype rate exceeded the threshold.
    pub missing_rate_error: bool,
}

pub struct PloidyTracker {
    seen_haploid: BitVec,
    warned: BitVec,
    mixed: Vec<usize>,
    sites: usize,
    problems: Vec<ChrxProblem>,
    ploidy_error: bool,
}

impl PloidyTracker {
    pub fn new(num_samples: usize) -> Self {
        Self {
            seen_haploid: bitvec![0; num_samples],
            warned: bitvec![0; num_samples],
            mixed: vec![0; num_samples],
            sites: 0,
            problems: Vec::new(),
            ploidy_error: false,
        }
    }

    /// Record the genotype shapes of one nonPAR site.
    pub fn observe(&mut self, site: &Site, samples: &IndexSet<String>) {
        self.sites += 1;
        for (idx, genotype) in site.genotypes.iter().enumerate() {
            if genotype.is_haploid() {
                self.seen_haploid.set(idx, true);
            } else if genotype.is_diploid() && self.seen_haploid[idx] {
                let sample = sample_name(samples, idx);
                if !self.warned[idx] {
                    warn!(
                        "Sample {} is diploid at {}:{} after a haploid call",
                        sample, site.chromosome, site.position
                    );
                    self.warned.set(idx, true);
                }
                self.problems.push(ChrxProblem {
                    sample,
                    position: format!("{}:{}", site.chromosome, site.position),
                    problem: PLOIDY_PROBLEM.to_string(),
                });
                self.ploidy_error = true;
            }
            if genotype.is_mixed() {
                self.mixed[idx] += 1;
            }
        }
    }

    pub fn finish(mut self, samples: &IndexSet<String>, mixed_threshold: f64) -> PloidyReport {
        let mut missing_rate_error = false;
        if self.sites > 0 {
            for (idx, &mixed) in self.mixed.iter().enumerate() {
                let rate = mixed as f64 / self.sites as f64;
                if rate > mixed_threshold {
                    missing_rate_error = true;
                    self.problems.push(ChrxProblem {
                        sample: sample_name(samples, idx),
                        position: "-".to_string(),
                        problem: format!("{} ({:.4})", MIXED_GENOTYPES_PROBLEM, rate),
                    });
                }
            }
        }
        PloidyReport {
            non_par_sites: self.sites,
            problems: self.problems,
            ploidy_error: self.ploidy_error,
            missing_rate_error,
        }
    }
}

fn sample_name(samples: &IndexSet<String>, idx: usize) -> String {
    samples
        .get_index(idx)
        .cloned()
        .unwrap_or_else(|| format!("sample_{}", idx + 1))
}

/// Rewrite haploid GT subfields as homozygous phased diploids into `out`
/// (`0` becomes `0|0`, `.` becomes `.|.`). Other columns are copied.
pub fn normalize_haploid(line: &[u8], out: &mut Vec<u8>) {
    out.clear();
    let offset = line
        .split_str("\t")
        .nth(8)
        .and_then(genotype_offset);

    for (column, field) in line.split_str("\t").enumerate() {
        if column > 0 {
            out.push(b'\t');
        }
        match offset {
            Some(offset) if column >= 9 => normalize_sample(field, offset, out),
            _ => out.extend_from_slice(field),
        }
    }
}

fn normalize_sample(sample: &[u8], offset: usize, out: &mut Vec<u8>) {
    for (idx, subfield) in sample.split_str(":").enumerate() {
        if idx > 0 {
            out.push(b':');
        }
        let haploid = !subfield.is_empty() && !subfield.contains(&b'/') && !subfield.contains(&b'|');
        if idx == offset && haploid {
            out.extend_from_slice(subfield);
            out.push(b'|');
            out.extend_from_slice(subfield);
        } else {
            out.extend_from_slice(subfield);
        }
    }
}
