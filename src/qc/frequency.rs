//! Chi-square comparison of study allele frequencies with legend frequencies.

use crate::legend::LegendEntry;
use crate::vcf::Site;
use serde::{Serialize, Serializer};

fn fixed6<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("{:.6}", value))
}

/// One row of the MAF statistics file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrequencyRecord {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Position")]
    pub position: String,
    #[serde(rename = "AlleleA")]
    pub allele_a: String,
    #[serde(rename = "AlleleB")]
    pub allele_b: String,
    #[serde(rename = "FreqA", serialize_with = "fixed6")]
    pub freq_a: f64,
    #[serde(rename = "FreqB", serialize_with = "fixed6")]
    pub freq_b: f64,
    #[serde(rename = "RefAlleleA")]
    pub ref_allele_a: String,
    #[serde(rename = "RefAlleleB")]
    pub ref_allele_b: String,
    #[serde(rename = "RefFreqA", serialize_with = "fixed6")]
    pub ref_freq_a: f64,
    #[serde(rename = "RefFreqB", serialize_with = "fixed6")]
    pub ref_freq_b: f64,
    #[serde(rename = "Chisq", serialize_with = "fixed6")]
    pub chisq: f64,
    #[serde(rename = "OverlapWithReference")]
    pub overlap: bool,
    #[serde(rename = "Type")]
    pub kind: &'static str,
}

/// Reference (`p`) and alternate (`q`) allele frequencies among called samples.
pub fn study_frequencies(site: &Site) -> (f64, f64) {
    let ref_alleles = 2 * site.hom_ref + site.het;
    let alt_alleles = 2 * site.hom_var + site.het;
    let total = ref_alleles + alt_alleles;
    if total == 0 {
        return (0.0, 0.0);
    }
    let p = ref_alleles as f64 / total as f64;
    (p, 1.0 - p)
}

fn chisq_term(frequency: f64, ref_frequency: f64, study_n: f64, ref_n: f64) -> f64 {
    let observed = frequency * study_n;
    let total = observed + ref_frequency * ref_n;
    let expected = total / (study_n + ref_n) * study_n;
    let delta = observed - expected;
    let mut chisq = 0.0;
    if expected > 0.0 {
        chisq += delta * delta / expected;
    }
    if total - expected > 0.0 {
        chisq += delta * delta / (total - expected);
    }
    chisq
}

/// Two-allele chi-square statistic of study frequencies `(p, q)` against
/// reference frequencies `(ref_a, ref_b)`.
pub fn chisq(p: f64, q: f64, study_n: usize, ref_a: f64, ref_b: f64, ref_n: usize) -> f64 {
    let (study_n, ref_n) = (study_n as f64, ref_n as f64);
    if study_n + ref_n == 0.0 {
        return 0.0;
    }
    chisq_term(q, ref_b, study_n, ref_n) + chisq_term(p, ref_a, study_n, ref_n)
}

/// Compare one site with its legend entry; `switched` swaps study `p` and `q`
/// so that they line up with the legend's allele order.
pub fn compare(
    site: &Site,
    entry: &LegendEntry,
    switched: bool,
    reference_samples: usize,
) -> FrequencyRecord {
    let (mut p, mut q) = study_frequencies(site);
    if switched {
        std::mem::swap(&mut p, &mut q);
    }
    let study_n = site.het + site.hom_ref + site.hom_var;

    FrequencyRecord {
        id: site.id(),
        position: format!("{}:{}", site.chromosome, site.position),
        allele_a: site.reference.clone(),
        allele_b: site.alternate.clone(),
        freq_a: p,
        freq_b: q,
        ref_allele_a: entry.allele_a.clone(),
        ref_allele_b: entry.allele_b.clone(),
        ref_freq_a: entry.frequency_a,
        ref_freq_b: entry.frequency_b,
        chisq: chisq(
            p,
            q,
            study_n,
            entry.frequency_a,
            entry.frequency_b,
            reference_samples,
        ),
        overlap: true,
        kind: "SNP",
    }
}
