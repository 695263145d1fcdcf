//! Allele concordance between a study site and its reference legend entry.

/// Relationship between study alleles `(ref, alt)` and legend alleles `(a, b)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Concordance {
    /// `(ref, alt) == (a, b)`
    Match,
    /// Both pairs are A/T, or both are C/G; strand cannot be told from the alleles.
    Complicated,
    /// `(ref, alt) == (b, a)`
    AlleleSwitch,
    /// `(ref, alt)` is the complement of `(a, b)`.
    StrandFlip,
    /// `(ref, alt)` is the complement of `(b, a)`.
    StrandFlipAndSwitch,
    Mismatch,
}

impl Concordance {
    /// Classify a study allele pair against a legend pair.
    ///
    /// The checks run in a fixed order: match, complicated, switch, flip,
    /// flip + switch. Complicated pairs are resolved before any strand-flip
    /// test so that A/T and C/G sites never show up as flips.
    pub fn classify(study_ref: &str, study_alt: &str, legend_a: &str, legend_b: &str) -> Self {
        if study_ref == legend_a && study_alt == legend_b {
            return Concordance::Match;
        }
        if is_complicated(study_ref, study_alt, legend_a, legend_b) {
            return Concordance::Complicated;
        }
        if study_ref == legend_b && study_alt == legend_a {
            return Concordance::AlleleSwitch;
        }
        let flipped_ref = complement(study_ref);
        let flipped_alt = complement(study_alt);
        if flipped_ref == legend_a && flipped_alt == legend_b {
            return Concordance::StrandFlip;
        }
        if flipped_ref == legend_b && flipped_alt == legend_a {
            return Concordance::StrandFlipAndSwitch;
        }
        Concordance::Mismatch
    }

    /// Sites in this class are removed from the chunk.
    pub fn is_excluded(self) -> bool {
        matches!(
            self,
            Concordance::StrandFlip | Concordance::StrandFlipAndSwitch | Concordance::Mismatch
        )
    }
}

/// Both pairs are `{A,T}` or both are `{C,G}`.
pub fn is_complicated(study_ref: &str, study_alt: &str, legend_a: &str, legend_b: &str) -> bool {
    let study = genotype_class(study_ref, study_alt);
    study.is_some() && study == genotype_class(legend_a, legend_b)
}

/// IUPAC classes of palindromic SNP pairs.
#[derive(PartialEq, Eq)]
enum PalindromicPair {
    Weak,
    Strong,
}

fn genotype_class(a: &str, b: &str) -> Option<PalindromicPair> {
    match (a, b) {
        ("A", "T") | ("T", "A") => Some(PalindromicPair::Weak),
        ("C", "G") | ("G", "C") => Some(PalindromicPair::Strong),
        _ => None,
    }
}

pub fn complement_base(base: u8) -> u8 {
    match base {
        b'A' => b'T',
        b'T' => b'A',
        b'C' => b'G',
        b'G' => b'C',
        other => other,
    }
}

pub fn complement(allele: &str) -> String {
    allele
        .bytes()
        .map(|b| complement_base(b) as char)
        .collect()
}
