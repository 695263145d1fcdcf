//! Streaming decoder for VCF data lines.
//!
//! A line is summarised into a [`Site`] without building per-genotype
//! objects: the GT subfield of every sample is scanned once and classified
//! from its counts of `0`, `1` and `.` characters.

use crate::core::error::FormatError;
use bitvec::prelude::*;
use bstr::ByteSlice;

const NUM_FIXED_COLUMNS: usize = 9;

/// Genotype class of one sample at one site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Call {
    HomRef,
    Het,
    HomVar,
    #[default]
    NoCall,
}

/// Shape of one sample's GT subfield.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SampleGenotype {
    pub call: Call,
    /// Number of alleles written (1 = haploid, 2 = diploid).
    pub alleles: u8,
    /// Number of `.` alleles.
    pub missing: u8,
    /// Diploid and separated by `|` only.
    pub phased: bool,
}

impl SampleGenotype {
    #[inline]
    pub fn is_called(self) -> bool {
        self.call != Call::NoCall
    }

    #[inline]
    pub fn is_haploid(self) -> bool {
        self.alleles == 1
    }

    #[inline]
    pub fn is_diploid(self) -> bool {
        self.alleles == 2
    }

    /// One allele called, the other missing (e.g. `0/.`).
    #[inline]
    pub fn is_mixed(self) -> bool {
        self.alleles == 2 && self.missing == 1
    }
}

/// Per-site genotype summary of one VCF data line.
///
/// Reused across lines: [`LineDecoder::decode_into`] overwrites every field,
/// so a `Site` is only meaningful until the next decode call.
#[derive(Debug, Default, Clone)]
pub struct Site {
    pub chromosome: String,
    pub position: u64,
    pub reference: String,
    pub alternate: String,
    pub filter: String,
    pub het: usize,
    pub hom_ref: usize,
    pub hom_var: usize,
    pub no_call: usize,
    /// Bit `i` is set when sample `i` has a called genotype.
    pub called: BitVec,
    pub genotypes: Vec<SampleGenotype>,
    raw: Vec<u8>,
}

impl Site {
    pub fn num_samples(&self) -> usize {
        self.genotypes.len()
    }

    /// The undecoded line, without its newline.
    pub fn raw_line(&self) -> &[u8] {
        &self.raw
    }

    /// `chrom:pos:ref:alt`
    pub fn id(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.chromosome, self.position, self.reference, self.alternate
        )
    }

    pub fn is_filtered(&self) -> bool {
        !matches!(self.filter.as_str(), "" | "." | "PASS")
    }

    pub fn is_multiallelic(&self) -> bool {
        self.alternate.contains(',')
    }

    pub fn is_indel(&self) -> bool {
        self.reference.len() > 1 || self.alternate.len() > 1
    }

    pub fn has_valid_alleles(&self) -> bool {
        is_valid_allele(&self.reference) && is_valid_allele(&self.alternate)
    }

    /// No sample carries the alternate allele.
    pub fn is_monomorphic(&self) -> bool {
        self.het == 0 && self.hom_var == 0
    }

    pub fn no_call_rate(&self) -> f64 {
        if self.genotypes.is_empty() {
            0.0
        } else {
            self.no_call as f64 / self.genotypes.len() as f64
        }
    }

    /// At least one diploid genotype, and every diploid genotype is phased.
    pub fn is_phased(&self) -> bool {
        let mut diploid = self.genotypes.iter().filter(|gt| gt.is_diploid()).peekable();
        diploid.peek().is_some() && diploid.all(|gt| gt.phased)
    }

    fn clear(&mut self) {
        self.chromosome.clear();
        self.position = 0;
        self.reference.clear();
        self.alternate.clear();
        self.filter.clear();
        self.het = 0;
        self.hom_ref = 0;
        self.hom_var = 0;
        self.no_call = 0;
        self.called.clear();
        self.genotypes.clear();
        self.raw.clear();
    }
}

fn is_valid_allele(allele: &str) -> bool {
    !allele.is_empty()
        && allele
            .bytes()
            .all(|b| matches!(b, b'A' | b'C' | b'G' | b'T'))
}

/// Number of `:`-delimited subfields in FORMAT before the `GT` key.
pub fn genotype_offset(format: &[u8]) -> Option<usize> {
    let idx = format.find(b"GT")?;
    Some(format[..idx].iter().filter(|&&b| b == b':').count())
}

/// Slice of a sample column holding its GT subfield.
pub fn genotype_subfield(sample: &[u8], offset: usize) -> &[u8] {
    let mut rest = sample;
    for _ in 0..offset {
        match rest.find_byte(b':') {
            Some(idx) => rest = &rest[idx + 1..],
            None => return &[],
        }
    }
    match rest.find_byte(b':') {
        Some(end) => &rest[..end],
        None => rest,
    }
}

/// Classify a GT subfield by a single scan over its characters.
pub fn classify_genotype(gt: &[u8]) -> SampleGenotype {
    let mut refs = 0u8;
    let mut alts = 0u8;
    let mut missing = 0u8;
    let mut separators = 0u8;
    let mut unphased = false;

    for &b in gt {
        match b {
            b'0' => refs = refs.saturating_add(1),
            b'1' => alts = alts.saturating_add(1),
            b'.' => missing = missing.saturating_add(1),
            b'/' => {
                separators = separators.saturating_add(1);
                unphased = true;
            }
            b'|' => separators = separators.saturating_add(1),
            _ => {}
        }
    }

    let call = match (refs, alts) {
        (0, 0) => Call::NoCall,
        (_, 0) => Call::HomRef,
        (0, _) => Call::HomVar,
        (1, 1) => Call::Het,
        _ => Call::NoCall,
    };

    SampleGenotype {
        call,
        alleles: if gt.is_empty() { 0 } else { separators.saturating_add(1) },
        missing,
        phased: separators > 0 && !unphased,
    }
}

/// Decodes data lines of one VCF with a known number of samples.
#[derive(Debug, Clone, Copy)]
pub struct LineDecoder {
    expected_samples: usize,
}

impl LineDecoder {
    pub fn new(expected_samples: usize) -> Self {
        Self { expected_samples }
    }

    pub fn expected_samples(&self) -> usize {
        self.expected_samples
    }

    /// Decode `line` (without newline) into `site`, replacing its contents.
    pub fn decode_into(&self, line: &[u8], site: &mut Site) -> Result<(), FormatError> {
        site.clear();

        let mut fields: [&[u8]; NUM_FIXED_COLUMNS + 1] = [&[]; NUM_FIXED_COLUMNS + 1];
        let mut num_fields = 0;
        for field in line.splitn_str(NUM_FIXED_COLUMNS + 1, "\t") {
            fields[num_fields] = field;
            num_fields += 1;
        }
        if num_fields < NUM_FIXED_COLUMNS + 1 {
            return Err(FormatError::ColumnCount(num_fields));
        }

        site.chromosome
            .push_str(fields[0].to_str().map_err(|_| FormatError::Encoding)?);
        let position = fields[1].to_str().map_err(|_| FormatError::Encoding)?;
        site.position = match position.parse::<u64>() {
            Ok(pos) if pos > 0 => pos,
            _ => return Err(FormatError::InvalidPosition(position.to_string())),
        };
        site.reference
            .push_str(fields[3].to_str().map_err(|_| FormatError::Encoding)?);
        site.alternate
            .push_str(fields[4].to_str().map_err(|_| FormatError::Encoding)?);
        site.filter
            .push_str(fields[6].to_str().map_err(|_| FormatError::Encoding)?);

        let format = fields[8];
        let offset = genotype_offset(format).ok_or_else(|| {
            FormatError::MissingGenotypeField(format.to_str_lossy().into_owned())
        })?;

        for sample in fields[9].split_str("\t") {
            let genotype = classify_genotype(genotype_subfield(sample, offset));
            match genotype.call {
                Call::HomRef => site.hom_ref += 1,
                Call::Het => site.het += 1,
                Call::HomVar => site.hom_var += 1,
                Call::NoCall => site.no_call += 1,
            }
            site.called.push(genotype.is_called());
            site.genotypes.push(genotype);
        }

        if site.genotypes.len() != self.expected_samples {
            return Err(FormatError::SampleCount {
                expected: self.expected_samples,
                found: site.genotypes.len(),
            });
        }

        site.raw.extend_from_slice(line);
        Ok(())
    }
}
