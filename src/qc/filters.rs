//! Ordered site-level rejection rules.

use crate::legend::LegendIndex;
use crate::qc::concordance::Concordance;
use crate::qc::config::QcConfig;
use crate::qc::frequency::{self, FrequencyRecord};
use crate::vcf::Site;
use std::fmt;

/// Why a site was removed from a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SiteRejection {
    Multiallelic,
    InvalidAlleles,
    Duplicate,
    FilterFlag,
    NonSnp,
    Monomorphic,
    AlleleMismatch,
    StrandFlip,
    StrandFlipAndSwitch,
    LowCallRate,
}

impl SiteRejection {
    /// Label written to the excluded-sites log.
    pub fn label(self) -> &'static str {
        match self {
            SiteRejection::Multiallelic => "Multiallelic",
            SiteRejection::InvalidAlleles => "Invalid Alleles",
            SiteRejection::Duplicate => "Duplicate",
            SiteRejection::FilterFlag => "FILTER",
            SiteRejection::NonSnp => "InDel",
            SiteRejection::Monomorphic => "Monomorphic",
            SiteRejection::AlleleMismatch => "Allele mismatch",
            SiteRejection::StrandFlip => "Strand flip",
            SiteRejection::StrandFlipAndSwitch => "Strand flip and Allele switch",
            SiteRejection::LowCallRate => "Low call rate",
        }
    }

    fn from_concordance(concordance: Concordance) -> Option<Self> {
        match concordance {
            Concordance::StrandFlip => Some(SiteRejection::StrandFlip),
            Concordance::StrandFlipAndSwitch => Some(SiteRejection::StrandFlipAndSwitch),
            Concordance::Mismatch => Some(SiteRejection::AlleleMismatch),
            Concordance::Match | Concordance::Complicated | Concordance::AlleleSwitch => None,
        }
    }
}

impl fmt::Display for SiteRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub reason: SiteRejection,
    pub info: Option<String>,
}

impl Rejection {
    fn new(reason: SiteRejection) -> Self {
        Self { reason, info: None }
    }

    fn with_info(reason: SiteRejection, info: String) -> Self {
        Self {
            reason,
            info: Some(info),
        }
    }
}

/// Result of running the cascade on one site for one chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum SiteOutcome {
    /// Removed before the legend was consulted.
    Rejected(Rejection),
    /// Kept; the legend has no entry at this position.
    NotInLegend,
    /// Found in the legend; `rejection` is set when concordance or call rate failed.
    InLegend {
        concordance: Concordance,
        frequency: Option<FrequencyRecord>,
        rejection: Option<Rejection>,
    },
}

impl SiteOutcome {
    pub fn is_accepted(&self) -> bool {
        match self {
            SiteOutcome::Rejected(_) => false,
            SiteOutcome::NotInLegend => true,
            SiteOutcome::InLegend { rejection, .. } => rejection.is_none(),
        }
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            SiteOutcome::Rejected(rejection) => Some(rejection),
            SiteOutcome::NotInLegend => None,
            SiteOutcome::InLegend { rejection, .. } => rejection.as_ref(),
        }
    }
}

/// The per-site rules of one chromosome, bound to its legend.
pub struct FilterCascade<'a> {
    config: &'a QcConfig,
    legend: &'a LegendIndex,
    num_samples: usize,
}

impl<'a> FilterCascade<'a> {
    pub fn new(config: &'a QcConfig, legend: &'a LegendIndex, num_samples: usize) -> Self {
        Self {
            config,
            legend,
            num_samples,
        }
    }

    /// Run all rules in order against `site`.
    ///
    /// `last_pos` is the chunk's duplicate tracker; it advances for every
    /// unfiltered site that reaches the duplicate rule. Frequencies are only
    /// computed when `with_frequency` is set.
    pub fn evaluate(&self, site: &Site, last_pos: &mut u64, with_frequency: bool) -> SiteOutcome {
        if site.is_multiallelic() {
            return SiteOutcome::Rejected(Rejection::new(SiteRejection::Multiallelic));
        }

        if !site.has_valid_alleles() {
            return SiteOutcome::Rejected(Rejection::new(SiteRejection::InvalidAlleles));
        }

        if *last_pos > 0 && *last_pos == site.position {
            return SiteOutcome::Rejected(Rejection::new(SiteRejection::Duplicate));
        }
        if !site.is_filtered() {
            *last_pos = site.position;
        }

        if site.is_filtered() {
            let reason = if site.filter.contains("DUP") {
                SiteRejection::Duplicate
            } else {
                SiteRejection::FilterFlag
            };
            return SiteOutcome::Rejected(Rejection::with_info(reason, site.filter.clone()));
        }

        if site.is_indel() {
            return SiteOutcome::Rejected(Rejection::new(SiteRejection::NonSnp));
        }

        if self.num_samples > self.config.min_samples_monomorphic && site.is_monomorphic() {
            return SiteOutcome::Rejected(Rejection::new(SiteRejection::Monomorphic));
        }

        let Some(entry) = self.legend.get(site.position) else {
            return SiteOutcome::NotInLegend;
        };

        let concordance = Concordance::classify(
            &site.reference,
            &site.alternate,
            &entry.allele_a,
            &entry.allele_b,
        );

        if let Some(reason) = SiteRejection::from_concordance(concordance) {
            return SiteOutcome::InLegend {
                concordance,
                frequency: None,
                rejection: Some(Rejection::with_info(
                    reason,
                    format!("{}/{}", entry.allele_a, entry.allele_b),
                )),
            };
        }

        let frequency = if with_frequency && self.config.population().is_some() {
            let switched = site.reference != entry.allele_a;
            Some(frequency::compare(
                site,
                entry,
                switched,
                self.config.reference_samples,
            ))
        } else {
            None
        };

        let rejection = if site.no_call_rate() > self.config.max_site_missing_rate {
            Some(Rejection::with_info(
                SiteRejection::LowCallRate,
                format!("{:.4}", 1.0 - site.no_call_rate()),
            ))
        } else {
            None
        };

        SiteOutcome::InLegend {
            concordance,
            frequency,
            rejection,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::legend::LegendEntry;
    use crate::vcf::LineDecoder;
    use rstest::rstest;

    fn legend() -> LegendIndex {
        LegendIndex::from_entries(
            "20",
            vec![
                LegendEntry::new(100, "A", "G", 0.2),
                LegendEntry::new(200, "A", "G", 0.2),
                LegendEntry::new(300, "T", "A", 0.2),
                LegendEntry::new(400, "T", "G", 0.2),
                LegendEntry::new(500, "G", "T", 0.2),
                LegendEntry::new(600, "C", "A", 0.2),
            ],
        )
    }

    fn site(line: &str) -> Site {
        let samples = line.split('\t').count() - 9;
        let mut site = Site::default();
        LineDecoder::new(samples)
            .decode_into(line.as_bytes(), &mut site)
            .unwrap();
        site
    }

    fn evaluate(config: &QcConfig, line: &str) -> SiteOutcome {
        let legend = legend();
        let s = site(line);
        let cascade = FilterCascade::new(config, &legend, s.num_samples());
        let mut last_pos = 0;
        cascade.evaluate(&s, &mut last_pos, true)
    }

    fn rejection_of(outcome: &SiteOutcome) -> Option<SiteRejection> {
        outcome.rejection().map(|r| r.reason)
    }

    #[rstest]
    #[case("20\t100\t.\tA\tG,T\t.\tPASS\t.\tGT\t0/1\t0/2", Some(SiteRejection::Multiallelic))]
    #[case("20\t100\t.\tA\t*\t.\tPASS\t.\tGT\t0/1\t0/1", Some(SiteRejection::InvalidAlleles))]
    #[case("20\t100\t.\tA\tG\t.\tLowQual\t.\tGT\t0/1\t0/1", Some(SiteRejection::FilterFlag))]
    #[case("20\t100\t.\tA\tG\t.\tDUP_SITE\t.\tGT\t0/1\t0/1", Some(SiteRejection::Duplicate))]
    #[case("20\t100\t.\tAT\tG\t.\tPASS\t.\tGT\t0/1\t0/1", Some(SiteRejection::NonSnp))]
    #[case("20\t100\t.\tA\tG\t.\tPASS\t.\tGT\t0/0\t./.", Some(SiteRejection::Monomorphic))]
    #[case("20\t100\t.\tA\tG\t.\tPASS\t.\tGT\t0/1\t0/0", None)]
    #[case("20\t200\t.\tG\tA\t.\tPASS\t.\tGT\t0/1\t0/0", None)]
    #[case("20\t300\t.\tA\tT\t.\tPASS\t.\tGT\t0/1\t0/0", None)]
    #[case("20\t400\t.\tA\tC\t.\tPASS\t.\tGT\t0/1\t0/0", Some(SiteRejection::StrandFlip))]
    #[case("20\t500\t.\tA\tC\t.\tPASS\t.\tGT\t0/1\t0/0", Some(SiteRejection::StrandFlipAndSwitch))]
    #[case("20\t600\t.\tA\tG\t.\tPASS\t.\tGT\t0/1\t0/0", Some(SiteRejection::AlleleMismatch))]
    #[case("20\t100\t.\tA\tG\t.\tPASS\t.\tGT\t0/1\t./.", Some(SiteRejection::LowCallRate))]
    fn test_cascade_rules(#[case] line: &str, #[case] expected: Option<SiteRejection>) {
        let config = QcConfig {
            population: "eur".to_string(),
            ..Default::default()
        };
        assert_eq!(rejection_of(&evaluate(&config, line)), expected);
    }

    #[test]
    fn test_scenario_classes() {
        let config = QcConfig::default();
        let cases = [
            ("20\t100\t.\tA\tG\t.\tPASS\t.\tGT\t0/1\t0/0", Concordance::Match),
            ("20\t200\t.\tG\tA\t.\tPASS\t.\tGT\t0/1\t0/0", Concordance::AlleleSwitch),
            ("20\t300\t.\tA\tT\t.\tPASS\t.\tGT\t0/1\t0/0", Concordance::Complicated),
            ("20\t400\t.\tA\tC\t.\tPASS\t.\tGT\t0/1\t0/0", Concordance::StrandFlip),
            ("20\t500\t.\tA\tC\t.\tPASS\t.\tGT\t0/1\t0/0", Concordance::StrandFlipAndSwitch),
        ];
        for (line, expected) in cases {
            match evaluate(&config, line) {
                SiteOutcome::InLegend { concordance, .. } => assert_eq!(concordance, expected),
                other => panic!("unexpected outcome {:?}", other),
            }
        }
    }

    #[test]
    fn test_not_in_legend_is_accepted() {
        let outcome = evaluate(
            &QcConfig::default(),
            "20\t150\t.\tA\tG\t.\tPASS\t.\tGT\t0/1\t./.",
        );
        assert_eq!(outcome, SiteOutcome::NotInLegend);
        assert!(outcome.is_accepted());
    }

    #[test]
    fn test_frequency_only_with_population() {
        let line = "20\t100\t.\tA\tG\t.\tPASS\t.\tGT\t0/1\t0/0";
        let mixed = evaluate(&QcConfig::default(), line);
        assert!(matches!(mixed, SiteOutcome::InLegend { frequency: None, .. }));

        let config = QcConfig {
            population: "eur".to_string(),
            ..Default::default()
        };
        match evaluate(&config, line) {
            SiteOutcome::InLegend {
                frequency: Some(record),
                ..
            } => assert_eq!(record.id, "20:100:A:G"),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_monomorphic_needs_enough_samples() {
        let config = QcConfig {
            min_samples_monomorphic: 2,
            ..Default::default()
        };
        let outcome = evaluate(&config, "20\t100\t.\tA\tG\t.\tPASS\t.\tGT\t0/0\t0/0");
        assert_ne!(rejection_of(&outcome), Some(SiteRejection::Monomorphic));
    }

    #[test]
    fn test_duplicate_tracking() {
        let config = QcConfig::default();
        let legend = legend();
        let cascade = FilterCascade::new(&config, &legend, 2);
        let mut last_pos = 0;

        let first = site("20\t100\t.\tA\tG\t.\tPASS\t.\tGT\t0/1\t0/0");
        let repeat = site("20\t100\t.\tA\tC\t.\tPASS\t.\tGT\t0/1\t0/0");
        let filtered = site("20\t150\t.\tA\tC\t.\tLowQual\t.\tGT\t0/1\t0/0");
        let after_filtered = site("20\t150\t.\tA\tC\t.\tPASS\t.\tGT\t0/1\t0/0");

        assert!(cascade.evaluate(&first, &mut last_pos, false).is_accepted());
        assert_eq!(last_pos, 100);
        assert_eq!(
            rejection_of(&cascade.evaluate(&repeat, &mut last_pos, false)),
            Some(SiteRejection::Duplicate)
        );
        // A filtered site does not advance the tracker.
        assert_eq!(
            rejection_of(&cascade.evaluate(&filtered, &mut last_pos, false)),
            Some(SiteRejection::FilterFlag)
        );
        assert_eq!(last_pos, 100);
        assert!(cascade
            .evaluate(&after_filtered, &mut last_pos, false)
            .is_accepted());
        assert_eq!(last_pos, 150);
    }
}
