//! Reference panel legend files and their per-chromosome position index.
//!
//! A legend is a whitespace-delimited table with a header line whose first
//! four columns are `id position a0 a1`, optionally followed by
//! `<population>.aaf` alternative allele frequency columns.

use crate::core::error::ConfigError;
use crate::core::io::open_read_maybe_gz;
use crate::core::region::legend_chromosome;
use anyhow::{Context, Result};
use log::debug;
use std::io::BufRead;
use std::path::{Path, PathBuf};

const POSITION_COLUMN: usize = 1;
const ALLELE_A_COLUMN: usize = 2;
const ALLELE_B_COLUMN: usize = 3;

/// One reference panel site.
#[derive(Debug, Clone, PartialEq)]
pub struct LegendEntry {
    pub position: u64,
    pub allele_a: String,
    pub allele_b: String,
    pub frequency_a: f64,
    pub frequency_b: f64,
    /// `allele_a` followed by `allele_b`.
    pub genotype: String,
}

impl LegendEntry {
    pub fn new(position: u64, allele_a: &str, allele_b: &str, frequency_b: f64) -> Self {
        Self {
            position,
            allele_a: allele_a.to_string(),
            allele_b: allele_b.to_string(),
            frequency_a: 1.0 - frequency_b,
            frequency_b,
            genotype: format!("{}{}", allele_a, allele_b),
        }
    }
}

/// Position-sorted legend entries of one chromosome.
#[derive(Debug, Clone, Default)]
pub struct LegendIndex {
    chromosome: String,
    entries: Vec<LegendEntry>,
}

impl LegendIndex {
    /// Build from entries in any order; the first entry wins on repeated positions.
    pub fn from_entries(chromosome: &str, mut entries: Vec<LegendEntry>) -> Self {
        if !entries.windows(2).all(|w| w[0].position <= w[1].position) {
            entries.sort_by_key(|e| e.position);
        }
        entries.dedup_by_key(|e| e.position);
        Self {
            chromosome: chromosome.to_string(),
            entries,
        }
    }

    /// Load a legend file. With `population`, frequencies are read from the
    /// `<population>.aaf` column; otherwise they are zero.
    pub fn from_path<P: AsRef<Path>>(
        path: P,
        chromosome: &str,
        population: Option<&str>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let mut input = open_read_maybe_gz(path)?;

        // Legends come both space- and tab-delimited; decide from the header line.
        let delimiter = {
            let buf = input.fill_buf()?;
            let header_end = buf.iter().position(|&b| b == b'\n').unwrap_or(buf.len());
            if buf[..header_end].contains(&b'\t') {
                b'\t'
            } else {
                b' '
            }
        };

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(input);

        let frequency_column = match population {
            Some(population) => {
                let column = format!("{}.aaf", population);
                let headers = reader
                    .headers()
                    .with_context(|| format!("Failed to read legend header: {}", path.display()))?;
                let idx = headers.iter().position(|h| h == column).ok_or_else(|| {
                    ConfigError::PopulationNotFound {
                        population: population.to_string(),
                        path: path.to_path_buf(),
                    }
                })?;
                Some(idx)
            }
            None => None,
        };

        let mut entries = Vec::new();
        let mut record = csv::StringRecord::new();
        while reader
            .read_record(&mut record)
            .with_context(|| format!("Failed to read legend: {}", path.display()))?
        {
            let line = record.position().map(|p| p.line()).unwrap_or_default();
            let field = |idx: usize| {
                record.get(idx).with_context(|| {
                    format!("{}:{}: missing column {}", path.display(), line, idx + 1)
                })
            };

            let position: u64 = field(POSITION_COLUMN)?.parse().with_context(|| {
                format!("{}:{}: invalid legend position", path.display(), line)
            })?;
            let frequency_b = match frequency_column {
                Some(idx) => field(idx)?.parse::<f64>().with_context(|| {
                    format!("{}:{}: invalid allele frequency", path.display(), line)
                })?,
                None => 0.0,
            };

            entries.push(LegendEntry::new(
                position,
                field(ALLELE_A_COLUMN)?,
                field(ALLELE_B_COLUMN)?,
                frequency_b,
            ));
        }

        debug!(
            "Loaded {} legend entries for chromosome {} from {}",
            entries.len(),
            chromosome,
            path.display()
        );

        Ok(Self::from_entries(chromosome, entries))
    }

    pub fn chromosome(&self) -> &str {
        &self.chromosome
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at exactly `position`.
    pub fn get(&self, position: u64) -> Option<&LegendEntry> {
        let idx = self.entries.partition_point(|e| e.position < position);
        self.entries.get(idx).filter(|e| e.position == position)
    }

    /// Entry closest to `position`; ties go to the lower position.
    pub fn nearest(&self, position: u64) -> Option<&LegendEntry> {
        let idx = self.entries.partition_point(|e| e.position < position);
        let after = self.entries.get(idx);
        let before = idx.checked_sub(1).and_then(|i| self.entries.get(i));
        match (before, after) {
            (Some(b), Some(a)) => {
                if position - b.position <= a.position - position {
                    Some(b)
                } else {
                    Some(a)
                }
            }
            (b, a) => b.or(a),
        }
    }
}

/// Locates per-chromosome legend files from a path pattern containing `$chr`.
#[derive(Debug, Clone)]
pub struct LegendSource {
    pattern: String,
}

impl LegendSource {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }

    /// Legend path for a chromosome or region label (`X.nonPAR` resolves to `X`).
    pub fn path_for(&self, label: &str) -> PathBuf {
        PathBuf::from(self.pattern.replace("$chr", legend_chromosome(label)))
    }

    /// Load the legend for `label`; a missing file is a [`ConfigError::LegendNotFound`].
    pub fn load(&self, label: &str, population: Option<&str>) -> Result<LegendIndex> {
        let chromosome = legend_chromosome(label);
        let path = self.path_for(label);
        if !path.exists() {
            return Err(ConfigError::LegendNotFound {
                chromosome: chromosome.to_string(),
                path,
            }
            .into());
        }
        LegendIndex::from_path(&path, chromosome, population)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_legend(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_with_population() -> Result<()> {
        let dir = TempDir::new()?;
        let path = write_legend(
            dir.path(),
            "20.legend",
            "id position a0 a1 afr.aaf eur.aaf\n\
             rs1 100 A G 0.1 0.25\n\
             rs2 300 A T 0.2 0.5\n\
             rs3 200 C T 0.3 0.75\n",
        );
        let index = LegendIndex::from_path(&path, "20", Some("eur"))?;
        assert_eq!(index.len(), 3);

        let entry = index.get(100).unwrap();
        assert_eq!(entry.allele_a, "A");
        assert_eq!(entry.allele_b, "G");
        assert_eq!(entry.genotype, "AG");
        assert!((entry.frequency_b - 0.25).abs() < 1e-12);
        assert!((entry.frequency_a - 0.75).abs() < 1e-12);

        // Out-of-order input is sorted.
        assert_eq!(index.get(200).unwrap().allele_a, "C");
        assert!(index.get(150).is_none());
        Ok(())
    }

    #[test]
    fn test_load_tab_delimited_without_population() -> Result<()> {
        let dir = TempDir::new()?;
        let path = write_legend(
            dir.path(),
            "20.legend",
            "id\tposition\ta0\ta1\nrs1\t100\tA\tG\n",
        );
        let index = LegendIndex::from_path(&path, "20", None)?;
        assert_eq!(index.get(100).unwrap().frequency_b, 0.0);
        Ok(())
    }

    #[test]
    fn test_missing_population_column() {
        let dir = TempDir::new().unwrap();
        let path = write_legend(dir.path(), "20.legend", "id position a0 a1 eur.aaf\n");
        let err = LegendIndex::from_path(&path, "20", Some("afr")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::PopulationNotFound { .. })
        ));
    }

    #[test]
    fn test_duplicate_positions_keep_first() {
        let index = LegendIndex::from_entries(
            "20",
            vec![
                LegendEntry::new(100, "A", "G", 0.1),
                LegendEntry::new(100, "A", "C", 0.2),
                LegendEntry::new(50, "T", "C", 0.3),
            ],
        );
        assert_eq!(index.len(), 2);
        assert_eq!(index.get(100).unwrap().allele_b, "G");
    }

    #[test]
    fn test_nearest() {
        let index = LegendIndex::from_entries(
            "20",
            vec![
                LegendEntry::new(100, "A", "G", 0.1),
                LegendEntry::new(200, "A", "C", 0.2),
            ],
        );
        assert_eq!(index.nearest(10).unwrap().position, 100);
        assert_eq!(index.nearest(150).unwrap().position, 100);
        assert_eq!(index.nearest(151).unwrap().position, 200);
        assert_eq!(index.nearest(1000).unwrap().position, 200);
        assert!(LegendIndex::default().nearest(5).is_none());
    }

    #[test]
    fn test_source_resolves_pattern() {
        let source = LegendSource::new("/panels/1000g_chr$chr.legend.gz");
        assert_eq!(
            source.path_for("chr20"),
            PathBuf::from("/panels/1000g_chr20.legend.gz")
        );
        assert_eq!(
            source.path_for("X.PAR2"),
            PathBuf::from("/panels/1000g_chrX.legend.gz")
        );
    }

    #[test]
    fn test_source_missing_legend_is_config_error() {
        let dir = TempDir::new().unwrap();
        let pattern = dir.path().join("$chr.legend");
        let source = LegendSource::new(pattern.to_string_lossy());
        let err = source.load("21", None).unwrap_err();
        match err.downcast_ref::<ConfigError>() {
            Some(ConfigError::LegendNotFound { chromosome, .. }) => assert_eq!(chromosome, "21"),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
