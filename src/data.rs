//! Output rows produced by the analysis entry points.

use std::io::Write;

use serde::Serialize;

use crate::error::Result;
use crate::nucleotide::unhash;

/// One k-mer's results.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KmerRow {
    /// K-mer hash.
    pub kmer: u32,
    /// Count, enrichment, or bootstrap mean depending on the pipeline.
    pub score: f64,
    /// Raw count, present for plain counting.
    pub count: Option<u32>,
    /// Bootstrap standard deviation.
    pub stdev: Option<f64>,
    /// Two-sided Welch t-test p-value.
    pub pval: Option<f64>,
}

impl KmerRow {
    pub(crate) fn scored(kmer: u32, score: f64) -> Self {
        Self {
            kmer,
            score,
            count: None,
            stdev: None,
            pval: None,
        }
    }
}

/// The emitted result table: `4^k` rows for counting and enrichment,
/// `min(iters, 4^k)` rows for IKKE.
#[derive(Debug, Clone)]
pub struct KmerData {
    k: u32,
    use_t: bool,
    rows: Vec<KmerRow>,
}

#[derive(Serialize)]
struct JsonRow<'a> {
    kmer: &'a str,
    score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stdev: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pval: Option<f64>,
}

impl KmerData {
    pub(crate) fn new(k: u32, use_t: bool, rows: Vec<KmerRow>) -> Self {
        Self { k, use_t, rows }
    }

    /// The k the rows were computed for.
    #[must_use]
    pub fn k(&self) -> u32 {
        self.k
    }

    /// The result rows, in emitted order.
    #[must_use]
    pub fn rows(&self) -> &[KmerRow] {
        &self.rows
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// `true` when there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Renders a row's k-mer string, honoring the configured T/U rendering.
    #[must_use]
    pub fn kmer_string(&self, row: &KmerRow) -> String {
        unhash(row.kmer, self.k, self.use_t)
    }

    /// Writes rows as tab-separated values: kmer, score, then whichever of
    /// count, stdev, and pval are present.
    ///
    /// # Errors
    ///
    /// Fails when the writer does.
    pub fn write_tsv<W: Write>(&self, mut writer: W) -> Result<()> {
        for row in &self.rows {
            write!(writer, "{}\t{}", self.kmer_string(row), row.score)?;
            if let Some(count) = row.count {
                write!(writer, "\t{count}")?;
            }
            if let Some(stdev) = row.stdev {
                write!(writer, "\t{stdev}")?;
            }
            if let Some(pval) = row.pval {
                write!(writer, "\t{pval}")?;
            }
            writeln!(writer)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Writes rows as a JSON array.
    ///
    /// # Errors
    ///
    /// Fails when the writer does or serialization fails.
    pub fn write_json<W: Write>(&self, mut writer: W) -> Result<()> {
        let rendered: Vec<String> = self.rows.iter().map(|r| self.kmer_string(r)).collect();
        let json_rows: Vec<JsonRow<'_>> = self
            .rows
            .iter()
            .zip(&rendered)
            .map(|(row, kmer)| JsonRow {
                kmer,
                score: row.score,
                count: row.count,
                stdev: row.stdev,
                pval: row.pval,
            })
            .collect();
        serde_json::to_writer_pretty(&mut writer, &json_rows)?;
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> KmerData {
        KmerData::new(
            2,
            true,
            vec![
                KmerRow {
                    kmer: 1,
                    score: 2.5,
                    count: Some(10),
                    stdev: None,
                    pval: None,
                },
                KmerRow::scored(15, 0.5),
            ],
        )
    }

    #[test]
    fn kmer_strings_render_with_t_or_u() {
        let data = sample();
        assert_eq!(data.kmer_string(&data.rows()[0]), "AC");
        assert_eq!(data.kmer_string(&data.rows()[1]), "TT");

        let rna = KmerData::new(2, false, vec![KmerRow::scored(15, 1.0)]);
        assert_eq!(rna.kmer_string(&rna.rows()[0]), "UU");
    }

    #[test]
    fn tsv_includes_optional_columns_when_present() {
        let data = sample();
        let mut out = Vec::new();
        data.write_tsv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "AC\t2.5\t10\nTT\t0.5\n");
    }

    #[test]
    fn json_omits_absent_fields() {
        let data = sample();
        let mut out = Vec::new();
        data.write_json(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("\"kmer\": \"AC\""));
        assert!(text.contains("\"count\": 10"));
        assert!(!text.contains("stdev"));
        assert!(!text.contains("pval"));
    }
}
