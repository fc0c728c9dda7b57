//! CSV export of the result table.
//!
//! One row per sample: the original columns, `weightedScore`, then one
//! column per question holding its normalized score.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use samplecoach_core::report::EvaluationReport;

/// Write the result table as CSV to any writer.
pub fn write_csv<W: Write>(report: &EvaluationReport, writer: W) -> Result<()> {
    let mut wtr = ::csv::Writer::from_writer(writer);
    wtr.write_record(report.table_header())?;
    for row in report.table_rows() {
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Generate the result table as a CSV string.
pub fn generate_csv(report: &EvaluationReport) -> Result<String> {
    let mut buf = Vec::new();
    write_csv(report, &mut buf)?;
    String::from_utf8(buf).context("CSV output was not valid UTF-8")
}

/// Write a CSV report to a file.
pub fn write_csv_report(report: &EvaluationReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    write_csv(report, file).with_context(|| format!("failed to write CSV to {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn csv_has_header_and_one_row_per_sample() {
        let csv = generate_csv(&fixtures::report()).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("goal,text,weightedScore,grammar,length"));
        assert_eq!(lines.next(), Some("Sell shoes,\"Buy <our> shoes, \"\"now\"\"\",1,1,"));
        assert_eq!(lines.next(), Some("Sell shoes,shoes buy,0,0,"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn csv_reloads_as_samples() {
        let csv = generate_csv(&fixtures::report()).unwrap();
        let table = samplecoach_core::parser::load_samples_from_reader(csv.as_bytes()).unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].get("text"), Some("Buy <our> shoes, \"now\""));
        assert_eq!(table.rows[1].get("weightedScore"), Some("0"));
    }

    #[test]
    fn csv_report_write_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("results.csv");
        write_csv_report(&fixtures::report(), &path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("goal,text,weightedScore"));
    }
}
