//! Ticker activity export.
//!
//! Writes hourly mention counts and score sums per ticker in TXT, CSV or JSON,
//! either to a file or to any writer (stdout for the CLI).

use crate::error::Result;
use crate::models::{OutputFormat, TickerActivity};
use csv::Writer;
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Write activity rows to a file in the specified format.
///
/// Parent directories are created when missing.
///
/// # Errors
///
/// Returns an error if file creation or writing fails.
pub fn write_activity_to_file(rows: &[TickerActivity], format: OutputFormat, file_path: &Path) -> Result<()> {
    if let Some(parent) = file_path.parent() {
        if !parent.as_os_str().is_empty() {
            create_dir_all(parent)?;
        }
    }
    let file = File::create(file_path)?;
    write_activity(rows, format, BufWriter::new(file))
}

/// Write activity rows to `writer` in the specified format.
pub fn write_activity<W: Write>(rows: &[TickerActivity], format: OutputFormat, writer: W) -> Result<()> {
    match format {
        OutputFormat::Txt => write_txt(rows, writer),
        OutputFormat::Csv => write_csv(rows, writer),
        OutputFormat::Json => write_json(rows, writer),
    }
}

/// Aligned table, one line per ticker and hour
fn write_txt<W: Write>(rows: &[TickerActivity], mut writer: W) -> Result<()> {
    writeln!(writer, "{:<13}  {:<10}  {:>8}  {:>10}  {}", "HOUR", "TICKER", "MENTIONS", "SCORE", "COMPANY")?;
    for row in rows {
        writeln!(
            writer,
            "{:<13}  {:<10}  {:>8}  {:>10}  {}",
            row.hour, row.ticker, row.mention_count, row.total_score, row.company_name
        )?;
    }
    writer.flush()?;
    Ok(())
}

/// Header row: `hour,ticker,company_name,mention_count,total_score`
fn write_csv<W: Write>(rows: &[TickerActivity], writer: W) -> Result<()> {
    let mut writer = Writer::from_writer(writer);
    writer.write_record(["hour", "ticker", "company_name", "mention_count", "total_score"])?;

    for row in rows {
        writer.write_record([
            row.hour.as_str(),
            row.ticker.as_str(),
            row.company_name.as_str(),
            row.mention_count.to_string().as_str(),
            row.total_score.to_string().as_str(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

fn write_json<W: Write>(rows: &[TickerActivity], mut writer: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, rows)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<TickerActivity> {
        vec![TickerActivity {
            ticker: "GME".into(),
            company_name: "GameStop Corp.".into(),
            hour: "2026-01-28 14".into(),
            mention_count: 3,
            total_score: 120,
        }]
    }

    #[test]
    fn test_csv_has_header_and_row() {
        let mut out = Vec::new();
        write_activity(&rows(), OutputFormat::Csv, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("hour,ticker,company_name,mention_count,total_score"));
        assert_eq!(lines.next(), Some("2026-01-28 14,GME,GameStop Corp.,3,120"));
    }

    #[test]
    fn test_json_round_trips() {
        let mut out = Vec::new();
        write_activity(&rows(), OutputFormat::Json, &mut out).unwrap();
        let parsed: Vec<TickerActivity> = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed, rows());
    }
}
