// Primitives for reading and writing CSV files.

use log::debug;
use snafu::prelude::*;

use consumption_compare::builder::TableBuilder;
use consumption_compare::{Cell, ComparisonRow, RawTable, SectorConsumption};

use crate::compare::config_reader::FileSource;
use crate::compare::*;

pub const COMPARISON_CSV_HEADER: [&str; 6] = [
    "sector",
    "consumption_previous",
    "consumption_current",
    "difference",
    "pct_variation",
    "trend",
];

pub const AGGREGATE_CSV_HEADER: [&str; 2] = ["sector", "consumption"];

/// Spreadsheet tools often export CSV files in Latin-1 (Windows-1252). Fields that
/// are not valid UTF-8 are read as Latin-1.
fn decode_field(field: &[u8]) -> String {
    match std::str::from_utf8(field) {
        Ok(s) => s.to_string(),
        Err(_) => field.iter().map(|&b| b as char).collect(),
    }
}

/// Reads a CSV table. The first record is the header, all the other fields are kept as text.
pub fn read_csv_table(path: &str, bytes: &[u8], cfs: &FileSource) -> CmpResult<RawTable> {
    let rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(cfs.csv_delimiter()?)
        .from_reader(bytes);
    let mut records = rdr.into_byte_records();

    let header: Vec<String> = match records.next() {
        Some(line_r) => line_r
            .context(CsvParseSnafu { path })?
            .iter()
            .map(decode_field)
            .collect(),
        None => return Ok(RawTable::default()),
    };
    debug!("read_csv_table: header: {:?}", header);

    let mut builder = TableBuilder::with_header(header);
    for (idx, line_r) in records.enumerate() {
        let line = line_r.context(CsvParseSnafu { path })?;
        debug!("read_csv_table: lineno: {:?} {:?}", idx + 2, line);
        let cells: Vec<Cell> = line
            .iter()
            .map(decode_field)
            .map(|s| {
                if s.trim().is_empty() {
                    Cell::Empty
                } else {
                    Cell::Text(s)
                }
            })
            .collect();
        builder
            .add_row(cells)
            .context(MalformedTableSnafu { path })?;
    }
    Ok(builder.build())
}

pub fn write_comparison_csv(path: &str, rows: &[ComparisonRow]) -> CmpResult<()> {
    let mut wtr = csv::Writer::from_path(path).context(CsvWriteSnafu { path })?;
    wtr.write_record(COMPARISON_CSV_HEADER)
        .context(CsvWriteSnafu { path })?;
    for r in rows {
        wtr.write_record(&[
            r.sector.clone(),
            r.consumption_previous.to_string(),
            r.consumption_current.to_string(),
            r.difference.to_string(),
            r.pct_variation.to_string(),
            r.trend.label().to_string(),
        ])
        .context(CsvWriteSnafu { path })?;
    }
    wtr.flush().context(WritingFileSnafu { path })?;
    debug!("write_comparison_csv: {}: {} rows", path, rows.len());
    Ok(())
}

pub fn write_aggregate_csv(path: &str, sectors: &[SectorConsumption]) -> CmpResult<()> {
    let mut wtr = csv::Writer::from_path(path).context(CsvWriteSnafu { path })?;
    wtr.write_record(AGGREGATE_CSV_HEADER)
        .context(CsvWriteSnafu { path })?;
    for sc in sectors {
        wtr.write_record(&[sc.sector.clone(), sc.consumption.to_string()])
            .context(CsvWriteSnafu { path })?;
    }
    wtr.flush().context(WritingFileSnafu { path })?;
    debug!("write_aggregate_csv: {}: {} sectors", path, sectors.len());
    Ok(())
}
