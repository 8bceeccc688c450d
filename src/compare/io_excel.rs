// Primitives for reading Excel files.

use std::io::Cursor;

use calamine::{DataType, Range, Reader, Xlsx};
use log::{debug, warn};
use snafu::prelude::*;

use consumption_compare::builder::TableBuilder;
use consumption_compare::{Cell, RawTable};

use crate::compare::config_reader::FileSource;
use crate::compare::*;

/// Reads the worksheet of an Excel file. The first row is the header.
pub fn read_excel_table(path: &str, bytes: &[u8], cfs: &FileSource) -> CmpResult<RawTable> {
    let wrange = get_range(path, bytes, cfs)?;

    let mut iter = wrange.rows();
    let header: Vec<String> = match iter.next() {
        Some(h) => h.iter().map(header_name).collect(),
        None => {
            warn!("read_excel_table: {}: the worksheet is empty", path);
            return Ok(RawTable::default());
        }
    };
    debug!("read_excel_table: header: {:?}", header);

    let mut builder = TableBuilder::with_header(header);
    for (idx, row) in iter.enumerate() {
        debug!("read_excel_table: idx: {:?} row: {:?}", idx, row);
        let cells: Vec<Cell> = row.iter().map(read_cell).collect();
        builder
            .add_row(cells)
            .context(MalformedTableSnafu { path })?;
    }
    debug!("read_excel_table: {}: {} rows", path, builder.num_rows());
    Ok(builder.build())
}

pub(crate) fn read_cell(cell: &DataType) -> Cell {
    match cell {
        DataType::Int(i) => Cell::Number(*i as f64),
        DataType::Float(f) => Cell::Number(*f),
        DataType::String(s) if s.trim().is_empty() => Cell::Empty,
        DataType::String(s) => Cell::Text(s.clone()),
        DataType::Bool(b) => Cell::Bool(*b),
        DataType::Empty => Cell::Empty,
        // #N/A, #REF! and friends carry no value.
        DataType::Error(e) => {
            debug!("read_cell: error cell {:?} read as empty", e);
            Cell::Empty
        }
        // Dates: kept as text, the pipeline decides what to do with them.
        other => Cell::Text(format!("{:?}", other)),
    }
}

fn header_name(cell: &DataType) -> String {
    match read_cell(cell) {
        Cell::Text(s) => s,
        Cell::Number(n) => n.to_string(),
        Cell::Bool(b) => b.to_string(),
        Cell::Empty => String::new(),
    }
}

fn get_range(path: &str, bytes: &[u8], cfs: &FileSource) -> CmpResult<Range<DataType>> {
    let worksheet_name_o = cfs.excel_worksheet_name.clone();
    debug!(
        "read_excel_file: path: {:?} worksheet: {:?}",
        &path, &worksheet_name_o
    );
    let mut workbook: Xlsx<_> =
        Xlsx::new(Cursor::new(bytes)).context(OpeningExcelSnafu { path })?;

    // A worksheet name was provided, use it.
    if let Some(worksheet_name) = worksheet_name_o {
        let wrange = workbook
            .worksheet_range(&worksheet_name)
            .context(MissingWorksheetSnafu {
                path,
                worksheet: worksheet_name.clone(),
            })?
            .context(OpeningExcelSnafu { path })?;
        Ok(wrange)
    } else {
        // Like most spreadsheet tools, default to the first worksheet.
        let wrange = workbook
            .worksheet_range_at(0)
            .context(EmptyExcelSnafu { path })?
            .context(OpeningExcelSnafu { path })?;
        Ok(wrange)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::CellErrorType;

    fn meters_workbook() -> (String, Vec<u8>) {
        let path = format!("{}/testdata/meters.xlsx", env!("CARGO_MANIFEST_DIR"));
        let bytes = std::fs::read(&path).unwrap();
        (path, bytes)
    }

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    #[test]
    fn cells() {
        assert_eq!(read_cell(&DataType::Int(3)), Cell::Number(3.0));
        assert_eq!(read_cell(&DataType::Float(2.5)), Cell::Number(2.5));
        assert_eq!(read_cell(&DataType::String("  ".to_string())), Cell::Empty);
        assert_eq!(
            read_cell(&DataType::String("Finance".to_string())),
            Cell::Text("Finance".to_string())
        );
        assert_eq!(read_cell(&DataType::Bool(true)), Cell::Bool(true));
        assert_eq!(read_cell(&DataType::Empty), Cell::Empty);
        assert_eq!(header_name(&DataType::Float(2022.0)), "2022");
        assert_eq!(read_cell(&DataType::Error(CellErrorType::NA)), Cell::Empty);
    }

    #[test]
    fn reads_the_first_worksheet_by_default() {
        let (path, bytes) = meters_workbook();
        let cfs = FileSource::from_path(&path);
        let t = read_excel_table(&path, &bytes, &cfs).unwrap();
        assert_eq!(
            t.header,
            vec!["Setor", "PATM", "Contador Atual", "Contador Anterior"]
        );
        assert_eq!(t.rows.len(), 4);
        assert_eq!(
            t.rows[0],
            vec![text("A"), text("x"), Cell::Number(100.0), Cell::Number(40.0)]
        );
        // The #N/A sector
        assert_eq!(t.rows[2][0], Cell::Empty);
        assert_eq!(t.rows[3][0], text("Trafos: 4784/4709/4788"));
    }

    #[test]
    fn reads_a_named_worksheet() {
        let (path, bytes) = meters_workbook();
        let mut cfs = FileSource::from_path(&path);
        cfs.excel_worksheet_name = Some("Fevereiro".to_string());
        let t = read_excel_table(&path, &bytes, &cfs).unwrap();
        assert_eq!(t.header, vec!["Setor", "Contador Atual", "Contador Anterior"]);
        assert_eq!(t.rows.len(), 4);
        assert_eq!(
            t.rows[1],
            vec![text("B"), Cell::Number(20.0), Cell::Number(5.0)]
        );
        assert_eq!(t.rows[3], vec![text("D"), Cell::Empty, Cell::Number(3.0)]);
    }

    #[test]
    fn missing_worksheet() {
        let (path, bytes) = meters_workbook();
        let mut cfs = FileSource::from_path(&path);
        cfs.excel_worksheet_name = Some("Marco".to_string());
        match read_excel_table(&path, &bytes, &cfs) {
            Err(CmpError::MissingWorksheet { worksheet, .. }) => assert_eq!(worksheet, "Marco"),
            x => panic!("unexpected result {:?}", x),
        }
    }

    #[test]
    fn not_an_excel_file() {
        let cfs = FileSource::from_path("broken.xlsx");
        let res = read_excel_table("broken.xlsx", b"Setor,Contador Atual\n", &cfs);
        assert!(matches!(res, Err(CmpError::OpeningExcel { .. })));
    }
}
