pub use crate::config::*;

/// A builder for raw tables.
///
/// The readers use it to assemble the tables cell by cell. It is also the
/// simplest way to feed data to the pipeline from code.
///
/// ```
/// use consumption_compare::builder::TableBuilder;
/// use consumption_compare::{normalize_and_aggregate, NormalizeOptions};
/// # use consumption_compare::PipelineError;
///
/// let mut builder = TableBuilder::new(&["Setor", "Contador Atual", "Contador Anterior"]);
/// builder.add_text_row(&["Finance", "180", "100"])?;
/// builder.add_text_row(&["Finance", "25", "5"])?;
///
/// let agg = normalize_and_aggregate(&builder.build(), &NormalizeOptions::default())?;
/// assert_eq!(agg.get("Finance"), Some(100.0));
///
/// # Ok::<(), PipelineError>(())
/// ```
pub struct Builder {
    pub(crate) _header: Vec<String>,
    pub(crate) _rows: Vec<Vec<Cell>>,
}

pub type TableBuilder = Builder;

impl Builder {
    pub fn new(header: &[&str]) -> Builder {
        Builder::with_header(header.iter().map(|s| s.to_string()).collect())
    }

    pub fn with_header(header: Vec<String>) -> Builder {
        Builder {
            _header: header,
            _rows: Vec::new(),
        }
    }

    /// Adds a row of textual cells. Empty strings are empty cells.
    pub fn add_text_row(&mut self, cells: &[&str]) -> Result<(), PipelineError> {
        let row = cells
            .iter()
            .map(|s| {
                if s.is_empty() {
                    Cell::Empty
                } else {
                    Cell::Text(s.to_string())
                }
            })
            .collect();
        self.add_row(row)
    }

    /// Adds a row. The row may be shorter than the header, but not longer.
    pub fn add_row(&mut self, cells: Vec<Cell>) -> Result<(), PipelineError> {
        if cells.len() > self._header.len() {
            return Err(PipelineError::MalformedRow {
                row: self._rows.len() + 1,
                width: cells.len(),
                header_width: self._header.len(),
            });
        }
        self._rows.push(cells);
        Ok(())
    }

    pub fn num_rows(&self) -> usize {
        self._rows.len()
    }

    pub fn build(self) -> RawTable {
        RawTable {
            header: self._header,
            rows: self._rows,
        }
    }
}
