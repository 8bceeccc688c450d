// ********* Input data structures ***********

use std::error::Error;
use std::fmt::Display;

/// The content of one cell of an uploaded table.
///
/// Readers keep the cells loosely typed: numeric coercion is done by the
/// normalizer, not by the readers.
#[derive(PartialEq, Debug, Clone)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

/// A table as read from a spreadsheet: one header row and the data rows.
///
/// Rows may be shorter than the header, the missing cells are treated as empty.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct RawTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

// ******** Output data structures *********

/// The consumption of one sector over one period.
#[derive(PartialEq, Debug, Clone)]
pub struct SectorConsumption {
    pub sector: String,
    pub consumption: f64,
}

/// Counters collected while normalizing one table.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct NormalizationStats {
    pub rows_read: usize,
    pub rows_excluded: usize,
    pub rows_without_sector: usize,
    pub rows_zero_reading: usize,
    pub coercion_fallbacks: usize,
    pub dropped_columns: Vec<String>,
}

/// The aggregated consumption of all the sectors of one period, sorted by sector.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct SectorAggregate {
    pub sectors: Vec<SectorConsumption>,
    pub stats: NormalizationStats,
}

impl SectorAggregate {
    pub fn get(&self, sector: &str) -> Option<f64> {
        self.sectors
            .iter()
            .find(|sc| sc.sector == sector)
            .map(|sc| sc.consumption)
    }

    pub fn total(&self) -> f64 {
        self.sectors.iter().fold(0.0, |acc, sc| acc + sc.consumption)
    }

    /// True if both aggregates hold exactly the same sectors and consumptions.
    /// The normalization statistics are not considered.
    pub fn same_consumption(&self, other: &SectorAggregate) -> bool {
        self.sectors == other.sectors
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum Trend {
    Increased,
    Decreased,
    Unchanged,
}

impl Trend {
    pub fn from_difference(difference: f64) -> Trend {
        if difference > 0.0 {
            Trend::Increased
        } else if difference < 0.0 {
            Trend::Decreased
        } else {
            Trend::Unchanged
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Trend::Increased => "increased",
            Trend::Decreased => "decreased",
            Trend::Unchanged => "unchanged",
        }
    }
}

impl Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One sector of the comparison between two periods.
#[derive(PartialEq, Debug, Clone)]
pub struct ComparisonRow {
    pub sector: String,
    pub consumption_previous: f64,
    pub consumption_current: f64,
    pub difference: f64,
    pub pct_variation: f64,
    pub trend: Trend,
}

#[derive(PartialEq, Debug, Clone, Default)]
pub struct Comparison {
    /// Sorted by sector.
    pub rows: Vec<ComparisonRow>,
    /// Both periods had exactly the same consumption. This usually means that
    /// the same file was provided twice.
    pub identical_inputs: bool,
}

/// Headline numbers of a comparison.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct ComparisonSummary {
    /// Sum of all the positive differences.
    pub total_increase: f64,
    /// Sum of all the negative differences (zero or negative).
    pub total_decrease: f64,
    pub sectors_evaluated: usize,
    pub top_increased: Vec<ComparisonRow>,
    pub top_decreased: Vec<ComparisonRow>,
}

/// Errors that prevent a table from being processed.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum PipelineError {
    /// Some of the required columns could not be found in the header.
    MissingRequiredColumn {
        missing: Vec<(RequiredColumn, Vec<String>)>,
        header: Vec<String>,
    },
    /// A sector exclusion pattern is not a valid regular expression.
    InvalidPattern { pattern: String, message: String },
    /// A row has more cells than the header. The row index starts at 1 for the
    /// first data row.
    MalformedRow {
        row: usize,
        width: usize,
        header_width: usize,
    },
}

impl Error for PipelineError {}

impl Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::MissingRequiredColumn { missing, header } => {
                let descs: Vec<String> = missing
                    .iter()
                    .map(|(col, aliases)| format!("{} (expected one of {:?})", col, aliases))
                    .collect();
                write!(
                    f,
                    "Missing required column(s): {}; columns found: {:?}",
                    descs.join(", "),
                    header
                )
            }
            PipelineError::InvalidPattern { pattern, message } => {
                write!(f, "Invalid sector exclusion pattern {:?}: {}", pattern, message)
            }
            PipelineError::MalformedRow {
                row,
                width,
                header_width,
            } => write!(
                f,
                "Row {} has {} cells but the header only has {} columns",
                row, width, header_width
            ),
        }
    }
}

// ********* Configuration **********

/// The columns that every uploaded table must provide.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum RequiredColumn {
    Sector,
    CounterCurrent,
    CounterPrevious,
}

impl Display for RequiredColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RequiredColumn::Sector => "sector",
            RequiredColumn::CounterCurrent => "counter_current",
            RequiredColumn::CounterPrevious => "counter_previous",
        };
        write!(f, "{}", s)
    }
}

/// How the header cells are matched against the column aliases.
///
/// - Exact compares the trimmed header cell with the alias.
/// - Fuzzy lowercases both sides and removes every character that is not a
/// letter, a digit or an underscore, so that `Contador Atual`,
/// `CONTADOR-ATUAL` and `ContadorAtual` all match each other.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum ColumnMatching {
    Exact,
    Fuzzy,
}

/// The accepted header names for each of the required columns, in order of
/// preference.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ColumnAliases {
    pub sector: Vec<String>,
    pub counter_current: Vec<String>,
    pub counter_previous: Vec<String>,
}

impl ColumnAliases {
    pub fn for_column(&self, column: RequiredColumn) -> &[String] {
        match column {
            RequiredColumn::Sector => &self.sector,
            RequiredColumn::CounterCurrent => &self.counter_current,
            RequiredColumn::CounterPrevious => &self.counter_previous,
        }
    }
}

impl Default for ColumnAliases {
    fn default() -> Self {
        ColumnAliases {
            sector: to_strings(&["Setor"]),
            counter_current: to_strings(&["Contador Atual", "contador_atual", "contadorAtual"]),
            counter_previous: to_strings(&[
                "Contador Anterior",
                "contador_anterior",
                "contadorAnterior",
            ]),
        }
    }
}

/// Columns of the usual meter exports that carry nothing the comparison needs.
pub const DEFAULT_DROPPED_COLUMNS: [&str; 17] = [
    "PATM",
    "impressora",
    "multifuncional",
    "color",
    "nºsérie",
    "observações",
    "Valores Mono",
    "Valores Color",
    "Valor total",
    "Total Colorido",
    "Franquia",
    "Excedente",
    "Taxa Fixa Tomo_OKI",
    "Consumo",
    "Total Geral",
    "Coluna Desnecessária 1",
    "Coluna Desnecessária 2",
];

/// Groupings of transformers that are not billed to a sector.
pub const DEFAULT_EXCLUDED_SECTOR_PATTERNS: [&str; 2] = [
    "Trafos:.*4102/4018/4110/4117/4124",
    "Trafos:.*4784/4709/4788",
];

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct NormalizeOptions {
    /// Drop the rows where one of the counters is zero: the meter was not read
    /// during this period.
    pub drop_zero_readings: bool,
    pub column_matching: ColumnMatching,
    pub aliases: ColumnAliases,
    pub dropped_columns: Vec<String>,
    /// Regular expressions, searched anywhere in the sector name.
    pub excluded_sector_patterns: Vec<String>,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        NormalizeOptions {
            drop_zero_readings: false,
            column_matching: ColumnMatching::Fuzzy,
            aliases: ColumnAliases::default(),
            dropped_columns: to_strings(&DEFAULT_DROPPED_COLUMNS),
            excluded_sector_patterns: to_strings(&DEFAULT_EXCLUDED_SECTOR_PATTERNS),
        }
    }
}

/// The percentage variation is either reported as a magnitude, or with the
/// sign of the difference.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum PctVariationMode {
    Absolute,
    Signed,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct CompareOptions {
    /// Drop the sectors that have no consumption in either period.
    pub drop_both_zero: bool,
    pub pct_variation: PctVariationMode,
}

impl CompareOptions {
    pub const DEFAULT: CompareOptions = CompareOptions {
        drop_both_zero: false,
        pct_variation: PctVariationMode::Absolute,
    };
}

impl Default for CompareOptions {
    fn default() -> Self {
        CompareOptions::DEFAULT
    }
}

fn to_strings(l: &[&str]) -> Vec<String> {
    l.iter().map(|s| s.to_string()).collect()
}
