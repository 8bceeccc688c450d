use std::fs;
use std::path::Path;

use log::debug;
use snafu::prelude::*;

use consumption_compare::{
    ColumnAliases, ColumnMatching, CompareOptions, NormalizeOptions, PctVariationMode,
};

use crate::compare::io_common::Provider;
use crate::compare::*;

use serde::{Deserialize, Serialize};
use serde_json::Value as JSValue;

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutputSettings {
    #[serde(rename = "reportName")]
    pub report_name: Option<String>,
    #[serde(rename = "outputDirectory")]
    pub output_directory: Option<String>,
    #[serde(rename = "topSectors")]
    pub top_sectors: Option<usize>,
    #[serde(rename = "splitByTrend")]
    pub split_by_trend: Option<bool>,
}

/// The configuration part that is written back in the summary.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub report: Option<String>,
    #[serde(rename = "previousFile", skip_serializing_if = "Option::is_none")]
    pub previous_file: Option<String>,
    #[serde(rename = "currentFile")]
    pub current_file: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct FileSource {
    pub provider: Option<String>,
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(rename = "excelWorksheetName")]
    pub excel_worksheet_name: Option<String>,
    #[serde(rename = "csvDelimiter")]
    pub csv_delimiter: Option<String>,
}

impl FileSource {
    pub fn from_path(path: &str) -> FileSource {
        FileSource {
            provider: None,
            file_path: path.to_string(),
            excel_worksheet_name: None,
            csv_delimiter: None,
        }
    }

    pub fn provider(&self) -> CmpResult<Provider> {
        match self.provider.as_deref() {
            None | Some("") => Ok(io_common::guess_provider(&self.file_path)),
            Some(name) => match Provider::from_name(name) {
                Some(p) => Ok(p),
                None => whatever!("unknown provider {:?} for file {}", name, self.file_path),
            },
        }
    }

    pub fn csv_delimiter(&self) -> CmpResult<u8> {
        match self.csv_delimiter.as_deref() {
            None => Ok(b','),
            Some("\\t") | Some("tab") => Ok(b'\t'),
            Some(s) if s.len() == 1 => Ok(s.as_bytes()[0]),
            Some(s) => whatever!("the CSV delimiter must be a single character, got {:?}", s),
        }
    }

    /// The options that change how the bytes of the file are read.
    pub fn reading_fingerprint(&self) -> String {
        format!(
            "{:?}/{:?}/{:?}",
            self.provider, self.excel_worksheet_name, self.csv_delimiter
        )
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize, Default)]
pub struct ColumnSettings {
    pub matching: Option<String>,
    pub sector: Option<Vec<String>>,
    #[serde(rename = "counterCurrent")]
    pub counter_current: Option<Vec<String>>,
    #[serde(rename = "counterPrevious")]
    pub counter_previous: Option<Vec<String>>,
    pub dropped: Option<Vec<String>>,
}

impl ColumnSettings {
    pub fn matching(&self) -> CmpResult<ColumnMatching> {
        match self.matching.as_deref() {
            None | Some("fuzzy") => Ok(ColumnMatching::Fuzzy),
            Some("exact") => Ok(ColumnMatching::Exact),
            Some(x) => whatever!("unknown column matching: {}", x),
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize, Default)]
pub struct CompareRules {
    #[serde(rename = "dropZeroReadings")]
    pub drop_zero_readings: Option<bool>,
    #[serde(rename = "dropBothZero")]
    pub drop_both_zero: Option<bool>,
    #[serde(rename = "pctVariation")]
    pub pct_variation: Option<String>,
    #[serde(rename = "excludedSectorPatterns")]
    pub excluded_sector_patterns: Option<Vec<String>>,
}

impl CompareRules {
    pub fn pct_variation(&self) -> CmpResult<PctVariationMode> {
        match self.pct_variation.as_deref() {
            None | Some("absolute") => Ok(PctVariationMode::Absolute),
            Some("signed") => Ok(PctVariationMode::Signed),
            Some(x) => whatever!("unknown percentage variation mode: {}", x),
        }
    }
}

/// Without a previous file, the current file is analyzed on its own.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct CompareConfig {
    #[serde(rename = "outputSettings", default)]
    pub output_settings: OutputSettings,
    #[serde(default)]
    pub previous: Option<FileSource>,
    pub current: FileSource,
    #[serde(default)]
    pub columns: ColumnSettings,
    #[serde(default)]
    pub rules: CompareRules,
    pub sectors: Option<Vec<String>>,
}

impl CompareConfig {
    pub fn from_paths(previous: &str, current: &str) -> CompareConfig {
        CompareConfig {
            previous: Some(FileSource::from_path(previous)),
            ..CompareConfig::from_current(current)
        }
    }

    pub fn from_current(current: &str) -> CompareConfig {
        CompareConfig {
            output_settings: OutputSettings::default(),
            previous: None,
            current: FileSource::from_path(current),
            columns: ColumnSettings::default(),
            rules: CompareRules::default(),
            sectors: None,
        }
    }

    pub fn normalize_options(&self) -> CmpResult<NormalizeOptions> {
        let defaults = NormalizeOptions::default();
        let default_aliases = defaults.aliases.clone();
        Ok(NormalizeOptions {
            drop_zero_readings: self.rules.drop_zero_readings.unwrap_or(false),
            column_matching: self.columns.matching()?,
            aliases: ColumnAliases {
                sector: self
                    .columns
                    .sector
                    .clone()
                    .unwrap_or(default_aliases.sector),
                counter_current: self
                    .columns
                    .counter_current
                    .clone()
                    .unwrap_or(default_aliases.counter_current),
                counter_previous: self
                    .columns
                    .counter_previous
                    .clone()
                    .unwrap_or(default_aliases.counter_previous),
            },
            dropped_columns: self
                .columns
                .dropped
                .clone()
                .unwrap_or(defaults.dropped_columns),
            excluded_sector_patterns: self
                .rules
                .excluded_sector_patterns
                .clone()
                .unwrap_or(defaults.excluded_sector_patterns),
        })
    }

    pub fn compare_options(&self) -> CmpResult<CompareOptions> {
        Ok(CompareOptions {
            drop_both_zero: self.rules.drop_both_zero.unwrap_or(false),
            pct_variation: self.rules.pct_variation()?,
        })
    }

    pub fn top_sectors(&self) -> usize {
        self.output_settings.top_sectors.unwrap_or(DEFAULT_TOP_SECTORS)
    }

    pub fn selected_sectors(&self) -> Vec<String> {
        self.sectors.clone().unwrap_or_default()
    }

    pub fn output_config(&self) -> OutputConfig {
        OutputConfig {
            report: self.output_settings.report_name.clone(),
            previous_file: self
                .previous
                .as_ref()
                .map(|cfs| io_common::simplify_file_name(&cfs.file_path)),
            current_file: io_common::simplify_file_name(&self.current.file_path),
        }
    }

    /// Makes the relative paths of the configuration relative to the given directory.
    pub fn resolve_paths(&mut self, root: &Path) {
        let resolve = |p: &str| -> String {
            if Path::new(p).is_absolute() {
                p.to_string()
            } else {
                root.join(p).display().to_string()
            }
        };
        if let Some(cfs) = self.previous.as_mut() {
            cfs.file_path = resolve(&cfs.file_path);
        }
        self.current.file_path = resolve(&self.current.file_path);
        if let Some(dir) = self.output_settings.output_directory.clone() {
            self.output_settings.output_directory = Some(resolve(&dir));
        }
    }
}

pub fn read_config(path: &str) -> CmpResult<CompareConfig> {
    let contents = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
    let mut config: CompareConfig =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
    let root = Path::new(path).parent().context(MissingParentDirSnafu {})?;
    config.resolve_paths(root);
    debug!("read_config: {:?}", config);
    Ok(config)
}

pub fn read_summary(path: &str) -> CmpResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
    Ok(js)
}
