use log::{debug, info, warn};

use consumption_compare::cache::{content_key, ComparisonCache};
use consumption_compare::*;
use snafu::{prelude::*, Snafu};

use std::fs;
use std::path::Path;

use serde_json::json;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::args::Args;
use crate::compare::config_reader::*;
use crate::compare::io_common::Provider;

pub mod config_reader;
pub mod io_common;
pub mod io_csv;
pub mod io_excel;

pub const DEFAULT_TOP_SECTORS: usize = 5;

#[derive(Debug, Snafu)]
pub enum CmpError {
    #[snafu(display("Error opening file {path}"))]
    OpeningFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error writing file {path}"))]
    WritingFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error opening Excel file {path}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("Excel file {path} does not contain any worksheet"))]
    EmptyExcel { path: String },
    #[snafu(display("Excel file {path} does not contain a worksheet named {worksheet:?}"))]
    MissingWorksheet { path: String, worksheet: String },
    #[snafu(display("Error reading CSV file {path}"))]
    CsvParse { source: csv::Error, path: String },
    #[snafu(display("Error writing CSV file {path}"))]
    CsvWrite { source: csv::Error, path: String },
    #[snafu(display("Malformed table in {path}: {source}"))]
    MalformedTable {
        source: PipelineError,
        path: String,
    },
    #[snafu(display("Error parsing JSON"))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display("Cannot process the {label} month file {path}: {source}"))]
    Pipeline {
        source: PipelineError,
        label: String,
        path: String,
    },
    #[snafu(display("Cannot process the month files. {previous} {current}"))]
    BothInputs {
        previous: Box<CmpError>,
        current: Box<CmpError>,
    },
    #[snafu(display("Invalid rules: {source}"))]
    InvalidRules { source: PipelineError },
    #[snafu(display("Missing parent directory"))]
    MissingParentDir {},

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type CmpResult<T> = Result<T, CmpError>;

/// Where the results of a comparison are written.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct OutputTargets {
    /// A file path or `stdout`.
    pub out: Option<String>,
    pub csv_out: Option<String>,
    pub split_by_trend: bool,
    pub reference: Option<String>,
}

impl OutputTargets {
    /// The command line wins over the output directory of the configuration.
    fn from_args(args: &Args, config: &CompareConfig) -> OutputTargets {
        let in_output_dir = |suffix: &str| -> Option<String> {
            config.output_settings.output_directory.as_ref().map(|dir| {
                let name = match (&config.output_settings.report_name, &config.previous) {
                    (Some(name), _) => name.clone(),
                    (None, Some(_)) => "comparison".to_string(),
                    (None, None) => "consumption".to_string(),
                };
                Path::new(dir)
                    .join(format!("{}{}", name, suffix))
                    .display()
                    .to_string()
            })
        };
        OutputTargets {
            out: args.out.clone().or_else(|| in_output_dir("_summary.json")),
            csv_out: args.csv_out.clone().or_else(|| in_output_dir(".csv")),
            split_by_trend: args.split_by_trend
                || config.output_settings.split_by_trend.unwrap_or(false),
            reference: args.reference.clone(),
        }
    }
}

/// Builds the configuration of the comparison: the configuration file if any,
/// overridden by the command line.
pub fn build_config(args: &Args) -> CmpResult<CompareConfig> {
    let mut config = match (&args.config, &args.previous, &args.current) {
        (Some(config_path), _, _) => read_config(config_path)?,
        (None, Some(previous), Some(current)) => CompareConfig::from_paths(previous, current),
        (None, None, Some(current)) => CompareConfig::from_current(current),
        (None, _, None) => {
            whatever!("--current must be provided when no --config file is used")
        }
    };

    if let Some(p) = &args.previous {
        match config.previous.as_mut() {
            Some(cfs) => cfs.file_path = p.clone(),
            None => config.previous = Some(FileSource::from_path(p)),
        }
    }
    if let Some(p) = &args.current {
        config.current.file_path = p.clone();
    }
    for cfs in config
        .previous
        .iter_mut()
        .chain(std::iter::once(&mut config.current))
    {
        if args.input_type.is_some() {
            cfs.provider = args.input_type.clone();
        }
        if args.excel_worksheet_name.is_some() {
            cfs.excel_worksheet_name = args.excel_worksheet_name.clone();
        }
    }
    if args.drop_zero_readings {
        config.rules.drop_zero_readings = Some(true);
    }
    if args.drop_both_zero {
        config.rules.drop_both_zero = Some(true);
    }
    if args.signed_pct {
        config.rules.pct_variation = Some("signed".to_string());
    }
    if args.exact_columns {
        config.columns.matching = Some("exact".to_string());
    }
    if args.sectors.is_some() {
        config.sectors = args.sectors.clone();
    }
    if args.top.is_some() {
        config.output_settings.top_sectors = args.top;
    }
    debug!("build_config: {:?}", config);
    Ok(config)
}

fn read_table(label: &str, cfs: &FileSource, bytes: &[u8]) -> CmpResult<RawTable> {
    let path = cfs.file_path.as_str();
    info!("Reading the {} month file {:?}", label, path);
    match cfs.provider()? {
        Provider::Csv => io_csv::read_csv_table(path, bytes, cfs),
        Provider::Xlsx => io_excel::read_excel_table(path, bytes, cfs),
    }
}

fn load_aggregate(
    label: &str,
    cfs: &FileSource,
    bytes: &[u8],
    normalizer: &Normalizer,
) -> CmpResult<SectorAggregate> {
    let table = read_table(label, cfs, bytes)?;
    let agg = normalizer.run(&table).context(PipelineSnafu {
        label,
        path: cfs.file_path.as_str(),
    })?;
    info!(
        "{} month: {} sectors, total consumption {}",
        label,
        agg.sectors.len(),
        agg.total()
    );
    Ok(agg)
}

/// Reads both files and compares them.
///
/// Both files are always processed, and the errors of both are reported. Nothing
/// is compared if one of them misses a required column.
///
/// With a cache, the comparison is memoized, keyed by the content of both files
/// and the options.
pub fn run_comparison(
    config: &CompareConfig,
    cache: Option<&mut ComparisonCache>,
) -> CmpResult<Comparison> {
    let previous_source = match &config.previous {
        Some(cfs) => cfs,
        None => whatever!("no previous month file to compare with"),
    };
    let normalize_options = config.normalize_options()?;
    let compare_options = config.compare_options()?;
    let normalizer = Normalizer::new(&normalize_options).context(InvalidRulesSnafu {})?;

    let previous_bytes = io_common::read_input(&previous_source.file_path)?;
    let current_bytes = io_common::read_input(&config.current.file_path)?;
    if previous_bytes == current_bytes
        && previous_source.reading_fingerprint() == config.current.reading_fingerprint()
    {
        warn!(
            "The files {:?} and {:?} have the same content",
            previous_source.file_path, config.current.file_path
        );
    }

    let load_and_compare = || -> CmpResult<Comparison> {
        let previous = load_aggregate("previous", previous_source, &previous_bytes, &normalizer);
        let current = load_aggregate("current", &config.current, &current_bytes, &normalizer);
        match (previous, current) {
            (Ok(previous), Ok(current)) => Ok(compare(&previous, &current, &compare_options)),
            (Err(previous), Err(current)) => Err(CmpError::BothInputs {
                previous: Box::new(previous),
                current: Box::new(current),
            }),
            (Err(e), Ok(_)) | (Ok(_), Err(e)) => Err(e),
        }
    };

    match cache {
        Some(cache) => {
            let fingerprint = format!(
                "{:?}|{:?}|{}|{}",
                normalize_options,
                compare_options,
                previous_source.reading_fingerprint(),
                config.current.reading_fingerprint()
            );
            let key = content_key(&previous_bytes, &current_bytes, &fingerprint);
            cache.get_or_try_insert_with(&key, load_and_compare)
        }
        None => load_and_compare(),
    }
}

fn row_to_json(r: &ComparisonRow) -> JSValue {
    json!({
        "sector": r.sector,
        "consumptionPrevious": r.consumption_previous,
        "consumptionCurrent": r.consumption_current,
        "difference": r.difference,
        "pctVariation": r.pct_variation,
        "trend": r.trend.label(),
    })
}

fn rows_to_json(rows: &[ComparisonRow]) -> Vec<JSValue> {
    rows.iter().map(row_to_json).collect()
}

fn sectors_to_json(sectors: &[SectorConsumption]) -> Vec<JSValue> {
    sectors
        .iter()
        .map(|sc| json!({ "sector": sc.sector, "consumption": sc.consumption }))
        .collect()
}

fn build_summary_js(
    config: &CompareConfig,
    rows: &[ComparisonRow],
    summary: &ComparisonSummary,
    identical_inputs: bool,
) -> JSValue {
    json!({
        "config": config.output_config(),
        "identicalInputs": identical_inputs,
        "summary": {
            "totalIncrease": summary.total_increase,
            "totalDecrease": summary.total_decrease,
            "sectorsEvaluated": summary.sectors_evaluated,
        },
        "topIncreased": rows_to_json(&summary.top_increased),
        "topDecreased": rows_to_json(&summary.top_decreased),
        "results": rows_to_json(rows),
    })
}

fn log_rows(rows: &[ComparisonRow], summary: &ComparisonSummary) {
    for r in rows {
        info!(
            "{:>12} -> {:>12} {:>+12} {:>8.2}% {:<9} {}",
            r.consumption_previous,
            r.consumption_current,
            r.difference,
            r.pct_variation,
            r.trend,
            r.sector
        );
    }
    info!(
        "{} sectors: total increase {}, total decrease {}",
        summary.sectors_evaluated, summary.total_increase, summary.total_decrease
    );
}

fn write_summary(targets: &OutputTargets, pretty_js_stats: &str) -> CmpResult<()> {
    match targets.out.as_deref() {
        Some("stdout") => println!("{}", pretty_js_stats),
        Some(path) => {
            fs::write(path, pretty_js_stats).context(WritingFileSnafu { path })?;
            info!("Summary written to {:?}", path);
        }
        None => {}
    }
    Ok(())
}

fn write_comparison_tables(targets: &OutputTargets, rows: &[ComparisonRow]) -> CmpResult<()> {
    if let Some(path) = targets.csv_out.as_deref() {
        io_csv::write_comparison_csv(path, rows)?;
        info!("Comparison written to {:?}", path);
        if targets.split_by_trend {
            for trend in [Trend::Increased, Trend::Decreased] {
                let split_path = io_common::sibling_path(path, trend.label());
                let split_rows: Vec<ComparisonRow> =
                    rows.iter().filter(|r| r.trend == trend).cloned().collect();
                io_csv::write_comparison_csv(&split_path, &split_rows)?;
                info!("{} sectors written to {:?}", trend, split_path);
            }
        }
    }
    Ok(())
}

// The reference summary, if provided for comparison
fn check_reference(targets: &OutputTargets, pretty_js_stats: &str) -> CmpResult<()> {
    if let Some(summary_p) = &targets.reference {
        let summary_ref = read_summary(summary_p)?;
        debug!("summary: {:?}", summary_ref);
        let pretty_js_summary_ref =
            serde_json::to_string_pretty(&summary_ref).context(ParsingJsonSnafu {})?;
        if pretty_js_summary_ref != pretty_js_stats {
            warn!("Found differences with the reference summary");
            print_diff(pretty_js_summary_ref.as_str(), pretty_js_stats, "\n");
            whatever!("Difference detected between calculated summary and reference summary")
        }
        info!("The summary matches the reference {:?}", summary_p);
    }
    Ok(())
}

/// Runs a full comparison: reading, comparing, writing the outputs and checking
/// the reference if one was given. Returns the summary in JSON format.
pub fn run_job(
    config: &CompareConfig,
    targets: &OutputTargets,
    cache: Option<&mut ComparisonCache>,
) -> CmpResult<JSValue> {
    let comparison = run_comparison(config, cache)?;
    let rows = select_sectors(&comparison.rows, &config.selected_sectors());
    if rows.len() < comparison.rows.len() {
        info!(
            "Selected {} of {} sectors",
            rows.len(),
            comparison.rows.len()
        );
    }
    let summary = summarize(&rows, config.top_sectors());
    log_rows(&rows, &summary);

    let result_js = build_summary_js(config, &rows, &summary, comparison.identical_inputs);
    let pretty_js_stats = serde_json::to_string_pretty(&result_js).context(ParsingJsonSnafu {})?;
    write_summary(targets, &pretty_js_stats)?;
    write_comparison_tables(targets, &rows)?;
    check_reference(targets, &pretty_js_stats)?;
    Ok(result_js)
}

/// Analyzes the current month file on its own: the consumption of each sector and
/// the sectors that consume the most.
pub fn run_aggregate_job(config: &CompareConfig, targets: &OutputTargets) -> CmpResult<JSValue> {
    let normalizer =
        Normalizer::new(&config.normalize_options()?).context(InvalidRulesSnafu {})?;
    let bytes = io_common::read_input(&config.current.file_path)?;
    let agg = load_aggregate("current", &config.current, &bytes, &normalizer)?;

    let selected = config.selected_sectors();
    let sectors: Vec<SectorConsumption> = agg
        .sectors
        .iter()
        .filter(|sc| selected.is_empty() || selected.contains(&sc.sector))
        .cloned()
        .collect();
    let total = sectors.iter().fold(0.0, |acc, sc| acc + sc.consumption);
    let mut top_consumers = sectors.clone();
    top_consumers.sort_by(|a, b| b.consumption.total_cmp(&a.consumption));
    top_consumers.truncate(config.top_sectors());

    for sc in sectors.iter() {
        info!("{:>12} {}", sc.consumption, sc.sector);
    }
    info!("{} sectors: total consumption {}", sectors.len(), total);

    let result_js = json!({
        "config": config.output_config(),
        "summary": {
            "totalConsumption": total,
            "sectorsEvaluated": sectors.len(),
            "rowsRead": agg.stats.rows_read,
            "rowsExcluded": agg.stats.rows_excluded,
        },
        "topConsumers": sectors_to_json(&top_consumers),
        "results": sectors_to_json(&sectors),
    });
    let pretty_js_stats = serde_json::to_string_pretty(&result_js).context(ParsingJsonSnafu {})?;
    write_summary(targets, &pretty_js_stats)?;
    if let Some(path) = targets.csv_out.as_deref() {
        io_csv::write_aggregate_csv(path, &sectors)?;
        info!("Consumption written to {:?}", path);
    }
    check_reference(targets, &pretty_js_stats)?;
    Ok(result_js)
}

/// A single run compares the files once, so it does not keep a cache.
pub fn run(args: &Args) -> CmpResult<()> {
    let config = build_config(args)?;
    let targets = OutputTargets::from_args(args, &config);
    if config.previous.is_some() {
        run_job(&config, &targets, None)?;
    } else {
        run_aggregate_job(&config, &targets)?;
    }
    Ok(())
}
