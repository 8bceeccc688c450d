mod config;
use log::{debug, info, warn};
use regex::Regex;

use std::collections::{BTreeMap, HashSet};

pub use crate::config::*;

pub mod builder;
pub mod cache;
pub mod columns;
pub mod manual;

use crate::columns::{resolve_required, ResolvedColumns};

// **** Normalization ****

/// The first stage of the pipeline: turns one raw table into the consumption
/// of each sector.
///
/// Building a normalizer compiles the exclusion patterns once, so that it can
/// be reused for both periods.
#[derive(Debug, Clone)]
pub struct Normalizer {
    options: NormalizeOptions,
    excluded: Vec<Regex>,
}

impl Normalizer {
    pub fn new(options: &NormalizeOptions) -> Result<Normalizer, PipelineError> {
        let mut excluded: Vec<Regex> = Vec::new();
        for p in options.excluded_sector_patterns.iter() {
            let re = Regex::new(p).map_err(|e| PipelineError::InvalidPattern {
                pattern: p.clone(),
                message: e.to_string(),
            })?;
            excluded.push(re);
        }
        Ok(Normalizer {
            options: options.clone(),
            excluded,
        })
    }

    pub fn options(&self) -> &NormalizeOptions {
        &self.options
    }

    fn is_excluded(&self, sector: &str) -> bool {
        self.excluded.iter().any(|re| re.is_match(sector))
    }

    pub fn run(&self, table: &RawTable) -> Result<SectorAggregate, PipelineError> {
        let mut stats = NormalizationStats {
            rows_read: table.rows.len(),
            ..NormalizationStats::default()
        };

        // Known columns that are not needed are removed before looking for the
        // required ones.
        let dropped_names: HashSet<&str> = self
            .options
            .dropped_columns
            .iter()
            .map(|s| s.trim())
            .collect();
        let dropped_idxs: HashSet<usize> = table
            .header
            .iter()
            .enumerate()
            .filter(|(_, h)| dropped_names.contains(h.trim()))
            .map(|(idx, _)| idx)
            .collect();
        stats.dropped_columns = table
            .header
            .iter()
            .enumerate()
            .filter(|(idx, _)| dropped_idxs.contains(idx))
            .map(|(_, h)| h.clone())
            .collect();
        debug!("run: dropped columns: {:?}", stats.dropped_columns);

        let cols: ResolvedColumns = resolve_required(
            &table.header,
            &self.options.aliases,
            self.options.column_matching,
            |idx| !dropped_idxs.contains(&idx),
        )?;
        debug!("run: resolved columns: {:?}", cols);

        let mut consumption: BTreeMap<String, f64> = BTreeMap::new();
        for (idx, row) in table.rows.iter().enumerate() {
            let lineno = idx + 1;
            let sector = match read_sector(row.get(cols.sector)) {
                Some(s) => s,
                None => {
                    debug!("run: row {}: no sector, skipping", lineno);
                    stats.rows_without_sector += 1;
                    continue;
                }
            };
            if self.is_excluded(&sector) {
                debug!("run: row {}: excluded sector {:?}", lineno, sector);
                stats.rows_excluded += 1;
                continue;
            }

            let counter_current = coerce_counter(row.get(cols.counter_current), lineno, &mut stats);
            let counter_previous =
                coerce_counter(row.get(cols.counter_previous), lineno, &mut stats);

            if self.options.drop_zero_readings && (counter_current == 0.0 || counter_previous == 0.0)
            {
                debug!("run: row {}: zero reading for {:?}", lineno, sector);
                stats.rows_zero_reading += 1;
                continue;
            }

            *consumption.entry(sector).or_insert(0.0) += counter_current - counter_previous;
        }

        info!(
            "Normalized {} rows into {} sectors ({} excluded, {} without sector, {} zero readings, {} coercion fallbacks)",
            stats.rows_read,
            consumption.len(),
            stats.rows_excluded,
            stats.rows_without_sector,
            stats.rows_zero_reading,
            stats.coercion_fallbacks
        );

        Ok(SectorAggregate {
            sectors: consumption
                .into_iter()
                .map(|(sector, consumption)| SectorConsumption {
                    sector,
                    consumption,
                })
                .collect(),
            stats,
        })
    }
}

/// Runs the first stage of the pipeline on one table.
///
/// Arguments:
/// * `table` the table as read from the file
/// * `options` the normalization policy. Use `NormalizeOptions::default()` for
/// the usual meter exports.
pub fn normalize_and_aggregate(
    table: &RawTable,
    options: &NormalizeOptions,
) -> Result<SectorAggregate, PipelineError> {
    Normalizer::new(options)?.run(table)
}

fn read_sector(cell: Option<&Cell>) -> Option<String> {
    match cell {
        Some(Cell::Text(s)) if !s.is_empty() => Some(s.clone()),
        Some(Cell::Number(n)) if n.is_finite() => Some(n.to_string()),
        Some(Cell::Bool(b)) => Some(b.to_string()),
        _ => None,
    }
}

// Lenient: anything that is not a finite number counts as 0.
fn coerce_counter(cell: Option<&Cell>, lineno: usize, stats: &mut NormalizationStats) -> f64 {
    let parsed: Option<f64> = match cell {
        None | Some(Cell::Empty) => return 0.0,
        Some(Cell::Number(n)) => Some(*n),
        Some(Cell::Bool(b)) => Some(if *b { 1.0 } else { 0.0 }),
        Some(Cell::Text(s)) if s.trim().is_empty() => return 0.0,
        Some(Cell::Text(s)) => s.trim().parse::<f64>().ok(),
    };
    match parsed {
        Some(x) if x.is_finite() => x,
        _ => {
            debug!(
                "coerce_counter: row {}: could not read {:?} as a number, using 0",
                lineno, cell
            );
            stats.coercion_fallbacks += 1;
            0.0
        }
    }
}

// **** Comparison ****

/// Runs the second stage of the pipeline: joins the consumption of two periods.
///
/// All the sectors of both periods are reported, a sector that is missing in
/// one period has a consumption of 0 for that period. The rows are sorted by sector.
pub fn compare(
    previous: &SectorAggregate,
    current: &SectorAggregate,
    options: &CompareOptions,
) -> Comparison {
    let identical_inputs = previous.same_consumption(current);
    if identical_inputs {
        warn!(
            "The previous and current periods have exactly the same consumption ({} sectors). Was the same file provided twice?",
            previous.sectors.len()
        );
    }

    let mut joined: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
    for sc in previous.sectors.iter() {
        joined.entry(sc.sector.as_str()).or_insert((0.0, 0.0)).0 += sc.consumption;
    }
    for sc in current.sectors.iter() {
        joined.entry(sc.sector.as_str()).or_insert((0.0, 0.0)).1 += sc.consumption;
    }

    let mut rows: Vec<ComparisonRow> = Vec::new();
    for (sector, (consumption_previous, consumption_current)) in joined {
        if options.drop_both_zero && consumption_previous == 0.0 && consumption_current == 0.0 {
            debug!("compare: dropping {:?}: no consumption", sector);
            continue;
        }
        let difference = consumption_current - consumption_previous;
        rows.push(ComparisonRow {
            sector: sector.to_string(),
            consumption_previous,
            consumption_current,
            difference,
            pct_variation: pct_variation(difference, consumption_previous, options.pct_variation),
            trend: Trend::from_difference(difference),
        });
    }
    debug!("compare: {} rows", rows.len());

    Comparison {
        rows,
        identical_inputs,
    }
}

fn pct_variation(difference: f64, previous: f64, mode: PctVariationMode) -> f64 {
    if previous == 0.0 {
        return 0.0;
    }
    let numerator = match mode {
        PctVariationMode::Absolute => difference.abs(),
        PctVariationMode::Signed => difference,
    };
    numerator / previous.abs() * 100.0
}

// **** Summary ****

/// Keeps the rows of the selected sectors. An empty selection keeps everything.
pub fn select_sectors(rows: &[ComparisonRow], selected: &[String]) -> Vec<ComparisonRow> {
    if selected.is_empty() {
        return rows.to_vec();
    }
    let selected: HashSet<&str> = selected.iter().map(|s| s.as_str()).collect();
    rows.iter()
        .filter(|r| selected.contains(r.sector.as_str()))
        .cloned()
        .collect()
}

/// Computes the headline numbers of a comparison, and the `top_n` sectors with
/// the largest increase and the largest decrease.
pub fn summarize(rows: &[ComparisonRow], top_n: usize) -> ComparisonSummary {
    let total_increase = rows
        .iter()
        .filter(|r| r.difference > 0.0)
        .fold(0.0, |acc, r| acc + r.difference);
    let total_decrease = rows
        .iter()
        .filter(|r| r.difference < 0.0)
        .fold(0.0, |acc, r| acc + r.difference);

    let mut increased: Vec<ComparisonRow> = rows
        .iter()
        .filter(|r| r.trend == Trend::Increased)
        .cloned()
        .collect();
    // Stable sort: ties keep the sector order.
    increased.sort_by(|a, b| b.difference.total_cmp(&a.difference));
    increased.truncate(top_n);

    let mut decreased: Vec<ComparisonRow> = rows
        .iter()
        .filter(|r| r.trend == Trend::Decreased)
        .cloned()
        .collect();
    decreased.sort_by(|a, b| a.difference.total_cmp(&b.difference));
    decreased.truncate(top_n);

    ComparisonSummary {
        total_increase,
        total_decrease,
        sectors_evaluated: rows.len(),
        top_increased: increased,
        top_decreased: decreased,
    }
}

#[cfg(test)]
mod tests {
    use super::builder::TableBuilder;
    use super::*;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    const HEADER: [&str; 3] = ["Setor", "Contador Atual", "Contador Anterior"];

    fn table(rows: &[[&str; 3]]) -> RawTable {
        let mut b = TableBuilder::new(&HEADER);
        for r in rows {
            b.add_text_row(r).unwrap();
        }
        b.build()
    }

    fn agg(rows: &[[&str; 3]]) -> SectorAggregate {
        normalize_and_aggregate(&table(rows), &NormalizeOptions::default()).unwrap()
    }

    fn row<'a>(c: &'a Comparison, sector: &str) -> &'a ComparisonRow {
        c.rows.iter().find(|r| r.sector == sector).unwrap()
    }

    #[test]
    fn increase_between_periods() {
        init();
        let previous = agg(&[["A", "100", "40"]]);
        let current = agg(&[["A", "180", "100"]]);
        assert_eq!(previous.get("A"), Some(60.0));
        assert_eq!(current.get("A"), Some(80.0));

        let c = compare(&previous, &current, &CompareOptions::DEFAULT);
        assert_eq!(c.rows.len(), 1);
        let r = row(&c, "A");
        assert_eq!(r.difference, 20.0);
        assert!((r.pct_variation - 33.33).abs() < 0.01);
        assert_eq!(r.trend, Trend::Increased);
        assert!(!c.identical_inputs);
    }

    #[test]
    fn sector_only_in_current_period() {
        init();
        let previous = agg(&[["A", "100", "40"]]);
        let current = agg(&[["A", "100", "40"], ["B", "20", "5"]]);
        let c = compare(&previous, &current, &CompareOptions::DEFAULT);
        let r = row(&c, "B");
        assert_eq!(r.consumption_previous, 0.0);
        assert_eq!(r.consumption_current, 15.0);
        assert_eq!(r.difference, 15.0);
        assert_eq!(r.pct_variation, 0.0);
        assert_eq!(r.trend, Trend::Increased);
        assert_eq!(row(&c, "A").trend, Trend::Unchanged);
    }

    #[test]
    fn sector_only_in_previous_period() {
        let previous = agg(&[["A", "50", "10"]]);
        let current = agg(&[]);
        let c = compare(&previous, &current, &CompareOptions::DEFAULT);
        let r = row(&c, "A");
        assert_eq!(r.consumption_current, 0.0);
        assert_eq!(r.difference, -40.0);
        assert_eq!(r.pct_variation, 100.0);
        assert_eq!(r.trend, Trend::Decreased);
    }

    #[test]
    fn missing_counter_column() {
        init();
        let mut b = TableBuilder::new(&["Setor", "Contador Atual"]);
        b.add_text_row(&["A", "10"]).unwrap();
        let res = normalize_and_aggregate(&b.build(), &NormalizeOptions::default());
        match res {
            Err(PipelineError::MissingRequiredColumn { missing, .. }) => {
                assert_eq!(missing.len(), 1);
                assert_eq!(missing[0].0, RequiredColumn::CounterPrevious);
            }
            x => panic!("unexpected result {:?}", x),
        }
    }

    #[test]
    fn missing_column_message_names_the_column() {
        let b = TableBuilder::new(&["Setor"]);
        let err = normalize_and_aggregate(&b.build(), &NormalizeOptions::default()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("counter_current"), "{}", msg);
        assert!(msg.contains("counter_previous"), "{}", msg);
        assert!(!msg.contains("sector ("), "{}", msg);
    }

    #[test]
    fn dropped_column_cannot_be_required() {
        let mut options = NormalizeOptions::default();
        options.dropped_columns.push("Contador Anterior".to_string());
        let res = normalize_and_aggregate(&table(&[["A", "1", "0"]]), &options);
        assert!(matches!(
            res,
            Err(PipelineError::MissingRequiredColumn { .. })
        ));
    }

    #[test]
    fn dropped_columns_are_reported() {
        let mut b = TableBuilder::new(&["PATM", "Setor", "Contador Atual", "Contador Anterior", "Consumo"]);
        b.add_text_row(&["x", "A", "10", "4", "999"]).unwrap();
        let a = normalize_and_aggregate(&b.build(), &NormalizeOptions::default()).unwrap();
        assert_eq!(a.get("A"), Some(6.0));
        assert_eq!(a.stats.dropped_columns, vec!["PATM".to_string(), "Consumo".to_string()]);
    }

    #[test]
    fn excluded_sectors() {
        let a = agg(&[
            ["Trafos: bloco 4102/4018/4110/4117/4124", "100", "0"],
            ["Trafos:4784/4709/4788", "100", "0"],
            ["trafos: 4784/4709/4788", "7", "0"],
            ["Finance", "10", "2"],
        ]);
        assert_eq!(a.sectors.len(), 2);
        assert_eq!(a.get("Finance"), Some(8.0));
        // The patterns are case sensitive.
        assert_eq!(a.get("trafos: 4784/4709/4788"), Some(7.0));
        assert_eq!(a.stats.rows_excluded, 2);
    }

    #[test]
    fn rows_without_sector_are_not_grouped() {
        let a = agg(&[["", "10", "0"], ["A", "3", "1"]]);
        assert_eq!(a.sectors.len(), 1);
        assert_eq!(a.stats.rows_without_sector, 1);
        assert_eq!(a.total(), 2.0);
    }

    #[test]
    fn invalid_pattern() {
        let options = NormalizeOptions {
            excluded_sector_patterns: vec!["Trafos:(".to_string()],
            ..NormalizeOptions::default()
        };
        assert!(matches!(
            Normalizer::new(&options),
            Err(PipelineError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn lenient_coercion() {
        init();
        let a = agg(&[
            ["A", "n/a", "10"],
            ["A", "30", ""],
            ["A", " 12.5 ", "2.5"],
            ["B", "NaN", "1"],
        ]);
        assert_eq!(a.get("A"), Some(-10.0 + 30.0 + 10.0));
        assert_eq!(a.get("B"), Some(-1.0));
        assert_eq!(a.stats.coercion_fallbacks, 2);
    }

    #[test]
    fn typed_cells() {
        let mut b = TableBuilder::new(&HEADER);
        b.add_row(vec![
            Cell::Number(12.0),
            Cell::Number(100.0),
            Cell::Number(40.0),
        ])
        .unwrap();
        b.add_row(vec![Cell::Text("A".to_string()), Cell::Bool(true)])
            .unwrap();
        let a = normalize_and_aggregate(&b.build(), &NormalizeOptions::default()).unwrap();
        assert_eq!(a.get("12"), Some(60.0));
        assert_eq!(a.get("A"), Some(1.0));
    }

    #[test]
    fn zero_readings_policy() {
        let t = table(&[["A", "0", "10"], ["A", "30", "10"], ["B", "5", "0"]]);
        let kept = normalize_and_aggregate(&t, &NormalizeOptions::default()).unwrap();
        assert_eq!(kept.get("A"), Some(10.0));
        assert_eq!(kept.get("B"), Some(5.0));

        let options = NormalizeOptions {
            drop_zero_readings: true,
            ..NormalizeOptions::default()
        };
        let dropped = normalize_and_aggregate(&t, &options).unwrap();
        assert_eq!(dropped.get("A"), Some(20.0));
        assert_eq!(dropped.get("B"), None);
        assert_eq!(dropped.stats.rows_zero_reading, 2);
    }

    #[test]
    fn both_zero_policy() {
        let previous = agg(&[["A", "10", "10"], ["B", "10", "5"]]);
        let current = agg(&[["A", "3", "3"], ["B", "10", "5"]]);
        let kept = compare(&previous, &current, &CompareOptions::DEFAULT);
        assert_eq!(kept.rows.len(), 2);
        assert_eq!(row(&kept, "A").trend, Trend::Unchanged);

        let options = CompareOptions {
            drop_both_zero: true,
            ..CompareOptions::DEFAULT
        };
        let dropped = compare(&previous, &current, &options);
        assert_eq!(dropped.rows.len(), 1);
        assert_eq!(dropped.rows[0].sector, "B");
    }

    #[test]
    fn signed_pct_variation() {
        let previous = agg(&[["A", "100", "0"]]);
        let current = agg(&[["A", "75", "0"]]);
        let absolute = compare(&previous, &current, &CompareOptions::DEFAULT);
        assert_eq!(absolute.rows[0].pct_variation, 25.0);
        let options = CompareOptions {
            pct_variation: PctVariationMode::Signed,
            ..CompareOptions::DEFAULT
        };
        let signed = compare(&previous, &current, &options);
        assert_eq!(signed.rows[0].pct_variation, -25.0);
    }

    #[test]
    fn pct_variation_stays_positive_after_meter_reset() {
        let previous = agg(&[["A", "10", "50"]]);
        let current = agg(&[["A", "30", "10"]]);
        let c = compare(&previous, &current, &CompareOptions::DEFAULT);
        let r = row(&c, "A");
        assert_eq!(r.difference, 60.0);
        assert_eq!(r.pct_variation, 150.0);
    }

    #[test]
    fn identical_inputs_are_flagged() {
        init();
        let a = agg(&[["A", "10", "5"], ["B", "7", "1"]]);
        let c = compare(&a, &a.clone(), &CompareOptions::DEFAULT);
        assert!(c.identical_inputs);
        assert_eq!(c.rows.len(), 2);
        assert!(c.rows.iter().all(|r| r.trend == Trend::Unchanged));
    }

    #[test]
    fn swapping_periods_negates_differences() {
        let a = agg(&[["A", "10", "5"], ["B", "70", "1"], ["C", "4", "0"]]);
        let b = agg(&[["A", "20", "5"], ["B", "7", "1"], ["D", "9", "3"]]);
        let ab = compare(&a, &b, &CompareOptions::DEFAULT);
        let ba = compare(&b, &a, &CompareOptions::DEFAULT);
        let sectors_ab: Vec<&str> = ab.rows.iter().map(|r| r.sector.as_str()).collect();
        let sectors_ba: Vec<&str> = ba.rows.iter().map(|r| r.sector.as_str()).collect();
        assert_eq!(sectors_ab, vec!["A", "B", "C", "D"]);
        assert_eq!(sectors_ab, sectors_ba);
        for (r1, r2) in ab.rows.iter().zip(ba.rows.iter()) {
            assert_eq!(r1.difference, -r2.difference);
        }
    }

    #[test]
    fn trend_follows_difference_sign() {
        let a = agg(&[["A", "10", "5"], ["B", "70", "1"], ["C", "4", "0"]]);
        let b = agg(&[["A", "20", "5"], ["B", "7", "1"], ["C", "8", "4"]]);
        let c = compare(&a, &b, &CompareOptions::DEFAULT);
        for r in c.rows.iter() {
            let expected = if r.difference > 0.0 {
                Trend::Increased
            } else if r.difference < 0.0 {
                Trend::Decreased
            } else {
                Trend::Unchanged
            };
            assert_eq!(r.trend, expected);
            assert!(r.pct_variation >= 0.0);
        }
    }

    #[test]
    fn totals_are_preserved() {
        let rows = [
            ["A", "10", "5"],
            ["B", "70", "1"],
            ["A", "4", "9"],
            ["Trafos: 4784/4709/4788", "100", "0"],
        ];
        let a = agg(&rows);
        assert_eq!(a.total(), 5.0 + 69.0 - 5.0);
        let sectors: Vec<&str> = a.sectors.iter().map(|s| s.sector.as_str()).collect();
        assert_eq!(sectors, vec!["A", "B"]);
    }

    #[test]
    fn pipeline_is_deterministic() {
        let rows = [["Z", "10", "5"], ["B", "70", "1"], ["M", "4", "9"]];
        let c1 = compare(&agg(&rows), &agg(&rows[1..]), &CompareOptions::DEFAULT);
        let c2 = compare(&agg(&rows), &agg(&rows[1..]), &CompareOptions::DEFAULT);
        assert_eq!(c1, c2);
    }

    #[test]
    fn exact_matching_requires_exact_names() {
        let mut b = TableBuilder::new(&["setor", "contador_atual", "contador anterior"]);
        b.add_text_row(&["A", "10", "4"]).unwrap();
        let t = b.build();
        let fuzzy = normalize_and_aggregate(&t, &NormalizeOptions::default()).unwrap();
        assert_eq!(fuzzy.get("A"), Some(6.0));

        let options = NormalizeOptions {
            column_matching: ColumnMatching::Exact,
            ..NormalizeOptions::default()
        };
        let res = normalize_and_aggregate(&t, &options);
        match res {
            Err(PipelineError::MissingRequiredColumn { missing, .. }) => {
                let cols: Vec<RequiredColumn> = missing.iter().map(|p| p.0).collect();
                assert_eq!(cols, vec![RequiredColumn::Sector, RequiredColumn::CounterPrevious]);
            }
            x => panic!("unexpected result {:?}", x),
        }
    }

    #[test]
    fn summary_and_top_sectors() {
        let previous = agg(&[
            ["A", "10", "0"],
            ["B", "10", "0"],
            ["C", "10", "0"],
            ["D", "10", "0"],
        ]);
        let current = agg(&[
            ["A", "30", "0"],
            ["B", "15", "0"],
            ["C", "2", "0"],
            ["D", "10", "0"],
        ]);
        let c = compare(&previous, &current, &CompareOptions::DEFAULT);
        let s = summarize(&c.rows, 1);
        assert_eq!(s.total_increase, 25.0);
        assert_eq!(s.total_decrease, -8.0);
        assert_eq!(s.sectors_evaluated, 4);
        assert_eq!(s.top_increased.len(), 1);
        assert_eq!(s.top_increased[0].sector, "A");
        assert_eq!(s.top_decreased.len(), 1);
        assert_eq!(s.top_decreased[0].sector, "C");

        let s5 = summarize(&c.rows, 5);
        let inc: Vec<&str> = s5.top_increased.iter().map(|r| r.sector.as_str()).collect();
        assert_eq!(inc, vec!["A", "B"]);
    }

    #[test]
    fn sector_selection() {
        let previous = agg(&[["A", "10", "0"], ["B", "10", "0"]]);
        let current = agg(&[["A", "30", "0"], ["B", "5", "0"]]);
        let c = compare(&previous, &current, &CompareOptions::DEFAULT);
        assert_eq!(select_sectors(&c.rows, &[]).len(), 2);
        let selected = select_sectors(&c.rows, &["B".to_string(), "Z".to_string()]);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].sector, "B");
        let s = summarize(&selected, 5);
        assert_eq!(s.total_increase, 0.0);
        assert_eq!(s.sectors_evaluated, 1);
    }

    #[test]
    fn empty_tables() {
        let a = agg(&[]);
        assert!(a.sectors.is_empty());
        let c = compare(&a, &agg(&[]), &CompareOptions::DEFAULT);
        assert!(c.rows.is_empty());
        assert!(c.identical_inputs);
        assert_eq!(summarize(&c.rows, 5), ComparisonSummary::default());
    }
}
