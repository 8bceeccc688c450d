use log::debug;

use crate::config::*;

/// Positions of the required columns in a header.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub(crate) struct ResolvedColumns {
    pub sector: usize,
    pub counter_current: usize,
    pub counter_previous: usize,
}

/// Lowercases the name and drops everything that is not a word character.
pub fn fuzzy_column_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .flat_map(|c| c.to_lowercase())
        .collect()
}

fn column_key(name: &str, matching: ColumnMatching) -> String {
    match matching {
        ColumnMatching::Exact => name.trim().to_string(),
        ColumnMatching::Fuzzy => fuzzy_column_name(name),
    }
}

/// Finds the first alias (in alias order) that matches a column of the header.
///
/// Only the header positions for which `usable` returns true are considered.
pub fn find_column(
    aliases: &[String],
    header: &[String],
    matching: ColumnMatching,
    usable: impl Fn(usize) -> bool,
) -> Option<usize> {
    let keys: Vec<(usize, String)> = header
        .iter()
        .enumerate()
        .filter(|(idx, _)| usable(*idx))
        .map(|(idx, h)| (idx, column_key(h, matching)))
        .collect();
    for alias in aliases {
        let alias_key = column_key(alias, matching);
        if alias_key.is_empty() {
            continue;
        }
        if let Some((idx, _)) = keys.iter().find(|(_, k)| *k == alias_key) {
            return Some(*idx);
        }
    }
    None
}

pub(crate) fn resolve_required(
    header: &[String],
    aliases: &ColumnAliases,
    matching: ColumnMatching,
    usable: impl Fn(usize) -> bool,
) -> Result<ResolvedColumns, PipelineError> {
    let cols = [
        RequiredColumn::Sector,
        RequiredColumn::CounterCurrent,
        RequiredColumn::CounterPrevious,
    ];
    let mut found: Vec<Option<usize>> = Vec::new();
    let mut missing: Vec<(RequiredColumn, Vec<String>)> = Vec::new();
    for col in cols {
        let col_aliases = aliases.for_column(col);
        let idx = find_column(col_aliases, header, matching, &usable);
        debug!("resolve_required: {} -> {:?}", col, idx);
        if idx.is_none() {
            missing.push((col, col_aliases.to_vec()));
        }
        found.push(idx);
    }
    match found.as_slice() {
        [Some(sector), Some(counter_current), Some(counter_previous)] => Ok(ResolvedColumns {
            sector: *sector,
            counter_current: *counter_current,
            counter_previous: *counter_previous,
        }),
        _ => Err(PipelineError::MissingRequiredColumn {
            missing,
            header: header.to_vec(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(l: &[&str]) -> Vec<String> {
        l.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn fuzzy_names() {
        assert_eq!(fuzzy_column_name("Contador Atual"), "contadoratual");
        assert_eq!(fuzzy_column_name(" contador-atual "), "contadoratual");
        assert_eq!(fuzzy_column_name("contador_atual"), "contador_atual");
        assert_eq!(fuzzy_column_name("Nº Série"), "nºsérie");
    }

    #[test]
    fn exact_matching_only_trims() {
        let h = header(&["  Setor ", "contador atual"]);
        let aliases = vec!["Setor".to_string()];
        assert_eq!(find_column(&aliases, &h, ColumnMatching::Exact, |_| true), Some(0));
        let aliases = vec!["Contador Atual".to_string()];
        assert_eq!(find_column(&aliases, &h, ColumnMatching::Exact, |_| true), None);
        assert_eq!(find_column(&aliases, &h, ColumnMatching::Fuzzy, |_| true), Some(1));
    }

    #[test]
    fn alias_order_wins() {
        let h = header(&["ContadorAtual", "Contador Atual"]);
        let aliases = vec!["Contador Atual".to_string(), "ContadorAtual".to_string()];
        assert_eq!(find_column(&aliases, &h, ColumnMatching::Exact, |_| true), Some(1));
    }

    #[test]
    fn unusable_columns_are_skipped() {
        let h = header(&["Setor", "Setor"]);
        let aliases = vec!["Setor".to_string()];
        assert_eq!(find_column(&aliases, &h, ColumnMatching::Exact, |i| i != 0), Some(1));
    }

    #[test]
    fn reports_all_missing_columns() {
        let h = header(&["Setor", "Modelo"]);
        let res = resolve_required(&h, &ColumnAliases::default(), ColumnMatching::Fuzzy, |_| true);
        match res {
            Err(PipelineError::MissingRequiredColumn { missing, header }) => {
                let cols: Vec<RequiredColumn> = missing.iter().map(|p| p.0).collect();
                assert_eq!(
                    cols,
                    vec![RequiredColumn::CounterCurrent, RequiredColumn::CounterPrevious]
                );
                assert_eq!(header, h);
            }
            x => panic!("unexpected result {:?}", x),
        }
    }
}
