use std::fs;
use std::path::Path;

use log::debug;
use snafu::prelude::*;

use crate::compare::*;

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum Provider {
    Csv,
    Xlsx,
}

impl Provider {
    pub fn from_name(name: &str) -> Option<Provider> {
        match name.to_lowercase().as_str() {
            "csv" => Some(Provider::Csv),
            "xlsx" | "excel" => Some(Provider::Xlsx),
            _ => None,
        }
    }
}

/// CSV files are recognized by their extension, everything else is assumed to be an Excel workbook.
pub fn guess_provider(path: &str) -> Provider {
    match Path::new(path)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
    {
        Some(ext) if ext == "csv" => Provider::Csv,
        _ => Provider::Xlsx,
    }
}

pub fn simplify_file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string())
}

/// `reports/feb.csv` with suffix `increased` becomes `reports/feb_increased.csv`.
pub fn sibling_path(path: &str, suffix: &str) -> String {
    let p = Path::new(path);
    let stem = p
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let file_name = match p.extension() {
        Some(ext) => format!("{}_{}.{}", stem, suffix, ext.to_string_lossy()),
        None => format!("{}_{}", stem, suffix),
    };
    p.with_file_name(file_name).display().to_string()
}

pub fn read_input(path: &str) -> CmpResult<Vec<u8>> {
    let bytes = fs::read(path).context(OpeningFileSnafu { path })?;
    debug!("read_input: {}: {} bytes", path, bytes.len());
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn providers() {
        assert_eq!(guess_provider("a/b/jan.CSV"), Provider::Csv);
        assert_eq!(guess_provider("jan.xlsx"), Provider::Xlsx);
        assert_eq!(guess_provider("jan"), Provider::Xlsx);
        assert_eq!(Provider::from_name("Excel"), Some(Provider::Xlsx));
        assert_eq!(Provider::from_name("ods"), None);
    }

    #[test]
    fn sibling_paths() {
        assert_eq!(
            sibling_path("reports/feb.csv", "increased"),
            "reports/feb_increased.csv"
        );
        assert_eq!(sibling_path("feb", "decreased"), "feb_decreased");
        assert_eq!(simplify_file_name("reports/feb.csv"), "feb.csv");
    }
}
