use clap::Parser;

/// This program compares the printer consumption of each sector between two monthly meter exports.
#[derive(Parser, Debug, Clone, Default)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) A JSON file describing the comparison. The input files it mentions are
    /// relative to the location of this file. See the manual for the format.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (file path) The export of the previous month. Overrides the file of the configuration.
    /// Without it, the current month is analyzed on its own.
    #[clap(short, long, value_parser)]
    pub previous: Option<String>,

    /// (file path) The export of the current month. Overrides the file of the configuration.
    #[clap(short = 'n', long, value_parser)]
    pub current: Option<String>,

    /// (csv or xlsx) The type of both inputs. By default, it is guessed from the file extension.
    #[clap(long, value_parser)]
    pub input_type: Option<String>,

    /// (default: first worksheet) When using Excel files, the name of the worksheet to use.
    #[clap(long, value_parser)]
    pub excel_worksheet_name: Option<String>,

    /// Ignore the rows in which one of the counters is zero.
    #[clap(long, takes_value = false)]
    pub drop_zero_readings: bool,

    /// Do not report the sectors that have no consumption in both months.
    #[clap(long, takes_value = false)]
    pub drop_both_zero: bool,

    /// Report the percentage of variation with the sign of the difference.
    #[clap(long, takes_value = false)]
    pub signed_pct: bool,

    /// Match the column names exactly instead of ignoring case, spaces and punctuation.
    #[clap(long, takes_value = false)]
    pub exact_columns: bool,

    /// (repeatable) Only report these sectors.
    #[clap(long, value_parser)]
    pub sectors: Option<Vec<String>>,

    /// (default 5) The number of sectors in the top increase and top decrease lists.
    #[clap(long, value_parser)]
    pub top: Option<usize>,

    /// (file path, 'stdout' or empty) If specified, the summary of the comparison will be written in JSON format to the given
    /// location.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path or empty) If specified, the comparison table will be written in CSV format to the given location.
    #[clap(long, value_parser)]
    pub csv_out: Option<String>,

    /// Also write the increased and the decreased sectors to separate CSV files next to --csv-out.
    #[clap(long, takes_value = false)]
    pub split_by_trend: bool,

    /// (file path) A reference file containing the summary of a comparison in JSON format. If provided, metercmp will
    /// check that the computed summary matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
