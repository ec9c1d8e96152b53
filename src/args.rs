use clap::Parser;

/// This is a decision analysis program based on the Analytic Hierarchy Process.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The file describing the study: criteria, alternatives, the judgments of every
    /// evaluator and the optional sensitivity and budget analyses. See the manual of `ahp_engine`
    /// for the format.
    #[clap(short, long, value_parser)]
    pub config: String,
    /// (file path) A reference file containing the summary of a study in JSON format. If provided, ahpcalc will
    /// check that the computed summary matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path, 'stdout' or empty) If specified, the summary of the study will be written in JSON format to the given
    /// location. Setting this option overrides the output directory that may be specified in the study file.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// ('distributive' or 'ideal') If specified, overrides the aggregation mode of the study file.
    #[clap(short, long, value_parser)]
    pub mode: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
