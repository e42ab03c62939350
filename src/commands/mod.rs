pub mod classify;
pub mod report;
pub mod submit;

use clap::Subcommand;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Record one answer set from a JSON file (`-` for stdin)
    Submit(submit::SubmitArgs),

    /// Deduplicate and summarise everything recorded so far
    Report(report::ReportArgs),

    /// Classify a comment with one of the keyword tables
    Classify(classify::ClassifyArgs),
}
