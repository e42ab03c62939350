use anyhow::Result;
use clap::{Args, ValueEnum};

use crate::dashboard::{DashboardReport, DedupPolicy};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Dedup {
    /// Identical answers
    Exact,
    /// Same identity and comments
    Content,
}

impl From<Dedup> for DedupPolicy {
    fn from(d: Dedup) -> Self {
        match d {
            Dedup::Exact => DedupPolicy::ExactFields,
            Dedup::Content => DedupPolicy::ContentHash,
        }
    }
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    /// How repeated submissions are recognised
    #[arg(long, value_enum, default_value = "exact")]
    pub dedup: Dedup,
}

pub async fn run(state: &AppState, args: ReportArgs) -> Result<()> {
    let raw = state.aggregator.load().await?;
    let report = DashboardReport::build(&state.schema, raw, args.dedup.into());
    print!("{}", report.render());
    Ok(())
}
