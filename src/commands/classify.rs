use anyhow::Result;
use clap::{Args, ValueEnum};

use crate::dashboard::classify::{classify_text, KeywordTable};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Table {
    Themes,
    Sentiment,
}

#[derive(Debug, Args)]
pub struct ClassifyArgs {
    /// Comment text
    pub text: String,

    #[arg(long, value_enum, default_value = "themes")]
    pub table: Table,
}

pub fn run(args: ClassifyArgs) -> Result<()> {
    let table = match args.table {
        Table::Themes => KeywordTable::themes(),
        Table::Sentiment => KeywordTable::sentiment(),
    };
    println!("{}", classify_text(&args.text, &table));
    Ok(())
}
