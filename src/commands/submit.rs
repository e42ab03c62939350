use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use crate::error::RecorderError;
use crate::state::AppState;
use crate::survey::types::Answers;

#[derive(Debug, Args)]
pub struct SubmitArgs {
    /// JSON object of question key to answer, or `-` to read stdin
    pub answers: PathBuf,
}

fn read_answers(path: &Path) -> Result<Answers> {
    let raw = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read answers from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read answers file {:?}", path))?
    };
    serde_json::from_str(&raw).context("Answers must be a JSON object of question key to answer")
}

pub async fn run(state: &AppState, args: SubmitArgs) -> Result<()> {
    let answers = read_answers(&args.answers)?;

    match state.recorder.accept(answers).await {
        Ok(receipt) => {
            println!("Recorded submission {}", receipt.submission_id);
            for warning in receipt.warnings() {
                println!("warning: {}", warning);
            }
            info!(
                submission_id = %receipt.submission_id,
                clean = receipt.is_clean(),
                "Submit complete"
            );
            Ok(())
        }
        Err(e @ RecorderError::Persistence(_)) => {
            Err(e).context("Submission was NOT recorded; it is safe to submit the same answers again")
        }
        Err(e) => Err(e.into()),
    }
}
