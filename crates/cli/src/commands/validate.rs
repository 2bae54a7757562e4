//! Validate command handler.

use super::load_session;
use clap::Args;
use loom_core::{config::AppConfig, AppError, AppResult};
use loom_prompt::{PromptAssembler, ValidationReport};
use std::path::PathBuf;

/// Check a session for missing segments
#[derive(Args, Debug)]
pub struct ValidateCommand {
    /// Session file (YAML)
    pub session: PathBuf,

    /// Also list every empty optional segment
    #[arg(long)]
    pub warnings: bool,

    /// Output the report as JSON
    #[arg(long)]
    pub json: bool,
}

impl ValidateCommand {
    /// Execute the validate command.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing validate command");

        let options = load_session(config, &self.session)?;
        let assembler = PromptAssembler::new(Default::default());
        let (store, _) = assembler.collect_segments(&options).await;
        let report = store.validate();

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print!("{}", self.format_report(&report));
        }

        if report.valid {
            Ok(())
        } else {
            Err(AppError::Prompt(format!(
                "Session {:?} is missing required segments",
                self.session
            )))
        }
    }

    fn format_report(&self, report: &ValidationReport) -> String {
        let mut out = String::new();
        for error in &report.errors {
            out.push_str(&format!("error: {}\n", error));
        }
        if self.warnings {
            for warning in &report.warnings {
                out.push_str(&format!("warning: {}\n", warning));
            }
        } else if !report.warnings.is_empty() {
            out.push_str(&format!(
                "{} optional segments are empty (use --warnings to list them)\n",
                report.warnings.len()
            ));
        }
        if report.valid {
            out.push_str("ok\n");
        }
        out
    }
}
