//! Rewrite command handler.
//!
//! Runs a piece of text through one stage of the configured rewrite
//! pipeline.

use super::{init_pipeline, load_session};
use clap::{Args, ValueEnum};
use loom_core::{config::AppConfig, AppResult};
use loom_prompt::{variables_for, PromptOptions};
use loom_transform::{Stage, TargetScope};
use std::path::PathBuf;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageArg {
    Input,
    Output,
    Final,
}

impl From<StageArg> for Stage {
    fn from(arg: StageArg) -> Self {
        match arg {
            StageArg::Input => Stage::Input,
            StageArg::Output => Stage::Output,
            StageArg::Final => Stage::Final,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeArg {
    All,
    Prompt,
    Display,
}

impl From<ScopeArg> for TargetScope {
    fn from(arg: ScopeArg) -> Self {
        match arg {
            ScopeArg::All => TargetScope::All,
            ScopeArg::Prompt => TargetScope::PromptContent,
            ScopeArg::Display => TargetScope::DisplayContent,
        }
    }
}

/// Run text through one rewrite stage
#[derive(Args, Debug)]
pub struct RewriteCommand {
    /// Text to rewrite
    pub text: String,

    /// Pipeline stage
    #[arg(short, long, value_enum, default_value = "output")]
    pub stage: StageArg,

    /// Content scope (final stage only)
    #[arg(long, value_enum, default_value = "all")]
    pub scope: ScopeArg,

    /// Session file supplying {{user}}, {{char}} and friends
    #[arg(long)]
    pub session: Option<PathBuf>,

    /// Rule profile (overrides transform.profile)
    #[arg(long)]
    pub profile: Option<PathBuf>,

    /// Rule mixin (overrides transform.mixin)
    #[arg(long)]
    pub mixin: Option<PathBuf>,

    /// Output the rewrite report as JSON
    #[arg(long)]
    pub json: bool,
}

impl RewriteCommand {
    /// Execute the rewrite command.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing rewrite command");
        tracing::debug!("Rewrite command options: {:?}", self);

        let options = match &self.session {
            Some(path) => load_session(config, path)?,
            None => PromptOptions {
                mode: config.assembly.mode.clone(),
                workspace: config.workspace.display().to_string(),
                ..Default::default()
            },
        };
        let variables = variables_for(&options);

        let pipeline = init_pipeline(config, self.profile.clone(), self.mixin.clone()).await;
        let status = pipeline.status();
        tracing::debug!("Pipeline status: {:?}", status);

        let report = pipeline.apply_detailed(
            self.stage.into(),
            self.scope.into(),
            &self.text,
            variables.as_map(),
        );

        if self.json {
            let output = serde_json::json!({
                "report": report,
                "pipeline": status,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!("{}", report.text);
            if let Some(diff) = &report.diff {
                tracing::info!("{}", diff);
            }
        }

        Ok(())
    }
}
