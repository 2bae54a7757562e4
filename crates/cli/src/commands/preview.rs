//! Preview command handler.
//!
//! Shows the segments a session produces before they are composed.

use super::load_session;
use clap::Args;
use loom_core::{config::AppConfig, AppResult};
use loom_prompt::PromptAssembler;
use std::path::PathBuf;

/// Show the segments a session produces
#[derive(Args, Debug)]
pub struct PreviewCommand {
    /// Session file (YAML)
    pub session: PathBuf,
}

impl PreviewCommand {
    /// Execute the preview command.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing preview command");

        let options = load_session(config, &self.session)?;
        let assembler = PromptAssembler::new(Default::default());
        let (store, failed) = assembler.collect_segments(&options).await;

        if store.is_empty() {
            println!("No segments produced.");
        } else {
            println!("{}", store.preview());
        }

        for name in failed {
            println!("! generator '{}' failed", name);
        }

        Ok(())
    }
}
