//! Build command handler.
//!
//! Assembles a system prompt from a session file and prints it to stdout.

use super::{init_pipeline, load_session};
use clap::Args;
use loom_core::{config::AppConfig, AppResult};
use loom_prompt::{AssemblyReport, PromptAssembler, PromptOptions};
use std::path::PathBuf;

/// Assemble a system prompt from a session file
#[derive(Args, Debug)]
pub struct BuildCommand {
    /// Session file (YAML)
    pub session: PathBuf,

    /// Use the chat-mode segment ordering
    #[arg(long)]
    pub chat: bool,

    /// Use the developer-mode segment ordering
    #[arg(long, conflicts_with = "chat")]
    pub developer: bool,

    /// Keep only the first N ordered segments
    #[arg(long)]
    pub max_segments: Option<usize>,

    /// Render dynamic segments as short summaries
    #[arg(long)]
    pub summary_only: bool,

    /// Append a trailer with the rendered segment count
    #[arg(long)]
    pub debug: bool,

    /// Run segments through the final rewrite stage
    #[arg(long)]
    pub transform: bool,

    /// Output the assembly report as JSON
    #[arg(long)]
    pub json: bool,
}

impl BuildCommand {
    /// Execute the build command.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing build command");
        tracing::debug!("Build command options: {:?}", self);

        let report = self.assemble(config).await?;

        if self.json {
            let json = serde_json::to_string_pretty(&report)?;
            println!("{}", json);
        } else {
            println!("{}", report.prompt);
        }

        Ok(())
    }

    async fn assemble(&self, config: &AppConfig) -> AppResult<AssemblyReport> {
        let mut options = load_session(config, &self.session)?;
        self.apply_flags(&mut options);
        if config.transform.enabled {
            options.enable_transform = true;
        }

        let pipeline = if options.enable_transform {
            init_pipeline(config, None, None).await
        } else {
            Default::default()
        };

        let assembler = PromptAssembler::new(pipeline);
        let report = assembler.assemble(&options).await;

        if !report.failed_generators.is_empty() {
            tracing::warn!("Failed generators: {}", report.failed_generators.join(", "));
        }

        Ok(report)
    }

    fn apply_flags(&self, options: &mut PromptOptions) {
        let composition = &mut options.composition;
        if self.chat {
            composition.chat_mode = true;
        }
        if self.developer {
            composition.developer_mode = true;
        }
        if let Some(max) = self.max_segments {
            composition.max_segments = Some(max);
        }
        if self.summary_only {
            composition.summary_only = true;
        }
        if self.debug {
            composition.debug = true;
        }
        if self.transform {
            options.enable_transform = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn command() -> BuildCommand {
        BuildCommand {
            session: PathBuf::from("session.yaml"),
            chat: false,
            developer: false,
            max_segments: None,
            summary_only: false,
            debug: false,
            transform: false,
            json: false,
        }
    }

    #[test]
    fn test_flags_override_session_composition() {
        let mut options = PromptOptions::default();
        options.composition.max_segments = Some(10);

        let cmd = BuildCommand {
            developer: true,
            max_segments: Some(2),
            transform: true,
            ..command()
        };
        cmd.apply_flags(&mut options);

        assert!(options.composition.developer_mode);
        assert_eq!(options.composition.max_segments, Some(2));
        assert!(options.enable_transform);
    }

    #[test]
    fn test_unset_flags_keep_session_values() {
        let mut options = PromptOptions::default();
        options.composition.summary_only = true;
        options.composition.max_segments = Some(4);

        command().apply_flags(&mut options);
        assert!(options.composition.summary_only);
        assert_eq!(options.composition.max_segments, Some(4));
        assert!(!options.enable_transform);
    }

    #[tokio::test]
    async fn test_invalid_profile_still_builds_prompt() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("session.yaml"),
            "role:\n  name: Alice\n",
        )
        .unwrap();
        std::fs::write(
            temp.path().join("bad.yml"),
            "rules:\n  - {id: a, find: x, stages: [final]}\n  - {id: a, find: y, stages: [final]}\n",
        )
        .unwrap();

        let mut config = AppConfig {
            workspace: temp.path().to_path_buf(),
            ..Default::default()
        };
        config.transform.enabled = true;
        config.transform.profile = Some(PathBuf::from("bad.yml"));

        let report = command().assemble(&config).await.unwrap();
        assert!(!report.used_fallback);
        assert!(!report.transformed);
        assert!(report.prompt.contains("Alice"));
    }
}
