//! Command handlers for the promptloom CLI.
//!
//! This module organizes all CLI commands into separate submodules, plus the
//! session and pipeline setup they share.

pub mod build;
pub mod preview;
pub mod profiles;
pub mod rewrite;
pub mod validate;

// Re-export command types for convenience
pub use build::BuildCommand;
pub use preview::PreviewCommand;
pub use profiles::ProfilesCommand;
pub use rewrite::RewriteCommand;
pub use validate::ValidateCommand;

use anyhow::Context;
use loom_core::{config::AppConfig, AppError, AppResult};
use loom_prompt::{CompositionOptions, PromptOptions};
use loom_transform::{load_profile, PipelineState, TransformPipeline};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Load a session file into prompt options.
///
/// Sessions without a `composition` section take the assembly defaults from
/// config, and an empty `mode` takes the configured mode.
pub fn load_session(config: &AppConfig, path: &Path) -> AppResult<PromptOptions> {
    read_session(&config.resolve(path), config)
        .map_err(|e| AppError::Config(format!("{:#}", e)))
}

fn read_session(path: &Path, config: &AppConfig) -> anyhow::Result<PromptOptions> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read session file {:?}", path))?;

    let raw: serde_yaml::Value = serde_yaml::from_str(&contents)
        .with_context(|| format!("Failed to parse session file {:?}", path))?;
    let has_composition = raw.get("composition").is_some();

    let mut options: PromptOptions = serde_yaml::from_value(raw)
        .with_context(|| format!("Invalid session file {:?}", path))?;

    if !has_composition {
        options.composition = CompositionOptions::from_config(&config.assembly);
    }
    if options.mode.trim().is_empty() {
        options.mode = config.assembly.mode.clone();
    }
    if options.workspace.trim().is_empty() {
        options.workspace = config.workspace.display().to_string();
    }

    tracing::debug!("Loaded session from {:?}", path);
    Ok(options)
}

/// Build the shared rewrite pipeline from the configured profile and mixin.
///
/// `profile`/`mixin` override the configured paths. The returned pipeline is
/// disabled when nothing is configured, a profile fails to load, or
/// compilation fails; the error is logged and kept in the pipeline status.
pub async fn init_pipeline(
    config: &AppConfig,
    profile: Option<PathBuf>,
    mixin: Option<PathBuf>,
) -> Arc<TransformPipeline> {
    let pipeline = Arc::new(TransformPipeline::new());

    let profile_path = profile.or_else(|| config.transform.profile.clone());
    let mixin_path = mixin.or_else(|| config.transform.mixin.clone());
    if profile_path.is_none() && mixin_path.is_none() {
        tracing::debug!("No rule profile configured; rewrite pipeline stays disabled");
        return pipeline;
    }

    pipeline.set_enabled(true);

    let load = |path: Option<PathBuf>| -> AppResult<_> {
        path.map(|p| load_profile(&config.resolve(&p))).transpose()
    };
    let (profile, mixin) = match load(profile_path).and_then(|p| Ok((p, load(mixin_path)?))) {
        Ok(loaded) => loaded,
        Err(e) => {
            pipeline.mark_failed(&e);
            tracing::warn!("Rewrite pipeline disabled; segments are used as written");
            return pipeline;
        }
    };

    let state = pipeline.initialize(profile, mixin).await;
    if state != PipelineState::Ready {
        let status = pipeline.status();
        tracing::warn!(
            "Rewrite pipeline not ready ({}): {}",
            state,
            status.last_error.as_deref().unwrap_or("no details")
        );
    }

    pipeline
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> AppConfig {
        AppConfig {
            workspace: dir.path().to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn test_session_takes_config_defaults() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("session.yaml"),
            "role:\n  name: Alice\n",
        )
        .unwrap();

        let mut config = config_in(&temp);
        config.assembly.max_segments = Some(3);
        config.assembly.include.memory = false;

        let options = load_session(&config, Path::new("session.yaml")).unwrap();
        assert_eq!(options.role.unwrap().name, "Alice");
        assert_eq!(options.mode, "chat");
        assert_eq!(options.composition.max_segments, Some(3));
        assert!(!options.composition.inclusion.memory);
    }

    #[test]
    fn test_session_composition_wins_over_config() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("session.yaml"),
            "mode: code\ncomposition:\n  developerMode: true\n",
        )
        .unwrap();

        let mut config = config_in(&temp);
        config.assembly.max_segments = Some(3);

        let options = load_session(&config, Path::new("session.yaml")).unwrap();
        assert_eq!(options.mode, "code");
        assert!(options.composition.developer_mode);
        assert_eq!(options.composition.max_segments, None);
    }

    #[test]
    fn test_missing_session_is_config_error() {
        let temp = TempDir::new().unwrap();
        let err = load_session(&config_in(&temp), Path::new("nope.yaml")).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        assert!(err.to_string().contains("nope.yaml"));
    }

    #[tokio::test]
    async fn test_pipeline_ready_from_configured_profile() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("tidy.yml"),
            "rules:\n  - id: shout\n    find: /hello/g\n    replace: HELLO\n    stages: [input]\n",
        )
        .unwrap();

        let mut config = config_in(&temp);
        config.transform.enabled = true;
        config.transform.profile = Some(PathBuf::from("tidy.yml"));

        let pipeline = init_pipeline(&config, None, None).await;
        assert!(pipeline.is_ready());
        assert_eq!(
            pipeline.process_user_input("hello there", &Default::default()),
            "HELLO there"
        );
    }

    #[tokio::test]
    async fn test_pipeline_disabled_without_profile() {
        let temp = TempDir::new().unwrap();
        let pipeline = init_pipeline(&config_in(&temp), None, None).await;
        assert!(!pipeline.is_ready());
    }

    #[tokio::test]
    async fn test_invalid_profile_leaves_pipeline_disabled() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("bad.yml"),
            "rules:\n  - {id: a, find: x, stages: [input]}\n  - {id: a, find: y, stages: [input]}\n",
        )
        .unwrap();

        let mut config = config_in(&temp);
        config.transform.enabled = true;
        config.transform.profile = Some(PathBuf::from("bad.yml"));

        let pipeline = init_pipeline(&config, None, None).await;
        let status = pipeline.status();
        assert_eq!(status.state, PipelineState::Disabled);
        assert!(status.last_error.unwrap().contains("more than once"));
        assert_eq!(pipeline.process_user_input("x", &Default::default()), "x");
    }

    #[tokio::test]
    async fn test_missing_mixin_leaves_pipeline_disabled() {
        let temp = TempDir::new().unwrap();
        let mut config = config_in(&temp);
        config.transform.mixin = Some(PathBuf::from("gone.yml"));

        let pipeline = init_pipeline(&config, None, None).await;
        assert!(!pipeline.is_ready());
        assert!(pipeline.status().last_error.is_some());
    }
}
