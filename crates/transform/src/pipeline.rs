//! The long-lived, shared rewrite pipeline.
//!
//! Readers take a snapshot `Arc` of the compiled rule set under a short read
//! lock and run rules without holding it. Reinitialization compiles a fresh
//! set off the async runtime and installs it with one write, so an apply
//! call sees either the old set or the new one, never a mix. Reinits are
//! serialized by an async mutex.

use crate::diff::DiffSummary;
use crate::loader::validate_profile;
use crate::rules::CompiledRuleSet;
use crate::types::{PipelineState, PipelineStatus, RuleProfile, Stage, TargetScope};
use loom_core::{AppError, AppResult};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::Mutex;

/// Outcome of one apply call with change telemetry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformReport {
    pub text: String,
    pub stage: Stage,
    pub applied_rules: Vec<String>,
    pub diff: Option<DiffSummary>,
    pub error: Option<String>,
}

impl TransformReport {
    fn unchanged(stage: Stage, text: &str) -> Self {
        Self {
            text: text.to_string(),
            stage,
            applied_rules: Vec::new(),
            diff: None,
            error: None,
        }
    }
}

#[derive(Debug)]
struct Inner {
    enabled: bool,
    state: PipelineState,
    rules: Option<Arc<CompiledRuleSet>>,
    profile: Option<RuleProfile>,
    mixin: Option<RuleProfile>,
    last_error: Option<String>,
    // Bumped on disable so an in-flight reinit knows to discard its result.
    generation: u64,
}

impl Inner {
    fn clear(&mut self) {
        self.rules = None;
        self.profile = None;
        self.mixin = None;
        self.state = PipelineState::Disabled;
    }
}

/// Three-stage regex rewrite pipeline with an observable lifecycle.
#[derive(Debug)]
pub struct TransformPipeline {
    inner: RwLock<Inner>,
    reinit: Mutex<()>,
}

impl Default for TransformPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformPipeline {
    /// Create a disabled pipeline.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                enabled: false,
                state: PipelineState::Disabled,
                rules: None,
                profile: None,
                mixin: None,
                last_error: None,
                generation: 0,
            }),
            reinit: Mutex::new(()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Switch the pipeline on or off.
    ///
    /// Turning it off drops the compiled rules and the profile/mixin it was
    /// built from; a later `initialize` must supply them again.
    pub fn set_enabled(&self, enabled: bool) {
        let mut inner = self.write();
        if enabled {
            if !inner.enabled {
                tracing::info!("Transform pipeline enabled");
            }
            inner.enabled = true;
            return;
        }

        inner.enabled = false;
        inner.generation += 1;
        inner.clear();
        tracing::info!("Transform pipeline disabled; compiled rules cleared");
    }

    pub fn is_enabled(&self) -> bool {
        self.read().enabled
    }

    pub fn is_ready(&self) -> bool {
        self.read().state == PipelineState::Ready
    }

    /// Compile `profile` and `mixin` and install them.
    ///
    /// Returns the resulting state. Failures leave the pipeline disabled and
    /// are recorded in [`PipelineStatus::last_error`].
    pub async fn initialize(
        &self,
        profile: Option<RuleProfile>,
        mixin: Option<RuleProfile>,
    ) -> PipelineState {
        self.reinitialize(profile, mixin).await
    }

    /// Recompile, falling back to the currently held profile or mixin for
    /// any argument that is `None`.
    pub async fn reload(
        &self,
        profile: Option<RuleProfile>,
        mixin: Option<RuleProfile>,
    ) -> PipelineState {
        let (profile, mixin) = {
            let inner = self.read();
            (
                profile.or_else(|| inner.profile.clone()),
                mixin.or_else(|| inner.mixin.clone()),
            )
        };
        self.reinitialize(profile, mixin).await
    }

    async fn reinitialize(
        &self,
        profile: Option<RuleProfile>,
        mixin: Option<RuleProfile>,
    ) -> PipelineState {
        let _guard = self.reinit.lock().await;

        let generation = match self.begin_reinit(profile.is_some() || mixin.is_some()) {
            Ok(generation) => generation,
            Err(state) => return state,
        };

        let (p, m) = (profile.clone(), mixin.clone());
        let result = tokio::task::spawn_blocking(move || compile(p.as_ref(), m.as_ref()))
            .await
            .map_err(|e| AppError::Transform(format!("rule compilation task failed: {}", e)))
            .and_then(|r| r);

        self.install(generation, result, profile, mixin)
    }

    /// Move into `Initializing`/`Reloading` and return the generation the
    /// compiled result must match. `Err` carries the state to report when
    /// there is nothing to compile.
    fn begin_reinit(&self, has_rules: bool) -> Result<u64, PipelineState> {
        let mut inner = self.write();
        if !inner.enabled {
            tracing::debug!("Transform pipeline is switched off; skipping initialization");
            return Err(inner.state);
        }
        if !has_rules {
            tracing::warn!("No rule profile or mixin supplied; pipeline stays disabled");
            inner.clear();
            return Err(inner.state);
        }
        inner.state = match inner.state {
            PipelineState::Ready => PipelineState::Reloading,
            _ => PipelineState::Initializing,
        };
        tracing::info!("Transform pipeline {}", inner.state);
        Ok(inner.generation)
    }

    fn install(
        &self,
        generation: u64,
        result: AppResult<CompiledRuleSet>,
        profile: Option<RuleProfile>,
        mixin: Option<RuleProfile>,
    ) -> PipelineState {
        let mut inner = self.write();
        if !inner.enabled || inner.generation != generation {
            tracing::info!("Pipeline was disabled during initialization; discarding compiled rules");
            return inner.state;
        }

        match result {
            Ok(set) => {
                tracing::info!(
                    "Transform pipeline ready (input: {}, output: {}, final: {} rules)",
                    set.rules(Stage::Input).len(),
                    set.rules(Stage::Output).len(),
                    set.rules(Stage::Final).len()
                );
                inner.rules = Some(Arc::new(set));
                inner.profile = profile;
                inner.mixin = mixin;
                inner.state = PipelineState::Ready;
                inner.last_error = None;
            }
            Err(e) => {
                tracing::error!("Transform pipeline initialization failed: {}", e);
                inner.clear();
                inner.last_error = Some(e.to_string());
            }
        }

        inner.state
    }

    /// Record a failure that happened before compilation, such as a profile
    /// that could not be loaded. The pipeline drops its rules and reverts to
    /// disabled.
    pub fn mark_failed(&self, error: &AppError) {
        let mut inner = self.write();
        tracing::error!("Transform pipeline initialization failed: {}", error);
        inner.generation += 1;
        inner.clear();
        inner.last_error = Some(error.to_string());
    }

    /// Current lifecycle snapshot.
    pub fn status(&self) -> PipelineStatus {
        let inner = self.read();
        let count = |stage| inner.rules.as_ref().map_or(0, |r| r.rules(stage).len());
        PipelineStatus {
            state: inner.state,
            enabled: inner.enabled,
            profile: inner.profile.as_ref().map(|p| p.name.clone()),
            mixin: inner.mixin.as_ref().map(|m| m.name.clone()),
            input_rules: count(Stage::Input),
            output_rules: count(Stage::Output),
            final_rules: count(Stage::Final),
            last_error: inner.last_error.clone(),
        }
    }

    fn snapshot(&self) -> Option<Arc<CompiledRuleSet>> {
        let inner = self.read();
        match inner.state {
            PipelineState::Ready => inner.rules.clone(),
            _ => None,
        }
    }

    /// Rewrite raw user input.
    pub fn process_user_input(&self, text: &str, vars: &HashMap<String, String>) -> String {
        self.apply_detailed(Stage::Input, TargetScope::All, text, vars).text
    }

    /// Rewrite one complete assistant message.
    ///
    /// Must not be called on streaming deltas: patterns that span chunk
    /// boundaries would match differently.
    pub fn process_ai_output(&self, text: &str, vars: &HashMap<String, String>) -> String {
        self.apply_detailed(Stage::Output, TargetScope::All, text, vars).text
    }

    /// Rewrite assembled content within `scope`.
    pub fn process_final_content(
        &self,
        text: &str,
        vars: &HashMap<String, String>,
        scope: TargetScope,
    ) -> String {
        self.apply_detailed(Stage::Final, scope, text, vars).text
    }

    /// Run one stage and report what changed.
    ///
    /// Never fails: a non-ready pipeline or a rule error yields the input.
    pub fn apply_detailed(
        &self,
        stage: Stage,
        scope: TargetScope,
        text: &str,
        vars: &HashMap<String, String>,
    ) -> TransformReport {
        let Some(rules) = self.snapshot() else {
            return TransformReport::unchanged(stage, text);
        };

        match rules.apply(stage, scope, text, vars) {
            Ok((rewritten, applied)) => {
                let diff = DiffSummary::compute(text, &rewritten);
                if !applied.is_empty() {
                    tracing::debug!(
                        stage = %stage,
                        rules = ?applied,
                        "Rewrite applied: {}",
                        diff
                    );
                }
                TransformReport {
                    text: rewritten,
                    stage,
                    applied_rules: applied,
                    diff: Some(diff),
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!(stage = %stage, "Rewrite failed, keeping original text: {}", e);
                TransformReport {
                    error: Some(e.to_string()),
                    ..TransformReport::unchanged(stage, text)
                }
            }
        }
    }
}

fn compile(
    profile: Option<&RuleProfile>,
    mixin: Option<&RuleProfile>,
) -> AppResult<CompiledRuleSet> {
    if let Some(profile) = profile {
        validate_profile(profile)?;
    }
    if let Some(mixin) = mixin {
        validate_profile(mixin)?;
    }
    CompiledRuleSet::compile(profile, mixin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RuleDefinition;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn profile(rules: Vec<RuleDefinition>) -> RuleProfile {
        RuleProfile::new("test", rules)
    }

    async fn ready_pipeline(rules: Vec<RuleDefinition>) -> TransformPipeline {
        let pipeline = TransformPipeline::new();
        pipeline.set_enabled(true);
        let state = pipeline.initialize(Some(profile(rules)), None).await;
        assert_eq!(state, PipelineState::Ready);
        pipeline
    }

    #[test]
    fn test_disabled_pipeline_passes_through() {
        let pipeline = TransformPipeline::new();
        let none = HashMap::new();
        assert_eq!(pipeline.process_user_input("", &none), "");
        assert_eq!(pipeline.process_user_input("  hi {{user}} ", &none), "  hi {{user}} ");
        assert_eq!(pipeline.process_ai_output("x", &none), "x");
        assert_eq!(
            pipeline.process_final_content("y", &none, TargetScope::PromptContent),
            "y"
        );
        assert_eq!(pipeline.status().state, PipelineState::Disabled);
    }

    #[tokio::test]
    async fn test_initialize_requires_enabled() {
        let pipeline = TransformPipeline::new();
        let state = pipeline
            .initialize(
                Some(profile(vec![RuleDefinition::new("a", "a", "b", &[Stage::Input])])),
                None,
            )
            .await;
        assert_eq!(state, PipelineState::Disabled);
        assert_eq!(pipeline.process_user_input("a", &HashMap::new()), "a");
    }

    #[tokio::test]
    async fn test_initialize_without_rules_stays_disabled() {
        let pipeline = TransformPipeline::new();
        pipeline.set_enabled(true);
        assert_eq!(pipeline.initialize(None, None).await, PipelineState::Disabled);
    }

    #[tokio::test]
    async fn test_output_stage_substitutes_context() {
        let pipeline = ready_pipeline(vec![RuleDefinition::new(
            "user",
            "/\\{\\{user\\}\\}/g",
            "{{user}}",
            &[Stage::Output],
        )])
        .await;

        let out = pipeline.process_ai_output("Hello {{user}}!", &vars(&[("user", "Taro")]));
        assert_eq!(out, "Hello Taro!");

        // Input stage has no rules.
        let input = pipeline.process_user_input("Hello {{user}}!", &vars(&[("user", "Taro")]));
        assert_eq!(input, "Hello {{user}}!");
    }

    #[tokio::test]
    async fn test_failed_reload_reverts_to_disabled() {
        let pipeline = ready_pipeline(vec![RuleDefinition::new(
            "a",
            "a",
            "b",
            &[Stage::Input],
        )])
        .await;

        let broken = profile(vec![
            RuleDefinition::new("ok", "x", "y", &[Stage::Input]),
            RuleDefinition::new("bad", "/(/", "", &[Stage::Input]),
        ]);
        let state = pipeline.reload(Some(broken), None).await;
        assert_eq!(state, PipelineState::Disabled);

        let status = pipeline.status();
        assert_eq!(status.input_rules, 0);
        assert!(status.profile.is_none());
        assert!(status.last_error.unwrap().contains("'bad'"));

        // Neither the old nor the partial rule set is used.
        let none = HashMap::new();
        assert_eq!(pipeline.process_user_input("ax", &none), "ax");
    }

    #[tokio::test]
    async fn test_set_enabled_false_clears_everything() {
        let pipeline = ready_pipeline(vec![RuleDefinition::new(
            "a",
            "a",
            "b",
            &[Stage::Input],
        )])
        .await;

        pipeline.set_enabled(false);
        let status = pipeline.status();
        assert_eq!(status.state, PipelineState::Disabled);
        assert!(!status.enabled);
        assert!(status.profile.is_none());
        assert_eq!(pipeline.process_user_input("a", &HashMap::new()), "a");

        // Re-enabling does not resurrect the old rules.
        pipeline.set_enabled(true);
        assert_eq!(pipeline.reload(None, None).await, PipelineState::Disabled);
    }

    #[tokio::test]
    async fn test_reload_reuses_held_profile_with_new_mixin() {
        let pipeline = ready_pipeline(vec![RuleDefinition::new(
            "greet",
            "hi",
            "hello",
            &[Stage::Input],
        )])
        .await;

        let mixin = RuleProfile::new(
            "shout",
            vec![RuleDefinition::new("loud", "hello", "HELLO", &[Stage::Input])],
        );
        assert_eq!(pipeline.reload(None, Some(mixin)).await, PipelineState::Ready);

        let status = pipeline.status();
        assert_eq!(status.profile.as_deref(), Some("test"));
        assert_eq!(status.mixin.as_deref(), Some("shout"));
        assert_eq!(pipeline.process_user_input("hi", &HashMap::new()), "HELLO");
    }

    #[tokio::test]
    async fn test_apply_failure_returns_original_and_stays_ready() {
        let pipeline = ready_pipeline(vec![RuleDefinition::new(
            "helper",
            "a",
            "{{missing_helper user}}",
            &[Stage::Output],
        )])
        .await;

        let report = pipeline.apply_detailed(Stage::Output, TargetScope::All, "a", &HashMap::new());
        assert_eq!(report.text, "a");
        assert!(report.error.is_some());
        assert!(pipeline.is_ready());
    }

    #[tokio::test]
    async fn test_report_carries_diff() {
        let pipeline = ready_pipeline(vec![RuleDefinition::new(
            "swap",
            "cat",
            "dog",
            &[Stage::Final],
        )])
        .await;

        let report = pipeline.apply_detailed(
            Stage::Final,
            TargetScope::PromptContent,
            "a\ncat",
            &HashMap::new(),
        );
        assert_eq!(report.text, "a\ndog");
        let diff = report.diff.unwrap();
        assert_eq!(diff.changed.len(), 1);
        assert_eq!(diff.char_delta, 0);
    }

    #[tokio::test]
    async fn test_reloading_pipeline_passes_input_through() {
        let pipeline = ready_pipeline(vec![RuleDefinition::new(
            "a",
            "a",
            "1",
            &[Stage::Input],
        )])
        .await;
        let none = HashMap::new();
        assert_eq!(pipeline.process_user_input("ab", &none), "1b");

        let generation = pipeline.begin_reinit(true).unwrap();
        assert_eq!(pipeline.status().state, PipelineState::Reloading);
        assert_eq!(pipeline.process_user_input("ab", &none), "ab");
        assert_eq!(
            pipeline.process_final_content("ab", &none, TargetScope::All),
            "ab"
        );

        let next = profile(vec![RuleDefinition::new("b", "b", "2", &[Stage::Input])]);
        let compiled = compile(Some(&next), None);
        let state = pipeline.install(generation, compiled, Some(next), None);
        assert_eq!(state, PipelineState::Ready);
        assert_eq!(pipeline.process_user_input("ab", &none), "a2");
    }

    #[tokio::test]
    async fn test_initializing_pipeline_passes_input_through() {
        let pipeline = TransformPipeline::new();
        pipeline.set_enabled(true);

        let generation = pipeline.begin_reinit(true).unwrap();
        assert_eq!(pipeline.status().state, PipelineState::Initializing);
        assert_eq!(pipeline.process_ai_output("a", &HashMap::new()), "a");

        // A disable while compiling discards the result.
        pipeline.set_enabled(false);
        let rules = profile(vec![RuleDefinition::new("a", "a", "1", &[Stage::Output])]);
        let compiled = compile(Some(&rules), None);
        let state = pipeline.install(generation, compiled, Some(rules), None);
        assert_eq!(state, PipelineState::Disabled);
        assert_eq!(pipeline.process_ai_output("a", &HashMap::new()), "a");
    }

    #[tokio::test]
    async fn test_mark_failed_disables_and_records_error() {
        let pipeline = ready_pipeline(vec![RuleDefinition::new(
            "a",
            "a",
            "1",
            &[Stage::Input],
        )])
        .await;

        pipeline.mark_failed(&AppError::Transform("profile not found".into()));
        let status = pipeline.status();
        assert_eq!(status.state, PipelineState::Disabled);
        assert_eq!(status.last_error.as_deref(), Some("Transform error: profile not found"));
        assert_eq!(pipeline.process_user_input("a", &HashMap::new()), "a");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_readers_see_whole_rule_sets_during_reload() {
        let pipeline = Arc::new(
            ready_pipeline(vec![
                RuleDefinition::new("one", "a", "1", &[Stage::Input]),
                RuleDefinition::new("two", "b", "1", &[Stage::Input]),
            ])
            .await,
        );

        let mut readers = Vec::new();
        for _ in 0..8 {
            let p = Arc::clone(&pipeline);
            readers.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                for _ in 0..200 {
                    seen.push(p.process_user_input("ab", &HashMap::new()));
                    tokio::task::yield_now().await;
                }
                seen
            }));
        }

        let next = profile(vec![
            RuleDefinition::new("one", "a", "2", &[Stage::Input]),
            RuleDefinition::new("two", "b", "2", &[Stage::Input]),
        ]);
        assert_eq!(pipeline.reload(Some(next), None).await, PipelineState::Ready);

        for reader in readers {
            for out in reader.await.unwrap() {
                assert!(
                    out == "11" || out == "22" || out == "ab",
                    "mixed rule sets observed: {}",
                    out
                );
            }
        }
    }
}
