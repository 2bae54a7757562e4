//! Rule and pipeline types for the rewrite engine.
//!
//! This module defines the YAML-facing rule model (profiles and mixins) and
//! the observable pipeline status.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The pipeline stage a rule runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Raw user-authored text before it enters the agent's turn
    Input,
    /// A complete assistant message
    Output,
    /// Already-assembled content such as one rendered prompt segment
    Final,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Input, Stage::Output, Stage::Final];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Input => "input",
            Stage::Output => "output",
            Stage::Final => "final",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which logical region of content a final-stage rewrite operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TargetScope {
    /// Every final-stage rule applies
    #[default]
    All,
    /// Content sent to the model; skips `markdownOnly` rules
    PromptContent,
    /// Content shown to the user; skips `promptOnly` rules
    DisplayContent,
}

impl TargetScope {
    /// Whether a rule with the given scoping flags runs under this scope.
    pub fn admits(&self, prompt_only: bool, markdown_only: bool) -> bool {
        match self {
            TargetScope::All => true,
            TargetScope::PromptContent => !markdown_only,
            TargetScope::DisplayContent => !prompt_only,
        }
    }
}

/// Per-stage enable switches. Unset switches inherit (profile) or keep
/// the profile's value (mixin).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageToggles {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<bool>,
    #[serde(default, rename = "final", skip_serializing_if = "Option::is_none")]
    pub final_content: Option<bool>,
}

impl StageToggles {
    /// Whether the stage is enabled; unset means enabled.
    pub fn is_enabled(&self, stage: Stage) -> bool {
        match stage {
            Stage::Input => self.input,
            Stage::Output => self.output,
            Stage::Final => self.final_content,
        }
        .unwrap_or(true)
    }

    /// Overlay `other` on top of `self`; set values in `other` win.
    pub fn overlay(&self, other: &StageToggles) -> StageToggles {
        StageToggles {
            input: other.input.or(self.input),
            output: other.output.or(self.output),
            final_content: other.final_content.or(self.final_content),
        }
    }
}

/// A single user-authored rewrite rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDefinition {
    /// Unique rule identifier within a profile
    pub id: String,

    /// Human-readable name
    #[serde(default)]
    pub name: String,

    /// Pattern, either `/pattern/flags` or a bare pattern
    #[serde(default)]
    pub find: String,

    /// Replacement template
    #[serde(default)]
    pub replace: String,

    /// Strings removed from captured text before insertion
    #[serde(default)]
    pub trim: Vec<String>,

    /// Stages this rule participates in
    #[serde(default)]
    pub stages: Vec<Stage>,

    /// Final stage: only when rewriting content for the model
    #[serde(default)]
    pub prompt_only: bool,

    /// Final stage: only when rewriting content for display
    #[serde(default)]
    pub markdown_only: bool,

    /// Render `{{variables}}` into the pattern before matching
    #[serde(default)]
    pub substitute_find: bool,

    /// Disabled rules are skipped; in a mixin they remove the profile rule
    #[serde(default)]
    pub disabled: bool,
}

impl RuleDefinition {
    /// Create a rule active in the given stages.
    pub fn new(
        id: impl Into<String>,
        find: impl Into<String>,
        replace: impl Into<String>,
        stages: &[Stage],
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            find: find.into(),
            replace: replace.into(),
            trim: Vec::new(),
            stages: stages.to_vec(),
            prompt_only: false,
            markdown_only: false,
            substitute_find: false,
            disabled: false,
        }
    }

    pub fn runs_in(&self, stage: Stage) -> bool {
        !self.disabled && self.stages.contains(&stage)
    }
}

/// A named collection of rules: either a base profile or a mixin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleProfile {
    /// Profile name, reported in pipeline status; defaults to the file stem
    #[serde(default)]
    pub name: String,

    /// Per-stage enable switches
    #[serde(default)]
    pub stages: StageToggles,

    /// Ordered rules
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
}

impl RuleProfile {
    pub fn new(name: impl Into<String>, rules: Vec<RuleDefinition>) -> Self {
        Self {
            name: name.into(),
            stages: StageToggles::default(),
            rules,
        }
    }
}

/// Lifecycle state of the rewrite pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    /// No compiled rules; every apply call passes through
    Disabled,
    /// First compilation in flight
    Initializing,
    /// Compiled rules installed
    Ready,
    /// Replacement compilation in flight
    Reloading,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineState::Disabled => "disabled",
            PipelineState::Initializing => "initializing",
            PipelineState::Ready => "ready",
            PipelineState::Reloading => "reloading",
        };
        f.write_str(s)
    }
}

/// Snapshot of the pipeline for introspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStatus {
    pub state: PipelineState,
    pub enabled: bool,
    pub profile: Option<String>,
    pub mixin: Option<String>,
    pub input_rules: usize,
    pub output_rules: usize,
    pub final_rules: usize,
    pub last_error: Option<String>,
}
