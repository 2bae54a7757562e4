//! Rewrite pipeline for promptloom.
//!
//! This crate provides the user-authored regex rewrite engine:
//! - YAML rule profiles and mixins
//! - Three independently switched stages (input, output, final content)
//! - Handlebars variable substitution in replacements
//! - Line-based change telemetry
//! - A shared pipeline whose rule set is swapped atomically on reload
//!
//! # Example
//! ```no_run
//! use loom_transform::{RuleDefinition, RuleProfile, Stage, TransformPipeline};
//! use std::collections::HashMap;
//!
//! # async fn example() {
//! let pipeline = TransformPipeline::new();
//! pipeline.set_enabled(true);
//! let profile = RuleProfile::new(
//!     "names",
//!     vec![RuleDefinition::new("user", "/\\{\\{user\\}\\}/g", "{{user}}", &[Stage::Output])],
//! );
//! pipeline.initialize(Some(profile), None).await;
//!
//! let mut vars = HashMap::new();
//! vars.insert("user".to_string(), "Taro".to_string());
//! assert_eq!(pipeline.process_ai_output("Hello {{user}}!", &vars), "Hello Taro!");
//! # }
//! ```

pub mod diff;
pub mod loader;
pub mod pipeline;
pub mod rules;
pub mod types;

// Re-export main types
pub use diff::{DiffSummary, LineRange};
pub use loader::{list_profiles, load_profile, merge_profiles, validate_profile};
pub use pipeline::{TransformPipeline, TransformReport};
pub use rules::CompiledRuleSet;
pub use types::{
    PipelineState, PipelineStatus, RuleDefinition, RuleProfile, Stage, StageToggles, TargetScope,
};
