//! Assembly façade: generators → store → composer → rewrite → prompt.
//!
//! `build_prompt` never fails. Generator errors and panics only lose their
//! own segments; anything else that goes wrong produces the fallback prompt.

use crate::composer::{Composer, SegmentTransform};
use crate::generators::{builtin_generators, GenerationContext, SegmentGenerator};
use crate::segments::SegmentName;
use crate::store::{SegmentStore, ValidationReport};
use crate::types::PromptOptions;
use crate::variables::VariableContext;
use chrono::Utc;
use futures::FutureExt;
use loom_core::AppResult;
use loom_transform::{TargetScope, TransformPipeline};
use serde::Serialize;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

const FALLBACK_CLOSING: &str =
    "Please help the user with their requests to the best of your abilities.";

/// Outcome of one assembly call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AssemblyReport {
    /// The assembled system prompt
    pub prompt: String,
    /// Segments emitted, in order
    pub segments: Vec<SegmentName>,
    /// Generators that failed or panicked
    pub failed_generators: Vec<String>,
    pub validation: ValidationReport,
    /// Whether segments went through the final-content rewrite stage
    pub transformed: bool,
    pub used_fallback: bool,
}

/// Rewrites each segment through the pipeline's final stage.
struct FinalContentTransform<'a> {
    pipeline: &'a TransformPipeline,
    vars: &'a HashMap<String, String>,
}

impl SegmentTransform for FinalContentTransform<'_> {
    fn transform(&self, name: SegmentName, content: &str) -> String {
        let rewritten = self
            .pipeline
            .process_final_content(content, self.vars, TargetScope::PromptContent);
        if rewritten != content {
            tracing::debug!("Segment '{}' rewritten", name);
        }
        rewritten
    }
}

/// Builds system prompts from [`PromptOptions`].
///
/// Holds no per-call state; concurrent `assemble` calls are independent.
/// The rewrite pipeline is shared and owned by the caller.
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    pipeline: Arc<TransformPipeline>,
    generators: Vec<Arc<dyn SegmentGenerator>>,
}

impl PromptAssembler {
    /// Assembler with the built-in generators.
    pub fn new(pipeline: Arc<TransformPipeline>) -> Self {
        Self {
            pipeline,
            generators: builtin_generators(),
        }
    }

    /// Assembler with no generators registered.
    pub fn empty(pipeline: Arc<TransformPipeline>) -> Self {
        Self {
            pipeline,
            generators: Vec::new(),
        }
    }

    /// Register an extra generator. It runs after those already registered.
    pub fn with_generator(mut self, generator: Arc<dyn SegmentGenerator>) -> Self {
        self.generators.push(generator);
        self
    }

    pub fn pipeline(&self) -> &Arc<TransformPipeline> {
        &self.pipeline
    }

    /// Assemble the prompt text only.
    pub async fn build_prompt(&self, options: &PromptOptions) -> String {
        self.assemble(options).await.prompt
    }

    /// Assemble and report what happened.
    pub async fn assemble(&self, options: &PromptOptions) -> AssemblyReport {
        match AssertUnwindSafe(self.try_assemble(options))
            .catch_unwind()
            .await
        {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                tracing::error!("Prompt assembly failed, using fallback prompt: {}", e);
                Self::fallback_report(options)
            }
            Err(_) => {
                tracing::error!("Prompt assembly panicked, using fallback prompt");
                Self::fallback_report(options)
            }
        }
    }

    /// Build the per-call store from every registered generator.
    pub async fn collect_segments(&self, options: &PromptOptions) -> (SegmentStore, Vec<String>) {
        let variables = variables_for(options);
        self.run_generators(options, &variables).await
    }

    async fn try_assemble(&self, options: &PromptOptions) -> AppResult<AssemblyReport> {
        let variables = variables_for(options);

        let (store, failed_generators) = self.run_generators(options, &variables).await;

        let validation = store.validate();
        for error in &validation.errors {
            tracing::warn!("{}", error);
        }

        let composer = Composer::new(options.composition.clone());
        let order = composer.compose(&store)?;

        let transform = (options.enable_transform && self.pipeline.is_ready()).then(|| {
            FinalContentTransform {
                pipeline: &self.pipeline,
                vars: variables.as_map(),
            }
        });
        let prompt = composer.render(
            &store,
            &order,
            transform.as_ref().map(|t| t as &dyn SegmentTransform),
        );

        tracing::info!(
            "Assembled prompt: {} segments, {} chars",
            order.len(),
            prompt.len()
        );

        Ok(AssemblyReport {
            prompt,
            segments: order,
            failed_generators,
            validation,
            transformed: transform.is_some(),
            used_fallback: false,
        })
    }

    async fn run_generators(
        &self,
        options: &PromptOptions,
        variables: &VariableContext,
    ) -> (SegmentStore, Vec<String>) {
        let ctx = &GenerationContext { options, variables };

        let runs = self.generators.iter().map(move |generator| async move {
            let outcome = AssertUnwindSafe(generator.generate(ctx))
                .catch_unwind()
                .await;
            (generator.name().to_string(), outcome)
        });
        let outcomes = futures::future::join_all(runs).await;

        // Patches are applied in registration order regardless of which
        // generator finished first.
        let mut store = SegmentStore::new();
        let mut failed = Vec::new();
        for (name, outcome) in outcomes {
            match outcome {
                Ok(Ok(patch)) => {
                    tracing::debug!("Generator '{}' produced {} segments", name, patch.len());
                    store.set_many(patch);
                }
                Ok(Err(e)) => {
                    tracing::warn!("Generator '{}' failed: {}", name, e);
                    failed.push(name);
                }
                Err(_) => {
                    tracing::warn!("Generator '{}' panicked", name);
                    failed.push(name);
                }
            }
        }

        (store, failed)
    }

    fn fallback_report(options: &PromptOptions) -> AssemblyReport {
        AssemblyReport {
            prompt: fallback_prompt(options),
            used_fallback: true,
            ..Default::default()
        }
    }
}

/// Variable context for `options`, using the pinned clock if one is set.
pub fn variables_for(options: &PromptOptions) -> VariableContext {
    VariableContext::build(
        options.role.as_ref(),
        options.user_avatar.as_ref(),
        &options.mode,
        &options.workspace,
        options.now.unwrap_or_else(Utc::now),
    )
}

/// Minimal prompt used when assembly fails. Never touches the store or the
/// composer.
pub fn fallback_prompt(options: &PromptOptions) -> String {
    let global = options
        .global_custom_instructions
        .as_deref()
        .filter(|g| !g.trim().is_empty())
        .map(|g| format!("{}\n\n", g))
        .unwrap_or_default();

    format!(
        "{}\n\n{}\n\n{}{}",
        options.role_definition, options.custom_instructions, global, FALLBACK_CLOSING
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composer::CompositionOptions;
    use crate::segments::SegmentPatch;
    use crate::types::UserAvatar;
    use loom_core::AppError;
    use loom_transform::{PipelineState, RuleDefinition, RuleProfile, Stage};

    fn example_options() -> PromptOptions {
        let mut options = PromptOptions::default();
        options
            .segments
            .insert(SegmentName::CharacterOverview, "Alice".to_string());
        options
            .segments
            .insert(SegmentName::SystemSettings, "Be concise".to_string());
        options
            .segments
            .insert(SegmentName::UserAvatar, "User is Bob".to_string());
        options
    }

    fn assembler() -> PromptAssembler {
        PromptAssembler::new(Arc::new(TransformPipeline::new()))
    }

    #[derive(Debug)]
    struct Failing;

    #[async_trait::async_trait]
    impl SegmentGenerator for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn generate(&self, _ctx: &GenerationContext<'_>) -> AppResult<SegmentPatch> {
            Err(AppError::generator("failing", "data source unavailable"))
        }
    }

    #[derive(Debug)]
    struct Panicking;

    #[async_trait::async_trait]
    impl SegmentGenerator for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn generate(&self, _ctx: &GenerationContext<'_>) -> AppResult<SegmentPatch> {
            panic!("generator bug");
        }
    }

    #[derive(Debug)]
    struct Objectives;

    #[async_trait::async_trait]
    impl SegmentGenerator for Objectives {
        fn name(&self) -> &str {
            "objectives"
        }

        async fn generate(&self, _ctx: &GenerationContext<'_>) -> AppResult<SegmentPatch> {
            Ok(SegmentPatch::new().text(SegmentName::Objectives, "Ship it"))
        }
    }

    #[tokio::test]
    async fn test_example_store_renders_in_adjusted_order() {
        let report = assembler().assemble(&example_options()).await;
        assert!(!report.used_fallback);
        assert!(report.validation.valid);
        assert_eq!(report.prompt, "Alice\n\nUser is Bob\n\nBe concise");
        assert_eq!(
            report.segments,
            vec![
                SegmentName::CharacterOverview,
                SegmentName::UserAvatar,
                SegmentName::SystemSettings
            ]
        );
    }

    #[tokio::test]
    async fn test_max_segments_one() {
        let mut options = example_options();
        options.composition = CompositionOptions {
            max_segments: Some(1),
            ..Default::default()
        };
        assert_eq!(assembler().build_prompt(&options).await, "Alice");
    }

    #[tokio::test]
    async fn test_generator_failures_are_isolated() {
        let assembler = assembler()
            .with_generator(Arc::new(Failing))
            .with_generator(Arc::new(Panicking))
            .with_generator(Arc::new(Objectives));

        let report = assembler.assemble(&example_options()).await;
        assert!(!report.used_fallback);
        assert_eq!(
            report.failed_generators,
            vec!["failing".to_string(), "panicking".to_string()]
        );
        assert!(report.prompt.starts_with("Alice"));
        assert!(report.prompt.contains("Ship it"));
    }

    #[tokio::test]
    async fn test_compose_error_yields_fallback() {
        let mut options = example_options();
        options.role_definition = "You are Roo.".to_string();
        options.custom_instructions = "Be brief.".to_string();
        options.global_custom_instructions = Some("Use metric units.".to_string());
        options.composition.custom_order = Some(vec![SegmentName::Tags, SegmentName::Tags]);

        let report = assembler().assemble(&options).await;
        assert!(report.used_fallback);
        assert!(report.segments.is_empty());
        assert_eq!(
            report.prompt,
            "You are Roo.\n\nBe brief.\n\nUse metric units.\n\n\
             Please help the user with their requests to the best of your abilities."
        );
    }

    #[test]
    fn test_fallback_with_empty_inputs() {
        let prompt = fallback_prompt(&PromptOptions::default());
        assert_eq!(
            prompt,
            "\n\n\n\nPlease help the user with their requests to the best of your abilities."
        );
    }

    #[tokio::test]
    async fn test_final_stage_rewrites_each_segment() {
        let pipeline = Arc::new(TransformPipeline::new());
        pipeline.set_enabled(true);
        let profile = RuleProfile::new(
            "greet",
            vec![RuleDefinition::new(
                "user",
                "/\\{\\{user\\}\\}/g",
                "{{user}}",
                &[Stage::Final],
            )],
        );
        let state = pipeline.initialize(Some(profile), None).await;
        assert_eq!(state, PipelineState::Ready);

        let mut options = PromptOptions {
            user_avatar: Some(UserAvatar {
                name: "Taro".to_string(),
                description: String::new(),
            }),
            ..Default::default()
        };
        options
            .segments
            .insert(SegmentName::CharacterOverview, "Hello {{user}}!".to_string());

        let assembler = PromptAssembler::new(pipeline.clone());

        let untouched = assembler.assemble(&options).await;
        assert!(!untouched.transformed);
        assert!(untouched.prompt.starts_with("Hello {{user}}!"));

        options.enable_transform = true;
        let rewritten = assembler.assemble(&options).await;
        assert!(rewritten.transformed);
        assert!(rewritten.prompt.starts_with("Hello Taro!"));

        pipeline.set_enabled(false);
        let disabled = assembler.assemble(&options).await;
        assert!(!disabled.transformed);
        assert!(disabled.prompt.starts_with("Hello {{user}}!"));
    }

    #[tokio::test]
    async fn test_concurrent_assemblies_are_independent() {
        let assembler = assembler();
        let mut first = example_options();
        first.composition.max_segments = Some(1);
        let second = example_options();

        let (a, b) = futures::join!(assembler.assemble(&first), assembler.assemble(&second));
        assert_eq!(a.prompt, "Alice");
        assert_eq!(b.prompt, "Alice\n\nUser is Bob\n\nBe concise");
    }

    #[tokio::test]
    async fn test_assembly_is_deterministic() {
        let mut options = example_options();
        options.now = Some(Utc::now());
        options.rules = vec!["No spoilers".to_string()];
        options.variables.insert("hp".to_string(), "10".to_string());

        let assembler = assembler();
        let first = assembler.build_prompt(&options).await;
        let second = assembler.build_prompt(&options).await;
        assert_eq!(first, second);
    }
}
