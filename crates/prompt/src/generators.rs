//! Segment generators.
//!
//! Each generator reads its slice of [`PromptOptions`] and returns a
//! [`SegmentPatch`]. Generators are independent: the assembler runs every
//! one of them and a failing generator only loses its own segments.

use crate::segments::{SegmentName, SegmentPatch};
use crate::types::PromptOptions;
use crate::variables::VariableContext;
use loom_core::AppResult;
use std::sync::Arc;

/// Inputs shared by every generator in one assembly call.
#[derive(Debug, Clone, Copy)]
pub struct GenerationContext<'a> {
    pub options: &'a PromptOptions,
    pub variables: &'a VariableContext,
}

/// Produces part of the segment store.
#[async_trait::async_trait]
pub trait SegmentGenerator: Send + Sync + std::fmt::Debug {
    /// Generator name used in logs and the assembly report.
    fn name(&self) -> &str;

    /// Build this generator's segments.
    async fn generate(&self, ctx: &GenerationContext<'_>) -> AppResult<SegmentPatch>;
}

/// The generators every assembler starts with, in application order.
pub fn builtin_generators() -> Vec<Arc<dyn SegmentGenerator>> {
    vec![
        Arc::new(RoleGenerator),
        Arc::new(UserAvatarGenerator),
        Arc::new(WorldBookGenerator),
        Arc::new(ToolCatalogGenerator),
        Arc::new(McpGenerator),
        Arc::new(RulesGenerator),
        Arc::new(MemoryGenerator),
        Arc::new(ModeGenerator),
        Arc::new(SystemInfoGenerator),
        Arc::new(CustomInstructionsGenerator),
        Arc::new(VariableStateGenerator),
        Arc::new(ExtensionsGenerator),
        Arc::new(StaticSegmentsGenerator),
    ]
}

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .map(|item| format!("- {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Character card fields.
#[derive(Debug)]
pub struct RoleGenerator;

#[async_trait::async_trait]
impl SegmentGenerator for RoleGenerator {
    fn name(&self) -> &str {
        "role"
    }

    async fn generate(&self, ctx: &GenerationContext<'_>) -> AppResult<SegmentPatch> {
        let Some(role) = ctx.options.role.as_ref() else {
            return Ok(SegmentPatch::new());
        };

        let overview = if role.description.trim().is_empty() {
            role.name.clone()
        } else {
            role.description.clone()
        };

        Ok(SegmentPatch::new()
            .text(SegmentName::CharacterOverview, overview)
            .text(SegmentName::Personality, role.personality.as_str())
            .text(SegmentName::WorldSettings, role.scenario.as_str())
            .text(SegmentName::FirstMessage, role.first_mes.as_str())
            .text(SegmentName::ExampleDialogue, role.mes_example.as_str())
            .text(SegmentName::SystemInstructions, role.system_prompt.as_str())
            .text(
                SegmentName::PostHistoryInstructions,
                role.post_history_instructions.as_str(),
            )
            .text(SegmentName::CreatorNotes, role.creator_notes.as_str())
            .text(SegmentName::CreatorInfo, role.creator.as_str())
            .text(SegmentName::CharacterVersion, role.character_version.as_str())
            .text(SegmentName::Tags, role.tags.join(", ")))
    }
}

/// The persona the user presents as.
#[derive(Debug)]
pub struct UserAvatarGenerator;

#[async_trait::async_trait]
impl SegmentGenerator for UserAvatarGenerator {
    fn name(&self) -> &str {
        "userAvatar"
    }

    async fn generate(&self, ctx: &GenerationContext<'_>) -> AppResult<SegmentPatch> {
        let Some(avatar) = ctx.options.user_avatar.as_ref() else {
            return Ok(SegmentPatch::new());
        };

        let mut lines = Vec::new();
        if !avatar.name.trim().is_empty() {
            lines.push(format!("The user is {}.", avatar.name.trim()));
        }
        if !avatar.description.trim().is_empty() {
            lines.push(avatar.description.trim().to_string());
        }
        Ok(SegmentPatch::new().text(SegmentName::UserAvatar, lines.join("\n")))
    }
}

/// Enabled world book entries, lowest `order` first.
#[derive(Debug)]
pub struct WorldBookGenerator;

#[async_trait::async_trait]
impl SegmentGenerator for WorldBookGenerator {
    fn name(&self) -> &str {
        "worldBook"
    }

    async fn generate(&self, ctx: &GenerationContext<'_>) -> AppResult<SegmentPatch> {
        let mut entries: Vec<_> = ctx
            .options
            .world_book
            .iter()
            .filter(|e| e.enabled && !e.content.trim().is_empty())
            .collect();
        entries.sort_by_key(|e| e.order);

        let content = entries
            .iter()
            .map(|e| {
                if e.title.trim().is_empty() {
                    e.content.trim().to_string()
                } else {
                    format!("[{}]\n{}", e.title.trim(), e.content.trim())
                }
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        Ok(SegmentPatch::new().text(SegmentName::WorldBookContent, content))
    }
}

/// Tool catalog.
#[derive(Debug)]
pub struct ToolCatalogGenerator;

#[async_trait::async_trait]
impl SegmentGenerator for ToolCatalogGenerator {
    fn name(&self) -> &str {
        "tools"
    }

    async fn generate(&self, ctx: &GenerationContext<'_>) -> AppResult<SegmentPatch> {
        let content = ctx
            .options
            .tools
            .iter()
            .map(|tool| {
                let mut block = format!("## {}", tool.name);
                if !tool.description.trim().is_empty() {
                    block.push('\n');
                    block.push_str(tool.description.trim());
                }
                if !tool.parameters.is_empty() {
                    block.push_str(&format!("\nParameters: {}", tool.parameters.join(", ")));
                }
                block
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        Ok(SegmentPatch::new().text(SegmentName::ToolDefinitions, content))
    }
}

/// Connected MCP servers and their resources.
#[derive(Debug)]
pub struct McpGenerator;

#[async_trait::async_trait]
impl SegmentGenerator for McpGenerator {
    fn name(&self) -> &str {
        "mcp"
    }

    async fn generate(&self, ctx: &GenerationContext<'_>) -> AppResult<SegmentPatch> {
        let servers = &ctx.options.mcp_servers;

        let listing = servers
            .iter()
            .map(|server| {
                if server.tools.is_empty() {
                    format!("- {}", server.name)
                } else {
                    format!("- {} (tools: {})", server.name, server.tools.join(", "))
                }
            })
            .collect::<Vec<_>>()
            .join("\n");

        let resources = servers
            .iter()
            .flat_map(|server| {
                server
                    .resources
                    .iter()
                    .map(move |r| format!("- {}: {}", server.name, r))
            })
            .collect::<Vec<_>>()
            .join("\n");

        Ok(SegmentPatch::new()
            .text(SegmentName::McpServers, listing)
            .text(SegmentName::McpResources, resources))
    }
}

#[derive(Debug)]
pub struct RulesGenerator;

#[async_trait::async_trait]
impl SegmentGenerator for RulesGenerator {
    fn name(&self) -> &str {
        "rules"
    }

    async fn generate(&self, ctx: &GenerationContext<'_>) -> AppResult<SegmentPatch> {
        Ok(SegmentPatch::new().text(SegmentName::Rules, bullet_list(&ctx.options.rules)))
    }
}

#[derive(Debug)]
pub struct MemoryGenerator;

#[async_trait::async_trait]
impl SegmentGenerator for MemoryGenerator {
    fn name(&self) -> &str {
        "memory"
    }

    async fn generate(&self, ctx: &GenerationContext<'_>) -> AppResult<SegmentPatch> {
        Ok(SegmentPatch::new().text(SegmentName::Memory, bullet_list(&ctx.options.memory)))
    }
}

/// Current and available modes.
#[derive(Debug)]
pub struct ModeGenerator;

#[async_trait::async_trait]
impl SegmentGenerator for ModeGenerator {
    fn name(&self) -> &str {
        "mode"
    }

    async fn generate(&self, ctx: &GenerationContext<'_>) -> AppResult<SegmentPatch> {
        let mode = ctx.variables.get("mode");
        let info = if mode.trim().is_empty() {
            String::new()
        } else {
            format!("Current mode: {}", mode.trim())
        };

        Ok(SegmentPatch::new()
            .text(SegmentName::ModeInfo, info)
            .text(
                SegmentName::AvailableModes,
                bullet_list(&ctx.options.available_modes),
            ))
    }
}

/// Host environment.
#[derive(Debug)]
pub struct SystemInfoGenerator;

#[async_trait::async_trait]
impl SegmentGenerator for SystemInfoGenerator {
    fn name(&self) -> &str {
        "systemInfo"
    }

    async fn generate(&self, ctx: &GenerationContext<'_>) -> AppResult<SegmentPatch> {
        let mut lines = Vec::new();
        if let Some(info) = ctx.options.system_info.as_ref() {
            for (label, value) in [
                ("Operating system", &info.os),
                ("Default shell", &info.shell),
                ("Home directory", &info.home),
            ] {
                if !value.trim().is_empty() {
                    lines.push(format!("{}: {}", label, value.trim()));
                }
            }
        }

        let workspace = ctx.variables.get("workspace");
        if !workspace.trim().is_empty() {
            lines.push(format!("Current workspace: {}", workspace.trim()));
        }

        Ok(SegmentPatch::new().text(SegmentName::SystemInfo, lines.join("\n")))
    }
}

/// Role definition, custom instructions and language preference.
#[derive(Debug)]
pub struct CustomInstructionsGenerator;

#[async_trait::async_trait]
impl SegmentGenerator for CustomInstructionsGenerator {
    fn name(&self) -> &str {
        "customInstructions"
    }

    async fn generate(&self, ctx: &GenerationContext<'_>) -> AppResult<SegmentPatch> {
        let options = ctx.options;
        let language = options
            .language
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|l| format!("Respond in {}.", l))
            .unwrap_or_default();

        Ok(SegmentPatch::new()
            .text(SegmentName::RoleDefinition, options.role_definition.as_str())
            .text(
                SegmentName::CustomInstructions,
                options.custom_instructions.as_str(),
            )
            .text(
                SegmentName::GlobalCustomInstructions,
                options.global_custom_instructions.clone().unwrap_or_default(),
            )
            .text(SegmentName::LanguagePreference, language))
    }
}

/// Caller-tracked variables as a dynamic segment.
#[derive(Debug)]
pub struct VariableStateGenerator;

#[async_trait::async_trait]
impl SegmentGenerator for VariableStateGenerator {
    fn name(&self) -> &str {
        "variableState"
    }

    async fn generate(&self, ctx: &GenerationContext<'_>) -> AppResult<SegmentPatch> {
        Ok(SegmentPatch::new().dynamic(SegmentName::VariableState, ctx.options.variables.clone()))
    }
}

/// Caller-defined blocks as a dynamic segment.
#[derive(Debug)]
pub struct ExtensionsGenerator;

#[async_trait::async_trait]
impl SegmentGenerator for ExtensionsGenerator {
    fn name(&self) -> &str {
        "extensions"
    }

    async fn generate(&self, ctx: &GenerationContext<'_>) -> AppResult<SegmentPatch> {
        Ok(SegmentPatch::new().dynamic(SegmentName::Extensions, ctx.options.extensions.clone()))
    }
}

/// Verbatim segments from `PromptOptions::segments`. Runs last so explicit
/// contents override generated ones.
#[derive(Debug)]
pub struct StaticSegmentsGenerator;

#[async_trait::async_trait]
impl SegmentGenerator for StaticSegmentsGenerator {
    fn name(&self) -> &str {
        "segments"
    }

    async fn generate(&self, ctx: &GenerationContext<'_>) -> AppResult<SegmentPatch> {
        let mut patch = SegmentPatch::new();
        for (name, content) in &ctx.options.segments {
            patch = patch.text(*name, content.as_str());
        }
        Ok(patch)
    }
}
