//! Segment ordering: built-in orders, order selection and anchor-based
//! repositioning.
//!
//! Repositioning is a constraint check per rule, not a general sort. A rule
//! only moves its segment when the segment sits on the wrong side of its
//! anchor, so running the adjustment again is a no-op and non-conflicting
//! rules do not depend on the order they run in.

use crate::segments::SegmentName;
use crate::segments::SegmentName::*;
use loom_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Emission order used when no mode flag or custom order applies.
pub const DEFAULT_ORDER: &[SegmentName] = &[
    RoleDefinition,
    CharacterOverview,
    Personality,
    Background,
    Appearance,
    Skills,
    Relationships,
    Tags,
    WorldSettings,
    WorldBookContent,
    LoreEntries,
    FirstMessage,
    ExampleDialogue,
    DialogueStyle,
    CreatorNotes,
    CreatorInfo,
    CharacterVersion,
    Memory,
    LongTermMemory,
    SystemInstructions,
    ToolDefinitions,
    ToolUseGuidelines,
    ToolExamples,
    McpServers,
    McpResources,
    Capabilities,
    FileEditing,
    BrowserAccess,
    ModeInfo,
    AvailableModes,
    Rules,
    ProjectRules,
    SafetyRules,
    SystemSettings,
    UserAvatar,
    SystemInfo,
    EnvironmentDetails,
    Objectives,
    TaskGuidance,
    VariableState,
    Extensions,
    MarkdownFormatting,
    OutputFormat,
    LanguagePreference,
    CustomInstructions,
    GlobalCustomInstructions,
    PostHistoryInstructions,
];

/// Conversation-first order. Tooling and environment segments are left out.
pub const CHAT_ORDER: &[SegmentName] = &[
    CharacterOverview,
    UserAvatar,
    WorldBookContent,
    LoreEntries,
    Personality,
    Background,
    Appearance,
    Relationships,
    Skills,
    Tags,
    WorldSettings,
    FirstMessage,
    ExampleDialogue,
    DialogueStyle,
    Memory,
    LongTermMemory,
    VariableState,
    SystemSettings,
    SystemInstructions,
    Rules,
    SafetyRules,
    Extensions,
    MarkdownFormatting,
    OutputFormat,
    LanguagePreference,
    CustomInstructions,
    GlobalCustomInstructions,
    PostHistoryInstructions,
];

/// Tooling-first order for coding agents.
pub const DEVELOPER_ORDER: &[SegmentName] = &[
    RoleDefinition,
    CharacterOverview,
    ToolDefinitions,
    ToolUseGuidelines,
    ToolExamples,
    McpServers,
    McpResources,
    Capabilities,
    FileEditing,
    BrowserAccess,
    SystemInstructions,
    ModeInfo,
    AvailableModes,
    Rules,
    ProjectRules,
    SafetyRules,
    Objectives,
    TaskGuidance,
    SystemInfo,
    EnvironmentDetails,
    Personality,
    Background,
    WorldSettings,
    WorldBookContent,
    LoreEntries,
    Memory,
    LongTermMemory,
    VariableState,
    SystemSettings,
    UserAvatar,
    Extensions,
    MarkdownFormatting,
    OutputFormat,
    LanguagePreference,
    CustomInstructions,
    GlobalCustomInstructions,
    PostHistoryInstructions,
];

/// Which base order was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrderKind {
    Default,
    Chat,
    Developer,
    Custom,
}

/// Side of the anchor a segment must end up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    Before,
    After,
}

/// "Keep `segment` immediately before/after `anchor` if it is out of place."
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositionRule {
    pub segment: SegmentName,
    pub anchor: SegmentName,
    pub placement: Placement,
}

/// Anchor overrides for the three repositioned segments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnchorOverrides {
    pub user_avatar: Option<SegmentName>,
    pub tool_definitions: Option<SegmentName>,
    pub world_book: Option<SegmentName>,
}

impl AnchorOverrides {
    /// The three reposition rules, with defaults for unset anchors.
    pub fn rules(&self) -> Vec<RepositionRule> {
        vec![
            RepositionRule {
                segment: UserAvatar,
                anchor: self.user_avatar.unwrap_or(SystemSettings),
                placement: Placement::Before,
            },
            RepositionRule {
                segment: ToolDefinitions,
                anchor: self.tool_definitions.unwrap_or(SystemInstructions),
                placement: Placement::After,
            },
            RepositionRule {
                segment: WorldBookContent,
                anchor: self.world_book.unwrap_or(Personality),
                placement: Placement::After,
            },
        ]
    }
}

/// Pick the base order.
///
/// Mode flags win over a caller-supplied custom order; chat wins over
/// developer.
pub fn select_order(
    chat_mode: bool,
    developer_mode: bool,
    custom: Option<&[SegmentName]>,
) -> AppResult<(OrderKind, Vec<SegmentName>)> {
    if chat_mode {
        return Ok((OrderKind::Chat, CHAT_ORDER.to_vec()));
    }
    if developer_mode {
        return Ok((OrderKind::Developer, DEVELOPER_ORDER.to_vec()));
    }
    if let Some(custom) = custom {
        let mut seen = HashSet::new();
        if let Some(dup) = custom.iter().find(|name| !seen.insert(**name)) {
            return Err(AppError::Prompt(format!(
                "Custom order lists segment '{}' more than once",
                dup
            )));
        }
        return Ok((OrderKind::Custom, custom.to_vec()));
    }
    Ok((OrderKind::Default, DEFAULT_ORDER.to_vec()))
}

/// Apply one rule in place. Returns whether the segment moved.
pub fn reposition(order: &mut Vec<SegmentName>, rule: &RepositionRule) -> bool {
    if rule.segment == rule.anchor {
        return false;
    }

    let position =
        |order: &[SegmentName], name: SegmentName| order.iter().position(|n| *n == name);
    let (Some(seg_idx), Some(anchor_idx)) = (
        position(order.as_slice(), rule.segment),
        position(order.as_slice(), rule.anchor),
    ) else {
        return false;
    };

    let out_of_place = match rule.placement {
        Placement::Before => seg_idx > anchor_idx,
        Placement::After => seg_idx < anchor_idx,
    };
    if !out_of_place {
        return false;
    }

    let segment = order.remove(seg_idx);
    let Some(anchor_idx) = position(order.as_slice(), rule.anchor) else {
        return false;
    };
    let insert_at = match rule.placement {
        Placement::Before => anchor_idx,
        Placement::After => anchor_idx + 1,
    };
    order.insert(insert_at, segment);

    tracing::debug!(
        "Moved '{}' {:?} '{}'",
        rule.segment,
        rule.placement,
        rule.anchor
    );
    true
}

/// Apply every rule in sequence.
pub fn adjust_positions(order: &mut Vec<SegmentName>, rules: &[RepositionRule]) {
    for rule in rules {
        reposition(order, rule);
    }
}
