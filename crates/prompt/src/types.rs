//! Input types for prompt assembly.
//!
//! These are the already-normalized inputs the built-in generators turn
//! into segments. Source formats (character cards, world book files) are
//! parsed elsewhere.

use crate::composer::CompositionOptions;
use crate::segments::SegmentName;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// The character the agent plays.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Role {
    pub name: String,
    pub description: String,
    pub personality: String,
    pub scenario: String,
    pub first_mes: String,
    pub mes_example: String,
    pub system_prompt: String,
    pub post_history_instructions: String,
    pub creator_notes: String,
    pub creator: String,
    pub character_version: String,
    pub tags: Vec<String>,
}

/// The persona the human user presents as.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserAvatar {
    pub name: String,
    pub description: String,
}

/// One world book entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldBookEntry {
    #[serde(default)]
    pub title: String,
    pub content: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Lower values are emitted first
    #[serde(default)]
    pub order: i32,
}

/// One tool the agent may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<String>,
}

/// A connected MCP server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpServerInfo {
    pub name: String,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub resources: Vec<String>,
}

/// Host environment details.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemInfo {
    pub os: String,
    pub shell: String,
    pub home: String,
}

fn default_true() -> bool {
    true
}

/// Everything one `build_prompt` call needs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PromptOptions {
    pub role: Option<Role>,
    pub user_avatar: Option<UserAvatar>,
    pub mode: String,
    pub workspace: String,

    /// Used by both the roleDefinition segment and the fallback prompt
    pub role_definition: String,
    pub custom_instructions: String,
    pub global_custom_instructions: Option<String>,
    pub language: Option<String>,

    pub world_book: Vec<WorldBookEntry>,
    pub tools: Vec<ToolSpec>,
    pub mcp_servers: Vec<McpServerInfo>,
    pub rules: Vec<String>,
    pub memory: Vec<String>,
    pub available_modes: Vec<String>,
    pub system_info: Option<SystemInfo>,

    /// Rendered as the dynamic `variableState` segment
    pub variables: IndexMap<String, String>,
    /// Rendered as the dynamic `extensions` segment
    pub extensions: IndexMap<String, String>,
    /// Verbatim segment contents, e.g. `systemSettings`
    pub segments: IndexMap<SegmentName, String>,

    pub composition: CompositionOptions,

    /// Run each segment through the final-content rewrite stage
    pub enable_transform: bool,

    /// Pin the clock for `{{isodate}}`/`{{isotime}}`
    pub now: Option<DateTime<Utc>>,
}
