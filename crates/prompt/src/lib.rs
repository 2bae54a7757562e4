//! System prompt assembly for promptloom.
//!
//! This crate turns role, world, tool and session data into one ordered
//! system prompt:
//! - Closed segment vocabulary and the per-call segment store
//! - Variable context for `{{user}}`/`{{char}}` style substitution
//! - Ordering, inclusion and anchor repositioning policies
//! - Built-in segment generators
//! - The assembly façade with its fallback prompt

pub mod assembler;
pub mod composer;
pub mod generators;
pub mod ordering;
pub mod segments;
pub mod store;
pub mod types;
pub mod variables;

// Re-export main types
pub use assembler::{fallback_prompt, variables_for, AssemblyReport, PromptAssembler};
pub use composer::{
    render_dynamic, Composer, CompositionOptions, InclusionPolicy, SegmentTransform,
};
pub use generators::{builtin_generators, GenerationContext, SegmentGenerator};
pub use ordering::{
    adjust_positions, select_order, AnchorOverrides, OrderKind, Placement, RepositionRule,
    CHAT_ORDER, DEFAULT_ORDER, DEVELOPER_ORDER,
};
pub use segments::{Feature, SegmentCategory, SegmentName, SegmentPatch, SegmentValue};
pub use store::{SegmentStore, ValidationReport, REQUIRED_SEGMENTS};
pub use types::{
    McpServerInfo, PromptOptions, Role, SystemInfo, ToolSpec, UserAvatar, WorldBookEntry,
};
pub use variables::{VariableContext, VARIABLE_NAMES};
