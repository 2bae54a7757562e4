//! Segment composition: pick an order, filter it, reposition, cap, render.

use crate::ordering::{adjust_positions, select_order, AnchorOverrides};
use crate::segments::{Feature, SegmentName, SegmentValue};
use crate::store::SegmentStore;
use indexmap::IndexMap;
use loom_core::config::{AssemblyConfig, IncludeConfig};
use loom_core::AppResult;
use serde::{Deserialize, Serialize};

const SUMMARY_ENTRIES: usize = 3;
const SUMMARY_VALUE_CHARS: usize = 50;

/// Per-feature inclusion toggles. Everything is included by default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InclusionPolicy {
    pub user_avatar: bool,
    pub tool_definitions: bool,
    pub world_book: bool,
    pub mcp: bool,
    pub memory: bool,
    pub variable_state: bool,
}

impl Default for InclusionPolicy {
    fn default() -> Self {
        Self {
            user_avatar: true,
            tool_definitions: true,
            world_book: true,
            mcp: true,
            memory: true,
            variable_state: true,
        }
    }
}

impl InclusionPolicy {
    /// Whether `name` passes its feature toggle. Ungoverned names always do.
    pub fn allows(&self, name: SegmentName) -> bool {
        match name.feature() {
            None => true,
            Some(Feature::UserAvatar) => self.user_avatar,
            Some(Feature::ToolDefinitions) => self.tool_definitions,
            Some(Feature::WorldBook) => self.world_book,
            Some(Feature::Mcp) => self.mcp,
            Some(Feature::Memory) => self.memory,
            Some(Feature::VariableState) => self.variable_state,
        }
    }
}

impl From<&IncludeConfig> for InclusionPolicy {
    fn from(include: &IncludeConfig) -> Self {
        Self {
            user_avatar: include.user_avatar,
            tool_definitions: include.tool_definitions,
            world_book: include.world_book,
            mcp: include.mcp,
            memory: include.memory,
            variable_state: include.variable_state,
        }
    }
}

/// Knobs for one composition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompositionOptions {
    pub chat_mode: bool,
    pub developer_mode: bool,
    /// Ignored when either mode flag is set
    pub custom_order: Option<Vec<SegmentName>>,
    pub inclusion: InclusionPolicy,
    /// Applied after repositioning
    pub max_segments: Option<usize>,
    pub summary_only: bool,
    pub debug: bool,
    pub anchors: AnchorOverrides,
}

impl CompositionOptions {
    /// Defaults taken from the `assembly` section of the config file.
    pub fn from_config(config: &AssemblyConfig) -> Self {
        Self {
            chat_mode: config.chat_mode,
            developer_mode: config.developer_mode,
            custom_order: None,
            inclusion: InclusionPolicy::from(&config.include),
            max_segments: config.max_segments,
            summary_only: config.summary_only,
            debug: config.debug,
            anchors: AnchorOverrides::default(),
        }
    }
}

/// Per-segment rewrite hook applied before segments are joined.
pub trait SegmentTransform {
    fn transform(&self, name: SegmentName, content: &str) -> String;
}

/// Orders and renders the contents of a [`SegmentStore`].
#[derive(Debug, Clone, Default)]
pub struct Composer {
    options: CompositionOptions,
}

impl Composer {
    pub fn new(options: CompositionOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CompositionOptions {
        &self.options
    }

    /// Ordered list of segments to emit.
    ///
    /// Fails only for a malformed custom order.
    pub fn compose(&self, store: &SegmentStore) -> AppResult<Vec<SegmentName>> {
        let opts = &self.options;
        let (kind, base) = select_order(
            opts.chat_mode,
            opts.developer_mode,
            opts.custom_order.as_deref(),
        )?;

        let mut order: Vec<SegmentName> = base
            .into_iter()
            .filter(|name| store.get(*name).is_present())
            .filter(|name| {
                let allowed = opts.inclusion.allows(*name);
                if !allowed {
                    tracing::debug!("Segment '{}' excluded by inclusion policy", name);
                }
                allowed
            })
            .collect();

        adjust_positions(&mut order, &opts.anchors.rules());

        if let Some(max) = opts.max_segments {
            if order.len() > max {
                tracing::debug!("Capping {} segments to {}", order.len(), max);
                order.truncate(max);
            }
        }

        tracing::debug!("Composed {} segments using {:?} order", order.len(), kind);
        Ok(order)
    }

    /// Render `order` from `store`, optionally rewriting each segment.
    pub fn render(
        &self,
        store: &SegmentStore,
        order: &[SegmentName],
        transform: Option<&dyn SegmentTransform>,
    ) -> String {
        let mut blocks = Vec::with_capacity(order.len());

        for name in order {
            let content = match store.get(*name) {
                SegmentValue::Text(text) => text.clone(),
                SegmentValue::Dynamic(entries) => {
                    render_dynamic(entries, self.options.summary_only)
                }
                SegmentValue::Absent => continue,
            };

            let content = match transform {
                Some(t) => t.transform(*name, &content),
                None => content,
            };

            if content.trim().is_empty() {
                tracing::debug!("Segment '{}' is empty after rewriting; skipped", name);
                continue;
            }
            blocks.push(content);
        }

        let count = blocks.len();
        let mut output = blocks.join("\n\n");
        if self.options.debug {
            if count > 0 {
                output.push_str("\n\n");
            }
            output.push_str(&format!("<!-- loom: {} segments rendered -->", count));
        }
        output
    }

    /// `compose` followed by `render`.
    pub fn build(
        &self,
        store: &SegmentStore,
        transform: Option<&dyn SegmentTransform>,
    ) -> AppResult<(Vec<SegmentName>, String)> {
        let order = self.compose(store)?;
        let text = self.render(store, &order, transform);
        Ok((order, text))
    }
}

/// Render a dynamic value as subsections, or as a short bullet summary.
pub fn render_dynamic(entries: &IndexMap<String, String>, summary_only: bool) -> String {
    if summary_only {
        return entries
            .iter()
            .take(SUMMARY_ENTRIES)
            .map(|(key, value)| format!("- {}: {}", key, truncate(value, SUMMARY_VALUE_CHARS)))
            .collect::<Vec<_>>()
            .join("\n");
    }

    entries
        .iter()
        .map(|(key, value)| format!("### {}\n{}", capitalize(key), value))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() > max {
        let head: String = value.chars().take(max).collect();
        format!("{}...", head)
    } else {
        value.to_string()
    }
}

fn capitalize(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
