//! Segment vocabulary and values.
//!
//! Every block of the system prompt is a named segment. The vocabulary is
//! closed: new kinds of content get a new variant here, and caller-defined
//! blocks go into the dynamic `extensions` segment.

use indexmap::IndexMap;
use loom_core::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Grouping of segment names, used for documentation and previews.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SegmentCategory {
    Identity,
    Dialogue,
    SystemInstructions,
    CreatorMetadata,
    WorldInfo,
    Memory,
    ToolDefinitions,
    McpInfo,
    Capabilities,
    Rules,
    Objectives,
    ModeInfo,
    SystemInfo,
    CustomInstructions,
    VariableState,
    Formatting,
    UserAvatar,
    Extensions,
}

/// Inclusion toggles that can drop a present segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    UserAvatar,
    ToolDefinitions,
    WorldBook,
    Mcp,
    Memory,
    VariableState,
}

macro_rules! segment_names {
    ($($variant:ident => $name:literal, $category:ident;)+) => {
        /// Name of one prompt segment.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub enum SegmentName {
            $($variant,)+
        }

        impl SegmentName {
            /// Every known segment, in vocabulary order.
            pub const ALL: &'static [SegmentName] = &[$(SegmentName::$variant,)+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(SegmentName::$variant => $name,)+
                }
            }

            pub fn category(&self) -> SegmentCategory {
                match self {
                    $(SegmentName::$variant => SegmentCategory::$category,)+
                }
            }
        }

        impl FromStr for SegmentName {
            type Err = AppError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(SegmentName::$variant),)+
                    other => Err(AppError::Prompt(format!("Unknown segment name: {}", other))),
                }
            }
        }
    };
}

segment_names! {
    CharacterOverview => "characterOverview", Identity;
    Personality => "personality", Identity;
    Background => "background", Identity;
    Appearance => "appearance", Identity;
    Skills => "skills", Identity;
    Relationships => "relationships", Identity;
    Tags => "tags", Identity;
    FirstMessage => "firstMessage", Dialogue;
    ExampleDialogue => "exampleDialogue", Dialogue;
    DialogueStyle => "dialogueStyle", Dialogue;
    SystemInstructions => "systemInstructions", SystemInstructions;
    SystemSettings => "systemSettings", SystemInstructions;
    PostHistoryInstructions => "postHistoryInstructions", SystemInstructions;
    CreatorNotes => "creatorNotes", CreatorMetadata;
    CreatorInfo => "creatorInfo", CreatorMetadata;
    CharacterVersion => "characterVersion", CreatorMetadata;
    WorldSettings => "worldSettings", WorldInfo;
    WorldBookContent => "worldBookContent", WorldInfo;
    LoreEntries => "loreEntries", WorldInfo;
    Memory => "memory", Memory;
    LongTermMemory => "longTermMemory", Memory;
    ToolDefinitions => "toolDefinitions", ToolDefinitions;
    ToolUseGuidelines => "toolUseGuidelines", ToolDefinitions;
    ToolExamples => "toolExamples", ToolDefinitions;
    McpServers => "mcpServers", McpInfo;
    McpResources => "mcpResources", McpInfo;
    Capabilities => "capabilities", Capabilities;
    FileEditing => "fileEditing", Capabilities;
    BrowserAccess => "browserAccess", Capabilities;
    Rules => "rules", Rules;
    ProjectRules => "projectRules", Rules;
    SafetyRules => "safetyRules", Rules;
    Objectives => "objectives", Objectives;
    TaskGuidance => "taskGuidance", Objectives;
    ModeInfo => "modeInfo", ModeInfo;
    AvailableModes => "availableModes", ModeInfo;
    SystemInfo => "systemInfo", SystemInfo;
    EnvironmentDetails => "environmentDetails", SystemInfo;
    RoleDefinition => "roleDefinition", CustomInstructions;
    CustomInstructions => "customInstructions", CustomInstructions;
    GlobalCustomInstructions => "globalCustomInstructions", CustomInstructions;
    LanguagePreference => "languagePreference", CustomInstructions;
    VariableState => "variableState", VariableState;
    MarkdownFormatting => "markdownFormatting", Formatting;
    OutputFormat => "outputFormat", Formatting;
    UserAvatar => "userAvatar", UserAvatar;
    Extensions => "extensions", Extensions;
}

impl SegmentName {
    /// The inclusion toggle that governs this segment, if any.
    pub fn feature(&self) -> Option<Feature> {
        match self {
            SegmentName::UserAvatar => Some(Feature::UserAvatar),
            SegmentName::ToolDefinitions
            | SegmentName::ToolUseGuidelines
            | SegmentName::ToolExamples => Some(Feature::ToolDefinitions),
            SegmentName::WorldBookContent | SegmentName::LoreEntries => Some(Feature::WorldBook),
            SegmentName::McpServers | SegmentName::McpResources => Some(Feature::Mcp),
            SegmentName::Memory | SegmentName::LongTermMemory => Some(Feature::Memory),
            SegmentName::VariableState => Some(Feature::VariableState),
            _ => None,
        }
    }
}

impl fmt::Display for SegmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content of one segment slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SegmentValue {
    #[default]
    Absent,
    Text(String),
    /// Named sub-blocks, rendered as subsections or a short summary
    Dynamic(IndexMap<String, String>),
}

impl SegmentValue {
    pub fn is_present(&self) -> bool {
        !matches!(self, SegmentValue::Absent)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SegmentValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// A partial store update, as produced by one generator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentPatch {
    entries: Vec<(SegmentName, SegmentValue)>,
}

impl SegmentPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a text segment. Blank text is kept here and dropped by the store.
    pub fn text(mut self, name: SegmentName, content: impl Into<String>) -> Self {
        self.entries.push((name, SegmentValue::Text(content.into())));
        self
    }

    /// Add a dynamic segment.
    pub fn dynamic(mut self, name: SegmentName, entries: IndexMap<String, String>) -> Self {
        self.entries.push((name, SegmentValue::Dynamic(entries)));
        self
    }

    pub fn push(&mut self, name: SegmentName, value: SegmentValue) {
        self.entries.push((name, value));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(SegmentName, SegmentValue)> {
        self.entries.iter()
    }
}

impl IntoIterator for SegmentPatch {
    type Item = (SegmentName, SegmentValue);
    type IntoIter = std::vec::IntoIter<(SegmentName, SegmentValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip_through_strings() {
        for name in SegmentName::ALL {
            assert_eq!(name.as_str().parse::<SegmentName>().unwrap(), *name);
        }
        assert!("notASegment".parse::<SegmentName>().is_err());
    }

    #[test]
    fn test_serde_uses_camel_case() {
        let json = serde_json::to_string(&SegmentName::WorldBookContent).unwrap();
        assert_eq!(json, "\"worldBookContent\"");
        let parsed: SegmentName = serde_json::from_str("\"userAvatar\"").unwrap();
        assert_eq!(parsed, SegmentName::UserAvatar);
    }

    #[test]
    fn test_vocabulary_is_unique() {
        let mut names: Vec<&str> = SegmentName::ALL.iter().map(|n| n.as_str()).collect();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
        assert!(total >= 45);
    }

    #[test]
    fn test_feature_mapping() {
        assert_eq!(SegmentName::UserAvatar.feature(), Some(Feature::UserAvatar));
        assert_eq!(SegmentName::ToolExamples.feature(), Some(Feature::ToolDefinitions));
        assert_eq!(SegmentName::LoreEntries.feature(), Some(Feature::WorldBook));
        assert_eq!(SegmentName::Personality.feature(), None);
        assert_eq!(SegmentName::McpServers.category(), SegmentCategory::McpInfo);
    }
}
