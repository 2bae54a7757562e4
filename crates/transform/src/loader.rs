//! Loading and merging rule profiles.

use crate::types::{RuleDefinition, RuleProfile};
use loom_core::{AppError, AppResult};
use std::collections::HashSet;
use std::path::Path;

/// Load a rule profile (or mixin) from a YAML file.
///
/// # Example
/// ```no_run
/// use loom_transform::load_profile;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let profile = load_profile(Path::new(".loom/profiles/tidy.yml"))?;
/// println!("Loaded {} rules", profile.rules.len());
/// # Ok(())
/// # }
/// ```
pub fn load_profile(path: &Path) -> AppResult<RuleProfile> {
    tracing::debug!("Loading rule profile from: {:?}", path);

    if !path.exists() {
        return Err(AppError::Transform(format!(
            "Rule profile not found: {:?}",
            path
        )));
    }

    let contents = std::fs::read_to_string(path).map_err(|e| {
        AppError::Transform(format!("Failed to read rule profile {:?}: {}", path, e))
    })?;

    let mut profile: RuleProfile = serde_yaml::from_str(&contents).map_err(|e| {
        AppError::Transform(format!("Failed to parse rule profile {:?}: {}", path, e))
    })?;

    if profile.name.is_empty() {
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            profile.name = stem.to_string();
        }
    }

    validate_profile(&profile)?;

    tracing::info!(
        "Loaded rule profile: {} ({} rules)",
        profile.name,
        profile.rules.len()
    );

    Ok(profile)
}

/// List profile names (file stems) in a directory.
pub fn list_profiles(dir: &Path) -> AppResult<Vec<String>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut names = Vec::new();

    for entry in walkdir::WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        let is_yaml = matches!(
            path.extension().and_then(|s| s.to_str()),
            Some("yml") | Some("yaml")
        );
        if path.is_file() && is_yaml {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
    }

    names.sort();
    Ok(names)
}

/// Validate a profile's rules.
pub fn validate_profile(profile: &RuleProfile) -> AppResult<()> {
    let mut seen = HashSet::new();

    for rule in &profile.rules {
        if rule.id.trim().is_empty() {
            return Err(AppError::Transform(format!(
                "Profile '{}' has a rule with an empty id",
                profile.name
            )));
        }

        if !seen.insert(rule.id.as_str()) {
            return Err(AppError::Transform(format!(
                "Profile '{}' defines rule '{}' more than once",
                profile.name, rule.id
            )));
        }

        // A disabled mixin entry only needs its id.
        if rule.disabled {
            continue;
        }

        if rule.find.is_empty() {
            return Err(AppError::Transform(format!(
                "Rule '{}' has an empty find pattern",
                rule.id
            )));
        }

        if rule.stages.is_empty() {
            return Err(AppError::Transform(format!(
                "Rule '{}' is not assigned to any stage",
                rule.id
            )));
        }
    }

    Ok(())
}

/// Overlay `mixin` on `profile`.
///
/// Mixin stage switches win where set. A mixin rule replaces the profile
/// rule with the same id in place, a disabled mixin rule removes it, and
/// new ids are appended in mixin order.
pub fn merge_profiles(profile: Option<&RuleProfile>, mixin: Option<&RuleProfile>) -> RuleProfile {
    let mut merged = profile.cloned().unwrap_or_default();

    let Some(mixin) = mixin else {
        return merged;
    };

    if merged.name.is_empty() {
        merged.name = mixin.name.clone();
    }
    merged.stages = merged.stages.overlay(&mixin.stages);

    for rule in &mixin.rules {
        let existing = merged.rules.iter().position(|r| r.id == rule.id);
        match (existing, rule.disabled) {
            (Some(idx), true) => {
                merged.rules.remove(idx);
            }
            (Some(idx), false) => merged.rules[idx] = rule.clone(),
            (None, false) => merged.rules.push(rule.clone()),
            (None, true) => {}
        }
    }

    merged.rules.retain(|r: &RuleDefinition| !r.disabled);
    merged
}
