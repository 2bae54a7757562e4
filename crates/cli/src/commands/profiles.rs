//! Profiles command handler.

use clap::Args;
use loom_core::{config::AppConfig, AppResult};
use loom_transform::{list_profiles, load_profile};

/// List rule profiles in the workspace
#[derive(Args, Debug)]
pub struct ProfilesCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl ProfilesCommand {
    /// Execute the profiles command.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing profiles command");

        let dir = config.profiles_dir();
        let names = list_profiles(&dir)?;

        let mut entries = Vec::new();
        for name in &names {
            let path = ["yml", "yaml"]
                .iter()
                .map(|ext| dir.join(format!("{}.{}", name, ext)))
                .find(|p| p.exists());
            let Some(path) = path else { continue };

            match load_profile(&path) {
                Ok(profile) => entries.push(serde_json::json!({
                    "name": name,
                    "rules": profile.rules.len(),
                    "valid": true,
                })),
                Err(e) => {
                    tracing::warn!("Skipping invalid profile {:?}: {}", path, e);
                    entries.push(serde_json::json!({
                        "name": name,
                        "valid": false,
                        "error": e.to_string(),
                    }));
                }
            }
        }

        if self.json {
            println!("{}", serde_json::to_string_pretty(&entries)?);
            return Ok(());
        }

        if entries.is_empty() {
            println!("No rule profiles in {:?}", dir);
            return Ok(());
        }

        for entry in &entries {
            match entry["rules"].as_u64() {
                Some(count) => println!(
                    "{}  ({} rules)",
                    entry["name"].as_str().unwrap_or(""),
                    count
                ),
                None => println!(
                    "{}  (invalid: {})",
                    entry["name"].as_str().unwrap_or(""),
                    entry["error"].as_str().unwrap_or("")
                ),
            }
        }

        Ok(())
    }
}
