//! Variable context for template substitution.
//!
//! Built once per assembly call and never mutated afterwards.

use crate::types::{Role, UserAvatar};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// Variables every context defines, even when empty.
pub const VARIABLE_NAMES: &[&str] = &[
    "user",
    "char",
    "name",
    "description",
    "personality",
    "scenario",
    "first_mes",
    "mes_example",
    "isodate",
    "isotime",
    "mode",
    "workspace",
];

/// Flat name → value table consumed by the rewrite pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VariableContext {
    values: HashMap<String, String>,
}

impl VariableContext {
    /// Derive the context from the current role, user avatar, mode,
    /// workspace and clock. Missing fields resolve to empty strings.
    pub fn build(
        role: Option<&Role>,
        user_avatar: Option<&UserAvatar>,
        mode: &str,
        workspace: &str,
        now: DateTime<Utc>,
    ) -> Self {
        let field = |f: fn(&Role) -> &str| role.map(f).unwrap_or("").to_string();

        let iso = now.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
        let isodate = iso.split('T').next().unwrap_or("").to_string();
        let clock = now.format("%H:%M:%S %Z").to_string();
        let isotime = clock.split(' ').next().unwrap_or("").to_string();

        let char_name = field(|r| r.name.as_str());
        let values = HashMap::from([
            (
                "user".to_string(),
                user_avatar.map(|u| u.name.clone()).unwrap_or_default(),
            ),
            ("char".to_string(), char_name.clone()),
            ("name".to_string(), char_name),
            ("description".to_string(), field(|r| r.description.as_str())),
            ("personality".to_string(), field(|r| r.personality.as_str())),
            ("scenario".to_string(), field(|r| r.scenario.as_str())),
            ("first_mes".to_string(), field(|r| r.first_mes.as_str())),
            ("mes_example".to_string(), field(|r| r.mes_example.as_str())),
            ("isodate".to_string(), isodate),
            ("isotime".to_string(), isotime),
            ("mode".to_string(), mode.to_string()),
            ("workspace".to_string(), workspace.to_string()),
        ]);

        Self { values }
    }

    /// Value of `key`, empty when undefined.
    pub fn get(&self, key: &str) -> &str {
        self.values.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn as_map(&self) -> &HashMap<String, String> {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 2).unwrap()
    }

    #[test]
    fn test_build_from_role_and_avatar() {
        let role = Role {
            name: "Alice".to_string(),
            personality: "curious".to_string(),
            first_mes: "Hi there".to_string(),
            ..Default::default()
        };
        let user = UserAvatar {
            name: "Taro".to_string(),
            description: String::new(),
        };

        let ctx = VariableContext::build(Some(&role), Some(&user), "code", "/repo", fixed_now());
        assert_eq!(ctx.get("user"), "Taro");
        assert_eq!(ctx.get("char"), "Alice");
        assert_eq!(ctx.get("name"), "Alice");
        assert_eq!(ctx.get("personality"), "curious");
        assert_eq!(ctx.get("first_mes"), "Hi there");
        assert_eq!(ctx.get("mode"), "code");
        assert_eq!(ctx.get("workspace"), "/repo");
    }

    #[test]
    fn test_date_and_time_split() {
        let ctx = VariableContext::build(None, None, "", "", fixed_now());
        assert_eq!(ctx.get("isodate"), "2024-03-09");
        assert_eq!(ctx.get("isotime"), "07:05:02");
    }

    #[test]
    fn test_missing_fields_are_empty_not_absent() {
        let ctx = VariableContext::build(None, None, "chat", "", fixed_now());
        for name in VARIABLE_NAMES {
            assert!(ctx.as_map().contains_key(*name), "missing {}", name);
        }
        assert_eq!(ctx.get("user"), "");
        assert_eq!(ctx.get("scenario"), "");
        assert_eq!(ctx.get("undefined_var"), "");
    }
}
