//! Rule compilation and application.
//!
//! A [`CompiledRuleSet`] is built once from a profile (and optional mixin)
//! and then only read. Replacement templates are registered with a
//! Handlebars registry so `{{user}}`-style variables resolve at apply time;
//! capture references (`$1`, `$<name>`, `{{match}}`) are expanded per match.

use crate::loader::merge_profiles;
use crate::types::{RuleDefinition, RuleProfile, Stage, TargetScope};
use handlebars::Handlebars;
use loom_core::{AppError, AppResult};
use regex::{Captures, Regex, RegexBuilder};
use std::borrow::Cow;
use std::collections::HashMap;

/// Flags parsed from the `/pattern/flags` form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatternFlags {
    pub global: bool,
    pub case_insensitive: bool,
    pub multi_line: bool,
    pub dot_all: bool,
}

/// Split `find` into a pattern and flags.
///
/// `/pattern/flags` uses the given flags; a bare pattern replaces every
/// match, case-sensitively.
pub fn parse_find(find: &str) -> AppResult<(String, PatternFlags)> {
    if let Some(rest) = find.strip_prefix('/') {
        if let Some(end) = rest.rfind('/') {
            let pattern = &rest[..end];
            let mut flags = PatternFlags::default();
            for c in rest[end + 1..].chars() {
                match c {
                    'g' => flags.global = true,
                    'i' => flags.case_insensitive = true,
                    'm' => flags.multi_line = true,
                    's' => flags.dot_all = true,
                    'u' | 'y' => {}
                    other => {
                        return Err(AppError::Transform(format!(
                            "unsupported regex flag '{}' in {}",
                            other, find
                        )))
                    }
                }
            }
            return Ok((pattern.to_string(), flags));
        }
    }

    Ok((
        find.to_string(),
        PatternFlags {
            global: true,
            ..Default::default()
        },
    ))
}

fn build_regex(pattern: &str, flags: PatternFlags) -> AppResult<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(flags.case_insensitive)
        .multi_line(flags.multi_line)
        .dot_matches_new_line(flags.dot_all)
        .build()
        .map_err(|e| AppError::Transform(format!("invalid pattern: {}", e)))
}

#[derive(Debug, Clone)]
enum FindPattern {
    Static(Regex),
    /// Rendered with the variable context on every apply
    Templated(String),
}

/// One rule ready to run.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    id: String,
    pattern: FindPattern,
    flags: PatternFlags,
    trim: Vec<String>,
    prompt_only: bool,
    markdown_only: bool,
}

impl CompiledRule {
    fn compile(rule: &RuleDefinition, registry: &mut Handlebars<'static>) -> AppResult<Self> {
        let (source, flags) = parse_find(&rule.find)?;

        let pattern = if rule.substitute_find {
            registry
                .register_template_string(&find_template_name(&rule.id), &source)
                .map_err(|e| AppError::Transform(format!("invalid find template: {}", e)))?;
            FindPattern::Templated(source)
        } else {
            FindPattern::Static(build_regex(&source, flags)?)
        };

        let template = rule.replace.replace("{{match}}", "$0");
        registry
            .register_template_string(&rule.id, template)
            .map_err(|e| AppError::Transform(format!("invalid replacement template: {}", e)))?;

        Ok(Self {
            id: rule.id.clone(),
            pattern,
            flags,
            trim: rule.trim.clone(),
            prompt_only: rule.prompt_only,
            markdown_only: rule.markdown_only,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Rewrite `text`, returning `None` when nothing matched.
    fn apply(
        &self,
        text: &str,
        registry: &Handlebars<'static>,
        vars: &RenderVars,
    ) -> AppResult<Option<String>> {
        let regex = match &self.pattern {
            FindPattern::Static(re) => Cow::Borrowed(re),
            FindPattern::Templated(_) => {
                let source = registry
                    .render(&find_template_name(&self.id), &vars.regex_escaped)
                    .map_err(|e| AppError::Transform(format!("rule '{}': {}", self.id, e)))?;
                let re = build_regex(&source, self.flags).map_err(|e| {
                    AppError::Transform(format!("rule '{}': {}", self.id, detail(e)))
                })?;
                Cow::Owned(re)
            }
        };

        if !regex.is_match(text) {
            return Ok(None);
        }

        let replacement = registry
            .render(&self.id, &vars.dollar_escaped)
            .map_err(|e| AppError::Transform(format!("rule '{}': {}", self.id, e)))?;

        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for caps in regex.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            out.push_str(&text[last..whole.start()]);
            expand_captures(&replacement, &caps, &self.trim, &mut out);
            last = whole.end();
            if !self.flags.global {
                break;
            }
        }
        out.push_str(&text[last..]);

        Ok(Some(out))
    }
}

fn detail(err: AppError) -> String {
    match err {
        AppError::Transform(msg) => msg,
        other => other.to_string(),
    }
}

fn find_template_name(id: &str) -> String {
    format!("{}#find", id)
}

/// Variable maps prepared for the two places variables are rendered.
struct RenderVars {
    /// `$` doubled so values cannot introduce capture references
    dollar_escaped: HashMap<String, String>,
    /// Regex metacharacters escaped for pattern substitution
    regex_escaped: HashMap<String, String>,
}

impl RenderVars {
    fn new(vars: &HashMap<String, String>) -> Self {
        Self {
            dollar_escaped: vars
                .iter()
                .map(|(k, v)| (k.clone(), v.replace('$', "$$")))
                .collect(),
            regex_escaped: vars
                .iter()
                .map(|(k, v)| (k.clone(), regex::escape(v)))
                .collect(),
        }
    }
}

/// Append `template` to `dst`, resolving `$$`, `$n`, `$nn` and `$<name>`.
///
/// Unknown references are written literally; missing groups expand empty.
fn expand_captures(template: &str, caps: &Captures<'_>, trim: &[String], dst: &mut String) {
    let bytes = template.as_bytes();
    let mut i = 0;
    let mut literal_start = 0;

    while i < bytes.len() {
        if bytes[i] != b'$' || i + 1 >= bytes.len() {
            i += 1;
            continue;
        }

        let next = bytes[i + 1];
        let (consumed, group): (usize, Option<Option<&str>>) = if next == b'$' {
            dst.push_str(&template[literal_start..i]);
            dst.push('$');
            i += 2;
            literal_start = i;
            continue;
        } else if next.is_ascii_digit() {
            let one = (next - b'0') as usize;
            let two = bytes
                .get(i + 2)
                .filter(|b| b.is_ascii_digit())
                .map(|b| one * 10 + (b - b'0') as usize)
                .filter(|n| *n < caps.len());
            match two {
                Some(n) => (3, Some(caps.get(n).map(|m| m.as_str()))),
                None if one < caps.len() => (2, Some(caps.get(one).map(|m| m.as_str()))),
                None => (0, None),
            }
        } else if next == b'<' {
            match template[i + 2..].find('>') {
                Some(close) => {
                    let name = &template[i + 2..i + 2 + close];
                    (close + 3, Some(caps.name(name).map(|m| m.as_str())))
                }
                None => (0, None),
            }
        } else {
            (0, None)
        };

        match group {
            Some(value) => {
                dst.push_str(&template[literal_start..i]);
                let mut value = value.unwrap_or("").to_string();
                for t in trim.iter().filter(|t| !t.is_empty()) {
                    value = value.replace(t.as_str(), "");
                }
                dst.push_str(&value);
                i += consumed;
                literal_start = i;
            }
            None => i += 1,
        }
    }

    dst.push_str(&template[literal_start..]);
}

/// The full compiled rule set for all three stages.
pub struct CompiledRuleSet {
    registry: Handlebars<'static>,
    input: Vec<CompiledRule>,
    output: Vec<CompiledRule>,
    final_content: Vec<CompiledRule>,
    profile: Option<String>,
    mixin: Option<String>,
}

impl std::fmt::Debug for CompiledRuleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledRuleSet")
            .field("input", &self.input.len())
            .field("output", &self.output.len())
            .field("final", &self.final_content.len())
            .field("profile", &self.profile)
            .field("mixin", &self.mixin)
            .finish()
    }
}

impl CompiledRuleSet {
    /// Merge `mixin` over `profile` and compile every enabled stage.
    ///
    /// Fails on the first rule that does not compile; the error names the
    /// stage and rule.
    pub fn compile(profile: Option<&RuleProfile>, mixin: Option<&RuleProfile>) -> AppResult<Self> {
        let merged = merge_profiles(profile, mixin);

        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);

        let mut compiled: HashMap<String, CompiledRule> = HashMap::new();
        let mut stages: HashMap<Stage, Vec<CompiledRule>> = HashMap::new();

        for stage in Stage::ALL {
            let mut list = Vec::new();
            if merged.stages.is_enabled(stage) {
                for rule in merged.rules.iter().filter(|r| r.runs_in(stage)) {
                    let rule = match compiled.get(&rule.id) {
                        Some(existing) => existing.clone(),
                        None => {
                            let built = CompiledRule::compile(rule, &mut registry).map_err(|e| {
                                AppError::Transform(format!(
                                    "{} stage: rule '{}': {}",
                                    stage,
                                    rule.id,
                                    detail(e)
                                ))
                            })?;
                            compiled.insert(rule.id.clone(), built.clone());
                            built
                        }
                    };
                    list.push(rule);
                }
            }
            stages.insert(stage, list);
        }

        Ok(Self {
            registry,
            input: stages.remove(&Stage::Input).unwrap_or_default(),
            output: stages.remove(&Stage::Output).unwrap_or_default(),
            final_content: stages.remove(&Stage::Final).unwrap_or_default(),
            profile: profile.map(|p| p.name.clone()),
            mixin: mixin.map(|m| m.name.clone()),
        })
    }

    pub fn rules(&self, stage: Stage) -> &[CompiledRule] {
        match stage {
            Stage::Input => &self.input,
            Stage::Output => &self.output,
            Stage::Final => &self.final_content,
        }
    }

    pub fn profile_name(&self) -> Option<&str> {
        self.profile.as_deref()
    }

    pub fn mixin_name(&self) -> Option<&str> {
        self.mixin.as_deref()
    }

    /// Run the stage's rules in order over `text`.
    ///
    /// Returns the rewritten text and the ids of the rules that matched.
    /// Any rule error aborts the whole call.
    pub fn apply(
        &self,
        stage: Stage,
        scope: TargetScope,
        text: &str,
        vars: &HashMap<String, String>,
    ) -> AppResult<(String, Vec<String>)> {
        let render_vars = RenderVars::new(vars);
        let mut current = text.to_string();
        let mut applied = Vec::new();

        for rule in self.rules(stage) {
            if stage == Stage::Final && !scope.admits(rule.prompt_only, rule.markdown_only) {
                continue;
            }
            if let Some(next) = rule.apply(&current, &self.registry, &render_vars)? {
                applied.push(rule.id.clone());
                current = next;
            }
        }

        Ok((current, applied))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn single(rule: RuleDefinition) -> CompiledRuleSet {
        let profile = RuleProfile::new("test", vec![rule]);
        CompiledRuleSet::compile(Some(&profile), None).unwrap()
    }

    #[test]
    fn test_parse_find_with_flags() {
        let (pattern, flags) = parse_find("/hello (\\w+)/gi").unwrap();
        assert_eq!(pattern, "hello (\\w+)");
        assert!(flags.global);
        assert!(flags.case_insensitive);
        assert!(!flags.multi_line);
    }

    #[test]
    fn test_parse_find_bare_pattern_is_global() {
        let (pattern, flags) = parse_find("a+b").unwrap();
        assert_eq!(pattern, "a+b");
        assert!(flags.global);
    }

    #[test]
    fn test_parse_find_rejects_unknown_flag() {
        assert!(parse_find("/x/q").is_err());
    }

    #[test]
    fn test_variable_substitution_in_replacement() {
        let set = single(RuleDefinition::new(
            "user",
            "/\\{\\{user\\}\\}/g",
            "{{user}}",
            &[Stage::Output],
        ));

        let (out, applied) = set
            .apply(
                Stage::Output,
                TargetScope::All,
                "Hello {{user}}!",
                &vars(&[("user", "Taro")]),
            )
            .unwrap();
        assert_eq!(out, "Hello Taro!");
        assert_eq!(applied, vec!["user".to_string()]);
    }

    #[test]
    fn test_non_global_replaces_first_match_only() {
        let set = single(RuleDefinition::new("one", "/cat/", "dog", &[Stage::Input]));
        let (out, _) = set
            .apply(Stage::Input, TargetScope::All, "cat cat", &HashMap::new())
            .unwrap();
        assert_eq!(out, "dog cat");
    }

    #[test]
    fn test_capture_references_and_match() {
        let set = single(RuleDefinition::new(
            "swap",
            "/(?P<first>\\w+) (\\w+)/",
            "$2 $<first> [{{match}}] $$1",
            &[Stage::Input],
        ));
        let (out, _) = set
            .apply(Stage::Input, TargetScope::All, "hello world", &HashMap::new())
            .unwrap();
        assert_eq!(out, "world hello [hello world] $1");
    }

    #[test]
    fn test_variable_values_cannot_inject_captures() {
        let set = single(RuleDefinition::new(
            "name",
            "/NAME/",
            "{{char}}",
            &[Stage::Input],
        ));
        let (out, _) = set
            .apply(
                Stage::Input,
                TargetScope::All,
                "NAME",
                &vars(&[("char", "$0 & co")]),
            )
            .unwrap();
        assert_eq!(out, "$0 & co");
    }

    #[test]
    fn test_trim_strings_removed_from_captures() {
        let mut rule = RuleDefinition::new("trim", "/<(.*?)>/g", "[$1]", &[Stage::Output]);
        rule.trim = vec!["*".to_string()];
        let set = single(rule);
        let (out, _) = set
            .apply(Stage::Output, TargetScope::All, "<*wave*> <nod>", &HashMap::new())
            .unwrap();
        assert_eq!(out, "[wave] [nod]");
    }

    #[test]
    fn test_substitute_find_escapes_variables() {
        let mut rule = RuleDefinition::new("mention", "/@{{user}}/g", "you", &[Stage::Input]);
        rule.substitute_find = true;
        let set = single(rule);
        let (out, _) = set
            .apply(
                Stage::Input,
                TargetScope::All,
                "hi @a.b and @axb",
                &vars(&[("user", "a.b")]),
            )
            .unwrap();
        assert_eq!(out, "hi you and @axb");
    }

    #[test]
    fn test_final_stage_respects_scope() {
        let mut display = RuleDefinition::new("display", "/x/g", "D", &[Stage::Final]);
        display.markdown_only = true;
        let mut prompt = RuleDefinition::new("prompt", "/y/g", "P", &[Stage::Final]);
        prompt.prompt_only = true;
        let profile = RuleProfile::new("scoped", vec![display, prompt]);
        let set = CompiledRuleSet::compile(Some(&profile), None).unwrap();
        let none = HashMap::new();

        let (out, _) = set
            .apply(Stage::Final, TargetScope::PromptContent, "xy", &none)
            .unwrap();
        assert_eq!(out, "xP");

        let (out, _) = set
            .apply(Stage::Final, TargetScope::DisplayContent, "xy", &none)
            .unwrap();
        assert_eq!(out, "Dy");

        let (out, _) = set.apply(Stage::Final, TargetScope::All, "xy", &none).unwrap();
        assert_eq!(out, "DP");
    }

    #[test]
    fn test_disabled_stage_compiles_no_rules() {
        let mut profile = RuleProfile::new(
            "quiet",
            vec![RuleDefinition::new("r", "a", "b", &[Stage::Input, Stage::Output])],
        );
        profile.stages.input = Some(false);
        let set = CompiledRuleSet::compile(Some(&profile), None).unwrap();
        assert!(set.rules(Stage::Input).is_empty());
        assert_eq!(set.rules(Stage::Output).len(), 1);
    }

    #[test]
    fn test_compile_error_names_stage_and_rule() {
        let profile = RuleProfile::new(
            "broken",
            vec![RuleDefinition::new("bad", "/(unclosed/", "", &[Stage::Output])],
        );
        let err = CompiledRuleSet::compile(Some(&profile), None).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("output stage"));
        assert!(msg.contains("'bad'"));
    }

    #[test]
    fn test_unmatched_rule_is_not_reported() {
        let set = single(RuleDefinition::new("none", "zzz", "y", &[Stage::Input]));
        let (out, applied) = set
            .apply(Stage::Input, TargetScope::All, "abc", &HashMap::new())
            .unwrap();
        assert_eq!(out, "abc");
        assert!(applied.is_empty());
    }
}
