//! Compiled module rule matching.
//!
//! Rules are compiled once at factory construction - malformed patterns
//! fail there, before any build starts. Matching runs per request and
//! folds every matching rule (in declaration order) into one
//! [`RuleEffects`]: loader lists per enforce class, module type, merged
//! parser/generator options and the side-effects flag.

use knot_graph::ModuleType;
use regex::Regex;

use crate::options::{LoaderEnforce, ModuleRule};
use crate::{Error, Result};

#[derive(Debug)]
struct CompiledRule {
    test: Option<Regex>,
    resource_query: Option<Regex>,
    issuer: Option<Regex>,
    compiler: Option<Regex>,
    loaders_pre: Vec<String>,
    loaders_normal: Vec<String>,
    loaders_post: Vec<String>,
    module_type: Option<ModuleType>,
    parser_options: serde_json::Value,
    generator_options: serde_json::Value,
    side_effects: Option<bool>,
}

/// What a request is matched against.
#[derive(Debug, Clone, Copy)]
pub struct RuleMatchInput<'a> {
    /// Resource used for matching - the match-resource override when set.
    pub resource: &'a str,
    /// The actually resolved resource path.
    pub real_resource: &'a str,
    /// Resource query including `?`, or empty.
    pub resource_query: &'a str,
    /// Identifier of the issuing module, if any.
    pub issuer: Option<&'a str>,
    pub compiler_name: &'a str,
}

/// Folded settings of all matching rules.
#[derive(Debug, Clone, Default)]
pub struct RuleEffects {
    pub loaders_pre: Vec<String>,
    pub loaders_normal: Vec<String>,
    pub loaders_post: Vec<String>,
    pub module_type: Option<ModuleType>,
    pub parser_options: serde_json::Value,
    pub generator_options: serde_json::Value,
    pub side_effects: Option<bool>,
}

/// The ordered, compiled rule set.
#[derive(Debug)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    /// Compile user rules, failing fast on unsupported configuration.
    pub fn compile(rules: &[ModuleRule]) -> Result<Self> {
        let compiled = rules.iter().map(compile_rule).collect::<Result<_>>()?;
        Ok(Self { rules: compiled })
    }

    /// Fold all matching rules over `input`, in declaration order.
    pub fn match_request(&self, input: RuleMatchInput<'_>) -> RuleEffects {
        let mut effects = RuleEffects {
            parser_options: serde_json::Value::Null,
            generator_options: serde_json::Value::Null,
            ..RuleEffects::default()
        };

        for rule in &self.rules {
            if !rule_matches(rule, &input) {
                continue;
            }
            effects.loaders_pre.extend(rule.loaders_pre.iter().cloned());
            effects
                .loaders_normal
                .extend(rule.loaders_normal.iter().cloned());
            effects
                .loaders_post
                .extend(rule.loaders_post.iter().cloned());
            if rule.module_type.is_some() {
                effects.module_type = rule.module_type;
            }
            merge_option_values(&mut effects.parser_options, &rule.parser_options);
            merge_option_values(&mut effects.generator_options, &rule.generator_options);
            if rule.side_effects.is_some() {
                effects.side_effects = rule.side_effects;
            }
        }

        effects
    }
}

fn compile_rule(rule: &ModuleRule) -> Result<CompiledRule> {
    if rule.test.is_none()
        && rule.resource_query.is_none()
        && rule.issuer.is_none()
        && rule.compiler.is_none()
    {
        return Err(Error::InvalidRule(
            "rule has no matcher (test, resource_query, issuer or compiler required)".into(),
        ));
    }

    let module_type = match &rule.module_type {
        Some(value) => Some(ModuleType::from_config(value).ok_or_else(|| {
            Error::InvalidRule(format!("unsupported module type {value:?}"))
        })?),
        None => None,
    };

    if let Some(options) = [&rule.parser_options, &rule.generator_options]
        .into_iter()
        .find(|v| !v.is_null() && !v.is_object())
    {
        return Err(Error::InvalidRule(format!(
            "parser/generator options must be objects, got {options}"
        )));
    }

    let mut loaders_pre = Vec::new();
    let mut loaders_normal = Vec::new();
    let mut loaders_post = Vec::new();
    for loader in &rule.loaders {
        match loader.enforce {
            LoaderEnforce::Pre => loaders_pre.push(loader.loader.clone()),
            LoaderEnforce::Normal => loaders_normal.push(loader.loader.clone()),
            LoaderEnforce::Post => loaders_post.push(loader.loader.clone()),
        }
    }

    Ok(CompiledRule {
        test: compile_pattern(rule.test.as_deref(), "test")?,
        resource_query: compile_pattern(rule.resource_query.as_deref(), "resource_query")?,
        issuer: compile_pattern(rule.issuer.as_deref(), "issuer")?,
        compiler: compile_pattern(rule.compiler.as_deref(), "compiler")?,
        loaders_pre,
        loaders_normal,
        loaders_post,
        module_type,
        parser_options: rule.parser_options.clone(),
        generator_options: rule.generator_options.clone(),
        side_effects: rule.side_effects,
    })
}

fn compile_pattern(pattern: Option<&str>, field: &str) -> Result<Option<Regex>> {
    pattern
        .map(|p| {
            Regex::new(p)
                .map_err(|e| Error::InvalidRule(format!("invalid {field} pattern {p:?}: {e}")))
        })
        .transpose()
}

fn rule_matches(rule: &CompiledRule, input: &RuleMatchInput<'_>) -> bool {
    if let Some(test) = &rule.test {
        if !test.is_match(input.resource) && !test.is_match(input.real_resource) {
            return false;
        }
    }
    if let Some(query) = &rule.resource_query {
        if !query.is_match(input.resource_query) {
            return false;
        }
    }
    if let Some(issuer) = &rule.issuer {
        match input.issuer {
            Some(value) if issuer.is_match(value) => {}
            _ => return false,
        }
    }
    if let Some(compiler) = &rule.compiler {
        if !compiler.is_match(input.compiler_name) {
            return false;
        }
    }
    true
}

/// Merge `overlay` into `base`: objects merge key-wise (recursively),
/// everything else overrides. `Null` overlays are no-ops.
pub fn merge_option_values(base: &mut serde_json::Value, overlay: &serde_json::Value) {
    use serde_json::Value;

    if overlay.is_null() {
        return;
    }
    if let (Value::Object(base_map), Value::Object(overlay_map)) = (&mut *base, overlay) {
        for (key, value) in overlay_map {
            match base_map.get_mut(key) {
                Some(existing) => merge_option_values(existing, value),
                None => {
                    base_map.insert(key.clone(), value.clone());
                }
            }
        }
        return;
    }
    *base = overlay.clone();
}
