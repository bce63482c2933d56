//! Built-in rule engine.

use serde_json::{Map, Value};

use super::{split_rules, Messages, RuleOutcome, RuleSet, RuleValidator};
use crate::attempt::FieldErrors;

/// Local, dependency-free implementation of [`RuleValidator`].
///
/// # Example
///
/// ```
/// use llm_validator::rules::{LocalRuleEngine, Messages, RuleSet, RuleValidator};
/// use serde_json::json;
///
/// let rules = RuleSet::new().field("name", "required|string").field("age", "required|integer");
/// let data = json!({"name": "John", "age": "thirty"});
///
/// let outcome = LocalRuleEngine.validate(data.as_object().unwrap(), &rules, &Messages::new());
/// assert!(!outcome.passes);
/// assert_eq!(outcome.errors["age"], vec!["The age must be an integer."]);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalRuleEngine;

/// A parsed rule segment: name plus optional parameter (`max:255`).
struct Rule<'a> {
    name: &'a str,
    param: Option<&'a str>,
}

impl<'a> Rule<'a> {
    fn parse(segment: &'a str) -> Self {
        match segment.split_once(':') {
            Some((name, param)) => Rule {
                name: name.trim(),
                param: Some(param.trim()),
            },
            None => Rule {
                name: segment,
                param: None,
            },
        }
    }
}

impl RuleValidator for LocalRuleEngine {
    fn validate(&self, data: &Map<String, Value>, rules: &RuleSet, messages: &Messages) -> RuleOutcome {
        let mut errors = FieldErrors::new();

        for (field, rule_list) in rules.iter() {
            let parsed: Vec<Rule<'_>> = split_rules(rule_list).map(Rule::parse).collect();
            let value = lookup(data, field);
            let field_errors = check_field(field, value, &parsed, messages);
            if !field_errors.is_empty() {
                errors.insert(field.to_string(), field_errors);
            }
        }

        if !errors.is_empty() {
            return RuleOutcome::failed(errors);
        }

        let mut validated = Map::new();
        for (field, _) in rules.iter() {
            let root = field.split('.').next().unwrap_or(field);
            if let Some(v) = data.get(root) {
                validated.entry(root.to_string()).or_insert_with(|| v.clone());
            }
        }
        RuleOutcome::passed(validated)
    }
}

fn check_field(field: &str, value: Option<&Value>, rules: &[Rule<'_>], messages: &Messages) -> Vec<String> {
    let required = rules.iter().any(|r| r.name == "required");

    let value = match value {
        Some(v) if !is_empty(v) => v,
        _ if !required => return Vec::new(),
        _ => return vec![message(field, "required", None, messages, "The :attribute field is required.")],
    };

    let mut errors = Vec::new();
    for rule in rules {
        if let Some(err) = check_rule(field, value, rule, messages) {
            errors.push(err);
        }
    }
    errors
}

fn check_rule(field: &str, value: &Value, rule: &Rule<'_>, messages: &Messages) -> Option<String> {
    let fail = |default: &str| Some(message(field, rule.name, rule.param, messages, default));

    match rule.name {
        "required" | "nullable" => None,
        "string" if !value.is_string() => fail("The :attribute must be a string."),
        "integer" if !(value.is_i64() || value.is_u64()) => fail("The :attribute must be an integer."),
        "numeric" if !value.is_number() => fail("The :attribute must be a number."),
        "boolean" if !value.is_boolean() => fail("The :attribute field must be true or false."),
        "array" if !value.is_array() => fail("The :attribute must be an array."),
        "object" if !value.is_object() => fail("The :attribute must be an object."),
        "email" if !value.as_str().is_some_and(looks_like_email) => {
            fail("The :attribute must be a valid email address.")
        }
        "min" | "max" => {
            let bound: f64 = rule.param.and_then(|p| p.parse().ok())?;
            let (size, unit) = size_of(value)?;
            let ok = if rule.name == "min" { size >= bound } else { size <= bound };
            if ok {
                return None;
            }
            let default = match (rule.name, unit) {
                ("max", Some(unit)) => format!("The :attribute must not have more than :max {}.", unit),
                ("max", None) => "The :attribute must not be greater than :max.".to_string(),
                (_, Some(unit)) => format!("The :attribute must be at least :min {}.", unit),
                (_, None) => "The :attribute must be at least :min.".to_string(),
            };
            fail(&default)
        }
        "in" => {
            let options: Vec<&str> = rule.param.unwrap_or("").split(',').map(str::trim).collect();
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Number(_) | Value::Bool(_) => value.to_string(),
                _ => return fail("The selected :attribute is invalid."),
            };
            if options.contains(&text.as_str()) {
                None
            } else {
                fail("The selected :attribute is invalid.")
            }
        }
        "string" | "integer" | "numeric" | "boolean" | "array" | "object" | "email" => None,
        other => {
            tracing::warn!(field, rule = other, "ignoring unsupported validation rule");
            None
        }
    }
}

/// Size for `min`/`max`: chars for strings, items for arrays, keys for
/// objects, the value itself for numbers. The unit is `None` for numbers.
fn size_of(value: &Value) -> Option<(f64, Option<&'static str>)> {
    match value {
        Value::String(s) => Some((s.chars().count() as f64, Some("characters"))),
        Value::Array(a) => Some((a.len() as f64, Some("items"))),
        Value::Object(o) => Some((o.len() as f64, Some("keys"))),
        Value::Number(n) => n.as_f64().map(|f| (f, None)),
        _ => None,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        _ => false,
    }
}

fn looks_like_email(s: &str) -> bool {
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !s.contains(char::is_whitespace)
        && domain.split('.').count() >= 2
        && domain.split('.').all(|part| !part.is_empty())
}

/// Resolve a dotted path (`address.city`) inside an object.
fn lookup<'a>(data: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    let mut parts = field.split('.');
    let mut current = data.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// `first_name` → `first name`, `address.city` → `address city`.
fn humanize(field: &str) -> String {
    field.replace(['_', '.'], " ")
}

fn message(field: &str, rule: &str, param: Option<&str>, messages: &Messages, default: &str) -> String {
    let template = messages
        .get(&format!("{}.{}", field, rule))
        .or_else(|| messages.get(rule))
        .map(|s| s.as_str())
        .unwrap_or(default);

    let mut text = template.replace(":attribute", &humanize(field));
    if let Some(p) = param {
        text = text.replace(&format!(":{}", rule), p);
        text = text.replace(":values", p);
    }
    text
}
