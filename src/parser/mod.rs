pub mod rule;

use serde_yaml::{Mapping, Value};
use thiserror::Error;

use crate::domain::document::{PROXIES_KEY, PROXY_GROUPS_KEY, RULES_KEY};
use crate::domain::{ParsedConfig, Proxy, ProxyGroup, Rule};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("document root is not a mapping")]
    NotAMapping,

    #[error("missing required section `{0}`")]
    MissingSection(&'static str),

    #[error("section `{0}` must be a sequence")]
    NotASequence(&'static str),

    #[error("proxy #{index} is not a mapping")]
    ProxyNotAMapping { index: usize },

    #[error("proxy #{index} has no name")]
    ProxyMissingName { index: usize },

    #[error("rule #{index} is not a string")]
    RuleNotAString { index: usize },

    #[error("malformed rule `{line}`: {reason}")]
    MalformedRule { line: String, reason: String },

    #[error("unknown rule type `{kind}` in `{line}`")]
    UnknownMatchType { kind: String, line: String },
}

/// Turns raw subscription text into a [`ParsedConfig`].
#[derive(Debug, Clone, Default)]
pub struct ConfigParser;

impl ConfigParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, text: &str) -> Result<ParsedConfig, ParseError> {
        let root = match serde_yaml::from_str::<Value>(text)? {
            Value::Mapping(map) => map,
            Value::Null => return Err(ParseError::MissingSection(PROXIES_KEY)),
            _ => return Err(ParseError::NotAMapping),
        };

        let mut base_settings = Mapping::new();
        let mut proxies = None;
        let mut groups = None;
        let mut rules = None;

        for (key, value) in root {
            match key.as_str() {
                Some(PROXIES_KEY) => proxies = Some(value),
                Some(PROXY_GROUPS_KEY) => groups = Some(value),
                Some(RULES_KEY) => rules = Some(value),
                _ => {
                    base_settings.insert(key, value);
                }
            }
        }

        let proxies = parse_proxies(proxies.ok_or(ParseError::MissingSection(PROXIES_KEY))?)?;
        let rules = parse_rules(rules.ok_or(ParseError::MissingSection(RULES_KEY))?)?;
        let proxy_groups = groups.map(parse_groups).unwrap_or_default();

        Ok(ParsedConfig {
            base_settings,
            proxies,
            proxy_groups,
            rules,
        })
    }
}

fn section_items(value: Value, section: &'static str) -> Result<Vec<Value>, ParseError> {
    match value {
        Value::Sequence(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        _ => Err(ParseError::NotASequence(section)),
    }
}

fn scalar_name(value: &Value) -> Option<String> {
    let name = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!name.is_empty()).then_some(name)
}

/// Splits a mapping into its `name` and the remaining fields minus `skip`.
fn split_named(map: Mapping, skip: &[&str]) -> (Option<String>, Mapping, Option<Value>) {
    let mut name = None;
    let mut members = None;
    let mut fields = Mapping::new();
    for (key, value) in map {
        match key.as_str() {
            Some("name") => name = scalar_name(&value),
            Some(k) if skip.contains(&k) => members = Some(value),
            _ => {
                fields.insert(key, value);
            }
        }
    }
    (name, fields, members)
}

fn parse_proxies(value: Value) -> Result<Vec<Proxy>, ParseError> {
    section_items(value, PROXIES_KEY)?
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let Value::Mapping(map) = item else {
                return Err(ParseError::ProxyNotAMapping { index });
            };
            let (name, fields, _) = split_named(map, &[]);
            let name = name.ok_or(ParseError::ProxyMissingName { index })?;
            Ok(Proxy { name, fields })
        })
        .collect()
}

fn parse_rules(value: Value) -> Result<Vec<Rule>, ParseError> {
    section_items(value, RULES_KEY)?
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::String(line) => rule::parse_rule(&line),
            _ => Err(ParseError::RuleNotAString { index }),
        })
        .collect()
}

/// Groups are optional: anything malformed drops the whole section.
fn parse_groups(value: Value) -> Vec<ProxyGroup> {
    match try_parse_groups(value) {
        Some(groups) => groups,
        None => {
            tracing::warn!("Ignoring malformed `{}` section", PROXY_GROUPS_KEY);
            Vec::new()
        }
    }
}

fn try_parse_groups(value: Value) -> Option<Vec<ProxyGroup>> {
    let items = section_items(value, PROXY_GROUPS_KEY).ok()?;
    items
        .into_iter()
        .map(|item| {
            let Value::Mapping(map) = item else {
                return None;
            };
            let (name, fields, members) = split_named(map, &[PROXIES_KEY]);
            let members = match members {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Sequence(items)) => {
                    items.iter().map(scalar_name).collect::<Option<Vec<_>>>()?
                }
                Some(_) => return None,
            };
            Some(ProxyGroup {
                name: name?,
                members,
                fields,
            })
        })
        .collect()
}
