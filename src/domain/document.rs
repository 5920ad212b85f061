use serde_yaml::{Mapping, Value};

use crate::domain::Rule;

pub const PROXIES_KEY: &str = "proxies";
pub const PROXY_GROUPS_KEY: &str = "proxy-groups";
pub const RULES_KEY: &str = "rules";
const NAME_KEY: &str = "name";
const TYPE_KEY: &str = "type";

#[derive(Debug, Clone, PartialEq)]
pub struct Proxy {
    pub name: String,
    /// Every key of the proxy entry except `name`, in document order.
    pub fields: Mapping,
}

impl Proxy {
    pub fn to_value(&self) -> Value {
        let mut map = Mapping::with_capacity(self.fields.len() + 1);
        map.insert(NAME_KEY.into(), Value::String(self.name.clone()));
        for (key, value) in &self.fields {
            map.insert(key.clone(), value.clone());
        }
        Value::Mapping(map)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProxyGroup {
    pub name: String,
    /// Names of proxies or groups this group selects from.
    pub members: Vec<String>,
    /// Every key except `name` and `proxies`, in document order.
    pub fields: Mapping,
}

impl ProxyGroup {
    /// Emitted as `name`, `type`, `proxies`, then the remaining fields.
    pub fn to_value(&self) -> Value {
        let mut map = Mapping::with_capacity(self.fields.len() + 2);
        map.insert(NAME_KEY.into(), Value::String(self.name.clone()));
        if let Some(kind) = self.fields.get(TYPE_KEY) {
            map.insert(TYPE_KEY.into(), kind.clone());
        }
        map.insert(
            PROXIES_KEY.into(),
            Value::Sequence(self.members.iter().cloned().map(Value::String).collect()),
        );
        for (key, value) in &self.fields {
            if key.as_str() == Some(TYPE_KEY) {
                continue;
            }
            map.insert(key.clone(), value.clone());
        }
        Value::Mapping(map)
    }
}

/// One subscription document after parsing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedConfig {
    /// Top-level keys other than proxies, groups and rules (ports, dns, mode...).
    pub base_settings: Mapping,
    pub proxies: Vec<Proxy>,
    pub proxy_groups: Vec<ProxyGroup>,
    pub rules: Vec<Rule>,
}

/// The consolidated document produced by the merge engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedConfig {
    pub base_settings: Mapping,
    pub proxies: Vec<Proxy>,
    pub proxy_groups: Vec<ProxyGroup>,
    pub rules: Vec<Rule>,
}

impl MergedConfig {
    pub fn to_value(&self) -> Value {
        let mut doc = self.base_settings.clone();
        doc.insert(
            PROXIES_KEY.into(),
            Value::Sequence(self.proxies.iter().map(Proxy::to_value).collect()),
        );
        doc.insert(
            PROXY_GROUPS_KEY.into(),
            Value::Sequence(self.proxy_groups.iter().map(ProxyGroup::to_value).collect()),
        );
        doc.insert(
            RULES_KEY.into(),
            Value::Sequence(
                self.rules
                    .iter()
                    .map(|rule| Value::String(rule.raw.clone()))
                    .collect(),
            ),
        );
        Value::Mapping(doc)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&self.to_value())
    }

    pub fn proxy_names(&self) -> impl Iterator<Item = &str> {
        self.proxies.iter().map(|p| p.name.as_str())
    }
}
