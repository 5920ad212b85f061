use std::collections::{HashMap, HashSet};

use crate::domain::ParsedConfig;

/// Names that refer to built-in policies and must never be prefixed.
pub const RESERVED_NAMES: &[&str] = &["DIRECT", "REJECT", "REJECT-DROP", "PASS", "COMPATIBLE", "GLOBAL"];

pub fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}

pub fn prefixed(label: &str, name: &str) -> String {
    format!("{}_{}", label, name)
}

/// Name mapping for a single source: original name to merged name.
#[derive(Debug, Default)]
pub struct Namespace {
    /// Final proxy names, parallel to the source's proxy list.
    pub proxy_names: Vec<String>,
    /// Final group names, parallel to the source's group list.
    pub group_names: Vec<String>,
    proxies: HashMap<String, String>,
    groups: HashMap<String, String>,
}

impl Namespace {
    /// Assign merged names for every proxy and group of `config`.
    ///
    /// Proxies and groups share one name space in a Clash document, so
    /// `taken` holds every name emitted by earlier sources and is extended in
    /// place. A name already taken gets a numeric suffix; nothing is dropped,
    /// so every reference made inside this source resolves to an entity of
    /// this source.
    pub fn build(
        label: &str,
        config: &ParsedConfig,
        namespace_groups: bool,
        taken: &mut HashSet<String>,
    ) -> Self {
        let mut ns = Namespace::default();

        for proxy in &config.proxies {
            let candidate = if is_reserved(&proxy.name) {
                proxy.name.clone()
            } else {
                prefixed(label, &proxy.name)
            };
            let name = unique(candidate, taken);
            ns.proxies
                .entry(proxy.name.clone())
                .or_insert_with(|| name.clone());
            ns.proxy_names.push(name);
        }

        for group in &config.proxy_groups {
            let candidate = if namespace_groups && !is_reserved(&group.name) {
                prefixed(label, &group.name)
            } else {
                group.name.clone()
            };
            let name = unique(candidate, taken);
            if name != group.name && !namespace_groups {
                tracing::debug!(group = %group.name, renamed = %name, label, "Renaming group already defined by an earlier source");
            }
            ns.groups
                .entry(group.name.clone())
                .or_insert_with(|| name.clone());
            ns.group_names.push(name);
        }

        ns
    }

    /// Merged name for a reference made inside this source, or the reference
    /// unchanged when it names nothing this source defines.
    pub fn resolve<'a>(&'a self, reference: &'a str) -> &'a str {
        self.proxies
            .get(reference)
            .or_else(|| self.groups.get(reference))
            .map(String::as_str)
            .unwrap_or(reference)
    }
}

fn unique(candidate: String, taken: &mut HashSet<String>) -> String {
    if taken.insert(candidate.clone()) {
        return candidate;
    }
    let mut counter = 1;
    loop {
        let name = format!("{}_{}", candidate, counter);
        if taken.insert(name.clone()) {
            return name;
        }
        counter += 1;
    }
}
