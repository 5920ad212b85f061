//! Merge engine: combines parsed subscriptions into one document.
//!
//! # Algorithm
//! ```text
//! first source      → base settings (verbatim, first wins)
//! every source i    → proxies/groups renamed `<label_i>_<name>`,
//!                     group members and rule targets rewritten with the same prefix
//! rules             → custom rules, then each source's rules in source order,
//!                     deduplicated on (type, value), first occurrence wins
//! ```

pub mod namespace;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{CustomRule, MergedConfig, ParsedConfig, Proxy, ProxyGroup, Rule, RuleKey};
use namespace::Namespace;

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("no sources to merge")]
    NoSources,

    #[error("base source `{label}` has no base settings")]
    MissingBaseSettings { label: String },

    #[error("failed to serialize merged config: {0}")]
    Serialize(#[from] serde_yaml::Error),
}

/// Tunable merge behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergePolicy {
    /// Prefix proxy-group names with the source label. When disabled, group
    /// names are kept and a later source's group with an existing name gets a
    /// numeric suffix.
    pub namespace_groups: bool,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self {
            namespace_groups: true,
        }
    }
}

/// A parsed source together with the label it is namespaced under.
#[derive(Debug, Clone)]
pub struct MergeInput {
    pub label: String,
    pub config: ParsedConfig,
}

impl MergeInput {
    pub fn new(label: impl Into<String>, config: ParsedConfig) -> Self {
        Self {
            label: label.into(),
            config,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MergeEngine {
    policy: MergePolicy,
}

impl MergeEngine {
    pub fn new(policy: MergePolicy) -> Self {
        Self { policy }
    }

    /// Merge `inputs` (first entry is the base) with `custom_rules`.
    pub fn merge(
        &self,
        inputs: Vec<MergeInput>,
        custom_rules: &[CustomRule],
    ) -> Result<MergedConfig, MergeError> {
        let base = inputs.first().ok_or(MergeError::NoSources)?;
        if base.config.base_settings.is_empty() {
            return Err(MergeError::MissingBaseSettings {
                label: base.label.clone(),
            });
        }

        let mut merged = MergedConfig {
            base_settings: base.config.base_settings.clone(),
            ..Default::default()
        };
        let mut rules = RuleSequence::default();
        for rule in custom_rules {
            rules.push(rule.clone());
        }

        let mut taken = HashSet::new();

        for input in inputs {
            let ns = Namespace::build(
                &input.label,
                &input.config,
                self.policy.namespace_groups,
                &mut taken,
            );
            let ParsedConfig {
                proxies,
                proxy_groups,
                rules: source_rules,
                ..
            } = input.config;

            merged.proxies.extend(
                proxies
                    .into_iter()
                    .zip(&ns.proxy_names)
                    .map(|(proxy, name)| Proxy {
                        name: name.clone(),
                        fields: proxy.fields,
                    }),
            );

            for (group, name) in proxy_groups.into_iter().zip(&ns.group_names) {
                merged.proxy_groups.push(ProxyGroup {
                    name: name.clone(),
                    members: group
                        .members
                        .iter()
                        .map(|m| ns.resolve(m).to_string())
                        .collect(),
                    fields: group.fields,
                });
            }

            for rule in source_rules {
                let target = ns.resolve(&rule.target);
                if target == rule.target {
                    rules.push(rule);
                } else {
                    rules.push(rule.with_target(target));
                }
            }

            tracing::debug!(
                label = %input.label,
                proxies = ns.proxy_names.len(),
                "Merged source"
            );
        }

        merged.rules = rules.into_rules();
        Ok(merged)
    }

    /// Merge and serialize in one step.
    pub fn merge_to_string(
        &self,
        inputs: Vec<MergeInput>,
        custom_rules: &[CustomRule],
    ) -> Result<String, MergeError> {
        let merged = self.merge(inputs, custom_rules)?;
        Ok(merged.to_yaml()?)
    }
}

/// Ordered rules with first-wins deduplication.
#[derive(Default)]
struct RuleSequence {
    seen: HashSet<RuleKey>,
    rules: Vec<Rule>,
}

impl RuleSequence {
    fn push(&mut self, rule: Rule) {
        if self.seen.insert(rule.key()) {
            self.rules.push(rule);
        }
    }

    fn into_rules(self) -> Vec<Rule> {
        self.rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ConfigParser;

    fn parse(doc: &str) -> ParsedConfig {
        ConfigParser::new().parse(doc).unwrap()
    }

    fn source_a() -> ParsedConfig {
        parse(
            r#"
port: 7890
mode: rule
proxies:
  - {name: P1, type: ss, server: a.example.com, port: 443}
  - {name: P2, type: ss, server: a2.example.com, port: 443}
proxy-groups:
  - {name: A, type: select, proxies: [P1, P2, DIRECT]}
rules:
  - DOMAIN,example.com,A
  - DOMAIN-SUFFIX,a-only.com,P1
  - MATCH,A
"#,
        )
    }

    fn source_b() -> ParsedConfig {
        parse(
            r#"
port: 9999
proxies:
  - {name: P1, type: vmess, server: b.example.com, port: 443}
proxy-groups:
  - {name: B, type: select, proxies: [P1]}
  - {name: Auto, type: url-test, proxies: [P1, B]}
rules:
  - DOMAIN,example.com,B
  - DOMAIN-SUFFIX,b-only.com,Auto
  - MATCH,B
"#,
        )
    }

    fn rule(line: &str) -> Rule {
        line.parse().unwrap()
    }

    fn lines(merged: &MergedConfig) -> Vec<&str> {
        merged.rules.iter().map(|r| r.line()).collect()
    }

    #[test]
    fn test_two_sources_with_same_proxy_name() {
        let merged = MergeEngine::default()
            .merge(
                vec![MergeInput::new("A", source_a()), MergeInput::new("B", source_b())],
                &[],
            )
            .unwrap();

        let names: Vec<_> = merged.proxy_names().collect();
        assert_eq!(names, vec!["A_P1", "A_P2", "B_P1"]);

        let example: Vec<_> = merged
            .rules
            .iter()
            .filter(|r| r.match_value == "example.com")
            .collect();
        assert_eq!(example.len(), 1);
        assert_eq!(example[0].line(), "DOMAIN,example.com,A_A");
    }

    #[test]
    fn test_proxy_count_is_sum_and_names_unique() {
        let merged = MergeEngine::default()
            .merge(
                vec![
                    MergeInput::new("A", source_a()),
                    MergeInput::new("B", source_b()),
                    MergeInput::new("C", source_a()),
                ],
                &[],
            )
            .unwrap();

        assert_eq!(merged.proxies.len(), 5);
        let unique: HashSet<_> = merged.proxy_names().collect();
        assert_eq!(unique.len(), merged.proxies.len());
    }

    #[test]
    fn test_group_members_stay_within_source() {
        let merged = MergeEngine::default()
            .merge(
                vec![MergeInput::new("A", source_a()), MergeInput::new("B", source_b())],
                &[],
            )
            .unwrap();

        let groups: Vec<_> = merged.proxy_groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(groups, vec!["A_A", "B_B", "B_Auto"]);
        assert_eq!(merged.proxy_groups[0].members, vec!["A_P1", "A_P2", "DIRECT"]);
        assert_eq!(merged.proxy_groups[1].members, vec!["B_P1"]);
        assert_eq!(merged.proxy_groups[2].members, vec!["B_P1", "B_B"]);
    }

    #[test]
    fn test_base_settings_come_from_first_source() {
        let merged = MergeEngine::default()
            .merge(
                vec![MergeInput::new("B", source_b()), MergeInput::new("A", source_a())],
                &[],
            )
            .unwrap();

        assert_eq!(merged.base_settings.get("port").unwrap().as_u64(), Some(9999));
        assert!(merged.base_settings.get("mode").is_none());
    }

    #[test]
    fn test_first_source_wins_duplicate_rule_keys() {
        let merged = MergeEngine::default()
            .merge(
                vec![MergeInput::new("A", source_a()), MergeInput::new("B", source_b())],
                &[],
            )
            .unwrap();

        assert_eq!(
            lines(&merged),
            vec![
                "DOMAIN,example.com,A_A",
                "DOMAIN-SUFFIX,a-only.com,A_P1",
                "MATCH,A_A",
                "DOMAIN-SUFFIX,b-only.com,B_Auto",
            ]
        );
    }

    #[test]
    fn test_custom_rules_precede_and_win() {
        let custom = vec![rule("DOMAIN,example.com,DIRECT"), rule("GEOIP,CN,DIRECT")];
        let merged = MergeEngine::default()
            .merge(
                vec![MergeInput::new("A", source_a()), MergeInput::new("B", source_b())],
                &custom,
            )
            .unwrap();

        let rules = lines(&merged);
        assert_eq!(rules[0], "DOMAIN,example.com,DIRECT");
        assert_eq!(rules[1], "GEOIP,CN,DIRECT");
        assert_eq!(rules.iter().filter(|l| l.contains("example.com")).count(), 1);
    }

    #[test]
    fn test_unknown_target_passes_through() {
        let doc = parse("port: 1\nproxies: []\nrules:\n  - DOMAIN,x.com,Missing\n  - DOMAIN,y.com,REJECT\n");
        let merged = MergeEngine::default()
            .merge(vec![MergeInput::new("A", doc)], &[])
            .unwrap();
        assert_eq!(lines(&merged), vec!["DOMAIN,x.com,Missing", "DOMAIN,y.com,REJECT"]);
    }

    #[test]
    fn test_source_without_proxies_still_contributes_rules() {
        let rules_only = parse("proxies: []\nrules:\n  - DOMAIN,z.com,DIRECT\n");
        let merged = MergeEngine::default()
            .merge(
                vec![MergeInput::new("A", source_a()), MergeInput::new("R", rules_only)],
                &[],
            )
            .unwrap();

        assert_eq!(merged.proxies.len(), 2);
        assert!(lines(&merged).contains(&"DOMAIN,z.com,DIRECT"));
    }

    #[test]
    fn test_merge_is_byte_for_byte_reproducible() {
        let engine = MergeEngine::default();
        let custom = vec![rule("DOMAIN-KEYWORD,ads,REJECT")];
        let first = engine
            .merge_to_string(
                vec![MergeInput::new("A", source_a()), MergeInput::new("B", source_b())],
                &custom,
            )
            .unwrap();
        let second = engine
            .merge_to_string(
                vec![MergeInput::new("A", source_a()), MergeInput::new("B", source_b())],
                &custom,
            )
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_serialized_output_parses_back() {
        let yaml = MergeEngine::default()
            .merge_to_string(
                vec![MergeInput::new("A", source_a()), MergeInput::new("B", source_b())],
                &[],
            )
            .unwrap();
        let reparsed = parse(&yaml);
        assert_eq!(reparsed.proxies.len(), 3);
        assert_eq!(reparsed.proxy_groups.len(), 3);
        assert_eq!(reparsed.base_settings.get("mode").unwrap().as_str(), Some("rule"));
    }

    #[test]
    fn test_empty_input_is_an_error() {
        let err = MergeEngine::default().merge(vec![], &[]).unwrap_err();
        assert!(matches!(err, MergeError::NoSources));
    }

    #[test]
    fn test_base_without_settings_is_an_error() {
        let bare = parse("proxies: []\nrules: []\n");
        let err = MergeEngine::default()
            .merge(vec![MergeInput::new("bare", bare), MergeInput::new("A", source_a())], &[])
            .unwrap_err();
        assert!(matches!(err, MergeError::MissingBaseSettings { ref label } if label == "bare"));
    }

    #[test]
    fn test_group_names_kept_when_policy_disables_namespacing() {
        let engine = MergeEngine::new(MergePolicy {
            namespace_groups: false,
        });
        let merged = engine
            .merge(
                vec![MergeInput::new("A", source_a()), MergeInput::new("B", source_b())],
                &[],
            )
            .unwrap();

        let groups: Vec<_> = merged.proxy_groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(groups, vec!["A", "B", "Auto"]);
        assert_eq!(merged.proxy_groups[2].members, vec!["B_P1", "B"]);
        assert_eq!(merged.rules[0].line(), "DOMAIN,example.com,A");
    }

    fn shared_label_source(domain: &str) -> ParsedConfig {
        parse(&format!(
            r#"
port: 1
proxies:
  - {{name: P1, type: ss, server: s.example.com, port: 443}}
proxy-groups:
  - {{name: G, type: select, proxies: [P1, DIRECT]}}
  - {{name: Auto, type: url-test, proxies: [G, P1]}}
rules:
  - DOMAIN,{domain},G
"#
        ))
    }

    #[test]
    fn test_sources_sharing_a_label_keep_their_own_groups() {
        let merged = MergeEngine::default()
            .merge(
                vec![
                    MergeInput::new("Same", shared_label_source("a.com")),
                    MergeInput::new("Same", shared_label_source("b.com")),
                ],
                &[],
            )
            .unwrap();

        let names: Vec<_> = merged.proxy_names().collect();
        assert_eq!(names, vec!["Same_P1", "Same_P1_1"]);
        let groups: Vec<_> = merged.proxy_groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(groups, vec!["Same_G", "Same_Auto", "Same_G_1", "Same_Auto_1"]);
        assert_eq!(merged.proxy_groups[2].members, vec!["Same_P1_1", "DIRECT"]);
        assert_eq!(merged.proxy_groups[3].members, vec!["Same_G_1", "Same_P1_1"]);
        assert_eq!(lines(&merged), vec!["DOMAIN,a.com,Same_G", "DOMAIN,b.com,Same_G_1"]);
    }

    /// Every group member must name a proxy or group emitted for the same
    /// input, or a built-in policy; every emitted name must be unique.
    fn assert_members_stay_local(inputs: Vec<MergeInput>, policy: MergePolicy) {
        let shapes: Vec<(usize, usize)> = inputs
            .iter()
            .map(|i| (i.config.proxies.len(), i.config.proxy_groups.len()))
            .collect();
        let merged = MergeEngine::new(policy).merge(inputs, &[]).unwrap();

        let (mut p, mut g) = (0, 0);
        for (proxies, groups) in shapes {
            let own_groups = &merged.proxy_groups[g..g + groups];
            let owned: HashSet<&str> = merged.proxies[p..p + proxies]
                .iter()
                .map(|x| x.name.as_str())
                .chain(own_groups.iter().map(|x| x.name.as_str()))
                .collect();
            for group in own_groups {
                for member in &group.members {
                    assert!(
                        owned.contains(member.as_str()) || namespace::is_reserved(member),
                        "{:?}: {} -> {} leaves its source",
                        policy,
                        group.name,
                        member
                    );
                }
            }
            p += proxies;
            g += groups;
        }

        let all: HashSet<&str> = merged
            .proxy_names()
            .chain(merged.proxy_groups.iter().map(|g| g.name.as_str()))
            .collect();
        assert_eq!(all.len(), merged.proxies.len() + merged.proxy_groups.len());
    }

    #[test]
    fn test_group_members_never_cross_sources() {
        // proxy `A` and group `P1` collide with names source_a emits under label A
        let crossing = || {
            parse(
                r#"
port: 2
proxies:
  - {name: A, type: ss, server: c.example.com, port: 443}
proxy-groups:
  - {name: P1, type: select, proxies: [A]}
rules: []
"#,
            )
        };

        let cases: Vec<Vec<(&str, ParsedConfig)>> = vec![
            vec![("A", source_a()), ("B", source_b())],
            vec![("X", source_a()), ("X", source_a()), ("X", source_b())],
            vec![("A", source_a()), ("A", crossing())],
            vec![("B", source_b()), ("C", source_b()), ("B", source_b())],
        ];

        for case in cases {
            for namespace_groups in [true, false] {
                let inputs = case
                    .iter()
                    .map(|(label, config)| MergeInput::new(*label, config.clone()))
                    .collect();
                assert_members_stay_local(inputs, MergePolicy { namespace_groups });
            }
        }
    }
}
