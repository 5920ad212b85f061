use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::app::Result;
use crate::domain::{CustomRule, Rule};
use crate::parser::rule::parse_rule;
use crate::parser::ParseError;
use crate::store::atomic::write_atomic;
use crate::store::{RuleStore, StorageError, UpsertOutcome};

/// Custom rules persisted as plain text, one rule per line.
pub struct TextRuleStore {
    path: Option<PathBuf>,
    rules: Mutex<Vec<CustomRule>>,
}

impl TextRuleStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let rules = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| StorageError::Io {
                path: path.clone(),
                source: e,
            })?;
            parse_rule_text(&content).map_err(|e| StorageError::Rule {
                path: path.clone(),
                source: e,
            })?
        } else {
            Vec::new()
        };

        Ok(Self {
            path: Some(path),
            rules: Mutex::new(rules),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            rules: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<CustomRule>>> {
        Ok(self.rules.lock().map_err(|_| StorageError::Poisoned)?)
    }

    fn persist(&self, rules: &[CustomRule]) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut text = rules
            .iter()
            .map(|r| r.raw.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        write_atomic(path, text.as_bytes()).map_err(|e| StorageError::Io {
            path: path.clone(),
            source: e,
        })?;
        Ok(())
    }
}

impl RuleStore for TextRuleStore {
    fn list(&self) -> Result<Vec<CustomRule>> {
        Ok(self.lock()?.clone())
    }

    fn upsert(&self, rule: CustomRule) -> Result<UpsertOutcome> {
        let mut rules = self.lock()?;
        let mut next = rules.clone();
        let outcome = upsert_rule(&mut next, rule);
        if outcome != UpsertOutcome::Unchanged {
            self.persist(&next)?;
            *rules = next;
        }
        Ok(outcome)
    }

    fn replace_all(&self, text: &str) -> Result<usize> {
        let next = parse_rule_text(text)?;
        let mut rules = self.lock()?;
        self.persist(&next)?;
        let count = next.len();
        *rules = next;

        tracing::info!(count, "Replaced custom rules");
        Ok(count)
    }
}

/// Replace the rule sharing `rule`'s key in place, or append it.
pub fn upsert_rule(rules: &mut Vec<Rule>, rule: Rule) -> UpsertOutcome {
    let key = rule.key();
    match rules.iter_mut().find(|r| r.key() == key) {
        Some(existing) if *existing == rule => UpsertOutcome::Unchanged,
        Some(existing) => {
            *existing = rule;
            UpsertOutcome::Replaced
        }
        None => {
            rules.push(rule);
            UpsertOutcome::Inserted
        }
    }
}

/// Parse a rule blob as a sequence of upserts. Blank and `#` lines are skipped.
pub fn parse_rule_text(text: &str) -> std::result::Result<Vec<Rule>, ParseError> {
    let mut rules = Vec::new();
    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        upsert_rule(&mut rules, parse_rule(line)?);
    }
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::SubmergeError;

    fn rule(line: &str) -> Rule {
        line.parse().unwrap()
    }

    fn lines(store: &TextRuleStore) -> Vec<String> {
        store.raw_lines().unwrap()
    }

    #[test]
    fn test_upsert_appends_new_keys() {
        let store = TextRuleStore::in_memory();
        assert_eq!(store.upsert(rule("DOMAIN,a.com,DIRECT")).unwrap(), UpsertOutcome::Inserted);
        assert_eq!(store.upsert(rule("DOMAIN,b.com,REJECT")).unwrap(), UpsertOutcome::Inserted);
        assert_eq!(lines(&store), vec!["DOMAIN,a.com,DIRECT", "DOMAIN,b.com,REJECT"]);
    }

    #[test]
    fn test_upsert_replaces_in_place() {
        let store = TextRuleStore::in_memory();
        store.upsert(rule("DOMAIN,a.com,DIRECT")).unwrap();
        store.upsert(rule("DOMAIN,b.com,REJECT")).unwrap();
        store.upsert(rule("DOMAIN,c.com,DIRECT")).unwrap();

        assert_eq!(store.upsert(rule("DOMAIN,b.com,Proxy")).unwrap(), UpsertOutcome::Replaced);
        assert_eq!(
            lines(&store),
            vec!["DOMAIN,a.com,DIRECT", "DOMAIN,b.com,Proxy", "DOMAIN,c.com,DIRECT"]
        );
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let once = TextRuleStore::in_memory();
        once.upsert(rule("DOMAIN,a.com,DIRECT")).unwrap();
        once.upsert(rule("GEOIP,CN,DIRECT")).unwrap();

        let twice = TextRuleStore::in_memory();
        twice.upsert(rule("DOMAIN,a.com,DIRECT")).unwrap();
        twice.upsert(rule("GEOIP,CN,DIRECT")).unwrap();
        assert_eq!(twice.upsert(rule("DOMAIN,a.com,DIRECT")).unwrap(), UpsertOutcome::Unchanged);

        assert_eq!(lines(&once), lines(&twice));
    }

    #[test]
    fn test_same_value_different_type_is_a_different_key() {
        let store = TextRuleStore::in_memory();
        store.upsert(rule("DOMAIN,a.com,DIRECT")).unwrap();
        store.upsert(rule("DOMAIN-SUFFIX,a.com,REJECT")).unwrap();
        assert_eq!(store.list().unwrap().len(), 2);
    }

    #[test]
    fn test_replace_all_collapses_duplicate_keys() {
        let store = TextRuleStore::in_memory();
        store.upsert(rule("DOMAIN,old.com,DIRECT")).unwrap();

        let count = store
            .replace_all("DOMAIN,a.com,DIRECT\n\n# comment\nGEOIP,CN,DIRECT\nDOMAIN,a.com,REJECT\n")
            .unwrap();

        assert_eq!(count, 2);
        assert_eq!(lines(&store), vec!["DOMAIN,a.com,REJECT", "GEOIP,CN,DIRECT"]);
    }

    #[test]
    fn test_replace_all_rejects_bad_line_without_writing() {
        let store = TextRuleStore::in_memory();
        store.upsert(rule("DOMAIN,keep.com,DIRECT")).unwrap();

        let err = store.replace_all("DOMAIN,a.com,DIRECT\nBOGUS,x,y\n").unwrap_err();
        assert!(matches!(err, SubmergeError::Parse(ParseError::UnknownMatchType { .. })));
        assert_eq!(lines(&store), vec!["DOMAIN,keep.com,DIRECT"]);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom_rules.txt");

        let store = TextRuleStore::open(&path).unwrap();
        store.replace_all("DOMAIN,a.com,DIRECT\nMATCH,Proxy").unwrap();
        store.upsert(rule("MATCH,DIRECT")).unwrap();
        drop(store);

        assert_eq!(fs::read_to_string(&path).unwrap(), "DOMAIN,a.com,DIRECT\nMATCH,DIRECT\n");
        let reopened = TextRuleStore::open(&path).unwrap();
        assert_eq!(lines(&reopened), vec!["DOMAIN,a.com,DIRECT", "MATCH,DIRECT"]);
    }
}
