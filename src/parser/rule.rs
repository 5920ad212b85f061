use crate::domain::{MatchType, Rule};
use crate::parser::ParseError;

/// Parse one rule line: `TYPE,VALUE,TARGET[,OPTION...]` or `MATCH,TARGET`.
///
/// Logical rules (`AND`, `OR`, `NOT`, `SUB-RULE`) carry a parenthesised value
/// containing commas, so fields are split at parenthesis depth zero only.
pub fn parse_rule(line: &str) -> Result<Rule, ParseError> {
    let raw = line.trim();
    if raw.is_empty() {
        return Err(malformed(raw, "empty rule"));
    }

    let fields = split_fields(raw);
    let keyword = fields[0].as_str();
    let match_type =
        MatchType::from_keyword(keyword).ok_or_else(|| ParseError::UnknownMatchType {
            kind: keyword.to_string(),
            line: raw.to_string(),
        })?;

    let (match_value, rest) = if match_type.takes_value() {
        if fields.len() < 3 {
            return Err(malformed(raw, "expected TYPE,VALUE,TARGET"));
        }
        (fields[1].clone(), &fields[2..])
    } else {
        if fields.len() < 2 {
            return Err(malformed(raw, "expected MATCH,TARGET"));
        }
        (String::new(), &fields[1..])
    };

    if match_type.takes_value() && match_value.is_empty() {
        return Err(malformed(raw, "empty match value"));
    }
    let target = rest[0].clone();
    if target.is_empty() {
        return Err(malformed(raw, "empty target"));
    }

    Ok(Rule {
        match_type,
        match_value,
        target,
        options: rest[1..].to_vec(),
        raw: raw.to_string(),
    })
}

fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();

    for c in line.chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => {
                fields.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    fields.push(current.trim().to_string());
    fields
}

fn malformed(line: &str, reason: &str) -> ParseError {
    ParseError::MalformedRule {
        line: line.to_string(),
        reason: reason.to_string(),
    }
}
