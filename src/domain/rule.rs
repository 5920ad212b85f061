use std::fmt;
use std::str::FromStr;

use crate::parser::{rule::parse_rule, ParseError};

/// Rule match types understood by Clash and Mihomo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchType {
    Domain,
    DomainSuffix,
    DomainKeyword,
    DomainRegex,
    Geosite,
    Geoip,
    IpCidr,
    IpCidr6,
    IpSuffix,
    IpAsn,
    SrcGeoip,
    SrcIpAsn,
    SrcIpCidr,
    SrcIpSuffix,
    DstPort,
    SrcPort,
    InPort,
    InType,
    InUser,
    InName,
    ProcessName,
    ProcessNameRegex,
    ProcessPath,
    ProcessPathRegex,
    Uid,
    Network,
    Dscp,
    RuleSet,
    And,
    Or,
    Not,
    SubRule,
    Match,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Domain => "DOMAIN",
            MatchType::DomainSuffix => "DOMAIN-SUFFIX",
            MatchType::DomainKeyword => "DOMAIN-KEYWORD",
            MatchType::DomainRegex => "DOMAIN-REGEX",
            MatchType::Geosite => "GEOSITE",
            MatchType::Geoip => "GEOIP",
            MatchType::IpCidr => "IP-CIDR",
            MatchType::IpCidr6 => "IP-CIDR6",
            MatchType::IpSuffix => "IP-SUFFIX",
            MatchType::IpAsn => "IP-ASN",
            MatchType::SrcGeoip => "SRC-GEOIP",
            MatchType::SrcIpAsn => "SRC-IP-ASN",
            MatchType::SrcIpCidr => "SRC-IP-CIDR",
            MatchType::SrcIpSuffix => "SRC-IP-SUFFIX",
            MatchType::DstPort => "DST-PORT",
            MatchType::SrcPort => "SRC-PORT",
            MatchType::InPort => "IN-PORT",
            MatchType::InType => "IN-TYPE",
            MatchType::InUser => "IN-USER",
            MatchType::InName => "IN-NAME",
            MatchType::ProcessName => "PROCESS-NAME",
            MatchType::ProcessNameRegex => "PROCESS-NAME-REGEX",
            MatchType::ProcessPath => "PROCESS-PATH",
            MatchType::ProcessPathRegex => "PROCESS-PATH-REGEX",
            MatchType::Uid => "UID",
            MatchType::Network => "NETWORK",
            MatchType::Dscp => "DSCP",
            MatchType::RuleSet => "RULE-SET",
            MatchType::And => "AND",
            MatchType::Or => "OR",
            MatchType::Not => "NOT",
            MatchType::SubRule => "SUB-RULE",
            MatchType::Match => "MATCH",
        }
    }

    /// Case-insensitive lookup of a rule keyword.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        let kind = match keyword.trim().to_ascii_uppercase().as_str() {
            "DOMAIN" => MatchType::Domain,
            "DOMAIN-SUFFIX" => MatchType::DomainSuffix,
            "DOMAIN-KEYWORD" => MatchType::DomainKeyword,
            "DOMAIN-REGEX" => MatchType::DomainRegex,
            "GEOSITE" => MatchType::Geosite,
            "GEOIP" => MatchType::Geoip,
            "IP-CIDR" => MatchType::IpCidr,
            "IP-CIDR6" => MatchType::IpCidr6,
            "IP-SUFFIX" => MatchType::IpSuffix,
            "IP-ASN" => MatchType::IpAsn,
            "SRC-GEOIP" => MatchType::SrcGeoip,
            "SRC-IP-ASN" => MatchType::SrcIpAsn,
            "SRC-IP-CIDR" => MatchType::SrcIpCidr,
            "SRC-IP-SUFFIX" => MatchType::SrcIpSuffix,
            "DST-PORT" => MatchType::DstPort,
            "SRC-PORT" => MatchType::SrcPort,
            "IN-PORT" => MatchType::InPort,
            "IN-TYPE" => MatchType::InType,
            "IN-USER" => MatchType::InUser,
            "IN-NAME" => MatchType::InName,
            "PROCESS-NAME" => MatchType::ProcessName,
            "PROCESS-NAME-REGEX" => MatchType::ProcessNameRegex,
            "PROCESS-PATH" => MatchType::ProcessPath,
            "PROCESS-PATH-REGEX" => MatchType::ProcessPathRegex,
            "UID" => MatchType::Uid,
            "NETWORK" => MatchType::Network,
            "DSCP" => MatchType::Dscp,
            "RULE-SET" => MatchType::RuleSet,
            "AND" => MatchType::And,
            "OR" => MatchType::Or,
            "NOT" => MatchType::Not,
            "SUB-RULE" => MatchType::SubRule,
            "MATCH" => MatchType::Match,
            _ => return None,
        };
        Some(kind)
    }

    /// `MATCH` is the only rule without a value field.
    pub fn takes_value(&self) -> bool {
        !matches!(self, MatchType::Match)
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a rule for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleKey {
    pub match_type: MatchType,
    pub match_value: String,
}

/// One routing rule line, e.g. `DOMAIN-SUFFIX,example.com,Proxy`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub match_type: MatchType,
    /// Empty for `MATCH`.
    pub match_value: String,
    pub target: String,
    /// Trailing flags such as `no-resolve`.
    pub options: Vec<String>,
    pub raw: String,
}

/// Custom rules share the rule grammar but live in the rule store.
pub type CustomRule = Rule;

impl Rule {
    pub fn key(&self) -> RuleKey {
        RuleKey {
            match_type: self.match_type,
            match_value: self.match_value.clone(),
        }
    }

    /// Copy of this rule routed to `target`, with `raw` rebuilt.
    pub fn with_target(&self, target: &str) -> Rule {
        Rule {
            match_type: self.match_type,
            match_value: self.match_value.clone(),
            target: target.to_string(),
            options: self.options.clone(),
            raw: Self::render(self.match_type, &self.match_value, target, &self.options),
        }
    }

    pub fn render(match_type: MatchType, value: &str, target: &str, options: &[String]) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(3 + options.len());
        parts.push(match_type.as_str());
        if match_type.takes_value() {
            parts.push(value);
        }
        parts.push(target);
        parts.extend(options.iter().map(String::as_str));
        parts.join(",")
    }

    pub fn line(&self) -> &str {
        &self.raw
    }
}

impl FromStr for Rule {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_rule(s)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_lookup_is_case_insensitive() {
        assert_eq!(MatchType::from_keyword("domain-suffix"), Some(MatchType::DomainSuffix));
        assert_eq!(MatchType::from_keyword(" IP-CIDR6 "), Some(MatchType::IpCidr6));
        assert_eq!(MatchType::from_keyword("FINAL"), None);
    }

    #[test]
    fn test_with_target_keeps_options() {
        let rule: Rule = "IP-CIDR,10.0.0.0/8,Proxy,no-resolve".parse().unwrap();
        let moved = rule.with_target("A_Proxy");
        assert_eq!(moved.raw, "IP-CIDR,10.0.0.0/8,A_Proxy,no-resolve");
        assert_eq!(moved.key(), rule.key());
    }

    #[test]
    fn test_render_match_has_no_value() {
        assert_eq!(Rule::render(MatchType::Match, "", "DIRECT", &[]), "MATCH,DIRECT");
    }
}
