pub mod document;
pub mod rule;
pub mod source;

pub use document::{MergedConfig, ParsedConfig, Proxy, ProxyGroup};
pub use rule::{CustomRule, MatchType, Rule, RuleKey};
pub use source::Source;
