//! Title-based exclusion rules.
//!
//! A rule is either a bare string (case-insensitive substring) or a table:
//!
//! ```toml
//! excluded_events = [
//!     "Lunch",
//!     { filter_by = "/^standup/", regex = true },
//!     { filter_by = "Dentist", case_sensitive = true, until = "2 days" },
//! ]
//! ```
//!
//! Rules are tried in order and the first match decides. A rule with
//! `until` does not hide the event outright; it hides each occurrence only
//! while "now" is earlier than the occurrence end minus `until`.

use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::time::{OffsetParseError, RelativeOffset};

/// Errors raised while compiling exclusion rules.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("invalid exclusion pattern '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid exclusion 'until' for '{filter_by}': {source}")]
    InvalidUntil {
        filter_by: String,
        #[source]
        source: OffsetParseError,
    },
}

/// An exclusion rule as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExclusionRule {
    Text(String),
    Rule(RuleSpec),
}

/// The structured form of an exclusion rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    #[serde(alias = "filterBy")]
    pub filter_by: String,
    #[serde(default)]
    pub regex: bool,
    #[serde(default, alias = "caseSensitive")]
    pub case_sensitive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<String>,
}

impl From<&str> for ExclusionRule {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// How a rule compares against a title.
#[derive(Debug, Clone)]
pub enum Matcher {
    Substring { needle: String, case_sensitive: bool },
    Regex(Regex),
}

impl Matcher {
    pub fn is_match(&self, title: &str) -> bool {
        match self {
            Self::Substring {
                needle,
                case_sensitive: true,
            } => title.contains(needle.as_str()),
            Self::Substring { needle, .. } => title.to_lowercase().contains(needle.as_str()),
            Self::Regex(re) => re.is_match(title),
        }
    }
}

/// A rule ready for matching.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub matcher: Matcher,
    pub until: Option<RelativeOffset>,
}

impl CompiledRule {
    pub fn compile(rule: &ExclusionRule) -> Result<Self, FilterError> {
        match rule {
            ExclusionRule::Text(text) => Ok(Self {
                matcher: Matcher::Substring {
                    needle: text.to_lowercase(),
                    case_sensitive: false,
                },
                until: None,
            }),
            ExclusionRule::Rule(spec) => {
                let until = spec
                    .until
                    .as_deref()
                    .map(str::parse::<RelativeOffset>)
                    .transpose()
                    .map_err(|source| FilterError::InvalidUntil {
                        filter_by: spec.filter_by.clone(),
                        source,
                    })?;

                let matcher = if spec.regex {
                    let pattern = strip_delimiters(&spec.filter_by);
                    let re = RegexBuilder::new(pattern)
                        .case_insensitive(!spec.case_sensitive)
                        .build()
                        .map_err(|source| FilterError::InvalidRegex {
                            pattern: spec.filter_by.clone(),
                            source,
                        })?;
                    Matcher::Regex(re)
                } else if spec.case_sensitive {
                    Matcher::Substring {
                        needle: spec.filter_by.clone(),
                        case_sensitive: true,
                    }
                } else {
                    Matcher::Substring {
                        needle: spec.filter_by.to_lowercase(),
                        case_sensitive: false,
                    }
                };

                Ok(Self { matcher, until })
            }
        }
    }

    pub fn matches(&self, title: &str) -> bool {
        self.matcher.is_match(title)
    }
}

/// Strips one pair of `/.../` delimiters.
fn strip_delimiters(pattern: &str) -> &str {
    pattern
        .strip_prefix('/')
        .and_then(|p| p.strip_suffix('/'))
        .unwrap_or(pattern)
}

/// Outcome of checking a title against the rule list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Exclusion {
    /// Hide every occurrence.
    pub excluded: bool,
    /// Hide occurrences only until this long before their end.
    pub until: Option<RelativeOffset>,
}

impl Exclusion {
    /// Whether a concrete occurrence ending at `end` is still hidden at `now`.
    pub fn hides_occurrence(&self, now: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        match self.until {
            Some(until) => now < until.before(end),
            None => false,
        }
    }
}

/// An ordered list of compiled rules.
#[derive(Debug, Clone, Default)]
pub struct ExclusionFilter {
    rules: Vec<CompiledRule>,
}

impl ExclusionFilter {
    /// Compiles every rule, failing on the first invalid one.
    pub fn compile(rules: &[ExclusionRule]) -> Result<Self, FilterError> {
        let rules = rules
            .iter()
            .map(CompiledRule::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// Compiles every rule, logging and skipping the invalid ones.
    pub fn lenient(rules: &[ExclusionRule]) -> Self {
        let rules = rules
            .iter()
            .filter_map(|rule| match CompiledRule::compile(rule) {
                Ok(compiled) => Some(compiled),
                Err(e) => {
                    warn!(error = %e, "Ignoring exclusion rule");
                    None
                }
            })
            .collect();
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Evaluates `title`; the first matching rule wins.
    pub fn evaluate(&self, title: &str) -> Exclusion {
        self.rules
            .iter()
            .find(|rule| rule.matches(title))
            .map(|rule| Exclusion {
                excluded: rule.until.is_none(),
                until: rule.until,
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::OffsetUnit;
    use chrono::{Duration, TimeZone};

    fn rule(filter_by: &str) -> RuleSpec {
        RuleSpec {
            filter_by: filter_by.to_string(),
            regex: false,
            case_sensitive: false,
            until: None,
        }
    }

    fn filter(rules: Vec<ExclusionRule>) -> ExclusionFilter {
        ExclusionFilter::compile(&rules).unwrap()
    }

    mod matching {
        use super::*;

        #[test]
        fn plain_text_is_case_insensitive_substring() {
            let f = filter(vec!["lunch".into()]);
            assert!(f.evaluate("Team LUNCH at noon").excluded);
            assert!(!f.evaluate("Launch party").excluded);
        }

        #[test]
        fn case_sensitive_rule() {
            let f = filter(vec![ExclusionRule::Rule(RuleSpec {
                case_sensitive: true,
                ..rule("Standup")
            })]);
            assert!(f.evaluate("Daily Standup").excluded);
            assert!(!f.evaluate("daily standup").excluded);
        }

        #[test]
        fn regex_with_delimiters() {
            let f = filter(vec![ExclusionRule::Rule(RuleSpec {
                regex: true,
                ..rule("/^on.?call$/")
            })]);
            assert!(f.evaluate("On-Call").excluded);
            assert!(f.evaluate("oncall").excluded);
            assert!(!f.evaluate("Call on me").excluded);
        }

        #[test]
        fn case_sensitive_regex() {
            let f = filter(vec![ExclusionRule::Rule(RuleSpec {
                regex: true,
                case_sensitive: true,
                ..rule("^OOO")
            })]);
            assert!(f.evaluate("OOO: Alex").excluded);
            assert!(!f.evaluate("ooo: Alex").excluded);
        }

        #[test]
        fn first_matching_rule_wins() {
            let f = filter(vec![
                ExclusionRule::Rule(RuleSpec {
                    until: Some("1 day".to_string()),
                    ..rule("review")
                }),
                "review".into(),
            ]);
            let result = f.evaluate("Code review");
            assert!(!result.excluded);
            assert_eq!(result.until, Some(RelativeOffset::new(1, OffsetUnit::Days)));
        }

        #[test]
        fn no_match() {
            let f = filter(vec!["holiday".into()]);
            assert_eq!(f.evaluate("Sprint planning"), Exclusion::default());
        }
    }

    mod compile {
        use super::*;

        #[test]
        fn invalid_regex_is_an_error() {
            let rules = vec![ExclusionRule::Rule(RuleSpec {
                regex: true,
                ..rule("(unclosed")
            })];
            assert!(matches!(
                ExclusionFilter::compile(&rules),
                Err(FilterError::InvalidRegex { .. })
            ));
        }

        #[test]
        fn lenient_skips_invalid_rules() {
            let rules = vec![
                ExclusionRule::Rule(RuleSpec {
                    regex: true,
                    ..rule("(unclosed")
                }),
                ExclusionRule::Rule(RuleSpec {
                    until: Some("whenever".to_string()),
                    ..rule("x")
                }),
                "lunch".into(),
            ];
            let f = ExclusionFilter::lenient(&rules);
            assert_eq!(f.len(), 1);
            assert!(f.evaluate("lunch").excluded);
        }

        #[test]
        fn deserializes_both_shapes() {
            let json = r#"["Lunch", {"filterBy": "Dentist", "caseSensitive": true, "until": "2 days"}]"#;
            let rules: Vec<ExclusionRule> = serde_json::from_str(json).unwrap();
            assert_eq!(rules[0], ExclusionRule::Text("Lunch".to_string()));
            assert_eq!(
                rules[1],
                ExclusionRule::Rule(RuleSpec {
                    case_sensitive: true,
                    until: Some("2 days".to_string()),
                    ..rule("Dentist")
                })
            );
        }
    }

    mod until {
        use super::*;

        #[test]
        fn hides_until_threshold() {
            let exclusion = Exclusion {
                excluded: false,
                until: Some(RelativeOffset::new(2, OffsetUnit::Hours)),
            };
            let end = Utc.with_ymd_and_hms(2024, 6, 1, 18, 0, 0).unwrap();

            assert!(exclusion.hides_occurrence(end - Duration::hours(3), end));
            assert!(!exclusion.hides_occurrence(end - Duration::hours(2), end));
            assert!(!exclusion.hides_occurrence(end - Duration::minutes(30), end));
        }

        #[test]
        fn without_until_never_hides_occurrence() {
            let end = Utc.with_ymd_and_hms(2024, 6, 1, 18, 0, 0).unwrap();
            assert!(!Exclusion::default().hides_occurrence(end - Duration::days(10), end));
        }
    }
}
