//! Which newly discovered remote names get queued without manual selection.

use regex::Regex;

use crate::config::AutoQueueConfig;

#[derive(Debug, Clone)]
enum Pattern {
    Substring(String),
    Wildcard(Regex),
}

/// Case-insensitive name patterns. A pattern with `*` or `?` must match the
/// whole name; any other pattern matches as a substring.
#[derive(Debug, Clone, Default)]
pub struct PatternList {
    patterns: Vec<Pattern>,
}

impl PatternList {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        let patterns = patterns
            .iter()
            .map(|p| p.as_ref().trim())
            .filter(|p| !p.is_empty())
            .filter_map(|p| {
                if p.contains(['*', '?']) {
                    match wildcard_regex(p) {
                        Ok(re) => Some(Pattern::Wildcard(re)),
                        Err(e) => {
                            tracing::warn!("ignoring auto-queue pattern `{}`: {}", p, e);
                            None
                        }
                    }
                } else {
                    Some(Pattern::Substring(p.to_lowercase()))
                }
            })
            .collect();
        Self { patterns }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn matches(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.patterns.iter().any(|p| match p {
            Pattern::Substring(s) => lower.contains(s.as_str()),
            Pattern::Wildcard(re) => re.is_match(name),
        })
    }
}

fn wildcard_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut re = String::from("(?i)^");
    let mut literal = String::new();
    for c in pattern.chars() {
        match c {
            '*' | '?' => {
                re.push_str(&regex::escape(&literal));
                literal.clear();
                re.push_str(if c == '*' { ".*" } else { "." });
            }
            _ => literal.push(c),
        }
    }
    re.push_str(&regex::escape(&literal));
    re.push('$');
    Regex::new(&re)
}

/// Auto-queue policy applied by the remote scan.
#[derive(Debug, Clone, Default)]
pub struct AutoQueue {
    pub enabled: bool,
    pub patterns_only: bool,
    pub auto_extract: bool,
    pub patterns: PatternList,
}

impl AutoQueue {
    pub fn from_config(cfg: &AutoQueueConfig) -> Self {
        Self {
            enabled: cfg.enabled,
            patterns_only: cfg.patterns_only,
            auto_extract: cfg.auto_extract,
            patterns: PatternList::new(cfg.patterns.as_slice()),
        }
    }

    /// Whether a newly seen name should be queued automatically.
    pub fn admits(&self, name: &str) -> bool {
        self.enabled && (!self.patterns_only || self.patterns.matches(name))
    }
}
