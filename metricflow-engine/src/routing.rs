//! Routing of source/task pairs to transforms and sinks

use glob::Pattern;
use serde::Deserialize;
use serde_json::Value;

/// Compiled glob patterns of one filter key
#[derive(Debug, Clone, Default)]
pub struct PatternList {
    raw: Vec<String>,
    compiled: Vec<Pattern>,
}

impl PatternList {
    pub fn new(patterns: Vec<String>) -> Self {
        let compiled = patterns.iter().map(|p| compile(p)).collect();
        Self {
            raw: patterns,
            compiled,
        }
    }

    /// Whether any pattern matches `name`
    pub fn any_match(&self, name: &str) -> bool {
        self.compiled.iter().any(|p| p.matches(name))
    }

    pub fn patterns(&self) -> &[String] {
        &self.raw
    }
}

/// Compile a shell-style pattern; malformed patterns match literally
pub fn compile(pattern: &str) -> Pattern {
    Pattern::new(pattern).unwrap_or_else(|_| {
        // Escaped patterns contain no special characters and always compile
        Pattern::new(&Pattern::escape(pattern)).unwrap_or_default()
    })
}

#[derive(Debug, Default, Deserialize)]
struct RawFilters {
    #[serde(default)]
    include_sources: Option<Vec<String>>,
    #[serde(default)]
    exclude_sources: Option<Vec<String>>,
    #[serde(default)]
    include_tasks: Option<Vec<String>>,
    #[serde(default)]
    exclude_tasks: Option<Vec<String>>,
}

/// Include/exclude filters of a transform or sink
#[derive(Debug, Clone, Default)]
pub struct RoutingFilters {
    pub include_sources: Option<PatternList>,
    pub exclude_sources: Option<PatternList>,
    pub include_tasks: Option<PatternList>,
    pub exclude_tasks: Option<PatternList>,
}

impl RoutingFilters {
    /// Read the filter keys of a validated module entry
    pub fn from_config(config: &Value) -> serde_json::Result<Self> {
        let raw = RawFilters::deserialize(config)?;
        Ok(Self {
            include_sources: raw.include_sources.map(PatternList::new),
            exclude_sources: raw.exclude_sources.map(PatternList::new),
            include_tasks: raw.include_tasks.map(PatternList::new),
            exclude_tasks: raw.exclude_tasks.map(PatternList::new),
        })
    }

    /// Decide whether a processor accepts data of a source/task pair
    ///
    /// Checks run in order and stop at the first rejection: enablement (unless
    /// `ignore_enabled`), included sources, excluded sources, included tasks, excluded
    /// tasks.
    pub fn accepts(&self, enabled: bool, source: &str, task: &str, ignore_enabled: bool) -> bool {
        if !enabled && !ignore_enabled {
            return false;
        }

        if let Some(include) = &self.include_sources {
            if !include.any_match(source) {
                return false;
            }
        }

        if let Some(exclude) = &self.exclude_sources {
            if exclude.any_match(source) {
                return false;
            }
        }

        if let Some(include) = &self.include_tasks {
            if !include.any_match(task) {
                return false;
            }
        }

        if let Some(exclude) = &self.exclude_tasks {
            if exclude.any_match(task) {
                return false;
            }
        }

        true
    }

    /// Patterns that match none of the known names, with a warning message each
    pub fn unmatched(&self, sources: &[&str], tasks: &[&str]) -> Vec<String> {
        let mut warnings = Vec::new();

        let source_filters = [&self.include_sources, &self.exclude_sources];
        for list in source_filters.into_iter().flatten() {
            for (raw, pattern) in list.raw.iter().zip(&list.compiled) {
                if !sources.iter().any(|name| pattern.matches(name)) {
                    warnings.push(format!("Filter `{raw}` does not match any source names."));
                }
            }
        }

        let task_filters = [&self.include_tasks, &self.exclude_tasks];
        for list in task_filters.into_iter().flatten() {
            for (raw, pattern) in list.raw.iter().zip(&list.compiled) {
                if !tasks.iter().any(|name| pattern.matches(name)) {
                    warnings.push(format!("Filter `{raw}` does not match any task names."));
                }
            }
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn filters(config: Value) -> RoutingFilters {
        RoutingFilters::from_config(&config).unwrap()
    }

    #[test]
    fn test_include_then_exclude_tasks() {
        let f = filters(json!({"include_tasks": ["foo*"], "exclude_tasks": ["foobar"]}));
        assert!(f.accepts(true, "src", "foobar_extra", false));
        assert!(!f.accepts(true, "src", "foobar", false));
        assert!(!f.accepts(true, "src", "bar", false));
    }

    #[test]
    fn test_source_filters() {
        let f = filters(json!({"include_sources": ["db_*"], "exclude_sources": ["db_test"]}));
        assert!(f.accepts(true, "db_prod", "t", false));
        assert!(!f.accepts(true, "db_test", "t", false));
        assert!(!f.accepts(true, "http", "t", false));
    }

    #[test]
    fn test_disabled_processor_rejects_unless_ignored() {
        let f = filters(json!({}));
        assert!(f.accepts(true, "s", "t", false));
        assert!(!f.accepts(false, "s", "t", false));
        assert!(f.accepts(false, "s", "t", true));
    }

    #[test]
    fn test_null_filters_accept_everything() {
        let f = filters(json!({"include_sources": null, "exclude_tasks": null, "type": "x"}));
        assert!(f.include_sources.is_none());
        assert!(f.accepts(true, "anything", "at_all", false));
    }

    #[test]
    fn test_malformed_pattern_matches_literally() {
        let f = filters(json!({"include_tasks": ["a[b"]}));
        assert!(f.accepts(true, "s", "a[b", false));
        assert!(!f.accepts(true, "s", "ab", false));
    }

    #[test]
    fn test_unmatched_patterns() {
        let f = filters(json!({"include_sources": ["db*", "nope"], "exclude_tasks": ["x?"]}));
        let warnings = f.unmatched(&["db1"], &["t1"]);
        assert_eq!(
            warnings,
            vec![
                "Filter `nope` does not match any source names.".to_string(),
                "Filter `x?` does not match any task names.".to_string(),
            ]
        );
    }
}
