/// Per-channel title filters.
///
/// Entries are accepted when no include rule is configured or at least one
/// include rule matches, and no exclude rule matches. Plain substrings are
/// compared case-insensitively; regexes are used as written.
use regex::Regex;

use crate::config::ChannelEntry;
use crate::errors::ConfigError;

#[derive(Debug, Clone, Default)]
pub struct TitleFilter {
    include: Vec<String>,
    exclude: Vec<String>,
    include_regex: Vec<Regex>,
    exclude_regex: Vec<Regex>,
}

impl TitleFilter {
    /// Compile the rules of a channel entry.
    pub fn from_entry(entry: &ChannelEntry) -> Result<Self, ConfigError> {
        let compile = |patterns: &[String]| -> Result<Vec<Regex>, ConfigError> {
            patterns
                .iter()
                .map(|p| {
                    Regex::new(p).map_err(|source| ConfigError::InvalidRegex {
                        channel_id: entry.id.clone(),
                        pattern: p.clone(),
                        source,
                    })
                })
                .collect()
        };

        Ok(Self {
            include: entry.include.iter().map(|s| s.to_lowercase()).collect(),
            exclude: entry.exclude.iter().map(|s| s.to_lowercase()).collect(),
            include_regex: compile(&entry.include_regex)?,
            exclude_regex: compile(&entry.exclude_regex)?,
        })
    }

    /// Whether this filter lets every title through.
    pub fn is_pass_through(&self) -> bool {
        self.include.is_empty()
            && self.exclude.is_empty()
            && self.include_regex.is_empty()
            && self.exclude_regex.is_empty()
    }

    pub fn accepts(&self, title: &str) -> bool {
        let lowered = title.to_lowercase();

        let has_include_rules = !self.include.is_empty() || !self.include_regex.is_empty();
        let included = !has_include_rules
            || self.include.iter().any(|s| lowered.contains(s.as_str()))
            || self.include_regex.iter().any(|r| r.is_match(title));

        let excluded = self.exclude.iter().any(|s| lowered.contains(s.as_str()))
            || self.exclude_regex.iter().any(|r| r.is_match(title));

        included && !excluded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> ChannelEntry {
        ChannelEntry::new("UCXuqSBlHAE6Xw-yeJA0Tunw")
    }

    #[test]
    fn test_empty_filter_accepts_everything() {
        let filter = TitleFilter::from_entry(&entry()).unwrap();
        assert!(filter.is_pass_through());
        assert!(filter.accepts("anything at all"));
    }

    #[test]
    fn test_exclude_substring_is_case_insensitive() {
        let mut e = entry();
        e.exclude = vec!["#Shorts".into()];
        let filter = TitleFilter::from_entry(&e).unwrap();
        assert!(!filter.accepts("Quick tip #shorts"));
        assert!(filter.accepts("Full review"));
    }

    #[test]
    fn test_include_rules_are_alternatives() {
        let mut e = entry();
        e.include = vec!["review".into()];
        e.include_regex = vec![r"^Part \d+".into()];
        let filter = TitleFilter::from_entry(&e).unwrap();
        assert!(filter.accepts("Laptop REVIEW"));
        assert!(filter.accepts("Part 3: the finale"));
        assert!(!filter.accepts("Unboxing"));
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let mut e = entry();
        e.include = vec!["review".into()];
        e.exclude_regex = vec![r"(?i)sponsored".into()];
        let filter = TitleFilter::from_entry(&e).unwrap();
        assert!(!filter.accepts("Sponsored review"));
    }

    #[test]
    fn test_invalid_regex_is_reported() {
        let mut e = entry();
        e.include_regex = vec!["(unclosed".into()];
        let err = TitleFilter::from_entry(&e).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRegex { pattern, .. } if pattern == "(unclosed"));
    }
}
