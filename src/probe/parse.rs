//! Window-title parsing for participant counts.

use anyhow::{Context, Result};
use regex::Regex;

use crate::engine::counter::ParticipantCounts;

/// Extracts participant counts from window titles.
///
/// The pattern's first capture group is the current count; an optional
/// second group is the room capacity. A title without the capacity group
/// yields a capacity of zero, which downstream treats as unknown.
pub struct TitleParser {
    pattern: Regex,
}

impl TitleParser {
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern).context("Invalid participant title pattern")?;
        Ok(Self { pattern })
    }

    pub fn parse(&self, title: &str) -> Option<ParticipantCounts> {
        let caps = self.pattern.captures(title)?;
        let current = caps.get(1)?.as_str().parse().ok()?;
        let maximum = caps
            .get(2)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0);
        Some(ParticipantCounts { current, maximum })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;

    fn default_parser() -> TitleParser {
        TitleParser::new(&ClientConfig::default().title_pattern).unwrap()
    }

    #[test]
    fn test_parses_count_and_capacity() {
        let parser = default_parser();
        let counts = parser.parse("Participants (37/100)").unwrap();
        assert_eq!(counts.current, 37);
        assert_eq!(counts.maximum, 100);
    }

    #[test]
    fn test_ignores_unrelated_titles() {
        let parser = default_parser();
        assert!(parser.parse("Zoom Meeting").is_none());
        assert!(parser.parse("Chat").is_none());
        assert!(parser.parse("").is_none());
    }

    #[test]
    fn test_missing_capacity_group_reads_as_unknown() {
        let parser = TitleParser::new(r"Participants \((\d+)\)").unwrap();
        let counts = parser.parse("Participants (12)").unwrap();
        assert_eq!(counts.current, 12);
        assert_eq!(counts.maximum, 0);
    }

    #[test]
    fn test_first_match_wins() {
        let parser = default_parser();
        let counts = parser.parse("Breakout (3/10) and (5/20)").unwrap();
        assert_eq!(counts.current, 3);
        assert_eq!(counts.maximum, 10);
    }

    #[test]
    fn test_rejects_invalid_pattern() {
        assert!(TitleParser::new(r"(\d+").is_err());
    }
}
