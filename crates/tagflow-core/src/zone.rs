// ── Zone classification ──
//
// Pure lookup over a static table of antenna ranges per reader.

use crate::config::ZoneRule;

/// Zone for any (reader, antenna) pair no rule covers.
pub const UNASSIGNED: &str = "unassigned";

/// Maps `(reader, antenna)` to a physical zone.
#[derive(Debug, Clone, Default)]
pub struct ZoneClassifier {
    rules: Vec<ZoneRule>,
}

impl ZoneClassifier {
    pub fn new(rules: Vec<ZoneRule>) -> Self {
        Self { rules }
    }

    /// First matching rule wins. Reader names compare case-insensitively.
    pub fn classify(&self, reader: &str, antenna: u16) -> &str {
        self.rules
            .iter()
            .find(|rule| {
                rule.reader.eq_ignore_ascii_case(reader)
                    && (rule.first_antenna..=rule.last_antenna).contains(&antenna)
            })
            .map_or(UNASSIGNED, |rule| rule.zone.as_str())
    }

    pub fn rules(&self) -> &[ZoneRule] {
        &self.rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> ZoneClassifier {
        ZoneClassifier::new(vec![
            ZoneRule::new("A", 1..=4, "A-low"),
            ZoneRule::new("A", 5..=8, "A-high"),
            ZoneRule::new("B", 1..=2, "dock"),
        ])
    }

    #[test]
    fn antenna_ranges_map_to_zones() {
        let zones = classifier();
        assert_eq!(zones.classify("A", 1), "A-low");
        assert_eq!(zones.classify("A", 4), "A-low");
        assert_eq!(zones.classify("A", 5), "A-high");
        assert_eq!(zones.classify("A", 8), "A-high");
        assert_eq!(zones.classify("A", 9), UNASSIGNED);
    }

    #[test]
    fn unknown_reader_is_unassigned() {
        assert_eq!(classifier().classify("C", 1), UNASSIGNED);
    }

    #[test]
    fn reader_match_ignores_case() {
        assert_eq!(classifier().classify("b", 2), "dock");
    }
}
