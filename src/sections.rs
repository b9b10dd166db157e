//! Keyword-based manual section tagging.
//!
//! Manuals rarely carry machine-readable structure, so sections are inferred
//! line by line: a line that mentions a section keyword opens that section,
//! and every following line belongs to it until another keyword line appears.

/// Section names and the keywords that open them, in match priority order.
pub const SECTION_RULES: &[(&str, &[&str])] = &[
    ("maintenance", &["maintenance", "service"]),
    ("troubleshooting", &["troubleshoot", "problem", "diagnostic"]),
    ("engine", &["engine"]),
    ("transmission", &["transmission"]),
    ("electrical", &["electrical"]),
    ("brakes", &["brake"]),
    ("suspension", &["suspension"]),
    ("air_conditioning", &["air conditioning", "a/c", "hvac"]),
    ("heating", &["heating"]),
];

/// Section opened by `line`, if it mentions any keyword.
pub fn classify_line(line: &str) -> Option<&'static str> {
    let lowered = line.to_lowercase();
    SECTION_RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lowered.contains(k)))
        .map(|(name, _)| *name)
}

/// Char offsets at which each inferred section starts.
#[derive(Debug, Clone, Default)]
pub struct SectionMap {
    starts: Vec<(usize, &'static str)>,
}

impl SectionMap {
    pub fn new(text: &str) -> Self {
        let mut starts: Vec<(usize, &'static str)> = Vec::new();
        let mut offset = 0;

        for line in text.split('\n') {
            if let Some(section) = classify_line(line) {
                if starts.last().is_none_or(|(_, current)| *current != section) {
                    starts.push((offset, section));
                }
            }
            offset += line.chars().count() + 1;
        }

        Self { starts }
    }

    /// Section in effect at char `offset`.
    pub fn section_at(&self, offset: usize) -> Option<&'static str> {
        let idx = self.starts.partition_point(|(start, _)| *start <= offset);
        idx.checked_sub(1).map(|i| self.starts[i].1)
    }

    /// Section for the char span `start..end`.
    ///
    /// The section in effect at `start`, or failing that the first section
    /// opened inside the span.
    pub fn section_for(&self, start: usize, end: usize) -> Option<&'static str> {
        self.section_at(start).or_else(|| {
            self.starts
                .iter()
                .find(|(s, _)| *s >= start && *s < end)
                .map(|(_, name)| *name)
        })
    }

    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(classify_line("ENGINE OIL"), Some("engine"));
        assert_eq!(classify_line("Front Brake Pads"), Some("brakes"));
        assert_eq!(classify_line("Using the A/C"), Some("air_conditioning"));
        assert_eq!(classify_line("Seat adjustment"), None);
    }

    #[test]
    fn earlier_rules_win() {
        // mentions both maintenance and engine
        assert_eq!(classify_line("Engine maintenance schedule"), Some("maintenance"));
        assert_eq!(
            classify_line("Diagnostic trouble codes for the engine"),
            Some("troubleshooting")
        );
    }

    #[test]
    fn sections_carry_over_unlabelled_lines() {
        let text = "Intro\nEngine\nCheck the oil.\nBrakes\nPads wear.";
        let map = SectionMap::new(text);

        assert_eq!(map.section_at(0), None);
        assert_eq!(map.section_at(6), Some("engine"));
        assert_eq!(map.section_at(15), Some("engine"));
        assert_eq!(map.section_at(28), Some("brakes"));
        assert_eq!(map.section_at(1000), Some("brakes"));
    }

    #[test]
    fn span_before_any_header_takes_first_section_inside() {
        let text = "Intro\nEngine\nCheck the oil.";
        let map = SectionMap::new(text);

        assert_eq!(map.section_for(0, 10), Some("engine"));
        assert_eq!(map.section_for(0, 4), None);
    }

    #[test]
    fn repeated_section_is_recorded_once() {
        let map = SectionMap::new("engine\nengine oil\nengine coolant");
        assert_eq!(map.starts.len(), 1);
    }

    #[test]
    fn text_without_keywords_is_empty() {
        assert!(SectionMap::new("Fold the rear seats.").is_empty());
    }
}
