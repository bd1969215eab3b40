//! Heading-based report sectioning.
//!
//! Reports are markdown documents organized under `###` headings. Splitting
//! on those headings backs two features: the trigger's section include
//! filter, and table elision during compaction.

/// One `###`-headed slice of a report. Content before the first heading has
/// `heading = None`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportSection {
    pub heading: Option<String>,
    /// The section text, heading line included.
    pub text: String,
}

/// Split a markdown report into its `###` sections.
pub fn split(markdown: &str) -> Vec<ReportSection> {
    let mut sections = Vec::new();
    let mut current = ReportSection {
        heading: None,
        text: String::new(),
    };

    for line in markdown.lines() {
        if let Some(rest) = line.strip_prefix("### ") {
            if current.heading.is_some() || !current.text.trim().is_empty() {
                sections.push(current);
            }
            current = ReportSection {
                heading: Some(rest.trim().to_string()),
                text: String::new(),
            };
        }
        current.text.push_str(line);
        current.text.push('\n');
    }
    if current.heading.is_some() || !current.text.trim().is_empty() {
        sections.push(current);
    }

    sections
}

/// Keep the preamble plus every section whose heading contains one of
/// `wanted` (case-insensitive substring match). An empty filter keeps the
/// whole report.
pub fn filter(markdown: &str, wanted: &[String]) -> String {
    if wanted.is_empty() {
        return markdown.to_string();
    }
    let wanted_lower: Vec<String> = wanted.iter().map(|w| w.to_lowercase()).collect();

    split(markdown)
        .into_iter()
        .filter(|section| match &section.heading {
            None => true,
            Some(heading) => {
                let heading = heading.to_lowercase();
                wanted_lower.iter().any(|w| heading.contains(w))
            }
        })
        .map(|section| section.text)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "# Daily Report\n\
        intro line\n\
        ### Market Snapshot\n\
        close: 102.5\n\
        ### Risk Alerts\n\
        - leverage above limit\n\
        ### Catalysts\n\
        - earnings beat\n";

    #[test]
    fn split_keeps_preamble_and_headed_sections() {
        let sections = split(REPORT);
        assert_eq!(sections.len(), 4);
        assert_eq!(sections[0].heading, None);
        assert!(sections[0].text.contains("intro line"));
        assert_eq!(sections[1].heading.as_deref(), Some("Market Snapshot"));
        assert_eq!(sections[3].heading.as_deref(), Some("Catalysts"));
    }

    #[test]
    fn filter_keeps_matching_sections_and_preamble() {
        let filtered = filter(REPORT, &["risk".to_string()]);
        assert!(filtered.contains("# Daily Report"));
        assert!(filtered.contains("Risk Alerts"));
        assert!(filtered.contains("leverage above limit"));
        assert!(!filtered.contains("Market Snapshot"));
        assert!(!filtered.contains("earnings beat"));
    }

    #[test]
    fn empty_filter_keeps_everything() {
        assert_eq!(filter(REPORT, &[]), REPORT);
    }
}
