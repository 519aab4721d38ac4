use crate::task::Priority;

const HIGH_MARKERS: &[&str] =
    &["asap", "urgent", "immediately", "critical", "deadline", "due", "today", "tonight", "now", "overdue"];

const LOW_MARKERS: &[&str] =
    &["someday", "eventually", "whenever", "later", "maybe", "no rush", "low priority", "idea"];

/// Pure fallback classifier: urgency markers win over deferral markers,
/// everything else lands on `Medium`. Case-insensitive substring match.
pub fn classify(text: &str) -> Priority {
    let lowered = text.to_lowercase();
    if HIGH_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        return Priority::High;
    }
    if LOW_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        return Priority::Low;
    }
    Priority::Medium
}

/// Seam for the external suggestion collaborator. The shipped fallback is
/// the heuristic; a network-backed implementation returns the same enum,
/// so callers cannot tell the two apart.
pub trait SuggestPriority {
    fn suggest(&self, text: &str) -> Priority;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Heuristic;

impl SuggestPriority for Heuristic {
    fn suggest(&self, text: &str) -> Priority {
        classify(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urgency_markers_classify_high() {
        assert_eq!(classify("Fix this ASAP"), Priority::High);
        assert_eq!(classify("tax return due Friday"), Priority::High);
    }

    #[test]
    fn deferral_markers_classify_low() {
        assert_eq!(classify("Read this someday"), Priority::Low);
        assert_eq!(classify("Maybe repaint the fence"), Priority::Low);
    }

    #[test]
    fn neutral_text_classifies_medium() {
        assert_eq!(classify("Buy milk"), Priority::Medium);
        assert_eq!(classify(""), Priority::Medium);
    }

    #[test]
    fn urgency_beats_deferral_when_both_present() {
        assert_eq!(classify("someday is not an option, this is urgent"), Priority::High);
    }

    #[test]
    fn heuristic_seam_matches_classify() {
        let heuristic = Heuristic;
        assert_eq!(heuristic.suggest("Submit the urgent report"), Priority::High);
        assert_eq!(heuristic.suggest("Sort the bookshelf"), Priority::Medium);
    }
}
