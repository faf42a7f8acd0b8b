use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of user intentions recognized by the intent seeker.
///
/// `Greet` short-circuits the conversational workflow straight to answer
/// composition; everything else flows through task planning. Classifier
/// output that matches none of the known labels falls back to [`Other`].
///
/// [`Other`]: Intention::Other
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intention {
    Greet,
    Analyze,
    Question,
    Summarize,
    ExtractInsights,
    ExtractActions,
    FindTopics,
    Compare,
    Evaluate,
    Other,
}

impl Intention {
    /// Parses a classifier label, case-insensitively. Unknown labels map to
    /// `Other` rather than failing the turn.
    #[must_use]
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "greet" => Self::Greet,
            "analyze" => Self::Analyze,
            "question" => Self::Question,
            "summarize" => Self::Summarize,
            "extract_insights" => Self::ExtractInsights,
            "extract_actions" => Self::ExtractActions,
            "find_topics" => Self::FindTopics,
            "compare" => Self::Compare,
            "evaluate" => Self::Evaluate,
            _ => Self::Other,
        }
    }

    /// The snake_case label used in prompts and persisted state.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Greet => "greet",
            Self::Analyze => "analyze",
            Self::Question => "question",
            Self::Summarize => "summarize",
            Self::ExtractInsights => "extract_insights",
            Self::ExtractActions => "extract_actions",
            Self::FindTopics => "find_topics",
            Self::Compare => "compare",
            Self::Evaluate => "evaluate",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for Intention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(Intention::parse("GREET"), Intention::Greet);
        assert_eq!(Intention::parse(" extract_insights "), Intention::ExtractInsights);
    }

    #[test]
    fn unknown_labels_fall_back_to_other() {
        assert_eq!(Intention::parse("negotiate"), Intention::Other);
        assert_eq!(Intention::parse(""), Intention::Other);
    }

    #[test]
    fn label_round_trips_through_parse() {
        for intention in [
            Intention::Greet,
            Intention::Analyze,
            Intention::Question,
            Intention::Summarize,
            Intention::ExtractInsights,
            Intention::ExtractActions,
            Intention::FindTopics,
            Intention::Compare,
            Intention::Evaluate,
            Intention::Other,
        ] {
            assert_eq!(Intention::parse(intention.label()), intention);
        }
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&Intention::ExtractActions).expect("serialize");
        assert_eq!(json, "\"extract_actions\"");
    }
}
