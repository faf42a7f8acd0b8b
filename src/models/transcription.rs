use serde::{Deserialize, Serialize};
use std::fmt;

/// Provenance attached to a transcription payload by the upstream
/// speech-to-text tool.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionMetadata {
    pub original_filename: String,
    /// Speech-to-text model that produced the text.
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    /// Upstream transcription time in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<f64>,
}

/// The transcription payload handed to the background pipeline.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionData {
    pub transcription_id: String,
    pub text: String,
    /// Audio duration in seconds, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default)]
    pub metadata: TranscriptionMetadata,
}

/// The analyzer stage's structured completion output.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptionAnalysis {
    pub summary: String,
    pub key_topics: Vec<String>,
    pub sentiment: String,
    pub main_themes: Vec<String>,
    pub important_quotes: Vec<String>,
    pub technical_terms: Vec<String>,
}

/// The insight-extraction stage's structured completion output.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedInsights {
    pub key_insights: Vec<String>,
    pub action_items: Vec<String>,
    pub decisions: Vec<String>,
    pub questions: Vec<String>,
    pub follow_ups: Vec<String>,
}

/// Overall outcome of a background transcription job.
///
/// `Completed` requires both the analysis and the insights to be present;
/// exactly one present is `Partial`; neither is `Failed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Completed,
    Partial,
    Failed,
}

impl ProcessingStatus {
    /// Derives the job status from which stage outputs made it into state.
    #[must_use]
    pub fn from_outputs(has_analysis: bool, has_insights: bool) -> Self {
        match (has_analysis, has_insights) {
            (true, true) => Self::Completed,
            (false, false) => Self::Failed,
            _ => Self::Partial,
        }
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Partial => write!(f, "partial"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
