//! Training examples and the three-way parse outcome.

use serde::{Deserialize, Serialize};

/// Envelope marker that opens a generated example.
pub const QUESTION_MARKER: &str = "Question:";
/// Envelope marker that separates the question from its answer.
pub const ANSWER_MARKER: &str = "Answer:";
/// Inner marker that opens the reasoning segment.
pub const THOUGHT_MARKER: &str = "Thought:";
/// Inner marker that opens the concluding segment.
pub const FINAL_ANSWER_MARKER: &str = "Final Answer:";

/// A question paired with its Chain-of-Thought answer.
///
/// `answer` is expected to hold a `Thought:` segment and a `Final Answer:`
/// segment, but the type does not enforce it; see [`ParsedExample`] for how
/// generated examples are graded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CotExample {
    pub question: String,
    pub answer: String,
}

impl CotExample {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self { question: question.into(), answer: answer.into() }
    }

    /// `true` when the answer carries both inner CoT markers.
    ///
    /// Order is not checked: `Final Answer:` before `Thought:` still counts.
    pub fn has_cot_markers(&self) -> bool {
        self.answer.contains(THOUGHT_MARKER) && self.answer.contains(FINAL_ANSWER_MARKER)
    }
}

/// Outcome of parsing one raw generator completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedExample {
    /// Envelope found and the answer carries both `Thought:` and `Final Answer:`.
    WellFormed(CotExample),
    /// Envelope found but at least one inner marker is missing.  Kept as
    /// training data with a format warning.
    MalformedParsed(CotExample),
    /// No `Question:`/`Answer:` envelope; the completion is preserved verbatim.
    ParseFailure { raw_text: String },
}

impl ParsedExample {
    /// The question/answer pair, if the envelope could be split.
    pub fn example(&self) -> Option<&CotExample> {
        match self {
            Self::WellFormed(ex) | Self::MalformedParsed(ex) => Some(ex),
            Self::ParseFailure { .. } => None,
        }
    }

    pub fn into_example(self) -> Option<CotExample> {
        match self {
            Self::WellFormed(ex) | Self::MalformedParsed(ex) => Some(ex),
            Self::ParseFailure { .. } => None,
        }
    }

    pub fn is_well_formed(&self) -> bool {
        matches!(self, Self::WellFormed(_))
    }

    /// Short label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::WellFormed(_) => "well-formed",
            Self::MalformedParsed(_) => "format-warning",
            Self::ParseFailure { .. } => "parse-failure",
        }
    }
}

// ── On-disk record ────────────────────────────────────────────────────────────

/// One entry of the persisted generated corpus.
///
/// The file keeps the flat shape generated corpora have always had:
///
/// ```json
/// {"question": "…", "answer": "…"}
/// {"question": "…", "answer": "…", "format_warning": true}
/// {"raw_response": "…", "parsing_error": true}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub format_warning: bool,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "raw_text")]
    pub raw_response: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub parsing_error: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl From<&ParsedExample> for GeneratedRecord {
    fn from(parsed: &ParsedExample) -> Self {
        match parsed {
            ParsedExample::WellFormed(ex) => Self {
                question: Some(ex.question.clone()),
                answer: Some(ex.answer.clone()),
                format_warning: false,
                raw_response: None,
                parsing_error: false,
            },
            ParsedExample::MalformedParsed(ex) => Self {
                question: Some(ex.question.clone()),
                answer: Some(ex.answer.clone()),
                format_warning: true,
                raw_response: None,
                parsing_error: false,
            },
            ParsedExample::ParseFailure { raw_text } => Self {
                question: None,
                answer: None,
                format_warning: false,
                raw_response: Some(raw_text.clone()),
                parsing_error: true,
            },
        }
    }
}

impl TryFrom<GeneratedRecord> for ParsedExample {
    type Error = String;

    fn try_from(rec: GeneratedRecord) -> Result<Self, Self::Error> {
        if rec.parsing_error {
            return rec
                .raw_response
                .map(|raw_text| ParsedExample::ParseFailure { raw_text })
                .ok_or_else(|| "parsing_error record without raw_response".to_string());
        }

        match (rec.question, rec.answer) {
            (Some(question), Some(answer)) => {
                let ex = CotExample { question, answer };
                if rec.format_warning {
                    Ok(ParsedExample::MalformedParsed(ex))
                } else {
                    Ok(ParsedExample::WellFormed(ex))
                }
            }
            _ => Err("record needs both question and answer".to_string()),
        }
    }
}
