use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    pub question: String,
    pub context: String,
    /// Free-form caller context, e.g. patient details. Never sent to the model.
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub status: String,
    pub request_id: String,
    pub question: String,
    pub answer: String,
    pub confidence: f32,
}

#[derive(Debug, Deserialize)]
pub struct SummarizeRequest {
    pub text: String,
    #[serde(default)]
    pub max_length: Option<usize>,
    #[serde(default)]
    pub min_length: Option<usize>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SummarizeResponse {
    pub status: String,
    pub request_id: String,
    pub original_text: String,
    pub summary: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub detail: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub models: Vec<String>,
    pub started_at: DateTime<Utc>,
}

impl AnswerRequest {
    pub fn validate(&self) -> Result<()> {
        if self.question.trim().is_empty() || self.context.trim().is_empty() {
            return Err(Error::validation("Question and context are required"));
        }
        Ok(())
    }
}

impl SummarizeRequest {
    /// Checks the text and the effective lengths against the largest output
    /// the server will generate.
    pub fn validate(
        &self,
        max_length: usize,
        min_length: usize,
        max_output_len: usize,
    ) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(Error::validation("Text is required"));
        }
        if max_length == 0 {
            return Err(Error::validation("max_length must be at least 1"));
        }
        if max_length < min_length {
            return Err(Error::validation(
                "max_length must be greater than min_length",
            ));
        }
        if max_length > max_output_len {
            return Err(Error::validation(format!(
                "max_length must not exceed {}",
                max_output_len
            )));
        }
        Ok(())
    }
}

impl ErrorResponse {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            detail: detail.into(),
        }
    }
}

/// First `max_chars` characters of `text`, for logging without dumping whole
/// clinical documents.
pub fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        assert_eq!(preview("héllo wörld", 4), "héll");
        assert_eq!(preview("short", 50), "short");
        assert_eq!(preview("", 50), "");
    }

    #[test]
    fn test_answer_request_requires_both_fields() {
        let request = AnswerRequest {
            question: "What is the treatment for diabetes?".to_string(),
            context: "   ".to_string(),
            metadata: None,
        };
        let err = request.validate().unwrap_err();
        assert!(err.is_client_error());
        assert_eq!(err.to_string(), "Question and context are required");
    }

    #[test]
    fn test_summarize_request_length_bounds() {
        let request = SummarizeRequest {
            text: "Patient presents with fatigue.".to_string(),
            max_length: None,
            min_length: None,
            metadata: None,
        };

        assert!(request.validate(100, 30, 512).is_ok());
        assert!(request.validate(30, 30, 512).is_ok());
        assert!(request.validate(512, 30, 512).is_ok());
        assert_eq!(
            request.validate(20, 30, 512).unwrap_err().to_string(),
            "max_length must be greater than min_length"
        );
        assert!(request.validate(0, 0, 512).is_err());
        assert_eq!(
            request.validate(513, 30, 512).unwrap_err().to_string(),
            "max_length must not exceed 512"
        );
    }

    #[test]
    fn test_metadata_must_be_an_object() {
        let parsed: std::result::Result<AnswerRequest, _> = serde_json::from_str(
            r#"{"question": "q", "context": "c", "metadata": "patient 12"}"#,
        );
        assert!(parsed.is_err());

        let parsed: AnswerRequest = serde_json::from_str(
            r#"{"question": "q", "context": "c", "metadata": {"age": 54}}"#,
        )
        .unwrap();
        assert_eq!(parsed.metadata.unwrap().len(), 1);
    }
}
