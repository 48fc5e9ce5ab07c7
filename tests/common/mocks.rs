use async_trait::async_trait;
use medserve::{
    Error, Result,
    model::{Answer, QuestionAnswerer, Summarizer, SummaryParams},
};
use std::sync::{Arc, Mutex};

/// Mock QA model for testing
#[derive(Debug, Clone)]
pub struct MockQuestionAnswerer {
    pub answer: Answer,
    pub error: Option<String>,
    /// Report `error` as invalid input instead of an inference failure
    pub rejects_input: bool,
    pub calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockQuestionAnswerer {
    pub fn new(text: &str, score: f32) -> Self {
        Self {
            answer: Answer {
                text: text.to_string(),
                score,
            },
            error: None,
            rejects_input: false,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing(error: &str) -> Self {
        let mut mock = Self::new("", 0.0);
        mock.error = Some(error.to_string());
        mock
    }

    pub fn rejecting(error: &str) -> Self {
        let mut mock = Self::failing(error);
        mock.rejects_input = true;
        mock
    }

    pub fn get_calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl QuestionAnswerer for MockQuestionAnswerer {
    fn model_id(&self) -> &str {
        "mock-biobert"
    }

    async fn answer(&self, question: &str, context: &str) -> Result<Answer> {
        self.calls
            .lock()
            .unwrap()
            .push((question.to_string(), context.to_string()));

        match self.error {
            Some(ref error) if self.rejects_input => Err(Error::validation(error.clone())),
            Some(ref error) => Err(Error::inference(error.clone())),
            None => Ok(self.answer.clone()),
        }
    }
}

/// Mock summarization model for testing
#[derive(Debug, Clone)]
pub struct MockSummarizer {
    pub summary: String,
    pub error: Option<String>,
    pub calls: Arc<Mutex<Vec<(String, SummaryParams)>>>,
}

impl MockSummarizer {
    pub fn new(summary: &str) -> Self {
        Self {
            summary: summary.to_string(),
            error: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing(error: &str) -> Self {
        let mut mock = Self::new("");
        mock.error = Some(error.to_string());
        mock
    }

    pub fn get_calls(&self) -> Vec<(String, SummaryParams)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Summarizer for MockSummarizer {
    fn model_id(&self) -> &str {
        "mock-t5"
    }

    async fn summarize(&self, text: &str, params: SummaryParams) -> Result<String> {
        self.calls.lock().unwrap().push((text.to_string(), params));

        if let Some(ref error) = self.error {
            return Err(Error::inference(error.clone()));
        }

        Ok(self.summary.clone())
    }
}
