use axum::Router;
use medserve::server::{self, AppState, SummaryLimits};
use std::io::Write;
use std::sync::{Arc, Mutex};

use super::mocks::{MockQuestionAnswerer, MockSummarizer};

pub const DIABETES_QUESTION: &str = "What is the treatment for diabetes?";

pub const DIABETES_CONTEXT: &str = "Diabetes is a chronic condition requiring lifestyle changes and medications like metformin or insulin to manage blood sugar levels.";

pub const CLINICAL_NOTE: &str = "Patient presents with a history of type 2 diabetes mellitus, diagnosed 5 years ago. Currently managed with metformin 500 mg twice daily. Recent complaints of fatigue, polyuria, and blurred vision. HbA1c level is 8.2%, indicating poor glycemic control. No history of cardiovascular disease. Plan to adjust medication and recommend lifestyle changes.";

pub const CLINICAL_SUMMARY: &str = "Patient with type 2 diabetes on metformin. HbA1c 8.2% shows poor control.";

/// Create an app serving both models with the given mocks
pub fn create_test_app(qa: MockQuestionAnswerer, summarizer: MockSummarizer) -> Router {
    let state = AppState::new()
        .with_qa(Arc::new(qa))
        .with_summarizer(Arc::new(summarizer))
        .with_limits(SummaryLimits::default());
    server::router(state)
}

/// Default mocks returning canned answers
pub fn default_mocks() -> (MockQuestionAnswerer, MockSummarizer) {
    (
        MockQuestionAnswerer::new("metformin or insulin", 0.8923),
        MockSummarizer::new(CLINICAL_SUMMARY),
    )
}

/// Log sink shared with a tracing subscriber, for asserting on emitted entries
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
    }

    /// Installs a subscriber writing into this sink for the current thread
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let sink = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || sink.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
