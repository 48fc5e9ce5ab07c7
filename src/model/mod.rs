pub mod qa;
pub mod store;
pub mod summarize;
pub mod tokenizer;

pub use qa::BertQuestionAnswerer;
pub use store::{ModelFiles, ModelStore};
pub use summarize::T5Summarizer;

use crate::Result;
use async_trait::async_trait;

/// An extracted answer and the model's confidence in it.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryParams {
    pub max_length: usize,
    pub min_length: usize,
}

#[async_trait]
pub trait QuestionAnswerer: Send + Sync {
    /// Name of the loaded checkpoint, reported by the health endpoint.
    fn model_id(&self) -> &str;

    async fn answer(&self, question: &str, context: &str) -> Result<Answer>;
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    fn model_id(&self) -> &str;

    async fn summarize(&self, text: &str, params: SummaryParams) -> Result<String>;
}

/// Picks the first CUDA device when the build has CUDA support, the CPU otherwise.
pub(crate) fn device() -> Result<candle_core::Device> {
    Ok(candle_core::Device::cuda_if_available(0)?)
}

/// Opens checkpoint weights, memory-mapping safetensors and falling back to
/// the PyTorch pickle format for anything else.
pub(crate) fn var_builder(
    weights: &std::path::Path,
    dtype: candle_core::DType,
    device: &candle_core::Device,
) -> Result<candle_nn::VarBuilder<'static>> {
    if weights.extension().is_some_and(|ext| ext == "safetensors") {
        // SAFETY: checkpoint files are not modified while the process runs.
        let vb =
            unsafe { candle_nn::VarBuilder::from_mmaped_safetensors(&[weights], dtype, device)? };
        Ok(vb)
    } else {
        Ok(candle_nn::VarBuilder::from_pth(weights, dtype, device)?)
    }
}

/// Runs CPU-bound model work off the async executor.
pub(crate) async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| crate::Error::internal(format!("model task failed: {}", e)))?
}
