use super::{ModelStore, Summarizer, SummaryParams, blocking, device, tokenizer, var_builder};
use crate::{Error, Result, config::SummarizationConfig};
use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::t5::{self, T5ForConditionalGeneration};
use std::sync::{Arc, Mutex};
use tokenizers::{Tokenizer, TruncationStrategy};
use tracing::{debug, info};

/// Abstractive summarization with a T5 encoder-decoder and greedy decoding.
pub struct T5Summarizer {
    model_id: String,
    inner: Arc<T5Model>,
}

struct T5Model {
    // The decoder keeps a KV cache, so generation needs exclusive access.
    model: Mutex<T5ForConditionalGeneration>,
    tokenizer: Tokenizer,
    device: Device,
    prefix: String,
    decoder_start_token_id: u32,
    eos_token_id: u32,
    use_cache: bool,
}

impl T5Summarizer {
    pub async fn load(store: &ModelStore, config: &SummarizationConfig) -> Result<Self> {
        let files = store.resolve(&config.source).await?;
        let config = config.clone();
        let model_id = config.source.model_id.clone();

        let inner = blocking(move || {
            let device = device()?;
            let t5_config: t5::Config =
                serde_json::from_str(&std::fs::read_to_string(&files.config)?)?;
            let vb = var_builder(&files.weights, DType::F32, &device)?;
            let tokenizer = tokenizer::load(&files.tokenizer, false)?;
            T5Model::build(vb, &t5_config, tokenizer, device, &config)
        })
        .await?;

        info!("T5 model ({}) loaded successfully", model_id);

        Ok(Self {
            model_id,
            inner: Arc::new(inner),
        })
    }
}

#[async_trait]
impl Summarizer for T5Summarizer {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn summarize(&self, text: &str, params: SummaryParams) -> Result<String> {
        let inner = Arc::clone(&self.inner);
        let text = text.to_string();
        blocking(move || inner.summarize(&text, params)).await
    }
}

impl T5Model {
    fn build(
        vb: VarBuilder,
        t5_config: &t5::Config,
        mut tokenizer: Tokenizer,
        device: Device,
        config: &SummarizationConfig,
    ) -> Result<Self> {
        let model = T5ForConditionalGeneration::load(vb, t5_config)
            .map_err(|e| Error::model(format!("cannot load T5 model: {}", e)))?;
        tokenizer::truncate(
            &mut tokenizer,
            config.max_input_len,
            TruncationStrategy::LongestFirst,
        )?;

        Ok(Self {
            model: Mutex::new(model),
            tokenizer,
            device,
            prefix: config.prefix.clone(),
            decoder_start_token_id: t5_config
                .decoder_start_token_id
                .unwrap_or(t5_config.pad_token_id) as u32,
            eos_token_id: t5_config.eos_token_id as u32,
            use_cache: t5_config.use_cache,
        })
    }

    fn summarize(&self, text: &str, params: SummaryParams) -> Result<String> {
        let generated = self.generate(text, params)?;

        let summary = self.tokenizer.decode(&generated, true)?;
        let summary = summary.trim();
        if summary.is_empty() {
            return Err(Error::inference("model produced an empty summary"));
        }

        Ok(summary.to_string())
    }

    /// Greedy decoding. Returns the generated ids without the decoder start
    /// token or the closing end-of-sequence token.
    fn generate(&self, text: &str, params: SummaryParams) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(format!("{}{}", self.prefix, text), true)?;
        let input_ids = Tensor::new(encoding.get_ids(), &self.device)?.unsqueeze(0)?;

        let mut model = self
            .model
            .lock()
            .map_err(|_| Error::internal("summarization model lock poisoned"))?;
        model.clear_kv_cache();

        let encoder_output = model.encode(&input_ids)?;

        let mut decoder_ids = vec![self.decoder_start_token_id];
        while decoder_ids.len() - 1 < params.max_length {
            let step_input = if decoder_ids.len() == 1 || !self.use_cache {
                Tensor::new(decoder_ids.as_slice(), &self.device)?.unsqueeze(0)?
            } else {
                Tensor::new(&decoder_ids[decoder_ids.len() - 1..], &self.device)?.unsqueeze(0)?
            };

            let logits = model
                .decode(&step_input, &encoder_output)?
                .squeeze(0)?
                .to_dtype(DType::F32)?
                .to_vec1::<f32>()?;

            let next = next_token(
                &logits,
                self.eos_token_id,
                decoder_ids.len() - 1,
                params.min_length,
            )
            .ok_or_else(|| Error::inference("decoder produced no usable logits"))?;
            if next == self.eos_token_id {
                break;
            }
            decoder_ids.push(next);
        }

        model.clear_kv_cache();
        drop(model);

        debug!(
            "Generated {} tokens from {} input tokens",
            decoder_ids.len() - 1,
            encoding.len()
        );

        decoder_ids.remove(0);
        Ok(decoder_ids)
    }
}

/// Greedy choice of the next token. End-of-sequence is withheld until
/// `min_length` tokens have been generated.
pub fn next_token(
    logits: &[f32],
    eos_token_id: u32,
    generated: usize,
    min_length: usize,
) -> Option<u32> {
    let allow_eos = generated >= min_length;

    logits
        .iter()
        .enumerate()
        .filter(|(id, logit)| !logit.is_nan() && (allow_eos || *id as u32 != eos_token_id))
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(id, _)| id as u32)
}
