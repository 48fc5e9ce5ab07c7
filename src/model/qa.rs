use super::{Answer, ModelStore, QuestionAnswerer, blocking, device, tokenizer, var_builder};
use crate::{Error, Result, config::QaConfig};
use async_trait::async_trait;
use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{Linear, VarBuilder};
use candle_transformers::models::bert::{self, BertModel};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokenizers::{Tokenizer, TruncationStrategy};
use tracing::{debug, info};

/// A token range `[start, end]` (inclusive) and its joint probability.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub score: f32,
}

/// Extractive question answering with a BERT encoder and a start/end span head.
pub struct BertQuestionAnswerer {
    model_id: String,
    inner: Arc<BertQaModel>,
}

struct BertQaModel {
    bert: BertModel,
    qa_outputs: Linear,
    tokenizer: Tokenizer,
    // Same vocabulary without truncation, for measuring questions.
    question_tokenizer: Tokenizer,
    device: Device,
    max_question_len: usize,
    max_answer_len: usize,
}

impl BertQuestionAnswerer {
    pub async fn load(store: &ModelStore, config: &QaConfig) -> Result<Self> {
        let files = store.resolve(&config.source).await?;
        let config = config.clone();
        let model_id = config.source.model_id.clone();

        let inner = blocking(move || {
            let device = device()?;
            let raw: Value = serde_json::from_str(&std::fs::read_to_string(&files.config)?)?;
            let vb = var_builder(&files.weights, bert::DTYPE, &device)?;
            let tokenizer = tokenizer::load(&files.tokenizer, config.do_lower_case)?;
            BertQaModel::build(vb, raw, tokenizer, device, &config)
        })
        .await?;

        info!("BERT QA model ({}) loaded successfully", model_id);

        Ok(Self {
            model_id,
            inner: Arc::new(inner),
        })
    }
}

#[async_trait]
impl QuestionAnswerer for BertQuestionAnswerer {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn answer(&self, question: &str, context: &str) -> Result<Answer> {
        let inner = Arc::clone(&self.inner);
        let question = question.to_string();
        let context = context.to_string();
        blocking(move || inner.answer(&question, &context)).await
    }
}

impl BertQaModel {
    /// Assembles the encoder and span head from `vb` using the checkpoint's
    /// raw `config.json`.
    fn build(
        vb: VarBuilder,
        raw_config: Value,
        tokenizer: Tokenizer,
        device: Device,
        config: &QaConfig,
    ) -> Result<Self> {
        let raw = with_bert_defaults(raw_config);
        let dims: EncoderDims = serde_json::from_value(raw.clone())?;
        let bert_config: bert::Config = serde_json::from_value(raw)?;

        // Fine-tuned QA checkpoints nest the encoder under `bert.`.
        let bert = BertModel::load(vb.pp("bert"), &bert_config)
            .or_else(|_| BertModel::load(vb.clone(), &bert_config))
            .map_err(|e| Error::model(format!("cannot load BERT encoder: {}", e)))?;
        let qa_outputs = candle_nn::linear(dims.hidden_size, 2, vb.pp("qa_outputs"))
            .map_err(|e| {
                Error::model(format!(
                    "checkpoint has no question-answering head (qa_outputs): {}",
                    e
                ))
            })?;

        let max_len = config.max_seq_len.min(dims.max_position_embeddings);
        if max_len <= PAIR_OVERHEAD {
            return Err(Error::config(format!(
                "qa.max_seq_len must be above {}",
                PAIR_OVERHEAD
            )));
        }
        let question_tokenizer = tokenizer.clone();
        let mut tokenizer = tokenizer;
        tokenizer::truncate(&mut tokenizer, max_len, TruncationStrategy::OnlySecond)?;

        Ok(Self {
            bert,
            qa_outputs,
            tokenizer,
            question_tokenizer,
            device,
            max_question_len: max_len - PAIR_OVERHEAD,
            max_answer_len: config.max_answer_len,
        })
    }

    fn answer(&self, question: &str, context: &str) -> Result<Answer> {
        // Only the context is truncated, so the question must leave room for it.
        let question_len = self.question_tokenizer.encode(question, false)?.len();
        if question_len > self.max_question_len {
            return Err(Error::validation(format!(
                "question is too long: {} tokens, at most {} allowed",
                question_len, self.max_question_len
            )));
        }

        let encoding = self.tokenizer.encode((question, context), true)?;

        let input_ids = Tensor::new(encoding.get_ids(), &self.device)?.unsqueeze(0)?;
        let token_type_ids = Tensor::new(encoding.get_type_ids(), &self.device)?.unsqueeze(0)?;

        let hidden = self.bert.forward(&input_ids, &token_type_ids, None)?;
        let logits = self
            .qa_outputs
            .forward(&hidden)?
            .squeeze(0)?
            .to_dtype(DType::F32)?
            .to_vec2::<f32>()?;
        let (start_logits, end_logits): (Vec<f32>, Vec<f32>) =
            logits.iter().map(|row| (row[0], row[1])).unzip();

        // Only context tokens may begin or end an answer.
        let candidates: Vec<bool> = encoding
            .get_sequence_ids()
            .iter()
            .zip(encoding.get_special_tokens_mask())
            .map(|(sequence, special)| *sequence == Some(1) && *special == 0)
            .collect();

        let span = best_span(
            &masked_softmax(&start_logits, &candidates),
            &masked_softmax(&end_logits, &candidates),
            &candidates,
            self.max_answer_len,
        )
        .ok_or_else(|| Error::inference("context produced no candidate answer span"))?;

        let offsets = encoding.get_offsets();
        let (begin, _) = offsets[span.start];
        let (_, finish) = offsets[span.end];
        debug!(
            "Span [{}, {}] -> bytes [{}, {}) score={:.4}",
            span.start, span.end, begin, finish, span.score
        );

        let text = context
            .get(begin..finish)
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .ok_or_else(|| Error::inference("model selected an empty answer"))?;

        Ok(Answer {
            text: text.to_string(),
            score: span.score,
        })
    }
}

/// `[CLS]` and two `[SEP]` tokens, plus at least one context token.
const PAIR_OVERHEAD: usize = 4;

#[derive(Deserialize)]
struct EncoderDims {
    hidden_size: usize,
    max_position_embeddings: usize,
}

/// Fills keys that older BERT `config.json` files omit with the values
/// `transformers` assumes for them.
pub fn with_bert_defaults(mut config: Value) -> Value {
    if let Some(map) = config.as_object_mut() {
        let defaults = [
            ("hidden_act", Value::from("gelu")),
            ("hidden_dropout_prob", Value::from(0.1)),
            ("initializer_range", Value::from(0.02)),
            ("layer_norm_eps", Value::from(1e-12)),
            ("max_position_embeddings", Value::from(512)),
            ("pad_token_id", Value::from(0)),
            ("type_vocab_size", Value::from(2)),
        ];
        for (key, value) in defaults {
            map.entry(key).or_insert(value);
        }
    }
    config
}

/// Softmax over the positions where `mask` is set; masked positions get 0.
pub fn masked_softmax(logits: &[f32], mask: &[bool]) -> Vec<f32> {
    let max = logits
        .iter()
        .zip(mask)
        .filter(|(_, keep)| **keep)
        .map(|(logit, _)| *logit)
        .fold(f32::NEG_INFINITY, f32::max);

    let exps: Vec<f32> = logits
        .iter()
        .zip(mask)
        .map(|(logit, keep)| if *keep { (logit - max).exp() } else { 0.0 })
        .collect();
    let sum: f32 = exps.iter().sum();

    if sum > 0.0 {
        exps.into_iter().map(|e| e / sum).collect()
    } else {
        exps
    }
}

/// Finds the span maximizing `start_probs[s] * end_probs[e]` with both ends on
/// candidate positions, `s <= e` and at most `max_answer_len` tokens.
pub fn best_span(
    start_probs: &[f32],
    end_probs: &[f32],
    candidates: &[bool],
    max_answer_len: usize,
) -> Option<Span> {
    let len = start_probs.len().min(end_probs.len()).min(candidates.len());
    let mut best: Option<Span> = None;

    for start in (0..len).filter(|&s| candidates[s]) {
        let last = (start + max_answer_len).min(len);
        for end in (start..last).filter(|&e| candidates[e]) {
            let score = start_probs[start] * end_probs[end];
            if best.is_none_or(|b| score > b.score) {
                best = Some(Span { start, end, score });
            }
        }
    }

    best
}
