use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tokenizers::models::wordpiece::WordPiece;
use tokenizers::normalizers::bert::BertNormalizer;
use tokenizers::pre_tokenizers::bert::BertPreTokenizer;
use tokenizers::processors::bert::BertProcessing;
use tokenizers::{
    NormalizerWrapper, PostProcessorWrapper, PreTokenizerWrapper, Tokenizer, TruncationParams,
    TruncationStrategy,
};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenizerFile {
    /// A serialized `tokenizer.json`.
    Json(PathBuf),
    /// A BERT `vocab.txt`, one WordPiece token per line.
    WordPieceVocab(PathBuf),
}

pub fn load(file: &TokenizerFile, do_lower_case: bool) -> Result<Tokenizer> {
    match file {
        TokenizerFile::Json(path) => {
            debug!("Loading tokenizer from {}", path.display());
            Ok(Tokenizer::from_file(path)?)
        }
        TokenizerFile::WordPieceVocab(path) => wordpiece_from_vocab(path, do_lower_case),
    }
}

/// Caps encodings at `max_length` tokens, cutting from the second sequence
/// of a pair first when `strategy` is `OnlySecond`.
pub fn truncate(
    tokenizer: &mut Tokenizer,
    max_length: usize,
    strategy: TruncationStrategy,
) -> Result<()> {
    tokenizer.with_truncation(Some(TruncationParams {
        max_length,
        strategy,
        ..Default::default()
    }))?;
    Ok(())
}

fn wordpiece_from_vocab(vocab: &Path, do_lower_case: bool) -> Result<Tokenizer> {
    debug!(
        "Building WordPiece tokenizer from {} (lowercase: {})",
        vocab.display(),
        do_lower_case
    );

    let vocab_path = vocab
        .to_str()
        .ok_or_else(|| Error::tokenizer(format!("non UTF-8 path: {}", vocab.display())))?;
    let model = WordPiece::from_file(vocab_path)
        .unk_token("[UNK]".to_string())
        .build()?;

    let cls = special_token_id(&model, "[CLS]")?;
    let sep = special_token_id(&model, "[SEP]")?;

    let mut tokenizer = Tokenizer::new(model);
    tokenizer
        .with_normalizer(Some(NormalizerWrapper::BertNormalizer(
            BertNormalizer::new(true, true, None, do_lower_case),
        )))
        .with_pre_tokenizer(Some(PreTokenizerWrapper::BertPreTokenizer(BertPreTokenizer)))
        .with_post_processor(Some(PostProcessorWrapper::Bert(BertProcessing::new(
            ("[SEP]".to_string(), sep),
            ("[CLS]".to_string(), cls),
        ))));

    Ok(tokenizer)
}

fn special_token_id(model: &WordPiece, token: &str) -> Result<u32> {
    use tokenizers::Model;

    model
        .token_to_id(token)
        .ok_or_else(|| Error::tokenizer(format!("vocabulary has no {} token", token)))
}
