extern crate anyhow;
extern crate tempfile;

use ko_chatbot::kobert::{BertConfig, KoBertClassifier};
use ko_chatbot::pipelines::sentiment::{KoBertSentimentClassifier, SentimentClassifier};
use rust_tokenizers::tokenizer::BertTokenizer;
use std::convert::TryFrom;
use std::fs;
use tch::kind::Kind::Int64;
use tch::{nn, Device, Tensor};
use tempfile::TempDir;

const VOCAB: &str = "[PAD]\n[UNK]\n[CLS]\n[SEP]\n[MASK]\nhello\nworld\ngood\nday\n";

fn tiny_config() -> BertConfig {
    BertConfig {
        hidden_size: 8,
        intermediate_size: 16,
        num_attention_heads: 2,
        num_hidden_layers: 1,
        vocab_size: 9,
        max_position_embeddings: 16,
        pad_token_id: Some(0),
        ..Default::default()
    }
}

fn tokenizer(dir: &TempDir) -> anyhow::Result<BertTokenizer> {
    let path = dir.path().join("vocab.txt");
    fs::write(&path, VOCAB)?;
    Ok(BertTokenizer::from_file(&path, false, false)?)
}

#[test]
fn classifier_returns_one_logit_row_per_sentence() -> anyhow::Result<()> {
    let vs = nn::VarStore::new(Device::Cpu);
    let classifier = KoBertClassifier::new(vs.root(), &tiny_config())?;
    let input_ids = Tensor::from_slice(&[2i64, 5, 6, 3, 0, 2, 7, 8, 3, 0]).view([2, 5]);
    let attention_mask = input_ids.ne(0).to_kind(Int64);
    let token_type_ids = input_ids.zeros_like();

    let logits = classifier.forward_t(&input_ids, &attention_mask, &token_type_ids, false);
    assert_eq!(logits.size(), vec![2, 2]);
    Ok(())
}

#[test]
fn inputs_are_wrapped_truncated_and_padded() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let classifier = KoBertSentimentClassifier::from_tokenizer(
        tokenizer(&dir)?,
        &tiny_config(),
        None,
        6,
        Device::Cpu,
    )?;

    let (input_ids, attention_mask) =
        classifier.prepare_for_model(&["hello world", "hello world good day hello world good"]);
    assert_eq!(input_ids.size(), vec![2, 6]);
    assert_eq!(attention_mask.size(), vec![2, 6]);

    //    [CLS] hello world [SEP] [PAD] [PAD]
    let short = Vec::<i64>::try_from(&input_ids.get(0))?;
    assert_eq!(short, vec![2, 5, 6, 3, 0, 0]);
    assert_eq!(Vec::<i64>::try_from(&attention_mask.get(0))?, vec![1, 1, 1, 1, 0, 0]);

    //    Over-long input keeps max_len - 2 pieces between [CLS] and [SEP]
    let long = Vec::<i64>::try_from(&input_ids.get(1))?;
    assert_eq!(long, vec![2, 5, 6, 7, 8, 3]);
    assert_eq!(Vec::<i64>::try_from(&attention_mask.get(1))?, vec![1; 6]);
    Ok(())
}

#[test]
fn predict_returns_one_label_per_sentence() -> anyhow::Result<()> {
    tch::manual_seed(3);
    let dir = tempfile::tempdir()?;
    let classifier = KoBertSentimentClassifier::from_tokenizer(
        tokenizer(&dir)?,
        &tiny_config(),
        None,
        8,
        Device::Cpu,
    )?;

    let sentences = ["hello world", "good day", "hello"];
    let first = classifier.predict(&sentences)?;
    assert_eq!(first.len(), sentences.len());
    assert_eq!(classifier.predict(&sentences)?, first);
    assert!(classifier.predict(&[])?.is_empty());
    Ok(())
}

#[test]
fn classifier_needs_room_for_special_tokens() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let classifier = KoBertSentimentClassifier::from_tokenizer(
        tokenizer(&dir)?,
        &tiny_config(),
        None,
        2,
        Device::Cpu,
    );
    assert!(classifier.is_err());
    Ok(())
}
