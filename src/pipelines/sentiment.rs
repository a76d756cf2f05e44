// Copyright 2021 The ko-chatbot Authors
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Sentiment pipeline
//! Binary sentiment of free-text Korean sentences, computed by a frozen KoBERT classifier.
//!
//! ```no_run
//! # fn main() -> anyhow::Result<()> {
//! use ko_chatbot::pipelines::sentiment::{KoBertSentimentClassifier, SentimentClassifier, SentimentResources};
//! use tch::Device;
//!
//! let resources = SentimentResources {
//!     config: "kobert/config.json".into(),
//!     weights: "kobert/bert_SA-model.ot".into(),
//!     vocab: "kobert/vocab.txt".into(),
//!     sentencepiece_model: "kobert/tokenizer.model".into(),
//! };
//! let classifier = KoBertSentimentClassifier::new(&resources, 64, Device::Cpu)?;
//! let output = classifier.predict(&["오늘 정말 행복해"])?;
//! # Ok(())
//! # }
//! ```

use crate::common::error::ChatbotError;
use crate::kobert::{BertConfig, KoBertClassifier};
use crate::tokenization::KoBertTokenizer;
use crate::vocab::{NEGATIVE_TOKEN, POSITIVE_TOKEN};
use crate::Config;
use rust_tokenizers::tokenizer::{Tokenizer, TruncationStrategy};
use rust_tokenizers::vocab::{BertVocab, Vocab};
use rust_tokenizers::TokenizedInput;
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::path::{Path, PathBuf};
use tch::kind::Kind::Int64;
use tch::nn::VarStore;
use tch::{no_grad, Device, Tensor};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// # Sentiment label of a sentence
pub enum Sentiment {
    Negative,
    Positive,
}

impl Sentiment {
    pub const ALL: [Sentiment; 2] = [Sentiment::Negative, Sentiment::Positive];

    /// Converts a dataset / classifier label (0 = negative, 1 = positive).
    pub fn from_label(label: i64) -> Result<Sentiment, ChatbotError> {
        match label {
            0 => Ok(Sentiment::Negative),
            1 => Ok(Sentiment::Positive),
            _ => Err(ChatbotError::ValueError(format!(
                "sentiment label must be 0 or 1, got {}",
                label
            ))),
        }
    }

    pub fn label(&self) -> i64 {
        match self {
            Sentiment::Negative => 0,
            Sentiment::Positive => 1,
        }
    }

    pub fn short_name(&self) -> &'static str {
        match self {
            Sentiment::Negative => "nega",
            Sentiment::Positive => "posi",
        }
    }

    /// Encoder control token for this sentiment.
    pub fn control_token(&self) -> &'static str {
        match self {
            Sentiment::Negative => NEGATIVE_TOKEN,
            Sentiment::Positive => POSITIVE_TOKEN,
        }
    }

    /// Label shown in the console.
    pub fn display_name(&self) -> &'static str {
        match self {
            Sentiment::Negative => "부정",
            Sentiment::Positive => "긍정",
        }
    }
}

/// # Sentence-level sentiment classifier
/// Implementations must not update their parameters when predicting.
pub trait SentimentClassifier {
    fn predict(&self, input: &[&str]) -> Result<Vec<Sentiment>, ChatbotError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// # Files required by the KoBERT sentiment classifier
pub struct SentimentResources {
    /// `BertConfig` JSON file
    pub config: PathBuf,
    /// Classifier weights converted to the `.ot` format
    pub weights: PathBuf,
    /// KoBERT vocabulary, one token per line
    pub vocab: PathBuf,
    /// SentencePiece model used to split sentences into KoBERT pieces
    pub sentencepiece_model: PathBuf,
}

/// # Frozen KoBERT sentiment classifier
/// Generic over the BERT-style tokenizer building its inputs, `KoBertTokenizer` by default.
pub struct KoBertSentimentClassifier<T = KoBertTokenizer>
where
    T: Tokenizer<BertVocab>,
{
    tokenizer: T,
    classifier: KoBertClassifier,
    var_store: VarStore,
    max_len: usize,
    pad_index: i64,
}

impl KoBertSentimentClassifier<KoBertTokenizer> {
    /// Loads the classifier weights (read-only) and freezes them.
    ///
    /// # Arguments
    ///
    /// * `resources` - configuration, weights, vocabulary and tokenizer files
    /// * `max_len` - sentences are truncated / padded to this number of pieces, `[CLS]` and `[SEP]` included
    /// * `device` - device to run the classifier on
    pub fn new(
        resources: &SentimentResources,
        max_len: usize,
        device: Device,
    ) -> Result<KoBertSentimentClassifier, ChatbotError> {
        let config = BertConfig::from_file(&resources.config)?;
        let tokenizer =
            KoBertTokenizer::from_files(&resources.sentencepiece_model, &resources.vocab)?;
        KoBertSentimentClassifier::from_tokenizer(
            tokenizer,
            &config,
            Some(resources.weights.as_path()),
            max_len,
            device,
        )
    }
}

impl<T: Tokenizer<BertVocab>> KoBertSentimentClassifier<T> {
    /// Builds a classifier around an existing tokenizer. Parameters are loaded from `weights` when
    /// provided, and frozen in every case.
    pub fn from_tokenizer(
        tokenizer: T,
        config: &BertConfig,
        weights: Option<&Path>,
        max_len: usize,
        device: Device,
    ) -> Result<KoBertSentimentClassifier<T>, ChatbotError> {
        if max_len < 3 {
            return Err(ChatbotError::InvalidConfigurationError(format!(
                "classifier max_len must hold [CLS], [SEP] and one piece, got {}",
                max_len
            )));
        }
        let mut var_store = VarStore::new(device);
        let classifier = KoBertClassifier::new(var_store.root(), config)?;
        if let Some(weights) = weights {
            var_store.load(weights)?;
        }
        var_store.freeze();
        let vocab = tokenizer.vocab();
        let pad_index = vocab.token_to_id(vocab.get_pad_value());
        Ok(KoBertSentimentClassifier {
            tokenizer,
            classifier,
            var_store,
            max_len,
            pad_index,
        })
    }

    /// Token ids and attention mask of shape (*batch size*, *max_len*): `[CLS]`, at most
    /// `max_len - 2` pieces, `[SEP]`, then padding masked out.
    pub fn prepare_for_model(&self, input: &[&str]) -> (Tensor, Tensor) {
        let tokenized_input: Vec<TokenizedInput> = self.tokenizer.encode_list(
            input,
            self.max_len,
            &TruncationStrategy::LongestFirst,
            0,
        );
        let mut token_ids = Vec::with_capacity(input.len() * self.max_len);
        let mut attention_mask = Vec::with_capacity(input.len() * self.max_len);
        for encoded in tokenized_input {
            let valid_length = encoded.token_ids.len();
            token_ids.extend(encoded.token_ids);
            token_ids.extend(vec![self.pad_index; self.max_len - valid_length]);
            attention_mask.extend((0..self.max_len).map(|position| (position < valid_length) as i64));
        }
        let shape = [input.len() as i64, self.max_len as i64];
        let device = self.var_store.device();
        (
            Tensor::from_slice(&token_ids).view(shape).to(device),
            Tensor::from_slice(&attention_mask).view(shape).to(device),
        )
    }
}

impl<T: Tokenizer<BertVocab>> SentimentClassifier for KoBertSentimentClassifier<T> {
    fn predict(&self, input: &[&str]) -> Result<Vec<Sentiment>, ChatbotError> {
        if input.is_empty() {
            return Ok(Vec::new());
        }
        let (input_ids, attention_mask) = self.prepare_for_model(input);
        let token_type_ids = input_ids.zeros_like();
        let logits = no_grad(|| {
            self.classifier
                .forward_t(&input_ids, &attention_mask, &token_type_ids, false)
        });
        let labels = Vec::<i64>::try_from(&logits.argmax(-1, false).to_kind(Int64).to(Device::Cpu))?;
        labels.into_iter().map(Sentiment::from_label).collect()
    }
}
