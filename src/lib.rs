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

//! # Sentiment and speech-style conditioned Korean chatbot
//!
//! Sequence-to-sequence chatbot whose replies are conditioned on the sentiment of the input
//! sentence and on a speech style (formality register). Built on
//! [tch-rs](https://github.com/LaurentMazare/tch-rs) for the tensor operations and
//! [rust-tokenizers](https://github.com/guillaume-be/rust-tokenizers) for the vocabularies and
//! the SentencePiece tokenization used by the KoBERT sentiment classifier.
//!
//! The crate is organized as follows:
//! - `vocab` and `tokenization`: token <-> index mappings and text tokenizers
//! - `kobert`: BERT encoder with a classification head, used frozen for sentiment analysis
//! - `styling`: injection of the sentiment control token into encoder sequences and of the
//!   style marker into decoder sequences
//! - `transformer`: encoder-decoder model producing next-token logits
//! - `data`: `Q,A,label` CSV dataset and batching
//! - `training`: teacher-forced training with masked loss, warm-up schedule and best-model checkpoints
//! - `pipelines`: sentiment analysis, greedy reply generation and the interactive console
//!
//! # Quick start
//!
//! ```no_run
//! # fn main() -> anyhow::Result<()> {
//! use ko_chatbot::data::{Batcher, ChatDataset};
//! use ko_chatbot::styling::Styler;
//! use ko_chatbot::tokenization::WhitespaceTokenizer;
//! use ko_chatbot::training::{CheckpointManager, Trainer};
//! use ko_chatbot::transformer::{ChatTransformer, TransformerConfig};
//! use ko_chatbot::vocab::Vocab;
//! use ko_chatbot::{ChatbotConfig, Config};
//! use tch::{nn, Device};
//!
//! let config = ChatbotConfig::from_file("chatbot.json")?;
//! let dataset = ChatDataset::from_csv("chatbot_data.csv")?;
//! let (train, valid) = dataset.split(config.train_ratio, config.seed)?;
//!
//! let tokenizer = WhitespaceTokenizer;
//! let (questions, answers) = train.tokenized(&tokenizer);
//! let source_vocab = Vocab::build(&questions, 1, None)?;
//! let target_vocab = Vocab::build(&answers, 1, None)?;
//!
//! let device = Device::cuda_if_available();
//! let vs = nn::VarStore::new(device);
//! let model_config = TransformerConfig::from_chatbot_config(
//!     &config,
//!     source_vocab.len() as i64,
//!     target_vocab.len() as i64,
//!     source_vocab.pad_index(),
//!     target_vocab.pad_index(),
//! );
//! let model = ChatTransformer::new(vs.root(), &model_config)?;
//!
//! let styler = Styler::new(&source_vocab, &target_vocab, config.max_len)?;
//! let train = Batcher::new(&train, &tokenizer, &source_vocab, &target_vocab, config.max_len, device)?;
//! let valid = Batcher::new(&valid, &tokenizer, &source_vocab, &target_vocab, config.max_len, device)?;
//! let mut trainer = Trainer::new(&config, &styler, &target_vocab, CheckpointManager::new("model"))?;
//! let reports = trainer.fit(&model, &vs, &train, &valid)?;
//! # Ok(())
//! # }
//! ```

pub mod common;
mod config;
pub mod data;
pub mod kobert;
pub mod pipelines;
pub mod styling;
pub mod tokenization;
pub mod training;
pub mod transformer;
pub mod vocab;

pub use common::error::ChatbotError;
pub use common::Config;
pub use config::ChatbotConfig;
