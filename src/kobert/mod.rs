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

//! # KoBERT sentiment classifier
//!
//! BERT encoder ([https://arxiv.org/abs/1810.04805](https://arxiv.org/abs/1810.04805) Devlin, Chang, Lee, Toutanova, 2018)
//! with the Korean vocabulary released by SKT Brain, topped by a binary classification head trained for
//! sentiment analysis. The chatbot only uses it frozen, as a feature extractor deciding between the
//! `<nega>` and `<posi>` control tokens.
//!
//! Parameter names follow the PyTorch state dict of the SKT Brain sentiment classifier (`bert.embeddings...`,
//! `bert.encoder.layer.{i}...`, `classifier`), so that weights converted to the `.ot` format load directly
//! into a `VarStore`.
//!
//! ```no_run
//! # fn main() -> anyhow::Result<()> {
//! use ko_chatbot::kobert::{BertConfig, KoBertClassifier};
//! use ko_chatbot::Config;
//! use tch::{nn, Device};
//!
//! let mut vs = nn::VarStore::new(Device::cuda_if_available());
//! let config = BertConfig::from_file("path/to/config.json")?;
//! let classifier = KoBertClassifier::new(vs.root(), &config)?;
//! vs.load("path/to/bert_SA-model.ot")?;
//! vs.freeze();
//! # Ok(())
//! # }
//! ```

mod bert_model;

pub use bert_model::{BertConfig, BertEmbeddings, BertLayer, BertModel, KoBertClassifier};
