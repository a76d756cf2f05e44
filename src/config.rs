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

use crate::common::error::ChatbotError;
use crate::Config;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
/// # Chatbot hyperparameters
/// Fields missing from a JSON configuration file take their default value.
pub struct ChatbotConfig {
    /// Length of every encoder / decoder sequence
    pub max_len: usize,
    pub batch_size: usize,
    pub num_epochs: usize,
    /// Number of epochs over which the learning rate ramps up
    pub warming_up_epochs: usize,
    /// Base learning rate
    pub lr: f64,
    pub embedding_dim: i64,
    pub nlayers: i64,
    pub nhead: i64,
    pub dropout: f64,
    /// Run the training loop before inference
    pub train: bool,
    /// Peak learning rate, as a multiple of `lr`, reached at the end of the warm-up
    pub warmup_multiplier: f64,
    pub seed: i64,
    /// A sample prediction is logged every `sample_every` training steps, 0 disables it
    pub sample_every: usize,
    /// Share of the dataset used for training. The held-out rest is both the validation set and the
    /// final test set
    pub train_ratio: f64,
    /// Number of pieces, `[CLS]` and `[SEP]` included, seen by the sentiment classifier
    pub classifier_max_len: usize,
}

impl Default for ChatbotConfig {
    fn default() -> Self {
        ChatbotConfig {
            max_len: 64,
            batch_size: 128,
            num_epochs: 20,
            warming_up_epochs: 5,
            lr: 2e-4,
            embedding_dim: 160,
            nlayers: 2,
            nhead: 2,
            dropout: 0.1,
            train: true,
            warmup_multiplier: 8.0,
            seed: 1234,
            sample_every: 100,
            train_ratio: 0.8,
            classifier_max_len: 64,
        }
    }
}

impl Config for ChatbotConfig {}

impl ChatbotConfig {
    /// Checks the hyperparameters for values no component can work with.
    pub fn validate(&self) -> Result<(), ChatbotError> {
        let invalid = |message: String| Err(ChatbotError::InvalidConfigurationError(message));
        if self.max_len < 2 {
            return invalid(format!("max_len must be at least 2, got {}", self.max_len));
        }
        if self.batch_size == 0 {
            return invalid("batch_size must be positive".to_string());
        }
        if !(self.lr > 0.0) {
            return invalid(format!("lr must be positive, got {}", self.lr));
        }
        if self.warmup_multiplier < 1.0 {
            return invalid(format!(
                "warmup_multiplier must be at least 1, got {}",
                self.warmup_multiplier
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return invalid(format!("dropout must be in [0, 1), got {}", self.dropout));
        }
        if !(self.train_ratio > 0.0 && self.train_ratio < 1.0) {
            return invalid(format!(
                "train_ratio must be in (0, 1), got {}",
                self.train_ratio
            ));
        }
        if self.nhead <= 0 || self.embedding_dim % self.nhead != 0 {
            return invalid(format!(
                "embedding_dim ({}) must be a multiple of nhead ({})",
                self.embedding_dim, self.nhead
            ));
        }
        Ok(())
    }
}
