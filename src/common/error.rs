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

use rust_tokenizers::error::TokenizerError;
use tch::TchError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatbotError {
    #[error("IO error: {0}")]
    IOError(String),

    #[error("Tch tensor error: {0}")]
    TchError(String),

    #[error("Tokenizer error: {0}")]
    TokenizerError(String),

    #[error("Invalid configuration error: {0}")]
    InvalidConfigurationError(String),

    #[error("Value error: {0}")]
    ValueError(String),

    #[error("Token id {0} is outside of the vocabulary")]
    OutOfVocabulary(i64),

    #[error("Dataset error: {0}")]
    DatasetError(String),

    #[error("Non-finite training loss at epoch {epoch}, step {step}")]
    NonFiniteLoss { epoch: usize, step: usize },
}

impl From<std::io::Error> for ChatbotError {
    fn from(error: std::io::Error) -> Self {
        ChatbotError::IOError(error.to_string())
    }
}

impl From<TokenizerError> for ChatbotError {
    fn from(error: TokenizerError) -> Self {
        ChatbotError::TokenizerError(error.to_string())
    }
}

impl From<TchError> for ChatbotError {
    fn from(error: TchError) -> Self {
        ChatbotError::TchError(error.to_string())
    }
}

impl From<csv::Error> for ChatbotError {
    fn from(error: csv::Error) -> Self {
        ChatbotError::DatasetError(error.to_string())
    }
}

impl From<serde_json::Error> for ChatbotError {
    fn from(error: serde_json::Error) -> Self {
        ChatbotError::InvalidConfigurationError(error.to_string())
    }
}
