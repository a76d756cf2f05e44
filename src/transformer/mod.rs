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

//! # Chat Transformer
//!
//! Encoder-decoder Transformer generating replies from styled encoder sequences.
//! The model is conditioned through its inputs only: the encoder sequence ends with a sentiment
//! control token and the decoder sequence starts with `<sos>` followed by a style marker.
//!
//! Any other sequence model can be plugged into training and inference by implementing
//! `Seq2SeqModel`.

mod attention;
mod transformer_model;

pub use attention::MultiHeadAttention;
pub use transformer_model::{
    sinusoidal_positions, ChatTransformer, DecoderLayer, EncoderLayer, Seq2SeqModel,
    TransformerConfig,
};
