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

use crate::common::Dropout;
use std::borrow::Borrow;
use tch::kind::Kind::Float;
use tch::{nn, Tensor};

/// Large negative score given to masked positions. Finite so that rows with every key masked
/// produce a uniform distribution instead of NaNs.
const MASKED_SCORE: f64 = -1e9;

#[derive(Debug)]
/// # Batch-first multi-head attention
/// Used for encoder self-attention, causal decoder self-attention and encoder-decoder attention.
pub struct MultiHeadAttention {
    num_heads: i64,
    head_dim: i64,
    scaling: f64,
    dropout: Dropout,
    q_proj: nn::Linear,
    k_proj: nn::Linear,
    v_proj: nn::Linear,
    out_proj: nn::Linear,
}

impl MultiHeadAttention {
    pub fn new<'p, P>(p: P, embed_dim: i64, num_heads: i64, dropout: f64) -> MultiHeadAttention
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow();
        let k_proj = nn::linear(p / "k_proj", embed_dim, embed_dim, Default::default());
        let v_proj = nn::linear(p / "v_proj", embed_dim, embed_dim, Default::default());
        let q_proj = nn::linear(p / "q_proj", embed_dim, embed_dim, Default::default());
        let out_proj = nn::linear(p / "out_proj", embed_dim, embed_dim, Default::default());

        let head_dim = embed_dim / num_heads;
        MultiHeadAttention {
            num_heads,
            head_dim,
            scaling: (head_dim as f64).powf(-0.5),
            dropout: Dropout::new(dropout),
            q_proj,
            k_proj,
            v_proj,
            out_proj,
        }
    }

    fn split_heads(&self, x: Tensor, bs: i64) -> Tensor {
        x.view((bs, -1, self.num_heads, self.head_dim)).transpose(1, 2)
    }

    /// Forward pass through the attention layer
    ///
    /// # Arguments
    ///
    /// * `query` - tensor of shape (*batch size*, *target_sequence_length*, *embed_dim*)
    /// * `key_value` - tensor of shape (*batch size*, *source_sequence_length*, *embed_dim*), equal to `query` for self-attention
    /// * `key_padding_mask` - optional boolean mask of shape (*batch size*, *source_sequence_length*), `true` for keys to ignore
    /// * `attention_mask` - optional boolean mask of shape (*target_sequence_length*, *source_sequence_length*), `true` for blocked pairs
    /// * `train` - boolean flag to turn on/off the dropout layers
    pub fn forward_t(
        &self,
        query: &Tensor,
        key_value: &Tensor,
        key_padding_mask: Option<&Tensor>,
        attention_mask: Option<&Tensor>,
        train: bool,
    ) -> Tensor {
        let bs = query.size()[0];
        let q = self.split_heads(query.apply(&self.q_proj) * self.scaling, bs);
        let k = self.split_heads(key_value.apply(&self.k_proj), bs);
        let v = self.split_heads(key_value.apply(&self.v_proj), bs);

        let mut scores = q.matmul(&k.transpose(-1, -2));
        if let Some(mask) = attention_mask {
            scores = scores.masked_fill(mask, MASKED_SCORE);
        }
        if let Some(mask) = key_padding_mask {
            scores = scores.masked_fill(&mask.unsqueeze(1).unsqueeze(2), MASKED_SCORE);
        }

        scores
            .softmax(-1, Float)
            .apply_t(&self.dropout, train)
            .matmul(&v)
            .transpose(1, 2)
            .contiguous()
            .view((bs, -1, self.num_heads * self.head_dim))
            .apply(&self.out_proj)
    }
}
