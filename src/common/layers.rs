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

use serde::{Deserialize, Serialize};
use tch::kind::Kind::{Bool, Int64};
use tch::nn::ModuleT;
use tch::{Device, Tensor};

#[derive(Debug)]
pub struct Dropout {
    dropout_prob: f64,
}

impl Dropout {
    pub fn new(p: f64) -> Dropout {
        Dropout { dropout_prob: p }
    }
}

impl ModuleT for Dropout {
    fn forward_t(&self, input: &Tensor, train: bool) -> Tensor {
        input.dropout(self.dropout_prob, train)
    }
}

#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
/// # Activation function used in the feed-forward blocks
pub enum Activation {
    /// Gaussian Error Linear Unit ([Hendrycks et al., 2016,](https://arxiv.org/abs/1606.08415))
    gelu,
    /// Rectified Linear Unit
    relu,
}

impl Activation {
    pub fn get_function(&self) -> fn(&Tensor) -> Tensor {
        match self {
            Activation::gelu => _gelu,
            Activation::relu => _relu,
        }
    }
}

pub fn _gelu(x: &Tensor) -> Tensor {
    x * 0.5 * (1.0 + (x / ((2.0_f64).sqrt())).erf())
}

pub fn _relu(x: &Tensor) -> Tensor {
    x.relu()
}

/// Boolean mask of shape (*batch size*, *sequence_length*), `true` where `input_ids` hold the padding index.
pub fn padding_mask(input_ids: &Tensor, pad_index: i64) -> Tensor {
    input_ids.eq(pad_index)
}

/// Boolean mask of shape (*sequence_length*, *sequence_length*), `true` above the diagonal (future positions).
pub fn causal_mask(sequence_length: i64, device: Device) -> Tensor {
    Tensor::ones([sequence_length, sequence_length], (Int64, device))
        .triu(1)
        .to_kind(Bool)
}
