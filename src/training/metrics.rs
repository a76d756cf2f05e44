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

use tch::kind::Kind::{Float, Int64};
use tch::{Device, Tensor};

fn flatten(logits: &Tensor, targets: &Tensor) -> (Tensor, Tensor) {
    let vocab_size = logits.size().last().copied().unwrap_or(0);
    (logits.reshape([-1, vocab_size]), targets.reshape([-1]))
}

/// Cross-entropy restricted to the non-padding target positions.
///
/// # Arguments
///
/// * `logits` - scores of shape (*batch size*, *sequence_length*, *vocab_size*) or (*positions*, *vocab_size*)
/// * `targets` - target indices of shape (*batch size*, *sequence_length*) or (*positions*)
/// * `pad_index` - positions holding this index do not contribute to the loss
///
/// # Returns
///
/// * Scalar loss tensor (zero when every position is padding)
pub fn masked_cross_entropy(logits: &Tensor, targets: &Tensor, pad_index: i64) -> Tensor {
    let (logits, targets) = flatten(logits, targets);
    let positions = targets.ne(pad_index).nonzero().squeeze_dim(1);
    if positions.size()[0] == 0 {
        return logits.sum(Float) * 0.0;
    }
    logits
        .index_select(0, &positions)
        .cross_entropy_for_logits(&targets.index_select(0, &positions).to_kind(Int64))
}

/// Share of non-padding target positions where the arg-max prediction equals the target.
/// Returns 0 when every position is padding.
pub fn token_accuracy(logits: &Tensor, targets: &Tensor, pad_index: i64) -> f64 {
    let (logits, targets) = flatten(logits, targets);
    let mask = targets.ne(pad_index);
    let total = mask.sum(Float).to_device(Device::Cpu).double_value(&[]);
    if total == 0.0 {
        return 0.0;
    }
    let correct = logits
        .argmax(-1, false)
        .eq_tensor(&targets)
        .logical_and(&mask)
        .sum(Float)
        .to_device(Device::Cpu)
        .double_value(&[]);
    correct / total
}
