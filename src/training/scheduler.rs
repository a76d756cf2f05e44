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
use tch::nn::Optimizer;

/// # Gradual warm-up learning rate schedule
/// Epoch `e` (0-based) of the warm-up phase runs at `base_lr * ((multiplier - 1) * e / warmup_epochs + 1)`,
/// reaching `base_lr * multiplier` at the last warm-up epoch. Later epochs decay as
/// `peak * sqrt(warmup_epochs / e)`. Without warm-up epochs the base rate is used throughout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradualWarmupScheduler {
    base_lr: f64,
    multiplier: f64,
    warmup_epochs: usize,
}

impl GradualWarmupScheduler {
    pub fn new(
        base_lr: f64,
        multiplier: f64,
        warmup_epochs: usize,
    ) -> Result<GradualWarmupScheduler, ChatbotError> {
        if multiplier < 1.0 {
            return Err(ChatbotError::InvalidConfigurationError(format!(
                "warm-up multiplier should be greater than or equal to 1, got {}",
                multiplier
            )));
        }
        Ok(GradualWarmupScheduler {
            base_lr,
            multiplier,
            warmup_epochs,
        })
    }

    pub fn peak_lr(&self) -> f64 {
        self.base_lr * self.multiplier
    }

    pub fn lr(&self, epoch: usize) -> f64 {
        if self.warmup_epochs == 0 {
            return self.base_lr;
        }
        let warmup = self.warmup_epochs as f64;
        let epoch_f = epoch as f64;
        if epoch <= self.warmup_epochs {
            self.base_lr * ((self.multiplier - 1.0) * epoch_f / warmup + 1.0)
        } else {
            self.peak_lr() * (warmup / epoch_f).sqrt()
        }
    }

    /// Sets the learning rate of `optimizer` for `epoch` and returns it.
    pub fn step(&self, optimizer: &mut Optimizer, epoch: usize) -> f64 {
        let lr = self.lr(epoch);
        optimizer.set_lr(lr);
        lr
    }
}
