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
use crate::config::ChatbotConfig;
use crate::data::{Batch, Batcher};
use crate::styling::{StyledBatch, Styler};
use crate::training::checkpoint::{CheckpointManager, CheckpointRecord};
use crate::training::metrics::{masked_cross_entropy, token_accuracy};
use crate::training::scheduler::GradualWarmupScheduler;
use crate::transformer::Seq2SeqModel;
use crate::vocab::Vocab;
use std::convert::TryFrom;
use std::time::{Duration, Instant};
use tch::nn::{Optimizer, OptimizerConfig, VarStore};
use tch::{nn, no_grad, Device, Tensor};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
/// # Mean loss and token accuracy over a set of batches
pub struct EvalMetrics {
    pub loss: f64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, PartialEq)]
/// # Summary of one training epoch
pub struct EpochReport {
    /// 1-based epoch number
    pub epoch: usize,
    pub elapsed: Duration,
    pub learning_rate: f64,
    pub train: EvalMetrics,
    pub valid: EvalMetrics,
    /// `true` if the model was checkpointed after this epoch
    pub saved: bool,
}

#[derive(Default)]
struct MetricsAccumulator {
    loss: f64,
    accuracy: f64,
    steps: usize,
}

impl MetricsAccumulator {
    fn add(&mut self, loss: f64, accuracy: f64) {
        self.loss += loss;
        self.accuracy += accuracy;
        self.steps += 1;
    }

    fn mean(&self) -> EvalMetrics {
        let steps = self.steps.max(1) as f64;
        EvalMetrics {
            loss: self.loss / steps,
            accuracy: self.accuracy / steps,
        }
    }
}

/// # Teacher-forced training loop
/// Every batch is styled, run through the model with the full decoder input, and scored against
/// the styled decoder labels with padding positions masked out.
pub struct Trainer<'a> {
    config: &'a ChatbotConfig,
    styler: &'a Styler,
    target_vocab: &'a Vocab,
    scheduler: GradualWarmupScheduler,
    checkpoint: CheckpointManager,
}

impl<'a> Trainer<'a> {
    pub fn new(
        config: &'a ChatbotConfig,
        styler: &'a Styler,
        target_vocab: &'a Vocab,
        checkpoint: CheckpointManager,
    ) -> Result<Trainer<'a>, ChatbotError> {
        let scheduler = GradualWarmupScheduler::new(
            config.lr,
            config.warmup_multiplier,
            config.warming_up_epochs,
        )?;
        Ok(Trainer {
            config,
            styler,
            target_vocab,
            scheduler,
            checkpoint,
        })
    }

    pub fn scheduler(&self) -> &GradualWarmupScheduler {
        &self.scheduler
    }

    pub fn checkpoint(&self) -> &CheckpointManager {
        &self.checkpoint
    }

    fn forward(
        &self,
        model: &dyn Seq2SeqModel,
        batch: &Batch,
        train: bool,
    ) -> Result<(StyledBatch, Tensor), ChatbotError> {
        let styled = self
            .styler
            .styling(&batch.enc_input, &batch.dec_input, &batch.sentiment)?;
        let logits = model.forward_t(&styled.enc_input, &styled.dec_input, train);
        Ok((styled, logits))
    }

    /// Runs one epoch of optimization over `batches`.
    ///
    /// # Arguments
    ///
    /// * `model` - model whose parameters are held by the optimizer
    /// * `optimizer` - optimizer, with the learning rate of this epoch already set
    /// * `batches` - training batches
    /// * `epoch` - 0-based epoch index, used in error reports and logs
    pub fn train_epoch(
        &self,
        model: &dyn Seq2SeqModel,
        optimizer: &mut Optimizer,
        batches: &[Batch],
        epoch: usize,
    ) -> Result<EvalMetrics, ChatbotError> {
        let pad_index = self.target_vocab.pad_index();
        let mut metrics = MetricsAccumulator::default();
        for (step, batch) in batches.iter().enumerate() {
            optimizer.zero_grad();
            let (styled, logits) = self.forward(model, batch, true)?;
            let loss = masked_cross_entropy(&logits, &styled.dec_output, pad_index);
            let loss_value = loss.to_device(Device::Cpu).double_value(&[]);
            if !loss_value.is_finite() {
                return Err(ChatbotError::NonFiniteLoss { epoch, step });
            }
            loss.backward();
            optimizer.step();

            let accuracy = no_grad(|| token_accuracy(&logits, &styled.dec_output, pad_index));
            metrics.add(loss_value, accuracy);

            if self.config.sample_every > 0 && step % self.config.sample_every == 0 {
                self.log_sample(&logits, &styled.dec_output, epoch, step)?;
            }
        }
        Ok(metrics.mean())
    }

    fn log_sample(
        &self,
        logits: &Tensor,
        targets: &Tensor,
        epoch: usize,
        step: usize,
    ) -> Result<(), ChatbotError> {
        let pad_index = self.target_vocab.pad_index();
        let prediction = Vec::<i64>::try_from(&logits.get(0).argmax(-1, false).to_device(Device::Cpu))?;
        let target = Vec::<i64>::try_from(&targets.get(0).to_device(Device::Cpu))?;
        let mut predicted_tokens = Vec::new();
        let mut target_tokens = Vec::new();
        for (predicted_id, target_id) in prediction.iter().zip(target.iter()) {
            if *target_id == pad_index {
                continue;
            }
            predicted_tokens.push(self.target_vocab.id_to_token(*predicted_id)?);
            target_tokens.push(self.target_vocab.id_to_token(*target_id)?);
        }
        debug!(
            epoch = epoch + 1,
            step,
            prediction = %predicted_tokens.join(" "),
            target = %target_tokens.join(" "),
            "sample prediction"
        );
        Ok(())
    }

    /// Scores `model` on `batches` without updating it: no gradients are recorded and dropout is off.
    pub fn evaluate(
        &self,
        model: &dyn Seq2SeqModel,
        batches: &[Batch],
    ) -> Result<EvalMetrics, ChatbotError> {
        if batches.is_empty() {
            warn!("evaluating on an empty set of batches");
            return Ok(EvalMetrics {
                loss: f64::INFINITY,
                accuracy: 0.0,
            });
        }
        let pad_index = self.target_vocab.pad_index();
        no_grad(|| -> Result<EvalMetrics, ChatbotError> {
            let mut metrics = MetricsAccumulator::default();
            for batch in batches {
                let (styled, logits) = self.forward(model, batch, false)?;
                let loss = masked_cross_entropy(&logits, &styled.dec_output, pad_index)
                    .to_device(Device::Cpu)
                    .double_value(&[]);
                metrics.add(loss, token_accuracy(&logits, &styled.dec_output, pad_index));
            }
            Ok(metrics.mean())
        })
    }

    /// Trains `model` for `num_epochs` epochs, validating after each epoch and checkpointing the
    /// parameters of `var_store` whenever the validation loss improves.
    ///
    /// # Arguments
    ///
    /// * `model` - model to train
    /// * `var_store` - variable store holding the parameters of `model`
    /// * `train` - training examples, reshuffled at every epoch
    /// * `valid` - validation examples
    ///
    /// # Returns
    ///
    /// * One `EpochReport` per epoch
    pub fn fit(
        &mut self,
        model: &dyn Seq2SeqModel,
        var_store: &VarStore,
        train: &Batcher,
        valid: &Batcher,
    ) -> Result<Vec<EpochReport>, ChatbotError> {
        if train.is_empty() || valid.is_empty() {
            return Err(ChatbotError::DatasetError(format!(
                "training needs examples in both sets, got {} training and {} validation examples",
                train.len(),
                valid.len()
            )));
        }
        let mut optimizer = nn::Adam::default().build(var_store, self.config.lr)?;
        let valid_batches = valid.batches(self.config.batch_size, None)?;
        let mut reports = Vec::with_capacity(self.config.num_epochs);

        for epoch in 0..self.config.num_epochs {
            let start = Instant::now();
            let learning_rate = self.scheduler.step(&mut optimizer, epoch);
            let train_batches = train.batches(
                self.config.batch_size,
                Some(self.config.seed + epoch as i64),
            )?;
            let train_metrics = self.train_epoch(model, &mut optimizer, &train_batches, epoch)?;
            let valid_metrics = self.evaluate(model, &valid_batches)?;
            let elapsed = start.elapsed();

            let saved = self.checkpoint.update(
                var_store,
                CheckpointRecord {
                    epoch: epoch + 1,
                    valid_loss: valid_metrics.loss,
                    valid_acc: valid_metrics.accuracy,
                },
            )?;

            let seconds = elapsed.as_secs();
            info!(
                "==Epoch: {:02} | Epoch Time: {}m {}s | lr: {:.2e}==",
                epoch + 1,
                seconds / 60,
                seconds % 60,
                learning_rate
            );
            info!(
                "==Train Loss: {:.3} | Train_acc: {:.3}==",
                train_metrics.loss, train_metrics.accuracy
            );
            info!(
                "==Valid Loss: {:.3} | Valid_acc: {:.3}==",
                valid_metrics.loss, valid_metrics.accuracy
            );

            reports.push(EpochReport {
                epoch: epoch + 1,
                elapsed,
                learning_rate,
                train: train_metrics,
                valid: valid_metrics,
                saved,
            });
        }
        Ok(reports)
    }
}
