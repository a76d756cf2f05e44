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
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tch::nn::VarStore;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
/// # Validation scores of a saved model
pub struct CheckpointRecord {
    /// 1-based epoch after which the model was saved
    pub epoch: usize,
    pub valid_loss: f64,
    pub valid_acc: f64,
}

/// # Best-model checkpoint
/// Keeps the model weights (`<name>.ot`) with the lowest validation loss seen during a run, along
/// with a JSON record of their scores (`<name>.json`). A save only happens on strict improvement,
/// so the recorded validation loss never increases over successive saves.
#[derive(Debug)]
pub struct CheckpointManager {
    weights_path: PathBuf,
    record_path: PathBuf,
    best: Option<CheckpointRecord>,
}

impl CheckpointManager {
    /// Creates a manager writing to `path`. The weights go to `path` with an `.ot` extension and the
    /// record next to it with a `.json` extension.
    pub fn new<P: AsRef<Path>>(path: P) -> CheckpointManager {
        let path = path.as_ref();
        CheckpointManager {
            weights_path: path.with_extension("ot"),
            record_path: path.with_extension("json"),
            best: None,
        }
    }

    pub fn weights_path(&self) -> &Path {
        &self.weights_path
    }

    pub fn record_path(&self) -> &Path {
        &self.record_path
    }

    /// Record of the best model saved by this manager, if any.
    pub fn best(&self) -> Option<&CheckpointRecord> {
        self.best.as_ref()
    }

    /// Saves the weights and record if `record.valid_loss` is strictly lower than the best
    /// validation loss so far. Returns `true` when a checkpoint was written.
    pub fn update(
        &mut self,
        var_store: &VarStore,
        record: CheckpointRecord,
    ) -> Result<bool, ChatbotError> {
        let improved = match &self.best {
            Some(best) => record.valid_loss < best.valid_loss,
            None => record.valid_loss.is_finite(),
        };
        if !improved {
            return Ok(false);
        }
        var_store.save(&self.weights_path)?;
        let writer = BufWriter::new(File::create(&self.record_path)?);
        serde_json::to_writer_pretty(writer, &record)?;
        info!(
            epoch = record.epoch,
            "## SAVE valid_loss: {:.3} | valid_acc: {:.3} ##",
            record.valid_loss,
            record.valid_acc
        );
        self.best = Some(record);
        Ok(true)
    }

    /// Reads the record written with the last saved checkpoint.
    pub fn read_record(&self) -> Result<CheckpointRecord, ChatbotError> {
        let reader = BufReader::new(File::open(&self.record_path).map_err(|e| {
            ChatbotError::IOError(format!(
                "cannot open checkpoint record {}: {}",
                self.record_path.display(),
                e
            ))
        })?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Loads the saved weights into `var_store`.
    pub fn load(&self, var_store: &mut VarStore) -> Result<(), ChatbotError> {
        if !self.weights_path.is_file() {
            return Err(ChatbotError::IOError(format!(
                "checkpoint {} does not exist",
                self.weights_path.display()
            )));
        }
        var_store.load(&self.weights_path)?;
        Ok(())
    }
}
