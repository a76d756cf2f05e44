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

//! # Training and evaluation
//!
//! `Trainer` runs teacher-forced training of a `Seq2SeqModel` with Adam under a
//! `GradualWarmupScheduler`, evaluates after every epoch and keeps the best model by validation
//! loss through a `CheckpointManager`.

mod checkpoint;
mod metrics;
mod scheduler;
mod trainer;

pub use checkpoint::{CheckpointManager, CheckpointRecord};
pub use metrics::{masked_cross_entropy, token_accuracy};
pub use scheduler::GradualWarmupScheduler;
pub use trainer::{EpochReport, EvalMetrics, Trainer};
