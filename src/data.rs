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

//! # Chat dataset
//!
//! Question / answer pairs read from a `Q,A,label` CSV file, encoded with the chat vocabularies and
//! grouped into padded batches. The `label` column holds the sentiment of the question
//! (0 = negative, 1 = positive); rows where it is missing or empty can be labelled by a
//! `SentimentClassifier`.

use crate::common::error::ChatbotError;
use crate::pipelines::sentiment::{Sentiment, SentimentClassifier};
use crate::tokenization::TextTokenizer;
use crate::vocab::Vocab;
use serde::Deserialize;
use std::convert::TryFrom;
use std::path::Path;
use tch::kind::Kind::Int64;
use tch::{Device, Tensor};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct ChatExample {
    pub question: String,
    pub answer: String,
    /// `None` until labelled, for rows read without a label
    pub sentiment: Option<Sentiment>,
}

#[derive(Debug, Deserialize)]
struct CsvRecord {
    #[serde(rename = "Q")]
    question: String,
    #[serde(rename = "A")]
    answer: String,
    #[serde(default)]
    label: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct ChatDataset {
    examples: Vec<ChatExample>,
}

impl ChatDataset {
    pub fn new(examples: Vec<ChatExample>) -> ChatDataset {
        ChatDataset { examples }
    }

    /// Reads a CSV file with a header row holding at least the `Q` and `A` columns.
    /// Rows with an empty question or answer are skipped.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<ChatDataset, ChatbotError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path.as_ref())?;
        let mut examples = Vec::new();
        for (row, record) in reader.deserialize::<CsvRecord>().enumerate() {
            let record = record?;
            if record.question.is_empty() || record.answer.is_empty() {
                warn!(row, "skipping chat row with an empty question or answer");
                continue;
            }
            let sentiment = match record.label {
                Some(label) => Some(Sentiment::from_label(label).map_err(|_| {
                    ChatbotError::DatasetError(format!(
                        "row {}: label must be 0 or 1, got {}",
                        row + 1,
                        label
                    ))
                })?),
                None => None,
            };
            examples.push(ChatExample {
                question: record.question,
                answer: record.answer,
                sentiment,
            });
        }
        debug!(
            path = %path.as_ref().display(),
            examples = examples.len(),
            "chat dataset loaded"
        );
        Ok(ChatDataset { examples })
    }

    pub fn examples(&self) -> &[ChatExample] {
        &self.examples
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn unlabelled_count(&self) -> usize {
        self.examples
            .iter()
            .filter(|example| example.sentiment.is_none())
            .count()
    }

    /// Labels the questions without a sentiment using `classifier`, `batch_size` sentences at a time.
    /// Returns the number of examples labelled.
    pub fn label_missing(
        &mut self,
        classifier: &dyn SentimentClassifier,
        batch_size: usize,
    ) -> Result<usize, ChatbotError> {
        let missing: Vec<usize> = self
            .examples
            .iter()
            .enumerate()
            .filter(|(_, example)| example.sentiment.is_none())
            .map(|(index, _)| index)
            .collect();
        for chunk in missing.chunks(batch_size.max(1)) {
            let questions: Vec<&str> = chunk
                .iter()
                .map(|index| self.examples[*index].question.as_str())
                .collect();
            let predictions = classifier.predict(&questions)?;
            if predictions.len() != chunk.len() {
                return Err(ChatbotError::ValueError(format!(
                    "classifier returned {} labels for {} sentences",
                    predictions.len(),
                    chunk.len()
                )));
            }
            for (index, sentiment) in chunk.iter().zip(predictions) {
                self.examples[*index].sentiment = Some(sentiment);
            }
        }
        Ok(missing.len())
    }

    /// Shuffles the examples with a seeded permutation and splits them into a first set holding
    /// `ratio` of the examples and a second set holding the rest. Both sets are non-empty as soon
    /// as the dataset holds two examples.
    pub fn split(&self, ratio: f64, seed: i64) -> Result<(ChatDataset, ChatDataset), ChatbotError> {
        if !(ratio > 0.0 && ratio < 1.0) {
            return Err(ChatbotError::ValueError(format!(
                "split ratio must be in (0, 1), got {}",
                ratio
            )));
        }
        let count = self.examples.len();
        let order = permutation(count, seed)?;
        let mut first_count = (count as f64 * ratio).round() as usize;
        if count >= 2 {
            first_count = first_count.max(1).min(count - 1);
        }
        let (first, second) = order.split_at(first_count.min(count));
        let select = |indices: &[usize]| ChatDataset {
            examples: indices.iter().map(|i| self.examples[*i].clone()).collect(),
        };
        Ok((select(first), select(second)))
    }

    /// Tokenized questions and answers, as needed to build the source and target vocabularies.
    pub fn tokenized(&self, tokenizer: &dyn TextTokenizer) -> (Vec<Vec<String>>, Vec<Vec<String>>) {
        self.examples
            .iter()
            .map(|example| {
                (
                    tokenizer.tokenize(&example.question),
                    tokenizer.tokenize(&example.answer),
                )
            })
            .unzip()
    }
}

/// Seeded permutation of `0..count`, reproducible across runs for a given seed.
fn permutation(count: usize, seed: i64) -> Result<Vec<usize>, ChatbotError> {
    if count == 0 {
        return Ok(Vec::new());
    }
    tch::manual_seed(seed);
    let order = Vec::<i64>::try_from(&Tensor::randperm(count as i64, (Int64, Device::Cpu)))?;
    Ok(order.into_iter().map(|index| index as usize).collect())
}

#[derive(Debug)]
/// # Padded training batch
/// `enc_input` and `dec_input` have shape (*batch size*, *max_len*), `sentiment` has shape
/// (*batch size*).
pub struct Batch {
    pub enc_input: Tensor,
    pub dec_input: Tensor,
    pub sentiment: Tensor,
}

impl Batch {
    pub fn size(&self) -> i64 {
        self.enc_input.size()[0]
    }
}

#[derive(Debug, Clone)]
struct EncodedExample {
    source: Vec<i64>,
    target: Vec<i64>,
    sentiment: Sentiment,
}

/// # Batch builder
/// Encodes a labelled dataset once and slices it into batches:
/// * source rows hold the question token indices, padded to `max_len`
/// * target rows hold `<sos>`, the answer token indices and `<eos>`, truncated and padded to `max_len`
#[derive(Debug)]
pub struct Batcher {
    examples: Vec<EncodedExample>,
    max_len: usize,
    source_pad: i64,
    target_pad: i64,
    device: Device,
}

impl Batcher {
    pub fn new(
        dataset: &ChatDataset,
        tokenizer: &dyn TextTokenizer,
        source_vocab: &Vocab,
        target_vocab: &Vocab,
        max_len: usize,
        device: Device,
    ) -> Result<Batcher, ChatbotError> {
        let sos = target_vocab.sos_index()?;
        let eos = target_vocab.eos_index()?;
        let mut examples = Vec::with_capacity(dataset.len());
        for (index, example) in dataset.examples().iter().enumerate() {
            let sentiment = example.sentiment.ok_or_else(|| {
                ChatbotError::DatasetError(format!(
                    "example {} has no sentiment label, label the dataset first",
                    index
                ))
            })?;
            let source = source_vocab.tokens_to_ids(&tokenizer.tokenize(&example.question));
            let mut target = Vec::with_capacity(max_len);
            target.push(sos);
            target.extend(target_vocab.tokens_to_ids(&tokenizer.tokenize(&example.answer)));
            target.push(eos);
            examples.push(EncodedExample {
                source,
                target,
                sentiment,
            });
        }
        Ok(Batcher {
            examples,
            max_len,
            source_pad: source_vocab.pad_index(),
            target_pad: target_vocab.pad_index(),
            device,
        })
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    fn padded(ids: &[i64], max_len: usize, pad: i64) -> impl Iterator<Item = i64> + '_ {
        ids.iter()
            .copied()
            .take(max_len)
            .chain(std::iter::repeat(pad))
            .take(max_len)
    }

    /// Groups the encoded examples into batches of at most `batch_size` rows. With a
    /// `shuffle_seed`, examples are visited in a seeded random order, otherwise in dataset order.
    pub fn batches(
        &self,
        batch_size: usize,
        shuffle_seed: Option<i64>,
    ) -> Result<Vec<Batch>, ChatbotError> {
        if batch_size == 0 {
            return Err(ChatbotError::ValueError(
                "batch_size must be positive".to_string(),
            ));
        }
        let order = match shuffle_seed {
            Some(seed) => permutation(self.examples.len(), seed)?,
            None => (0..self.examples.len()).collect(),
        };
        let mut batches = Vec::with_capacity(order.len() / batch_size + 1);
        for chunk in order.chunks(batch_size) {
            let mut enc_input = Vec::with_capacity(chunk.len() * self.max_len);
            let mut dec_input = Vec::with_capacity(chunk.len() * self.max_len);
            let mut sentiment = Vec::with_capacity(chunk.len());
            for index in chunk {
                let example = &self.examples[*index];
                enc_input.extend(Batcher::padded(&example.source, self.max_len, self.source_pad));
                dec_input.extend(Batcher::padded(&example.target, self.max_len, self.target_pad));
                sentiment.push(example.sentiment.label());
            }
            let shape = [chunk.len() as i64, self.max_len as i64];
            batches.push(Batch {
                enc_input: Tensor::from_slice(&enc_input).view(shape).to_device(self.device),
                dec_input: Tensor::from_slice(&dec_input).view(shape).to_device(self.device),
                sentiment: Tensor::from_slice(&sentiment).to_device(self.device),
            });
        }
        Ok(batches)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn padding_truncates_and_fills() {
        let padded: Vec<i64> = Batcher::padded(&[5, 6, 7], 5, 1).collect();
        assert_eq!(padded, vec![5, 6, 7, 1, 1]);
        let truncated: Vec<i64> = Batcher::padded(&[5, 6, 7], 2, 1).collect();
        assert_eq!(truncated, vec![5, 6]);
    }

    #[test]
    fn permutation_is_seeded() {
        assert_eq!(permutation(10, 7).unwrap(), permutation(10, 7).unwrap());
        let mut order = permutation(10, 7).unwrap();
        order.sort_unstable();
        assert_eq!(order, (0..10).collect::<Vec<usize>>());
    }
}
