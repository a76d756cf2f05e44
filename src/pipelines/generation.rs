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

//! # Reply generation
//!
//! Greedy autoregressive decoding with a `Seq2SeqModel`. `ReplyGenerator` wires the full inference
//! path: sentiment classification of the input sentence, encoder sequence construction (tokens,
//! sentiment control token, padding), greedy decoding from `<sos>` and spacing of the reply.
//!
//! ```no_run
//! # fn main() -> anyhow::Result<()> {
//! # use ko_chatbot::pipelines::sentiment::SentimentClassifier;
//! # use ko_chatbot::transformer::Seq2SeqModel;
//! # use ko_chatbot::vocab::Vocab;
//! # fn setup() -> (Box<dyn Seq2SeqModel>, Box<dyn SentimentClassifier>, Vocab, Vocab) { unimplemented!() }
//! use ko_chatbot::pipelines::generation::ReplyGenerator;
//! use ko_chatbot::styling::Styler;
//! use ko_chatbot::tokenization::WhitespaceTokenizer;
//! use tch::Device;
//!
//! let (model, classifier, source_vocab, target_vocab) = setup();
//! let styler = Styler::new(&source_vocab, &target_vocab, 64)?;
//! let generator = ReplyGenerator::new(
//!     model.as_ref(),
//!     classifier.as_ref(),
//!     &WhitespaceTokenizer,
//!     &styler,
//!     &source_vocab,
//!     &target_vocab,
//!     Device::Cpu,
//! );
//! let reply = generator.reply("오늘 시험 잘 봤어")?;
//! println!("{} > {}", reply.sentiment.display_name(), reply.text);
//! # Ok(())
//! # }
//! ```

use crate::common::error::ChatbotError;
use crate::pipelines::sentiment::{Sentiment, SentimentClassifier};
use crate::pipelines::spacing::Spacer;
use crate::styling::{is_control_token, Styler};
use crate::tokenization::TextTokenizer;
use crate::transformer::Seq2SeqModel;
use crate::vocab::{Vocab, PAD_TOKEN, SOS_TOKEN};
use tch::kind::Kind::Int64;
use tch::{no_grad, Device, Tensor};

#[derive(Debug, Clone, PartialEq)]
/// # Output of greedy decoding
pub struct GreedyOutput {
    /// Generated target indices, `<eos>` excluded
    pub tokens: Vec<i64>,
    /// `false` when the length bound was reached before `<eos>`
    pub finished: bool,
}

/// Greedy decoding of a single encoder sequence.
///
/// The decoder input starts as `<sos>`. At each step the whole decoder input is run through the
/// model and the arg-max token of the last position is appended, until `<eos>` is produced or
/// `max_len` tokens have been generated.
///
/// # Arguments
///
/// * `model` - sequence model, run with `train = false`
/// * `enc_input` - encoder indices of shape (1, *source length*)
/// * `target_vocab` - vocabulary providing the `<sos>` and `<eos>` indices
/// * `max_len` - maximum number of generated tokens
pub fn greedy_decode(
    model: &dyn Seq2SeqModel,
    enc_input: &Tensor,
    target_vocab: &Vocab,
    max_len: usize,
) -> Result<GreedyOutput, ChatbotError> {
    let size = enc_input.size();
    if size.len() != 2 || size[0] != 1 {
        return Err(ChatbotError::ValueError(format!(
            "greedy decoding expects a (1, sequence length) encoder input, got shape {:?}",
            size
        )));
    }
    let sos = target_vocab.sos_index()?;
    let eos = target_vocab.eos_index()?;
    let device = enc_input.device();

    no_grad(|| -> Result<GreedyOutput, ChatbotError> {
        let mut dec_input = Tensor::from_slice(&[sos]).view([1, 1]).to_device(device);
        let mut tokens = Vec::with_capacity(max_len);
        for _ in 0..max_len {
            let logits = model.forward_t(enc_input, &dec_input, false);
            let next_token = logits.select(1, -1).argmax(-1, false).to_kind(Int64);
            let next_id = next_token.to_device(Device::Cpu).int64_value(&[0]);
            if next_id == eos {
                return Ok(GreedyOutput {
                    tokens,
                    finished: true,
                });
            }
            tokens.push(next_id);
            dec_input = Tensor::cat(&[dec_input, next_token.view([1, 1])], 1);
        }
        Ok(GreedyOutput {
            tokens,
            finished: false,
        })
    })
}

#[derive(Debug, Clone, PartialEq)]
/// # Generated reply
pub struct Reply {
    /// Sentiment detected in the input sentence
    pub sentiment: Sentiment,
    /// Spaced reply text, control tokens removed
    pub text: String,
    /// Raw generated target indices, `<eos>` excluded
    pub tokens: Vec<i64>,
    /// `false` when generation stopped at the length bound instead of `<eos>`
    pub finished: bool,
}

/// # Sentiment-conditioned reply generator
pub struct ReplyGenerator<'a> {
    model: &'a dyn Seq2SeqModel,
    classifier: &'a dyn SentimentClassifier,
    tokenizer: &'a dyn TextTokenizer,
    styler: &'a Styler,
    source_vocab: &'a Vocab,
    target_vocab: &'a Vocab,
    spacer: Box<dyn Spacer + 'a>,
    device: Device,
}

impl<'a> ReplyGenerator<'a> {
    /// Creates a generator whose replies are spaced by the spacer of `tokenizer`. Encoder sequences
    /// and replies are bounded by the `max_len` of `styler`.
    pub fn new(
        model: &'a dyn Seq2SeqModel,
        classifier: &'a dyn SentimentClassifier,
        tokenizer: &'a dyn TextTokenizer,
        styler: &'a Styler,
        source_vocab: &'a Vocab,
        target_vocab: &'a Vocab,
        device: Device,
    ) -> ReplyGenerator<'a> {
        ReplyGenerator {
            model,
            classifier,
            tokenizer,
            styler,
            source_vocab,
            target_vocab,
            spacer: tokenizer.spacer(),
            device,
        }
    }

    /// Replaces the spacing correction applied to replies.
    pub fn with_spacer(mut self, spacer: Box<dyn Spacer + 'a>) -> ReplyGenerator<'a> {
        self.spacer = spacer;
        self
    }

    /// Classifies the sentiment of `sentence`.
    pub fn sentiment(&self, sentence: &str) -> Result<Sentiment, ChatbotError> {
        self.classifier
            .predict(&[sentence])?
            .into_iter()
            .next()
            .ok_or_else(|| ChatbotError::ValueError("classifier returned no label".to_string()))
    }

    /// Encoder indices of shape (1, *max_len*): sentence tokens, sentiment control token, padding.
    pub fn encode(&self, sentence: &str, sentiment: Sentiment) -> Tensor {
        let ids = self
            .source_vocab
            .tokens_to_ids(&self.tokenizer.tokenize(sentence));
        let row = self.styler.encoder_row(&ids, sentiment);
        Tensor::from_slice(&row)
            .view([1, row.len() as i64])
            .to_device(self.device)
    }

    /// Generates a reply to `sentence`.
    pub fn reply(&self, sentence: &str) -> Result<Reply, ChatbotError> {
        let sentiment = self.sentiment(sentence)?;
        let enc_input = self.encode(sentence, sentiment);
        let output = greedy_decode(
            self.model,
            &enc_input,
            self.target_vocab,
            self.styler.max_len(),
        )?;

        let mut words = Vec::with_capacity(output.tokens.len());
        for id in &output.tokens {
            let token = self.target_vocab.id_to_token(*id)?;
            if is_control_token(token) || token == SOS_TOKEN || token == PAD_TOKEN {
                continue;
            }
            words.push(token);
        }
        Ok(Reply {
            sentiment,
            text: self.spacer.space(&words.join(" ")),
            tokens: output.tokens,
            finished: output.finished,
        })
    }
}
