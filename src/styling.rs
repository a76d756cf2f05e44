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

//! # Sentiment and speech-style control tokens
//!
//! The `Styler` rewrites a padded batch before it reaches the sequence model:
//! - the encoder sequence gets the sentiment control token (`<nega>` / `<posi>`) appended after its
//!   last real token,
//! - the decoder sequences get a style marker right after `<sos>`. The marker is picked from the
//!   sentence-final ending of the target reply (formal, polite, casual or neutral register) and from
//!   the sentiment of the example, e.g. `<formal_posi>`.
//!
//! With a raw target row `<sos> t1 .. tn <eos> <pad>..`, the styled decoder input is
//! `<sos> <marker> t1 .. tn <pad>..` and the styled labels are `<marker> t1 .. tn <eos> <pad>..`,
//! both exactly `max_len` long.

use crate::common::error::ChatbotError;
use crate::pipelines::sentiment::Sentiment;
use crate::vocab::{Vocab, EOS_TOKEN, NEGATIVE_TOKEN, POSITIVE_TOKEN, SOS_TOKEN};
use lazy_static::lazy_static;
use std::collections::{HashMap, HashSet};
use std::convert::TryFrom;
use tch::kind::Kind::Int64;
use tch::{Device, Tensor};

/// Minimum number of characters (punctuation excluded) a target sentence needs before its ending
/// is looked up. Shorter sentences are `Style::Neutral`.
pub const STYLE_WINDOW: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
/// # Speech style (register) of a Korean sentence
pub enum Style {
    /// Hasipsio-che, e.g. `감사합니다`, `그렇습니까`
    Formal,
    /// Haeyo-che, e.g. `좋아요`, `그렇죠`
    Polite,
    /// Banmal, e.g. `좋아`, `그렇지`
    Casual,
    /// No recognisable ending
    Neutral,
}

impl Style {
    pub const ALL: [Style; 4] = [Style::Formal, Style::Polite, Style::Casual, Style::Neutral];

    pub fn name(&self) -> &'static str {
        match self {
            Style::Formal => "formal",
            Style::Polite => "polite",
            Style::Casual => "casual",
            Style::Neutral => "neutral",
        }
    }

    /// Control token conditioning the decoder on this style and on the sentiment of the example.
    pub fn marker_token(&self, sentiment: Sentiment) -> String {
        format!("<{}_{}>", self.name(), sentiment.short_name())
    }
}

/// Sentence-final endings and the style they signal. The longest matching ending wins.
pub const ENDINGS: &[(&str, Style)] = &[
    ("습니다", Style::Formal),
    ("니다", Style::Formal),
    ("습니까", Style::Formal),
    ("니까", Style::Formal),
    ("십시오", Style::Formal),
    ("시오", Style::Formal),
    ("읍시다", Style::Formal),
    ("요", Style::Polite),
    ("세요", Style::Polite),
    ("에요", Style::Polite),
    ("예요", Style::Polite),
    ("어요", Style::Polite),
    ("아요", Style::Polite),
    ("해요", Style::Polite),
    ("네요", Style::Polite),
    ("군요", Style::Polite),
    ("까요", Style::Polite),
    ("죠", Style::Polite),
    ("다", Style::Casual),
    ("야", Style::Casual),
    ("어", Style::Casual),
    ("아", Style::Casual),
    ("해", Style::Casual),
    ("지", Style::Casual),
    ("니", Style::Casual),
    ("냐", Style::Casual),
    ("자", Style::Casual),
    ("라", Style::Casual),
    ("래", Style::Casual),
    ("게", Style::Casual),
    ("네", Style::Casual),
    ("군", Style::Casual),
    ("걸", Style::Casual),
    ("까", Style::Casual),
    ("거든", Style::Casual),
    ("잖아", Style::Casual),
];

lazy_static! {
    static ref ENDING_LOOKUP: HashMap<&'static str, Style> = ENDINGS.iter().copied().collect();
    static ref LONGEST_ENDING: usize = ENDINGS
        .iter()
        .map(|(ending, _)| ending.chars().count())
        .max()
        .unwrap_or(0);
    static ref CONTROL_TOKENS: HashSet<String> = {
        let mut tokens: HashSet<String> = style_marker_tokens().into_iter().collect();
        tokens.insert(NEGATIVE_TOKEN.to_string());
        tokens.insert(POSITIVE_TOKEN.to_string());
        tokens
    };
}

/// All style marker tokens, in a stable order (style major, sentiment minor).
pub fn style_marker_tokens() -> Vec<String> {
    let mut tokens = Vec::with_capacity(Style::ALL.len() * Sentiment::ALL.len());
    for style in Style::ALL.iter() {
        for sentiment in Sentiment::ALL.iter() {
            tokens.push(style.marker_token(*sentiment));
        }
    }
    tokens
}

/// `true` for sentiment control tokens and style markers.
pub fn is_control_token(token: &str) -> bool {
    CONTROL_TOKENS.contains(token)
}

/// Classifies the speech style of a sentence from its final characters.
///
/// Trailing punctuation, whitespace and sentencepiece word markers are ignored.
///
/// # Example
///
/// ```
/// use ko_chatbot::styling::{classify_style, Style};
///
/// assert_eq!(classify_style("감사합니다."), Style::Formal);
/// assert_eq!(classify_style("좋아요!"), Style::Polite);
/// assert_eq!(classify_style("좋아"), Style::Casual);
/// assert_eq!(classify_style("응"), Style::Neutral);
/// ```
pub fn classify_style(sentence: &str) -> Style {
    let characters: Vec<char> = sentence
        .trim_end_matches(|c: char| c.is_whitespace() || c.is_ascii_punctuation() || c == '▁' || c == '~')
        .chars()
        .filter(|c| *c != '▁')
        .collect();
    if characters.len() < STYLE_WINDOW {
        return Style::Neutral;
    }
    let longest = (*LONGEST_ENDING).min(characters.len());
    for length in (1..=longest).rev() {
        let suffix: String = characters[characters.len() - length..].iter().collect();
        if let Some(style) = ENDING_LOOKUP.get(suffix.as_str()) {
            return *style;
        }
    }
    Style::Neutral
}

#[derive(Debug)]
/// # Output of the styling transform
/// All tensors have shape (*batch size*, *max_len*).
pub struct StyledBatch {
    pub enc_input: Tensor,
    pub dec_input: Tensor,
    pub dec_output: Tensor,
}

/// # Styling transform
/// Injects sentiment and style control tokens into padded encoder / decoder batches.
#[derive(Debug, Clone)]
pub struct Styler {
    max_len: usize,
    target_vocab: Vocab,
    source_pad: i64,
    negative_token: i64,
    positive_token: i64,
    target_pad: i64,
    sos_token: i64,
    eos_token: i64,
    markers: HashMap<(Style, Sentiment), i64>,
}

impl Styler {
    /// Build a new `Styler`
    ///
    /// # Arguments
    ///
    /// * `source_vocab` - vocabulary of the encoder sequences, must contain `<nega>` and `<posi>`
    /// * `target_vocab` - vocabulary of the decoder sequences, must contain `<sos>`, `<eos>` and the style markers
    /// * `max_len` - length of every styled sequence
    pub fn new(
        source_vocab: &Vocab,
        target_vocab: &Vocab,
        max_len: usize,
    ) -> Result<Styler, ChatbotError> {
        if max_len < 2 {
            return Err(ChatbotError::InvalidConfigurationError(format!(
                "max_len must be at least 2 to hold <sos> and a style marker, got {}",
                max_len
            )));
        }
        let mut markers = HashMap::new();
        for style in Style::ALL.iter() {
            for sentiment in Sentiment::ALL.iter() {
                let id = target_vocab.special_token_id(&style.marker_token(*sentiment))?;
                markers.insert((*style, *sentiment), id);
            }
        }
        Ok(Styler {
            max_len,
            target_vocab: target_vocab.clone(),
            source_pad: source_vocab.pad_index(),
            negative_token: source_vocab.special_token_id(NEGATIVE_TOKEN)?,
            positive_token: source_vocab.special_token_id(POSITIVE_TOKEN)?,
            target_pad: target_vocab.pad_index(),
            sos_token: target_vocab.special_token_id(SOS_TOKEN)?,
            eos_token: target_vocab.special_token_id(EOS_TOKEN)?,
            markers,
        })
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn sentiment_token(&self, sentiment: Sentiment) -> i64 {
        match sentiment {
            Sentiment::Negative => self.negative_token,
            Sentiment::Positive => self.positive_token,
        }
    }

    pub fn marker_id(&self, style: Style, sentiment: Sentiment) -> i64 {
        self.markers[&(style, sentiment)]
    }

    /// Builds the encoder row: real tokens (padding dropped, truncated to `max_len - 1`), the
    /// sentiment control token, then padding up to `max_len`.
    pub fn encoder_row(&self, source_ids: &[i64], sentiment: Sentiment) -> Vec<i64> {
        let mut row: Vec<i64> = source_ids
            .iter()
            .copied()
            .take_while(|id| *id != self.source_pad)
            .take(self.max_len - 1)
            .collect();
        row.push(self.sentiment_token(sentiment));
        row.resize(self.max_len, self.source_pad);
        row
    }

    /// Builds the styled decoder input and label rows from a raw `<sos> t1 .. tn <eos> <pad>..` row.
    pub fn decoder_rows(
        &self,
        target_ids: &[i64],
        sentiment: Sentiment,
    ) -> Result<(Vec<i64>, Vec<i64>), ChatbotError> {
        let words: Vec<i64> = target_ids
            .iter()
            .copied()
            .skip_while(|id| *id == self.sos_token)
            .take_while(|id| *id != self.eos_token && *id != self.target_pad)
            .collect();
        let style = classify_style(&self.target_sentence(&words)?);
        let marker = self.marker_id(style, sentiment);

        let mut dec_input = Vec::with_capacity(self.max_len);
        dec_input.push(self.sos_token);
        dec_input.push(marker);
        dec_input.extend_from_slice(&words);
        dec_input.truncate(self.max_len);
        dec_input.resize(self.max_len, self.target_pad);

        let mut dec_output = Vec::with_capacity(self.max_len + 1);
        dec_output.push(marker);
        dec_output.extend_from_slice(&words);
        dec_output.push(self.eos_token);
        dec_output.truncate(self.max_len);
        dec_output.resize(self.max_len, self.target_pad);

        Ok((dec_input, dec_output))
    }

    fn target_sentence(&self, words: &[i64]) -> Result<String, ChatbotError> {
        let mut sentence = String::new();
        for id in words {
            sentence.push_str(self.target_vocab.id_to_token(*id)?);
        }
        Ok(sentence)
    }

    /// Applies the transform to a whole batch.
    ///
    /// # Arguments
    ///
    /// * `enc_input` - raw encoder indices of shape (*batch size*, *source length*)
    /// * `dec_input` - raw decoder indices of shape (*batch size*, *target length*), `<sos> .. <eos>` padded
    /// * `sentiment` - sentiment labels (0 or 1) of shape (*batch size*)
    ///
    /// # Returns
    ///
    /// * `StyledBatch` whose tensors have shape (*batch size*, *max_len*) on the device of `enc_input`,
    ///   rows in the input order.
    pub fn styling(
        &self,
        enc_input: &Tensor,
        dec_input: &Tensor,
        sentiment: &Tensor,
    ) -> Result<StyledBatch, ChatbotError> {
        let device = enc_input.device();
        let source_rows = tensor_rows(enc_input)?;
        let target_rows = tensor_rows(dec_input)?;
        let labels = Vec::<i64>::try_from(&sentiment.to_kind(Int64).to_device(Device::Cpu).reshape([-1]))?;
        if source_rows.len() != target_rows.len() || source_rows.len() != labels.len() {
            return Err(ChatbotError::ValueError(format!(
                "batch size mismatch: {} encoder rows, {} decoder rows, {} sentiment labels",
                source_rows.len(),
                target_rows.len(),
                labels.len()
            )));
        }

        let batch_size = labels.len();
        let mut enc_flat = Vec::with_capacity(batch_size * self.max_len);
        let mut dec_input_flat = Vec::with_capacity(batch_size * self.max_len);
        let mut dec_output_flat = Vec::with_capacity(batch_size * self.max_len);
        for ((source_row, target_row), label) in source_rows
            .iter()
            .zip(target_rows.iter())
            .zip(labels.into_iter())
        {
            let sentiment = Sentiment::from_label(label)?;
            enc_flat.extend(self.encoder_row(source_row, sentiment));
            let (dec_input_row, dec_output_row) = self.decoder_rows(target_row, sentiment)?;
            dec_input_flat.extend(dec_input_row);
            dec_output_flat.extend(dec_output_row);
        }

        let shape = [batch_size as i64, self.max_len as i64];
        Ok(StyledBatch {
            enc_input: Tensor::from_slice(&enc_flat).view(shape).to_device(device),
            dec_input: Tensor::from_slice(&dec_input_flat).view(shape).to_device(device),
            dec_output: Tensor::from_slice(&dec_output_flat).view(shape).to_device(device),
        })
    }
}

fn tensor_rows(input: &Tensor) -> Result<Vec<Vec<i64>>, ChatbotError> {
    let size = input.size();
    if size.len() != 2 {
        return Err(ChatbotError::ValueError(format!(
            "expected a (batch size, sequence length) tensor, got shape {:?}",
            size
        )));
    }
    let width = size[1] as usize;
    let flat = Vec::<i64>::try_from(&input.to_kind(Int64).to_device(Device::Cpu).reshape([-1]))?;
    if width == 0 {
        return Ok(vec![Vec::new(); size[0] as usize]);
    }
    Ok(flat.chunks(width).map(|row| row.to_vec()).collect())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn longest_ending_wins() {
        assert_eq!(classify_style("그렇습니까?"), Style::Formal);
        assert_eq!(classify_style("그럴까요"), Style::Polite);
        assert_eq!(classify_style("그럴까"), Style::Casual);
    }

    #[test]
    fn sentencepiece_markers_are_ignored() {
        assert_eq!(classify_style("▁고마워▁요"), Style::Polite);
    }
}
