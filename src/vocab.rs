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

//! # Token vocabularies
//!
//! A `Vocab` maps tokens to indices and back. Vocabularies built by this crate always start with the
//! same special tokens so that the padding index is stable across source and target fields:
//! `<unk>` = 0, `<pad>` = 1, `<sos>` = 2, `<eos>` = 3, followed by the sentiment control tokens and
//! the style marker tokens.

use crate::common::error::ChatbotError;
use crate::styling::style_marker_tokens;
use rust_tokenizers::vocab::{BaseVocab, Vocab as _};
use serde_json::json;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

pub const UNK_TOKEN: &str = "<unk>";
pub const PAD_TOKEN: &str = "<pad>";
pub const SOS_TOKEN: &str = "<sos>";
pub const EOS_TOKEN: &str = "<eos>";
pub const NEGATIVE_TOKEN: &str = "<nega>";
pub const POSITIVE_TOKEN: &str = "<posi>";

/// Control tokens: sentiment tokens followed by the style markers.
fn control_tokens() -> Vec<String> {
    let mut tokens = vec![NEGATIVE_TOKEN.to_string(), POSITIVE_TOKEN.to_string()];
    tokens.extend(style_marker_tokens());
    tokens
}

/// Tokens reserved at the start of every vocabulary, in index order.
pub fn special_tokens() -> Vec<String> {
    let mut tokens: Vec<String> = [UNK_TOKEN, PAD_TOKEN, SOS_TOKEN, EOS_TOKEN]
        .iter()
        .map(|token| token.to_string())
        .collect();
    tokens.extend(control_tokens());
    tokens
}

fn read_tokens<P: AsRef<Path>>(path: P) -> Result<Vec<String>, ChatbotError> {
    let reader = BufReader::new(File::open(path)?);
    let mut tokens = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let token = line.trim_end_matches('\r');
        if !token.is_empty() {
            tokens.push(token.to_string());
        }
    }
    Ok(tokens)
}

#[derive(Debug, Clone)]
/// # Bidirectional token <-> index mapping
/// Backed by a `rust_tokenizers` `BaseVocab` whose special token map registers `<unk>`, `<pad>`,
/// `<sos>`, `<eos>` and the control tokens.
pub struct Vocab {
    vocab: BaseVocab,
    unk_index: i64,
    pad_index: i64,
}

impl Vocab {
    /// Creates a vocabulary from an ordered list of tokens. The token at position `i` gets index `i`;
    /// duplicated tokens keep their first index.
    ///
    /// # Arguments
    ///
    /// * `tokens` - ordered tokens, must contain every token of `special_tokens()`
    pub fn from_tokens(tokens: Vec<String>) -> Result<Vocab, ChatbotError> {
        let mut values: HashMap<String, i64> = HashMap::with_capacity(tokens.len());
        for token in tokens {
            let next_index = values.len() as i64;
            values.entry(token).or_insert(next_index);
        }
        //    `SpecialTokenMap` is not re-exported by rust_tokenizers, it is read from its JSON form
        let special_token_map = serde_json::from_value(json!({
            "unk_token": UNK_TOKEN,
            "pad_token": PAD_TOKEN,
            "bos_token": SOS_TOKEN,
            "eos_token": EOS_TOKEN,
            "additional_special_tokens": control_tokens(),
        }))?;
        let vocab = BaseVocab::from_values_and_special_token_map(values, special_token_map)?;
        let unk_index = vocab.token_to_id(UNK_TOKEN);
        let pad_index = vocab.token_to_id(PAD_TOKEN);
        Ok(Vocab {
            vocab,
            unk_index,
            pad_index,
        })
    }

    /// Reads a vocabulary file holding one token per line, the line number being the token index.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Vocab, ChatbotError> {
        Vocab::from_tokens(read_tokens(path)?)
    }

    /// Writes the vocabulary, one token per line, in index order.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ChatbotError> {
        let mut writer = BufWriter::new(File::create(path)?);
        for index in 0..self.len() as i64 {
            writeln!(writer, "{}", self.id_to_token(index)?)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Builds a vocabulary from tokenized sentences. Special tokens come first, then corpus tokens by
    /// decreasing frequency (ties broken alphabetically so that builds are reproducible).
    ///
    /// # Arguments
    ///
    /// * `sentences` - iterator over tokenized sentences
    /// * `min_freq` - tokens seen fewer times are left out
    /// * `max_size` - optional cap on the number of corpus tokens
    pub fn build<'a, I>(
        sentences: I,
        min_freq: usize,
        max_size: Option<usize>,
    ) -> Result<Vocab, ChatbotError>
    where
        I: IntoIterator<Item = &'a Vec<String>>,
    {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for sentence in sentences {
            for token in sentence {
                *counts.entry(token.as_str()).or_insert(0) += 1;
            }
        }
        let specials = special_tokens();
        let mut corpus_tokens: Vec<(&str, usize)> = counts
            .into_iter()
            .filter(|(token, count)| *count >= min_freq.max(1) && !specials.iter().any(|s| s == token))
            .collect();
        corpus_tokens.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        if let Some(max_size) = max_size {
            corpus_tokens.truncate(max_size);
        }

        let mut tokens = specials;
        tokens.extend(corpus_tokens.into_iter().map(|(token, _)| token.to_string()));
        Vocab::from_tokens(tokens)
    }

    pub fn len(&self) -> usize {
        self.vocab.values().len()
    }

    pub fn is_empty(&self) -> bool {
        self.vocab.values().is_empty()
    }

    /// Index of a token, `<unk>` for tokens outside of the vocabulary.
    pub fn token_to_id(&self, token: &str) -> i64 {
        self.vocab.token_to_id(token)
    }

    /// Index of a special token (`<sos>`, `<eos>`, control tokens...).
    pub fn special_token_id(&self, token: &str) -> Result<i64, ChatbotError> {
        self.vocab.special_values().get(token).copied().ok_or_else(|| {
            ChatbotError::InvalidConfigurationError(format!(
                "token {} is not registered as a special token",
                token
            ))
        })
    }

    pub fn id_to_token(&self, id: i64) -> Result<&str, ChatbotError> {
        self.vocab
            .indices()
            .get(&id)
            .map(String::as_str)
            .ok_or(ChatbotError::OutOfVocabulary(id))
    }

    pub fn contains(&self, token: &str) -> bool {
        self.vocab.values().contains_key(token)
    }

    pub fn pad_index(&self) -> i64 {
        self.pad_index
    }

    pub fn unk_index(&self) -> i64 {
        self.unk_index
    }

    pub fn sos_index(&self) -> Result<i64, ChatbotError> {
        self.special_token_id(SOS_TOKEN)
    }

    pub fn eos_index(&self) -> Result<i64, ChatbotError> {
        self.special_token_id(EOS_TOKEN)
    }

    pub fn tokens_to_ids<S: AsRef<str>>(&self, tokens: &[S]) -> Vec<i64> {
        tokens
            .iter()
            .map(|token| self.token_to_id(token.as_ref()))
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn specials_have_fixed_indices() {
        let vocab = Vocab::from_tokens(special_tokens()).unwrap();
        assert_eq!(vocab.unk_index(), 0);
        assert_eq!(vocab.pad_index(), 1);
        assert_eq!(vocab.sos_index().unwrap(), 2);
        assert_eq!(vocab.eos_index().unwrap(), 3);
    }

    #[test]
    fn unknown_tokens_map_to_unk() {
        let vocab = Vocab::from_tokens(special_tokens()).unwrap();
        assert_eq!(vocab.token_to_id("없는말"), vocab.unk_index());
        assert!(vocab.id_to_token(10_000).is_err());
        assert!(vocab.id_to_token(-1).is_err());
    }

    #[test]
    fn special_tokens_are_required() {
        let tokens = vec![UNK_TOKEN.to_string(), PAD_TOKEN.to_string(), "안녕".to_string()];
        assert!(Vocab::from_tokens(tokens).is_err());
    }

    #[test]
    fn duplicated_tokens_keep_their_first_index() {
        let mut tokens = special_tokens();
        tokens.extend(vec!["밥".to_string(), "<pad>".to_string(), "먹어".to_string()]);
        let vocab = Vocab::from_tokens(tokens).unwrap();
        assert_eq!(vocab.len(), special_tokens().len() + 2);
        assert_eq!(vocab.pad_index(), 1);
        assert_eq!(vocab.token_to_id("먹어"), special_tokens().len() as i64 + 1);
        assert_eq!(vocab.id_to_token(vocab.token_to_id("먹어")).unwrap(), "먹어");
    }
}
