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
use crate::pipelines::spacing::{SentencePieceSpacer, Spacer, WhitespaceSpacer};
use rust_tokenizers::tokenizer::{SentencePieceTokenizer, Tokenizer};
use rust_tokenizers::vocab::{BertVocab, Vocab};
use rust_tokenizers::{Mask, Token, TokenIdsWithOffsets, TokenIdsWithSpecialTokens, TokenRef};
use std::path::Path;

/// # Text tokenizer
/// Splits raw text into token strings, which are then mapped to indices by a `Vocab`.
pub trait TextTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String>;

    /// Spacing correction turning generated tokens, joined by single spaces, back into text.
    fn spacer(&self) -> Box<dyn Spacer> {
        Box::new(WhitespaceSpacer)
    }
}

/// Splits on whitespace and detaches sentence punctuation (`.`, `?`, `!`, `,`, `~`) into their own tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceTokenizer;

impl WhitespaceTokenizer {
    fn is_punctuation(c: char) -> bool {
        matches!(c, '.' | '?' | '!' | ',' | '~')
    }
}

impl TextTokenizer for WhitespaceTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        let mut tokens = Vec::new();
        for word in text.split_whitespace() {
            let mut current = String::new();
            for c in word.chars() {
                if WhitespaceTokenizer::is_punctuation(c) {
                    if !current.is_empty() {
                        tokens.push(std::mem::take(&mut current));
                    }
                    tokens.push(c.to_string());
                } else {
                    current.push(c);
                }
            }
            if !current.is_empty() {
                tokens.push(current);
            }
        }
        tokens
    }
}

/// SentencePiece tokenizer for chat data. Pieces keep the `▁` word-start marker, which the
/// associated `SentencePieceSpacer` turns back into spaces.
pub struct SentencePieceTextTokenizer {
    tokenizer: SentencePieceTokenizer,
}

impl SentencePieceTextTokenizer {
    /// Loads a SentencePiece model file (`.model` / `.spiece`).
    pub fn from_file<P: AsRef<Path>>(
        model_path: P,
        lower_case: bool,
    ) -> Result<SentencePieceTextTokenizer, ChatbotError> {
        let tokenizer = SentencePieceTokenizer::from_file(model_path.as_ref(), lower_case)?;
        Ok(SentencePieceTextTokenizer { tokenizer })
    }
}

impl TextTokenizer for SentencePieceTextTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        self.tokenizer.tokenize(text)
    }

    fn spacer(&self) -> Box<dyn Spacer> {
        Box::new(SentencePieceSpacer)
    }
}

/// # KoBERT tokenizer
/// SentencePiece segmentation looked up in the KoBERT `vocab.txt` (`[UNK]`, `[PAD]`, `[CLS]`,
/// `[SEP]`, `[MASK]`), with BERT-style `[CLS] A [SEP] (B [SEP])` inputs.
pub struct KoBertTokenizer {
    pieces: SentencePieceTokenizer,
    vocab: BertVocab,
}

impl KoBertTokenizer {
    /// Create a new instance of a `KoBertTokenizer`
    ///
    /// # Arguments
    ///
    /// * `model_path` - SentencePiece model used for segmentation
    /// * `vocab_path` - flat KoBERT vocabulary, the line number being the token index
    pub fn from_files<P: AsRef<Path>, V: AsRef<Path>>(
        model_path: P,
        vocab_path: V,
    ) -> Result<KoBertTokenizer, ChatbotError> {
        let pieces = SentencePieceTokenizer::from_file(model_path.as_ref(), false)?;
        let vocab = BertVocab::from_file(vocab_path)?;
        Ok(KoBertTokenizer { pieces, vocab })
    }
}

impl Tokenizer<BertVocab> for KoBertTokenizer {
    fn vocab(&self) -> &BertVocab {
        &self.vocab
    }

    fn vocab_mut(&mut self) -> &mut BertVocab {
        &mut self.vocab
    }

    fn tokenize_to_tokens(&self, text: TokenRef) -> Vec<Token> {
        self.pieces.tokenize_to_tokens(text)
    }

    fn convert_tokens_to_string(&self, tokens: Vec<String>) -> String {
        self.pieces.convert_tokens_to_string(tokens)
    }

    fn build_input_with_special_tokens(
        &self,
        tokens_ids_with_offsets_1: TokenIdsWithOffsets,
        tokens_ids_with_offsets_2: Option<TokenIdsWithOffsets>,
    ) -> TokenIdsWithSpecialTokens {
        let cls = self.vocab.token_to_id(self.vocab.get_cls_value());
        let sep = self.vocab.token_to_id(self.vocab.get_sep_value());
        let first_length = tokens_ids_with_offsets_1.ids.len();

        let mut token_ids = vec![cls];
        token_ids.extend(tokens_ids_with_offsets_1.ids);
        token_ids.push(sep);
        let mut segment_ids = vec![0; first_length + 2];
        let mut special_tokens_mask = vec![1];
        special_tokens_mask.extend(vec![0; first_length]);
        special_tokens_mask.push(1);
        let mut token_offsets = vec![None];
        token_offsets.extend(tokens_ids_with_offsets_1.offsets);
        token_offsets.push(None);
        let mut reference_offsets = vec![vec![]];
        reference_offsets.extend(tokens_ids_with_offsets_1.reference_offsets);
        reference_offsets.push(vec![]);
        let mut mask = vec![Mask::Special];
        mask.extend(tokens_ids_with_offsets_1.masks);
        mask.push(Mask::Special);

        if let Some(second) = tokens_ids_with_offsets_2 {
            let second_length = second.ids.len();
            token_ids.extend(second.ids);
            token_ids.push(sep);
            segment_ids.extend(vec![1; second_length + 1]);
            special_tokens_mask.extend(vec![0; second_length]);
            special_tokens_mask.push(1);
            token_offsets.extend(second.offsets);
            token_offsets.push(None);
            reference_offsets.extend(second.reference_offsets);
            reference_offsets.push(vec![]);
            mask.extend(second.masks);
            mask.push(Mask::Special);
        }
        TokenIdsWithSpecialTokens {
            token_ids,
            segment_ids,
            special_tokens_mask,
            token_offsets,
            reference_offsets,
            mask,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn punctuation_is_detached() {
        let tokens = WhitespaceTokenizer.tokenize("오늘 날씨 좋네요!  정말?");
        assert_eq!(tokens, vec!["오늘", "날씨", "좋네요", "!", "정말", "?"]);
    }
}
