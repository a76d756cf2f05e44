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

/// # Spacing correction
/// Turns a string of generated tokens into human-readable text.
pub trait Spacer {
    fn space(&self, text: &str) -> String;
}

/// Collapses whitespace runs and attaches sentence punctuation to the preceding word, undoing the
/// punctuation split of `WhitespaceTokenizer`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceSpacer;

impl WhitespaceSpacer {
    fn is_attached(word: &str) -> bool {
        !word.is_empty()
            && word
                .chars()
                .all(|c| matches!(c, '.' | '?' | '!' | ',' | '~'))
    }
}

impl Spacer for WhitespaceSpacer {
    fn space(&self, text: &str) -> String {
        let mut output = String::with_capacity(text.len());
        for word in text.split_whitespace() {
            if !output.is_empty() && !WhitespaceSpacer::is_attached(word) {
                output.push(' ');
            }
            output.push_str(word);
        }
        output
    }
}

/// Decodes SentencePiece pieces: pieces are concatenated, `▁` word-start markers become spaces,
/// then punctuation is attached as by `WhitespaceSpacer`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SentencePieceSpacer;

const WORD_START: char = '\u{2581}';

impl Spacer for SentencePieceSpacer {
    fn space(&self, text: &str) -> String {
        let pieces: String = text.split_whitespace().collect();
        WhitespaceSpacer.space(&pieces.replace(WORD_START, " "))
    }
}
