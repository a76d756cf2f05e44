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
use crate::pipelines::generation::ReplyGenerator;
use std::io::{BufRead, Write};
use tracing::debug;

pub const PROMPT: &str = "문장을 입력하세요 : ";

/// Interactive chat loop.
///
/// Prompts for a sentence, prints its detected sentiment and the generated reply, and repeats
/// until `input` reaches end of file. Blank lines are skipped.
///
/// # Returns
///
/// * The number of replies written
pub fn run_console<R: BufRead, W: Write>(
    generator: &ReplyGenerator,
    mut input: R,
    mut output: W,
) -> Result<usize, ChatbotError> {
    let mut replies = 0;
    let mut line = String::new();
    loop {
        write!(output, "{}", PROMPT)?;
        output.flush()?;
        line.clear();
        if input.read_line(&mut line)? == 0 {
            writeln!(output)?;
            break;
        }
        let sentence = line.trim();
        if sentence.is_empty() {
            continue;
        }
        let reply = generator.reply(sentence)?;
        if !reply.finished {
            debug!(tokens = reply.tokens.len(), "reply truncated at the length bound");
        }
        writeln!(output, "{}", reply.sentiment.display_name())?;
        writeln!(output, "> {}", reply.text)?;
        writeln!(output)?;
        replies += 1;
    }
    Ok(replies)
}
