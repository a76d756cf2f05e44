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

//! # End-user pipelines
//!
//! #### 1. Sentiment analysis
//! Binary sentiment of Korean sentences, predicted by a frozen KoBERT classifier
//! (`sentiment::KoBertSentimentClassifier`). The label selects the sentiment control token of the
//! encoder sequence.
//!
//! #### 2. Reply generation
//! Greedy decoding of a reply conditioned on the sentiment of the input sentence
//! (`generation::ReplyGenerator`), followed by spacing correction (`spacing::Spacer`).
//!
//! #### 3. Console
//! Interactive loop reading sentences from an input stream and writing the detected sentiment
//! and reply (`console::run_console`).

pub mod console;
pub mod generation;
pub mod sentiment;
pub mod spacing;
