extern crate anyhow;

use ko_chatbot::pipelines::console::{run_console, PROMPT};
use ko_chatbot::pipelines::generation::{greedy_decode, ReplyGenerator};
use ko_chatbot::pipelines::sentiment::{Sentiment, SentimentClassifier};
use ko_chatbot::pipelines::spacing::{SentencePieceSpacer, Spacer};
use ko_chatbot::styling::{Style, Styler};
use ko_chatbot::tokenization::{TextTokenizer, WhitespaceTokenizer};
use ko_chatbot::transformer::{ChatTransformer, Seq2SeqModel, TransformerConfig};
use ko_chatbot::vocab::{special_tokens, Vocab, POSITIVE_TOKEN};
use ko_chatbot::{ChatbotConfig, ChatbotError};
use std::cell::RefCell;
use std::convert::TryFrom;
use std::io::Cursor;
use tch::{nn, Device, Tensor};

fn vocab(words: &[&str]) -> anyhow::Result<Vocab> {
    let mut tokens = special_tokens();
    tokens.extend(words.iter().map(|word| word.to_string()));
    Ok(Vocab::from_tokens(tokens)?)
}

/// Emits `script[i]` at decoder position `i`, then `fallback`, and records the encoder inputs it sees.
struct ScriptedModel {
    script: Vec<i64>,
    fallback: i64,
    vocab_size: i64,
    encoder_inputs: RefCell<Vec<Vec<i64>>>,
}

impl ScriptedModel {
    fn new(script: Vec<i64>, fallback: i64, vocab_size: i64) -> ScriptedModel {
        ScriptedModel {
            script,
            fallback,
            vocab_size,
            encoder_inputs: RefCell::new(Vec::new()),
        }
    }
}

impl Seq2SeqModel for ScriptedModel {
    fn forward_t(&self, enc_input: &Tensor, dec_input: &Tensor, _train: bool) -> Tensor {
        self.encoder_inputs
            .borrow_mut()
            .push(Vec::<i64>::try_from(&enc_input.reshape([-1])).unwrap());
        let steps = dec_input.size()[1];
        let mut logits = vec![0f32; (steps * self.vocab_size) as usize];
        for position in 0..steps {
            let token = self
                .script
                .get(position as usize)
                .copied()
                .unwrap_or(self.fallback);
            logits[(position * self.vocab_size + token) as usize] = 10.0;
        }
        Tensor::from_slice(&logits).view([1, steps, self.vocab_size])
    }
}

struct FixedClassifier(Sentiment);

impl SentimentClassifier for FixedClassifier {
    fn predict(&self, input: &[&str]) -> Result<Vec<Sentiment>, ChatbotError> {
        Ok(vec![self.0; input.len()])
    }
}

#[test]
fn decoding_stops_at_eos() -> anyhow::Result<()> {
    let target_vocab = vocab(&["밥", "먹어"])?;
    let eos = target_vocab.eos_index()?;
    let words = target_vocab.tokens_to_ids(&["밥", "먹어"]);
    let model = ScriptedModel::new(vec![words[0], words[1], eos], words[0], target_vocab.len() as i64);
    let enc_input = Tensor::from_slice(&[7i64, 4, 1, 1]).view([1, 4]);

    let output = greedy_decode(&model, &enc_input, &target_vocab, 10)?;
    assert_eq!(output.tokens, words);
    assert!(output.finished);
    assert_eq!(model.encoder_inputs.borrow().len(), 3);
    Ok(())
}

#[test]
fn decoding_stops_at_length_bound() -> anyhow::Result<()> {
    let target_vocab = vocab(&["네"])?;
    let word = target_vocab.token_to_id("네");
    let model = ScriptedModel::new(Vec::new(), word, target_vocab.len() as i64);
    let enc_input = Tensor::from_slice(&[7i64, 4, 1, 1]).view([1, 4]);

    let output = greedy_decode(&model, &enc_input, &target_vocab, 5)?;
    assert_eq!(output.tokens, vec![word; 5]);
    assert!(!output.finished);

    let empty = greedy_decode(&model, &enc_input, &target_vocab, 0)?;
    assert!(empty.tokens.is_empty());
    assert!(!empty.finished);

    let batched = Tensor::from_slice(&[7i64, 4, 7, 4]).view([2, 2]);
    assert!(greedy_decode(&model, &batched, &target_vocab, 5).is_err());
    Ok(())
}

#[test]
fn decoding_is_deterministic() -> anyhow::Result<()> {
    tch::manual_seed(11);
    let config = ChatbotConfig {
        embedding_dim: 16,
        nlayers: 1,
        nhead: 2,
        ..Default::default()
    };
    let source_vocab = vocab(&["안녕", "반가워"])?;
    let target_vocab = vocab(&["안녕하세요", "반갑습니다"])?;
    let model_config = TransformerConfig::from_chatbot_config(
        &config,
        source_vocab.len() as i64,
        target_vocab.len() as i64,
        source_vocab.pad_index(),
        target_vocab.pad_index(),
    );
    let vs = nn::VarStore::new(Device::Cpu);
    let model = ChatTransformer::new(vs.root(), &model_config)?;
    let mut row = source_vocab.tokens_to_ids(&["안녕", "반가워"]);
    row.push(source_vocab.special_token_id(POSITIVE_TOKEN)?);
    row.resize(8, source_vocab.pad_index());
    let enc_input = Tensor::from_slice(&row).view([1, 8]);

    let first = greedy_decode(&model, &enc_input, &target_vocab, 8)?;
    let second = greedy_decode(&model, &enc_input, &target_vocab, 8)?;
    assert_eq!(first, second);
    assert!(first.tokens.len() <= 8);
    Ok(())
}

#[test]
fn positive_formal_reply() -> anyhow::Result<()> {
    let source_vocab = vocab(&["시험", "잘", "봤어"])?;
    let target_vocab = vocab(&["정말", "축하합니다", "."])?;
    let max_len = 10;
    let styler = Styler::new(&source_vocab, &target_vocab, max_len)?;
    let eos = target_vocab.eos_index()?;

    //    The decoder emits the formal marker first, which must not reach the reply text
    let mut script = vec![styler.marker_id(Style::Formal, Sentiment::Positive)];
    script.extend(target_vocab.tokens_to_ids(&["정말", "축하합니다", "."]));
    script.push(eos);
    let model = ScriptedModel::new(script.clone(), eos, target_vocab.len() as i64);
    let classifier = FixedClassifier(Sentiment::Positive);
    let tokenizer = WhitespaceTokenizer;
    let generator = ReplyGenerator::new(
        &model,
        &classifier,
        &tokenizer,
        &styler,
        &source_vocab,
        &target_vocab,
        Device::Cpu,
    );

    let reply = generator.reply("시험 잘 봤어")?;
    assert_eq!(reply.sentiment, Sentiment::Positive);
    assert_eq!(reply.text, "정말 축하합니다.");
    assert_eq!(reply.tokens, &script[..4]);
    assert!(reply.finished);

    //    Encoder input: sentence tokens, <posi>, padding up to max_len
    let mut expected = source_vocab.tokens_to_ids(&["시험", "잘", "봤어"]);
    expected.push(source_vocab.special_token_id(POSITIVE_TOKEN)?);
    expected.resize(max_len, source_vocab.pad_index());
    assert!(model
        .encoder_inputs
        .borrow()
        .iter()
        .all(|encoder_input| *encoder_input == expected));
    Ok(())
}

/// Pre-segmented pieces separated by spaces, decoded like SentencePiece output.
struct PieceTokenizer;

impl TextTokenizer for PieceTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        text.split_whitespace().map(String::from).collect()
    }

    fn spacer(&self) -> Box<dyn Spacer> {
        Box::new(SentencePieceSpacer)
    }
}

#[test]
fn sentencepiece_reply_is_decoded() -> anyhow::Result<()> {
    let source_vocab = vocab(&["▁시험", "▁잘", "▁봤어"])?;
    let target_vocab = vocab(&["▁정말", "▁축하", "합니다", "."])?;
    let styler = Styler::new(&source_vocab, &target_vocab, 10)?;
    let eos = target_vocab.eos_index()?;
    let mut script = vec![styler.marker_id(Style::Formal, Sentiment::Positive)];
    script.extend(target_vocab.tokens_to_ids(&["▁정말", "▁축하", "합니다", "."]));
    script.push(eos);
    let model = ScriptedModel::new(script, eos, target_vocab.len() as i64);
    let classifier = FixedClassifier(Sentiment::Positive);
    let generator = ReplyGenerator::new(
        &model,
        &classifier,
        &PieceTokenizer,
        &styler,
        &source_vocab,
        &target_vocab,
        Device::Cpu,
    );

    //    Pieces are concatenated and word markers turned into spaces
    let reply = generator.reply("▁시험 ▁잘 ▁봤어")?;
    assert_eq!(reply.text, "정말 축하합니다.");
    assert!(!reply.text.contains('▁'));
    assert_eq!(reply.tokens.len(), 5);
    Ok(())
}

#[test]
fn console_answers_until_end_of_input() -> anyhow::Result<()> {
    let source_vocab = vocab(&["배고파"])?;
    let target_vocab = vocab(&["밥", "먹어"])?;
    let styler = Styler::new(&source_vocab, &target_vocab, 6)?;
    let eos = target_vocab.eos_index()?;
    let mut script = vec![styler.marker_id(Style::Casual, Sentiment::Negative)];
    script.extend(target_vocab.tokens_to_ids(&["밥", "먹어"]));
    script.push(eos);
    let model = ScriptedModel::new(script, eos, target_vocab.len() as i64);
    let classifier = FixedClassifier(Sentiment::Negative);
    let generator = ReplyGenerator::new(
        &model,
        &classifier,
        &WhitespaceTokenizer,
        &styler,
        &source_vocab,
        &target_vocab,
        Device::Cpu,
    );

    let mut output = Vec::new();
    let replies = run_console(&generator, Cursor::new("배고파\n   \n배고파\n"), &mut output)?;
    let output = String::from_utf8(output)?;

    assert_eq!(replies, 2);
    assert_eq!(output.matches(PROMPT).count(), 4);
    assert_eq!(output.matches("부정\n> 밥 먹어\n").count(), 2);
    Ok(())
}
