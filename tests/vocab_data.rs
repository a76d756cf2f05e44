extern crate anyhow;
extern crate tempfile;

use ko_chatbot::data::{Batcher, ChatDataset, ChatExample};
use ko_chatbot::pipelines::sentiment::{Sentiment, SentimentClassifier};
use ko_chatbot::tokenization::{TextTokenizer, WhitespaceTokenizer};
use ko_chatbot::vocab::{special_tokens, Vocab, PAD_TOKEN, UNK_TOKEN};
use ko_chatbot::ChatbotError;
use std::convert::TryFrom;
use std::io::Write;
use tch::Device;

struct KeywordClassifier;

impl SentimentClassifier for KeywordClassifier {
    fn predict(&self, input: &[&str]) -> Result<Vec<Sentiment>, ChatbotError> {
        Ok(input
            .iter()
            .map(|sentence| {
                if sentence.contains("좋") {
                    Sentiment::Positive
                } else {
                    Sentiment::Negative
                }
            })
            .collect())
    }
}

fn write_csv(content: &str) -> anyhow::Result<tempfile::NamedTempFile> {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(content.as_bytes())?;
    file.flush()?;
    Ok(file)
}

#[test]
fn vocabulary_orders_tokens_by_frequency() -> anyhow::Result<()> {
    let tokenizer = WhitespaceTokenizer;
    let sentences: Vec<Vec<String>> = ["오늘 날씨 좋다", "오늘 기분 좋다!", "오늘 뭐 해?"]
        .iter()
        .map(|sentence| tokenizer.tokenize(sentence))
        .collect();
    let vocab = Vocab::build(&sentences, 1, None)?;
    let specials = special_tokens();

    assert_eq!(vocab.id_to_token(0)?, UNK_TOKEN);
    assert_eq!(vocab.id_to_token(1)?, PAD_TOKEN);
    assert_eq!(vocab.id_to_token(specials.len() as i64)?, "오늘");
    assert_eq!(vocab.id_to_token(specials.len() as i64 + 1)?, "좋다");
    assert_eq!(vocab.len(), specials.len() + 8);

    let frequent = Vocab::build(&sentences, 2, None)?;
    assert_eq!(frequent.len(), specials.len() + 2);
    assert_eq!(frequent.token_to_id("날씨"), frequent.unk_index());

    let capped = Vocab::build(&sentences, 1, Some(1))?;
    assert_eq!(capped.len(), specials.len() + 1);

    //    Saved vocabularies reload with the same indices
    let directory = tempfile::tempdir()?;
    let path = directory.path().join("target.vocab");
    vocab.save(&path)?;
    let reloaded = Vocab::from_file(&path)?;
    assert_eq!(reloaded.len(), vocab.len());
    for sentence in &sentences {
        assert_eq!(reloaded.tokens_to_ids(sentence), vocab.tokens_to_ids(sentence));
    }
    Ok(())
}

#[test]
fn csv_rows_are_read_and_labelled() -> anyhow::Result<()> {
    let file = write_csv(
        "Q,A,label\n\
         12시 땡!,하루가 또 가네요.,0\n\
         오늘 기분 좋아,다행이에요.,\n\
         ,빈 질문,1\n\
         비 온다,우산 챙기세요.,1\n",
    )?;
    let mut dataset = ChatDataset::from_csv(file.path())?;
    assert_eq!(dataset.len(), 3);
    assert_eq!(dataset.examples()[0].question, "12시 땡!");
    assert_eq!(dataset.examples()[0].sentiment, Some(Sentiment::Negative));
    assert_eq!(dataset.examples()[1].sentiment, None);
    assert_eq!(dataset.unlabelled_count(), 1);

    //    Labelled rows keep their label, missing ones come from the classifier
    assert_eq!(dataset.label_missing(&KeywordClassifier, 2)?, 1);
    assert_eq!(dataset.unlabelled_count(), 0);
    assert_eq!(dataset.examples()[1].sentiment, Some(Sentiment::Positive));
    assert_eq!(dataset.examples()[2].sentiment, Some(Sentiment::Positive));
    Ok(())
}

#[test]
fn csv_without_label_column_is_unlabelled() -> anyhow::Result<()> {
    let file = write_csv("Q,A\n안녕,안녕하세요\n")?;
    let dataset = ChatDataset::from_csv(file.path())?;
    assert_eq!(dataset.unlabelled_count(), 1);

    let invalid = write_csv("Q,A,label\n안녕,안녕하세요,2\n")?;
    assert!(matches!(
        ChatDataset::from_csv(invalid.path()),
        Err(ChatbotError::DatasetError(_))
    ));
    Ok(())
}

#[test]
fn split_is_seeded_and_exhaustive() -> anyhow::Result<()> {
    let dataset = ChatDataset::new(
        (0..10)
            .map(|index| ChatExample {
                question: format!("질문 {}", index),
                answer: format!("답변 {}", index),
                sentiment: Some(Sentiment::Positive),
            })
            .collect(),
    );
    let (train, test) = dataset.split(0.8, 1234)?;
    assert_eq!(train.len(), 8);
    assert_eq!(test.len(), 2);

    let (train_again, _) = dataset.split(0.8, 1234)?;
    assert_eq!(train.examples(), train_again.examples());

    let mut questions: Vec<&str> = train
        .examples()
        .iter()
        .chain(test.examples())
        .map(|example| example.question.as_str())
        .collect();
    questions.sort_unstable();
    questions.dedup();
    assert_eq!(questions.len(), 10);

    assert!(dataset.split(1.0, 1234).is_err());
    Ok(())
}

#[test]
fn batches_are_padded_to_max_len() -> anyhow::Result<()> {
    let dataset = ChatDataset::new(vec![
        ChatExample {
            question: "배고파".to_string(),
            answer: "밥 먹어".to_string(),
            sentiment: Some(Sentiment::Negative),
        },
        ChatExample {
            question: "오늘 시험 정말 잘 봤어".to_string(),
            answer: "정말 축하해 ! 고생 많았어".to_string(),
            sentiment: Some(Sentiment::Positive),
        },
        ChatExample {
            question: "심심해".to_string(),
            answer: "놀자".to_string(),
            sentiment: None,
        },
    ]);
    let tokenizer = WhitespaceTokenizer;
    let (questions, answers) = dataset.tokenized(&tokenizer);
    let source_vocab = Vocab::build(&questions, 1, None)?;
    let target_vocab = Vocab::build(&answers, 1, None)?;

    //    Every example needs a label
    assert!(Batcher::new(&dataset, &tokenizer, &source_vocab, &target_vocab, 5, Device::Cpu).is_err());

    let labelled = ChatDataset::new(dataset.examples()[..2].to_vec());
    let batcher = Batcher::new(&labelled, &tokenizer, &source_vocab, &target_vocab, 5, Device::Cpu)?;
    let batches = batcher.batches(2, None)?;
    assert_eq!(batches.len(), 1);
    let batch = &batches[0];
    assert_eq!(batch.size(), 2);
    assert_eq!(batch.enc_input.size(), vec![2, 5]);
    assert_eq!(batch.dec_input.size(), vec![2, 5]);
    assert_eq!(Vec::<i64>::try_from(&batch.sentiment)?, vec![0, 1]);

    let sos = target_vocab.sos_index()?;
    let eos = target_vocab.eos_index()?;
    let pad = target_vocab.pad_index();
    let dec = Vec::<i64>::try_from(&batch.dec_input.reshape([-1]))?;
    let mut short_answer = vec![sos];
    short_answer.extend(target_vocab.tokens_to_ids(&["밥", "먹어"]));
    short_answer.extend(vec![eos, pad]);
    assert_eq!(&dec[..5], short_answer.as_slice());
    assert_eq!(dec[5], sos);
    assert!(!dec[5..].contains(&eos));

    assert_eq!(batcher.batches(1, Some(3))?.len(), 2);
    assert!(batcher.batches(0, None).is_err());
    Ok(())
}
