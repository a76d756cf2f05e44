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

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use ko_chatbot::data::{Batcher, ChatDataset};
use ko_chatbot::pipelines::console::run_console;
use ko_chatbot::pipelines::generation::ReplyGenerator;
use ko_chatbot::pipelines::sentiment::{KoBertSentimentClassifier, SentimentResources};
use ko_chatbot::styling::Styler;
use ko_chatbot::tokenization::{SentencePieceTextTokenizer, TextTokenizer, WhitespaceTokenizer};
use ko_chatbot::training::{CheckpointManager, Trainer};
use ko_chatbot::transformer::{ChatTransformer, TransformerConfig};
use ko_chatbot::vocab::Vocab;
use ko_chatbot::{ChatbotConfig, Config};
use std::io;
use std::path::{Path, PathBuf};
use tch::{nn, Device, Tensor};
use tracing::info;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum TokenizerKind {
    /// Whitespace split, sentence punctuation detached
    Whitespace,
    /// SentencePiece pieces from `--sentencepiece-model`
    Sentencepiece,
}

/// Train the sentiment and style conditioned chatbot, then chat with it
#[derive(Parser, Debug)]
#[command(name = "ko-chatbot", version)]
struct Cli {
    /// JSON file with the hyperparameters, flags below take precedence over it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Q,A,label CSV file with the chat pairs
    #[arg(long, default_value = "data/chatbot_data.csv")]
    data: PathBuf,

    /// Best model checkpoint, written as <checkpoint>.ot with a <checkpoint>.json record
    #[arg(long, default_value = "sorted_model")]
    checkpoint: PathBuf,

    /// Directory holding source.vocab and target.vocab
    #[arg(long, default_value = "vocab")]
    vocab_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = TokenizerKind::Whitespace)]
    tokenizer: TokenizerKind,

    /// KoBERT classifier configuration
    #[arg(long, default_value = "kobert/config.json")]
    classifier_config: PathBuf,

    /// KoBERT classifier weights
    #[arg(long, default_value = "kobert/bert_SA-model.ot")]
    classifier_weights: PathBuf,

    /// KoBERT vocabulary
    #[arg(long, default_value = "kobert/vocab.txt")]
    classifier_vocab: PathBuf,

    /// SentencePiece model of KoBERT
    #[arg(long, default_value = "kobert/tokenizer.model")]
    sentencepiece_model: PathBuf,

    /// Pretrained source word vectors, a (source vocab size, embedding_dim) tensor
    #[arg(long, requires = "pretrained_trg_vectors")]
    pretrained_src_vectors: Option<PathBuf>,

    /// Pretrained target word vectors, a (target vocab size, embedding_dim) tensor
    #[arg(long, requires = "pretrained_src_vectors")]
    pretrained_trg_vectors: Option<PathBuf>,

    #[arg(long)]
    max_len: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    num_epochs: Option<usize>,

    #[arg(long)]
    warming_up_epochs: Option<usize>,

    #[arg(long)]
    lr: Option<f64>,

    #[arg(long)]
    embedding_dim: Option<i64>,

    #[arg(long)]
    nlayers: Option<i64>,

    #[arg(long)]
    nhead: Option<i64>,

    #[arg(long)]
    dropout: Option<f64>,

    /// Run the training loop before evaluation and inference
    #[arg(long)]
    train: Option<bool>,

    #[arg(long)]
    seed: Option<i64>,
}

fn override_with<T: Copy>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

impl Cli {
    fn chatbot_config(&self) -> Result<ChatbotConfig> {
        let mut config = match &self.config {
            Some(path) => ChatbotConfig::from_file(path)
                .with_context(|| format!("loading configuration {}", path.display()))?,
            None => ChatbotConfig::default(),
        };
        override_with(&mut config.max_len, self.max_len);
        override_with(&mut config.batch_size, self.batch_size);
        override_with(&mut config.num_epochs, self.num_epochs);
        override_with(&mut config.warming_up_epochs, self.warming_up_epochs);
        override_with(&mut config.lr, self.lr);
        override_with(&mut config.embedding_dim, self.embedding_dim);
        override_with(&mut config.nlayers, self.nlayers);
        override_with(&mut config.nhead, self.nhead);
        override_with(&mut config.dropout, self.dropout);
        override_with(&mut config.train, self.train);
        override_with(&mut config.seed, self.seed);
        config.validate()?;
        Ok(config)
    }

    fn text_tokenizer(&self) -> Result<Box<dyn TextTokenizer>> {
        Ok(match self.tokenizer {
            TokenizerKind::Whitespace => Box::new(WhitespaceTokenizer),
            TokenizerKind::Sentencepiece => Box::new(SentencePieceTextTokenizer::from_file(
                &self.sentencepiece_model,
                false,
            )?),
        })
    }
}

fn vocabularies(
    vocab_dir: &Path,
    build_from: Option<(&ChatDataset, &dyn TextTokenizer)>,
) -> Result<(Vocab, Vocab)> {
    let source_path = vocab_dir.join("source.vocab");
    let target_path = vocab_dir.join("target.vocab");
    match build_from {
        Some((dataset, tokenizer)) => {
            let (questions, answers) = dataset.tokenized(tokenizer);
            let source_vocab = Vocab::build(&questions, 1, None)?;
            let target_vocab = Vocab::build(&answers, 1, None)?;
            std::fs::create_dir_all(vocab_dir)?;
            source_vocab.save(&source_path)?;
            target_vocab.save(&target_path)?;
            info!(
                source = source_vocab.len(),
                target = target_vocab.len(),
                "vocabularies built"
            );
            Ok((source_vocab, target_vocab))
        }
        None => Ok((
            Vocab::from_file(&source_path)
                .with_context(|| format!("loading {}", source_path.display()))?,
            Vocab::from_file(&target_path)
                .with_context(|| format!("loading {}", target_path.display()))?,
        )),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ko_chatbot=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.chatbot_config()?;
    info!(?config, "configuration");
    tch::manual_seed(config.seed);
    let device = Device::cuda_if_available();

    let resources = SentimentResources {
        config: cli.classifier_config.clone(),
        weights: cli.classifier_weights.clone(),
        vocab: cli.classifier_vocab.clone(),
        sentencepiece_model: cli.sentencepiece_model.clone(),
    };
    let classifier = KoBertSentimentClassifier::new(&resources, config.classifier_max_len, device)
        .context("loading the sentiment classifier")?;

    let mut dataset = ChatDataset::from_csv(&cli.data)
        .with_context(|| format!("loading {}", cli.data.display()))?;
    let unlabelled = dataset.label_missing(&classifier, config.batch_size)?;
    if unlabelled > 0 {
        info!(unlabelled, "sentiment labels filled by the classifier");
    }
    let (train_set, test_set) = dataset.split(config.train_ratio, config.seed)?;
    info!(
        train = train_set.len(),
        test = test_set.len(),
        "dataset split"
    );

    let tokenizer = cli.text_tokenizer()?;
    let (source_vocab, target_vocab) = vocabularies(
        &cli.vocab_dir,
        if config.train {
            Some((&train_set, tokenizer.as_ref()))
        } else {
            None
        },
    )?;

    let mut vs = nn::VarStore::new(device);
    let model_config = TransformerConfig::from_chatbot_config(
        &config,
        source_vocab.len() as i64,
        target_vocab.len() as i64,
        source_vocab.pad_index(),
        target_vocab.pad_index(),
    );
    let mut model = ChatTransformer::new(vs.root(), &model_config)?;
    if let (Some(src_path), Some(trg_path)) = (&cli.pretrained_src_vectors, &cli.pretrained_trg_vectors) {
        model.load_pretrained_embeddings(&Tensor::load(src_path)?, &Tensor::load(trg_path)?)?;
        info!("pretrained word vectors loaded");
    }

    let styler = Styler::new(&source_vocab, &target_vocab, config.max_len)?;
    let test_batches = Batcher::new(
        &test_set,
        tokenizer.as_ref(),
        &source_vocab,
        &target_vocab,
        config.max_len,
        device,
    )?;
    let mut trainer = Trainer::new(
        &config,
        &styler,
        &target_vocab,
        CheckpointManager::new(&cli.checkpoint),
    )?;

    if config.train {
        let train_batches = Batcher::new(
            &train_set,
            tokenizer.as_ref(),
            &source_vocab,
            &target_vocab,
            config.max_len,
            device,
        )?;
        trainer.fit(&model, &vs, &train_batches, &test_batches)?;
        if trainer.checkpoint().best().is_none() {
            bail!("training never produced a finite validation loss, no checkpoint was saved");
        }
    }

    info!("----------성능평가----------");
    trainer.checkpoint().load(&mut vs)?;
    let record = trainer.checkpoint().read_record()?;
    info!(epoch = record.epoch, valid_loss = record.valid_loss, "best checkpoint loaded");
    let test_metrics = trainer.evaluate(&model, &test_batches.batches(config.batch_size, None)?)?;
    info!(
        "==test_loss : {:.3} | test_acc: {:.3}==",
        test_metrics.loss, test_metrics.accuracy
    );

    let generator = ReplyGenerator::new(
        &model,
        &classifier,
        tokenizer.as_ref(),
        &styler,
        &source_vocab,
        &target_vocab,
        device,
    );
    let stdin = io::stdin();
    let stdout = io::stdout();
    run_console(&generator, stdin.lock(), stdout.lock())?;
    Ok(())
}
