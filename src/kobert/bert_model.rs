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
use crate::common::{Activation, Config, Dropout};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use tch::kind::Kind::{Float, Int64};
use tch::nn::EmbeddingConfig;
use tch::{nn, Tensor};

#[derive(Debug, Serialize, Deserialize, Clone)]
/// # KoBERT model configuration
/// Architecture of the BERT encoder used by the sentiment classifier. Field names follow the
/// `config.json` exported along with the KoBERT weights.
pub struct BertConfig {
    pub hidden_act: Activation,
    pub attention_probs_dropout_prob: f64,
    pub hidden_dropout_prob: f64,
    pub hidden_size: i64,
    pub intermediate_size: i64,
    pub max_position_embeddings: i64,
    pub num_attention_heads: i64,
    pub num_hidden_layers: i64,
    pub type_vocab_size: i64,
    pub vocab_size: i64,
    pub layer_norm_eps: Option<f64>,
    pub pad_token_id: Option<i64>,
    /// Number of sentiment classes of the classification head, 2 if not provided
    pub num_labels: Option<i64>,
    /// Dropout applied on the pooled output before classification (`dr_rate`), 0.5 if not provided
    pub classifier_dropout: Option<f64>,
}

impl Config for BertConfig {}

impl Default for BertConfig {
    fn default() -> Self {
        BertConfig {
            hidden_act: Activation::gelu,
            attention_probs_dropout_prob: 0.1,
            hidden_dropout_prob: 0.1,
            hidden_size: 768,
            intermediate_size: 3072,
            max_position_embeddings: 512,
            num_attention_heads: 12,
            num_hidden_layers: 12,
            type_vocab_size: 2,
            vocab_size: 8002,
            layer_norm_eps: Some(1e-12),
            pad_token_id: Some(1),
            num_labels: Some(2),
            classifier_dropout: Some(0.5),
        }
    }
}

fn layer_norm<'p, P>(p: P, config: &BertConfig) -> nn::LayerNorm
where
    P: Borrow<nn::Path<'p>>,
{
    let layer_norm_config = nn::LayerNormConfig {
        eps: config.layer_norm_eps.unwrap_or(1e-12),
        ..Default::default()
    };
    nn::layer_norm(p.borrow() / "LayerNorm", vec![config.hidden_size], layer_norm_config)
}

#[derive(Debug)]
pub struct BertEmbeddings {
    word_embeddings: nn::Embedding,
    position_embeddings: nn::Embedding,
    token_type_embeddings: nn::Embedding,
    layer_norm: nn::LayerNorm,
    dropout: Dropout,
}

impl BertEmbeddings {
    pub fn new<'p, P>(p: P, config: &BertConfig) -> BertEmbeddings
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow();

        let embedding_config = EmbeddingConfig {
            padding_idx: config.pad_token_id.unwrap_or(1),
            ..Default::default()
        };
        let word_embeddings = nn::embedding(
            p / "word_embeddings",
            config.vocab_size,
            config.hidden_size,
            embedding_config,
        );
        let position_embeddings = nn::embedding(
            p / "position_embeddings",
            config.max_position_embeddings,
            config.hidden_size,
            Default::default(),
        );
        let token_type_embeddings = nn::embedding(
            p / "token_type_embeddings",
            config.type_vocab_size,
            config.hidden_size,
            Default::default(),
        );
        BertEmbeddings {
            word_embeddings,
            position_embeddings,
            token_type_embeddings,
            layer_norm: layer_norm(p, config),
            dropout: Dropout::new(config.hidden_dropout_prob),
        }
    }

    pub fn forward_t(&self, input_ids: &Tensor, token_type_ids: &Tensor, train: bool) -> Tensor {
        let input_shape = input_ids.size();
        let position_ids = Tensor::arange(input_shape[1], (Int64, input_ids.device()))
            .unsqueeze(0)
            .expand(input_shape.as_slice(), true);
        let embeddings: Tensor = input_ids.apply(&self.word_embeddings)
            + position_ids.apply(&self.position_embeddings)
            + token_type_ids.apply(&self.token_type_embeddings);
        embeddings
            .apply(&self.layer_norm)
            .apply_t(&self.dropout, train)
    }
}

#[derive(Debug)]
pub struct BertSelfAttention {
    num_attention_heads: i64,
    attention_head_size: i64,
    dropout: Dropout,
    query: nn::Linear,
    key: nn::Linear,
    value: nn::Linear,
}

impl BertSelfAttention {
    pub fn new<'p, P>(p: P, config: &BertConfig) -> BertSelfAttention
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow();
        let linear = |name: &str| {
            nn::linear(
                p / name,
                config.hidden_size,
                config.hidden_size,
                Default::default(),
            )
        };
        BertSelfAttention {
            num_attention_heads: config.num_attention_heads,
            attention_head_size: config.hidden_size / config.num_attention_heads,
            dropout: Dropout::new(config.attention_probs_dropout_prob),
            query: linear("query"),
            key: linear("key"),
            value: linear("value"),
        }
    }

    fn split_heads(&self, x: Tensor, bs: i64) -> Tensor {
        x.view((bs, -1, self.num_attention_heads, self.attention_head_size))
            .transpose(1, 2)
    }

    /// `mask` is an additive mask broadcastable to (*batch size*, *heads*, *sequence_length*, *sequence_length*).
    pub fn forward_t(&self, hidden_states: &Tensor, mask: &Tensor, train: bool) -> Tensor {
        let bs = hidden_states.size()[0];
        let query_layer = self.split_heads(hidden_states.apply(&self.query), bs)
            / (self.attention_head_size as f64).sqrt();
        let key_layer = self.split_heads(hidden_states.apply(&self.key), bs);
        let value_layer = self.split_heads(hidden_states.apply(&self.value), bs);

        let scores = query_layer.matmul(&key_layer.transpose(-1, -2)) + mask;
        let weights = scores.softmax(-1, Float).apply_t(&self.dropout, train);
        weights
            .matmul(&value_layer)
            .transpose(1, 2)
            .contiguous()
            .view((bs, -1, self.num_attention_heads * self.attention_head_size))
    }
}

/// Dense projection followed by dropout, residual connection and layer normalization.
#[derive(Debug)]
pub struct BertOutput {
    dense: nn::Linear,
    layer_norm: nn::LayerNorm,
    dropout: Dropout,
}

impl BertOutput {
    pub fn new<'p, P>(p: P, input_size: i64, config: &BertConfig) -> BertOutput
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow();
        BertOutput {
            dense: nn::linear(p / "dense", input_size, config.hidden_size, Default::default()),
            layer_norm: layer_norm(p, config),
            dropout: Dropout::new(config.hidden_dropout_prob),
        }
    }

    pub fn forward_t(&self, hidden_states: &Tensor, input_tensor: &Tensor, train: bool) -> Tensor {
        let hidden_states: Tensor =
            input_tensor + hidden_states.apply(&self.dense).apply_t(&self.dropout, train);
        hidden_states.apply(&self.layer_norm)
    }
}

pub struct BertLayer {
    attention: BertSelfAttention,
    attention_output: BertOutput,
    intermediate: nn::Linear,
    activation: fn(&Tensor) -> Tensor,
    output: BertOutput,
}

impl BertLayer {
    pub fn new<'p, P>(p: P, config: &BertConfig) -> BertLayer
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow();
        let attention = BertSelfAttention::new(p / "attention" / "self", config);
        let attention_output = BertOutput::new(p / "attention" / "output", config.hidden_size, config);
        let intermediate = nn::linear(
            p / "intermediate" / "dense",
            config.hidden_size,
            config.intermediate_size,
            Default::default(),
        );
        let output = BertOutput::new(p / "output", config.intermediate_size, config);
        BertLayer {
            attention,
            attention_output,
            intermediate,
            activation: config.hidden_act.get_function(),
            output,
        }
    }

    pub fn forward_t(&self, hidden_states: &Tensor, mask: &Tensor, train: bool) -> Tensor {
        let attention = self.attention.forward_t(hidden_states, mask, train);
        let attention = self
            .attention_output
            .forward_t(&attention, hidden_states, train);
        let intermediate = (self.activation)(&attention.apply(&self.intermediate));
        self.output.forward_t(&intermediate, &attention, train)
    }
}

/// # BERT encoder with pooler
/// Embeddings, a stack of `BertLayer` and a tanh pooler applied to the first (`[CLS]`) position.
pub struct BertModel {
    embeddings: BertEmbeddings,
    layers: Vec<BertLayer>,
    pooler: nn::Linear,
}

impl BertModel {
    pub fn new<'p, P>(p: P, config: &BertConfig) -> Result<BertModel, ChatbotError>
    where
        P: Borrow<nn::Path<'p>>,
    {
        if config.hidden_size % config.num_attention_heads != 0 {
            return Err(ChatbotError::InvalidConfigurationError(format!(
                "hidden size {} is not a multiple of the number of attention heads {}",
                config.hidden_size, config.num_attention_heads
            )));
        }
        let p = p.borrow();
        let embeddings = BertEmbeddings::new(p / "embeddings", config);
        let p_layers = p / "encoder" / "layer";
        let layers = (0..config.num_hidden_layers)
            .map(|layer_index| BertLayer::new(&p_layers / layer_index, config))
            .collect();
        let pooler = nn::linear(
            p / "pooler" / "dense",
            config.hidden_size,
            config.hidden_size,
            Default::default(),
        );
        Ok(BertModel {
            embeddings,
            layers,
            pooler,
        })
    }

    /// Forward pass through the encoder
    ///
    /// # Arguments
    ///
    /// * `input_ids` - input tensor of shape (*batch size*, *sequence_length*)
    /// * `attention_mask` - mask of shape (*batch size*, *sequence_length*), 1 for real tokens and 0 for padding
    /// * `token_type_ids` - segment ids of shape (*batch size*, *sequence_length*)
    /// * `train` - boolean flag to turn on/off the dropout layers in the model
    ///
    /// # Returns
    ///
    /// * `(hidden_states, pooled_output)` of shapes (*batch size*, *sequence_length*, *hidden_size*) and (*batch size*, *hidden_size*)
    pub fn forward_t(
        &self,
        input_ids: &Tensor,
        attention_mask: &Tensor,
        token_type_ids: &Tensor,
        train: bool,
    ) -> (Tensor, Tensor) {
        let mask = attention_mask.unsqueeze(1).unsqueeze(2).to_kind(Float);
        let extended_mask = (mask.ones_like() - &mask) * -10000.0;
        let mut hidden_states = self.embeddings.forward_t(input_ids, token_type_ids, train);
        for layer in &self.layers {
            hidden_states = layer.forward_t(&hidden_states, &extended_mask, train);
        }
        let pooled_output = hidden_states.select(1, 0).apply(&self.pooler).tanh();
        (hidden_states, pooled_output)
    }
}

/// # KoBERT sentiment classifier
/// BERT encoder, dropout on the pooled output and a linear layer producing one logit per class.
pub struct KoBertClassifier {
    bert: BertModel,
    dropout: Dropout,
    classifier: nn::Linear,
}

impl KoBertClassifier {
    /// Build a new `KoBertClassifier`
    ///
    /// # Arguments
    ///
    /// * `p` - Variable store path for the root of the classifier
    /// * `config` - `BertConfig` object defining the model architecture and number of classes
    ///
    /// # Example
    ///
    /// ```no_run
    /// use ko_chatbot::kobert::{BertConfig, KoBertClassifier};
    /// use tch::{nn, Device};
    ///
    /// let vs = nn::VarStore::new(Device::Cpu);
    /// let classifier = KoBertClassifier::new(vs.root(), &BertConfig::default()).unwrap();
    /// ```
    pub fn new<'p, P>(p: P, config: &BertConfig) -> Result<KoBertClassifier, ChatbotError>
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow();
        let bert = BertModel::new(p / "bert", config)?;
        let dropout = Dropout::new(config.classifier_dropout.unwrap_or(0.5));
        let classifier = nn::linear(
            p / "classifier",
            config.hidden_size,
            config.num_labels.unwrap_or(2),
            Default::default(),
        );
        Ok(KoBertClassifier {
            bert,
            dropout,
            classifier,
        })
    }

    /// Returns logits of shape (*batch size*, *num_labels*)
    pub fn forward_t(
        &self,
        input_ids: &Tensor,
        attention_mask: &Tensor,
        token_type_ids: &Tensor,
        train: bool,
    ) -> Tensor {
        let (_, pooled_output) = self
            .bert
            .forward_t(input_ids, attention_mask, token_type_ids, train);
        pooled_output
            .apply_t(&self.dropout, train)
            .apply(&self.classifier)
    }
}
