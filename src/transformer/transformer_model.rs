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
use crate::common::layers::{causal_mask, padding_mask};
use crate::common::{Activation, Dropout};
use crate::config::ChatbotConfig;
use crate::transformer::attention::MultiHeadAttention;
use crate::Config;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use tch::kind::Kind::Float;
use tch::nn::EmbeddingConfig;
use tch::{nn, no_grad, Device, Tensor};

#[derive(Debug, Serialize, Deserialize, Clone)]
/// # Chat Transformer model configuration
/// Defines the encoder-decoder architecture (e.g. embedding size, number of layers and heads)
pub struct TransformerConfig {
    pub src_vocab_size: i64,
    pub trg_vocab_size: i64,
    pub embedding_dim: i64,
    pub nlayers: i64,
    pub nhead: i64,
    pub ffn_dim: i64,
    pub dropout: f64,
    pub activation_function: Activation,
    pub max_position_embeddings: i64,
    pub src_pad_index: i64,
    pub trg_pad_index: i64,
}

impl Config for TransformerConfig {}

impl TransformerConfig {
    /// Derives the model configuration from the chatbot hyperparameters and the vocabularies sizes.
    pub fn from_chatbot_config(
        config: &ChatbotConfig,
        src_vocab_size: i64,
        trg_vocab_size: i64,
        src_pad_index: i64,
        trg_pad_index: i64,
    ) -> TransformerConfig {
        TransformerConfig {
            src_vocab_size,
            trg_vocab_size,
            embedding_dim: config.embedding_dim,
            nlayers: config.nlayers,
            nhead: config.nhead,
            ffn_dim: 4 * config.embedding_dim,
            dropout: config.dropout,
            activation_function: Activation::relu,
            max_position_embeddings: (config.max_len as i64).max(512),
            src_pad_index,
            trg_pad_index,
        }
    }

    pub fn validate(&self) -> Result<(), ChatbotError> {
        if self.nhead <= 0 || self.embedding_dim % self.nhead != 0 {
            return Err(ChatbotError::InvalidConfigurationError(format!(
                "embedding_dim ({}) must be a multiple of nhead ({})",
                self.embedding_dim, self.nhead
            )));
        }
        if self.embedding_dim % 2 != 0 {
            return Err(ChatbotError::InvalidConfigurationError(format!(
                "sinusoidal positions need an even embedding_dim, got {}",
                self.embedding_dim
            )));
        }
        if self.nlayers <= 0 {
            return Err(ChatbotError::InvalidConfigurationError(
                "nlayers must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// # Encoder-decoder model producing next-token logits
/// `forward_t` takes encoder indices of shape (*batch size*, *source length*) and decoder indices of
/// shape (*batch size*, *target length*) and returns logits of shape
/// (*batch size*, *target length*, *target vocab size*).
pub trait Seq2SeqModel {
    fn forward_t(&self, enc_input: &Tensor, dec_input: &Tensor, train: bool) -> Tensor;
}

/// Fixed sinusoidal position table of shape (*max_positions*, *dim*), sine on even and cosine on
/// odd channels.
pub fn sinusoidal_positions(max_positions: i64, dim: i64, device: Device) -> Tensor {
    let position = Tensor::arange(max_positions, (Float, device)).unsqueeze(1);
    let inv_freq = (Tensor::arange_start_step(0, dim, 2, (Float, device))
        * (-(10000f64.ln()) / dim as f64))
        .exp();
    let angles = position * inv_freq.unsqueeze(0);
    Tensor::stack(&[angles.sin(), angles.cos()], 2).view((max_positions, dim))
}

fn layer_norm<'p, P: Borrow<nn::Path<'p>>>(p: P, dim: i64) -> nn::LayerNorm {
    nn::layer_norm(p, vec![dim], Default::default())
}

fn copy_vectors(embedding: &mut nn::Embedding, vectors: &Tensor) -> Result<(), ChatbotError> {
    if embedding.ws.size() != vectors.size() {
        return Err(ChatbotError::ValueError(format!(
            "pretrained vectors of shape {:?} do not fit an embedding table of shape {:?}",
            vectors.size(),
            embedding.ws.size()
        )));
    }
    let vectors = vectors.to_kind(Float).to_device(embedding.ws.device());
    no_grad(|| embedding.ws.copy_(&vectors));
    Ok(())
}

#[derive(Debug)]
struct FeedForward {
    fc1: nn::Linear,
    fc2: nn::Linear,
    activation: Activation,
    dropout: Dropout,
}

impl FeedForward {
    fn new<'p, P>(p: P, config: &TransformerConfig) -> FeedForward
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow();
        FeedForward {
            fc1: nn::linear(p / "fc1", config.embedding_dim, config.ffn_dim, Default::default()),
            fc2: nn::linear(p / "fc2", config.ffn_dim, config.embedding_dim, Default::default()),
            activation: config.activation_function,
            dropout: Dropout::new(config.dropout),
        }
    }

    fn forward_t(&self, x: &Tensor, train: bool) -> Tensor {
        (self.activation.get_function())(&x.apply(&self.fc1))
            .apply_t(&self.dropout, train)
            .apply(&self.fc2)
    }
}

#[derive(Debug)]
pub struct EncoderLayer {
    self_attention: MultiHeadAttention,
    self_attention_layer_norm: nn::LayerNorm,
    feed_forward: FeedForward,
    final_layer_norm: nn::LayerNorm,
    dropout: Dropout,
}

impl EncoderLayer {
    pub fn new<'p, P>(p: P, config: &TransformerConfig) -> EncoderLayer
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow();
        EncoderLayer {
            self_attention: MultiHeadAttention::new(
                p / "self_attn",
                config.embedding_dim,
                config.nhead,
                config.dropout,
            ),
            self_attention_layer_norm: layer_norm(p / "self_attn_layer_norm", config.embedding_dim),
            feed_forward: FeedForward::new(p / "ffn", config),
            final_layer_norm: layer_norm(p / "final_layer_norm", config.embedding_dim),
            dropout: Dropout::new(config.dropout),
        }
    }

    pub fn forward_t(&self, x: &Tensor, src_padding_mask: &Tensor, train: bool) -> Tensor {
        let attended = self
            .self_attention
            .forward_t(x, x, Some(src_padding_mask), None, train)
            .apply_t(&self.dropout, train);
        let x = (x + attended).apply(&self.self_attention_layer_norm);
        let transformed = self.feed_forward.forward_t(&x, train).apply_t(&self.dropout, train);
        (x + transformed).apply(&self.final_layer_norm)
    }
}

#[derive(Debug)]
pub struct DecoderLayer {
    self_attention: MultiHeadAttention,
    self_attention_layer_norm: nn::LayerNorm,
    encoder_attention: MultiHeadAttention,
    encoder_attention_layer_norm: nn::LayerNorm,
    feed_forward: FeedForward,
    final_layer_norm: nn::LayerNorm,
    dropout: Dropout,
}

impl DecoderLayer {
    pub fn new<'p, P>(p: P, config: &TransformerConfig) -> DecoderLayer
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow();
        DecoderLayer {
            self_attention: MultiHeadAttention::new(
                p / "self_attn",
                config.embedding_dim,
                config.nhead,
                config.dropout,
            ),
            self_attention_layer_norm: layer_norm(p / "self_attn_layer_norm", config.embedding_dim),
            encoder_attention: MultiHeadAttention::new(
                p / "encoder_attn",
                config.embedding_dim,
                config.nhead,
                config.dropout,
            ),
            encoder_attention_layer_norm: layer_norm(
                p / "encoder_attn_layer_norm",
                config.embedding_dim,
            ),
            feed_forward: FeedForward::new(p / "ffn", config),
            final_layer_norm: layer_norm(p / "final_layer_norm", config.embedding_dim),
            dropout: Dropout::new(config.dropout),
        }
    }

    pub fn forward_t(
        &self,
        x: &Tensor,
        memory: &Tensor,
        trg_padding_mask: &Tensor,
        future_mask: &Tensor,
        src_padding_mask: &Tensor,
        train: bool,
    ) -> Tensor {
        let attended = self
            .self_attention
            .forward_t(x, x, Some(trg_padding_mask), Some(future_mask), train)
            .apply_t(&self.dropout, train);
        let x = (x + attended).apply(&self.self_attention_layer_norm);
        let attended = self
            .encoder_attention
            .forward_t(&x, memory, Some(src_padding_mask), None, train)
            .apply_t(&self.dropout, train);
        let x = (x + attended).apply(&self.encoder_attention_layer_norm);
        let transformed = self.feed_forward.forward_t(&x, train).apply_t(&self.dropout, train);
        (x + transformed).apply(&self.final_layer_norm)
    }
}

/// # Chat Transformer
/// Encoder-decoder Transformer over the chat vocabularies. Padding positions of either side are
/// never attended to, and the decoder only attends to past positions.
///
/// ```no_run
/// # fn main() -> anyhow::Result<()> {
/// use ko_chatbot::transformer::{ChatTransformer, Seq2SeqModel, TransformerConfig};
/// use ko_chatbot::ChatbotConfig;
/// use tch::{nn, Device, Tensor};
///
/// let config = TransformerConfig::from_chatbot_config(&ChatbotConfig::default(), 8000, 8000, 1, 1);
/// let vs = nn::VarStore::new(Device::Cpu);
/// let model = ChatTransformer::new(vs.root() / "transformer", &config)?;
/// let enc_input = Tensor::from_slice(&[10i64, 11, 12, 4, 1, 1]).view((1, 6));
/// let dec_input = Tensor::from_slice(&[2i64, 8]).view((1, 2));
/// let logits = model.forward_t(&enc_input, &dec_input, false);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ChatTransformer {
    src_embedding: nn::Embedding,
    trg_embedding: nn::Embedding,
    positions: Tensor,
    embed_scale: f64,
    encoder_layers: Vec<EncoderLayer>,
    decoder_layers: Vec<DecoderLayer>,
    projection: nn::Linear,
    dropout: Dropout,
    src_pad_index: i64,
    trg_pad_index: i64,
}

impl ChatTransformer {
    /// Build a new `ChatTransformer`
    ///
    /// # Arguments
    ///
    /// * `p` - Variable store path for the root of the model
    /// * `config` - `TransformerConfig` object defining the model architecture
    pub fn new<'p, P>(p: P, config: &TransformerConfig) -> Result<ChatTransformer, ChatbotError>
    where
        P: Borrow<nn::Path<'p>>,
    {
        config.validate()?;
        let p = p.borrow();

        let src_embedding = nn::embedding(
            p / "src_embedding",
            config.src_vocab_size,
            config.embedding_dim,
            EmbeddingConfig {
                padding_idx: config.src_pad_index,
                ..Default::default()
            },
        );
        let trg_embedding = nn::embedding(
            p / "trg_embedding",
            config.trg_vocab_size,
            config.embedding_dim,
            EmbeddingConfig {
                padding_idx: config.trg_pad_index,
                ..Default::default()
            },
        );

        let p_encoder = p / "encoder";
        let encoder_layers = (0..config.nlayers)
            .map(|layer_index| EncoderLayer::new(&p_encoder / layer_index, config))
            .collect();
        let p_decoder = p / "decoder";
        let decoder_layers = (0..config.nlayers)
            .map(|layer_index| DecoderLayer::new(&p_decoder / layer_index, config))
            .collect();

        let projection = nn::linear(
            p / "projection",
            config.embedding_dim,
            config.trg_vocab_size,
            Default::default(),
        );

        Ok(ChatTransformer {
            src_embedding,
            trg_embedding,
            positions: sinusoidal_positions(
                config.max_position_embeddings,
                config.embedding_dim,
                p.device(),
            ),
            embed_scale: (config.embedding_dim as f64).sqrt(),
            encoder_layers,
            decoder_layers,
            projection,
            dropout: Dropout::new(config.dropout),
            src_pad_index: config.src_pad_index,
            trg_pad_index: config.trg_pad_index,
        })
    }

    /// Copies pretrained word vectors into the source and target embedding tables.
    ///
    /// # Arguments
    ///
    /// * `src_vectors` - tensor of shape (*source vocab size*, *embedding_dim*)
    /// * `trg_vectors` - tensor of shape (*target vocab size*, *embedding_dim*)
    pub fn load_pretrained_embeddings(
        &mut self,
        src_vectors: &Tensor,
        trg_vectors: &Tensor,
    ) -> Result<(), ChatbotError> {
        copy_vectors(&mut self.src_embedding, src_vectors)?;
        copy_vectors(&mut self.trg_embedding, trg_vectors)?;
        Ok(())
    }

    fn embed(&self, input_ids: &Tensor, embedding: &nn::Embedding, train: bool) -> Tensor {
        let sequence_length = input_ids.size()[1];
        let positions = self.positions.narrow(0, 0, sequence_length);
        (input_ids.apply(embedding) * self.embed_scale + positions).apply_t(&self.dropout, train)
    }

    /// Runs the encoder, returning the memory of shape (*batch size*, *source length*, *embedding_dim*).
    pub fn encode(&self, enc_input: &Tensor, train: bool) -> Tensor {
        let src_padding_mask = padding_mask(enc_input, self.src_pad_index);
        let mut hidden_state = self.embed(enc_input, &self.src_embedding, train);
        for layer in &self.encoder_layers {
            hidden_state = layer.forward_t(&hidden_state, &src_padding_mask, train);
        }
        hidden_state
    }

    /// Runs the decoder over an encoder memory and projects to target vocabulary logits.
    pub fn decode(&self, dec_input: &Tensor, memory: &Tensor, enc_input: &Tensor, train: bool) -> Tensor {
        let src_padding_mask = padding_mask(enc_input, self.src_pad_index);
        let trg_padding_mask = padding_mask(dec_input, self.trg_pad_index);
        let future_mask = causal_mask(dec_input.size()[1], dec_input.device());
        let mut hidden_state = self.embed(dec_input, &self.trg_embedding, train);
        for layer in &self.decoder_layers {
            hidden_state = layer.forward_t(
                &hidden_state,
                memory,
                &trg_padding_mask,
                &future_mask,
                &src_padding_mask,
                train,
            );
        }
        hidden_state.apply(&self.projection)
    }
}

impl Seq2SeqModel for ChatTransformer {
    fn forward_t(&self, enc_input: &Tensor, dec_input: &Tensor, train: bool) -> Tensor {
        let memory = self.encode(enc_input, train);
        self.decode(dec_input, &memory, enc_input, train)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn first_position_is_sine_zero_cosine_one() {
        let positions = sinusoidal_positions(4, 6, Device::Cpu);
        assert_eq!(positions.size(), vec![4, 6]);
        assert!(positions.double_value(&[0, 0]).abs() < 1e-6);
        assert!((positions.double_value(&[0, 1]) - 1.0).abs() < 1e-6);
        assert!((positions.double_value(&[1, 0]) - 1f64.sin()).abs() < 1e-5);
    }
}
