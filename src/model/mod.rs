pub mod attention;
pub mod config;
pub mod dropout;
pub mod embedding;
pub mod mask;
pub mod multi_head;
pub mod positional;

// Re-exports for convenience
pub use attention::{
    AttentionOutput, CausalAttention, QkvProjection, SelfAttention, attention_weights,
};
pub use config::{AttentionConfig, EmbeddingConfig};
pub use dropout::Dropout;
pub use embedding::{InputEmbedding, TokenEmbedding};
pub use mask::CausalMask;
pub use multi_head::MultiHeadAttention;
pub use positional::SinusoidalPositionalEncoding;
