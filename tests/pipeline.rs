//! End-to-end: text -> token ids -> embeddings -> attention variants.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};
use rand::SeedableRng;
use rand::rngs::StdRng;

use mini_attention::model::{
    AttentionConfig, CausalAttention, EmbeddingConfig, InputEmbedding, MultiHeadAttention,
    SelfAttention,
};
use mini_attention::tokenizer::{AsciiTokenizer, TextEncoder};

const TEXT: &str = "how are you doing! this is";

fn temp_path(name: &str) -> PathBuf {
    let uniq = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("timestamp")
        .as_nanos();
    std::env::temp_dir().join(format!("mini_attention_{uniq}_{name}"))
}

#[test]
fn text_flows_through_every_variant() -> Result<()> {
    let tok = AsciiTokenizer::new();
    let ids = tok.encode(TEXT)?;
    let seq_len = ids.len();

    let config = AttentionConfig {
        context_length: seq_len,
        ..AttentionConfig::demo()
    };
    let embedding_config = EmbeddingConfig {
        vocab_size: tok.vocab_size(),
        embedding_dim: config.embedding_dim,
        context_length: seq_len,
        dropout: config.dropout,
    };

    let device = Device::Cpu;
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
    let embedding = InputEmbedding::new(&embedding_config, vb.pp("embedding"))?;
    let self_attn = SelfAttention::new(&config, vb.pp("self_attention"))?;
    let causal = CausalAttention::new(&config, vb.pp("causal_attention"))?;
    let mha = MultiHeadAttention::new(&config, vb.pp("multi_head"))?;

    let mut rng = StdRng::seed_from_u64(123);
    let x = embedding.forward_train(&ids, &mut rng)?;
    assert_eq!(x.dims(), &[1, seq_len, 4]);

    assert_eq!(self_attn.forward(&x)?.dims(), &[1, seq_len, 6]);
    assert_eq!(causal.forward(&x)?.dims(), &[1, seq_len, 6]);
    assert_eq!(mha.forward_train(&x, &mut rng)?.dims(), &[1, seq_len, 6]);

    let batch = embedding.forward_batch(&[ids.clone(), ids])?;
    assert_eq!(batch.dims(), &[2, seq_len, 4]);
    let out = mha.forward(&batch)?;
    assert_eq!(out.dims(), &[2, seq_len, 6]);

    // Identical batch rows produce identical contexts in evaluation mode.
    assert_eq!(
        out.get(0)?.to_vec2::<f32>()?,
        out.get(1)?.to_vec2::<f32>()?
    );
    Ok(())
}

#[test]
fn encode_text_matches_manual_tokenization() -> Result<()> {
    let tok = AsciiTokenizer::new();
    let embedding_config = EmbeddingConfig {
        vocab_size: tok.vocab_size(),
        embedding_dim: 4,
        context_length: 32,
        dropout: 0.0,
    };
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let embedding = InputEmbedding::new(&embedding_config, vb)?;

    let a = embedding.encode_text(&tok, TEXT)?;
    let b = embedding.forward(&tok.encode(TEXT)?)?;
    assert_eq!(a.dims(), &[1, TEXT.len(), 4]);
    assert_eq!(
        a.flatten_all()?.to_vec1::<f32>()?,
        b.flatten_all()?.to_vec1::<f32>()?
    );
    Ok(())
}

#[test]
fn config_round_trips_through_json_file() -> Result<()> {
    let config = AttentionConfig {
        output_projection: true,
        ..AttentionConfig::demo()
    };
    let path = temp_path("config.json");
    std::fs::write(&path, serde_json::to_string(&config)?)?;

    let loaded = AttentionConfig::from_json_file(&path)?;
    std::fs::remove_file(&path).ok();
    assert_eq!(loaded, config);
    Ok(())
}

#[test]
fn invalid_json_config_is_rejected() -> Result<()> {
    let path = temp_path("bad_config.json");
    std::fs::write(
        &path,
        r#"{"embedding_dim": 4, "output_dim": 6, "context_length": 7, "num_heads": 4}"#,
    )?;

    let err = AttentionConfig::from_json_file(&path).unwrap_err();
    std::fs::remove_file(&path).ok();
    assert!(err.to_string().contains("divisible"), "unexpected error: {err}");
    Ok(())
}
