//! Attention block demo CLI
//!
//! Tokenizes a text, embeds it and runs the self, causal and multi-head
//! attention layers over it, reporting the shape of every stage.

use std::path::PathBuf;

use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use clap::{Parser, ValueEnum};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;

use mini_attention::model::{
    AttentionConfig, CausalAttention, EmbeddingConfig, InputEmbedding, MultiHeadAttention,
    SelfAttention,
};
use mini_attention::tokenizer::{AsciiTokenizer, TextEncoder};

/// Output format for the stage report.
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// One line per stage
    #[default]
    Plain,
    /// JSON with shapes and optional values
    Json,
}

/// Run a text through embedding, self, causal and multi-head attention.
#[derive(Debug, Parser)]
#[command(name = "mini-attention", version, about)]
struct Cli {
    /// Text to tokenize and embed
    #[arg(index = 1, default_value = "how are you doing! this is")]
    text: String,

    /// Embedding dimension (must be even)
    #[arg(long, default_value = "4")]
    embedding_dim: usize,

    /// Output dimension of every attention layer
    #[arg(long, default_value = "6")]
    output_dim: usize,

    /// Heads for multi-head attention
    #[arg(long, default_value = "2")]
    num_heads: usize,

    /// Dropout probability for embeddings and multi-head attention weights
    #[arg(long, default_value = "0.1")]
    dropout: f32,

    /// Add bias terms to the query, key and value projections
    #[arg(long)]
    qkv_bias: bool,

    /// Re-project merged heads in multi-head attention
    #[arg(long)]
    output_projection: bool,

    /// Number of copies of the sequence in the batched run
    #[arg(long, default_value = "2")]
    batch: usize,

    /// Random seed for dropout
    #[arg(long)]
    seed: Option<u64>,

    /// Attention config JSON; overrides the dimension flags
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HuggingFace tokenizer.json to use instead of the ASCII tokenizer
    #[cfg(feature = "hf-tokenizers")]
    #[arg(long)]
    tokenizer: Option<PathBuf>,

    /// Include tensor values in the report
    #[arg(long)]
    show_values: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "plain")]
    format: OutputFormat,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Serialize)]
struct StageReport {
    stage: &'static str,
    shape: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    values: Option<Vec<f32>>,
}

#[derive(Debug, Serialize)]
struct JsonOutput<'a> {
    text: &'a str,
    token_ids: &'a [u32],
    config: &'a AttentionConfig,
    seed: Option<u64>,
    stages: Vec<StageReport>,
}

/// Writes `log` records to stderr when `--verbose` is set.
struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, _metadata: &log::Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &log::Record<'_>) {
        eprintln!("[{} {}] {}", record.level(), record.target(), record.args());
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        log::set_logger(&LOGGER).context("install logger")?;
        log::set_max_level(log::LevelFilter::Debug);
        log::info!("mini-attention v{}", env!("CARGO_PKG_VERSION"));
    }

    let encoder = load_encoder(&cli)?;
    let token_ids = encoder.encode(&cli.text)?;
    anyhow::ensure!(!token_ids.is_empty(), "text produced no tokens");
    log::info!(
        "tokenized {} chars into {} ids",
        cli.text.chars().count(),
        token_ids.len()
    );

    let config = attention_config(&cli, token_ids.len())?;
    let embedding_config = EmbeddingConfig {
        vocab_size: encoder.vocab_size(),
        embedding_dim: config.embedding_dim,
        context_length: config.context_length,
        dropout: config.dropout,
    };

    let mut rng = cli
        .seed
        .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);

    let device = Device::Cpu;
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

    let embedding = InputEmbedding::new(&embedding_config, vb.pp("embedding"))
        .context("build input embedding")?;
    let self_attention =
        SelfAttention::new(&config, vb.pp("self_attention")).context("build self-attention")?;
    let causal_attention = CausalAttention::new(&config, vb.pp("causal_attention"))
        .context("build causal attention")?;
    let multi_head = MultiHeadAttention::new(&config, vb.pp("multi_head"))
        .context("build multi-head attention")?;

    let x = embedding.forward_train(&token_ids, &mut rng)?;
    let batch_ids = vec![token_ids.clone(); cli.batch.max(1)];
    let batch = embedding.forward_batch_train(&batch_ids, &mut rng)?;

    let stages = vec![
        report(&cli, "input_embedding", &x)?,
        report(&cli, "self_attention", &self_attention.forward(&x)?)?,
        report(&cli, "causal_attention", &causal_attention.forward(&x)?)?,
        report(
            &cli,
            "multi_head_attention",
            &multi_head.forward_train(&x, &mut rng)?,
        )?,
        report(&cli, "batched_input", &batch)?,
        report(
            &cli,
            "batched_multi_head_attention",
            &multi_head.forward_train(&batch, &mut rng)?,
        )?,
    ];

    match cli.format {
        OutputFormat::Plain => {
            println!("Token ids: {token_ids:?}");
            for stage in &stages {
                println!("{:<30} {:?}", stage.stage, stage.shape);
                if let Some(values) = &stage.values {
                    println!("  {values:?}");
                }
            }
        }
        OutputFormat::Json => {
            let payload = JsonOutput {
                text: &cli.text,
                token_ids: &token_ids,
                config: &config,
                seed: cli.seed,
                stages,
            };
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
    }

    Ok(())
}

#[cfg(feature = "hf-tokenizers")]
fn load_encoder(cli: &Cli) -> Result<Box<dyn TextEncoder>> {
    if let Some(path) = &cli.tokenizer {
        log::info!("loading tokenizer from {}", path.display());
        let tokenizer = mini_attention::tokenizer::load_hf_tokenizer(path)
            .with_context(|| format!("load tokenizer {}", path.display()))?;
        return Ok(Box::new(tokenizer));
    }
    Ok(Box::new(AsciiTokenizer::new()))
}

#[cfg(not(feature = "hf-tokenizers"))]
#[allow(clippy::unnecessary_wraps)]
fn load_encoder(_cli: &Cli) -> Result<Box<dyn TextEncoder>> {
    Ok(Box::new(AsciiTokenizer::new()))
}

fn attention_config(cli: &Cli, seq_len: usize) -> Result<AttentionConfig> {
    let config = if let Some(path) = &cli.config {
        let config = AttentionConfig::from_json_file(path)
            .with_context(|| format!("load config {}", path.display()))?;
        anyhow::ensure!(
            seq_len <= config.context_length,
            "text has {seq_len} tokens but context_length is {}",
            config.context_length
        );
        config
    } else {
        AttentionConfig {
            embedding_dim: cli.embedding_dim,
            output_dim: cli.output_dim,
            context_length: seq_len,
            dropout: cli.dropout,
            num_heads: cli.num_heads,
            qkv_bias: cli.qkv_bias,
            output_projection: cli.output_projection,
        }
    };

    config.validate()?;
    Ok(config)
}

fn report(cli: &Cli, stage: &'static str, tensor: &Tensor) -> Result<StageReport> {
    let values = if cli.show_values {
        Some(tensor.flatten_all()?.to_vec1::<f32>()?)
    } else {
        None
    };
    Ok(StageReport {
        stage,
        shape: tensor.dims().to_vec(),
        values,
    })
}
