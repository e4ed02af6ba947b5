use std::path::{Path, PathBuf};

use attn_oracle::{profile_attention, AttentionShape, ProfileConfig, ReferenceAttention};
use clap::Parser;
use serde::de::DeserializeOwned;
use sft_data::{
    get_dataloader_from_ds, load_examples, AlpacaRecord, HfTokenizer, JsonDatasetLoader,
    LoadConfig,
};
use tracing_subscriber::{filter::LevelFilter, EnvFilter};
use tune_common::{ExecutionContext, FileSource};

#[derive(clap::Parser, Clone)]
#[clap(name = "tune", version = "0.1.0")]
enum Command {
    /// Profile the reference attention forward and backward pass on an accelerator
    ProfileAttention {
        /// JSON file with a profile config. Flags override its values
        #[clap(long)]
        config: Option<PathBuf>,
        #[clap(long)]
        batch: Option<usize>,
        #[clap(long)]
        heads: Option<usize>,
        #[clap(long)]
        seq_len: Option<usize>,
        #[clap(long)]
        head_dim: Option<usize>,
        /// Iterations run before the profiled region
        #[clap(long)]
        warmup: Option<usize>,
        /// Iterations inside the profiled region
        #[clap(long)]
        iterations: Option<usize>,
    },
    /// Featurize an Alpaca style dataset and report the batches it produces
    PrepareDataset {
        /// JSON file with a load config. Flags override its values
        #[clap(long)]
        config: Option<PathBuf>,
        /// Path to a local tokenizer.json
        #[clap(short, long, conflicts_with = "tokenizer_repo")]
        tokenizer: Option<PathBuf>,
        /// Hugging Face repo to fetch tokenizer.json from
        #[clap(long, default_value = "huggyllama/llama-7b")]
        tokenizer_repo: String,
        /// The end-of-sequence token
        #[clap(long, default_value = "</s>")]
        eos_token: String,
        /// Local JSON file with the train split. Defaults to alpaca-cleaned on the hub
        #[clap(long)]
        train_file: Option<PathBuf>,
        /// Local JSON file with the test split
        #[clap(long, requires = "train_file")]
        test_file: Option<PathBuf>,
        /// The split to featurize
        #[clap(long)]
        split: Option<String>,
        #[clap(long)]
        max_seq_length: Option<usize>,
        #[clap(long)]
        seed: Option<u64>,
        #[clap(short, long, default_value_t = 8)]
        batch_size: usize,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    match Command::parse() {
        Command::ProfileAttention {
            config,
            batch,
            heads,
            seq_len,
            head_dim,
            warmup,
            iterations,
        } => {
            let mut config: ProfileConfig = read_config(config.as_deref())?;
            let AttentionShape {
                batch: default_batch,
                heads: default_heads,
                seq_len: default_seq_len,
                head_dim: default_head_dim,
            } = config.shape;
            config.shape = AttentionShape::new(
                batch.unwrap_or(default_batch),
                heads.unwrap_or(default_heads),
                seq_len.unwrap_or(default_seq_len),
                head_dim.unwrap_or(default_head_dim),
            );
            if let Some(warmup) = warmup {
                config = config.warmup_iterations(warmup);
            }
            if let Some(iterations) = iterations {
                config = config.profiled_iterations(iterations);
            }
            run_profile(&config)
        }
        Command::PrepareDataset {
            config,
            tokenizer,
            tokenizer_repo,
            eos_token,
            train_file,
            test_file,
            split,
            max_seq_length,
            seed,
            batch_size,
        } => {
            let mut config: LoadConfig = read_config(config.as_deref())?;
            if let Some(split) = split {
                config = config.split(split);
            }
            if let Some(max_seq_length) = max_seq_length {
                config = config.max_seq_length(max_seq_length);
            }
            if let Some(seed) = seed {
                config = config.seed(seed);
            }
            let tokenizer = match tokenizer {
                Some(path) => FileSource::local(path),
                None => FileSource::huggingface(tokenizer_repo, "main", "tokenizer.json"),
            };
            let tokenizer = HfTokenizer::from_source(&tokenizer, &eos_token)?;
            let loader = match train_file {
                Some(train_file) => {
                    let loader = JsonDatasetLoader::<AlpacaRecord>::new()
                        .with_split("train", FileSource::local(train_file));
                    match test_file {
                        Some(test_file) => loader.with_split("test", FileSource::local(test_file)),
                        None => loader.with_test_fraction(0.1),
                    }
                }
                None => JsonDatasetLoader::alpaca(),
            };
            run_prepare(&loader, &tokenizer, &config, batch_size)
        }
    }
}

fn read_config<T: DeserializeOwned + Default>(path: Option<&Path>) -> anyhow::Result<T> {
    match path {
        Some(path) => Ok(serde_json::from_reader(std::fs::File::open(path)?)?),
        None => Ok(T::default()),
    }
}

fn run_profile(config: &ProfileConfig) -> anyhow::Result<()> {
    let ctx = ExecutionContext::accelerated_if_available()?;
    ctx.require_gpu("FlashAttention")?;

    let report = profile_attention(&ctx, &ReferenceAttention::new(), config)?;
    println!(
        "{} on {}: {} iterations of {:?} in {:.3} ms ({:.3} ms/iteration)",
        report.kernel,
        ctx.device_name(),
        report.iterations,
        report.shape.dims(),
        report.total.as_secs_f64() * 1000.0,
        report.per_iteration().as_secs_f64() * 1000.0,
    );
    Ok(())
}

fn run_prepare(
    loader: &JsonDatasetLoader<AlpacaRecord>,
    tokenizer: &HfTokenizer,
    config: &LoadConfig,
    batch_size: usize,
) -> anyhow::Result<()> {
    let columns = load_examples(loader, tokenizer, config)?;
    let ctx = ExecutionContext::cpu();
    let mut batches = 0;
    let mut tokens = 0;
    for batch in get_dataloader_from_ds(&columns, batch_size, ctx.device())? {
        let batch = batch?;
        tokens += batch.lengths.sum_all()?.to_scalar::<u32>()? as usize;
        batches += 1;
    }
    println!(
        "{}: {} features in {} batches of up to {}, {} unpadded tokens",
        config.split,
        columns.len(),
        batches,
        batch_size,
        tokens
    );
    Ok(())
}
