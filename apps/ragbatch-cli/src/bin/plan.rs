use std::env;

use anyhow::{Context, Result};

use ragbatch_cli::{load_config, parse_provider};
use ragbatch_embed::resolve_profile;
use ragbatch_pipeline::plan;

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <chunk_count> [--provider NAME]", args[0]);
        eprintln!("Example: {} 591 --provider ollama", args[0]);
        std::process::exit(1);
    }
    let count: usize = args[1].parse().with_context(|| format!("chunk count must be a number, got '{}'", args[1]))?;
    let provider = match args.iter().position(|a| a == "--provider" || a == "-p") {
        Some(i) => Some(parse_provider(args.get(i + 1).context("--provider requires a name")?)?),
        None => None,
    };

    // Settings are extracted without validation: planning needs no API key.
    let config = load_config(provider)?;
    let embedder: ragbatch_core::config::EmbedderSettings = config.get("embedder")?;
    let profile = resolve_profile(&embedder);
    let planned = plan(count, &profile);

    println!("Provider: {}", profile.name);
    println!("Chunks: {}", count);
    println!("Batch size: {}", planned.batch_size);
    println!("Batches: {}", planned.total_batches);
    println!("Concurrency: {} (provider ceiling {})", planned.concurrency, profile.max_concurrent_batches);
    println!("Attempt timeout: {:.0}s", profile.attempt_timeout(planned.batch_size).as_secs_f64());
    Ok(())
}
