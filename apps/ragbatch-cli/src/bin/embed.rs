use std::env;
use std::process::ExitCode;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use ragbatch_cli::{
    init_tracing, load_config, parse_embed_args, progress_sink, read_chunks, summary_path, write_summary, write_vectors,
};
use ragbatch_core::redact::sanitize_message;
use ragbatch_core::EmbedderCapability;
use ragbatch_embed::build_embedder;
use ragbatch_pipeline::{BatchScheduler, PipelineError, RunOptions, RunVerdict};

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    match run().await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", sanitize_message(&format!("{:#}", e)));
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<ExitCode> {
    let args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() || args.iter().any(|a| a == "--help" || a == "-h") {
        eprintln!("Usage: ragbatch-embed <chunks.jsonl> [--out vectors.jsonl] [--provider NAME] [--plain]");
        return Ok(ExitCode::from(2));
    }
    let args = parse_embed_args(&args, &env::current_dir()?)?;
    let config = load_config(args.provider)?;
    let settings = config.settings()?;

    let chunks = read_chunks(&args.input)?;
    info!(input = %args.input.display(), chunks = chunks.len(), "loaded chunks");

    let embedder = build_embedder(&settings.embedder)?;
    let profile = embedder.profile().clone();

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; finishing in-flight batches");
            on_ctrl_c.cancel();
        }
    });

    let scheduler = BatchScheduler::new(RunOptions::from_settings(&settings.pipeline).with_cancel(cancel));
    let progress = progress_sink(args.plain)?;
    let result = match scheduler.run(&chunks, embedder, &profile, progress.as_ref()).await {
        Ok(result) => result,
        Err(PipelineError::Setup(e)) => {
            error!(error = %sanitize_message(&e.to_string()), "embedder is not usable; nothing was embedded");
            return Ok(ExitCode::FAILURE);
        }
        Err(e) => return Err(e.into()),
    };

    write_vectors(&args.out, &result.vectors)?;
    let summary = summary_path(&args.out);
    write_summary(&summary, &result)?;
    println!("{}", result.summary());
    println!("Vectors: {}\nSummary: {}", args.out.display(), summary.display());

    Ok(match result.verdict() {
        RunVerdict::Failed => ExitCode::FAILURE,
        RunVerdict::Complete | RunVerdict::Partial => ExitCode::SUCCESS,
    })
}
