//! Shared plumbing for the `ragbatch-*` binaries: argument parsing, chunk
//! JSONL input, vector JSONL output and the terminal progress bar.

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, IsTerminal, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use ragbatch_core::config::{resolve_with_base, Config, ProviderKind};
use ragbatch_core::{Chunk, ChunkId, EmbeddedChunk};
use ragbatch_pipeline::{LogProgress, ProgressEvent, ProgressPhase, ProgressSink, RunResult};

/// `RUST_LOG` wins; otherwise `info`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

/// Load layered config, applying `--provider` on top when given.
pub fn load_config(provider: Option<ProviderKind>) -> Result<Config> {
    let config = Config::load().context("failed to load configuration")?;
    Ok(match provider {
        Some(kind) => config.with_override("embedder.provider", kind),
        None => config,
    })
}

pub fn parse_provider(raw: &str) -> Result<ProviderKind> {
    match ProviderKind::parse(raw) {
        Some(kind) => Ok(kind),
        None => bail!("unknown provider '{}' (expected upstage, openai, ollama, local or fake)", raw),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbedArgs {
    pub input: PathBuf,
    pub out: PathBuf,
    pub provider: Option<ProviderKind>,
    /// Log progress lines instead of drawing a bar.
    pub plain: bool,
}

/// `<chunks.jsonl> [--out vectors.jsonl] [--provider NAME] [--plain]`; `args` excludes the program name.
pub fn parse_embed_args(args: &[String], cwd: &Path) -> Result<EmbedArgs> {
    let mut input = None;
    let mut out = None;
    let mut provider = None;
    let mut plain = false;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--out" | "-o" => {
                let value = args.get(i + 1).context("--out requires a path")?;
                out = Some(resolve_with_base(cwd, value));
                i += 1;
            }
            "--provider" | "-p" => {
                let value = args.get(i + 1).context("--provider requires a name")?;
                provider = Some(parse_provider(value)?);
                i += 1;
            }
            "--plain" => plain = true,
            flag if flag.starts_with('-') => bail!("unknown flag {}", flag),
            path if input.is_none() => input = Some(resolve_with_base(cwd, path)),
            extra => bail!("unexpected argument {}", extra),
        }
        i += 1;
    }
    let input: PathBuf = input.context("missing input file <chunks.jsonl>")?;
    let out = out.unwrap_or_else(|| input.with_extension("vectors.jsonl"));
    Ok(EmbedArgs { input, out, provider, plain })
}

/// One chunk per non-blank line.
pub fn read_chunks(path: &Path) -> Result<Vec<Chunk>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut chunks = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        chunks.push(Chunk::from_json_line(i + 1, &line)?);
    }
    Ok(chunks)
}

#[derive(Serialize)]
struct VectorLine<'a> {
    id: String,
    document_id: String,
    chunk_index: usize,
    vector: &'a [f32],
}

impl<'a> VectorLine<'a> {
    fn new(id: ChunkId, vector: &'a [f32]) -> Self {
        Self { id: id.to_string(), document_id: id.document.to_string(), chunk_index: id.index, vector }
    }
}

pub fn write_vectors(path: &Path, vectors: &[EmbeddedChunk]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for embedded in vectors {
        serde_json::to_writer(&mut writer, &VectorLine::new(embedded.id, &embedded.vector))?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// `<out>.summary.json` next to the vectors file.
pub fn summary_path(out: &Path) -> PathBuf {
    let mut name = out.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".summary.json");
    out.with_file_name(name)
}

pub fn write_summary(path: &Path, result: &RunResult) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &result.report())?;
    Ok(())
}

/// Bar on an interactive stderr, log lines otherwise or when `plain` is set.
pub fn progress_sink(plain: bool) -> Result<Box<dyn ProgressSink>> {
    if plain || !io::stderr().is_terminal() {
        return Ok(Box::new(LogProgress));
    }
    Ok(Box::new(BarProgress::new()?))
}

/// Terminal progress bar over chunks.
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new() -> Result<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")?
                .progress_chars("#>-"),
        );
        Ok(Self { bar })
    }
}

impl ProgressSink for BarProgress {
    fn emit(&self, event: ProgressEvent) {
        match event.phase {
            ProgressPhase::Starting => {
                self.bar.set_length(event.chunks_total as u64);
                self.bar.set_message(event.message);
            }
            ProgressPhase::InProgress => {
                self.bar.set_position(event.chunks_completed as u64);
                if event.message.starts_with("Batch ") {
                    self.bar.println(event.message.clone());
                }
                self.bar.set_message(format!("batch {}/{}", event.current_batch, event.total_batches));
            }
            ProgressPhase::Done => {
                self.bar.set_position(event.chunks_completed as u64);
                self.bar.finish_with_message(event.message);
            }
        }
    }
}
