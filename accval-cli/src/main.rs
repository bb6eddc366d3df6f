//! # accval CLI
//!
//! Generate OpenACC compiler validation tests with a language model, grounded
//! in the OpenACC specification, and keep retrying until one compiles and
//! passes.
//!
//! Usage:
//!   accval <FEATURE>...
//!   accval generate <FEATURE>...
//!   accval batch <FILE.jsonl> [--report <FILE>]
//!   accval retrieve <QUERY>...
//!   accval check <SOURCE>
//!   accval extract <FILE>
//!
//! Examples:
//!   accval "acc parallel loop with a reduction(+:sum) clause"
//!   accval --local-embeddings --no-evaluate "acc data copyin"
//!   accval batch instructions.jsonl --report results.jsonl
//!   accval check parsedTest.c

mod console;

use accval_agent::{GeneratorConfig, Orchestrator};
use accval_core::{
    extract, extract_primed, read_instructions, ContextIndex, Embedder, Embedding, Error, ErrorKind,
    FeatureRequest, Harness, OpenAIProvider, RemoteEmbedder, Result, TextSplitter, TfIdfEmbedder, UsageTracker,
};
use clap::{Parser, Subcommand};
use console::ConsoleObserver;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "accval")]
#[command(author, version, about = "accval - LLM-written OpenACC validation tests")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Feature to test (when not using subcommands)
    #[arg(trailing_var_arg = true)]
    feature: Vec<String>,

    /// Reference specification, plain text
    #[arg(long, global = true, default_value = "spec.txt")]
    spec: PathBuf,

    /// JSON configuration file; flags override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Embed locally with TF-IDF instead of the embedding service
    #[arg(long, global = true)]
    local_embeddings: bool,

    /// Completion service base URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Completion model
    #[arg(long, global = true)]
    model: Option<String>,

    /// Embedding service base URL
    #[arg(long, global = true)]
    embed_url: Option<String>,

    /// Embedding model
    #[arg(long, global = true)]
    embed_model: Option<String>,

    /// Completion service API key
    #[arg(long, global = true, env = "ACCVAL_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Embedding service API key
    #[arg(long, global = true, env = "ACCVAL_EMBED_API_KEY", hide_env_values = true)]
    embed_api_key: Option<String>,

    /// Failed attempts to retry before giving up
    #[arg(long, global = true)]
    max_retries: Option<usize>,

    /// Skip the per-attempt LLM evaluation
    #[arg(long, global = true)]
    no_evaluate: bool,

    /// Where generated code is written; the extension picks the compiler
    #[arg(long, global = true)]
    source: Option<PathBuf>,

    /// Show retrieved context, prompts, and debug logs
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode - only show the verdict and the passing test
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a test for one feature
    Generate {
        /// The feature description
        #[arg(trailing_var_arg = true, required = true)]
        feature: Vec<String>,
    },
    /// Generate tests for every instruction in a JSONL file
    Batch {
        /// JSONL file whose records carry an "Instruction" field
        file: PathBuf,

        /// Append one JSON line per run to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Show the specification passages retrieved for a query
    Retrieve {
        #[arg(trailing_var_arg = true, required = true)]
        query: Vec<String>,

        /// Number of passages (default: from config)
        #[arg(short)]
        k: Option<usize>,
    },
    /// Compile and run an existing source file
    Check {
        source: PathBuf,
    },
    /// Extract the code from a saved completion
    Extract {
        file: PathBuf,

        /// Assume the prompt already opened a fence
        #[arg(long)]
        primed: bool,
    },
}

/// The embedder picked on the command line
enum SpecEmbedder {
    Remote(RemoteEmbedder),
    Local(TfIdfEmbedder),
}

impl Embedder for SpecEmbedder {
    fn name(&self) -> &str {
        match self {
            SpecEmbedder::Remote(e) => e.name(),
            SpecEmbedder::Local(e) => e.name(),
        }
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        match self {
            SpecEmbedder::Remote(e) => e.embed_documents(texts).await,
            SpecEmbedder::Local(e) => e.embed_documents(texts).await,
        }
    }

    async fn embed_query(&self, text: &str) -> Result<Embedding> {
        match self {
            SpecEmbedder::Remote(e) => e.embed_query(text).await,
            SpecEmbedder::Local(e) => e.embed_query(text).await,
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// File config (or defaults) with command-line overrides applied
fn load_config(cli: &Cli) -> Result<GeneratorConfig> {
    let mut config = match &cli.config {
        Some(path) => GeneratorConfig::from_json_file(path)?,
        None => GeneratorConfig::default(),
    };

    if let Some(url) = &cli.base_url {
        config.provider.base_url = Some(url.clone());
    }
    if let Some(model) = &cli.model {
        config.provider.default_model = Some(model.clone());
    }
    if let Some(key) = &cli.api_key {
        config.provider.api_key = Some(key.clone());
    }
    if let Some(url) = &cli.embed_url {
        config.embedding.base_url = url.clone();
    }
    if let Some(model) = &cli.embed_model {
        config.embedding.model = model.clone();
    }
    if let Some(key) = &cli.embed_api_key {
        config.embedding.api_key = Some(key.clone());
    }
    if let Some(max_retries) = cli.max_retries {
        config.max_retries = max_retries;
    }
    if let Some(source) = &cli.source {
        config.source_path = source.clone();
    }
    if cli.no_evaluate {
        config.evaluate = false;
    }

    config.validate()?;
    Ok(config)
}

async fn build_index(cli: &Cli, config: &GeneratorConfig) -> Result<ContextIndex<SpecEmbedder>> {
    let embedder = if cli.local_embeddings {
        SpecEmbedder::Local(TfIdfEmbedder::new())
    } else {
        SpecEmbedder::Remote(RemoteEmbedder::new(config.embedding.clone())?)
    };
    let splitter = TextSplitter::new(config.splitter.clone())?;
    ContextIndex::from_file(&cli.spec, &splitter, embedder).await
}

async fn build_orchestrator(
    cli: &Cli,
    config: GeneratorConfig,
) -> Result<Orchestrator<OpenAIProvider, Harness, SpecEmbedder>> {
    let index = build_index(cli, &config).await?;
    let provider = OpenAIProvider::new(config.provider.clone())?;
    let harness = Harness::new(config.toolchain.clone());
    Orchestrator::new(provider, harness, index, config)
}

async fn generate(cli: &Cli, words: &[String]) -> Result<ExitCode> {
    let feature = FeatureRequest::new(words.join(" "))?;
    let config = load_config(cli)?;
    let mut console = ConsoleObserver::new(cli.quiet, cli.verbose, config.max_retries);
    let mut orchestrator = build_orchestrator(cli, config).await?;

    let outcome = orchestrator.run(&feature, &mut console).await?;
    console.summary(&outcome);
    if !cli.quiet {
        print_usage(orchestrator.usage());
    }

    Ok(if outcome.accepted() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn print_usage(usage: &UsageTracker) {
    if let Some(line) = console::usage_line(usage) {
        println!("{}", line);
    }
}

async fn batch(cli: &Cli, file: &Path, report: Option<&Path>) -> Result<ExitCode> {
    let features = read_instructions(file).await?;
    let config = load_config(cli)?;
    let mut console = ConsoleObserver::new(true, cli.verbose, config.max_retries);
    let mut orchestrator = build_orchestrator(cli, config).await?;

    let mut report_file = match report {
        Some(path) => Some(
            tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await
                .map_err(|e| Error::from(e).with_operation("cli::batch").with_context("path", path.display().to_string()))?,
        ),
        None => None,
    };

    let (mut passed, mut failed, mut errored) = (0usize, 0usize, 0usize);
    for (i, feature) in features.iter().enumerate() {
        if !cli.quiet {
            println!("[{}/{}] {}", i + 1, features.len(), feature);
        }
        let outcome = match orchestrator.run(feature, &mut console).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                errored += 1;
                println!("  ERROR {}", e);
                continue;
            }
        };

        if outcome.accepted() {
            passed += 1;
            println!("  PASS after {} attempt(s)", outcome.attempts());
        } else {
            failed += 1;
            println!("  FAIL after {} attempt(s)", outcome.attempts());
        }

        if let Some(out) = report_file.as_mut() {
            let mut line = serde_json::to_string(&outcome).map_err(|e| {
                Error::new(ErrorKind::SerializationFailed, "failed to serialize run outcome")
                    .with_operation("cli::batch")
                    .set_source(e)
            })?;
            line.push('\n');
            out.write_all(line.as_bytes()).await?;
        }
    }

    if let Some(out) = report_file.as_mut() {
        out.flush().await?;
    }

    println!(
        "\n{} features: {} passed, {} failed, {} errored",
        features.len(),
        passed,
        failed,
        errored
    );
    // batch keeps per-attempt output quiet but always reports totals
    print_usage(orchestrator.usage());

    Ok(if failed == 0 && errored == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

async fn retrieve(cli: &Cli, words: &[String], k: Option<usize>) -> Result<ExitCode> {
    let config = load_config(cli)?;
    let index = build_index(cli, &config).await?;
    let k = k.unwrap_or(config.top_k_passages);

    let context = index.query(&words.join(" "), k).await?;
    for (rank, passage) in context.passages.iter().enumerate() {
        println!(
            "[{}] window {} (distance {:.4})\n{}\n",
            rank + 1,
            passage.window,
            passage.distance,
            passage.text
        );
    }
    Ok(ExitCode::SUCCESS)
}

async fn check(cli: &Cli, source: &Path) -> Result<ExitCode> {
    let config = load_config(cli)?;
    let harness = Harness::new(config.toolchain);
    let result = harness.run(source).await?;

    println!("--- Compiler Output ---\n{}", result.compiler_output);
    println!("--- Runtime Output ---\n{}", result.runtime_output);
    println!("Exit code: {}", result.exit_code);

    Ok(if result.passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

async fn extract_file(file: &Path, primed: bool) -> Result<ExitCode> {
    let raw = tokio::fs::read_to_string(file)
        .await
        .map_err(|e| Error::from(e).with_operation("cli::extract").with_context("path", file.display().to_string()))?;

    let extracted = if primed { extract_primed(&raw) } else { extract(&raw) };
    match extracted {
        Ok(code) => {
            println!("{}", code);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) if e.kind() == ErrorKind::ExtractionNotFound => {
            eprintln!("No fenced code region found in {}", file.display());
            Ok(ExitCode::from(1))
        }
        Err(e) => Err(e),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    debug!(?cli.command, "starting");

    let result = match &cli.command {
        Some(Commands::Generate { feature }) => generate(&cli, feature).await,
        Some(Commands::Batch { file, report }) => batch(&cli, file, report.as_deref()).await,
        Some(Commands::Retrieve { query, k }) => retrieve(&cli, query, *k).await,
        Some(Commands::Check { source }) => check(&cli, source).await,
        Some(Commands::Extract { file, primed }) => extract_file(file, *primed).await,
        None => {
            if cli.feature.is_empty() {
                eprintln!("Error: No feature provided.");
                eprintln!("Usage: accval [OPTIONS] <FEATURE>...");
                eprintln!("       accval generate <FEATURE>...");
                eprintln!("       accval batch <FILE.jsonl> [--report <FILE>]");
                eprintln!("       accval retrieve <QUERY>...");
                eprintln!("       accval check <SOURCE>");
                eprintln!("       accval extract <FILE>");
                eprintln!("\nExamples:");
                eprintln!("  accval \"acc parallel loop reduction\"");
                eprintln!("  accval --local-embeddings \"acc data copyin\"");
                eprintln!("  accval --help");
                return ExitCode::from(2);
            }
            generate(&cli, &cli.feature).await
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            warn!(error = ?e, "run aborted");
            eprintln!("Error: {}", e);
            ExitCode::from(2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_feature_words() {
        let cli = Cli::try_parse_from(["accval", "acc", "parallel", "loop"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.feature.join(" "), "acc parallel loop");
        assert_eq!(cli.spec, PathBuf::from("spec.txt"));
    }

    #[test]
    fn test_subcommands() {
        let cli = Cli::try_parse_from(["accval", "batch", "in.jsonl", "--report", "out.jsonl", "-q"]).unwrap();
        match cli.command {
            Some(Commands::Batch { file, report }) => {
                assert_eq!(file, PathBuf::from("in.jsonl"));
                assert_eq!(report, Some(PathBuf::from("out.jsonl")));
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert!(cli.quiet);

        let cli = Cli::try_parse_from(["accval", "extract", "reply.txt", "--primed"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Extract { primed: true, .. })));
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "accval",
            "--base-url",
            "http://gpu-box:8000/v1",
            "--model",
            "llama-3.1-8b-instruct",
            "--max-retries",
            "1",
            "--no-evaluate",
            "--source",
            "work/test.cpp",
            "check",
            "work/test.cpp",
        ])
        .unwrap();

        let config = load_config(&cli).unwrap();
        assert_eq!(config.provider.base_url.as_deref(), Some("http://gpu-box:8000/v1"));
        assert_eq!(config.provider.default_model.as_deref(), Some("llama-3.1-8b-instruct"));
        assert_eq!(config.max_retries, 1);
        assert!(!config.evaluate);
        assert_eq!(config.source_path, PathBuf::from("work/test.cpp"));
    }

    #[test]
    fn test_unsupported_source_flag_rejected() {
        let cli = Cli::try_parse_from(["accval", "--source", "test.py", "x"]).unwrap();
        let err = load_config(&cli).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedSourceType);
    }
}
