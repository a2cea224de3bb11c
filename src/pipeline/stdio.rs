//! A minimal host engine: newline-delimited messages on stdin, processed
//! payloads on stdout.
//!
//! Startup sequence for `run`:
//!   1. Load config (explicit `-c` path or first existing default)
//!   2. Resolve effective log level (CLI `-v` flags > env > config)
//!   3. Init logger with the embedder's tee layer; `on_logger_init`
//!   4. `on_config_parsed`, then lint warnings
//!   5. Build the processor and probe the backend
//!   6. `on_stream_start`
//!   7. Stream lines through the processor until EOF or Ctrl-C
//!   8. Close the processor

use std::path::PathBuf;

use futures_util::StreamExt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout};
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing::{debug, info, warn};

use crate::bootstrap::logger::{self, FallbackLogger};
use crate::config::{self, Config};
use crate::error::AppError;
use crate::llm::ProviderError;
use crate::pipeline::engine::{CliOptions, Engine, EngineFuture, EngineOutcome};
use crate::pipeline::message::Message;
use crate::pipeline::processor::{ProcessError, Processor};
use crate::pipeline::summary::StreamSummary;
use crate::processors::OllamaChatProcessor;

/// Metadata key carrying the 1-based input line number.
pub const LINE_META: &str = "line_number";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Run,
    Lint,
    Help,
    Version,
}

#[derive(Debug, PartialEq, Eq)]
struct CliArgs {
    command: Command,
    config_path: Option<PathBuf>,
    log_level: Option<&'static str>,
}

fn parse_args(args: &[String]) -> Result<CliArgs, AppError> {
    let mut command = Command::Run;
    let mut verbosity = 0u8;
    let mut config_path = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }

        match arg.as_str() {
            "run" => command = Command::Run,
            "lint" => command = Command::Lint,
            "-h" | "--help" => return Ok(CliArgs { command: Command::Help, config_path, log_level: None }),
            "--version" => {
                return Ok(CliArgs { command: Command::Version, config_path, log_level: None });
            }
            "-c" | "--config" => match iter.next() {
                Some(path) => config_path = Some(PathBuf::from(path)),
                None => return Err(AppError::Config("-c/--config requires a path argument".into())),
            },
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add(u8::try_from(a.len() - 1).unwrap_or(u8::MAX));
            }
            other => return Err(AppError::Config(format!("unknown argument '{other}'"))),
        }
    }

    // Each -v raises verbosity one tier:
    //   -v → warn, -vv → info, -vvv → debug, -vvvv+ → trace
    let log_level = match verbosity {
        0 => None,
        1 => Some("warn"),
        2 => Some("info"),
        3 => Some("debug"),
        _ => Some("trace"),
    };

    Ok(CliArgs { command, config_path, log_level })
}

fn usage(binary: &str) -> String {
    format!(
        "Usage: {binary} [run|lint] [OPTIONS]\n\
         \n\
         Commands:\n\
         \x20 run                        Process stdin lines until EOF (default)\n\
         \x20 lint                       Check the config file and exit\n\
         \n\
         Options:\n\
         \x20 -h, --help                 Print help\n\
         \x20     --version              Print version\n\
         \x20 -c, --config <PATH>        Path to configuration file\n\
         \x20 -v, -vv, -vvv, -vvvv       Increase logging verbosity\n"
    )
}

// ── Engine ────────────────────────────────────────────────────────────────────

pub struct StdioEngine<R, W> {
    args: Vec<String>,
    input: R,
    output: W,
}

impl StdioEngine<BufReader<Stdin>, Stdout> {
    /// Process arguments plus the real stdin/stdout.
    pub fn from_env() -> Self {
        Self::new(
            std::env::args().skip(1).collect(),
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
        )
    }
}

impl<R, W> StdioEngine<R, W>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// `args` excludes the program name.
    pub fn new(args: Vec<String>, input: R, output: W) -> Self {
        Self { args, input, output }
    }

    async fn execute(self, options: CliOptions) -> Result<i32, AppError> {
        let StdioEngine { args, input, mut output } = self;
        let cli = parse_args(&args)?;

        match cli.command {
            Command::Help => {
                output.write_all(usage(&options.binary_name).as_bytes()).await?;
                output.flush().await?;
                Ok(0)
            }
            Command::Version => {
                let line = format!("{} {}\n", options.binary_name, options.version);
                output.write_all(line.as_bytes()).await?;
                output.flush().await?;
                Ok(0)
            }
            Command::Lint => {
                let config = config::load(cli.config_path.as_deref(), &options.default_config_paths)?;
                lint(&config, &options, &mut output).await
            }
            Command::Run => {
                let config = config::load(cli.config_path.as_deref(), &options.default_config_paths)?;
                run_stream(config, cli.log_level, &options, input, &mut output).await?;
                Ok(0)
            }
        }
    }
}

impl<R, W> Engine for StdioEngine<R, W>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn run(self: Box<Self>, options: CliOptions) -> EngineFuture {
        Box::pin(async move {
            match self.execute(options).await {
                Ok(0) => EngineOutcome::success(),
                Ok(code) => EngineOutcome::exit(code),
                Err(e) => EngineOutcome::failure(e),
            }
        })
    }
}

/// Print schema issues and processor construction errors; exit 1 if any.
async fn lint<W>(config: &Config, options: &CliOptions, output: &mut W) -> Result<i32, AppError>
where
    W: AsyncWrite + Unpin,
{
    let mut lines: Vec<String> = options
        .schema
        .lint(config.parsed.value())
        .iter()
        .map(ToString::to_string)
        .collect();

    if let Some(chat) = &config.ollama_chat {
        if let Err(e) = OllamaChatProcessor::new(chat) {
            lines.push(e.to_string());
        }
    }

    for line in &lines {
        output.write_all(format!("{}: {line}\n", config.path.display()).as_bytes()).await?;
    }
    output.flush().await?;
    Ok(if lines.is_empty() { 0 } else { 1 })
}

async fn run_stream<R, W>(
    config: Config,
    cli_level: Option<&'static str>,
    options: &CliOptions,
    input: R,
    output: &mut W,
) -> Result<(), AppError>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin,
{
    let effective_level = cli_level.unwrap_or(config.log_level.as_str());
    let filter = logger::build_filter(effective_level, cli_level.is_some())?;
    if let Err(e) = logger::init(filter, options.hooks.tee_layer()) {
        eprintln!("warning: {e}");
    }
    let fallback_level = logger::parse_level(effective_level).unwrap_or(LevelFilter::INFO);
    options.hooks.on_logger_init(FallbackLogger::stderr(fallback_level));

    info!(
        path = %config.path.display(),
        configured_log_level = %config.log_level,
        effective_log_level = %effective_level,
        max_in_flight = config.max_in_flight,
        "config loaded"
    );

    options.hooks.on_config_parsed(&config.parsed)?;

    for issue in options.schema.lint(config.parsed.value()) {
        warn!(%issue, "config lint");
    }

    let chat = config.ollama_chat.as_ref().ok_or_else(|| {
        AppError::Config("no processor configured: add a [pipeline.ollama_chat] section".into())
    })?;
    let processor = OllamaChatProcessor::new(chat)?;

    let client = processor.client();
    match client.ping().await {
        Ok(()) => debug!(server = %client.server_address(), "ollama server reachable"),
        Err(e) => warn!(server = %client.server_address(), error = %e, "ollama server not reachable yet"),
    }

    let summary = StreamSummary::new();
    options.hooks.on_stream_start(summary.clone())?;

    // Ctrl-C cancels the token; in-flight calls abort.
    let shutdown = CancellationToken::new();
    let ctrlc_token = shutdown.clone();
    let ctrlc = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, initiating shutdown");
            ctrlc_token.cancel();
        }
    });

    info!(processor = processor.name(), "stream started");
    let result = drive(&processor, &summary, &shutdown, config.max_in_flight, input, output).await;
    ctrlc.abort();

    if let Err(e) = processor.close().await {
        warn!(error = %e, "processor close failed");
    }

    let snap = summary.snapshot();
    info!(
        received = snap.received,
        processed = snap.processed,
        failed = snap.failed,
        "stream finished"
    );
    result
}

/// Read lines, process up to `max_in_flight` at once, and write results in
/// input order. Per-message failures are logged and the message dropped.
async fn drive<P, R, W>(
    processor: &P,
    summary: &StreamSummary,
    shutdown: &CancellationToken,
    max_in_flight: usize,
    input: R,
    output: &mut W,
) -> Result<(), AppError>
where
    P: Processor,
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin,
{
    let lines = futures_util::stream::unfold(Some((input, 0u64)), |state| async move {
        let (mut input, line_number) = state?;
        let mut buf = Vec::new();
        match input.read_until(b'\n', &mut buf).await {
            Ok(0) => None,
            Ok(_) => {
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                }
                if buf.last() == Some(&b'\r') {
                    buf.pop();
                }
                let line_number = line_number + 1;
                let msg = Message::new(buf).with_meta(LINE_META, line_number.to_string());
                Some((Ok(msg), Some((input, line_number))))
            }
            Err(e) => Some((Err(e), None)),
        }
    });

    let results = lines
        .take_until(shutdown.cancelled())
        .map(move |read| async move {
            let msg = read?;
            summary.record_received();
            let outcome = processor.process(shutdown, &msg).await;
            Ok::<_, std::io::Error>((msg, outcome))
        })
        .buffered(max_in_flight);
    futures_util::pin_mut!(results);

    while let Some(item) = results.next().await {
        let (msg, outcome) = item?;
        let line = msg.meta_get(LINE_META).unwrap_or("?");
        match outcome {
            Ok(batch) => {
                summary.record_processed();
                for out in batch {
                    output.write_all(out.as_bytes()).await?;
                    output.write_all(b"\n").await?;
                }
                output.flush().await?;
            }
            Err(ProcessError::Backend(ProviderError::Cancelled)) => {
                summary.record_failed();
                debug!(line, "message cancelled");
            }
            Err(e) => {
                summary.record_failed();
                warn!(line, error = %e, validation = e.is_validation(), "message dropped");
            }
        }
    }
    Ok(())
}
