//! pyexplain - beginner-friendly explanations for Python errors
//!
//! ## Commands
//!
//! - `run`: Run a Python file and explain any error it raises
//! - `decode`: Explain a traceback read from a file or stdin
//! - `version`: Show version and knowledge-base snapshot

use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, warn, Level};

use pyexplain_core::knowledge::KnowledgeLookup;
use pyexplain_core::metrics::METRICS;
use pyexplain_core::sandbox::{
    safe_run, safe_run_with, ExecutionFailure, ExecutionResult, PythonProcessEvaluator,
};
use pyexplain_core::{
    format_decoded_output, supported_languages, CategoryTable, Decoder, DiagnosticRecord,
    KnowledgeBase, Language, BRANDING,
};

#[derive(Parser)]
#[command(name = "pyexplain")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Explain Python errors in plain language", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Flags shared by every command that prints a decoded error.
#[derive(Args, Debug, Clone, Default)]
struct RenderArgs {
    /// Include category, original message and tags
    #[arg(short, long)]
    technical: bool,

    /// Disable coloured output
    #[arg(long)]
    no_color: bool,

    /// Hide the branding footer
    #[arg(long)]
    no_branding: bool,

    /// Print the result as JSON instead of text
    #[arg(long)]
    json: bool,

    /// Language for explanations (en, es)
    #[arg(long, env = "PYEXPLAIN_LANG")]
    lang: Option<Language>,
}

impl RenderArgs {
    fn options(&self) -> RenderOptions {
        RenderOptions {
            technical: self.technical,
            color: !self.no_color && io::stdout().is_terminal(),
            branding: !self.no_branding,
        }
    }

    fn decoder(&self) -> Decoder {
        let decoder = Decoder::builtin().clone();
        match self.lang {
            Some(lang) => decoder.with_language(lang),
            None => decoder,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a Python file and explain any error it raises
    Run {
        /// Python file to execute
        file: PathBuf,

        #[command(flatten)]
        render: RenderArgs,

        /// Only show errors, suppress normal output
        #[arg(short, long)]
        quiet: bool,

        /// Show the raw traceback instead of the explanation
        #[arg(long)]
        raw: bool,

        /// Run with this Python interpreter instead of the built-in evaluator
        #[arg(long, env = "PYEXPLAIN_PYTHON")]
        python: Option<String>,
    },

    /// Explain a traceback read from a file, or from stdin with `-`
    Decode {
        #[arg(default_value = "-")]
        input: String,

        #[command(flatten)]
        render: RenderArgs,
    },

    /// Show version and knowledge-base snapshot
    Version,
}

#[derive(Debug, Clone, Copy)]
struct RenderOptions {
    technical: bool,
    color: bool,
    branding: bool,
}

/// Problems with the script given to `run`.
#[derive(Debug, thiserror::Error)]
enum ScriptError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Not a file: {}", .0.display())]
    NotAFile(PathBuf),

    #[error("could not read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

struct Script {
    code: String,
    display_name: String,
    warning: Option<String>,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    pyexplain_core::telemetry::init_tracing(cli.log_json, level);

    let code = match cli.command {
        Commands::Run {
            file,
            render,
            quiet,
            raw,
            python,
        } => cmd_run(&file, &render, quiet, raw, python.as_deref())?,
        Commands::Decode { input, render } => cmd_decode(&input, &render)?,
        Commands::Version => cmd_version(),
    };

    METRICS.flush();
    Ok(code)
}

fn cmd_run(
    file: &Path,
    render: &RenderArgs,
    quiet: bool,
    raw: bool,
    python: Option<&str>,
) -> Result<ExitCode> {
    let script = match load_script(file) {
        Ok(script) => script,
        Err(err) => {
            eprintln!("❌ Error: {err}");
            return Ok(ExitCode::FAILURE);
        }
    };
    if let Some(warning) = &script.warning {
        eprintln!("⚠️  Warning: {warning}");
    }

    let opts = render.options();
    let show_banner = !quiet && !render.json;
    if show_banner {
        println!("🚀 Running {}...\n", script.display_name);
    }

    let filename = file.display().to_string();
    let mut result = match python {
        Some(interpreter) => {
            debug!(interpreter, "running with external interpreter");
            safe_run_with(
                &PythonProcessEvaluator::new(interpreter),
                &script.code,
                &filename,
                opts.branding,
            )
            .with_context(|| format!("failed to run {filename} with {interpreter}"))?
        }
        None => safe_run(&script.code, &filename, opts.branding),
    };
    if let ExecutionResult::Failure(ExecutionFailure { record, .. }) = &mut result {
        render.decoder().localize(record);
    }

    if render.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("failed to serialize result")?
        );
    } else {
        print!("{}", render_run(&result, opts, quiet, raw));
    }

    Ok(if result.success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn cmd_decode(input: &str, render: &RenderArgs) -> Result<ExitCode> {
    let text = read_input(input)?;
    let opts = render.options();
    let record = render.decoder().decode_traceback(&text, opts.branding);
    debug!(kind = %record.error_kind, location = ?record.location(), "decoded traceback");
    if record.is_unknown() {
        warn!(input = %input, "no Python error found in the input");
    }

    if render.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&record).context("failed to serialize record")?
        );
    } else {
        println!("{}", render_record(&record, opts));
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_version() -> ExitCode {
    let kb = KnowledgeBase::builtin();
    let categories = CategoryTable::builtin();
    let languages: Vec<&str> = supported_languages().iter().map(|l| l.code()).collect();
    println!("pyexplain {}", env!("CARGO_PKG_VERSION"));
    println!("Knowledge base: {} ({} entries)", kb.version(), kb.len());
    println!("Digest:         {}", kb.digest());
    println!("Categories:     {}", categories.version());
    println!("Languages:      {}", languages.join(", "));
    println!("{BRANDING}");
    ExitCode::SUCCESS
}

fn load_script(path: &Path) -> Result<Script, ScriptError> {
    if !path.exists() {
        return Err(ScriptError::NotFound(path.to_path_buf()));
    }
    if !path.is_file() {
        return Err(ScriptError::NotAFile(path.to_path_buf()));
    }
    let warning = (path.extension().and_then(|e| e.to_str()) != Some("py"))
        .then(|| format!("{} does not have .py extension", path.display()));
    let code = std::fs::read_to_string(path).map_err(|source| ScriptError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let display_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(Script {
        code,
        display_name,
        warning,
    })
}

fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("failed to read traceback from stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(input).with_context(|| format!("failed to read traceback from {input}"))
}

fn render_record(record: &DiagnosticRecord, opts: RenderOptions) -> String {
    format_decoded_output(record, opts.technical, opts.color)
}

fn render_run(result: &ExecutionResult, opts: RenderOptions, quiet: bool, raw: bool) -> String {
    let mut out = String::new();
    match result {
        ExecutionResult::Success(success) => {
            if !quiet {
                out.push_str("✅ Code executed successfully!\n\n");
            }
            if let Some(output) = success.output.as_deref().filter(|o| !o.is_empty()) {
                out.push_str("📤 Output:\n");
                out.push_str(output);
                out.push('\n');
            }
            if opts.branding && !quiet {
                out.push_str(&"─".repeat(72));
                out.push('\n');
                out.push_str(BRANDING);
                out.push_str("\n\n");
            }
        }
        ExecutionResult::Failure(failure) => {
            if raw {
                out.push_str(&failure.record.raw_traceback);
            } else {
                out.push_str(&render_record(&failure.record, opts));
            }
            out.push('\n');
            if !failure.output.is_empty() && !quiet {
                out.push_str("\n📤 Output before error:\n");
                out.push_str(&failure.output);
                out.push('\n');
            }
        }
    }
    out
}
