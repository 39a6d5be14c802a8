//! graphpack CLI - inspect packed entity streams
//!
//! Works on any stream without registered factories: it parses the text,
//! reports errors with positions, and prints tokens or bundles.

use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process;

use graphpack::text::{Parser as StreamParser, Statement, Token, Tokenizer};
use graphpack::EngineConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "graphpack")]
#[command(version, about = "Inspect and validate packed entity streams", long_about = None)]
struct Cli {
    /// Path to an engine config YAML file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a stream and report its header and statement counts
    Check {
        /// Packed stream to read
        file: PathBuf,
    },

    /// Print the token stream with positions
    Tokens {
        /// Packed stream to read
        file: PathBuf,
    },

    /// Print every definition's bundle
    Dump {
        /// Packed stream to read
        file: PathBuf,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = load_config(cli.config.as_deref()).and_then(|config| match cli.command {
        Commands::Check { file } => check(&file, &config),
        Commands::Tokens { file } => tokens(&file),
        Commands::Dump { file, json } => dump(&file, json),
    });

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, String> {
    match path {
        Some(path) => EngineConfig::load_from_file(path)
            .map_err(|e| format!("Failed to load config {}: {}", path.display(), e)),
        None => Ok(EngineConfig::default()),
    }
}

fn open(path: &Path) -> Result<BufReader<File>, String> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| format!("Failed to open {}: {}", path.display(), e))
}

/// Parse the whole stream, counting statements by kind.
fn check(path: &Path, config: &EngineConfig) -> Result<(), String> {
    let mut parser = StreamParser::new(open(path)?);
    let header = parser
        .read_header()
        .map_err(|e| format!("{}: {}", path.display(), e))?
        .clone();
    if header.label != config.label {
        tracing::warn!(
            "Stream label '{}' differs from configured label '{}'",
            header.label,
            config.label
        );
    }

    let (mut metadata, mut aliases, mut definitions) = (0usize, 0usize, 0usize);
    while let Some(statement) = parser
        .next_statement()
        .map_err(|e| format!("{}: {}", path.display(), e))?
    {
        match statement {
            Statement::Metadata { .. } => metadata += 1,
            Statement::TypeAlias { .. } => aliases += 1,
            Statement::Definition(_) => definitions += 1,
        }
    }

    println!("{}: ok", path.display());
    println!("  format {} label {:?}", header.version, header.label);
    println!("  {} type aliases, {} definitions, {} metadata lines", aliases, definitions, metadata);
    Ok(())
}

/// Dump tokens, switching to value scanning after `name=`.
fn tokens(path: &Path) -> Result<(), String> {
    let mut tokenizer = Tokenizer::new(open(path)?);
    let mut previous_was_name = false;
    let mut expect_value = false;

    loop {
        let spanned = if expect_value {
            tokenizer.next_value()
        } else {
            tokenizer.next_token()
        }
        .map_err(|e| format!("{}: {}", path.display(), e))?;

        println!("{:>5}:{:<4} {}", spanned.position.line, spanned.position.column, spanned.token);
        if spanned.token == Token::Eof {
            return Ok(());
        }
        expect_value = previous_was_name && spanned.token == Token::Punct('=');
        previous_was_name = matches!(spanned.token, Token::Identifier(_));
    }
}

fn dump(path: &Path, json: bool) -> Result<(), String> {
    let mut parser = StreamParser::new(open(path)?);
    let mut entries = Vec::new();

    while let Some(statement) = parser
        .next_statement()
        .map_err(|e| format!("{}: {}", path.display(), e))?
    {
        match statement {
            Statement::Definition(definition) if json => {
                entries.push(serde_json::json!({
                    "reference": definition.reference.to_string(),
                    "line": definition.position.line,
                    "bundle": definition.bundle,
                }));
            }
            Statement::Definition(definition) => {
                println!(
                    "{} {} v{}",
                    definition.reference,
                    definition.bundle.type_name(),
                    definition.bundle.version()
                );
                print_fields(&definition.bundle, 1);
            }
            Statement::Metadata { name, value } if !json => println!("~{} = {}", name, value),
            _ => {}
        }
    }

    if json {
        let text = serde_json::to_string_pretty(&entries)
            .map_err(|e| format!("Failed to render JSON: {}", e))?;
        println!("{}", text);
    }
    Ok(())
}

fn print_fields(bundle: &graphpack::Bundle, depth: usize) {
    let indent = "  ".repeat(depth);
    if let Some(base) = bundle.super_bundle() {
        println!("{}super {} v{}", indent, base.type_name(), base.version());
        print_fields(base, depth + 1);
    }
    for (name, holder) in bundle.fields() {
        let mut rendered = String::new();
        graphpack::text::writer::write_holder(&mut rendered, holder);
        println!("{}{} = {}", indent, name, rendered);
    }
}
