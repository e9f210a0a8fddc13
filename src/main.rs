use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, ValueEnum};
use tracing_subscriber::EnvFilter;
use ycc::frame::FrameMap;
use ycc::{CompileResult, parser, tokenizer};

/// Passing this as the source runs the built-in self-test instead.
const SELF_TEST_ARG: &str = "-test";

const SELF_TEST_PROGRAM: &str = "\
  max(a, b) { if (a < b) return b; return a; } \
  x = max(3, 4) * 2; if (x == 8) x = x - 1; else x = 0; x";

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Emit {
  /// Assembly listing
  Asm,
  /// Token stream, for debugging
  Tokens,
  /// Syntax tree, for debugging
  Ast,
}

/// Compile a tiny C-like program given on the command line into x86-64 assembly.
///
/// Options are long-only and go after SOURCE, so any text starting with a
/// single `-` (such as `-v` or `-3+5`) is read as the program.
#[derive(Debug, Parser)]
#[command(version, about, disable_help_flag = true, disable_version_flag = true)]
struct Cli {
  /// Program text (not a file path)
  #[arg(allow_hyphen_values = true)]
  source: String,

  /// Write the output here instead of stdout
  #[arg(long)]
  output: Option<PathBuf>,

  /// What to print
  #[arg(long, value_enum, default_value_t = Emit::Asm)]
  emit: Emit,

  /// Log pipeline progress to stderr
  #[arg(long)]
  verbose: bool,

  /// Print help
  #[arg(long, action = ArgAction::Help)]
  help: Option<bool>,

  /// Print version
  #[arg(long, action = ArgAction::Version)]
  version: Option<bool>,
}

fn main() -> ExitCode {
  let cli = match Cli::try_parse() {
    Ok(cli) => cli,
    Err(err) => {
      let _ = err.print();
      return if err.use_stderr() {
        ExitCode::FAILURE
      } else {
        ExitCode::SUCCESS
      };
    }
  };

  init_tracing(cli.verbose);

  if cli.source == SELF_TEST_ARG {
    return match self_test() {
      Ok(()) => {
        println!("self-test passed");
        ExitCode::SUCCESS
      }
      Err(message) => {
        eprintln!("self-test failed: {message}");
        ExitCode::FAILURE
      }
    };
  }

  let rendered = match render(&cli) {
    Ok(rendered) => rendered,
    Err(err) => {
      eprintln!("{err}");
      return ExitCode::FAILURE;
    }
  };

  match &cli.output {
    Some(path) => {
      if let Err(err) = fs::write(path, rendered) {
        eprintln!("{}: {err}", path.display());
        return ExitCode::FAILURE;
      }
      tracing::debug!(path = %path.display(), "wrote output");
    }
    None => print!("{rendered}"),
  }
  ExitCode::SUCCESS
}

fn init_tracing(verbose: bool) {
  let filter = if verbose {
    EnvFilter::new("debug")
  } else {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
  };
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(io::stderr)
    .with_target(false)
    .init();
}

fn render(cli: &Cli) -> CompileResult<String> {
  match cli.emit {
    Emit::Asm => ycc::generate_assembly(&cli.source),
    Emit::Tokens => {
      let tokens = tokenizer::tokenize(&cli.source)?;
      Ok(format!("{tokens:#?}\n"))
    }
    Emit::Ast => {
      let tokens = tokenizer::tokenize(&cli.source)?;
      let program = parser::parse(tokens, &cli.source)?;
      Ok(format!("{program:#?}\n"))
    }
  }
}

fn self_test() -> Result<(), String> {
  let frame = FrameMap::from_occurrences(["a", "b", "a", "c"]);
  let layout: Vec<_> = frame.iter().map(|local| local.offset).collect();
  if layout != [8, 16, 24] || frame.stack_size() != 24 {
    return Err(format!("unexpected frame layout {layout:?}"));
  }

  let first = ycc::generate_assembly(SELF_TEST_PROGRAM).map_err(|err| err.to_string())?;
  let second = ycc::generate_assembly(SELF_TEST_PROGRAM).map_err(|err| err.to_string())?;
  if first != second {
    return Err("assembly differs between runs".to_string());
  }
  Ok(())
}
