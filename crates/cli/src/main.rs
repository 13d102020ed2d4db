use std::io::{IsTerminal, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

/// Compiles a jade-style indentation template into its curly-brace target
/// dialect.
#[derive(Debug, Parser)]
#[clap(name = "jade", version)]
struct Cli {
  /// Source file to compile. Reads stdin when omitted.
  input: Option<PathBuf>,

  /// Write the compiled output here instead of stdout.
  #[arg(short, long, value_name = "PATH")]
  output: Option<PathBuf>,

  /// Disable ANSI colors in the diagnostic printed on failure.
  #[arg(long)]
  no_color: bool,
}

impl Cli {
  fn source(&self) -> anyhow::Result<String> {
    match &self.input {
      Some(path) => std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display())),
      None => {
        let mut buf = String::new();
        std::io::stdin()
          .read_to_string(&mut buf)
          .context("failed to read stdin")?;
        Ok(buf)
      }
    }
  }

  fn color(&self) -> bool {
    if self.no_color || std::env::var_os("NO_COLOR").is_some() {
      return false;
    }
    std::io::stdout().is_terminal()
  }
}

fn main() -> ExitCode {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .init();

  let cli = Cli::parse();
  match run(&cli) {
    Ok(code) => code,
    Err(e) => {
      eprintln!("error: {e:#}");
      ExitCode::FAILURE
    }
  }
}

fn run(cli: &Cli) -> anyhow::Result<ExitCode> {
  let source = cli.source()?;

  let output = match compiler::compile(&source) {
    Ok(out) => out,
    Err(e) => {
      eprintln!("{}", e.render(cli.color()));
      return Ok(ExitCode::FAILURE);
    }
  };

  match &cli.output {
    Some(path) => std::fs::write(path, output)
      .with_context(|| format!("failed to write {}", path.display()))?,
    None => std::io::stdout()
      .write_all(output.as_bytes())
      .context("failed to write to stdout")?,
  }

  Ok(ExitCode::SUCCESS)
}
