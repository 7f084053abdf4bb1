//! Command-line interface for the Sable compiler.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use sable_driver::{CompileOptions, Driver};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "sablec")]
#[command(author, version, about = "The Sable programming language compiler", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a Sable source file to class files
    Build {
        /// The input file to compile
        #[arg(required = true)]
        input: PathBuf,

        /// The output directory (defaults to the input's directory)
        #[arg(short, long)]
        out_dir: Option<PathBuf>,

        /// Dump the token stream before parsing
        #[arg(long)]
        emit_tokens: bool,

        /// Dump the AST after parsing
        #[arg(long)]
        emit_ast: bool,
    },

    /// Check a Sable source file for errors without emitting
    Check {
        /// The input file to check
        #[arg(required = true)]
        input: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let driver = if cli.verbose {
        Driver::verbose()
    } else {
        Driver::new()
    };

    match cli.command {
        Commands::Build {
            input,
            out_dir,
            emit_tokens,
            emit_ast,
        } => {
            if !input.exists() {
                bail!("file not found: {}", input.display());
            }

            let options = CompileOptions {
                out_dir,
                emit_tokens,
                emit_ast,
                verbose: cli.verbose,
            };

            let written = driver.compile_file(&input, &options)?;
            if cli.verbose {
                eprintln!("Build succeeded: {} class file(s)", written.len());
            }
            Ok(())
        }

        Commands::Check { input } => {
            let source = std::fs::read_to_string(&input)
                .with_context(|| format!("failed to read {}", input.display()))?;
            let file_name = input
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("input.sb");

            driver.check(&source, file_name)?;
            println!("No errors found in {}", input.display());
            Ok(())
        }
    }
}
