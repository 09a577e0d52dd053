//! Stratum CLI
//!
//! Entry point for the `stratum` command-line tool.

use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use stratum::binder::BindError;
use stratum::{Pipeline, PipelineConfig, PipelineError};

#[derive(Parser)]
#[command(name = "stratum")]
#[command(about = "Deterministic overlay rendering for runner deployment manifests", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render an overlay to canonical JSON
    Render {
        /// Path to the overlay directory
        overlay: PathBuf,

        /// Write the artifact to a file instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Override the overlay's base directory pointer
        #[arg(long)]
        base: Option<PathBuf>,

        /// Override the overlay's content store directory
        #[arg(long)]
        content: Option<PathBuf>,

        /// Stage-by-stage progress on stderr
        #[arg(long, short = 'v')]
        verbose: bool,
    },

    /// Validate an overlay without producing an artifact
    Validate {
        /// Path to the overlay directory
        overlay: PathBuf,

        /// Override the overlay's base directory pointer
        #[arg(long)]
        base: Option<PathBuf>,

        /// Override the overlay's content store directory
        #[arg(long)]
        content: Option<PathBuf>,

        /// Stage-by-stage progress on stderr
        #[arg(long, short = 'v')]
        verbose: bool,
    },

    /// Explain which layer supplied each merged field
    Explain {
        /// Path to the overlay directory
        overlay: PathBuf,

        /// Output in human-readable format instead of JSON
        #[arg(long)]
        human: bool,

        /// Override the overlay's base directory pointer
        #[arg(long)]
        base: Option<PathBuf>,

        /// Override the overlay's content store directory
        #[arg(long)]
        content: Option<PathBuf>,

        /// Stage-by-stage progress on stderr
        #[arg(long, short = 'v')]
        verbose: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            overlay,
            output,
            base,
            content,
            verbose,
        } => run_render(overlay, output, make_pipeline(base, content, verbose)),
        Commands::Validate {
            overlay,
            base,
            content,
            verbose,
        } => run_validate(overlay, make_pipeline(base, content, verbose)),
        Commands::Explain {
            overlay,
            human,
            base,
            content,
            verbose,
        } => run_explain(overlay, human, make_pipeline(base, content, verbose)),
    }
}

fn make_pipeline(base: Option<PathBuf>, content: Option<PathBuf>, verbose: bool) -> Pipeline {
    Pipeline::new(PipelineConfig {
        base_dir: base,
        content_dir: content,
        verbose,
    })
}

fn run_render(overlay: PathBuf, output: Option<PathBuf>, pipeline: Pipeline) {
    let outcome = match pipeline.render(&overlay) {
        Ok(outcome) => outcome,
        Err(e) => fail(e),
    };

    match output {
        Some(path) => {
            if let Err(e) = outcome.rendered.write_to_file(&path) {
                eprintln!("Error writing artifact: {}", e);
                process::exit(2);
            }
            eprintln!(
                "Rendered {} resource(s), {} instance(s) to {}",
                outcome.rendered.resources.len(),
                outcome.rendered.instances.len(),
                path.display()
            );
        }
        None => {
            let mut stdout = io::stdout();
            if stdout
                .write_all(&outcome.canonical)
                .and_then(|_| stdout.write_all(b"\n"))
                .is_err()
            {
                process::exit(2);
            }
        }
    }

    process::exit(0);
}

fn run_validate(overlay: PathBuf, pipeline: Pipeline) {
    match pipeline.validate(&overlay) {
        Ok(state) => {
            println!("Overlay valid: {}", state.overlay);
            process::exit(0);
        }
        Err(e) => fail(e),
    }
}

fn run_explain(overlay: PathBuf, human: bool, pipeline: Pipeline) {
    let explanation = match pipeline.explain(&overlay) {
        Ok(explanation) => explanation,
        Err(e) => fail(e),
    };

    if human {
        println!("{}", explanation.to_human());
    } else {
        match explanation.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error serializing output: {}", e);
                process::exit(2);
            }
        }
    }

    process::exit(0);
}

fn fail(error: PipelineError) -> ! {
    match &error {
        PipelineError::Validation(validation) => {
            eprintln!(
                "Validation failed ({} violation(s)):",
                validation.violations.len()
            );
            for violation in &validation.violations {
                eprintln!("  {}", violation);
            }
        }
        PipelineError::Bind(BindError::Unresolved(unresolved)) => {
            eprintln!("Unresolved config references:");
            for key in &unresolved.missing {
                eprintln!("  {}", key);
            }
        }
        other => {
            eprintln!("Error in {} stage: {}", other.stage(), other);
        }
    }
    process::exit(error.exit_code());
}
