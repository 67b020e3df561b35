//! Rucdeck - micromechanics deck compiler
//!
//! Reads a deck, runs the deck-wide passes and prints a JSON summary, or
//! writes the compiled deck back out.
//!
//! # Usage
//!
//! ```bash
//! rucdeck laminate.MAC --tree result --max-level 2
//! rucdeck laminate.MAC --set VF=0.55 --write laminate_055.MAC
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rucdeck::{
    compile_file,
    error::{DeckError, Result},
    write_deck, CompileOptions, HierarchyMode, DEFAULT_ORTHOGONALITY_TOLERANCE, DEFAULT_WRAP_COLUMN,
};

/// Which hierarchy to include in the summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Tree {
    Definition,
    Result,
    None,
}

/// Micromechanics deck compiler
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the deck file
    #[arg(value_name = "DECK")]
    deck: PathBuf,

    /// Orientation override file (defaults to the deck's sibling .rot file)
    #[arg(long, value_name = "FILE")]
    rot: Option<PathBuf>,

    /// Hierarchy to print
    #[arg(long, value_enum, default_value_t = Tree::Definition)]
    tree: Tree,

    /// Deepest level of the result hierarchy
    #[arg(long)]
    max_level: Option<usize>,

    /// Write the compiled deck to this path instead of printing a summary
    #[arg(long, value_name = "OUT")]
    write: Option<PathBuf>,

    /// Column past which written lines are wrapped
    #[arg(long, default_value_t = DEFAULT_WRAP_COLUMN)]
    wrap: usize,

    /// Largest dot product accepted between frame axes
    #[arg(long, default_value_t = DEFAULT_ORTHOGONALITY_TOLERANCE)]
    tolerance: f64,

    /// Placeholder value, NAME=VALUE (repeatable)
    #[arg(long = "set", value_name = "NAME=VALUE", value_parser = parse_assignment)]
    set: Vec<(String, String)>,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

fn parse_assignment(s: &str) -> std::result::Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected NAME=VALUE, found '{}'", s))
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| DeckError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })
}

fn write_text(path: &Path, text: &str) -> Result<()> {
    std::fs::write(path, text).map_err(|e| DeckError::FileWriteError {
        path: path.display().to_string(),
        source: e,
    })
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.quiet {
        tracing::Level::WARN
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    let options = CompileOptions {
        wrap_column: args.wrap,
        orthogonality_tolerance: args.tolerance,
        result_max_level: args.max_level,
        parameter_overrides: args.set.into_iter().collect::<HashMap<_, _>>(),
        override_text: args.rot.as_deref().map(read_text).transpose()?,
    };

    let compiled = compile_file(&args.deck, &options)?;

    match &args.write {
        Some(out) => {
            let text = write_deck(&compiled, options.wrap_column)?;
            write_text(out, &text.deck)?;
            if let Some(rotations) = &text.rotations {
                write_text(&out.with_extension("rot"), rotations)?;
            }
            info!(path = %out.display(), "wrote deck");
        }
        None => {
            let mode = match args.tree {
                Tree::Definition => Some(HierarchyMode::Definition),
                Tree::Result => Some(HierarchyMode::Result),
                Tree::None => None,
            };
            println!("{}", serde_json::to_string_pretty(&compiled.summary(mode))?);
        }
    }

    Ok(())
}
