//! # Rucdeck
//!
//! A compiler for keyword-structured micromechanics decks.
//!
//! A deck describes constituent materials and a set of repeating unit cells
//! (RUCs) whose subvolumes hold either a material or another RUC. This
//! library provides:
//! - A reader for the deck language, with `{NAME}` placeholder substitution
//! - Generators for the built-in architectures, stacks and tows
//! - Orientation frames per subvolume, with an optional override file
//! - Definition and result hierarchies over nested cells
//! - Dense material renumbering and write-back to deck text
//!
//! ## Architecture
//!
//! - [`deck`] - Logical lines, parameter decoding and the keyword readers
//! - [`ruc`] - Unit cells, grids and architecture generation
//! - [`model`] - Deck-wide passes producing a [`CompiledDeck`]
//! - [`writer`] - Deck text output
//!
//! ## Usage
//!
//! ### Native CLI
//!
//! ```bash
//! rucdeck laminate.MAC --tree result --max-level 2
//! rucdeck laminate.MAC --set VF=0.55 --write > laminate_055.MAC
//! ```
//!
//! ### Library
//!
//! ```
//! use rucdeck::{compile_str, CompileOptions};
//!
//! let deck = "\
//! *CONSTITUENTS
//!  NMATS=2
//!  M=1 CMOD=6 MATID=U
//!  M=2 CMOD=6 MATID=E
//! *RUC
//!  MOD=102 ARCHID=1 VF=0.5 F=1 M=2
//! *END
//! ";
//! let compiled = compile_str(deck, &CompileOptions::default()).unwrap();
//! assert_eq!(compiled.materials.len(), 2);
//! ```

pub mod deck;
pub mod error;
pub mod model;
pub mod ruc;
pub mod writer;

use std::path::Path;

use tracing::debug;

// Re-export main types for convenience
pub use deck::{parse, parse_with, DeckAst};
pub use error::{DeckError, Result};
pub use model::{compile, CompileOptions, CompiledDeck, Diagnostic, HierarchyMode};
pub use writer::{write_deck, DeckText};

// WASM bindings
#[cfg(feature = "wasm")]
mod wasm;

#[cfg(feature = "wasm")]
pub use wasm::WasmDeck;

/// Starts a comment line
pub const COMMENT_MARKER: char = '#';

/// Ends a line that continues on the next one
pub const CONTINUATION_MARKER: char = '&';

/// Starts a keyword line
pub const KEYWORD_PREFIX: char = '*';

/// Column past which written lines are wrapped
pub const DEFAULT_WRAP_COLUMN: usize = 75;

/// Largest pairwise dot product accepted between frame axes
pub const DEFAULT_ORTHOGONALITY_TOLERANCE: f64 = 1e-6;

/// Direction components smaller than this are treated as zero
pub const SINGULARITY_EPSILON: f64 = 1e-9;

/// Substitute placeholders, parse and compile deck text.
pub fn compile_str(text: &str, options: &CompileOptions) -> Result<CompiledDeck> {
    let deck = parse_with(text, &options.parameter_overrides)?;
    compile(deck, options)
}

/// Compile a deck file.
///
/// Unless `options` already carries override text, a sibling file with the
/// `.rot` extension is read when present.
pub fn compile_file(path: &Path, options: &CompileOptions) -> Result<CompiledDeck> {
    let text = std::fs::read_to_string(path).map_err(|e| DeckError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;

    let mut options = options.clone();
    if options.override_text.is_none() {
        let rot = path.with_extension("rot");
        if rot.is_file() {
            debug!(path = %rot.display(), "reading orientation overrides");
            options.override_text = Some(std::fs::read_to_string(&rot).map_err(|e| DeckError::FileReadError {
                path: rot.display().to_string(),
                source: e,
            })?);
        }
    }

    compile_str(&text, &options)
}
