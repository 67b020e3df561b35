//! Reader for the keyword-structured deck language.
//!
//! A deck is a line-oriented text file describing constituents, nested
//! repeating unit cells, loading and output options.
//!
//! # Grammar Overview
//!
//! ```text
//! deck        = [ title ] { block } [ "*END" ]
//! title       = any line not starting with '*'
//! block       = keyword { parameter_line }
//! keyword     = '*' name
//! parameter_line = pair { ' ' pair } [ '&' ]
//! pair        = key '=' value
//! value       = number | number { ',' number } | word
//! comment     = '#' { any_char }
//! ```
//!
//! A line ending in `&` continues on the next line. Comment lines are kept
//! and attached to the record that follows them. Keys are case-insensitive.
//!
//! # Keywords
//!
//! | Keyword | Contents |
//! |---------|----------|
//! | `*CONSTITUENTS` | `NMATS=n`, then one record per material |
//! | `*RUC`, `*RUC_LEGACY` | `NRUCS`, `CROT`, then one block per unit cell |
//! | `*MECH`, `*MULTIPHYSICS` | `LOP` header, then 1, 2 or 6 loading legs |
//! | `*THERM` | one optional line |
//! | `*SOLVER` | method settings and time stepping |
//! | `*FAILURE_SUBCELL` | per-material failure criteria |
//! | `*PDFA` | per-material progressive damage settings |
//! | `*PRINT`, `*HDF5`, `*PROBLEM_TYPE`, `*MATLAB` | one optional line over defaults |
//! | `*EXTERNAL_SETTINGS` | two lines |
//! | `*XYPLOT` | `FREQ`, then `MACRO` and `MICRO` result groups |
//! | `*END` | end of input |
//!
//! # Example
//!
//! ```text
//! Unidirectional composite
//! *CONSTITUENTS
//!  NMATS=2
//!  # fiber
//!  M=1 CMOD=6 MATID=U MATDB=1
//!  M=2 CMOD=6 MATID=E MATDB=1
//! *RUC
//!  MOD=102 ARCHID=6 VF=0.6 F=1 M=2 R=1.0
//! *MECH
//!  LOP=2
//!  NPT=2 TI=0.0,1.0 MAG=0.0,0.02 MODE=1
//! *END
//! ```

pub mod ast;
pub mod lines;
pub mod params;
mod parser;
pub mod readers;
pub mod ruc_reader;
pub mod substitute;

use std::collections::HashMap;

pub use ast::DeckAst;
pub use lines::{LineCursor, LogicalLine};
pub use params::{ParamValue, ParameterBlock};
pub use parser::parse_deck;

use crate::error::Result;

/// Parse deck text without placeholder overrides.
pub fn parse(input: &str) -> Result<DeckAst> {
    parse_with(input, &HashMap::new())
}

/// Substitute `{NAME}` placeholders, then parse.
pub fn parse_with(input: &str, overrides: &HashMap<String, String>) -> Result<DeckAst> {
    let text = substitute::substitute(input, overrides)?;
    parse_deck(&text)
}

/// Parse a deck file.
pub fn parse_file(path: &std::path::Path) -> Result<DeckAst> {
    let content = std::fs::read_to_string(path).map_err(|e| crate::error::DeckError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    parse(&content)
}
