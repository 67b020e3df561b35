//! The compiled deck model and the deck-wide passes that build it.
//!
//! [`compile`] takes a parsed [`DeckAst`] and runs, in order:
//!
//! 1. orientation assignment on every RUC
//! 2. definition and result hierarchy construction
//! 3. material map construction and grid renumbering
//!
//! The result is a [`CompiledDeck`] whose RUC grids hold dense material
//! indices. Everything recoverable that went wrong along the way is in
//! [`CompiledDeck::diagnostics`].

pub mod diagnostic;
pub mod hierarchy;
pub mod materials;
pub mod orientation;

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info};

pub use diagnostic::Diagnostic;
pub use hierarchy::{ArchiveAddress, DefinitionNode, DisplayNode, ResultTree};
pub use materials::MaterialMap;
pub use orientation::{Frame, OrientationOverrides};

use crate::deck::ast::{DeckAst, RucSection, RucSettings};
use crate::error::{DeckError, Result};
use crate::ruc::{Indexed, Ruc, RucCollection};
use crate::{DEFAULT_ORTHOGONALITY_TOLERANCE, DEFAULT_WRAP_COLUMN};

/// Options for [`compile`] and the crate-level entry points.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Column past which written lines are wrapped
    pub wrap_column: usize,
    /// Largest pairwise dot product accepted as orthogonal
    pub orthogonality_tolerance: f64,
    /// Deepest level linked into the result hierarchy
    pub result_max_level: Option<usize>,
    /// Values for `{NAME}` placeholders, replacing deck defaults
    pub parameter_overrides: HashMap<String, String>,
    /// Contents of the orientation override file
    pub override_text: Option<String>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            wrap_column: DEFAULT_WRAP_COLUMN,
            orthogonality_tolerance: DEFAULT_ORTHOGONALITY_TOLERANCE,
            result_max_level: None,
            parameter_overrides: HashMap::new(),
            override_text: None,
        }
    }
}

/// Which hierarchy to present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HierarchyMode {
    Definition,
    Result,
}

/// A fully resolved deck.
#[derive(Debug, Clone)]
pub struct CompiledDeck {
    /// Every non-RUC block as read; `deck.rucs` is always `None`
    pub deck: DeckAst,
    pub settings: RucSettings,
    /// Unit cells with grids in indexed numbering
    pub rucs: RucCollection<Indexed>,
    pub materials: MaterialMap,
    pub definition: DefinitionNode,
    pub result: ResultTree,
    /// Override file contents applied to the orientations
    pub overrides: Option<OrientationOverrides>,
    pub diagnostics: Vec<Diagnostic>,
}

impl CompiledDeck {
    /// The top-level cell.
    pub fn top(&self) -> Option<&Ruc> {
        self.rucs.top()
    }

    pub fn display(&self, mode: HierarchyMode) -> DisplayNode {
        match mode {
            HierarchyMode::Definition => self.definition.display(),
            HierarchyMode::Result => self.result.display(),
        }
    }

    /// JSON-ready overview, with the hierarchy in `mode` if one is given.
    pub fn summary(&self, mode: Option<HierarchyMode>) -> DeckSummary<'_> {
        DeckSummary {
            title: self.deck.title.as_deref(),
            rucs: self.rucs.len(),
            materials: &self.materials,
            instances: self.result.instance_count,
            max_level: self.result.max_level,
            hierarchy: mode.map(|m| self.display(m)),
            diagnostics: &self.diagnostics,
        }
    }
}

/// Serializable overview of a [`CompiledDeck`].
#[derive(Debug, Serialize)]
pub struct DeckSummary<'a> {
    pub title: Option<&'a str>,
    pub rucs: usize,
    /// Dense index to deck material number
    pub materials: &'a MaterialMap,
    /// RUC instances in the result hierarchy
    pub instances: usize,
    /// Depth cutoff of the result hierarchy, if any
    pub max_level: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hierarchy: Option<DisplayNode>,
    pub diagnostics: &'a [Diagnostic],
}

/// Run the deck-wide passes over a parsed deck.
///
/// # Errors
/// `MissingKeyword` without `*CONSTITUENTS` or `*RUC`, `MalformedInput`
/// without a top-level RUC, plus anything the orientation and hierarchy
/// passes raise.
pub fn compile(mut deck: DeckAst, options: &CompileOptions) -> Result<CompiledDeck> {
    let constituents = deck
        .constituents
        .as_ref()
        .ok_or(DeckError::MissingKeyword {
            keyword: "*CONSTITUENTS",
        })?
        .count();
    let RucSection { settings, mut rucs } = deck
        .rucs
        .take()
        .ok_or(DeckError::MissingKeyword { keyword: "*RUC" })?;
    let mut diagnostics = std::mem::take(&mut deck.diagnostics);

    let top = rucs
        .top()
        .ok_or_else(|| DeckError::malformed("*RUC", "no top-level RUC (MSM=0) is defined"))?;
    let xang = top
        .params
        .float("xang")
        .map_err(|e| e.in_context("*RUC", None))?
        .unwrap_or(0.0);

    let overrides = match (&options.override_text, settings.crot) {
        (Some(text), true) => Some(OrientationOverrides::parse(text)?),
        (None, true) => {
            Diagnostic::MissingOverrideFile.report(&mut diagnostics);
            None
        }
        (Some(_), false) => {
            debug!("orientation override file ignored, CROT is not set");
            None
        }
        (None, false) => None,
    };

    orientation::resolve(
        &mut rucs,
        overrides.as_ref(),
        xang,
        options.orthogonality_tolerance,
        &mut diagnostics,
    )?;

    let definition = hierarchy::definition_tree(&rucs)?;
    let result = hierarchy::result_tree(&rucs, options.result_max_level)?;

    let materials = MaterialMap::from_rucs(constituents, &rucs);
    let rucs = rucs.renumber(&materials)?;

    info!(
        rucs = rucs.len(),
        materials = materials.len(),
        instances = result.instance_count,
        warnings = diagnostics.len(),
        "compiled deck"
    );

    Ok(CompiledDeck {
        deck,
        settings,
        rucs,
        materials,
        definition,
        result,
        overrides,
        diagnostics,
    })
}
