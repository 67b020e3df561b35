//! Block types produced by the keyword readers.

use super::params::ParameterBlock;
use crate::model::Diagnostic;
use crate::ruc::{Actual, RucCollection};

/// Complete parsed representation of a deck, before the deck-wide passes.
#[derive(Debug, Clone, Default)]
pub struct DeckAst {
    /// Free-text title (first line, when it is not a keyword)
    pub title: Option<String>,
    pub constituents: Option<Constituents>,
    pub rucs: Option<RucSection>,
    pub mech: Option<Mech>,
    pub multiphysics: Option<Mech>,
    pub therm: Option<ParameterBlock>,
    pub solver: Option<ParameterBlock>,
    pub failure_subcell: Option<FailureSubcell>,
    pub pdfa: Option<Pdfa>,
    pub print: Option<ParameterBlock>,
    pub hdf5: Option<ParameterBlock>,
    pub problem_type: Option<ParameterBlock>,
    pub external: Option<ParameterBlock>,
    pub xyplot: Option<XyPlot>,
    pub matlab: Option<ParameterBlock>,
    /// Recoverable problems found while reading
    pub diagnostics: Vec<Diagnostic>,
}

impl DeckAst {
    /// Create a new empty deck.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Keywords understood by the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Constituents,
    Ruc,
    RucLegacy,
    Mech,
    Multiphysics,
    Therm,
    Solver,
    FailureSubcell,
    Pdfa,
    Print,
    Hdf5,
    ProblemType,
    ExternalSettings,
    XyPlot,
    Matlab,
    End,
}

impl Keyword {
    /// Parse a keyword from a marker line such as `*MECH`.
    pub fn from_line(line: &str) -> Option<Self> {
        match line.trim().to_ascii_uppercase().as_str() {
            "*CONSTITUENTS" => Some(Self::Constituents),
            "*RUC" => Some(Self::Ruc),
            "*RUC_LEGACY" => Some(Self::RucLegacy),
            "*MECH" => Some(Self::Mech),
            "*MULTIPHYSICS" => Some(Self::Multiphysics),
            "*THERM" => Some(Self::Therm),
            "*SOLVER" => Some(Self::Solver),
            "*FAILURE_SUBCELL" | "*FAILURE SUBCELL" => Some(Self::FailureSubcell),
            "*PDFA" => Some(Self::Pdfa),
            "*PRINT" => Some(Self::Print),
            "*HDF5" => Some(Self::Hdf5),
            "*PROBLEM_TYPE" => Some(Self::ProblemType),
            "*EXTERNAL_SETTINGS" => Some(Self::ExternalSettings),
            "*XYPLOT" => Some(Self::XyPlot),
            "*MATLAB" => Some(Self::Matlab),
            "*END" => Some(Self::End),
            _ => None,
        }
    }

    /// Canonical marker text.
    pub fn marker(&self) -> &'static str {
        match self {
            Self::Constituents => "*CONSTITUENTS",
            Self::Ruc => "*RUC",
            Self::RucLegacy => "*RUC_LEGACY",
            Self::Mech => "*MECH",
            Self::Multiphysics => "*MULTIPHYSICS",
            Self::Therm => "*THERM",
            Self::Solver => "*SOLVER",
            Self::FailureSubcell => "*FAILURE_SUBCELL",
            Self::Pdfa => "*PDFA",
            Self::Print => "*PRINT",
            Self::Hdf5 => "*HDF5",
            Self::ProblemType => "*PROBLEM_TYPE",
            Self::ExternalSettings => "*EXTERNAL_SETTINGS",
            Self::XyPlot => "*XYPLOT",
            Self::Matlab => "*MATLAB",
            Self::End => "*END",
        }
    }
}

/// A parameter record together with the comments that preceded it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub params: ParameterBlock,
    pub comments: Vec<String>,
}

/// `*CONSTITUENTS` block.
#[derive(Debug, Clone)]
pub struct Constituents {
    /// Header line (`NMATS`)
    pub header: ParameterBlock,
    /// One record per material, property lines merged in
    pub materials: Vec<Record>,
}

impl Constituents {
    /// Number of constituent materials.
    pub fn count(&self) -> usize {
        self.materials.len()
    }
}

/// `*MECH` / `*MULTIPHYSICS` block.
#[derive(Debug, Clone)]
pub struct Mech {
    /// Header line (`LOP`, ...)
    pub header: Record,
    /// Loading legs, the count implied by `LOP`
    pub legs: Vec<Record>,
}

/// Number of loading legs implied by a load option code.
pub fn leg_count(lop: i64) -> usize {
    match lop {
        i64::MIN..=6 => 1,
        7..=12 => 2,
        99 => 6,
        _ => 0,
    }
}

/// `*FAILURE_SUBCELL` block.
#[derive(Debug, Clone)]
pub struct FailureSubcell {
    pub header: ParameterBlock,
    pub materials: Vec<FailureMaterial>,
}

/// One material of a `*FAILURE_SUBCELL` block.
#[derive(Debug, Clone)]
pub struct FailureMaterial {
    pub record: Record,
    pub criteria: Vec<FailureCriterion>,
}

/// One failure criterion, optionally temperature-dependent.
#[derive(Debug, Clone)]
pub struct FailureCriterion {
    pub params: ParameterBlock,
    /// Keys gathered from temperature table rows, in table order
    pub table_columns: Vec<String>,
}

/// Columns recognised in temperature-dependent failure tables.
pub const FAILURE_TABLE_COLUMNS: &[&str] = &[
    "temp", "x11", "x22", "x33", "x23", "x13", "x12", "x11c", "x22c", "x33c",
];

/// `*PDFA` block.
#[derive(Debug, Clone)]
pub struct Pdfa {
    pub header: ParameterBlock,
    pub materials: Vec<PdfaMaterial>,
}

/// Per-material `*PDFA` settings, read from two lines.
#[derive(Debug, Clone)]
pub struct PdfaMaterial {
    /// Both lines merged
    pub params: ParameterBlock,
    /// Number of leading entries that came from the first line
    pub first_line: usize,
}

/// `*XYPLOT` block.
#[derive(Debug, Clone)]
pub struct XyPlot {
    pub header: ParameterBlock,
    pub macro_plots: PlotGroup,
    pub micro_plots: PlotGroup,
}

/// A `MACRO=n` or `MICRO=n` group and its result lines.
#[derive(Debug, Clone, Default)]
pub struct PlotGroup {
    pub params: ParameterBlock,
    pub results: Vec<ParameterBlock>,
}

/// Options given at the top of a `*RUC` block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RucSettings {
    /// `NRUCS` as given in the deck
    pub nrucs: usize,
    /// Orientation override file requested (`CROT=1`)
    pub crot: bool,
    /// Read with legacy method codes (`*RUC_LEGACY`)
    pub legacy: bool,
}

/// `*RUC` block: every unit cell defined by the deck plus generated built-ins.
#[derive(Debug, Clone)]
pub struct RucSection {
    pub settings: RucSettings,
    /// Unit cells in definition order, deck numbering
    pub rucs: RucCollection<Actual>,
}
