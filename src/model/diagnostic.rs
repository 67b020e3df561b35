//! Recoverable conditions found while compiling a deck.

use std::fmt;

use serde::Serialize;
use tracing::warn;

use super::orientation::FrameSource;

/// A non-fatal problem. Compilation continues after each one.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// Volume fraction above an architecture's packing limit
    VolumeFractionClamped {
        msm: i64,
        archid: i64,
        requested: f64,
        used: f64,
    },
    /// A frame whose axes are not mutually orthogonal
    NotOrthogonal {
        /// RUC holding the frame
        msm: i64,
        /// Where the frame came from
        source: FrameSource,
        /// d1·d2, d1·d3, d2·d3
        dots: [f64; 3],
    },
    /// An override d1 with a near-zero first component
    SingularVector { msm: i64, cell: [usize; 3] },
    /// `CROT=1` without an orientation override file
    MissingOverrideFile,
    /// A `*` keyword the reader does not know; its lines were skipped
    UnknownKeyword { keyword: String, line: usize },
    /// Fewer RUC blocks than `NRUCS` announced
    MissingRucBlocks { expected: usize, found: usize },
}

impl Diagnostic {
    /// Log this diagnostic and add it to `sink`.
    pub(crate) fn report(self, sink: &mut Vec<Diagnostic>) {
        warn!("{}", self);
        sink.push(self);
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VolumeFractionClamped {
                msm,
                archid,
                requested,
                used,
            } => write!(
                f,
                "RUC {} (ARCHID={}): maximum volume fraction exceeded, using {} instead of {}",
                msm, archid, used, requested
            ),
            Self::NotOrthogonal { msm, source, dots } => write!(
                f,
                "RUC {}: frame from {} is not orthogonal, d1.d2={:e} d1.d3={:e} d2.d3={:e}",
                msm, source, dots[0], dots[1], dots[2]
            ),
            Self::SingularVector { msm, cell } => write!(
                f,
                "RUC {}: override at ({},{},{}) has d1x near zero, substituted a small value",
                msm, cell[0], cell[1], cell[2]
            ),
            Self::MissingOverrideFile => write!(
                f,
                "CROT=1 but no orientation override file was given, using default orientations"
            ),
            Self::UnknownKeyword { keyword, line } => {
                write!(f, "line {}: unknown keyword {} skipped", line, keyword)
            }
            Self::MissingRucBlocks { expected, found } => {
                write!(f, "*RUC announced {} blocks but only {} were found", expected, found)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_collects() {
        let mut sink = Vec::new();
        Diagnostic::MissingOverrideFile.report(&mut sink);
        assert_eq!(sink, vec![Diagnostic::MissingOverrideFile]);
    }

    #[test]
    fn test_serializes_with_kind_tag() {
        let diag = Diagnostic::UnknownKeyword {
            keyword: "*BOUNDARY".to_string(),
            line: 12,
        };
        let json = serde_json::to_value(&diag).unwrap();
        assert_eq!(json["kind"], "unknown_keyword");
        assert_eq!(json["line"], 12);
        assert!(diag.to_string().contains("*BOUNDARY"));
    }
}
