//! Per-cell material frames.
//!
//! Every subvolume carries three unit vectors (the material x1, x2, x3
//! axes). They default to the global axes and are replaced, in order, by:
//!
//! 1. the built-in frame of a stack or tow id (−16..−1) the cell holds,
//! 2. the explicit `D1/D2/D3` triple of a user RUC the cell holds,
//! 3. an entry of the orientation override file, which gives only d1 and
//!    has d2 and d3 completed as a right-handed orthogonal set.
//!
//! Each assigned frame is checked for orthogonality; a violation is a
//! [`Diagnostic`], never an error.
//!
//! # Override file
//!
//! ```text
//! 1            number of RUC records
//! 0,2          RUC id, number of cell records
//! 1,1,1,1.0,0.0,0.0
//! 2,1,1,0.0,1.0,0.0
//! ```
//!
//! Cell indices are 1-based `(ia, ib, ig)`.

use std::fmt;

use serde::Serialize;

use super::Diagnostic;
use crate::error::{DeckError, Result};
use crate::ruc::builtin::{is_builtin, STACK_IDS};
use crate::ruc::{Actual, RucCollection};
use crate::SINGULARITY_EPSILON;

pub type Vec3 = [f64; 3];

fn dot(a: &Vec3, b: &Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn cross(a: &Vec3, b: &Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn norm(a: &Vec3) -> f64 {
    dot(a, a).sqrt()
}

fn unit(a: &Vec3) -> (Vec3, f64) {
    let n = norm(a);
    if n == 0.0 {
        (*a, 0.0)
    } else {
        ([a[0] / n, a[1] / n, a[2] / n], n)
    }
}

/// Three material axes of one subvolume.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Frame {
    pub x1: Vec3,
    pub x2: Vec3,
    pub x3: Vec3,
    /// Lengths of the vectors as supplied, before normalization
    pub norms: [f64; 3],
}

impl Frame {
    /// The global axes.
    pub const GLOBAL: Frame = Frame {
        x1: [1.0, 0.0, 0.0],
        x2: [0.0, 1.0, 0.0],
        x3: [0.0, 0.0, 1.0],
        norms: [1.0, 1.0, 1.0],
    };

    /// Normalize three axes, keeping their lengths.
    pub fn from_axes(axes: [Vec3; 3]) -> Self {
        let (x1, n1) = unit(&axes[0]);
        let (x2, n2) = unit(&axes[1]);
        let (x3, n3) = unit(&axes[2]);
        Self {
            x1,
            x2,
            x3,
            norms: [n1, n2, n3],
        }
    }

    /// Complete a right-handed frame from its first axis.
    ///
    /// Returns the frame and whether d1's first component had to be
    /// replaced by [`SINGULARITY_EPSILON`].
    pub fn complete(d1: Vec3) -> (Self, bool) {
        let mut d1 = d1;
        let singular = d1[0].abs() < SINGULARITY_EPSILON;
        if singular {
            d1[0] = SINGULARITY_EPSILON;
        }

        let mut d2 = [-(d1[1] * d1[1] + d1[2] * d1[2]) / d1[0], d1[1], d1[2]];
        if norm(&d2) < SINGULARITY_EPSILON {
            // d1 lies along x
            d2 = [0.0, 1.0, 0.0];
        }
        let d3 = cross(&d1, &d2);

        (Self::from_axes([d1, d2, d3]), singular)
    }

    /// Pairwise dot products `[x1·x2, x1·x3, x2·x3]`.
    pub fn dots(&self) -> [f64; 3] {
        [dot(&self.x1, &self.x2), dot(&self.x1, &self.x3), dot(&self.x2, &self.x3)]
    }

    /// Check that every pairwise dot product is below `tolerance`.
    pub fn is_orthogonal(&self, tolerance: f64) -> bool {
        self.dots().iter().all(|d| d.abs() < tolerance)
    }
}

/// Built-in frame of a stack or tow id. `xang` is in degrees.
pub fn catalog_axes(id: i64, xang: f64) -> Option<[Vec3; 3]> {
    let t = xang.to_radians().tan();
    let (d1, d2) = match id {
        id if STACK_IDS.contains(&id) => return Some([Frame::GLOBAL.x1, Frame::GLOBAL.x2, Frame::GLOBAL.x3]),
        -11 => ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0]),
        -12 => ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0]),
        -13 => ([t, 1.0, 0.0], [-1.0, t, 0.0]),
        -14 => ([-t, 1.0, 0.0], [-1.0, -t, 0.0]),
        -15 => ([t, 0.0, 1.0], [-1.0, 0.0, t]),
        -16 => ([-t, 0.0, 1.0], [-1.0, 0.0, -t]),
        _ => return None,
    };
    Some([d1, d2, cross(&d1, &d2)])
}

/// Where an assigned frame came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameSource {
    /// Built-in or explicit frame of the referenced material
    Material(i64),
    /// Override file entry at a 1-based cell
    Override([usize; 3]),
}

impl fmt::Display for FrameSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Material(m) => write!(f, "material {}", m),
            Self::Override([a, b, g]) => write!(f, "override ({},{},{})", a, b, g),
        }
    }
}

// ============ Override file ============

/// One cell entry of the override file.
#[derive(Debug, Clone, PartialEq)]
pub struct CellOverride {
    /// 1-based cell indices
    pub ia: usize,
    pub ib: usize,
    pub ig: usize,
    pub d1: Vec3,
    /// Source line in the override file
    pub line: usize,
}

/// All entries for one RUC.
#[derive(Debug, Clone, PartialEq)]
pub struct RucOverride {
    pub msm: i64,
    pub line: usize,
    pub cells: Vec<CellOverride>,
}

/// Parsed orientation override file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrientationOverrides {
    pub rucs: Vec<RucOverride>,
}

fn fields(line: usize, text: &str, expected: usize) -> Result<Vec<&str>> {
    let fields: Vec<&str> = text.split(',').map(str::trim).collect();
    if fields.len() < expected {
        return Err(DeckError::bad_override(
            line,
            format!("expected {} comma-separated fields, found '{}'", expected, text),
        ));
    }
    Ok(fields)
}

fn number<T: std::str::FromStr>(line: usize, text: &str) -> Result<T> {
    text.parse()
        .map_err(|_| DeckError::bad_override(line, format!("'{}' is not a valid number", text)))
}

impl OrientationOverrides {
    /// Parse override file text.
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.trim()))
            .filter(|(_, l)| !l.is_empty());
        let mut next = |what: &str| {
            lines
                .next()
                .ok_or_else(|| DeckError::bad_override(0, format!("unexpected end of file, expected {}", what)))
        };

        let (line, count) = next("the record count")?;
        let count: usize = number(line, count)?;

        let mut rucs = Vec::new();
        for _ in 0..count {
            let (line, header) = next("a RUC record")?;
            let f = fields(line, header, 2)?;
            let msm: i64 = number(line, f[0])?;
            let ncells: usize = number(line, f[1])?;

            let mut cells = Vec::new();
            for _ in 0..ncells {
                let (line, record) = next("a cell record")?;
                let f = fields(line, record, 6)?;
                cells.push(CellOverride {
                    ia: number(line, f[0])?,
                    ib: number(line, f[1])?,
                    ig: number(line, f[2])?,
                    d1: [number(line, f[3])?, number(line, f[4])?, number(line, f[5])?],
                    line,
                });
            }
            rucs.push(RucOverride { msm, line, cells });
        }

        Ok(Self { rucs })
    }

    /// Format as override file text.
    pub fn to_text(&self) -> String {
        let mut out = format!("{}\n", self.rucs.len());
        for ruc in &self.rucs {
            out.push_str(&format!("{},{}\n", ruc.msm, ruc.cells.len()));
            for c in &ruc.cells {
                out.push_str(&format!(
                    "{},{},{},{},{},{}\n",
                    c.ia, c.ib, c.ig, c.d1[0], c.d1[1], c.d1[2]
                ));
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.rucs.is_empty()
    }
}

// ============ Resolver ============

fn check(frame: &Frame, msm: i64, source: FrameSource, tolerance: f64, diagnostics: &mut Vec<Diagnostic>) {
    if !frame.is_orthogonal(tolerance) {
        Diagnostic::NotOrthogonal {
            msm,
            source,
            dots: frame.dots(),
        }
        .report(diagnostics);
    }
}

/// Assign a frame to every subvolume of every RUC.
///
/// `xang` is the top cell's rotation angle in degrees.
///
/// # Errors
/// `BadOverride` when an override names an unknown RUC or a cell outside
/// its grid.
pub fn resolve(
    rucs: &mut RucCollection<Actual>,
    overrides: Option<&OrientationOverrides>,
    xang: f64,
    tolerance: f64,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<()> {
    let handles: Vec<_> = rucs.handles().collect();

    for handle in handles {
        let ruc = rucs.get(handle);
        let mut frames = vec![Frame::GLOBAL; ruc.grid.len()];

        for id in ruc.grid.references() {
            let axes = if is_builtin(id) {
                catalog_axes(id, xang)
            } else {
                rucs.by_msm(id).and_then(|r| r.explicit_frame)
            };
            let Some(axes) = axes else { continue };

            let frame = Frame::from_axes(axes);
            check(&frame, ruc.msm, FrameSource::Material(id), tolerance, diagnostics);
            for (slot, value) in frames.iter_mut().zip(ruc.grid.cells()) {
                if *value == id {
                    *slot = frame;
                }
            }
        }

        rucs.get_mut(handle).orientation = frames;
    }

    let Some(overrides) = overrides else {
        return Ok(());
    };

    for entry in &overrides.rucs {
        let handle = rucs.handle(entry.msm).ok_or_else(|| {
            DeckError::bad_override(entry.line, format!("RUC {} is not defined in the deck", entry.msm))
        })?;
        let ruc = rucs.get_mut(handle);

        for cell in &entry.cells {
            let in_grid = cell.ia >= 1
                && cell.ib >= 1
                && cell.ig >= 1
                && ruc.grid.contains(cell.ia - 1, cell.ib - 1, cell.ig - 1);
            if !in_grid {
                return Err(DeckError::bad_override(
                    cell.line,
                    format!(
                        "cell ({},{},{}) is outside RUC {} ({}x{}x{})",
                        cell.ia,
                        cell.ib,
                        cell.ig,
                        entry.msm,
                        ruc.grid.na(),
                        ruc.grid.nb(),
                        ruc.grid.ng()
                    ),
                ));
            }

            let (frame, singular) = Frame::complete(cell.d1);
            let at = [cell.ia, cell.ib, cell.ig];
            if singular {
                Diagnostic::SingularVector { msm: entry.msm, cell: at }.report(diagnostics);
            }
            check(&frame, entry.msm, FrameSource::Override(at), tolerance, diagnostics);

            let idx = ruc.grid.index(cell.ia - 1, cell.ib - 1, cell.ig - 1);
            ruc.orientation[idx] = frame;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ruc::tests::planar_ruc;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_complete_canonical_x_axis() {
        let (frame, singular) = Frame::complete([1.0, 0.0, 0.0]);
        assert!(!singular);
        assert_eq!(frame.x1, [1.0, 0.0, 0.0]);
        assert_eq!(frame.x2, [0.0, 1.0, 0.0]);
        assert_eq!(frame.x3, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_complete_is_right_handed() {
        let (frame, singular) = Frame::complete([1.0, 2.0, -0.5]);
        assert!(!singular);
        assert!(frame.is_orthogonal(1e-12));
        let x3 = cross(&frame.x1, &frame.x2);
        for i in 0..3 {
            assert_abs_diff_eq!(x3[i], frame.x3[i], epsilon = 1e-12);
        }
        assert_abs_diff_eq!(frame.norms[0], (1.0f64 + 4.0 + 0.25).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_complete_singular_first_component() {
        let (frame, singular) = Frame::complete([0.0, 1.0, 0.0]);
        assert!(singular);
        assert!(frame.is_orthogonal(1e-6));
        assert_abs_diff_eq!(frame.x1[1], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(frame.x2[0], -1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(frame.x3[2], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_catalog_frames_are_orthogonal() {
        for id in -16..=-1 {
            let frame = Frame::from_axes(catalog_axes(id, 30.0).unwrap());
            assert!(frame.is_orthogonal(1e-12), "id {}", id);
        }
        assert!(catalog_axes(-17, 0.0).is_none());
        let tow = catalog_axes(-11, 0.0).unwrap();
        assert_eq!(tow[2], [0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_parse_and_format_overrides() {
        let text = "1\n0,2\n1,1,1,1.0,0.0,0.0\n2,1,1,0.5,0.5,0.0\n";
        let parsed = OrientationOverrides::parse(text).unwrap();
        assert_eq!(parsed.rucs.len(), 1);
        assert_eq!(parsed.rucs[0].cells[1].ia, 2);
        assert_eq!(parsed.rucs[0].cells[1].line, 4);
        let again = OrientationOverrides::parse(&parsed.to_text()).unwrap();
        assert_eq!(again.rucs[0].cells.len(), 2);
        assert_eq!(again.rucs[0].cells[1].d1, [0.5, 0.5, 0.0]);
    }

    #[test]
    fn test_parse_errors_carry_line() {
        let err = OrientationOverrides::parse("1\n0,1\n1,1,x,1.0,0.0,0.0").unwrap_err();
        assert!(matches!(err, DeckError::BadOverride { line: 3, .. }));
        assert!(OrientationOverrides::parse("2\n0,0\n").is_err());
    }

    #[test]
    fn test_parse_counts_larger_than_file() {
        let err = OrientationOverrides::parse("4611686018427387904\n0,1\n").unwrap_err();
        assert!(matches!(err, DeckError::BadOverride { .. }));
        let err = OrientationOverrides::parse("1\n0,4611686018427387904\n1,1,1,1.0,0.0,0.0\n").unwrap_err();
        assert!(matches!(err, DeckError::BadOverride { .. }));
    }

    #[test]
    fn test_resolve_assigns_catalog_and_overrides() {
        let mut rucs = RucCollection::new();
        rucs.insert(planar_ruc(0, 1, 3, &[-11, 1, 1]));
        let overrides = OrientationOverrides::parse("1\n0,1\n1,1,3,0.0,0.0,1.0\n").unwrap();
        let mut diagnostics = Vec::new();

        resolve(&mut rucs, Some(&overrides), 0.0, 1e-6, &mut diagnostics).unwrap();

        let top = rucs.top().unwrap();
        assert_eq!(top.orientation[0].x1, [0.0, 0.0, 1.0]);
        assert_eq!(top.orientation[1], Frame::GLOBAL);
        assert_abs_diff_eq!(top.orientation[2].x1[2], 1.0, epsilon = 1e-9);
        assert!(matches!(diagnostics[..], [Diagnostic::SingularVector { msm: 0, cell: [1, 1, 3] }]));
    }

    #[test]
    fn test_resolve_flags_skewed_explicit_frame() {
        let mut rucs = RucCollection::new();
        rucs.insert(planar_ruc(0, 1, 2, &[-17, 1]));
        let mut sub = planar_ruc(-17, 1, 1, &[1]);
        sub.explicit_frame = Some([[1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);
        rucs.insert(sub);
        let mut diagnostics = Vec::new();

        resolve(&mut rucs, None, 0.0, 1e-6, &mut diagnostics).unwrap();

        match &diagnostics[..] {
            [Diagnostic::NotOrthogonal { msm: 0, source: FrameSource::Material(-17), dots }] => {
                assert!(dots[0].abs() >= 1e-6);
            }
            other => panic!("unexpected diagnostics {:?}", other),
        }
    }

    #[test]
    fn test_resolve_rejects_unknown_ruc_and_cell() {
        let mut rucs = RucCollection::new();
        rucs.insert(planar_ruc(0, 1, 1, &[1]));
        let mut diagnostics = Vec::new();

        let unknown = OrientationOverrides::parse("1\n-40,0\n").unwrap();
        let err = resolve(&mut rucs, Some(&unknown), 0.0, 1e-6, &mut diagnostics).unwrap_err();
        assert!(matches!(err, DeckError::BadOverride { line: 2, .. }));

        let outside = OrientationOverrides::parse("1\n0,1\n1,2,1,1.0,0.0,0.0\n").unwrap();
        let err = resolve(&mut rucs, Some(&outside), 0.0, 1e-6, &mut diagnostics).unwrap_err();
        assert!(matches!(err, DeckError::BadOverride { line: 3, .. }));
    }
}
