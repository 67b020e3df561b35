//! Built-in unit-cell architectures.
//!
//! | ARCHID | 2-D                              | 3-D                          |
//! |--------|----------------------------------|------------------------------|
//! | 0      | 1×1 matrix placeholder           | 1×1×1 matrix placeholder     |
//! | 1      | 2×2 square packing               | 2×2×2, cubic spacing         |
//! | 2      | 4×4 hexagonal packing            | -                            |
//! | 6      | 7×7 approximate circular fiber   | -                            |
//! | 13     | (26+2k)² weave cross-section     | 2×(26+2k)² weave             |
//!
//! Every generated grid holds only the two supplied phase ids. A volume
//! fraction above an architecture's packing limit is clamped and reported
//! through [`GeneratedCell::clamp`].

use super::{Dimensionality, Grid, Layout};
use crate::error::{DeckError, Result};

/// ARCHID 2: regime boundary between the sparse and dense hexagonal layouts.
pub const HEX_REGIME_THRESHOLD: f64 = 0.288675;

/// ARCHID 2: packing limit.
const HEX_MAX_VF: f64 = 0.86602;

/// ARCHID 6: packing limit for a square cell.
const CIRCULAR_MAX_VF: f64 = 52.0 / 64.0;

/// ARCHID 6: flattened positions (`ng * ib + ig + 1`) occupied by fiber.
const CIRCULAR_FIBER_CELLS: [usize; 13] = [11, 17, 18, 19, 23, 24, 25, 26, 27, 31, 32, 33, 39];

/// ARCHID 13: packing limit for a square cell.
const WEAVE_MAX_VF: f64 = 0.80613;

/// ARCHID 13: fiber cross-section area in stencil units.
const WEAVE_AREA: f64 = 3838.0;

/// ARCHID 13: boundary offsets from the cell edge towards the center.
const WEAVE_STENCIL: [f64; 12] = [2.0, 3.0, 4.0, 3.0, 4.0, 5.0, 5.0, 4.0, 6.0, 9.0, 7.0, 17.0];

/// Fiber and matrix ids placed into a generated grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Phases {
    pub fiber: i64,
    pub matrix: i64,
}

/// Optional shape parameters of a built-in architecture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeParams {
    /// Cell aspect ratio `R` (ARCHID 6 and 13)
    pub r: f64,
    /// Fiber aspect ratio `ASP` (3-D ARCHID 1)
    pub asp: f64,
    /// Subdivision count `NMSUB` (ARCHID 13)
    pub nmsub: usize,
}

impl Default for ShapeParams {
    fn default() -> Self {
        Self {
            r: 1.0,
            asp: 1.0,
            nmsub: 1,
        }
    }
}

/// A volume fraction that exceeded the packing limit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VfClamp {
    pub requested: f64,
    pub used: f64,
}

/// Output of [`generate`].
#[derive(Debug, Clone)]
pub struct GeneratedCell {
    pub grid: Grid,
    pub d: Vec<f64>,
    pub h: Vec<f64>,
    pub l: Vec<f64>,
    pub clamp: Option<VfClamp>,
}

/// Generate a built-in unit cell.
///
/// # Errors
/// `UnknownArchitecture` for an id the dimensionality does not provide,
/// `MalformedInput` for a non-positive volume fraction or shape parameter.
pub fn generate(
    archid: i64,
    dim: Dimensionality,
    vf: f64,
    phases: Phases,
    shape: &ShapeParams,
) -> Result<GeneratedCell> {
    if archid != 0 && !(vf.is_finite() && vf > 0.0) {
        return Err(DeckError::malformed("*RUC", format!("VF must be positive, found {}", vf)));
    }
    if !(shape.r > 0.0 && shape.asp > 0.0 && (1..=MAX_NMSUB).contains(&shape.nmsub)) {
        return Err(DeckError::malformed(
            "*RUC",
            format!(
                "R and ASP must be positive and NMSUB between 1 and {}, found R={} ASP={} NMSUB={}",
                MAX_NMSUB, shape.r, shape.asp, shape.nmsub
            ),
        ));
    }

    match (dim, archid) {
        (Dimensionality::TwoD, 0) | (Dimensionality::ThreeD, 0) => Ok(placeholder(dim, phases)),
        (Dimensionality::TwoD, 1) => square(vf, phases),
        (Dimensionality::ThreeD, 1) => cubic(vf, phases, shape.asp),
        (Dimensionality::TwoD, 2) => Ok(hexagonal(vf, phases)),
        (Dimensionality::TwoD, 6) => Ok(circular(vf, phases, shape.r)),
        (Dimensionality::TwoD, 13) | (Dimensionality::ThreeD, 13) => {
            Ok(weave(dim, vf, phases, shape.r, shape.nmsub))
        }
        _ => Err(DeckError::unknown_architecture(archid, format!("{} cells", dim))),
    }
}

fn clamp_vf(vf: f64, max: f64) -> (f64, Option<VfClamp>) {
    if vf > max {
        (max, Some(VfClamp { requested: vf, used: max }))
    } else {
        (vf, None)
    }
}

fn planar_grid(nb: usize, ng: usize, phases: Phases, is_fiber: impl Fn(usize, usize) -> bool) -> Grid {
    let mut grid = Grid::filled(1, nb, ng, Layout::Planar, phases.matrix);
    for ib in 0..nb {
        for ig in 0..ng {
            if is_fiber(ib, ig) {
                grid.set(0, ib, ig, phases.fiber);
            }
        }
    }
    grid
}

// ============ ARCHID 0 ============

fn placeholder(dim: Dimensionality, phases: Phases) -> GeneratedCell {
    let layout = if dim == Dimensionality::ThreeD {
        Layout::Volumetric
    } else {
        Layout::Planar
    };
    GeneratedCell {
        grid: Grid::filled(1, 1, 1, layout, phases.matrix),
        d: vec![1.0],
        h: vec![1.0],
        l: vec![1.0],
        clamp: None,
    }
}

// ============ ARCHID 1 ============

fn square(vf: f64, phases: Phases) -> Result<GeneratedCell> {
    if vf > 1.0 {
        return Err(DeckError::malformed("*RUC", format!("VF={} exceeds 1 for ARCHID=1", vf)));
    }
    let side = vf.sqrt();
    Ok(GeneratedCell {
        grid: planar_grid(2, 2, phases, |ib, ig| ib == 0 && ig == 0),
        d: vec![1.0],
        h: vec![side, 1.0 - side],
        l: vec![side, 1.0 - side],
        clamp: None,
    })
}

/// Unique positive real root of `t³ + p·t + q = 0` for `q < 0`.
fn depressed_cubic_root(p: f64, q: f64) -> f64 {
    let disc = (q / 2.0).powi(2) + (p / 3.0).powi(3);
    if disc >= 0.0 {
        let s = disc.sqrt();
        (-q / 2.0 + s).cbrt() + (-q / 2.0 - s).cbrt()
    } else {
        // three real roots; the largest is the positive one
        let m = 2.0 * (-p / 3.0).sqrt();
        let arg = (3.0 * q / (p * m)).clamp(-1.0, 1.0);
        m * (arg.acos() / 3.0).cos()
    }
}

fn cubic(vf: f64, phases: Phases, asp: f64) -> Result<GeneratedCell> {
    if vf > 1.0 {
        return Err(DeckError::malformed("*RUC", format!("VF={} exceeds 1 for ARCHID=1", vf)));
    }
    let t = depressed_cubic_root(-vf * (asp - 1.0) / asp, -vf / asp);

    let mut grid = Grid::filled(2, 2, 2, Layout::Volumetric, phases.matrix);
    grid.set(0, 0, 0, phases.fiber);

    Ok(GeneratedCell {
        grid,
        d: vec![asp * t, 1.0 - t],
        h: vec![t, 1.0 - t],
        l: vec![t, 1.0 - t],
        clamp: None,
    })
}

// ============ ARCHID 2 ============

fn hexagonal(vf: f64, phases: Phases) -> GeneratedCell {
    let (vf, clamp) = clamp_vf(vf, HEX_MAX_VF);

    let xa = (3f64.sqrt() * vf / 2.0).sqrt();
    let xb = (1.0 - xa) / 2.0;
    let xc = 0.75f64.sqrt() - xa;

    let (h, fiber_cells): (Vec<f64>, &[usize]) = if vf < HEX_REGIME_THRESHOLD {
        (vec![xb - xa / 2.0, xa, xb - xa / 2.0, xa], &[5, 15])
    } else {
        (
            vec![2.0 * xb, xa / 2.0 - xb, 2.0 * xb, xa / 2.0 - xb],
            &[3, 5, 7, 9, 13, 15],
        )
    };

    GeneratedCell {
        grid: planar_grid(4, 4, phases, |ib, ig| fiber_cells.contains(&(4 * ib + ig + 1))),
        d: vec![1.0],
        h,
        l: vec![xa, xc, xa, xc],
        clamp,
    }
}

// ============ ARCHID 6 ============

fn circular(vf: f64, phases: Phases, r: f64) -> GeneratedCell {
    let limit = if r > 1.0 {
        CIRCULAR_MAX_VF / r
    } else if r < 1.0 {
        CIRCULAR_MAX_VF * r
    } else {
        CIRCULAR_MAX_VF
    };
    let (vf, clamp) = clamp_vf(vf, limit);

    let radius = (vf / std::f64::consts::PI).sqrt();
    let unit = std::f64::consts::PI.sqrt() * radius / 52f64.sqrt();

    // half of the central run plus the two shoulder runs
    let rad = 4.0 * unit / 2.0 + unit + unit;
    let xb = (radius / 2.0) * (std::f64::consts::PI * r / vf).sqrt();
    let xc = xb / r;

    let h = vec![xc - rad, unit, unit, 4.0 * unit, unit, unit, xc - rad];
    let l = vec![xb - rad, unit, unit, 4.0 * unit, unit, unit, xb - rad];

    GeneratedCell {
        grid: planar_grid(7, 7, phases, |ib, ig| CIRCULAR_FIBER_CELLS.contains(&(7 * ib + ig + 1))),
        d: vec![1.0],
        h,
        l,
        clamp,
    }
}

// ============ ARCHID 13 ============

/// Largest matrix run accepted for the weave.
pub const MAX_NMSUB: usize = 1000;

/// Number of subvolumes along each in-plane axis of the weave.
pub fn weave_size(nmsub: usize) -> usize {
    26 + 2 * (nmsub - 1)
}

fn weave_is_fiber(ib: usize, ig: usize, nmsub: usize) -> bool {
    let shift = nmsub as i64 - 1;
    let b = ib as i64 + 1 - shift;
    let g = ig as i64 + 1 - shift;
    let j = match b {
        2..=13 => b - 2,
        14..=25 => 25 - b,
        _ => return false,
    };
    (13 - j..=14 + j).contains(&g)
}

fn weave_axis(run: f64, nmsub: usize) -> Vec<f64> {
    let mut axis = vec![run; nmsub];
    axis.extend_from_slice(&WEAVE_STENCIL);
    axis.extend(WEAVE_STENCIL.iter().rev());
    axis.extend(std::iter::repeat(run).take(nmsub));
    axis
}

fn weave(dim: Dimensionality, vf: f64, phases: Phases, r: f64, nmsub: usize) -> GeneratedCell {
    let limit = if r >= 1.0 { WEAVE_MAX_VF / r } else { WEAVE_MAX_VF * r };
    let (vf, clamp) = clamp_vf(vf, limit);

    let stencil: f64 = WEAVE_STENCIL.iter().sum();
    let h_total = (WEAVE_AREA / (vf * r)).sqrt() - stencil;
    let l_total = r * (stencil + h_total) - stencil;

    let n = weave_size(nmsub);
    let (na, layout, d) = match dim {
        Dimensionality::ThreeD => (2, Layout::Volumetric, vec![0.5, 0.5]),
        _ => (1, Layout::Planar, vec![1.0]),
    };

    let mut grid = Grid::filled(na, n, n, layout, phases.matrix);
    for ia in 0..na {
        for ib in 0..n {
            for ig in 0..n {
                if weave_is_fiber(ib, ig, nmsub) {
                    grid.set(ia, ib, ig, phases.fiber);
                }
            }
        }
    }

    GeneratedCell {
        grid,
        d,
        h: weave_axis(h_total / nmsub as f64, nmsub),
        l: weave_axis(l_total / nmsub as f64, nmsub),
        clamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const PHASES: Phases = Phases { fiber: 1, matrix: 2 };

    fn only_phases(cell: &GeneratedCell) -> bool {
        cell.grid.cells().iter().all(|v| *v == PHASES.fiber || *v == PHASES.matrix)
    }

    #[test]
    fn test_cubic_equal_spacings() {
        let cell = generate(1, Dimensionality::ThreeD, 0.125, PHASES, &ShapeParams::default()).unwrap();
        assert_relative_eq!(cell.h[0], 0.5, epsilon = 1e-12);
        assert_relative_eq!(cell.h[1], 0.5, epsilon = 1e-12);
        assert_eq!(cell.h, cell.l);
        assert_eq!(cell.grid.get(0, 0, 0), 1);
        assert_eq!(cell.grid.count(2), 7);
    }

    #[test]
    fn test_cubic_root_satisfies_equation() {
        let (vf, asp) = (0.5, 3.0);
        let cell = generate(1, Dimensionality::ThreeD, vf, PHASES, &ShapeParams { asp, ..Default::default() }).unwrap();
        let t = cell.h[0];
        assert_relative_eq!(t.powi(3) - vf * (asp - 1.0) / asp * t - vf / asp, 0.0, epsilon = 1e-12);
        assert_relative_eq!(cell.d[0], asp * t);
        // fiber block volume over the cell volume
        let volume: f64 = cell.d.iter().sum();
        assert_relative_eq!(cell.d[0] * t * t / volume, vf, epsilon = 1e-12);
    }

    #[test]
    fn test_depressed_cubic_three_real_roots() {
        // (t - 2)(t + 1)(t + 1) = t^3 - 3t - 2
        assert_relative_eq!(depressed_cubic_root(-3.0, -2.0), 2.0, epsilon = 1e-9);
        // (t - 3)(t + 1)(t + 2) = t^3 - 7t - 6
        assert_relative_eq!(depressed_cubic_root(-7.0, -6.0), 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_square_packing() {
        let cell = generate(1, Dimensionality::TwoD, 0.49, PHASES, &ShapeParams::default()).unwrap();
        assert_relative_eq!(cell.h[0], 0.7, epsilon = 1e-12);
        assert_relative_eq!(cell.l[1], 0.3, epsilon = 1e-12);
        assert_eq!(cell.grid.cells(), &[1, 2, 2, 2]);
    }

    #[test]
    fn test_hexagonal_regimes() {
        let sparse = generate(2, Dimensionality::TwoD, 0.2, PHASES, &ShapeParams::default()).unwrap();
        assert_eq!(sparse.grid.count(1), 2);
        assert_eq!(sparse.grid.get(0, 1, 0), 1);
        assert_eq!(sparse.grid.get(0, 3, 2), 1);

        let dense = generate(2, Dimensionality::TwoD, 0.6, PHASES, &ShapeParams::default()).unwrap();
        assert_eq!(dense.grid.count(1), 6);
        assert!(dense.clamp.is_none());
    }

    #[test]
    fn test_hexagonal_clamps() {
        let cell = generate(2, Dimensionality::TwoD, 0.95, PHASES, &ShapeParams::default()).unwrap();
        let clamp = cell.clamp.unwrap();
        assert_relative_eq!(clamp.requested, 0.95);
        assert_relative_eq!(clamp.used, HEX_MAX_VF);
    }

    #[test]
    fn test_circular_fiber() {
        let cell = generate(6, Dimensionality::TwoD, 0.5, PHASES, &ShapeParams::default()).unwrap();
        assert_eq!(cell.grid.count(1), 13);
        assert_eq!(cell.h.len(), 7);
        assert_relative_eq!(cell.h.iter().sum::<f64>(), cell.l.iter().sum::<f64>(), epsilon = 1e-12);

        let wide = generate(6, Dimensionality::TwoD, 0.9, PHASES, &ShapeParams { r: 2.0, ..Default::default() }).unwrap();
        assert_relative_eq!(wide.clamp.unwrap().used, CIRCULAR_MAX_VF / 2.0);
    }

    #[test]
    fn test_weave_shape() {
        let shape = ShapeParams { r: 1.5, nmsub: 2, ..Default::default() };
        let cell = generate(13, Dimensionality::TwoD, 0.4, PHASES, &shape).unwrap();
        assert_eq!(weave_size(2), 28);
        assert_eq!(cell.h.len(), 28);
        assert_eq!(cell.grid.nb(), 28);
        assert!(only_phases(&cell));
        let sum_h: f64 = cell.h.iter().sum();
        let sum_l: f64 = cell.l.iter().sum();
        assert_relative_eq!(sum_l, 1.5 * sum_h, epsilon = 1e-9);
        // symmetric about the center
        assert_eq!(cell.h[0], cell.h[27]);
        assert_eq!(cell.h[13], 17.0);
        assert_eq!(cell.h[14], 17.0);
    }

    #[test]
    fn test_weave_fiber_rows() {
        // first fiber row (1-based 2) covers columns 13..=14
        assert!(weave_is_fiber(1, 12, 1));
        assert!(weave_is_fiber(1, 13, 1));
        assert!(!weave_is_fiber(1, 11, 1));
        // center rows span 2..=25
        assert!(weave_is_fiber(12, 1, 1));
        assert!(weave_is_fiber(13, 24, 1));
        assert!(!weave_is_fiber(0, 13, 1));
        assert!(!weave_is_fiber(25, 13, 1));
    }

    #[test]
    fn test_weave_3d_layers_match() {
        let cell = generate(13, Dimensionality::ThreeD, 0.3, PHASES, &ShapeParams::default()).unwrap();
        assert_eq!(cell.grid.na(), 2);
        assert_eq!(cell.d, vec![0.5, 0.5]);
        for ib in 0..26 {
            for ig in 0..26 {
                assert_eq!(cell.grid.get(0, ib, ig), cell.grid.get(1, ib, ig));
            }
        }
    }

    #[test]
    fn test_weave_at_limit_has_zero_runs() {
        let cell = generate(13, Dimensionality::TwoD, 0.9, PHASES, &ShapeParams::default()).unwrap();
        assert!(cell.clamp.is_some());
        assert_relative_eq!(cell.h[0], 0.0, epsilon = 1e-3);
    }

    #[test]
    fn test_unknown_architecture() {
        let err = generate(6, Dimensionality::ThreeD, 0.5, PHASES, &ShapeParams::default()).unwrap_err();
        assert!(matches!(err, DeckError::UnknownArchitecture { archid: 6, .. }));
        assert!(generate(1, Dimensionality::Mt, 0.5, PHASES, &ShapeParams::default()).is_err());
        assert!(generate(1, Dimensionality::TwoD, 0.0, PHASES, &ShapeParams::default()).is_err());
    }

    #[test]
    fn test_weave_rejects_oversized_nmsub() {
        let shape = ShapeParams { nmsub: usize::MAX, ..Default::default() };
        let err = generate(13, Dimensionality::TwoD, 0.4, PHASES, &shape).unwrap_err();
        assert!(matches!(err, DeckError::MalformedInput { .. }));
        let shape = ShapeParams { nmsub: MAX_NMSUB, ..Default::default() };
        assert_eq!(weave_size(shape.nmsub), 2024);
    }
}
