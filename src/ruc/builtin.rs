//! Built-in laminate stacks and fiber tows.
//!
//! A grid may reference ids −1..−16 without defining them. Ids −1..−10 are
//! four-layer GMC3D stacks through the thickness, ids −11..−16 are GMC2D
//! tows built from the referencing cell's `ARCHTOW`, `VFTOW`, `FTOW`,
//! `MTOW` and `RITOW` parameters. Stacks pull in the tows they reference.

use std::collections::BTreeSet;
use std::ops::RangeInclusive;

use super::architecture::{generate, Phases, ShapeParams, VfClamp};
use super::{Actual, Dimensionality, Grid, Layout, Method, Ruc, RucCollection};
use crate::deck::params::{ParamValue, ParameterBlock};
use crate::error::{DeckError, Result};

/// Ids of the built-in stacks.
pub const STACK_IDS: RangeInclusive<i64> = -10..=-1;

/// Ids of the built-in tows.
pub const TOW_IDS: RangeInclusive<i64> = -16..=-11;

/// Check whether an id names a built-in stack or tow.
pub fn is_builtin(id: i64) -> bool {
    STACK_IDS.contains(&id) || TOW_IDS.contains(&id)
}

/// Tow parameters read from the referencing cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TowSettings {
    pub archtow: i64,
    pub vftow: Option<f64>,
    pub ftow: i64,
    pub mtow: i64,
    pub ritow: f64,
}

impl TowSettings {
    pub fn from_params(params: &ParameterBlock) -> Result<Self> {
        Ok(Self {
            archtow: params.int("archtow")?.unwrap_or(1),
            vftow: params.float("vftow")?,
            ftow: params.int("ftow")?.unwrap_or(1),
            mtow: params.int("mtow")?.unwrap_or(2),
            ritow: params.float("ritow")?.unwrap_or(0.0),
        })
    }
}

/// Layer pattern of a stack, bottom to top.
fn stack_layers(msm: i64, mtow: i64) -> Option<[i64; 4]> {
    let m = mtow;
    let layers = match msm {
        -1 => [-11, -11, -12, -12],
        -2 => [m, -13, -13, m],
        -3 => [m, -14, -14, m],
        -4 => [m, -15, -15, m],
        -5 => [m, -16, -16, m],
        -6 => [m, m, -11, -11],
        -7 => [-12, -12, m, m],
        -8 => [-11, -11, m, m],
        -9 => [m, m, -12, -12],
        -10 => [-12, -12, -11, -11],
        _ => return None,
    };
    Some(layers)
}

fn builtin_params(method: Method, archid: i64, msm: i64) -> ParameterBlock {
    ParameterBlock::with_defaults(&[
        ("mod", ParamValue::Int(method.code())),
        ("archid", ParamValue::Int(archid)),
        ("msm", ParamValue::Int(msm)),
    ])
}

fn stack(msm: i64, layers: [i64; 4], thickness: f64) -> Ruc {
    let mut grid = Grid::filled(4, 1, 1, Layout::Volumetric, 0);
    for (ia, id) in layers.iter().enumerate() {
        grid.set(ia, 0, 0, *id);
    }
    Ruc {
        msm,
        method: Method::Gmc3d,
        archid: Some(99),
        grid,
        d: vec![thickness / 4.0; 4],
        h: vec![1.0],
        l: vec![1.0],
        params: builtin_params(Method::Gmc3d, 99, msm),
        comments: Vec::new(),
        explicit_frame: None,
        orientation: Vec::new(),
        deck_index: 0,
        builtin: true,
    }
}

fn tow(msm: i64, settings: &TowSettings, vftow: f64) -> Result<(Ruc, Option<VfClamp>)> {
    let shape = ShapeParams {
        r: if settings.ritow > 0.0 { settings.ritow } else { 1.0 },
        ..ShapeParams::default()
    };
    let phases = Phases {
        fiber: settings.ftow,
        matrix: settings.mtow,
    };
    let cell = generate(settings.archtow, Dimensionality::TwoD, vftow, phases, &shape)?;

    let mut params = builtin_params(Method::Gmc2d, settings.archtow, msm);
    params.insert("vf", ParamValue::Float(vftow));

    let ruc = Ruc {
        msm,
        method: Method::Gmc2d,
        archid: Some(settings.archtow),
        grid: cell.grid,
        d: cell.d,
        h: cell.h,
        l: cell.l,
        params,
        comments: Vec::new(),
        explicit_frame: None,
        orientation: Vec::new(),
        deck_index: 0,
        builtin: true,
    };
    Ok((ruc, cell.clamp))
}

/// Generate the stacks and tows `parent` references that `existing` lacks.
///
/// Stacks come first in ascending id order, then tows in descending order.
/// `deck_index` is left at 0 for the caller to assign.
pub fn stacks_and_tows(
    parent: &Ruc,
    existing: &RucCollection<Actual>,
) -> Result<Vec<(Ruc, Option<VfClamp>)>> {
    let referenced = parent.grid.distinct();
    if !referenced.iter().any(|id| is_builtin(*id)) {
        return Ok(Vec::new());
    }

    let settings = TowSettings::from_params(&parent.params)?;
    let thickness = parent.d.first().copied().unwrap_or(1.0);

    let mut out = Vec::new();
    let mut tows: BTreeSet<i64> = referenced.iter().copied().filter(|id| TOW_IDS.contains(id)).collect();

    for msm in referenced.iter().copied().filter(|id| STACK_IDS.contains(id)) {
        let Some(layers) = stack_layers(msm, settings.mtow) else {
            continue;
        };
        tows.extend(layers.iter().copied().filter(|id| TOW_IDS.contains(id)));
        if !existing.contains(msm) {
            out.push((stack(msm, layers, thickness), None));
        }
    }

    for msm in tows.into_iter().rev() {
        if existing.contains(msm) {
            continue;
        }
        let vftow = settings.vftow.ok_or_else(|| {
            DeckError::malformed(
                "*RUC",
                format!("VFTOW is required to generate tow {} for RUC {}", msm, parent.msm),
            )
        })?;
        out.push(tow(msm, &settings, vftow)?);
    }

    Ok(out)
}
