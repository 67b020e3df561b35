//! Reader for the `*RUC` and `*RUC_LEGACY` blocks.
//!
//! ```text
//! *RUC
//!  NRUCS=2
//!  CROT=1
//!  MOD=102 ARCHID=1 VF=0.6 F=1 M=2 MSM=-20
//!  MOD=103 ARCHID=99 MSM=0
//!  NA=1 NB=2 NG=1
//!  D=1.0
//!  H=0.5,0.5
//!  L=1.0
//!  SM=-20,1
//!  D1=1.0,0.0,0.0
//!  D2=0.0,1.0,0.0
//!  D3=0.0,0.0,1.0
//! ```
//!
//! Every block that references built-in stacks or tows is followed by the
//! generated cells, numbered in the order they are produced.

use tracing::{debug, info};

use super::ast::{RucSection, RucSettings};
use super::lines::{LineCursor, LogicalLine};
use super::params::{ParamValue, ParameterBlock};
use crate::error::{DeckError, Result};
use crate::model::Diagnostic;
use crate::ruc::architecture::{generate, GeneratedCell, Phases, ShapeParams, VfClamp};
use crate::ruc::builtin::stacks_and_tows;
use crate::ruc::{Actual, Dimensionality, Grid, Layout, Method, Ruc, RucCollection};

const KW: &str = "*RUC";

/// Read the whole `*RUC` section.
///
/// A section announcing more blocks than it holds is read up to the next
/// keyword and reported as [`Diagnostic::MissingRucBlocks`].
pub fn read_ruc_section(
    cursor: &mut LineCursor,
    legacy: bool,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<RucSection> {
    let settings = read_settings(cursor, legacy)?;
    let mut rucs: RucCollection<Actual> = RucCollection::new();
    let mut ordinal = 0;

    for index in 0..settings.nrucs {
        if cursor.peek().map_or(true, LogicalLine::is_keyword) {
            Diagnostic::MissingRucBlocks {
                expected: settings.nrucs,
                found: index,
            }
            .report(diagnostics);
            break;
        }

        let (mut ruc, clamp) = read_block(cursor, legacy, index)?;
        ordinal += 1;
        ruc.deck_index = ordinal;
        report_clamp(&ruc, clamp, diagnostics);
        debug!(msm = ruc.msm, method = ?ruc.method, ordinal, "read RUC block");
        let handle = rucs.insert(ruc);

        let generated = stacks_and_tows(rucs.get(handle), &rucs).map_err(|e| e.in_context(KW, Some(index)))?;
        for (mut builtin, clamp) in generated {
            ordinal += 1;
            builtin.deck_index = ordinal;
            report_clamp(&builtin, clamp, diagnostics);
            debug!(msm = builtin.msm, ordinal, "generated built-in RUC");
            rucs.insert(builtin);
        }
    }

    info!(rucs = rucs.len(), crot = settings.crot, "read RUC section");
    Ok(RucSection { settings, rucs })
}

fn report_clamp(ruc: &Ruc, clamp: Option<VfClamp>, diagnostics: &mut Vec<Diagnostic>) {
    if let Some(clamp) = clamp {
        Diagnostic::VolumeFractionClamped {
            msm: ruc.msm,
            archid: ruc.archid.unwrap_or_default(),
            requested: clamp.requested,
            used: clamp.used,
        }
        .report(diagnostics);
    }
}

/// Optional `NRUCS=` and `CROT=` lines.
fn read_settings(cursor: &mut LineCursor, legacy: bool) -> Result<RucSettings> {
    let mut settings = RucSettings {
        nrucs: 1,
        crot: false,
        legacy,
    };

    for key in ["nrucs", "crot"] {
        if cursor.peek().map(LogicalLine::leading_key).as_deref() != Some(key) {
            continue;
        }
        let Some(line) = cursor.next_line() else { break };
        let block = ParameterBlock::parse(&line.text).map_err(|e| e.in_context(KW, None))?;
        if let Some(n) = block.int("nrucs").map_err(|e| e.in_context(KW, None))? {
            settings.nrucs = usize::try_from(n)
                .map_err(|_| DeckError::malformed(KW, format!("NRUCS must not be negative, found {}", n)))?;
        }
        if let Some(flag) = block.int("crot").map_err(|e| e.in_context(KW, None))? {
            settings.crot = flag == 1;
        }
    }

    Ok(settings)
}

fn required_line(cursor: &mut LineCursor, index: usize, what: &str) -> Result<LogicalLine> {
    cursor.next_unless_keyword().ok_or_else(|| {
        DeckError::malformed_record(KW, index, format!("expected {} at line {}", what, cursor.current_line()))
    })
}

/// Numbers after the `=` of a line such as `H=0.5,0.5`.
fn number_list(line: &LogicalLine, index: usize, what: &str, expected: usize) -> Result<Vec<f64>> {
    let values = line
        .after_eq_sign()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| {
            DeckError::malformed_record(KW, index, format!("{} is not a number list: '{}'", what, line.text))
        })?;
    if values.len() != expected {
        return Err(DeckError::malformed_record(
            KW,
            index,
            format!("{} needs {} values, found {}", what, expected, values.len()),
        ));
    }
    Ok(values)
}

fn material_row(line: &LogicalLine, index: usize, expected: usize) -> Result<Vec<i64>> {
    let values = number_list(line, index, "SM", expected)?;
    values
        .into_iter()
        .map(|v| {
            if v.fract() == 0.0 {
                Ok(v as i64)
            } else {
                Err(DeckError::malformed_record(
                    KW,
                    index,
                    format!("SM entries must be whole numbers, found {}", v),
                ))
            }
        })
        .collect()
}

/// Read one RUC block. The returned RUC has `deck_index` 0.
fn read_block(cursor: &mut LineCursor, legacy: bool, index: usize) -> Result<(Ruc, Option<VfClamp>)> {
    let ctx = |e: DeckError| e.in_context(KW, Some(index));

    let line = required_line(cursor, index, "a RUC block")?;
    let mut params = ParameterBlock::parse(&line.text).map_err(ctx)?;
    let code = params.require_int("mod").map_err(ctx)?;
    let method = if legacy {
        let method = Method::from_legacy_code(code).map_err(ctx)?;
        params.insert("mod", ParamValue::Int(method.code()));
        method
    } else {
        Method::from_code(code).map_err(ctx)?
    };
    let msm = params.int("msm").map_err(ctx)?.unwrap_or(0);

    let mut ruc = Ruc {
        msm,
        method,
        archid: None,
        grid: Grid::filled(1, 1, 1, Layout::Planar, 0),
        d: vec![1.0],
        h: vec![1.0],
        l: vec![1.0],
        params: ParameterBlock::new(),
        comments: line.comments,
        explicit_frame: None,
        orientation: Vec::new(),
        deck_index: 0,
        builtin: false,
    };

    if method.dimensionality() == Dimensionality::Mt {
        let fiber = params.require_int("f").map_err(ctx)?;
        let matrix = params.require_int("m").map_err(ctx)?;
        let vf = params.require_float("vf").map_err(ctx)?;
        let mut grid = Grid::filled(1, 2, 1, Layout::Volumetric, fiber);
        grid.set(0, 1, 0, matrix);
        ruc.grid = grid;
        ruc.h = vec![vf, 1.0 - vf];
        ruc.params = params;
        return Ok((ruc, None));
    }

    let archid = params.require_int("archid").map_err(ctx)?;
    ruc.archid = Some(archid);
    let mut clamp = None;

    if archid == 99 {
        read_explicit_grid(cursor, &mut ruc, index)?;
    } else {
        let cell = generate_from_params(&params, method.dimensionality(), archid).map_err(ctx)?;
        ruc.grid = cell.grid;
        ruc.d = cell.d;
        ruc.h = cell.h;
        ruc.l = cell.l;
        clamp = cell.clamp;
    }

    if cursor.peek().map(LogicalLine::leading_key).as_deref() == Some("d1") {
        let mut frame = [[0.0; 3]; 3];
        for (axis, name) in frame.iter_mut().zip(["D1", "D2", "D3"]) {
            let line = required_line(cursor, index, name)?;
            let values = number_list(&line, index, name, 3)?;
            axis.copy_from_slice(&values);
        }
        ruc.explicit_frame = Some(frame);
    }

    ruc.params = params;
    Ok((ruc, clamp))
}

fn generate_from_params(params: &ParameterBlock, dim: Dimensionality, archid: i64) -> Result<GeneratedCell> {
    let vf = match params.float("vf")? {
        Some(vf) => vf,
        None if archid == 0 => 0.0,
        None => return Err(DeckError::malformed(KW, "required field VF is missing")),
    };
    let matrix = params.require_int("m")?;
    let fiber = if archid == 0 {
        params.int("f")?.unwrap_or(matrix)
    } else {
        params.require_int("f")?
    };
    let nmsub = params.int("nmsub")?.unwrap_or(1);
    let shape = ShapeParams {
        r: params.float("r")?.unwrap_or(1.0),
        asp: params.float("asp")?.unwrap_or(1.0),
        nmsub: usize::try_from(nmsub).unwrap_or(0),
    };

    generate(archid, dim, vf, Phases { fiber, matrix }, &shape)
}

/// `ARCHID=99`: counts, spacings and material rows.
///
/// 2-D rows run from `b = nb` down to 1; 3-D rows run, for each `g`, from
/// `a = na` down to 1 with `nb` values each.
fn read_explicit_grid(cursor: &mut LineCursor, ruc: &mut Ruc, index: usize) -> Result<()> {
    let three_d = ruc.method.dimensionality() == Dimensionality::ThreeD;
    let line = required_line(cursor, index, "the NA/NB/NG line")?;
    let counts = ParameterBlock::parse(&line.text).map_err(|e| e.in_context(KW, Some(index)))?;
    let count = |key: &str| counts.require_count(key).map_err(|e| e.in_context(KW, Some(index)));

    let na = if three_d { count("na")? } else { 1 };
    let nb = count("nb")?;
    let ng = count("ng")?;
    if na == 0 || nb == 0 || ng == 0 {
        return Err(DeckError::malformed_record(
            KW,
            index,
            format!("grid counts must be positive, found {}x{}x{}", na, nb, ng),
        ));
    }
    if na.checked_mul(nb).and_then(|n| n.checked_mul(ng)).is_none() {
        return Err(DeckError::malformed_record(
            KW,
            index,
            format!("grid of {}x{}x{} cells is too large", na, nb, ng),
        ));
    }

    if three_d {
        let line = required_line(cursor, index, "D")?;
        ruc.d = number_list(&line, index, "D", na)?;
    }
    let line = required_line(cursor, index, "H")?;
    ruc.h = number_list(&line, index, "H", nb)?;
    let line = required_line(cursor, index, "L")?;
    ruc.l = number_list(&line, index, "L", ng)?;

    ruc.grid = if three_d {
        let mut grid = Grid::filled(na, nb, ng, Layout::Volumetric, 0);
        for ig in 0..ng {
            for ia in (0..na).rev() {
                let line = required_line(cursor, index, "an SM row")?;
                for (ib, value) in material_row(&line, index, nb)?.into_iter().enumerate() {
                    grid.set(ia, ib, ig, value);
                }
            }
        }
        grid
    } else {
        let mut grid = Grid::filled(1, nb, ng, Layout::Planar, 0);
        for ib in (0..nb).rev() {
            let line = required_line(cursor, index, "an SM row")?;
            for (ig, value) in material_row(&line, index, ng)?.into_iter().enumerate() {
                grid.set(0, ib, ig, value);
            }
        }
        grid
    };

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Record;
    use approx::assert_relative_eq;

    fn read(text: &str) -> (Result<RucSection>, Vec<Diagnostic>) {
        let mut cursor = LineCursor::new(text);
        let mut diagnostics = Vec::new();
        let section = read_ruc_section(&mut cursor, false, &mut diagnostics);
        (section, diagnostics)
    }

    #[test]
    fn test_explicit_2d_rows_run_top_down() {
        let text = "MOD=102 ARCHID=99\nNB=2 NG=3\nH=0.5,0.5\nL=0.2,0.3,0.5\nSM=1,1,2\nSM=2,1,1\n*MECH\n";
        let (section, diagnostics) = read(text);
        let section = section.unwrap();
        assert!(diagnostics.is_empty());

        let top = section.rucs.top().unwrap();
        assert_eq!(top.grid.get(0, 1, 2), 2);
        assert_eq!(top.grid.get(0, 0, 0), 2);
        assert_eq!(top.grid.get(0, 0, 2), 1);
        assert_eq!(top.l, vec![0.2, 0.3, 0.5]);
        assert_eq!(top.deck_index, 1);
    }

    #[test]
    fn test_explicit_3d_grid() {
        let text = "MOD=103 ARCHID=99\nNA=2 NB=1 NG=2\nD=0.5,0.5\nH=1.0\nL=0.5,0.5\nSM=1\nSM=2\nSM=3\nSM=4\n";
        let (section, _) = read(text);
        let top = section.unwrap().rucs.top().cloned().unwrap();
        // per g, a runs from na down to 1
        assert_eq!(top.grid.get(1, 0, 0), 1);
        assert_eq!(top.grid.get(0, 0, 0), 2);
        assert_eq!(top.grid.get(1, 0, 1), 3);
        assert_eq!(top.grid.get(0, 0, 1), 4);
        assert_eq!(top.d, vec![0.5, 0.5]);
    }

    #[test]
    fn test_row_length_checked() {
        let text = "MOD=102 ARCHID=99\nNB=1 NG=3\nH=1.0\nL=0.2,0.3,0.5\nSM=1,2\n";
        let (section, _) = read(text);
        assert!(matches!(section, Err(DeckError::MalformedInput { .. })));
    }

    #[test]
    fn test_mean_field_block() {
        let (section, _) = read("MOD=2 F=1 M=2 VF=0.6\n");
        let top = section.unwrap().rucs.top().cloned().unwrap();
        assert_eq!(top.grid.cells(), &[1, 2]);
        assert_relative_eq!(top.h[1], 0.4, epsilon = 1e-12);
        assert_eq!(top.dimensionality(), Dimensionality::Mt);
        assert_eq!(top.archid, None);
    }

    #[test]
    fn test_unsupported_method() {
        let (section, _) = read("NRUCS=2\nMOD=102 ARCHID=1 VF=0.5 F=1 M=2\nMOD=302 ARCHID=1 MSM=-17\n");
        let err = section.unwrap_err();
        assert!(matches!(err, DeckError::UnsupportedMethod { code: 302, record: Record(Some(1)) }));

        let mut cursor = LineCursor::new("MOD=7 ARCHID=1\n");
        let err = read_ruc_section(&mut cursor, true, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, DeckError::UnsupportedMethod { code: 7, record: Record(Some(0)) }));
    }

    #[test]
    fn test_settings_frame_and_builtins() {
        let text = "NRUCS=2\nCROT=1\n\
                    MOD=102 ARCHID=1 VF=0.5 F=1 M=2 MSM=-20\n\
                    D1=0.0,1.0,0.0\nD2=-1.0,0.0,0.0\nD3=0.0,0.0,1.0\n\
                    MOD=103 ARCHID=99 VFTOW=0.6 XANG=30.0\nNA=2 NB=1 NG=1\nD=0.5,0.5\nH=1.0\nL=1.0\nSM=-20\nSM=-1\n";
        let (section, diagnostics) = read(text);
        let section = section.unwrap();
        assert!(diagnostics.is_empty());
        assert_eq!(section.settings.nrucs, 2);
        assert!(section.settings.crot);

        let user = section.rucs.by_msm(-20).unwrap();
        assert_eq!(user.explicit_frame.unwrap()[1], [-1.0, 0.0, 0.0]);

        let order: Vec<(i64, usize)> = section.rucs.iter().map(|(_, r)| (r.msm, r.deck_index)).collect();
        assert_eq!(order, vec![(-20, 1), (0, 2), (-1, 3), (-11, 4), (-12, 5)]);
        assert!(section.rucs.by_msm(-11).unwrap().builtin);
    }

    #[test]
    fn test_clamp_and_missing_blocks() {
        let (section, diagnostics) = read("NRUCS=3\nMOD=102 ARCHID=2 VF=0.9 F=1 M=2\n*MECH\n");
        assert_eq!(section.unwrap().rucs.len(), 1);
        assert!(matches!(
            diagnostics[..],
            [
                Diagnostic::VolumeFractionClamped { msm: 0, archid: 2, .. },
                Diagnostic::MissingRucBlocks { expected: 3, found: 1 },
            ]
        ));
    }

    #[test]
    fn test_legacy_codes() {
        let mut cursor = LineCursor::new("MOD=2 ARCHID=1 VF=0.5 F=1 M=2\n");
        let section = read_ruc_section(&mut cursor, true, &mut Vec::new()).unwrap();
        let top = section.rucs.top().unwrap();
        assert_eq!(top.method, Method::Gmc2d);
        assert_eq!(top.params.int("mod").unwrap(), Some(102));
    }
}
