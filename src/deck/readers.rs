//! Readers for the non-RUC keyword blocks.
//!
//! Each reader is entered with the cursor just past its keyword marker and
//! returns with the cursor on the next unconsumed line. Optional lines are
//! read speculatively: the cursor position is saved, a line is read, and
//! the cursor is rewound if the line turns out to start another keyword.

use tracing::debug;

use super::ast::{
    leg_count, Constituents, FailureCriterion, FailureMaterial, FailureSubcell, Mech, Pdfa,
    PdfaMaterial, PlotGroup, Record, XyPlot, FAILURE_TABLE_COLUMNS,
};
use super::lines::{LineCursor, LogicalLine};
use super::params::{ParamValue, ParameterBlock};
use crate::error::{DeckError, Result};

/// Decode a line over `seed`, labelling errors with the keyword and record.
fn decode_into(line: &LogicalLine, seed: ParameterBlock, kw: &str, record: Option<usize>) -> Result<ParameterBlock> {
    let mut block = seed;
    block.merge(ParameterBlock::parse(&line.text).map_err(|e| e.in_context(kw, record))?);
    Ok(block)
}

/// Read a line that must be present.
fn required_line(cursor: &mut LineCursor, kw: &str, record: Option<usize>, what: &str) -> Result<LogicalLine> {
    cursor.next_unless_keyword().ok_or_else(|| {
        let message = format!("expected {} at line {}", what, cursor.current_line());
        match record {
            Some(i) => DeckError::malformed_record(kw, i, message),
            None => DeckError::malformed(kw, message),
        }
    })
}

/// Read one optional line over `defaults`.
///
/// Returns the defaults unchanged when the next line starts a keyword.
pub fn read_optional_line(cursor: &mut LineCursor, kw: &str, defaults: ParameterBlock) -> Result<ParameterBlock> {
    match cursor.next_unless_keyword() {
        Some(line) => decode_into(&line, defaults, kw, None),
        None => Ok(defaults),
    }
}

/// Replace a scalar value with a one-element list.
fn listify(block: &mut ParameterBlock, key: &str) {
    match block.get(key) {
        Some(ParamValue::Int(v)) => {
            let v = *v;
            block.insert(key, ParamValue::IntList(vec![v]));
        }
        Some(ParamValue::Float(v)) => {
            let v = *v;
            block.insert(key, ParamValue::FloatList(vec![v]));
        }
        _ => {}
    }
}

/// Replace a list value with its first element.
fn first_of(block: &mut ParameterBlock, key: &str) {
    let first = match block.get(key) {
        Some(ParamValue::FloatList(v)) => v.first().copied().map(ParamValue::Float),
        Some(ParamValue::IntList(v)) => v.first().copied().map(ParamValue::Int),
        _ => None,
    };
    if let Some(value) = first {
        block.insert(key, value);
    }
}

/// `*CONSTITUENTS`: `NMATS=n` then n material records.
///
/// Lines following a record are merged into it until a keyword or a line
/// beginning with `M` (the next material).
pub fn read_constituents(cursor: &mut LineCursor) -> Result<Constituents> {
    const KW: &str = "*CONSTITUENTS";

    let line = required_line(cursor, KW, None, "NMATS")?;
    let header = decode_into(&line, ParameterBlock::new(), KW, None)?;
    let nmats = header.require_count("nmats").map_err(|e| e.in_context(KW, None))?;

    let mut materials = Vec::new();
    for i in 0..nmats {
        let line = required_line(cursor, KW, Some(i), "a material record")?;
        let mut params = decode_into(&line, ParameterBlock::new(), KW, Some(i))?;

        loop {
            let mark = cursor.mark();
            match cursor.next_line() {
                Some(more) if !more.is_keyword() && !more.text.to_ascii_uppercase().starts_with('M') => {
                    params = decode_into(&more, params, KW, Some(i))?;
                }
                _ => {
                    cursor.rewind(mark);
                    break;
                }
            }
        }

        materials.push(Record {
            params,
            comments: line.comments,
        });
    }

    Ok(Constituents { header, materials })
}

/// `*MECH` and `*MULTIPHYSICS`: a header with `LOP`, then the loading legs.
pub fn read_mech(cursor: &mut LineCursor, kw: &str) -> Result<Mech> {
    let line = required_line(cursor, kw, None, "LOP")?;
    let header = Record {
        params: decode_into(&line, ParameterBlock::new(), kw, None)?,
        comments: line.comments,
    };
    let lop = header.params.require_int("lop").map_err(|e| e.in_context(kw, None))?;
    let legs_expected = leg_count(lop);
    debug!(lop, legs = legs_expected, "reading loading legs");

    let mut legs = Vec::new();
    for i in 0..legs_expected {
        let line = required_line(cursor, kw, Some(i), "a loading leg")?;
        let mut params = decode_into(&line, ParameterBlock::new(), kw, Some(i))?;
        match params.get("mode") {
            Some(ParamValue::Int(_)) => listify(&mut params, "mode"),
            Some(ParamValue::IntList(_)) => {}
            Some(other) => {
                return Err(DeckError::malformed_record(
                    kw,
                    i,
                    format!("MODE must be an integer list, found {} '{}'", other.kind(), other),
                ))
            }
            None => return Err(DeckError::malformed_record(kw, i, "required field MODE is missing")),
        }
        legs.push(Record {
            params,
            comments: line.comments,
        });
    }

    Ok(Mech { header, legs })
}

/// `*THERM`: one optional line.
pub fn read_therm(cursor: &mut LineCursor) -> Result<ParameterBlock> {
    read_optional_line(cursor, "*THERM", ParameterBlock::new())
}

/// `*SOLVER`: defaults, an optional line, and an optional step line.
pub fn read_solver(cursor: &mut LineCursor) -> Result<ParameterBlock> {
    const KW: &str = "*SOLVER";
    let defaults = ParameterBlock::with_defaults(&[
        ("method", ParamValue::Int(1)),
        ("opt", ParamValue::Int(0)),
        ("itmax", ParamValue::Int(1)),
        ("err", ParamValue::Float(0.001)),
        ("nleg", ParamValue::Int(0)),
        ("ninteg", ParamValue::Int(1)),
    ]);

    let mut solver = read_optional_line(cursor, KW, defaults)?;
    if let Some(line) = cursor.next_unless_keyword() {
        solver = decode_into(&line, solver, KW, Some(0))?;
        listify(&mut solver, "stp");
        first_of(&mut solver, "err");
    }
    Ok(solver)
}

/// `*FAILURE_SUBCELL`: `NMAT` materials, each with `NCRIT` criteria.
pub fn read_failure_subcell(cursor: &mut LineCursor) -> Result<FailureSubcell> {
    const KW: &str = "*FAILURE_SUBCELL";

    let line = required_line(cursor, KW, None, "NMAT")?;
    let header = decode_into(&line, ParameterBlock::new(), KW, None)?;
    let nmat = header.require_count("nmat").map_err(|e| e.in_context(KW, None))?;

    let mut materials = Vec::new();
    for i in 0..nmat {
        let line = required_line(cursor, KW, Some(i), "a material line")?;
        let params = decode_into(&line, ParameterBlock::new(), KW, Some(i))?;
        params.require_int("mat").map_err(|e| e.in_context(KW, Some(i)))?;
        let ncrit = params.require_count("ncrit").map_err(|e| e.in_context(KW, Some(i)))?;

        let mut criteria = Vec::new();
        for _ in 0..ncrit {
            criteria.push(read_criterion(cursor, i)?);
        }

        materials.push(FailureMaterial {
            record: Record {
                params,
                comments: line.comments,
            },
            criteria,
        });
    }

    Ok(FailureSubcell { header, materials })
}

fn read_criterion(cursor: &mut LineCursor, material: usize) -> Result<FailureCriterion> {
    const KW: &str = "*FAILURE_SUBCELL";

    let line = required_line(cursor, KW, Some(material), "a failure criterion")?;
    let defaults = ParameterBlock::with_defaults(&[("compr", ParamValue::Str("off".to_string()))]);
    let mut params = decode_into(&line, defaults, KW, Some(material))?;

    let ntemp = params.int("ntemp").map_err(|e| e.in_context(KW, Some(material)))?;
    let Some(ntemp) = ntemp else {
        return Ok(FailureCriterion {
            params,
            table_columns: Vec::new(),
        });
    };

    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); FAILURE_TABLE_COLUMNS.len()];
    for _ in 0..ntemp.max(0) {
        let line = required_line(cursor, KW, Some(material), "a temperature table row")?;
        let row = decode_into(&line, ParameterBlock::new(), KW, Some(material))?;
        for (key, values) in FAILURE_TABLE_COLUMNS.iter().zip(columns.iter_mut()) {
            if let Some(v) = row.float(key).map_err(|e| e.in_context(KW, Some(material)))? {
                values.push(v);
            }
        }
    }

    let mut table_columns = Vec::new();
    for (key, values) in FAILURE_TABLE_COLUMNS.iter().zip(columns) {
        if !values.is_empty() {
            params.insert(*key, ParamValue::FloatList(values));
            table_columns.push(key.to_string());
        }
    }

    Ok(FailureCriterion { params, table_columns })
}

/// `*PDFA`: `NMAT` materials, each two lines merged.
pub fn read_pdfa(cursor: &mut LineCursor) -> Result<Pdfa> {
    const KW: &str = "*PDFA";

    let line = required_line(cursor, KW, None, "NMAT")?;
    let header = decode_into(&line, ParameterBlock::new(), KW, None)?;
    let nmat = header.require_count("nmat").map_err(|e| e.in_context(KW, None))?;

    let mut materials = Vec::new();
    for i in 0..nmat {
        let line = required_line(cursor, KW, Some(i), "a material line")?;
        let mut params = decode_into(&line, ParameterBlock::new(), KW, Some(i))?;
        let first_line = params.len();
        if let Some(second) = cursor.next_unless_keyword() {
            params = decode_into(&second, params, KW, Some(i))?;
        }
        params.require_int("mat").map_err(|e| e.in_context(KW, Some(i)))?;
        materials.push(PdfaMaterial { params, first_line });
    }

    Ok(Pdfa { header, materials })
}

/// `*EXTERNAL_SETTINGS`: two optional lines merged.
pub fn read_external(cursor: &mut LineCursor) -> Result<ParameterBlock> {
    const KW: &str = "*EXTERNAL_SETTINGS";
    let first = read_optional_line(cursor, KW, ParameterBlock::new())?;
    read_optional_line(cursor, KW, first)
}

/// `*XYPLOT`: a `FREQ` line, then a `MACRO=n` and a `MICRO=n` group.
pub fn read_xyplot(cursor: &mut LineCursor) -> Result<XyPlot> {
    const KW: &str = "*XYPLOT";

    let header = read_optional_line(cursor, KW, ParameterBlock::new())?;
    let mut macro_plots = PlotGroup::default();
    let mut micro_plots = PlotGroup::default();

    for i in 0..2 {
        let Some(line) = cursor.next_unless_keyword() else {
            break;
        };
        let params = decode_into(&line, ParameterBlock::new(), KW, Some(i))?;

        let (count, group) = if params.contains_key("macro") {
            (params.require_count("macro"), &mut macro_plots)
        } else if params.contains_key("micro") {
            (params.require_count("micro"), &mut micro_plots)
        } else {
            return Err(DeckError::malformed_record(KW, i, "expected a MACRO or MICRO group"));
        };
        let count = count.map_err(|e| e.in_context(KW, Some(i)))?;

        let mut results = Vec::new();
        for _ in 0..count {
            let line = required_line(cursor, KW, Some(i), "a result line")?;
            results.push(decode_into(&line, ParameterBlock::new(), KW, Some(i))?);
        }
        *group = PlotGroup { params, results };
    }

    Ok(XyPlot {
        header,
        macro_plots,
        micro_plots,
    })
}

/// `*PRINT` defaults.
pub fn print_defaults() -> ParameterBlock {
    ParameterBlock::with_defaults(&[("npl", ParamValue::Int(1)), ("vflev", ParamValue::Int(0))])
}

/// `*HDF5` defaults.
pub fn hdf5_defaults() -> ParameterBlock {
    ParameterBlock::with_defaults(&[
        ("popt1", ParamValue::Int(0)),
        ("popt2", ParamValue::Int(0)),
        ("maxlev", ParamValue::Int(0)),
    ])
}

/// `*PROBLEM_TYPE` defaults.
pub fn problem_type_defaults() -> ParameterBlock {
    ParameterBlock::with_defaults(&[("mech", ParamValue::Int(1)), ("vect", ParamValue::Int(0))])
}

/// `*MATLAB` defaults.
pub fn matlab_defaults() -> ParameterBlock {
    ParameterBlock::with_defaults(&[
        ("p", ParamValue::Int(0)),
        ("v", ParamValue::Int(0)),
        ("jskip", ParamValue::Int(1)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constituents_count_larger_than_records() {
        let mut cursor = LineCursor::new("NMATS=4611686018427387904\nM=1 CMOD=6\n*END\n");
        let err = read_constituents(&mut cursor).unwrap_err();
        assert!(matches!(
            err,
            DeckError::MalformedInput { record: crate::error::Record(Some(1)), .. }
        ));
    }

    #[test]
    fn test_constituents_merge_property_lines() {
        let mut cursor = LineCursor::new(
            "NMATS=2\n# carbon\nM=1 CMOD=6 MATID=U\nEA=230000.0 EB=15000.0\nM=2 CMOD=6 MATID=E\n*RUC\n",
        );
        let block = read_constituents(&mut cursor).unwrap();
        assert_eq!(block.count(), 2);
        assert_eq!(block.materials[0].comments, vec!["# carbon".to_string()]);
        assert_eq!(block.materials[0].params.float("eb").unwrap(), Some(15000.0));
        assert_eq!(block.materials[1].params.string("matid").unwrap(), Some("E"));
        assert!(cursor.peek().unwrap().is_keyword());
    }

    #[test]
    fn test_constituents_too_few_records() {
        let mut cursor = LineCursor::new("NMATS=3\nM=1 CMOD=6\n*RUC\n");
        let err = read_constituents(&mut cursor).unwrap_err();
        assert!(matches!(
            err,
            DeckError::MalformedInput { ref keyword, record: crate::error::Record(Some(1)), .. } if keyword == "*CONSTITUENTS"
        ));
    }

    #[test]
    fn test_mech_leg_count_and_mode() {
        let mut cursor = LineCursor::new("LOP=99\nNPT=2 MODE=1\nNPT=2 MODE=1,1\nMODE=2\nMODE=2\nMODE=2\nMODE=2\n*END\n");
        let mech = read_mech(&mut cursor, "*MECH").unwrap();
        assert_eq!(mech.legs.len(), 6);
        assert_eq!(mech.legs[0].params.get("mode"), Some(&ParamValue::IntList(vec![1])));
        assert_eq!(mech.legs[1].params.get("mode"), Some(&ParamValue::IntList(vec![1, 1])));

        let mut cursor = LineCursor::new("LOP=7\nMODE=1\nNPT=2\n");
        let err = read_mech(&mut cursor, "*MECH").unwrap_err();
        assert!(err.to_string().contains("(record 2)"));
    }

    #[test]
    fn test_solver_defaults_and_normalization() {
        let mut cursor = LineCursor::new("*MECH\n");
        let solver = read_solver(&mut cursor).unwrap();
        assert_eq!(solver.int("itmax").unwrap(), Some(1));
        assert_eq!(solver.float("err").unwrap(), Some(0.001));

        let mut cursor = LineCursor::new("METHOD=1 NPT=2\nTI=0.0,1.0 STP=0.01 ERR=0.0001,0.1\n");
        let solver = read_solver(&mut cursor).unwrap();
        assert_eq!(solver.get("stp"), Some(&ParamValue::FloatList(vec![0.01])));
        assert_eq!(solver.get("err"), Some(&ParamValue::Float(0.0001)));
    }

    #[test]
    fn test_failure_subcell_table() {
        let text = "NMAT=1\nMAT=1 NCRIT=2\nCRIT=1 X11=100.0\nCRIT=2 NTEMP=2\nTEMP=0.0 X11=10.0 X22=5.0\nTEMP=100.0 X11=8.0\n*END\n";
        let mut cursor = LineCursor::new(text);
        let block = read_failure_subcell(&mut cursor).unwrap();
        let crits = &block.materials[0].criteria;
        assert_eq!(crits[0].params.string("compr").unwrap(), Some("off"));
        assert!(crits[0].table_columns.is_empty());
        assert_eq!(crits[1].table_columns, vec!["temp", "x11", "x22"]);
        assert_eq!(crits[1].params.float_list("x11").unwrap(), Some(vec![10.0, 8.0]));
        assert_eq!(crits[1].params.float_list("x22").unwrap(), Some(vec![5.0]));
    }

    #[test]
    fn test_pdfa_merges_two_lines() {
        let mut cursor = LineCursor::new("NMAT=1\nMAT=2 NL=3\nA=1.0 B=2.0\n*END\n");
        let block = read_pdfa(&mut cursor).unwrap();
        assert_eq!(block.materials[0].params.int("mat").unwrap(), Some(2));
        assert_eq!(block.materials[0].params.float("b").unwrap(), Some(2.0));
        assert_eq!(block.materials[0].first_line, 2);
    }

    #[test]
    fn test_xyplot_groups() {
        let text = "FREQ=1\nMACRO=1\nNAME=stress X=1 Y=2\nMICRO=0\n*END\n";
        let mut cursor = LineCursor::new(text);
        let xy = read_xyplot(&mut cursor).unwrap();
        assert_eq!(xy.header.int("freq").unwrap(), Some(1));
        assert_eq!(xy.macro_plots.results.len(), 1);
        assert_eq!(xy.macro_plots.results[0].string("name").unwrap(), Some("stress"));
        assert!(xy.micro_plots.results.is_empty());
        assert!(xy.micro_plots.params.contains_key("micro"));
    }

    #[test]
    fn test_optional_line_keeps_defaults() {
        let mut cursor = LineCursor::new("*SOLVER\n");
        let print = read_optional_line(&mut cursor, "*PRINT", print_defaults()).unwrap();
        assert_eq!(print, print_defaults());
        assert_eq!(cursor.current_line(), 1);

        let mut cursor = LineCursor::new("NPL=6\n");
        let print = read_optional_line(&mut cursor, "*PRINT", print_defaults()).unwrap();
        assert_eq!(print.int("npl").unwrap(), Some(6));
        assert_eq!(print.int("vflev").unwrap(), Some(0));
    }
}
