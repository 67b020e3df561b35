//! Write a compiled deck back to deck text.
//!
//! Blocks are emitted in a fixed order regardless of the order they were
//! read in. Grids of explicit cells are mapped back to deck material
//! numbers, built-in stacks and tows are left out (they are regenerated on
//! the next read), and lines longer than the wrap column are continued
//! with `&`.

use serde::Serialize;

use crate::deck::ast::{Mech, PlotGroup, Record};
use crate::deck::params::{ParamValue, ParameterBlock};
use crate::error::Result;
use crate::model::CompiledDeck;
use crate::ruc::{Dimensionality, Grid, Ruc, RucHandle};
use crate::{COMMENT_MARKER, CONTINUATION_MARKER};

/// Output of [`write_deck`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeckText {
    pub deck: String,
    /// Orientation override file, when overrides were applied
    pub rotations: Option<String>,
}

/// Break a line that runs past `column`.
///
/// The break goes after the first `,` at or past the column, or else after
/// the last space before it. Each broken line ends in `&` and the
/// remainder is indented by one space. A line with neither stays whole.
pub fn wrap_line(line: &str, column: usize) -> String {
    let mut out = String::new();
    let mut rest = line;

    while rest.len() > column {
        let comma = rest
            .char_indices()
            .find(|&(i, c)| c == ',' && i >= column)
            .map(|(i, _)| i);
        let space = || {
            rest.get(..=column)
                .and_then(|head| head.rfind(' '))
                .filter(|&i| i > 0)
        };
        let Some(cut) = comma.or_else(space) else {
            break;
        };
        out.push_str(&rest[..=cut]);
        out.push(CONTINUATION_MARKER);
        out.push_str("\n ");
        rest = &rest[cut + 1..];
    }

    out.push_str(rest);
    out
}

struct DeckWriter {
    out: String,
    wrap_column: usize,
}

impl DeckWriter {
    fn keyword(&mut self, marker: &str) {
        self.out.push_str(marker);
        self.out.push('\n');
    }

    /// One record line with a leading pad. Empty blocks write nothing.
    fn line(&mut self, pad: &str, block: &ParameterBlock) {
        if block.is_empty() {
            return;
        }
        let text = format!("{}{}", pad, block.to_line());
        self.out.push_str(&wrap_line(&text, self.wrap_column));
        self.out.push('\n');
    }

    fn comments(&mut self, comments: &[String]) {
        for comment in comments {
            if !comment.starts_with(COMMENT_MARKER) {
                self.out.push_str("#--");
            }
            self.out.push_str(comment);
            self.out.push('\n');
        }
    }

    fn record(&mut self, pad: &str, record: &Record) {
        self.comments(&record.comments);
        self.line(pad, &record.params);
    }

    fn mech(&mut self, marker: &str, mech: &Mech) {
        self.keyword(marker);
        self.record(" ", &mech.header);
        for leg in &mech.legs {
            self.record(" ", leg);
        }
    }

    fn plot_group(&mut self, group: &PlotGroup) {
        self.line(" ", &group.params);
        for result in &group.results {
            self.line("  ", result);
        }
    }
}

fn single(key: &str, value: ParamValue) -> ParameterBlock {
    ParameterBlock::with_defaults(&[(key, value)])
}

/// Split `block` into the entries before and after position `at`.
fn split_at(block: &ParameterBlock, at: usize) -> (ParameterBlock, ParameterBlock) {
    let mut head = ParameterBlock::new();
    let mut tail = ParameterBlock::new();
    for (i, (key, value)) in block.iter().enumerate() {
        if i < at {
            head.insert(key, value.clone());
        } else {
            tail.insert(key, value.clone());
        }
    }
    (head, tail)
}

/// Keys written on the first line of a temperature-dependent material.
const MATERIAL_HEADER_KEYS: &[&str] = &["m", "cmod", "tref", "matid", "matdb"];

/// Write `compiled` as deck text, wrapping lines at `wrap_column`.
///
/// # Errors
/// `UnresolvedReference` if a grid holds an index the material map does not
/// cover.
pub fn write_deck(compiled: &CompiledDeck, wrap_column: usize) -> Result<DeckText> {
    let deck = &compiled.deck;
    let mut w = DeckWriter {
        out: String::new(),
        wrap_column,
    };

    if let Some(title) = &deck.title {
        w.out.push_str(title);
        w.out.push('\n');
    }

    if let Some(print) = &deck.print {
        w.keyword("*PRINT");
        w.line(" ", print);
    }

    if let Some(constituents) = &deck.constituents {
        w.keyword("*CONSTITUENTS");
        w.line(" ", &constituents.header);
        for material in &constituents.materials {
            w.comments(&material.comments);
            if material.params.contains_key("ntp") {
                w.line(" ", &material.params.select(MATERIAL_HEADER_KEYS, true));
                for (key, value) in material.params.select(MATERIAL_HEADER_KEYS, false).iter() {
                    w.line("  ", &single(key, value.clone()));
                }
            } else {
                w.line(" ", &material.params);
            }
        }
    }

    write_rucs(&mut w, compiled)?;

    if let Some(mech) = &deck.mech {
        w.mech("*MECH", mech);
    }
    if let Some(multiphysics) = &deck.multiphysics {
        w.mech("*MULTIPHYSICS", multiphysics);
    }

    if let Some(therm) = &deck.therm {
        w.keyword("*THERM");
        w.line(" ", therm);
    }

    if let Some(solver) = &deck.solver {
        const STEP_KEYS: &[&str] = &["nleg", "ninteg"];
        w.keyword("*SOLVER");
        w.line(" ", &solver.select(STEP_KEYS, false));
        w.line(" ", &solver.select(STEP_KEYS, true));
    }

    if let Some(failure) = &deck.failure_subcell {
        w.keyword("*FAILURE_SUBCELL");
        w.line(" ", &failure.header);
        for material in &failure.materials {
            w.record("  ", &material.record);
            for criterion in &material.criteria {
                if criterion.table_columns.is_empty() {
                    w.line("  ", &criterion.params);
                    continue;
                }
                let columns: Vec<&str> = criterion.table_columns.iter().map(String::as_str).collect();
                w.line("  ", &criterion.params.select(&columns, false));
                let table = criterion.params.select(&columns, true);
                let rows = table
                    .iter()
                    .map(|(_, v)| match v {
                        ParamValue::FloatList(values) => values.len(),
                        _ => 1,
                    })
                    .max()
                    .unwrap_or(0);
                for row in 0..rows {
                    let mut line = ParameterBlock::new();
                    for (key, value) in table.iter() {
                        match value {
                            ParamValue::FloatList(values) => {
                                if let Some(v) = values.get(row) {
                                    line.insert(key, ParamValue::Float(*v));
                                }
                            }
                            other if row == 0 => line.insert(key, other.clone()),
                            _ => {}
                        }
                    }
                    w.line("  ", &line);
                }
            }
        }
    }

    if let Some(pdfa) = &deck.pdfa {
        w.keyword("*PDFA");
        w.line(" ", &pdfa.header);
        for material in &pdfa.materials {
            let (first, second) = split_at(&material.params, material.first_line);
            w.line("  ", &first);
            w.line("  ", &second);
        }
    }

    if let Some(hdf5) = &deck.hdf5 {
        w.keyword("*HDF5");
        w.line(" ", hdf5);
    }
    if let Some(problem_type) = &deck.problem_type {
        w.keyword("*PROBLEM_TYPE");
        w.line(" ", problem_type);
    }

    if let Some(external) = &deck.external {
        const FIRST_LINE: &[&str] = &["mode", "nids"];
        w.keyword("*EXTERNAL_SETTINGS");
        w.line(" ", &external.select(FIRST_LINE, true));
        w.line(" ", &external.select(FIRST_LINE, false));
    }

    if let Some(xyplot) = &deck.xyplot {
        w.keyword("*XYPLOT");
        w.line(" ", &xyplot.header);
        w.plot_group(&xyplot.macro_plots);
        w.plot_group(&xyplot.micro_plots);
    }

    if let Some(matlab) = &deck.matlab {
        w.keyword("*MATLAB");
        w.line(" ", matlab);
    }

    w.out.push_str("*END\n");

    let rotations = match (&compiled.overrides, compiled.settings.crot) {
        (Some(overrides), true) => Some(overrides.to_text()),
        _ => None,
    };

    Ok(DeckText { deck: w.out, rotations })
}

/// The `*RUC` block: the top cell without `MSM`, then user cells `MSM <= -17`.
fn write_rucs(w: &mut DeckWriter, compiled: &CompiledDeck) -> Result<()> {
    let rucs = &compiled.rucs;
    let Some(top) = rucs.handle(0) else {
        return Ok(());
    };
    let blocks: Vec<RucHandle> = std::iter::once(top)
        .chain(
            rucs.iter()
                .filter(|(_, ruc)| ruc.msm <= -17 && !ruc.builtin)
                .map(|(handle, _)| handle),
        )
        .collect();

    w.keyword("*RUC");
    w.line(" ", &single("nrucs", ParamValue::Int(blocks.len() as i64)));
    if compiled.settings.crot {
        w.line(" ", &single("crot", ParamValue::Int(1)));
    }

    for handle in blocks {
        let ruc = rucs.get(handle);
        let mut params = ParameterBlock::new();
        if ruc.msm != 0 {
            params.insert("msm", ParamValue::Int(ruc.msm));
        }
        for (key, value) in ruc.params.iter().filter(|(k, _)| *k != "msm") {
            params.insert(key, value.clone());
        }
        w.comments(&ruc.comments);
        w.line(" ", &params);

        if ruc.archid == Some(99) {
            let grid = rucs.actual_grid(handle, &compiled.materials)?;
            write_explicit_grid(w, ruc, &grid);
        }

        if let Some(frame) = &ruc.explicit_frame {
            for (key, axis) in ["d1", "d2", "d3"].into_iter().zip(frame) {
                w.line(" ", &single(key, ParamValue::FloatList(axis.to_vec())));
            }
        }
    }

    Ok(())
}

/// Counts, spacings and material rows of an `ARCHID=99` cell, rows in
/// reading order (top row first).
fn write_explicit_grid(w: &mut DeckWriter, ruc: &Ruc, grid: &Grid) {
    let (na, nb, ng) = (grid.na(), grid.nb(), grid.ng());
    let count = |n: usize| ParamValue::Int(n as i64);

    if ruc.dimensionality() == Dimensionality::ThreeD {
        w.line(
            " ",
            &ParameterBlock::with_defaults(&[("na", count(na)), ("nb", count(nb)), ("ng", count(ng))]),
        );
        w.line(" ", &single("d", ParamValue::FloatList(ruc.d.clone())));
    } else {
        w.line(" ", &ParameterBlock::with_defaults(&[("nb", count(nb)), ("ng", count(ng))]));
    }
    w.line(" ", &single("h", ParamValue::FloatList(ruc.h.clone())));
    w.line(" ", &single("l", ParamValue::FloatList(ruc.l.clone())));

    if ruc.dimensionality() == Dimensionality::ThreeD {
        for ig in 0..ng {
            w.out.push_str(&format!("# -- gamma = {}\n", ig + 1));
            for ia in (0..na).rev() {
                let row = (0..nb).map(|ib| grid.get(ia, ib, ig)).collect();
                w.line(" ", &single("sm", ParamValue::IntList(row)));
            }
        }
    } else {
        for ib in (0..nb).rev() {
            let row = (0..ng).map(|ig| grid.get(0, ib, ig)).collect();
            w.line(" ", &single("sm", ParamValue::IntList(row)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::parse;
    use crate::model::{compile, CompileOptions};

    const DECK: &str = "\
Layered laminate
*CONSTITUENTS
 NMATS=2
 # fiber
 M=1 CMOD=6 MATID=U MATDB=1
 M=2 CMOD=6 MATID=E MATDB=1
*RUC
 NRUCS=2
 MOD=102 ARCHID=99
 NB=2 NG=2
 H=0.5,0.5
 L=0.5,0.5
 SM=-20,2
 SM=1,-20
 MOD=102 ARCHID=1 VF=0.5 F=1 M=2 MSM=-20
*MECH
 LOP=2
 NPT=2 TI=0.0,1.0 MAG=0.0,0.02 MODE=1
*SOLVER
 METHOD=1 NPT=2 NLEG=1
*END
";

    fn compiled(text: &str) -> CompiledDeck {
        compile(parse(text).unwrap(), &CompileOptions::default()).unwrap()
    }

    #[test]
    fn test_wrap_breaks_after_comma_past_column() {
        let wrapped = wrap_line(" sm=1,2,3,4,5,6", 6);
        assert_eq!(wrapped, " sm=1,2,&\n 3,4,5,6");
    }

    #[test]
    fn test_wrap_falls_back_to_space() {
        let wrapped = wrap_line(" a=1 b=2 c=3", 8);
        assert_eq!(wrapped, " a=1 b=2 &\n c=3");
        assert_eq!(wrap_line(" a=1", 75), " a=1");
        assert_eq!(wrap_line("abcdefgh", 4), "abcdefgh");
    }

    #[test]
    fn test_order_and_top_without_msm() {
        let text = write_deck(&compiled(DECK), 75).unwrap().deck;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Layered laminate");
        assert_eq!(lines[1], "*CONSTITUENTS");
        assert!(lines.contains(&"# fiber"));
        assert!(lines.contains(&" nrucs=2"));
        assert!(lines.contains(&" mod=102 archid=99"));
        assert!(lines.contains(&" msm=-20 mod=102 archid=1 vf=0.5 f=1 m=2"));
        assert_eq!(*lines.last().unwrap(), "*END");

        let ruc = text.find("*RUC").unwrap();
        let mech = text.find("*MECH").unwrap();
        let solver = text.find("*SOLVER").unwrap();
        assert!(ruc < mech && mech < solver);
    }

    #[test]
    fn test_explicit_rows_written_top_down_in_deck_numbers() {
        let text = write_deck(&compiled(DECK), 75).unwrap().deck;
        let first = text.find(" sm=-20,2").unwrap();
        let second = text.find(" sm=1,-20").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_written_deck_reads_back_to_same_model() {
        let original = compiled(DECK);
        let text = write_deck(&original, 20).unwrap();
        let again = compiled(&text.deck);

        assert_eq!(again.rucs.len(), original.rucs.len());
        for (_, ruc) in original.rucs.iter() {
            let other = again.rucs.by_msm(ruc.msm).unwrap();
            assert_eq!(other.grid, ruc.grid);
            assert_eq!(other.h, ruc.h);
        }
        assert_eq!(again.deck.solver, original.deck.solver);
        assert!(text.rotations.is_none());
    }

    #[test]
    fn test_builtins_are_not_written() {
        let text = "\
*CONSTITUENTS
 NMATS=2
 M=1 CMOD=6
 M=2 CMOD=6
*RUC
 MOD=102 ARCHID=99 VFTOW=0.5
 NB=1 NG=2
 H=1.0
 L=0.5,0.5
 SM=-11,2
*END
";
        let compiled = compiled(text);
        assert!(compiled.rucs.contains(-11));
        let written = write_deck(&compiled, 75).unwrap().deck;
        assert!(written.contains(" nrucs=1"));
        assert!(!written.contains("msm=-11"));
        assert!(written.contains(" sm=-11,2"));
    }

    #[test]
    fn test_rotations_written_with_crot() {
        let text = DECK.replace(" NRUCS=2\n", " NRUCS=2\n CROT=1\n");
        let options = CompileOptions {
            override_text: Some("1\n0,1\n1,1,1,1.0,0.0,0.0\n".to_string()),
            ..CompileOptions::default()
        };
        let compiled = compile(parse(&text).unwrap(), &options).unwrap();
        let written = write_deck(&compiled, 75).unwrap();
        assert!(written.deck.contains(" crot=1\n"));
        assert_eq!(written.rotations.as_deref(), Some("1\n0,1\n1,1,1,1,0,0\n"));
    }
}
