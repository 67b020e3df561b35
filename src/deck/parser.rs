//! Keyword dispatch loop.

use tracing::{debug, info};

use super::ast::{DeckAst, Keyword};
use super::lines::LineCursor;
use super::readers;
use super::ruc_reader::read_ruc_section;
use crate::error::Result;
use crate::model::Diagnostic;

/// Parse substituted deck text into a [`DeckAst`].
///
/// Reading stops at `*END`; anything after it is ignored.
pub fn parse_deck(text: &str) -> Result<DeckAst> {
    let mut cursor = LineCursor::new(text);
    let mut deck = DeckAst::new();

    if let Some(first) = cursor.peek() {
        if !first.is_keyword() {
            deck.title = Some(first.text.clone());
            cursor.next_line();
        }
    }

    while let Some(line) = cursor.next_line() {
        if !line.is_keyword() {
            debug!(line = line.line, text = %line.text, "skipping line outside any keyword");
            continue;
        }

        let Some(keyword) = Keyword::from_line(&line.text) else {
            Diagnostic::UnknownKeyword {
                keyword: line.text.clone(),
                line: line.line,
            }
            .report(&mut deck.diagnostics);
            while cursor.next_unless_keyword().is_some() {}
            continue;
        };

        info!(keyword = keyword.marker(), line = line.line, "found keyword");
        match keyword {
            Keyword::Constituents => deck.constituents = Some(readers::read_constituents(&mut cursor)?),
            Keyword::Ruc | Keyword::RucLegacy => {
                let legacy = keyword == Keyword::RucLegacy;
                deck.rucs = Some(read_ruc_section(&mut cursor, legacy, &mut deck.diagnostics)?);
            }
            Keyword::Mech => deck.mech = Some(readers::read_mech(&mut cursor, keyword.marker())?),
            Keyword::Multiphysics => {
                deck.multiphysics = Some(readers::read_mech(&mut cursor, keyword.marker())?)
            }
            Keyword::Therm => deck.therm = Some(readers::read_therm(&mut cursor)?),
            Keyword::Solver => deck.solver = Some(readers::read_solver(&mut cursor)?),
            Keyword::FailureSubcell => {
                deck.failure_subcell = Some(readers::read_failure_subcell(&mut cursor)?)
            }
            Keyword::Pdfa => deck.pdfa = Some(readers::read_pdfa(&mut cursor)?),
            Keyword::Print => {
                deck.print = Some(readers::read_optional_line(
                    &mut cursor,
                    keyword.marker(),
                    readers::print_defaults(),
                )?)
            }
            Keyword::Hdf5 => {
                deck.hdf5 = Some(readers::read_optional_line(
                    &mut cursor,
                    keyword.marker(),
                    readers::hdf5_defaults(),
                )?)
            }
            Keyword::ProblemType => {
                deck.problem_type = Some(readers::read_optional_line(
                    &mut cursor,
                    keyword.marker(),
                    readers::problem_type_defaults(),
                )?)
            }
            Keyword::ExternalSettings => deck.external = Some(readers::read_external(&mut cursor)?),
            Keyword::XyPlot => deck.xyplot = Some(readers::read_xyplot(&mut cursor)?),
            Keyword::Matlab => {
                deck.matlab = Some(readers::read_optional_line(
                    &mut cursor,
                    keyword.marker(),
                    readers::matlab_defaults(),
                )?)
            }
            Keyword::End => break,
        }
    }

    Ok(deck)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeckError;

    const DECK: &str = "\
Two phase square pack
*CONSTITUENTS
 NMATS=2
 M=1 CMOD=6 MATID=U
 M=2 CMOD=6 MATID=E
*RUC
 MOD=102 ARCHID=1 VF=0.6 F=1 M=2
*BOUNDARY
 FIXED=1
*MECH
 LOP=2
 NPT=2 TI=0.0,1.0 MAG=0.0,0.02 MODE=1
*PRINT
*END
*THERM
";

    #[test]
    fn test_parse_dispatches_keywords() {
        let deck = parse_deck(DECK).unwrap();
        assert_eq!(deck.title.as_deref(), Some("Two phase square pack"));
        assert_eq!(deck.constituents.as_ref().unwrap().count(), 2);
        assert_eq!(deck.rucs.as_ref().unwrap().rucs.len(), 1);
        assert_eq!(deck.mech.as_ref().unwrap().legs.len(), 1);
        assert_eq!(deck.print.as_ref().unwrap().int("npl").unwrap(), Some(1));
        // after *END
        assert!(deck.therm.is_none());
    }

    #[test]
    fn test_unknown_keyword_is_skipped() {
        let deck = parse_deck(DECK).unwrap();
        assert!(matches!(
            deck.diagnostics[..],
            [Diagnostic::UnknownKeyword { line: 8, .. }]
        ));
    }

    #[test]
    fn test_reader_errors_propagate() {
        let err = parse_deck("*CONSTITUENTS\nNMATS=x1\n").unwrap_err();
        assert!(matches!(err, DeckError::MalformedInput { ref keyword, .. } if keyword == "*CONSTITUENTS"));
    }

    #[test]
    fn test_deck_without_title() {
        let deck = parse_deck("*SOLVER\nMETHOD=2\n").unwrap();
        assert!(deck.title.is_none());
        assert_eq!(deck.solver.unwrap().int("method").unwrap(), Some(2));
    }
}
