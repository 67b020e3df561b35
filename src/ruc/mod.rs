//! Repeating unit cells and the collection that owns them.
//!
//! A [`Ruc`] is a discretized periodic cell: axis counts `na × nb × ng`,
//! one spacing array per axis, and a material grid whose values are either
//! constituent ids (positive) or references to other RUCs (negative).
//!
//! Every RUC in a deck lives in one [`RucCollection`], an arena addressed by
//! [`RucHandle`] with a secondary index by msm id. The collection carries a
//! numbering marker: [`Actual`] while grids hold deck-native material numbers,
//! [`Indexed`] once they have been rewritten through a
//! [`MaterialMap`](crate::model::MaterialMap). Renumbering consumes the
//! collection, so an indexed collection can never be renumbered twice.

pub mod architecture;
pub mod builtin;

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::marker::PhantomData;

use serde::Serialize;

use crate::deck::params::ParameterBlock;
use crate::error::{DeckError, Result};
use crate::model::materials::MaterialMap;
use crate::model::orientation::Frame;

// ============ Method and dimensionality ============

/// Micromechanics method of a unit cell (`MOD=`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Mean-field method, code 2
    Mt2,
    /// Mean-field method, code 3
    Mt3,
    /// Generalized method of cells, doubly periodic
    Gmc2d,
    /// Generalized method of cells, triply periodic
    Gmc3d,
    /// High-fidelity GMC, doubly periodic
    Hfgmc2d,
    /// High-fidelity GMC, triply periodic
    Hfgmc3d,
}

impl Method {
    /// Look up a method by its deck code.
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            2 => Ok(Self::Mt2),
            3 => Ok(Self::Mt3),
            102 => Ok(Self::Gmc2d),
            103 => Ok(Self::Gmc3d),
            202 => Ok(Self::Hfgmc2d),
            203 => Ok(Self::Hfgmc3d),
            _ => Err(DeckError::unsupported_method(code)),
        }
    }

    /// Look up a method by its legacy code (`*RUC_LEGACY`).
    pub fn from_legacy_code(code: i64) -> Result<Self> {
        match code {
            2 => Ok(Self::Gmc2d),
            3 => Ok(Self::Gmc3d),
            22 => Ok(Self::Hfgmc2d),
            13 => Ok(Self::Hfgmc3d),
            _ => Err(DeckError::unsupported_method(code)),
        }
    }

    /// Deck code of this method.
    pub fn code(&self) -> i64 {
        match self {
            Self::Mt2 => 2,
            Self::Mt3 => 3,
            Self::Gmc2d => 102,
            Self::Gmc3d => 103,
            Self::Hfgmc2d => 202,
            Self::Hfgmc3d => 203,
        }
    }

    pub fn dimensionality(&self) -> Dimensionality {
        match self {
            Self::Gmc2d | Self::Hfgmc2d => Dimensionality::TwoD,
            Self::Gmc3d | Self::Hfgmc3d => Dimensionality::ThreeD,
            Self::Mt2 | Self::Mt3 => Dimensionality::Mt,
        }
    }

    /// Degrees of freedom of a cell solved with this method.
    pub fn dof(&self, na: usize, nb: usize, ng: usize) -> usize {
        match self {
            Self::Gmc2d => nb + ng,
            Self::Gmc3d => nb * ng + 2 * na * ng + na + nb + ng,
            Self::Hfgmc2d => 6 * nb * ng + 3 * (nb + ng),
            Self::Hfgmc3d => 9 * na * nb * ng + 3 * (nb * ng + na * ng + na * nb),
            Self::Mt2 | Self::Mt3 => 12,
        }
    }
}

/// Dimensionality tag of a unit cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Dimensionality {
    #[serde(rename = "MT")]
    Mt,
    #[serde(rename = "2D")]
    TwoD,
    #[serde(rename = "3D")]
    ThreeD,
}

impl fmt::Display for Dimensionality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mt => write!(f, "MT"),
            Self::TwoD => write!(f, "2D"),
            Self::ThreeD => write!(f, "3D"),
        }
    }
}

// ============ Material grid ============

/// Storage order of a material grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// `na == 1`, flattened as `ib * ng + ig`
    Planar,
    /// Flattened as `ig * nb * na + ib * na + ia`
    Volumetric,
}

/// Material-id grid of one unit cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    na: usize,
    nb: usize,
    ng: usize,
    layout: Layout,
    cells: Vec<i64>,
}

impl Grid {
    /// Create a grid with every cell set to `value`.
    pub fn filled(na: usize, nb: usize, ng: usize, layout: Layout, value: i64) -> Self {
        let na = if layout == Layout::Planar { 1 } else { na };
        Self {
            na,
            nb,
            ng,
            layout,
            cells: vec![value; na * nb * ng],
        }
    }

    pub fn na(&self) -> usize {
        self.na
    }

    pub fn nb(&self) -> usize {
        self.nb
    }

    pub fn ng(&self) -> usize {
        self.ng
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Flattened index of subvolume `(ia, ib, ig)`, zero-based.
    pub fn index(&self, ia: usize, ib: usize, ig: usize) -> usize {
        match self.layout {
            Layout::Planar => ib * self.ng + ig,
            Layout::Volumetric => ig * self.nb * self.na + ib * self.na + ia,
        }
    }

    /// Check whether `(ia, ib, ig)` lies inside the grid.
    pub fn contains(&self, ia: usize, ib: usize, ig: usize) -> bool {
        ia < self.na && ib < self.nb && ig < self.ng
    }

    pub fn get(&self, ia: usize, ib: usize, ig: usize) -> i64 {
        self.cells[self.index(ia, ib, ig)]
    }

    pub fn set(&mut self, ia: usize, ib: usize, ig: usize, value: i64) {
        let idx = self.index(ia, ib, ig);
        self.cells[idx] = value;
    }

    /// Cells in storage order.
    pub fn cells(&self) -> &[i64] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Distinct values in ascending order.
    pub fn distinct(&self) -> BTreeSet<i64> {
        self.cells.iter().copied().collect()
    }

    /// Distinct negative (RUC reference) values in ascending order.
    pub fn references(&self) -> Vec<i64> {
        self.distinct().into_iter().filter(|v| *v < 0).collect()
    }

    /// Number of cells holding `value`.
    pub fn count(&self, value: i64) -> usize {
        self.cells.iter().filter(|v| **v == value).count()
    }

    /// Rewrite every cell through `f`.
    pub fn try_map(&self, mut f: impl FnMut(i64) -> Result<i64>) -> Result<Grid> {
        let cells = self.cells.iter().map(|v| f(*v)).collect::<Result<Vec<_>>>()?;
        Ok(Grid { cells, ..self.clone() })
    }
}

// ============ Unit cell ============

/// One repeating unit cell.
#[derive(Debug, Clone)]
pub struct Ruc {
    /// Own reference id (0 for the top-level cell)
    pub msm: i64,
    pub method: Method,
    /// Architecture id; `None` for mean-field cells
    pub archid: Option<i64>,
    pub grid: Grid,
    /// Spacings along the a, b and g axes
    pub d: Vec<f64>,
    pub h: Vec<f64>,
    pub l: Vec<f64>,
    /// The block's own parameter line
    pub params: ParameterBlock,
    pub comments: Vec<String>,
    /// Explicit `D1/D2/D3` triple, as written
    pub explicit_frame: Option<[[f64; 3]; 3]>,
    /// Per-cell material frames, filled by the orientation pass
    pub orientation: Vec<Frame>,
    /// Definition ordinal (1-based), built-ins counted as generated
    pub deck_index: usize,
    /// Generated from the stack/tow catalog rather than read
    pub builtin: bool,
}

impl Ruc {
    pub fn dimensionality(&self) -> Dimensionality {
        self.method.dimensionality()
    }

    /// Number of subvolumes.
    pub fn n_subvol(&self) -> usize {
        self.grid.len()
    }

    /// Degrees of freedom under this cell's method.
    pub fn n_dof(&self) -> usize {
        self.method.dof(self.grid.na(), self.grid.nb(), self.grid.ng())
    }
}

// ============ Collection ============

/// Grids hold deck-native material numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actual;

/// Grids hold dense 0-based material indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Indexed;

/// Handle of a RUC inside a [`RucCollection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RucHandle(usize);

impl RucHandle {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Arena of unit cells addressed by handle, indexed by msm id.
#[derive(Debug, Clone)]
pub struct RucCollection<N = Actual> {
    rucs: Vec<Ruc>,
    by_msm: HashMap<i64, RucHandle>,
    _numbering: PhantomData<N>,
}

impl<N> RucCollection<N> {
    fn from_parts(rucs: Vec<Ruc>) -> Self {
        let by_msm = rucs
            .iter()
            .enumerate()
            .map(|(i, r)| (r.msm, RucHandle(i)))
            .collect();
        Self {
            rucs,
            by_msm,
            _numbering: PhantomData,
        }
    }

    /// Handle of the RUC with this msm id.
    pub fn handle(&self, msm: i64) -> Option<RucHandle> {
        self.by_msm.get(&msm).copied()
    }

    pub fn get(&self, handle: RucHandle) -> &Ruc {
        &self.rucs[handle.0]
    }

    pub fn get_mut(&mut self, handle: RucHandle) -> &mut Ruc {
        &mut self.rucs[handle.0]
    }

    /// RUC with this msm id.
    pub fn by_msm(&self, msm: i64) -> Option<&Ruc> {
        self.handle(msm).map(|h| self.get(h))
    }

    pub fn contains(&self, msm: i64) -> bool {
        self.by_msm.contains_key(&msm)
    }

    /// The top-level cell (msm 0).
    pub fn top(&self) -> Option<&Ruc> {
        self.by_msm(0)
    }

    /// RUCs in definition order.
    pub fn iter(&self) -> impl Iterator<Item = (RucHandle, &Ruc)> {
        self.rucs.iter().enumerate().map(|(i, r)| (RucHandle(i), r))
    }

    pub fn handles(&self) -> impl Iterator<Item = RucHandle> {
        (0..self.rucs.len()).map(RucHandle)
    }

    pub fn len(&self) -> usize {
        self.rucs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rucs.is_empty()
    }

    /// Rewrite every grid through `f`, changing the numbering marker.
    fn convert<M>(self, mut f: impl FnMut(&Ruc, i64) -> Result<i64>) -> Result<RucCollection<M>> {
        let mut rucs = self.rucs;
        for ruc in rucs.iter_mut() {
            let grid = {
                let current: &Ruc = ruc;
                current.grid.try_map(|v| f(current, v))?
            };
            ruc.grid = grid;
        }
        Ok(RucCollection::from_parts(rucs))
    }
}

impl Default for RucCollection<Actual> {
    fn default() -> Self {
        Self::new()
    }
}

impl RucCollection<Actual> {
    pub fn new() -> Self {
        Self::from_parts(Vec::new())
    }

    /// Add a RUC. A RUC with the same msm id is replaced in place.
    pub fn insert(&mut self, ruc: Ruc) -> RucHandle {
        match self.handle(ruc.msm) {
            Some(handle) => {
                self.rucs[handle.0] = ruc;
                handle
            }
            None => {
                let handle = RucHandle(self.rucs.len());
                self.by_msm.insert(ruc.msm, handle);
                self.rucs.push(ruc);
                handle
            }
        }
    }

    /// Rewrite every grid from actual material numbers to dense indices.
    pub fn renumber(self, map: &MaterialMap) -> Result<RucCollection<Indexed>> {
        self.convert(|ruc, actual| {
            map.index(actual)
                .map(|i| i as i64)
                .ok_or(DeckError::UnresolvedReference {
                    msm: actual,
                    parent: ruc.msm,
                })
        })
    }
}

impl RucCollection<Indexed> {
    /// Rewrite every grid back to actual material numbers.
    pub fn to_actual(self, map: &MaterialMap) -> Result<RucCollection<Actual>> {
        self.convert(|ruc, index| {
            usize::try_from(index)
                .ok()
                .and_then(|i| map.actual(i))
                .ok_or(DeckError::UnresolvedReference {
                    msm: index,
                    parent: ruc.msm,
                })
        })
    }

    /// Copy of one RUC's grid mapped back to actual material numbers.
    pub fn actual_grid(&self, handle: RucHandle, map: &MaterialMap) -> Result<Grid> {
        let ruc = self.get(handle);
        ruc.grid.try_map(|index| {
            usize::try_from(index)
                .ok()
                .and_then(|i| map.actual(i))
                .ok_or(DeckError::UnresolvedReference {
                    msm: index,
                    parent: ruc.msm,
                })
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Minimal RUC for tests: 2-D GMC, explicit grid.
    pub(crate) fn planar_ruc(msm: i64, nb: usize, ng: usize, cells: &[i64]) -> Ruc {
        let mut grid = Grid::filled(1, nb, ng, Layout::Planar, 0);
        for ib in 0..nb {
            for ig in 0..ng {
                grid.set(0, ib, ig, cells[ib * ng + ig]);
            }
        }
        Ruc {
            msm,
            method: Method::Gmc2d,
            archid: Some(99),
            grid,
            d: vec![1.0],
            h: vec![1.0 / nb as f64; nb],
            l: vec![1.0 / ng as f64; ng],
            params: ParameterBlock::new(),
            comments: Vec::new(),
            explicit_frame: None,
            orientation: Vec::new(),
            deck_index: 1,
            builtin: false,
        }
    }

    #[test]
    fn test_method_codes() {
        assert_eq!(Method::from_code(103).unwrap(), Method::Gmc3d);
        assert!(matches!(Method::from_code(302), Err(DeckError::UnsupportedMethod { code: 302, .. })));
        assert_eq!(Method::from_legacy_code(22).unwrap().code(), 202);
        assert_eq!(Method::from_legacy_code(13).unwrap().code(), 203);
        assert_eq!(Method::Mt3.dimensionality(), Dimensionality::Mt);
        assert_eq!(Method::Hfgmc2d.dimensionality().to_string(), "2D");
    }

    #[test]
    fn test_dof_formulas() {
        assert_eq!(Method::Gmc2d.dof(1, 2, 2), 4);
        assert_eq!(Method::Gmc3d.dof(2, 2, 2), 4 + 8 + 6);
        assert_eq!(Method::Hfgmc2d.dof(1, 2, 3), 36 + 15);
        assert_eq!(Method::Hfgmc3d.dof(2, 2, 2), 72 + 36);
        assert_eq!(Method::Mt2.dof(1, 2, 1), 12);
    }

    #[test]
    fn test_grid_layouts() {
        let planar = Grid::filled(4, 2, 3, Layout::Planar, 0);
        assert_eq!(planar.na(), 1);
        assert_eq!(planar.index(0, 1, 2), 5);

        let mut volume = Grid::filled(4, 1, 2, Layout::Volumetric, 7);
        assert_eq!(volume.len(), 8);
        assert_eq!(volume.index(3, 0, 1), 7);
        volume.set(2, 0, 0, -11);
        assert_eq!(volume.cells()[2], -11);
        assert_eq!(volume.references(), vec![-11]);
        assert_eq!(volume.count(7), 7);
    }

    #[test]
    fn test_insert_replaces_same_msm() {
        let mut rucs = RucCollection::new();
        let a = rucs.insert(planar_ruc(0, 1, 1, &[1]));
        let b = rucs.insert(planar_ruc(-17, 1, 1, &[2]));
        let again = rucs.insert(planar_ruc(-17, 1, 1, &[3]));
        assert_eq!(b, again);
        assert_ne!(a, b);
        assert_eq!(rucs.len(), 2);
        assert_eq!(rucs.by_msm(-17).unwrap().grid.cells(), &[3]);
        assert_eq!(rucs.top().unwrap().msm, 0);
    }

    #[test]
    fn test_renumber_and_back() {
        let mut rucs = RucCollection::new();
        rucs.insert(planar_ruc(0, 1, 2, &[1, -17]));
        rucs.insert(planar_ruc(-17, 1, 2, &[1, 2]));
        let map = MaterialMap::from_rucs(2, &rucs);

        let indexed = rucs.renumber(&map).unwrap();
        assert_eq!(indexed.top().unwrap().grid.cells(), &[1, 0]);
        assert_eq!(indexed.by_msm(-17).unwrap().grid.cells(), &[1, 2]);

        let actual = indexed.to_actual(&map).unwrap();
        assert_eq!(actual.top().unwrap().grid.cells(), &[1, -17]);
    }
}
