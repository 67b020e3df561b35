//! Bijection between deck material numbers and dense indices.
//!
//! The map is built once per deck from the union of the constituent range
//! `1..=nmats` and every value of every RUC grid. Position in the sorted
//! union is the index; the inverse is a binary search over the same list,
//! so the two directions can never disagree.

use std::collections::BTreeSet;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::ruc::{Actual, Grid, RucCollection};

/// Sorted list of actual material numbers; position is the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialMap {
    actual: Vec<i64>,
}

impl MaterialMap {
    /// Build the map from a constituent count and a set of grids.
    pub fn build<'a>(constituent_count: usize, grids: impl IntoIterator<Item = &'a Grid>) -> Self {
        let mut all: BTreeSet<i64> = (1..=constituent_count as i64).collect();
        for grid in grids {
            all.extend(grid.cells().iter().copied());
        }
        Self {
            actual: all.into_iter().collect(),
        }
    }

    /// Build the map from every grid of a collection.
    pub fn from_rucs(constituent_count: usize, rucs: &RucCollection<Actual>) -> Self {
        Self::build(constituent_count, rucs.iter().map(|(_, r)| &r.grid))
    }

    /// Actual material number at `index`.
    pub fn actual(&self, index: usize) -> Option<i64> {
        self.actual.get(index).copied()
    }

    /// Index of an actual material number.
    pub fn index(&self, actual: i64) -> Option<usize> {
        self.actual.binary_search(&actual).ok()
    }

    /// `(index, actual)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, i64)> + '_ {
        self.actual.iter().copied().enumerate()
    }

    pub fn len(&self) -> usize {
        self.actual.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actual.is_empty()
    }
}

impl Serialize for MaterialMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.actual.len()))?;
        for (index, actual) in self.iter() {
            map.serialize_entry(&index, &actual)?;
        }
        map.end()
    }
}
