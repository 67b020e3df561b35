//! RUC hierarchies.
//!
//! The same collection is walked two ways:
//!
//! - **definition** trees recurse once per distinct RUC id a grid
//!   references, however many cells hold it;
//! - **result** trees recurse once per grid cell holding a reference, so
//!   every physical subvolume gets its own node and a running instance id.
//!
//! Both walks keep the ids on the current path and stop with
//! [`DeckError::CycleDetected`] when a RUC would contain itself.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use tracing::debug;

use crate::error::{DeckError, Result};
use crate::ruc::{Actual, Dimensionality, Ruc, RucCollection};

fn lookup(rucs: &RucCollection<Actual>, msm: i64, parent: i64) -> Result<&Ruc> {
    rucs.by_msm(msm)
        .ok_or(DeckError::UnresolvedReference { msm, parent })
}

fn enter(path: &mut Vec<i64>, msm: i64) -> Result<()> {
    if path.contains(&msm) {
        let mut cycle = path.clone();
        cycle.push(msm);
        return Err(DeckError::CycleDetected { msm, path: cycle });
    }
    path.push(msm);
    Ok(())
}

// ============ Definition tree ============

/// One RUC definition in the deduplicated tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DefinitionNode {
    /// Preorder position, root is 0
    pub item: usize,
    pub level: usize,
    pub dim: Dimensionality,
    pub msm: i64,
    pub n_subvol: usize,
    pub n_dof: usize,
    /// Cells of the parent grid holding this RUC (1 for the root)
    pub n_lower: usize,
    /// `item` of the parent node
    pub parent: Option<usize>,
    pub children: Vec<DefinitionNode>,
}

impl DefinitionNode {
    pub fn label(&self) -> String {
        format!("Level {} {} RUC - M={}", self.level, self.dim, self.msm)
    }

    /// Number of nodes in this subtree, including this one.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(Self::node_count).sum::<usize>()
    }

    pub fn display(&self) -> DisplayNode {
        DisplayNode::new(self.label(), self.children.iter().map(Self::display).collect())
    }
}

struct DefinitionWalk<'a> {
    rucs: &'a RucCollection<Actual>,
    next_item: usize,
    path: Vec<i64>,
}

impl DefinitionWalk<'_> {
    fn visit(
        &mut self,
        msm: i64,
        level: usize,
        parent: Option<(usize, i64)>,
        n_lower: usize,
    ) -> Result<DefinitionNode> {
        let ruc = lookup(self.rucs, msm, parent.map_or(msm, |(_, p)| p))?;
        enter(&mut self.path, msm)?;

        let item = self.next_item;
        self.next_item += 1;

        let mut children = Vec::new();
        for id in ruc.grid.references() {
            children.push(self.visit(id, level + 1, Some((item, msm)), ruc.grid.count(id))?);
        }
        self.path.pop();

        Ok(DefinitionNode {
            item,
            level,
            dim: ruc.dimensionality(),
            msm,
            n_subvol: ruc.n_subvol(),
            n_dof: ruc.n_dof(),
            n_lower,
            parent: parent.map(|(item, _)| item),
            children,
        })
    }
}

/// Build the deduplicated definition tree rooted at the top RUC.
pub fn definition_tree(rucs: &RucCollection<Actual>) -> Result<DefinitionNode> {
    let mut walk = DefinitionWalk {
        rucs,
        next_item: 0,
        path: Vec::new(),
    };
    let root = walk.visit(0, 1, None, 1)?;
    debug!(nodes = walk.next_item, "built definition hierarchy");
    Ok(root)
}

// ============ Result tree ============

/// Location of one RUC instance's data in a results archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ArchiveAddress {
    pub level: usize,
    pub ruc_instance: usize,
    pub material: i64,
    pub subvol: usize,
    pub parent_nb: usize,
    pub parent_ng: usize,
}

/// One instantiated RUC.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultNode {
    pub level: usize,
    pub dim: Dimensionality,
    /// Definition ordinal of the RUC in the deck
    pub deck_ruc: usize,
    /// Running instance id, root is 1
    pub ruc: usize,
    pub msm: i64,
    /// 1-based position of the cell in the parent, in ia, ib, ig order
    pub subvol: usize,
    pub ia: usize,
    pub ib: usize,
    pub ig: usize,
    pub parent_nb: usize,
    pub parent_ng: usize,
    pub children: Vec<ResultNode>,
}

impl ResultNode {
    pub fn label(&self) -> String {
        format!(
            "Level {} {} RUC ({}) - M={},SubVol.:{},RUCID:{}",
            self.level, self.dim, self.deck_ruc, self.msm, self.subvol, self.ruc
        )
    }

    pub fn address(&self) -> ArchiveAddress {
        ArchiveAddress {
            level: self.level,
            ruc_instance: self.ruc,
            material: self.msm,
            subvol: self.subvol,
            parent_nb: self.parent_nb,
            parent_ng: self.parent_ng,
        }
    }

    pub fn display(&self) -> DisplayNode {
        DisplayNode::new(self.label(), self.children.iter().map(Self::display).collect())
    }

    /// This node and its descendants in preorder.
    pub fn walk(&self) -> Vec<&ResultNode> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.walk());
        }
        out
    }
}

/// Instantiated hierarchy plus the instance count of the full walk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultTree {
    pub root: ResultNode,
    /// Instances counted, including those past `max_level`
    pub instance_count: usize,
    pub max_level: Option<usize>,
}

impl ResultTree {
    pub fn display(&self) -> DisplayNode {
        self.root.display()
    }

    /// Archive addresses of every linked node in preorder.
    pub fn addresses(&self) -> Vec<ArchiveAddress> {
        self.root.walk().into_iter().map(ResultNode::address).collect()
    }
}

struct ResultWalk<'a> {
    rucs: &'a RucCollection<Actual>,
    max_level: Option<usize>,
    instances: usize,
    path: Vec<i64>,
}

impl ResultWalk<'_> {
    fn links(&self, level: usize) -> bool {
        self.max_level.map_or(true, |max| level <= max)
    }

    fn visit(&mut self, mut node: ResultNode) -> Result<ResultNode> {
        let ruc = lookup(self.rucs, node.msm, node.msm)?;
        enter(&mut self.path, node.msm)?;

        let grid = &ruc.grid;
        let link = self.links(node.level + 1);
        let mut subvol = 0;
        for ia in 0..grid.na() {
            for ib in 0..grid.nb() {
                for ig in 0..grid.ng() {
                    subvol += 1;
                    let msm = grid.get(ia, ib, ig);
                    if msm >= 0 {
                        continue;
                    }
                    self.instances += 1;
                    let lower = lookup(self.rucs, msm, node.msm)?;
                    let child = self.visit(ResultNode {
                        level: node.level + 1,
                        dim: lower.dimensionality(),
                        deck_ruc: lower.deck_index,
                        ruc: self.instances,
                        msm,
                        subvol,
                        ia: ia + 1,
                        ib: ib + 1,
                        ig: ig + 1,
                        parent_nb: grid.nb(),
                        parent_ng: grid.ng(),
                        children: Vec::new(),
                    })?;
                    if link {
                        node.children.push(child);
                    }
                }
            }
        }

        self.path.pop();
        Ok(node)
    }
}

/// Build the instantiated result tree rooted at the top RUC.
///
/// Nodes deeper than `max_level` are counted but not linked. A
/// `max_level` of `Some(0)` means no cutoff.
pub fn result_tree(rucs: &RucCollection<Actual>, max_level: Option<usize>) -> Result<ResultTree> {
    let max_level = max_level.filter(|max| *max > 0);
    let top = lookup(rucs, 0, 0)?;
    let root = ResultNode {
        level: 1,
        dim: top.dimensionality(),
        deck_ruc: top.deck_index,
        ruc: 1,
        msm: 0,
        subvol: 1,
        ia: 1,
        ib: 1,
        ig: 1,
        parent_nb: 1,
        parent_ng: 1,
        children: Vec::new(),
    };

    let mut walk = ResultWalk {
        rucs,
        max_level,
        instances: 1,
        path: Vec::new(),
    };
    let root = walk.visit(root)?;
    debug!(instances = walk.instances, max_level = ?max_level, "built result hierarchy");

    Ok(ResultTree {
        root,
        instance_count: walk.instances,
        max_level,
    })
}

// ============ Display form ============

/// Label tree handed to user interfaces.
///
/// Serializes as a bare string for a leaf and as a one-entry map from
/// label to child list for a branch.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayNode {
    Leaf(String),
    Branch(String, Vec<DisplayNode>),
}

impl DisplayNode {
    fn new(label: String, children: Vec<DisplayNode>) -> Self {
        if children.is_empty() {
            Self::Leaf(label)
        } else {
            Self::Branch(label, children)
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Leaf(label) | Self::Branch(label, _) => label,
        }
    }
}

impl Serialize for DisplayNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Leaf(label) => serializer.serialize_str(label),
            Self::Branch(label, children) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(label, children)?;
                map.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ruc::tests::planar_ruc;

    /// Top grid `[-20, -20, 1, -21]`, -20 holds -21, -21 holds constituents.
    fn nested() -> RucCollection<Actual> {
        let mut rucs = RucCollection::new();
        rucs.insert(planar_ruc(0, 2, 2, &[-20, -20, 1, -21]));
        let mut mid = planar_ruc(-20, 1, 2, &[-21, 2]);
        mid.deck_index = 2;
        rucs.insert(mid);
        let mut low = planar_ruc(-21, 1, 2, &[1, 2]);
        low.deck_index = 3;
        rucs.insert(low);
        rucs
    }

    #[test]
    fn test_definition_tree_deduplicates_per_grid() {
        let tree = definition_tree(&nested()).unwrap();
        assert_eq!(tree.msm, 0);
        assert_eq!(tree.n_dof, 4);
        let ids: Vec<i64> = tree.children.iter().map(|c| c.msm).collect();
        assert_eq!(ids, vec![-21, -20]);
        assert_eq!(tree.children[0].n_lower, 1);
        assert_eq!(tree.children[1].n_lower, 2);
        assert_eq!(tree.children[1].children[0].msm, -21);
        assert_eq!(tree.children[1].children[0].parent, Some(2));
        // -21 appears once per path
        assert_eq!(tree.node_count(), 4);
    }

    #[test]
    fn test_result_tree_instantiates_every_cell() {
        let tree = result_tree(&nested(), None).unwrap();
        // root, 2 x (-20 + its -21), one -21
        assert_eq!(tree.instance_count, 6);
        let root = &tree.root;
        assert_eq!(root.children.len(), 3);

        let second = &root.children[1];
        assert_eq!((second.ia, second.ib, second.ig), (1, 1, 2));
        assert_eq!(second.subvol, 2);
        assert_eq!(second.ruc, 4);
        assert_eq!(second.parent_nb, 2);
        assert_eq!(second.children[0].ruc, 5);

        let last = &root.children[2];
        assert_eq!(last.subvol, 4);
        assert_eq!(last.deck_ruc, 3);
        assert_eq!(last.label(), "Level 2 2D RUC (3) - M=-21,SubVol.:4,RUCID:6");
    }

    #[test]
    fn test_cutoff_keeps_instance_count() {
        let full = result_tree(&nested(), None).unwrap();
        let cut = result_tree(&nested(), Some(2)).unwrap();
        assert_eq!(cut.instance_count, full.instance_count);
        assert!(cut.root.walk().iter().all(|n| n.level <= 2));
        assert_eq!(cut.root.children[2].ruc, 6);

        let unbounded = result_tree(&nested(), Some(0)).unwrap();
        assert_eq!(unbounded, full);
    }

    #[test]
    fn test_cycle_is_reported() {
        let mut rucs = RucCollection::new();
        rucs.insert(planar_ruc(0, 1, 1, &[-20]));
        rucs.insert(planar_ruc(-20, 1, 2, &[-21, 1]));
        rucs.insert(planar_ruc(-21, 1, 1, &[-20]));

        let err = definition_tree(&rucs).unwrap_err();
        match err {
            DeckError::CycleDetected { msm, path } => {
                assert_eq!(msm, -20);
                assert_eq!(path, vec![0, -20, -21, -20]);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(matches!(result_tree(&rucs, None), Err(DeckError::CycleDetected { .. })));
    }

    #[test]
    fn test_unresolved_reference() {
        let mut rucs = RucCollection::new();
        rucs.insert(planar_ruc(0, 1, 2, &[1, -30]));
        let err = definition_tree(&rucs).unwrap_err();
        assert!(matches!(err, DeckError::UnresolvedReference { msm: -30, parent: 0 }));
    }

    #[test]
    fn test_display_serialization() {
        let tree = definition_tree(&nested()).unwrap();
        let json = serde_json::to_value(tree.display()).unwrap();
        let children = &json["Level 1 2D RUC - M=0"];
        assert_eq!(children[0], "Level 2 2D RUC - M=-21");
        assert_eq!(children[1]["Level 2 2D RUC - M=-20"][0], "Level 3 2D RUC - M=-21");
    }

    #[test]
    fn test_archive_addresses() {
        let tree = result_tree(&nested(), None).unwrap();
        let addresses = tree.addresses();
        assert_eq!(addresses.len(), 6);
        assert_eq!(
            addresses[2],
            ArchiveAddress {
                level: 3,
                ruc_instance: 3,
                material: -21,
                subvol: 1,
                parent_nb: 1,
                parent_ng: 2,
            }
        );
    }
}
