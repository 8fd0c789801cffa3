//! Nested-Set Builder
//!
//! Computes `(left, right, tree_id, depth)` for a whole forest from parent
//! pointers. The result is written in bulk by `TreeMaintenance::rebuild`; the
//! columns are never maintained per row, so they are only trustworthy while
//! the persisted dirty flag is clear.
//!
//! Roots are processed in (`display_order`, `name`) order and each gets a
//! fresh `tree_id` starting at 1. Within a tree the counter starts at 1, the
//! pre-order visit assigns `left` and the post-order visit assigns `right`.
//! The walk uses an explicit stack, so arbitrarily deep chains are fine.

use crate::db::CategoryLink;
use crate::models::TreeFields;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Minimal per-category input to the builder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNodeInput {
    pub id: String,
    pub parent_id: Option<String>,
    pub display_order: u32,
    pub name: String,
}

impl From<&CategoryLink> for TreeNodeInput {
    fn from(link: &CategoryLink) -> Self {
        Self {
            id: link.id.clone(),
            parent_id: link.parent_id.clone(),
            display_order: link.display_order,
            name: link.name.clone(),
        }
    }
}

/// Why a forest could not be indexed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeIndexError {
    #[error("Duplicate category id in input: {0}")]
    DuplicateId(String),

    #[error("Category {id} references missing parent {parent_id}")]
    DanglingParent { id: String, parent_id: String },

    /// Rows that no root reaches, which means a parent cycle
    #[error("Categories unreachable from any root (parent cycle): {}", ids.join(", "))]
    Unreachable { ids: Vec<String> },
}

/// Computed tree fields, in tree then pre-order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeIndex {
    pub entries: Vec<(String, TreeFields)>,
}

impl TreeIndex {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct trees in the forest
    pub fn tree_count(&self) -> usize {
        self.entries
            .iter()
            .map(|(_, fields)| fields.tree_id)
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn get(&self, id: &str) -> Option<&TreeFields> {
        self.entries
            .iter()
            .find(|(entry_id, _)| entry_id == id)
            .map(|(_, fields)| fields)
    }

    pub fn into_map(self) -> HashMap<String, TreeFields> {
        self.entries.into_iter().collect()
    }
}

/// `a` is a strict ancestor of `b`
pub fn is_ancestor(a: &TreeFields, b: &TreeFields) -> bool {
    a.is_ancestor_of(b)
}

/// `b` lies inside `a`'s interval, `a` itself included
pub fn contains(a: &TreeFields, b: &TreeFields) -> bool {
    a == b || a.is_ancestor_of(b)
}

enum Visit {
    Enter(usize, i64),
    Exit(usize),
}

fn sibling_order(nodes: &[TreeNodeInput], a: usize, b: usize) -> std::cmp::Ordering {
    let (a, b) = (&nodes[a], &nodes[b]);
    a.display_order
        .cmp(&b.display_order)
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.id.cmp(&b.id))
}

/// Build the nested-set encoding for every node in `nodes`
///
/// # Errors
///
/// Fails without producing partial output if ids repeat, a parent id is not
/// among the nodes, or any node cannot be reached from a root.
pub fn build_tree_index(nodes: &[TreeNodeInput]) -> Result<TreeIndex, TreeIndexError> {
    let mut position: HashMap<&str, usize> = HashMap::with_capacity(nodes.len());
    for (idx, node) in nodes.iter().enumerate() {
        if position.insert(node.id.as_str(), idx).is_some() {
            return Err(TreeIndexError::DuplicateId(node.id.clone()));
        }
    }

    let mut roots = Vec::new();
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (idx, node) in nodes.iter().enumerate() {
        match &node.parent_id {
            None => roots.push(idx),
            Some(parent_id) => match position.get(parent_id.as_str()) {
                Some(&parent_idx) => children[parent_idx].push(idx),
                None => {
                    return Err(TreeIndexError::DanglingParent {
                        id: node.id.clone(),
                        parent_id: parent_id.clone(),
                    })
                }
            },
        }
    }

    roots.sort_by(|&a, &b| sibling_order(nodes, a, b));
    for kids in children.iter_mut() {
        kids.sort_by(|&a, &b| sibling_order(nodes, a, b));
    }

    let mut fields = vec![TreeFields::default(); nodes.len()];
    let mut order = Vec::with_capacity(nodes.len());

    for (tree_number, &root) in roots.iter().enumerate() {
        let tree_id = tree_number as i64 + 1;
        let mut counter: i64 = 1;
        let mut stack = vec![Visit::Enter(root, 0)];

        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Enter(idx, depth) => {
                    fields[idx] = TreeFields {
                        left: counter,
                        right: 0,
                        tree_id,
                        depth,
                    };
                    counter += 1;
                    order.push(idx);

                    stack.push(Visit::Exit(idx));
                    for &kid in children[idx].iter().rev() {
                        stack.push(Visit::Enter(kid, depth + 1));
                    }
                }
                Visit::Exit(idx) => {
                    fields[idx].right = counter;
                    counter += 1;
                }
            }
        }
    }

    if order.len() != nodes.len() {
        let reached: HashSet<usize> = order.iter().copied().collect();
        let mut ids: Vec<String> = (0..nodes.len())
            .filter(|idx| !reached.contains(idx))
            .map(|idx| nodes[idx].id.clone())
            .collect();
        ids.sort();
        return Err(TreeIndexError::Unreachable { ids });
    }

    Ok(TreeIndex {
        entries: order
            .into_iter()
            .map(|idx| (nodes[idx].id.clone(), fields[idx]))
            .collect(),
    })
}
