//! Parent-Pointer Walks
//!
//! Pure functions over an `id -> parent_id` map. Every walk tracks visited ids,
//! so a corrupt cycle already present in storage terminates instead of
//! looping. Nothing here touches the database.

use std::collections::{HashMap, HashSet};

/// `id -> parent_id` for every category
pub type ParentMap = HashMap<String, Option<String>>;

/// `parent_id -> child ids`, children in insertion order
pub type ChildrenMap = HashMap<String, Vec<String>>;

/// Invert a parent map
///
/// Child lists are sorted by id so results are deterministic regardless of
/// map iteration order.
pub fn children_map(parents: &ParentMap) -> ChildrenMap {
    let mut children: ChildrenMap = HashMap::new();
    for (id, parent) in parents {
        if let Some(parent) = parent {
            children.entry(parent.clone()).or_default().push(id.clone());
        }
    }
    for ids in children.values_mut() {
        ids.sort();
    }
    children
}

/// `root` followed by every id reachable below it, each at most once
///
/// Explicit-stack pre-order walk; a node seen twice is skipped.
pub fn collect_descendants(children: &ChildrenMap, root: &str) -> Vec<String> {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut out = Vec::new();
    let mut stack = vec![root];

    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        out.push(id.to_string());
        if let Some(kids) = children.get(id) {
            // Reverse so the first child is visited first
            for kid in kids.iter().rev() {
                if !visited.contains(kid.as_str()) {
                    stack.push(kid.as_str());
                }
            }
        }
    }

    out
}

/// Ancestors of `id`, nearest first
///
/// Stops at a root, at a dangling parent id, or when the chain revisits an id.
pub fn ancestors(parents: &ParentMap, id: &str) -> Vec<String> {
    let mut visited: HashSet<&str> = HashSet::new();
    visited.insert(id);
    let mut chain = Vec::new();
    let mut current = id;

    while let Some(Some(parent)) = parents.get(current) {
        if !visited.insert(parent.as_str()) {
            break;
        }
        chain.push(parent.clone());
        current = parent.as_str();
    }

    chain
}

/// Would pointing `category_id` at `new_parent_id` close a loop?
///
/// Walks upward from the proposed parent. Reaching `category_id` means the
/// proposed parent is the category itself or one of its descendants.
pub fn would_create_cycle(parents: &ParentMap, category_id: &str, new_parent_id: &str) -> bool {
    if category_id == new_parent_id {
        return true;
    }
    ancestors(parents, new_parent_id)
        .iter()
        .any(|ancestor| ancestor == category_id)
}

/// Ids that sit on a parent cycle, sorted
///
/// A category whose chain loops back without reaching a root is part of (or
/// hangs below) a cycle; only the ids on the loop itself are returned.
pub fn find_cycle_members(parents: &ParentMap) -> Vec<String> {
    let mut on_cycle: HashSet<String> = HashSet::new();
    let mut settled: HashSet<&str> = HashSet::new();

    let mut ids: Vec<&String> = parents.keys().collect();
    ids.sort();

    for start in ids {
        if settled.contains(start.as_str()) {
            continue;
        }

        let mut path: Vec<&str> = Vec::new();
        let mut position: HashMap<&str, usize> = HashMap::new();
        let mut current = start.as_str();

        loop {
            if settled.contains(current) {
                break;
            }
            if let Some(&index) = position.get(current) {
                on_cycle.extend(path[index..].iter().map(|id| id.to_string()));
                break;
            }
            position.insert(current, path.len());
            path.push(current);

            match parents.get(current) {
                Some(Some(parent)) => current = parent.as_str(),
                _ => break,
            }
        }

        settled.extend(path);
    }

    let mut members: Vec<String> = on_cycle.into_iter().collect();
    members.sort();
    members
}
