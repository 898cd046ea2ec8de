//! Menu tree shape rules shared by the coordinator and the stores.
//!
//! The coordinator checks a placement against a snapshot before writing; each
//! store repeats the check inside its own critical section so two concurrent
//! moves cannot close a cycle between them.
use super::MAX_MENU_DEPTH;
use std::collections::{HashMap, HashSet, VecDeque};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlacementError {
    #[error("menu {0}")]
    UnknownParent(u32),
    #[error("{0}")]
    Invalid(String),
}

/// Reject a parent that is missing, is `menu_id` or one of its descendants,
/// or would push any chain in the moved subtree past `MAX_MENU_DEPTH`.
///
/// `parents` maps every stored menu id to its parent. `menu_id` is `None` for
/// a menu being created.
pub fn check_placement(
    parents: &HashMap<u32, Option<u32>>,
    menu_id: Option<u32>,
    parent_id: Option<u32>,
) -> Result<(), PlacementError> {
    let mut depth = 0usize;
    if let Some(parent) = parent_id {
        if !parents.contains_key(&parent) {
            return Err(PlacementError::UnknownParent(parent));
        }
        let mut visited = HashSet::new();
        let mut cursor = Some(parent);
        while let Some(current) = cursor {
            if Some(current) == menu_id {
                return Err(PlacementError::Invalid(format!(
                    "menu {current} cannot be placed under its own descendant"
                )));
            }
            if !visited.insert(current) {
                return Err(PlacementError::Invalid(format!(
                    "menu tree already contains a cycle at menu {current}"
                )));
            }
            depth += 1;
            if depth > MAX_MENU_DEPTH {
                break;
            }
            cursor = parents.get(&current).copied().flatten();
        }
    }

    let height = match menu_id {
        Some(id) => subtree_height(parents, id),
        None => 1,
    };
    if depth + height > MAX_MENU_DEPTH {
        return Err(PlacementError::Invalid(format!(
            "menu tree would be {} levels deep; at most {MAX_MENU_DEPTH} are allowed",
            depth + height
        )));
    }
    Ok(())
}

/// Levels in the subtree rooted at `root`, itself included.
fn subtree_height(parents: &HashMap<u32, Option<u32>>, root: u32) -> usize {
    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    for (id, parent) in parents {
        if let Some(parent) = parent {
            children.entry(*parent).or_default().push(*id);
        }
    }
    let mut visited = HashSet::from([root]);
    let mut queue = VecDeque::from([(root, 1usize)]);
    let mut height = 1;
    while let Some((id, level)) = queue.pop_front() {
        height = height.max(level);
        for child in children.get(&id).into_iter().flatten() {
            if visited.insert(*child) {
                queue.push_back((*child, level + 1));
            }
        }
    }
    height
}
