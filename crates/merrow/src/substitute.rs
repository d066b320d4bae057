//! Staged replacement application.

use tracing::warn;

use crate::collect::DiagramInstance;
use crate::merge::Replacement;

/// Apply staged replacements to the tree, returning how many slots changed.
///
/// Each target is located in its recorded parent by node identity at
/// application time, never by a cached index: an earlier removal in the
/// same parent shifts later siblings and a cached index would go stale.
pub(crate) fn apply(staged: Vec<(&DiagramInstance, Replacement)>) -> usize {
    let mut applied = 0;
    for (instance, replacement) in staged {
        let Some(mut children) = instance.parent.children_mut() else {
            warn!(
                target_node = instance.node.label(),
                "replacement parent cannot hold children, skipping"
            );
            continue;
        };
        let Some(index) = children.iter().position(|child| *child == instance.node) else {
            warn!(
                target_node = instance.node.label(),
                "replacement target vanished from its parent, skipping"
            );
            continue;
        };
        match replacement {
            Replacement::Node(node) => children[index] = node,
            Replacement::Remove => {
                children.remove(index);
            }
        }
        applied += 1;
    }
    applied
}
