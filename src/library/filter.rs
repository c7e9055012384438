//! Live text filter over the library index.
//!
//! The view never owns nodes. It keeps, per visible parent, the ordered list
//! of visible child ids, and re-derives that mapping from the index whenever
//! the pattern or the tree changes.

use std::collections::{HashMap, HashSet};

use super::index::LibraryIndex;
use super::node::NodeId;

/// What the caller should do after a pattern change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterChange {
    /// The result set narrowed enough that sorting again and collapsing the
    /// tree is cheap and avoids a stale partial expansion.
    pub resort_and_collapse: bool,
}

#[derive(Debug, Default)]
pub struct FilterView {
    pattern: String,
    needle: String,
    visible_children: HashMap<Option<NodeId>, Vec<NodeId>>,
    visible: HashSet<NodeId>,
}

impl FilterView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_active(&self) -> bool {
        !self.needle.is_empty()
    }

    /// Applies a case-insensitive literal substring filter. An empty pattern
    /// shows the whole tree.
    pub fn set_filter(&mut self, pattern: &str, index: &LibraryIndex) -> FilterChange {
        self.pattern = pattern.to_string();
        let needle = pattern.to_lowercase();
        let previous = std::mem::replace(&mut self.needle, needle);
        self.invalidate(index);

        let narrowed = self.needle.chars().count() > 1
            && self.needle.len() > previous.len()
            && self.needle.starts_with(previous.as_str());
        FilterChange {
            resort_and_collapse: pattern.is_empty() || narrowed,
        }
    }

    /// Re-derives the visible mapping after the index changed.
    pub fn invalidate(&mut self, index: &LibraryIndex) {
        self.visible_children.clear();
        self.visible.clear();
        let mut roots = Vec::new();
        for letter in index.children(None) {
            if self.visit(index, *letter, false) {
                roots.push(*letter);
            }
        }
        self.visible_children.insert(None, roots);
    }

    fn matches(&self, text: &str) -> bool {
        self.needle.is_empty() || text.to_lowercase().contains(&self.needle)
    }

    /// Returns whether `id` is visible, recording its visible children.
    fn visit(&mut self, index: &LibraryIndex, id: NodeId, ancestor_matches: bool) -> bool {
        let Some(node) = index.node(id) else {
            return false;
        };
        // A letter's own text never makes its subtree visible.
        let self_matches = !node.is_letter() && self.matches(node.display_text());
        let inherited = ancestor_matches || self_matches;

        let mut shown = Vec::new();
        for child in node.children() {
            if self.visit(index, *child, inherited) {
                shown.push(*child);
            }
        }

        let visible = inherited || !shown.is_empty();
        if visible {
            self.visible.insert(id);
            self.visible_children.insert(Some(id), shown);
        }
        visible
    }

    pub fn is_visible(&self, id: NodeId) -> bool {
        self.visible.contains(&id)
    }

    pub fn visible_count(&self) -> usize {
        self.visible.len()
    }

    /// Visible children of `parent` (`None` for the top level), in index order.
    pub fn children(&self, parent: Option<NodeId>) -> &[NodeId] {
        self.visible_children
            .get(&parent)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn row_count(&self, parent: Option<NodeId>) -> usize {
        self.children(parent).len()
    }

    /// Translates a view row path into the source node it shows.
    pub fn map_to_source(&self, view_address: &[usize]) -> Option<NodeId> {
        let mut parent = None;
        for row in view_address {
            parent = Some(*self.children(parent).get(*row)?);
        }
        parent
    }

    /// Translates a source node into its view row path, if it is visible.
    pub fn map_from_source(&self, index: &LibraryIndex, id: NodeId) -> Option<Vec<usize>> {
        if !self.is_visible(id) {
            return None;
        }
        let mut chain = index.ancestors(id);
        chain.reverse();
        chain.push(id);

        let mut address = Vec::with_capacity(chain.len());
        let mut parent = None;
        for node in chain {
            let row = self.children(parent).iter().position(|child| *child == node)?;
            address.push(row);
            parent = Some(node);
        }
        Some(address)
    }
}
