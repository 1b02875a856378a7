// Row/column style access to the roster tree for a view layer.
// Top-level rows are groups; a parent of `None` means the invisible root.

use crate::address::Address;

use super::tree::{NodeDisplay, NodeId, NodeKind, RosterTree};

pub struct RosterView<'a> {
    tree: &'a RosterTree,
}

impl<'a> RosterView<'a> {
    pub fn new(tree: &'a RosterTree) -> Self {
        Self { tree }
    }

    fn resolve(&self, parent: Option<NodeId>) -> NodeId {
        parent.unwrap_or_else(|| self.tree.root())
    }

    /// Handle of the `row`-th child of `parent`.
    pub fn index(&self, parent: Option<NodeId>, row: usize) -> Option<NodeId> {
        let parent = self.resolve(parent);
        self.tree.get(parent)?.children().get(row).copied()
    }

    /// Handle for a (group row, contact row) pair.
    pub fn contact_at(&self, group_row: usize, row: usize) -> Option<NodeId> {
        let group = self.index(None, group_row)?;
        self.index(Some(group), row)
    }

    pub fn row_count(&self, parent: Option<NodeId>) -> usize {
        let parent = self.resolve(parent);
        self.tree.get(parent).map_or(0, |node| node.children().len())
    }

    pub fn row_of(&self, node: NodeId) -> Option<usize> {
        let parent = self.tree.get(node)?.parent()?;
        self.tree.get(parent)?.children().iter().position(|&c| c == node)
    }

    /// Parent handle, `None` for top-level rows.
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.tree
            .get(node)?
            .parent()
            .filter(|&parent| parent != self.tree.root())
    }

    pub fn kind_at(&self, node: NodeId) -> Option<NodeKind> {
        self.tree.get(node).map(|n| n.kind())
    }

    pub fn address_at(&self, node: NodeId) -> Option<Address> {
        self.tree.address_at(node)
    }

    pub fn display(&self, node: NodeId) -> Option<NodeDisplay> {
        self.tree.display(node)
    }

    /// The visible part of the tree as indented text, unread rows starred.
    pub fn render_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        self.render_into(self.tree.root(), 0, &mut lines);
        lines
    }

    fn render_into(&self, parent: NodeId, depth: usize, lines: &mut Vec<String>) {
        let Some(node) = self.tree.get(parent) else {
            return;
        };
        for &child in node.children() {
            let Some(display) = self.tree.display(child) else {
                continue;
            };
            if display.hidden {
                continue;
            }
            let badge = if display.unread { "* " } else { "" };
            let line = match &display.status {
                Some(status) => format!("{}{}{} [{}]", "  ".repeat(depth), badge, display.label, status),
                None => format!("{}{}{}", "  ".repeat(depth), badge, display.label),
            };
            lines.push(line);
            self.render_into(child, depth + 1, lines);
        }
    }
}
