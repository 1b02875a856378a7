// Contact presentation model: the roster tree engine and its view adapter

pub mod tree;
pub mod view;

pub use tree::{
    ContactData, GroupData, Node, NodeData, NodeDisplay, NodeId, NodeKind, ResourceData, RosterTree,
    TreeChange, UNGROUPED_LABEL,
};
pub use view::RosterView;
