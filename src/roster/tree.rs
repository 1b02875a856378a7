// Roster tree: groups -> contacts -> resources.
//
// Nodes live in an arena and are addressed by NodeId handles. Every public
// mutation applies one complete edit and queues the TreeChange values that
// describe it, so a view draining take_changes() never sees half an edit.

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};
use std::ops::{Index, IndexMut};

use log::{debug, info};

use crate::address::Address;
use crate::models::{Presence, RosterEntry, Subscription};
use crate::presence::PresenceStore;

/// Label of the implicit group holding entries without any group.
pub const UNGROUPED_LABEL: &str = "Ungrouped";

// Unread source key used for messages sent from the bare address
const BARE_SOURCE: &str = "";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Root,
    Group,
    Contact,
    Resource,
}

#[derive(Debug, Clone)]
pub struct GroupData {
    /// `None` is the implicit ungrouped group
    pub name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ContactData {
    pub address: Address,
    pub name: Option<String>,
    pub subscription: Subscription,
    pub ask: bool,
    pub online: bool,
}

impl ContactData {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| self.address.bare_str())
    }
}

#[derive(Debug, Clone)]
pub struct ResourceData {
    pub address: Address,
    /// Empty for presence sent from the bare address
    pub resource: String,
    pub presence: Presence,
}

#[derive(Debug, Clone)]
pub enum NodeData {
    Root,
    Group(GroupData),
    Contact(ContactData),
    Resource(ResourceData),
}

#[derive(Debug, Clone)]
pub struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    hidden: bool,
}

impl Node {
    pub fn data(&self) -> &NodeData {
        &self.data
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn kind(&self) -> NodeKind {
        match self.data {
            NodeData::Root => NodeKind::Root,
            NodeData::Group(_) => NodeKind::Group,
            NodeData::Contact(_) => NodeKind::Contact,
            NodeData::Resource(_) => NodeKind::Resource,
        }
    }

    pub fn as_contact(&self) -> Option<&ContactData> {
        match &self.data {
            NodeData::Contact(contact) => Some(contact),
            _ => None,
        }
    }

    pub fn as_resource(&self) -> Option<&ResourceData> {
        match &self.data {
            NodeData::Resource(resource) => Some(resource),
            _ => None,
        }
    }
}

/// Structural and display changes, in the order they were applied.
/// Row ranges are inclusive and refer to the parent's children at the time
/// of the change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeChange {
    NodesInserted { parent: NodeId, first: usize, last: usize },
    NodesRemoved { parent: NodeId, first: usize, last: usize },
    NodeChanged { node: NodeId },
    VisibilityChanged { node: NodeId, hidden: bool },
    ChildrenReordered { parent: NodeId },
}

/// What a view needs to draw one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDisplay {
    pub kind: NodeKind,
    pub label: String,
    pub status: Option<String>,
    pub unread: bool,
    pub online: bool,
    pub hidden: bool,
}

#[derive(Debug)]
pub struct RosterTree {
    nodes: Vec<Option<Node>>,
    free: Vec<usize>,
    root: NodeId,
    hide_offline: bool,
    contacts_by_bare: HashMap<String, Vec<NodeId>>,
    // Unread sources per bare address. Kept across clear() and node
    // rebuilds, so a contact's nodes always agree on the badge.
    unread: HashMap<String, BTreeSet<String>>,
    changes: Vec<TreeChange>,
}

impl Default for RosterTree {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<NodeId> for RosterTree {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        match &self.nodes[id.0] {
            Some(node) => node,
            None => panic!("stale node id {:?}", id),
        }
    }
}

impl IndexMut<NodeId> for RosterTree {
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        match &mut self.nodes[id.0] {
            Some(node) => node,
            None => panic!("stale node id {:?}", id),
        }
    }
}

fn group_names(entry: &RosterEntry) -> Vec<Option<String>> {
    let mut names: Vec<Option<String>> = Vec::new();
    for group in entry.groups.iter().map(|g| g.trim()).filter(|g| !g.is_empty()) {
        let group = Some(group.to_string());
        if !names.contains(&group) {
            names.push(group);
        }
    }
    if names.is_empty() {
        names.push(None);
    }
    names
}

fn group_key(name: Option<&str>) -> (bool, String, String) {
    match name {
        Some(name) => (false, name.to_lowercase(), name.to_string()),
        None => (true, String::new(), String::new()),
    }
}

impl RosterTree {
    pub fn new() -> Self {
        let root = Node {
            data: NodeData::Root,
            parent: None,
            children: Vec::new(),
            hidden: false,
        };
        Self {
            nodes: vec![Some(root)],
            free: Vec::new(),
            root: NodeId(0),
            hide_offline: false,
            contacts_by_bare: HashMap::new(),
            unread: HashMap::new(),
            changes: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Look up a node; `None` for handles whose node has been removed.
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(|slot| slot.as_ref())
    }

    pub fn groups(&self) -> &[NodeId] {
        &self[self.root].children
    }

    pub fn hide_offline(&self) -> bool {
        self.hide_offline
    }

    /// Every Contact node for a bare address, one per group it is in.
    pub fn contact_nodes(&self, bare: &str) -> &[NodeId] {
        self.contacts_by_bare
            .get(bare)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn find_group(&self, name: Option<&str>) -> Option<NodeId> {
        self[self.root].children.iter().copied().find(|&g| {
            matches!(&self[g].data, NodeData::Group(data) if data.name.as_deref() == name)
        })
    }

    pub fn take_changes(&mut self) -> Vec<TreeChange> {
        std::mem::take(&mut self.changes)
    }

    /// Replace the whole tree with a freshly received roster.
    pub fn load_roster(&mut self, entries: &[RosterEntry], presence: &PresenceStore) {
        self.clear();
        let mark = self.changes.len();

        let mut contacts = 0;
        for entry in entries.iter().filter(|e| e.subscription != Subscription::Remove) {
            for group_name in group_names(entry) {
                let group = self.find_or_create_group(group_name.as_deref());
                if self.contact_in_group(group, entry.address.bare_str()).is_some() {
                    debug!("Duplicate roster entry for {} in one group", entry.address);
                    continue;
                }
                let contact = self.create_contact(entry, group, presence);
                self[group].children.push(contact);
                contacts += 1;
            }
        }

        for group in self[self.root].children.clone() {
            self.sort_group(group);
            self.refresh_visibility(group);
        }

        // The insertion below covers everything built above
        self.changes.truncate(mark);
        let groups = self[self.root].children.len();
        if groups > 0 {
            self.changes.push(TreeChange::NodesInserted {
                parent: self.root,
                first: 0,
                last: groups - 1,
            });
        }
        info!("Roster loaded: {} groups, {} contact nodes", groups, contacts);
    }

    /// Add or update a single roster entry (roster push).
    pub fn upsert_entry(&mut self, entry: &RosterEntry, presence: &PresenceStore) {
        if entry.subscription == Subscription::Remove {
            self.remove_entry(entry.address.bare_str());
            return;
        }

        let bare = entry.address.bare_str();
        let wanted = group_names(entry);
        let mut touched = Vec::new();

        for contact in self.contact_nodes(bare).to_vec() {
            let Some(group) = self[contact].parent else {
                continue;
            };
            if wanted.contains(&self.group_name(group)) {
                if let NodeData::Contact(data) = &mut self[contact].data {
                    data.name = entry.name.clone();
                    data.subscription = entry.subscription;
                    data.ask = entry.ask;
                }
                self.changes.push(TreeChange::NodeChanged { node: contact });
                touched.push(group);
            } else {
                self.remove_child(group, contact);
                if !self.remove_group_if_empty(group) {
                    touched.push(group);
                }
            }
        }

        for group_name in &wanted {
            let group = self.find_or_create_group_notify(group_name.as_deref());
            if self.contact_in_group(group, bare).is_some() {
                continue;
            }
            let contact = self.create_contact(entry, group, presence);
            self.insert_contact_sorted(group, contact);
            touched.push(group);
        }

        touched.sort();
        touched.dedup();
        for group in touched {
            self.sort_group(group);
            self.changes.push(TreeChange::NodeChanged { node: group });
            self.refresh_visibility(group);
        }
        debug!("Roster entry for {} updated", bare);
    }

    /// Remove every Contact node for a bare address. Returns false when
    /// the address was not in the tree.
    pub fn remove_entry(&mut self, bare: &str) -> bool {
        let contacts = self.contact_nodes(bare).to_vec();
        if contacts.is_empty() {
            return false;
        }

        for contact in contacts {
            let Some(group) = self[contact].parent else {
                continue;
            };
            self.remove_child(group, contact);
            if !self.remove_group_if_empty(group) {
                self.changes.push(TreeChange::NodeChanged { node: group });
                self.refresh_visibility(group);
            }
        }
        info!("Removed {} from roster", bare);
        true
    }

    /// Drop everything below the root. Unread sources are kept and show
    /// again on the nodes of the next roster.
    pub fn clear(&mut self) {
        let root = self.root;
        let groups = std::mem::take(&mut self[root].children);
        if groups.is_empty() {
            return;
        }
        self.changes.push(TreeChange::NodesRemoved {
            parent: root,
            first: 0,
            last: groups.len() - 1,
        });
        for group in groups {
            self.release(group);
        }
        self.contacts_by_bare.clear();
    }

    /// Mirror a presence change onto every Contact node of the sender.
    /// Returns false when the sender is not in the roster.
    pub fn apply_presence(&mut self, from: &Address, presence: &Presence) -> bool {
        let contacts = self.contact_nodes(from.bare_str()).to_vec();
        if contacts.is_empty() {
            debug!("Dropping presence from {}: not in roster", from);
            return false;
        }

        let resource = from.resource().unwrap_or("");
        let mut groups = Vec::new();
        for contact in contacts {
            if presence.availability.is_online() {
                self.upsert_resource(contact, from, resource, presence);
            } else if from.is_bare() {
                self.remove_all_resources(contact);
            } else {
                self.remove_resource(contact, resource);
            }
            self.refresh_contact_status(contact);

            if let Some(group) = self[contact].parent {
                if !groups.contains(&group) {
                    groups.push(group);
                }
            }
        }

        // Only the groups holding this contact get re-sorted
        for group in groups {
            self.sort_group(group);
            self.changes.push(TreeChange::NodeChanged { node: group });
            self.refresh_visibility(group);
        }
        true
    }

    pub fn set_hide_offline(&mut self, hide: bool) {
        if self.hide_offline == hide {
            return;
        }
        self.hide_offline = hide;
        info!("Hide offline contacts: {}", hide);
        for group in self[self.root].children.clone() {
            self.refresh_visibility(group);
        }
    }

    /// Raise the unread badge of a contact. `resource` is the sending
    /// session, `None` for messages from the bare address. The source is
    /// recorded even for addresses not in the roster; the return value says
    /// whether any node showed it.
    pub fn mark_unread(&mut self, bare: &str, resource: Option<&str>) -> bool {
        let source = resource.unwrap_or(BARE_SOURCE).to_string();
        self.update_unread(bare, |unread| {
            unread.insert(source.clone());
        })
    }

    /// Clear unread state. Without a resource the whole contact is cleared,
    /// with one only that resource and bare-address messages are.
    pub fn mark_read(&mut self, bare: &str, resource: Option<&str>) -> bool {
        self.update_unread(bare, |unread| match resource {
            None => unread.clear(),
            Some(resource) => {
                unread.remove(resource);
                unread.remove(BARE_SOURCE);
            }
        })
    }

    fn update_unread<F>(&mut self, bare: &str, mut edit: F) -> bool
    where
        F: FnMut(&mut BTreeSet<String>),
    {
        let sources = self.unread.entry(bare.to_string()).or_default();
        let before = !sources.is_empty();
        edit(sources);
        let after = !sources.is_empty();
        if !after {
            self.unread.remove(bare);
        }

        let contacts = self.contact_nodes(bare).to_vec();
        if contacts.is_empty() {
            debug!("No contact node for {}, unread source kept for later", bare);
            return false;
        }
        if before != after {
            for contact in contacts {
                self.changes.push(TreeChange::NodeChanged { node: contact });
            }
        }
        true
    }

    /// Whether a bare address has messages nobody has read yet.
    pub fn has_unread(&self, bare: &str) -> bool {
        self.unread.contains_key(bare)
    }

    fn contact_has_unread(&self, contact: &ContactData) -> bool {
        self.has_unread(contact.address.bare_str())
    }

    /// Address a double-click on this node would open a conversation with.
    pub fn address_at(&self, id: NodeId) -> Option<Address> {
        match &self.get(id)?.data {
            NodeData::Contact(contact) => Some(contact.address.clone()),
            NodeData::Resource(resource) => Some(resource.address.clone()),
            _ => None,
        }
    }

    pub fn display(&self, id: NodeId) -> Option<NodeDisplay> {
        let node = self.get(id)?;
        let display = match &node.data {
            NodeData::Root => NodeDisplay {
                kind: NodeKind::Root,
                label: String::new(),
                status: None,
                unread: false,
                online: true,
                hidden: false,
            },
            NodeData::Group(group) => {
                let online = node
                    .children
                    .iter()
                    .filter(|&&c| self[c].as_contact().map_or(false, |d| d.online))
                    .count();
                let name = group.name.as_deref().unwrap_or(UNGROUPED_LABEL);
                NodeDisplay {
                    kind: NodeKind::Group,
                    label: format!("{} ({}/{})", name, online, node.children.len()),
                    status: None,
                    unread: node
                        .children
                        .iter()
                        .any(|&c| self[c].as_contact().map_or(false, |d| self.contact_has_unread(d))),
                    online: online > 0,
                    hidden: node.hidden,
                }
            }
            NodeData::Contact(contact) => NodeDisplay {
                kind: NodeKind::Contact,
                label: contact.display_name().to_string(),
                status: Some(self.contact_status(node, contact)),
                unread: self.contact_has_unread(contact),
                online: contact.online,
                hidden: node.hidden,
            },
            NodeData::Resource(resource) => NodeDisplay {
                kind: NodeKind::Resource,
                label: if resource.resource.is_empty() {
                    "(bare)".to_string()
                } else {
                    resource.resource.clone()
                },
                status: Some(resource.presence.status_text()),
                unread: false,
                online: true,
                hidden: node.hidden,
            },
        };
        Some(display)
    }

    fn contact_status(&self, node: &Node, contact: &ContactData) -> String {
        // The highest-priority session speaks for the contact
        let best = node
            .children
            .iter()
            .filter_map(|&r| self[r].as_resource())
            .max_by_key(|r| r.presence.priority);
        match best {
            Some(resource) => resource.presence.status_text(),
            None if contact.ask => "Subscription pending".to_string(),
            None => "Offline".to_string(),
        }
    }

    fn group_name(&self, group: NodeId) -> Option<String> {
        match &self[group].data {
            NodeData::Group(data) => data.name.clone(),
            _ => None,
        }
    }

    fn contact_in_group(&self, group: NodeId, bare: &str) -> Option<NodeId> {
        self[group]
            .children
            .iter()
            .copied()
            .find(|&c| self[c].as_contact().map_or(false, |d| d.address.bare_str() == bare))
    }

    fn alloc(&mut self, data: NodeData, parent: NodeId) -> NodeId {
        let node = Node {
            data,
            parent: Some(parent),
            children: Vec::new(),
            hidden: false,
        };
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                NodeId(slot)
            }
            None => {
                self.nodes.push(Some(node));
                NodeId(self.nodes.len() - 1)
            }
        }
    }

    // Frees a detached subtree. Children are unlinked before their parent goes.
    fn release(&mut self, id: NodeId) {
        let children = std::mem::take(&mut self[id].children);
        for child in children {
            self[child].parent = None;
            self.release(child);
        }

        let bare = self[id].as_contact().map(|c| c.address.bare_str().to_string());
        if let Some(bare) = bare {
            if let Some(ids) = self.contacts_by_bare.get_mut(&bare) {
                ids.retain(|&c| c != id);
                if ids.is_empty() {
                    self.contacts_by_bare.remove(&bare);
                }
            }
        }

        self.nodes[id.0] = None;
        self.free.push(id.0);
    }

    fn remove_child(&mut self, parent: NodeId, child: NodeId) {
        if let Some(pos) = self[parent].children.iter().position(|&c| c == child) {
            self[parent].children.remove(pos);
            self.changes.push(TreeChange::NodesRemoved {
                parent,
                first: pos,
                last: pos,
            });
            self.release(child);
        }
    }

    fn remove_group_if_empty(&mut self, group: NodeId) -> bool {
        if !self[group].children.is_empty() {
            return false;
        }
        let root = self.root;
        self.remove_child(root, group);
        true
    }

    fn find_or_create_group(&mut self, name: Option<&str>) -> NodeId {
        if let Some(group) = self.find_group(name) {
            return group;
        }
        let root = self.root;
        let group = self.alloc(
            NodeData::Group(GroupData {
                name: name.map(str::to_string),
            }),
            root,
        );
        let key = group_key(name);
        let pos = self[root]
            .children
            .iter()
            .position(|&g| group_key(self.group_name(g).as_deref()) > key)
            .unwrap_or(self[root].children.len());
        self[root].children.insert(pos, group);
        group
    }

    fn find_or_create_group_notify(&mut self, name: Option<&str>) -> NodeId {
        if let Some(group) = self.find_group(name) {
            return group;
        }
        let group = self.find_or_create_group(name);
        let root = self.root;
        if let Some(pos) = self[root].children.iter().position(|&g| g == group) {
            self.changes.push(TreeChange::NodesInserted {
                parent: root,
                first: pos,
                last: pos,
            });
        }
        group
    }

    // Builds a Contact node with its current resources; the caller links it
    // into the group's children.
    fn create_contact(&mut self, entry: &RosterEntry, group: NodeId, presence: &PresenceStore) -> NodeId {
        let address = entry.address.to_bare();
        let contact = self.alloc(
            NodeData::Contact(ContactData {
                address: address.clone(),
                name: entry.name.clone(),
                subscription: entry.subscription,
                ask: entry.ask,
                online: false,
            }),
            group,
        );
        self.contacts_by_bare
            .entry(address.bare_str().to_string())
            .or_default()
            .push(contact);

        for (resource, p) in presence.presences_for(address.bare_str()) {
            let id = self.alloc(
                NodeData::Resource(ResourceData {
                    address: address.with_resource(&resource),
                    resource,
                    presence: p,
                }),
                contact,
            );
            self[contact].children.push(id);
        }
        self.sort_resources_quiet(contact);
        let online = !self[contact].children.is_empty();
        if let NodeData::Contact(data) = &mut self[contact].data {
            data.online = online;
        }
        contact
    }

    fn contact_key(&self, id: NodeId) -> (bool, String, String) {
        match self[id].as_contact() {
            Some(c) => (!c.online, c.display_name().to_lowercase(), c.address.bare_str().to_string()),
            None => (true, String::new(), String::new()),
        }
    }

    fn resource_key(&self, id: NodeId) -> (Reverse<i8>, String) {
        match self[id].as_resource() {
            Some(r) => (Reverse(r.presence.priority), r.resource.clone()),
            None => (Reverse(i8::MIN), String::new()),
        }
    }

    fn insert_contact_sorted(&mut self, group: NodeId, contact: NodeId) {
        let key = self.contact_key(contact);
        let pos = self[group]
            .children
            .iter()
            .position(|&c| self.contact_key(c) > key)
            .unwrap_or(self[group].children.len());
        self[group].children.insert(pos, contact);
        self.changes.push(TreeChange::NodesInserted {
            parent: group,
            first: pos,
            last: pos,
        });
    }

    fn sort_group(&mut self, group: NodeId) {
        let mut keyed: Vec<_> = self[group]
            .children
            .iter()
            .map(|&c| (self.contact_key(c), c))
            .collect();
        keyed.sort();
        let sorted: Vec<NodeId> = keyed.into_iter().map(|(_, c)| c).collect();
        if sorted != self[group].children {
            self[group].children = sorted;
            self.changes.push(TreeChange::ChildrenReordered { parent: group });
        }
    }

    fn sort_resources_quiet(&mut self, contact: NodeId) -> bool {
        let mut keyed: Vec<_> = self[contact]
            .children
            .iter()
            .map(|&r| (self.resource_key(r), r))
            .collect();
        keyed.sort();
        let sorted: Vec<NodeId> = keyed.into_iter().map(|(_, r)| r).collect();
        if sorted == self[contact].children {
            return false;
        }
        self[contact].children = sorted;
        true
    }

    fn upsert_resource(&mut self, contact: NodeId, from: &Address, resource: &str, presence: &Presence) {
        let existing = self[contact]
            .children
            .iter()
            .copied()
            .find(|&r| self[r].as_resource().map_or(false, |d| d.resource == resource));

        match existing {
            Some(id) => {
                if let NodeData::Resource(data) = &mut self[id].data {
                    data.presence = presence.clone();
                }
                self.changes.push(TreeChange::NodeChanged { node: id });
                if self.sort_resources_quiet(contact) {
                    self.changes.push(TreeChange::ChildrenReordered { parent: contact });
                }
            }
            None => {
                let id = self.alloc(
                    NodeData::Resource(ResourceData {
                        address: from.clone(),
                        resource: resource.to_string(),
                        presence: presence.clone(),
                    }),
                    contact,
                );
                let key = self.resource_key(id);
                let pos = self[contact]
                    .children
                    .iter()
                    .position(|&r| self.resource_key(r) > key)
                    .unwrap_or(self[contact].children.len());
                self[contact].children.insert(pos, id);
                self.changes.push(TreeChange::NodesInserted {
                    parent: contact,
                    first: pos,
                    last: pos,
                });
            }
        }
    }

    fn remove_resource(&mut self, contact: NodeId, resource: &str) {
        let existing = self[contact]
            .children
            .iter()
            .copied()
            .find(|&r| self[r].as_resource().map_or(false, |d| d.resource == resource));
        if let Some(id) = existing {
            self.remove_child(contact, id);
        }
    }

    fn remove_all_resources(&mut self, contact: NodeId) {
        let resources = std::mem::take(&mut self[contact].children);
        if resources.is_empty() {
            return;
        }
        self.changes.push(TreeChange::NodesRemoved {
            parent: contact,
            first: 0,
            last: resources.len() - 1,
        });
        for id in resources {
            self.release(id);
        }
    }

    fn refresh_contact_status(&mut self, contact: NodeId) {
        let online = !self[contact].children.is_empty();
        if let NodeData::Contact(data) = &mut self[contact].data {
            data.online = online;
        }
        self.changes.push(TreeChange::NodeChanged { node: contact });
    }

    fn refresh_visibility(&mut self, group: NodeId) {
        let mut any_visible = false;
        for contact in self[group].children.clone() {
            let hidden = self.hide_offline && self[contact].children.is_empty();
            self.set_hidden(contact, hidden);
            any_visible |= !hidden;
        }
        let hidden = self.hide_offline && !any_visible;
        self.set_hidden(group, hidden);
    }

    fn set_hidden(&mut self, id: NodeId, hidden: bool) {
        if self[id].hidden != hidden {
            self[id].hidden = hidden;
            self.changes.push(TreeChange::VisibilityChanged { node: id, hidden });
        }
    }
}
