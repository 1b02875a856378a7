// Roster tree tests
// Grouping, presence mirroring, hide-offline filtering, unread badges and
// the change notifications a view receives.

mod common;
use common::{addr, available, sample_roster, setup_logging, unavailable};

use parley::models::{RosterEntry, Subscription};
use parley::presence::PresenceStore;
use parley::roster::{NodeKind, RosterTree, RosterView, TreeChange};

fn loaded_tree() -> RosterTree {
    let mut tree = RosterTree::new();
    tree.load_roster(&sample_roster(), &PresenceStore::new());
    tree.take_changes();
    tree
}

fn resource_labels(tree: &RosterTree, bare: &str) -> Vec<Vec<String>> {
    tree.contact_nodes(bare)
        .iter()
        .map(|&contact| {
            tree[contact]
                .children()
                .iter()
                .map(|&r| tree[r].as_resource().unwrap().resource.clone())
                .collect()
        })
        .collect()
}

#[test]
fn test_presence_moves_contact_between_partitions() {
    setup_logging();
    println!("\n=== Testing presence-driven resort ===");

    let mut tree = loaded_tree();
    let view = RosterView::new(&tree);
    assert_eq!(
        view.render_lines(),
        vec![
            "Friends (0/2)",
            "  Alice [Offline]",
            "  Bob [Offline]",
            "Work (0/1)",
            "  Bob [Offline]",
            "Ungrouped (0/1)",
            "  Carol [Subscription pending]",
        ]
    );
    println!("✅ Roster grouped with the implicit group last");

    assert!(tree.apply_presence(&addr("bob@example.org/phone"), &available(0)));
    let friends = tree.find_group(Some("Friends")).unwrap();
    let changes = tree.take_changes();
    assert!(changes.contains(&TreeChange::ChildrenReordered { parent: friends }));
    for &bob in tree.contact_nodes("bob@example.org") {
        assert!(changes.contains(&TreeChange::NodesInserted { parent: bob, first: 0, last: 0 }));
    }

    let view = RosterView::new(&tree);
    assert_eq!(
        view.render_lines(),
        vec![
            "Friends (1/2)",
            "  Bob [Online]",
            "    phone [Online]",
            "  Alice [Offline]",
            "Work (1/1)",
            "  Bob [Online]",
            "    phone [Online]",
            "Ungrouped (0/1)",
            "  Carol [Subscription pending]",
        ]
    );
    println!("✅ Bob moved above offline contacts in every group");

    tree.apply_presence(&addr("bob@example.org/phone"), &unavailable());
    let view = RosterView::new(&tree);
    assert_eq!(view.render_lines()[1..3], ["  Alice [Offline]", "  Bob [Offline]"]);
    assert_eq!(resource_labels(&tree, "bob@example.org"), vec![Vec::<String>::new(), Vec::new()]);
    println!("✅ Bob returned to the offline partition");

    println!("=== Presence resort test completed ===\n");
}

#[test]
fn test_resources_match_online_set_in_any_order() {
    setup_logging();
    println!("\n=== Testing resource mirroring ===");

    let updates = vec![
        (addr("alice@example.org/phone"), available(0)),
        (addr("alice@example.org/desk"), available(0)),
        (addr("alice@example.org/tablet"), available(0)),
        (addr("alice@example.org/phone"), available(0)),
        (addr("alice@example.org/tablet"), unavailable()),
    ];

    let mut forward = loaded_tree();
    for (from, presence) in &updates {
        forward.apply_presence(from, presence);
    }

    // Same net effect, different order, with the duplicate first
    let mut shuffled = loaded_tree();
    for i in [3, 1, 2, 4, 0] {
        let (from, presence) = &updates[i];
        shuffled.apply_presence(from, presence);
    }

    let expected = vec![vec!["desk".to_string(), "phone".to_string()]];
    assert_eq!(resource_labels(&forward, "alice@example.org"), expected);
    assert_eq!(resource_labels(&shuffled, "alice@example.org"), expected);
    println!("✅ Resource children equal the online set, duplicates collapsed");

    // Unavailable from the bare address drops every session
    forward.apply_presence(&addr("alice@example.org"), &unavailable());
    assert_eq!(resource_labels(&forward, "alice@example.org"), vec![Vec::<String>::new()]);
    println!("✅ Bare unavailable cleared all resources");

    println!("=== Resource mirroring test completed ===\n");
}

#[test]
fn test_hide_offline_round_trip() {
    setup_logging();
    println!("\n=== Testing hide offline toggle ===");

    let mut tree = loaded_tree();
    tree.apply_presence(&addr("alice@example.org/phone"), &available(0));
    let before = RosterView::new(&tree).render_lines();

    tree.set_hide_offline(true);
    assert_eq!(
        RosterView::new(&tree).render_lines(),
        vec!["Friends (1/2)", "  Alice [Online]", "    phone [Online]"]
    );
    let work = tree.find_group(Some("Work")).unwrap();
    assert!(tree[work].is_hidden());
    assert!(tree
        .take_changes()
        .contains(&TreeChange::VisibilityChanged { node: work, hidden: true }));
    println!("✅ Offline contacts and empty groups hidden");

    // Coming online while filtered makes the contact and its group visible
    tree.apply_presence(&addr("bob@example.org/laptop"), &available(0));
    assert!(!tree[work].is_hidden());
    tree.apply_presence(&addr("bob@example.org/laptop"), &unavailable());
    assert!(tree[work].is_hidden());

    tree.set_hide_offline(false);
    assert_eq!(RosterView::new(&tree).render_lines(), before);
    println!("✅ Toggling twice restored the visible set");

    println!("=== Hide offline test completed ===\n");
}

#[test]
fn test_presence_before_roster_is_mirrored_on_load() {
    setup_logging();
    println!("\n=== Testing early presence ===");

    let mut presence = PresenceStore::new();
    presence.update(&addr("carol@example.org/home"), &available(3));

    let mut tree = RosterTree::new();
    // Presence for a contact not yet in the tree is dropped by the tree only
    assert!(!tree.apply_presence(&addr("carol@example.org/home"), &available(3)));
    tree.load_roster(&sample_roster(), &presence);

    let carol = tree.contact_nodes("carol@example.org")[0];
    let display = tree.display(carol).unwrap();
    assert!(display.online);
    assert_eq!(display.status.as_deref(), Some("Online"));
    assert_eq!(resource_labels(&tree, "carol@example.org"), vec![vec!["home".to_string()]]);
    println!("✅ Stored presence applied when the roster arrived");

    println!("=== Early presence test completed ===\n");
}

#[test]
fn test_unread_badge_on_every_group() {
    setup_logging();
    println!("\n=== Testing unread badges ===");

    let mut tree = loaded_tree();
    assert!(tree.mark_unread("bob@example.org", Some("phone")));
    assert!(tree.mark_unread("bob@example.org", None));

    let bobs = tree.contact_nodes("bob@example.org").to_vec();
    assert_eq!(bobs.len(), 2);
    for &bob in &bobs {
        assert!(tree.display(bob).unwrap().unread);
        let group = tree[bob].parent().unwrap();
        assert!(tree.display(group).unwrap().unread);
    }
    assert!(RosterView::new(&tree).render_lines().contains(&"  * Bob [Offline]".to_string()));
    println!("✅ Badge raised on both of Bob's groups");

    // Reading another resource leaves the phone's message pending
    tree.mark_read("bob@example.org", Some("laptop"));
    assert!(tree.display(bobs[0]).unwrap().unread);
    tree.mark_read("bob@example.org", Some("phone"));
    assert!(!tree.display(bobs[0]).unwrap().unread);
    assert!(!tree.display(bobs[1]).unwrap().unread);
    println!("✅ Badge cleared once every source was read");

    assert!(!tree.mark_unread("stranger@example.org", None));
    println!("=== Unread badge test completed ===\n");
}

#[test]
fn test_roster_push_moves_and_removes() {
    setup_logging();
    println!("\n=== Testing roster pushes ===");

    let mut tree = loaded_tree();
    let presence = PresenceStore::new();

    let bob = RosterEntry::new(addr("bob@example.org")).named("Robert").in_group("Work");
    tree.upsert_entry(&bob, &presence);
    let friends = tree.find_group(Some("Friends")).unwrap();
    assert_eq!(tree[friends].children().len(), 1);
    assert_eq!(tree.contact_nodes("bob@example.org").len(), 1);
    let robert = tree.contact_nodes("bob@example.org")[0];
    assert_eq!(tree.display(robert).unwrap().label, "Robert");
    println!("✅ Bob left Friends and was renamed");

    let dave = RosterEntry::new(addr("dave@example.org")).in_group("Family");
    tree.upsert_entry(&dave, &presence);
    let family = tree.find_group(Some("Family")).unwrap();
    assert_eq!(RosterView::new(&tree).row_of(family), Some(0));
    assert_eq!(tree.display(tree.contact_nodes("dave@example.org")[0]).unwrap().label, "dave@example.org");
    println!("✅ New group inserted in sorted position");

    tree.take_changes();
    let mut carol = RosterEntry::new(addr("carol@example.org"));
    carol.subscription = Subscription::Remove;
    tree.upsert_entry(&carol, &presence);
    assert!(tree.find_group(None).is_none());
    let root = tree.root();
    let changes = tree.take_changes();
    assert!(changes.iter().any(|c| matches!(c, TreeChange::NodesRemoved { parent, .. } if *parent == root)));
    assert!(!tree.remove_entry("carol@example.org"));
    println!("✅ Removal dropped the contact and its empty group");

    println!("=== Roster push test completed ===\n");
}

#[test]
fn test_view_navigation() {
    setup_logging();
    let mut tree = loaded_tree();
    tree.apply_presence(&addr("alice@example.org/phone"), &available(0));
    let view = RosterView::new(&tree);

    assert_eq!(view.row_count(None), 3);
    let alice = view.contact_at(0, 0).unwrap();
    assert_eq!(view.kind_at(alice), Some(NodeKind::Contact));
    assert_eq!(view.address_at(alice), Some(addr("alice@example.org")));

    let phone = view.index(Some(alice), 0).unwrap();
    assert_eq!(view.kind_at(phone), Some(NodeKind::Resource));
    assert_eq!(view.address_at(phone), Some(addr("alice@example.org/phone")));
    assert_eq!(view.parent(phone), Some(alice));

    let friends = view.parent(alice).unwrap();
    assert_eq!(view.parent(friends), None);
    assert_eq!(view.address_at(friends), None);
}
