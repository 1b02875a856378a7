// Session tests
// Engine events in, notices and tree change batches out, with a recording
// transport standing in for the XMPP engine.

mod common;
use common::{addr, available, incoming, sample_roster, setup_logging, state_only, unavailable, RecordingTransport, Sent};

use parley::conversation::ConversationConfig;
use parley::engine::{ClientState, EngineErrorKind, EngineEvent};
use parley::models::{ChatState, RosterEntry};
use parley::roster::TreeChange;
use parley::{Notice, Session, SessionError};
use tokio::time::{Duration, Instant};

fn online_session() -> Session<RecordingTransport> {
    let mut session = Session::new(
        addr("me@example.org/parley"),
        RecordingTransport::new(),
        ConversationConfig::default(),
        false,
    );
    session.handle_event(EngineEvent::Connected { bound: addr("me@example.org/parley") });
    session.handle_event(EngineEvent::RosterLoaded(sample_roster()));
    session
}

#[tokio::test]
async fn test_connect_and_load_roster() {
    setup_logging();
    println!("\n=== Testing session start-up ===");

    let mut session = Session::new(
        addr("me@example.org"),
        RecordingTransport::new(),
        ConversationConfig::default(),
        false,
    );
    assert_eq!(session.state(), ClientState::Connecting);
    let mut changes = session.subscribe_tree_changes();

    let notices = session.handle_event(EngineEvent::Connected { bound: addr("me@example.org/parley") });
    assert_eq!(notices, vec![Notice::ConnectionChanged(ClientState::Connected)]);
    assert_eq!(session.account(), &addr("me@example.org"));

    session.handle_event(EngineEvent::RosterLoaded(sample_roster()));
    let batch = changes.recv().await.unwrap();
    assert_eq!(
        batch,
        vec![TreeChange::NodesInserted { parent: session.tree().root(), first: 0, last: 2 }]
    );
    println!("✅ Roster load published as one insertion");

    session.handle_event(EngineEvent::PresenceChanged {
        from: addr("alice@example.org/phone"),
        presence: available(0),
    });
    let batch = changes.recv().await.unwrap();
    assert!(!batch.is_empty());
    assert!(session.presence().get(&addr("alice@example.org/phone")).is_some());
    assert_eq!(session.view().render_lines()[0], "Friends (1/2)");
    println!("✅ Presence reached the store and the tree");

    println!("=== Session start-up test completed ===\n");
}

#[tokio::test]
async fn test_message_lifecycle() {
    setup_logging();
    println!("\n=== Testing message lifecycle ===");

    let mut session = online_session();
    session.handle_event(EngineEvent::PresenceChanged {
        from: addr("bob@example.org/phone"),
        presence: available(0),
    });

    let notices = session.handle_event(EngineEvent::MessageReceived(incoming("bob@example.org/phone", "ping")));
    assert_eq!(notices, vec![Notice::UnreadArrived { from: addr("bob@example.org/phone") }]);
    assert!(session.router().unread().has_any_unread());
    println!("✅ Message without a conversation went to unread");

    let opened = session.open_str("bob@example.org").unwrap();
    assert_eq!(opened.drained, 1);
    assert!(!session.router().unread().has_any_unread());

    let notices = session.handle_event(EngineEvent::MessageReceived(incoming("bob@example.org/phone", "still there?")));
    assert_eq!(notices.len(), 2);
    assert!(matches!(
        &notices[0],
        Notice::RemoteStateChanged { state: ChatState::Active, .. }
    ));
    assert!(matches!(&notices[1], Notice::MessageDelivered { conversation, .. } if *conversation == addr("bob@example.org")));
    println!("✅ Later messages delivered to the open conversation");

    let t0 = Instant::now();
    let bob = addr("bob@example.org");
    session.local_edit(&bob, t0).unwrap();
    session.send(&bob, "pong", None, t0 + Duration::from_secs(1)).unwrap();
    assert_eq!(session.close(&bob, t0 + Duration::from_secs(2)).unwrap(), ChatState::Gone);
    assert_eq!(
        session.transport().sent(),
        vec![
            Sent::State { to: bob.clone(), state: ChatState::Composing },
            Sent::Message { to: bob.clone(), body: "pong".to_string() },
            Sent::State { to: bob.clone(), state: ChatState::Active },
            Sent::State { to: bob.clone(), state: ChatState::Gone },
        ]
    );
    assert!(session.conversation(&bob).is_none());
    println!("✅ Composing, message, Active and Gone reached the transport");

    println!("=== Message lifecycle test completed ===\n");
}

#[tokio::test]
async fn test_timers_fire_through_session() {
    setup_logging();
    let mut session = online_session();
    session.handle_event(EngineEvent::PresenceChanged {
        from: addr("alice@example.org/desk"),
        presence: available(0),
    });
    let alice = addr("alice@example.org");
    session.open(&alice);
    assert!(session.next_deadline().is_none());

    let t0 = Instant::now();
    session.local_edit(&alice, t0).unwrap();
    assert_eq!(session.next_deadline(), Some(t0 + Duration::from_secs(30)));

    let fired = session.fire_timers(t0 + Duration::from_secs(30));
    assert_eq!(fired, vec![(alice.clone(), ChatState::Paused)]);
    assert_eq!(session.next_deadline(), Some(t0 + Duration::from_secs(120)));

    session.shutdown(t0 + Duration::from_secs(31));
    assert!(session.router().open_addresses().is_empty());
    assert_eq!(
        session.transport().states(),
        vec![ChatState::Composing, ChatState::Paused, ChatState::Gone]
    );
}

#[tokio::test]
async fn test_state_only_without_conversation_is_silent() {
    setup_logging();
    let mut session = online_session();
    let notices = session.handle_event(EngineEvent::MessageReceived(state_only("carol@example.org", ChatState::Composing)));
    assert!(notices.is_empty());
    assert!(!session.router().unread().has_any_unread());
}

#[tokio::test]
async fn test_roster_push_and_disconnect() {
    setup_logging();
    println!("\n=== Testing roster push and disconnect ===");

    let mut session = online_session();
    let mut changes = session.subscribe_tree_changes();
    session.handle_event(EngineEvent::RosterPushed(
        RosterEntry::new(addr("dave@example.org")).named("Dave").in_group("Friends"),
    ));
    assert!(changes.recv().await.is_some());
    assert_eq!(session.tree().contact_nodes("dave@example.org").len(), 1);
    println!("✅ Pushed entry added");

    session.handle_event(EngineEvent::PresenceChanged {
        from: addr("dave@example.org/pc"),
        presence: available(0),
    });
    session.handle_event(EngineEvent::PresenceChanged {
        from: addr("dave@example.org/pc"),
        presence: unavailable(),
    });
    assert!(session.presence().get(&addr("dave@example.org/pc")).is_none());

    let notices = session.handle_event(EngineEvent::Disconnected);
    assert_eq!(notices, vec![Notice::ConnectionChanged(ClientState::Disconnected)]);
    assert!(session.tree().groups().is_empty());
    println!("✅ Disconnect invalidated the roster");

    let notices = session.handle_event(EngineEvent::Error(EngineErrorKind::Authentication));
    assert_eq!(
        notices,
        vec![Notice::ConnectionChanged(ClientState::Error(EngineErrorKind::Authentication))]
    );

    // Dropped subscribers are pruned without disturbing the session
    drop(changes);
    session.handle_event(EngineEvent::RosterLoaded(sample_roster()));
    assert_eq!(session.tree().groups().len(), 3);

    println!("=== Roster push and disconnect test completed ===\n");
}

fn badges(session: &Session<RecordingTransport>, bare: &str) -> Vec<bool> {
    session
        .tree()
        .contact_nodes(bare)
        .iter()
        .map(|&c| session.tree().display(c).unwrap().unread)
        .collect()
}

#[tokio::test]
async fn test_unread_badges_follow_the_buffer() {
    setup_logging();
    println!("\n=== Testing unread badges across roster rebuilds ===");

    let mut session = online_session();
    session.handle_event(EngineEvent::MessageReceived(incoming("alice@example.org/phone", "hi")));
    assert_eq!(badges(&session, "alice@example.org"), vec![true]);

    session.handle_event(EngineEvent::Disconnected);
    session.handle_event(EngineEvent::Connected { bound: addr("me@example.org/parley") });
    session.handle_event(EngineEvent::RosterLoaded(sample_roster()));
    assert!(session.router().unread().has_any_unread());
    assert_eq!(badges(&session, "alice@example.org"), vec![true]);
    println!("✅ Badge restored after reconnect and reload");

    session.handle_event(EngineEvent::MessageReceived(incoming("bob@example.org/phone", "ping")));
    session.handle_event(EngineEvent::RosterPushed(
        RosterEntry::new(addr("bob@example.org"))
            .named("Bob")
            .in_group("Friends")
            .in_group("Work")
            .in_group("Family"),
    ));
    assert_eq!(badges(&session, "bob@example.org"), vec![true, true, true]);
    println!("✅ Group added by a push shows the badge too");

    session.handle_event(EngineEvent::MessageReceived(incoming("dave@example.org/pc", "hello")));
    assert!(badges(&session, "dave@example.org").is_empty());
    session.handle_event(EngineEvent::RosterPushed(
        RosterEntry::new(addr("dave@example.org")).in_group("Friends"),
    ));
    assert_eq!(badges(&session, "dave@example.org"), vec![true]);
    println!("✅ Sender pushed into the roster after messaging shows the badge");

    let opened = session.open_str("dave@example.org").unwrap();
    assert_eq!(opened.drained, 1);
    assert_eq!(badges(&session, "dave@example.org"), vec![false]);
    assert_eq!(badges(&session, "bob@example.org"), vec![true, true, true]);

    println!("=== Unread badge consistency test completed ===\n");
}

#[test]
fn test_actions_need_an_open_conversation() {
    setup_logging();
    let mut session = online_session();
    let now = Instant::now();
    let carol = addr("carol@example.org");

    assert!(matches!(session.local_edit(&carol, now), Err(SessionError::NoConversation(_))));
    assert!(matches!(session.send(&carol, "hi", None, now), Err(SessionError::NoConversation(_))));
    assert!(matches!(session.close(&carol, now), Err(SessionError::NoConversation(_))));
    assert!(matches!(session.open_str("not-an-address@"), Err(SessionError::InvalidAddress(_))));
}
