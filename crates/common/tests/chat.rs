//! Chat flows between users sharing one store

mod common;

use ::common::message::{Direction, ENCRYPTED_PREVIEW, UNDECRYPTABLE_PLACEHOLDER};
use ::common::prelude::*;
use ::common::store::MemoryStore;

use crate::common::{record, Peer};

#[tokio::test]
async fn test_encrypted_conversation() {
    let store = MemoryStore::new();
    let alice = Peer::ready(&store, "u1", "alice").await;
    let bob = Peer::ready(&store, "u2", "bob").await;
    let mut alice_chat = alice.controller(&store).await;
    let mut bob_chat = bob.controller(&store).await;

    let session = alice_chat.start_chat_with_login("Bob").await.unwrap();
    assert_eq!(session.status(), "🔒 Encrypted (E2EE)");
    bob_chat.start_chat_with_login("alice").await.unwrap();
    assert!(bob_chat.next_messages().await.unwrap().is_empty());

    let id = alice_chat.send_message("hello bob").await.unwrap().unwrap();
    let stored = record(&store, "u2", "alice", &id);
    assert!(stored["ciphertext"].is_string());
    assert!(stored["nonce"].is_string());
    assert!(stored["mac"].is_string());
    assert_eq!(stored["e2eeV"], 1);

    let messages = bob_chat.next_messages().await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, id);
    assert_eq!(messages[0].direction, Direction::Received);
    assert_eq!(messages[0].body.as_str(), "hello bob");
    assert!(messages[0].created_at.is_some());
}

#[tokio::test]
async fn test_without_plaintext_retention() {
    let store = MemoryStore::new();
    let config = E2eeConfig {
        retain_plaintext: false,
        ..Default::default()
    };
    let alice = Peer::with_config(&store, "u1", "alice", config);
    alice.e2ee.setup("u1").await.unwrap();
    let bob = Peer::ready(&store, "u2", "bob").await;
    let mut alice_chat = alice.controller(&store).await;
    let mut bob_chat = bob.controller(&store).await;

    alice_chat.start_chat_with_login("bob").await.unwrap();
    let id = alice_chat.send_message("for your eyes only").await.unwrap().unwrap();

    for (owner, peer) in [("u1", "bob"), ("u2", "alice")] {
        let stored = record(&store, owner, peer, &id);
        assert!(stored.get("text").is_none());
        assert!(stored["ciphertext"].is_string());
    }
    let saved = bob_chat.saved_chats().await.unwrap();
    assert_eq!(saved[0].last_message_text.as_deref(), Some(ENCRYPTED_PREVIEW));

    bob_chat.start_chat_with_login("alice").await.unwrap();
    let messages = bob_chat.next_messages().await.unwrap();
    assert_eq!(messages[0].body.as_str(), "for your eyes only");
}

#[tokio::test]
async fn test_unencrypted_peer() {
    let store = MemoryStore::new();
    let alice = Peer::ready(&store, "u1", "alice").await;
    let bob = Peer::new(&store, "u2", "bob");
    let mut alice_chat = alice.controller(&store).await;
    bob.controller(&store).await;

    let session = alice_chat.start_chat_with_login("bob").await.unwrap();
    assert_eq!(session.status(), "⚠️ Not encrypted (key missing)");

    let id = alice_chat.send_message("plain").await.unwrap().unwrap();
    let stored = record(&store, "u2", "alice", &id);
    assert_eq!(stored["text"], "plain");
    assert!(stored.get("ciphertext").is_none());
}

#[tokio::test]
async fn test_reset_shows_placeholder_for_history() {
    let store = MemoryStore::new();
    let alice = Peer::ready(&store, "u1", "alice").await;
    let bob = Peer::ready(&store, "u2", "bob").await;
    let mut alice_chat = alice.controller(&store).await;
    let mut bob_chat = bob.controller(&store).await;

    bob_chat.start_chat_with_login("alice").await.unwrap();
    bob_chat.send_message("sealed under the old key").await.unwrap();

    alice.e2ee.reset_identity("u1").await.unwrap();
    alice_chat.start_chat_with_login("bob").await.unwrap();
    let messages = alice_chat.next_messages().await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].body.as_str(), UNDECRYPTABLE_PLACEHOLDER);
}

#[tokio::test]
async fn test_chat_switch_detaches_previous_listener() {
    let store = MemoryStore::new();
    let alice = Peer::ready(&store, "u1", "alice").await;
    let bob = Peer::ready(&store, "u2", "bob").await;
    let carol = Peer::ready(&store, "u3", "carol").await;
    let mut alice_chat = alice.controller(&store).await;
    let mut bob_chat = bob.controller(&store).await;
    carol.controller(&store).await;

    alice_chat.start_chat_with_login("bob").await.unwrap();
    alice_chat.start_chat_with_login("carol").await.unwrap();
    assert_eq!(store.subscriber_count(), 1);
    assert!(alice_chat.next_messages().await.unwrap().is_empty());

    // Bob writing into alice's mailbox must not reach the carol view
    bob_chat.start_chat_with_login("alice").await.unwrap();
    bob_chat.send_message("are you there?").await.unwrap();

    let from_carol = carol.e2ee.open_conversation("u1").await.seal("hi").unwrap();
    store
        .set(
            "messages/u1/carol/m1",
            from_carol.to_record("u3"),
        )
        .await
        .unwrap();

    let messages = alice_chat.next_messages().await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].body.as_str(), "hi");
}
