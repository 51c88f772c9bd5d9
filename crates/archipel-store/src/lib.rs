//! # ARCHIPEL Store
//!
//! A single embedded SQLite database holding everything an ARCHIPEL node
//! needs to survive a restart: the node's own identity blob, TOFU trust
//! records, durable peer summaries, chat history, and the store-and-forward
//! relay queue.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod models;
mod schema;
mod store;

pub use error::StoreError;
pub use models::{MessageRecord, PersistedPeer, RelayEnvelope, TrustOutcome, TrustRecord, TrustStatus};
pub use store::Store;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identity_round_trips() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.load_identity().await.unwrap().is_none());
        store.save_identity(b"secret-blob").await.unwrap();
        assert_eq!(store.load_identity().await.unwrap().unwrap(), b"secret-blob");
    }

    #[tokio::test]
    async fn trust_first_sighting_is_new_and_trusted() {
        let store = Store::open_in_memory().unwrap();
        let outcome = store.check_trust("node-a", "sign-a", "dh-a", 1000).await.unwrap();
        assert_eq!(outcome.status, TrustStatus::New);
        assert!(outcome.trusted);
    }

    #[tokio::test]
    async fn trust_matching_keys_stay_known_and_trusted() {
        let store = Store::open_in_memory().unwrap();
        store.check_trust("node-a", "sign-a", "dh-a", 1000).await.unwrap();
        let outcome = store.check_trust("node-a", "sign-a", "dh-a", 2000).await.unwrap();
        assert_eq!(outcome.status, TrustStatus::Known);
        assert!(outcome.trusted);
    }

    #[tokio::test]
    async fn trust_mismatched_keys_clear_trust() {
        let store = Store::open_in_memory().unwrap();
        store.check_trust("node-a", "sign-a", "dh-a", 1000).await.unwrap();
        let outcome = store.check_trust("node-a", "sign-b", "dh-a", 2000).await.unwrap();
        assert_eq!(outcome.status, TrustStatus::Mismatch);
        assert!(!outcome.trusted);

        let record = store.get_trust("node-a").await.unwrap().unwrap();
        assert!(!record.trusted);
    }

    #[tokio::test]
    async fn reasserting_trust_restores_it_without_changing_keys() {
        let store = Store::open_in_memory().unwrap();
        store.check_trust("node-a", "sign-a", "dh-a", 1000).await.unwrap();
        store.check_trust("node-a", "sign-b", "dh-a", 2000).await.unwrap();
        store.reassert_trust("node-a").await.unwrap();

        let record = store.get_trust("node-a").await.unwrap().unwrap();
        assert!(record.trusted);
        assert_eq!(record.signing_pub, "sign-b");
    }

    #[tokio::test]
    async fn relay_queue_is_fifo_fetch_and_delete() {
        let store = Store::open_in_memory().unwrap();
        for i in 0..3 {
            store
                .enqueue_relay(&RelayEnvelope {
                    target_node_id: "target".into(),
                    sender_node_id: format!("sender-{i}"),
                    content: format!("msg-{i}"),
                    created_at: 1000,
                    expires_at: 1000 + 86_400,
                })
                .await
                .unwrap();
        }

        let drained = store.drain_relay_queue("target", 1001).await.unwrap();
        assert_eq!(drained.len(), 3);
        assert_eq!(drained[0].content, "msg-0");
        assert_eq!(drained[2].content, "msg-2");

        let second_drain = store.drain_relay_queue("target", 1001).await.unwrap();
        assert!(second_drain.is_empty());
    }

    #[tokio::test]
    async fn expired_relay_entries_are_not_returned() {
        let store = Store::open_in_memory().unwrap();
        store
            .enqueue_relay(&RelayEnvelope {
                target_node_id: "target".into(),
                sender_node_id: "sender".into(),
                content: "stale".into(),
                created_at: 1000,
                expires_at: 1100,
            })
            .await
            .unwrap();

        let drained = store.drain_relay_queue("target", 2000).await.unwrap();
        assert!(drained.is_empty());
    }

    #[tokio::test]
    async fn message_history_round_trips_in_order() {
        let store = Store::open_in_memory().unwrap();
        for i in 0..3 {
            store
                .append_message(&MessageRecord {
                    peer_id: "peer-a".into(),
                    sender: "peer-a".into(),
                    content: format!("message-{i}"),
                    encrypted: i % 2 == 0,
                    timestamp: 1000 + i,
                })
                .await
                .unwrap();
        }

        let history = store.recent_messages("peer-a", 10).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].content, "message-0");
        assert_eq!(history[2].content, "message-2");
    }

    #[tokio::test]
    async fn peer_upsert_preserves_latest_fields() {
        let store = Store::open_in_memory().unwrap();
        let peer = PersistedPeer {
            node_id: "node-a".into(),
            address: "192.168.1.5:7777".into(),
            tcp_port: 7777,
            signing_pub: Some("sign-a".into()),
            dh_pub: Some("dh-a".into()),
            shared_files: vec!["report.pdf".into()],
            last_seen: 1000,
        };
        store.upsert_peer(&peer).await.unwrap();

        let mut updated = peer.clone();
        updated.address = "192.168.1.9:7777".into();
        updated.last_seen = 2000;
        store.upsert_peer(&updated).await.unwrap();

        let peers = store.list_peers().await.unwrap();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].address, "192.168.1.9:7777");
        assert_eq!(peers[0].last_seen, 2000);
    }
}
