//! The embedded persistent store.

use std::path::Path;
use std::sync::Arc;

use rusqlite::{Connection, OptionalExtension, params};
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::models::{MessageRecord, PersistedPeer, RelayEnvelope, TrustOutcome, TrustRecord, TrustStatus};
use crate::schema::SCHEMA;

/// Handle to the node's single embedded database.
///
/// `rusqlite::Connection` is not `Sync`, so every access goes through one
/// `tokio::sync::Mutex`-guarded connection rather than a connection pool —
/// matching the single-writer, single-process nature of a LAN node. Each
/// public method performs one atomic statement or transaction; atomicity
/// across separate calls is not provided, per spec.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (creating if absent) the database at `path` and apply the
    /// schema.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_owned();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection, StoreError> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let conn = Connection::open(path)?;
            conn.execute_batch(SCHEMA)?;
            Ok(conn)
        })
        .await
        .expect("store open task panicked")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open a database purely in memory. Used by tests; never persists.
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // ---- identity --------------------------------------------------

    /// Persist the identity blob, overwriting any existing one.
    pub async fn save_identity(&self, blob: &[u8]) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO identity (id, blob) VALUES (0, ?1)
             ON CONFLICT(id) DO UPDATE SET blob = excluded.blob",
            params![blob],
        )?;
        Ok(())
    }

    /// Load the identity blob, if one was ever saved.
    pub async fn load_identity(&self) -> Result<Option<Vec<u8>>, StoreError> {
        let conn = self.conn.lock().await;
        let blob = conn
            .query_row("SELECT blob FROM identity WHERE id = 0", [], |row| row.get(0))
            .optional()?;
        Ok(blob)
    }

    // ---- trust (TOFU) -----------------------------------------------

    /// Check and update the trust record for `node_id` against the keys
    /// presented on this sighting: new record, matching keys, or mismatch.
    pub async fn check_trust(
        &self,
        node_id: &str,
        signing_pub: &str,
        dh_pub: &str,
        now: i64,
    ) -> Result<TrustOutcome, StoreError> {
        let conn = self.conn.lock().await;
        let existing: Option<(String, String, bool)> = conn
            .query_row(
                "SELECT signing_pub, dh_pub, trusted FROM trust WHERE node_id = ?1",
                params![node_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get::<_, i64>(2)? != 0)),
            )
            .optional()?;

        match existing {
            None => {
                conn.execute(
                    "INSERT INTO trust (node_id, signing_pub, dh_pub, first_seen, last_seen, trusted)
                     VALUES (?1, ?2, ?3, ?4, ?4, 1)",
                    params![node_id, signing_pub, dh_pub, now],
                )?;
                Ok(TrustOutcome {
                    status: TrustStatus::New,
                    trusted: true,
                })
            }
            Some((stored_signing, stored_dh, trusted)) if stored_signing == signing_pub && stored_dh == dh_pub => {
                conn.execute(
                    "UPDATE trust SET last_seen = ?1 WHERE node_id = ?2",
                    params![now, node_id],
                )?;
                Ok(TrustOutcome {
                    status: TrustStatus::Known,
                    trusted,
                })
            }
            Some(_) => {
                conn.execute(
                    "UPDATE trust SET trusted = 0, last_seen = ?1 WHERE node_id = ?2",
                    params![now, node_id],
                )?;
                Ok(TrustOutcome {
                    status: TrustStatus::Mismatch,
                    trusted: false,
                })
            }
        }
    }

    /// Operator re-assertion: mark a `NodeId` trusted again without
    /// changing its pinned keys.
    pub async fn reassert_trust(&self, node_id: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE trust SET trusted = 1 WHERE node_id = ?1",
            params![node_id],
        )?;
        Ok(())
    }

    /// Fetch the trust record for a `NodeId`, if any.
    pub async fn get_trust(&self, node_id: &str) -> Result<Option<TrustRecord>, StoreError> {
        let conn = self.conn.lock().await;
        let record = conn
            .query_row(
                "SELECT node_id, signing_pub, dh_pub, first_seen, last_seen, trusted FROM trust WHERE node_id = ?1",
                params![node_id],
                |row| {
                    Ok(TrustRecord {
                        node_id: row.get(0)?,
                        signing_pub: row.get(1)?,
                        dh_pub: row.get(2)?,
                        first_seen: row.get(3)?,
                        last_seen: row.get(4)?,
                        trusted: row.get::<_, i64>(5)? != 0,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    // ---- peers --------------------------------------------------------

    /// Upsert a durable peer record, used to seed reconnection attempts
    /// after a restart.
    pub async fn upsert_peer(&self, peer: &PersistedPeer) -> Result<(), StoreError> {
        let shared_files = serde_json_list(&peer.shared_files);
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO peers (node_id, address, tcp_port, signing_pub, dh_pub, shared_files, last_seen)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(node_id) DO UPDATE SET
                address = excluded.address,
                tcp_port = excluded.tcp_port,
                signing_pub = excluded.signing_pub,
                dh_pub = excluded.dh_pub,
                shared_files = excluded.shared_files,
                last_seen = excluded.last_seen",
            params![
                peer.node_id,
                peer.address,
                peer.tcp_port,
                peer.signing_pub,
                peer.dh_pub,
                shared_files,
                peer.last_seen
            ],
        )?;
        Ok(())
    }

    /// List every durably known peer, most recently seen first.
    pub async fn list_peers(&self) -> Result<Vec<PersistedPeer>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT node_id, address, tcp_port, signing_pub, dh_pub, shared_files, last_seen
             FROM peers ORDER BY last_seen DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            let shared_files_json: String = row.get(5)?;
            Ok(PersistedPeer {
                node_id: row.get(0)?,
                address: row.get(1)?,
                tcp_port: row.get(2)?,
                signing_pub: row.get(3)?,
                dh_pub: row.get(4)?,
                shared_files: parse_json_list(&shared_files_json),
                last_seen: row.get(6)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    // ---- messages -------------------------------------------------------

    /// Append one message to durable history.
    pub async fn append_message(&self, message: &MessageRecord) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO messages (peer_id, sender, content, encrypted, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                message.peer_id,
                message.sender,
                message.content,
                message.encrypted as i64,
                message.timestamp
            ],
        )?;
        Ok(())
    }

    /// Fetch the most recent `limit` messages exchanged with `peer_id`,
    /// oldest first.
    pub async fn recent_messages(&self, peer_id: &str, limit: u32) -> Result<Vec<MessageRecord>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT peer_id, sender, content, encrypted, timestamp FROM messages
             WHERE peer_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![peer_id, limit], |row| {
            Ok(MessageRecord {
                peer_id: row.get(0)?,
                sender: row.get(1)?,
                content: row.get(2)?,
                encrypted: row.get::<_, i64>(3)? != 0,
                timestamp: row.get(4)?,
            })
        })?;
        let mut out = rows.collect::<Result<Vec<_>, _>>()?;
        out.reverse();
        Ok(out)
    }

    // ---- relay queue ------------------------------------------------

    /// Count entries currently queued on behalf of `sender_node_id`, across
    /// all targets. Used to cap the DoS surface any peer exposes by handing
    /// us `RELAY` frames to hold on its behalf.
    pub async fn count_relay_from_sender(&self, sender_node_id: &str) -> Result<u64, StoreError> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM relay_queue WHERE sender_node_id = ?1",
            params![sender_node_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Enqueue a relay envelope for later delivery.
    pub async fn enqueue_relay(&self, envelope: &RelayEnvelope) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO relay_queue (target_node_id, sender_node_id, content, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                envelope.target_node_id,
                envelope.sender_node_id,
                envelope.content,
                envelope.created_at,
                envelope.expires_at
            ],
        )?;
        Ok(())
    }

    /// Drain every non-expired envelope queued for `target_node_id`,
    /// fetch-and-delete, FIFO by enqueue order. Expired entries encountered
    /// along the way are purged, not returned.
    pub async fn drain_relay_queue(&self, target_node_id: &str, now: i64) -> Result<Vec<RelayEnvelope>, StoreError> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let envelopes = {
            let mut stmt = tx.prepare(
                "SELECT id, target_node_id, sender_node_id, content, created_at, expires_at
                 FROM relay_queue WHERE target_node_id = ?1 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![target_node_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    RelayEnvelope {
                        target_node_id: row.get(1)?,
                        sender_node_id: row.get(2)?,
                        content: row.get(3)?,
                        created_at: row.get(4)?,
                        expires_at: row.get(5)?,
                    },
                ))
            })?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        let ids: Vec<i64> = envelopes.iter().map(|(id, _)| *id).collect();
        for id in &ids {
            tx.execute("DELETE FROM relay_queue WHERE id = ?1", params![id])?;
        }
        tx.commit()?;

        Ok(envelopes
            .into_iter()
            .filter(|(_, envelope)| envelope.expires_at > now)
            .map(|(_, envelope)| envelope)
            .collect())
    }

    /// Purge every expired entry across all targets. Called lazily rather
    /// than on a dedicated timer, per spec.
    pub async fn purge_expired_relay_entries(&self, now: i64) -> Result<u64, StoreError> {
        let conn = self.conn.lock().await;
        let removed = conn.execute("DELETE FROM relay_queue WHERE expires_at <= ?1", params![now])?;
        Ok(removed as u64)
    }
}

fn serde_json_list(items: &[String]) -> String {
    serde_json::to_string(items).expect("Vec<String> always serializes")
}

fn parse_json_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}
