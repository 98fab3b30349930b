//! Store — the typed persistent-object cache.
//!
//! A `Store` is a UUID-keyed arena backed by a SQL connection pool. All
//! long-lived domain records are addressed by UUID and resolved through
//! `load`/`new`; other components hold only the UUID and dereference it
//! through the store they were given, never a pointer, turning what
//! would otherwise be a cyclic object graph into a flat arena.

mod change_set;
mod records;

pub use change_set::{ChangeOp, ChangeSet};
pub use records::{
    Account, AccountWorldData, BazaarData, BazaarItem, ChannelLogin, Character,
    CharacterProgress, Clan, CultureData, Demon, DemonBox, DemonQuest, EventCounter, Expertise,
    FriendSettings, Hotbar, InheritedSkill, InstanceAccess, Item, ItemBox, Match,
    PentalphaEntry, PersistentRecord, Party, PostItem, PvPData, Quest, Record, SearchEntry,
    SearchEntryType, StatusEffect, Team, UBTournament,
};

use crate::error::StoreError;
use dashmap::DashMap;
use parking_lot::RwLock;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Persistent-object cache plus change-set apply for one backing database.
///
/// A channel process holds two of these: one for its own zone-local
/// records and one resolving lobby-owned records (accounts) — see
/// `ServerCtx::store` vs the lobby reference threaded through
/// `AccountManager`.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    cache: Arc<DashMap<Uuid, Arc<RwLock<Record>>>>,
}

impl Store {
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
    const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = if url == ":memory:" || url == "sqlite::memory:" {
            let options = SqliteConnectOptions::new()
                .filename("file::memory:")
                .shared_cache(true)
                .create_if_missing(true);
            SqlitePoolOptions::new()
                .max_connections(max_connections)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .connect_with(options)
                .await?
        } else {
            let path = url.trim_start_matches("sqlite://");
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    let _ = std::fs::create_dir_all(parent);
                }
            }
            let options = SqliteConnectOptions::new().filename(path).create_if_missing(true);
            SqlitePoolOptions::new()
                .max_connections(max_connections)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .connect_with(options)
                .await?
        };

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS records (
                uuid TEXT PRIMARY KEY,
                record_type TEXT NOT NULL,
                payload TEXT NOT NULL
            )",
        )
            .execute(&pool)
            .await?;

        Ok(Self {
            pool,
            cache: Arc::new(DashMap::new()),
        })
    }

    /// Load the record at `uuid`, refreshing from the backing database when
    /// `refresh` is true or the record is not cached.
    pub async fn load<T: PersistentRecord>(&self, uuid: Uuid, refresh: bool) -> Result<T, StoreError> {
        if !refresh {
            if let Some(entry) = self.cache.get(&uuid) {
                let record = entry.read();
                if let Some(typed) = T::from_record(&record) {
                    return Ok(typed);
                }
            }
        }

        let row = sqlx::query("SELECT payload FROM records WHERE uuid = ?")
            .bind(uuid.to_string())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Err(StoreError::LoadMiss {
                record_type: T::RECORD_TYPE,
                uuid,
            });
        };

        let payload: String = row.get("payload");
        let record: Record = serde_json::from_str(&payload)
            .map_err(|e| StoreError::ApplyConflict(e.to_string()))?;
        self.cache.insert(uuid, Arc::new(RwLock::new(record.clone())));

        T::from_record(&record).ok_or(StoreError::LoadMiss {
            record_type: T::RECORD_TYPE,
            uuid,
        })
    }

    /// Allocate a fresh record with a new UUID. When `persisted` is false
    /// the record lives only in the in-memory cache until an explicit
    /// `Insert` change-set op writes it through.
    pub fn new_record<T: PersistentRecord>(&self, build: impl FnOnce(Uuid) -> T, persisted: bool) -> T {
        let uuid = Uuid::new_v4();
        let record = build(uuid);
        if persisted {
            self.cache.insert(uuid, Arc::new(RwLock::new(record.clone().into_record())));
        }
        record
    }

    /// Drop a record from the in-memory cache without touching the backing
    /// database. Used when a channel no longer needs a record resident
    /// (character logout, instance teardown).
    pub fn unload(&self, uuid: Uuid) {
        self.cache.remove(&uuid);
    }

    /// Counts persisted `PostItem`s belonging to `account`, for the
    /// CP-purchase over-capacity check (`shop::buy`). There's no
    /// secondary index for this, so it scans every `PostItem` row and
    /// filters in Rust rather than adding a bespoke index for one caller.
    pub async fn count_post_items(&self, account: Uuid) -> Result<usize, StoreError> {
        let rows = sqlx::query("SELECT payload FROM records WHERE record_type = 'PostItem'")
            .fetch_all(&self.pool)
            .await?;
        let mut count = 0;
        for row in rows {
            let payload: String = row.get("payload");
            if let Ok(Record::PostItem(item)) = serde_json::from_str::<Record>(&payload) {
                if item.account == account {
                    count += 1;
                }
            }
        }
        Ok(count)
    }

    /// Apply an ordered batch of operations as one transaction.
    pub async fn apply(&self, change_set: &ChangeSet) -> Result<(), StoreError> {
        if change_set.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for op in change_set.ops() {
            match op {
                ChangeOp::Insert(record) => {
                    let uuid = record.uuid();
                    let payload = serde_json::to_string(record)
                        .map_err(|e| StoreError::ApplyConflict(e.to_string()))?;
                    sqlx::query(
                        "INSERT INTO records (uuid, record_type, payload) VALUES (?, ?, ?)",
                    )
                        .bind(uuid.to_string())
                        .bind(record.record_type())
                        .bind(payload)
                        .execute(&mut *tx)
                        .await?;
                    self.cache.insert(uuid, Arc::new(RwLock::new(record.clone())));
                }
                ChangeOp::Update(uuid, record) => {
                    let payload = serde_json::to_string(record)
                        .map_err(|e| StoreError::ApplyConflict(e.to_string()))?;
                    let result = sqlx::query(
                        "UPDATE records SET record_type = ?, payload = ? WHERE uuid = ?",
                    )
                        .bind(record.record_type())
                        .bind(payload)
                        .bind(uuid.to_string())
                        .execute(&mut *tx)
                        .await?;
                    if result.rows_affected() == 0 {
                        return Err(StoreError::ApplyConflict(format!(
                            "update of unknown record {uuid}"
                        )));
                    }
                    self.cache.insert(*uuid, Arc::new(RwLock::new(record.clone())));
                }
                ChangeOp::Delete(uuid) => {
                    sqlx::query("DELETE FROM records WHERE uuid = ?")
                        .bind(uuid.to_string())
                        .execute(&mut *tx)
                        .await?;
                    self.cache.remove(uuid);
                }
                ChangeOp::ExplicitUpdate {
                    uuid,
                    field,
                    delta,
                    expected,
                } => {
                    self.apply_explicit_update(&mut tx, *uuid, field, *delta, *expected)
                        .await?;
                }
            }
        }

        tx.commit().await?;
        debug!(ops = change_set.ops().len(), "applied change set");
        Ok(())
    }

    /// Field-level CAS delta, e.g. "subtract N from CP, expect current =
    /// X". Only `Account.cp` is wired up today; other integer fields can
    /// be added to the match as they need concurrency-safe edits.
    async fn apply_explicit_update(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        uuid: Uuid,
        field: &'static str,
        delta: i64,
        expected: i64,
    ) -> Result<(), StoreError> {
        let row = sqlx::query("SELECT payload FROM records WHERE uuid = ?")
            .bind(uuid.to_string())
            .fetch_optional(&mut **tx)
            .await?;
        let Some(row) = row else {
            return Err(StoreError::LoadMiss {
                record_type: "Account",
                uuid,
            });
        };
        let payload: String = row.get("payload");
        let mut record: Record = serde_json::from_str(&payload)
            .map_err(|e| StoreError::ApplyConflict(e.to_string()))?;

        let Record::Account(ref mut account) = record else {
            return Err(StoreError::ApplyConflict(format!(
                "explicit_update on non-Account record {uuid}"
            )));
        };

        match field {
            "cp" => {
                if account.cp != expected {
                    return Err(StoreError::ExplicitUpdateConflict {
                        uuid,
                        expected,
                        found: account.cp,
                    });
                }
                account.cp += delta;
            }
            other => {
                warn!(field = other, "explicit_update on unknown field");
                return Err(StoreError::ApplyConflict(format!("unknown field {other}")));
            }
        }

        let new_payload =
            serde_json::to_string(&record).map_err(|e| StoreError::ApplyConflict(e.to_string()))?;
        sqlx::query("UPDATE records SET payload = ? WHERE uuid = ?")
            .bind(new_payload)
            .bind(uuid.to_string())
            .execute(&mut **tx)
            .await?;
        self.cache.insert(uuid, Arc::new(RwLock::new(record)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountManager;
    use crate::state::ServerCtx;
    use std::sync::Arc as StdArc;

    fn account(cp: i64) -> Account {
        Account { uuid: Uuid::new_v4(), username: "tester".into(), banned: false, cp, last_login: None }
    }

    async fn test_ctx(store: Store) -> ServerCtx {
        ServerCtx::new(
            store.clone(),
            StdArc::new(crate::definitions::Definitions::default()),
            StdArc::new(crate::zone::ZoneManager::new()),
            StdArc::new(crate::state::SessionRegistry::new()),
            StdArc::new(crate::sync::SyncManager::new()),
            StdArc::new(crate::network::WorldConnection::new().0),
            StdArc::new(AccountManager::new(store)),
            StdArc::new(crate::event::EventRuntime::new()),
            StdArc::new(crate::action::ActionGroupRegistry::new()),
            StdArc::new(crate::event::NoopScriptHost) as StdArc<dyn crate::event::ScriptHost>,
            StdArc::new(crate::config::Config {
                server: crate::config::ServerConfig {
                    channel_id: 1,
                    expected_client_version: "1.000".into(),
                    name: "test-channel".into(),
                    listen_address: "127.0.0.1:0".parse().unwrap(),
                    log_format: crate::config::LogFormat::Pretty,
                    metrics_port: 0,
                    session_sweep_interval_secs: 10,
                    session_timeout_secs: 300,
                },
                world: crate::config::WorldConfig {
                    address: "127.0.0.1:0".parse().unwrap(),
                    link_password: "test".into(),
                    reconnect_secs: 5,
                    sync_flush_interval_ms: 100,
                },
                database: crate::config::DatabaseConfig { url: ":memory:".into(), max_connections: 1 },
                limits: crate::config::LimitsConfig::default(),
                security: crate::config::SecurityConfig::default(),
                definitions_path: ".".into(),
            }),
        )
    }

    /// An `explicit_update` whose `expected` no longer matches the
    /// stored value fails the whole apply and leaves the record
    /// untouched, rather than silently applying the delta anyway.
    #[tokio::test]
    async fn explicit_update_rejects_stale_expected_value() {
        let store = Store::connect(":memory:", 1).await.unwrap();
        let acct = account(100);
        store.apply(&ChangeSet::new().insert(acct.clone().into_record())).await.unwrap();

        let result = store.apply(&ChangeSet::new().explicit_update(acct.uuid, "cp", 50, 999)).await;

        assert!(matches!(result, Err(StoreError::ExplicitUpdateConflict { expected: 999, found: 100,.. })));
        let reloaded: Account = store.load(acct.uuid, true).await.unwrap();
        assert_eq!(reloaded.cp, 100);
    }

    #[tokio::test]
    async fn explicit_update_applies_delta_when_expected_matches() {
        let store = Store::connect(":memory:", 1).await.unwrap();
        let acct = account(100);
        store.apply(&ChangeSet::new().insert(acct.clone().into_record())).await.unwrap();

        store.apply(&ChangeSet::new().explicit_update(acct.uuid, "cp", 50, 100)).await.unwrap();

        let reloaded: Account = store.load(acct.uuid, true).await.unwrap();
        assert_eq!(reloaded.cp, 150);
    }

    /// Two concurrent CP gifts against the same account both land, one
    /// retrying past the other's conflict, and the final balance
    /// reflects both deltas rather than losing one.
    #[tokio::test]
    async fn concurrent_increase_cp_calls_both_land() {
        let store = Store::connect(":memory:", 1).await.unwrap();
        let acct = account(0);
        store.apply(&ChangeSet::new().insert(acct.clone().into_record())).await.unwrap();

        let ctx = StdArc::new(test_ctx(store.clone()).await);
        let manager = ctx.account.clone();
        let (m1, m2) = (manager.clone(), manager.clone());
        let (c1, c2) = (ctx.clone(), ctx.clone());
        let uuid = acct.uuid;

        let (r1, r2) = tokio::join!(
            tokio::spawn(async move { m1.increase_cp(&c1, uuid, 10).await }),
            tokio::spawn(async move { m2.increase_cp(&c2, uuid, 20).await }),
        );
        r1.unwrap().unwrap();
        r2.unwrap().unwrap();

        let reloaded: Account = store.load(uuid, true).await.unwrap();
        assert_eq!(reloaded.cp, 30);
    }
}
