//! Redis-backed storage.
//!
//! Keys:
//!
//! - `data:<id>`: the message, stored as `<topic>\n<json>`.
//! - `next:<id>`: id of the message stored right after `<id>`; the first
//!   message ever stored is linked from `next:earliest`.
//! - `Last-Event-ID`: id of the most recent message.
//! - `subscriptions`: hash of active subscription id to subscription JSON.
//! - `subscriptions:closed`: list of the most recently closed subscriptions,
//!   newest first, trimmed to [`CLOSED_SUBSCRIPTIONS_LIMIT`].
//!
//! A message and its chain pointers are written by a single Lua script, so
//! concurrent publishers always leave a well-formed chain.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use tokio_util::sync::CancellationToken;
use tracing::error;
use url::Url;

use crate::broker::message::Message;
use crate::broker::subscription::Subscription;
use crate::persistence::{
    CLOSED_SUBSCRIPTIONS_LIMIT, EARLIEST, Storage, StorageFactory, subscription_filter,
};
use crate::security::matcher::matches_selectors;
use crate::utils::error::{HubError, HubResult};
use crate::utils::redis::{connect, is_connection_error, is_redis_dsn, open_client};

pub const LAST_EVENT_ID_KEY: &str = "Last-Event-ID";
pub const SUBSCRIPTIONS_KEY: &str = "subscriptions";
pub const CLOSED_SUBSCRIPTIONS_KEY: &str = "subscriptions:closed";

const STORE_MESSAGE_SCRIPT: &str = r"
local previous = redis.call('GETSET', KEYS[1], ARGV[1])
redis.call('SET', 'data:' .. ARGV[1], ARGV[2])
if previous then
    redis.call('SET', 'next:' .. previous, ARGV[1])
else
    redis.call('SET', 'next:earliest', ARGV[1])
end
return previous
";

pub fn encode_record(topic: &str, message: &Message) -> HubResult<String> {
    Ok(format!("{topic}\n{}", message.to_json()?))
}

pub fn decode_record(record: &str) -> Option<(String, Message)> {
    let (topic, json) = record.split_once('\n')?;
    let message = Message::from_json(json).ok()?;
    Some((topic.to_string(), message))
}

/// Active subscriptions followed by closed ones. A closed entry is dropped
/// when its id is active again or already listed by a newer entry.
pub fn merge_registry(active: Vec<Subscription>, closed: Vec<Subscription>) -> Vec<Subscription> {
    let mut seen: HashSet<String> = active.iter().map(|s| s.id.clone()).collect();
    let mut merged = active;
    for subscription in closed {
        if seen.insert(subscription.id.clone()) {
            merged.push(subscription);
        }
    }
    merged
}

pub struct RedisStorage {
    conn: MultiplexedConnection,
    store_script: Script,
    fatal: CancellationToken,
}

impl RedisStorage {
    pub async fn connect(dsn: &Url, fatal: CancellationToken) -> HubResult<Self> {
        let client = open_client(dsn)?;
        Ok(Self {
            conn: connect(&client).await?,
            store_script: Script::new(STORE_MESSAGE_SCRIPT),
            fatal,
        })
    }

    fn check(&self, err: redis::RedisError) -> HubError {
        if is_connection_error(&err) {
            error!("Redis storage connection lost: {}", err);
            self.fatal.cancel();
        }
        err.into()
    }
}

#[async_trait]
impl Storage for RedisStorage {
    async fn last_event_id(&self) -> HubResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(LAST_EVENT_ID_KEY).await.map_err(|e| self.check(e))
    }

    async fn retrieve_messages_after_id(
        &self,
        id: &str,
        selectors: &[String],
    ) -> HubResult<Vec<(String, Message)>> {
        let mut conn = self.conn.clone();
        let mut messages = Vec::new();
        let mut seen = HashSet::from([id.to_string(), EARLIEST.to_string()]);
        let mut cursor = id.to_string();

        loop {
            let next: Option<String> = conn
                .get(format!("next:{cursor}"))
                .await
                .map_err(|e| self.check(e))?;
            let Some(next) = next else {
                break;
            };
            if !seen.insert(next.clone()) {
                break;
            }

            let record: Option<String> = conn
                .get(format!("data:{next}"))
                .await
                .map_err(|e| self.check(e))?;
            if let Some((topic, message)) = record.as_deref().and_then(decode_record) {
                if matches_selectors(&topic, selectors) {
                    messages.push((topic, message));
                }
            }
            cursor = next;
        }

        Ok(messages)
    }

    async fn store_message(&self, topic: &str, message: &Message) -> HubResult<()> {
        let record = encode_record(topic, message)?;
        let mut conn = self.conn.clone();
        let _: Option<String> = self
            .store_script
            .key(LAST_EVENT_ID_KEY)
            .arg(&message.id)
            .arg(record)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| self.check(e))?;
        Ok(())
    }

    async fn store_subscriptions(&self, subscriptions: &[Subscription]) -> HubResult<()> {
        if subscriptions.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        let mut closed = false;
        for subscription in subscriptions {
            let json = serde_json::to_string(subscription)?;
            if subscription.active {
                pipe.hset(SUBSCRIPTIONS_KEY, &subscription.id, json).ignore();
            } else {
                pipe.hdel(SUBSCRIPTIONS_KEY, &subscription.id)
                    .ignore()
                    .lpush(CLOSED_SUBSCRIPTIONS_KEY, json)
                    .ignore();
                closed = true;
            }
        }
        if closed {
            let last = CLOSED_SUBSCRIPTIONS_LIMIT as isize - 1;
            pipe.ltrim(CLOSED_SUBSCRIPTIONS_KEY, 0, last).ignore();
        }
        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await.map_err(|e| self.check(e))?;
        Ok(())
    }

    async fn remove_subscriptions(&self, subscriptions: &[Subscription]) -> HubResult<()> {
        if subscriptions.is_empty() {
            return Ok(());
        }
        let ids: Vec<&str> = subscriptions.iter().map(|s| s.id.as_str()).collect();
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .hdel(SUBSCRIPTIONS_KEY, ids)
            .await
            .map_err(|e| self.check(e))?;
        Ok(())
    }

    async fn find_subscriptions(
        &self,
        subscriber: Option<&str>,
        topic: Option<&str>,
    ) -> HubResult<Vec<Subscription>> {
        let mut conn = self.conn.clone();
        let active: Vec<String> = conn
            .hvals(SUBSCRIPTIONS_KEY)
            .await
            .map_err(|e| self.check(e))?;
        let closed: Vec<String> = conn
            .lrange(CLOSED_SUBSCRIPTIONS_KEY, 0, -1)
            .await
            .map_err(|e| self.check(e))?;

        let decode = |values: Vec<String>| -> Vec<Subscription> {
            values
                .iter()
                .filter_map(|json| serde_json::from_str::<Subscription>(json).ok())
                .collect()
        };

        Ok(merge_registry(decode(active), decode(closed))
            .into_iter()
            .filter(|s| subscription_filter(s, subscriber, topic))
            .collect())
    }
}

/// Handles `redis://` and `rediss://` DSNs.
pub struct RedisStorageFactory;

#[async_trait]
impl StorageFactory for RedisStorageFactory {
    fn supports(&self, dsn: &Url) -> bool {
        is_redis_dsn(dsn)
    }

    async fn create(&self, dsn: &Url, fatal: CancellationToken) -> HubResult<Arc<dyn Storage>> {
        Ok(Arc::new(RedisStorage::connect(dsn, fatal).await?))
    }
}
