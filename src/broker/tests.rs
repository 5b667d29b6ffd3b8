use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;

use super::Broker;
use super::message::Message;
use super::subscription::{Subscription, subscription_id};
use crate::client::Client;
use crate::persistence::memory::MemoryStorage;
use crate::persistence::{EARLIEST, Storage};
use crate::transport::memory::MemoryTransport;
use crate::transport::{MessageSender, Transport};
use crate::utils::error::{HubError, HubResult};

fn broker_with_registry(storage: Arc<MemoryStorage>) -> Broker {
    Broker::new(Arc::new(MemoryTransport::new()), storage)
}

fn broker_with_history(capacity: usize) -> (Broker, Arc<MemoryStorage>) {
    let storage = Arc::new(MemoryStorage::new(capacity));
    let broker = Broker::new(Arc::new(MemoryTransport::new()), storage.clone());
    (broker, storage)
}

/// Transport recording whether each update was already in the history when published.
struct HistoryRecorder {
    storage: Arc<MemoryStorage>,
    stored_before_publish: Mutex<Vec<bool>>,
}

#[async_trait]
impl Transport for HistoryRecorder {
    async fn publish(&self, _topic: &str, message: &Message) -> HubResult<String> {
        let history = self
            .storage
            .retrieve_messages_after_id(EARLIEST, &["*".to_string()])
            .await?;
        let stored = history.iter().any(|(_, m)| m.id == message.id);
        self.stored_before_publish.lock().unwrap().push(stored);
        Ok(message.id.clone())
    }

    async fn subscribe(&self, _selector: &str, _sender: MessageSender) -> HubResult<()> {
        Ok(())
    }
}

/// Storage whose history cannot be read.
struct BrokenHistory;

#[async_trait]
impl Storage for BrokenHistory {
    async fn last_event_id(&self) -> HubResult<Option<String>> {
        Err(HubError::Backend("down".to_string()))
    }

    async fn retrieve_messages_after_id(
        &self,
        _id: &str,
        _selectors: &[String],
    ) -> HubResult<Vec<(String, Message)>> {
        Err(HubError::Backend("down".to_string()))
    }

    async fn store_message(&self, _topic: &str, _message: &Message) -> HubResult<()> {
        Err(HubError::Backend("down".to_string()))
    }

    async fn store_subscriptions(&self, _subscriptions: &[Subscription]) -> HubResult<()> {
        Ok(())
    }

    async fn remove_subscriptions(&self, _subscriptions: &[Subscription]) -> HubResult<()> {
        Ok(())
    }

    async fn find_subscriptions(
        &self,
        _subscriber: Option<&str>,
        _topic: Option<&str>,
    ) -> HubResult<Vec<Subscription>> {
        Ok(Vec::new())
    }
}

#[test]
fn test_message_sse_frame() {
    let message = Message::new("A", Some("x".to_string()));
    assert_eq!(message.to_sse(), "id:A\ndata:x\n\n");
}

#[test]
fn test_message_sse_frame_with_all_fields() {
    let mut message = Message::new("A", Some("first\nsecond".to_string()));
    message.event = Some("update".to_string());
    message.retry = Some(3000);
    assert_eq!(
        message.to_sse(),
        "id:A\nevent:update\nretry:3000\ndata:first\ndata:second\n\n"
    );
}

#[test]
fn test_message_sse_frame_without_data() {
    assert_eq!(Message::new("A", None).to_sse(), "id:A\n\n");
}

#[test]
fn test_message_json_omits_absent_fields() {
    let message = Message::new("A", None);
    assert_eq!(message.to_json().unwrap(), r#"{"id":"A","private":false}"#);
}

#[test]
fn test_message_json_accepts_type_alias() {
    let decoded = Message::from_json(r#"{"id":"A","data":"x","type":"update","retry":5}"#).unwrap();
    assert_eq!(decoded.event.as_deref(), Some("update"));
    assert_eq!(decoded.retry, Some(5));
    assert!(!decoded.private);

    let mut message = decoded.clone();
    message.private = true;
    assert_eq!(Message::from_json(&message.to_json().unwrap()).unwrap(), message);
}

#[test]
fn test_generated_ids_are_uuids() {
    let message = Message::with_generated_id(None);
    assert!(uuid::Uuid::parse_str(&message.id).is_ok());
}

#[test]
fn test_subscription_id_encodes_topic() {
    assert_eq!(
        subscription_id("/books/{id}", "alice"),
        "/.well-known/mercure/subscriptions/%2Fbooks%2F%7Bid%7D/alice"
    );
    assert_eq!(
        subscription_id("https://example.com/a-b_c.d", "bob"),
        "/.well-known/mercure/subscriptions/https%3A%2F%2Fexample.com%2Fa-b_c.d/bob"
    );
}

#[test]
fn test_subscription_json_ld() {
    let subscription = Subscription::new("/foo", "alice", Some(json!({"user": 1})));
    let value = serde_json::to_value(&subscription).unwrap();
    assert_eq!(
        value,
        json!({
            "@context": "https://mercure.rocks/",
            "id": "/.well-known/mercure/subscriptions/%2Ffoo/alice",
            "type": "Subscription",
            "subscriber": "alice",
            "topic": "/foo",
            "active": true,
            "payload": {"user": 1}
        })
    );

    let decoded: Subscription = serde_json::from_value(value).unwrap();
    assert_eq!(decoded, subscription);
    assert!(serde_json::to_value(subscription.deactivated()).unwrap()["active"] == false);
}

#[tokio::test]
async fn test_broker_publish_delivers_and_records() {
    let (broker, storage) = broker_with_history(10);
    let (tx, mut rx) = mpsc::unbounded_channel();
    broker.subscribe("/foo", tx).await.unwrap();

    let id = broker
        .publish("/foo", Message::new("A", Some("x".to_string())))
        .await
        .unwrap();
    assert_eq!(id, "A");

    let (topic, message) = rx.recv().await.unwrap();
    assert_eq!(topic, "/foo");
    assert_eq!(message.id, "A");
    assert_eq!(storage.last_event_id().await.unwrap().as_deref(), Some("A"));
}

#[tokio::test]
async fn test_broker_publishes_live_before_recording() {
    let storage = Arc::new(MemoryStorage::new(10));
    let recorder = Arc::new(HistoryRecorder {
        storage: storage.clone(),
        stored_before_publish: Mutex::new(Vec::new()),
    });
    let broker = Broker::new(recorder.clone(), storage.clone());

    broker.publish("/foo", Message::new("A", None)).await.unwrap();

    // live subscribers saw the update while replay could not yet return it
    assert_eq!(*recorder.stored_before_publish.lock().unwrap(), vec![false]);
    let history = broker.fetch_missed_messages(EARLIEST, &["/foo".to_string()]).await;
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn test_broker_replay_after_live_delivery_can_duplicate() {
    let (broker, _) = broker_with_history(10);
    let (tx, mut rx) = mpsc::unbounded_channel();
    broker.subscribe("/foo", tx).await.unwrap();

    broker.publish("/foo", Message::new("A", None)).await.unwrap();
    broker.publish("/foo", Message::new("B", None)).await.unwrap();
    assert_eq!(rx.recv().await.unwrap().1.id, "A");
    assert_eq!(rx.recv().await.unwrap().1.id, "B");

    // a client whose cursor is still at A gets B again from the history
    let replayed = broker.fetch_missed_messages("A", &["/foo".to_string()]).await;
    assert_eq!(replayed.len(), 1);
    assert_eq!(replayed[0].1.id, "B");
}

#[tokio::test]
async fn test_broker_history_failure_degrades() {
    let broker = Broker::new(Arc::new(MemoryTransport::new()), Arc::new(BrokenHistory));

    assert!(broker.fetch_missed_messages(EARLIEST, &["*".to_string()]).await.is_empty());
    assert_eq!(broker.last_event_id().await, None);
    // a failed store does not fail the publish
    assert!(broker.publish("/foo", Message::new("A", None)).await.is_ok());
}

#[tokio::test]
async fn test_dispatch_subscriptions_stores_and_announces() {
    let (broker, storage) = broker_with_history(10);
    let subscription = Subscription::new("/foo", "alice", None);
    let (tx, mut rx) = mpsc::unbounded_channel();
    broker.subscribe(&subscription.id, tx).await.unwrap();

    broker
        .dispatch_subscriptions(std::slice::from_ref(&subscription))
        .await
        .unwrap();

    assert_eq!(
        storage.find_subscriptions(None, None).await.unwrap(),
        vec![subscription.clone()]
    );
    let (topic, announcement) = rx.recv().await.unwrap();
    assert_eq!(topic, subscription.id);
    assert!(announcement.private);
    let body: serde_json::Value = serde_json::from_str(announcement.data.as_deref().unwrap()).unwrap();
    assert_eq!(body["type"], "Subscription");
    assert_eq!(body["active"], true);
}

#[tokio::test]
async fn test_connection_closed_flips_subscriptions_inactive() {
    let (broker, storage) = broker_with_history(10);
    let foo = Subscription::new("/foo", "alice", None);
    let bar = Subscription::new("/bar", "alice", None);
    let other = Subscription::new("/foo", "bob", None);
    broker
        .dispatch_subscriptions(&[foo.clone(), bar.clone(), other.clone()])
        .await
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    broker.subscribe(&foo.id, tx).await.unwrap();

    assert_eq!(broker.handle_connection_closed("alice").await.unwrap(), 2);

    let alice = storage.find_subscriptions(Some("alice"), None).await.unwrap();
    assert_eq!(alice.len(), 2);
    assert!(alice.iter().all(|s| !s.active));
    let bob = storage.find_subscriptions(Some("bob"), None).await.unwrap();
    assert!(bob[0].active);

    let (_, announcement) = rx.recv().await.unwrap();
    let body: serde_json::Value = serde_json::from_str(announcement.data.as_deref().unwrap()).unwrap();
    assert_eq!(body["active"], false);

    // nothing left to close
    assert_eq!(broker.handle_connection_closed("alice").await.unwrap(), 0);
}

#[tokio::test]
async fn test_registry_stays_bounded_across_many_connections() {
    let storage = Arc::new(MemoryStorage::with_closed_limit(0, 50));
    let broker = broker_with_registry(storage.clone());

    let mut last = None;
    for port in 10_000..10_500u16 {
        let client = Client::from_addr(SocketAddr::from(([127, 0, 0, 1], port)));
        let subscription = Subscription::new("/foo", &client.id, None);
        broker
            .dispatch_subscriptions(std::slice::from_ref(&subscription))
            .await
            .unwrap();
        assert_eq!(broker.handle_connection_closed(&client.id).await.unwrap(), 1);
        last = Some(subscription);
    }

    let registry = storage.find_subscriptions(None, None).await.unwrap();
    assert_eq!(registry.len(), 50);
    assert!(registry.iter().all(|s| !s.active));
    // the most recently closed subscription is still visible as inactive
    let last = last.unwrap();
    assert!(registry.iter().any(|s| s.id == last.id));
}
