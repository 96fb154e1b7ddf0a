//! # In-Memory Broker
//!
//! In-process implementation of the messaging traits for tests and local runs.
//! Queues are FIFO per `(vhost, queue)`; every publish, ack and nack is
//! recorded so callers can assert on them. Connection loss and connect
//! failures can be scripted.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::messaging::errors::{MessagingError, MessagingResult};
use crate::messaging::service::{BrokerConnector, BrokerSession, MessageConsumer, MessagePublisher};
use crate::messaging::types::{Delivery, PublishOptions, QueueTarget, ReceiptHandle};

/// Ordered log of side effects shared between fakes, for asserting call order
#[derive(Debug, Clone, Default)]
pub struct EventJournal(Arc<Mutex<Vec<String>>>);

impl EventJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

/// A message published through the in-memory broker
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub vhost: String,
    pub queue: String,
    pub payload: Vec<u8>,
    pub options: PublishOptions,
}

impl PublishedMessage {
    /// Payload parsed as JSON, `Null` when it is not JSON
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.payload).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Debug, Clone)]
struct StoredMessage {
    payload: Vec<u8>,
    correlation_id: Option<String>,
    redelivered: bool,
}

type QueueKey = (String, String);

#[derive(Debug, Default)]
struct BrokerState {
    queues: HashMap<QueueKey, VecDeque<StoredMessage>>,
    in_flight: HashMap<u64, (QueueKey, StoredMessage)>,
    published: Vec<PublishedMessage>,
    acked: Vec<u64>,
    nacked: Vec<(u64, bool)>,
    next_delivery_tag: u64,
    connect_attempts: usize,
    pending_connect_failures: usize,
    /// Bumped by `drop_connections`; sessions from older epochs are dead
    epoch: u64,
    closed_sessions: usize,
}

#[derive(Debug, Clone)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    notify: Arc<Notify>,
    default_vhost: String,
    journal: Option<EventJournal>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new("/")
    }
}

impl InMemoryBroker {
    pub fn new(default_vhost: impl Into<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(BrokerState::default())),
            notify: Arc::new(Notify::new()),
            default_vhost: default_vhost.into(),
            journal: None,
        }
    }

    /// Record publishes and acks into a shared journal
    pub fn with_journal(mut self, journal: EventJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Put a message on a queue of the default vhost without recording a publish
    pub fn enqueue(&self, queue: &str, payload: impl Into<Vec<u8>>) {
        let key = (self.default_vhost.clone(), queue.to_string());
        self.state
            .lock()
            .queues
            .entry(key)
            .or_default()
            .push_back(StoredMessage {
                payload: payload.into(),
                correlation_id: None,
                redelivered: false,
            });
        self.notify.notify_one();
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.state.lock().published.clone()
    }

    pub fn published_to(&self, queue: &str) -> Vec<PublishedMessage> {
        self.published()
            .into_iter()
            .filter(|message| message.queue == queue)
            .collect()
    }

    pub fn acked(&self) -> Vec<u64> {
        self.state.lock().acked.clone()
    }

    pub fn nacked(&self) -> Vec<(u64, bool)> {
        self.state.lock().nacked.clone()
    }

    /// Messages waiting on a queue of the default vhost
    pub fn pending(&self, queue: &str) -> usize {
        let key = (self.default_vhost.clone(), queue.to_string());
        self.state.lock().queues.get(&key).map_or(0, VecDeque::len)
    }

    pub fn connect_attempts(&self) -> usize {
        self.state.lock().connect_attempts
    }

    pub fn closed_sessions(&self) -> usize {
        self.state.lock().closed_sessions
    }

    /// Make the next `count` connection attempts fail
    pub fn fail_next_connects(&self, count: usize) {
        self.state.lock().pending_connect_failures = count;
    }

    /// Simulate connection loss: every open session and consumer starts failing
    pub fn drop_connections(&self) {
        {
            let mut state = self.state.lock();
            state.epoch += 1;
            // unacked deliveries go back to their queues, as on a real broker
            let in_flight: Vec<_> = state.in_flight.drain().collect();
            for (_, (key, mut message)) in in_flight {
                message.redelivered = true;
                state.queues.entry(key).or_default().push_front(message);
            }
        }
        self.notify.notify_waiters();
    }

    fn record(&self, entry: String) {
        if let Some(journal) = &self.journal {
            journal.record(entry);
        }
    }

    fn current_epoch(&self) -> u64 {
        self.state.lock().epoch
    }

    fn check_epoch(&self, epoch: u64) -> MessagingResult<()> {
        if self.current_epoch() == epoch {
            Ok(())
        } else {
            Err(MessagingError::connection("in-memory connection dropped"))
        }
    }
}

#[async_trait]
impl BrokerConnector for InMemoryBroker {
    type Session = InMemorySession;

    async fn connect(&self, vhost: &str) -> MessagingResult<InMemorySession> {
        let epoch = {
            let mut state = self.state.lock();
            state.connect_attempts += 1;
            if state.pending_connect_failures > 0 {
                state.pending_connect_failures -= 1;
                return Err(MessagingError::connection("in-memory broker unreachable"));
            }
            state.epoch
        };

        Ok(InMemorySession {
            broker: self.clone(),
            vhost: vhost.to_string(),
            epoch,
        })
    }

    fn default_vhost(&self) -> &str {
        &self.default_vhost
    }
}

#[derive(Debug, Clone)]
pub struct InMemorySession {
    broker: InMemoryBroker,
    vhost: String,
    epoch: u64,
}

#[async_trait]
impl MessagePublisher for InMemorySession {
    async fn publish(
        &self,
        target: &QueueTarget,
        payload: &[u8],
        options: &PublishOptions,
    ) -> MessagingResult<()> {
        self.broker.check_epoch(self.epoch)?;
        let vhost = target.vhost.clone().unwrap_or_else(|| self.vhost.clone());
        if vhost != self.vhost {
            return Err(MessagingError::configuration(
                "in_memory",
                format!("session for vhost {} cannot publish to {}", self.vhost, target),
            ));
        }

        {
            let mut state = self.broker.state.lock();
            state.published.push(PublishedMessage {
                vhost: vhost.clone(),
                queue: target.queue.clone(),
                payload: payload.to_vec(),
                options: options.clone(),
            });
            state
                .queues
                .entry((vhost, target.queue.clone()))
                .or_default()
                .push_back(StoredMessage {
                    payload: payload.to_vec(),
                    correlation_id: options.correlation_id.clone(),
                    redelivered: false,
                });
        }
        self.broker.record(format!("publish:{}", target.queue));
        self.broker.notify.notify_one();
        Ok(())
    }
}

#[async_trait]
impl BrokerSession for InMemorySession {
    type Consumer = InMemoryConsumer;

    fn vhost(&self) -> &str {
        &self.vhost
    }

    async fn ensure_queue(&self, queue: &str) -> MessagingResult<()> {
        self.broker.check_epoch(self.epoch)?;
        self.broker
            .state
            .lock()
            .queues
            .entry((self.vhost.clone(), queue.to_string()))
            .or_default();
        Ok(())
    }

    async fn consume(&self, queue: &str, _prefetch: u16) -> MessagingResult<InMemoryConsumer> {
        self.ensure_queue(queue).await?;
        Ok(InMemoryConsumer {
            broker: self.broker.clone(),
            key: (self.vhost.clone(), queue.to_string()),
            epoch: self.epoch,
        })
    }

    async fn close(&self) {
        self.broker.state.lock().closed_sessions += 1;
    }
}

#[derive(Debug)]
pub struct InMemoryConsumer {
    broker: InMemoryBroker,
    key: QueueKey,
    epoch: u64,
}

#[async_trait]
impl MessageConsumer for InMemoryConsumer {
    async fn next_delivery(&mut self) -> MessagingResult<Option<Delivery>> {
        loop {
            // registered before the state check so a concurrent notify is not lost
            let notified = self.broker.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = self.broker.state.lock();
                if state.epoch != self.epoch {
                    return Err(MessagingError::connection("in-memory connection dropped"));
                }
                let next = state.queues.get_mut(&self.key).and_then(VecDeque::pop_front);
                if let Some(message) = next {
                    state.next_delivery_tag += 1;
                    let delivery_tag = state.next_delivery_tag;
                    state
                        .in_flight
                        .insert(delivery_tag, (self.key.clone(), message.clone()));
                    return Ok(Some(Delivery {
                        payload: message.payload,
                        receipt_handle: ReceiptHandle::new(delivery_tag),
                        correlation_id: message.correlation_id,
                        redelivered: message.redelivered,
                    }));
                }
            }
            notified.await;
        }
    }

    async fn ack(&self, delivery: &Delivery) -> MessagingResult<()> {
        self.broker.check_epoch(self.epoch)?;
        let delivery_tag = delivery.receipt_handle.delivery_tag();
        {
            let mut state = self.broker.state.lock();
            state.in_flight.remove(&delivery_tag);
            state.acked.push(delivery_tag);
        }
        self.broker.record(format!("ack:{delivery_tag}"));
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> MessagingResult<()> {
        self.broker.check_epoch(self.epoch)?;
        let delivery_tag = delivery.receipt_handle.delivery_tag();
        {
            let mut state = self.broker.state.lock();
            let message = state.in_flight.remove(&delivery_tag);
            state.nacked.push((delivery_tag, requeue));
            if let (true, Some((key, mut message))) = (requeue, message) {
                message.redelivered = true;
                state.queues.entry(key).or_default().push_front(message);
            }
        }
        self.broker.record(format!("nack:{delivery_tag}"));
        if requeue {
            self.broker.notify.notify_one();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_then_consume_and_ack() {
        let broker = InMemoryBroker::default();
        let session = broker.connect("/").await.unwrap();

        session
            .publish(&QueueTarget::new("orders"), b"{}", &PublishOptions::persistent())
            .await
            .unwrap();
        assert_eq!(broker.published_to("orders").len(), 1);
        assert!(broker.published()[0].options.persistent);

        let mut consumer = session.consume("orders", 1).await.unwrap();
        let delivery = consumer.next_delivery().await.unwrap().unwrap();
        assert_eq!(delivery.payload, b"{}".to_vec());
        consumer.ack(&delivery).await.unwrap();

        assert_eq!(broker.acked(), vec![delivery.receipt_handle.delivery_tag()]);
        assert_eq!(broker.pending("orders"), 0);
    }

    #[tokio::test]
    async fn test_nack_with_requeue_redelivers() {
        let broker = InMemoryBroker::default();
        broker.enqueue("orders", b"one".to_vec());
        let session = broker.connect("/").await.unwrap();
        let mut consumer = session.consume("orders", 1).await.unwrap();

        let first = consumer.next_delivery().await.unwrap().unwrap();
        consumer.nack(&first, true).await.unwrap();
        let again = consumer.next_delivery().await.unwrap().unwrap();
        assert_eq!(again.payload, b"one".to_vec());
        assert!(again.redelivered);

        consumer.nack(&again, false).await.unwrap();
        assert_eq!(broker.pending("orders"), 0);
        assert_eq!(broker.nacked().len(), 2);
    }

    #[tokio::test]
    async fn test_scripted_connect_failures() {
        let broker = InMemoryBroker::default();
        broker.fail_next_connects(2);

        assert!(broker.connect("/").await.is_err());
        assert!(broker.connect("/").await.is_err());
        assert!(broker.connect("/").await.is_ok());
        assert_eq!(broker.connect_attempts(), 3);
    }

    #[tokio::test]
    async fn test_dropped_connection_fails_old_sessions() {
        let broker = InMemoryBroker::default();
        let session = broker.connect("/").await.unwrap();
        broker.drop_connections();

        let result = session
            .publish(&QueueTarget::new("orders"), b"{}", &PublishOptions::default())
            .await;
        assert!(matches!(result, Err(MessagingError::Connection { .. })));

        let fresh = broker.connect("/").await.unwrap();
        assert!(fresh
            .publish(&QueueTarget::new("orders"), b"{}", &PublishOptions::default())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_session_rejects_foreign_vhost() {
        let broker = InMemoryBroker::default();
        let session = broker.connect("/").await.unwrap();
        let result = session
            .publish(
                &QueueTarget::on_vhost("billing", "orders"),
                b"{}",
                &PublishOptions::default(),
            )
            .await;
        assert!(matches!(result, Err(MessagingError::Configuration { .. })));
    }

    #[tokio::test]
    async fn test_journal_records_order() {
        let journal = EventJournal::new();
        let broker = InMemoryBroker::default().with_journal(journal.clone());
        let session = broker.connect("/").await.unwrap();
        session
            .publish(&QueueTarget::new("replies"), b"{}", &PublishOptions::reply("c1"))
            .await
            .unwrap();
        assert_eq!(journal.entries(), vec!["publish:replies".to_string()]);
    }
}
