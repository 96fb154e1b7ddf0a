//! # RabbitMQ Provider
//!
//! AMQP 0.9.1 implementation of the messaging traits using `lapin`.
//!
//! - **Confirm mode**: every channel runs `confirm.select`; publishes wait for the broker ack
//! - **Durable queues**: queues are declared durable before consuming
//! - **Persistent envelopes**: delivery mode 2 when requested
//! - **Manual ack**: consumers never auto-ack; prefetch bounds in-flight deliveries

use std::collections::HashSet;

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
    BasicQosOptions, ConfirmSelectOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::uri::{AMQPAuthority, AMQPQueryString, AMQPScheme, AMQPUri, AMQPUserInfo};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::RabbitMqConfig;
use crate::messaging::errors::{MessagingError, MessagingResult};
use crate::messaging::service::{BrokerConnector, BrokerSession, MessageConsumer, MessagePublisher};
use crate::messaging::types::{Delivery, PublishOptions, QueueTarget, ReceiptHandle};

const CONTENT_TYPE_JSON: &str = "application/json";
const PERSISTENT_DELIVERY_MODE: u8 = 2;

/// Dials RabbitMQ connections from configuration
#[derive(Debug, Clone)]
pub struct RabbitMqConnector {
    config: RabbitMqConfig,
    connection_name: String,
}

impl RabbitMqConnector {
    pub fn new(config: RabbitMqConfig, connection_name: impl Into<String>) -> Self {
        Self {
            config,
            connection_name: connection_name.into(),
        }
    }

    fn uri(&self, vhost: &str) -> AMQPUri {
        AMQPUri {
            scheme: AMQPScheme::AMQP,
            authority: AMQPAuthority {
                userinfo: AMQPUserInfo {
                    username: self.config.user.clone(),
                    password: self.config.pass.clone(),
                },
                host: self.config.host.clone(),
                port: self.config.port,
            },
            vhost: vhost.to_string(),
            query: AMQPQueryString {
                heartbeat: Some(self.config.heartbeat_seconds),
                connection_timeout: Some(self.config.connection_timeout_ms),
                ..Default::default()
            },
        }
    }
}

#[async_trait]
impl BrokerConnector for RabbitMqConnector {
    type Session = RabbitMqSession;

    async fn connect(&self, vhost: &str) -> MessagingResult<RabbitMqSession> {
        let address = self.config.redacted_address(vhost);

        let connection = Connection::connect_uri(
            self.uri(vhost),
            ConnectionProperties::default().with_connection_name(self.connection_name.clone().into()),
        )
        .await
        .map_err(|e| {
            MessagingError::connection(format!("RabbitMQ connection to {address} failed: {e}"))
        })?;

        let channel = connection.create_channel().await.map_err(|e| {
            MessagingError::connection(format!("RabbitMQ channel creation failed: {e}"))
        })?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| {
                MessagingError::configuration("rabbitmq", format!("Failed to enable confirms: {e}"))
            })?;

        info!(address = %address, connection_name = %self.connection_name, "Connected to RabbitMQ");

        Ok(RabbitMqSession {
            connection,
            channel,
            vhost: vhost.to_string(),
            consumer_prefix: self.connection_name.clone(),
            declared_queues: RwLock::new(HashSet::new()),
        })
    }

    fn default_vhost(&self) -> &str {
        &self.config.vhost
    }
}

/// One connection with one confirm-mode channel
pub struct RabbitMqSession {
    connection: Connection,
    channel: Channel,
    vhost: String,
    consumer_prefix: String,
    declared_queues: RwLock<HashSet<String>>,
}

impl std::fmt::Debug for RabbitMqSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RabbitMqSession")
            .field("vhost", &self.vhost)
            .field("connected", &self.connection.status().connected())
            .finish()
    }
}

#[async_trait]
impl MessagePublisher for RabbitMqSession {
    async fn publish(
        &self,
        target: &QueueTarget,
        payload: &[u8],
        options: &PublishOptions,
    ) -> MessagingResult<()> {
        if let Some(vhost) = &target.vhost {
            if vhost != &self.vhost {
                return Err(MessagingError::configuration(
                    "rabbitmq",
                    format!("session for vhost {} cannot publish to {}", self.vhost, target),
                ));
            }
        }

        let mut properties = BasicProperties::default().with_content_type(CONTENT_TYPE_JSON.into());
        if options.persistent {
            properties = properties.with_delivery_mode(PERSISTENT_DELIVERY_MODE);
        }
        if let Some(correlation_id) = &options.correlation_id {
            properties = properties.with_correlation_id(correlation_id.as_str().into());
        }

        let confirm = self
            .channel
            .basic_publish(
                "",            // Default exchange
                &target.queue, // Routing key = queue name
                BasicPublishOptions::default(),
                payload,
                properties,
            )
            .await
            .map_err(|e| MessagingError::publish(&target.queue, format!("Publish failed: {e}")))?;

        let confirmation = confirm.await.map_err(|e| {
            MessagingError::publish(&target.queue, format!("Publish confirmation failed: {e}"))
        })?;
        if confirmation.is_nack() {
            return Err(MessagingError::publish(&target.queue, "Broker nacked the publish"));
        }

        debug!(queue = %target.queue, vhost = %self.vhost, bytes = payload.len(), "Published message");
        Ok(())
    }
}

#[async_trait]
impl BrokerSession for RabbitMqSession {
    type Consumer = RabbitMqConsumer;

    fn vhost(&self) -> &str {
        &self.vhost
    }

    async fn ensure_queue(&self, queue: &str) -> MessagingResult<()> {
        {
            let declared = self.declared_queues.read().await;
            if declared.contains(queue) {
                return Ok(());
            }
        }

        self.channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| MessagingError::queue_operation(queue, "declare", e.to_string()))?;

        self.declared_queues.write().await.insert(queue.to_string());
        Ok(())
    }

    async fn consume(&self, queue: &str, prefetch: u16) -> MessagingResult<RabbitMqConsumer> {
        self.ensure_queue(queue).await?;

        self.channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await
            .map_err(|e| {
                MessagingError::configuration("rabbitmq", format!("Failed to set QoS: {e}"))
            })?;

        let consumer_tag = format!("{}-{}", self.consumer_prefix, Uuid::new_v4());
        let consumer = self
            .channel
            .basic_consume(
                queue,
                &consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| MessagingError::queue_operation(queue, "consume", e.to_string()))?;

        info!(queue = %queue, vhost = %self.vhost, consumer_tag = %consumer_tag, prefetch, "Consuming");

        Ok(RabbitMqConsumer {
            channel: self.channel.clone(),
            consumer,
            queue: queue.to_string(),
        })
    }

    async fn close(&self) {
        if let Err(e) = self.channel.close(200, "OK").await {
            debug!(error = %e, "Channel already closed");
        }
        if let Err(e) = self.connection.close(200, "OK").await {
            debug!(error = %e, "Connection already closed");
        }
    }
}

/// Manual-ack consumer on a session's channel
pub struct RabbitMqConsumer {
    channel: Channel,
    consumer: Consumer,
    queue: String,
}

#[async_trait]
impl MessageConsumer for RabbitMqConsumer {
    async fn next_delivery(&mut self) -> MessagingResult<Option<Delivery>> {
        match self.consumer.next().await {
            Some(Ok(delivery)) => Ok(Some(Delivery {
                correlation_id: delivery
                    .properties
                    .correlation_id()
                    .as_ref()
                    .map(|id| id.as_str().to_string()),
                receipt_handle: ReceiptHandle::new(delivery.delivery_tag),
                redelivered: delivery.redelivered,
                payload: delivery.data,
            })),
            Some(Err(e)) => Err(MessagingError::queue_operation(
                &self.queue,
                "receive",
                e.to_string(),
            )),
            None => {
                warn!(queue = %self.queue, "Consumer stream ended");
                Ok(None)
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> MessagingResult<()> {
        let delivery_tag = delivery.receipt_handle.delivery_tag();
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|e| {
                MessagingError::acknowledgement(&self.queue, delivery_tag, format!("ack failed: {e}"))
            })
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> MessagingResult<()> {
        let delivery_tag = delivery.receipt_handle.delivery_tag();
        self.channel
            .basic_nack(
                delivery_tag,
                BasicNackOptions {
                    requeue,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| {
                MessagingError::acknowledgement(&self.queue, delivery_tag, format!("nack failed: {e}"))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connector() -> RabbitMqConnector {
        RabbitMqConnector::new(
            RabbitMqConfig {
                host: "rabbit".to_string(),
                user: "bpm".to_string(),
                pass: "secret".to_string(),
                heartbeat_seconds: 30,
                ..RabbitMqConfig::default()
            },
            "bpm-connector-test",
        )
    }

    #[test]
    fn test_uri_uses_configured_credentials_and_vhost() {
        let uri = connector().uri("billing");
        assert_eq!(uri.authority.host, "rabbit");
        assert_eq!(uri.authority.port, 5672);
        assert_eq!(uri.authority.userinfo.username, "bpm");
        assert_eq!(uri.authority.userinfo.password, "secret");
        assert_eq!(uri.vhost, "billing");
        assert_eq!(uri.query.heartbeat, Some(30));
    }

    #[test]
    fn test_default_vhost_comes_from_config() {
        assert_eq!(connector().default_vhost(), "/");
    }

    // Integration tests require RabbitMQ on localhost:5672 with guest/guest

    #[tokio::test]
    #[ignore = "requires RabbitMQ running"]
    async fn test_rabbitmq_publish_consume_roundtrip() {
        let connector = RabbitMqConnector::new(RabbitMqConfig::default(), "bpm-connector-test");
        let session = connector.connect("/").await.unwrap();

        let queue = format!("test_roundtrip_{}", Uuid::new_v4());
        session.ensure_queue(&queue).await.unwrap();
        session
            .publish(
                &QueueTarget::new(&queue),
                br#"{"headers":{},"data":{}}"#,
                &PublishOptions::persistent(),
            )
            .await
            .unwrap();

        let mut consumer = session.consume(&queue, 1).await.unwrap();
        let delivery = consumer.next_delivery().await.unwrap().unwrap();
        assert_eq!(delivery.payload, br#"{"headers":{},"data":{}}"#.to_vec());
        consumer.ack(&delivery).await.unwrap();

        session.close().await;
    }

    #[tokio::test]
    #[ignore = "requires RabbitMQ running"]
    async fn test_rabbitmq_reply_carries_correlation_id() {
        let connector = RabbitMqConnector::new(RabbitMqConfig::default(), "bpm-connector-test");
        let session = connector.connect("/").await.unwrap();

        let queue = format!("test_reply_{}", Uuid::new_v4());
        session.ensure_queue(&queue).await.unwrap();
        session
            .publish(
                &QueueTarget::new(&queue),
                br#"{"success":true}"#,
                &PublishOptions::reply("corr-42"),
            )
            .await
            .unwrap();

        let mut consumer = session.consume(&queue, 1).await.unwrap();
        let delivery = consumer.next_delivery().await.unwrap().unwrap();
        assert_eq!(delivery.correlation_id.as_deref(), Some("corr-42"));
        consumer.ack(&delivery).await.unwrap();

        session.close().await;
    }
}
