//! # Echo Worker
//!
//! Stand-in for a real downstream worker: takes envelopes from the inbound
//! queue and hands them straight back to the outbound queue with a fixed
//! `success` flag, so the whole loop can be exercised end to end.

use serde_json::Value;
use tracing::info;

use crate::config::BridgeConfig;
use crate::constants::{headers, owners};
use crate::error::BridgeResult;
use crate::logging::log_bridge_operation;
use crate::messaging::{
    BrokerConnector, BrokerSession, Delivery, Envelope, MessageConsumer, MessagePublisher,
    PublishOptions, QueueTarget,
};
use crate::shutdown::ShutdownSignal;

pub struct EchoWorker<C> {
    connector: C,
    queue_in: String,
    queue_out: String,
    success: bool,
}

impl<C: BrokerConnector> EchoWorker<C> {
    pub fn new(connector: C, config: &BridgeConfig, success: bool) -> Self {
        Self {
            connector,
            queue_in: config.rabbitmq.queue_in.clone(),
            queue_out: config.rabbitmq.queue_out.clone(),
            success,
        }
    }

    /// Outcome for one inbound envelope: the same envelope with `success` set
    pub fn echo(&self, envelope: &mut Envelope) {
        envelope.set_header(headers::SUCCESS, Value::Bool(self.success));
    }

    /// Consume until shutdown or until the consumer is cancelled
    pub async fn run(&self, shutdown: ShutdownSignal) -> BridgeResult<()> {
        let session = self.connector.connect(self.connector.default_vhost()).await?;
        session.ensure_queue(&self.queue_out).await?;
        let mut consumer = session.consume(&self.queue_in, 1).await?;

        log_bridge_operation(
            owners::CONSUMER,
            "consume",
            Some(&self.queue_in),
            "waiting",
            Some("Waiting for messages. To exit press CTRL+C"),
        );

        let result = loop {
            let next = tokio::select! {
                _ = shutdown.wait() => break Ok(()),
                next = consumer.next_delivery() => next,
            };
            match next {
                Ok(Some(delivery)) => {
                    if let Err(e) = self.forward(&session, &consumer, &delivery).await {
                        break Err(e);
                    }
                }
                Ok(None) => break Ok(()),
                Err(e) => break Err(e.into()),
            }
        };

        session.close().await;
        info!(queue = %self.queue_in, "Echo worker stopped");
        result
    }

    async fn forward(
        &self,
        session: &C::Session,
        consumer: &<C::Session as BrokerSession>::Consumer,
        delivery: &Delivery,
    ) -> BridgeResult<()> {
        log_bridge_operation(
            owners::CONSUMER,
            "input",
            Some(&self.queue_in),
            "received",
            Some(&format!("Received {}", delivery.body_text())),
        );

        match Envelope::from_slice(&delivery.payload) {
            Ok(mut envelope) => {
                self.echo(&mut envelope);
                session
                    .publish(
                        &QueueTarget::new(self.queue_out.clone()),
                        &envelope.to_bytes()?,
                        &PublishOptions::persistent(),
                    )
                    .await?;
            }
            Err(e) => {
                log_bridge_operation(
                    owners::CONSUMER,
                    "input",
                    Some(&self.queue_in),
                    "skipped",
                    Some(&e.to_string()),
                );
            }
        }
        consumer.ack(delivery).await?;
        Ok(())
    }
}
