//! # Session Pool
//!
//! Keeps one broker session per vhost for publishers that address several
//! vhosts. A session that fails a publish is evicted and closed; the next
//! publish to that vhost dials a fresh one.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::errors::MessagingResult;
use super::service::{BrokerConnector, BrokerSession, MessagePublisher};
use super::types::{PublishOptions, QueueTarget};

pub struct SessionPool<C: BrokerConnector> {
    connector: C,
    sessions: Mutex<HashMap<String, Arc<C::Session>>>,
}

impl<C: BrokerConnector> SessionPool<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    async fn session_for(&self, vhost: &str) -> MessagingResult<Arc<C::Session>> {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get(vhost) {
            return Ok(Arc::clone(session));
        }

        debug!(vhost = %vhost, "Opening pooled broker session");
        let session = Arc::new(self.connector.connect(vhost).await?);
        sessions.insert(vhost.to_string(), Arc::clone(&session));
        Ok(session)
    }

    async fn evict(&self, vhost: &str) {
        let removed = self.sessions.lock().await.remove(vhost);
        if let Some(session) = removed {
            session.close().await;
        }
    }

    /// Close every pooled session
    pub async fn close_all(&self) {
        let sessions: Vec<_> = self.sessions.lock().await.drain().collect();
        for (_, session) in sessions {
            session.close().await;
        }
    }

    pub async fn open_sessions(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

#[async_trait]
impl<C: BrokerConnector> MessagePublisher for SessionPool<C> {
    async fn publish(
        &self,
        target: &QueueTarget,
        payload: &[u8],
        options: &PublishOptions,
    ) -> MessagingResult<()> {
        let vhost = target
            .vhost
            .clone()
            .unwrap_or_else(|| self.connector.default_vhost().to_string());
        let session = self.session_for(&vhost).await?;

        let addressed = QueueTarget::on_vhost(vhost.clone(), target.queue.clone());
        match session.publish(&addressed, payload, options).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(vhost = %vhost, queue = %target.queue, error = %e, "Publish failed, dropping session");
                self.evict(&vhost).await;
                Err(e)
            }
        }
    }
}
