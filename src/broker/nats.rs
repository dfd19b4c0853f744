//! NATS adapters for the broker seam

use super::{BrokerError, BrokerMessage, MessagePublisher, MessageSource, PollOutcome};
use async_nats::{Client, HeaderMap, Subscriber};
use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;
use tracing::{debug, info};

/// Header carrying the routing key
pub const KEY_HEADER: &str = "Message-Key";

/// Connect to a NATS server
pub async fn connect(url: &str) -> Result<Client, BrokerError> {
    let client = async_nats::connect(url)
        .await
        .map_err(|e| BrokerError::Connect {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
    info!(url = %url, "Connected to NATS");
    Ok(client)
}

/// Publisher for telemetry events
#[derive(Clone)]
pub struct NatsPublisher {
    client: Client,
}

impl NatsPublisher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MessagePublisher for NatsPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        let mut headers = HeaderMap::new();
        headers.insert(KEY_HEADER, key);

        self.client
            .publish_with_headers(topic.to_string(), headers, payload.into())
            .await
            .map_err(|e| BrokerError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;

        debug!(topic = %topic, key = %key, "Published telemetry event");
        Ok(())
    }

    async fn flush(&self) -> Result<(), BrokerError> {
        self.client.flush().await.map_err(|e| BrokerError::Publish {
            topic: "*".to_string(),
            reason: e.to_string(),
        })
    }
}

/// Queue-group consumer for telemetry events
pub struct NatsSource {
    subscriber: Subscriber,
    topic: String,
    closed: bool,
}

impl NatsSource {
    /// Join `group` on `topic`; scorer instances in one group share the stream
    pub async fn subscribe(client: &Client, topic: &str, group: &str) -> Result<Self, BrokerError> {
        let subscriber = client
            .queue_subscribe(topic.to_string(), group.to_string())
            .await
            .map_err(|e| BrokerError::Subscribe {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;
        info!(topic = %topic, group = %group, "Subscribed to telemetry topic");

        Ok(Self {
            subscriber,
            topic: topic.to_string(),
            closed: false,
        })
    }

    /// Get the topic name
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl MessageSource for NatsSource {
    async fn poll(&mut self, timeout: Duration) -> Result<PollOutcome, BrokerError> {
        if self.closed {
            // Keep the bounded-wait contract once the subscription is gone.
            tokio::time::sleep(timeout).await;
            return Err(BrokerError::Closed(self.topic.clone()));
        }

        match tokio::time::timeout(timeout, self.subscriber.next()).await {
            Err(_) => Ok(PollOutcome::Timeout),
            Ok(None) => {
                self.closed = true;
                Err(BrokerError::Closed(self.topic.clone()))
            }
            Ok(Some(message)) => {
                let key = message
                    .headers
                    .as_ref()
                    .and_then(|h| h.get(KEY_HEADER))
                    .map(|v| v.as_str().to_string());

                Ok(PollOutcome::Message(BrokerMessage {
                    key,
                    payload: message.payload.to_vec(),
                    partition: 0,
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    // Integration tests would require a running NATS server
}
