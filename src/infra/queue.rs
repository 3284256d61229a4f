//! Kafka-backed queue consumer.
//!
//! One [`StreamConsumer`] per pipeline instance, subscribed to that chain's
//! proof topic under a shared consumer group. Offsets are auto-committed, so
//! delivery is at-least-once; redelivered records are absorbed by the dedup
//! check downstream.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::Message;

use crate::config::QueueConfig;

use super::error::RelayerError;
use super::traits::QueueConsumer;
use super::Result;

const METADATA_TIMEOUT: Duration = Duration::from_secs(5);

/// A consumer-group subscription to one chain's proof topic.
pub struct KafkaQueueConsumer {
    consumer: Arc<StreamConsumer>,
    topic: String,
}

impl KafkaQueueConsumer {
    /// Create the consumer and subscribe. Fails fast on unreachable brokers
    /// only at first `recv`/probe; subscription itself validates the config.
    pub fn connect(config: &QueueConfig) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .create()?;

        consumer.subscribe(&[&config.topic])?;

        Ok(Self {
            consumer: Arc::new(consumer),
            topic: config.topic.clone(),
        })
    }
}

#[async_trait]
impl QueueConsumer for KafkaQueueConsumer {
    async fn recv(&self) -> Result<Vec<u8>> {
        let message = self.consumer.recv().await?;
        let payload = message
            .payload()
            .ok_or_else(|| RelayerError::Internal("queue message with empty payload".into()))?;
        Ok(payload.to_vec())
    }

    async fn health_check(&self) -> Result<()> {
        let consumer = self.consumer.clone();
        let topic = self.topic.clone();
        // fetch_metadata is a blocking librdkafka call.
        tokio::task::spawn_blocking(move || {
            consumer
                .client()
                .fetch_metadata(Some(&topic), METADATA_TIMEOUT)
                .map(|_| ())
                .map_err(RelayerError::from)
        })
        .await
        .map_err(|e| RelayerError::Internal(format!("metadata probe panicked: {e}")))?
    }
}
