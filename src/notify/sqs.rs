//! SQS adapter for the notification queue.

use crate::error::SiteError;
use crate::notify::{NotificationQueue, QueueMessage};
use async_trait::async_trait;
use aws_config::Region;
use tracing::debug;

#[derive(Clone)]
pub struct SqsQueue {
    client: aws_sdk_sqs::Client,
    queue_url: String,
}

impl SqsQueue {
    /// Build the SQS client from the ambient AWS environment.
    pub async fn new(queue_url: String, region: String) -> Self {
        let shared = aws_config::from_env()
            .region(Region::new(region))
            .load()
            .await;

        Self {
            client: aws_sdk_sqs::Client::new(&shared),
            queue_url,
        }
    }
}

#[async_trait]
impl NotificationQueue for SqsQueue {
    async fn receive(&self, max_messages: i32) -> Result<Vec<QueueMessage>, SiteError> {
        let resp = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max_messages)
            .wait_time_seconds(0)
            .send()
            .await
            .map_err(|e| SiteError::Queue(e.to_string()))?;

        let messages: Vec<QueueMessage> = resp
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| {
                let body = m.body?;
                let receipt_handle = m.receipt_handle?;
                Some(QueueMessage {
                    body,
                    receipt_handle,
                })
            })
            .collect();

        if !messages.is_empty() {
            debug!(count = messages.len(), "Received queue messages");
        }

        Ok(messages)
    }

    async fn acknowledge(&self, receipt_handle: &str) -> Result<(), SiteError> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| SiteError::Queue(e.to_string()))?;
        Ok(())
    }
}
