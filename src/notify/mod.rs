//! Storage-change notification source.
//!
//! A pollable queue delivers change notifications for the bucket. Messages
//! carry the standard S3 event envelope; after handling, a message is
//! acknowledged (deleted from the queue) whether or not it was relevant, so
//! irrelevant or malformed payloads are never redelivered.

pub mod sqs;

use crate::error::SiteError;
use async_trait::async_trait;
use serde::Deserialize;

/// A received message: raw body plus the opaque handle used to acknowledge it.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub body: String,
    pub receipt_handle: String,
}

#[async_trait]
pub trait NotificationQueue: Send + Sync {
    /// Receive up to `max_messages` pending notifications.
    async fn receive(&self, max_messages: i32) -> Result<Vec<QueueMessage>, SiteError>;

    /// Acknowledge (delete) a message so it is not redelivered.
    async fn acknowledge(&self, receipt_handle: &str) -> Result<(), SiteError>;
}

/// S3 change-event envelope as delivered on the queue.
#[derive(Debug, Deserialize)]
pub struct StorageEventEnvelope {
    #[serde(rename = "Records", default)]
    pub records: Vec<StorageEventRecord>,
}

#[derive(Debug, Deserialize)]
pub struct StorageEventRecord {
    #[serde(rename = "eventName", default)]
    pub event_name: String,
    pub s3: S3Entity,
}

#[derive(Debug, Deserialize)]
pub struct S3Entity {
    pub object: S3ObjectRef,
}

#[derive(Debug, Deserialize)]
pub struct S3ObjectRef {
    /// URL-escaped object key.
    pub key: String,
}

impl StorageEventRecord {
    /// The affected object key with URL escaping undone.
    pub fn decoded_key(&self) -> String {
        urlencoding::decode(&self.s3.object.key)
            .map(|c| c.into_owned())
            .unwrap_or_else(|_| self.s3.object.key.clone())
    }
}

impl StorageEventEnvelope {
    pub fn parse(body: &str) -> Result<Self, SiteError> {
        Ok(serde_json::from_str(body)?)
    }
}
