use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::AppError;

/// Attribute selecting the handler.
pub const API_ATTRIBUTE: &str = "api";
/// Attribute naming the configuration document.
pub const CONFIG_ATTRIBUTE: &str = "config";

/// Body of a Pub/Sub push delivery.
/// Documentation: https://cloud.google.com/pubsub/docs/push
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PushEnvelope {
    pub message: PubsubMessage,

    /// Full subscription name, e.g. "projects/p/subscriptions/s"
    #[serde(default)]
    pub subscription: Option<String>,
}

/// A single Pub/Sub message.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", try_from = "WirePubsubMessage")]
pub struct PubsubMessage {
    /// Base64-encoded payload
    pub data: String,

    pub attributes: HashMap<String, String>,

    /// Unique message identifier, used only for logging
    pub message_id: String,

    pub publish_time: Option<String>,
}

/// Push deliveries repeat `messageId` and `publishTime` in snake case, and
/// either spelling may be the only one present.
#[derive(Deserialize)]
struct WirePubsubMessage {
    #[serde(default)]
    data: String,
    #[serde(default)]
    attributes: HashMap<String, String>,
    #[serde(rename = "messageId")]
    message_id_camel: Option<String>,
    #[serde(rename = "message_id")]
    message_id_snake: Option<String>,
    #[serde(rename = "publishTime")]
    publish_time_camel: Option<String>,
    #[serde(rename = "publish_time")]
    publish_time_snake: Option<String>,
}

impl TryFrom<WirePubsubMessage> for PubsubMessage {
    type Error = String;

    fn try_from(wire: WirePubsubMessage) -> Result<Self, Self::Error> {
        let message_id = wire
            .message_id_camel
            .or(wire.message_id_snake)
            .ok_or_else(|| "missing field `messageId`".to_string())?;

        Ok(Self {
            data: wire.data,
            attributes: wire.attributes,
            message_id,
            publish_time: wire.publish_time_camel.or(wire.publish_time_snake),
        })
    }
}

/// The `api` / `config` attribute pair that routes a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingAttributes {
    pub api: String,
    pub config: String,
}

impl PubsubMessage {
    pub fn new(data: &[u8], attributes: HashMap<String, String>, message_id: &str) -> Self {
        Self {
            data: STANDARD.encode(data),
            attributes,
            message_id: message_id.to_string(),
            publish_time: None,
        }
    }

    /// Decode the base64 payload into UTF-8 text.
    pub fn decode_data(&self) -> Result<String, AppError> {
        let bytes = STANDARD.decode(self.data.trim())?;
        Ok(String::from_utf8(bytes)?)
    }

    /// Look up a required attribute.
    pub fn attribute(&self, name: &str) -> Result<&str, AppError> {
        self.attributes
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| AppError::BadRequest(format!("Missing '{}' attribute", name)))
    }

    pub fn routing(&self) -> Result<RoutingAttributes, AppError> {
        Ok(RoutingAttributes {
            api: self.attribute(API_ATTRIBUTE)?.to_string(),
            config: self.attribute(CONFIG_ATTRIBUTE)?.to_string(),
        })
    }
}
