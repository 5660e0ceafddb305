//! Routes a decoded message to the handler registered for its `api` tag.
//!
//! Unknown tags fall through to [`ApiNotSupported`], which only logs.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config_store::{ApiConfigDocument, ConfigStore};
use crate::customer_match::{CustomerMatchHandler, CUSTOMER_MATCH_API};
use crate::errors::AppError;
use crate::google_ads_client::AdsClientFactory;
use crate::pubsub_models::PubsubMessage;

/// A sink for one API type.
#[async_trait]
pub trait ApiHandler: Send + Sync {
    /// Send `records` (the decoded message body) using `config`, the tenant
    /// configuration document if one exists.
    async fn handle(
        &self,
        records: &str,
        message_id: &str,
        config: Option<&ApiConfigDocument>,
    ) -> Result<(), AppError>;
}

/// Fallback for tags with no registered handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiNotSupported;

#[async_trait]
impl ApiHandler for ApiNotSupported {
    async fn handle(
        &self,
        _records: &str,
        message_id: &str,
        _config: Option<&ApiConfigDocument>,
    ) -> Result<(), AppError> {
        tracing::warn!("Api not supported: {}", message_id);
        Ok(())
    }
}

/// Tag → handler table.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<&'static str, Arc<dyn ApiHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in handler.
    pub fn with_defaults(ads_factory: Arc<dyn AdsClientFactory>) -> Self {
        Self {
            handlers: HashMap::from([(
                CUSTOMER_MATCH_API,
                Arc::new(CustomerMatchHandler::new(ads_factory)) as Arc<dyn ApiHandler>,
            )]),
        }
    }

    pub fn register(&mut self, api: &'static str, handler: Arc<dyn ApiHandler>) {
        self.handlers.insert(api, handler);
    }

    pub fn is_supported(&self, api: &str) -> bool {
        self.handlers.contains_key(api)
    }

    /// The handler for `api`, or [`ApiNotSupported`].
    pub fn get(&self, api: &str) -> Arc<dyn ApiHandler> {
        self.handlers
            .get(api)
            .cloned()
            .unwrap_or_else(|| Arc::new(ApiNotSupported))
    }
}

/// How a message was routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Handled,
    Unsupported,
}

pub struct Dispatcher {
    config_store: Arc<dyn ConfigStore>,
    registry: HandlerRegistry,
}

impl Dispatcher {
    pub fn new(config_store: Arc<dyn ConfigStore>, registry: HandlerRegistry) -> Self {
        Self {
            config_store,
            registry,
        }
    }

    /// Decode `message`, load its configuration and run the matching handler.
    pub async fn dispatch(&self, message: &PubsubMessage) -> Result<DispatchOutcome, AppError> {
        let records = message.decode_data()?;
        let routing = message.routing()?;

        tracing::info!(
            "[{}] Dispatching message: api={}, config={}",
            message.message_id,
            routing.api,
            routing.config
        );

        let config = self
            .config_store
            .fetch(&routing.api, &routing.config)
            .await?;

        let handler = self.registry.get(&routing.api);
        handler
            .handle(&records, &message.message_id, config.as_ref())
            .await?;

        if self.registry.is_supported(&routing.api) {
            Ok(DispatchOutcome::Handled)
        } else {
            Ok(DispatchOutcome::Unsupported)
        }
    }
}
