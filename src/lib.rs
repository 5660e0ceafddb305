//! Tentacles Connector Library
//!
//! Relays hashed customer records published to Pub/Sub into Google Ads
//! Customer Match user lists. Each message names an API type and a
//! configuration document; the configuration is read from Firestore and the
//! message is routed to the handler registered for the API type.
//!
//! # Modules
//!
//! - `api`: HTTP-facing components.
//! - `core`: Dispatch and Customer Match logic.
//! - `integrations`: External service clients and wire models.
//! - `config`: Configuration management.
//! - `config_store`: Tenant configuration lookup (Firestore).
//! - `customer_match`: Customer Match handler (list find-or-create, member upload).
//! - `dispatcher`: API-type to handler routing.
//! - `errors`: Error handling types.
//! - `google_ads_client`: Google Ads REST client.
//! - `google_ads_models`: Google Ads credentials, members and list models.
//! - `handlers`: Application state, health check and router.
//! - `pubsub_handler`: Pub/Sub push endpoint.
//! - `pubsub_models`: Pub/Sub push payload models.

pub mod api;
pub mod core;
pub mod integrations;

pub mod config;
pub mod config_store;
pub mod customer_match;
pub mod dispatcher;
pub mod errors;
pub mod google_ads_client;
pub mod google_ads_models;
pub mod handlers;
pub mod pubsub_handler;
pub mod pubsub_models;
