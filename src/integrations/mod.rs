//! External service integrations.

pub mod config_store {
    pub use crate::config_store::*;
}

pub mod google_ads_client {
    pub use crate::google_ads_client::*;
}

pub mod google_ads_models {
    pub use crate::google_ads_models::*;
}

pub mod pubsub_models {
    pub use crate::pubsub_models::*;
}
