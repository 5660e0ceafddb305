// Thin namespace wrapper for API-layer components
pub mod handlers {
    pub use crate::handlers::*;
}

pub mod pubsub_handler {
    pub use crate::pubsub_handler::*;
}
