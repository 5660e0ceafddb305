// Domain-layer modules and shared errors
pub mod customer_match {
    pub use crate::customer_match::*;
}

pub mod dispatcher {
    pub use crate::dispatcher::*;
}

pub mod errors {
    pub use crate::errors::*;
}
