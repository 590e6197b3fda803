//! HTTP request handlers.

mod health;
mod version;
mod webhook;

pub use health::{livez, readyz};
pub use version::version;
pub use webhook::{receive_delivery, verify_subscription};
