//! HTTP handlers for the webhook receiver service.

pub mod status;
pub mod webhook;

pub use status::{queue_status, root, status};
pub use webhook::handle_nexus_webhook;
