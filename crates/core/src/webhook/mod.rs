//! Fan-out when a document finishes processing.

pub mod dispatcher;

pub use dispatcher::{DispatchReport, WebhookDispatcher};
