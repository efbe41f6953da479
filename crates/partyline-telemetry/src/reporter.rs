//! Cloneable write handle onto the shared [`Telemetry`].

use std::sync::Arc;

use crate::{EventKind, Telemetry};

/// What rooms and connection handlers use to record traffic and failures.
///
/// Cloning is cheap; every clone feeds the same aggregator.
#[derive(Debug, Clone)]
pub struct Reporter {
    telemetry: Arc<Telemetry>,
}

impl Reporter {
    pub fn new(telemetry: Arc<Telemetry>) -> Self {
        Self { telemetry }
    }

    /// A frame of `len` bytes was forwarded to an endpoint.
    pub fn report_sent_message(&self, len: usize) {
        self.telemetry
            .log_event(EventKind::MessageSend, Some(len as u64), None);
    }

    /// A frame of `len` bytes arrived from an endpoint.
    pub fn report_received_message(&self, len: usize) {
        self.telemetry
            .log_event(EventKind::MessageReceive, Some(len as u64), None);
    }

    /// Something went wrong; `category` becomes the summary suffix.
    pub fn report_error(&self, category: &str) {
        self.telemetry
            .log_event(EventKind::GeneralError, None, Some(category));
    }

    pub fn log_event(&self, kind: EventKind, value: Option<u64>, info: Option<&str>) {
        self.telemetry.log_event(kind, value, info);
    }

    pub fn telemetry(&self) -> &Arc<Telemetry> {
        &self.telemetry
    }
}
