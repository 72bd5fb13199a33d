//! Per-stage progress events for streaming surfaces.
//!
//! Emission is fire-and-forget: a dropped or slow consumer never stalls the
//! pipeline and never changes its semantics.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::stage::StageKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Started,
    Completed,
    Failed,
}

/// Event sent to the per-run progress channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub agent: StageKind,
    pub status: StageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Sending half of a progress channel. Cloneable; a disabled sink drops
/// every event.
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressSink {
    /// A sink wired to a fresh single-consumer channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that discards everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            // Receiver may be gone; that is fine.
            let _ = tx.send(event);
        }
    }

    pub fn started(&self, agent: StageKind) {
        self.emit(ProgressEvent {
            agent,
            status: StageStatus::Started,
            message: None,
        });
    }

    pub fn completed(&self, agent: StageKind) {
        self.emit(ProgressEvent {
            agent,
            status: StageStatus::Completed,
            message: None,
        });
    }

    pub fn failed(&self, agent: StageKind, message: impl Into<String>) {
        self.emit(ProgressEvent {
            agent,
            status: StageStatus::Failed,
            message: Some(message.into()),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_arrive_in_order() {
        let (sink, mut rx) = ProgressSink::channel();
        sink.started(StageKind::Parse);
        sink.completed(StageKind::Parse);
        sink.started(StageKind::Collect);

        assert_eq!(rx.try_recv().unwrap().status, StageStatus::Started);
        assert_eq!(rx.try_recv().unwrap().status, StageStatus::Completed);
        assert_eq!(rx.try_recv().unwrap().agent, StageKind::Collect);
    }

    #[test]
    fn test_dropped_receiver_does_not_block() {
        let (sink, rx) = ProgressSink::channel();
        drop(rx);
        sink.failed(StageKind::Generate, "boom");
        sink.completed(StageKind::Review);
    }

    #[test]
    fn test_disabled_sink_is_silent() {
        let sink = ProgressSink::disabled();
        sink.started(StageKind::Parse);
    }
}
