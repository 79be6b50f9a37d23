// Notification payloads published to the UI layer
use super::job::JobId;
use serde::{Deserialize, Serialize};
use std::io::Write;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpscaleEvent {
    Progress {
        job_id: JobId,
        pass: u8,
        /// Normalized 0.0 - 1.0
        progress: f64,
    },
    Log {
        job_id: JobId,
        line: String,
    },
    PostProcessing {
        job_id: JobId,
    },
    Done {
        job_id: JobId,
        output_path: String,
    },
    Error {
        job_id: JobId,
        message: String,
    },
    Cancelled {
        job_id: JobId,
    },
    Stopped {
        cancelled_jobs: usize,
    },
}

impl UpscaleEvent {
    /// Channel name used when forwarding the event to a frontend.
    pub fn name(&self) -> &'static str {
        match self {
            UpscaleEvent::Progress { .. } => "upscayl-progress",
            UpscaleEvent::Log { .. } => "upscayl-log",
            UpscaleEvent::PostProcessing { .. } => "scaling-and-converting",
            UpscaleEvent::Done { .. } => "upscayl-done",
            UpscaleEvent::Error { .. } => "upscayl-error",
            UpscaleEvent::Cancelled { .. } => "upscayl-cancelled",
            UpscaleEvent::Stopped { .. } => "upscayl-stopped",
        }
    }

    pub fn job_id(&self) -> Option<&str> {
        match self {
            UpscaleEvent::Progress { job_id, .. }
            | UpscaleEvent::Log { job_id, .. }
            | UpscaleEvent::PostProcessing { job_id }
            | UpscaleEvent::Done { job_id, .. }
            | UpscaleEvent::Error { job_id, .. }
            | UpscaleEvent::Cancelled { job_id } => Some(job_id),
            UpscaleEvent::Stopped { .. } => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UpscaleEvent::Done { .. } | UpscaleEvent::Error { .. } | UpscaleEvent::Cancelled { .. }
        )
    }
}

/// Receiver side of the notification channel.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: UpscaleEvent);
}

impl EventSink for mpsc::UnboundedSender<UpscaleEvent> {
    fn emit(&self, event: UpscaleEvent) {
        // Receiver gone means nobody is listening anymore
        let _ = self.send(event);
    }
}

/// Writes every event as one JSON object per line on stdout.
pub struct JsonLinesSink;

impl EventSink for JsonLinesSink {
    fn emit(&self, event: UpscaleEvent) {
        let payload = serde_json::json!({
            "event": event.name(),
            "payload": event,
        });
        let mut stdout = std::io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{}", payload) {
            log::warn!("Failed to write event to stdout: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = UpscaleEvent::Done {
            job_id: "abc".to_string(),
            output_path: "/out/cat.png".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "done");
        assert_eq!(json["output_path"], "/out/cat.png");
        assert_eq!(event.name(), "upscayl-done");
    }

    #[test]
    fn test_terminal_events() {
        let id = "j".to_string();
        assert!(UpscaleEvent::Cancelled { job_id: id.clone() }.is_terminal());
        assert!(!UpscaleEvent::PostProcessing { job_id: id.clone() }.is_terminal());
        assert!(!UpscaleEvent::Stopped { cancelled_jobs: 2 }.is_terminal());
        assert_eq!(UpscaleEvent::Stopped { cancelled_jobs: 2 }.job_id(), None);
    }

    #[test]
    fn test_channel_sink_forwards() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.emit(UpscaleEvent::Cancelled {
            job_id: "x".to_string(),
        });
        assert_eq!(
            rx.try_recv().unwrap(),
            UpscaleEvent::Cancelled {
                job_id: "x".to_string()
            }
        );
    }
}
