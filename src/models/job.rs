// Upscale job data models
use super::upscale::UpscaleMode;
use serde::{Deserialize, Serialize};

pub type JobId = String;

pub fn new_job_id() -> JobId {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    ScalingAndConverting,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Cancelled
        )
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (Pending, Running | Succeeded | Failed | Cancelled) => true,
            (Running, Running | ScalingAndConverting | Succeeded | Failed | Cancelled) => true,
            (ScalingAndConverting, Succeeded | Failed | Cancelled) => true,
            _ => false,
        }
    }
}

/// Snapshot of a job that is still tracked by the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: JobId,
    pub mode: UpscaleMode,
    pub source_path: String,
    pub current_pass: u8,
    pub pid: Option<u32>,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(JobState::Succeeded.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(!JobState::ScalingAndConverting.is_terminal());
    }

    #[test]
    fn test_no_transition_leaves_terminal_state() {
        for terminal in [JobState::Succeeded, JobState::Failed, JobState::Cancelled] {
            for next in [
                JobState::Pending,
                JobState::Running,
                JobState::ScalingAndConverting,
                JobState::Succeeded,
                JobState::Failed,
                JobState::Cancelled,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_pending_can_short_circuit_to_succeeded() {
        assert!(JobState::Pending.can_transition_to(JobState::Succeeded));
        assert!(!JobState::Pending.can_transition_to(JobState::ScalingAndConverting));
    }
}
