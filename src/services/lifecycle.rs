use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// `pending -> processing -> completed | failed`. A job never reaches a
    /// terminal status without passing through `processing`.
    pub fn can_transition_to(self, target: JobStatus) -> bool {
        matches!(
            (self, target),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }

    /// Guard for cancelling: only unfinished jobs can be stopped.
    pub fn ensure_active(self) -> Result<(), TransitionError> {
        if self.is_terminal() {
            Err(TransitionError::Closed {
                machine: "generation_job",
                status: self.as_str(),
            })
        } else {
            Ok(())
        }
    }

    pub fn transition_to(self, target: JobStatus) -> Result<JobStatus, TransitionError> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(TransitionError::InvalidTransition {
                machine: "generation_job",
                from: self.as_str(),
                to: target.as_str(),
            })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    NotStarted,
    InProgress,
    Completed,
    Abandoned,
}

impl WorkflowStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            WorkflowStatus::NotStarted => "not_started",
            WorkflowStatus::InProgress => "in_progress",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Abandoned => "abandoned",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "not_started" => Some(WorkflowStatus::NotStarted),
            "in_progress" => Some(WorkflowStatus::InProgress),
            "completed" => Some(WorkflowStatus::Completed),
            "abandoned" => Some(WorkflowStatus::Abandoned),
            _ => None,
        }
    }

    /// Open progress records are the ones `get_or_create_progress` may reuse.
    pub const fn is_open(self) -> bool {
        matches!(self, WorkflowStatus::NotStarted | WorkflowStatus::InProgress)
    }

    pub fn can_transition_to(self, target: WorkflowStatus) -> bool {
        matches!(
            (self, target),
            (WorkflowStatus::NotStarted, WorkflowStatus::InProgress)
                | (WorkflowStatus::NotStarted, WorkflowStatus::Completed)
                | (WorkflowStatus::NotStarted, WorkflowStatus::Abandoned)
                | (WorkflowStatus::InProgress, WorkflowStatus::InProgress)
                | (WorkflowStatus::InProgress, WorkflowStatus::Completed)
                | (WorkflowStatus::InProgress, WorkflowStatus::Abandoned)
        )
    }

    pub fn transition_to(self, target: WorkflowStatus) -> Result<WorkflowStatus, TransitionError> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(TransitionError::InvalidTransition {
                machine: "workflow_progress",
                from: self.as_str(),
                to: target.as_str(),
            })
        }
    }

    /// Guard for edits that keep the current status (navigation, step completion).
    pub fn ensure_open(self) -> Result<(), TransitionError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(TransitionError::Closed {
                machine: "workflow_progress",
                status: self.as_str(),
            })
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("invalid {machine} transition: {from} -> {to}")]
    InvalidTransition {
        machine: &'static str,
        from: &'static str,
        to: &'static str,
    },
    #[error("{machine} is {status} and can no longer change")]
    Closed {
        machine: &'static str,
        status: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_happy_path_is_allowed() {
        let status = JobStatus::Pending
            .transition_to(JobStatus::Processing)
            .and_then(|s| s.transition_to(JobStatus::Completed))
            .unwrap();
        assert_eq!(status, JobStatus::Completed);
    }

    #[test]
    fn job_cannot_complete_without_processing() {
        let err = JobStatus::Pending.transition_to(JobStatus::Completed).unwrap_err();
        assert_eq!(
            err,
            TransitionError::InvalidTransition {
                machine: "generation_job",
                from: "pending",
                to: "completed",
            }
        );
    }

    #[test]
    fn job_cannot_fail_without_processing() {
        assert!(JobStatus::Pending.transition_to(JobStatus::Failed).is_err());
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Failed));
    }

    #[test]
    fn only_unfinished_jobs_are_active() {
        assert!(JobStatus::Pending.ensure_active().is_ok());
        assert!(JobStatus::Processing.ensure_active().is_ok());
        assert_eq!(
            JobStatus::Completed.ensure_active(),
            Err(TransitionError::Closed {
                machine: "generation_job",
                status: "completed",
            })
        );
    }

    #[test]
    fn terminal_jobs_stay_terminal() {
        for terminal in [JobStatus::Completed, JobStatus::Failed] {
            for target in [
                JobStatus::Pending,
                JobStatus::Processing,
                JobStatus::Completed,
                JobStatus::Failed,
            ] {
                assert!(!terminal.can_transition_to(target));
            }
        }
    }

    #[test]
    fn abandoned_workflow_is_closed() {
        assert!(WorkflowStatus::Abandoned.ensure_open().is_err());
        assert!(!WorkflowStatus::Abandoned.can_transition_to(WorkflowStatus::InProgress));
        assert!(!WorkflowStatus::Completed.can_transition_to(WorkflowStatus::Abandoned));
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            WorkflowStatus::NotStarted,
            WorkflowStatus::InProgress,
            WorkflowStatus::Completed,
            WorkflowStatus::Abandoned,
        ] {
            assert_eq!(WorkflowStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("processing"), Some(JobStatus::Processing));
        assert_eq!(JobStatus::parse("done"), None);
    }
}
