//! Run status and result.

use crate::conversation::{Conversation, Message};
use crate::error::RunError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Aborted,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Aborted
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Final state of a run, returned once it is terminal.
#[derive(Debug)]
pub struct RunResult {
    pub run_id: String,
    pub status: RunStatus,
    pub conversation: Conversation,
    /// Agent invocations performed.
    pub steps: usize,
    /// Agent that was current when the run stopped.
    pub last_agent: String,
    /// Set when `status` is `Failed`.
    pub failed_agent: Option<String>,
    pub error: Option<RunError>,
    pub(crate) initial_len: usize,
}

impl RunResult {
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Messages appended during the run.
    pub fn produced(&self) -> &[Message] {
        let messages = self.conversation.messages();
        &messages[self.initial_len.min(messages.len())..]
    }

    /// Last message appended during the run.
    pub fn final_message(&self) -> Option<&Message> {
        self.produced().last()
    }
}
