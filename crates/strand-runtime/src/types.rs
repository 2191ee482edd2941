//! Shared runtime types.

use serde::{Deserialize, Serialize};
use strand_core::ids::MessageId;
use strand_core::messages::TokenUsage;

/// Terminal result of one run, delivered to whoever is waiting on it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The run finished with a final assistant message.
    Completed {
        /// ID of the final message.
        message_id: MessageId,
        /// Final message text.
        content: String,
        /// Tokens consumed across all turns of the run.
        usage: TokenUsage,
    },
    /// The run was interrupted before completing.
    Cancelled,
    /// The run failed terminally.
    Failed {
        /// Failure description.
        error: String,
    },
}

impl RunOutcome {
    /// Whether this outcome carries a final message.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}
