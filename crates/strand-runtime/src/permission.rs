//! Tool permission policy.
//!
//! With no interactive surface attached, `Ask` degrades to a denial
//! whose reason tells the model approval was required; the run keeps
//! going with that tool error result.

use strand_core::ids::SessionId;

/// Verdict for one tool call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PermissionDecision {
    /// Run the tool.
    Allow,
    /// Needs user approval.
    Ask,
    /// Refuse the tool.
    Deny {
        /// Why.
        reason: String,
    },
}

/// Decides whether a tool call may run.
pub trait PermissionChecker: Send + Sync {
    /// Check one tool call before execution.
    fn check(&self, session_id: &SessionId, tool_name: &str, read_only: bool)
        -> PermissionDecision;
}

/// Permits everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

impl PermissionChecker for AllowAll {
    fn check(&self, _: &SessionId, _: &str, _: bool) -> PermissionDecision {
        PermissionDecision::Allow
    }
}

/// Fixed policy from configuration. Deny wins over ask; read-only
/// tools always run.
#[derive(Clone, Debug, Default)]
pub struct StaticPolicy {
    deny: Vec<String>,
    ask: Vec<String>,
}

impl StaticPolicy {
    /// Policy with explicit deny and ask lists.
    #[must_use]
    pub fn new(deny: Vec<String>, ask: Vec<String>) -> Self {
        Self { deny, ask }
    }
}

impl PermissionChecker for StaticPolicy {
    fn check(&self, _: &SessionId, tool_name: &str, read_only: bool) -> PermissionDecision {
        if self.deny.iter().any(|name| name == tool_name) {
            return PermissionDecision::Deny {
                reason: format!("tool '{tool_name}' is denied by policy"),
            };
        }
        if read_only {
            return PermissionDecision::Allow;
        }
        if self.ask.iter().any(|name| name == tool_name) {
            return PermissionDecision::Ask;
        }
        PermissionDecision::Allow
    }
}
