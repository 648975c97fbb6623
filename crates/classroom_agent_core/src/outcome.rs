//! crates/classroom_agent_core/src/outcome.rs
//!
//! Classification of a completion call into the three outcomes the send pipeline acts on.

use crate::ports::{AgentReply, PortError, PortResult};

/// `action_taken` value with which the platform reports that its own pipeline failed.
pub const ERROR_ACTION: &str = "error";

#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    Success(AgentReply),
    /// The call is worth repeating against the fallback endpoint.
    RecoverableFailure(FailureCause),
    /// The platform answered but declined the request; its reply is final.
    FatalFailure(AgentReply),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FailureCause {
    /// The platform answered with `success = false` and `action_taken = "error"`.
    Reported(AgentReply),
    /// No usable response: transport error or non-2xx status.
    Transport(PortError),
}

impl FailureCause {
    pub fn into_error(self) -> PortError {
        match self {
            FailureCause::Reported(reply) => PortError::Platform {
                status: 200,
                message: reply.response,
            },
            FailureCause::Transport(e) => e,
        }
    }
}

impl CallOutcome {
    pub fn classify(result: PortResult<AgentReply>) -> Self {
        match result {
            Ok(reply) if reply.success => CallOutcome::Success(reply),
            Ok(reply) if reply.action_taken.as_deref() == Some(ERROR_ACTION) => {
                CallOutcome::RecoverableFailure(FailureCause::Reported(reply))
            }
            Ok(reply) => CallOutcome::FatalFailure(reply),
            Err(e) => CallOutcome::RecoverableFailure(FailureCause::Transport(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(success: bool, action: Option<&str>) -> AgentReply {
        AgentReply {
            response: "text".to_string(),
            success,
            action_taken: action.map(str::to_string),
            thread_id: None,
            thread_title: None,
            data: None,
        }
    }

    #[test]
    fn only_error_action_is_recoverable_among_replies() {
        assert!(matches!(
            CallOutcome::classify(Ok(reply(true, Some("create_assignment")))),
            CallOutcome::Success(_)
        ));
        assert!(matches!(
            CallOutcome::classify(Ok(reply(false, Some("error")))),
            CallOutcome::RecoverableFailure(FailureCause::Reported(_))
        ));
        assert!(matches!(
            CallOutcome::classify(Ok(reply(false, Some("delete_assignment")))),
            CallOutcome::FatalFailure(_)
        ));
    }

    #[test]
    fn transport_errors_are_recoverable() {
        let outcome = CallOutcome::classify(Err(PortError::Platform {
            status: 503,
            message: "unavailable".to_string(),
        }));
        match outcome {
            CallOutcome::RecoverableFailure(cause) => {
                assert_eq!(cause.into_error().kind(), "platform_error")
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
