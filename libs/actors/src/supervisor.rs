//! Supervision Policies
//!
//! Pure decision functions mapping a handler failure to a directive. The
//! actor resolves a policy per failure: its own override first, then the
//! registry-wide default, then the built-in [`AlwaysResume`].

use crate::error::HandlerError;
use crate::identity::ActorIdentity;
use std::fmt;
use std::sync::Arc;

/// Supervision directive for a failed message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Directive {
    /// Swallow the failure and continue with the next message
    Resume,
    /// Reload state from persistence in place, keeping the mailbox
    Restart,
    /// Deactivate the actor and drop it from the registry
    Stop,
    /// Hand the failure to the registry's escalation handler
    Escalate,
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Resume => "resume",
            Self::Restart => "restart",
            Self::Stop => "stop",
            Self::Escalate => "escalate",
        };
        f.write_str(name)
    }
}

/// Everything a policy may inspect about one failure
#[derive(Debug)]
pub struct FailureContext<'a> {
    pub identity: &'a ActorIdentity,
    pub message_kind: &'a str,
    pub error: &'a HandlerError,
    /// Failures in a row including this one
    pub consecutive_errors: u32,
}

/// Strategy deciding how an actor reacts to a handler failure
pub trait SupervisorPolicy: Send + Sync + 'static {
    fn decide(&self, failure: &FailureContext<'_>) -> Directive;
}

impl<F> SupervisorPolicy for F
where
    F: Fn(&FailureContext<'_>) -> Directive + Send + Sync + 'static,
{
    fn decide(&self, failure: &FailureContext<'_>) -> Directive {
        self(failure)
    }
}

/// Built-in fallback: every failure is resumed
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysResume;

impl SupervisorPolicy for AlwaysResume {
    fn decide(&self, _failure: &FailureContext<'_>) -> Directive {
        Directive::Resume
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRestart;

impl SupervisorPolicy for AlwaysRestart {
    fn decide(&self, _failure: &FailureContext<'_>) -> Directive {
        Directive::Restart
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysStop;

impl SupervisorPolicy for AlwaysStop {
    fn decide(&self, _failure: &FailureContext<'_>) -> Directive {
        Directive::Stop
    }
}

/// Apply `below` until the consecutive-error count reaches
/// `max_consecutive`, then `at_or_above`
#[derive(Debug, Clone, Copy)]
pub struct ThresholdPolicy {
    pub max_consecutive: u32,
    pub below: Directive,
    pub at_or_above: Directive,
}

impl ThresholdPolicy {
    /// Resume up to `max_consecutive - 1` failures in a row, then restart
    pub fn restart_after(max_consecutive: u32) -> Self {
        Self {
            max_consecutive,
            below: Directive::Resume,
            at_or_above: Directive::Restart,
        }
    }
}

impl SupervisorPolicy for ThresholdPolicy {
    fn decide(&self, failure: &FailureContext<'_>) -> Directive {
        if failure.consecutive_errors >= self.max_consecutive {
            self.at_or_above
        } else {
            self.below
        }
    }
}

/// Shared policy handle
pub type SharedPolicy = Arc<dyn SupervisorPolicy>;

/// Pick the policy to apply: actor override, registry default, built-in
pub fn resolve<'a>(
    actor_override: Option<&'a SharedPolicy>,
    registry_default: Option<&'a SharedPolicy>,
) -> &'a dyn SupervisorPolicy {
    static FALLBACK: AlwaysResume = AlwaysResume;
    match actor_override.or(registry_default) {
        Some(policy) => policy.as_ref(),
        None => &FALLBACK,
    }
}

/// System-wide sink for escalated failures (alerting, paging, ...)
pub trait EscalationHandler: Send + Sync + 'static {
    fn escalate(&self, identity: &ActorIdentity, message_kind: &str, error: &HandlerError);
}

impl<F> EscalationHandler for F
where
    F: Fn(&ActorIdentity, &str, &HandlerError) + Send + Sync + 'static,
{
    fn escalate(&self, identity: &ActorIdentity, message_kind: &str, error: &HandlerError) {
        self(identity, message_kind, error)
    }
}
