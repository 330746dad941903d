//! Approval state machine for custom tools.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Discrete states a custom tool can occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    /// Tool may be executed.
    Active,
    /// Tool declares dangerous permissions and awaits a human decision.
    PendingApproval,
    /// Tool was switched off or rejected.
    Disabled,
}

impl ToolStatus {
    /// Status assigned at creation time.
    #[must_use]
    pub const fn initial(requires_approval: bool) -> Self {
        if requires_approval {
            Self::PendingApproval
        } else {
            Self::Active
        }
    }

    /// Returns `true` when the tool may run.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }

    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::PendingApproval => "pending_approval",
            Self::Disabled => "disabled",
        }
    }

    /// Applies an event, returning the resulting status.
    ///
    /// Re-applying the event that produced the current status is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStatusTransition`] when the event is not allowed
    /// from this status.
    pub fn transition(self, event: StatusEvent) -> Result<Self> {
        let next = match (self, event) {
            (Self::PendingApproval, StatusEvent::Approve)
            | (Self::Disabled | Self::Active, StatusEvent::Enable) => Some(Self::Active),
            (Self::PendingApproval, StatusEvent::Reject)
            | (Self::Active | Self::Disabled, StatusEvent::Disable) => Some(Self::Disabled),
            _ => None,
        };

        next.ok_or(Error::InvalidStatusTransition { from: self, event })
    }
}

impl Display for ToolStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(Self::Active),
            "pending_approval" => Ok(Self::PendingApproval),
            "disabled" => Ok(Self::Disabled),
            other => Err(Error::UnknownStatus(other.to_owned())),
        }
    }
}

/// Events that drive status transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusEvent {
    /// A human approved a pending tool.
    Approve,
    /// A human rejected a pending tool.
    Reject,
    /// Switch a disabled tool back on.
    Enable,
    /// Switch an active tool off.
    Disable,
}
