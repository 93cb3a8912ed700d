use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("unknown {kind} value: {value}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

macro_rules! closed_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(ParseEnumError {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

// Alert lifecycle is one-directional: ACTIVE is the only non-terminal state.
closed_enum!(AlertStatus, "alert status", {
    Active => "ACTIVE",
    Resolved => "RESOLVED",
    FalseAlarm => "FALSE_ALARM",
});

impl AlertStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AlertStatus::Active)
    }
}

closed_enum!(TimerStatus, "timer status", {
    Running => "RUNNING",
    CheckedIn => "CHECKED_IN",
    Expired => "EXPIRED",
    Cancelled => "CANCELLED",
});

closed_enum!(AttemptStatus, "attempt status", {
    Pending => "PENDING",
    Sent => "SENT",
    Failed => "FAILED",
    Delivered => "DELIVERED",
});

impl AttemptStatus {
    /// The attempt reached the contact (gateway accepted or confirmed it).
    pub fn is_successful(&self) -> bool {
        matches!(self, AttemptStatus::Sent | AttemptStatus::Delivered)
    }
}

closed_enum!(Channel, "channel", {
    Sms => "SMS",
    Email => "EMAIL",
    Push => "PUSH",
});

/// Aggregate delivery state of an alert, derived from its attempt rows.
closed_enum!(DeliverySummary, "delivery summary", {
    All => "ALL",
    Partial => "PARTIAL",
    None => "NONE",
});

impl DeliverySummary {
    /// Fold per-attempt statuses into the aggregate the client sees.
    /// No attempts at all (empty roster) reads as NONE.
    pub fn from_attempts<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = AttemptStatus>,
    {
        let mut total = 0usize;
        let mut ok = 0usize;
        for status in statuses {
            total += 1;
            if status.is_successful() {
                ok += 1;
            }
        }
        match (total, ok) {
            (_, 0) => DeliverySummary::None,
            (t, o) if t == o => DeliverySummary::All,
            _ => DeliverySummary::Partial,
        }
    }
}
