use thiserror::Error;

use crate::event::Role;

/// Reasons a notification request cannot be enriched.
///
/// Raised synchronously by the resolver. Always recoverable by the caller
/// correcting the request, never retried automatically.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("recipients must contain at least one address")]
    MissingRecipients,

    #[error("event_type must not be empty")]
    EmptyEventType,

    #[error("unknown role '{0}'")]
    UnknownRole(String),

    #[error("no default channels for event '{event_type}' with actor role '{actor_role}'; supply channels explicitly")]
    NoDefaultChannels { event_type: String, actor_role: Role },

    #[error("no default recipient roles for event '{event_type}' with actor role '{actor_role}'; supply recipient_roles explicitly")]
    NoDefaultRecipientRoles { event_type: String, actor_role: Role },

    #[error("unknown channel '{0}'")]
    UnknownChannel(String),
}

impl ValidationError {
    /// Stable identifier reported to HTTP callers.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingRecipients => "MissingRecipients",
            Self::EmptyEventType => "EmptyEventType",
            Self::UnknownRole(_) => "UnknownRole",
            Self::NoDefaultChannels { .. } => "NoDefaultChannels",
            Self::NoDefaultRecipientRoles { .. } => "NoDefaultRecipientRoles",
            Self::UnknownChannel(_) => "UnknownChannel",
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}
