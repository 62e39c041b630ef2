use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ValidationError;

// ── Channels ──────────────────────────────────────────────────

/// A delivery medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
    Push,
    InApp,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Channel::Email, Channel::Sms, Channel::Push, Channel::InApp];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Push => "push",
            Self::InApp => "in_app",
        }
    }
}

impl FromStr for Channel {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownChannel(s.to_string()))
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A channel identifier as read back off the queue.
///
/// Publishers built from a newer rule set may name channels this process does
/// not know. Those ids are kept verbatim so the dispatcher can report them
/// per channel instead of rejecting the whole event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelId {
    Known(Channel),
    Unknown(String),
}

impl ChannelId {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Known(channel) => channel.as_str(),
            Self::Unknown(id) => id,
        }
    }
}

impl From<Channel> for ChannelId {
    fn from(channel: Channel) -> Self {
        Self::Known(channel)
    }
}

impl PartialEq<Channel> for ChannelId {
    fn eq(&self, other: &Channel) -> bool {
        matches!(self, Self::Known(channel) if channel == other)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Roles ─────────────────────────────────────────────────────

/// Platform role, used both for the actor that triggered an event and for
/// the audience category an event is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Issuer,
    Learner,
    Employer,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Issuer, Role::Learner, Role::Employer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Issuer => "issuer",
            Self::Learner => "learner",
            Self::Employer => "employer",
        }
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownRole(s.to_string()))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Request / enriched event ──────────────────────────────────

/// Inbound notification request as received over HTTP.
///
/// Role and channel identifiers are kept as raw strings so that unknown
/// values surface as typed validation errors from the resolver instead of
/// generic deserialization failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub event_type: String,
    pub actor_role: String,
    /// Concrete delivery addresses. Never defaulted.
    #[serde(default)]
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_roles: Option<Vec<String>>,
    /// Opaque to herald, passed through unchanged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

/// A request after enrichment: channels and recipient roles are always
/// populated and drawn only from the known identifiers.
///
/// This is the payload carried by every broker envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedEvent {
    pub event_type: String,
    pub actor_role: Role,
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
    pub channels: Vec<Channel>,
    /// Audience category. Descriptive only, never used for addressing.
    pub recipient_roles: Vec<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

/// An [`EnrichedEvent`] decoded from a broker envelope.
///
/// Identical on the wire, except that channel ids outside [`Channel`] decode
/// as [`ChannelId::Unknown`] instead of failing the whole payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QueuedEvent {
    pub event_type: String,
    pub actor_role: Role,
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
    pub channels: Vec<ChannelId>,
    pub recipient_roles: Vec<Role>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

impl QueuedEvent {
    /// Split into the event restricted to known channels and the full list of
    /// channel ids in their original order.
    pub fn into_parts(self) -> (EnrichedEvent, Vec<ChannelId>) {
        let known = self
            .channels
            .iter()
            .filter_map(|id| match id {
                ChannelId::Known(channel) => Some(*channel),
                ChannelId::Unknown(_) => None,
            })
            .collect();
        let event = EnrichedEvent {
            event_type: self.event_type,
            actor_role: self.actor_role,
            recipients: self.recipients,
            subject: self.subject,
            body: self.body,
            channels: known,
            recipient_roles: self.recipient_roles,
            metadata: self.metadata,
        };
        (event, self.channels)
    }
}

impl From<EnrichedEvent> for NotificationRequest {
    fn from(event: EnrichedEvent) -> Self {
        Self {
            event_type: event.event_type,
            actor_role: event.actor_role.to_string(),
            recipients: event.recipients,
            subject: event.subject,
            body: event.body,
            channels: Some(event.channels.iter().map(|c| c.to_string()).collect()),
            recipient_roles: Some(event.recipient_roles.iter().map(|r| r.to_string()).collect()),
            metadata: event.metadata,
        }
    }
}
