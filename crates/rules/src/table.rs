use herald_core::{Channel, Role};
use serde::Serialize;

/// Default delivery for one (event_type, actor_role) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleEntry {
    pub event_type: String,
    pub actor_role: Role,
    pub default_channels: Vec<Channel>,
    pub default_recipient_roles: Vec<Role>,
    pub description: String,
}

impl RuleEntry {
    pub fn new(
        event_type: impl Into<String>,
        actor_role: Role,
        default_channels: &[Channel],
        default_recipient_roles: &[Role],
        description: impl Into<String>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            actor_role,
            default_channels: default_channels.to_vec(),
            default_recipient_roles: default_recipient_roles.to_vec(),
            description: description.into(),
        }
    }
}

/// Read-only rule table, built once at startup.
#[derive(Debug, Clone)]
pub struct RuleTable {
    entries: Vec<RuleEntry>,
}

impl RuleTable {
    pub fn new(entries: Vec<RuleEntry>) -> Self {
        Self { entries }
    }

    /// The product's built-in defaults.
    pub fn builtin() -> Self {
        use Channel::{Email, InApp};
        use Role::{Employer, Issuer, Learner};

        Self::new(vec![
            RuleEntry::new(
                "credential.issued",
                Issuer,
                &[Email, InApp],
                &[Learner],
                "Learner receives notification when issuer issues a credential.",
            ),
            RuleEntry::new(
                "credential.updated",
                Issuer,
                &[Email, InApp],
                &[Learner],
                "Learner notified when credential metadata changes.",
            ),
            RuleEntry::new(
                "credential.revoked",
                Issuer,
                &[Email, InApp],
                &[Learner],
                "Learner alerted when a credential is revoked.",
            ),
            RuleEntry::new(
                "profile.viewed",
                Employer,
                &[InApp],
                &[Learner],
                "Learner informed when an employer views their profile.",
            ),
            RuleEntry::new(
                "employer.requested_verification",
                Employer,
                &[Email, InApp],
                &[Issuer],
                "Issuer notified when employer requests verification.",
            ),
        ])
    }

    /// Exact match on the pair. No wildcard or prefix matching.
    pub fn lookup(&self, event_type: &str, actor_role: Role) -> Option<&RuleEntry> {
        self.entries
            .iter()
            .find(|e| e.event_type == event_type && e.actor_role == actor_role)
    }

    pub fn entries(&self) -> &[RuleEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::builtin()
    }
}
