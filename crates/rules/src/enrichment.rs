//! Request enrichment against the rule table.
//!
//! Caller-supplied `channels` / `recipient_roles` always replace the table
//! defaults for that field (no merge). Each field resolves independently.

use std::str::FromStr;

use herald_core::{EnrichedEvent, NotificationRequest, Role, ValidationError};
use tracing::debug;

use crate::table::RuleTable;

/// Pure resolver over a read-only [`RuleTable`]. Safe to share across tasks.
#[derive(Debug, Clone, Default)]
pub struct EnrichmentResolver {
    table: RuleTable,
}

impl EnrichmentResolver {
    pub fn new(table: RuleTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &RuleTable {
        &self.table
    }

    /// Validate a request and fill omitted channels and recipient roles.
    ///
    /// Resolving an already-enriched event (fed back through
    /// `NotificationRequest::from`) yields the same event.
    pub fn resolve(&self, request: NotificationRequest) -> Result<EnrichedEvent, ValidationError> {
        if request.recipients.is_empty() {
            return Err(ValidationError::MissingRecipients);
        }
        if request.event_type.trim().is_empty() {
            return Err(ValidationError::EmptyEventType);
        }
        let actor_role: Role = request.actor_role.parse()?;

        let rule = self.table.lookup(&request.event_type, actor_role);

        let channels = resolve_field(
            request.channels,
            rule.map(|r| r.default_channels.as_slice()),
            || ValidationError::NoDefaultChannels {
                event_type: request.event_type.clone(),
                actor_role,
            },
        )?;

        let recipient_roles = resolve_field(
            request.recipient_roles,
            rule.map(|r| r.default_recipient_roles.as_slice()),
            || ValidationError::NoDefaultRecipientRoles {
                event_type: request.event_type.clone(),
                actor_role,
            },
        )?;

        debug!(
            event_type = %request.event_type,
            actor_role = %actor_role,
            rule_matched = rule.is_some(),
            ?channels,
            ?recipient_roles,
            "event enriched"
        );

        Ok(EnrichedEvent {
            event_type: request.event_type,
            actor_role,
            recipients: request.recipients,
            subject: request.subject,
            body: request.body,
            channels,
            recipient_roles,
            metadata: request.metadata,
        })
    }
}

/// Supplied values win and are de-duplicated in first-seen order; an omitted
/// or empty field takes the defaults, or fails when there are none. An empty
/// default list counts as none.
fn resolve_field<T>(
    supplied: Option<Vec<String>>,
    defaults: Option<&[T]>,
    no_defaults: impl FnOnce() -> ValidationError,
) -> Result<Vec<T>, ValidationError>
where
    T: FromStr<Err = ValidationError> + PartialEq + Clone,
{
    match supplied.filter(|values| !values.is_empty()) {
        Some(values) => {
            let mut resolved: Vec<T> = Vec::with_capacity(values.len());
            for raw in &values {
                let value: T = raw.parse()?;
                if !resolved.contains(&value) {
                    resolved.push(value);
                }
            }
            Ok(resolved)
        }
        None => defaults
            .filter(|defaults| !defaults.is_empty())
            .map(<[T]>::to_vec)
            .ok_or_else(no_defaults),
    }
}
