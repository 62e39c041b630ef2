//! Notification defaults and request enrichment.
//!
//! - [`RuleTable`]: fixed (event_type, actor_role) → default channels / recipient roles
//! - [`EnrichmentResolver`]: fills omitted fields from the table, validates the rest

pub mod enrichment;
pub mod table;

pub use enrichment::EnrichmentResolver;
pub use table::{RuleEntry, RuleTable};
