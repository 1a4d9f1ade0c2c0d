//! Per-organization usage ledger: action types and their append-only
//! counters.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The four chargeable action types tracked by the usage ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Entities inserted, updated, or deleted by a sync run.
    Entities,
    /// Search queries served.
    Queries,
    /// Source connections created.
    SourceConnections,
    /// Team members added to an organization.
    TeamMembers,
}

impl ActionType {
    /// The exact wire/storage string for this action type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Entities => "entities",
            Self::Queries => "queries",
            Self::SourceConnections => "source_connections",
            Self::TeamMembers => "team_members",
        }
    }
}

/// Per-organization append-only counters keyed by `ActionType`, plus the
/// plan-defined limit for each. This is the system-of-record a usage
/// guardrail's buffer eventually flushes into; it never stores a buffered,
/// unflushed delta itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageLedger {
    organization_id: Uuid,
    counters: HashMap<ActionType, u64>,
}

impl UsageLedger {
    /// Build an empty ledger for an organization.
    #[must_use]
    pub fn new(organization_id: Uuid) -> Self {
        Self {
            organization_id,
            counters: HashMap::new(),
        }
    }

    /// Owning organization.
    #[must_use]
    pub const fn organization_id(&self) -> Uuid {
        self.organization_id
    }

    /// Current persisted count for an action type.
    #[must_use]
    pub fn count(&self, action_type: ActionType) -> u64 {
        self.counters.get(&action_type).copied().unwrap_or(0)
    }

    /// Apply a signed delta to an action type's counter. Saturates at zero
    /// on the low end rather than underflowing, since a flushed decrement
    /// batch should never be able to push a ledger negative.
    pub fn apply_delta(&mut self, action_type: ActionType, delta: i64) {
        let current = self.count(action_type);
        let updated = if delta < 0 {
            current.saturating_sub(delta.unsigned_abs())
        } else {
            current.saturating_add(delta.unsigned_abs())
        };
        self.counters.insert(action_type, updated);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_delta_accumulates_per_action_type() {
        let mut ledger = UsageLedger::new(Uuid::new_v4());
        ledger.apply_delta(ActionType::Entities, 5);
        ledger.apply_delta(ActionType::Entities, 3);
        ledger.apply_delta(ActionType::Queries, 1);
        assert_eq!(ledger.count(ActionType::Entities), 8);
        assert_eq!(ledger.count(ActionType::Queries), 1);
        assert_eq!(ledger.count(ActionType::SourceConnections), 0);
    }

    #[test]
    fn negative_delta_never_underflows_below_zero() {
        let mut ledger = UsageLedger::new(Uuid::new_v4());
        ledger.apply_delta(ActionType::Entities, 2);
        ledger.apply_delta(ActionType::Entities, -10);
        assert_eq!(ledger.count(ActionType::Entities), 0);
    }
}
