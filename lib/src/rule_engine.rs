use std::collections::HashMap;

use crate::ids::{RuleId, ThingId};

/// Why a thing removal was requested, mirrored from the caller through to
/// the rule engine so it can decide what happens to rules referencing the
/// thing (spec §4.6 RemovePolicy).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveRequest {
    /// The thing itself is being removed.
    Thing(ThingId),
    /// A parent is being removed and this child is swept along with it.
    CascadedChild(ThingId),
}

/// A caller's decision for one rule that references the thing being removed
/// (spec §4.6 RemovePolicy).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleResolution {
    /// The rule is removed along with the thing.
    Cascade,
    /// The rule is kept, rewritten to reference the replacement named here.
    UpdateRule(RuleId),
}

/// The caller-supplied resolution for every rule the rule engine reports as
/// dependent on the thing being removed (spec §4.6 "if every dependent rule
/// has a resolution"). Built up one rule at a time as the caller (typically
/// the JSON-RPC facade, echoing the user's choices) resolves each one.
#[derive(Debug, Clone, Default)]
pub struct RemovePolicy {
    resolutions: HashMap<RuleId, RuleResolution>,
}

impl RemovePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(mut self, rule_id: RuleId, resolution: RuleResolution) -> Self {
        self.resolutions.insert(rule_id, resolution);
        self
    }

    pub fn resolution(&self, rule_id: RuleId) -> Option<RuleResolution> {
        self.resolutions.get(&rule_id).copied()
    }
}

/// External collaborator consulted before a thing is actually removed (spec
/// §1 "the rule engine ... is only consumed through a narrow interface").
/// The default carries no rules of its own, so every thing has zero
/// dependent rules and every removal is unconditionally permitted.
pub trait RuleEngineCollaborator: Send + Sync {
    /// The ids of rules that currently reference the thing named in
    /// `request`. `RemoveThing` must have a resolution for every one of
    /// these before the removal proceeds.
    fn dependent_rules(&self, _request: RemoveRequest) -> Vec<RuleId> {
        Vec::new()
    }

    /// Carries out each rule's resolution (deleting it or pointing it at its
    /// replacement). Only called once every dependent rule has one.
    fn apply_resolutions(&self, _request: RemoveRequest, _policy: &RemovePolicy) {}
}

pub struct CascadeRuleEngine;
impl RuleEngineCollaborator for CascadeRuleEngine {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_resolves_and_looks_up_by_rule_id() {
        let rule_id = RuleId::new();
        let policy = RemovePolicy::new().resolve(rule_id, RuleResolution::Cascade);
        assert_eq!(policy.resolution(rule_id), Some(RuleResolution::Cascade));
        assert_eq!(policy.resolution(RuleId::new()), None);
    }

    #[test]
    fn cascade_rule_engine_has_no_dependents() {
        let engine = CascadeRuleEngine;
        assert!(engine.dependent_rules(RemoveRequest::Thing(ThingId::new())).is_empty());
    }
}
