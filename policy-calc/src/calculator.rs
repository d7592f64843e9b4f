//! The active-rules calculator: turns a stream of policy, profile and
//! endpoint updates into activation events and on-wire rule payloads.
use crate::model::{
    EndpointKey, EndpointPayload, Key, LabelMap, Policy, PolicyKey, ProfileId, ProfileRules, Rule,
    RuleSubject, Update, UpdateValue,
};
use crate::wire::{self, AgentUpdate};
use policy_index::{LabelIndex, MatchListener, ProfileMultiset};
use policy_selectors::parse;
use std::collections::{HashMap, HashSet};

type RuleListenerFn = dyn FnMut(RuleSubject, &[Rule], &[Rule]) + Send;
type MatchListenerFn = dyn FnMut(&PolicyKey, &EndpointKey, bool) + Send;
type AgentSinkFn = dyn FnMut(AgentUpdate) + Send;

/// Maintains, for every registered policy and profile, the set of
/// endpoints it currently applies to, and emits activation events and
/// on-wire updates as that set changes.
///
/// Built by feeding it a stream of [`Update`]s via [`Self::on_update`];
/// policies, profiles and endpoints may arrive in any order and any
/// number of times.
pub struct ActiveRulesCalculator {
    all_policies: HashMap<PolicyKey, Policy>,
    all_profile_rules: HashMap<ProfileId, ProfileRules>,
    active_policies: HashMap<PolicyKey, HashSet<EndpointKey>>,
    active_profiles: HashMap<ProfileId, HashSet<EndpointKey>>,
    multiset: ProfileMultiset<EndpointKey, ProfileId>,
    index: LabelIndex<PolicyKey, EndpointKey, ProfileId>,
    rule_listener: Option<Box<RuleListenerFn>>,
    match_listener: Option<Box<MatchListenerFn>>,
    agent_sink: Option<Box<AgentSinkFn>>,
}

impl ActiveRulesCalculator {
    /// A calculator backed by a fully-recomputing label index.
    pub fn new() -> Self {
        ActiveRulesCalculator {
            all_policies: HashMap::new(),
            all_profile_rules: HashMap::new(),
            active_policies: HashMap::new(),
            active_profiles: HashMap::new(),
            multiset: ProfileMultiset::new(),
            index: LabelIndex::new(),
            rule_listener: None,
            match_listener: None,
            agent_sink: None,
        }
    }

    /// A calculator backed by the label-name inverted index (spec
    /// §4.D); observably identical to [`Self::new`].
    pub fn with_inverted_index() -> Self {
        ActiveRulesCalculator {
            index: LabelIndex::with_inverted_index(),
            ..Self::new()
        }
    }

    /// Register a callback invoked whenever a policy's or profile's
    /// rule body changes, including activation (non-empty body) and
    /// deactivation (empty body).
    pub fn with_rule_listener(
        mut self,
        listener: impl FnMut(RuleSubject, &[Rule], &[Rule]) + Send + 'static,
    ) -> Self {
        self.rule_listener = Some(Box::new(listener));
        self
    }

    /// Register a callback invoked for every individual `(policy,
    /// endpoint)` match transition, regardless of whether it flips the
    /// policy's overall activation state. `true` means the pair just
    /// started matching, `false` means it just stopped.
    pub fn with_match_listener(
        mut self,
        listener: impl FnMut(&PolicyKey, &EndpointKey, bool) + Send + 'static,
    ) -> Self {
        self.match_listener = Some(Box::new(listener));
        self
    }

    /// Register a sink that receives the on-wire form of every rule
    /// change: a stable path plus its new JSON value, or `None` for
    /// deactivation.
    pub fn with_agent_sink(
        mut self,
        sink: impl FnMut(AgentUpdate) + Send + 'static,
    ) -> Self {
        self.agent_sink = Some(Box::new(sink));
        self
    }

    /// `true` iff `key` currently applies to at least one endpoint.
    pub fn is_policy_active(&self, key: &PolicyKey) -> bool {
        self.active_policies.get(key).is_some_and(|s| !s.is_empty())
    }

    /// `true` iff `pid` currently applies to at least one endpoint.
    pub fn is_profile_active(&self, pid: &ProfileId) -> bool {
        self.active_profiles.get(pid).is_some_and(|s| !s.is_empty())
    }

    /// Feed one streamed update into the calculator.
    pub fn on_update(&mut self, update: Update) {
        match (update.key, update.value) {
            (Key::WorkloadEndpoint(k), value) => {
                self.update_endpoint(EndpointKey::Workload(k), value)
            }
            (Key::HostEndpoint(k), value) => {
                self.update_endpoint(EndpointKey::Host(k), value)
            }
            (Key::ProfileLabels(pid), value) => self.update_profile_labels(pid, value),
            (Key::ProfileRules(pid), value) => self.update_profile_rules(pid, value),
            (Key::Policy(k), value) => self.update_policy(k, value),
        }
    }

    fn update_endpoint(&mut self, ekey: EndpointKey, value: Option<UpdateValue>) {
        let payload = match value {
            Some(UpdateValue::Endpoint(p)) => Some(p),
            Some(other) => crate::error::fatal(format_args!(
                "endpoint key paired with non-endpoint payload: {other:?}"
            )),
            None => None,
        };
        match payload {
            Some(EndpointPayload { labels, profile_ids }) => {
                let (removed, added) = self.multiset.update(ekey.clone(), profile_ids.clone());
                self.apply_profile_diff(&ekey, removed, added);

                let Self {
                    index,
                    active_policies,
                    all_policies,
                    rule_listener,
                    match_listener,
                    agent_sink,
                    ..
                } = self;
                let mut cb = ActivationCallback {
                    active_policies,
                    all_policies: &*all_policies,
                    rule_listener: rule_listener.as_deref_mut(),
                    match_listener: match_listener.as_deref_mut(),
                    agent_sink: agent_sink.as_deref_mut(),
                };
                index.update_labels(ekey, labels, profile_ids, &mut cb);
            }
            None => {
                let removed = self.multiset.delete(ekey.clone());
                self.apply_profile_diff(&ekey, removed, HashSet::new());

                let Self {
                    index,
                    active_policies,
                    all_policies,
                    rule_listener,
                    match_listener,
                    agent_sink,
                    ..
                } = self;
                let mut cb = ActivationCallback {
                    active_policies,
                    all_policies: &*all_policies,
                    rule_listener: rule_listener.as_deref_mut(),
                    match_listener: match_listener.as_deref_mut(),
                    agent_sink: agent_sink.as_deref_mut(),
                };
                index.delete_labels(&ekey, &mut cb);
            }
        }
    }

    fn update_profile_labels(&mut self, pid: ProfileId, value: Option<UpdateValue>) {
        let labels: Option<LabelMap> = match value {
            Some(UpdateValue::ProfileLabels(l)) => Some(l),
            Some(other) => crate::error::fatal(format_args!(
                "profile-labels key paired with mismatched payload: {other:?}"
            )),
            None => None,
        };

        let Self {
            index,
            active_policies,
            all_policies,
            rule_listener,
            match_listener,
            agent_sink,
            ..
        } = self;
        let mut cb = ActivationCallback {
            active_policies,
            all_policies: &*all_policies,
            rule_listener: rule_listener.as_deref_mut(),
            match_listener: match_listener.as_deref_mut(),
            agent_sink: agent_sink.as_deref_mut(),
        };
        match labels {
            Some(labels) => index.update_parent_labels(pid, labels, &mut cb),
            None => index.delete_parent_labels(&pid, &mut cb),
        }
    }

    fn update_profile_rules(&mut self, pid: ProfileId, value: Option<UpdateValue>) {
        let rules: Option<ProfileRules> = match value {
            Some(UpdateValue::ProfileRules(r)) => Some(r),
            Some(other) => crate::error::fatal(format_args!(
                "profile-rules key paired with mismatched payload: {other:?}"
            )),
            None => None,
        };
        match rules {
            Some(rules) => {
                self.all_profile_rules.insert(pid.clone(), rules);
            }
            None => {
                self.all_profile_rules.remove(&pid);
            }
        }
        if self.is_profile_active(&pid) {
            self.emit_profile_update(&pid);
        }
    }

    fn update_policy(&mut self, key: PolicyKey, value: Option<UpdateValue>) {
        let policy: Option<Policy> = match value {
            Some(UpdateValue::Policy(p)) => Some(p),
            Some(other) => crate::error::fatal(format_args!(
                "policy key paired with mismatched payload: {other:?}"
            )),
            None => None,
        };
        match policy {
            Some(policy) => {
                let tree = parse(&policy.selector).unwrap_or_else(|e| {
                    crate::error::fatal(format_args!(
                        "selector for policy {key:?} failed to parse (expected pre-validated): {e}"
                    ))
                });
                self.all_policies.insert(key.clone(), policy);

                let was_active = self.is_policy_active(&key);
                let Self {
                    index,
                    active_policies,
                    all_policies,
                    rule_listener,
                    match_listener,
                    agent_sink,
                    ..
                } = self;
                let mut cb = ActivationCallback {
                    active_policies,
                    all_policies: &*all_policies,
                    rule_listener: rule_listener.as_deref_mut(),
                    match_listener: match_listener.as_deref_mut(),
                    agent_sink: agent_sink.as_deref_mut(),
                };
                index.update_selector(key.clone(), tree, &mut cb);
                let is_active = self.is_policy_active(&key);

                // If the policy was already active and stays active,
                // update_selector's transitions never fire (a 0<->n
                // transition is the only thing that emits), yet the
                // rule body may have changed. Cover that case here.
                if was_active && is_active {
                    self.emit_policy_update(&key);
                }
            }
            None => {
                self.all_policies.remove(&key);
                let Self {
                    index,
                    active_policies,
                    all_policies,
                    rule_listener,
                    match_listener,
                    agent_sink,
                    ..
                } = self;
                let mut cb = ActivationCallback {
                    active_policies,
                    all_policies: &*all_policies,
                    rule_listener: rule_listener.as_deref_mut(),
                    match_listener: match_listener.as_deref_mut(),
                    agent_sink: agent_sink.as_deref_mut(),
                };
                index.delete_selector(&key, &mut cb);
            }
        }
    }

    /// Apply the symmetric difference `(removed, added)` reported by
    /// [`ProfileMultiset::update`]/[`ProfileMultiset::delete`] to
    /// `active_profiles`, emitting activation/deactivation updates for
    /// any profile whose endpoint set transitioned to/from empty.
    fn apply_profile_diff(
        &mut self,
        ekey: &EndpointKey,
        removed: HashSet<ProfileId>,
        added: HashSet<ProfileId>,
    ) {
        for pid in removed {
            if let Some(set) = self.active_profiles.get_mut(&pid) {
                set.remove(ekey);
                if set.is_empty() {
                    self.active_profiles.remove(&pid);
                    self.emit_profile_update(&pid);
                }
            }
        }
        for pid in added {
            let set = self.active_profiles.entry(pid.clone()).or_default();
            let was_empty = set.is_empty();
            set.insert(ekey.clone());
            if was_empty {
                self.emit_profile_update(&pid);
            }
        }
    }

    fn emit_policy_update(&mut self, key: &PolicyKey) {
        let active = self.is_policy_active(key);
        emit_policy_rules(
            key,
            active,
            &self.all_policies,
            self.rule_listener.as_deref_mut(),
            self.agent_sink.as_deref_mut(),
        );
    }

    fn emit_profile_update(&mut self, pid: &ProfileId) {
        let active = self.is_profile_active(pid);
        emit_profile_rules(
            pid,
            active,
            &self.all_profile_rules,
            self.rule_listener.as_deref_mut(),
            self.agent_sink.as_deref_mut(),
        );
    }
}

impl Default for ActiveRulesCalculator {
    fn default() -> Self {
        Self::new()
    }
}

/// A [`MatchListener`] bridging the label index's `(policy, endpoint)`
/// match transitions into activation bookkeeping and rule emission.
///
/// Borrows its fields individually rather than holding `&mut
/// ActiveRulesCalculator`, so that `index.update_selector(..., &mut
/// cb)` can run alongside a live `&mut self.index` borrow.
struct ActivationCallback<'a> {
    active_policies: &'a mut HashMap<PolicyKey, HashSet<EndpointKey>>,
    all_policies: &'a HashMap<PolicyKey, Policy>,
    rule_listener: Option<&'a mut RuleListenerFn>,
    match_listener: Option<&'a mut MatchListenerFn>,
    agent_sink: Option<&'a mut AgentSinkFn>,
}

impl<'a> MatchListener<PolicyKey, EndpointKey> for ActivationCallback<'a> {
    fn on_match_started(&mut self, sid: &PolicyKey, ekey: &EndpointKey) {
        let set = self.active_policies.entry(sid.clone()).or_default();
        let was_empty = set.is_empty();
        set.insert(ekey.clone());
        if let Some(ml) = self.match_listener.as_deref_mut() {
            ml(sid, ekey, true);
        }
        if was_empty {
            emit_policy_rules(
                sid,
                true,
                self.all_policies,
                self.rule_listener.as_deref_mut(),
                self.agent_sink.as_deref_mut(),
            );
        }
    }

    fn on_match_stopped(&mut self, sid: &PolicyKey, ekey: &EndpointKey) {
        let Some(set) = self.active_policies.get_mut(sid) else {
            return;
        };
        set.remove(ekey);
        let now_empty = set.is_empty();
        if now_empty {
            self.active_policies.remove(sid);
        }
        if let Some(ml) = self.match_listener.as_deref_mut() {
            ml(sid, ekey, false);
        }
        if now_empty {
            emit_policy_rules(
                sid,
                false,
                self.all_policies,
                self.rule_listener.as_deref_mut(),
                self.agent_sink.as_deref_mut(),
            );
        }
    }
}

fn emit_policy_rules(
    key: &PolicyKey,
    active: bool,
    all_policies: &HashMap<PolicyKey, Policy>,
    rule_listener: Option<&mut RuleListenerFn>,
    agent_sink: Option<&mut AgentSinkFn>,
) {
    let policy = if active { all_policies.get(key) } else { None };
    let (inbound, outbound): (&[Rule], &[Rule]) = match policy {
        Some(p) => (&p.inbound, &p.outbound),
        None => (&[], &[]),
    };
    tracing::debug!(tier = %key.tier, name = %key.name, active, "policy rule body changed");
    if let Some(rl) = rule_listener {
        rl(RuleSubject::Policy(key.clone()), inbound, outbound);
    }
    if let Some(sink) = agent_sink {
        sink(wire::policy_agent_update(key, policy));
    }
}

fn emit_profile_rules(
    pid: &ProfileId,
    active: bool,
    all_profile_rules: &HashMap<ProfileId, ProfileRules>,
    rule_listener: Option<&mut RuleListenerFn>,
    agent_sink: Option<&mut AgentSinkFn>,
) {
    let rules = if active { all_profile_rules.get(pid) } else { None };
    let (inbound, outbound): (&[Rule], &[Rule]) = match rules {
        Some(r) => (&r.inbound, &r.outbound),
        None => (&[], &[]),
    };
    tracing::debug!(profile = %pid, active, "profile rule body changed");
    if let Some(rl) = rule_listener {
        rl(RuleSubject::Profile(pid.clone()), inbound, outbound);
    }
    if let Some(sink) = agent_sink {
        sink(wire::profile_rules_agent_update(pid, rules));
    }
}
