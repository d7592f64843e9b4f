//! Label-inheritance index: joins registered selectors against
//! endpoints, including labels inherited from referenced profiles.
use policy_selectors::{evaluate, Selector};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Receives match-state transitions from a [`LabelIndex`]. A plain
/// sink interface rather than a stored callback, so the index never
/// needs a reference back to its owner.
pub trait MatchListener<SID, EK> {
    /// `(sid, ekey)` just became a match.
    fn on_match_started(&mut self, sid: &SID, ekey: &EK);
    /// `(sid, ekey)` just stopped matching.
    fn on_match_stopped(&mut self, sid: &SID, ekey: &EK);
}

/// A [`MatchListener`] that does nothing, for callers that only care
/// about the index's own state (e.g. tests).
impl<SID, EK> MatchListener<SID, EK> for () {
    fn on_match_started(&mut self, _sid: &SID, _ekey: &EK) {}
    fn on_match_stopped(&mut self, _sid: &SID, _ekey: &EK) {}
}

type LabelMap = HashMap<String, String>;

/// Incremental index maintaining `{(sid, ekey) : selector matches
/// endpoint's effective labels}` under streaming updates.
///
/// Generic over the selector-id type `SID`, endpoint-key type `EK` and
/// profile-id type `PID` (the index is indifferent to what any of them
/// represent).
pub struct LabelIndex<SID, EK, PID> {
    endpoint_own_labels: HashMap<EK, LabelMap>,
    endpoint_parent_ids: HashMap<EK, Vec<PID>>,
    parent_labels: HashMap<PID, LabelMap>,
    parent_references: HashMap<PID, HashSet<EK>>,
    selectors: HashMap<SID, Selector>,
    /// Label names a selector's leaves inspect; used only to filter
    /// the fan-out of a parent-label change when `inverted` is
    /// enabled. Never used to drop a match, only to skip selectors
    /// that provably cannot have changed answer.
    selector_label_names: HashMap<SID, HashSet<String>>,
    matched: HashSet<(SID, EK)>,
    inverted: bool,
}

impl<SID, EK, PID> LabelIndex<SID, EK, PID>
where
    SID: Eq + Hash + Clone,
    EK: Eq + Hash + Clone,
    PID: Eq + Hash + Clone,
{
    /// An index that recomputes every affected `(sid, ekey)` pair in
    /// full on each update.
    pub fn new() -> Self {
        LabelIndex {
            endpoint_own_labels: HashMap::new(),
            endpoint_parent_ids: HashMap::new(),
            parent_labels: HashMap::new(),
            parent_references: HashMap::new(),
            selectors: HashMap::new(),
            selector_label_names: HashMap::new(),
            matched: HashSet::new(),
            inverted: false,
        }
    }

    /// An index that additionally maintains a label-name → selector
    /// fan-out filter, used to skip selectors that cannot possibly be
    /// affected by a given profile-label change. Produces identical
    /// observable events to [`LabelIndex::new`].
    pub fn with_inverted_index() -> Self {
        let mut index = Self::new();
        index.inverted = true;
        index
    }

    /// (Re)register an endpoint's own labels and the ordered list of
    /// profile IDs it inherits from.
    pub fn update_labels<L>(
        &mut self,
        ekey: EK,
        own_labels: LabelMap,
        parent_ids: Vec<PID>,
        listener: &mut L,
    ) where
        L: MatchListener<SID, EK>,
    {
        self.unlink_parent_references(&ekey);
        for pid in &parent_ids {
            self.parent_references
                .entry(pid.clone())
                .or_default()
                .insert(ekey.clone());
        }
        self.endpoint_own_labels.insert(ekey.clone(), own_labels);
        self.endpoint_parent_ids.insert(ekey.clone(), parent_ids);

        self.recheck_all_selectors_for(&ekey, listener);
    }

    /// Remove an endpoint entirely.
    pub fn delete_labels<L>(&mut self, ekey: &EK, listener: &mut L)
    where
        L: MatchListener<SID, EK>,
    {
        if !self.endpoint_own_labels.contains_key(ekey) {
            return;
        }
        self.unlink_parent_references(ekey);
        self.endpoint_own_labels.remove(ekey);
        self.endpoint_parent_ids.remove(ekey);

        let sids: Vec<SID> = self.selectors.keys().cloned().collect();
        for sid in sids {
            self.transition(&sid, ekey, false, listener);
        }
    }

    /// (Re)register the labels contributed by parent profile `pid`.
    pub fn update_parent_labels<L>(&mut self, pid: PID, labels: LabelMap, listener: &mut L)
    where
        L: MatchListener<SID, EK>,
    {
        let changed_keys = self.changed_label_keys(&pid, &labels);
        self.parent_labels.insert(pid.clone(), labels);
        self.recheck_referencing_endpoints(&pid, &changed_keys, listener);
    }

    /// Remove parent profile `pid`'s labels.
    pub fn delete_parent_labels<L>(&mut self, pid: &PID, listener: &mut L)
    where
        L: MatchListener<SID, EK>,
    {
        let Some(old) = self.parent_labels.remove(pid) else {
            return;
        };
        let changed_keys: HashSet<String> = old.keys().cloned().collect();
        self.recheck_referencing_endpoints(pid, &changed_keys, listener);
    }

    /// Register (or replace) the selector tracked under `sid`.
    pub fn update_selector<L>(&mut self, sid: SID, tree: Selector, listener: &mut L)
    where
        L: MatchListener<SID, EK>,
    {
        let label_names: HashSet<String> = tree
            .referenced_labels()
            .into_iter()
            .map(str::to_owned)
            .collect();
        self.selectors.insert(sid.clone(), tree);
        self.selector_label_names.insert(sid.clone(), label_names);

        let ekeys: Vec<EK> = self.endpoint_own_labels.keys().cloned().collect();
        for ekey in ekeys {
            self.transition_recompute(&sid, &ekey, listener);
        }
    }

    /// Stop tracking `sid`. Emits `match_stopped` for every endpoint it
    /// still matched.
    pub fn delete_selector<L>(&mut self, sid: &SID, listener: &mut L)
    where
        L: MatchListener<SID, EK>,
    {
        if self.selectors.remove(sid).is_none() {
            return;
        }
        self.selector_label_names.remove(sid);
        let ekeys: Vec<EK> = self
            .matched
            .iter()
            .filter(|(s, _)| s == sid)
            .map(|(_, e)| e.clone())
            .collect();
        for ekey in ekeys {
            self.transition(sid, &ekey, false, listener);
        }
    }

    /// The effective labels of `ekey`: parent profiles' labels
    /// overlaid in list order, then `ekey`'s own labels on top.
    pub fn effective_labels(&self, ekey: &EK) -> LabelMap {
        let mut merged = LabelMap::new();
        if let Some(parent_ids) = self.endpoint_parent_ids.get(ekey) {
            for pid in parent_ids {
                if let Some(labels) = self.parent_labels.get(pid) {
                    for (k, v) in labels {
                        merged.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        if let Some(own) = self.endpoint_own_labels.get(ekey) {
            for (k, v) in own {
                merged.insert(k.clone(), v.clone());
            }
        }
        merged
    }

    /// `true` iff `(sid, ekey)` is currently an outstanding match.
    pub fn is_matched(&self, sid: &SID, ekey: &EK) -> bool {
        self.matched.contains(&(sid.clone(), ekey.clone()))
    }

    fn unlink_parent_references(&mut self, ekey: &EK) {
        if let Some(old_parents) = self.endpoint_parent_ids.get(ekey) {
            for pid in old_parents.clone() {
                if let Some(refs) = self.parent_references.get_mut(&pid) {
                    refs.remove(ekey);
                }
            }
        }
    }

    fn changed_label_keys(&self, pid: &PID, new_labels: &LabelMap) -> HashSet<String> {
        let old = self.parent_labels.get(pid);
        let mut changed = HashSet::new();
        let old_keys: HashSet<&String> = old.map(|m| m.keys().collect()).unwrap_or_default();
        let new_keys: HashSet<&String> = new_labels.keys().collect();
        for k in old_keys.union(&new_keys) {
            let old_v = old.and_then(|m| m.get(k.as_str()));
            let new_v = new_labels.get(k.as_str());
            if old_v != new_v {
                changed.insert((*k).clone());
            }
        }
        changed
    }

    fn recheck_referencing_endpoints<L>(
        &mut self,
        pid: &PID,
        changed_keys: &HashSet<String>,
        listener: &mut L,
    ) where
        L: MatchListener<SID, EK>,
    {
        let Some(ekeys) = self.parent_references.get(pid).cloned() else {
            return;
        };
        let sids = self.candidate_selectors(changed_keys);
        for ekey in &ekeys {
            for sid in &sids {
                self.transition_recompute(sid, ekey, listener);
            }
        }
    }

    fn recheck_all_selectors_for<L>(&mut self, ekey: &EK, listener: &mut L)
    where
        L: MatchListener<SID, EK>,
    {
        let sids: Vec<SID> = self.selectors.keys().cloned().collect();
        for sid in sids {
            self.transition_recompute(&sid, ekey, listener);
        }
    }

    fn candidate_selectors(&self, changed_keys: &HashSet<String>) -> Vec<SID> {
        if !self.inverted || changed_keys.is_empty() {
            return self.selectors.keys().cloned().collect();
        }
        self.selectors
            .keys()
            .filter(|sid| {
                self.selector_label_names
                    .get(*sid)
                    .map(|names| names.iter().any(|n| changed_keys.contains(n)))
                    .unwrap_or(true)
            })
            .cloned()
            .collect()
    }

    fn transition_recompute<L>(&mut self, sid: &SID, ekey: &EK, listener: &mut L)
    where
        L: MatchListener<SID, EK>,
    {
        let Some(tree) = self.selectors.get(sid) else {
            return;
        };
        let labels = self.effective_labels(ekey);
        let matched_now = evaluate(tree, &labels);
        self.transition(sid, ekey, matched_now, listener);
    }

    fn transition<L>(&mut self, sid: &SID, ekey: &EK, matched_now: bool, listener: &mut L)
    where
        L: MatchListener<SID, EK>,
    {
        let key = (sid.clone(), ekey.clone());
        let was_matched = self.matched.contains(&key);
        if matched_now && !was_matched {
            self.matched.insert(key);
            listener.on_match_started(sid, ekey);
        } else if !matched_now && was_matched {
            self.matched.remove(&key);
            listener.on_match_stopped(sid, ekey);
        }
    }
}

impl<SID, EK, PID> Default for LabelIndex<SID, EK, PID>
where
    SID: Eq + Hash + Clone,
    EK: Eq + Hash + Clone,
    PID: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

/// A [`MatchListener`] that just records events, for tests.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingListener<SID, EK> {
    pub(crate) events: Vec<(SID, EK, bool)>,
}

#[cfg(test)]
impl<SID: Clone, EK: Clone> MatchListener<SID, EK> for RecordingListener<SID, EK> {
    fn on_match_started(&mut self, sid: &SID, ekey: &EK) {
        self.events.push((sid.clone(), ekey.clone(), true));
    }

    fn on_match_stopped(&mut self, sid: &SID, ekey: &EK) {
        self.events.push((sid.clone(), ekey.clone(), false));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use policy_selectors::parse;

    fn labels(pairs: &[(&str, &str)]) -> LabelMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn seed_scenario_4() {
        let mut index: LabelIndex<&str, &str, &str> = LabelIndex::new();
        let mut l = RecordingListener::default();
        index.update_selector("S", parse(r#"tier == "prod""#).unwrap(), &mut l);
        index.update_labels("E", labels(&[("tier", "prod")]), vec![], &mut l);
        assert_eq!(l.events, vec![("S", "E", true)]);

        l.events.clear();
        index.update_labels("E", labels(&[("tier", "dev")]), vec![], &mut l);
        assert_eq!(l.events, vec![("S", "E", false)]);
    }

    #[test]
    fn seed_scenario_5_inherits_from_profile() {
        let mut index: LabelIndex<&str, &str, &str> = LabelIndex::new();
        let mut l = RecordingListener::default();
        index.update_selector("S", parse(r#"role == "db""#).unwrap(), &mut l);
        index.update_parent_labels("P", labels(&[("role", "db")]), &mut l);
        index.update_labels("E", labels(&[]), vec!["P"], &mut l);
        assert_eq!(l.events, vec![("S", "E", true)]);

        l.events.clear();
        index.update_parent_labels("P", labels(&[("role", "web")]), &mut l);
        assert_eq!(l.events, vec![("S", "E", false)]);
    }

    #[test]
    fn own_labels_override_parent_labels() {
        let mut index: LabelIndex<&str, &str, &str> = LabelIndex::new();
        let mut l = RecordingListener::default();
        index.update_parent_labels("P", labels(&[("role", "db")]), &mut l);
        index.update_labels("E", labels(&[("role", "web")]), vec!["P"], &mut l);
        assert_eq!(index.effective_labels(&"E").get("role").unwrap(), "web");
    }

    #[test]
    fn later_profile_in_list_overrides_earlier() {
        let mut index: LabelIndex<&str, &str, &str> = LabelIndex::new();
        let mut l = RecordingListener::default();
        index.update_parent_labels("P1", labels(&[("role", "db")]), &mut l);
        index.update_parent_labels("P2", labels(&[("role", "cache")]), &mut l);
        index.update_labels("E", labels(&[]), vec!["P1", "P2"], &mut l);
        assert_eq!(index.effective_labels(&"E").get("role").unwrap(), "cache");
    }

    #[test]
    fn delete_selector_emits_stopped_for_live_pairs() {
        let mut index: LabelIndex<&str, &str, &str> = LabelIndex::new();
        let mut l = RecordingListener::default();
        index.update_selector("S", parse("all()").unwrap(), &mut l);
        index.update_labels("E", labels(&[]), vec![], &mut l);
        assert_eq!(l.events, vec![("S", "E", true)]);
        l.events.clear();
        index.delete_selector(&"S", &mut l);
        assert_eq!(l.events, vec![("S", "E", false)]);
    }

    #[test]
    fn events_never_duplicate_same_state() {
        let mut index: LabelIndex<&str, &str, &str> = LabelIndex::new();
        let mut l = RecordingListener::default();
        index.update_selector("S", parse("all()").unwrap(), &mut l);
        index.update_labels("E", labels(&[("a", "1")]), vec![], &mut l);
        index.update_labels("E", labels(&[("a", "2")]), vec![], &mut l);
        assert_eq!(l.events, vec![("S", "E", true)]);
    }

    #[test]
    fn inverted_index_produces_identical_events() {
        let events_default = run_scenario(LabelIndex::new());
        let events_inverted = run_scenario(LabelIndex::with_inverted_index());
        assert_eq!(events_default, events_inverted);
    }

    fn run_scenario(mut index: LabelIndex<&str, &str, &str>) -> Vec<(&'static str, &'static str, bool)> {
        let mut l = RecordingListener::default();
        index.update_selector("role-db", parse(r#"role == "db""#).unwrap(), &mut l);
        index.update_selector("tier-prod", parse(r#"tier == "prod""#).unwrap(), &mut l);
        index.update_parent_labels("P", labels(&[("role", "db")]), &mut l);
        index.update_labels("E1", labels(&[("tier", "prod")]), vec!["P"], &mut l);
        index.update_labels("E2", labels(&[]), vec!["P"], &mut l);
        index.update_parent_labels("P", labels(&[("role", "cache")]), &mut l);
        l.events
    }

    #[test]
    fn delete_labels_untracks_endpoint() {
        let mut index: LabelIndex<&str, &str, &str> = LabelIndex::new();
        let mut l = RecordingListener::default();
        index.update_selector("S", parse("all()").unwrap(), &mut l);
        index.update_labels("E", labels(&[]), vec![], &mut l);
        l.events.clear();
        index.delete_labels(&"E", &mut l);
        assert_eq!(l.events, vec![("S", "E", false)]);
        assert!(!index.is_matched(&"S", &"E"));
    }
}
