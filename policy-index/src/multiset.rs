//! Endpoint → profile-ID multiset.
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Tracks, for every endpoint, the set of profile IDs it currently
/// references, and a reference count of each profile ID across all
/// endpoints.
///
/// Generic over the endpoint-key type `EK` and the profile-ID type
/// `PID`; the multiset does not care what either of them represents.
#[derive(Debug, Clone)]
pub struct ProfileMultiset<EK, PID> {
    endpoint_profiles: HashMap<EK, HashSet<PID>>,
    refcounts: HashMap<PID, usize>,
}

impl<EK, PID> Default for ProfileMultiset<EK, PID> {
    fn default() -> Self {
        ProfileMultiset {
            endpoint_profiles: HashMap::new(),
            refcounts: HashMap::new(),
        }
    }
}

impl<EK, PID> ProfileMultiset<EK, PID>
where
    EK: Eq + Hash,
    PID: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// (Re)registers `ekey`'s profile-ID list, returning the exact
    /// symmetric difference against its previous list: `(removed,
    /// added)`. Repeated IDs within `new_ids` count once. Deleting an
    /// endpoint is `update(ekey, [])`.
    pub fn update(&mut self, ekey: EK, new_ids: Vec<PID>) -> (HashSet<PID>, HashSet<PID>)
    where
        EK: Clone,
    {
        let new_set: HashSet<PID> = new_ids.into_iter().collect();
        let old_set = self.endpoint_profiles.remove(&ekey).unwrap_or_default();

        let removed: HashSet<PID> = old_set.difference(&new_set).cloned().collect();
        let added: HashSet<PID> = new_set.difference(&old_set).cloned().collect();

        for pid in &removed {
            if let Some(count) = self.refcounts.get_mut(pid) {
                *count -= 1;
                if *count == 0 {
                    self.refcounts.remove(pid);
                }
            }
        }
        for pid in &added {
            *self.refcounts.entry(pid.clone()).or_insert(0) += 1;
        }

        if !new_set.is_empty() {
            self.endpoint_profiles.insert(ekey, new_set);
        }

        (removed, added)
    }

    /// Equivalent to `update(ekey, vec![])`.
    pub fn delete(&mut self, ekey: EK) -> HashSet<PID>
    where
        EK: Clone,
    {
        let (removed, _added) = self.update(ekey, Vec::new());
        removed
    }

    /// The number of endpoints currently referencing `pid`.
    pub fn reference_count(&self, pid: &PID) -> usize {
        self.refcounts.get(pid).copied().unwrap_or(0)
    }

    /// `true` iff at least one endpoint references `pid`.
    pub fn is_active(&self, pid: &PID) -> bool {
        self.reference_count(pid) > 0
    }

    /// The profile IDs `ekey` currently references, if it is known.
    pub fn profiles_of(&self, ekey: &EK) -> Option<&HashSet<PID>> {
        self.endpoint_profiles.get(ekey)
    }
}
