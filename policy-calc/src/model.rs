//! Wire-level data model: policy and profile payloads, opaque rule
//! bodies, and the update-key tagged union.
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single tier+name pair identifying a policy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PolicyKey {
    pub tier: String,
    pub name: String,
}

/// Identifies a workload endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkloadEndpointKey {
    pub host: String,
    pub orchestrator: String,
    pub workload: String,
    pub endpoint: String,
}

/// Identifies a host endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostEndpointKey {
    pub host: String,
    pub endpoint: String,
}

/// Either kind of endpoint, used anywhere the calculator treats
/// endpoints uniformly (the label index and the multiset don't care
/// which).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndpointKey {
    Workload(WorkloadEndpointKey),
    Host(HostEndpointKey),
}

/// A profile's identifying name.
pub type ProfileId = String;

/// An opaque, already-validated security rule. The calculator never
/// inspects a rule's contents; it only stores, forwards and serialises
/// it.
pub type Rule = serde_json::Value;

/// A label map, as carried on endpoint and profile-labels updates.
pub type LabelMap = HashMap<String, String>;

/// A policy's full payload: its selector text, precedence order and
/// rule lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub order: Option<f32>,
    pub selector: String,
    #[serde(default)]
    pub inbound: Vec<Rule>,
    #[serde(default)]
    pub outbound: Vec<Rule>,
}

/// A profile's rule lists. Profiles have no selector: they
/// apply to every endpoint that lists them, unconditionally.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProfileRules {
    #[serde(default)]
    pub inbound: Vec<Rule>,
    #[serde(default)]
    pub outbound: Vec<Rule>,
}

/// The labels and profile references carried by an endpoint update.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EndpointPayload {
    #[serde(default)]
    pub labels: LabelMap,
    #[serde(default)]
    pub profile_ids: Vec<ProfileId>,
}

/// Tags the kind of object a streamed update concerns.
///
/// `policy-calc` never invents these; they arrive from whatever feeds
/// [`crate::ActiveRulesCalculator::on_update`] (a datastore watch, a
/// test harness, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    WorkloadEndpoint(WorkloadEndpointKey),
    HostEndpoint(HostEndpointKey),
    ProfileLabels(ProfileId),
    ProfileRules(ProfileId),
    Policy(PolicyKey),
}

/// One streamed update: an object key plus its new value, or `None` to
/// mean the object was deleted.
#[derive(Debug, Clone)]
pub struct Update {
    pub key: Key,
    pub value: Option<UpdateValue>,
}

/// The payload carried by an [`Update`], tagged to match [`Key`].
#[derive(Debug, Clone)]
pub enum UpdateValue {
    Endpoint(EndpointPayload),
    ProfileLabels(LabelMap),
    ProfileRules(ProfileRules),
    Policy(Policy),
}

impl From<WorkloadEndpointKey> for EndpointKey {
    fn from(k: WorkloadEndpointKey) -> Self {
        EndpointKey::Workload(k)
    }
}

impl From<HostEndpointKey> for EndpointKey {
    fn from(k: HostEndpointKey) -> Self {
        EndpointKey::Host(k)
    }
}

/// Which kind of object a rule-listener notification concerns:
/// policies and profiles share the same "rules changed" sink.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RuleSubject {
    Policy(PolicyKey),
    Profile(ProfileId),
}
