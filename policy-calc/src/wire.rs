//! On-wire key encoding and downstream-agent update payloads (spec
//! §6).
use crate::error::{fatal, WireKeyError};
use crate::model::{Policy, PolicyKey, ProfileId, ProfileRules};

/// One update destined for a downstream agent: a stable wire path and
/// its new serialised value, or `None` for a deletion/deactivation.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentUpdate {
    pub path: String,
    pub value: Option<serde_json::Value>,
}

fn require(field: &'static str, value: &str) -> Result<(), WireKeyError> {
    if value.is_empty() {
        Err(WireKeyError::insufficient(field))
    } else {
        Ok(())
    }
}

/// `/v1/policy/tier/{tier}/policy/{name}`.
pub fn policy_path(key: &PolicyKey) -> Result<String, WireKeyError> {
    require("tier", &key.tier)?;
    require("name", &key.name)?;
    Ok(format!("/v1/policy/tier/{}/policy/{}", key.tier, key.name))
}

/// `/v1/policy/profile/{name}/rules`.
pub fn profile_rules_path(name: &str) -> Result<String, WireKeyError> {
    require("name", name)?;
    Ok(format!("/v1/policy/profile/{name}/rules"))
}

/// `/v1/policy/profile/{name}/labels`.
pub fn profile_labels_path(name: &str) -> Result<String, WireKeyError> {
    require("name", name)?;
    Ok(format!("/v1/policy/profile/{name}/labels"))
}

fn to_json(path: &str, value: &impl serde::Serialize) -> serde_json::Value {
    match serde_json::to_value(value) {
        Ok(v) => v,
        Err(e) => fatal(format_args!("serialising payload for {path}: {e}")),
    }
}

/// Build the agent update for a policy becoming active (`policy`
/// carries its current rule body) or inactive (`None`, emitted as a
/// `null` value).
pub fn policy_agent_update(key: &PolicyKey, policy: Option<&Policy>) -> AgentUpdate {
    let path = match policy_path(key) {
        Ok(p) => p,
        Err(e) => fatal(format_args!("encoding wire path for policy {key:?}: {e}")),
    };
    let value = policy.map(|p| to_json(&path, p));
    AgentUpdate { path, value }
}

/// Build the agent update for a profile's rules becoming active
/// (`rules` carries the current body) or inactive (`None`).
pub fn profile_rules_agent_update(pid: &ProfileId, rules: Option<&ProfileRules>) -> AgentUpdate {
    let path = match profile_rules_path(pid) {
        Ok(p) => p,
        Err(e) => fatal(format_args!("encoding wire path for profile {pid:?}: {e}")),
    };
    let value = rules.map(|r| to_json(&path, r));
    AgentUpdate { path, value }
}
