//! Active-rules calculator and external update dispatcher: wires the
//! selector-matching label index and the endpoint-to-profile multiset
//! together, turning policy/profile/endpoint updates into activation
//! events and on-wire rule payloads.
//!
//! # Example
//!
//! ```rust
//! use policy_calc::{ActiveRulesCalculator, Key, Policy, PolicyKey, Update, UpdateValue};
//! use policy_calc::{EndpointKey, EndpointPayload, WorkloadEndpointKey};
//! use std::collections::HashMap;
//!
//! let mut calc = ActiveRulesCalculator::new();
//! calc.on_update(Update {
//!     key: Key::Policy(PolicyKey { tier: "default".into(), name: "p1".into() }),
//!     value: Some(UpdateValue::Policy(Policy {
//!         order: None,
//!         selector: "all()".into(),
//!         inbound: vec![],
//!         outbound: vec![],
//!     })),
//! });
//! let wep = WorkloadEndpointKey {
//!     host: "h1".into(),
//!     orchestrator: "k8s".into(),
//!     workload: "w1".into(),
//!     endpoint: "e1".into(),
//! };
//! calc.on_update(Update {
//!     key: Key::WorkloadEndpoint(wep.clone()),
//!     value: Some(UpdateValue::Endpoint(EndpointPayload {
//!         labels: HashMap::new(),
//!         profile_ids: vec![],
//!     })),
//! });
//! assert!(calc.is_policy_active(&PolicyKey { tier: "default".into(), name: "p1".into() }));
//! ```

mod calculator;
mod error;
mod model;
mod wire;

pub use calculator::ActiveRulesCalculator;
pub use error::WireKeyError;
pub use model::{
    EndpointKey, EndpointPayload, HostEndpointKey, Key, LabelMap, Policy, PolicyKey, ProfileId,
    ProfileRules, Rule, RuleSubject, Update, UpdateValue, WorkloadEndpointKey,
};
pub use wire::{policy_path, profile_labels_path, profile_rules_path, AgentUpdate};
