//! Policy Layer
//!
//! Label-flow enforcement, the guard registry, and the keychain gate.
//! The policy engine communicates with the evaluator through explicit
//! observation calls; it decorates control flow but never owns it.

pub mod enforcer;
pub mod guards;
pub mod keychain;

pub use enforcer::{FlowRule, LabelFlowQuery, PolicyEnforcer, PolicySummary};
pub use guards::{GuardDecision, GuardDef, GuardRegistry, GuardScope};
pub use keychain::{invoke_keychain, Keychain};
