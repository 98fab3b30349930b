//! Pluggable embedded-scripting seam for branch logic, condition checks,
//! and transforms.
//!
//! This crate treats the host as an interface: scripts receive immutable
//! snapshots only and never mutate state directly. A no-op implementation
//! is enough for core tests; a real deployment supplies its own
//! `ScriptHost`.

use crate::state::{CharacterState, DemonState};
use crate::zone::Zone;

/// Parameters passed to a condition/branch/transform script, all
/// immutable snapshots.
pub struct ScriptContext<'a> {
    pub character: Option<&'a CharacterState>,
    pub demon: Option<&'a DemonState>,
    pub zone: Option<&'a Zone>,
}

/// The embedded-script boundary. `None` from any method means "script
/// unavailable or it declined to answer"; callers fail closed.
pub trait ScriptHost: Send + Sync {
    fn eval_condition(&self, script_id: &str, params: &[String], ctx: &ScriptContext<'_>) -> Option<bool>;
    fn eval_branch(&self, script_id: &str, params: &[String], ctx: &ScriptContext<'_>) -> Option<usize>;
    fn eval_transform(&self, script_id: &str, params: &[String], ctx: &ScriptContext<'_>) -> Option<()>;
}

/// A host that answers every call with "unavailable", suitable wherever
/// no embedded scripts are registered for a deployment.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopScriptHost;

impl ScriptHost for NoopScriptHost {
    fn eval_condition(&self, _script_id: &str, _params: &[String], _ctx: &ScriptContext<'_>) -> Option<bool> {
        None
    }

    fn eval_branch(&self, _script_id: &str, _params: &[String], _ctx: &ScriptContext<'_>) -> Option<usize> {
        None
    }

    fn eval_transform(&self, _script_id: &str, _params: &[String], _ctx: &ScriptContext<'_>) -> Option<()> {
        None
    }
}
