//! Environments
//!
//! Scoped name→Variable frames held in an arena and addressed by `EnvId`.
//! Each frame has a regular variable map and an inner parameter map that
//! shadows it. Lookup walks the parent chain; writes go to the owning frame.
//!
//! A frame flagged as an isolation root is a write barrier: assignments from
//! descendants that resolve to a binding owned at-or-above the nearest root
//! are rejected, while bindings created below the root stay mutable.

use indexmap::IndexMap;

use crate::env::variable::{Variable, VariableValue};
use crate::interpreter::errors::MlldError;
use crate::values::StructuredValue;

/// Arena index of an environment frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnvId(pub usize);

/// One scope frame.
#[derive(Debug, Clone, Default)]
pub struct EnvFrame {
    pub parent: Option<EnvId>,
    /// Insertion order is definition order; wildcard export relies on it
    pub variables: IndexMap<String, Variable>,
    /// Inner scope, shadows `variables`
    pub parameters: IndexMap<String, Variable>,
    /// Write barrier for parallel iteration
    pub isolation_root: bool,
    /// `let` bindings in this frame may shadow outer names
    pub allow_let_shadowing: bool,
}

/// Arena of environment frames.
#[derive(Debug, Clone, Default)]
pub struct EnvArena {
    frames: Vec<EnvFrame>,
}

impl EnvArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a root frame with no parent.
    pub fn new_root(&mut self) -> EnvId {
        self.push(EnvFrame::default())
    }

    /// Create a child frame.
    pub fn child(&mut self, parent: EnvId) -> EnvId {
        self.push(EnvFrame {
            parent: Some(parent),
            ..Default::default()
        })
    }

    /// Create a child frame flagged as a parallel isolation root.
    pub fn child_isolated(&mut self, parent: EnvId) -> EnvId {
        self.push(EnvFrame {
            parent: Some(parent),
            isolation_root: true,
            ..Default::default()
        })
    }

    /// Create a child frame that permits `let` shadowing of outer names.
    pub fn child_shadowing(&mut self, parent: EnvId) -> EnvId {
        self.push(EnvFrame {
            parent: Some(parent),
            allow_let_shadowing: true,
            ..Default::default()
        })
    }

    fn push(&mut self, frame: EnvFrame) -> EnvId {
        self.frames.push(frame);
        EnvId(self.frames.len() - 1)
    }

    pub fn frame(&self, id: EnvId) -> &EnvFrame {
        &self.frames[id.0]
    }

    pub fn frame_mut(&mut self, id: EnvId) -> &mut EnvFrame {
        &mut self.frames[id.0]
    }

    pub fn parent(&self, id: EnvId) -> Option<EnvId> {
        self.frames[id.0].parent
    }

    /// Lookup rule: parameters first, then variables, then the parent chain.
    pub fn lookup(&self, env: EnvId, name: &str) -> Option<&Variable> {
        let mut current = Some(env);
        while let Some(id) = current {
            let frame = self.frame(id);
            if let Some(v) = frame.parameters.get(name) {
                return Some(v);
            }
            if let Some(v) = frame.variables.get(name) {
                return Some(v);
            }
            current = frame.parent;
        }
        None
    }

    /// Frame that owns the (non-parameter) binding for `name`, if any.
    pub fn owner_of(&self, env: EnvId, name: &str) -> Option<EnvId> {
        let mut current = Some(env);
        while let Some(id) = current {
            let frame = self.frame(id);
            if frame.parameters.contains_key(name) || frame.variables.contains_key(name) {
                return Some(id);
            }
            current = frame.parent;
        }
        None
    }

    /// Define a new variable in `env`. Redefinition of a non-shadowable
    /// binding in the same frame fails with a stable error; imported
    /// variables and let-shadow slots are redefinable.
    pub fn define(&mut self, env: EnvId, var: Variable) -> Result<(), MlldError> {
        let frame = self.frame_mut(env);
        if let Some(existing) = frame.variables.get(&var.name) {
            if !existing.internal.is_imported && !frame.allow_let_shadowing {
                return Err(MlldError::AlreadyDefined(var.name.clone()));
            }
        }
        frame.variables.insert(var.name.clone(), var);
        Ok(())
    }

    /// Define a parameter binding in `env`'s inner scope.
    pub fn define_parameter(&mut self, env: EnvId, var: Variable) {
        self.frame_mut(env).parameters.insert(var.name.clone(), var);
    }

    /// `let` binding: always lands in this frame, shadowing outer names.
    pub fn define_let(&mut self, env: EnvId, var: Variable) -> Result<(), MlldError> {
        let frame = self.frame_mut(env);
        if frame.variables.contains_key(&var.name) && !frame.allow_let_shadowing {
            return Err(MlldError::AlreadyDefined(var.name.clone()));
        }
        frame.variables.insert(var.name.clone(), var);
        Ok(())
    }

    /// Nearest frame at-or-above `env` flagged as an isolation root.
    fn nearest_isolation_root(&self, env: EnvId) -> Option<EnvId> {
        let mut current = Some(env);
        while let Some(id) = current {
            if self.frame(id).isolation_root {
                return Some(id);
            }
            current = self.frame(id).parent;
        }
        None
    }

    /// True if `ancestor` is `id` or on `id`'s parent chain.
    fn is_at_or_above(&self, ancestor: EnvId, id: EnvId) -> bool {
        let mut current = Some(id);
        while let Some(c) = current {
            if c == ancestor {
                return true;
            }
            current = self.frame(c).parent;
        }
        false
    }

    /// Mutate an existing binding in place, honoring the isolation barrier.
    pub fn assign(
        &mut self,
        env: EnvId,
        name: &str,
        value: StructuredValue,
    ) -> Result<(), MlldError> {
        let owner = self
            .owner_of(env, name)
            .ok_or_else(|| MlldError::UnknownVariable(name.to_string()))?;

        if let Some(root) = self.nearest_isolation_root(env) {
            // The binding is out of reach when its owner sits at the root
            // frame or anywhere above it.
            if self.is_at_or_above(owner, root) {
                return Err(MlldError::IsolationViolation(name.to_string()));
            }
        }

        let frame = self.frame_mut(owner);
        if let Some(var) = frame.parameters.get_mut(name) {
            var.mx = value.descriptor.clone();
            var.value = VariableValue::Structured(value);
            return Ok(());
        }
        if let Some(var) = frame.variables.get_mut(name) {
            var.mx = value.descriptor.clone();
            var.value = VariableValue::Structured(value);
            return Ok(());
        }
        Err(MlldError::UnknownVariable(name.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Names bound in a single frame, in definition order (used by export
    /// wildcard).
    pub fn frame_names(&self, env: EnvId) -> Vec<String> {
        self.frame(env).variables.keys().cloned().collect()
    }
}
