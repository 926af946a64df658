//! # Scope Gate
//!
//! Tracks which realm the session is bound to. Every transition that changes
//! the bound realm bumps a generation counter; fetches and feed events tagged
//! with an older generation are discarded by the live store.

use crate::error::CoreError;
use uuid::Uuid;

pub type Generation = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeState {
    Unresolved,
    Resolved { realm_id: Uuid, generation: Generation },
}

/// Result of feeding a realm observation into the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeTransition {
    /// First realm after being unresolved. Subscribe, then fetch.
    Opened { realm_id: Uuid, generation: Generation },
    /// A different realm replaced the bound one. Tear down, clear, resubscribe.
    Switched {
        from: Uuid,
        to: Uuid,
        generation: Generation,
    },
    Unchanged,
    /// The realm went away. Tear down and clear.
    Closed { generation: Generation },
    AlreadyClosed,
}

impl ScopeTransition {
    pub fn generation(&self) -> Option<Generation> {
        match self {
            ScopeTransition::Opened { generation, .. }
            | ScopeTransition::Switched { generation, .. }
            | ScopeTransition::Closed { generation } => Some(*generation),
            ScopeTransition::Unchanged | ScopeTransition::AlreadyClosed => None,
        }
    }
}

#[derive(Debug)]
pub struct ScopeGate {
    state: ScopeState,
    generation: Generation,
}

impl Default for ScopeGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeGate {
    pub fn new() -> Self {
        Self {
            state: ScopeState::Unresolved,
            generation: 0,
        }
    }

    pub fn state(&self) -> ScopeState {
        self.state
    }

    pub fn realm(&self) -> Option<Uuid> {
        match self.state {
            ScopeState::Resolved { realm_id, .. } => Some(realm_id),
            ScopeState::Unresolved => None,
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        self.generation == generation
    }

    pub fn require_realm(&self) -> Result<Uuid, CoreError> {
        self.realm().ok_or(CoreError::RealmUnresolved)
    }

    /// Applies the latest realm observation from the session.
    pub fn resolve(&mut self, realm: Option<Uuid>) -> ScopeTransition {
        match (self.state, realm) {
            (ScopeState::Unresolved, None) => ScopeTransition::AlreadyClosed,
            (ScopeState::Unresolved, Some(realm_id)) => {
                let generation = self.bump();
                self.state = ScopeState::Resolved { realm_id, generation };
                ScopeTransition::Opened { realm_id, generation }
            }
            (ScopeState::Resolved { realm_id: current, .. }, Some(next)) if current == next => {
                ScopeTransition::Unchanged
            }
            (ScopeState::Resolved { realm_id: current, .. }, Some(next)) => {
                let generation = self.bump();
                self.state = ScopeState::Resolved {
                    realm_id: next,
                    generation,
                };
                ScopeTransition::Switched {
                    from: current,
                    to: next,
                    generation,
                }
            }
            (ScopeState::Resolved { .. }, None) => {
                let generation = self.bump();
                self.state = ScopeState::Unresolved;
                ScopeTransition::Closed { generation }
            }
        }
    }

    pub fn sign_out(&mut self) -> ScopeTransition {
        self.resolve(None)
    }

    fn bump(&mut self) -> Generation {
        self.generation += 1;
        self.generation
    }
}
