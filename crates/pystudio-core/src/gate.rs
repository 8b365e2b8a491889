//! One-operation-at-a-time execution gate.
//!
//! The interpreter has a single global namespace, so at most one sandbox may
//! be installed at any instant. Callers take a [`GatePermit`] before touching
//! the interpreter; the permit carries an in-flight marker that is cleared
//! when it is dropped.

use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::config::types::OverlapPolicy;
use crate::errors::StudioError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Run,
    Grade,
}

#[derive(Clone)]
pub struct ExecutionGate {
    policy: OverlapPolicy,
    slot: Arc<AsyncMutex<()>>,
    current: Arc<Mutex<Option<OperationKind>>>,
}

/// Proof of exclusive access to the interpreter.
pub struct GatePermit {
    kind: OperationKind,
    current: Arc<Mutex<Option<OperationKind>>>,
    _slot: OwnedMutexGuard<()>,
}

impl ExecutionGate {
    pub fn new(policy: OverlapPolicy) -> Self {
        Self {
            policy,
            slot: Arc::new(AsyncMutex::new(())),
            current: Arc::new(Mutex::new(None)),
        }
    }

    pub fn policy(&self) -> OverlapPolicy {
        self.policy
    }

    /// Waits for the gate (FIFO) or, under `OverlapPolicy::Reject`, fails with
    /// `StudioError::Busy` when another operation holds it.
    pub async fn enter(&self, kind: OperationKind) -> Result<GatePermit, StudioError> {
        let guard = match self.policy {
            OverlapPolicy::Queue => self.slot.clone().lock_owned().await,
            OverlapPolicy::Reject => self
                .slot
                .clone()
                .try_lock_owned()
                .map_err(|_| StudioError::Busy)?,
        };
        set_marker(&self.current, Some(kind));
        log::debug!("Gate entered for {:?}", kind);
        Ok(GatePermit {
            kind,
            current: self.current.clone(),
            _slot: guard,
        })
    }

    /// Marker of the operation currently holding the gate.
    pub fn current_operation(&self) -> Option<OperationKind> {
        *self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_busy(&self) -> bool {
        self.current_operation().is_some()
    }
}

impl GatePermit {
    pub fn kind(&self) -> OperationKind {
        self.kind
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        set_marker(&self.current, None);
        log::debug!("Gate released after {:?}", self.kind);
    }
}

fn set_marker(current: &Mutex<Option<OperationKind>>, value: Option<OperationKind>) {
    *current.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = value;
}
