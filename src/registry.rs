// src/registry.rs

//! Single source of truth for "what is running under name X".
//!
//! Every mutation happens under one lock, so register, replace and
//! unregister are atomic with respect to each other. Entries are compared by
//! [`RunId`], never by name alone, so cleanup of an old run can never evict
//! the run that replaced it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::supervisor::{RunControl, RunId};

#[derive(Debug, Default)]
pub struct RunRegistry {
    active: Mutex<HashMap<String, Arc<RunControl>>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `run` under its name, superseding any run already there.
    ///
    /// The superseded run is moved to `aborted` and told to stop before the
    /// lock is released, so two runs under one name are never both live. It
    /// is returned so the caller can wait for it to wind down.
    pub fn register(&self, run: Arc<RunControl>) -> Option<Arc<RunControl>> {
        let mut active = self.lock();
        let previous = active.insert(run.name().to_string(), Arc::clone(&run));
        if let Some(previous) = &previous {
            previous.abort();
            info!(
                run = %run.name(),
                run_id = %run.id(),
                replaced_run_id = %previous.id(),
                "run replaced"
            );
        } else {
            debug!(run = %run.name(), run_id = %run.id(), "run registered");
        }
        previous
    }

    /// Insert `run` only if no live run holds its name.
    ///
    /// A registered run that already reached a terminal state (it is only
    /// winding down) does not block the name; it is displaced and returned
    /// so the caller can wait for it. On conflict the live run is returned
    /// as the error and nothing changes.
    pub fn try_register(
        &self,
        run: Arc<RunControl>,
    ) -> Result<Option<Arc<RunControl>>, Arc<RunControl>> {
        let mut active = self.lock();
        if let Some(existing) = active.get(run.name()) {
            if !existing.is_terminal() {
                return Err(Arc::clone(existing));
            }
        }
        debug!(run = %run.name(), run_id = %run.id(), "run registered");
        Ok(active.insert(run.name().to_string(), run))
    }

    /// Remove `name` only if it still maps to run `id`.
    ///
    /// Returns true if an entry was removed.
    pub fn unregister(&self, name: &str, id: RunId) -> bool {
        let mut active = self.lock();
        match active.get(name) {
            Some(current) if current.id() == id => {
                active.remove(name);
                true
            }
            Some(current) => {
                debug!(
                    run = %name,
                    run_id = %id,
                    current_run_id = %current.id(),
                    "stale unregister ignored; name belongs to a newer run"
                );
                false
            }
            None => false,
        }
    }

    /// Every registered run, in no particular order.
    pub fn snapshot(&self) -> Vec<Arc<RunControl>> {
        self.lock().values().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<RunControl>> {
        self.lock().get(name).cloned()
    }

    /// Names with a registered run, sorted.
    pub fn list_active(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<RunControl>>> {
        // Every critical section is a single map operation, so a poisoned
        // map is still consistent.
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
