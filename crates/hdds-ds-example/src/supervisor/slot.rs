// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Handle to the application currently under supervision.

use crate::app::{Role, RoleApplication};
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

/// Holds at most one running application, reachable from signal context.
///
/// Signal delivery only ever borrows the application under the read lock,
/// so the last strong reference is never dropped on the signal thread.
#[derive(Default)]
pub struct AppSlot {
    app: RwLock<Option<Arc<dyn RoleApplication>>>,
    stop_requested_at: Mutex<Option<Instant>>,
}

impl AppSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// The slot used by the process entry point.
    pub fn global() -> Arc<AppSlot> {
        static GLOBAL: OnceLock<Arc<AppSlot>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(AppSlot::new())).clone()
    }

    /// Publish `app`. Fails, handing `app` back, if the slot is occupied.
    pub fn install(&self, app: Arc<dyn RoleApplication>) -> Result<(), Arc<dyn RoleApplication>> {
        let mut slot = self.app.write();
        if slot.is_some() {
            return Err(app);
        }
        *self.stop_requested_at.lock() = None;
        *slot = Some(app);
        Ok(())
    }

    /// Empty the slot; later signals become no-ops.
    pub fn clear(&self) -> Option<Arc<dyn RoleApplication>> {
        self.app.write().take()
    }

    pub fn is_empty(&self) -> bool {
        self.app.read().is_none()
    }

    pub fn role(&self) -> Option<Role> {
        self.app.read().as_ref().map(|app| app.role())
    }

    /// Run `f` against the installed application, if any.
    pub fn with_app<R>(&self, f: impl FnOnce(&dyn RoleApplication) -> R) -> Option<R> {
        let slot = self.app.read();
        slot.as_deref().map(|app| f(app))
    }

    /// Remember when the first stop was requested.
    pub fn mark_stop_requested(&self) {
        self.stop_requested_at.lock().get_or_insert_with(Instant::now);
    }

    pub fn stop_requested_at(&self) -> Option<Instant> {
        *self.stop_requested_at.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::RunState;

    struct Idle;

    impl RoleApplication for Idle {
        fn role(&self) -> Role {
            Role::Subscriber
        }
        fn run(&self) {}
        fn stop(&self) {}
        fn state(&self) -> RunState {
            RunState::Constructed
        }
    }

    #[test]
    fn test_install_and_clear() {
        let slot = AppSlot::new();
        assert!(slot.is_empty());
        assert!(slot.with_app(|app| app.role()).is_none());

        slot.install(Arc::new(Idle)).ok().unwrap();
        assert_eq!(slot.role(), Some(Role::Subscriber));
        assert!(slot.install(Arc::new(Idle)).is_err());

        assert!(slot.clear().is_some());
        assert!(slot.is_empty());
        assert!(slot.clear().is_none());
    }

    #[test]
    fn test_first_stop_timestamp_kept() {
        let slot = AppSlot::new();
        assert!(slot.stop_requested_at().is_none());

        slot.mark_stop_requested();
        let first = slot.stop_requested_at().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        slot.mark_stop_requested();
        assert_eq!(slot.stop_requested_at(), Some(first));

        // A new installation starts a fresh stop window.
        slot.install(Arc::new(Idle)).ok().unwrap();
        assert!(slot.stop_requested_at().is_none());
    }

    #[test]
    fn test_global_is_shared() {
        assert!(Arc::ptr_eq(&AppSlot::global(), &AppSlot::global()));
    }
}
