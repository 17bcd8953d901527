//! Running flags shared between a task and its controller

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// How far a stop request reaches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopScope {
    /// Only the instance that receives the request
    Local,
    /// Every instance of the same kind
    All,
}

/// Global (per kind) and local (per instance) running flags
///
/// A task keeps running while both flags are set. Reads are relaxed;
/// a stale read only delays shutdown by one loop iteration.
#[derive(Debug, Clone)]
pub struct RunFlags {
    global: Arc<AtomicBool>,
    local: Arc<AtomicBool>,
}

impl RunFlags {
    /// Flags for a new instance sharing `global` with its kind
    pub fn new(global: Arc<AtomicBool>) -> Self {
        Self {
            global,
            local: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Flags not tied to any kind
    pub fn standalone() -> Self {
        Self::new(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_running(&self) -> bool {
        self.global.load(Ordering::Relaxed) && self.local.load(Ordering::Relaxed)
    }

    pub fn global_running(&self) -> bool {
        self.global.load(Ordering::Relaxed)
    }

    pub fn local_running(&self) -> bool {
        self.local.load(Ordering::Relaxed)
    }

    pub fn stop(&self, scope: StopScope) {
        match scope {
            StopScope::Local => self.local.store(false, Ordering::Relaxed),
            StopScope::All => self.global.store(false, Ordering::Relaxed),
        }
    }

    /// Flag shared by every instance of the kind
    pub fn global(&self) -> &Arc<AtomicBool> {
        &self.global
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_stop_leaves_siblings_running() {
        let global = Arc::new(AtomicBool::new(true));
        let a = RunFlags::new(global.clone());
        let b = RunFlags::new(global);

        a.stop(StopScope::Local);
        assert!(!a.is_running());
        assert!(b.is_running());
        assert!(a.global_running());
    }

    #[test]
    fn test_global_stop_reaches_every_instance() {
        let global = Arc::new(AtomicBool::new(true));
        let a = RunFlags::new(global.clone());
        let b = RunFlags::new(global);

        b.stop(StopScope::All);
        assert!(!a.is_running());
        assert!(!b.is_running());
        assert!(a.local_running());
    }

    #[test]
    fn test_clones_share_state() {
        let flags = RunFlags::standalone();
        let handle = flags.clone();
        handle.stop(StopScope::Local);
        assert!(!flags.is_running());
    }
}
