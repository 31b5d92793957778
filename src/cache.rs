//! # Localization cache
//!
//! Process-wide store of computed [`Localization`]s keyed by notice identifier (`ivorn`).
//!
//! Each key owns a [`OnceCell`]: concurrent requests for the same notice build the
//! localization once, the other callers block until it is ready and share the result.
//! A failed build drops the key, so the next request tries again.
//!
//! ## Lifecycle
//!
//! - populated on the first successful [`get_or_try_insert`](LocalizationCache::get_or_try_insert),
//! - dropped by [`invalidate`](LocalizationCache::invalidate) when a notice is superseded,
//! - emptied by [`clear`](LocalizationCache::clear).

use std::sync::{Arc, Mutex, MutexGuard};

use ahash::AHashMap;
use once_cell::sync::OnceCell;
use tracing::debug;

use crate::{localization::Localization, skyloc_errors::SkylocError};

type Slot = Arc<OnceCell<Arc<Localization>>>;

#[derive(Debug, Default)]
pub struct LocalizationCache {
    slots: Mutex<AHashMap<String, Slot>>,
}

impl LocalizationCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, AHashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Cached localization of `ivorn`, if it has been computed.
    pub fn get(&self, ivorn: &str) -> Option<Arc<Localization>> {
        self.slots().get(ivorn).and_then(|slot| slot.get().cloned())
    }

    /// Return the cached localization of `ivorn`, computing it with `build` on first use.
    ///
    /// Arguments
    /// -----------------
    /// * `ivorn`: the notice identifier.
    /// * `build`: computes the localization; called at most once per key at a time.
    ///
    /// Return
    /// ----------
    /// * The shared localization, or the error of `build` (nothing is cached then).
    pub fn get_or_try_insert<F>(&self, ivorn: &str, build: F) -> Result<Arc<Localization>, SkylocError>
    where
        F: FnOnce() -> Result<Localization, SkylocError>,
    {
        let slot = Arc::clone(self.slots().entry(ivorn.to_string()).or_default());
        // map lock released, only this key waits on the build
        let built = slot
            .get_or_try_init(|| {
                debug!(ivorn, "computing localization");
                build().map(Arc::new)
            })
            .cloned();

        if built.is_err() {
            let mut slots = self.slots();
            let stale = slots
                .get(ivorn)
                .is_some_and(|current| Arc::ptr_eq(current, &slot) && current.get().is_none());
            if stale {
                slots.remove(ivorn);
            }
        }
        built
    }

    /// Forget the localization of a superseded notice.
    pub fn invalidate(&self, ivorn: &str) -> bool {
        let removed = self.slots().remove(ivorn).is_some();
        if removed {
            debug!(ivorn, "localization invalidated");
        }
        removed
    }

    pub fn clear(&self) {
        self.slots().clear();
    }

    /// Number of notices with a computed localization.
    pub fn len(&self) -> usize {
        self.slots().values().filter(|slot| slot.get().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
