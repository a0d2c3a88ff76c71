// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Observer registrations and the URL fan-out table.

use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::rc::Rc;

/// Callback sink for availability edges on the URLs an observer registered.
///
/// All callbacks run synchronously inside coordinator operations and must
/// not call back into the coordinator.
pub trait ReceiverObserver {
    /// `url` can now be presented on the receiver `service_id`.
    fn on_receiver_available(&self, url: &str, service_id: &str);

    /// `url` can no longer be presented on `service_id` (or never could).
    fn on_receiver_unavailable(&self, url: &str, service_id: &str);

    /// The availability query for `url` on `service_id` failed.
    fn on_request_failed(&self, url: &str, service_id: &str);
}

/// Receiver identity as reported by the discovery layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub service_id: String,
    pub friendly_name: String,
    pub endpoint: SocketAddr,
}

/// Observers are identified by the object they point at, not by the
/// vtable the handle happens to carry.
fn same_observer(a: &Rc<dyn ReceiverObserver>, b: &Rc<dyn ReceiverObserver>) -> bool {
    std::ptr::eq(
        Rc::as_ptr(a) as *const (),
        Rc::as_ptr(b) as *const (),
    )
}

/// URL -> ordered observer list. A URL key exists only while at least one
/// observer is registered for it.
#[derive(Default)]
pub(crate) struct ObserverTable {
    by_url: BTreeMap<String, Vec<Rc<dyn ReceiverObserver>>>,
}

impl ObserverTable {
    /// Register `observer` for `url`. Duplicate registrations for the same
    /// (url, observer) pair are ignored.
    pub(crate) fn add(&mut self, url: &str, observer: &Rc<dyn ReceiverObserver>) -> bool {
        let observers = self.by_url.entry(url.to_string()).or_default();
        if observers.iter().any(|existing| same_observer(existing, observer)) {
            log::debug!("[avail] duplicate observer registration for url='{}'", url);
            return false;
        }
        observers.push(Rc::clone(observer));
        true
    }

    /// Remove `observer` from `url`; returns true when the URL entry became
    /// empty and was dropped.
    pub(crate) fn remove(&mut self, url: &str, observer: &Rc<dyn ReceiverObserver>) -> bool {
        let Some(observers) = self.by_url.get_mut(url) else {
            return false;
        };
        observers.retain(|existing| !same_observer(existing, observer));
        if observers.is_empty() {
            self.by_url.remove(url);
            return true;
        }
        false
    }

    /// Remove `observer` from every URL; returns the URLs whose entries
    /// became empty and were dropped.
    pub(crate) fn remove_everywhere(
        &mut self,
        observer: &Rc<dyn ReceiverObserver>,
    ) -> BTreeSet<String> {
        let mut emptied = BTreeSet::new();
        for (url, observers) in &mut self.by_url {
            observers.retain(|existing| !same_observer(existing, observer));
            if observers.is_empty() {
                emptied.insert(url.clone());
            }
        }
        for url in &emptied {
            self.by_url.remove(url);
        }
        emptied
    }

    /// Snapshot of the observers registered for `url`, if any.
    ///
    /// Emission sites iterate the snapshot so a callback that mutates the
    /// table cannot invalidate iteration in progress.
    pub(crate) fn snapshot(&self, url: &str) -> Option<Vec<Rc<dyn ReceiverObserver>>> {
        self.by_url.get(url).cloned()
    }

    /// All currently observed URLs, in sorted order.
    pub(crate) fn urls(&self) -> Vec<String> {
        self.by_url.keys().cloned().collect()
    }

    #[cfg(test)]
    pub(crate) fn contains_url(&self, url: &str) -> bool {
        self.by_url.contains_key(url)
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.by_url.is_empty()
    }
}
