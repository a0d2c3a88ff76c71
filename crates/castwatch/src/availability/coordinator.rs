// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Controller-wide multiplexing of observer interest over receivers.
//!
//! The coordinator owns the URL fan-out table and one
//! [`ReceiverRequester`](super::requester::ReceiverRequester) per known
//! receiver. Observer and receiver lifecycle calls fan out across the
//! requesters; the periodic watch refresh is driven from here.
//!
//! Within a single call, edges reach observers in URL order and, per URL, in
//! observer registration order. Observer callbacks run synchronously and
//! must not call back into the coordinator.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;
use std::time::Duration;

use crate::clock::MonotonicClock;
use crate::demux::MessageDemuxer;
use crate::transport::ConnectionClient;

use super::observer::{ObserverTable, ReceiverObserver, ServiceInfo};
use super::requester::{ReceiverMap, ReceiverRequester, WATCH_DURATION};

/// Tracks which presentation URLs each known receiver can present and
/// notifies observers of every change.
pub struct AvailabilityCoordinator {
    observers: Rc<RefCell<ObserverTable>>,
    receivers: Rc<RefCell<ReceiverMap>>,
    clock: Rc<dyn MonotonicClock>,
    client: Rc<dyn ConnectionClient>,
    demux: Rc<MessageDemuxer>,
}

impl AvailabilityCoordinator {
    #[must_use]
    pub fn new(
        clock: Rc<dyn MonotonicClock>,
        client: Rc<dyn ConnectionClient>,
        demux: Rc<MessageDemuxer>,
    ) -> Self {
        Self {
            observers: Rc::new(RefCell::new(ObserverTable::default())),
            receivers: Rc::new(RefCell::new(ReceiverMap::new())),
            clock,
            client,
            demux,
        }
    }

    /// Register `observer` for `urls` on every known receiver.
    ///
    /// URLs a receiver already answered for are replayed to the new observer
    /// immediately from that receiver's cache; the rest are queried.
    pub fn add_observer(&self, urls: &[String], observer: Rc<dyn ReceiverObserver>) {
        {
            let mut table = self.observers.borrow_mut();
            for url in urls {
                table.add(url, &observer);
            }
        }
        for requester in self.receivers.borrow().values() {
            requester.request_availabilities(urls, Some(&observer));
        }
    }

    /// Drop `observer`'s interest in `urls`. URLs left with no observer are
    /// evicted from every receiver cache and cancelled out of outstanding
    /// requests and watches.
    pub fn remove_observer_urls(&self, urls: &[String], observer: &Rc<dyn ReceiverObserver>) {
        let mut unobserved = BTreeSet::new();
        {
            let mut table = self.observers.borrow_mut();
            for url in urls {
                if table.remove(url, observer) {
                    unobserved.insert(url.clone());
                }
            }
        }
        let receivers = self.receivers.borrow();
        for url in &unobserved {
            for requester in receivers.values() {
                requester.evict_cached_url(url);
            }
        }
        for requester in receivers.values() {
            requester.remove_unobserved_requests(&unobserved);
            requester.remove_unobserved_watches(&unobserved);
        }
    }

    /// Drop `observer` from every URL it is registered for.
    ///
    /// Cache entries are left in place here; only per-url removal evicts.
    pub fn remove_observer(&self, observer: &Rc<dyn ReceiverObserver>) {
        let unobserved = self.observers.borrow_mut().remove_everywhere(observer);
        let receivers = self.receivers.borrow();
        for requester in receivers.values() {
            requester.remove_unobserved_requests(&unobserved);
            requester.remove_unobserved_watches(&unobserved);
        }
    }

    /// A receiver appeared: connect to it and query every observed URL.
    pub fn add_receiver(&self, info: &ServiceInfo) {
        log::debug!(
            "[avail] adding receiver service='{}' endpoint={}",
            info.service_id,
            info.endpoint
        );
        let requester = ReceiverRequester::start(
            info,
            Rc::clone(&self.observers),
            Rc::downgrade(&self.receivers),
            Rc::clone(&self.clock),
            Rc::clone(&self.demux),
            &*self.client,
        );
        self.receivers
            .borrow_mut()
            .insert(info.service_id.clone(), Rc::clone(&requester));
        let urls = self.observers.borrow().urls();
        requester.request_availabilities(&urls, None);
    }

    /// A receiver disappeared: tear its requester down and forget it.
    pub fn remove_receiver(&self, service_id: &str) {
        let requester = self.receivers.borrow().get(service_id).cloned();
        if let Some(requester) = requester {
            log::debug!("[avail] removing receiver service='{}'", service_id);
            requester.teardown();
            self.receivers.borrow_mut().remove(service_id);
        }
    }

    /// Tear down every receiver.
    pub fn remove_all_receivers(&self) {
        let all: Vec<Rc<ReceiverRequester>> =
            self.receivers.borrow().values().cloned().collect();
        for requester in all {
            requester.teardown();
        }
        self.receivers.borrow_mut().clear();
    }

    /// Reissue every watch near its deadline, on every receiver. Returns the
    /// recommended delay before the next call, never more than
    /// [`WATCH_DURATION`].
    pub fn refresh_watches(&self) -> Duration {
        let now = self.clock.now();
        let mut min_delay = WATCH_DURATION;
        for requester in self.receivers.borrow().values() {
            min_delay = min_delay.min(requester.refresh_watches(now));
        }
        min_delay
    }

    /// Number of receivers currently tracked.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.receivers.borrow().len()
    }

    #[cfg(test)]
    pub(crate) fn observes_no_urls(&self) -> bool {
        self.observers.borrow().is_empty()
    }

    #[cfg(test)]
    pub(crate) fn observes_url(&self, url: &str) -> bool {
        self.observers.borrow().contains_url(url)
    }
}
