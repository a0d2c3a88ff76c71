// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-receiver protocol state machine.
//!
//! A `ReceiverRequester` owns everything the controller knows about one
//! receiver: the connection lifecycle, the request/watch id allocators, the
//! outstanding request and watch tables, the URL availability cache, and the
//! demuxer registrations for response and event frames.
//!
//! # States
//!
//! - CONNECTING: the connect is outstanding; queries issued now are queued
//!   with a placeholder watch id and replayed once the connection opens.
//! - READY: the connection is open; queries go out immediately and each
//!   successful send opens a receiver-side watch.
//! - FAILED: terminal; entered when the connect fails (the requester then
//!   removes itself from the coordinator) or when the coordinator tears the
//!   receiver down. A transport drop after READY is not modelled.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::{Rc, Weak};
use std::time::Duration;

use crate::clock::MonotonicClock;
use crate::demux::{MessageCallback, MessageDemuxer, MessageWatch};
use crate::error::{Error, Result};
use crate::msgs::{self, Availability, Type, UrlAvailabilityRequest};
use crate::transport::{ConnectRequest, ConnectionClient, ConnectionObserver, ProtocolConnection};

use super::observer::{ObserverTable, ReceiverObserver, ServiceInfo};

/// How long a receiver-side watch lives.
pub const WATCH_DURATION: Duration = Duration::from_secs(20);

/// Watches are refreshed this long before their deadline.
pub const WATCH_REFRESH_PADDING: Duration = Duration::from_secs(2);

pub(crate) type ReceiverMap = BTreeMap<String, Rc<ReceiverRequester>>;

/// One outstanding query. `watch_id` is 0 while the request is queued
/// waiting for the connection; it is assigned for real on send.
struct PendingRequest {
    watch_id: u64,
    urls: Vec<String>,
}

/// One live receiver-side watch.
struct Watch {
    deadline: Duration,
    urls: Vec<String>,
}

struct RequesterState {
    connect_request: Option<ConnectRequest>,
    connection: Option<Box<dyn ProtocolConnection>>,
    endpoint_id: u64,
    next_request_id: u64,
    next_watch_id: u64,
    requests: BTreeMap<u64, PendingRequest>,
    watches: BTreeMap<u64, Watch>,
    cache: BTreeMap<String, Availability>,
    response_watch: Option<MessageWatch>,
    event_watch: Option<MessageWatch>,
}

impl RequesterState {
    fn new() -> Self {
        Self {
            connect_request: None,
            connection: None,
            endpoint_id: 0,
            next_request_id: 1,
            next_watch_id: 1,
            requests: BTreeMap::new(),
            watches: BTreeMap::new(),
            cache: BTreeMap::new(),
            response_watch: None,
            event_watch: None,
        }
    }
}

#[derive(Clone, Copy)]
enum EdgeKind {
    Available,
    Unavailable,
    RequestFailed,
}

/// An edge queued for delivery once internal borrows are released.
struct PendingEdge {
    observer: Rc<dyn ReceiverObserver>,
    url: String,
    kind: EdgeKind,
}

pub(crate) struct ReceiverRequester {
    service_id: String,
    observers: Rc<RefCell<ObserverTable>>,
    registry: Weak<RefCell<ReceiverMap>>,
    clock: Rc<dyn MonotonicClock>,
    demux: Rc<MessageDemuxer>,
    weak_self: Weak<ReceiverRequester>,
    state: RefCell<RequesterState>,
}

impl ReceiverRequester {
    /// Create the requester and kick off the connect to `info.endpoint`.
    pub(crate) fn start(
        info: &ServiceInfo,
        observers: Rc<RefCell<ObserverTable>>,
        registry: Weak<RefCell<ReceiverMap>>,
        clock: Rc<dyn MonotonicClock>,
        demux: Rc<MessageDemuxer>,
        client: &dyn ConnectionClient,
    ) -> Rc<Self> {
        let requester = Rc::new_cyclic(|weak| Self {
            service_id: info.service_id.clone(),
            observers,
            registry,
            clock,
            demux,
            weak_self: weak.clone(),
            state: RefCell::new(RequesterState::new()),
        });
        let observer: Rc<dyn ConnectionObserver> = requester.clone();
        let connect = client.connect(info.endpoint, observer);
        requester.state.borrow_mut().connect_request = Some(connect);
        requester
    }

    /// Answer `urls` from the cache where possible, delivering the implied
    /// edge to `observer` (the one being added right now), and query the
    /// receiver for the rest in one batch.
    pub(crate) fn request_availabilities(
        &self,
        urls: &[String],
        observer: Option<&Rc<dyn ReceiverObserver>>,
    ) {
        let mut unknown = Vec::new();
        let mut edges = Vec::new();
        {
            let state = self.state.borrow();
            for url in urls {
                let Some(availability) = state.cache.get(url) else {
                    unknown.push(url.clone());
                    continue;
                };
                let Some(observer) = observer else { continue };
                let kind = match availability {
                    Availability::Compatible => EdgeKind::Available,
                    Availability::NotCompatible | Availability::NotValid => EdgeKind::Unavailable,
                    Availability::Other(_) => continue,
                };
                edges.push(PendingEdge {
                    observer: Rc::clone(observer),
                    url: url.clone(),
                    kind,
                });
            }
        }
        self.emit(edges);
        if !unknown.is_empty() {
            self.send_or_queue(unknown);
        }
    }

    /// Issue one query for `urls`: sent immediately when connected, queued
    /// for replay otherwise. An encode failure fails the whole batch.
    fn send_or_queue(&self, urls: Vec<String>) {
        if urls.is_empty() {
            return;
        }
        let failed = {
            let mut state = self.state.borrow_mut();
            let request_id = state.next_request_id;
            state.next_request_id += 1;
            if state.connection.is_none() {
                state
                    .requests
                    .insert(request_id, PendingRequest { watch_id: 0, urls });
                return;
            }
            match self.write_request(&mut state, request_id, &urls) {
                Ok(watch_id) => {
                    state
                        .requests
                        .insert(request_id, PendingRequest { watch_id, urls });
                    return;
                }
                Err(error) => {
                    log::warn!("[avail] request encode failed: {}", error);
                    urls
                }
            }
        };
        self.fail_urls(failed.iter());
    }

    /// Encode and write one request over the open connection; records the
    /// watch and acquires the demuxer registrations. Returns the watch id.
    fn write_request(
        &self,
        state: &mut RequesterState,
        request_id: u64,
        urls: &[String],
    ) -> Result<u64> {
        let watch_id = state.next_watch_id;
        state.next_watch_id += 1;
        let request = UrlAvailabilityRequest {
            request_id,
            watch_id,
            urls: urls.to_vec(),
        };
        let frame = msgs::encode_url_availability_request(&request)?;
        let Some(connection) = state.connection.as_mut() else {
            return Err(Error::NotConnected);
        };
        log::debug!(
            "[avail] writing url-availability-request request_id={} watch_id={} urls={}",
            request_id,
            watch_id,
            urls.len()
        );
        connection.write(&frame);
        state.watches.insert(
            watch_id,
            Watch {
                deadline: self.clock.now() + WATCH_DURATION,
                urls: urls.to_vec(),
            },
        );
        let handler: Weak<dyn MessageCallback> = self.weak_self.clone();
        if state.event_watch.is_none() {
            state.event_watch = Some(self.demux.watch_message_type(
                state.endpoint_id,
                Type::UrlAvailabilityEvent,
                handler.clone(),
            ));
        }
        if state.response_watch.is_none() {
            state.response_watch = Some(self.demux.watch_message_type(
                state.endpoint_id,
                Type::UrlAvailabilityResponse,
                handler,
            ));
        }
        Ok(watch_id)
    }

    /// Reissue every watch that is at (or within the refresh padding of) its
    /// deadline. Returns the delay until the next refresh is due, clamped by
    /// [`WATCH_DURATION`].
    pub(crate) fn refresh_watches(&self, now: Duration) -> Duration {
        let mut min_delay = WATCH_DURATION;
        let mut expired: Vec<Vec<String>> = Vec::new();
        {
            let mut state = self.state.borrow_mut();
            state.watches.retain(|watch_id, watch| {
                let buffered_deadline = watch.deadline.saturating_sub(WATCH_REFRESH_PADDING);
                if now > buffered_deadline {
                    log::debug!("[avail] watch {} due for refresh", watch_id);
                    expired.push(std::mem::take(&mut watch.urls));
                    return false;
                }
                min_delay = min_delay.min(buffered_deadline - now);
                true
            });
            if state.watches.is_empty() {
                state.event_watch = None;
            }
        }
        for urls in expired {
            self.send_or_queue(urls);
        }
        min_delay
    }

    /// Apply one (url, availability) pairing to the cache, collecting the
    /// edges to deliver. URLs nobody observes any more are skipped entirely;
    /// unknown ordinals are skipped and never cached.
    fn update_availabilities(
        &self,
        state: &mut RequesterState,
        urls: &[String],
        availabilities: &[Availability],
    ) -> Vec<PendingEdge> {
        let mut edges = Vec::new();
        for (url, availability) in urls.iter().zip(availabilities) {
            let Some(observers) = self.observers.borrow().snapshot(url) else {
                continue;
            };
            let kind = match availability {
                Availability::Compatible => EdgeKind::Available,
                Availability::NotCompatible | Availability::NotValid => EdgeKind::Unavailable,
                Availability::Other(ordinal) => {
                    log::debug!("[avail] ignoring unknown availability ordinal {}", ordinal);
                    continue;
                }
            };
            let changed = state.cache.insert(url.clone(), *availability) != Some(*availability);
            if !changed {
                continue;
            }
            for observer in observers {
                edges.push(PendingEdge {
                    observer,
                    url: url.clone(),
                    kind,
                });
            }
        }
        edges
    }

    /// Strip `unobserved` URLs out of every outstanding request and reissue
    /// whatever else those requests were still asking for.
    ///
    /// The stripped request entries stay in the table with their slot count
    /// intact so a response that is already in flight still consumes them
    /// without effect.
    pub(crate) fn remove_unobserved_requests(&self, unobserved: &BTreeSet<String>) {
        let mut survivors = BTreeSet::new();
        {
            let mut state = self.state.borrow_mut();
            let connected = state.connection.is_some();
            let mut dead_watches = Vec::new();
            for request in state.requests.values_mut() {
                if !request.urls.iter().any(|url| unobserved.contains(url)) {
                    continue;
                }
                for url in &mut request.urls {
                    if !url.is_empty() && !unobserved.contains(url) {
                        survivors.insert(std::mem::take(url));
                    }
                }
                if connected {
                    dead_watches.push(request.watch_id);
                }
            }
            for watch_id in dead_watches {
                state.watches.remove(&watch_id);
            }
        }
        if !survivors.is_empty() {
            self.send_or_queue(survivors.into_iter().collect());
        }
        let mut state = self.state.borrow_mut();
        if state.requests.is_empty() {
            state.response_watch = None;
        }
    }

    /// Strip `unobserved` URLs out of every watch, dropping the stripped
    /// watches and reissuing their surviving URLs as one fresh query.
    pub(crate) fn remove_unobserved_watches(&self, unobserved: &BTreeSet<String>) {
        let mut survivors = BTreeSet::new();
        {
            let mut state = self.state.borrow_mut();
            state.watches.retain(|_, watch| {
                if !watch.urls.iter().any(|url| unobserved.contains(url)) {
                    return true;
                }
                for url in &mut watch.urls {
                    if !url.is_empty() && !unobserved.contains(url) {
                        survivors.insert(std::mem::take(url));
                    }
                }
                false
            });
        }
        self.send_or_queue(survivors.into_iter().collect());
        let mut state = self.state.borrow_mut();
        if state.watches.is_empty() {
            state.event_watch = None;
        }
    }

    /// The last observer for `url` left; forget what the receiver said.
    pub(crate) fn evict_cached_url(&self, url: &str) {
        self.state.borrow_mut().cache.remove(url);
    }

    /// The receiver is going away. Every URL it reported Compatible flips to
    /// unavailable for its current observers, then all state is dropped.
    pub(crate) fn teardown(&self) {
        let compatible: Vec<String> = {
            let state = self.state.borrow();
            state
                .cache
                .iter()
                .filter(|(_, availability)| **availability == Availability::Compatible)
                .map(|(url, _)| url.clone())
                .collect()
        };
        let mut edges = Vec::new();
        for url in compatible {
            let Some(observers) = self.observers.borrow().snapshot(&url) else {
                continue;
            };
            for observer in observers {
                edges.push(PendingEdge {
                    observer,
                    url: url.clone(),
                    kind: EdgeKind::Unavailable,
                });
            }
        }
        self.emit(edges);
        *self.state.borrow_mut() = RequesterState::new();
    }

    /// Deliver `on_request_failed` to every current observer of each URL.
    fn fail_urls<'a>(&self, urls: impl IntoIterator<Item = &'a String>) {
        let mut edges = Vec::new();
        for url in urls {
            let Some(observers) = self.observers.borrow().snapshot(url) else {
                continue;
            };
            for observer in observers {
                edges.push(PendingEdge {
                    observer,
                    url: url.clone(),
                    kind: EdgeKind::RequestFailed,
                });
            }
        }
        self.emit(edges);
    }

    fn emit(&self, edges: Vec<PendingEdge>) {
        for edge in edges {
            match edge.kind {
                EdgeKind::Available => edge
                    .observer
                    .on_receiver_available(&edge.url, &self.service_id),
                EdgeKind::Unavailable => edge
                    .observer
                    .on_receiver_unavailable(&edge.url, &self.service_id),
                EdgeKind::RequestFailed => {
                    edge.observer.on_request_failed(&edge.url, &self.service_id)
                }
            }
        }
    }
}

impl ConnectionObserver for ReceiverRequester {
    fn on_connection_opened(&self, _request_id: u64, connection: Box<dyn ProtocolConnection>) {
        let mut state = self.state.borrow_mut();
        if let Some(connect) = state.connect_request.take() {
            log::debug!("[avail] connect request {} complete", connect.request_id());
        }
        state.endpoint_id = connection.endpoint_id();
        state.connection = Some(connection);
        log::debug!(
            "[avail] connection opened service='{}' endpoint={}",
            self.service_id,
            state.endpoint_id
        );

        // Replay everything queued while connecting, keeping request ids but
        // assigning real watch ids.
        let queued: Vec<u64> = state.requests.keys().copied().collect();
        for request_id in queued {
            let Some(urls) = state.requests.get(&request_id).map(|r| r.urls.clone()) else {
                continue;
            };
            match self.write_request(&mut state, request_id, &urls) {
                Ok(watch_id) => {
                    if let Some(request) = state.requests.get_mut(&request_id) {
                        request.watch_id = watch_id;
                    }
                }
                Err(error) => {
                    log::warn!(
                        "[avail] dropping queued request {}: encode failed: {}",
                        request_id,
                        error
                    );
                    state.requests.remove(&request_id);
                }
            }
        }
    }

    fn on_connection_failed(&self, _request_id: u64) {
        log::warn!("[avail] connect failed service='{}'", self.service_id);
        let waiting: BTreeSet<String> = {
            let mut state = self.state.borrow_mut();
            state.connect_request.take();
            state
                .requests
                .values()
                .flat_map(|request| request.urls.iter().cloned())
                .collect()
        };
        self.fail_urls(waiting.iter());
        if let Some(registry) = self.registry.upgrade() {
            registry.borrow_mut().remove(&self.service_id);
        }
    }
}

impl MessageCallback for ReceiverRequester {
    fn on_stream_message(
        &self,
        _endpoint_id: u64,
        _connection_id: u64,
        message_type: Type,
        buffer: &[u8],
    ) -> Result<usize> {
        match message_type {
            Type::UrlAvailabilityResponse => {
                let (response, consumed) = msgs::decode_url_availability_response(buffer)?;
                let edges = {
                    let mut state = self.state.borrow_mut();
                    let Some(request) = state.requests.get(&response.request_id) else {
                        log::error!("[avail] bad response id: {}", response.request_id);
                        return Err(Error::InvalidResponseId(response.request_id));
                    };
                    if request.urls.len() != response.url_availabilities.len() {
                        log::warn!(
                            "[avail] bad response size: expected {} but got {}",
                            request.urls.len(),
                            response.url_availabilities.len()
                        );
                        return Err(Error::InvalidMessage);
                    }
                    let urls = request.urls.clone();
                    let edges =
                        self.update_availabilities(&mut state, &urls, &response.url_availabilities);
                    state.requests.remove(&response.request_id);
                    if state.requests.is_empty() {
                        state.response_watch = None;
                    }
                    edges
                };
                self.emit(edges);
                Ok(consumed)
            }
            Type::UrlAvailabilityEvent => {
                let (event, consumed) = msgs::decode_url_availability_event(buffer)?;
                let edges = {
                    let mut state = self.state.borrow_mut();
                    if !state.watches.contains_key(&event.watch_id) {
                        // Stale event for a watch we already dropped.
                        log::debug!("[avail] event for unknown watch {}", event.watch_id);
                        Vec::new()
                    } else {
                        self.update_availabilities(&mut state, &event.urls, &event.url_availabilities)
                    }
                };
                self.emit(edges);
                Ok(consumed)
            }
            Type::UrlAvailabilityRequest => {
                log::warn!("[avail] unexpected message type {:?}", message_type);
                Err(Error::Parse("unexpected message type"))
            }
        }
    }
}
