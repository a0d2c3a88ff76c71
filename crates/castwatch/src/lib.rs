// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # castwatch - presentation URL availability tracking
//!
//! A controller-side engine that tracks, per remote presentation receiver,
//! whether a set of presentation URLs can be served there. Observers
//! register interest in URLs; the engine queries every known receiver,
//! caches per-receiver results, subscribes to receiver-side watches for push
//! updates, and renews those watches before they expire. Observers hear
//! about every change as an available/unavailable edge.
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                        Application Layer                           |
//! |     ReceiverObserver callbacks  |  discovery add/remove feed       |
//! +--------------------------------------------------------------------+
//! |                     AvailabilityCoordinator                        |
//! |   URL -> observer fan-out | ServiceId -> requester | refresh timer |
//! +--------------------------------------------------------------------+
//! |                    per-receiver requester (internal)               |
//! |   request/watch tables | URL availability cache | id allocators    |
//! +--------------------------------------------------------------------+
//! |                  MessageDemuxer  |  transport seam                 |
//! |   (endpoint, type) routing       |  connect / write / endpoint id  |
//! +--------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`AvailabilityCoordinator`] | Entry point; multiplexes observers over receivers |
//! | [`ReceiverObserver`] | Application callback sink for availability edges |
//! | [`MessageDemuxer`] | Routes inbound frames by (endpoint, message type) |
//! | [`ConnectionClient`] | Transport seam the engine connects through |
//! | [`MonotonicClock`] | Time source for watch deadlines |
//!
//! ## Concurrency Model
//!
//! Single-threaded cooperative: every operation - observer add/remove,
//! receiver add/remove, refresh, transport and demuxer callbacks - runs to
//! completion on one thread. There are no locks and no `Send`/`Sync` bounds.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::net::SocketAddr;
//! use std::rc::Rc;
//! use castwatch::{
//!     AvailabilityCoordinator, ConnectRequest, ConnectionClient, ConnectionObserver,
//!     MessageDemuxer, ReceiverObserver, ServiceInfo, SystemClock,
//! };
//!
//! struct QuicClient; // the embedder's transport
//! impl ConnectionClient for QuicClient {
//!     fn connect(
//!         &self,
//!         _endpoint: SocketAddr,
//!         _observer: Rc<dyn ConnectionObserver>,
//!     ) -> ConnectRequest {
//!         ConnectRequest::new(1)
//!     }
//! }
//!
//! struct Listener;
//! impl ReceiverObserver for Listener {
//!     fn on_receiver_available(&self, url: &str, service_id: &str) {
//!         println!("{} can present {}", service_id, url);
//!     }
//!     fn on_receiver_unavailable(&self, url: &str, service_id: &str) {
//!         println!("{} cannot present {}", service_id, url);
//!     }
//!     fn on_request_failed(&self, url: &str, service_id: &str) {
//!         eprintln!("query for {} on {} failed", url, service_id);
//!     }
//! }
//!
//! let demux = MessageDemuxer::new();
//! let coordinator = AvailabilityCoordinator::new(
//!     Rc::new(SystemClock::new()),
//!     Rc::new(QuicClient),
//!     Rc::clone(&demux),
//! );
//! coordinator.add_observer(
//!     &["https://example.com/player.html".to_string()],
//!     Rc::new(Listener),
//! );
//! coordinator.add_receiver(&ServiceInfo {
//!     service_id: "living-room".to_string(),
//!     friendly_name: "Living Room TV".to_string(),
//!     endpoint: "192.168.1.17:1234".parse().unwrap(),
//! });
//! // Feed inbound connection bytes into `demux.on_data(...)` and re-arm a
//! // timer with the delay returned by `coordinator.refresh_watches()`.
//! ```

/// URL availability tracking engine (start here).
pub mod availability;
/// Monotonic time source for watch deadlines.
pub mod clock;
/// Inbound message demultiplexing by endpoint and message type.
pub mod demux;
/// Crate-wide error type.
pub mod error;
/// Wire messages and their binary codec.
pub mod msgs;
/// Transport seam consumed by the engine.
pub mod transport;

pub use availability::{
    AvailabilityCoordinator, ReceiverObserver, ServiceInfo, WATCH_DURATION, WATCH_REFRESH_PADDING,
};
pub use clock::{ManualClock, MonotonicClock, SystemClock};
pub use demux::{MessageCallback, MessageDemuxer, MessageWatch};
pub use error::{Error, Result};
pub use msgs::{
    Availability, Type, UrlAvailabilityEvent, UrlAvailabilityRequest, UrlAvailabilityResponse,
};
pub use transport::{ConnectRequest, ConnectionClient, ConnectionObserver, ProtocolConnection};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
