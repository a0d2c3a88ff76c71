// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport seam between the availability engine and the connection layer.
//!
//! The engine does not open sockets itself. It asks a [`ConnectionClient`]
//! for a connection and hears back through [`ConnectionObserver`] exactly
//! once: opened or failed. Writes on an open [`ProtocolConnection`] are
//! fire-and-forget; any buffering or retransmission happens below this seam.

use std::net::SocketAddr;
use std::rc::Rc;

/// Handle for an in-flight connect. Dropping it abandons interest in the
/// outcome but does not cancel the connect itself.
#[derive(Debug)]
pub struct ConnectRequest {
    request_id: u64,
}

impl ConnectRequest {
    #[must_use]
    pub fn new(request_id: u64) -> Self {
        Self { request_id }
    }

    #[must_use]
    pub fn request_id(&self) -> u64 {
        self.request_id
    }
}

/// An open, ordered, best-effort message stream to one receiver.
pub trait ProtocolConnection {
    /// Identifier the demuxer uses to route inbound messages from this
    /// receiver. Stable while the connection is open.
    fn endpoint_id(&self) -> u64;

    /// Queue one encoded frame for delivery.
    fn write(&mut self, bytes: &[u8]);
}

/// Outcome callbacks for a [`ConnectionClient::connect`] call.
///
/// At most one of the two methods is invoked, exactly once, with the
/// `request_id` of the originating [`ConnectRequest`].
pub trait ConnectionObserver {
    fn on_connection_opened(&self, request_id: u64, connection: Box<dyn ProtocolConnection>);
    fn on_connection_failed(&self, request_id: u64);
}

/// Factory for receiver connections.
pub trait ConnectionClient {
    fn connect(&self, endpoint: SocketAddr, observer: Rc<dyn ConnectionObserver>)
        -> ConnectRequest;
}
