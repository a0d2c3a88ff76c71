// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire messages of the URL availability protocol.
//!
//! Three messages flow between the controller and a receiver:
//!
//! - [`UrlAvailabilityRequest`]: one-shot query for a list of URLs. It also
//!   opens a receiver-side watch under `watch_id`.
//! - [`UrlAvailabilityResponse`]: the answer, with one availability per
//!   requested URL, in request order.
//! - [`UrlAvailabilityEvent`]: push update for a subset of a watch's URLs
//!   whenever their availability changes. Events do not extend the watch.
//!
//! Encoding and decoding live in [`codec`].

pub mod codec;

pub use codec::{
    decode_url_availability_event, decode_url_availability_request,
    decode_url_availability_response, encode_url_availability_event,
    encode_url_availability_request, encode_url_availability_response,
};

/// Message type tags as they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    UrlAvailabilityRequest,
    UrlAvailabilityResponse,
    UrlAvailabilityEvent,
}

impl Type {
    /// Wire tag for this message type.
    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            Type::UrlAvailabilityRequest => 14,
            Type::UrlAvailabilityResponse => 15,
            Type::UrlAvailabilityEvent => 103,
        }
    }

    /// Map a wire tag back to a message type.
    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Type> {
        match tag {
            14 => Some(Type::UrlAvailabilityRequest),
            15 => Some(Type::UrlAvailabilityResponse),
            103 => Some(Type::UrlAvailabilityEvent),
            _ => None,
        }
    }
}

/// Receiver verdict for a single presentation URL.
///
/// `Other` carries ordinals this implementation does not recognize so that
/// callers can skip them without failing the whole message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    /// The receiver can present this URL.
    Compatible,
    /// The receiver understands the URL but cannot present it.
    NotCompatible,
    /// The receiver rejects the URL as invalid.
    NotValid,
    /// Unrecognized wire ordinal, carried through verbatim.
    Other(u8),
}

impl Availability {
    /// Wire ordinal for this verdict.
    #[must_use]
    pub const fn to_wire(self) -> u8 {
        match self {
            Availability::Compatible => 0,
            Availability::NotCompatible => 1,
            Availability::NotValid => 10,
            Availability::Other(ordinal) => ordinal,
        }
    }

    /// Decode a wire ordinal. Never produces `Other` for a known ordinal.
    #[must_use]
    pub const fn from_wire(ordinal: u8) -> Self {
        match ordinal {
            0 => Availability::Compatible,
            1 => Availability::NotCompatible,
            10 => Availability::NotValid,
            other => Availability::Other(other),
        }
    }
}

/// Query the availability of `urls` and open a watch for them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlAvailabilityRequest {
    pub request_id: u64,
    pub watch_id: u64,
    pub urls: Vec<String>,
}

/// Answer to a [`UrlAvailabilityRequest`]; `url_availabilities[i]` belongs to
/// the i-th URL of the matching request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlAvailabilityResponse {
    pub request_id: u64,
    pub url_availabilities: Vec<Availability>,
}

/// Push update for a subset of a watch's URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlAvailabilityEvent {
    pub watch_id: u64,
    pub urls: Vec<String>,
    pub url_availabilities: Vec<Availability>,
}
