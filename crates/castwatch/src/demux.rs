// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Inbound message demultiplexing.
//!
//! Routes decoded-frame boundaries per (endpoint, message type) to the
//! handler that registered interest. Bytes arrive in arbitrary chunks; the
//! demuxer buffers per connection, reads the leading type tag, and hands the
//! remainder to the handler. A handler that reports
//! [`Error::IncompleteMessage`] gets the same bytes again once more arrive.
//!
//! Registrations are handle-scoped: dropping the [`MessageWatch`] returned by
//! [`MessageDemuxer::watch_message_type`] removes the route. One handler slot
//! exists per (endpoint, type); callers re-register only when not already
//! holding a watch.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::error::{Error, Result};
use crate::msgs::Type;

/// Handler for demultiplexed stream messages.
///
/// Returns the number of payload bytes consumed on success.
/// [`Error::IncompleteMessage`] asks the demuxer to retain the bytes and
/// retry later; any other error discards the connection's buffer.
pub trait MessageCallback {
    fn on_stream_message(
        &self,
        endpoint_id: u64,
        connection_id: u64,
        message_type: Type,
        buffer: &[u8],
    ) -> Result<usize>;
}

/// Registration handle; the route lives as long as the handle.
pub struct MessageWatch {
    demux: Weak<MessageDemuxer>,
    endpoint_id: u64,
    message_type: Type,
}

impl Drop for MessageWatch {
    fn drop(&mut self) {
        if let Some(demux) = self.demux.upgrade() {
            demux.stop_watching(self.endpoint_id, self.message_type);
        }
    }
}

/// Per-controller inbound router.
pub struct MessageDemuxer {
    weak_self: Weak<MessageDemuxer>,
    watches: RefCell<HashMap<(u64, Type), Weak<dyn MessageCallback>>>,
    // Keyed by (endpoint_id, connection_id); holds bytes awaiting a complete
    // message.
    buffers: RefCell<HashMap<(u64, u64), Vec<u8>>>,
}

impl MessageDemuxer {
    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new_cyclic(|weak| Self {
            weak_self: weak.clone(),
            watches: RefCell::new(HashMap::new()),
            buffers: RefCell::new(HashMap::new()),
        })
    }

    /// Route `message_type` frames from `endpoint_id` to `callback`.
    ///
    /// Replaces any previous registration for the same (endpoint, type).
    pub fn watch_message_type(
        &self,
        endpoint_id: u64,
        message_type: Type,
        callback: Weak<dyn MessageCallback>,
    ) -> MessageWatch {
        self.watches
            .borrow_mut()
            .insert((endpoint_id, message_type), callback);
        log::debug!(
            "[demux] watch registered endpoint={} type={:?}",
            endpoint_id,
            message_type
        );
        MessageWatch {
            demux: self.weak_self.clone(),
            endpoint_id,
            message_type,
        }
    }

    /// Number of live registrations.
    #[must_use]
    pub fn watch_count(&self) -> usize {
        self.watches.borrow().len()
    }

    /// Feed raw stream bytes from one connection.
    ///
    /// Dispatches as many complete messages as the buffer holds. Trailing
    /// bytes of an incomplete message are retained for the next call. Any
    /// malformed message, unknown tag, or unrouted type drops the rest of
    /// the connection's buffer.
    pub fn on_data(&self, endpoint_id: u64, connection_id: u64, data: &[u8]) {
        let key = (endpoint_id, connection_id);
        let mut buffer = {
            let mut buffers = self.buffers.borrow_mut();
            let buffer = buffers.entry(key).or_default();
            buffer.extend_from_slice(data);
            std::mem::take(buffer)
        };

        while !buffer.is_empty() {
            let Some(message_type) = Type::from_tag(buffer[0]) else {
                log::warn!("[demux] unknown message tag {}, dropping buffer", buffer[0]);
                buffer.clear();
                break;
            };
            let handler = self
                .watches
                .borrow()
                .get(&(endpoint_id, message_type))
                .cloned();
            let Some(handler) = handler.and_then(|weak| weak.upgrade()) else {
                log::debug!(
                    "[demux] no watch for endpoint={} type={:?}, dropping buffer",
                    endpoint_id,
                    message_type
                );
                buffer.clear();
                break;
            };
            match handler.on_stream_message(endpoint_id, connection_id, message_type, &buffer[1..])
            {
                Ok(consumed) => {
                    buffer.drain(..(consumed + 1).min(buffer.len()));
                }
                Err(Error::IncompleteMessage) => break,
                Err(error) => {
                    log::warn!("[demux] handler error, dropping buffer: {}", error);
                    buffer.clear();
                    break;
                }
            }
        }

        let mut buffers = self.buffers.borrow_mut();
        if buffer.is_empty() {
            buffers.remove(&key);
        } else {
            buffers.insert(key, buffer);
        }
    }

    fn stop_watching(&self, endpoint_id: u64, message_type: Type) {
        self.watches
            .borrow_mut()
            .remove(&(endpoint_id, message_type));
        log::debug!(
            "[demux] watch removed endpoint={} type={:?}",
            endpoint_id,
            message_type
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msgs::{
        encode_url_availability_response, Availability, UrlAvailabilityResponse,
    };

    struct RecordingCallback {
        messages: RefCell<Vec<(u64, u64, Type, Vec<u8>)>>,
        // Error to return instead of consuming, if set.
        fail_with: RefCell<Option<Error>>,
    }

    impl RecordingCallback {
        fn new() -> Rc<Self> {
            Rc::new(Self {
                messages: RefCell::new(Vec::new()),
                fail_with: RefCell::new(None),
            })
        }
    }

    impl MessageCallback for RecordingCallback {
        fn on_stream_message(
            &self,
            endpoint_id: u64,
            connection_id: u64,
            message_type: Type,
            buffer: &[u8],
        ) -> Result<usize> {
            if let Some(error) = self.fail_with.borrow_mut().take() {
                return Err(error);
            }
            let (_, consumed) = crate::msgs::decode_url_availability_response(buffer)?;
            self.messages.borrow_mut().push((
                endpoint_id,
                connection_id,
                message_type,
                buffer[..consumed].to_vec(),
            ));
            Ok(consumed)
        }
    }

    fn handler(callback: &Rc<RecordingCallback>) -> Weak<dyn MessageCallback> {
        let callback: Rc<dyn MessageCallback> = callback.clone();
        Rc::downgrade(&callback)
    }

    fn response_frame() -> Vec<u8> {
        encode_url_availability_response(&UrlAvailabilityResponse {
            request_id: 9,
            url_availabilities: vec![Availability::Compatible],
        })
        .unwrap()
    }

    #[test]
    fn test_dispatch_complete_frame() {
        let demux = MessageDemuxer::new();
        let callback = RecordingCallback::new();
        let _watch = demux.watch_message_type(
            5,
            Type::UrlAvailabilityResponse,
            handler(&callback),
        );

        demux.on_data(5, 1, &response_frame());
        let messages = callback.messages.borrow();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, 5);
        assert_eq!(messages[0].2, Type::UrlAvailabilityResponse);
    }

    #[test]
    fn test_incomplete_frame_buffered_until_complete() {
        let demux = MessageDemuxer::new();
        let callback = RecordingCallback::new();
        let _watch = demux.watch_message_type(
            5,
            Type::UrlAvailabilityResponse,
            handler(&callback),
        );

        let frame = response_frame();
        let (head, tail) = frame.split_at(4);
        demux.on_data(5, 1, head);
        assert!(callback.messages.borrow().is_empty());

        demux.on_data(5, 1, tail);
        assert_eq!(callback.messages.borrow().len(), 1);
    }

    #[test]
    fn test_two_frames_in_one_chunk() {
        let demux = MessageDemuxer::new();
        let callback = RecordingCallback::new();
        let _watch = demux.watch_message_type(
            5,
            Type::UrlAvailabilityResponse,
            handler(&callback),
        );

        let mut chunk = response_frame();
        chunk.extend_from_slice(&response_frame());
        demux.on_data(5, 1, &chunk);
        assert_eq!(callback.messages.borrow().len(), 2);
    }

    #[test]
    fn test_unknown_tag_drops_buffer() {
        let demux = MessageDemuxer::new();
        let callback = RecordingCallback::new();
        let _watch = demux.watch_message_type(
            5,
            Type::UrlAvailabilityResponse,
            handler(&callback),
        );

        let mut chunk = vec![0xee];
        chunk.extend_from_slice(&response_frame());
        demux.on_data(5, 1, &chunk);
        // Everything after the bad tag is gone too.
        assert!(callback.messages.borrow().is_empty());

        // The connection recovers on the next clean frame.
        demux.on_data(5, 1, &response_frame());
        assert_eq!(callback.messages.borrow().len(), 1);
    }

    #[test]
    fn test_handler_error_drops_buffer() {
        let demux = MessageDemuxer::new();
        let callback = RecordingCallback::new();
        let _watch = demux.watch_message_type(
            5,
            Type::UrlAvailabilityResponse,
            handler(&callback),
        );

        *callback.fail_with.borrow_mut() = Some(Error::InvalidResponseId(9));
        let mut chunk = response_frame();
        chunk.extend_from_slice(&response_frame());
        demux.on_data(5, 1, &chunk);
        assert!(callback.messages.borrow().is_empty());
    }

    #[test]
    fn test_unrouted_type_dropped() {
        let demux = MessageDemuxer::new();
        demux.on_data(5, 1, &response_frame());
        assert_eq!(demux.watch_count(), 0);
    }

    #[test]
    fn test_watch_drop_deregisters() {
        let demux = MessageDemuxer::new();
        let callback = RecordingCallback::new();
        let watch = demux.watch_message_type(
            5,
            Type::UrlAvailabilityResponse,
            handler(&callback),
        );
        assert_eq!(demux.watch_count(), 1);

        drop(watch);
        assert_eq!(demux.watch_count(), 0);

        demux.on_data(5, 1, &response_frame());
        assert!(callback.messages.borrow().is_empty());
    }
}
