// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Binary encoder/decoder for the availability messages.
//!
//! # Wire Format
//!
//! Every frame starts with a one-byte type tag ([`Type::tag`]) followed by
//! the message payload. Integers are little-endian; sequences carry a u32
//! element count; strings carry a u32 byte length plus UTF-8 bytes;
//! availabilities are single ordinal bytes.
//!
//! ```text
//! +-----+-------------------------------------------------------------+
//! | tag | payload                                                     |
//! +-----+-------------------------------------------------------------+
//!
//! request:  request_id:u64 | watch_id:u64 | url_count:u32 | urls...
//! response: request_id:u64 | count:u32 | ordinals (u8 each)
//! event:    watch_id:u64 | url_count:u32 | urls... | count:u32 | ordinals
//! url:      byte_len:u32 | utf-8 bytes
//! ```
//!
//! `encode_*` returns the full frame including the tag. `decode_*` consumes
//! a payload with the tag already stripped (the demuxer reads the tag to
//! route the message) and returns the decoded message plus the payload bytes
//! consumed. A short buffer yields [`Error::IncompleteMessage`] so the caller
//! can retain the bytes and retry.

use crate::error::{Error, Result};
use crate::msgs::{
    Availability, Type, UrlAvailabilityEvent, UrlAvailabilityRequest, UrlAvailabilityResponse,
};

/// Upper bound on sequence element counts; anything larger is malformed
/// rather than merely incomplete.
const MAX_SEQUENCE_LEN: u32 = 1 << 16;

/// Upper bound on a single URL's byte length.
const MAX_URL_LEN: u32 = 1 << 13;

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.buf.len() - self.pos < len {
            return Err(Error::IncompleteMessage);
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_u64(&mut self) -> Result<u64> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(raw))
    }

    fn read_url(&mut self) -> Result<String> {
        let len = self.read_u32()?;
        if len > MAX_URL_LEN {
            return Err(Error::Parse("url too long"));
        }
        let bytes = self.take(len as usize)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| Error::Parse("url is not valid utf-8"))
    }

    fn read_urls(&mut self) -> Result<Vec<String>> {
        let count = self.read_u32()?;
        if count > MAX_SEQUENCE_LEN {
            return Err(Error::Parse("url sequence too long"));
        }
        let mut urls = Vec::with_capacity(count as usize);
        for _ in 0..count {
            urls.push(self.read_url()?);
        }
        Ok(urls)
    }

    fn read_availabilities(&mut self) -> Result<Vec<Availability>> {
        let count = self.read_u32()?;
        if count > MAX_SEQUENCE_LEN {
            return Err(Error::Parse("availability sequence too long"));
        }
        let mut availabilities = Vec::with_capacity(count as usize);
        for _ in 0..count {
            availabilities.push(Availability::from_wire(self.read_u8()?));
        }
        Ok(availabilities)
    }
}

fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn put_u64(buf: &mut Vec<u8>, value: u64) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn put_count(buf: &mut Vec<u8>, len: usize) -> Result<()> {
    let count = u32::try_from(len).map_err(|_| Error::Encode("sequence too long"))?;
    if count > MAX_SEQUENCE_LEN {
        return Err(Error::Encode("sequence too long"));
    }
    put_u32(buf, count);
    Ok(())
}

fn put_urls(buf: &mut Vec<u8>, urls: &[String]) -> Result<()> {
    put_count(buf, urls.len())?;
    for url in urls {
        if url.is_empty() {
            return Err(Error::Encode("empty url"));
        }
        let len = u32::try_from(url.len()).map_err(|_| Error::Encode("url too long"))?;
        if len > MAX_URL_LEN {
            return Err(Error::Encode("url too long"));
        }
        put_u32(buf, len);
        buf.extend_from_slice(url.as_bytes());
    }
    Ok(())
}

fn put_availabilities(buf: &mut Vec<u8>, availabilities: &[Availability]) -> Result<()> {
    put_count(buf, availabilities.len())?;
    for availability in availabilities {
        buf.push(availability.to_wire());
    }
    Ok(())
}

/// Encode a request frame (tag included).
pub fn encode_url_availability_request(request: &UrlAvailabilityRequest) -> Result<Vec<u8>> {
    let mut buf = vec![Type::UrlAvailabilityRequest.tag()];
    put_u64(&mut buf, request.request_id);
    put_u64(&mut buf, request.watch_id);
    put_urls(&mut buf, &request.urls)?;
    Ok(buf)
}

/// Encode a response frame (tag included).
pub fn encode_url_availability_response(response: &UrlAvailabilityResponse) -> Result<Vec<u8>> {
    let mut buf = vec![Type::UrlAvailabilityResponse.tag()];
    put_u64(&mut buf, response.request_id);
    put_availabilities(&mut buf, &response.url_availabilities)?;
    Ok(buf)
}

/// Encode an event frame (tag included).
pub fn encode_url_availability_event(event: &UrlAvailabilityEvent) -> Result<Vec<u8>> {
    if event.urls.len() != event.url_availabilities.len() {
        return Err(Error::Encode("url/availability length mismatch"));
    }
    let mut buf = vec![Type::UrlAvailabilityEvent.tag()];
    put_u64(&mut buf, event.watch_id);
    put_urls(&mut buf, &event.urls)?;
    put_availabilities(&mut buf, &event.url_availabilities)?;
    Ok(buf)
}

/// Decode a request payload (tag already stripped).
pub fn decode_url_availability_request(buf: &[u8]) -> Result<(UrlAvailabilityRequest, usize)> {
    let mut reader = Reader::new(buf);
    let request_id = reader.read_u64()?;
    let watch_id = reader.read_u64()?;
    let urls = reader.read_urls()?;
    Ok((
        UrlAvailabilityRequest {
            request_id,
            watch_id,
            urls,
        },
        reader.pos,
    ))
}

/// Decode a response payload (tag already stripped).
pub fn decode_url_availability_response(buf: &[u8]) -> Result<(UrlAvailabilityResponse, usize)> {
    let mut reader = Reader::new(buf);
    let request_id = reader.read_u64()?;
    let url_availabilities = reader.read_availabilities()?;
    Ok((
        UrlAvailabilityResponse {
            request_id,
            url_availabilities,
        },
        reader.pos,
    ))
}

/// Decode an event payload (tag already stripped).
pub fn decode_url_availability_event(buf: &[u8]) -> Result<(UrlAvailabilityEvent, usize)> {
    let mut reader = Reader::new(buf);
    let watch_id = reader.read_u64()?;
    let urls = reader.read_urls()?;
    let url_availabilities = reader.read_availabilities()?;
    if urls.len() != url_availabilities.len() {
        return Err(Error::Parse("url/availability length mismatch"));
    }
    Ok((
        UrlAvailabilityEvent {
            watch_id,
            urls,
            url_availabilities,
        },
        reader.pos,
    ))
}
