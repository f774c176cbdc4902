// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Opaque byte payloads shared between client and server.
//!
//! A [`Payload`] is one contiguous buffer split into an optional *header*
//! prefix (writable, reserved for in-place framing) and a *data* suffix
//! (the wire content). The two regions are always adjacent: `header_end ==
//! data_begin`.

use std::sync::{Arc, OnceLock};

use socom_log::fatal_panic;

/// A contiguous byte buffer exposing a writable header span and a data span.
///
/// Cloning a `Payload` is cheap: the backing buffer is reference-counted and
/// shared, with only the header/data boundaries copied.
#[derive(Debug, Clone)]
pub struct Payload {
    buffer: Arc<Vec<u8>>,
    lead: usize,
    header_len: usize,
    data_len: usize,
}

impl Payload {
    /// Builds a payload from an owned buffer.
    ///
    /// `lead_offset` bytes at the front of `buffer` are skipped entirely (not
    /// part of either span); the next `header_size` bytes become the header;
    /// the following `data_len` bytes become the data. `header_end ==
    /// data_begin` by construction.
    ///
    /// Aborts the process if `lead_offset + header_size + data_len` exceeds
    /// `buffer.len()` — this is a programmer error, not a recoverable one
    /// (mirrors the original `make_vector_payload` contract).
    pub fn from_vec(buffer: Vec<u8>, lead_offset: usize, header_size: usize, data_len: usize) -> Self {
        let required = lead_offset.saturating_add(header_size).saturating_add(data_len);
        if required > buffer.len() {
            fatal_panic!(
                "Payload::from_vec called with header/data span ({} bytes) exceeding backing buffer ({} bytes)",
                required,
                buffer.len()
            );
        }
        Self {
            buffer: Arc::new(buffer),
            lead: lead_offset,
            header_len: header_size,
            data_len,
        }
    }

    /// The process-wide, zero-length payload singleton.
    pub fn empty() -> Self {
        static EMPTY: OnceLock<Payload> = OnceLock::new();
        EMPTY
            .get_or_init(|| Payload::from_vec(Vec::new(), 0, 0, 0))
            .clone()
    }

    /// The header span: writable in-place framing region.
    pub fn header(&self) -> &[u8] {
        &self.buffer[self.lead..self.lead + self.header_len]
    }

    /// Mutably borrows the header span.
    ///
    /// Returns `None` if the buffer is currently shared with another
    /// `Payload` clone, since mutation would not be observable through the
    /// other handle — callers that need in-place framing should hold the
    /// only clone while doing so.
    pub fn header_mut(&mut self) -> Option<&mut [u8]> {
        let lead = self.lead;
        let header_len = self.header_len;
        Arc::get_mut(&mut self.buffer).map(|buffer| &mut buffer[lead..lead + header_len])
    }

    /// The data span: the primary content for wire transmission.
    pub fn data(&self) -> &[u8] {
        let start = self.lead + self.header_len;
        &self.buffer[start..start + self.data_len]
    }
}

impl PartialEq for Payload {
    fn eq(&self, other: &Self) -> bool {
        self.header() == other.header() && self.data() == other.data()
    }
}

impl Eq for Payload {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_and_data_are_adjacent_and_correctly_sliced() {
        let payload = Payload::from_vec(vec![0xFF, 1, 2, 3, 4, 5], 1, 2, 3);
        assert_eq!(payload.header(), &[1, 2]);
        assert_eq!(payload.data(), &[3, 4, 5]);
    }

    #[test]
    fn empty_is_zero_length_and_shared() {
        let a = Payload::empty();
        let b = Payload::empty();
        assert_eq!(a.header(), &[] as &[u8]);
        assert_eq!(a.data(), &[] as &[u8]);
        assert_eq!(a, b);
    }

    #[test]
    fn equality_compares_both_regions() {
        let a = Payload::from_vec(vec![1, 2, 3, 4], 0, 2, 2);
        let b = Payload::from_vec(vec![1, 2, 9, 9], 0, 2, 2);
        let c = Payload::from_vec(vec![9, 9, 3, 4], 0, 2, 2);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, Payload::from_vec(vec![1, 2, 3, 4], 0, 2, 2));
    }

    #[test]
    fn header_mut_is_none_while_shared() {
        let mut payload = Payload::from_vec(vec![1, 2, 3], 0, 1, 2);
        let _clone = payload.clone();
        assert!(payload.header_mut().is_none());
    }

    #[test]
    fn header_mut_writes_through_when_sole_owner() {
        let mut payload = Payload::from_vec(vec![0, 1, 2], 0, 1, 2);
        payload.header_mut().unwrap()[0] = 0xAB;
        assert_eq!(payload.header(), &[0xAB]);
    }
}

// `from_vec`'s oversized-span abort (`fatal_panic!` -> `std::process::abort()`) is not
// exercised here: an abort tears down the whole test binary, not just the failing test.
