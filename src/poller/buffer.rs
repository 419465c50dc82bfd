// Cross-platform readiness multiplexing core over epoll, wepoll and kqueue.
//
// SPDX-License-Identifier: Apache-2.0
//
// Written in 2021-2025 by
//     Dr. Maxim Orlovsky <orlovsky@ubideco.org>
//     Alexis Sellier <alexis@cloudhead.io>
//
// Copyright 2022-2025 UBIDECO Labs, InDCS, Lugano, Switzerland. All Rights reserved.
// Copyright 2021-2023 Alexis Sellier <alexis@cloudhead.io>. All Rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use this file except
// in compliance with the License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software distributed under the License
// is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express
// or implied. See the License for the specific language governing permissions and limitations under
// the License.

use std::io;

use crate::poller::NativeRecord;

/// Number of records a result buffer holds unless configured otherwise.
pub const DEFAULT_CAPACITY: usize = 2048;

/// Reusable buffer of native event records which the native facility writes ready events into.
///
/// The buffer is allocated once and reused by every wait; it is reallocated only when a caller
/// asks for more simultaneous results than it can hold. It never shrinks.
#[derive(Clone, Debug)]
pub struct ResultBuffer<R: NativeRecord> {
    records: Vec<R>,
    filled: usize,
}

impl<R: NativeRecord> Default for ResultBuffer<R> {
    fn default() -> Self {
        ResultBuffer {
            records: empty!(),
            filled: 0,
        }
    }
}

impl<R: NativeRecord> ResultBuffer<R> {
    /// Allocates buffer holding `capacity` zeroed records.
    pub fn with_capacity(capacity: usize) -> Self {
        ResultBuffer {
            records: vec![R::zeroed(); capacity],
            filled: 0,
        }
    }

    /// Length of the buffer, in records.
    pub fn capacity(&self) -> usize { self.records.len() }

    /// Grows the buffer to fit `requested` records.
    ///
    /// The new length is `max(requested, len + len / 4)`, so each reallocation grows the buffer by
    /// at least a quarter. Previous content is discarded.
    ///
    /// # Returns
    ///
    /// Whether the buffer was reallocated.
    pub fn reserve(&mut self, requested: usize) -> bool {
        let len = self.records.len();
        if requested <= len {
            return false;
        }
        let new_len = requested.max(len + (len >> 2));

        #[cfg(feature = "log")]
        log::debug!(target: "poll-group", "Growing result buffer from {len} to {new_len} records");

        self.records = vec![R::zeroed(); new_len];
        self.filled = 0;
        true
    }

    /// Prepares first `max_results` records for the native facility to write into.
    pub fn slots(&mut self, max_results: usize) -> &mut [R] {
        self.reserve(max_results);
        self.filled = 0;
        &mut self.records[..max_results]
    }

    /// Marks first `count` records as written by the native facility.
    ///
    /// # Errors
    ///
    /// With [`io::ErrorKind::InvalidData`] if `count` exceeds buffer length, i.e. the native
    /// facility has reported more records than the space it was given. Nothing is marked then.
    pub fn fill(&mut self, count: usize) -> io::Result<()> {
        if count > self.records.len() {
            self.filled = 0;
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "native facility reported more events than requested",
            ));
        }
        self.filled = count;
        Ok(())
    }

    /// Records written by the last wait.
    pub fn ready(&self) -> &[R] { &self.records[..self.filled] }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poller::{IoFail, IoType};
    use crate::Token;

    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    struct Slot(u64);

    impl NativeRecord for Slot {
        const LAYOUT: &'static str = "test slot";

        fn zeroed() -> Self { Slot(0) }
        fn token(&self) -> Token { Token::from_word(self.0) }
        fn io(&self) -> Result<IoType, IoFail> { Ok(IoType::read_only()) }
    }

    #[test]
    fn grows_by_a_quarter() {
        let mut buf = ResultBuffer::<Slot>::with_capacity(100);
        assert!(!buf.reserve(100));
        assert_eq!(buf.capacity(), 100);
        assert!(buf.reserve(101));
        assert_eq!(buf.capacity(), 125);
    }

    #[test]
    fn grows_to_request() {
        let mut buf = ResultBuffer::<Slot>::with_capacity(4);
        assert!(buf.reserve(5));
        assert_eq!(buf.capacity(), 5);
        assert!(buf.reserve(1000));
        assert_eq!(buf.capacity(), 1000);
    }

    #[test]
    fn never_shrinks() {
        let mut buf = ResultBuffer::<Slot>::with_capacity(DEFAULT_CAPACITY);
        assert!(!buf.reserve(1));
        assert_eq!(buf.slots(10).len(), 10);
        assert_eq!(buf.capacity(), DEFAULT_CAPACITY);

        let mut buf = ResultBuffer::<Slot>::default();
        assert_eq!(buf.capacity(), 0);
        assert_eq!(buf.slots(3).len(), 3);
        assert_eq!(buf.capacity(), 3);
    }

    #[test]
    fn fill_exposes_written_records() {
        let mut buf = ResultBuffer::<Slot>::with_capacity(8);
        let slots = buf.slots(4);
        slots[0] = Slot(0x1001);
        slots[1] = Slot(0x1002);
        buf.fill(2).unwrap();
        assert_eq!(buf.ready(), &[Slot(0x1001), Slot(0x1002)]);

        buf.slots(4);
        assert!(buf.ready().is_empty());
    }

    #[test]
    fn fill_beyond_capacity() {
        let mut buf = ResultBuffer::<Slot>::with_capacity(2);
        buf.fill(1).unwrap();
        let err = buf.fill(3).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(buf.ready().is_empty());
        assert_eq!(buf.capacity(), 2);
    }
}
