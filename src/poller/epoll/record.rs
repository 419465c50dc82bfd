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

//! Layout-exact mirrors of `struct epoll_event`.
//!
//! The kernel declares the structure packed on x86 and x86-64 only, so the 8-byte data slot
//! directly follows the 4-byte event mask there (12 bytes in total). Everywhere else, as well as
//! in the `wepoll` library on Windows, the data slot is aligned to 8 bytes, leaving 4 bytes of
//! padding after the mask (16 bytes in total).

use std::fmt::{self, Debug, Formatter};

use crate::poller::{IoFail, IoType, NativeRecord};
use crate::Token;

pub const EPOLLIN: u32 = 0x001;
pub const EPOLLPRI: u32 = 0x002;
pub const EPOLLOUT: u32 = 0x004;
pub const EPOLLERR: u32 = 0x008;
pub const EPOLLHUP: u32 = 0x010;
pub const EPOLLRDHUP: u32 = 0x2000;

/// Record of the epoll family: an event mask plus an 8-byte data slot holding a [`Token`].
pub trait EpollRecord: NativeRecord {
    /// Size of the record on the architecture it is designed for.
    const SIZE: usize;

    /// Constructs record with interest mask `events` tagged with `token`.
    fn new(events: u32, token: Token) -> Self;
}

/// Decodes epoll event mask into readiness.
pub fn decode(events: u32) -> Result<IoType, IoFail> {
    if events & (EPOLLHUP | EPOLLRDHUP) != 0 {
        Err(IoFail::Connectivity(events))
    } else if events & EPOLLERR != 0 {
        Err(IoFail::Os(events))
    } else {
        Ok(IoType {
            read: events & (EPOLLIN | EPOLLPRI) != 0,
            write: events & EPOLLOUT != 0,
        })
    }
}

/// `struct epoll_event` as declared with `__attribute__((packed))`.
#[repr(C, packed)]
#[derive(Copy, Clone, Default)]
pub struct PackedEpollEvent {
    events: u32,
    data: u64,
}

impl EpollRecord for PackedEpollEvent {
    const SIZE: usize = 12;

    fn new(events: u32, token: Token) -> Self {
        PackedEpollEvent {
            events,
            data: token.into_word(),
        }
    }
}

impl NativeRecord for PackedEpollEvent {
    const LAYOUT: &'static str = "packed epoll_event";

    fn zeroed() -> Self { Self::default() }

    fn token(&self) -> Token { Token::from_word(self.data) }

    fn io(&self) -> Result<IoType, IoFail> { decode(self.events) }
}

impl Debug for PackedEpollEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        // Fields are copied out: references into a packed struct may be unaligned
        let (events, data) = (self.events, self.data);
        f.debug_struct("PackedEpollEvent")
            .field("events", &format_args!("{events:#x}"))
            .field("data", &format_args!("{data:#x}"))
            .finish()
    }
}

/// `struct epoll_event` with natural alignment of the data slot.
///
/// The padding is spelled out so the record is 16 bytes long on every target, including the
/// 32-bit ones where `u64` is 8-byte aligned inside structures.
#[repr(C)]
#[derive(Copy, Clone, Default)]
pub struct WideEpollEvent {
    events: u32,
    _padding: u32,
    data: u64,
}

impl EpollRecord for WideEpollEvent {
    const SIZE: usize = 16;

    fn new(events: u32, token: Token) -> Self {
        WideEpollEvent {
            events,
            _padding: 0,
            data: token.into_word(),
        }
    }
}

impl NativeRecord for WideEpollEvent {
    const LAYOUT: &'static str = "wide epoll_event";

    fn zeroed() -> Self { Self::default() }

    fn token(&self) -> Token { Token::from_word(self.data) }

    fn io(&self) -> Result<IoType, IoFail> { decode(self.events) }
}

impl Debug for WideEpollEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("WideEpollEvent")
            .field("events", &format_args!("{:#x}", self.events))
            .field("data", &format_args!("{:#x}", self.data))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::mem;

    use super::*;

    #[test]
    fn record_sizes() {
        assert_eq!(mem::size_of::<PackedEpollEvent>(), PackedEpollEvent::SIZE);
        assert_eq!(mem::size_of::<WideEpollEvent>(), WideEpollEvent::SIZE);
        assert_eq!(mem::align_of::<PackedEpollEvent>(), 1);
    }

    #[test]
    fn data_slot_offsets() {
        let packed = [PackedEpollEvent::new(EPOLLIN, Token::new(0x1001))];
        let bytes: &[u8; 12] = unsafe { &*(packed.as_ptr() as *const [u8; 12]) };
        assert_eq!(&bytes[..4], &EPOLLIN.to_ne_bytes());
        assert_eq!(&bytes[4..], &0x1001u64.to_ne_bytes());

        let wide = [WideEpollEvent::new(EPOLLIN | EPOLLERR, Token::new(0x1002))];
        let bytes: &[u8; 16] = unsafe { &*(wide.as_ptr() as *const [u8; 16]) };
        assert_eq!(&bytes[..4], &(EPOLLIN | EPOLLERR).to_ne_bytes());
        assert_eq!(&bytes[4..8], &[0u8; 4]);
        assert_eq!(&bytes[8..], &0x1002u64.to_ne_bytes());
    }

    #[test]
    fn adjacent_records_keep_tokens() {
        let mut records = [PackedEpollEvent::zeroed(); 3];
        for (no, record) in records.iter_mut().enumerate() {
            *record = PackedEpollEvent::new(EPOLLIN, Token::new(0x1000 + no));
        }
        let tokens = records.iter().map(NativeRecord::token).collect::<Vec<_>>();
        assert_eq!(tokens, vec![Token::new(0x1000), Token::new(0x1001), Token::new(0x1002)]);
    }

    #[test]
    fn decoding() {
        assert_eq!(decode(EPOLLIN), Ok(IoType::read_only()));
        assert_eq!(decode(EPOLLOUT), Ok(IoType::write_only()));
        assert_eq!(decode(EPOLLIN | EPOLLOUT), Ok(IoType::read_write()));
        assert_eq!(decode(EPOLLIN | EPOLLHUP), Err(IoFail::Connectivity(EPOLLIN | EPOLLHUP)));
        assert_eq!(decode(EPOLLERR), Err(IoFail::Os(EPOLLERR)));
        assert_eq!(decode(0), Ok(IoType::none()));
    }
}
