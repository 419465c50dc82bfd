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

//! Event-queue backend: `kqueue(2)` on macOS, iOS and the BSDs.
//!
//! Every socket is registered as a pair of filters, one for read and one for write readiness.
//! Both are added with `EV_CLEAR`, which is how the facility is normally used: a filter fires once
//! per change of state (new data arrived, buffer space freed up) and not while the condition
//! persists.

#![allow(unused_variables)] // because we need them for feature-gated logger

use std::fmt::{self, Debug, Formatter};
use std::mem::{self, size_of, ManuallyDrop};
use std::os::unix::io::RawFd;
use std::{io, ptr};

use libc::c_int;

use crate::poller::{AsRawSource, IoFail, IoType, Multiplex, NativeRecord, ResultBuffer};
use crate::{Error, Op, Token};

const ZERO_TIMEOUT: libc::timespec = libc::timespec {
    tv_sec: 0,
    tv_nsec: 0,
};

#[cfg(all(
    target_pointer_width = "64",
    any(target_os = "macos", target_os = "ios", target_os = "openbsd", target_os = "dragonfly")
))]
const KEVENT_SIZE: Option<usize> = Some(32);
#[cfg(all(target_pointer_width = "64", target_os = "netbsd"))]
const KEVENT_SIZE: Option<usize> = Some(40);
// FreeBSD 12 extended the structure; libc declares whichever ABI it was built for.
#[cfg(not(all(
    target_pointer_width = "64",
    any(
        target_os = "macos",
        target_os = "ios",
        target_os = "openbsd",
        target_os = "dragonfly",
        target_os = "netbsd"
    )
)))]
const KEVENT_SIZE: Option<usize> = None;

/// `struct kevent` as declared by the C library.
#[repr(transparent)]
#[derive(Copy, Clone)]
pub struct KeventRecord(libc::kevent);

// SAFETY: `udata` carries a `Token`, which is never dereferenced.
unsafe impl Send for KeventRecord {}

impl KeventRecord {
    fn change(socket: RawFd, flags: u32, token: Token) -> [KeventRecord; 2] {
        let mut read = Self::zeroed().0;
        read.ident = socket as _;
        read.filter = libc::EVFILT_READ;
        read.flags = (flags | libc::EV_RECEIPT as u32) as _;
        read.udata = token.into_raw() as _;

        let mut write = read;
        write.filter = libc::EVFILT_WRITE;

        [KeventRecord(read), KeventRecord(write)]
    }

    /// Whether the record was produced by the read filter.
    pub fn is_read(&self) -> bool { self.0.filter == libc::EVFILT_READ }

    /// Whether the record was produced by the write filter.
    pub fn is_write(&self) -> bool { self.0.filter == libc::EVFILT_WRITE }

    fn flags(&self) -> u32 { self.0.flags as u32 }

    /// Error reported for an echoed change, if any.
    fn receipt_error(&self) -> Option<io::Error> {
        if self.flags() & libc::EV_ERROR as u32 != 0 && self.0.data != 0 {
            Some(io::Error::from_raw_os_error(self.0.data as i32))
        } else {
            None
        }
    }

    /// Deletions undoing the changes which the kernel accepted, as told by their receipts.
    ///
    /// An accepted change is echoed with `EV_ERROR` and zero `data`; records which were not
    /// echoed at all carry no `EV_ERROR` and are skipped.
    fn rollback(receipts: &[KeventRecord]) -> Vec<KeventRecord> {
        receipts
            .iter()
            .filter(|receipt| receipt.flags() & libc::EV_ERROR as u32 != 0 && receipt.0.data == 0)
            .map(|receipt| {
                let mut change = *receipt;
                change.0.flags = (libc::EV_DELETE as u32 | libc::EV_RECEIPT as u32) as _;
                change.0.data = 0;
                change
            })
            .collect()
    }
}

impl NativeRecord for KeventRecord {
    const LAYOUT: &'static str = "kevent";

    fn zeroed() -> Self {
        // SAFETY: `struct kevent` is plain data; all-zero is a valid value of every field.
        KeventRecord(unsafe { mem::zeroed() })
    }

    fn token(&self) -> Token { Token::new(self.0.udata as usize) }

    fn io(&self) -> Result<IoType, IoFail> {
        let flags = self.flags();
        if flags & libc::EV_ERROR as u32 != 0 {
            Err(IoFail::Os(self.0.data as u32))
        } else if flags & libc::EV_EOF as u32 != 0 {
            Err(IoFail::Connectivity(flags))
        } else {
            Ok(IoType {
                read: self.is_read(),
                write: self.is_write(),
            })
        }
    }
}

impl Debug for KeventRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeventRecord")
            .field("ident", &self.0.ident)
            .field("filter", &self.0.filter)
            .field("flags", &format_args!("{:#x}", self.flags()))
            .field("data", &self.0.data)
            .field("udata", &self.token())
            .finish()
    }
}

/// Poll group backed by a kernel event queue.
pub struct KqueueGroup {
    kq: RawFd,
    buffer: ResultBuffer<KeventRecord>,
}

impl KqueueGroup {
    fn check_layout() -> Result<(), Error> {
        let actual = size_of::<KeventRecord>();
        match KEVENT_SIZE {
            Some(expected) if expected != actual => {
                #[cfg(feature = "log")]
                log::error!(target: "kqueue", "Record kevent is {actual} bytes instead of {expected}");
                Err(Error::LayoutMismatch(KeventRecord::LAYOUT, expected, actual))
            }
            _ => Ok(()),
        }
    }

    /// Submits changes and checks each echoed receipt.
    ///
    /// The facility reports a failed filter registration either through the return code of the
    /// call or only through `EV_ERROR` in the echoed record, so both are checked. `EV_RECEIPT` makes
    /// the kernel echo every change instead of returning pending events, which would otherwise be
    /// consumed here and lost for the next wait.
    fn submit(&mut self, op: Op, socket: RawFd, changes: &mut [KeventRecord]) -> Result<(), Error> {
        let list = changes.as_mut_ptr().cast::<libc::kevent>();
        let len = changes.len();
        // SAFETY: `list` points to `len` initialized records which the kernel reads as the change
        // list and overwrites with receipts.
        let res = unsafe { libc::kevent(self.kq, list, len as _, list, len as _, &ZERO_TIMEOUT) };
        let res = if res < 0 {
            Err(io::Error::last_os_error())
        } else {
            changes[..res as usize]
                .iter()
                .find_map(KeventRecord::receipt_error)
                .map_or(Ok(()), Err)
        };
        res.map_err(|err| {
            #[cfg(feature = "log")]
            log::warn!(target: "kqueue", "Unable to {op} socket {socket}: {err}");
            Error::Registration(op, socket, err)
        })
    }
}

impl Multiplex for KqueueGroup {
    type Record = KeventRecord;

    const NAME: &'static str = "kqueue";

    fn with_capacity(capacity: usize) -> Result<Self, Error> {
        Self::check_layout()?;

        let kq = unsafe { libc::kqueue() };
        if kq < 0 {
            return Err(Error::Initialization(io::Error::last_os_error()));
        }
        if unsafe { libc::fcntl(kq, libc::F_SETFD, libc::FD_CLOEXEC) } < 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(kq) };
            return Err(Error::Initialization(err));
        }

        #[cfg(feature = "log")]
        log::debug!(target: "kqueue", "Opened event queue {kq}");

        Ok(KqueueGroup {
            kq,
            buffer: ResultBuffer::with_capacity(capacity),
        })
    }

    fn add(&mut self, socket: &impl AsRawSource, token: Token) -> Result<(), Error> {
        let socket = socket.as_raw_source();

        #[cfg(feature = "log")]
        log::trace!(target: "kqueue", "Adding socket {socket} with token {token}");

        let mut changes =
            KeventRecord::change(socket, libc::EV_ADD as u32 | libc::EV_CLEAR as u32, token);
        if let Err(err) = self.submit(Op::Add, socket, &mut changes) {
            // A socket must not stay half-registered
            let mut undo = KeventRecord::rollback(&changes);
            if !undo.is_empty() {
                #[cfg(feature = "log")]
                log::debug!(target: "kqueue", "Rolling back {} filter(s) of socket {socket}", undo.len());
                self.submit(Op::Remove, socket, &mut undo).ok();
            }
            return Err(err);
        }
        Ok(())
    }

    fn remove(&mut self, socket: &impl AsRawSource, token: Token) -> Result<(), Error> {
        let socket = socket.as_raw_source();

        #[cfg(feature = "log")]
        log::trace!(target: "kqueue", "Removing socket {socket} with token {token}");

        // Both filters and the token are the ones given on add
        let mut changes = KeventRecord::change(socket, libc::EV_DELETE as u32, token);
        self.submit(Op::Remove, socket, &mut changes)
    }

    fn wait(&mut self, max_results: usize) -> Result<usize, Error> {
        let max_results = max_results.min(c_int::MAX as usize);
        let kq = self.kq;
        let slots = self.buffer.slots(max_results);
        if slots.is_empty() {
            return Ok(0);
        }

        // SAFETY: the kernel writes at most `slots.len()` records into `slots`.
        let count = unsafe {
            libc::kevent(
                kq,
                ptr::null(),
                0,
                slots.as_mut_ptr().cast::<libc::kevent>(),
                slots.len() as _,
                &ZERO_TIMEOUT,
            )
        };
        if count < 0 {
            let err = io::Error::last_os_error();
            #[cfg(feature = "log")]
            log::error!(target: "kqueue", "Error waiting on event queue {kq}: {err}");
            return Err(Error::Wait(err));
        }
        let count = count as usize;
        self.buffer.fill(count).map_err(Error::Wait)?;

        #[cfg(feature = "log")]
        log::trace!(target: "kqueue", "Wait on event queue {kq} resulted in {count} event(s)");

        Ok(count)
    }

    fn ready(&self) -> &[KeventRecord] { self.buffer.ready() }

    fn capacity(&self) -> usize { self.buffer.capacity() }

    fn dispose(self) -> Result<(), Error> {
        let mut this = ManuallyDrop::new(self);
        drop(mem::take(&mut this.buffer));

        #[cfg(feature = "log")]
        log::debug!(target: "kqueue", "Closing event queue {}", this.kq);

        if unsafe { libc::close(this.kq) } < 0 {
            return Err(Error::Close(io::Error::last_os_error()));
        }
        Ok(())
    }
}

impl Drop for KqueueGroup {
    fn drop(&mut self) {
        if unsafe { libc::close(self.kq) } < 0 {
            #[cfg(feature = "log")]
            log::error!(target: "kqueue",
                "Unable to close event queue {}: {}", self.kq, io::Error::last_os_error()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{connected_pair, readable_tokens};

    #[test]
    fn layout() {
        KqueueGroup::check_layout().unwrap();
        assert_eq!(size_of::<KeventRecord>(), size_of::<libc::kevent>());
    }

    #[test]
    fn change_list_carries_token() {
        let changes = KeventRecord::change(7, libc::EV_ADD as u32, Token::new(0x1001));
        assert!(changes[0].is_read());
        assert!(changes[1].is_write());
        for change in changes {
            assert_eq!(change.0.ident, 7);
            assert_eq!(change.token(), Token::new(0x1001));
            assert_ne!(change.flags() & libc::EV_RECEIPT as u32, 0);
        }
    }

    #[test]
    fn rollback_deletes_accepted_filters_only() {
        let mut receipts = KeventRecord::change(7, libc::EV_ADD as u32, Token::new(0x1001));
        receipts[0].0.flags = (libc::EV_ERROR as u32 | libc::EV_RECEIPT as u32) as _;
        receipts[1].0.flags = (libc::EV_ERROR as u32 | libc::EV_RECEIPT as u32) as _;
        receipts[1].0.data = libc::EINVAL as _;

        let undo = KeventRecord::rollback(&receipts);
        assert_eq!(undo.len(), 1);
        assert!(undo[0].is_read());
        assert_eq!(undo[0].0.ident, 7);
        assert_eq!(undo[0].token(), Token::new(0x1001));
        assert_ne!(undo[0].flags() & libc::EV_DELETE as u32, 0);
        assert_eq!(undo[0].flags() & libc::EV_ERROR as u32, 0);
        assert_eq!(undo[0].0.data, 0);
    }

    #[test]
    fn rollback_skips_records_never_echoed() {
        let changes = KeventRecord::change(7, libc::EV_ADD as u32, Token::new(0x1001));
        assert!(KeventRecord::rollback(&changes).is_empty());
    }

    #[test]
    fn write_filter_reports_connected_socket() {
        let mut group = KqueueGroup::new().unwrap();
        let (_client, server) = connected_pair();
        group.add(&server, Token::new(0x2001)).unwrap();

        let mut writable = false;
        for _ in 0..100 {
            writable = group
                .events(8)
                .unwrap()
                .any(|(token, io)| token == Token::new(0x2001) && io == Ok(IoType::write_only()));
            if writable {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert!(writable);
    }

    #[test]
    fn re_adding_updates_registration() {
        let mut group = KqueueGroup::new().unwrap();
        let (mut client, server) = connected_pair();
        group.add(&server, Token::new(0x3001)).unwrap();
        // The facility treats EV_ADD of an existing filter as a modification
        group.add(&server, Token::new(0x3002)).unwrap();

        std::io::Write::write_all(&mut client, b"ping").unwrap();
        assert_eq!(readable_tokens(&mut group), vec![Token::new(0x3002)]);
    }

    #[test]
    fn removing_unknown_socket_reports_enoent() {
        let mut group = KqueueGroup::new().unwrap();
        let (_client, server) = connected_pair();
        match group.remove(&server, Token::new(1)) {
            Err(err @ Error::Registration(Op::Remove, _, _)) => {
                assert_eq!(err.os_code(), Some(libc::ENOENT))
            }
            other => panic!("unexpected result {other:?}"),
        }
    }
}
