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

//! Readiness multiplexing backends and the contract they share.

mod buffer;
pub mod epoll;
#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
pub mod kqueue;

use std::fmt::{self, Display, Formatter};
use std::iter::FusedIterator;
use std::slice;

pub use self::buffer::{ResultBuffer, DEFAULT_CAPACITY};
use crate::{Error, Token};

/// Native socket handle type of the host platform.
#[cfg(unix)]
pub type RawSource = std::os::unix::io::RawFd;
/// Native socket handle type of the host platform.
#[cfg(windows)]
pub type RawSource = std::os::windows::io::RawSocket;

/// Anything which can be registered with a poll group: types exposing a native socket handle.
///
/// The handle is never interpreted by the poll group, it is only passed to the native facility.
pub trait AsRawSource {
    fn as_raw_source(&self) -> RawSource;
}

#[cfg(unix)]
impl<T: std::os::unix::io::AsRawFd + ?Sized> AsRawSource for T {
    fn as_raw_source(&self) -> RawSource { self.as_raw_fd() }
}

#[cfg(windows)]
impl<T: std::os::windows::io::AsRawSocket + ?Sized> AsRawSource for T {
    fn as_raw_source(&self) -> RawSource { self.as_raw_socket() }
}

/// Information about I/O readiness reported for a socket.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Default)]
pub struct IoType {
    /// Specifies whether the socket has data to read.
    pub read: bool,
    /// Specifies whether the socket is ready for write operations.
    pub write: bool,
}

impl IoType {
    pub fn none() -> Self {
        Self {
            read: false,
            write: false,
        }
    }

    pub fn read_only() -> Self {
        Self {
            read: true,
            write: false,
        }
    }

    pub fn write_only() -> Self {
        Self {
            read: false,
            write: true,
        }
    }

    pub fn read_write() -> Self {
        Self {
            read: true,
            write: true,
        }
    }

    pub fn is_none(self) -> bool { !self.read && !self.write }
    pub fn is_read_write(self) -> bool { self.read && self.write }
}

impl Display for IoType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            f.write_str("none")
        } else if self.is_read_write() {
            f.write_str("read-write")
        } else if self.read {
            f.write_str("read")
        } else {
            f.write_str("write")
        }
    }
}

/// Failure condition reported by the native facility instead of readiness.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum IoFail {
    /// connection is absent (native flags {0:#b})
    Connectivity(u32),
    /// OS-level error (native code {0:#x})
    Os(u32),
}

/// Binary record written by a native facility into the result buffer, one per ready event.
///
/// Implementors must be exact, field-order-fixed mirrors of the native structure: the facility
/// writes into a buffer of them directly.
pub trait NativeRecord: Copy + Send + 'static {
    /// Name of the layout, used in diagnostics.
    const LAYOUT: &'static str;

    /// Record with all fields set to zero.
    fn zeroed() -> Self;

    /// Token stored in the data slot of the record.
    fn token(&self) -> Token;

    /// Readiness or failure condition carried by the record.
    fn io(&self) -> Result<IoType, IoFail>;
}

/// Readiness multiplexer contract shared by all backends.
///
/// All operations take `&mut self`: a poll group performs no internal locking, and a caller
/// sharing one between threads has to serialize access itself. Results of [`Multiplex::wait`] are
/// kept in a buffer which the next call overwrites; iterators returned by
/// [`Multiplex::drain_tokens`] and [`Multiplex::events`] borrow the group for that reason.
pub trait Multiplex: Send + Sized {
    /// Native event record filled by the backend.
    type Record: NativeRecord;

    /// Name of the backend, used in diagnostics.
    const NAME: &'static str;

    /// Opens a native facility instance with a result buffer of [`DEFAULT_CAPACITY`] records.
    ///
    /// # Errors
    ///
    /// [`Error::Initialization`] if the native facility can't be created and
    /// [`Error::LayoutMismatch`] if the record type does not match the host ABI.
    fn new() -> Result<Self, Error> { Self::with_capacity(DEFAULT_CAPACITY) }

    /// Opens a native facility instance with a result buffer of `capacity` records.
    fn with_capacity(capacity: usize) -> Result<Self, Error>;

    /// Registers socket for readiness notifications, tagging them with `token`.
    ///
    /// Adding a socket which is already registered fails on epoll backends, while kqueue treats it
    /// as a modification: the call succeeds and re-tags the socket with the new `token`.
    fn add(&mut self, socket: &impl AsRawSource, token: Token) -> Result<(), Error>;

    /// Deregisters socket. The `token` must be the one used in [`Multiplex::add`]; backends able to
    /// deregister by the socket handle alone ignore it.
    fn remove(&mut self, socket: &impl AsRawSource, token: Token) -> Result<(), Error>;

    /// Collects up to `max_results` ready events into the result buffer without blocking, growing
    /// the buffer first if required.
    ///
    /// # Returns
    ///
    /// Number of ready events, zero if none of the sockets is ready right now.
    fn wait(&mut self, max_results: usize) -> Result<usize, Error>;

    /// Records filled by the last call to [`Multiplex::wait`].
    fn ready(&self) -> &[Self::Record];

    /// Current length of the result buffer, in records.
    fn capacity(&self) -> usize;

    /// Closes the native facility instance.
    ///
    /// Dropping the group closes it as well, but without a way to report a failure.
    fn dispose(self) -> Result<(), Error>;

    /// Waits for ready events and iterates over their tokens in delivery order.
    fn drain_tokens(&mut self, max_results: usize) -> Result<Tokens<'_, Self::Record>, Error> {
        self.wait(max_results)?;
        Ok(Tokens(self.ready().iter()))
    }

    /// Waits for ready events and iterates over their tokens together with the readiness
    /// reported for the socket.
    fn events(&mut self, max_results: usize) -> Result<Events<'_, Self::Record>, Error> {
        self.wait(max_results)?;
        Ok(Events(self.ready().iter()))
    }

    /// Waits for at most `tokens.len()` ready events and writes their tokens into the slice.
    ///
    /// # Returns
    ///
    /// Number of tokens written; slots past it are left untouched.
    fn poll_into(&mut self, tokens: &mut [Token]) -> Result<usize, Error> {
        let count = self.wait(tokens.len())?;
        for (slot, record) in tokens.iter_mut().zip(self.ready()) {
            *slot = record.token();
        }
        Ok(count)
    }
}

/// Iterator over tokens of the ready events, see [`Multiplex::drain_tokens`].
pub struct Tokens<'a, R: NativeRecord>(slice::Iter<'a, R>);

impl<R: NativeRecord> Iterator for Tokens<'_, R> {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> { self.0.next().map(R::token) }

    fn size_hint(&self) -> (usize, Option<usize>) { self.0.size_hint() }
}

impl<R: NativeRecord> ExactSizeIterator for Tokens<'_, R> {}
impl<R: NativeRecord> FusedIterator for Tokens<'_, R> {}

/// Iterator over ready events, see [`Multiplex::events`].
pub struct Events<'a, R: NativeRecord>(slice::Iter<'a, R>);

impl<R: NativeRecord> Iterator for Events<'_, R> {
    type Item = (Token, Result<IoType, IoFail>);

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|record| (record.token(), record.io()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) { self.0.size_hint() }
}

impl<R: NativeRecord> ExactSizeIterator for Events<'_, R> {}
impl<R: NativeRecord> FusedIterator for Events<'_, R> {}
