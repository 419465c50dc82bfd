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

//! Edge-notification backend: `epoll(7)` on Linux and its `wepoll` emulation on Windows.
//!
//! The backend is level-triggered: `EPOLLET` is never set, so a socket which remains readable is
//! reported by every wait until the caller drains it.

#![allow(unused_variables)] // because we need them for feature-gated logger

#[cfg(any(target_os = "linux", target_os = "android"))]
mod linux;
pub mod record;
#[cfg(windows)]
mod wepoll;

use std::fmt::Debug;
use std::io;
use std::marker::PhantomData;
use std::mem::{self, size_of, ManuallyDrop};

use libc::c_int;

#[cfg(any(target_os = "linux", target_os = "android"))]
pub use self::linux::Linux;
pub use self::record::{EpollRecord, PackedEpollEvent, WideEpollEvent};
#[cfg(windows)]
pub use self::wepoll::{PortHandle, Wepoll};
use crate::poller::{AsRawSource, Multiplex, NativeRecord, RawSource, ResultBuffer};
use crate::{Error, Op, Token};

pub const EPOLL_CTL_ADD: c_int = 1;
pub const EPOLL_CTL_DEL: c_int = 2;

/// Binding to the native entry points of an epoll facility together with the record layout they
/// use on the host architecture.
pub trait Arch: 'static {
    /// Native handle of a facility instance.
    type Handle: Copy + Send + Debug;

    /// Record layout the native entry points read and write.
    type Record: EpollRecord;

    /// Name of the binding, used in diagnostics.
    const NAME: &'static str;

    /// Size of `struct epoll_event` documented for the host architecture.
    const EXPECTED_RECORD_SIZE: usize;

    /// Size of `struct epoll_event` as declared by the library providing the entry points.
    const NATIVE_RECORD_SIZE: usize;

    fn create() -> io::Result<Self::Handle>;

    fn close(handle: Self::Handle) -> io::Result<()>;

    fn ctl(
        handle: Self::Handle,
        op: c_int,
        socket: RawSource,
        record: &mut Self::Record,
    ) -> io::Result<()>;

    /// Writes up to `records.len()` ready events into `records` and returns their count.
    fn wait(handle: Self::Handle, records: &mut [Self::Record], timeout: c_int)
        -> io::Result<usize>;

    /// Verifies that [`Arch::Record`] is exactly as long as the native structure.
    ///
    /// Native entry points must not be called with a buffer of records unless this check has
    /// passed: a record of a wrong size shifts every following record in a multi-event result.
    fn check_layout() -> Result<(), Error> {
        let actual = size_of::<Self::Record>();
        for expected in [Self::EXPECTED_RECORD_SIZE, Self::NATIVE_RECORD_SIZE] {
            if actual != expected {
                #[cfg(feature = "log")]
                log::error!(target: "epoll",
                    "Record {} is {actual} bytes while {} expects {expected}",
                    <Self::Record as NativeRecord>::LAYOUT, Self::NAME
                );
                return Err(Error::LayoutMismatch(
                    <Self::Record as NativeRecord>::LAYOUT,
                    expected,
                    actual,
                ));
            }
        }
        Ok(())
    }
}

/// Poll group backed by an epoll facility instance.
pub struct EpollGroup<A: Arch> {
    handle: A::Handle,
    buffer: ResultBuffer<A::Record>,
    _arch: PhantomData<fn() -> A>,
}

impl<A: Arch> EpollGroup<A> {
    fn ctl(&mut self, op: Op, socket: RawSource, token: Token) -> Result<(), Error> {
        let code = match op {
            Op::Add => EPOLL_CTL_ADD,
            Op::Remove => EPOLL_CTL_DEL,
        };
        // The record is passed on delete as well, so that every call has the same shape
        let mut record = A::Record::new(record::EPOLLIN | record::EPOLLERR, token);

        #[cfg(feature = "log")]
        log::trace!(target: "epoll", "Going to {op} socket {socket} with token {token}");

        A::ctl(self.handle, code, socket, &mut record).map_err(|err| {
            #[cfg(feature = "log")]
            log::warn!(target: "epoll", "Unable to {op} socket {socket}: {err}");
            Error::Registration(op, socket, err)
        })
    }
}

impl<A: Arch> Multiplex for EpollGroup<A> {
    type Record = A::Record;

    const NAME: &'static str = A::NAME;

    fn with_capacity(capacity: usize) -> Result<Self, Error> {
        A::check_layout()?;
        let handle = A::create().map_err(Error::Initialization)?;

        #[cfg(feature = "log")]
        log::debug!(target: "epoll",
            "Opened {} instance {handle:?} using {} records",
            A::NAME, <A::Record as NativeRecord>::LAYOUT
        );

        Ok(EpollGroup {
            handle,
            buffer: ResultBuffer::with_capacity(capacity),
            _arch: PhantomData,
        })
    }

    fn add(&mut self, socket: &impl AsRawSource, token: Token) -> Result<(), Error> {
        self.ctl(Op::Add, socket.as_raw_source(), token)
    }

    fn remove(&mut self, socket: &impl AsRawSource, token: Token) -> Result<(), Error> {
        self.ctl(Op::Remove, socket.as_raw_source(), token)
    }

    fn wait(&mut self, max_results: usize) -> Result<usize, Error> {
        let max_results = max_results.min(c_int::MAX as usize);
        let handle = self.handle;
        let slots = self.buffer.slots(max_results);
        if slots.is_empty() {
            return Ok(0);
        }

        // Zero timeout: the group is a non-blocking poll point of the caller's loop
        let count = A::wait(handle, slots, 0).map_err(|err| {
            #[cfg(feature = "log")]
            log::error!(target: "epoll", "Error waiting on {handle:?}: {err}");
            Error::Wait(err)
        })?;
        self.buffer.fill(count).map_err(Error::Wait)?;

        #[cfg(feature = "log")]
        log::trace!(target: "epoll", "Wait on {handle:?} resulted in {count} event(s)");

        Ok(count)
    }

    fn ready(&self) -> &[Self::Record] { self.buffer.ready() }

    fn capacity(&self) -> usize { self.buffer.capacity() }

    fn dispose(self) -> Result<(), Error> {
        let mut this = ManuallyDrop::new(self);
        drop(mem::take(&mut this.buffer));

        #[cfg(feature = "log")]
        log::debug!(target: "epoll", "Closing {} instance {:?}", A::NAME, this.handle);

        A::close(this.handle).map_err(Error::Close)
    }
}

impl<A: Arch> Drop for EpollGroup<A> {
    fn drop(&mut self) {
        if let Err(err) = A::close(self.handle) {
            #[cfg(feature = "log")]
            log::error!(target: "epoll", "Unable to close {} instance {:?}: {err}", A::NAME, self.handle);
        }
    }
}
