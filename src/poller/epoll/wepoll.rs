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

use std::ffi::c_void;
use std::fmt::{self, Debug, Formatter};
use std::io;
use std::marker::PhantomData;
use std::mem::size_of;
use std::os::windows::io::RawSocket;

use libc::c_int;
use wepoll_ffi as we;

use super::{Arch, EpollRecord};

/// Layout of `struct epoll_event` in `wepoll.h`, which is not packed on any Windows target.
const EPOLL_EVENT_SIZE: usize = 16;

/// Handle of a `wepoll` port.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct PortHandle(*mut c_void);

// SAFETY: the handle is an opaque kernel object reference usable from any thread.
unsafe impl Send for PortHandle {}

impl Debug for PortHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result { write!(f, "{:p}", self.0) }
}

/// Entry points of the `wepoll` library, which emulates `epoll(7)` on top of Windows AFD
/// polling, reading and writing records of layout `R`.
pub struct Wepoll<R: EpollRecord>(PhantomData<R>);

impl<R: EpollRecord> Arch for Wepoll<R> {
    type Handle = PortHandle;
    type Record = R;

    const NAME: &'static str = "wepoll";
    const EXPECTED_RECORD_SIZE: usize = EPOLL_EVENT_SIZE;
    const NATIVE_RECORD_SIZE: usize = size_of::<we::epoll_event>();

    fn create() -> io::Result<PortHandle> {
        let handle = unsafe { we::epoll_create1(0) };
        if handle.is_null() {
            return Err(io::Error::last_os_error());
        }
        Ok(PortHandle(handle as *mut c_void))
    }

    fn close(handle: PortHandle) -> io::Result<()> {
        if unsafe { we::epoll_close(handle.0 as _) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn ctl(handle: PortHandle, op: c_int, socket: RawSocket, record: &mut R) -> io::Result<()> {
        // SAFETY: `R` has the size of `we::epoll_event`, which was verified when the group was
        // constructed, and the library only reads the record during the call.
        let res = unsafe {
            we::epoll_ctl(
                handle.0 as _,
                op as _,
                socket as _,
                (record as *mut R).cast::<we::epoll_event>(),
            )
        };
        if res < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn wait(handle: PortHandle, records: &mut [R], timeout: c_int) -> io::Result<usize> {
        // SAFETY: see `ctl`; the library writes at most `records.len()` records.
        let count = unsafe {
            we::epoll_wait(
                handle.0 as _,
                records.as_mut_ptr().cast::<we::epoll_event>(),
                records.len() as c_int,
                timeout,
            )
        };
        if count < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(count as usize)
    }
}
