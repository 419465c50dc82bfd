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
use std::marker::PhantomData;
use std::mem::size_of;
use std::os::unix::io::RawFd;

use libc::c_int;

use super::{Arch, EpollRecord};

#[cfg(any(target_arch = "x86_64", target_arch = "x86"))]
const EPOLL_EVENT_SIZE: usize = 12;
#[cfg(not(any(target_arch = "x86_64", target_arch = "x86")))]
const EPOLL_EVENT_SIZE: usize = 16;

/// Kernel `epoll(7)` entry points from the C library, reading and writing records of layout `R`.
pub struct Linux<R: EpollRecord>(PhantomData<R>);

impl<R: EpollRecord> Arch for Linux<R> {
    type Handle = RawFd;
    type Record = R;

    const NAME: &'static str = "epoll";
    const EXPECTED_RECORD_SIZE: usize = EPOLL_EVENT_SIZE;
    const NATIVE_RECORD_SIZE: usize = size_of::<libc::epoll_event>();

    fn create() -> io::Result<RawFd> {
        let fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(fd)
    }

    fn close(handle: RawFd) -> io::Result<()> {
        if unsafe { libc::close(handle) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn ctl(handle: RawFd, op: c_int, socket: RawFd, record: &mut R) -> io::Result<()> {
        // SAFETY: `R` has the size of `libc::epoll_event`, which was verified when the group was
        // constructed, and the kernel only reads the record during the call.
        let res = unsafe {
            libc::epoll_ctl(handle, op, socket, (record as *mut R).cast::<libc::epoll_event>())
        };
        if res < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn wait(handle: RawFd, records: &mut [R], timeout: c_int) -> io::Result<usize> {
        // SAFETY: see `ctl`; the kernel writes at most `records.len()` records.
        let count = unsafe {
            libc::epoll_wait(
                handle,
                records.as_mut_ptr().cast::<libc::epoll_event>(),
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
