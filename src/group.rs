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

//! Platform selection of the poll group backend.

#[cfg(any(target_os = "linux", target_os = "android", windows))]
use crate::poller::epoll;
use crate::poller::{AsRawSource, Multiplex, DEFAULT_CAPACITY};
use crate::{Error, Token};

/// Backend used by [`PollGroup`] on the host platform.
#[cfg(all(
    any(target_os = "linux", target_os = "android"),
    any(target_arch = "x86_64", target_arch = "x86")
))]
pub type Backend = epoll::EpollGroup<epoll::Linux<epoll::PackedEpollEvent>>;

/// Backend used by [`PollGroup`] on the host platform.
#[cfg(all(
    any(target_os = "linux", target_os = "android"),
    not(any(target_arch = "x86_64", target_arch = "x86"))
))]
pub type Backend = epoll::EpollGroup<epoll::Linux<epoll::WideEpollEvent>>;

/// Backend used by [`PollGroup`] on the host platform.
#[cfg(windows)]
pub type Backend = epoll::EpollGroup<epoll::Wepoll<epoll::WideEpollEvent>>;

/// Backend used by [`PollGroup`] on the host platform.
#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
pub type Backend = crate::poller::kqueue::KqueueGroup;

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    windows,
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
)))]
compile_error!("poll groups are supported on Linux, Android, Windows, macOS, iOS and the BSDs only");

/// Readiness multiplexer using the native facility of the host platform.
///
/// Which backend is used is decided at compile time, see [`Backend`]; all calls are statically
/// dispatched to it.
pub struct PollGroup(Backend);

impl PollGroup {
    /// Creates poll group with a result buffer of [`DEFAULT_CAPACITY`] records.
    ///
    /// # Errors
    ///
    /// Errors of the backend constructor are returned unchanged.
    pub fn create() -> Result<Self, Error> { Self::with_capacity(DEFAULT_CAPACITY) }
}

impl Multiplex for PollGroup {
    type Record = <Backend as Multiplex>::Record;

    const NAME: &'static str = <Backend as Multiplex>::NAME;

    fn with_capacity(capacity: usize) -> Result<Self, Error> {
        #[cfg(feature = "log")]
        log::debug!(target: "poll-group", "Creating {} poll group", Self::NAME);

        Backend::with_capacity(capacity).map(PollGroup)
    }

    fn add(&mut self, socket: &impl AsRawSource, token: Token) -> Result<(), Error> {
        self.0.add(socket, token)
    }

    fn remove(&mut self, socket: &impl AsRawSource, token: Token) -> Result<(), Error> {
        self.0.remove(socket, token)
    }

    fn wait(&mut self, max_results: usize) -> Result<usize, Error> { self.0.wait(max_results) }

    fn ready(&self) -> &[Self::Record] { self.0.ready() }

    fn capacity(&self) -> usize { self.0.capacity() }

    fn dispose(self) -> Result<(), Error> { self.0.dispose() }
}
