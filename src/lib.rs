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

#![deny(
    non_upper_case_globals,
    non_camel_case_types,
    non_snake_case,
    unused_mut,
    unused_imports,
    dead_code,
    //missing_docs
)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Poll group ([`PollGroup`]) is a readiness multiplexer: it registers many sockets with the
//! native readiness facility of the host platform and reports, in one non-blocking call, which of
//! them became readable, writable or failed, without scanning them one by one.
//!
//! Three backends are provided:
//! - [`poller::epoll::EpollGroup`] over `epoll(7)` on Linux and Android, using the record layout
//!   of the host CPU architecture;
//! - the same backend over the `wepoll` library on Windows;
//! - [`poller::kqueue::KqueueGroup`] over `kqueue(2)` on macOS, iOS and the BSDs.
//!
//! The backend is chosen at compile time. Each registered socket is tagged with a [`Token`],
//! which is carried through kernel memory and handed back unchanged with every ready event:
//!
//! ```no_run
//! use std::net::TcpListener;
//!
//! use pollgroup::{Multiplex, PollGroup, Token};
//!
//! let listener = TcpListener::bind("127.0.0.1:0")?;
//! listener.set_nonblocking(true)?;
//!
//! let mut group = PollGroup::create()?;
//! group.add(&listener, Token::new(1))?;
//! loop {
//!     for token in group.drain_tokens(64)? {
//!         assert_eq!(token, Token::new(1));
//!         let _ = listener.accept();
//!     }
//!     // ... do other work of the event loop ...
//! #   break;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! A poll group performs no internal locking. The usual deployment is one group per worker
//! thread, each owning a disjoint set of sockets.

#[macro_use]
extern crate amplify;

mod error;
mod group;
pub mod poller;
#[cfg(test)]
mod testing;
mod token;

pub use error::{Error, Op};
pub use group::{Backend, PollGroup};
pub use poller::{
    AsRawSource, Events, IoFail, IoType, Multiplex, NativeRecord, RawSource, Tokens,
    DEFAULT_CAPACITY,
};
pub use token::Token;
