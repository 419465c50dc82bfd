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

use std::fmt::{self, Display, Formatter};

/// Opaque pointer-sized identity of the connection which owns a registered socket.
///
/// A multiplexer stores the token in the data slot of a native event record and hands it back
/// unchanged once the socket becomes ready. The token is never dereferenced by this crate: if it
/// was made from a pointer with [`Token::from_ptr`], the pointee must stay alive and must not move
/// until the socket is removed and the last drained event for it was dispatched. A token value must
/// not be reused for another connection while it is still registered.
#[derive(Wrapper, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Default)]
#[wrapper(LowerHex, UpperHex)]
pub struct Token(usize);

impl From<usize> for Token {
    fn from(raw: usize) -> Self { Token(raw) }
}

impl Token {
    /// Constructs token from a raw pointer-sized value.
    pub const fn new(raw: usize) -> Self { Token(raw) }

    /// Constructs token from the address of a caller-owned object. The pointer is not
    /// dereferenced, neither here nor later.
    pub fn from_ptr<T>(ptr: *const T) -> Self { Token(ptr as usize) }

    /// Returns the address the token was constructed from.
    pub fn as_ptr<T>(self) -> *const T { self.0 as *const T }

    /// Returns the address the token was constructed from as a mutable pointer.
    pub fn as_mut_ptr<T>(self) -> *mut T { self.0 as *mut T }

    /// Returns the raw pointer-sized value.
    pub const fn into_raw(self) -> usize { self.0 }

    /// Widens the token into the 8-byte data slot of a native event record.
    pub const fn into_word(self) -> u64 { self.0 as u64 }

    /// Recovers the token from the 8-byte data slot of a native event record.
    ///
    /// On 32-bit targets only the low half of the word is meaningful, since it was produced by
    /// [`Token::into_word`].
    pub const fn from_word(word: u64) -> Self { Token(word as usize) }
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result { write!(f, "{:#x}", self.0) }
}
