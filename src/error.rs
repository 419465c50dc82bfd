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

use crate::poller::RawSource;

/// Registration operation which has failed.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Display)]
pub enum Op {
    #[display("add")]
    Add,

    #[display("remove")]
    Remove,
}

/// Poll group errors.
///
/// Every error is reported from the call which caused it; nothing is retried internally. Errors
/// coming from a native call keep the OS error code, see [`Error::os_code`].
#[derive(Debug, Display, Error)]
#[display(doc_comments)]
pub enum Error {
    /// unable to initialize poll group: {0}
    Initialization(io::Error),

    /// unable to {0} socket {1}: {2}
    Registration(Op, RawSource, io::Error),

    /// native event record {0} is {2} bytes long while the platform ABI expects {1} bytes; this
    /// is a build or porting defect.
    LayoutMismatch(&'static str, usize, usize),

    /// waiting for ready events has failed: {0}
    Wait(io::Error),

    /// unable to close poll group: {0}
    Close(io::Error),
}

impl Error {
    /// Returns native OS error code, if the error was produced by a native call.
    pub fn os_code(&self) -> Option<i32> {
        match self {
            Error::Initialization(err)
            | Error::Registration(_, _, err)
            | Error::Wait(err)
            | Error::Close(err) => err.raw_os_error(),
            Error::LayoutMismatch(..) => None,
        }
    }

    /// Detects whether the error is fatal for the poll group. Registration errors affect only a
    /// single socket and the group may continue serving the rest of them.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Initialization(_) | Error::LayoutMismatch(..))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_code_is_preserved() {
        let err = Error::Registration(Op::Add, 5, io::Error::from_raw_os_error(17));
        assert_eq!(err.os_code(), Some(17));
        assert!(!err.is_fatal());

        let err = Error::LayoutMismatch("packed epoll_event", 12, 16);
        assert_eq!(err.os_code(), None);
        assert!(err.is_fatal());
    }

    #[test]
    fn display() {
        let err = Error::Registration(Op::Remove, 9, io::Error::from_raw_os_error(2));
        assert!(err.to_string().starts_with("unable to remove socket 9: "));
        let err = Error::LayoutMismatch("wide epoll_event", 16, 12);
        assert!(err.to_string().starts_with("native event record wide epoll_event is 12 bytes"));
    }
}
