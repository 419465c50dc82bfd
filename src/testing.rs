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

//! Helpers shared by unit tests which exercise native facilities with loopback sockets.

use std::io::{ErrorKind, Read};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use crate::poller::Multiplex;
use crate::Token;

const PATIENCE: Duration = Duration::from_secs(2);
const STEP: Duration = Duration::from_millis(5);

/// Returns connected `(client, server)` pair of loopback sockets; server side is non-blocking.
pub fn connected_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    let (server, _) = listener.accept().unwrap();
    server.set_nonblocking(true).unwrap();
    (client, server)
}

fn collect_readable<M: Multiplex>(group: &mut M) -> Vec<Token> {
    group
        .events(64)
        .unwrap()
        .filter_map(|(token, io)| match io {
            Ok(io) if io.read => Some(token),
            _ => None,
        })
        .collect()
}

/// Polls the group until some socket becomes readable or patience runs out, returning tokens of
/// the readable sockets reported by the first non-empty wait.
pub fn readable_tokens<M: Multiplex>(group: &mut M) -> Vec<Token> {
    let deadline = Instant::now() + PATIENCE;
    loop {
        let tokens = collect_readable(group);
        if !tokens.is_empty() || Instant::now() >= deadline {
            return tokens;
        }
        thread::sleep(STEP);
    }
}

/// Polls the group for the given time, returning tokens of all readable sockets seen.
pub fn readable_within<M: Multiplex>(group: &mut M, time: Duration) -> Vec<Token> {
    let deadline = Instant::now() + time;
    let mut seen = vec![];
    while Instant::now() < deadline {
        seen.extend(collect_readable(group));
        thread::sleep(STEP);
    }
    seen
}

/// Reads everything available from a non-blocking socket.
pub fn drain(stream: &mut TcpStream) -> usize {
    let mut buf = [0u8; 1024];
    let mut total = 0;
    loop {
        match stream.read(&mut buf) {
            Ok(0) => return total,
            Ok(len) => total += len,
            Err(err) if err.kind() == ErrorKind::WouldBlock => return total,
            Err(err) => panic!("unable to drain socket: {err}"),
        }
    }
}
