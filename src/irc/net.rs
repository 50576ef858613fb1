// Copyright (C) 2021  Anthony DeDominic <adedomin@gmail.com>

// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.

// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN
// THE SOFTWARE.

//! The readiness loop: one thread, one poller, every socket.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Registry, Token};
use mio_signals::{Signal, SignalSet, Signals};

use crate::config::config_file::Config;
use crate::irc::server::ServerState;
use crate::irc::user::{ReadStat, WriteStat};

const LISTENER: Token = Token(0);
const SIGNAL_TOKEN: Token = Token(1);
// Connection tokens count up from here and are never reused.
const FIRST_CONN_TOKEN: usize = 2;

// Longest a tick may sleep in the wait; timers run at least this often.
const TICK_TIMEOUT: Duration = Duration::from_secs(25);

pub struct Reactor {
    poll: Poll,
    events: Events,
    listener: TcpListener,
    signals: Signals,
    state: ServerState,
    config_path: PathBuf,
    next_token: usize,
    shutdown: bool,
}

impl Reactor {
    pub fn bind(config_path: PathBuf, config: &Config) -> io::Result<Reactor> {
        let state = ServerState::new(&config.general);
        Reactor::with_state(config_path, &config.listen_string(), state)
    }

    pub fn with_state(
        config_path: PathBuf,
        listen: &str,
        state: ServerState,
    ) -> io::Result<Reactor> {
        let addr = resolve_listen_addr(listen)?;
        let mut listener = TcpListener::bind(addr)?;
        let poll = Poll::new()?;
        let mut signals = Signals::new(SignalSet::all())?;
        let events = Events::with_capacity(128);

        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;
        poll.registry()
            .register(&mut signals, SIGNAL_TOKEN, Interest::READABLE)?;
        log::info!("Listening on {}", listener.local_addr()?);

        Ok(Reactor {
            poll,
            events,
            listener,
            signals,
            state,
            config_path,
            next_token: FIRST_CONN_TOKEN,
            shutdown: false,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn run(&mut self) -> io::Result<()> {
        while self.tick(Some(TICK_TIMEOUT))? {}
        Ok(())
    }

    /// One pass of the loop: wait for readiness, service every flagged
    /// socket, then the housekeeping that runs whether or not anything was
    /// ready. Returns `false` once a shutdown request has been honored.
    pub fn tick(&mut self, timeout: Option<Duration>) -> io::Result<bool> {
        let Reactor {
            poll,
            events,
            listener,
            signals,
            state,
            config_path,
            next_token,
            shutdown,
        } = self;

        poll.poll(events, timeout)?;

        for event in events.iter() {
            match event.token() {
                LISTENER => accept_pending(poll.registry(), listener, state, next_token),
                SIGNAL_TOKEN => loop {
                    match signals.receive()? {
                        Some(Signal::Interrupt) | Some(Signal::Terminate) | Some(Signal::Quit) => {
                            *shutdown = true;
                        }
                        Some(Signal::User1) | Some(Signal::User2) => {
                            reload_config(state, config_path);
                        }
                        None => break,
                    }
                },
                tok => {
                    if event.is_error() {
                        state.quit(tok, "Error: Connection reset by peer");
                        continue;
                    }
                    if event.is_readable() || event.is_read_closed() {
                        handle_readable(state, tok);
                    }
                    if event.is_writable() {
                        handle_writable(state, tok);
                    }
                }
            }
        }

        state.enforce_sendq();
        state.collect_empty_channels();
        state.timer_pass();
        sync_write_interest(poll.registry(), state)?;

        if *shutdown {
            state.shutdown();
            return Ok(false);
        }
        Ok(true)
    }

    #[cfg(test)]
    pub(crate) fn state_mut(&mut self) -> &mut ServerState {
        &mut self.state
    }

    #[cfg(test)]
    pub(crate) fn request_shutdown(&mut self) {
        self.shutdown = true;
    }
}

fn resolve_listen_addr(listen: &str) -> io::Result<SocketAddr> {
    listen
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "listen address resolved to nothing"))
}

/// Drain the accept queue. A failed accept is logged and abandoned rather
/// than taking the whole loop down with it.
fn accept_pending(
    registry: &Registry,
    listener: &mut TcpListener,
    state: &mut ServerState,
    next_token: &mut usize,
) {
    loop {
        match listener.accept() {
            Ok((mut conn, addr)) => {
                let tok = Token(*next_token);
                *next_token += 1;
                if let Err(e) = registry.register(&mut conn, tok, Interest::READABLE) {
                    log::warn!("could not register {}: {}", addr, e);
                    continue;
                }
                state.accept_user(conn, addr, tok);
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
            Err(e) => {
                log::warn!("accept failed: {}", e);
                return;
            }
        }
    }
}

fn handle_readable(state: &mut ServerState, tok: Token) {
    loop {
        let stat = match state.users.get_mut(&tok) {
            Some(user) => user.receive_data(),
            None => return,
        };
        match stat {
            Ok(ReadStat::Data) => {
                let flooded = state
                    .users
                    .get(&tok)
                    .map(|u| u.recv_overflow())
                    .unwrap_or(false);
                if flooded {
                    state.quit(tok, "Excess Flood");
                    return;
                }
                state.drain_input(tok);
            }
            Ok(ReadStat::Blocked) => return,
            Ok(ReadStat::Eof) => {
                state.quit(tok, "Remote host closed the connection");
                return;
            }
            Err(_) => {
                state.quit(tok, "Read error: Connection reset by peer");
                return;
            }
        }
    }
}

fn handle_writable(state: &mut ServerState, tok: Token) {
    loop {
        let stat = match state.users.get_mut(&tok) {
            Some(user) => user.write_data(),
            None => return,
        };
        match stat {
            Ok(WriteStat::Okay) => (),
            Ok(WriteStat::Blocked) | Ok(WriteStat::Eof) => return,
            Err(_) => {
                state.quit(tok, "Write error: Connection reset by peer");
                return;
            }
        }
    }
}

/// Re-register each connection for writing only while it has queued
/// output, mirroring how the wait set is rebuilt every pass.
fn sync_write_interest(registry: &Registry, state: &mut ServerState) -> io::Result<()> {
    for (&tok, user) in state.users.iter_mut() {
        let wants = user.has_output();
        if wants != user.write_interest {
            let interest = if wants {
                Interest::READABLE | Interest::WRITABLE
            } else {
                Interest::READABLE
            };
            registry.reregister(&mut user.conn, tok, interest)?;
            user.write_interest = wants;
        }
    }
    Ok(())
}

fn reload_config(state: &mut ServerState, config_path: &Path) {
    match Config::from_path(config_path) {
        Ok(config) => {
            state.reload(&config.general);
            log::info!("Reloaded config from {}", config_path.display());
        }
        Err(e) => log::warn!("Could not reload config: {}", e),
    }
}
