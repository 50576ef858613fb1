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

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::net::{IpAddr, SocketAddr};
use std::time::{SystemTime, UNIX_EPOCH};

use mio::net::TcpStream;
use mio::Token;

use crate::config::config_file::General;
use crate::irc::channel::Channel;
use crate::irc::rpl;
use crate::irc::user::User;

pub const SERVER_VERSION: &str = concat!(env!("CARGO_PKG_NAME"), "-", env!("CARGO_PKG_VERSION"));

// A connection idle longer than this is pinged directly each tick.
pub const PING_AFTER: u64 = 125;
// And past this it is torn down.
pub const TIMEOUT_AFTER: u64 = 250;
// Concurrent connections allowed per source address.
pub const MAX_CONNS_PER_IP: usize = 3;

/// Wall clock in whole seconds, injectable for the timer tests.
pub type Clock = Box<dyn Fn() -> u64>;
/// Reverse host lookup; `None` falls back to the IP's string form.
pub type HostResolver = Box<dyn Fn(IpAddr) -> Option<String>>;

pub fn lower(s: &str) -> String {
    s.to_ascii_lowercase()
}

/// Authoritative state of the network: every connection, every channel,
/// and the identity the server presents to clients.
pub struct ServerState {
    pub users: HashMap<Token, User>,
    // Keyed by lowercased name; `Channel::name` keeps the creator's casing.
    pub channels: HashMap<String, Channel>,
    hostcache: HashMap<IpAddr, String>,

    pub hostname: String,
    pub name: String,
    pub creation: String,
    pub motd: String,

    clock: Clock,
    resolver: HostResolver,
}

impl ServerState {
    pub fn new(config: &General) -> Self {
        let clock: Clock = Box::new(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0)
        });
        Self::with_hooks(config, clock, Box::new(|_| None))
    }

    pub fn with_hooks(config: &General, clock: Clock, resolver: HostResolver) -> Self {
        ServerState {
            users: HashMap::new(),
            channels: HashMap::new(),
            hostcache: HashMap::new(),
            hostname: config.hostname.clone(),
            name: config.name.clone(),
            creation: config.creation.clone(),
            motd: config.motd.clone(),
            clock,
            resolver,
        }
    }

    /// Apply the live-reloadable subset of the config.
    pub fn reload(&mut self, config: &General) {
        self.name = config.name.clone();
        self.motd = config.motd.clone();
    }

    pub fn now(&self) -> u64 {
        (self.clock)()
    }

    fn resolve_host(&mut self, ip: IpAddr) -> String {
        if let Some(cached) = self.hostcache.get(&ip) {
            return cached.clone();
        }
        let hostname = (self.resolver)(ip).unwrap_or_else(|| ip.to_string());
        self.hostcache.insert(ip, hostname.clone());
        hostname
    }

    // Lookups

    pub fn find_user_by_nick(&self, nick: &str) -> Option<Token> {
        let nick = lower(nick);
        self.users
            .iter()
            .find(|(_, user)| lower(&user.nickname) == nick)
            .map(|(&tok, _)| tok)
    }

    pub fn find_channel(&self, name: &str) -> Option<&Channel> {
        self.channels.get(&lower(name))
    }

    pub fn is_registered(&self, tok: Token) -> bool {
        self.users
            .get(&tok)
            .map(|u| u.is_registered())
            .unwrap_or(false)
    }

    // Send utilities

    /// Queue a raw frame on one connection.
    pub fn send_line(&mut self, tok: Token, line: &str) {
        if let Some(user) = self.users.get_mut(&tok) {
            user.send_raw(line);
        }
    }

    /// Queue a server-originated numeric, addressed to the target's
    /// current nickname (`*` while unset).
    pub fn send_numeric(&mut self, tok: Token, numeric: u16, data: &str) {
        if let Some(user) = self.users.get_mut(&tok) {
            let line = format!(":{} {:03} {} {}", self.hostname, numeric, user.nickname, data);
            user.send_raw(&line);
        }
    }

    /// Queue `data` on every target, attributed to `from`'s fullname.
    pub fn broadcast_from(&mut self, from: Token, targets: &[Token], data: &str) {
        let prefix = match self.users.get(&from) {
            Some(user) => user.fullname(),
            None => return,
        };
        let line = format!(":{} {}", prefix, data);
        for tok in targets {
            if let Some(user) = self.users.get_mut(tok) {
                user.send_raw(&line);
            }
        }
    }

    /// Every connection sharing at least one channel with `tok`, once each,
    /// excluding `tok` itself.
    pub fn channel_peers(&self, tok: Token) -> Vec<Token> {
        let mut seen = HashSet::new();
        let mut peers = Vec::new();
        if let Some(user) = self.users.get(&tok) {
            for key in &user.channels {
                if let Some(chan) = self.channels.get(key) {
                    for &member in &chan.users {
                        if member != tok && seen.insert(member) {
                            peers.push(member);
                        }
                    }
                }
            }
        }
        peers
    }

    // Lifecycle

    /// Take ownership of a freshly accepted socket. The connection counts
    /// against the per-IP limit immediately; over the line it is torn back
    /// down before the peer sees anything but the ERROR frame.
    pub fn accept_user(&mut self, conn: TcpStream, addr: SocketAddr, tok: Token) {
        let hostname = self.resolve_host(addr.ip());
        let now = self.now();
        let user = User::new(conn, addr.ip(), addr.port(), hostname, now);
        log::info!("[{}] {}:{} connected", tok.0, user.ip, user.port);
        self.users.insert(tok, user);

        let ip = addr.ip();
        let connections = self.users.values().filter(|u| u.ip == ip).count();
        if connections > MAX_CONNS_PER_IP {
            self.quit(tok, &format!("Too many connections from {}", ip));
        }
    }

    /// Tear a connection down: best-effort ERROR frame, QUIT fan-out to
    /// everyone sharing a channel, then removal from every channel and the
    /// connection set. Calling this again for the same token is a no-op.
    pub fn quit(&mut self, tok: Token, reason: &str) {
        let mut user = match self.users.remove(&tok) {
            Some(user) => user,
            None => return,
        };
        log::info!("[{}] disconnected: {}", tok.0, reason);

        let fullname = user.fullname();
        let error = format!("ERROR :Closing link: ({}) [{}]\r\n", fullname, reason);
        let _ = user.conn.write(error.as_bytes());
        // The socket itself closes when `user` drops at the end of this call.

        let mut seen = HashSet::new();
        let mut observers = Vec::new();
        for key in &user.channels {
            if let Some(chan) = self.channels.get(key) {
                for &member in &chan.users {
                    if member != tok && seen.insert(member) {
                        observers.push(member);
                    }
                }
            }
        }
        let line = format!(":{} QUIT :{}", fullname, reason);
        for member in observers {
            if let Some(peer) = self.users.get_mut(&member) {
                peer.send_raw(&line);
            }
        }

        for key in &user.channels {
            if let Some(chan) = self.channels.get_mut(key) {
                chan.remove_member(tok);
            }
        }
    }

    /// Pull complete lines off a connection's recv backlog and dispatch
    /// them. Each line bumps the liveness stamp before it runs.
    pub fn drain_input(&mut self, tok: Token) {
        let now = self.now();
        loop {
            let line = match self.users.get_mut(&tok) {
                Some(user) => match user.take_line() {
                    Some(line) => {
                        user.last_activity = now;
                        line
                    }
                    None => return,
                },
                None => return,
            };
            if line.is_empty() {
                continue;
            }
            self.dispatch(tok, &line);
        }
    }

    // Per-tick housekeeping

    pub fn collect_empty_channels(&mut self) {
        self.channels.retain(|_, chan| !chan.users.is_empty());
    }

    pub fn enforce_sendq(&mut self) {
        let over: Vec<Token> = self
            .users
            .iter()
            .filter(|(_, user)| user.sendq_exceeded())
            .map(|(&tok, _)| tok)
            .collect();
        for tok in over {
            self.quit(tok, "SendQ exceeded");
        }
    }

    /// Liveness timers: time out the silent, ping the quiet. The PING is
    /// written straight to the socket so a stalled send queue cannot mask
    /// a live peer.
    pub fn timer_pass(&mut self) {
        let now = self.now();

        let timed_out: Vec<(Token, u64)> = self
            .users
            .iter()
            .map(|(&tok, user)| (tok, now.saturating_sub(user.last_activity)))
            .filter(|&(_, idle)| idle > TIMEOUT_AFTER)
            .collect();
        for (tok, idle) in timed_out {
            self.quit(tok, &format!("Ping timeout: {} seconds", idle));
        }

        let stale: Vec<Token> = self
            .users
            .iter()
            .filter(|(_, user)| now.saturating_sub(user.last_activity) > PING_AFTER)
            .map(|(&tok, _)| tok)
            .collect();
        let ping = format!("PING :{}\r\n", self.hostname);
        let mut broken = Vec::new();
        for tok in stale {
            if let Some(user) = self.users.get_mut(&tok) {
                if user.conn.write(ping.as_bytes()).is_err() {
                    broken.push(tok);
                }
            }
        }
        for tok in broken {
            self.quit(tok, "Write error: Connection reset by peer");
        }
    }

    // Welcome / MOTD

    /// Numerics 001 through 005 followed by the MOTD, sent once a
    /// connection completes registration.
    pub fn welcome(&mut self, tok: Token) {
        let fullname = match self.users.get(&tok) {
            Some(user) => user.fullname(),
            None => return,
        };
        self.send_numeric(
            tok,
            rpl::WELCOME,
            &format!(":Welcome to {}, {}", self.name, fullname),
        );
        self.send_numeric(
            tok,
            rpl::YOURHOST,
            &format!(
                ":Your host is {}, running version {}",
                self.hostname, SERVER_VERSION
            ),
        );
        self.send_numeric(
            tok,
            rpl::CREATED,
            &format!(":This server was created {}", self.creation),
        );
        self.send_numeric(
            tok,
            rpl::MYINFO,
            &format!("{} {}  bov", self.hostname, SERVER_VERSION),
        );
        self.send_numeric(
            tok,
            rpl::ISUPPORT,
            &format!(
                "CHANTYPES=# PREFIX=(ov)@+ CHANMODES=b,,,mnt NICKLEN=16 CHANNELLEN=50 \
                 TOPICLEN=300 AWAYLEN=160 NETWORK={} :Are supported by this server",
                self.name
            ),
        );
        self.send_motd(tok);
    }

    pub fn send_motd(&mut self, tok: Token) {
        self.send_numeric(
            tok,
            rpl::MOTDSTART,
            &format!(":{} message of the day", self.hostname),
        );
        let motd = self.motd.clone();
        for line in motd.split('\n') {
            self.send_numeric(tok, rpl::MOTD, &format!(":- {}", line));
        }
        self.send_numeric(
            tok,
            rpl::ENDOFMOTD,
            ":End of message of the day.",
        );
    }

    /// Shut the whole network down; every peer sees the same reason.
    pub fn shutdown(&mut self) {
        let all: Vec<Token> = self.users.keys().copied().collect();
        for tok in all {
            self.quit(tok, "Server shutdown");
        }
    }
}
