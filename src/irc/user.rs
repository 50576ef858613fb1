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

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::IpAddr;

use mio::net::TcpStream;

use crate::irc::codec;

// Unparsed recv backlog past this is an excess flood.
pub const RECV_BACKLOG_MAX: usize = 1024;
// A send queue past this means the peer stopped draining; cut it loose.
pub const SENDQ_MAX: usize = 65536;
const READ_CHUNK: usize = 4096;

#[derive(Debug, PartialEq)]
pub enum ReadStat {
    Data,
    Blocked,
    Eof,
}

#[derive(Debug, PartialEq)]
pub enum WriteStat {
    Blocked,
    Okay,
    Eof,
}

/// One client connection: its socket, identity, and buffered I/O.
pub struct User {
    pub conn: TcpStream,
    pub ip: IpAddr,
    pub port: u16,
    pub hostname: String,

    recv_buf: Vec<u8>,
    send_buf: VecDeque<u8>,
    // Last interest we registered with the poller; resynced every tick.
    pub write_interest: bool,

    pub nickname: String,
    pub username: String,
    pub realname: String,

    pub last_activity: u64,
    pub signon: u64,

    pub away: Option<String>,
    // Lowercased names of joined channels, in join order.
    pub channels: Vec<String>,
}

impl User {
    pub fn new(conn: TcpStream, ip: IpAddr, port: u16, hostname: String, now: u64) -> Self {
        User {
            conn,
            ip,
            port,
            hostname,
            recv_buf: Vec::new(),
            send_buf: VecDeque::new(),
            write_interest: false,
            nickname: "*".to_string(),
            username: "unknown".to_string(),
            realname: "Unknown".to_string(),
            last_activity: now,
            signon: now,
            away: None,
            channels: Vec::new(),
        }
    }

    pub fn fullname(&self) -> String {
        format!("{}!{}@{}", self.nickname, self.username, self.hostname)
    }

    pub fn is_registered(&self) -> bool {
        self.nickname != "*" && self.username != "unknown"
    }

    /// Queue one outbound frame; the CRLF terminator is appended here.
    pub fn send_raw(&mut self, line: &str) {
        self.send_buf.extend(line.as_bytes());
        self.send_buf.extend(b"\r\n");
    }

    pub fn take_line(&mut self) -> Option<String> {
        codec::take_line(&mut self.recv_buf)
    }

    pub fn recv_overflow(&self) -> bool {
        self.recv_buf.len() > RECV_BACKLOG_MAX
    }

    pub fn sendq_exceeded(&self) -> bool {
        self.send_buf.len() > SENDQ_MAX
    }

    pub fn has_output(&self) -> bool {
        !self.send_buf.is_empty()
    }

    /// Pull one chunk off the socket into the recv backlog.
    pub fn receive_data(&mut self) -> io::Result<ReadStat> {
        let mut chunk = [0u8; READ_CHUNK];
        match self.conn.read(&mut chunk) {
            Ok(0) => Ok(ReadStat::Eof),
            Ok(size) => {
                self.recv_buf.extend_from_slice(&chunk[..size]);
                Ok(ReadStat::Data)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(ReadStat::Blocked),
            Err(e) => Err(e),
        }
    }

    /// Push the front of the send queue onto the socket.
    /// `Eof` means the queue is fully drained.
    pub fn write_data(&mut self) -> io::Result<WriteStat> {
        if self.send_buf.is_empty() {
            return Ok(WriteStat::Eof);
        }

        let (front, _) = self.send_buf.as_slices();
        match self.conn.write(front) {
            Ok(size) => {
                self.send_buf.drain(..size);
                Ok(WriteStat::Okay)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(WriteStat::Blocked),
            Err(e) => Err(e),
        }
    }

    #[cfg(test)]
    pub(crate) fn take_output(&mut self) -> String {
        let bytes: Vec<u8> = self.send_buf.drain(..).collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    #[cfg(test)]
    pub(crate) fn push_input(&mut self, data: &[u8]) {
        self.recv_buf.extend_from_slice(data);
    }
}

#[cfg(test)]
mod test {
    use std::io::Read;
    use std::net::{TcpListener, TcpStream as StdTcpStream};

    use mio::net::TcpStream;

    use super::{ReadStat, User, WriteStat};

    fn pair() -> (User, StdTcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let peer = StdTcpStream::connect(addr).unwrap();
        let (accepted, remote) = listener.accept().unwrap();
        accepted.set_nonblocking(true).unwrap();
        let conn = TcpStream::from_std(accepted);
        let user = User::new(conn, remote.ip(), remote.port(), remote.ip().to_string(), 100);
        (user, peer)
    }

    #[test]
    fn send_raw_frames_with_crlf() {
        let (mut user, mut peer) = pair();
        user.send_raw(":irc.test 001 alice :Welcome");
        assert!(user.has_output());
        loop {
            match user.write_data().unwrap() {
                WriteStat::Okay => (),
                WriteStat::Eof => break,
                WriteStat::Blocked => panic!("local socket blocked on a tiny write"),
            }
        }
        let mut b = [0u8; 64];
        let len = peer.read(&mut b).unwrap();
        assert_eq!(&b[..len], b":irc.test 001 alice :Welcome\r\n");
    }

    #[test]
    fn receive_data_appends_and_blocks() {
        use std::io::Write;
        let (mut user, mut peer) = pair();
        peer.write_all(b"NICK alice\r\n").unwrap();
        // give the loopback a moment
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert_eq!(user.receive_data().unwrap(), ReadStat::Data);
        assert_eq!(user.receive_data().unwrap(), ReadStat::Blocked);
        assert_eq!(user.take_line().unwrap(), "NICK alice");
        assert_eq!(user.take_line(), None);
    }

    #[test]
    fn registration_predicate() {
        let (mut user, _peer) = pair();
        assert!(!user.is_registered());
        user.nickname = "alice".to_string();
        assert!(!user.is_registered());
        user.username = "alice".to_string();
        assert!(user.is_registered());
    }

    #[test]
    fn flood_thresholds() {
        let (mut user, _peer) = pair();
        user.push_input(&[b'a'; 1024]);
        assert!(!user.recv_overflow());
        user.push_input(b"a");
        assert!(user.recv_overflow());
    }
}
