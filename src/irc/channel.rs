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

use std::collections::HashMap;

use mio::Token;

/// A named room. Members are identified by their connection token so the
/// mode map never holds references back into the user table.
pub struct Channel {
    // Display casing of whoever created the channel.
    pub name: String,
    // Join order; NAMES and WHO list members in this order.
    pub users: Vec<Token>,
    // Per-member mode letters out of {o, v}.
    pub usermodes: HashMap<Token, String>,
    // Channel-wide mode letters out of {n, t, m}.
    pub modes: String,
    pub topic: String,
    pub topic_author: String,
    pub topic_time: u64,
    pub creation: u64,
}

impl Channel {
    pub fn new(name: String, now: u64) -> Self {
        Channel {
            name,
            users: Vec::new(),
            usermodes: HashMap::new(),
            modes: String::new(),
            topic: String::new(),
            topic_author: String::new(),
            topic_time: 0,
            creation: now,
        }
    }

    /// Add a member; the first one in gets operator status.
    pub fn add_member(&mut self, tok: Token) {
        let modes = if self.users.is_empty() { "o" } else { "" };
        self.usermodes.insert(tok, modes.to_string());
        self.users.push(tok);
    }

    pub fn remove_member(&mut self, tok: Token) {
        self.users.retain(|&u| u != tok);
        self.usermodes.remove(&tok);
    }

    pub fn has_member(&self, tok: Token) -> bool {
        self.usermodes.contains_key(&tok)
    }

    pub fn member_modes(&self, tok: Token) -> &str {
        self.usermodes.get(&tok).map(|m| m.as_str()).unwrap_or("")
    }

    pub fn has_mode(&self, mode: char) -> bool {
        self.modes.contains(mode)
    }

    /// NAMES/WHOIS prefix for a member: `@` beats `+`.
    pub fn member_symbol(&self, tok: Token) -> &'static str {
        let modes = self.member_modes(tok);
        if modes.contains('o') {
            "@"
        } else if modes.contains('v') {
            "+"
        } else {
            ""
        }
    }
}

#[cfg(test)]
mod test {
    use mio::Token;

    use super::Channel;

    #[test]
    fn first_member_is_operator() {
        let mut chan = Channel::new("#dev".to_string(), 1000);
        chan.add_member(Token(2));
        chan.add_member(Token(3));
        assert_eq!(chan.member_modes(Token(2)), "o");
        assert_eq!(chan.member_modes(Token(3)), "");
        assert_eq!(chan.member_symbol(Token(2)), "@");
        assert_eq!(chan.member_symbol(Token(3)), "");
    }

    #[test]
    fn membership_stays_symmetric() {
        let mut chan = Channel::new("#dev".to_string(), 1000);
        chan.add_member(Token(2));
        chan.add_member(Token(3));
        chan.remove_member(Token(2));
        assert!(!chan.has_member(Token(2)));
        assert_eq!(chan.users, vec![Token(3)]);
        assert_eq!(chan.usermodes.len(), 1);
    }

    #[test]
    fn voice_symbol() {
        let mut chan = Channel::new("#dev".to_string(), 1000);
        chan.add_member(Token(2));
        chan.add_member(Token(3));
        chan.usermodes.insert(Token(3), "v".to_string());
        assert_eq!(chan.member_symbol(Token(3)), "+");
    }
}
