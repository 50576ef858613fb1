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

//! Command dispatch and the handler for every accepted command.
//!
//! Handlers never return errors; protocol failures are numeric replies
//! queued on the offending connection and the dispatcher always runs to
//! completion.

use mio::Token;

use crate::irc::channel::Channel;
use crate::irc::codec;
use crate::irc::rpl;
use crate::irc::server::{lower, ServerState, SERVER_VERSION};

const NICK_MAX: usize = 16;
const CHANNEL_MAX: usize = 50;
const TOPIC_MAX: usize = 300;
const AWAY_MAX: usize = 160;

const CHANNEL_MODES: &str = "mnt";
const VALID_NICK_CHARS: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789`^-_[]{}|\\";
const VALID_CHANNEL_CHARS: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789`~!@#$%^&*()-=_+[]{}\\|;':\"./<>?";

impl ServerState {
    /// Route one inbound line. Until a connection is registered only PING,
    /// PONG, NICK, USER and QUIT get through; everything else is 451.
    pub fn dispatch(&mut self, tok: Token, line: &str) {
        let args = codec::parse_line(line);
        let command = match args.first() {
            Some(cmd) if !cmd.is_empty() => cmd.to_ascii_uppercase(),
            _ => return,
        };
        log::debug!("[{}] {}", tok.0, command);

        match command.as_str() {
            "PING" => self.cmd_ping(tok, &args),
            "PONG" => {}
            "NICK" => self.cmd_nick(tok, &args),
            "USER" => self.cmd_user(tok, &args),
            "QUIT" => self.cmd_quit(tok, &args),
            _ if !self.is_registered(tok) => {
                self.send_numeric(
                    tok,
                    rpl::ERR_NOTREGISTERED,
                    &format!("{} :You have not registered", args[0]),
                );
            }
            "MOTD" => self.send_motd(tok),
            "VERSION" => self.cmd_version(tok),
            "PRIVMSG" => self.relay_message(tok, &args, "PRIVMSG"),
            "NOTICE" => self.relay_message(tok, &args, "NOTICE"),
            "JOIN" => self.cmd_join(tok, &args),
            "PART" => self.cmd_part(tok, &args),
            "NAMES" => self.cmd_names(tok, &args),
            "TOPIC" => self.cmd_topic(tok, &args),
            "ISON" => self.cmd_ison(tok, &args),
            "AWAY" => self.cmd_away(tok, &args),
            "MODE" => self.cmd_mode(tok, &args),
            "WHOIS" => self.cmd_whois(tok, &args),
            "WHO" => self.cmd_who(tok, &args),
            "KICK" => self.cmd_kick(tok, &args),
            "LIST" => self.cmd_list(tok),
            _ => {
                self.send_numeric(
                    tok,
                    rpl::ERR_UNKNOWNCOMMAND,
                    &format!("{} :Unknown command", args[0]),
                );
            }
        }
    }

    fn cmd_ping(&mut self, tok: Token, args: &[&str]) {
        if args.len() < 2 {
            self.send_numeric(tok, rpl::ERR_NEEDMOREPARAMS, "PING :Not enough parameters");
            return;
        }
        let line = format!(":{} PONG {} :{}", self.hostname, self.hostname, args[1]);
        self.send_line(tok, &line);
    }

    fn cmd_version(&mut self, tok: Token) {
        let line = format!("{}. {} :{}", SERVER_VERSION, self.hostname, self.name);
        self.send_numeric(tok, rpl::VERSION, &line);
    }

    fn cmd_nick(&mut self, tok: Token, args: &[&str]) {
        if args.len() < 2 {
            self.send_numeric(tok, rpl::ERR_NEEDMOREPARAMS, "NICK :Not enough parameters");
            return;
        }
        let nick = args[1].to_string();

        if nick.trim().is_empty()
            || nick.len() > NICK_MAX
            || !nick.chars().all(|c| VALID_NICK_CHARS.contains(c))
        {
            self.send_numeric(
                tok,
                rpl::ERR_ERRONEUSNICKNAME,
                &format!("{} :Erroneous Nickname", nick),
            );
            return;
        }

        // Case-insensitive and includes the caller, so re-taking your own
        // nick is also refused.
        if self.find_user_by_nick(&nick).is_some() {
            self.send_numeric(
                tok,
                rpl::ERR_NICKNAMEINUSE,
                &format!("{} :Nickname is already in use", nick),
            );
            return;
        }

        // Announce under the old identity, to self and then to everyone
        // sharing a channel, before the rename lands.
        let data = format!("NICK :{}", nick);
        self.broadcast_from(tok, &[tok], &data);
        let peers = self.channel_peers(tok);
        self.broadcast_from(tok, &peers, &data);

        let (old, has_username) = match self.users.get_mut(&tok) {
            Some(user) => {
                let old = std::mem::replace(&mut user.nickname, nick);
                (old, user.username != "unknown")
            }
            None => return,
        };
        if old == "*" && has_username {
            self.welcome(tok);
        }
    }

    fn cmd_user(&mut self, tok: Token, args: &[&str]) {
        if args.len() < 5 {
            self.send_numeric(tok, rpl::ERR_NEEDMOREPARAMS, "USER :Not enough parameters");
            return;
        }
        let already = self
            .users
            .get(&tok)
            .map(|u| u.username != "unknown")
            .unwrap_or(true);
        if already {
            self.send_numeric(tok, rpl::ERR_ALREADYREGISTRED, ":You may not register");
            return;
        }

        let has_nick = match self.users.get_mut(&tok) {
            Some(user) => {
                user.username = args[1].to_string();
                user.realname = args[4].to_string();
                user.nickname != "*"
            }
            None => return,
        };
        if has_nick {
            self.welcome(tok);
        }
    }

    /// PRIVMSG and NOTICE differ only in the command word and the away
    /// notification.
    fn relay_message(&mut self, tok: Token, args: &[&str], cmd: &str) {
        if args.len() < 2 {
            self.send_numeric(
                tok,
                rpl::ERR_NORECIPIENT,
                &format!(":No recipient given ({})", cmd),
            );
            return;
        }
        if args.len() < 3 {
            self.send_numeric(tok, rpl::ERR_NOTEXTTOSEND, ":No text to send");
            return;
        }
        let target = args[1];
        let text = args[2];

        if !target.starts_with('#') {
            let peer = match self.find_user_by_nick(target) {
                Some(peer) => peer,
                None => {
                    self.send_numeric(
                        tok,
                        rpl::ERR_NOSUCHNICK,
                        &format!("{} :No such nick/channel", target),
                    );
                    return;
                }
            };
            if cmd == "PRIVMSG" {
                let away = self
                    .users
                    .get(&peer)
                    .and_then(|u| u.away.as_ref().map(|a| (u.nickname.clone(), a.clone())));
                if let Some((nick, reason)) = away {
                    self.send_numeric(tok, rpl::AWAY, &format!("{} :{}", nick, reason));
                }
            }
            self.broadcast_from(tok, &[peer], &format!("{} {} :{}", cmd, target, text));
        } else {
            let found = self.find_channel(target).map(|chan| {
                let outside = !chan.has_member(tok) && chan.has_mode('n');
                let muted = chan.has_mode('m') && chan.member_modes(tok).is_empty();
                (chan.name.clone(), chan.users.clone(), outside || muted)
            });
            let (name, members, blocked) = match found {
                Some(found) => found,
                None => {
                    self.send_numeric(
                        tok,
                        rpl::ERR_NOSUCHNICK,
                        &format!("{} :No such nick/channel", target),
                    );
                    return;
                }
            };
            if blocked {
                self.send_numeric(
                    tok,
                    rpl::ERR_CANNOTSENDTOCHAN,
                    &format!("{} :Cannot send to channel", name),
                );
                return;
            }
            let recipients: Vec<Token> = members.into_iter().filter(|&m| m != tok).collect();
            self.broadcast_from(tok, &recipients, &format!("{} {} :{}", cmd, target, text));
        }
    }

    fn cmd_join(&mut self, tok: Token, args: &[&str]) {
        if args.len() < 2 {
            self.send_numeric(tok, rpl::ERR_NEEDMOREPARAMS, "JOIN :Not enough parameters");
            return;
        }
        if args[1].contains(',') {
            let targets: Vec<String> = args[1].split(',').map(|s| s.to_string()).collect();
            for target in targets {
                self.join_channel(tok, &target);
            }
            return;
        }
        self.join_channel(tok, args[1]);
    }

    fn join_channel(&mut self, tok: Token, target: &str) {
        if !target.starts_with('#') && target != "0" {
            self.send_numeric(
                tok,
                rpl::ERR_NOSUCHCHANNEL,
                &format!("{} :No such channel", target),
            );
            return;
        }
        if target == "0" {
            // Leave everything.
            let joined: Vec<String> = self
                .users
                .get(&tok)
                .map(|u| {
                    u.channels
                        .iter()
                        .filter_map(|k| self.channels.get(k).map(|c| c.name.clone()))
                        .collect()
                })
                .unwrap_or_default();
            for name in joined {
                self.part_channel(tok, &name, "");
            }
            return;
        }
        if target.len() > CHANNEL_MAX || !target.chars().all(|c| VALID_CHANNEL_CHARS.contains(c)) {
            self.send_numeric(
                tok,
                rpl::ERR_BADCHANNAME,
                &format!("{} :Illegal channel name", target),
            );
            return;
        }

        let key = lower(target);
        let now = self.now();
        let chan = self
            .channels
            .entry(key.clone())
            .or_insert_with(|| Channel::new(target.to_string(), now));
        if chan.has_member(tok) {
            return;
        }
        chan.add_member(tok);
        let name = chan.name.clone();
        let members = chan.users.clone();
        let topic_set = chan.topic_time != 0;
        let sole = chan.users.len() == 1;

        if let Some(user) = self.users.get_mut(&tok) {
            user.channels.push(key.clone());
        }

        self.broadcast_from(tok, &members, &format!("JOIN :{}", name));
        if topic_set {
            self.topic_query(tok, &name);
        }
        self.names_reply(tok, &name);

        if sole {
            // Channel is fresh (or was empty): the creator is its operator
            // and it starts out +nt.
            if let Some(chan) = self.channels.get_mut(&key) {
                chan.usermodes.insert(tok, "o".to_string());
                chan.modes = "nt".to_string();
            }
            let nick = self
                .users
                .get(&tok)
                .map(|u| u.nickname.clone())
                .unwrap_or_default();
            let host = self.hostname.clone();
            self.send_line(tok, &format!(":{} MODE {} +nt", host, name));
            self.send_line(tok, &format!(":{} MODE {} +o {}", host, name, nick));
        }
    }

    fn cmd_part(&mut self, tok: Token, args: &[&str]) {
        if args.len() < 2 {
            self.send_numeric(tok, rpl::ERR_NEEDMOREPARAMS, "PART :Not enough parameters");
            return;
        }
        let reason = args.get(2).copied().unwrap_or("");
        self.part_channel(tok, args[1], reason);
    }

    fn part_channel(&mut self, tok: Token, target: &str, reason: &str) {
        let key = lower(target);
        let is_member = self
            .users
            .get(&tok)
            .map(|u| u.channels.contains(&key))
            .unwrap_or(false);
        if !is_member {
            self.send_numeric(
                tok,
                rpl::ERR_NOTONCHANNEL,
                &format!("{} :You're not on that channel", target),
            );
            return;
        }
        let (name, members) = match self.channels.get(&key) {
            Some(chan) => (chan.name.clone(), chan.users.clone()),
            None => return,
        };
        self.broadcast_from(tok, &members, &format!("PART {} :{}", name, reason));
        if let Some(user) = self.users.get_mut(&tok) {
            user.channels.retain(|k| k != &key);
        }
        if let Some(chan) = self.channels.get_mut(&key) {
            chan.remove_member(tok);
        }
    }

    fn cmd_names(&mut self, tok: Token, args: &[&str]) {
        if args.len() < 2 {
            self.send_numeric(tok, rpl::ERR_NEEDMOREPARAMS, "NAMES :Not enough parameters");
            return;
        }
        self.names_reply(tok, args[1]);
    }

    fn names_reply(&mut self, tok: Token, target: &str) {
        let found = self.find_channel(target).map(|chan| {
            let names: Vec<String> = chan
                .users
                .iter()
                .filter_map(|&member| {
                    self.users
                        .get(&member)
                        .map(|u| format!("{}{}", chan.member_symbol(member), u.nickname))
                })
                .collect();
            (chan.name.clone(), names)
        });
        match found {
            Some((name, names)) => {
                self.send_numeric(
                    tok,
                    rpl::NAMREPLY,
                    &format!("@ {} :{}", name, names.join(" ")),
                );
                self.send_numeric(
                    tok,
                    rpl::ENDOFNAMES,
                    &format!("{} :End of /NAMES list.", name),
                );
            }
            None => {
                self.send_numeric(
                    tok,
                    rpl::ERR_NOSUCHNICK,
                    &format!("{} :No such nick/channel", target),
                );
            }
        }
    }

    fn cmd_topic(&mut self, tok: Token, args: &[&str]) {
        if args.len() < 2 {
            self.send_numeric(tok, rpl::ERR_NEEDMOREPARAMS, "TOPIC :Not enough parameters");
            return;
        }
        if args.len() < 3 {
            self.topic_query(tok, args[1]);
            return;
        }

        let key = lower(args[1]);
        let gate = match self.channels.get(&key) {
            Some(chan) => {
                if !chan.has_member(tok) {
                    Err((
                        rpl::ERR_NOTONCHANNEL,
                        format!("{} :You're not on that channel", chan.name),
                    ))
                } else if chan.has_mode('t') && !chan.member_modes(tok).contains('o') {
                    Err((
                        rpl::ERR_CHANOPRIVSNEEDED,
                        format!("{} :You're not a channel operator", chan.name),
                    ))
                } else {
                    Ok(chan.name.clone())
                }
            }
            None => Err((
                rpl::ERR_NOSUCHNICK,
                format!("{} :No such nick/channel", args[1]),
            )),
        };
        let name = match gate {
            Ok(name) => name,
            Err((numeric, data)) => {
                self.send_numeric(tok, numeric, &data);
                return;
            }
        };

        let text = codec::truncate_bytes(args[2], TOPIC_MAX).to_string();
        let author = self
            .users
            .get(&tok)
            .map(|u| u.fullname())
            .unwrap_or_default();
        let now = self.now();
        let members = match self.channels.get_mut(&key) {
            Some(chan) => {
                chan.topic = text.clone();
                chan.topic_author = author;
                chan.topic_time = now;
                chan.users.clone()
            }
            None => return,
        };
        self.broadcast_from(tok, &members, &format!("TOPIC {} :{}", name, text));
    }

    fn topic_query(&mut self, tok: Token, target: &str) {
        let found = self.find_channel(target).map(|chan| {
            (
                chan.name.clone(),
                chan.topic.clone(),
                chan.topic_author.clone(),
                chan.topic_time,
            )
        });
        match found {
            Some((name, topic, author, set_at)) => {
                if topic.is_empty() {
                    self.send_numeric(tok, rpl::NOTOPIC, &format!("{} :No topic is set.", name));
                } else {
                    self.send_numeric(tok, rpl::TOPIC, &format!("{} :{}", name, topic));
                    self.send_numeric(
                        tok,
                        rpl::TOPICWHOTIME,
                        &format!("{} {} {}", name, author, set_at),
                    );
                }
            }
            None => {
                self.send_numeric(
                    tok,
                    rpl::ERR_NOSUCHNICK,
                    &format!("{} :No such nick/channel", target),
                );
            }
        }
    }

    fn cmd_ison(&mut self, tok: Token, args: &[&str]) {
        if args.len() < 2 {
            self.send_numeric(tok, rpl::ERR_NEEDMOREPARAMS, "ISON :Not enough parameters");
            return;
        }
        let online: Vec<&str> = args[1..]
            .iter()
            .copied()
            .filter(|nick| self.find_user_by_nick(nick).is_some())
            .collect();
        self.send_numeric(tok, rpl::ISON, &format!(":{}", online.join(" ")));
    }

    fn cmd_away(&mut self, tok: Token, args: &[&str]) {
        if args.len() < 2 || args[1].is_empty() {
            if let Some(user) = self.users.get_mut(&tok) {
                user.away = None;
            }
            self.send_numeric(tok, rpl::UNAWAY, ":You are no longer marked as being away");
        } else {
            let text = codec::truncate_bytes(args[1], AWAY_MAX).to_string();
            if let Some(user) = self.users.get_mut(&tok) {
                user.away = Some(text);
            }
            self.send_numeric(tok, rpl::NOWAWAY, ":You have been marked as being away");
        }
    }

    fn cmd_mode(&mut self, tok: Token, args: &[&str]) {
        if args.len() < 2 {
            self.send_numeric(tok, rpl::ERR_NEEDMOREPARAMS, "MODE :Not enough parameters");
            return;
        }
        let key = lower(args[1]);
        let (name, is_op) = match self.channels.get(&key) {
            Some(chan) => (
                chan.name.clone(),
                chan.has_member(tok) && chan.member_modes(tok).contains('o'),
            ),
            None => {
                self.send_numeric(
                    tok,
                    rpl::ERR_NOSUCHNICK,
                    &format!("{} :No such nick/channel", args[1]),
                );
                return;
            }
        };

        if args.len() == 2 {
            let (modes, creation) = match self.channels.get(&key) {
                Some(chan) => (chan.modes.clone(), chan.creation),
                None => return,
            };
            self.send_numeric(tok, rpl::CHANNELMODEIS, &format!("{} +{}", name, modes));
            self.send_numeric(tok, rpl::CREATIONTIME, &format!("{} {}", name, creation));
            return;
        }

        if !is_op {
            self.send_numeric(
                tok,
                rpl::ERR_CHANOPRIVSNEEDED,
                &format!("{} :You're not a channel operator", name),
            );
            return;
        }

        if args.len() == 3 {
            // Toggle channel-wide modes; letters outside {m,n,t} are ignored.
            if let Some(chan) = self.channels.get_mut(&key) {
                let mut action = None;
                for m in args[2].chars() {
                    match m {
                        '+' => action = Some('+'),
                        '-' => action = Some('-'),
                        m if CHANNEL_MODES.contains(m) => match action {
                            Some('+') => {
                                if !chan.modes.contains(m) {
                                    chan.modes.push(m);
                                }
                            }
                            Some('-') => {
                                chan.modes = chan.modes.chars().filter(|&c| c != m).collect();
                            }
                            _ => {}
                        },
                        _ => {}
                    }
                }
            }
            let members = self
                .channels
                .get(&key)
                .map(|c| c.users.clone())
                .unwrap_or_default();
            self.broadcast_from(tok, &members, &format!("MODE {} {}", name, args[2]));
            return;
        }

        // Member modes: pair each signed {o,v} letter with a target nick,
        // in order. Unpaired letters and unknown targets are skipped.
        let mut changes = Vec::new();
        let mut action = None;
        for m in args[2].chars() {
            match m {
                '+' => action = Some('+'),
                '-' => action = Some('-'),
                'o' | 'v' => {
                    if let Some(sign) = action {
                        changes.push((sign, m));
                    }
                }
                _ => {}
            }
        }
        let pairs: Vec<(String, (char, char))> = args[3..]
            .iter()
            .map(|s| s.to_string())
            .zip(changes.into_iter())
            .collect();

        for (nick, (sign, letter)) in pairs {
            let member = self.channels.get(&key).and_then(|chan| {
                chan.users.iter().copied().find(|m| {
                    self.users
                        .get(m)
                        .map(|u| lower(&u.nickname) == lower(&nick))
                        .unwrap_or(false)
                })
            });
            let member = match member {
                Some(member) => member,
                None => continue,
            };
            if let Some(chan) = self.channels.get_mut(&key) {
                if let Some(modes) = chan.usermodes.get_mut(&member) {
                    if sign == '+' {
                        if !modes.contains(letter) {
                            modes.push(letter);
                        }
                    } else {
                        *modes = modes.chars().filter(|&c| c != letter).collect();
                    }
                }
            }
        }

        let members = self
            .channels
            .get(&key)
            .map(|c| c.users.clone())
            .unwrap_or_default();
        self.broadcast_from(
            tok,
            &members,
            &format!("MODE {} {} {}", name, args[2], args[3..].join(" ")),
        );
    }

    fn cmd_whois(&mut self, tok: Token, args: &[&str]) {
        if args.len() < 2 {
            self.send_numeric(tok, rpl::ERR_NEEDMOREPARAMS, "WHOIS :Not enough parameters");
            return;
        }
        let target = match self.find_user_by_nick(args[1]) {
            Some(target) => target,
            None => {
                self.send_numeric(
                    tok,
                    rpl::ERR_NOSUCHNICK,
                    &format!("{} :No such nick/channel", args[1]),
                );
                self.send_numeric(
                    tok,
                    rpl::ENDOFWHOIS,
                    &format!("{} :End of /WHOIS list.", args[1]),
                );
                return;
            }
        };

        let (nick, username, hostname, realname, away, last_activity, signon, joined) =
            match self.users.get(&target) {
                Some(u) => (
                    u.nickname.clone(),
                    u.username.clone(),
                    u.hostname.clone(),
                    u.realname.clone(),
                    u.away.clone(),
                    u.last_activity,
                    u.signon,
                    u.channels.clone(),
                ),
                None => return,
            };

        self.send_numeric(
            tok,
            rpl::WHOISUSER,
            &format!("{} {} {} * :{}", nick, username, hostname, realname),
        );
        if !joined.is_empty() {
            let names: Vec<String> = joined
                .iter()
                .filter_map(|key| {
                    self.channels
                        .get(key)
                        .map(|c| format!("{}{}", c.member_symbol(target), c.name))
                })
                .collect();
            self.send_numeric(
                tok,
                rpl::WHOISCHANNELS,
                &format!("{} :{}", nick, names.join(" ")),
            );
        }
        let server_line = format!("{} {} :{}", nick, self.hostname, self.name);
        self.send_numeric(tok, rpl::WHOISSERVER, &server_line);
        if let Some(reason) = away {
            self.send_numeric(tok, rpl::AWAY, &format!("{} :{}", nick, reason));
        }
        let idle = self.now().saturating_sub(last_activity);
        self.send_numeric(
            tok,
            rpl::WHOISIDLE,
            &format!("{} {} {} :seconds idle, signon time", nick, idle, signon),
        );
        self.send_numeric(tok, rpl::ENDOFWHOIS, &format!("{} :End of /WHOIS list.", nick));
    }

    fn cmd_who(&mut self, tok: Token, args: &[&str]) {
        if args.len() < 2 {
            self.send_numeric(tok, rpl::ERR_NEEDMOREPARAMS, "WHO :Not enough parameters");
            return;
        }
        let found = self.find_channel(args[1]).map(|chan| {
            let rows: Vec<String> = chan
                .users
                .iter()
                .filter_map(|&member| {
                    self.users.get(&member).map(|user| {
                        let symbols: String = chan
                            .member_modes(member)
                            .chars()
                            .map(|m| if m == 'o' { '@' } else { '+' })
                            .collect();
                        let here = if user.away.is_some() { "G" } else { "H" };
                        format!(
                            "{} {} {} {} {} {}{} :0 {}",
                            chan.name,
                            user.username,
                            user.hostname,
                            self.hostname,
                            user.nickname,
                            here,
                            symbols,
                            user.realname
                        )
                    })
                })
                .collect();
            (chan.name.clone(), rows)
        });
        match found {
            Some((name, rows)) => {
                for row in rows {
                    self.send_numeric(tok, rpl::WHOREPLY, &row);
                }
                self.send_numeric(tok, rpl::ENDOFWHO, &format!("{} :End of /WHO list.", name));
            }
            None => {
                self.send_numeric(
                    tok,
                    rpl::ENDOFWHO,
                    &format!("{} :End of /WHO list.", args[1]),
                );
            }
        }
    }

    fn cmd_kick(&mut self, tok: Token, args: &[&str]) {
        if args.len() < 3 {
            self.send_numeric(tok, rpl::ERR_NEEDMOREPARAMS, "KICK :Not enough parameters");
            return;
        }
        let key = lower(args[1]);
        let in_channel = self
            .users
            .get(&tok)
            .map(|u| u.channels.contains(&key))
            .unwrap_or(false);
        if !in_channel {
            self.send_numeric(
                tok,
                rpl::ERR_NOSUCHNICK,
                &format!("{} :No such nick/channel", args[1]),
            );
            return;
        }

        let victim = self.channels.get(&key).and_then(|chan| {
            chan.users.iter().copied().find(|m| {
                self.users
                    .get(m)
                    .map(|u| lower(&u.nickname) == lower(args[2]))
                    .unwrap_or(false)
            })
        });
        let victim = match victim {
            Some(victim) => victim,
            None => {
                self.send_numeric(
                    tok,
                    rpl::ERR_NOSUCHNICK,
                    &format!("{} :No such nick/channel", args[2]),
                );
                return;
            }
        };

        let (name, is_op) = match self.channels.get(&key) {
            Some(chan) => (chan.name.clone(), chan.member_modes(tok).contains('o')),
            None => return,
        };
        if !is_op {
            self.send_numeric(
                tok,
                rpl::ERR_CHANOPRIVSNEEDED,
                &format!("{} :You're not a channel operator", name),
            );
            return;
        }

        let reason = match args.get(3) {
            Some(reason) => reason.to_string(),
            None => self
                .users
                .get(&tok)
                .map(|u| u.nickname.clone())
                .unwrap_or_default(),
        };
        let victim_nick = self
            .users
            .get(&victim)
            .map(|u| u.nickname.clone())
            .unwrap_or_default();
        let members = self
            .channels
            .get(&key)
            .map(|c| c.users.clone())
            .unwrap_or_default();
        self.broadcast_from(
            tok,
            &members,
            &format!("KICK {} {} :{}", name, victim_nick, reason),
        );

        if let Some(user) = self.users.get_mut(&victim) {
            user.channels.retain(|k| k != &key);
        }
        if let Some(chan) = self.channels.get_mut(&key) {
            chan.remove_member(victim);
        }
    }

    fn cmd_list(&mut self, tok: Token) {
        self.send_numeric(tok, rpl::LISTSTART, "Channel :Users  Name");
        let rows: Vec<String> = self
            .channels
            .values()
            .map(|c| format!("{} {} :{}", c.name, c.users.len(), c.topic))
            .collect();
        for row in rows {
            self.send_numeric(tok, rpl::LIST, &row);
        }
        self.send_numeric(tok, rpl::LISTEND, ":End of /LIST");
    }

    fn cmd_quit(&mut self, tok: Token, args: &[&str]) {
        let reason = match args.get(1) {
            Some(reason) => reason.to_string(),
            None => self
                .users
                .get(&tok)
                .map(|u| u.nickname.clone())
                .unwrap_or_default(),
        };
        self.quit(tok, &format!("Quit: {}", reason));
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;
    use std::net::{SocketAddr, TcpListener, TcpStream as StdTcpStream};

    use mio::net::TcpStream;
    use mio::Token;

    use crate::config::config_file::Config;
    use crate::irc::server::{lower, ServerState};

    const CONF: &str = r##"
[general]
hostname = "irc.test"
name = "Test"
creation = "today"
motd = "welcome"
"##;

    struct Fixture {
        state: ServerState,
        // Client halves stay open so teardown's direct writes succeed.
        peers: Vec<StdTcpStream>,
    }

    impl Fixture {
        fn new() -> Fixture {
            let config = Config::from_str(CONF).unwrap();
            let state = ServerState::with_hooks(
                &config.general,
                Box::new(|| 1000),
                Box::new(|_| None),
            );
            Fixture {
                state,
                peers: Vec::new(),
            }
        }

        /// Wire up a real socket pair and admit the server half, faking a
        /// distinct source address per user so the per-IP cap stays out of
        /// the way.
        fn add_user(&mut self, n: usize) -> Token {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let peer = StdTcpStream::connect(listener.local_addr().unwrap()).unwrap();
            let (accepted, _) = listener.accept().unwrap();
            accepted.set_nonblocking(true).unwrap();
            self.peers.push(peer);
            let tok = Token(n);
            let addr = SocketAddr::from(([10, 0, 0, n as u8], 6000 + n as u16));
            self.state
                .accept_user(TcpStream::from_std(accepted), addr, tok);
            tok
        }

        fn registered(&mut self, n: usize, nick: &str) -> Token {
            let tok = self.add_user(n);
            self.state.dispatch(tok, &format!("NICK {}", nick));
            self.state
                .dispatch(tok, &format!("USER {} 0 * :{} Example", nick, nick));
            self.output(tok);
            tok
        }

        fn output(&mut self, tok: Token) -> String {
            self.state
                .users
                .get_mut(&tok)
                .map(|u| u.take_output())
                .unwrap_or_default()
        }
    }

    fn assert_invariants(state: &ServerState) {
        let mut nicks = HashSet::new();
        for user in state.users.values() {
            if user.is_registered() {
                assert!(
                    nicks.insert(lower(&user.nickname)),
                    "nickname {} held twice",
                    user.nickname
                );
            }
        }
        for (key, chan) in &state.channels {
            assert_eq!(chan.users.len(), chan.usermodes.len());
            for &member in &chan.users {
                assert!(chan.usermodes.contains_key(&member));
                let user = state.users.get(&member).expect("member not connected");
                assert!(user.channels.contains(key), "{} missing from {}", key, member.0);
            }
        }
        for (&tok, user) in &state.users {
            for key in &user.channels {
                let chan = state.channels.get(key).expect("joined channel missing");
                assert!(chan.has_member(tok));
            }
        }
    }

    #[test]
    fn welcome_sequence() {
        let mut f = Fixture::new();
        let tok = f.add_user(1);
        f.state.dispatch(tok, "NICK alice");
        f.state.dispatch(tok, "USER alice 0 * :Alice A");
        let out = f.output(tok);

        let codes: Vec<&str> = out
            .lines()
            .filter(|l| l.starts_with(":irc.test"))
            .map(|l| l.split(' ').nth(1).unwrap())
            .collect();
        assert_eq!(
            codes,
            vec!["001", "002", "003", "004", "005", "375", "372", "376"]
        );
        assert!(out.contains(":irc.test 001 alice :Welcome to Test, alice!alice@10.0.0.1\r\n"));
        assert!(out.contains(":irc.test 003 alice :This server was created today\r\n"));
        assert!(out.contains("CHANTYPES=# PREFIX=(ov)@+ CHANMODES=b,,,mnt NICKLEN=16"));
        assert!(out.contains("NETWORK=Test :Are supported by this server\r\n"));
        assert!(out.contains(":irc.test 372 alice :- welcome\r\n"));
    }

    #[test]
    fn welcome_runs_with_user_first_too() {
        let mut f = Fixture::new();
        let tok = f.add_user(1);
        f.state.dispatch(tok, "USER alice 0 * :Alice A");
        assert!(!f.output(tok).contains(" 001 "));
        f.state.dispatch(tok, "NICK alice");
        assert!(f.output(tok).contains(":irc.test 001 alice "));
    }

    #[test]
    fn registration_gate_451() {
        let mut f = Fixture::new();
        let tok = f.add_user(1);
        f.state.dispatch(tok, "JOIN #dev");
        assert_eq!(
            f.output(tok),
            ":irc.test 451 * JOIN :You have not registered\r\n"
        );
        // PING is exempt from the gate
        f.state.dispatch(tok, "PING abc");
        assert_eq!(f.output(tok), ":irc.test PONG irc.test :abc\r\n");
    }

    #[test]
    fn ping_requires_token() {
        let mut f = Fixture::new();
        let tok = f.registered(1, "alice");
        f.state.dispatch(tok, "PING");
        assert_eq!(
            f.output(tok),
            ":irc.test 461 alice PING :Not enough parameters\r\n"
        );
    }

    #[test]
    fn nick_collision_433() {
        let mut f = Fixture::new();
        let _alice = f.registered(1, "alice");
        let tok = f.add_user(2);
        f.state.dispatch(tok, "NICK Alice");
        assert_eq!(
            f.output(tok),
            ":irc.test 433 * Alice :Nickname is already in use\r\n"
        );
        // same nick twice in sequence from one connection: second is 433
        let bob = f.add_user(3);
        f.state.dispatch(bob, "NICK bob");
        f.output(bob);
        f.state.dispatch(bob, "NICK bob");
        assert_eq!(
            f.output(bob),
            ":irc.test 433 bob bob :Nickname is already in use\r\n"
        );
    }

    #[test]
    fn nick_validation_432() {
        let mut f = Fixture::new();
        let tok = f.add_user(1);
        f.state.dispatch(tok, "NICK seventeencharacts");
        assert!(f.output(tok).starts_with(":irc.test 432 * seventeencharacts :Erroneous Nickname"));
        f.state.dispatch(tok, "NICK bad!name");
        assert!(f.output(tok).contains("432 * bad!name :Erroneous Nickname"));
        // sixteen is fine
        f.state.dispatch(tok, "NICK sixteencharacter");
        assert!(f.output(tok).contains("NICK :sixteencharacter"));
    }

    #[test]
    fn nick_change_broadcasts_once_per_peer() {
        let mut f = Fixture::new();
        let alice = f.registered(1, "alice");
        let bob = f.registered(2, "bob");
        f.state.dispatch(alice, "JOIN #a");
        f.state.dispatch(alice, "JOIN #b");
        f.state.dispatch(bob, "JOIN #a");
        f.state.dispatch(bob, "JOIN #b");
        f.output(alice);
        f.output(bob);

        f.state.dispatch(alice, "NICK alicia");
        let to_alice = f.output(alice);
        let to_bob = f.output(bob);
        assert_eq!(to_alice, ":alice!alice@10.0.0.1 NICK :alicia\r\n");
        // two shared channels, one notification
        assert_eq!(to_bob, ":alice!alice@10.0.0.1 NICK :alicia\r\n");
        assert_eq!(f.state.users.get(&alice).unwrap().nickname, "alicia");
    }

    #[test]
    fn user_twice_is_462() {
        let mut f = Fixture::new();
        let tok = f.registered(1, "alice");
        f.state.dispatch(tok, "USER other 0 * :Other");
        assert_eq!(
            f.output(tok),
            ":irc.test 462 alice :You may not register\r\n"
        );
    }

    #[test]
    fn join_creates_channel_with_nt_and_op() {
        let mut f = Fixture::new();
        let alice = f.registered(1, "alice");
        f.state.dispatch(alice, "JOIN #Dev");
        let out = f.output(alice);

        assert!(out.starts_with(":alice!alice@10.0.0.1 JOIN :#Dev\r\n"));
        assert!(out.contains(":irc.test 353 alice @ #Dev :@alice\r\n"));
        assert!(out.contains(":irc.test 366 alice #Dev :End of /NAMES list.\r\n"));
        assert!(out.contains(":irc.test MODE #Dev +nt\r\n"));
        assert!(out.contains(":irc.test MODE #Dev +o alice\r\n"));

        let chan = f.state.find_channel("#dev").unwrap();
        assert_eq!(chan.name, "#Dev");
        assert_eq!(chan.modes, "nt");
        assert_eq!(chan.member_modes(alice), "o");
        assert_eq!(chan.creation, 1000);
        assert_invariants(&f.state);
    }

    #[test]
    fn rejoin_is_a_noop() {
        let mut f = Fixture::new();
        let alice = f.registered(1, "alice");
        f.state.dispatch(alice, "JOIN #dev");
        f.output(alice);
        f.state.dispatch(alice, "JOIN #dev");
        assert_eq!(f.output(alice), "");
        // case-insensitively too
        f.state.dispatch(alice, "JOIN #DEV");
        assert_eq!(f.output(alice), "");
    }

    #[test]
    fn join_errors() {
        let mut f = Fixture::new();
        let alice = f.registered(1, "alice");
        f.state.dispatch(alice, "JOIN dev");
        assert!(f.output(alice).contains("403 alice dev :No such channel"));

        let long = format!("#{}", "a".repeat(50));
        f.state.dispatch(alice, &format!("JOIN {}", long));
        assert!(f
            .output(alice)
            .contains(&format!("479 alice {} :Illegal channel name", long)));

        f.state.dispatch(alice, "JOIN #bad\u{1}name");
        assert!(f.output(alice).contains("479 alice"));
    }

    #[test]
    fn join_list_and_zero_part_all() {
        let mut f = Fixture::new();
        let alice = f.registered(1, "alice");
        f.state.dispatch(alice, "JOIN #a,#b");
        f.output(alice);
        assert_eq!(f.state.users.get(&alice).unwrap().channels.len(), 2);

        f.state.dispatch(alice, "JOIN 0");
        let out = f.output(alice);
        assert!(out.contains(":alice!alice@10.0.0.1 PART #a :\r\n"));
        assert!(out.contains(":alice!alice@10.0.0.1 PART #b :\r\n"));
        assert!(f.state.users.get(&alice).unwrap().channels.is_empty());

        f.state.collect_empty_channels();
        assert!(f.state.channels.is_empty());
    }

    #[test]
    fn second_joiner_is_plain_member() {
        let mut f = Fixture::new();
        let alice = f.registered(1, "alice");
        let bob = f.registered(2, "bob");
        f.state.dispatch(alice, "JOIN #dev");
        f.output(alice);
        f.state.dispatch(bob, "JOIN #dev");
        let to_bob = f.output(bob);
        let to_alice = f.output(alice);

        assert!(to_alice.contains(":bob!bob@10.0.0.2 JOIN :#dev\r\n"));
        assert!(to_bob.contains(":irc.test 353 bob @ #dev :@alice bob\r\n"));
        assert!(!to_bob.contains("MODE #dev +nt"));
        let chan = f.state.find_channel("#dev").unwrap();
        assert_eq!(chan.member_modes(bob), "");
        assert_invariants(&f.state);
    }

    #[test]
    fn privmsg_channel_fanout_excludes_sender() {
        let mut f = Fixture::new();
        let alice = f.registered(1, "alice");
        let bob = f.registered(2, "bob");
        f.state.dispatch(alice, "JOIN #dev");
        f.state.dispatch(bob, "JOIN #dev");
        f.output(alice);
        f.output(bob);

        f.state.dispatch(alice, "PRIVMSG #dev :hi");
        assert_eq!(f.output(alice), "");
        assert_eq!(f.output(bob), ":alice!alice@10.0.0.1 PRIVMSG #dev :hi\r\n");
    }

    #[test]
    fn privmsg_external_blocked_by_n() {
        let mut f = Fixture::new();
        let alice = f.registered(1, "alice");
        let carol = f.registered(2, "carol");
        f.state.dispatch(alice, "JOIN #dev");
        f.output(alice);

        f.state.dispatch(carol, "PRIVMSG #dev :x");
        assert_eq!(
            f.output(carol),
            ":irc.test 404 carol #dev :Cannot send to channel\r\n"
        );
        assert_eq!(f.output(alice), "");
    }

    #[test]
    fn moderated_channel_needs_voice() {
        let mut f = Fixture::new();
        let alice = f.registered(1, "alice");
        let bob = f.registered(2, "bob");
        f.state.dispatch(alice, "JOIN #dev");
        f.state.dispatch(bob, "JOIN #dev");
        f.state.dispatch(alice, "MODE #dev +m");
        f.output(alice);
        f.output(bob);

        f.state.dispatch(bob, "PRIVMSG #dev :quiet me");
        assert_eq!(
            f.output(bob),
            ":irc.test 404 bob #dev :Cannot send to channel\r\n"
        );

        f.state.dispatch(alice, "MODE #dev +v bob");
        f.output(alice);
        f.output(bob);
        f.state.dispatch(bob, "PRIVMSG #dev :now i speak");
        assert_eq!(f.output(bob), "");
        assert_eq!(
            f.output(alice),
            ":bob!bob@10.0.0.2 PRIVMSG #dev :now i speak\r\n"
        );
    }

    #[test]
    fn privmsg_user_with_away_notice() {
        let mut f = Fixture::new();
        let alice = f.registered(1, "alice");
        let bob = f.registered(2, "bob");

        f.state.dispatch(bob, "AWAY :gone fishing");
        assert_eq!(
            f.output(bob),
            ":irc.test 306 bob :You have been marked as being away\r\n"
        );

        f.state.dispatch(alice, "PRIVMSG bob :hi");
        assert_eq!(f.output(alice), ":irc.test 301 alice bob :gone fishing\r\n");
        assert_eq!(f.output(bob), ":alice!alice@10.0.0.1 PRIVMSG bob :hi\r\n");

        f.state.dispatch(bob, "AWAY");
        assert_eq!(
            f.output(bob),
            ":irc.test 305 bob :You are no longer marked as being away\r\n"
        );
        assert!(f.state.users.get(&bob).unwrap().away.is_none());
    }

    #[test]
    fn notice_skips_away_notification() {
        let mut f = Fixture::new();
        let alice = f.registered(1, "alice");
        let bob = f.registered(2, "bob");
        f.state.dispatch(bob, "AWAY :gone");
        f.output(bob);

        f.state.dispatch(alice, "NOTICE bob :psst");
        assert_eq!(f.output(alice), "");
        assert_eq!(f.output(bob), ":alice!alice@10.0.0.1 NOTICE bob :psst\r\n");
    }

    #[test]
    fn message_error_numerics() {
        let mut f = Fixture::new();
        let alice = f.registered(1, "alice");
        f.state.dispatch(alice, "PRIVMSG");
        assert_eq!(
            f.output(alice),
            ":irc.test 411 alice :No recipient given (PRIVMSG)\r\n"
        );
        f.state.dispatch(alice, "PRIVMSG bob");
        assert_eq!(f.output(alice), ":irc.test 412 alice :No text to send\r\n");
        f.state.dispatch(alice, "PRIVMSG ghost :hi");
        assert_eq!(
            f.output(alice),
            ":irc.test 401 alice ghost :No such nick/channel\r\n"
        );
        f.state.dispatch(alice, "NOTICE #ghost :hi");
        assert_eq!(
            f.output(alice),
            ":irc.test 401 alice #ghost :No such nick/channel\r\n"
        );
    }

    #[test]
    fn away_text_caps_at_160_bytes() {
        let mut f = Fixture::new();
        let bob = f.registered(1, "bob");
        f.state
            .dispatch(bob, &format!("AWAY :{}", "x".repeat(200)));
        f.output(bob);
        assert_eq!(
            f.state.users.get(&bob).unwrap().away.as_ref().unwrap().len(),
            160
        );
    }

    #[test]
    fn topic_set_query_and_gates() {
        let mut f = Fixture::new();
        let alice = f.registered(1, "alice");
        let bob = f.registered(2, "bob");
        f.state.dispatch(alice, "JOIN #dev");
        f.state.dispatch(bob, "JOIN #dev");
        f.output(alice);
        f.output(bob);

        // unset topic
        f.state.dispatch(bob, "TOPIC #dev");
        assert_eq!(
            f.output(bob),
            ":irc.test 331 bob #dev :No topic is set.\r\n"
        );

        // channel is +t, bob is not an operator
        f.state.dispatch(bob, "TOPIC #dev :nope");
        assert_eq!(
            f.output(bob),
            ":irc.test 482 bob #dev :You're not a channel operator\r\n"
        );

        f.state.dispatch(alice, "TOPIC #dev :hello");
        assert_eq!(
            f.output(alice),
            ":alice!alice@10.0.0.1 TOPIC #dev :hello\r\n"
        );
        assert_eq!(
            f.output(bob),
            ":alice!alice@10.0.0.1 TOPIC #dev :hello\r\n"
        );

        f.state.dispatch(bob, "TOPIC #dev");
        let out = f.output(bob);
        assert!(out.contains(":irc.test 332 bob #dev :hello\r\n"));
        assert!(out.contains(":irc.test 333 bob #dev alice!alice@10.0.0.1 1000\r\n"));

        // outsiders may not set
        let carol = f.registered(3, "carol");
        f.state.dispatch(carol, "TOPIC #dev :outsider");
        assert_eq!(
            f.output(carol),
            ":irc.test 442 carol #dev :You're not on that channel\r\n"
        );
    }

    #[test]
    fn topic_caps_at_300_bytes() {
        let mut f = Fixture::new();
        let alice = f.registered(1, "alice");
        f.state.dispatch(alice, "JOIN #dev");
        f.output(alice);
        f.state
            .dispatch(alice, &format!("TOPIC #dev :{}", "t".repeat(400)));
        assert_eq!(f.state.find_channel("#dev").unwrap().topic.len(), 300);
    }

    #[test]
    fn mode_query_and_toggles() {
        let mut f = Fixture::new();
        let alice = f.registered(1, "alice");
        f.state.dispatch(alice, "JOIN #dev");
        f.output(alice);

        f.state.dispatch(alice, "MODE #dev");
        let out = f.output(alice);
        assert!(out.contains(":irc.test 324 alice #dev +nt\r\n"));
        assert!(out.contains(":irc.test 329 alice #dev 1000\r\n"));

        // +n-n nets out to no n (and the raw string is still broadcast)
        f.state.dispatch(alice, "MODE #dev +n-n");
        assert_eq!(
            f.output(alice),
            ":alice!alice@10.0.0.1 MODE #dev +n-n\r\n"
        );
        assert!(!f.state.find_channel("#dev").unwrap().has_mode('n'));
        assert!(f.state.find_channel("#dev").unwrap().has_mode('t'));

        // unknown letters are ignored
        f.state.dispatch(alice, "MODE #dev +x");
        f.output(alice);
        assert_eq!(f.state.find_channel("#dev").unwrap().modes, "t");

        f.state.dispatch(alice, "MODE #dev +mn");
        f.output(alice);
        assert_eq!(f.state.find_channel("#dev").unwrap().modes, "tmn");
    }

    #[test]
    fn mode_needs_operator() {
        let mut f = Fixture::new();
        let alice = f.registered(1, "alice");
        let bob = f.registered(2, "bob");
        f.state.dispatch(alice, "JOIN #dev");
        f.state.dispatch(bob, "JOIN #dev");
        f.output(alice);
        f.output(bob);

        f.state.dispatch(bob, "MODE #dev +m");
        assert_eq!(
            f.output(bob),
            ":irc.test 482 bob #dev :You're not a channel operator\r\n"
        );
        // but the query form is open to anyone
        f.state.dispatch(bob, "MODE #dev");
        assert!(f.output(bob).contains("324 bob #dev +nt"));
    }

    #[test]
    fn mode_member_pairing() {
        let mut f = Fixture::new();
        let alice = f.registered(1, "alice");
        let bob = f.registered(2, "bob");
        f.state.dispatch(alice, "JOIN #dev");
        f.state.dispatch(bob, "JOIN #dev");
        f.output(alice);
        f.output(bob);

        // a target outside the channel is skipped, but the frame still goes out
        let carol = f.registered(3, "carol");
        f.state.dispatch(alice, "MODE #dev +o carol");
        assert_eq!(
            f.output(alice),
            ":alice!alice@10.0.0.1 MODE #dev +o carol\r\n"
        );
        assert_eq!(f.output(carol), "");

        f.state.dispatch(alice, "MODE #dev +v-o bob alice");
        let out = f.output(alice);
        assert!(out.contains(":alice!alice@10.0.0.1 MODE #dev +v-o bob alice\r\n"));
        let chan = f.state.find_channel("#dev").unwrap();
        assert_eq!(chan.member_modes(bob), "v");
        assert_eq!(chan.member_modes(alice), "");

        // alice dropped her own o; she cannot change modes any more
        f.state.dispatch(alice, "MODE #dev +o alice");
        assert!(f.output(alice).contains("482 alice #dev"));
    }

    #[test]
    fn names_prefixes_and_unknown() {
        let mut f = Fixture::new();
        let alice = f.registered(1, "alice");
        let bob = f.registered(2, "bob");
        f.state.dispatch(alice, "JOIN #dev");
        f.state.dispatch(bob, "JOIN #dev");
        f.state.dispatch(alice, "MODE #dev +v bob");
        f.output(alice);
        f.output(bob);

        f.state.dispatch(alice, "NAMES #dev");
        let out = f.output(alice);
        assert!(out.contains(":irc.test 353 alice @ #dev :@alice +bob\r\n"));
        assert!(out.contains(":irc.test 366 alice #dev :End of /NAMES list.\r\n"));

        f.state.dispatch(alice, "NAMES #ghost");
        assert_eq!(
            f.output(alice),
            ":irc.test 401 alice #ghost :No such nick/channel\r\n"
        );
    }

    #[test]
    fn kick_permission_walk() {
        let mut f = Fixture::new();
        let alice = f.registered(1, "alice");
        let bob = f.registered(2, "bob");
        f.state.dispatch(alice, "JOIN #dev");
        f.state.dispatch(bob, "JOIN #dev");
        f.output(alice);
        f.output(bob);

        f.state.dispatch(bob, "KICK #dev alice :revolt");
        assert_eq!(
            f.output(bob),
            ":irc.test 482 bob #dev :You're not a channel operator\r\n"
        );

        f.state.dispatch(alice, "KICK #dev ghost");
        assert_eq!(
            f.output(alice),
            ":irc.test 401 alice ghost :No such nick/channel\r\n"
        );

        f.state.dispatch(alice, "KICK #ghost bob");
        assert_eq!(
            f.output(alice),
            ":irc.test 401 alice #ghost :No such nick/channel\r\n"
        );

        f.state.dispatch(alice, "KICK #dev bob :begone");
        let frame = ":alice!alice@10.0.0.1 KICK #dev bob :begone\r\n";
        assert_eq!(f.output(alice), frame);
        assert_eq!(f.output(bob), frame);
        assert!(!f.state.find_channel("#dev").unwrap().has_member(bob));
        assert!(f.state.users.get(&bob).unwrap().channels.is_empty());
        assert_invariants(&f.state);

        // default reason is the kicker's nickname
        f.state.dispatch(bob, "JOIN #dev");
        f.output(alice);
        f.output(bob);
        f.state.dispatch(alice, "KICK #dev bob");
        assert!(f.output(bob).contains("KICK #dev bob :alice\r\n"));
    }

    #[test]
    fn part_flow() {
        let mut f = Fixture::new();
        let alice = f.registered(1, "alice");
        let bob = f.registered(2, "bob");
        f.state.dispatch(alice, "JOIN #dev");
        f.state.dispatch(bob, "JOIN #dev");
        f.output(alice);
        f.output(bob);

        f.state.dispatch(bob, "PART #ghost");
        assert_eq!(
            f.output(bob),
            ":irc.test 442 bob #ghost :You're not on that channel\r\n"
        );

        f.state.dispatch(bob, "PART #dev :off to lunch");
        let frame = ":bob!bob@10.0.0.2 PART #dev :off to lunch\r\n";
        assert_eq!(f.output(bob), frame);
        assert_eq!(f.output(alice), frame);
        assert_invariants(&f.state);

        f.state.dispatch(alice, "PART #dev");
        f.output(alice);
        f.state.collect_empty_channels();
        assert!(f.state.channels.is_empty());
    }

    #[test]
    fn whois_replies() {
        let mut f = Fixture::new();
        let alice = f.registered(1, "alice");
        let bob = f.registered(2, "bob");
        f.state.dispatch(bob, "JOIN #dev");
        f.state.dispatch(bob, "AWAY :afk");
        f.output(alice);
        f.output(bob);

        f.state.dispatch(alice, "WHOIS bob");
        let out = f.output(alice);
        assert!(out.contains(":irc.test 311 alice bob bob 10.0.0.2 * :bob Example\r\n"));
        assert!(out.contains(":irc.test 319 alice bob :@#dev\r\n"));
        assert!(out.contains(":irc.test 312 alice bob irc.test :Test\r\n"));
        assert!(out.contains(":irc.test 301 alice bob :afk\r\n"));
        assert!(out.contains(":irc.test 317 alice bob 0 1000 :seconds idle, signon time\r\n"));
        assert!(out.ends_with(":irc.test 318 alice bob :End of /WHOIS list.\r\n"));

        f.state.dispatch(alice, "WHOIS ghost");
        let out = f.output(alice);
        assert!(out.contains(":irc.test 401 alice ghost :No such nick/channel\r\n"));
        assert!(out.contains(":irc.test 318 alice ghost :End of /WHOIS list.\r\n"));
    }

    #[test]
    fn who_listing() {
        let mut f = Fixture::new();
        let alice = f.registered(1, "alice");
        let bob = f.registered(2, "bob");
        f.state.dispatch(alice, "JOIN #dev");
        f.state.dispatch(bob, "JOIN #dev");
        f.state.dispatch(bob, "AWAY :afk");
        f.output(alice);
        f.output(bob);

        f.state.dispatch(alice, "WHO #dev");
        let out = f.output(alice);
        assert!(out.contains(
            ":irc.test 352 alice #dev alice 10.0.0.1 irc.test alice H@ :0 alice Example\r\n"
        ));
        assert!(out.contains(
            ":irc.test 352 alice #dev bob 10.0.0.2 irc.test bob G :0 bob Example\r\n"
        ));
        assert!(out.ends_with(":irc.test 315 alice #dev :End of /WHO list.\r\n"));

        f.state.dispatch(alice, "WHO #ghost");
        assert_eq!(
            f.output(alice),
            ":irc.test 315 alice #ghost :End of /WHO list.\r\n"
        );
    }

    #[test]
    fn ison_echoes_requested_casing() {
        let mut f = Fixture::new();
        let alice = f.registered(1, "alice");
        let _bob = f.registered(2, "bob");
        f.state.dispatch(alice, "ISON alice BOB ghost");
        assert_eq!(f.output(alice), ":irc.test 303 alice :alice BOB\r\n");
    }

    #[test]
    fn list_shows_channels() {
        let mut f = Fixture::new();
        let alice = f.registered(1, "alice");
        let bob = f.registered(2, "bob");
        f.state.dispatch(alice, "JOIN #dev");
        f.state.dispatch(bob, "JOIN #dev");
        f.state.dispatch(alice, "TOPIC #dev :all things dev");
        f.output(alice);
        f.output(bob);

        f.state.dispatch(alice, "LIST");
        let out = f.output(alice);
        assert!(out.starts_with(":irc.test 321 alice Channel :Users  Name\r\n"));
        assert!(out.contains(":irc.test 322 alice #dev 2 :all things dev\r\n"));
        assert!(out.ends_with(":irc.test 323 alice :End of /LIST\r\n"));
    }

    #[test]
    fn version_and_unknown_command() {
        let mut f = Fixture::new();
        let alice = f.registered(1, "alice");
        f.state.dispatch(alice, "VERSION");
        assert!(f
            .output(alice)
            .contains(&format!("351 alice {}. irc.test :Test", super::SERVER_VERSION)));
        f.state.dispatch(alice, "FROBNICATE a b");
        assert_eq!(
            f.output(alice),
            ":irc.test 421 alice FROBNICATE :Unknown command\r\n"
        );
    }

    #[test]
    fn quit_notifies_peers_once_and_is_idempotent() {
        let mut f = Fixture::new();
        let alice = f.registered(1, "alice");
        let bob = f.registered(2, "bob");
        f.state.dispatch(alice, "JOIN #a");
        f.state.dispatch(alice, "JOIN #b");
        f.state.dispatch(bob, "JOIN #a");
        f.state.dispatch(bob, "JOIN #b");
        f.output(alice);
        f.output(bob);

        f.state.dispatch(alice, "QUIT :gotta go");
        assert_eq!(
            f.output(bob),
            ":alice!alice@10.0.0.1 QUIT :Quit: gotta go\r\n"
        );
        assert!(f.state.users.get(&alice).is_none());
        for chan in f.state.channels.values() {
            assert!(!chan.has_member(alice));
        }

        // teardown again: nothing happens
        f.state.quit(alice, "Quit: again");
        assert_eq!(f.output(bob), "");
        assert_invariants(&f.state);
    }

    #[test]
    fn quit_is_accepted_before_registration() {
        let mut f = Fixture::new();
        let tok = f.add_user(1);
        f.state.dispatch(tok, "QUIT");
        assert!(f.state.users.get(&tok).is_none());
    }

    #[test]
    fn quit_default_reason_is_nickname() {
        let mut f = Fixture::new();
        let alice = f.registered(1, "alice");
        let bob = f.registered(2, "bob");
        f.state.dispatch(alice, "JOIN #a");
        f.state.dispatch(bob, "JOIN #a");
        f.output(alice);
        f.output(bob);
        f.state.dispatch(alice, "QUIT");
        assert_eq!(f.output(bob), ":alice!alice@10.0.0.1 QUIT :Quit: alice\r\n");
    }

    #[test]
    fn sendq_cap_tears_down_slow_consumer() {
        let mut f = Fixture::new();
        let alice = f.registered(1, "alice");
        let bob = f.registered(2, "bob");
        let filler = format!("PRIVMSG bob :{}", "y".repeat(400));
        for _ in 0..200 {
            f.state.dispatch(alice, &filler);
        }
        assert!(f.state.users.get(&bob).unwrap().sendq_exceeded());
        f.state.enforce_sendq();
        assert!(f.state.users.get(&bob).is_none());
        assert!(f.state.users.get(&alice).is_some());
    }
}
