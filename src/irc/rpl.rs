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

//! Numeric reply codes, RFC 1459/2812 names.

pub const WELCOME: u16 = 1;
pub const YOURHOST: u16 = 2;
pub const CREATED: u16 = 3;
pub const MYINFO: u16 = 4;
pub const ISUPPORT: u16 = 5;

pub const AWAY: u16 = 301;
pub const ISON: u16 = 303;
pub const UNAWAY: u16 = 305;
pub const NOWAWAY: u16 = 306;
pub const WHOISUSER: u16 = 311;
pub const WHOISSERVER: u16 = 312;
pub const ENDOFWHO: u16 = 315;
pub const WHOISIDLE: u16 = 317;
pub const ENDOFWHOIS: u16 = 318;
pub const WHOISCHANNELS: u16 = 319;
pub const LISTSTART: u16 = 321;
pub const LIST: u16 = 322;
pub const LISTEND: u16 = 323;
pub const CHANNELMODEIS: u16 = 324;
pub const CREATIONTIME: u16 = 329;
pub const NOTOPIC: u16 = 331;
pub const TOPIC: u16 = 332;
pub const TOPICWHOTIME: u16 = 333;
pub const VERSION: u16 = 351;
pub const WHOREPLY: u16 = 352;
pub const NAMREPLY: u16 = 353;
pub const ENDOFNAMES: u16 = 366;
pub const MOTD: u16 = 372;
pub const MOTDSTART: u16 = 375;
pub const ENDOFMOTD: u16 = 376;

pub const ERR_NOSUCHNICK: u16 = 401;
pub const ERR_NOSUCHCHANNEL: u16 = 403;
pub const ERR_CANNOTSENDTOCHAN: u16 = 404;
pub const ERR_NORECIPIENT: u16 = 411;
pub const ERR_NOTEXTTOSEND: u16 = 412;
pub const ERR_UNKNOWNCOMMAND: u16 = 421;
pub const ERR_ERRONEUSNICKNAME: u16 = 432;
pub const ERR_NICKNAMEINUSE: u16 = 433;
pub const ERR_NOTONCHANNEL: u16 = 442;
pub const ERR_NOTREGISTERED: u16 = 451;
pub const ERR_NEEDMOREPARAMS: u16 = 461;
pub const ERR_ALREADYREGISTRED: u16 = 462;
pub const ERR_BADCHANNAME: u16 = 479;
pub const ERR_CHANOPRIVSNEEDED: u16 = 482;
