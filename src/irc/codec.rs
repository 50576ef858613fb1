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

/// Remove and return the next LF-terminated line from a recv backlog.
/// The terminator and any surrounding whitespace (including a trailing CR)
/// are stripped; bytes after the LF stay in the buffer for the next call.
/// Returns `None` while no full line has arrived yet.
pub fn take_line(buf: &mut Vec<u8>) -> Option<String> {
    let nl = buf.iter().position(|&chr| chr == b'\n')?;
    let line: Vec<u8> = buf.drain(..=nl).collect();
    let line = String::from_utf8_lossy(&line[..nl]);
    Some(line.trim().to_string())
}

/// Split a line into its arguments. Tokens are separated by single spaces;
/// the first token starting with `:` begins the trailing argument, which
/// swallows the rest of the line with the `:` removed. Argument 0 is the
/// command word.
pub fn parse_line(line: &str) -> Vec<&str> {
    let mut args = Vec::new();
    let mut pos = 0usize;
    for word in line.split(' ') {
        if word.starts_with(':') {
            args.push(&line[pos + 1..]);
            return args;
        }
        args.push(word);
        pos += word.len() + 1;
    }
    args
}

/// Cap a string at `max` bytes without splitting a code point.
pub fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
