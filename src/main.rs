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

mod config;
mod irc;

use std::io;
use std::path::PathBuf;

use config::cmdline::{ParsedArgs, ParsedArgsError};
use config::config_file::{Config, ConfigError};
use irc::net::Reactor;

#[derive(thiserror::Error, Debug)]
enum MainError {
    #[error("")]
    Cmdline(#[from] ParsedArgsError),
    #[error("")]
    InitConfig(#[from] ConfigError),
    #[error("Event Loop IO error.")]
    EvIo(#[from] io::Error),
}

fn main() -> Result<(), MainError> {
    env_logger::init();

    let args = ParsedArgs::new()?;
    let config_path = PathBuf::from(&args.config);
    let config = Config::from_path(&config_path)?;

    let mut reactor = Reactor::bind(config_path, &config)?;
    reactor.run()?;

    Ok(())
}
