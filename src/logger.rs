// This file is part of keyvalued.

// keyvalued is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// keyvalued is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with keyvalued.  If not, see <http://www.gnu.org/licenses/>.

//! Structured logging setup: a colourized, timestamped, per-thread
//! `env_logger` formatter installed once at startup.

use ansi_term::Colour;
use env_logger::Builder as LogBuilder;
use std::{env, io::Write, thread};

/// Installs the global logger. Safe to call at most once per process;
/// a second call is a caller bug, not a runtime condition, so it panics
/// via `env_logger`'s own `init` rather than returning a silently-ignored
/// error.
pub fn setup_log(filter: &str) {
    let mut builder = LogBuilder::new();
    builder.filter(None, log::LevelFilter::Info);

    if let Ok(from_env) = env::var("RUST_LOG") {
        builder.parse_filters(&from_env);
    }
    builder.parse_filters(filter);

    let isatty = atty::is(atty::Stream::Stderr);

    builder.format(move |buf, record| {
        let utc_time = chrono::Utc::now();
        let timestamp = utc_time.format("%Y-%m-%d %H:%M:%S%.3f").to_string();
        let name = thread::current()
            .name()
            .map(|n| n.to_string())
            .unwrap_or_default();

        if isatty {
            writeln!(
                buf,
                "{} {} {} {}  {}",
                Colour::Black.bold().paint(timestamp),
                Colour::Blue.bold().paint(name),
                record.level(),
                record.target(),
                record.args()
            )
        } else {
            writeln!(
                buf,
                "{timestamp} {name} {} {}  {}",
                record.level(),
                record.target(),
                record.args()
            )
        }
    });

    builder.init();
}
