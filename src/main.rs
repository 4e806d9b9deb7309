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

//! `keyvalued` executable entry point. Exit codes: 0 on clean shutdown, 1
//! on any initialisation failure, 2 on a CLI argument error.

use std::process;

use ansi_term::Colour;

use keyvalued::config::Config;
use keyvalued::logger;

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let config = match Config::parse_cli(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            process::exit(2);
        }
    };

    logger::setup_log(&config.log_filter);

    if config.daemonize {
        log::info!("{}", Colour::Blue.paint("starting in daemon mode"));
        let mut daemonize = daemonize::Daemonize::new();
        if let Some(pid_file) = config.pid_file.clone() {
            daemonize = daemonize.pid_file(pid_file);
        }
        if let Err(e) = daemonize.start() {
            log::error!("{}", Colour::Red.paint(format!("daemonization failed: {e}")));
            process::exit(1);
        }
    }

    if let Err(e) = keyvalued::run(config) {
        log::error!("{}", Colour::Red.paint(format!("fatal: {e}")));
        process::exit(1);
    }
}
