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

//! Startup configuration, assembled from CLI flags with documented
//! defaults, built on `clap`'s derive API.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;

pub const DEFAULT_IMAGE_PATH: &str = "/tmp/keystored.img";
pub const DEFAULT_BLOCK_SIZE: u32 = 4096;
pub const DEFAULT_NUM_BLOCKS: u32 = 16384;
pub const DEFAULT_HASH_BUCKET_COUNT: u32 = 512;
pub const DEFAULT_NUM_WORKERS: usize = 16;
pub const DEFAULT_BIND_IP: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5000;

#[derive(Parser, Debug)]
#[command(name = "keyvalued", about = "persistent, networked key-value store daemon")]
struct Cli {
    /// Address to bind the listen socket to.
    #[arg(default_value = DEFAULT_BIND_IP)]
    bind_ip: IpAddr,

    /// Port to bind the listen socket to.
    #[arg(default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Path to the backing image file.
    #[arg(long = "image", default_value = DEFAULT_IMAGE_PATH)]
    image_path: PathBuf,

    /// Block size in bytes.
    #[arg(long = "block-size", default_value_t = DEFAULT_BLOCK_SIZE)]
    block_size: u32,

    /// Total number of blocks in a freshly created image.
    #[arg(long = "num-blocks", default_value_t = DEFAULT_NUM_BLOCKS)]
    num_blocks: u32,

    /// Number of buckets in the hash directory.
    #[arg(long = "buckets", default_value_t = DEFAULT_HASH_BUCKET_COUNT)]
    hash_bucket_count: u32,

    /// Number of worker threads.
    #[arg(long = "workers", default_value_t = DEFAULT_NUM_WORKERS)]
    num_workers: usize,

    /// Fork into the background after startup succeeds.
    #[arg(long = "daemon")]
    daemonize: bool,

    /// Write the daemonized process's pid to this file.
    #[arg(long = "daemon-pid-file")]
    pid_file: Option<PathBuf>,

    /// `env_logger`-style filter string, e.g. `keyvalued=debug`.
    #[arg(long = "log", default_value = "info")]
    log_filter: String,
}

/// Resolved startup configuration for one daemon instance.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_ip: IpAddr,
    pub port: u16,
    pub image_path: PathBuf,
    pub block_size: u32,
    pub num_blocks: u32,
    pub hash_bucket_count: u32,
    pub num_workers: usize,
    pub daemonize: bool,
    pub pid_file: Option<PathBuf>,
    pub log_filter: String,
}

/// A malformed argument list, reported to the caller as exit code 2.
#[derive(Debug)]
pub struct CliError(pub String);

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for CliError {}

impl Config {
    pub fn parse_cli(args: &[String]) -> Result<Config, CliError> {
        let cli = Cli::try_parse_from(args).map_err(|e| CliError(e.to_string()))?;
        Ok(Config {
            bind_ip: cli.bind_ip,
            port: cli.port,
            image_path: cli.image_path,
            block_size: cli.block_size,
            num_blocks: cli.num_blocks,
            hash_bucket_count: cli.hash_bucket_count,
            num_workers: cli.num_workers,
            daemonize: cli.daemonize,
            pid_file: cli.pid_file,
            log_filter: cli.log_filter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Vec<String> {
        let mut v = vec!["keyvalued".to_string()];
        v.extend(extra.iter().map(|s| s.to_string()));
        v
    }

    #[test]
    fn defaults_match_spec() {
        let config = Config::parse_cli(&args(&[])).unwrap();
        assert_eq!(config.bind_ip, DEFAULT_BIND_IP.parse::<IpAddr>().unwrap());
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.image_path, PathBuf::from(DEFAULT_IMAGE_PATH));
        assert_eq!(config.block_size, DEFAULT_BLOCK_SIZE);
        assert_eq!(config.num_blocks, DEFAULT_NUM_BLOCKS);
        assert_eq!(config.hash_bucket_count, DEFAULT_HASH_BUCKET_COUNT);
        assert_eq!(config.num_workers, DEFAULT_NUM_WORKERS);
        assert!(!config.daemonize);
    }

    #[test]
    fn positional_bind_ip_and_port_are_honored() {
        let config = Config::parse_cli(&args(&["0.0.0.0", "9000"])).unwrap();
        assert_eq!(config.bind_ip, "0.0.0.0".parse::<IpAddr>().unwrap());
        assert_eq!(config.port, 9000);
    }

    #[test]
    fn malformed_port_is_a_cli_error() {
        assert!(Config::parse_cli(&args(&["127.0.0.1", "not-a-port"])).is_err());
    }

    #[test]
    fn flags_override_defaults() {
        let config = Config::parse_cli(&args(&[
            "127.0.0.1",
            "5000",
            "--workers",
            "4",
            "--daemon",
        ]))
        .unwrap();
        assert_eq!(config.num_workers, 4);
        assert!(config.daemonize);
    }
}
