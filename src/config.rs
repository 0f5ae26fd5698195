//! Configuration for the chrome-debug MCP server

use std::path::PathBuf;
use clap::Parser;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "chrome-debug")]
#[command(about = "MCP server for browser inspection via the Chrome DevTools Protocol")]
#[command(version)]
pub struct Args {
    /// Host of the browser's remote debugging endpoint
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port of the browser's remote debugging endpoint
    #[arg(long, default_value_t = 9222)]
    pub port: u16,

    /// Directory where extracted binary payloads are written
    #[arg(long, default_value = "cdp-output")]
    pub output_dir: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Log file path (defaults to stderr)
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// Runtime configuration derived from CLI args
#[derive(Debug, Clone)]
pub struct Config {
    /// Remote debugging host
    pub host: String,
    /// Remote debugging port
    pub port: u16,
    /// Output directory for extracted binary payloads
    pub output_dir: PathBuf,
}

impl Config {
    pub fn from_args(args: &Args) -> Self {
        Self {
            host: args.host.clone(),
            port: args.port,
            output_dir: args.output_dir.clone(),
        }
    }

    /// URL of the target directory endpoint (`/json` on the debugging port)
    pub fn discovery_url(&self) -> String {
        format!("http://{}:{}/json", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9222,
            output_dir: PathBuf::from("cdp-output"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9222);
        assert_eq!(config.output_dir, PathBuf::from("cdp-output"));
    }

    #[test]
    fn test_discovery_url() {
        let config = Config::default();
        assert_eq!(config.discovery_url(), "http://127.0.0.1:9222/json");

        let config = Config {
            host: "10.0.0.5".to_string(),
            port: 9333,
            ..Config::default()
        };
        assert_eq!(config.discovery_url(), "http://10.0.0.5:9333/json");
    }

    #[test]
    fn test_config_from_args() {
        let args = Args::parse_from([
            "chrome-debug",
            "--host", "192.168.1.20",
            "--port", "9229",
            "--output-dir", "/tmp/payloads",
        ]);
        let config = Config::from_args(&args);
        assert_eq!(config.host, "192.168.1.20");
        assert_eq!(config.port, 9229);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/payloads"));
    }
}
