//! Command-line interface

use std::path::PathBuf;

use clap::Parser;

/// Registrant portal backend - eID login brokering and registry API gateway
#[derive(Parser, Debug)]
#[command(name = "registrant-portal")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "PORTAL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "PORTAL_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "PORTAL_HOST")]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "PORTAL_LOG_LEVEL")]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "PORTAL_LOG_FORMAT")]
    pub log_format: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_overrides() {
        let cli = Cli::parse_from(["registrant-portal", "--port", "8080", "--host", "0.0.0.0"]);
        assert_eq!(cli.port, Some(8080));
        assert_eq!(cli.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(cli.log_level, "info");
    }
}
