//! Runtime configuration.
//!
//! Everything the request handlers consult lives in one [`Config`] value
//! built at startup and threaded through router state; nothing is read
//! from globals. The command line mirrors the traditional invocation:
//! an optional port and an optional comma-separated suffix list, with
//! the rest behind flags.

use std::path::PathBuf;

use clap::Parser;

use crate::listing::STANDARD_AUDIO_FORMATS;

pub const DEFAULT_PORT: u16 = 12345;

/// Command-line arguments.
///
/// ```text
/// musicshare [port] [comma-separated-suffixes] [--root DIR] ...
/// ```
#[derive(Debug, Parser)]
#[command(name = "musicshare", version, about = "Share a directory of music files over HTTP")]
pub struct Args {
    /// Port to listen on
    #[arg(default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Comma-separated audio filename suffixes to recognize
    #[arg(value_delimiter = ',')]
    pub formats: Vec<String>,

    /// Directory to share
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Directory holding the player's own static assets; built-in assets
    /// are used when unset
    #[arg(long)]
    pub static_root: Option<PathBuf>,

    /// Ignore Range headers and always serve full files
    #[arg(long)]
    pub no_ranges: bool,

    /// Mirror log messages into the player page (for mobile-browser
    /// debugging)
    #[arg(long)]
    pub client_debug: bool,
}

/// Resolved configuration consulted by the request handlers.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub root: PathBuf,
    pub audio_formats: Vec<String>,
    pub range_support: bool,
    pub static_asset_root: Option<PathBuf>,
    pub client_debug: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            port: DEFAULT_PORT,
            root: PathBuf::from("."),
            audio_formats: STANDARD_AUDIO_FORMATS.iter().map(|s| s.to_string()).collect(),
            range_support: true,
            static_asset_root: None,
            client_debug: false,
        }
    }
}

impl From<Args> for Config {
    fn from(args: Args) -> Config {
        let audio_formats = if args.formats.is_empty() {
            STANDARD_AUDIO_FORMATS.iter().map(|s| s.to_string()).collect()
        } else {
            // suffix matching assumes lower case
            args.formats.iter().map(|f| f.to_lowercase()).collect()
        };
        Config {
            port: args.port,
            root: args.root,
            audio_formats,
            range_support: !args.no_ranges,
            static_asset_root: args.static_root,
            client_debug: args.client_debug,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Args, Config, DEFAULT_PORT};

    #[test]
    fn defaults_match_the_traditional_invocation() {
        let config = Config::from(Args::try_parse_from(["musicshare"]).unwrap());
        assert_eq!(DEFAULT_PORT, config.port);
        assert!(config.range_support);
        assert!(config.audio_formats.iter().any(|f| f == "mp3"));
    }

    #[test]
    fn positional_port_and_suffix_list() {
        let config =
            Config::from(Args::try_parse_from(["musicshare", "8080", "MP3,Opus"]).unwrap());
        assert_eq!(8080, config.port);
        assert_eq!(vec!["mp3".to_string(), "opus".to_string()], config.audio_formats);
    }

    #[test]
    fn no_ranges_flag_disables_range_support() {
        let config = Config::from(Args::try_parse_from(["musicshare", "--no-ranges"]).unwrap());
        assert!(!config.range_support);
    }
}
