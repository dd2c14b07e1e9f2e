//! Process arguments passed by the host when it launches an extension.

use crate::error::{ExtError, Result};

/// Default control-channel port of the host.
pub const DEFAULT_PORT: u16 = 9092;

/// Environment variable overriding the host address to connect to.
pub const HOST_ENV_VAR: &str = "TETHER_HOST";

/// Arguments the host passes on the extension command line:
/// `-p <port>`, `-c <cookie>` and `-f <filename>`.
#[derive(Debug, Clone)]
pub struct ExtArgs {
    pub port: u16,
    pub cookie: Option<String>,
    pub filename: Option<String>,
    pub host: String,
}

impl Default for ExtArgs {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            cookie: None,
            filename: None,
            host: "127.0.0.1".to_owned(),
        }
    }
}

impl ExtArgs {
    /// Parses the known flags out of an argument list. Unrecognized
    /// arguments are ignored so extensions can define their own.
    pub fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut out = Self::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-p" => {
                    let value = args.next().ok_or(ExtError::MissingArgValue("-p"))?;
                    out.port = value
                        .parse()
                        .map_err(|_| ExtError::InvalidArgValue { flag: "-p", value })?;
                }
                "-c" => out.cookie = Some(args.next().ok_or(ExtError::MissingArgValue("-c"))?),
                "-f" => out.filename = Some(args.next().ok_or(ExtError::MissingArgValue("-f"))?),
                _ => {}
            }
        }
        Ok(out)
    }

    /// Parses the process arguments and applies the host environment
    /// override.
    pub fn from_env() -> Result<Self> {
        let mut args = Self::parse(std::env::args().skip(1))?;
        if let Ok(host) = std::env::var(HOST_ENV_VAR) {
            args.host = host;
        }
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_args(s: &[&str]) -> Vec<String> {
        s.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_defaults() {
        let args = ExtArgs::parse(to_args(&[])).unwrap();
        assert_eq!(args.port, 9092);
        assert!(args.cookie.is_none());
        assert!(args.filename.is_none());
    }

    #[test]
    fn test_all_flags() {
        let args =
            ExtArgs::parse(to_args(&["-p", "9000", "-c", "secret", "-f", "ext.exe"])).unwrap();
        assert_eq!(args.port, 9000);
        assert_eq!(args.cookie.as_deref(), Some("secret"));
        assert_eq!(args.filename.as_deref(), Some("ext.exe"));
    }

    #[test]
    fn test_unknown_flags_ignored() {
        let args = ExtArgs::parse(to_args(&["--verbose", "-p", "9001"])).unwrap();
        assert_eq!(args.port, 9001);
    }

    #[test]
    fn test_invalid_port() {
        assert!(matches!(
            ExtArgs::parse(to_args(&["-p", "nope"])),
            Err(ExtError::InvalidArgValue { flag: "-p", .. })
        ));
    }
}
