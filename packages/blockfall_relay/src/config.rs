use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::session::{DEFAULT_SESSION_ID_LEN, MIN_SESSION_ID_LEN};

// =============================================================================
// File config (figment-deserialized from defaults / blockfall.toml / env vars)
// =============================================================================
//
//   blockfall.toml:  [server]
//                    port = 4000
//
//   env var:         BLOCKFALL_SERVER__PORT=4000   (double underscore = nesting)
//                    PORT=4000                     (hosting-platform convention)

pub const DEFAULT_CONFIG_FILE: &str = "blockfall.toml";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub relay: RelayFileConfig,
}

/// Listener and static asset settings (lives under `[server]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: default_static_dir(),
        }
    }
}

/// Relay tunables (lives under `[relay]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayFileConfig {
    #[serde(default = "default_session_id_len")]
    pub session_id_len: usize,
    /// Per-connection outbound queue; a full queue drops envelopes.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
    /// Text frames larger than this are dropped unread.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
}

impl Default for RelayFileConfig {
    fn default() -> Self {
        Self {
            session_id_len: default_session_id_len(),
            outbound_buffer: default_outbound_buffer(),
            max_message_bytes: default_max_message_bytes(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_static_dir() -> PathBuf {
    PathBuf::from("public")
}
fn default_session_id_len() -> usize {
    DEFAULT_SESSION_ID_LEN
}
fn default_outbound_buffer() -> usize {
    256
}
fn default_max_message_bytes() -> usize {
    64 * 1024
}

/// Build a figment that layers: defaults → blockfall.toml → BLOCKFALL_* env vars → PORT.
///
/// `path` replaces the default `blockfall.toml` in the working directory. A
/// missing file is not an error.
pub fn load_config(path: Option<&Path>) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(file))
        .merge(Env::prefixed("BLOCKFALL_").split("__"))
        .merge(Env::raw().only(&["PORT"]).map(|_| "server.port".into()))
}

// =============================================================================
// Runtime config (derived from FileConfig after CLI overrides)
// =============================================================================

#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub bind_addr: SocketAddr,
    pub static_dir: PathBuf,
    pub session_id_len: usize,
    pub outbound_buffer: usize,
    pub max_message_bytes: usize,
}

impl RelayConfig {
    pub fn from_file(fc: &FileConfig) -> Result<Self> {
        let bind_addr = format!("{}:{}", fc.server.host, fc.server.port)
            .parse::<SocketAddr>()
            .with_context(|| {
                format!(
                    "Invalid listen address {}:{}",
                    fc.server.host, fc.server.port
                )
            })?;
        ensure!(
            fc.relay.session_id_len >= MIN_SESSION_ID_LEN,
            "relay.session_id_len must be at least {}, got {}",
            MIN_SESSION_ID_LEN,
            fc.relay.session_id_len
        );
        Ok(Self {
            bind_addr,
            static_dir: fc.server.static_dir.clone(),
            session_id_len: fc.relay.session_id_len,
            outbound_buffer: fc.relay.outbound_buffer.max(1),
            max_message_bytes: fc.relay.max_message_bytes,
        })
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        let fc = FileConfig::default();
        Self {
            bind_addr: ([0, 0, 0, 0], fc.server.port).into(),
            static_dir: fc.server.static_dir,
            session_id_len: fc.relay.session_id_len,
            outbound_buffer: fc.relay.outbound_buffer,
            max_message_bytes: fc.relay.max_message_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    // ── defaults ────────────────────────────────────────────────────────

    #[test]
    fn test_file_config_defaults() {
        let fc = FileConfig::default();
        assert_eq!(fc.server.host, "0.0.0.0");
        assert_eq!(fc.server.port, 3000);
        assert_eq!(fc.server.static_dir, PathBuf::from("public"));
        assert_eq!(fc.relay.session_id_len, 6);
        assert_eq!(fc.relay.outbound_buffer, 256);
        assert_eq!(fc.relay.max_message_bytes, 65536);
    }

    #[test]
    fn test_relay_config_from_defaults() {
        let rc = RelayConfig::from_file(&FileConfig::default()).unwrap();
        assert_eq!(rc.bind_addr, "0.0.0.0:3000".parse().unwrap());
        assert_eq!(rc.session_id_len, 6);
    }

    #[test]
    fn test_relay_config_rejects_bad_host() {
        let mut fc = FileConfig::default();
        fc.server.host = "not a host".into();
        let err = RelayConfig::from_file(&fc).unwrap_err();
        assert!(err.to_string().contains("not a host"));
    }

    #[test]
    fn test_relay_config_rejects_short_session_ids() {
        let mut fc = FileConfig::default();
        fc.relay.session_id_len = 1;
        let err = RelayConfig::from_file(&fc).unwrap_err();
        assert!(err.to_string().contains("session_id_len"));

        fc.relay.session_id_len = MIN_SESSION_ID_LEN;
        let rc = RelayConfig::from_file(&fc).unwrap();
        assert_eq!(rc.session_id_len, MIN_SESSION_ID_LEN);
    }

    // ── layering ────────────────────────────────────────────────────────

    #[test]
    fn test_missing_file_yields_defaults() {
        Jail::expect_with(|_jail| {
            let fc: FileConfig = load_config(None).extract()?;
            assert_eq!(fc.server.port, 3000);
            Ok(())
        });
    }

    #[test]
    fn test_toml_file_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "blockfall.toml",
                r#"
                [server]
                port = 4000
                static_dir = "assets"

                [relay]
                session_id_len = 8
                "#,
            )?;
            let fc: FileConfig = load_config(None).extract()?;
            assert_eq!(fc.server.port, 4000);
            assert_eq!(fc.server.host, "0.0.0.0");
            assert_eq!(fc.server.static_dir, PathBuf::from("assets"));
            assert_eq!(fc.relay.session_id_len, 8);
            assert_eq!(fc.relay.outbound_buffer, 256);
            Ok(())
        });
    }

    #[test]
    fn test_explicit_path() {
        Jail::expect_with(|jail| {
            jail.create_file("custom.toml", "[relay]\noutbound_buffer = 16\n")?;
            let fc: FileConfig = load_config(Some(Path::new("custom.toml"))).extract()?;
            assert_eq!(fc.relay.outbound_buffer, 16);
            Ok(())
        });
    }

    #[test]
    fn test_prefixed_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("blockfall.toml", "[server]\nport = 4000\n")?;
            jail.set_env("BLOCKFALL_SERVER__PORT", "5000");
            jail.set_env("BLOCKFALL_RELAY__MAX_MESSAGE_BYTES", "1024");
            let fc: FileConfig = load_config(None).extract()?;
            assert_eq!(fc.server.port, 5000);
            assert_eq!(fc.relay.max_message_bytes, 1024);
            Ok(())
        });
    }

    #[test]
    fn test_plain_port_env_wins() {
        Jail::expect_with(|jail| {
            jail.set_env("BLOCKFALL_SERVER__PORT", "5000");
            jail.set_env("PORT", "8080");
            let fc: FileConfig = load_config(None).extract()?;
            assert_eq!(fc.server.port, 8080);
            Ok(())
        });
    }
}
