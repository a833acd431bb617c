//! Configuration record (spec §6). Parsing a config file, CLI flags, or
//! any other external representation is explicitly out of scope (spec §1
//! Non-goals) — this module only defines the plain-data record an external
//! collaborator populates and hands to [`crate::node::Node`].

use serde::Deserialize;
use std::time::Duration;

fn default_port() -> u16 {
    3868
}

fn default_tls_port() -> u16 {
    3869
}

fn default_sctp_streams() -> u32 {
    30
}

fn default_tc() -> Duration {
    Duration::from_secs(30)
}

fn default_tw() -> Duration {
    Duration::from_secs(30)
}

fn default_dispatch_threads() -> usize {
    4
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocalApplication {
    pub application_id: u32,
    pub vendor_id: Option<u32>,
    pub auth: bool,
    pub acct: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransportFlags {
    #[serde(default)]
    pub no_ip4: bool,
    #[serde(default)]
    pub no_ip6: bool,
    #[serde(default)]
    pub no_tcp: bool,
    #[serde(default)]
    pub no_sctp: bool,
    #[serde(default)]
    pub no_fwd: bool,
    #[serde(default)]
    pub prefer_tcp: bool,
    #[serde(default)]
    pub tls_inband: bool,
}

impl Default for TransportFlags {
    fn default() -> TransportFlags {
        TransportFlags {
            no_ip4: false,
            no_ip6: false,
            no_tcp: false,
            no_sctp: true, // SCTP transport is not implemented; see DESIGN.md.
            no_fwd: false,
            prefer_tcp: true,
            tls_inband: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TlsConfig {
    pub cert_file: Option<String>,
    pub key_file: Option<String>,
    pub ca_file: Option<String>,
    pub crl_file: Option<String>,
    pub priority: Option<String>,
    pub dh_bits: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub diameter_id: String,
    #[serde(default)]
    pub realm: Option<String>,

    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_tls_port")]
    pub tls_port: u16,
    #[serde(default = "default_sctp_streams")]
    pub sctp_streams: u32,

    #[serde(default)]
    pub endpoints: Vec<String>,
    #[serde(default)]
    pub local_applications: Vec<LocalApplication>,
    #[serde(default)]
    pub flags: TransportFlags,

    #[serde(default = "default_tc")]
    pub tc: Duration,
    #[serde(default = "default_tw")]
    pub tw: Duration,

    #[serde(default)]
    pub tls: TlsConfig,

    #[serde(default)]
    pub origin_state_id: Option<u32>,

    #[serde(default = "default_dispatch_threads")]
    pub dispatch_threads: usize,
}

impl Config {
    /// Realm defaults to the dotted suffix of `diameter_id` when absent
    /// (spec §6: "Realm derived from Id if absent").
    pub fn realm(&self) -> String {
        self.realm.clone().unwrap_or_else(|| {
            self.diameter_id
                .split_once('.')
                .map(|(_, suffix)| suffix.to_string())
                .unwrap_or_else(|| self.diameter_id.clone())
        })
    }

    pub fn new(diameter_id: &str) -> Config {
        Config {
            diameter_id: diameter_id.to_string(),
            realm: None,
            port: default_port(),
            tls_port: default_tls_port(),
            sctp_streams: default_sctp_streams(),
            endpoints: Vec::new(),
            local_applications: Vec::new(),
            flags: TransportFlags::default(),
            tc: default_tc(),
            tw: default_tw(),
            tls: TlsConfig::default(),
            origin_state_id: None,
            dispatch_threads: default_dispatch_threads(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_realm_derived_from_diameter_id() {
        let config = Config::new("node1.example.com");
        assert_eq!(config.realm(), "example.com");
    }

    #[test]
    fn test_realm_explicit_overrides_derivation() {
        let mut config = Config::new("node1.example.com");
        config.realm = Some("other.net".into());
        assert_eq!(config.realm(), "other.net");
    }
}
