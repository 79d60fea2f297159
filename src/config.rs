//! Node configuration (§6.5): `{hostname, port, log-file-path, store-dir}`,
//! the server list and striping parameters, and NIC-selection hints.
//!
//! Grounded in the original's `newconfig.{h,cpp}`: a bespoke line-oriented
//! key/value-plus-table format, not flex/bison as the original parses it
//! (out of scope for behavioral spec per spec.md §1, "the configuration
//! parser" is an external collaborator) but concrete enough to boot a node
//! from a file on disk. Deliberately simpler than the original's grammar:
//! one directive per line, `#` comments, blank lines ignored.
//!
//! ```text
//! hostname node-a.internal
//! port 12121
//! log-file-path /var/lib/gaiadb/wal.log
//! store-dir /var/lib/gaiadb/store
//! nservers 3
//! stripe-method 0
//! stripe-parm 1
//! preferred-ip 10.0.0.1
//! preferred-ip-mask 255.255.255.0
//! server 0 node-a.internal 12121
//! server 1 node-b.internal 12121
//! server 2 node-c.internal 12121
//! ```

use gaia_core::{Error, Result};
use std::collections::BTreeMap;
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

/// One entry of the §6.5 server list: `server-number -> (hostname, port)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEntry {
    /// Hostname or IP literal.
    pub hostname: String,
    /// TCP port the peer's `gaia-net` listener is bound to.
    pub port: u16,
}

/// A fully parsed and checked node configuration (§6.5).
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// This node's own advertised hostname.
    pub hostname: String,
    /// Port this node's RPC listener binds.
    pub port: u16,
    /// Path to this node's WAL file.
    pub log_file_path: PathBuf,
    /// Directory holding this node's per-COid disk checkpoints.
    pub store_dir: PathBuf,
    /// `server-number -> (hostname, port)` for every peer, including self.
    pub servers: BTreeMap<u32, ServerEntry>,
    /// Expected size of `servers` (§6.5 `Nservers`); `check` fails if the
    /// table doesn't have exactly this many entries.
    pub nservers: u32,
    /// Method used to stripe COids across servers (opaque to the core;
    /// consumed by the external B-tree index layer per spec.md §1).
    pub stripe_method: i32,
    /// Parameter for `stripe_method`.
    pub stripe_parm: i32,
    /// Preferred IP for NIC selection when a hostname resolves to several
    /// addresses.
    pub preferred_ip: Option<Ipv4Addr>,
    /// Netmask paired with `preferred_ip`.
    pub preferred_ip_mask: Option<Ipv4Addr>,
}

impl NodeConfig {
    /// Parses and validates the config file at `path` (§6.5). Returns
    /// `Error::Config` on any malformed or incomplete directive, mirroring
    /// the original's `ConfigState::ParseConfig` + `check()` combination
    /// (parse, then cross-check completeness) collapsed into one call.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot open {}: {e}", path.display())))?;
        Self::parse(&text)
    }

    /// Parses `text` as a node configuration (split out from [`Self::load`]
    /// for unit testing without touching the filesystem).
    pub fn parse(text: &str) -> Result<Self> {
        let mut hostname = None;
        let mut port = None;
        let mut log_file_path = None;
        let mut store_dir = None;
        let mut servers = BTreeMap::new();
        let mut nservers = None;
        let mut stripe_method = None;
        let mut stripe_parm = None;
        let mut preferred_ip = None;
        let mut preferred_ip_mask = None;

        for (lineno, raw_line) in text.lines().enumerate() {
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.split_whitespace();
            let directive = parts.next().unwrap();
            let rest: Vec<&str> = parts.collect();
            let bad = |what: &str| Error::Config(format!("line {}: {what}", lineno + 1));

            match directive {
                "hostname" => hostname = Some(one_arg(&rest, lineno, "hostname")?.to_string()),
                "port" => port = Some(parse_port(&rest, lineno)?),
                "log-file-path" => log_file_path = Some(PathBuf::from(one_arg(&rest, lineno, "log-file-path")?)),
                "store-dir" => store_dir = Some(PathBuf::from(one_arg(&rest, lineno, "store-dir")?)),
                "nservers" => {
                    nservers = Some(one_arg(&rest, lineno, "nservers")?.parse::<u32>().map_err(|_| bad("nservers must be an integer"))?)
                }
                "stripe-method" => {
                    stripe_method = Some(one_arg(&rest, lineno, "stripe-method")?.parse::<i32>().map_err(|_| bad("stripe-method must be an integer"))?)
                }
                "stripe-parm" => {
                    stripe_parm = Some(one_arg(&rest, lineno, "stripe-parm")?.parse::<i32>().map_err(|_| bad("stripe-parm must be an integer"))?)
                }
                "preferred-ip" => {
                    preferred_ip = Some(one_arg(&rest, lineno, "preferred-ip")?.parse::<Ipv4Addr>().map_err(|_| bad("preferred-ip must be a dotted IPv4 address"))?)
                }
                "preferred-ip-mask" => {
                    preferred_ip_mask = Some(one_arg(&rest, lineno, "preferred-ip-mask")?.parse::<Ipv4Addr>().map_err(|_| bad("preferred-ip-mask must be a dotted IPv4 address"))?)
                }
                "server" => {
                    if rest.len() != 3 {
                        return Err(bad("server directive needs <number> <hostname> <port>"));
                    }
                    let number: u32 = rest[0].parse().map_err(|_| bad("server number must be an integer"))?;
                    let port: u16 = rest[2].parse().map_err(|_| bad("server port must be an integer"))?;
                    if servers.insert(number, ServerEntry { hostname: rest[1].to_string(), port }).is_some() {
                        return Err(bad(&format!("repeated server entry for server {number}")));
                    }
                }
                other => return Err(bad(&format!("unknown configuration directive '{other}'"))),
            }
        }

        let nservers = nservers.ok_or_else(|| Error::Config("missing nservers directive".into()))?;
        let stripe_method = stripe_method.ok_or_else(|| Error::Config("missing stripe-method directive".into()))?;
        let stripe_parm = stripe_parm.ok_or_else(|| Error::Config("missing stripe-parm directive".into()))?;

        let config = NodeConfig {
            hostname: hostname.ok_or_else(|| Error::Config("missing hostname directive".into()))?,
            port: port.ok_or_else(|| Error::Config("missing port directive".into()))?,
            log_file_path: log_file_path.ok_or_else(|| Error::Config("missing log-file-path directive".into()))?,
            store_dir: store_dir.ok_or_else(|| Error::Config("missing store-dir directive".into()))?,
            servers,
            nservers,
            stripe_method,
            stripe_parm,
            preferred_ip,
            preferred_ip_mask,
        };
        config.check()?;
        Ok(config)
    }

    /// Cross-checks completeness, mirroring `ConfigState::check()`: every
    /// server number in `0..nservers` must have an entry.
    fn check(&self) -> Result<()> {
        for server in 0..self.nservers {
            if !self.servers.contains_key(&server) {
                return Err(Error::Config(format!("missing information for server {server}")));
            }
        }
        Ok(())
    }

    /// This node's own `(hostname, port)` bind address as a string suitable
    /// for `TcpListener::bind`.
    pub fn bind_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

fn one_arg<'a>(rest: &[&'a str], lineno: usize, directive: &str) -> Result<&'a str> {
    match rest {
        [single] => Ok(single),
        _ => Err(Error::Config(format!("line {}: {directive} takes exactly one argument", lineno + 1))),
    }
}

fn parse_port(rest: &[&str], lineno: usize) -> Result<u16> {
    one_arg(rest, lineno, "port")?
        .parse::<u16>()
        .map_err(|_| Error::Config(format!("line {}: port must be a 16-bit integer", lineno + 1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = "
        hostname node-a
        port 12121
        log-file-path /tmp/gaiadb/wal.log
        store-dir /tmp/gaiadb/store
        nservers 1
        stripe-method 0
        stripe-parm 1
        server 0 node-a 12121
    ";

    #[test]
    fn parses_a_minimal_single_node_config() {
        let cfg = NodeConfig::parse(MINIMAL).unwrap();
        assert_eq!(cfg.hostname, "node-a");
        assert_eq!(cfg.port, 12121);
        assert_eq!(cfg.servers.len(), 1);
        assert_eq!(cfg.servers[&0].port, 12121);
    }

    #[test]
    fn missing_server_entry_is_rejected() {
        let text = "
            hostname node-a
            port 12121
            log-file-path /tmp/wal.log
            store-dir /tmp/store
            nservers 2
            stripe-method 0
            stripe-parm 1
            server 0 node-a 12121
        ";
        let err = NodeConfig::parse(text).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn unknown_directive_is_rejected() {
        let text = format!("{MINIMAL}\nbogus-directive 1\n");
        assert!(NodeConfig::parse(&text).is_err());
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let text = format!("# a comment\n\n{MINIMAL}\n# trailing comment\n");
        assert!(NodeConfig::parse(&text).is_ok());
    }

    #[test]
    fn repeated_server_number_is_rejected() {
        let text = format!("{MINIMAL}\nserver 0 node-a 12122\n");
        let err = NodeConfig::parse(&text).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn preferred_ip_directives_parse() {
        let text = format!("{MINIMAL}\npreferred-ip 10.0.0.1\npreferred-ip-mask 255.255.255.0\n");
        let cfg = NodeConfig::parse(&text).unwrap();
        assert_eq!(cfg.preferred_ip, Some(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(cfg.preferred_ip_mask, Some(Ipv4Addr::new(255, 255, 255, 0)));
    }
}
