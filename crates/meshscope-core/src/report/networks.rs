//! Networks the monitored hosts consider local.

use std::net::IpAddr;
use std::str::FromStr;

use ipnetwork::IpNetwork;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Networks(Vec<IpNetwork>);

impl Networks {
    /// Parse a whitespace separated CIDR list. Malformed entries are skipped.
    pub fn parse(list: &str) -> Self {
        let mut nets = Networks::default();
        nets.extend_from(list);
        nets
    }

    pub fn extend_from(&mut self, list: &str) {
        for cidr in list.split_whitespace() {
            match IpNetwork::from_str(cidr) {
                Ok(net) if !self.0.contains(&net) => self.0.push(net),
                Ok(_) => {}
                Err(e) => log::debug!("ignoring local network {cidr:?}: {e}"),
            }
        }
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        self.0.iter().any(|net| net.contains(ip))
    }

    /// Whether `addr` parses as an IP outside every local network.
    /// Unparseable addresses are never treated as external.
    pub fn is_external(&self, addr: &str) -> bool {
        match IpAddr::from_str(addr) {
            Ok(ip) => !self.contains(ip),
            Err(_) => false,
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
