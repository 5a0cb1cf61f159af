//------------ Node Configuration ----------------------------------------------------------
//
// A JSON configuration file naming this node's own id, its link-layer
// interfaces and their initial state, and a hosts table of known peers
// with optional static addressing, mirroring the collaborator traits in
// `collaborators`.

use std::net::Ipv4Addr;

use serde::Deserialize;

use crate::collaborators::{HostConfig, Hosts, Interface, InterfaceState, InterfaceTable};
use crate::errors::ConfigError;
use crate::node_id::NodeId;
use crate::subscriber::InterfaceId;

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    pub node_id: String,
    #[serde(default)]
    pub interfaces: Vec<InterfaceConfig>,
    #[serde(default)]
    pub hosts: Vec<HostEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InterfaceConfig {
    pub name: String,
    #[serde(default = "default_up")]
    pub up: bool,
}

fn default_up() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostEntry {
    pub sid: String,
    #[serde(default)]
    pub interface: Option<String>,
    pub ipv4: Ipv4Addr,
    pub port: u16,
}

impl NodeConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Malformed(e.to_string()))
    }

    pub fn parse_node_id(&self) -> Result<NodeId, ConfigError> {
        parse_sid(&self.node_id)
    }
}

/// Parses a 64-character lowercase-or-uppercase hex node id, as used in
/// both `node_id` and `hosts[].sid` fields of a [`NodeConfig`].
pub fn parse_sid(s: &str) -> Result<NodeId, ConfigError> {
    let s = s.trim();
    if s.len() != 64 {
        return Err(ConfigError::Malformed(format!(
            "node id '{s}' is not 64 hex characters"
        )));
    }
    let mut bytes = [0u8; 32];
    for (i, byte) in bytes.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
            .map_err(|_| ConfigError::Malformed(format!("node id '{s}' contains invalid hex")))?;
    }
    Ok(NodeId::new(bytes))
}

/// An [`InterfaceTable`] seeded from a [`NodeConfig`]'s interface list.
/// State can be flipped afterwards, e.g. by a link-down event, via
/// [`ConfiguredInterfaces::set_state`].
#[derive(Debug, Default)]
pub struct ConfiguredInterfaces {
    interfaces: Vec<Interface>,
}

impl ConfiguredInterfaces {
    pub fn from_config(config: &NodeConfig) -> Self {
        let interfaces = config
            .interfaces
            .iter()
            .map(|c| Interface {
                name: c.name.clone(),
                state: if c.up { InterfaceState::Up } else { InterfaceState::Down },
            })
            .collect();
        ConfiguredInterfaces { interfaces }
    }

    pub fn set_state(&mut self, id: InterfaceId, state: InterfaceState) {
        if let Some(iface) = self.interfaces.get_mut(id.0 as usize) {
            iface.state = state;
        }
    }
}

impl InterfaceTable for ConfiguredInterfaces {
    fn find_by_name(&self, name: &str) -> Option<InterfaceId> {
        self.interfaces
            .iter()
            .position(|i| i.name == name)
            .map(|idx| InterfaceId(idx as u32))
    }

    fn interface(&self, id: InterfaceId) -> Option<&Interface> {
        self.interfaces.get(id.0 as usize)
    }
}

/// A [`Hosts`] table seeded from a [`NodeConfig`]'s hosts list.
#[derive(Debug, Default)]
pub struct ConfiguredHosts {
    entries: Vec<(NodeId, HostConfig)>,
}

impl ConfiguredHosts {
    pub fn from_config(config: &NodeConfig) -> Result<Self, ConfigError> {
        let mut entries = Vec::with_capacity(config.hosts.len());
        for h in &config.hosts {
            let sid = parse_sid(&h.sid)?;
            entries.push((
                sid,
                HostConfig {
                    interface_name: h.interface.clone(),
                    ipv4: h.ipv4,
                    port: h.port,
                },
            ));
        }
        Ok(ConfiguredHosts { entries })
    }

    /// Checks that every host record names an interface that actually
    /// exists, so a typo in the config surfaces at load time rather than
    /// silently dropping a probe later.
    pub fn validate(&self, interfaces: &dyn InterfaceTable) -> Result<(), ConfigError> {
        for (_, host) in &self.entries {
            if let Some(name) = &host.interface_name {
                if interfaces.find_by_name(name).is_none() {
                    return Err(ConfigError::UnknownInterface(name.clone()));
                }
            }
        }
        Ok(())
    }
}

impl Hosts for ConfiguredHosts {
    fn lookup(&self, sid: &NodeId) -> Option<HostConfig> {
        self.entries.iter().find(|(k, _)| k == sid).map(|(_, v)| v.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_wrong_length_is_malformed() {
        let text = r#"
        {
            "node_id": "10ab00",
            "interfaces": [],
            "hosts": []
        }
        "#;
        let err = NodeConfig::from_json(text).unwrap().parse_node_id().unwrap_err();
        assert!(matches!(err, ConfigError::Malformed(_)));
    }

    #[test]
    fn parses_interfaces_and_hosts() {
        let text = r#"
        {
            "node_id": "10ab000000000000000000000000000000000000000000000000000000000a",
            "interfaces": [
                {"name": "wifi0", "up": true},
                {"name": "wifi1", "up": false}
            ],
            "hosts": [
                {"sid": "20ab000000000000000000000000000000000000000000000000000000000a", "interface": "wifi0", "ipv4": "10.0.0.5", "port": 4110}
            ]
        }
        "#;
        let config = NodeConfig::from_json(text).unwrap();
        assert_eq!(config.node_id.len(), 64);
        let node_id = config.parse_node_id().unwrap();
        assert_eq!(node_id.as_bytes()[0], 0x10);

        let interfaces = ConfiguredInterfaces::from_config(&config);
        let wifi0 = interfaces.find_by_name("wifi0").unwrap();
        assert_eq!(interfaces.interface(wifi0).unwrap().state, InterfaceState::Up);
        let wifi1 = interfaces.find_by_name("wifi1").unwrap();
        assert_eq!(interfaces.interface(wifi1).unwrap().state, InterfaceState::Down);

        let hosts = ConfiguredHosts::from_config(&config).unwrap();
        hosts.validate(&interfaces).unwrap();
        let mut sid_bytes = [0u8; 32];
        sid_bytes[0] = 0x20;
        sid_bytes[1] = 0xab;
        sid_bytes[31] = 0x0a;
        let host = hosts.lookup(&NodeId::new(sid_bytes)).unwrap();
        assert_eq!(host.port, 4110);
    }

    #[test]
    fn validate_rejects_unknown_interface() {
        let text = r#"
        {
            "node_id": "10ab000000000000000000000000000000000000000000000000000000000a",
            "interfaces": [],
            "hosts": [
                {"sid": "20ab000000000000000000000000000000000000000000000000000000000a", "interface": "ghost0", "ipv4": "10.0.0.5", "port": 4110}
            ]
        }
        "#;
        let config = NodeConfig::from_json(text).unwrap();
        let interfaces = ConfiguredInterfaces::from_config(&config);
        let hosts = ConfiguredHosts::from_config(&config).unwrap();
        let err = hosts.validate(&interfaces).unwrap_err();
        assert_eq!(err, ConfigError::UnknownInterface("ghost0".into()));
    }
}
