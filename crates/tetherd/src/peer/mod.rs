//! Peer descriptors: ordered property bags naming a remote endpoint.

mod host;
mod locator;

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub use host::HostIdentity;
pub use locator::{LocatorError, parse_locator, parse_locator_with};

/// Property naming the transport implementation.
pub const TRANSPORT_NAME: &str = "TransportName";
/// Host name, address or socket path.
pub const HOST: &str = "Host";
/// Port number as decimal text.
pub const PORT: &str = "Port";
/// Human-readable agent name.
pub const NAME: &str = "Name";
/// Operating system description.
pub const OS_NAME: &str = "OSName";
/// Effective user of the agent process.
pub const USER_NAME: &str = "UserName";
/// Identifier unique to one agent process.
pub const AGENT_ID: &str = "AgentID";

/// Ordered set of unique `key -> value` properties.
///
/// Keys keep the position of their first insertion; inserting an existing key
/// replaces its value in place. Serialization emits one JSON string field per
/// property in that order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerDescriptor {
    props: Vec<(String, String)>,
}

impl PeerDescriptor {
    /// Creates an empty descriptor.
    #[must_use]
    pub const fn new() -> Self {
        Self { props: Vec::new() }
    }

    /// Value of `key`, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.props
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    /// Sets `key` to `value`, keeping the key's existing position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.props.iter_mut().find(|(name, _)| *name == key) {
            Some((_, slot)) => *slot = value,
            None => self.props.push((key, value)),
        }
    }

    /// Removes `key`, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.props.iter().position(|(name, _)| name == key)?;
        Some(self.props.remove(index).1)
    }

    /// Properties in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.props
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Number of properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.props.len()
    }

    /// Returns `true` when no properties are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }

    /// `TransportName` property.
    #[must_use]
    pub fn transport_name(&self) -> Option<&str> {
        self.get(TRANSPORT_NAME)
    }

    /// `Host` property.
    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.get(HOST)
    }

    /// `Port` property.
    #[must_use]
    pub fn port(&self) -> Option<&str> {
        self.get(PORT)
    }

    /// Compact JSON object with one string field per property.
    #[must_use]
    pub fn to_json(&self) -> String {
        let mut out = String::from("{");
        for (index, (name, value)) in self.props.iter().enumerate() {
            if index > 0 {
                out.push(',');
            }
            push_json_string(&mut out, name);
            out.push(':');
            push_json_string(&mut out, value);
        }
        out.push('}');
        out
    }
}

fn push_json_string(out: &mut String, text: &str) {
    match serde_json::to_string(text) {
        Ok(quoted) => out.push_str(&quoted),
        Err(_) => out.push_str("\"\""),
    }
}

impl fmt::Display for PeerDescriptor {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.to_json())
    }
}

impl<K, V> FromIterator<(K, V)> for PeerDescriptor
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut peer = Self::new();
        for (key, value) in iter {
            peer.insert(key, value);
        }
        peer
    }
}

impl Serialize for PeerDescriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.props.len()))?;
        for (name, value) in &self.props {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

struct PeerVisitor;

impl<'de> Visitor<'de> for PeerVisitor {
    type Value = PeerDescriptor;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a flat object of string properties")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut peer = PeerDescriptor::new();
        while let Some((key, value)) = access.next_entry::<String, String>()? {
            peer.insert(key, value);
        }
        Ok(peer)
    }
}

impl<'de> Deserialize<'de> for PeerDescriptor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(PeerVisitor)
    }
}
