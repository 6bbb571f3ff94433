//! Locator string parsing.
//!
//! Grammar: `[TRANSPORT:]HOST[:PORT][;KEY=VALUE]*`. The transport prefix is a
//! short run of ASCII letters followed by `:` and is stored upper-cased.
//! Values are taken verbatim; there is no escape syntax, so a value cannot
//! contain `;`.

use thiserror::Error;

use super::{HOST, HostIdentity, PORT, PeerDescriptor, TRANSPORT_NAME};

/// Transport prefixes must be shorter than this many letters.
const TRANSPORT_PREFIX_LIMIT: usize = 16;

/// Errors raised while parsing a locator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LocatorError {
    /// A `;`-separated property was empty, had no `=`, or had an empty key.
    #[error("malformed property `{segment}` in locator `{locator}`")]
    MalformedProperty {
        /// Full locator as supplied.
        locator: String,
        /// Offending `;`-separated segment.
        segment: String,
    },
}

/// Parses `locator` using the identity of the running process for defaults.
///
/// # Errors
///
/// Returns [`LocatorError`] when a property segment is malformed; no partial
/// descriptor is produced.
pub fn parse_locator(locator: &str) -> Result<PeerDescriptor, LocatorError> {
    parse_locator_with(locator, &HostIdentity::current())
}

/// Parses `locator`, seeding the descriptor with `identity`'s defaults.
///
/// Defaults come first; explicit properties from the locator replace a
/// default's value without moving it. No `TransportName` is added when the
/// locator has no transport prefix.
///
/// # Errors
///
/// Returns [`LocatorError`] when a property segment is malformed.
pub fn parse_locator_with(
    locator: &str,
    identity: &HostIdentity,
) -> Result<PeerDescriptor, LocatorError> {
    let mut peer = identity.defaults();

    let rest = match split_transport(locator) {
        Some((transport, rest)) => {
            peer.insert(TRANSPORT_NAME, transport.to_ascii_uppercase());
            rest
        }
        None => locator,
    };

    let (address, properties) = match rest.split_once(';') {
        Some((address, properties)) => (address, Some(properties)),
        None => (rest, None),
    };
    let (host, port) = match address.split_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (address, None),
    };
    if !host.is_empty() {
        peer.insert(HOST, host);
    }
    if let Some(port) = port.filter(|port| !port.is_empty()) {
        peer.insert(PORT, port);
    }

    for segment in properties.into_iter().flat_map(|list| list.split(';')) {
        match segment.split_once('=') {
            Some((key, value)) if !key.is_empty() => peer.insert(key, value),
            _ => {
                return Err(LocatorError::MalformedProperty {
                    locator: locator.to_owned(),
                    segment: segment.to_owned(),
                });
            }
        }
    }
    Ok(peer)
}

fn split_transport(locator: &str) -> Option<(&str, &str)> {
    let letters = locator
        .bytes()
        .take_while(u8::is_ascii_alphabetic)
        .count();
    if letters == 0 || letters >= TRANSPORT_PREFIX_LIMIT {
        return None;
    }
    let (prefix, rest) = locator.split_at(letters);
    rest.strip_prefix(':').map(|rest| (prefix, rest))
}
