//! Identity properties added to every parsed locator.

use nix::sys::utsname::uname;
use nix::unistd::{User, geteuid};
use once_cell::sync::Lazy;
use tether_config::DEFAULT_SERVER_NAME;
use uuid::Uuid;

use super::{AGENT_ID, NAME, OS_NAME, PeerDescriptor, USER_NAME};

static AGENT_UUID: Lazy<String> = Lazy::new(|| Uuid::new_v4().to_string());

/// Default identity properties of this agent process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostIdentity {
    /// Advertised agent name.
    pub name: String,
    /// Operating system description, such as `Linux 6.1.0`.
    pub os_name: String,
    /// Effective user, when it resolves.
    pub user_name: Option<String>,
    /// Identifier generated once per process.
    pub agent_id: String,
}

impl HostIdentity {
    /// Identity of the running process with the default agent name.
    #[must_use]
    pub fn current() -> Self {
        Self::named(DEFAULT_SERVER_NAME)
    }

    /// Identity of the running process advertised as `name`.
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            os_name: os_name(),
            user_name: user_name(),
            agent_id: AGENT_UUID.clone(),
        }
    }

    /// Descriptor holding the default properties in canonical order.
    #[must_use]
    pub fn defaults(&self) -> PeerDescriptor {
        let mut peer = PeerDescriptor::new();
        peer.insert(NAME, self.name.clone());
        peer.insert(OS_NAME, self.os_name.clone());
        if let Some(user) = &self.user_name {
            peer.insert(USER_NAME, user.clone());
        }
        peer.insert(AGENT_ID, self.agent_id.clone());
        peer
    }
}

fn os_name() -> String {
    match uname() {
        Ok(info) => format!(
            "{} {}",
            info.sysname().to_string_lossy(),
            info.release().to_string_lossy()
        ),
        Err(_) => std::env::consts::OS.to_owned(),
    }
}

fn user_name() -> Option<String> {
    User::from_uid(geteuid()).ok().flatten().map(|user| user.name)
}
