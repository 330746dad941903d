//! Capability tags a custom tool may request from the sandbox.

use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Maximum number of permissions a single tool may declare.
pub const MAX_PERMISSIONS: usize = 7;

/// Whitelisted capability tag.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Outbound network requests.
    Network,
    /// Reading or writing files on the host.
    Filesystem,
    /// Access to the persistence layer.
    Database,
    /// Spawning shell commands.
    Shell,
    /// Sending e-mail.
    Email,
    /// Creating scheduled jobs.
    Scheduling,
    /// Access to local devices and host services.
    Local,
}

impl Permission {
    /// Every whitelisted permission.
    pub const ALL: [Self; 7] = [
        Self::Network,
        Self::Filesystem,
        Self::Database,
        Self::Shell,
        Self::Email,
        Self::Scheduling,
        Self::Local,
    ];

    /// Returns the wire tag of the permission.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Filesystem => "filesystem",
            Self::Database => "database",
            Self::Shell => "shell",
            Self::Email => "email",
            Self::Scheduling => "scheduling",
            Self::Local => "local",
        }
    }

    /// Returns `true` when granting this permission requires human approval.
    #[must_use]
    pub const fn is_dangerous(self) -> bool {
        matches!(self, Self::Shell | Self::Filesystem | Self::Local)
    }
}

impl Display for Permission {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|permission| permission.as_str() == s)
            .ok_or_else(|| Error::UnknownPermission { tag: s.to_owned() })
    }
}

/// Ordered, de-duplicated set of permissions.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<Permission>);

impl PermissionSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses every tag, collecting the tags that are not whitelisted.
    ///
    /// # Errors
    ///
    /// Returns the list of rejected tags when any tag is unknown.
    pub fn parse_tags<I, S>(tags: I) -> std::result::Result<Self, Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = BTreeSet::new();
        let mut unknown = Vec::new();
        for tag in tags {
            let tag = tag.as_ref().trim();
            match tag.parse::<Permission>() {
                Ok(permission) => {
                    set.insert(permission);
                }
                Err(_) => unknown.push(tag.to_owned()),
            }
        }

        if unknown.is_empty() {
            Ok(Self(set))
        } else {
            Err(unknown)
        }
    }

    /// Adds a permission, returning `true` if it was not already present.
    pub fn insert(&mut self, permission: Permission) -> bool {
        self.0.insert(permission)
    }

    /// Returns `true` if the permission is present.
    #[must_use]
    pub fn contains(&self, permission: Permission) -> bool {
        self.0.contains(&permission)
    }

    /// Number of distinct permissions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no permission is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the permissions in a stable order.
    pub fn iter(&self) -> impl Iterator<Item = Permission> + '_ {
        self.0.iter().copied()
    }

    /// Returns the permissions classified as dangerous.
    #[must_use]
    pub fn dangerous(&self) -> Vec<Permission> {
        self.iter().filter(|p| p.is_dangerous()).collect()
    }

    /// Returns `true` if any declared permission requires approval.
    #[must_use]
    pub fn has_dangerous(&self) -> bool {
        self.iter().any(Permission::is_dangerous)
    }

    /// Returns the wire tags in order.
    #[must_use]
    pub fn tags(&self) -> Vec<&'static str> {
        self.iter().map(Permission::as_str).collect()
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<T: IntoIterator<Item = Permission>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
