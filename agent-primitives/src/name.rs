//! Qualified tool names.
//!
//! A qualified name encodes where a tool comes from (`core.read_file`,
//! `custom.get_weather`, `mcp.github.create_issue`) so that capability sources
//! cannot collide inside one registry. Bare names (`read_file`) are accepted for
//! legacy callers and resolve through the base-name index.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Maximum length of a custom tool name.
pub const MAX_CUSTOM_NAME_LEN: usize = 100;

const MAX_SEGMENT_LEN: usize = 128;
const SEPARATOR: char = '.';

/// Provenance prefix of a qualified tool name.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolNamespace {
    /// Tools shipped with the runtime.
    Core,
    /// User or model authored tools executed in the sandbox.
    Custom,
    /// Tools contributed by an installed plugin.
    Plugin,
    /// Tools contributed by an extension package.
    Extension,
    /// Tools bridged from an external protocol server.
    Mcp,
}

impl ToolNamespace {
    /// All namespaces ordered by resolution precedence.
    pub const ALL: [Self; 5] = [
        Self::Core,
        Self::Custom,
        Self::Plugin,
        Self::Extension,
        Self::Mcp,
    ];

    /// Returns the string prefix used in qualified names.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Custom => "custom",
            Self::Plugin => "plugin",
            Self::Extension => "ext",
            Self::Mcp => "mcp",
        }
    }

    /// Parses a prefix back into a namespace.
    #[must_use]
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ns| ns.prefix() == prefix)
    }

    /// Returns `true` when names in this namespace may carry a provider segment.
    #[must_use]
    pub const fn takes_provider(self) -> bool {
        matches!(self, Self::Plugin | Self::Extension | Self::Mcp)
    }
}

/// Tool name composed of an optional namespace, optional provider and a base name.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QualifiedName {
    namespace: Option<ToolNamespace>,
    provider: Option<String>,
    base: String,
}

impl QualifiedName {
    /// Creates an unqualified name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidToolName`] if the base name is not a valid segment.
    pub fn bare(base: impl Into<String>) -> Result<Self> {
        let base = base.into();
        validate_segment(&base, &base)?;
        Ok(Self {
            namespace: None,
            provider: None,
            base,
        })
    }

    /// Creates a name in the supplied namespace without a provider segment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidToolName`] if the base name is not a valid segment.
    pub fn new(namespace: ToolNamespace, base: impl Into<String>) -> Result<Self> {
        let base = base.into();
        validate_segment(&base, &base)?;
        Ok(Self {
            namespace: Some(namespace),
            provider: None,
            base,
        })
    }

    /// Creates a name for a tool owned by a specific provider.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidToolName`] if the namespace does not accept a
    /// provider or either segment is invalid.
    pub fn with_provider(
        namespace: ToolNamespace,
        provider: impl Into<String>,
        base: impl Into<String>,
    ) -> Result<Self> {
        let provider = provider.into();
        let base = base.into();
        let full = format!("{}.{provider}.{base}", namespace.prefix());
        if !namespace.takes_provider() {
            return Err(Error::InvalidToolName {
                name: full,
                reason: format!("namespace `{}` has no provider segment", namespace.prefix()),
            });
        }
        validate_segment(&full, &provider)?;
        validate_segment(&full, &base)?;
        Ok(Self {
            namespace: Some(namespace),
            provider: Some(provider),
            base,
        })
    }

    /// Shorthand for a built-in tool name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidToolName`] if the base name is invalid.
    pub fn core(base: impl Into<String>) -> Result<Self> {
        Self::new(ToolNamespace::Core, base)
    }

    /// Shorthand for a custom tool name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidToolName`] if the base name is invalid.
    pub fn custom(base: impl Into<String>) -> Result<Self> {
        Self::new(ToolNamespace::Custom, base)
    }

    /// Parses a full name such as `mcp.github.create_issue`.
    ///
    /// Strings whose first segment is not a known namespace prefix are treated
    /// as bare names and must therefore not contain a separator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidToolName`] for malformed names.
    pub fn parse(raw: &str) -> Result<Self> {
        let segments: Vec<&str> = raw.split(SEPARATOR).collect();
        let namespace = segments.first().copied().and_then(ToolNamespace::from_prefix);

        match (namespace, segments.as_slice()) {
            (_, [base]) => Self::bare(*base),
            (Some(ns), [_, base]) => Self::new(ns, *base),
            (Some(ns), [_, provider, base]) if ns.takes_provider() => {
                Self::with_provider(ns, *provider, *base)
            }
            _ => Err(Error::InvalidToolName {
                name: raw.to_owned(),
                reason: "expected `base`, `namespace.base` or `namespace.provider.base`".into(),
            }),
        }
    }

    /// Returns the namespace, if the name is qualified.
    #[must_use]
    pub const fn namespace(&self) -> Option<ToolNamespace> {
        self.namespace
    }

    /// Returns the owning provider segment, if any.
    #[must_use]
    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    /// Returns the base name with provenance stripped.
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Returns `true` when the name carries a namespace prefix.
    #[must_use]
    pub const fn is_qualified(&self) -> bool {
        self.namespace.is_some()
    }
}

impl Display for QualifiedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(ns) = self.namespace {
            write!(f, "{}{SEPARATOR}", ns.prefix())?;
        }
        if let Some(provider) = &self.provider {
            write!(f, "{provider}{SEPARATOR}")?;
        }
        f.write_str(&self.base)
    }
}

impl FromStr for QualifiedName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for QualifiedName {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<QualifiedName> for String {
    fn from(value: QualifiedName) -> Self {
        value.to_string()
    }
}

fn validate_segment(full: &str, segment: &str) -> Result<()> {
    let reason = if segment.is_empty() {
        Some("name segments cannot be empty".to_owned())
    } else if segment.len() > MAX_SEGMENT_LEN {
        Some(format!("name segments must be <= {MAX_SEGMENT_LEN} characters"))
    } else if segment
        .chars()
        .any(|c| c == SEPARATOR || c.is_whitespace() || c.is_control())
    {
        Some("name segments cannot contain dots or whitespace".to_owned())
    } else {
        None
    };

    match reason {
        Some(reason) => Err(Error::InvalidToolName {
            name: full.to_owned(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Validates the restricted identifier pattern required of custom tool names.
///
/// # Errors
///
/// Returns [`Error::InvalidToolName`] when the name is empty, longer than
/// [`MAX_CUSTOM_NAME_LEN`], or not made of lowercase letters, digits and
/// underscores starting with a letter.
pub fn validate_custom_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidToolName {
            name: String::new(),
            reason: "name cannot be empty".into(),
        });
    }

    if name.len() > MAX_CUSTOM_NAME_LEN {
        return Err(Error::InvalidToolName {
            name: name.into(),
            reason: format!("name length must be <= {MAX_CUSTOM_NAME_LEN}"),
        });
    }

    let starts_with_letter = name.chars().next().is_some_and(|c| c.is_ascii_lowercase());
    if !starts_with_letter
        || !name
            .chars()
            .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '_'))
    {
        return Err(Error::InvalidToolName {
            name: name.into(),
            reason: "name must use lowercase letters, digits and underscores, starting with a letter"
                .into(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_shape() {
        let bare = QualifiedName::parse("read_file").unwrap();
        assert!(!bare.is_qualified());
        assert_eq!(bare.base(), "read_file");

        let core = QualifiedName::parse("core.read_file").unwrap();
        assert_eq!(core.namespace(), Some(ToolNamespace::Core));
        assert_eq!(core.provider(), None);

        let mcp = QualifiedName::parse("mcp.github.create_issue").unwrap();
        assert_eq!(mcp.namespace(), Some(ToolNamespace::Mcp));
        assert_eq!(mcp.provider(), Some("github"));
        assert_eq!(mcp.base(), "create_issue");
        assert_eq!(mcp.to_string(), "mcp.github.create_issue");
    }

    #[test]
    fn rejects_malformed_names() {
        assert!(QualifiedName::parse("").is_err());
        assert!(QualifiedName::parse("core.").is_err());
        assert!(QualifiedName::parse("custom.a.b").is_err());
        assert!(QualifiedName::parse("unknown.thing").is_err());
        assert!(QualifiedName::with_provider(ToolNamespace::Core, "p", "x").is_err());
    }

    #[test]
    fn serde_uses_display_form() {
        let name = QualifiedName::with_provider(ToolNamespace::Plugin, "weather", "forecast")
            .unwrap();
        let json = serde_json::to_string(&name).unwrap();
        assert_eq!(json, "\"plugin.weather.forecast\"");
        let back: QualifiedName = serde_json::from_str(&json).unwrap();
        assert_eq!(back, name);
    }

    #[test]
    fn custom_names_must_be_lowercase() {
        assert!(validate_custom_name("get_weather").is_ok());
        assert!(validate_custom_name("tool2").is_ok());

        for bad in ["GetWeather", "get-weather", "2fast", "with space", ""] {
            let err = validate_custom_name(bad).expect_err(bad);
            if !bad.is_empty() {
                assert!(err.to_string().contains("lowercase"), "{err}");
            }
        }

        let long = "a".repeat(MAX_CUSTOM_NAME_LEN + 1);
        assert!(validate_custom_name(&long).is_err());
    }
}
