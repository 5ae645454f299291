//! Host target triple.

use std::fmt;

use serde::Serialize;

/// The native compiler's default target, e.g. `x86_64-unknown-linux-gnu`.
///
/// Resolved once per run; every native invocation uses the same value so the
/// `target/<triple>/...` paths written by the compiler match the paths the
/// pipeline later executes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct HostTriple(String);

impl HostTriple {
    pub fn new(triple: impl Into<String>) -> Self {
        HostTriple(triple.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The architecture component (first dash-separated part).
    pub fn arch(&self) -> &str {
        self.0.split('-').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for HostTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for HostTriple {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
