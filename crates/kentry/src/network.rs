//! Catalog of the host's network interfaces.

use std::collections::BTreeSet;

use nix::errno::Errno;
use nix::net::if_::if_nameindex;
use thiserror::Error;

/// Raised when the host's interfaces cannot be listed.
#[derive(Debug, Error)]
#[error("failed to list network interfaces: {source}")]
pub struct InterfaceError {
    #[source]
    source: Errno,
}

/// Names of the interfaces present on the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostInterfaces {
    names: BTreeSet<String>,
}

impl HostInterfaces {
    /// Builds a catalog from explicit names.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether `name` is an interface on this host.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Interface names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

/// Source of the interface catalog.
pub trait InterfaceSource {
    /// Lists the interfaces currently present.
    ///
    /// # Errors
    ///
    /// Returns [`InterfaceError`] when the host cannot be queried.
    fn interfaces(&self) -> Result<HostInterfaces, InterfaceError>;
}

/// Reads the catalog from the kernel with `if_nameindex(3)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemInterfaces;

impl InterfaceSource for SystemInterfaces {
    fn interfaces(&self) -> Result<HostInterfaces, InterfaceError> {
        let listed = if_nameindex().map_err(|source| InterfaceError { source })?;
        Ok(HostInterfaces::from_names(
            listed
                .iter()
                .map(|interface| interface.name().to_string_lossy().into_owned()),
        ))
    }
}

impl InterfaceSource for HostInterfaces {
    fn interfaces(&self) -> Result<HostInterfaces, InterfaceError> {
        Ok(self.clone())
    }
}
