//! Virtual IP declarations.

use std::net::IpAddr;

use serde::Serialize;

use super::ValidationError;
use crate::network::HostInterfaces;

/// One virtual address from the command line, written `ADDRESS/PREFIX/IFACE`.
///
/// Serialises with the keys templates expect: `addr`, `mask`, `iface` and
/// `include`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VirtualIpSpec {
    #[serde(rename = "addr")]
    address: IpAddr,
    #[serde(rename = "mask")]
    prefix_length: u8,
    #[serde(rename = "iface")]
    interface: String,
    #[serde(rename = "include")]
    included: bool,
}

impl VirtualIpSpec {
    /// Parses and validates a declaration against the host's interfaces.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MalformedVip`] unless the text has exactly
    /// three `/`-separated segments, and the address, prefix or interface
    /// variants when a segment is invalid.
    pub fn parse(
        spec: &str,
        included: bool,
        interfaces: &HostInterfaces,
    ) -> Result<Self, ValidationError> {
        let mut segments = spec.split('/');
        let (Some(raw_address), Some(raw_prefix), Some(interface), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(ValidationError::MalformedVip {
                spec: spec.to_owned(),
            });
        };

        let address: IpAddr =
            raw_address
                .parse()
                .map_err(|source| ValidationError::InvalidAddress {
                    address: raw_address.to_owned(),
                    source,
                })?;
        let width = if address.is_ipv4() { 32 } else { 128 };
        let prefix_length = raw_prefix
            .parse::<u8>()
            .ok()
            .filter(|length| *length <= width)
            .ok_or_else(|| ValidationError::InvalidPrefix {
                spec: spec.to_owned(),
                prefix: raw_prefix.to_owned(),
            })?;
        if !interfaces.contains(interface) {
            return Err(ValidationError::UnknownInterface {
                name: interface.to_owned(),
            });
        }

        Ok(Self {
            address,
            prefix_length,
            interface: interface.to_owned(),
            included,
        })
    }

    /// The virtual address.
    #[must_use]
    pub const fn address(&self) -> IpAddr {
        self.address
    }

    /// Prefix length of the address.
    #[must_use]
    pub const fn prefix_length(&self) -> u8 {
        self.prefix_length
    }

    /// Interface the address is bound to.
    #[must_use]
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// `true` for `virtual_ipaddress`, `false` for `virtual_ipaddress_excluded`.
    #[must_use]
    pub const fn included(&self) -> bool {
        self.included
    }
}
