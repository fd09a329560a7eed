//! Ethernet hardware address, formatted the way dnsmasq and the
//! leasefile expect ("unix-expanded": lowercase, colon-separated, no
//! zero-suppression).

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// A 6-byte Ethernet hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddr(pub [u8; 6]);

/// Failure parsing a `MacAddr` from its colon-hex text form.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseMacError {
    /// the string did not split into exactly six colon-separated octets
    #[error("expected 6 colon-separated octets, found {0}")]
    WrongOctetCount(usize),
    /// an octet was not valid hex
    #[error("invalid hex octet: {0:?}")]
    InvalidOctet(String),
}

impl MacAddr {
    /// the six raw octets, in transmission order
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for MacAddr {
    type Err = ParseMacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 6 {
            return Err(ParseMacError::WrongOctetCount(parts.len()));
        }
        let mut octets = [0u8; 6];
        for (slot, part) in octets.iter_mut().zip(parts.iter()) {
            *slot = u8::from_str_radix(part, 16)
                .map_err(|_| ParseMacError::InvalidOctet((*part).to_owned()))?;
        }
        Ok(MacAddr(octets))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_display() {
        let mac: MacAddr = "00:de:ad:be:ef:00".parse().unwrap();
        assert_eq!(mac.to_string(), "00:de:ad:be:ef:00");
    }

    #[test]
    fn rejects_wrong_octet_count() {
        assert_eq!(
            "00:de:ad".parse::<MacAddr>(),
            Err(ParseMacError::WrongOctetCount(3))
        );
    }

    #[test]
    fn rejects_invalid_hex() {
        assert!(matches!(
            "zz:de:ad:be:ef:00".parse::<MacAddr>(),
            Err(ParseMacError::InvalidOctet(_))
        ));
    }
}
