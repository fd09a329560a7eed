//! Turns the `DNSMASQ_*` environment carried in a [`frame_codec::Frame`]
//! into [`lease_store::Lease`] fields, following the exact precedence
//! `original_source/src/hades/bin/dhcp_script.py::obtain_lease_info`
//! uses: `ExpiresAt` prefers `DNSMASQ_LEASE_EXPIRES`, falling back to
//! `now + DNSMASQ_TIME_REMAINING` (0 if absent); `ClientID` has its `:`
//! separators stripped before hex-decoding; textual values are decoded
//! permissively (UTF-8 with replacement, standing in for the source's
//! `surrogateescape`).

use std::collections::HashMap;
use std::net::IpAddr;

use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;

/// A value/parse error in one `DNSMASQ_*` environment variable. Always
/// surfaces as `EX_USAGE` to the caller (spec §7, "Value/parse error").
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FieldError {
    /// an integer-valued variable did not parse as an integer
    #[error("environment variable {name} contains an illegal value {value:?}")]
    InvalidInt {
        /// the variable name
        name: &'static str,
        /// the raw (lossily-decoded) value
        value: String,
    },
    /// `DNSMASQ_CLIENT_ID` was not valid colon-hex
    #[error("environment variable DNSMASQ_CLIENT_ID contains an illegal value {0:?}")]
    InvalidClientId(String),
    /// `DNSMASQ_RELAY_ADDRESS` did not parse as an IP address
    #[error("environment variable DNSMASQ_RELAY_ADDRESS contains an illegal value {0:?}")]
    InvalidRelayAddress(String),
}

fn get_bytes<'a>(env: &'a HashMap<Vec<u8>, Vec<u8>>, name: &str) -> Option<&'a [u8]> {
    env.get(name.as_bytes()).map(Vec::as_slice)
}

fn get_str(env: &HashMap<Vec<u8>, Vec<u8>>, name: &str) -> Option<String> {
    get_bytes(env, name).map(|b| String::from_utf8_lossy(b).into_owned())
}

/// Derive `ExpiresAt` from `DNSMASQ_LEASE_EXPIRES` (seconds since epoch)
/// if present, else `now + DNSMASQ_TIME_REMAINING` (default remaining 0).
pub fn expires_at(
    env: &HashMap<Vec<u8>, Vec<u8>>,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, FieldError> {
    if let Some(value) = get_str(env, "DNSMASQ_LEASE_EXPIRES") {
        let secs: i64 = value.parse().map_err(|_| FieldError::InvalidInt {
            name: "DNSMASQ_LEASE_EXPIRES",
            value,
        })?;
        return Utc
            .timestamp_opt(secs, 0)
            .single()
            .ok_or(FieldError::InvalidInt {
                name: "DNSMASQ_LEASE_EXPIRES",
                value: secs.to_string(),
            });
    }

    let remaining: i64 = match get_str(env, "DNSMASQ_TIME_REMAINING") {
        Some(value) => value.parse().map_err(|_| FieldError::InvalidInt {
            name: "DNSMASQ_TIME_REMAINING",
            value,
        })?,
        None => 0,
    };
    Ok(now + chrono::Duration::seconds(remaining))
}

/// Decode `DNSMASQ_CLIENT_ID` (colon-hex, e.g. `01:50:7b:9d`) into raw
/// bytes, stripping the separators first.
pub fn client_id(env: &HashMap<Vec<u8>, Vec<u8>>) -> Result<Option<Vec<u8>>, FieldError> {
    let Some(raw) = get_bytes(env, "DNSMASQ_CLIENT_ID") else {
        return Ok(None);
    };
    let stripped: Vec<u8> = raw.iter().copied().filter(|&b| b != b':').collect();
    let text = String::from_utf8_lossy(&stripped);
    decode_hex(&text)
        .map(Some)
        .map_err(|_| FieldError::InvalidClientId(String::from_utf8_lossy(raw).into_owned()))
}

fn decode_hex(s: &str) -> Result<Vec<u8>, ()> {
    if s.len() % 2 != 0 {
        return Err(());
    }
    let mut out = Vec::with_capacity(s.len() / 2);
    let bytes = s.as_bytes();
    for chunk in bytes.chunks(2) {
        let hi = (chunk[0] as char).to_digit(16).ok_or(())?;
        let lo = (chunk[1] as char).to_digit(16).ok_or(())?;
        out.push(((hi << 4) | lo) as u8);
    }
    Ok(out)
}

/// `DNSMASQ_SUPPLIED_HOSTNAME`, UTF-8-lossy.
pub fn supplied_hostname(env: &HashMap<Vec<u8>, Vec<u8>>) -> Option<String> {
    get_str(env, "DNSMASQ_SUPPLIED_HOSTNAME")
}

/// `DNSMASQ_TAGS`, space-separated.
pub fn tags(env: &HashMap<Vec<u8>, Vec<u8>>) -> Option<Vec<String>> {
    get_str(env, "DNSMASQ_TAGS").map(|value| {
        value
            .split(' ')
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect()
    })
}

/// `DNSMASQ_DOMAIN`, UTF-8-lossy.
pub fn domain(env: &HashMap<Vec<u8>, Vec<u8>>) -> Option<String> {
    get_str(env, "DNSMASQ_DOMAIN")
}

/// `DNSMASQ_CIRCUIT_ID`, raw opaque bytes.
pub fn circuit_id(env: &HashMap<Vec<u8>, Vec<u8>>) -> Option<Vec<u8>> {
    get_bytes(env, "DNSMASQ_CIRCUIT_ID").map(<[u8]>::to_vec)
}

/// `DNSMASQ_SUBSCRIBER_ID`, raw opaque bytes.
pub fn subscriber_id(env: &HashMap<Vec<u8>, Vec<u8>>) -> Option<Vec<u8>> {
    get_bytes(env, "DNSMASQ_SUBSCRIBER_ID").map(<[u8]>::to_vec)
}

/// `DNSMASQ_REMOTE_ID`, raw opaque bytes.
pub fn remote_id(env: &HashMap<Vec<u8>, Vec<u8>>) -> Option<Vec<u8>> {
    get_bytes(env, "DNSMASQ_REMOTE_ID").map(<[u8]>::to_vec)
}

/// `DNSMASQ_VENDOR_CLASS`, UTF-8-lossy.
pub fn vendor_class(env: &HashMap<Vec<u8>, Vec<u8>>) -> Option<String> {
    get_str(env, "DNSMASQ_VENDOR_CLASS")
}

/// `DNSMASQ_USER_CLASS0`, `DNSMASQ_USER_CLASS1`, ... in order, stopping
/// at the first missing index.
pub fn user_classes(env: &HashMap<Vec<u8>, Vec<u8>>) -> Option<Vec<String>> {
    let mut out = Vec::new();
    for n in 0.. {
        match get_str(env, &format!("DNSMASQ_USER_CLASS{n}")) {
            Some(value) => out.push(value),
            None => break,
        }
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

/// `DNSMASQ_RELAY_ADDRESS`, parsed as an IP address.
pub fn relay_ip_address(env: &HashMap<Vec<u8>, Vec<u8>>) -> Result<Option<IpAddr>, FieldError> {
    let Some(value) = get_str(env, "DNSMASQ_RELAY_ADDRESS") else {
        return Ok(None);
    };
    value
        .parse()
        .map(Some)
        .map_err(|_| FieldError::InvalidRelayAddress(value))
}

/// `DNSMASQ_REQUESTED_OPTIONS`, comma-separated small non-negative
/// integers (DHCP option numbers).
pub fn requested_options(env: &HashMap<Vec<u8>, Vec<u8>>) -> Result<Option<Vec<u16>>, FieldError> {
    let Some(value) = get_str(env, "DNSMASQ_REQUESTED_OPTIONS") else {
        return Ok(None);
    };
    let mut out = Vec::new();
    for part in value.split(',').filter(|s| !s.is_empty()) {
        let n: u16 = part.trim().parse().map_err(|_| FieldError::InvalidInt {
            name: "DNSMASQ_REQUESTED_OPTIONS",
            value: value.clone(),
        })?;
        out.push(n);
    }
    Ok(if out.is_empty() { None } else { Some(out) })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<Vec<u8>, Vec<u8>> {
        pairs
            .iter()
            .map(|(k, v)| (k.as_bytes().to_vec(), v.as_bytes().to_vec()))
            .collect()
    }

    #[test]
    fn expires_at_prefers_lease_expires() {
        let e = env(&[("DNSMASQ_LEASE_EXPIRES", "1508969413")]);
        let result = expires_at(&e, Utc::now()).unwrap();
        assert_eq!(result.timestamp(), 1_508_969_413);
    }

    #[test]
    fn expires_at_falls_back_to_time_remaining() {
        let now = Utc.timestamp_opt(1_000_000_000, 0).unwrap();
        let e = env(&[("DNSMASQ_TIME_REMAINING", "3600")]);
        let result = expires_at(&e, now).unwrap();
        assert_eq!(result.timestamp(), 1_000_003_600);
    }

    #[test]
    fn expires_at_defaults_remaining_to_zero() {
        let now = Utc.timestamp_opt(1_000_000_000, 0).unwrap();
        let result = expires_at(&HashMap::new(), now).unwrap();
        assert_eq!(result, now);
    }

    #[test]
    fn client_id_strips_colons_before_decoding() {
        let e = env(&[("DNSMASQ_CLIENT_ID", "01:50:7b:9d:87:76:4b")]);
        let decoded = client_id(&e).unwrap().unwrap();
        assert_eq!(decoded, vec![0x01, 0x50, 0x7b, 0x9d, 0x87, 0x76, 0x4b]);
    }

    #[test]
    fn client_id_rejects_invalid_hex() {
        let e = env(&[("DNSMASQ_CLIENT_ID", "zz")]);
        assert!(client_id(&e).is_err());
    }

    #[test]
    fn user_classes_stop_at_first_gap() {
        let e = env(&[
            ("DNSMASQ_USER_CLASS0", "a"),
            ("DNSMASQ_USER_CLASS1", "b"),
            ("DNSMASQ_USER_CLASS3", "d"),
        ]);
        assert_eq!(
            user_classes(&e),
            Some(vec!["a".to_owned(), "b".to_owned()])
        );
    }

    #[test]
    fn requested_options_parses_comma_separated_ints() {
        let e = env(&[("DNSMASQ_REQUESTED_OPTIONS", "1,3,6,15")]);
        assert_eq!(requested_options(&e).unwrap(), Some(vec![1, 3, 6, 15]));
    }

    #[test]
    fn tags_split_on_space() {
        let e = env(&[("DNSMASQ_TAGS", "auth vlan100")]);
        assert_eq!(
            tags(&e),
            Some(vec!["auth".to_owned(), "vlan100".to_owned()])
        );
    }
}
