//! DHCP hosts file generation
//! (`original_source/src/hades/deputy/server.py::generate_dhcp_hosts_file`):
//! lines `"{mac_unix_expanded},{ip}\n"`, owned by the DHCP user, mode 0440.

use std::io::Write;
use std::path::Path;

use atomic_file::{replace_with, FileOwnership};

use crate::error::DeputyError;
use crate::model::DhcpHost;

/// Atomically (re)write the DHCP hosts file at `dest`.
pub fn write_dhcp_hosts_file(
    dest: &Path,
    ownership: FileOwnership,
    hosts: &[DhcpHost],
) -> Result<(), DeputyError> {
    replace_with(dest, ownership, |w| {
        for host in hosts {
            writeln!(w, "{},{}", host.mac, host.ip)?;
        }
        Ok(())
    })
    .map_err(|source| DeputyError::Write {
        artifact: "dhcp hosts file",
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lease_store::MacAddr;

    fn ownership() -> FileOwnership {
        FileOwnership {
            uid: nix::unistd::getuid().as_raw(),
            gid: nix::unistd::getgid().as_raw(),
            mode: 0o440,
        }
    }

    #[test]
    fn writes_comma_separated_lines() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("dhcp-hosts");
        let hosts = vec![DhcpHost {
            mac: "00:de:ad:be:ef:00".parse::<MacAddr>().unwrap(),
            ip: "141.76.121.2".parse().unwrap(),
        }];

        write_dhcp_hosts_file(&dest, ownership(), &hosts).unwrap();

        let contents = std::fs::read_to_string(&dest).unwrap();
        assert_eq!(contents, "00:de:ad:be:ef:00,141.76.121.2\n");
    }

    #[test]
    fn empty_host_list_produces_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("dhcp-hosts");

        write_dhcp_hosts_file(&dest, ownership(), &[]).unwrap();

        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "");
    }
}
