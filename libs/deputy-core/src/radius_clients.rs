//! FreeRADIUS clients file generation
//! (`original_source/src/hades/deputy/server.py::generate_radius_clients`):
//! one `client`/`home_server` block pair per NAS, secrets escaped for the
//! double-quoted config syntax.

use std::io::Write;
use std::path::Path;

use atomic_file::{replace_with, FileOwnership};

use crate::error::DeputyError;
use crate::model::NasClient;

/// Escape `"` and `\` with a leading backslash, per spec §6.
fn escape_secret(secret: &str) -> String {
    let mut out = String::with_capacity(secret.len());
    for c in secret.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn write_client_block(w: &mut dyn Write, client: &NasClient) -> std::io::Result<()> {
    let secret = escape_secret(&client.secret);
    writeln!(w, "client {} {{", client.shortname)?;
    writeln!(w, "    shortname = \"{}\"", client.shortname)?;
    writeln!(w, "    ipaddr = \"{}\"", client.nasname)?;
    writeln!(w, "    secret = \"{secret}\"")?;
    writeln!(w, "    require_message_authenticator = no")?;
    writeln!(w, "    nastype = {}", client.nas_type)?;
    writeln!(w, "    coa_server = \"{}\"", client.shortname)?;
    writeln!(w, "}}")?;
    writeln!(w, "home_server {} {{", client.shortname)?;
    writeln!(w, "    type = coa")?;
    writeln!(w, "    ipaddr = \"{}\"", client.nasname)?;
    writeln!(w, "    port = 3799")?;
    writeln!(w, "    secret = \"{secret}\"")?;
    writeln!(w, "    coa {{")?;
    writeln!(w, "        irt = 2")?;
    writeln!(w, "        mrt = 16")?;
    writeln!(w, "        mrc = 5")?;
    writeln!(w, "        mrd = 30")?;
    writeln!(w, "    }}")?;
    writeln!(w, "}}")?;
    Ok(())
}

/// Atomically (re)write the RADIUS clients file at `dest`.
pub fn write_radius_clients_file(
    dest: &Path,
    ownership: FileOwnership,
    clients: &[NasClient],
) -> Result<(), DeputyError> {
    replace_with(dest, ownership, |w| {
        for client in clients {
            write_client_block(w, client)?;
        }
        Ok(())
    })
    .map_err(|source| DeputyError::Write {
        artifact: "radius clients file",
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ownership() -> FileOwnership {
        FileOwnership {
            uid: nix::unistd::getuid().as_raw(),
            gid: nix::unistd::getgid().as_raw(),
            mode: 0o440,
        }
    }

    fn client() -> NasClient {
        NasClient {
            shortname: "switch1".into(),
            nasname: "10.0.0.1".into(),
            nas_type: "other".into(),
            ports: 1,
            secret: "s3cr\"et\\".into(),
            server: None,
            community: None,
            description: None,
        }
    }

    #[test]
    fn escapes_quotes_and_backslashes_in_secret() {
        assert_eq!(escape_secret("s3cr\"et\\"), "s3cr\\\"et\\\\");
    }

    #[test]
    fn renders_both_blocks_for_one_client() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("clients.conf");

        write_radius_clients_file(&dest, ownership(), &[client()]).unwrap();

        let contents = std::fs::read_to_string(&dest).unwrap();
        assert!(contents.contains("client switch1 {"));
        assert!(contents.contains("home_server switch1 {"));
        assert!(contents.contains("secret = \"s3cr\\\"et\\\\\""));
        assert!(contents.contains("coa_server = \"switch1\""));
        assert!(contents.contains("port = 3799"));
    }
}
