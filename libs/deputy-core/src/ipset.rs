//! Alternative-DNS ipset swap
//! (`original_source/src/hades/deputy/server.py::generate_ipset_swap`,
//! `update_alternative_dns_ipset`): an atomic `ipset restore` script run
//! inside the configured network namespace via `ip netns exec`.

use std::net::IpAddr;
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::DeputyError;

/// Render the `ipset restore` script that atomically replaces `name`'s
/// membership with `ips`, using a temporary `tmp_{name}` set so the
/// swap is atomic from the consumer's point of view.
pub fn render_swap_script(name: &str, ips: &[IpAddr]) -> String {
    let tmp = format!("tmp_{name}");
    let mut out = String::new();
    out.push_str(&format!("create {tmp} hash:ip -exist\n"));
    out.push_str(&format!("flush {tmp}\n"));
    for ip in ips {
        out.push_str(&format!("add {tmp} {ip}\n"));
    }
    out.push_str(&format!("swap {name} {tmp}\n"));
    out.push_str(&format!("destroy {tmp}\n"));
    out
}

/// Run `ip netns exec <namespace> ipset restore` with the rendered script
/// piped on stdin.
pub async fn update_alternative_dns_ipset(
    namespace: &str,
    name: &str,
    ips: &[IpAddr],
) -> Result<(), DeputyError> {
    let script = render_swap_script(name, ips);

    let mut child = Command::new("ip")
        .args(["netns", "exec", namespace, "ipset", "restore"])
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(DeputyError::IpsetSpawn)?;

    let mut stdin = child.stdin.take().expect("stdin was requested as piped");
    stdin
        .write_all(script.as_bytes())
        .await
        .map_err(DeputyError::IpsetSpawn)?;
    drop(stdin);

    let output = child.wait_with_output().await.map_err(DeputyError::IpsetSpawn)?;
    if !output.status.success() {
        return Err(DeputyError::IpsetRestore {
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_script_matches_documented_shape() {
        let ips = vec!["1.2.3.4".parse().unwrap(), "5.6.7.8".parse().unwrap()];
        let script = render_swap_script("alternative_dns", &ips);
        assert_eq!(
            script,
            "create tmp_alternative_dns hash:ip -exist\n\
             flush tmp_alternative_dns\n\
             add tmp_alternative_dns 1.2.3.4\n\
             add tmp_alternative_dns 5.6.7.8\n\
             swap alternative_dns tmp_alternative_dns\n\
             destroy tmp_alternative_dns\n"
        );
    }

    #[test]
    fn empty_ip_list_still_creates_and_swaps() {
        let script = render_swap_script("s", &[]);
        assert!(script.contains("create tmp_s hash:ip -exist"));
        assert!(script.contains("swap s tmp_s"));
    }
}
