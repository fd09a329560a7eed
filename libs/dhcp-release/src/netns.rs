//! RAII network-namespace scope, the Rust analogue of the source's
//! `pyroute2.netns.pushns`/`popns` pair.
//!
//! Entry is not nestable and not `Send` across an `await` point: it
//! wraps a held file descriptor representing "this OS thread's current
//! namespace" and must be entered and exited without yielding, matching
//! the concurrency model's requirement that namespace entry be a tight,
//! non-nestable, process-wide scope.

use std::os::fd::{AsRawFd, OwnedFd};

use nix::sched::{setns, CloneFlags};

/// Enters `/var/run/netns/<name>` on construction, restores the prior
/// namespace on drop -- even if entry into the target namespace fails
/// partway, or the caller panics while inside.
#[derive(Debug)]
pub struct NetnsGuard {
    previous: OwnedFd,
    // deliberately !Send: holding a namespace fd across an await point
    // would let an unrelated task on the same thread observe it.
    _not_send: std::marker::PhantomData<*const ()>,
}

impl NetnsGuard {
    /// Enter the named network namespace, remembering the current one
    /// so it can be restored on drop.
    pub fn enter(name: &str) -> nix::Result<Self> {
        let previous = open_current_ns()?;

        let path = format!("/var/run/netns/{name}");
        let target = open_ns_file(&path)?;
        if let Err(e) = setns(&target, CloneFlags::CLONE_NEWNET) {
            // nothing entered yet, nothing to restore
            return Err(e);
        }

        Ok(Self {
            previous,
            _not_send: std::marker::PhantomData,
        })
    }
}

impl Drop for NetnsGuard {
    fn drop(&mut self) {
        if let Err(e) = setns(&self.previous, CloneFlags::CLONE_NEWNET) {
            tracing::error!(error = %e, "failed to restore previous network namespace");
        }
    }
}

fn open_current_ns() -> nix::Result<OwnedFd> {
    open_ns_file("/proc/self/ns/net")
}

fn open_ns_file(path: &str) -> nix::Result<OwnedFd> {
    use nix::fcntl::{open, OFlag};
    use nix::sys::stat::Mode;
    open(path, OFlag::O_RDONLY | OFlag::O_CLOEXEC, Mode::empty())
}

#[allow(dead_code)]
fn _assert_raw_fd(guard: &NetnsGuard) -> i32 {
    guard.previous.as_raw_fd()
}
