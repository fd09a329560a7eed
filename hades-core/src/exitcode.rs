//! BSD `sysexits.h` values named in the external-interface spec.
//!
//! These map error *kinds*, not error *types*: a library crate never
//! returns an `ExitCode` itself, only an error value a binary can classify.

/// BSD sysexits code, used as the process exit status of the hades binaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Successful termination.
    Ok = 0,
    /// Command line usage error, or a malformed request from a peer.
    Usage = 64,
    /// Cannot open input (a required file is missing).
    NoInput = 66,
    /// The user or group required to drop privileges to does not exist.
    NoUser = 67,
    /// A service is unavailable (e.g. the database refuses to start up).
    Unavailable = 69,
    /// An internal software error was detected.
    Software = 70,
    /// An operating system error occurred (e.g. a syscall failed unexpectedly).
    OsErr = 71,
    /// Something is wrong with the configuration.
    Config = 78,
    /// A temporary failure; the caller should retry later.
    TempFail = 75,
}

impl ExitCode {
    /// Raw numeric status, clamped to the 0-127 range mandated for the
    /// lease-script reply byte.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Status byte for the lease-script IPC reply (0-127).
    pub fn status_byte(self) -> u8 {
        self.code() as u8
    }
}

impl std::process::Termination for ExitCode {
    fn report(self) -> std::process::ExitCode {
        std::process::ExitCode::from(self.code() as u8)
    }
}
