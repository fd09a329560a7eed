//! # frame-codec
//!
//! Parses the wire frame dnsmasq's `--dhcp-script` forwarder sends over a
//! `SOCK_STREAM` UNIX socket:
//!
//! ```text
//! uint32_native argc
//! argc x (NUL-terminated bytes)        // argv
//! uint32_native envc
//! envc x (NUL-terminated bytes)        // each "KEY=VALUE"
//! ```
//!
//! The parser is expressed as an explicit state machine rather than a
//! coroutine/generator: each call to [`FrameParser::parse`] is handed the
//! *entire* buffer accumulated so far (callers only ever append, never
//! rewrite, received bytes) and either makes as much progress as the
//! buffer allows or reports the minimum total buffer length required to
//! continue. This makes partial reads across any number of `recvmsg`
//! calls safe: feeding the same byte stream with any chunking produces
//! the same [`ParseStep`] or the same [`ProtocolError`].
#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    non_snake_case,
    non_upper_case_globals
)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::collections::HashMap;

use thiserror::Error;

/// A fully parsed request frame: the forwarder's `argv` and its filtered
/// `DNSMASQ_*` environment.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    /// Command-line arguments, in order, including `argv[0]`.
    pub argv: Vec<Vec<u8>>,
    /// Environment variables, keyed by name.
    pub env: HashMap<Vec<u8>, Vec<u8>>,
}

/// Errors the frame codec itself can raise. Ancillary-data and
/// file-descriptor-mode errors are folded in here too, because the spec
/// treats "Protocol error (frame, ancillary, FD mode)" as a single error
/// kind with a single downstream disposition (close connection, close
/// FDs, reply `EX_USAGE`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The parser needs more data than fits in a single page, which can
    /// never be satisfied because the wire format caps frames at
    /// `page_size - 1` bytes.
    #[error("parser requires more data ({needed}) than can be buffered ({max})")]
    BufferTooSmall {
        /// minimum total buffer length the parser asked for
        needed: usize,
        /// the hard cap (`page_size - 1`)
        max: usize,
    },
    /// The peer half-closed the connection before supplying all the
    /// bytes the parser needed.
    #[error(
        "at offset {offset}: while parsing {element}: unexpected end of file, \
         expected at least {needed} byte(s) total, but only {available} byte(s) were received"
    )]
    UnexpectedEof {
        /// minimum total buffer length that was required
        needed: usize,
        /// bytes actually received before the half-close
        available: usize,
        /// byte offset within the frame where parsing stopped
        offset: usize,
        /// human name of the element being parsed (`argc`, `argv[i]`, ...)
        element: String,
    },
    /// `MSG_CTRUNC` was set, or the `SCM_RIGHTS` payload was not a
    /// multiple of `sizeof(int)`.
    #[error("truncated ancillary data")]
    TruncatedAncillary,
    /// An environment entry had no `=` separator.
    #[error("no equal sign in environment variable while parsing {element}")]
    MissingEquals {
        /// human name of the element being parsed
        element: String,
    },
    /// `argc`/`envc` was negative.
    #[error("negative {element}: {value}")]
    NegativeCount {
        /// which count was negative (`argc` or `envc`)
        element: &'static str,
        /// the (negative) value read from the wire
        value: i32,
    },
    /// Bytes remained in the buffer after a fully parsed frame.
    #[error("{extra} byte(s) left over after parsing")]
    LeftoverBytes {
        /// number of unconsumed trailing bytes
        extra: usize,
    },
    /// No file descriptors were received at all.
    #[error("no file descriptors received")]
    NoFileDescriptors,
    /// A number of file descriptors other than exactly three was received.
    #[error("expected to receive exactly {expected} file descriptor(s), got {actual}")]
    WrongFdCount {
        /// always 3 for this protocol
        expected: usize,
        /// number actually received
        actual: usize,
    },
    /// A received file descriptor's `O_ACCMODE` did not match what the
    /// slot (stdin/stdout/stderr) requires.
    #[error("file descriptor at index {index} is not compatible with requested mode {expected:?}")]
    FdModeMismatch {
        /// index within the SCM_RIGHTS array (0=stdin, 1=stdout, 2=stderr)
        index: usize,
        /// the mode the slot requires (`"r"` or `"w"`)
        expected: &'static str,
    },
    /// A received file descriptor had an access mode other than
    /// `O_RDONLY`/`O_WRONLY`/`O_RDWR`.
    #[error("unknown O_ACCMODE {mode:#o} of fd at index {index}")]
    UnknownAccessMode {
        /// index within the SCM_RIGHTS array
        index: usize,
        /// the raw `O_ACCMODE` bits
        mode: i32,
    },
}

/// Result of a single [`FrameParser::parse`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseStep {
    /// The parser has consumed as much of `data` as it can; resume by
    /// calling `parse` again once `data` is at least `total` bytes long.
    Needed {
        /// minimum total buffer length (from offset 0) required to continue
        total: usize,
        /// human name of the element currently being parsed
        element: String,
    },
    /// The frame is complete.
    Done {
        /// the parsed frame
        frame: Frame,
        /// number of bytes of `data` the frame occupied
        consumed: usize,
    },
}

const SIZEOF_U32: usize = 4;

#[derive(Debug, Clone)]
enum State {
    Argc,
    Argv {
        argc: usize,
        argv: Vec<Vec<u8>>,
    },
    Envc {
        argv: Vec<Vec<u8>>,
    },
    Env {
        argv: Vec<Vec<u8>>,
        envc: usize,
        env: HashMap<Vec<u8>, Vec<u8>>,
    },
}

/// Resumable parser for a single request frame.
///
/// Construct one per connection, feed it the buffer accumulated so far
/// on every `recvmsg`, and stop once it reports [`ParseStep::Done`].
#[derive(Debug, Clone)]
pub struct FrameParser {
    max_len: usize,
    pos: usize,
    state: State,
}

impl FrameParser {
    /// Create a new parser. `max_len` is the hard frame-size cap
    /// (`page_size - 1` in production).
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len,
            pos: 0,
            state: State::Argc,
        }
    }

    /// Attempt to make progress parsing `data`, the entire buffer
    /// accumulated for this connection so far.
    pub fn parse(&mut self, data: &[u8]) -> Result<ParseStep, ProtocolError> {
        loop {
            match &mut self.state {
                State::Argc => {
                    match read_u32(data, self.pos, "argc", self.max_len)? {
                        ReadInt::Needed(total) => {
                            return Ok(ParseStep::Needed {
                                total,
                                element: "argc".to_owned(),
                            });
                        }
                        ReadInt::Value(value, new_pos) => {
                            let argc = non_negative("argc", value)?;
                            self.pos = new_pos;
                            self.state = State::Argv {
                                argc,
                                argv: Vec::with_capacity(argc),
                            };
                        }
                    }
                }
                State::Argv { argc, argv } => {
                    if argv.len() == *argc {
                        let argv = std::mem::take(argv);
                        self.state = State::Envc { argv };
                        continue;
                    }
                    let element = format!("argv[{}]", argv.len());
                    match read_cstr(data, self.pos, &element, self.max_len)? {
                        ReadStr::Needed(total) => {
                            return Ok(ParseStep::Needed { total, element });
                        }
                        ReadStr::Value(bytes, new_pos) => {
                            argv.push(bytes);
                            self.pos = new_pos;
                        }
                    }
                }
                State::Envc { argv } => match read_u32(data, self.pos, "envc", self.max_len)? {
                    ReadInt::Needed(total) => {
                        return Ok(ParseStep::Needed {
                            total,
                            element: "envc".to_owned(),
                        });
                    }
                    ReadInt::Value(value, new_pos) => {
                        let envc = non_negative("envc", value)?;
                        self.pos = new_pos;
                        let argv = std::mem::take(argv);
                        self.state = State::Env {
                            argv,
                            envc,
                            env: HashMap::with_capacity(envc),
                        };
                    }
                },
                State::Env { argv, envc, env } => {
                    if env.len() == *envc {
                        let frame = Frame {
                            argv: std::mem::take(argv),
                            env: std::mem::take(env),
                        };
                        return Ok(ParseStep::Done {
                            frame,
                            consumed: self.pos,
                        });
                    }
                    let element = format!("environ[{}]", env.len());
                    match read_cstr(data, self.pos, &element, self.max_len)? {
                        ReadStr::Needed(total) => {
                            return Ok(ParseStep::Needed { total, element });
                        }
                        ReadStr::Value(entry, new_pos) => {
                            let mut parts = entry.splitn(2, |&b| b == b'=');
                            let name = parts.next().unwrap_or(&[]).to_vec();
                            match parts.next() {
                                Some(value) => {
                                    env.insert(name, value.to_vec());
                                    self.pos = new_pos;
                                }
                                None => return Err(ProtocolError::MissingEquals { element }),
                            }
                        }
                    }
                }
            }
        }
    }
}

fn non_negative(element: &'static str, value: i32) -> Result<usize, ProtocolError> {
    if value < 0 {
        Err(ProtocolError::NegativeCount { element, value })
    } else {
        Ok(value as usize)
    }
}

enum ReadInt {
    Needed(usize),
    Value(i32, usize),
}

fn read_u32(data: &[u8], pos: usize, element: &str, max_len: usize) -> Result<ReadInt, ProtocolError> {
    let total = pos + SIZEOF_U32;
    check_cap(total, max_len)?;
    if data.len() < total {
        return Ok(ReadInt::Needed(total));
    }
    let mut bytes = [0u8; SIZEOF_U32];
    bytes.copy_from_slice(&data[pos..total]);
    let _ = element;
    Ok(ReadInt::Value(i32::from_ne_bytes(bytes), total))
}

enum ReadStr {
    Needed(usize),
    Value(Vec<u8>, usize),
}

fn read_cstr(
    data: &[u8],
    pos: usize,
    element: &str,
    max_len: usize,
) -> Result<ReadStr, ProtocolError> {
    match data[pos..].iter().position(|&b| b == 0) {
        Some(rel_end) => {
            let end = pos + rel_end;
            Ok(ReadStr::Value(data[pos..end].to_vec(), end + 1))
        }
        None => {
            // we don't yet know the string's length; ask for at least one
            // more byte than we've already seen.
            let total = data.len() + 1;
            check_cap(total, max_len)?;
            let _ = element;
            Ok(ReadStr::Needed(total))
        }
    }
}

fn check_cap(total: usize, max_len: usize) -> Result<(), ProtocolError> {
    if total > max_len {
        Err(ProtocolError::BufferTooSmall {
            needed: total,
            max: max_len,
        })
    } else {
        Ok(())
    }
}

/// Serialize a frame back to wire format. Used by tests and by the
/// standalone forwarder client.
pub fn encode(argv: &[impl AsRef<[u8]>], env: &[(impl AsRef<[u8]>, impl AsRef<[u8]>)]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(argv.len() as i32).to_ne_bytes());
    for arg in argv {
        out.extend_from_slice(arg.as_ref());
        out.push(0);
    }
    out.extend_from_slice(&(env.len() as i32).to_ne_bytes());
    for (key, value) in env {
        out.extend_from_slice(key.as_ref());
        out.push(b'=');
        out.extend_from_slice(value.as_ref());
        out.push(0);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn parse_all(max_len: usize, data: &[u8]) -> Result<Frame, ProtocolError> {
        let mut parser = FrameParser::new(max_len);
        loop {
            match parser.parse(data)? {
                ParseStep::Done { frame, consumed } => {
                    assert_eq!(consumed, data.len(), "test frames should be exact");
                    return Ok(frame);
                }
                ParseStep::Needed { total, .. } => {
                    // in these tests the full buffer is always supplied up
                    // front, so if we ever ask for more than we have the
                    // input was truncated -- surface that as EOF.
                    if total > data.len() {
                        return Err(ProtocolError::UnexpectedEof {
                            needed: total,
                            available: data.len(),
                            offset: data.len(),
                            element: "test".into(),
                        });
                    }
                }
            }
        }
    }

    #[test]
    fn parses_init_command() {
        let data = encode(&["init"], &[] as &[(&[u8], &[u8])]);
        let frame = parse_all(4096, &data).unwrap();
        assert_eq!(frame.argv, vec![b"init".to_vec()]);
        assert!(frame.env.is_empty());
    }

    #[test]
    fn parses_add_command_with_env() {
        let data = encode(
            &["add", "00:de:ad:be:ef:00", "141.76.121.2"],
            &[("DNSMASQ_LEASE_EXPIRES", "1508969413")],
        );
        let frame = parse_all(4096, &data).unwrap();
        assert_eq!(
            frame.argv,
            vec![
                b"add".to_vec(),
                b"00:de:ad:be:ef:00".to_vec(),
                b"141.76.121.2".to_vec()
            ]
        );
        assert_eq!(
            frame.env.get(b"DNSMASQ_LEASE_EXPIRES".as_slice()),
            Some(&b"1508969413".to_vec())
        );
    }

    #[test]
    fn rejects_missing_equals() {
        let data = encode(&["init"], &[] as &[(&[u8], &[u8])]);
        // append a malformed env entry by hand: envc=1, "NOVALUE\0"
        let mut data = data;
        let without_envc = data.len() - 4;
        data.truncate(without_envc);
        data.extend_from_slice(&1i32.to_ne_bytes());
        data.extend_from_slice(b"NOVALUE\0");
        let err = parse_all(4096, &data).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingEquals { .. }));
    }

    #[test]
    fn rejects_oversized_frame() {
        let huge_arg = vec![b'a'; 8192];
        let data = encode(&[huge_arg], &[] as &[(&[u8], &[u8])]);
        let err = parse_all(4095, &data).unwrap_err();
        assert!(matches!(err, ProtocolError::BufferTooSmall { .. }));
    }

    #[test]
    fn rejects_negative_argc() {
        let mut data = Vec::new();
        data.extend_from_slice(&(-1i32).to_ne_bytes());
        let err = parse_all(4096, &data).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::NegativeCount {
                element: "argc",
                value: -1
            }
        ));
    }

    fn arbitrary_argv_env() -> impl Strategy<Value = (Vec<Vec<u8>>, Vec<(Vec<u8>, Vec<u8>)>)> {
        let no_nul = prop::collection::vec(1u8..=255, 0..16);
        let args = prop::collection::vec(no_nul.clone(), 0..6);
        let key = prop::collection::vec(1u8..=255, 1..12)
            .prop_filter("no '=' or NUL", |v| !v.contains(&b'='));
        let val = prop::collection::vec(1u8..=255, 0..12);
        let envs = prop::collection::vec((key, val), 0..6);
        (args, envs)
    }

    proptest! {
        #[test]
        fn round_trip((argv, env) in arbitrary_argv_env()) {
            let data = encode(&argv, &env);
            let frame = parse_all(8192, &data).unwrap();
            prop_assert_eq!(&frame.argv, &argv);
            let mut expected: HashMap<Vec<u8>, Vec<u8>> = HashMap::new();
            for (k, v) in &env {
                expected.insert(k.clone(), v.clone());
            }
            prop_assert_eq!(frame.env, expected);
        }

        #[test]
        fn partial_read_safety((argv, env) in arbitrary_argv_env(), chunk_size in 1usize..32) {
            let data = encode(&argv, &env);
            let whole = parse_all(8192, &data);

            let mut parser = FrameParser::new(8192);
            let mut fed = Vec::new();
            let mut result = None;
            'outer: for chunk in data.chunks(chunk_size.max(1)) {
                fed.extend_from_slice(chunk);
                loop {
                    match parser.parse(&fed) {
                        Ok(ParseStep::Done { frame, consumed }) => {
                            prop_assert_eq!(consumed, data.len());
                            result = Some(Ok(frame));
                            break 'outer;
                        }
                        Ok(ParseStep::Needed { total, .. }) => {
                            if total <= fed.len() {
                                continue;
                            }
                            break;
                        }
                        Err(e) => {
                            result = Some(Err(e));
                            break 'outer;
                        }
                    }
                }
            }
            match (whole, result) {
                (Ok(a), Some(Ok(b))) => prop_assert_eq!(a, b),
                (Err(a), Some(Err(b))) => prop_assert_eq!(a, b),
                (Ok(_), None) => {}
                other => prop_assert!(false, "chunked parse diverged from whole parse: {:?}", {
                    let _ = &other;
                    "mismatch"
                }),
            }
        }
    }
}
