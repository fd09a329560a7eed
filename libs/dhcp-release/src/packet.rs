//! Byte-exact BOOTP/DHCP packet construction.
//!
//! Rust has no portable equivalent of `ctypes.BigEndianStructure` for
//! wire structs, so instead of a `#[repr(C)]` struct overlaying memory
//! (as the source this was distilled from does with
//! `DHCPPacket(ctypes.BigEndianStructure)`) this builds the packet as a
//! `Vec<u8>` with named byte-offset constants, the same way `dhcproto`
//! hand-rolls wire encoding rather than reaching for an FFI-style struct
//! overlay.

use std::net::Ipv4Addr;

use rand::Rng;

const MAGIC_COOKIE: [u8; 4] = [0x63, 0x82, 0x53, 0x63];
const BOOTREQUEST: u8 = 1;
const HTYPE_ETHERNET: u8 = 1;
const HLEN_ETHERNET: u8 = 6;

const OPT_MESSAGE_TYPE: u8 = 53;
const OPT_SERVER_ID: u8 = 54;
const OPT_MESSAGE: u8 = 56;
const OPT_CLIENT_ID: u8 = 61;
const OPT_END: u8 = 255;

const DHCPRELEASE: u8 = 7;
const RELEASE_MESSAGE: &str = "Lease revoked administratively";

/// The fixed (non-options) portion of a BOOTP packet, in bytes.
pub const FIXED_HEADER_LEN: usize = 240;

/// Fixed width of the options area, zero-padded after the terminator,
/// matching the original's `ctypes.c_ubyte * 308` options field.
pub const OPTIONS_LEN: usize = 308;

/// Total packet length: [`FIXED_HEADER_LEN`] + [`OPTIONS_LEN`].
pub const PACKET_LEN: usize = FIXED_HEADER_LEN + OPTIONS_LEN;

/// Build a DHCPRELEASE datagram for `client_ip`, addressed to
/// `server_ip`, from `chaddr` (the client's Ethernet address) and an
/// optional `client_id` (DHCP option 61, up to 255 bytes).
///
/// Layout: `op=1, htype=1, hlen=6, hops=0, xid=random, secs=0, flags=0,
/// ciaddr=client_ip, yiaddr=siaddr=giaddr=0, chaddr=mac+zero-pad(10),
/// sname/file zeroed, magic_cookie=0x63825363`, followed by options
/// `53:1:7`, `54:4:server_ip`, `56:len:"Lease revoked
/// administratively"`, optionally `61:len:client_id`, terminator `255`,
/// zero-padded out to a fixed [`OPTIONS_LEN`]-byte options area.
pub fn build_release_packet(
    client_ip: Ipv4Addr,
    server_ip: Ipv4Addr,
    chaddr: [u8; 6],
    client_id: Option<&[u8]>,
) -> Vec<u8> {
    let mut pkt = Vec::with_capacity(PACKET_LEN);

    pkt.push(BOOTREQUEST); // op
    pkt.push(HTYPE_ETHERNET); // htype
    pkt.push(HLEN_ETHERNET); // hlen
    pkt.push(0); // hops
    pkt.extend_from_slice(&rand::thread_rng().gen::<u32>().to_be_bytes()); // xid
    pkt.extend_from_slice(&0u16.to_be_bytes()); // secs
    pkt.extend_from_slice(&0u16.to_be_bytes()); // flags
    pkt.extend_from_slice(&client_ip.octets()); // ciaddr
    pkt.extend_from_slice(&[0u8; 4]); // yiaddr
    pkt.extend_from_slice(&[0u8; 4]); // siaddr
    pkt.extend_from_slice(&[0u8; 4]); // giaddr
    pkt.extend_from_slice(&chaddr); // chaddr[0..6]
    pkt.extend_from_slice(&[0u8; 10]); // chaddr zero-pad
    pkt.extend_from_slice(&[0u8; 64]); // sname
    pkt.extend_from_slice(&[0u8; 128]); // file
    pkt.extend_from_slice(&MAGIC_COOKIE);

    debug_assert_eq!(pkt.len(), FIXED_HEADER_LEN);

    pkt.push(OPT_MESSAGE_TYPE);
    pkt.push(1);
    pkt.push(DHCPRELEASE);

    pkt.push(OPT_SERVER_ID);
    pkt.push(4);
    pkt.extend_from_slice(&server_ip.octets());

    let message = RELEASE_MESSAGE.as_bytes();
    pkt.push(OPT_MESSAGE);
    pkt.push(message.len() as u8);
    pkt.extend_from_slice(message);

    if let Some(client_id) = client_id {
        pkt.push(OPT_CLIENT_ID);
        pkt.push(client_id.len() as u8);
        pkt.extend_from_slice(client_id);
    }

    pkt.push(OPT_END);

    let options_written = pkt.len() - FIXED_HEADER_LEN;
    debug_assert!(
        options_written <= OPTIONS_LEN,
        "options area overflowed the fixed {OPTIONS_LEN}-byte width"
    );
    pkt.resize(FIXED_HEADER_LEN + OPTIONS_LEN, 0);

    pkt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_the_documented_byte_layout() {
        let client_ip: Ipv4Addr = "192.168.0.1".parse().unwrap();
        let server_ip: Ipv4Addr = "172.17.0.1".parse().unwrap();
        let chaddr = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55];
        let client_id = [0x01, 0x00, 0x11, 0x22, 0x33, 0x44, 0x55];

        let pkt = build_release_packet(client_ip, server_ip, chaddr, Some(&client_id));

        assert_eq!(pkt.len(), PACKET_LEN, "packet must be the fixed total length");
        assert_eq!(pkt[0], 1, "op must be BOOTREQUEST");
        assert_eq!(pkt[1], 1, "htype must be ethernet");
        assert_eq!(pkt[2], 6, "hlen must be 6");
        assert_eq!(&pkt[12..16], &client_ip.octets(), "ciaddr");
        assert_eq!(&pkt[28..34], &chaddr, "chaddr");
        assert_eq!(&pkt[236..240], &MAGIC_COOKIE, "magic cookie");

        let options = &pkt[FIXED_HEADER_LEN..];
        assert_eq!(&options[0..3], &[53, 1, 7], "message-type option");
        assert_eq!(options[3], 54, "server-id option tag");
        assert_eq!(options[4], 4, "server-id option length");
        assert_eq!(&options[5..9], &server_ip.octets(), "server-id value");
        assert_eq!(options[9], 56, "message option tag");
        let message_len = options[10] as usize;
        assert_eq!(
            &options[11..11 + message_len],
            RELEASE_MESSAGE.as_bytes(),
            "message text"
        );
        let after_message = 11 + message_len;
        assert_eq!(options[after_message], 61, "client-id option tag");
        assert_eq!(options[after_message + 1] as usize, client_id.len());
        assert_eq!(
            &options[after_message + 2..after_message + 2 + client_id.len()],
            &client_id
        );
        let terminator = after_message + 2 + client_id.len();
        assert_eq!(options[terminator], 255, "terminator");
        assert_eq!(options.len(), OPTIONS_LEN, "options area must be fixed-width");
        assert!(
            options[terminator + 1..].iter().all(|&b| b == 0),
            "bytes after the terminator must be zero-padded"
        );
    }

    #[test]
    fn omits_client_id_option_when_absent() {
        let pkt = build_release_packet(
            "10.0.0.1".parse().unwrap(),
            "10.0.0.254".parse().unwrap(),
            [0u8; 6],
            None,
        );
        assert_eq!(pkt.len(), PACKET_LEN);
        let options = &pkt[FIXED_HEADER_LEN..];
        assert!(!options.contains(&61));
        let terminator = options.iter().position(|&b| b == 255).expect("terminator present");
        assert!(
            options[terminator + 1..].iter().all(|&b| b == 0),
            "bytes after the terminator must be zero-padded"
        );
    }
}
