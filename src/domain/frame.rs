//! Owned Ethernet frames.

use std::fmt;
use std::net::Ipv4Addr;

use macaddr::MacAddr6;
use pnet::packet::ethernet::{EtherTypes, EthernetPacket, MutableEthernetPacket};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::Packet;
use pnet::util::MacAddr;

/// Receive buffer size. Comfortably above a 1514-byte Ethernet frame.
pub const FRAME_BUFFER_SIZE: usize = 2048;

/// A captured Ethernet frame.
///
/// Owns a fixed-size buffer and the number of bytes actually captured into
/// it. A frame is never shared: it moves from the capture loop into the
/// queue and from the queue into the worker, and is freed when dropped.
pub struct Frame {
    buf: Box<[u8]>,
    len: usize,
}

impl Frame {
    /// Allocate an empty frame with a [`FRAME_BUFFER_SIZE`] buffer.
    pub fn new() -> Self {
        Self::with_buffer_size(FRAME_BUFFER_SIZE)
    }

    /// Allocate an empty frame with a buffer of `size` bytes.
    pub fn with_buffer_size(size: usize) -> Self {
        Self {
            buf: vec![0u8; size].into_boxed_slice(),
            len: 0,
        }
    }

    /// Build a frame holding a copy of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            buf: bytes.into(),
            len: bytes.len(),
        }
    }

    /// The whole buffer, for receiving into.
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    /// Record how many bytes of the buffer hold the frame.
    ///
    /// Clamped to the buffer size.
    pub fn set_len(&mut self, len: usize) {
        self.len = len.min(self.buf.len());
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The captured bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Whether this is an IPv4 frame sent from `source`.
    ///
    /// Undersized and non-IPv4 frames never match.
    pub fn matches_source(&self, source: Ipv4Addr) -> bool {
        let Some(ethernet) = EthernetPacket::new(self.as_bytes()) else {
            return false;
        };
        if ethernet.get_ethertype() != EtherTypes::Ipv4 {
            return false;
        }
        Ipv4Packet::new(ethernet.payload())
            .map(|ip| ip.get_source() == source)
            .unwrap_or(false)
    }

    /// Overwrite the Ethernet source and destination addresses.
    ///
    /// Returns `false` if the frame is too short to carry an Ethernet header.
    pub fn rewrite_addresses(&mut self, source: MacAddr6, destination: MacAddr6) -> bool {
        let len = self.len;
        match MutableEthernetPacket::new(&mut self.buf[..len]) {
            Some(mut ethernet) => {
                ethernet.set_source(to_pnet_mac(source));
                ethernet.set_destination(to_pnet_mac(destination));
                true
            }
            None => false,
        }
    }

    /// Ethernet source address, if the frame carries a full header.
    pub fn source_mac(&self) -> Option<MacAddr6> {
        EthernetPacket::new(self.as_bytes()).map(|e| MacAddr6::from(e.get_source().octets()))
    }

    /// Ethernet destination address, if the frame carries a full header.
    pub fn destination_mac(&self) -> Option<MacAddr6> {
        EthernetPacket::new(self.as_bytes())
            .map(|e| MacAddr6::from(e.get_destination().octets()))
    }

    /// Human-readable description for diagnostics.
    pub fn summary(&self) -> FrameSummary<'_> {
        FrameSummary { frame: self }
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("len", &self.len)
            .field("buffer", &self.buf.len())
            .finish()
    }
}

fn to_pnet_mac(mac: MacAddr6) -> MacAddr {
    let [a, b, c, d, e, f] = mac.into_array();
    MacAddr::new(a, b, c, d, e, f)
}

/// Display adapter returned by [`Frame::summary`].
pub struct FrameSummary<'a> {
    frame: &'a Frame,
}

impl fmt::Display for FrameSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bytes", self.frame.len())?;

        let Some(ethernet) = EthernetPacket::new(self.frame.as_bytes()) else {
            return write!(f, " (truncated)");
        };
        write!(
            f,
            " | {} -> {}",
            ethernet.get_source(),
            ethernet.get_destination()
        )?;

        let ethertype = ethernet.get_ethertype();
        if ethertype == EtherTypes::Ipv6 {
            return write!(f, " | ether type 0x86dd (IPv6)");
        }
        if ethertype != EtherTypes::Ipv4 {
            return write!(f, " | ether type {:#06x} (other)", ethertype.0);
        }

        let Some(ip) = Ipv4Packet::new(ethernet.payload()) else {
            return write!(f, " | IPv4 (truncated)");
        };
        let protocol = ip.get_next_level_protocol();
        let protocol_name = if protocol == IpNextHeaderProtocols::Icmp {
            "ICMP"
        } else if protocol == IpNextHeaderProtocols::Tcp {
            "TCP"
        } else if protocol == IpNextHeaderProtocols::Udp {
            "UDP"
        } else {
            "other"
        };
        write!(
            f,
            " | IPv4 {} -> {} | length {} | protocol {:#04x} ({}) | id {}",
            ip.get_source(),
            ip.get_destination(),
            ip.get_total_length(),
            protocol.0,
            protocol_name,
            ip.get_identification()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pnet::packet::ethernet::EtherType;
    use pnet::packet::ipv4::MutableIpv4Packet;

    const ETH_HEADER: usize = 14;
    const IPV4_HEADER: usize = 20;

    fn build_frame(ethertype: EtherType, source: Ipv4Addr, total: usize) -> Frame {
        let mut bytes = vec![0u8; total];
        {
            let mut eth = MutableEthernetPacket::new(&mut bytes).unwrap();
            eth.set_source(MacAddr::new(0x02, 0, 0, 0, 0, 0x01));
            eth.set_destination(MacAddr::new(0x02, 0, 0, 0, 0, 0x02));
            eth.set_ethertype(ethertype);
        }
        if total >= ETH_HEADER + IPV4_HEADER {
            let mut ip = MutableIpv4Packet::new(&mut bytes[ETH_HEADER..]).unwrap();
            ip.set_version(4);
            ip.set_header_length(5);
            ip.set_total_length((total - ETH_HEADER) as u16);
            ip.set_identification(0x1234);
            ip.set_next_level_protocol(IpNextHeaderProtocols::Udp);
            ip.set_source(source);
            ip.set_destination(Ipv4Addr::new(10, 0, 0, 2));
        }
        Frame::from_bytes(&bytes)
    }

    mod buffer_tests {
        use super::*;

        #[test]
        fn new_frame_is_empty_with_full_buffer() {
            let mut frame = Frame::new();
            assert!(frame.is_empty());
            assert_eq!(frame.buffer_mut().len(), FRAME_BUFFER_SIZE);
        }

        #[test]
        fn set_len_is_clamped_to_buffer() {
            let mut frame = Frame::with_buffer_size(64);
            frame.set_len(100);
            assert_eq!(frame.len(), 64);
        }

        #[test]
        fn as_bytes_covers_captured_length() {
            let mut frame = Frame::with_buffer_size(8);
            frame.buffer_mut()[..3].copy_from_slice(&[1, 2, 3]);
            frame.set_len(3);
            assert_eq!(frame.as_bytes(), &[1u8, 2, 3]);
        }
    }

    mod matches_source_tests {
        use super::*;

        #[test]
        fn matches_target_source() {
            let source = Ipv4Addr::new(192, 168, 1, 10);
            let frame = build_frame(EtherTypes::Ipv4, source, 60);
            assert!(frame.matches_source(source));
        }

        #[test]
        fn rejects_other_source() {
            let frame = build_frame(EtherTypes::Ipv4, Ipv4Addr::new(192, 168, 1, 11), 60);
            assert!(!frame.matches_source(Ipv4Addr::new(192, 168, 1, 10)));
        }

        #[test]
        fn rejects_non_ipv4_frames() {
            let source = Ipv4Addr::new(192, 168, 1, 10);
            let frame = build_frame(EtherTypes::Arp, source, 60);
            assert!(!frame.matches_source(source));
        }

        #[test]
        fn rejects_undersized_frames() {
            let source = Ipv4Addr::new(192, 168, 1, 10);
            let full = build_frame(EtherTypes::Ipv4, source, 60);
            let short = Frame::from_bytes(&full.as_bytes()[..ETH_HEADER + IPV4_HEADER - 1]);
            assert!(!short.matches_source(source));
            assert!(!Frame::from_bytes(&[0u8; 10]).matches_source(source));
        }

        #[test]
        fn matches_minimal_header_sized_frame() {
            let source = Ipv4Addr::new(172, 16, 0, 1);
            let frame = build_frame(EtherTypes::Ipv4, source, ETH_HEADER + IPV4_HEADER);
            assert!(frame.matches_source(source));
        }
    }

    mod rewrite_tests {
        use super::*;

        #[test]
        fn rewrites_both_addresses_and_keeps_payload() {
            let mut frame = build_frame(EtherTypes::Ipv4, Ipv4Addr::new(10, 0, 0, 1), 60);
            let payload_before = frame.as_bytes()[ETH_HEADER..].to_vec();

            let local = MacAddr6::new(0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff);
            let gateway = MacAddr6::new(0xcc, 0xce, 0x1e, 0x3a, 0x40, 0xe8);
            assert!(frame.rewrite_addresses(local, gateway));

            assert_eq!(frame.source_mac(), Some(local));
            assert_eq!(frame.destination_mac(), Some(gateway));
            assert_eq!(&frame.as_bytes()[..6], gateway.as_bytes());
            assert_eq!(&frame.as_bytes()[6..12], local.as_bytes());
            assert_eq!(&frame.as_bytes()[ETH_HEADER..], &payload_before[..]);
        }

        #[test]
        fn refuses_frames_without_ethernet_header() {
            let mut frame = Frame::from_bytes(&[0u8; 8]);
            let mac = MacAddr6::new(1, 2, 3, 4, 5, 6);
            assert!(!frame.rewrite_addresses(mac, mac));
            assert_eq!(frame.as_bytes(), &[0u8; 8]);
        }
    }

    mod summary_tests {
        use super::*;

        #[test]
        fn describes_ipv4_frame() {
            let frame = build_frame(EtherTypes::Ipv4, Ipv4Addr::new(10, 0, 0, 1), 60);
            let text = frame.summary().to_string();
            assert!(text.starts_with("60 bytes"));
            assert!(text.contains("10.0.0.1 -> 10.0.0.2"));
            assert!(text.contains("(UDP)"));
            assert!(text.contains("id 4660"));
        }

        #[test]
        fn describes_non_ipv4_frame() {
            let frame = build_frame(EtherTypes::Arp, Ipv4Addr::new(10, 0, 0, 1), 60);
            assert!(frame.summary().to_string().contains("0x0806 (other)"));
        }

        #[test]
        fn describes_truncated_frame() {
            let frame = Frame::from_bytes(&[0u8; 4]);
            assert_eq!(frame.summary().to_string(), "4 bytes (truncated)");
        }
    }
}
