//! pnet datalink backend.

use std::io;
use std::time::Duration;

use macaddr::MacAddr6;
use pnet::datalink::{self, Channel, Config, DataLinkReceiver, DataLinkSender, NetworkInterface};
use tracing::{debug, info};

use super::{FrameReceiver, FrameTransmitter};
use crate::error::LinkError;

/// Interface metadata resolved at startup.
#[derive(Debug, Clone)]
pub struct InterfaceInfo {
    pub name: String,
    pub index: u32,
    pub mac: Option<MacAddr6>,
    pub is_up: bool,
    pub ips: Vec<String>,
}

impl From<&NetworkInterface> for InterfaceInfo {
    fn from(iface: &NetworkInterface) -> Self {
        Self {
            name: iface.name.clone(),
            index: iface.index,
            mac: iface.mac.map(|mac| MacAddr6::from(mac.octets())),
            is_up: iface.is_up(),
            ips: iface.ips.iter().map(|ip| ip.to_string()).collect(),
        }
    }
}

impl std::fmt::Display for InterfaceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = if self.is_up { "UP" } else { "DOWN" };
        let mac = self
            .mac
            .map(|mac| mac.to_string().to_lowercase())
            .unwrap_or_else(|| "no MAC".to_string());
        let ips = if self.ips.is_empty() {
            "no IP".to_string()
        } else {
            self.ips.join(", ")
        };
        write!(f, "{} (#{}): {} {} [{}]", self.name, self.index, status, mac, ips)
    }
}

/// List all network interfaces.
pub fn list_interfaces() -> Vec<InterfaceInfo> {
    datalink::interfaces().iter().map(InterfaceInfo::from).collect()
}

fn find_interface(name: &str) -> Result<NetworkInterface, LinkError> {
    datalink::interfaces()
        .into_iter()
        .find(|iface| iface.name == name)
        .ok_or_else(|| LinkError::InterfaceNotFound(name.to_string()))
}

fn open_channel(
    iface: &NetworkInterface,
    config: Config,
) -> Result<(Box<dyn DataLinkSender>, Box<dyn DataLinkReceiver>), LinkError> {
    match datalink::channel(iface, config) {
        Ok(Channel::Ethernet(tx, rx)) => Ok((tx, rx)),
        Ok(_) => Err(LinkError::ChannelCreation(
            "unsupported channel type".to_string(),
        )),
        Err(e) => {
            if e.kind() == io::ErrorKind::PermissionDenied
                || e.to_string().contains("Operation not permitted")
            {
                return Err(LinkError::InsufficientPermissions);
            }
            Err(LinkError::ChannelCreation(e.to_string()))
        }
    }
}

/// Capture and forwarding endpoints for the relay.
pub struct LinkEndpoints {
    pub receiver: PnetReceiver,
    pub transmitter: PnetTransmitter,
    /// Hardware address of the egress interface.
    pub local_mac: MacAddr6,
}

/// Open the capture channel on `capture` (promiscuous) and a separate
/// forwarding channel on `egress`.
///
/// `read_timeout` bounds each receive wait so the caller can observe
/// shutdown between frames.
pub fn open(
    capture: &str,
    egress: &str,
    read_timeout: Duration,
) -> Result<LinkEndpoints, LinkError> {
    let capture_iface = find_interface(capture)?;
    let egress_iface = if egress == capture {
        capture_iface.clone()
    } else {
        find_interface(egress)?
    };

    let local_mac = egress_iface
        .mac
        .map(|mac| MacAddr6::from(mac.octets()))
        .ok_or_else(|| LinkError::NoHardwareAddress(egress_iface.name.clone()))?;

    let capture_config = Config {
        read_timeout: Some(read_timeout),
        promiscuous: true,
        ..Config::default()
    };
    let (_, rx) = open_channel(&capture_iface, capture_config)?;
    info!(
        "Capture channel open on {} (index {}, promiscuous)",
        capture_iface.name, capture_iface.index
    );

    let forward_config = Config {
        promiscuous: false,
        ..Config::default()
    };
    let (tx, _) = open_channel(&egress_iface, forward_config)?;
    info!(
        "Forwarding channel open on {} (index {}, MAC {})",
        egress_iface.name, egress_iface.index, local_mac
    );

    Ok(LinkEndpoints {
        receiver: PnetReceiver { rx },
        transmitter: PnetTransmitter { tx },
        local_mac,
    })
}

/// Receiving half backed by a pnet datalink channel.
pub struct PnetReceiver {
    rx: Box<dyn DataLinkReceiver>,
}

impl FrameReceiver for PnetReceiver {
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        match self.rx.next() {
            Ok(packet) => {
                let len = packet.len().min(buf.len());
                if len < packet.len() {
                    debug!("Truncated {} byte frame to {}", packet.len(), len);
                }
                buf[..len].copy_from_slice(&packet[..len]);
                Ok(len)
            }
            Err(e) => match e.kind() {
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => {
                    Err(LinkError::Timeout)
                }
                _ => Err(LinkError::Io(e)),
            },
        }
    }
}

/// Transmitting half backed by a pnet datalink channel.
pub struct PnetTransmitter {
    tx: Box<dyn DataLinkSender>,
}

impl FrameTransmitter for PnetTransmitter {
    fn transmit(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        match self.tx.send_to(frame, None) {
            Some(Ok(())) => Ok(()),
            Some(Err(e)) if is_message_too_large(&e) => Err(LinkError::FrameTooLarge(frame.len())),
            Some(Err(e)) => Err(LinkError::Io(e)),
            None => Err(LinkError::Io(io::Error::other(
                "datalink sender rejected the frame",
            ))),
        }
    }
}

#[cfg(target_os = "linux")]
fn is_message_too_large(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::EMSGSIZE)
}

#[cfg(not(target_os = "linux"))]
fn is_message_too_large(_err: &io::Error) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_interface_is_reported() {
        let err = find_interface("no-such-iface0").unwrap_err();
        assert!(matches!(err, LinkError::InterfaceNotFound(name) if name == "no-such-iface0"));
    }

    #[test]
    fn test_open_fails_for_unknown_interface() {
        let result = open("no-such-iface0", "no-such-iface0", Duration::from_millis(10));
        assert!(matches!(result, Err(LinkError::InterfaceNotFound(_))));
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_emsgsize_is_classified_as_too_large() {
        assert!(is_message_too_large(&io::Error::from_raw_os_error(libc::EMSGSIZE)));
        assert!(!is_message_too_large(&io::Error::from_raw_os_error(libc::ENETDOWN)));
    }

    #[test]
    fn test_interface_info_display() {
        let info = InterfaceInfo {
            name: "eth0".to_string(),
            index: 2,
            mac: Some(MacAddr6::new(0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff)),
            is_up: true,
            ips: vec!["192.168.1.5/24".to_string()],
        };
        assert_eq!(
            info.to_string(),
            "eth0 (#2): UP aa:bb:cc:dd:ee:ff [192.168.1.5/24]"
        );
    }
}
