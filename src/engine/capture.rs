//! Packet capture methods
//!
//! Supports:
//! - PCAP file replay (Ethernet and raw-IP link types)
//! - In-memory frames (tests and tooling)

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use etherparse::{LinkSlice, NetSlice, SlicedPacket, VlanSlice};
use pcap_file::pcap::PcapReader;
use pcap_file::DataLink;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::core::PacketProto;

/// Capture method
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMethod {
    /// PCAP file replay
    #[default]
    Pcap,
    /// Frames supplied in memory
    Memory,
}

/// Capture configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Capture method
    #[serde(default)]
    pub method: CaptureMethod,
    /// PCAP file path (for pcap method)
    #[serde(default)]
    pub pcap_file: Option<String>,
}

/// A captured frame, trimmed to the network layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub data: Vec<u8>,
    pub proto: PacketProto,
    /// Capture timestamp, when the source has one
    pub timestamp: Option<Duration>,
}

impl RawFrame {
    pub fn new(data: Vec<u8>, proto: PacketProto) -> Self {
        Self {
            data,
            proto,
            timestamp: None,
        }
    }
}

/// Capture statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CaptureStats {
    /// Frames read from the source
    pub received: u64,
    /// Frames without a well-formed IP network layer
    pub skipped: u64,
}

/// Trait for packet capture implementations
pub trait PacketCapture: Send {
    /// Get the next frame; `None` once the source is exhausted
    fn next_packet(&mut self) -> anyhow::Result<Option<RawFrame>>;

    /// Get capture statistics
    fn stats(&self) -> CaptureStats;
}

/// Create a capture based on configuration
pub fn create_capture(config: &CaptureConfig) -> anyhow::Result<Box<dyn PacketCapture>> {
    match config.method {
        CaptureMethod::Pcap => {
            let path = config
                .pcap_file
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("PCAP file path required"))?;
            Ok(Box::new(PcapCapture::open(path)?))
        }
        CaptureMethod::Memory => Ok(Box::new(MemoryCapture::default())),
    }
}

/// Capture over frames held in memory
#[derive(Debug, Default)]
pub struct MemoryCapture {
    frames: VecDeque<RawFrame>,
    stats: CaptureStats,
}

impl MemoryCapture {
    pub fn new<I>(frames: I) -> Self
    where
        I: IntoIterator<Item = RawFrame>,
    {
        Self {
            frames: frames.into_iter().collect(),
            stats: CaptureStats::default(),
        }
    }

    pub fn push(&mut self, frame: RawFrame) {
        self.frames.push_back(frame);
    }
}

impl PacketCapture for MemoryCapture {
    fn next_packet(&mut self) -> anyhow::Result<Option<RawFrame>> {
        let frame = self.frames.pop_front();
        if frame.is_some() {
            self.stats.received += 1;
        }
        Ok(frame)
    }

    fn stats(&self) -> CaptureStats {
        self.stats
    }
}

/// PCAP file replay capture
pub struct PcapCapture<R: Read = BufReader<File>> {
    reader: PcapReader<R>,
    datalink: DataLink,
    stats: CaptureStats,
}

impl PcapCapture<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open pcap file: {}", path.display()))?;
        Self::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to read pcap header: {}", path.display()))
    }
}

impl<R: Read> PcapCapture<R> {
    pub fn from_reader(reader: R) -> anyhow::Result<Self> {
        let reader = PcapReader::new(reader)?;
        let datalink = reader.header().datalink;
        match datalink {
            DataLink::ETHERNET | DataLink::RAW | DataLink::IPV4 | DataLink::IPV6 => {}
            other => anyhow::bail!("unsupported pcap link type: {:?}", other),
        }
        debug!(?datalink, "pcap capture opened");

        Ok(Self {
            reader,
            datalink,
            stats: CaptureStats::default(),
        })
    }
}

impl<R: Read + Send> PacketCapture for PcapCapture<R> {
    fn next_packet(&mut self) -> anyhow::Result<Option<RawFrame>> {
        while let Some(packet) = self.reader.next_packet() {
            let packet = packet.context("Failed to read pcap record")?;
            self.stats.received += 1;

            match network_layer(self.datalink, &packet.data) {
                Some((ip, proto)) => {
                    return Ok(Some(RawFrame {
                        data: ip.to_vec(),
                        proto,
                        timestamp: Some(packet.timestamp),
                    }));
                }
                None => {
                    trace!(len = packet.data.len(), "skipping non-IP frame");
                    self.stats.skipped += 1;
                }
            }
        }
        Ok(None)
    }

    fn stats(&self) -> CaptureStats {
        self.stats
    }
}

/// Network-layer bytes and protocol of a link-layer frame.
///
/// Ethernet frames (VLAN and QinQ tagged included) are sliced down to the
/// payload of the innermost tag; raw-IP link types carry the IP packet as is.
/// Frames that etherparse cannot slice to an IP layer are not returned.
fn network_layer(datalink: DataLink, frame: &[u8]) -> Option<(&[u8], PacketProto)> {
    match datalink {
        DataLink::ETHERNET => {
            let sliced = SlicedPacket::from_ethernet(frame).ok()?;
            let proto = ip_proto(&sliced)?;
            let payload = match (&sliced.vlan, &sliced.link) {
                (Some(VlanSlice::SingleVlan(vlan)), _) => vlan.payload(),
                (Some(VlanSlice::DoubleVlan(vlan)), _) => vlan.payload(),
                (None, Some(LinkSlice::Ethernet2(eth))) => eth.payload(),
                _ => return None,
            };
            Some((payload.payload, proto))
        }
        _ => {
            let sliced = SlicedPacket::from_ip(frame).ok()?;
            Some((frame, ip_proto(&sliced)?))
        }
    }
}

fn ip_proto(sliced: &SlicedPacket<'_>) -> Option<PacketProto> {
    match &sliced.net {
        Some(NetSlice::Ipv4(_)) => Some(PacketProto::Ipv4),
        Some(NetSlice::Ipv6(_)) => Some(PacketProto::Ipv6),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use etherparse::PacketBuilder;
    use pcap_file::pcap::{PcapHeader, PcapPacket, PcapWriter};

    const ETHERTYPE_IPV4: u16 = 0x0800;
    const ETHERTYPE_IPV6: u16 = 0x86dd;
    const ETHERTYPE_VLAN: u16 = 0x8100;
    const ETHERTYPE_QINQ: u16 = 0x88a8;
    const ETHERTYPE_ARP: u16 = 0x0806;

    fn ethernet(ethertype: u16, payload: &[u8]) -> Vec<u8> {
        let mut frame = vec![0u8; 12];
        frame.extend_from_slice(&ethertype.to_be_bytes());
        frame.extend_from_slice(payload);
        frame
    }

    fn ipv4_udp(payload: &[u8]) -> Vec<u8> {
        let builder = PacketBuilder::ipv4([192, 0, 2, 1], [192, 0, 2, 2], 64).udp(40000, 3544);
        let mut packet = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut packet, payload).unwrap();
        packet
    }

    fn ipv6_udp(payload: &[u8]) -> Vec<u8> {
        let mut src = [0u8; 16];
        src[15] = 1;
        let mut dst = [0u8; 16];
        dst[15] = 2;
        let builder = PacketBuilder::ipv6(src, dst, 64).udp(3544, 3544);
        let mut packet = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut packet, payload).unwrap();
        packet
    }

    /// Ethernet header followed by one 802.1Q/802.1ad tag per entry of `tags`
    fn tagged(tags: &[u16], ethertype: u16, payload: &[u8]) -> Vec<u8> {
        let mut frame = vec![0u8; 12];
        let mut types = tags.iter().copied().chain(std::iter::once(ethertype));
        if let Some(first) = types.next() {
            frame.extend_from_slice(&first.to_be_bytes());
        }
        for next in types {
            frame.extend_from_slice(&[0x00, 0x64]);
            frame.extend_from_slice(&next.to_be_bytes());
        }
        frame.extend_from_slice(payload);
        frame
    }

    fn write_pcap(datalink: DataLink, frames: &[Vec<u8>]) -> Vec<u8> {
        let header = PcapHeader {
            datalink,
            ..Default::default()
        };
        let mut writer = PcapWriter::with_header(Vec::new(), header).unwrap();
        for (i, frame) in frames.iter().enumerate() {
            let packet = PcapPacket::new(Duration::from_millis(i as u64), frame.len() as u32, frame);
            writer.write_packet(&packet).unwrap();
        }
        writer.into_writer()
    }

    #[test]
    fn test_capture_config_default() {
        let config = CaptureConfig::default();
        assert_eq!(config.method, CaptureMethod::Pcap);
        assert!(config.pcap_file.is_none());
        assert!(create_capture(&config).is_err());
    }

    #[test]
    fn test_memory_capture() {
        let mut capture = MemoryCapture::new(vec![RawFrame::new(vec![0x45], PacketProto::Raw)]);
        capture.push(RawFrame::new(vec![0x60], PacketProto::Raw));

        assert_eq!(capture.next_packet().unwrap().unwrap().data, vec![0x45]);
        assert_eq!(capture.next_packet().unwrap().unwrap().data, vec![0x60]);
        assert!(capture.next_packet().unwrap().is_none());
        assert_eq!(capture.stats().received, 2);
    }

    #[test]
    fn test_network_layer_ethernet() {
        let ip6 = ipv6_udp(b"inner");
        let frame = ethernet(ETHERTYPE_IPV6, &ip6);
        assert_eq!(network_layer(DataLink::ETHERNET, &frame), Some((&ip6[..], PacketProto::Ipv6)));

        let ip4 = ipv4_udp(b"payload");
        let vlan = tagged(&[ETHERTYPE_VLAN], ETHERTYPE_IPV4, &ip4);
        assert_eq!(network_layer(DataLink::ETHERNET, &vlan), Some((&ip4[..], PacketProto::Ipv4)));

        let qinq = tagged(&[ETHERTYPE_QINQ, ETHERTYPE_VLAN], ETHERTYPE_IPV4, &ip4);
        assert_eq!(network_layer(DataLink::ETHERNET, &qinq), Some((&ip4[..], PacketProto::Ipv4)));

        let arp = ethernet(ETHERTYPE_ARP, &[0u8; 28]);
        assert_eq!(network_layer(DataLink::ETHERNET, &arp), None);
        assert_eq!(network_layer(DataLink::ETHERNET, &[0u8; 5]), None);
    }

    #[test]
    fn test_network_layer_rejects_malformed_ip() {
        // IPv4 total length far beyond the frame
        let frame = ethernet(ETHERTYPE_IPV4, &[0x45; 20]);
        assert_eq!(network_layer(DataLink::ETHERNET, &frame), None);
        assert_eq!(network_layer(DataLink::RAW, &[0x45; 20]), None);
    }

    #[test]
    fn test_pcap_replay_ethernet() {
        let ip4 = ipv4_udp(b"first");
        let frames = vec![
            ethernet(ETHERTYPE_IPV4, &ip4),
            ethernet(ETHERTYPE_ARP, &[0u8; 28]),
            ethernet(ETHERTYPE_IPV6, &ipv6_udp(b"second")),
        ];
        let bytes = write_pcap(DataLink::ETHERNET, &frames);
        let mut capture = PcapCapture::from_reader(&bytes[..]).unwrap();

        let first = capture.next_packet().unwrap().unwrap();
        assert_eq!(first.proto, PacketProto::Ipv4);
        assert_eq!(first.data, ip4);
        assert_eq!(first.timestamp, Some(Duration::from_millis(0)));

        let second = capture.next_packet().unwrap().unwrap();
        assert_eq!(second.proto, PacketProto::Ipv6);
        assert_eq!(second.timestamp, Some(Duration::from_millis(2)));

        assert!(capture.next_packet().unwrap().is_none());
        assert_eq!(capture.stats(), CaptureStats { received: 3, skipped: 1 });
    }

    #[test]
    fn test_pcap_replay_raw_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.pcap");
        let ip6 = ipv6_udp(&[0u8; 12]);
        std::fs::write(&path, write_pcap(DataLink::RAW, &[ip6.clone(), vec![0x60; 40]])).unwrap();

        let config = CaptureConfig {
            method: CaptureMethod::Pcap,
            pcap_file: Some(path.display().to_string()),
        };
        let mut capture = create_capture(&config).unwrap();
        let frame = capture.next_packet().unwrap().unwrap();
        assert_eq!(frame.proto, PacketProto::Ipv6);
        assert_eq!(frame.data, ip6);

        assert!(capture.next_packet().unwrap().is_none());
        assert_eq!(capture.stats(), CaptureStats { received: 2, skipped: 1 });
    }

    #[test]
    fn test_unsupported_link_type() {
        let bytes = write_pcap(DataLink::IEEE802_11, &[]);
        assert!(PcapCapture::from_reader(&bytes[..]).is_err());
    }

    #[test]
    fn test_open_missing_file() {
        let err = PcapCapture::open("/nonexistent/trace.pcap").err().unwrap();
        assert!(err.to_string().contains("Failed to open pcap file"));
    }
}
