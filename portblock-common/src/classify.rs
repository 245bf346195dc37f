//! Per-frame verdict for the port filter.
//!
//! The routine is written against [`Frame`] so the same parsing runs inside the
//! XDP program and in host tests. Every field read is bounds-checked by the
//! frame; any failed check lets the frame through.

use crate::hdr::{eth, ipv4, tcp};

/// Read access to the raw bytes of one link-layer frame.
pub trait Frame {
    /// Number of bytes available in the frame.
    fn len(&self) -> usize;

    /// Reads a `T` at `offset`, failing when `offset + size_of::<T>()` is past
    /// the end of the frame.
    fn load<T: Copy>(&self, offset: usize) -> Result<T, ()>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Drop,
}

/// Extracts the TCP destination port of an Ethernet/IPv4/TCP frame.
///
/// Returns `None` for anything else: short frames, non-IPv4 EtherTypes, IPv4
/// headers with a bad version or IHL below 5, non-TCP protocols, non-first
/// fragments and TCP headers cut short by the end of the frame.
#[inline(always)]
pub fn tcp_dst_port<F: Frame>(frame: &F) -> Option<u16> {
    let len = frame.len();

    if len < eth::ETH_LEN {
        return None;
    }
    let ether_type: eth::EtherType = frame.load(eth::ETHER_TYPE_OFFSET).ok()?;
    if eth::ether_type(ether_type) != eth::ETHER_TYPE_IPV4 {
        return None;
    }

    if len < eth::ETH_LEN + ipv4::IPV4_LEN {
        return None;
    }
    let vihl: ipv4::Vihl = frame.load(eth::ETH_LEN + ipv4::VIHL_OFFSET).ok()?;
    if ipv4::version(vihl) != 4 {
        return None;
    }
    let proto: ipv4::Protocol = frame.load(eth::ETH_LEN + ipv4::PROTOCOL_OFFSET).ok()?;
    if proto != ipv4::PROTO_TCP {
        return None;
    }

    let ihl = ipv4::ihl(vihl);
    if ihl < ipv4::IPV4_LEN {
        return None;
    }
    let fragment: ipv4::Fragment = frame.load(eth::ETH_LEN + ipv4::FRAGMENT_OFFSET).ok()?;
    if ipv4::frag_offset(fragment) != 0 {
        return None;
    }

    let l4 = eth::ETH_LEN + ihl;
    if len < l4 + tcp::TCP_LEN {
        return None;
    }
    let dst: tcp::DstPort = frame.load(l4 + tcp::DST_PORT_OFFSET).ok()?;

    Some(tcp::dst_port(dst))
}

/// Decides the fate of one frame.
///
/// `blocked_port` is only consulted once the frame is known to carry a TCP
/// destination port. An empty cell passes everything.
#[inline(always)]
pub fn classify<F, P>(frame: &F, blocked_port: P) -> Verdict
where
    F: Frame,
    P: FnOnce() -> Option<u16>,
{
    let Some(dst_port) = tcp_dst_port(frame) else {
        return Verdict::Pass;
    };
    match blocked_port() {
        Some(port) if port == dst_port => Verdict::Drop,
        _ => Verdict::Pass,
    }
}
