//! Header layouts needed to find the TCP destination port of an IPv4 frame.
//!
//! Fields are raw byte arrays in network byte order, read at fixed offsets from
//! the start of their header. Accessors convert them to host values.

/// Ethernet header, the first bytes of every frame.
///
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
///  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  |                     destination_mac_addr                      |
///  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  | destination_mac_addr (con't)  |        source_mac_addr        |
///  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  |                    source_mac_addr (con't)                    |
///  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  |           eth_type            |
///  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
pub mod eth {
    /// The length of the Ethernet header.
    pub const ETH_LEN: usize = 14;

    /// Offset of the EtherType field.
    pub const ETHER_TYPE_OFFSET: usize = 12;

    /// EtherType of an IPv4 payload.
    pub const ETHER_TYPE_IPV4: u16 = 0x0800;

    pub type EtherType = [u8; 2];

    #[inline]
    pub fn ether_type(ether_type: EtherType) -> u16 {
        u16::from_be_bytes(ether_type)
    }
}

/// IPv4 header, present after the Ethernet header.
///
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |ip_ver | h_len |  ip_dscp  |ecn|        ip_total_length        |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |       ip_identification       |flags|   ip_fragment_offset    |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |    ip_ttl     |  ip_protocol  |          ip_checksum          |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                         source_ipaddr                         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                      destination_ipaddr                       |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                          ip_options                           |
/// /                              ...                              /
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
pub mod ipv4 {
    /// The length of the IPv4 header without options.
    pub const IPV4_LEN: usize = 20;

    /// The largest header length the 4-bit IHL field can express.
    pub const IPV4_MAX_LEN: usize = 60;

    pub const VIHL_OFFSET: usize = 0;
    pub const FRAGMENT_OFFSET: usize = 6;
    pub const PROTOCOL_OFFSET: usize = 9;

    /// Protocol number of TCP.
    pub const PROTO_TCP: u8 = 6;

    pub type Vihl = u8;
    pub type Fragment = [u8; 2];
    pub type Protocol = u8;

    /// Returns the IP version field (should be 4).
    #[inline]
    pub fn version(vihl: Vihl) -> u8 {
        (vihl >> 4) & 0xF
    }

    /// Returns the IP header length in bytes.
    #[inline]
    pub fn ihl(vihl: Vihl) -> usize {
        ((vihl & 0xF) as usize) << 2
    }

    /// Returns the fragmentation offset (13 bits).
    #[inline]
    pub fn frag_offset(fragment: Fragment) -> u16 {
        u16::from_be_bytes(fragment) & 0x1FFF
    }
}

/// TCP header, present after the IPv4 header and its options.
///
///    0                   1                   2                   3
///    0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
///   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///   |          Source Port          |       Destination Port        |
///   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///   |                        Sequence Number                        |
///   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///   |                    Acknowledgment Number                      |
///   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///   |  Data |     |N|C|E|U|A|P|R|S|F|                               |
///   | Offset| Rsrv|S|R|C|R|C|S|S|Y|I|            Window             |
///   |       |     | |W|E|G|K|H|T|N|N|                               |
///   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///   |           Checksum            |         Urgent Pointer        |
///   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
pub mod tcp {
    /// The length of the TCP header base structure.
    pub const TCP_LEN: usize = 20;

    pub const DST_PORT_OFFSET: usize = 2;

    /// Destination port field (16 bits).
    pub type DstPort = [u8; 2];

    /// Returns the destination port from network byte order.
    #[inline]
    pub fn dst_port(dst: DstPort) -> u16 {
        u16::from_be_bytes(dst)
    }
}
