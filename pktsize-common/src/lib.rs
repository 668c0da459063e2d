#![no_std]
//! Types and primitive functions shared by the pktsize user space application and the eBPF classifier.
//! Everything here works on primitive types only, because it must be usable inside an eBPF module.

use core::fmt;
use core::mem;

/// Name of the match extension. The classifier program is registered under the same name.
pub const MATCH_NAME: &str = "pktsize";

/// Largest representable packet size, used for an open upper bound
pub const MAX_PKT_SIZE: u16 = u16::MAX;

/// Maximum number of size rules the classifier evaluates
pub const MAX_RULES: u32 = 16;

/// Minimum length of an IPv4 header in bytes (ihl = 5)
pub const MIN_IPV4_HDR_LEN: u16 = 20;

/// Alignment of match data copied between user space and the filter engine
pub const MATCH_DATA_ALIGN: usize = 8;

/// Size of the range record itself
pub const PKTSIZE_INFO_SIZE: usize = mem::size_of::<PktSizeInfo>();

/// Size of the range record once padded to the match data alignment. The engine copies exactly this many bytes.
pub const MATCH_DATA_SIZE: usize = xt_align(PKTSIZE_INFO_SIZE);

/// Rounds `size` up to the next multiple of [`MATCH_DATA_ALIGN`]
pub const fn xt_align(size: usize) -> usize {
    (size + MATCH_DATA_ALIGN - 1) & !(MATCH_DATA_ALIGN - 1)
}

/// Inclusive packet size range. The invariant `min_size <= max_size` holds for every value of this type.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PktSizeInfo {
    min_size: u16,
    max_size: u16,
}

impl PktSizeInfo {
    /// Creates a range record
    ///
    /// # Arguments
    /// * `min_size` - inclusive lower bound
    /// * `max_size` - inclusive upper bound
    ///
    /// Returns None if the lower bound is greater than the upper bound
    pub const fn new(min_size: u16, max_size: u16) -> Option<Self> {
        if min_size > max_size {
            return None;
        }
        Some(PktSizeInfo { min_size, max_size })
    }

    /// Range containing exactly one size
    pub const fn exact(size: u16) -> Self {
        PktSizeInfo {
            min_size: size,
            max_size: size,
        }
    }

    pub const fn min_size(&self) -> u16 {
        self.min_size
    }

    pub const fn max_size(&self) -> u16 {
        self.max_size
    }

    pub const fn is_exact(&self) -> bool {
        self.min_size == self.max_size
    }

    /// Closed interval test of an observed payload size against this range
    ///
    /// # Arguments
    /// * `observed_size` - IP payload size of the packet
    ///
    /// Returns true if the size lies within [min_size, max_size]
    pub const fn matches(&self, observed_size: u16) -> bool {
        observed_size >= self.min_size && observed_size <= self.max_size
    }

    /// Serializes the record into the match data layout: `min_size` then `max_size` in native byte order, zero padded
    pub fn encode(&self) -> [u8; MATCH_DATA_SIZE] {
        let mut data = [0u8; MATCH_DATA_SIZE];
        let min = self.min_size.to_ne_bytes();
        let max = self.max_size.to_ne_bytes();
        data[0] = min[0];
        data[1] = min[1];
        data[2] = max[0];
        data[3] = max[1];
        data
    }

    /// Deserializes match data written by [`PktSizeInfo::encode`]
    ///
    /// Returns None if the buffer does not have exactly [`MATCH_DATA_SIZE`] bytes or holds an inverted range
    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() != MATCH_DATA_SIZE {
            return None;
        }
        let min_size = u16::from_ne_bytes([data[0], data[1]]);
        let max_size = u16::from_ne_bytes([data[2], data[3]]);
        Self::new(min_size, max_size)
    }
}

/// Numeric part of the size specification, e.g. "65" or "80:120"
impl fmt::Display for PktSizeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_exact() {
            write!(f, "{}", self.min_size)
        } else {
            write!(f, "{}:{}", self.min_size, self.max_size)
        }
    }
}

/// Computes the IP payload size (total length minus header length) of an IPv4 packet
///
/// # Arguments
/// * `tot_len` - total length field of the IP header in host byte order
/// * `version_ihl` - first byte of the IP header (version and header length in 32 bit words)
///
/// Returns None for a malformed header: not IPv4, header shorter than 20 bytes or longer than the packet
pub const fn payload_size(tot_len: u16, version_ihl: u8) -> Option<u16> {
    if version_ihl >> 4 != 4 {
        return None;
    }
    let header_len = (version_ihl & 0x0f) as u16 * 4;
    if header_len < MIN_IPV4_HDR_LEN {
        return None;
    }
    tot_len.checked_sub(header_len)
}

/// What the classifier does with a packet matching a rule
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    Accept = 0,
    Drop = 1,
}

impl Target {
    pub const fn from_u32(value: u32) -> Option<Target> {
        match value {
            0 => Some(Target::Accept),
            1 => Some(Target::Drop),
            _ => None,
        }
    }
}

/// Traffic direction a classifier program is attached to
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrafficDirection {
    Ingress = 0,
    Egress = 1,
}

impl TrafficDirection {
    /// Name of the classifier program handling this direction
    pub const fn program_name(&self) -> &'static str {
        match self {
            TrafficDirection::Ingress => INGRESS_PROGRAM,
            TrafficDirection::Egress => EGRESS_PROGRAM,
        }
    }
}

/// Classifier program attached at tc ingress
pub const INGRESS_PROGRAM: &str = "pktsize_ingress";

/// Classifier program attached at tc egress
pub const EGRESS_PROGRAM: &str = "pktsize_egress";

/// Maximum number of interfaces a single rule applies to
pub const MAX_RULE_IFACES: usize = 4;

/// Value of the rule map: encoded range record, target and the attach points (direction, interfaces) the rule applies to
#[repr(C)]
#[derive(Clone, Copy)]
pub struct PktSizeRule {
    pub match_data: [u8; MATCH_DATA_SIZE],
    pub target: u32,
    pub direction: u32,
    pub ifindex: [u32; MAX_RULE_IFACES], // 0 marks an unused entry
}

impl PktSizeRule {
    /// Creates a map value
    ///
    /// # Arguments
    /// * `info` - range record
    /// * `target` - action for matching packets
    /// * `direction` - direction the rule applies to
    /// * `ifindex` - interface indexes the rule applies to, at most [`MAX_RULE_IFACES`] are kept
    pub fn new(
        info: &PktSizeInfo,
        target: Target,
        direction: TrafficDirection,
        ifindex: &[u32],
    ) -> Self {
        let mut indexes = [0u32; MAX_RULE_IFACES];
        for (slot, index) in indexes.iter_mut().zip(ifindex) {
            *slot = *index;
        }
        PktSizeRule {
            match_data: info.encode(),
            target: target as u32,
            direction: direction as u32,
            ifindex: indexes,
        }
    }

    pub fn record(&self) -> Option<PktSizeInfo> {
        PktSizeInfo::decode(&self.match_data)
    }

    /// Returns true if the rule is configured for the given interface and direction
    pub fn applies_to(&self, ifindex: u32, direction: TrafficDirection) -> bool {
        if ifindex == 0 || self.direction != direction as u32 {
            return false;
        }
        for index in self.ifindex {
            if index == ifindex {
                return true;
            }
        }
        false
    }
}

/// Selects the rule deciding about a packet: the lowest rule id that applies to the attach point,
/// decodes to a valid range containing the payload size and has a known target
///
/// # Arguments
/// * `lookup` - returns the rule stored under a rule id, if any
/// * `payload_size` - IP payload size of the packet
/// * `ifindex` - interface the packet was seen on
/// * `direction` - direction of the classifier seeing the packet
///
/// Returns rule id and target of the deciding rule, None if no rule matches
pub fn select_rule<F>(
    lookup: F,
    payload_size: u16,
    ifindex: u32,
    direction: TrafficDirection,
) -> Option<(u32, Target)>
where
    F: Fn(u32) -> Option<PktSizeRule>,
{
    for rule_id in 0..MAX_RULES {
        let rule = match lookup(rule_id) {
            Some(rule) => rule,
            None => continue,
        };
        if !rule.applies_to(ifindex, direction) {
            continue;
        }
        // records that do not decode are never matched
        let info = match rule.record() {
            Some(info) => info,
            None => continue,
        };
        if !info.matches(payload_size) {
            continue;
        }
        if let Some(target) = Target::from_u32(rule.target) {
            return Some((rule_id, target));
        }
    }
    None
}

/// Event sent from the classifier to user space when a rule matched
#[repr(C)]
#[derive(Clone, Copy)]
pub struct PacketLog {
    pub rule_id: u32,
    pub payload_size: u32,
    pub target: u32,
}

#[cfg(feature = "user")]
unsafe impl aya::Pod for PktSizeRule {}

#[cfg(feature = "user")]
unsafe impl aya::Pod for PacketLog {}
