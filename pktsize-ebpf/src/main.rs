#![no_std]
#![no_main]
/// This eBPF program matches the IP payload size of every IPv4 packet against the size ranges configured by the user space program.
/// Note: All non-IPv4 packets and malformed IPv4 headers pass unmatched.
/// A rule only applies to the interfaces and the direction it is configured for.
use core::mem;

use aya_ebpf::{
    bindings::{TC_ACT_PIPE, TC_ACT_SHOT},
    macros::{classifier, map},
    maps::{HashMap, PerfEventArray},
    programs::TcContext,
};
use aya_log_ebpf::info;
use memoffset::offset_of;

use pktsize_common::{PacketLog, PktSizeRule, Target, TrafficDirection, MAX_RULES};

#[allow(non_upper_case_globals)]
#[allow(non_snake_case)]
#[allow(non_camel_case_types)]
#[allow(dead_code)]
mod bindings;
use bindings::{ethhdr, iphdr};

#[map] // contains the size rules, key: rule id (evaluation order), value: encoded range record, target and attach points
static PKTSIZE_RULES: HashMap<u32, PktSizeRule> =
    HashMap::<u32, PktSizeRule>::with_max_entries(MAX_RULES, 0);

#[map] // matches reported to user space
static EVENTS: PerfEventArray<PacketLog> = PerfEventArray::new(0);

/// Classifier attached at tc ingress
#[classifier]
pub fn pktsize_ingress(ctx: TcContext) -> i32 {
    match try_pktsize(&ctx, TrafficDirection::Ingress) {
        Ok(ret) => ret,
        Err(_) => TC_ACT_PIPE,
    }
}

/// Classifier attached at tc egress
#[classifier]
pub fn pktsize_egress(ctx: TcContext) -> i32 {
    match try_pktsize(&ctx, TrafficDirection::Egress) {
        Ok(ret) => ret,
        Err(_) => TC_ACT_PIPE,
    }
}

/// Classify packet via TC
///
/// # Arguments
/// * `ctx` - TC context
/// * `direction` - direction the calling program is attached to
///
/// # Returns
/// Action what to do with the package (SHOT or PIPE)
///
fn try_pktsize(ctx: &TcContext, direction: TrafficDirection) -> Result<i32, i64> {
    // determine protocol
    let h_proto = u16::from_be(ctx.load(offset_of!(ethhdr, h_proto))?);
    // only process ipv4 packets
    if h_proto != ETH_P_IP {
        return Ok(TC_ACT_PIPE);
    }
    let version_ihl: u8 = ctx.load(ETH_HDR_LEN + offset_of!(iphdr, version_ihl))?;
    let tot_len = u16::from_be(ctx.load(ETH_HDR_LEN + offset_of!(iphdr, tot_len))?);
    let payload_size = match pktsize_common::payload_size(tot_len, version_ihl) {
        Some(size) => size,
        None => return Ok(TC_ACT_PIPE),
    };
    // interface the packet is received on (ingress) or sent out of (egress)
    let ifindex = unsafe { (*ctx.skb.skb).ifindex };

    // make a decision what to do with the packet
    let lookup = |rule_id: u32| unsafe { PKTSIZE_RULES.get(&rule_id).copied() };
    let (rule_id, target) =
        match pktsize_common::select_rule(lookup, payload_size, ifindex, direction) {
            Some(found) => found,
            None => return Ok(TC_ACT_PIPE),
        };
    let action = match target {
        Target::Drop => TC_ACT_SHOT,
        Target::Accept => TC_ACT_PIPE,
    };
    info!(
        ctx,
        "RULE {}, SIZE {}, ACTION {}", rule_id, payload_size, action
    );
    let log_entry = PacketLog {
        rule_id,
        payload_size: payload_size as u32,
        target: target as u32,
    };
    EVENTS.output(ctx, &log_entry, 0);

    // return decision
    Ok(action)
}

// Linux kernel constants
const ETH_P_IP: u16 = 0x0800;
const ETH_HDR_LEN: usize = mem::size_of::<ethhdr>();

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    unsafe { core::hint::unreachable_unchecked() }
}
