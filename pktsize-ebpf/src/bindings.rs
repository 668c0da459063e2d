// Kernel data structures read by the classifier, cf. include/uapi/linux/if_ether.h and include/uapi/linux/ip.h

#[repr(C)]
#[derive(Copy, Clone)]
pub struct ethhdr {
    pub h_dest: [u8; 6usize],
    pub h_source: [u8; 6usize],
    pub h_proto: u16,
}

/// IP Header https://www.rfc-editor.org/rfc/rfc791
#[repr(C)]
#[derive(Copy, Clone)]
pub struct iphdr {
    pub version_ihl: u8,
    pub tos: u8,
    pub tot_len: u16,
    pub id: u16,
    pub frag_off: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub check: u16,
    pub saddr: u32,
    pub daddr: u32,
}
