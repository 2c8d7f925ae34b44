//! Numeric wire constants. Hand-declared rather than generated from system
//! headers: every value here is fully enumerated by the kernel UAPI for the
//! `ipset` (subsystem 6) and `nf_tables` (subsystem 10) netfilter netlink
//! families, so there is no header to bind against.

pub const NFNL_SUBSYS_IPSET: u16 = 6;
pub const NFNL_SUBSYS_NFTABLES: u16 = 10;

pub const IPSET_CMD_TEST: u16 = 11;
pub const IPSET_CMD_ADD: u16 = 9;

pub const IPSET_ATTR_PROTOCOL: u16 = 1;
pub const IPSET_ATTR_SETNAME: u16 = 2;
pub const IPSET_ATTR_DATA: u16 = 7;
pub const IPSET_ATTR_ADT: u16 = 8;
pub const IPSET_ATTR_LINENO: u16 = 9;
pub const IPSET_ATTR_IP: u16 = 1;
pub const IPSET_ATTR_IPADDR_IPV4: u16 = 1;
pub const IPSET_ATTR_IPADDR_IPV6: u16 = 2;

pub const IPSET_PROTOCOL: u8 = 6;
pub const IPSET_MAXNAMELEN: usize = 32;

pub const IPSET_ERR_EXIST: i32 = 4103;

pub const NFT_MSG_NEWSETELEM: u16 = 12;
pub const NFT_MSG_GETSETELEM: u16 = 13;
pub const NFNL_MSG_BATCH_BEGIN: u16 = 16;
pub const NFNL_MSG_BATCH_END: u16 = 17;

pub const NFTA_SET_ELEM_LIST_TABLE: u16 = 1;
pub const NFTA_SET_ELEM_LIST_SET: u16 = 2;
pub const NFTA_SET_ELEM_LIST_ELEMENTS: u16 = 3;
pub const NFTA_LIST_ELEM: u16 = 1;
pub const NFTA_SET_ELEM_KEY: u16 = 1;
pub const NFTA_SET_ELEM_FLAGS: u16 = 3;
pub const NFTA_DATA_VALUE: u16 = 1;
pub const NFT_SET_ELEM_INTERVAL_END: u32 = 1;

pub const NFT_NAME_MAXLEN: usize = 256;

pub const NFPROTO_IPV4: u8 = 2;
pub const NFPROTO_IPV6: u8 = 10;
pub const NFPROTO_INET: u8 = 1;

/// Max pending addresses per family before `stage` auto-flushes.
pub const N_IP_ADD: usize = 10;

pub const fn newsetelem_reply_type() -> u16 {
    (NFNL_SUBSYS_NFTABLES << 8) | NFT_MSG_NEWSETELEM
}
