//! Per-family template buffers for both dialects.
//!
//! Each buffer is allocated once, sized exactly from the alignment formulas
//! in [`crate::wire`], and holds two concatenated messages: a *probe*
//! message at offset 0, followed immediately by an *insert* message whose
//! fixed prefix is built at construction time and whose trailing region is
//! mutated in place by [`ClassicWire::stage`]/[`NftWire::stage`].

use std::ops::Range;

use crate::consts::*;
use crate::error::Error;
use crate::family::Family;
use crate::name::{parse_nft_name, validate_classic_name};
use crate::wire::*;

const fn ipset_bufsz(width: usize) -> usize {
    // probe message
    nlmsg_space(NFGENMSG_LEN)
        + nla_total_size(1)
        + nla_total_size(IPSET_MAXNAMELEN)
        + nla_total_size(0) // DATA (nested)
        + nla_total_size(0) // IP (nested)
        + nla_total_size(width) // IPADDR
        // insert message
        + nlmsg_space(NFGENMSG_LEN)
        + nla_total_size(1)
        + nla_total_size(IPSET_MAXNAMELEN)
        + nla_total_size(4) // LINENO
        + nla_total_size(0) // ADT (nested)
        + N_IP_ADD * (nla_total_size(0) + nla_total_size(0) + nla_total_size(width))
}

const fn nft_bufsz(width: usize) -> usize {
    // probe message
    nlmsg_space(NFGENMSG_LEN)
        + nla_total_size(NFT_NAME_MAXLEN)
        + nla_total_size(NFT_NAME_MAXLEN)
        + nla_total_size(0) // LIST_ELEMENTS (nested)
        + nla_total_size(0) // LIST_ELEM (nested)
        + nla_total_size(0) // SET_ELEM_KEY (nested)
        + nla_total_size(width) // DATA_VALUE
        // insert message: batch_begin + newsetelem + batch_end
        + nlmsg_space(NFGENMSG_LEN)
        + nlmsg_space(NFGENMSG_LEN)
        + nla_total_size(NFT_NAME_MAXLEN)
        + nla_total_size(NFT_NAME_MAXLEN)
        + nla_total_size(0) // LIST_ELEMENTS (nested)
        + nla_total_size(0) // elem1 (nested)
        + nla_total_size(0) // elem1 key (nested)
        + nla_total_size(width) // elem1 DATA_VALUE
        + nla_total_size(0) // elem2 (nested)
        + nla_total_size(4) // elem2 ELEM_FLAGS
        + nla_total_size(0) // elem2 key (nested)
        + nla_total_size(width) // elem2 DATA_VALUE
        + nlmsg_space(NFGENMSG_LEN)
        // reserved staging region: N_IP_ADD pairs of [start, end)
        + N_IP_ADD * width * 2
}

const fn bufsz(width: usize) -> usize {
    let a = ipset_bufsz(width);
    let b = nft_bufsz(width);
    if a > b {
        a
    } else {
        b
    }
}

/// One reply frame slot: `NLMSG_SPACE(sizeof(struct nlmsgerr))`.
pub const REPLY_FRAME_LEN: usize = nlmsg_space(4 + NLMSG_HDRLEN);

/// Classic-dialect per-family template: probe message followed by an
/// insert message whose `ADT` nest is reopened by every `stage` call and
/// closed only at flush.
pub struct ClassicWire {
    buf: Vec<u8>,
    probe_slot: Range<usize>,
    test_len: usize,
    add_initial_len: usize,
    adt_header_off: usize,
    cur_len: usize,
    family: Family,
    pub pending: usize,
}

impl ClassicWire {
    pub fn build(family: Family, name: &str, port_id: u32) -> Result<Self, Error> {
        validate_classic_name(name)?;
        let width = family.addr_len();
        let mut buf = vec![0u8; bufsz(width)];
        let addr_type = if width == 4 { IPSET_ATTR_IPADDR_IPV4 } else { IPSET_ATTR_IPADDR_IPV6 } | NLA_F_NET_BYTEORDER;

        // probe (TEST) message
        let mut pos = write_nlmsghdr(&mut buf, 0, (NFNL_SUBSYS_IPSET << 8) | IPSET_CMD_TEST, NLM_F_REQUEST, 0, port_id);
        pos = write_nfgenmsg(&mut buf, pos, family.af(), 0);
        pos = append_attr(&mut buf, pos, IPSET_ATTR_PROTOCOL, &[IPSET_PROTOCOL]);
        pos = append_cstr_attr(&mut buf, pos, IPSET_ATTR_SETNAME, name);
        let (data_hdr, p) = open_nested(&mut buf, pos, IPSET_ATTR_DATA);
        let (ip_hdr, p) = open_nested(&mut buf, p, IPSET_ATTR_IP);
        let (p, probe_slot) = append_attr_slot(&mut buf, p, addr_type, width);
        close_nested(&mut buf, ip_hdr, p);
        close_nested(&mut buf, data_hdr, p);
        let test_len = p;
        patch_nlmsg_len(&mut buf, 0, test_len as u32);

        // insert (ADD) message: duplicate the probe bytes, then extend
        let add_start = test_len;
        buf.copy_within(0..test_len, add_start);
        buf[add_start + 4..add_start + 6].copy_from_slice(&((NFNL_SUBSYS_IPSET << 8) | IPSET_CMD_ADD).to_ne_bytes());
        let mut pos = add_start + test_len;
        pos = append_attr(&mut buf, pos, IPSET_ATTR_LINENO, &0u32.to_ne_bytes());
        let (adt_hdr, p) = open_nested(&mut buf, pos, IPSET_ATTR_ADT);
        let add_initial_len = p - add_start;
        patch_nlmsg_len(&mut buf, add_start, add_initial_len as u32);

        Ok(Self {
            buf,
            probe_slot,
            test_len,
            add_initial_len,
            adt_header_off: adt_hdr,
            cur_len: add_initial_len,
            family,
            pending: 0,
        })
    }

    pub fn probe_message(&mut self, addr: &[u8]) -> &[u8] {
        self.buf[self.probe_slot.clone()].copy_from_slice(addr);
        &self.buf[0..self.test_len]
    }

    /// Appends one address fragment to the (still-open) `ADT` nest.
    pub fn stage(&mut self, addr: &[u8]) {
        if self.pending == 0 {
            self.cur_len = self.add_initial_len;
        }
        let add_start = self.test_len;
        let addr_type = if self.family.addr_len() == 4 { IPSET_ATTR_IPADDR_IPV4 } else { IPSET_ATTR_IPADDR_IPV6 } | NLA_F_NET_BYTEORDER;
        let mut pos = add_start + self.cur_len;
        let (data_hdr, p) = open_nested(&mut self.buf, pos, IPSET_ATTR_DATA);
        let (ip_hdr, p) = open_nested(&mut self.buf, p, IPSET_ATTR_IP);
        pos = append_attr(&mut self.buf, p, addr_type, addr);
        close_nested(&mut self.buf, ip_hdr, pos);
        close_nested(&mut self.buf, data_hdr, pos);
        self.cur_len = pos - add_start;
        self.pending += 1;
    }

    /// Closes the `ADT` nest and returns the byte range of the completed
    /// insert message, or `None` if nothing is pending (idempotent no-op).
    pub fn close_for_flush(&mut self) -> Option<Range<usize>> {
        if self.pending == 0 {
            return None;
        }
        let add_start = self.test_len;
        let end_pos = add_start + self.cur_len;
        close_nested(&mut self.buf, self.adt_header_off, end_pos);
        patch_nlmsg_len(&mut self.buf, add_start, self.cur_len as u32);
        Some(add_start..end_pos)
    }

    pub fn message(&self, range: Range<usize>) -> &[u8] {
        &self.buf[range]
    }
}

/// New-dialect per-family template. The fixed ranges `part0`/`part2`/`part4`
/// are the three stationary pieces of the five-iovec insert message (see
/// §4.5 of the design document); `reserved_start` addresses the staging
/// area for up to `N_IP_ADD` `[start, end)` address pairs.
pub struct NftWire {
    buf: Vec<u8>,
    slot: Range<usize>,
    test_len: usize,
    reserved_start: usize,
    part0: Range<usize>,
    part2: Range<usize>,
    part4: Range<usize>,
    width: usize,
    pub pending: usize,
}

impl NftWire {
    pub fn build(family: Family, name: &str, port_id: u32) -> Result<Self, Error> {
        let parsed = parse_nft_name(name)?;
        let family_byte = parsed.family_byte();
        let width = family.addr_len();
        let mut buf = vec![0u8; bufsz(width)];

        // probe (GETSETELEM) message
        let mut pos = write_nlmsghdr(&mut buf, 0, (NFNL_SUBSYS_NFTABLES << 8) | NFT_MSG_GETSETELEM, NLM_F_REQUEST, 0, port_id);
        pos = write_nfgenmsg(&mut buf, pos, family_byte, 0);
        pos = append_cstr_attr(&mut buf, pos, NFTA_SET_ELEM_LIST_TABLE, &parsed.table);
        pos = append_cstr_attr(&mut buf, pos, NFTA_SET_ELEM_LIST_SET, &parsed.set);
        let prefix_len = pos; // reused verbatim as the NEWSETELEM message's header

        let (elems_hdr, p) = open_nested(&mut buf, pos, NFTA_SET_ELEM_LIST_ELEMENTS);
        let (elem_hdr, p) = open_nested(&mut buf, p, NFTA_LIST_ELEM);
        let (key_hdr, p) = open_nested(&mut buf, p, NFTA_SET_ELEM_KEY);
        let (p, slot) = append_attr_slot(&mut buf, p, NFTA_DATA_VALUE | NLA_F_NET_BYTEORDER, width);
        close_nested(&mut buf, key_hdr, p);
        close_nested(&mut buf, elem_hdr, p);
        close_nested(&mut buf, elems_hdr, p);
        let test_len = p;
        patch_nlmsg_len(&mut buf, 0, test_len as u32);

        // insert message: BATCH_BEGIN + NEWSETELEM + BATCH_END
        let add_start = test_len;
        let mut pos = add_start;
        let bb_hdr = pos;
        pos = write_nlmsghdr(&mut buf, pos, NFNL_MSG_BATCH_BEGIN, NLM_F_REQUEST, 0, port_id);
        pos = write_nfgenmsg(&mut buf, pos, 0 /* AF_UNSPEC */, NFNL_SUBSYS_NFTABLES);
        patch_nlmsg_len(&mut buf, bb_hdr, (pos - bb_hdr) as u32);

        let nse_hdr = pos;
        buf.copy_within(0..prefix_len, pos);
        pos += prefix_len;
        buf[nse_hdr + 4..nse_hdr + 6].copy_from_slice(&((NFNL_SUBSYS_NFTABLES << 8) | NFT_MSG_NEWSETELEM).to_ne_bytes());

        let (elems_hdr2, p) = open_nested(&mut buf, pos, NFTA_SET_ELEM_LIST_ELEMENTS);
        pos = p;
        let part0_start = add_start;

        // elem 1: plain key, no flags
        let (elem1_hdr, p) = open_nested(&mut buf, pos, NFTA_LIST_ELEM);
        let (key1_hdr, p) = open_nested(&mut buf, p, NFTA_SET_ELEM_KEY);
        let elem1_dead_start = p + NLA_HDRLEN;
        let p = append_attr(&mut buf, p, NFTA_DATA_VALUE | NLA_F_NET_BYTEORDER, &vec![0u8; width]);
        close_nested(&mut buf, key1_hdr, p);
        close_nested(&mut buf, elem1_hdr, p);
        pos = p;
        let part0 = part0_start..elem1_dead_start;

        // elem 2: INTERVAL_END flag, then key
        let elem2_hdr_start = pos;
        let (elem2_hdr, p) = open_nested(&mut buf, pos, NFTA_LIST_ELEM);
        let p = append_attr(&mut buf, p, NFTA_SET_ELEM_FLAGS, &NFT_SET_ELEM_INTERVAL_END.to_be_bytes());
        let (key2_hdr, p) = open_nested(&mut buf, p, NFTA_SET_ELEM_KEY);
        let elem2_dead_start = p + NLA_HDRLEN;
        let p = append_attr(&mut buf, p, NFTA_DATA_VALUE | NLA_F_NET_BYTEORDER, &vec![0u8; width]);
        close_nested(&mut buf, key2_hdr, p);
        close_nested(&mut buf, elem2_hdr, p);
        pos = p;
        let part2 = elem2_hdr_start..elem2_dead_start;

        close_nested(&mut buf, elems_hdr2, pos);
        patch_nlmsg_len(&mut buf, nse_hdr, (pos - nse_hdr) as u32);

        let be_hdr = pos;
        pos = write_nlmsghdr(&mut buf, pos, NFNL_MSG_BATCH_END, NLM_F_REQUEST, 0, port_id);
        pos = write_nfgenmsg(&mut buf, pos, 0 /* AF_UNSPEC */, NFNL_SUBSYS_NFTABLES);
        patch_nlmsg_len(&mut buf, be_hdr, (pos - be_hdr) as u32);
        let part4 = be_hdr..pos;

        let reserved_start = pos;

        Ok(Self {
            buf,
            slot,
            test_len,
            reserved_start,
            part0,
            part2,
            part4,
            width,
            pending: 0,
        })
    }

    pub fn probe_message(&mut self, addr: &[u8]) -> &[u8] {
        self.buf[self.slot.clone()].copy_from_slice(addr);
        &self.buf[0..self.test_len]
    }

    /// `iov[0]` for a batched phase-1 probe: the template up to (not
    /// including) the address slot.
    pub fn probe_prefix(&self) -> &[u8] {
        &self.buf[0..self.slot.start]
    }

    pub fn staged_start(&self, index: usize) -> &[u8] {
        let off = self.reserved_start + index * self.width * 2;
        &self.buf[off..off + self.width]
    }

    pub fn staged_end(&self, index: usize) -> &[u8] {
        let off = self.reserved_start + index * self.width * 2 + self.width;
        &self.buf[off..off + self.width]
    }

    pub fn part0(&self) -> &[u8] {
        &self.buf[self.part0.clone()]
    }

    pub fn part2(&self) -> &[u8] {
        &self.buf[self.part2.clone()]
    }

    pub fn part4(&self) -> &[u8] {
        &self.buf[self.part4.clone()]
    }

    pub fn stage(&mut self, addr: &[u8]) {
        let index = self.pending;
        let width = self.width;
        let start_off = self.reserved_start + index * width * 2;
        let end_off = start_off + width;
        self.buf[start_off..start_off + width].copy_from_slice(addr);
        let mut end = [0u8; 16];
        end[..width].copy_from_slice(addr);
        crate::family::increment_be(&mut end[..width]);
        self.buf[end_off..end_off + width].copy_from_slice(&end[..width]);
        self.pending += 1;
    }
}
