//! Low-level netlink wire helpers: attribute framing, alignment, header
//! encoding. Everything here operates on a caller-owned byte slice and a
//! `usize` write position — no pointers are stored past the call that
//! produced them, so a template's mutable slots are always addressed as
//! offsets into its buffer.

use std::ops::Range;

pub const NLMSG_HDRLEN: usize = 16;
pub const NLA_HDRLEN: usize = 4;
pub const NFGENMSG_LEN: usize = 4;

pub const NLM_F_REQUEST: u16 = 0x0001;

pub const NLA_F_NESTED: u16 = 0x8000;
pub const NLA_F_NET_BYTEORDER: u16 = 0x4000;

/// `NLMSG_ALIGN` / `NLA_ALIGN`: everything in a netlink message is padded
/// to a 4-byte boundary.
pub const fn align4(n: usize) -> usize {
    (n + 3) & !3
}

/// `NLMSG_SPACE(payload)`.
pub const fn nlmsg_space(payload: usize) -> usize {
    align4(NLMSG_HDRLEN + payload)
}

/// `nla_total_size(payload)`.
pub const fn nla_total_size(payload: usize) -> usize {
    align4(NLA_HDRLEN + payload)
}

/// Writes a 16-byte `nlmsghdr` at `pos` with `nlmsg_len` left as a
/// placeholder (patch with [`patch_nlmsg_len`] once the message is
/// complete). Returns the position just past the header.
pub fn write_nlmsghdr(buf: &mut [u8], pos: usize, msg_type: u16, flags: u16, seq: u32, port_id: u32) -> usize {
    buf[pos..pos + 4].copy_from_slice(&0u32.to_ne_bytes());
    buf[pos + 4..pos + 6].copy_from_slice(&msg_type.to_ne_bytes());
    buf[pos + 6..pos + 8].copy_from_slice(&flags.to_ne_bytes());
    buf[pos + 8..pos + 12].copy_from_slice(&seq.to_ne_bytes());
    buf[pos + 12..pos + 16].copy_from_slice(&port_id.to_ne_bytes());
    pos + NLMSG_HDRLEN
}

pub fn patch_nlmsg_len(buf: &mut [u8], header_offset: usize, len: u32) {
    buf[header_offset..header_offset + 4].copy_from_slice(&len.to_ne_bytes());
}

/// Writes the 4-byte `nfgenmsg` preamble (`nfgen_family`, `version` fixed
/// to `NFNETLINK_V0`, `res_id` in network byte order).
pub fn write_nfgenmsg(buf: &mut [u8], pos: usize, family: u8, res_id: u16) -> usize {
    buf[pos] = family;
    buf[pos + 1] = 0; // NFNETLINK_V0
    buf[pos + 2..pos + 4].copy_from_slice(&res_id.to_be_bytes());
    pos + NFGENMSG_LEN
}

/// Appends one TLV attribute, padding the payload to a 4-byte boundary.
/// Returns the (aligned) position past the attribute.
pub fn append_attr(buf: &mut [u8], pos: usize, attr_type: u16, payload: &[u8]) -> usize {
    let nla_len = (NLA_HDRLEN + payload.len()) as u16;
    buf[pos..pos + 2].copy_from_slice(&nla_len.to_ne_bytes());
    buf[pos + 2..pos + 4].copy_from_slice(&attr_type.to_ne_bytes());
    let payload_start = pos + NLA_HDRLEN;
    buf[payload_start..payload_start + payload.len()].copy_from_slice(payload);
    align4(payload_start + payload.len())
}

/// Like [`append_attr`] but also returns the (unaligned) byte range of the
/// payload it wrote, so the caller can record it as a mutable slot.
pub fn append_attr_slot(buf: &mut [u8], pos: usize, attr_type: u16, width: usize) -> (usize, Range<usize>) {
    let payload_start = pos + NLA_HDRLEN;
    let new_pos = append_attr(buf, pos, attr_type, &vec![0u8; width]);
    (new_pos, payload_start..payload_start + width)
}

/// Reserves a nested-attribute header (length patched in later by
/// [`close_nested`]) and sets `NLA_F_NESTED` on its type. Returns the
/// header's offset and the position just past it.
pub fn open_nested(buf: &mut [u8], pos: usize, attr_type: u16) -> (usize, usize) {
    buf[pos..pos + 2].copy_from_slice(&0u16.to_ne_bytes());
    buf[pos + 2..pos + 4].copy_from_slice(&(attr_type | NLA_F_NESTED).to_ne_bytes());
    (pos, pos + NLA_HDRLEN)
}

pub fn close_nested(buf: &mut [u8], header_offset: usize, end_pos: usize) {
    let nla_len = (end_pos - header_offset) as u16;
    buf[header_offset..header_offset + 2].copy_from_slice(&nla_len.to_ne_bytes());
}

/// Appends a NUL-terminated copy of `s`.
pub fn append_cstr_attr(buf: &mut [u8], pos: usize, attr_type: u16, s: &str) -> usize {
    let mut payload = s.as_bytes().to_vec();
    payload.push(0);
    append_attr(buf, pos, attr_type, &payload)
}

/// Reads the `nlmsg_type` field of a reply frame.
pub fn reply_nlmsg_type(reply: &[u8]) -> u16 {
    u16::from_ne_bytes(reply[4..6].try_into().unwrap())
}

/// Extracts the error code from an `NLMSG_ERROR` reply (the 4 bytes right
/// after the `nlmsghdr`). The wire field holds `-errno` per the kernel
/// netlink convention; this negates it back to the conventional positive
/// representation (0 means ACK).
pub fn parse_error(reply: &[u8]) -> i32 {
    let raw = i32::from_ne_bytes(reply[NLMSG_HDRLEN..NLMSG_HDRLEN + 4].try_into().unwrap());
    -raw
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align4_rounds_up_to_multiple_of_four() {
        assert_eq!(align4(0), 0);
        assert_eq!(align4(1), 4);
        assert_eq!(align4(4), 4);
        assert_eq!(align4(5), 8);
    }

    #[test]
    fn append_attr_pads_payload_and_updates_length() {
        let mut buf = [0u8; 32];
        let new_pos = append_attr(&mut buf, 0, 7, &[1, 2, 3]);
        assert_eq!(new_pos, 8); // 4 header + 3 payload aligned to 8
        let nla_len = u16::from_ne_bytes(buf[0..2].try_into().unwrap());
        assert_eq!(nla_len, 7); // header + unpadded payload length
        let attr_type = u16::from_ne_bytes(buf[2..4].try_into().unwrap());
        assert_eq!(attr_type, 7);
        assert_eq!(&buf[4..7], &[1, 2, 3]);
    }

    #[test]
    fn nested_attr_header_is_backfilled_on_close() {
        let mut buf = [0u8; 32];
        let (hdr, mut pos) = open_nested(&mut buf, 0, 3);
        pos = append_attr(&mut buf, pos, 1, &[9, 9, 9, 9]);
        close_nested(&mut buf, hdr, pos);
        let nla_len = u16::from_ne_bytes(buf[0..2].try_into().unwrap());
        assert_eq!(nla_len as usize, pos - hdr);
        let attr_type = u16::from_ne_bytes(buf[2..4].try_into().unwrap());
        assert_eq!(attr_type, 3 | NLA_F_NESTED);
    }

    #[test]
    fn parse_error_negates_wire_value() {
        let mut buf = [0u8; 20];
        buf[16..20].copy_from_slice(&(-4103i32).to_ne_bytes());
        assert_eq!(parse_error(&buf), 4103);
    }
}
