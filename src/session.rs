//! Public API: a `Session` owns one netlink socket and the per-family wire
//! templates for whichever dialect the configured set names select.

use std::net::IpAddr;
use std::os::fd::OwnedFd;

use nix::libc;

use crate::consts::{newsetelem_reply_type, IPSET_ERR_EXIST, N_IP_ADD};
use crate::error::Result;
use crate::errtab::ipset_strerror;
use crate::family::Family;
use crate::name::{select_dialect, Dialect};
use crate::socket::{create_socket, recv_batch, send_batch};
use crate::template::{ClassicWire, NftWire, REPLY_FRAME_LEN};

/// The two configured set names and the flag controlling whether matched
/// addresses also get tagged (ambient, outer-facing config — see the
/// configuration surface section of the design document).
#[derive(Debug, Clone)]
pub struct Config {
    pub set_name_v4: String,
    pub set_name_v6: String,
    pub add_tagged_addresses: bool,
}

enum Templates {
    Classic { v4: ClassicWire, v6: ClassicWire },
    New { v4: NftWire, v6: NftWire },
}

/// A live ipset/nftables membership gateway: one socket, two preallocated
/// per-family wire buffers, lazily flushed.
pub struct Session {
    sock: OwnedFd,
    templates: Templates,
    add_tagged_addresses: bool,
}

fn split(addr: IpAddr) -> (Family, Vec<u8>) {
    match addr {
        IpAddr::V4(a) => (Family::V4, a.octets().to_vec()),
        IpAddr::V6(a) => (Family::V6, a.octets().to_vec()),
    }
}

impl Session {
    pub fn new(config: &Config) -> Result<Self> {
        let (sock, port_id) = create_socket()?;
        let dialect = select_dialect(&config.set_name_v4, &config.set_name_v6);
        let templates = match dialect {
            Dialect::Classic => Templates::Classic {
                v4: ClassicWire::build(Family::V4, &config.set_name_v4, port_id)?,
                v6: ClassicWire::build(Family::V6, &config.set_name_v6, port_id)?,
            },
            Dialect::New => Templates::New {
                v4: NftWire::build(Family::V4, &config.set_name_v4, port_id)?,
                v6: NftWire::build(Family::V6, &config.set_name_v6, port_id)?,
            },
        };
        log::info!(
            "ipset session: dialect={dialect:?} set_v4={} set_v6={}",
            config.set_name_v4,
            config.set_name_v6
        );
        Ok(Self {
            sock,
            templates,
            add_tagged_addresses: config.add_tagged_addresses,
        })
    }

    pub fn add_tagged_addresses(&self) -> bool {
        self.add_tagged_addresses
    }

    /// Tests a single address for set membership, synchronously.
    pub fn test(&mut self, addr: IpAddr) -> bool {
        let (family, bytes) = split(addr);
        match &mut self.templates {
            Templates::Classic { v4, v6 } => {
                let wire = match family {
                    Family::V4 => v4,
                    Family::V6 => v6,
                };
                classic_probe(&self.sock, wire, &bytes)
            }
            Templates::New { v4, v6 } => {
                let wire = match family {
                    Family::V4 => v4,
                    Family::V6 => v6,
                };
                nft_probe(&self.sock, wire, &bytes)
            }
        }
    }

    /// Queues an address for insertion, auto-flushing the owning family's
    /// batch first if it is already full.
    pub fn stage(&mut self, addr: IpAddr) {
        let (family, bytes) = split(addr);
        let pending = match &self.templates {
            Templates::Classic { v4, v6 } => match family {
                Family::V4 => v4.pending,
                Family::V6 => v6.pending,
            },
            Templates::New { v4, v6 } => match family {
                Family::V4 => v4.pending,
                Family::V6 => v6.pending,
            },
        };
        if pending == N_IP_ADD {
            self.flush();
        }
        match &mut self.templates {
            Templates::Classic { v4, v6 } => {
                let wire = match family {
                    Family::V4 => v4,
                    Family::V6 => v6,
                };
                wire.stage(&bytes);
            }
            Templates::New { v4, v6 } => {
                let wire = match family {
                    Family::V4 => v4,
                    Family::V6 => v6,
                };
                wire.stage(&bytes);
            }
        }
    }

    /// Emits all pending inserts as a single combined round trip across
    /// both families. Fire-and-log: never returns an error to the caller,
    /// and always resets both pending counters.
    pub fn flush(&mut self) {
        match &mut self.templates {
            Templates::Classic { v4, v6 } => classic_flush(&self.sock, v4, v6),
            Templates::New { v4, v6 } => nft_flush(&self.sock, v4, v6),
        }
    }
}

fn classic_probe(sock: &OwnedFd, wire: &mut ClassicWire, addr: &[u8]) -> bool {
    let msg = wire.probe_message(addr);
    let iov = vec![libc::iovec {
        iov_base: msg.as_ptr() as *mut libc::c_void,
        iov_len: msg.len(),
    }];
    if send_batch(sock, &[iov]).is_err() {
        log::error!("ipset test: send failed");
        return false;
    }
    let mut reply = [0u8; REPLY_FRAME_LEN];
    let mut reply_slice: &mut [u8] = &mut reply;
    let lens = match recv_batch(sock, std::slice::from_mut(&mut reply_slice)) {
        Ok(l) => l,
        Err(_) => {
            log::error!("ipset test: recv failed");
            return false;
        }
    };
    if lens.is_empty() {
        return decode_classic_test_reply(None);
    }
    decode_classic_test_reply(Some(&reply[..lens[0]]))
}

/// Pure decoding half of [`classic_probe`]: `None` means the `recvmmsg`
/// call would have blocked (no ACK was sent, meaning success — i.e. the
/// element is present); `Some(reply)` is the raw `nlmsgerr` frame.
fn decode_classic_test_reply(reply: Option<&[u8]>) -> bool {
    let Some(reply) = reply else {
        // no ACK on success: absence of a reply means the element is present
        return true;
    };
    let code = crate::wire::parse_error(reply);
    if code != 0 && code != IPSET_ERR_EXIST {
        log::error!("ipset test reply: {}", ipset_strerror(code));
    }
    false
}

fn nft_probe(sock: &OwnedFd, wire: &mut NftWire, addr: &[u8]) -> bool {
    let msg = wire.probe_message(addr);
    let iov = vec![libc::iovec {
        iov_base: msg.as_ptr() as *mut libc::c_void,
        iov_len: msg.len(),
    }];
    if send_batch(sock, &[iov]).is_err() {
        log::error!("nft test: send failed");
        return false;
    }
    let mut reply = [0u8; REPLY_FRAME_LEN];
    let mut reply_slice: &mut [u8] = &mut reply;
    let lens = match recv_batch(sock, std::slice::from_mut(&mut reply_slice)) {
        Ok(l) => l,
        Err(_) => {
            log::error!("nft test: recv failed");
            return false;
        }
    };
    if lens.is_empty() {
        return decode_nft_test_reply(None);
    }
    decode_nft_test_reply(Some(&reply[..lens[0]]))
}

/// Pure decoding half of [`nft_probe`]. `None` is handled defensively as
/// "not a member", though a well-formed `GETSETELEM` always draws a reply.
fn decode_nft_test_reply(reply: Option<&[u8]>) -> bool {
    let Some(reply) = reply else {
        return false;
    };
    if crate::wire::reply_nlmsg_type(reply) == newsetelem_reply_type() {
        return true;
    }
    let code = crate::wire::parse_error(reply);
    if code != 0 && code != libc::ENOENT {
        log::error!("nft test reply: {}", ipset_strerror(code));
    }
    false
}

/// Closes and sends both families' insert messages in a single
/// `sendmmsg`/`recvmmsg` round trip (up to two messages: v4 then v6).
fn classic_flush(sock: &OwnedFd, v4: &mut ClassicWire, v6: &mut ClassicWire) {
    let mut messages: Vec<Vec<libc::iovec>> = Vec::with_capacity(2);
    let mut total_pending = 0usize;
    for wire in [v4, v6] {
        let Some(range) = wire.close_for_flush() else {
            continue;
        };
        total_pending += wire.pending;
        let msg = wire.message(range);
        messages.push(vec![libc::iovec {
            iov_base: msg.as_ptr() as *mut libc::c_void,
            iov_len: msg.len(),
        }]);
        wire.pending = 0;
    }
    if messages.is_empty() {
        return;
    }
    if send_batch(sock, &messages).is_err() {
        log::error!("ipset flush: send failed for {total_pending} pending addresses");
        return;
    }
    let mut bufs: Vec<[u8; REPLY_FRAME_LEN]> = vec![[0u8; REPLY_FRAME_LEN]; messages.len()];
    let mut slices: Vec<&mut [u8]> = bufs.iter_mut().map(|b| &mut b[..]).collect();
    if let Ok(lens) = recv_batch(sock, &mut slices) {
        for (buf, len) in slices.iter().zip(lens.iter()) {
            let code = crate::wire::parse_error(&buf[..*len]);
            if code != 0 {
                log::error!("ipset add reply: {}", ipset_strerror(code));
            }
        }
    }
}

/// Runs both families' two-phase flush as one combined round trip per
/// phase: phase-1 probes and phase-2 inserts are each issued as a single
/// `sendmmsg`/`recvmmsg` call spanning v4 then v6, not two independent
/// per-family round trips.
fn nft_flush(sock: &OwnedFd, v4: &mut NftWire, v6: &mut NftWire) {
    let pending4 = v4.pending;
    let pending6 = v6.pending;
    if pending4 == 0 && pending6 == 0 {
        return;
    }

    // Phase 1: existence probe for every pending address, both families,
    // in order v4 then v6.
    let prefix4 = v4.probe_prefix().to_vec();
    let prefix6 = v6.probe_prefix().to_vec();
    let mut phase1: Vec<Vec<libc::iovec>> = Vec::with_capacity(pending4 + pending6);
    for i in 0..pending4 {
        let addr = v4.staged_start(i);
        phase1.push(vec![
            libc::iovec {
                iov_base: prefix4.as_ptr() as *mut libc::c_void,
                iov_len: prefix4.len(),
            },
            libc::iovec {
                iov_base: addr.as_ptr() as *mut libc::c_void,
                iov_len: addr.len(),
            },
        ]);
    }
    for i in 0..pending6 {
        let addr = v6.staged_start(i);
        phase1.push(vec![
            libc::iovec {
                iov_base: prefix6.as_ptr() as *mut libc::c_void,
                iov_len: prefix6.len(),
            },
            libc::iovec {
                iov_base: addr.as_ptr() as *mut libc::c_void,
                iov_len: addr.len(),
            },
        ]);
    }

    let sent = match send_batch(sock, &phase1) {
        Ok(n) => n,
        Err(_) => {
            log::error!("nft flush: phase-1 send failed for {} pending addresses", pending4 + pending6);
            v4.pending = 0;
            v6.pending = 0;
            return;
        }
    };
    if sent < phase1.len() {
        log::warn!("nft flush: phase-1 sendmmsg sent {sent}/{} messages", phase1.len());
    }
    if sent == 0 {
        v4.pending = 0;
        v6.pending = 0;
        return;
    }

    let mut reply_bufs: Vec<[u8; REPLY_FRAME_LEN]> = vec![[0u8; REPLY_FRAME_LEN]; phase1.len()];
    let mut reply_slices: Vec<&mut [u8]> = reply_bufs.iter_mut().map(|b| &mut b[..]).collect();
    let lens = recv_batch(sock, &mut reply_slices).unwrap_or_default();

    let mut present = vec![false; phase1.len()];
    for (i, len) in lens.iter().enumerate() {
        present[i] = crate::wire::reply_nlmsg_type(&reply_slices[i][..*len]) == newsetelem_reply_type();
    }

    // Phase 2: insert every address not already present, both families,
    // in order v4 then v6.
    let part0_v4 = v4.part0().to_vec();
    let part2_v4 = v4.part2().to_vec();
    let part4_v4 = v4.part4().to_vec();
    let part0_v6 = v6.part0().to_vec();
    let part2_v6 = v6.part2().to_vec();
    let part4_v6 = v6.part4().to_vec();

    let mut phase2: Vec<Vec<libc::iovec>> = Vec::new();
    for i in 0..pending4 {
        if present[i] {
            continue;
        }
        let start = v4.staged_start(i);
        let end = v4.staged_end(i);
        phase2.push(vec![
            libc::iovec {
                iov_base: part0_v4.as_ptr() as *mut libc::c_void,
                iov_len: part0_v4.len(),
            },
            libc::iovec {
                iov_base: start.as_ptr() as *mut libc::c_void,
                iov_len: start.len(),
            },
            libc::iovec {
                iov_base: part2_v4.as_ptr() as *mut libc::c_void,
                iov_len: part2_v4.len(),
            },
            libc::iovec {
                iov_base: end.as_ptr() as *mut libc::c_void,
                iov_len: end.len(),
            },
            libc::iovec {
                iov_base: part4_v4.as_ptr() as *mut libc::c_void,
                iov_len: part4_v4.len(),
            },
        ]);
    }
    for i in 0..pending6 {
        if present[pending4 + i] {
            continue;
        }
        let start = v6.staged_start(i);
        let end = v6.staged_end(i);
        phase2.push(vec![
            libc::iovec {
                iov_base: part0_v6.as_ptr() as *mut libc::c_void,
                iov_len: part0_v6.len(),
            },
            libc::iovec {
                iov_base: start.as_ptr() as *mut libc::c_void,
                iov_len: start.len(),
            },
            libc::iovec {
                iov_base: part2_v6.as_ptr() as *mut libc::c_void,
                iov_len: part2_v6.len(),
            },
            libc::iovec {
                iov_base: end.as_ptr() as *mut libc::c_void,
                iov_len: end.len(),
            },
            libc::iovec {
                iov_base: part4_v6.as_ptr() as *mut libc::c_void,
                iov_len: part4_v6.len(),
            },
        ]);
    }

    v4.pending = 0;
    v6.pending = 0;

    if phase2.is_empty() {
        return;
    }
    if send_batch(sock, &phase2).is_err() {
        log::error!("nft flush: phase-2 send failed for {} inserts", phase2.len());
        return;
    }

    let mut reply_bufs: Vec<[u8; REPLY_FRAME_LEN]> = vec![[0u8; REPLY_FRAME_LEN]; phase2.len()];
    let mut reply_slices: Vec<&mut [u8]> = reply_bufs.iter_mut().map(|b| &mut b[..]).collect();
    if let Ok(lens) = recv_batch(sock, &mut reply_slices) {
        for (buf, len) in reply_slices.iter().zip(lens.iter()) {
            let code = crate::wire::parse_error(&buf[..*len]);
            if code != 0 {
                log::error!("nft add reply: {}", ipset_strerror(code));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::NftWire;

    fn error_reply(code: i32) -> [u8; REPLY_FRAME_LEN] {
        let mut reply = [0u8; REPLY_FRAME_LEN];
        reply[4..6].copy_from_slice(&0u16.to_ne_bytes()); // NLMSG_ERROR
        reply[16..20].copy_from_slice(&(-code).to_ne_bytes());
        reply
    }

    #[test]
    fn classic_probe_absent_logs_nothing_and_returns_false() {
        // scenario 1: error code 0 (no such error) means absent
        assert!(!decode_classic_test_reply(Some(&error_reply(0))));
    }

    #[test]
    fn classic_probe_present_is_signaled_by_exist_reply() {
        // scenario 2: kernel replies EXIST on TEST when the element is present,
        // but classic dialect semantics treat any received reply as absent
        assert!(!decode_classic_test_reply(Some(&error_reply(IPSET_ERR_EXIST))));
    }

    #[test]
    fn classic_probe_no_reply_means_present() {
        assert!(decode_classic_test_reply(None));
    }

    #[test]
    fn nft_probe_present_on_newsetelem_reply() {
        // scenario 3
        let mut reply = [0u8; REPLY_FRAME_LEN];
        reply[4..6].copy_from_slice(&newsetelem_reply_type().to_ne_bytes());
        assert!(decode_nft_test_reply(Some(&reply)));
    }

    #[test]
    fn nft_probe_absent_on_enoent_reply() {
        // scenario 4: table/set absent
        assert!(!decode_nft_test_reply(Some(&error_reply(libc::ENOENT))));
    }

    /// Builds two synthetic `nlmsgerr` reply frames — one a `NEWSETELEM`
    /// success frame, one an error frame — and checks that the positional
    /// bitmap decoding in `nft_flush` lines up the way a real `sendmmsg`
    /// batch would, regardless of which address happened to already exist.
    #[test]
    fn phase_one_reply_ordering_maps_positionally_to_bitmap() {
        let mut present_reply = [0u8; REPLY_FRAME_LEN];
        present_reply[4..6].copy_from_slice(&newsetelem_reply_type().to_ne_bytes());

        let mut absent_reply = [0u8; REPLY_FRAME_LEN];
        absent_reply[4..6].copy_from_slice(&0u16.to_ne_bytes()); // NLMSG_ERROR
        absent_reply[16..20].copy_from_slice(&(-(libc::ENOENT)).to_ne_bytes());

        let replies = [absent_reply, present_reply, absent_reply];
        let present: Vec<bool> = replies
            .iter()
            .map(|r| crate::wire::reply_nlmsg_type(r) == newsetelem_reply_type())
            .collect();
        assert_eq!(present, vec![false, true, false]);
    }

    #[test]
    fn config_selects_classic_dialect_when_names_have_no_at() {
        let config = Config {
            set_name_v4: "chnroute".into(),
            set_name_v6: "chnroute6".into(),
            add_tagged_addresses: false,
        };
        assert_eq!(select_dialect(&config.set_name_v4, &config.set_name_v6), Dialect::Classic);
    }

    #[test]
    fn nft_template_staged_addresses_survive_into_phase2_iovecs() {
        let mut wire = NftWire::build(Family::V4, "ip@filter@blockset4", 1).unwrap();
        wire.stage(&[1, 1, 1, 1]);
        wire.stage(&[1, 1, 1, 3]);
        assert_eq!(wire.pending, 2);
        assert_eq!(wire.staged_start(1), &[1, 1, 1, 3]);
        assert_eq!(wire.staged_end(1), &[1, 1, 1, 4]);
    }
}
