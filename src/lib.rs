//! A kernel-side membership gateway over classic `ipset` and `nftables`
//! named sets, multiplexed on a single `NETLINK_NETFILTER` socket.
//!
//! A [`Session`] picks its dialect once, from whether the configured set
//! names contain `@` (`family@table@set` selects `nftables`; a bare name
//! selects classic `ipset`), and exposes three operations: [`Session::test`]
//! for a synchronous membership probe, and [`Session::stage`] /
//! [`Session::flush`] for batched inserts.

mod consts;
mod errtab;
mod name;
mod socket;

pub mod error;
pub mod family;
pub mod session;
pub mod template;
pub mod wire;

pub use error::{Error, Result};
pub use family::Family;
pub use session::{Config, Session};
