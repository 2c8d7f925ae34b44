//! Set-name grammar and dialect selection.
//!
//! Classic names are a single `[A-Za-z0-9_-]{1,31}` token. New-dialect
//! names are `family@table@set`; the dialect for a whole [`crate::Session`]
//! is picked once, from whether either configured name contains `@`.

use crate::consts::{IPSET_MAXNAMELEN, NFT_NAME_MAXLEN};
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Classic,
    New,
}

pub fn select_dialect(name_v4: &str, name_v6: &str) -> Dialect {
    if name_v4.contains('@') || name_v6.contains('@') {
        Dialect::New
    } else {
        Dialect::Classic
    }
}

pub fn validate_classic_name(name: &str) -> Result<(), Error> {
    if name.is_empty() || name.len() + 1 > IPSET_MAXNAMELEN {
        return Err(Error::Config(format!(
            "ipset name length must be 1..={}, got {} ('{name}')",
            IPSET_MAXNAMELEN - 1,
            name.len()
        )));
    }
    if !name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-') {
        return Err(Error::Config(format!("ipset name contains invalid characters: '{name}'")));
    }
    Ok(())
}

pub struct NftName {
    pub family_word: String,
    pub table: String,
    pub set: String,
}

impl NftName {
    /// `ip`, `ip6`, `inet` → the numeric `NFPROTO_*` family byte.
    pub fn family_byte(&self) -> u8 {
        match self.family_word.as_str() {
            "ip" => crate::consts::NFPROTO_IPV4,
            "ip6" => crate::consts::NFPROTO_IPV6,
            "inet" => crate::consts::NFPROTO_INET,
            _ => unreachable!("validated in parse_nft_name"),
        }
    }
}

pub fn parse_nft_name(name: &str) -> Result<NftName, Error> {
    let mut parts = name.splitn(3, '@');
    let (Some(family_word), Some(table), Some(set)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(Error::Config(format!("expected family@table@set, got '{name}'")));
    };

    for (field_name, field) in [("family", family_word), ("table", table), ("set", set)] {
        if field.is_empty() {
            return Err(Error::Config(format!("{field_name} component of '{name}' must not be empty")));
        }
    }
    if table.len() + 1 > NFT_NAME_MAXLEN || set.len() + 1 > NFT_NAME_MAXLEN {
        return Err(Error::Config(format!(
            "table/set name max length is {}, got '{name}'",
            NFT_NAME_MAXLEN - 1
        )));
    }
    if !matches!(family_word, "ip" | "ip6" | "inet") {
        return Err(Error::Config(format!("unknown family '{family_word}' (expected ip, ip6 or inet)")));
    }

    Ok(NftName {
        family_word: family_word.to_string(),
        table: table.to_string(),
        set: set.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialect_is_classic_when_neither_name_has_at() {
        assert_eq!(select_dialect("chnroute", "chnroute6"), Dialect::Classic);
    }

    #[test]
    fn dialect_is_new_when_either_name_has_at() {
        assert_eq!(select_dialect("ip@filter@blockset4", "chnroute6"), Dialect::New);
    }

    #[test]
    fn classic_name_accepts_alnum_underscore_dash() {
        assert!(validate_classic_name("chn-route_4").is_ok());
    }

    #[test]
    fn classic_name_rejects_too_long() {
        let name: String = std::iter::repeat('a').take(32).collect();
        assert!(validate_classic_name(&name).is_err());
    }

    #[test]
    fn classic_name_rejects_bad_chars() {
        assert!(validate_classic_name("bad name!").is_err());
    }

    #[test]
    fn nft_name_parses_three_components() {
        let parsed = parse_nft_name("inet@filter@blockset").unwrap();
        assert_eq!(parsed.family_word, "inet");
        assert_eq!(parsed.table, "filter");
        assert_eq!(parsed.set, "blockset");
        assert_eq!(parsed.family_byte(), crate::consts::NFPROTO_INET);
    }

    #[test]
    fn nft_name_rejects_missing_component() {
        assert!(parse_nft_name("ip@onlytable").is_err());
    }

    #[test]
    fn nft_name_rejects_unknown_family() {
        assert!(parse_nft_name("ipx@filter@blockset").is_err());
    }
}
