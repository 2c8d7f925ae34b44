//! Symbolic names for the classic dialect's `IPSET_ERR_*` error space
//! (4097..4357), used only for log messages.

pub fn ipset_strerror(code: i32) -> String {
    let name = match code {
        4097 => "IPSET_ERR_PROTOCOL",
        4098 => "IPSET_ERR_FIND_TYPE",
        4099 => "IPSET_ERR_MAX_SETS",
        4100 => "IPSET_ERR_BUSY",
        4101 => "IPSET_ERR_EXIST_SETNAME2",
        4102 => "IPSET_ERR_TYPE_MISMATCH",
        4103 => "IPSET_ERR_EXIST",
        4104 => "IPSET_ERR_INVALID_CIDR",
        4105 => "IPSET_ERR_INVALID_NETMASK",
        4106 => "IPSET_ERR_INVALID_FAMILY",
        4107 => "IPSET_ERR_TIMEOUT",
        4108 => "IPSET_ERR_REFERENCED",
        4109 => "IPSET_ERR_IPADDR_IPV4",
        4110 => "IPSET_ERR_IPADDR_IPV6",
        4111 => "IPSET_ERR_COUNTER",
        4112 => "IPSET_ERR_COMMENT",
        4113 => "IPSET_ERR_INVALID_MARKMASK",
        4114 => "IPSET_ERR_SKBINFO",
        4115 => "IPSET_ERR_BITMASK_NETMASK_EXCL",
        4352 => "IPSET_ERR_HASH_FULL",
        4353 => "IPSET_ERR_HASH_ELEM",
        4354 => "IPSET_ERR_INVALID_PROTO",
        4355 => "IPSET_ERR_MISSING_PROTO",
        4356 => "IPSET_ERR_HASH_RANGE_UNSUPPORTED",
        4357 => "IPSET_ERR_HASH_RANGE",
        _ => return std::io::Error::from_raw_os_error(code).to_string(),
    };
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_code_to_symbolic_name() {
        assert_eq!(ipset_strerror(4103), "IPSET_ERR_EXIST");
    }

    #[test]
    fn falls_back_to_strerror_for_unknown_code() {
        // ENOENT
        assert!(ipset_strerror(2).to_lowercase().contains("no such"));
    }
}
