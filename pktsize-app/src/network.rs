//! Module for network interface information needed to scope filters to interfaces

use std::ffi::CString;

/// Maximum length of an interface name, including the terminating null byte (IFNAMSIZ)
const MAX_IFACE_NAME_LEN: usize = 16;

/// Determines the kernel index of a network interface
///
/// # Arguments
/// * `iface` - A str with the interface name, e.g. "eth0"
///
/// # Returns
/// The interface index or an error string if the name is invalid or no such interface exists
///
pub fn interface_index(iface: &str) -> Result<u32, String> {
    if iface.is_empty() || iface.len() >= MAX_IFACE_NAME_LEN {
        return Err(format!("Invalid interface name: {}", iface));
    }
    let c_iface = match CString::new(iface.as_bytes()) {
        Ok(name) => name,
        // name contains null character
        Err(_) => return Err(format!("Invalid interface name: {}", iface)),
    };
    let index = unsafe { libc::if_nametoindex(c_iface.as_ptr()) };
    if index == 0 {
        return Err(format!("Unknown interface: {}", iface));
    }
    Ok(index)
}

#[cfg(test)]
mod tests {

    #[test]
    fn test_interface_index_invalid_name() {
        assert_eq!(
            "Invalid interface name: ".to_string(),
            super::interface_index("").unwrap_err()
        );
        assert_eq!(
            "Invalid interface name: eth\0".to_string(),
            super::interface_index("eth\0").unwrap_err()
        );
        assert_eq!(
            "Invalid interface name: averyveryverylongname".to_string(),
            super::interface_index("averyveryverylongname").unwrap_err()
        );
    }

    #[test]
    fn test_interface_index_unknown() {
        assert_eq!(
            "Unknown interface: pktsz-none0".to_string(),
            super::interface_index("pktsz-none0").unwrap_err()
        );
    }
}
