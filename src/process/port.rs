//! TCP port probes.
//!
//! A port counts as bound when a local bind attempt fails with AddrInUse,
//! which catches both 127.0.0.1 and 0.0.0.0 listeners.

use std::net::TcpListener;

/// Whether something is already listening on the port.
pub fn is_bound(port: u16) -> bool {
    TcpListener::bind(("127.0.0.1", port)).is_err()
}

/// Whether the port is free to bind.
pub fn is_free(port: u16) -> bool {
    !is_bound(port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bound_port_is_detected() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        assert!(is_bound(port));
        drop(listener);
        assert!(is_free(port));
    }
}
