//! systemd liveness notification.
//!
//! Fire-and-forget `sd_notify` datagrams: `READY=1` once at startup,
//! `WATCHDOG=1` after every completed tick, `STOPPING=1` on shutdown.
//! When `$NOTIFY_SOCKET` is unset (not running under systemd) every
//! call is a no-op. Send failures are logged at debug level and
//! otherwise ignored — the supervisor notices missed heartbeats on
//! its own.

use std::os::fd::{AsRawFd, OwnedFd};

use nix::sys::socket::{
    AddressFamily, MsgFlags, SockFlag, SockType, UnixAddr, sendto, socket,
};
use tracing::debug;

/// Handle to the systemd notification socket, if any.
#[derive(Debug)]
pub struct SdNotify {
    target: Option<(OwnedFd, UnixAddr)>,
}

impl SdNotify {
    /// Resolve `$NOTIFY_SOCKET` from the environment.
    pub fn from_env() -> Self {
        let Ok(path) = std::env::var("NOTIFY_SOCKET") else {
            return Self { target: None };
        };
        Self::from_socket_path(&path)
    }

    fn from_socket_path(path: &str) -> Self {
        // Leading '@' denotes the Linux abstract socket namespace.
        let addr = if let Some(name) = path.strip_prefix('@') {
            UnixAddr::new_abstract(name.as_bytes())
        } else {
            UnixAddr::new(path)
        };
        let addr = match addr {
            Ok(a) => a,
            Err(e) => {
                debug!("invalid NOTIFY_SOCKET '{path}': {e}");
                return Self { target: None };
            }
        };
        match socket(
            AddressFamily::Unix,
            SockType::Datagram,
            SockFlag::SOCK_CLOEXEC,
            None,
        ) {
            Ok(fd) => Self {
                target: Some((fd, addr)),
            },
            Err(e) => {
                debug!("cannot open notify socket: {e}");
                Self { target: None }
            }
        }
    }

    /// A handle that never sends anything (tests, foreground runs).
    pub fn disabled() -> Self {
        Self { target: None }
    }

    /// Whether notifications will actually be sent.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.target.is_some()
    }

    /// Signal startup completion.
    pub fn ready(&self) {
        self.send("READY=1");
    }

    /// Signal liveness after a completed tick.
    pub fn alive(&self) {
        self.send("WATCHDOG=1");
    }

    /// Signal the beginning of shutdown.
    pub fn stopping(&self) {
        self.send("STOPPING=1");
    }

    fn send(&self, state: &str) {
        let Some((fd, addr)) = &self.target else {
            return;
        };
        if let Err(e) = sendto(fd.as_raw_fd(), state.as_bytes(), addr, MsgFlags::empty()) {
            debug!("sd_notify '{state}' failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_without_socket() {
        let notify = SdNotify { target: None };
        assert!(!notify.is_enabled());
        // All no-ops.
        notify.ready();
        notify.alive();
        notify.stopping();
    }

    #[test]
    fn abstract_socket_path_accepted() {
        let notify = SdNotify::from_socket_path("@/org/freedesktop/systemd1/notify/123");
        assert!(notify.is_enabled());
    }

    #[test]
    fn filesystem_socket_path_accepted() {
        let notify = SdNotify::from_socket_path("/run/systemd/notify");
        assert!(notify.is_enabled());
        // Sending to a non-listening path must not panic.
        notify.alive();
    }
}
