//! systemd readiness notifications (`sd_notify` datagrams).

use std::io;
use std::os::unix::net::UnixDatagram;

const NOTIFY_SOCKET_ENV: &str = "NOTIFY_SOCKET";

/// Tell the supervisor start-up is complete.
pub fn notify_ready() {
    notify("READY=1");
}

/// Tell the supervisor shutdown has begun.
pub fn notify_stopping() {
    notify("STOPPING=1");
}

fn notify(state: &str) {
    let Some(socket) = std::env::var_os(NOTIFY_SOCKET_ENV) else {
        tracing::debug!(state, "NOTIFY_SOCKET not set; not running under systemd");
        return;
    };
    let socket = socket.to_string_lossy().into_owned();
    match send_state(&socket, state) {
        Ok(()) => tracing::debug!(state, "notified supervisor"),
        Err(err) => tracing::warn!(state, error = %err, "failed to notify supervisor"),
    }
}

/// Send one state datagram. A leading `@` names a Linux abstract socket.
pub fn send_state(socket: &str, state: &str) -> io::Result<()> {
    let datagram = UnixDatagram::unbound()?;
    match socket.strip_prefix('@') {
        Some(name) => send_abstract(&datagram, name, state),
        None => datagram.send_to(state.as_bytes(), socket).map(|_| ()),
    }
}

#[cfg(target_os = "linux")]
fn send_abstract(datagram: &UnixDatagram, name: &str, state: &str) -> io::Result<()> {
    use std::os::linux::net::SocketAddrExt;
    use std::os::unix::net::SocketAddr;

    let addr = SocketAddr::from_abstract_name(name.as_bytes())?;
    datagram.send_to_addr(state.as_bytes(), &addr).map(|_| ())
}

#[cfg(not(target_os = "linux"))]
fn send_abstract(_datagram: &UnixDatagram, name: &str, _state: &str) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("abstract socket '@{name}' is only supported on Linux"),
    ))
}
