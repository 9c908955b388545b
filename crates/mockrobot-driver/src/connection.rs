//! [`ConnectionManager`] – owner of the single TCP link to the onboard
//! software.
//!
//! Every byte the driver sends goes through
//! [`ConnectionManager::send_and_await_readable`]: the payload is written in
//! full, then the call blocks until the socket has something to read or the
//! timeout expires.  One read of at most [`RECEIVE_BUFFER_SIZE`] bytes makes up
//! the reply; the protocol has no other framing.
//!
//! Because replies are unframed, anything already waiting on the socket when
//! a command is about to be sent belongs to an earlier exchange and is
//! discarded first.  After a timed-out exchange the manager also gives the
//! late reply [`LATE_REPLY_GRACE`] to show up before the next command goes
//! out, so it cannot be mistaken for that command's answer.

use std::io::{ErrorKind, Read, Write};
use std::net::{IpAddr, Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use mockrobot_types::ConnectionError;
use tracing::{debug, info, warn};

/// Size of the single read that makes up one reply.
pub const RECEIVE_BUFFER_SIZE: usize = 1024;

/// How long the next exchange waits for the reply to a timed-out one.
pub const LATE_REPLY_GRACE: Duration = Duration::from_millis(500);

// `set_read_timeout` rejects a zero duration.
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

struct Link {
    ip_address: String,
    stream: TcpStream,
    /// The last exchange timed out, so its reply may still arrive.
    reply_overdue: bool,
}

/// Opens, holds and closes the connection to the robot.
///
/// The manager is either connected (it holds a socket and the IP address it
/// was opened with) or not; there is no half-open state.
pub struct ConnectionManager {
    port: u16,
    connect_timeout: Duration,
    link: Option<Link>,
}

impl ConnectionManager {
    pub fn new(port: u16, connect_timeout: Duration) -> Self {
        Self {
            port,
            connect_timeout,
            link: None,
        }
    }

    #[cfg(test)]
    fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    #[cfg(test)]
    fn ip_address(&self) -> Option<&str> {
        self.link.as_ref().map(|l| l.ip_address.as_str())
    }

    /// Connect to `ip_address` on the configured port.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::AlreadyConnected`] when a link is already open;
    ///   the existing link is left untouched.
    /// - [`ConnectionError::ConnectFailed`] when the address cannot be
    ///   resolved or the connection attempt fails or times out.  Nothing is
    ///   retained in that case.
    pub fn open(&mut self, ip_address: &str) -> Result<(), ConnectionError> {
        if let Some(link) = &self.link {
            return Err(ConnectionError::AlreadyConnected(link.ip_address.clone()));
        }

        info!(ip = ip_address, port = self.port, "connecting to robot");
        let addr = self.resolve(ip_address)?;
        let stream = TcpStream::connect_timeout(&addr, self.connect_timeout)
            .map_err(|e| ConnectionError::ConnectFailed(e.to_string()))?;
        if let Err(e) = stream.set_nodelay(true) {
            warn!(error = %e, "could not disable Nagle on robot socket");
        }

        info!(ip = ip_address, port = self.port, "connection established");
        self.link = Some(Link {
            ip_address: ip_address.to_string(),
            stream,
            reply_overdue: false,
        });
        Ok(())
    }

    /// Close the connection.  Calling this while disconnected is a no-op.
    pub fn close(&mut self) {
        if let Some(link) = self.link.take() {
            // The peer may already be gone; dropping the stream releases it either way.
            let _ = link.stream.shutdown(Shutdown::Both);
            info!(ip = %link.ip_address, "connection closed");
        }
    }

    /// Write `payload`, then wait up to `timeout` for the reply.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::NotConnected`] without an open link.
    /// - [`ConnectionError::ResponseTimeout`] when nothing arrives in time.
    /// - [`ConnectionError::ConnectionClosed`] when the robot hung up.
    /// - [`ConnectionError::Io`] for any other socket failure.
    pub fn send_and_await_readable(
        &mut self,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, ConnectionError> {
        let link = self.link.as_mut().ok_or(ConnectionError::NotConnected)?;
        link.discard_stale_replies()?;

        link.stream
            .write_all(payload)
            .and_then(|()| link.stream.flush())
            .map_err(|e| ConnectionError::Io(e.to_string()))?;
        debug!(payload = %String::from_utf8_lossy(payload), "sent");

        link.stream
            .set_read_timeout(Some(timeout.max(MIN_READ_TIMEOUT)))
            .map_err(|e| ConnectionError::Io(e.to_string()))?;

        let mut buf = [0u8; RECEIVE_BUFFER_SIZE];
        match link.stream.read(&mut buf) {
            Ok(0) => Err(ConnectionError::ConnectionClosed),
            Ok(n) => {
                debug!(reply = %String::from_utf8_lossy(&buf[..n]), "received");
                Ok(buf[..n].to_vec())
            }
            Err(e) if is_timeout(&e) => {
                link.reply_overdue = true;
                Err(ConnectionError::ResponseTimeout)
            }
            Err(e) => Err(ConnectionError::Io(e.to_string())),
        }
    }

    fn resolve(&self, ip_address: &str) -> Result<SocketAddr, ConnectionError> {
        if let Ok(ip) = ip_address.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, self.port));
        }
        if ip_address.is_empty() || ip_address.contains(char::is_whitespace) {
            return Err(ConnectionError::ConnectFailed(format!(
                "invalid address {ip_address:?}"
            )));
        }
        (ip_address, self.port)
            .to_socket_addrs()
            .map_err(|e| ConnectionError::ConnectFailed(format!("invalid address {ip_address}: {e}")))?
            .next()
            .ok_or_else(|| {
                ConnectionError::ConnectFailed(format!("no address found for {ip_address}"))
            })
    }
}

impl Link {
    /// Throw away whatever earlier exchanges left on the socket.
    fn discard_stale_replies(&mut self) -> Result<(), ConnectionError> {
        let mut buf = [0u8; RECEIVE_BUFFER_SIZE];

        if std::mem::take(&mut self.reply_overdue) {
            self.stream
                .set_read_timeout(Some(LATE_REPLY_GRACE))
                .map_err(|e| ConnectionError::Io(e.to_string()))?;
            match self.stream.read(&mut buf) {
                Ok(0) => return Err(ConnectionError::ConnectionClosed),
                Ok(n) => {
                    debug!(reply = %String::from_utf8_lossy(&buf[..n]), "discarded late reply");
                }
                Err(e) if is_timeout(&e) => {}
                Err(e) => return Err(ConnectionError::Io(e.to_string())),
            }
        }

        self.stream
            .set_nonblocking(true)
            .map_err(|e| ConnectionError::Io(e.to_string()))?;
        let drained = loop {
            match self.stream.read(&mut buf) {
                Ok(0) => break Err(ConnectionError::ConnectionClosed),
                Ok(n) => {
                    debug!(reply = %String::from_utf8_lossy(&buf[..n]), "discarded stale bytes");
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => break Err(ConnectionError::Io(e.to_string())),
            }
        };
        self.stream
            .set_nonblocking(false)
            .map_err(|e| ConnectionError::Io(e.to_string()))?;
        drained
    }
}

fn is_timeout(e: &std::io::Error) -> bool {
    matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    fn listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test listener");
        let port = listener.local_addr().expect("local addr").port();
        (listener, port)
    }

    fn manager(port: u16) -> ConnectionManager {
        ConnectionManager::new(port, Duration::from_secs(1))
    }

    #[test]
    fn open_records_ip_and_refuses_second_open() {
        let (listener, port) = listener();
        let accept = thread::spawn(move || listener.accept().map(|(s, _)| s));

        let mut conn = manager(port);
        conn.open("127.0.0.1").unwrap();
        assert!(conn.is_connected());
        assert_eq!(conn.ip_address(), Some("127.0.0.1"));

        let err = conn.open("127.0.0.1").unwrap_err();
        assert_eq!(err, ConnectionError::AlreadyConnected("127.0.0.1".into()));
        assert!(conn.is_connected());

        let _server_side = accept.join().unwrap();
    }

    #[test]
    fn failed_connect_leaves_manager_disconnected() {
        let (listener, port) = listener();
        drop(listener);

        let mut conn = manager(port);
        let err = conn.open("127.0.0.1").unwrap_err();
        assert!(matches!(err, ConnectionError::ConnectFailed(_)));
        assert!(!conn.is_connected());
        assert_eq!(conn.ip_address(), None);
    }

    #[test]
    fn exchange_returns_single_reply() {
        let (listener, port) = listener();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 64];
            let n = stream.read(&mut buf).unwrap();
            assert_eq!(&buf[..n], b"pick%3");
            stream.write_all(b"42").unwrap();
            stream
        });

        let mut conn = manager(port);
        conn.open("127.0.0.1").unwrap();
        let reply = conn
            .send_and_await_readable(b"pick%3", Duration::from_secs(1))
            .unwrap();
        assert_eq!(reply, b"42");
        let _stream = server.join().unwrap();
    }

    #[test]
    fn silent_peer_times_out() {
        let (listener, port) = listener();
        let server = thread::spawn(move || listener.accept().map(|(s, _)| s));

        let mut conn = manager(port);
        conn.open("127.0.0.1").unwrap();
        let err = conn
            .send_and_await_readable(b"home", Duration::from_millis(50))
            .unwrap_err();
        assert_eq!(err, ConnectionError::ResponseTimeout);
        let _stream = server.join().unwrap();
    }

    #[test]
    fn late_reply_is_not_taken_for_the_next_answer() {
        let (listener, port) = listener();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 64];
            let n = stream.read(&mut buf).unwrap();
            assert_eq!(&buf[..n], b"pick%3");
            thread::sleep(Duration::from_millis(150));
            stream.write_all(b"7").unwrap();

            let n = stream.read(&mut buf).unwrap();
            assert_eq!(&buf[..n], b"place%4");
            stream.write_all(b"-1").unwrap();
            stream
        });

        let mut conn = manager(port);
        conn.open("127.0.0.1").unwrap();
        let err = conn
            .send_and_await_readable(b"pick%3", Duration::from_millis(50))
            .unwrap_err();
        assert_eq!(err, ConnectionError::ResponseTimeout);

        let reply = conn
            .send_and_await_readable(b"place%4", Duration::from_secs(1))
            .unwrap();
        assert_eq!(reply, b"-1");
        let _stream = server.join().unwrap();
    }

    #[test]
    fn unsolicited_bytes_are_dropped_before_sending() {
        let (listener, port) = listener();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(b"Finished Successfully").unwrap();
            let mut buf = [0u8; 64];
            let n = stream.read(&mut buf).unwrap();
            assert_eq!(&buf[..n], b"home");
            stream.write_all(b"1").unwrap();
            stream
        });

        let mut conn = manager(port);
        conn.open("127.0.0.1").unwrap();
        thread::sleep(Duration::from_millis(50));
        let reply = conn
            .send_and_await_readable(b"home", Duration::from_secs(1))
            .unwrap();
        assert_eq!(reply, b"1");
        let _stream = server.join().unwrap();
    }

    #[test]
    fn malformed_address_fails_without_lookup() {
        let mut conn = manager(1000);
        for bad in ["not an ip", ""] {
            let err = conn.open(bad).unwrap_err();
            assert!(matches!(err, ConnectionError::ConnectFailed(ref m) if m.contains("invalid address")));
        }
        assert!(!conn.is_connected());
    }

    #[test]
    fn closed_peer_is_reported() {
        let (listener, port) = listener();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            drop(stream);
        });

        let mut conn = manager(port);
        conn.open("127.0.0.1").unwrap();
        server.join().unwrap();
        let err = conn
            .send_and_await_readable(b"home", Duration::from_secs(1))
            .unwrap_err();
        // Depending on timing the write or the read notices the hang-up.
        assert!(matches!(
            err,
            ConnectionError::ConnectionClosed | ConnectionError::Io(_)
        ));
    }

    #[test]
    fn send_without_connection_fails() {
        let mut conn = manager(1000);
        let err = conn
            .send_and_await_readable(b"home", Duration::from_millis(10))
            .unwrap_err();
        assert_eq!(err, ConnectionError::NotConnected);
    }

    #[test]
    fn close_is_idempotent() {
        let (listener, port) = listener();
        let server = thread::spawn(move || listener.accept().map(|(s, _)| s));

        let mut conn = manager(port);
        conn.open("127.0.0.1").unwrap();
        conn.close();
        assert!(!conn.is_connected());
        conn.close();
        assert!(!conn.is_connected());
        let _ = server.join().unwrap();
    }
}
