//! Registry session
//!
//! A [`Session`] owns one TCP connection to one registry server. Commands
//! are written as single lines; the reply is read until the dialect's
//! framing predicate accepts the buffered text. A session is created
//! unconnected and drops its connection on any transport error; the owner
//! reconnects before the next command.
//!
//! # Example
//!
//! ```no_run
//! use irr_walker::irr::{DialectKind, Endpoint};
//! use irr_walker::session::SessionBuilder;
//! use std::time::Duration;
//!
//! let endpoint = Endpoint::new("whois.radb.net", 43, DialectKind::Irrd);
//! let mut session = SessionBuilder::new(endpoint)
//!     .timeout(Duration::from_secs(10))
//!     .build();
//!
//! session.connect().unwrap();
//! session.send("!!").unwrap();
//! let reply = session
//!     .execute("!iAS-JPNIC,1", |buf, _| buf.ends_with("C\n"))
//!     .unwrap();
//! println!("{}", reply);
//! ```

use crate::error::{QueryError, QueryResult};
use crate::irr::Endpoint;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, info};

/// Default connect/read/write timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const READ_CHUNK: usize = 8192;

/// Builder for [`Session`]
#[derive(Debug, Clone)]
pub struct SessionBuilder {
    endpoint: Endpoint,
    timeout: Duration,
}

impl SessionBuilder {
    /// Create a new builder
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set connect, read and write timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build an unconnected session
    pub fn build(self) -> Session {
        Session {
            endpoint: self.endpoint,
            timeout: self.timeout,
            stream: None,
        }
    }
}

/// One connection to one registry server
#[derive(Debug)]
pub struct Session {
    endpoint: Endpoint,
    timeout: Duration,
    stream: Option<TcpStream>,
}

impl Session {
    /// Server host name
    pub fn server(&self) -> &str {
        &self.endpoint.host
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Check whether a connection is currently open
    pub fn is_established(&self) -> bool {
        self.stream.is_some()
    }

    /// Open the connection if it is not already open
    pub fn connect(&mut self) -> QueryResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        info!(server = %self.endpoint.to_display_string(), "Connecting");

        let addrs = (self.endpoint.host.as_str(), self.endpoint.port)
            .to_socket_addrs()
            .map_err(|e| self.connection_failed(format!("cannot resolve host: {}", e)))?;

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(stream) => {
                    stream
                        .set_read_timeout(Some(self.timeout))
                        .and_then(|_| stream.set_write_timeout(Some(self.timeout)))
                        .and_then(|_| stream.set_nodelay(true))
                        .map_err(|e| self.connection_failed(e.to_string()))?;

                    debug!(server = %self.endpoint.host, addr = %addr, "Connection established");
                    self.stream = Some(stream);
                    return Ok(());
                }
                Err(e) => {
                    debug!(server = %self.endpoint.host, addr = %addr, error = %e, "Connect attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(match last_error {
            Some(e) if is_timeout(&e) => self.timed_out(),
            Some(e) => self.connection_failed(e.to_string()),
            None => self.connection_failed("host resolved to no addresses".into()),
        })
    }

    /// Write one command line without waiting for a reply
    ///
    /// The session must already be connected; a dropped connection is only
    /// reopened by an explicit [`connect`](Self::connect).
    pub fn send(&mut self, command: &str) -> QueryResult<()> {
        debug!(server = %self.endpoint.host, command = %command, "Sending");

        let result = match self.stream.as_mut() {
            Some(stream) => stream
                .write_all(command.as_bytes())
                .and_then(|_| stream.write_all(b"\n"))
                .and_then(|_| stream.flush()),
            None => return Err(self.connection_failed("not connected".into())),
        };

        result.map_err(|e| self.io_error(e))
    }

    /// Send a command and read until `is_complete` accepts the response
    ///
    /// `is_complete` gets the text read so far and the length it had at the
    /// previous call, so it only needs to look at what arrived since. A
    /// blank command is not sent and yields an empty response.
    pub fn execute<F>(&mut self, command: &str, is_complete: F) -> QueryResult<String>
    where
        F: Fn(&str, usize) -> bool,
    {
        if command.trim().is_empty() {
            return Ok(String::new());
        }

        debug!(server = %self.endpoint.host, command = %command, "Executing");
        self.send(command)?;

        let mut text = String::with_capacity(READ_CHUNK);
        let mut pending: Vec<u8> = Vec::new();
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            let read = match self.stream.as_mut() {
                Some(stream) => stream.read(&mut chunk),
                None => return Err(self.connection_failed("connection not open".into())),
            };

            match read {
                Ok(0) => {
                    self.close();
                    let received = text.len() + pending.len();
                    let reason = if received == 0 {
                        "connection closed before any response".to_string()
                    } else {
                        format!("connection closed after {} bytes without a terminator", received)
                    };
                    return Err(QueryError::MalformedResponse {
                        server: self.endpoint.host.clone(),
                        reason,
                    });
                }
                Ok(n) => {
                    let scanned = text.len();
                    decode_into(&mut text, &mut pending, &chunk[..n]);
                    if text.len() > scanned && is_complete(&text, scanned) {
                        debug!(server = %self.endpoint.host, response = %text, "Returned");
                        return Ok(text);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.io_error(e)),
            }
        }
    }

    /// Close the connection if open
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            info!(server = %self.endpoint.to_display_string(), "Closing connection");
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }

    fn io_error(&mut self, e: io::Error) -> QueryError {
        self.close();
        if is_timeout(&e) {
            self.timed_out()
        } else {
            self.connection_failed(e.to_string())
        }
    }

    fn connection_failed(&self, reason: String) -> QueryError {
        QueryError::ConnectionFailed {
            server: self.endpoint.host.clone(),
            reason,
        }
    }

    fn timed_out(&self) -> QueryError {
        QueryError::Timeout {
            server: self.endpoint.host.clone(),
            secs: self.timeout.as_secs(),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

/// Append `bytes` to `text`, holding back an incomplete trailing UTF-8
/// sequence until the rest of it arrives
fn decode_into(text: &mut String, pending: &mut Vec<u8>, bytes: &[u8]) {
    pending.extend_from_slice(bytes);

    let complete = match std::str::from_utf8(&pending[..]) {
        Ok(_) => pending.len(),
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(_) => pending.len(),
    };

    text.push_str(&String::from_utf8_lossy(&pending[..complete]));
    pending.drain(..complete);
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::log_filter;
    use crate::irr::DialectKind;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;
    use std::thread;

    fn serve_once<F>(reply: F) -> u16
    where
        F: Fn(&str) -> Option<String> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut writer = stream.try_clone().unwrap();
            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            while reader.read_line(&mut line).unwrap_or(0) > 0 {
                match reply(line.trim_end()) {
                    Some(response) => writer.write_all(response.as_bytes()).unwrap(),
                    None => return,
                }
                line.clear();
            }
        });

        port
    }

    fn session(port: u16, timeout: Duration) -> Session {
        SessionBuilder::new(Endpoint::new("127.0.0.1", port, DialectKind::Whoisd))
            .timeout(timeout)
            .build()
    }

    #[test]
    fn test_execute_reads_until_framed() {
        let port = serve_once(|command| Some(format!("echo: {}\n\n\n", command)));
        let mut session = session(port, Duration::from_secs(5));

        assert!(!session.is_established());
        session.connect().unwrap();
        assert!(session.is_established());

        let reply = session.execute("-k AS2515", |buf, _| buf.contains("\n\n\n")).unwrap();
        assert_eq!(reply, "echo: -k AS2515\n\n\n");

        let reply = session.execute("-k AS7500", |buf, _| buf.contains("\n\n\n")).unwrap();
        assert_eq!(reply, "echo: -k AS7500\n\n\n");

        session.close();
        assert!(!session.is_established());
    }

    #[test]
    fn test_execute_passes_scanned_length() {
        let port = serve_once(|_| Some("route: 192.0.2.0/24\n\n\n".to_string()));
        let mut session = session(port, Duration::from_secs(5));
        session.connect().unwrap();

        let reply = session
            .execute("-k AS1", |buf, scanned| scanned < buf.len() && buf.ends_with("\n\n\n"))
            .unwrap();
        assert_eq!(reply, "route: 192.0.2.0/24\n\n\n");
    }

    /// Log sink shared between the subscriber and the test
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn logged_execute(debug: bool) -> String {
        let port = serve_once(|_| Some("route: 192.0.2.0/24\norigin: AS1\n\n\n".to_string()));
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(log_filter(debug))
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let mut session = session(port, Duration::from_secs(5));
            session.connect().unwrap();
            session.execute("-k AS1", |buf, _| buf.ends_with("\n\n\n")).unwrap();
        });

        let bytes = captured.0.lock().clone();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    #[test]
    fn test_debug_logging_shows_responses() {
        let logged = logged_execute(true);
        assert!(logged.contains("-k AS1"));
        assert!(logged.contains("route: 192.0.2.0/24"));

        assert!(!logged_execute(false).contains("route: 192.0.2.0/24"));
    }

    #[test]
    fn test_decode_keeps_split_characters() {
        let mut text = String::new();
        let mut pending = Vec::new();
        let bytes = "AS-ÉTÉ\n".as_bytes();

        decode_into(&mut text, &mut pending, &bytes[..4]);
        assert_eq!(text, "AS-");
        assert_eq!(pending.len(), 1);

        decode_into(&mut text, &mut pending, &bytes[4..]);
        assert_eq!(text, "AS-ÉTÉ\n");
        assert!(pending.is_empty());
    }

    #[test]
    fn test_blank_command_is_not_sent() {
        let mut session = session(1, Duration::from_secs(1));
        assert_eq!(session.execute("  ", |_, _| true).unwrap(), "");
        assert!(!session.is_established());
    }

    #[test]
    fn test_truncated_response_is_malformed() {
        let port = serve_once(|_| None);
        let mut session = session(port, Duration::from_secs(5));
        session.connect().unwrap();

        let err = session.execute("!iAS-FOO,1", |buf, _| buf.ends_with("C\n")).unwrap_err();
        assert!(matches!(err, QueryError::MalformedResponse { .. }));
        assert!(!session.is_established());
    }

    #[test]
    fn test_read_timeout() {
        let port = serve_once(|_| Some("partial".to_string()));
        let mut session = session(port, Duration::from_millis(200));
        session.connect().unwrap();

        let err = session.execute("!iAS-FOO,1", |buf, _| buf.ends_with("C\n")).unwrap_err();
        assert!(matches!(err, QueryError::Timeout { .. }));
        assert!(err.is_connection_error());
    }

    #[test]
    fn test_send_requires_connection() {
        let mut session = session(1, Duration::from_secs(1));
        let err = session.send("!!").unwrap_err();
        assert!(matches!(err, QueryError::ConnectionFailed { .. }));
    }

    #[test]
    fn test_connection_refused() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut session = session(port, Duration::from_secs(1));

        let err = session.connect().unwrap_err();
        assert!(matches!(err, QueryError::ConnectionFailed { .. }));
    }
}
