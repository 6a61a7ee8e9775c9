//! UDP datagram transport
//!
//! A topic maps to one socket address. Publishers send datagrams to it and a
//! subscriber binds it, so one publisher process and one subscriber process
//! on the same route talk directly. Topic names resolve through the route
//! table first and are otherwise parsed as a literal `host:port`.

use super::{PublishHandle, SubscribeHandle, Transport, TransportError, DEFAULT_QUEUE_DEPTH};
use crossbeam_channel::{Sender, TrySendError};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Largest datagram the reader accepts
const MAX_DATAGRAM: usize = 65_536;

/// Largest payload a single IPv4 UDP datagram can carry
pub const MAX_UDP_PAYLOAD: usize = 65_507;

/// How often the reader thread rechecks its stop flag
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Routes used when no config overrides them
pub fn default_routes() -> BTreeMap<String, SocketAddr> {
    BTreeMap::from([
        ("topic_1".to_string(), SocketAddr::from(([127, 0, 0, 1], 7401))),
        ("topic_2".to_string(), SocketAddr::from(([127, 0, 0, 1], 7402))),
    ])
}

/// UDP transport with a topic route table
#[derive(Debug, Clone)]
pub struct UdpTransport {
    routes: BTreeMap<String, SocketAddr>,
    queue_depth: usize,
}

impl UdpTransport {
    /// Create a transport with the given routes
    pub fn new(routes: BTreeMap<String, SocketAddr>) -> Self {
        Self {
            routes,
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }

    /// Resolve a topic to its socket address
    pub fn resolve(&self, topic: &str) -> Result<SocketAddr, TransportError> {
        if let Some(addr) = self.routes.get(topic) {
            return Ok(*addr);
        }
        topic
            .parse()
            .map_err(|_| TransportError::UnknownRoute(topic.to_string()))
    }
}

impl Default for UdpTransport {
    fn default() -> Self {
        Self::new(default_routes())
    }
}

impl Transport for UdpTransport {
    fn name(&self) -> &'static str {
        "udp"
    }

    fn open_publisher(&self, topic: &str) -> Result<Box<dyn PublishHandle>, TransportError> {
        let addr = self
            .resolve(topic)
            .map_err(|e| TransportError::publisher_setup(topic, e))?;
        let local: SocketAddr = if addr.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket =
            UdpSocket::bind(local).map_err(|e| TransportError::publisher_setup(topic, e))?;
        socket
            .connect(addr)
            .map_err(|e| TransportError::publisher_setup(topic, e))?;

        tracing::info!(topic, %addr, "UDP publisher ready");
        Ok(Box::new(UdpPublisher {
            topic: topic.to_string(),
            socket,
        }))
    }

    fn open_subscriber(&self, topic: &str) -> Result<SubscribeHandle, TransportError> {
        let addr = self
            .resolve(topic)
            .map_err(|e| TransportError::subscriber_setup(topic, e))?;
        let socket =
            UdpSocket::bind(addr).map_err(|e| TransportError::subscriber_setup(topic, e))?;
        socket
            .set_read_timeout(Some(READ_TIMEOUT))
            .map_err(|e| TransportError::subscriber_setup(topic, e))?;

        let (tx, rx) = crossbeam_channel::bounded(self.queue_depth);
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let thread_topic = topic.to_string();
        let thread = std::thread::Builder::new()
            .name(format!("udp-rx-{}", topic))
            .spawn(move || reader_loop(socket, tx, thread_stop, thread_topic))
            .map_err(|e| TransportError::subscriber_setup(topic, e))?;

        tracing::info!(topic, %addr, "UDP subscriber bound");
        Ok(SubscribeHandle::new(topic, rx).with_guard(ReaderGuard {
            stop,
            thread: Some(thread),
        }))
    }
}

struct UdpPublisher {
    topic: String,
    socket: UdpSocket,
}

impl PublishHandle for UdpPublisher {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        match self.socket.send(bytes) {
            Ok(_) => Ok(()),
            // Nobody bound the route yet: a publish with no subscribers
            Err(e) if e.kind() == ErrorKind::ConnectionRefused => {
                tracing::trace!(topic = %self.topic, "no subscriber on route");
                Ok(())
            }
            Err(e) => Err(TransportError::Send {
                topic: self.topic.clone(),
                reason: e.to_string(),
            }),
        }
    }
}

fn reader_loop(socket: UdpSocket, tx: Sender<Vec<u8>>, stop: Arc<AtomicBool>, topic: String) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    let mut dropped = 0u64;

    while !stop.load(Ordering::Relaxed) {
        match socket.recv(&mut buf) {
            Ok(len) => match tx.try_send(buf[..len].to_vec()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    dropped += 1;
                    if dropped.is_power_of_two() {
                        tracing::warn!(topic = %topic, dropped, "subscriber queue full, dropping datagrams");
                    }
                }
                Err(TrySendError::Disconnected(_)) => break,
            },
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(e) => {
                tracing::warn!(topic = %topic, error = %e, "UDP receive failed");
                std::thread::sleep(Duration::from_millis(10));
            }
        }
    }

    tracing::debug!(topic = %topic, "UDP reader stopped");
}

struct ReaderGuard {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Drop for ReaderGuard {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::wait_for_any;

    fn loopback_route(topic: &str) -> (UdpTransport, SocketAddr) {
        // Grab a free port, then release it for the subscriber to bind
        let probe = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = probe.local_addr().unwrap();
        drop(probe);
        let routes = BTreeMap::from([(topic.to_string(), addr)]);
        (UdpTransport::new(routes), addr)
    }

    #[test]
    fn test_default_routes() {
        let transport = UdpTransport::default();
        assert_eq!(
            transport.resolve("topic_1").unwrap(),
            "127.0.0.1:7401".parse().unwrap()
        );
        assert_eq!(
            transport.resolve("topic_2").unwrap(),
            "127.0.0.1:7402".parse().unwrap()
        );
    }

    #[test]
    fn test_literal_address_topic() {
        let transport = UdpTransport::new(BTreeMap::new());
        assert_eq!(
            transport.resolve("10.0.0.5:9000").unwrap(),
            "10.0.0.5:9000".parse().unwrap()
        );
        assert!(matches!(
            transport.resolve("not_routed"),
            Err(TransportError::UnknownRoute(_))
        ));
    }

    #[test]
    fn test_unknown_route_is_setup_failure() {
        let transport = UdpTransport::new(BTreeMap::new());
        assert!(matches!(
            transport.open_publisher("nowhere"),
            Err(TransportError::Setup { role: "publisher", .. })
        ));
    }

    #[test]
    fn test_datagram_round_trip() {
        let (transport, _) = loopback_route("t");
        let sub = transport.open_subscriber("t").unwrap();
        let mut publisher = transport.open_publisher("t").unwrap();

        publisher.send(&[7, 7, 7]).unwrap();

        let ready = wait_for_any(&[&sub], Duration::from_secs(2));
        assert_eq!(ready, vec![0]);
        assert_eq!(sub.receive(), Some(vec![7, 7, 7]));
    }

    #[test]
    fn test_second_bind_on_same_route_fails() {
        let (transport, _) = loopback_route("t");
        let _first = transport.open_subscriber("t").unwrap();
        assert!(matches!(
            transport.open_subscriber("t"),
            Err(TransportError::Setup { role: "subscriber", .. })
        ));
    }
}
