//! TCP control-channel listener.
//!
//! Plain `std::net` — identical on device and host. Single client at a
//! time: the pairing worker polls [`try_accept`], and once a controller
//! is connected further accepts are refused until it disconnects.
//! Connection lifecycle changes are posted on the Comm facility.
//!
//! [`try_accept`]: crate::ports::ControlSocket::try_accept

use std::io::{ErrorKind, Read as _};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};

use log::{info, warn};

use crate::bus::{CommEvent, Event, EventBus};
use crate::ports::ControlSocket;

pub const CONTROL_PORT: u16 = 5000;

pub struct TcpControlSocket {
    listener: TcpListener,
    conn: Mutex<Option<TcpStream>>,
    bus: Arc<EventBus>,
}

impl TcpControlSocket {
    pub fn new(bus: Arc<EventBus>) -> std::io::Result<Self> {
        Self::bind(SocketAddr::from(([0, 0, 0, 0], CONTROL_PORT)), bus)
    }

    pub fn bind(addr: SocketAddr, bus: Arc<EventBus>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        info!("control socket listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            conn: Mutex::new(None),
            bus,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    fn drop_connection(&self, conn: &mut Option<TcpStream>) {
        if let Some(stream) = conn.take() {
            let _ = stream.shutdown(Shutdown::Both);
            self.bus
                .post(Event::Comm(CommEvent::ControllerDisconnected));
        }
    }
}

impl ControlSocket for TcpControlSocket {
    fn try_accept(&self) -> std::io::Result<bool> {
        let mut conn = self.conn.lock().expect("control socket poisoned");
        if conn.is_some() {
            return Ok(true);
        }
        match self.listener.accept() {
            Ok((stream, peer)) => {
                info!("controller connected from {peer}");
                stream.set_nonblocking(true)?;
                *conn = Some(stream);
                self.bus.post(Event::Comm(CommEvent::ControllerConnected));
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(false),
            Err(e) => {
                warn!("control socket accept failed: {e}");
                Err(e)
            }
        }
    }

    /// Liveness probe: a zero-byte read on the non-blocking stream
    /// means the peer closed; that drops the connection and posts the
    /// disconnect event.
    fn is_connected(&self) -> bool {
        let mut conn = self.conn.lock().expect("control socket poisoned");
        let Some(stream) = conn.as_mut() else {
            return false;
        };
        let mut probe = [0u8; 8];
        match stream.read(&mut probe) {
            Ok(0) => {
                info!("controller hung up");
                self.drop_connection(&mut conn);
                false
            }
            Ok(_) => true,
            Err(e) if e.kind() == ErrorKind::WouldBlock => true,
            Err(_) => {
                self.drop_connection(&mut conn);
                false
            }
        }
    }

    fn disconnect(&self) {
        let mut conn = self.conn.lock().expect("control socket poisoned");
        self.drop_connection(&mut conn);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{EventQueue, Facility};
    use std::time::Duration;

    fn socket() -> (TcpControlSocket, Arc<EventQueue>) {
        let bus = EventBus::new();
        let queue = EventQueue::new(4);
        bus.listen(Facility::Comm, &queue);
        let socket =
            TcpControlSocket::bind(SocketAddr::from(([127, 0, 0, 1], 0)), bus).unwrap();
        (socket, queue)
    }

    #[test]
    fn no_client_means_no_accept() {
        let (socket, _queue) = socket();
        assert!(!socket.try_accept().unwrap());
        assert!(!socket.is_connected());
    }

    #[test]
    fn accept_posts_connected_event() {
        let (socket, queue) = socket();
        let _client = TcpStream::connect(socket.local_addr().unwrap()).unwrap();

        // Non-blocking accept may need a beat for the handshake.
        let mut accepted = false;
        for _ in 0..50 {
            if socket.try_accept().unwrap() {
                accepted = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(accepted);
        assert!(socket.is_connected());
        assert_eq!(
            queue.get(Some(Duration::from_secs(1))),
            Ok(Event::Comm(CommEvent::ControllerConnected))
        );
    }

    #[test]
    fn peer_hangup_posts_disconnected_event() {
        let (socket, queue) = socket();
        let client = TcpStream::connect(socket.local_addr().unwrap()).unwrap();
        while !socket.try_accept().unwrap() {
            std::thread::sleep(Duration::from_millis(10));
        }
        queue.get(Some(Duration::from_secs(1))).unwrap();

        drop(client);
        let mut disconnected = false;
        for _ in 0..50 {
            if !socket.is_connected() {
                disconnected = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(disconnected);
        assert_eq!(
            queue.get(Some(Duration::from_secs(1))),
            Ok(Event::Comm(CommEvent::ControllerDisconnected))
        );
    }

    #[test]
    fn disconnect_is_idempotent() {
        let (socket, queue) = socket();
        let _client = TcpStream::connect(socket.local_addr().unwrap()).unwrap();
        while !socket.try_accept().unwrap() {
            std::thread::sleep(Duration::from_millis(10));
        }
        queue.get(Some(Duration::from_secs(1))).unwrap();

        socket.disconnect();
        socket.disconnect();
        assert_eq!(
            queue.get(Some(Duration::from_millis(100))),
            Ok(Event::Comm(CommEvent::ControllerDisconnected))
        );
        assert!(queue.is_empty());
    }
}
