//! UDP telemetry link.
//!
//! Status frames go out as postcard datagrams to the agent; velocity
//! commands come back the same way. One datagram per frame, no
//! fragmentation — both message types are far under any sane MTU.

use std::net::{SocketAddr, UdpSocket};

use log::{debug, info};

use crate::ports::{LinkError, StatusReport, TelemetryLink, VelocityCommand};

pub const AGENT_PORT: u16 = 8888;

pub struct UdpTelemetryLink {
    agent: SocketAddr,
    socket: Option<UdpSocket>,
}

impl UdpTelemetryLink {
    pub fn new(agent: SocketAddr) -> Self {
        Self {
            agent,
            socket: None,
        }
    }
}

impl TelemetryLink for UdpTelemetryLink {
    fn init(&mut self) -> Result<(), LinkError> {
        let socket =
            UdpSocket::bind(("0.0.0.0", 0)).map_err(|_| LinkError::InitFailed("udp bind"))?;
        socket
            .connect(self.agent)
            .map_err(|_| LinkError::InitFailed("udp connect"))?;
        socket
            .set_nonblocking(true)
            .map_err(|_| LinkError::InitFailed("udp nonblocking"))?;
        info!("telemetry link to {}", self.agent);
        self.socket = Some(socket);
        Ok(())
    }

    fn publish_status(&mut self, report: &StatusReport) -> Result<(), LinkError> {
        let socket = self.socket.as_ref().ok_or(LinkError::PublishFailed)?;
        let bytes = postcard::to_allocvec(report).map_err(|_| LinkError::PublishFailed)?;
        socket.send(&bytes).map_err(|_| LinkError::PublishFailed)?;
        Ok(())
    }

    fn poll_velocity(&mut self) -> Option<VelocityCommand> {
        let socket = self.socket.as_ref()?;
        let mut buf = [0u8; 64];
        let len = socket.recv(&mut buf).ok()?;
        match postcard::from_bytes(&buf[..len]) {
            Ok(cmd) => Some(cmd),
            Err(_) => {
                debug!("telemetry: dropping undecodable datagram ({len} bytes)");
                None
            }
        }
    }
}
