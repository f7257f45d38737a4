//! # Control Server
//!
//! Publishes the control loop's output to the robot driver.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use crate::ctrl_loop::ControlSink;
use comms_if::{
    msg::{
        control::{ControlMsg, SolveTimeMsg},
        Message, MsgError,
    },
    net::{zmq, MonitoredSocket, MonitoredSocketError, NetParams, SocketOptions},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Control server, one publisher socket per message type.
pub struct CtrlServer {
    control_socket: MonitoredSocket,
    solve_time_socket: MonitoredSocket,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum CtrlServerError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),

    #[error("Could not send message: {0}")]
    SendError(zmq::Error),

    #[error("Could not serialize the message: {0}")]
    SerializationError(MsgError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CtrlServer {
    /// Create a new instance of the control server.
    ///
    /// This function will not block until a client connects.
    pub fn new(ctx: &zmq::Context, params: &NetParams) -> Result<Self, CtrlServerError> {
        Ok(Self {
            control_socket: Self::bind(ctx, &params.control_endpoint)?,
            solve_time_socket: Self::bind(ctx, &params.solve_time_endpoint)?,
        })
    }

    /// True if the driver is connected to the control socket.
    pub fn connected(&self) -> bool {
        self.control_socket.connected()
    }

    fn bind(ctx: &zmq::Context, endpoint: &str) -> Result<MonitoredSocket, CtrlServerError> {
        let socket_options = SocketOptions {
            bind: true,
            connect_timeout: 1000,
            heartbeat_ivl: 500,
            heartbeat_timeout: 1000,
            linger: 1,
            send_timeout: 10,
            ..Default::default()
        };

        MonitoredSocket::new(ctx, zmq::PUB, socket_options, endpoint)
            .map_err(CtrlServerError::SocketError)
    }

    fn send<M: Message>(socket: &MonitoredSocket, msg: &M) -> Result<(), CtrlServerError> {
        let msg_string = msg
            .to_json()
            .map_err(CtrlServerError::SerializationError)?;

        socket
            .send(msg_string.as_str(), 0)
            .map_err(CtrlServerError::SendError)
    }
}

impl ControlSink for CtrlServer {
    type Error = CtrlServerError;

    fn publish_control(&mut self, msg: &ControlMsg) -> Result<(), Self::Error> {
        Self::send(&self.control_socket, msg)
    }

    fn publish_solve_time(&mut self, msg: &SolveTimeMsg) -> Result<(), Self::Error> {
        Self::send(&self.solve_time_socket, msg)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::msg::{control::MultiArray, sensor::SensorMsg, Header};

    #[test]
    fn test_control_published() {
        let ctx = zmq::Context::new();
        let params = NetParams {
            sensor_endpoint: "inproc://unused_sensor".into(),
            control_endpoint: "inproc://ctrl_server_test_control".into(),
            solve_time_endpoint: "inproc://ctrl_server_test_solve_time".into(),
        };
        let mut server = CtrlServer::new(&ctx, &params).unwrap();

        let subscriber = ctx.socket(zmq::SUB).unwrap();
        subscriber.set_linger(0).unwrap();
        subscriber.set_rcvtimeo(20).unwrap();
        subscriber.set_subscribe(b"").unwrap();
        subscriber.connect(&params.control_endpoint).unwrap();

        let msg = ControlMsg {
            header: Header::now(),
            feedback_gain: MultiArray::matrix(1, 2, vec![-1.0, -2.0]).unwrap(),
            feedforward: MultiArray::vector(vec![0.5]),
            initial_state: SensorMsg::new(vec![0.0], vec![0.0]),
        };

        // Publish until the subscription has propagated
        let mut received = None;
        for _ in 0..250 {
            server.publish_control(&msg).unwrap();
            if let Ok(Ok(s)) = subscriber.recv_string(0) {
                received = Some(s);
                break;
            }
        }

        let received = ControlMsg::from_json(&received.unwrap()).unwrap();
        assert_eq!(received, msg);
    }

    #[test]
    fn test_connected_tracks_driver() {
        let ctx = zmq::Context::new();
        let params = NetParams {
            sensor_endpoint: "inproc://unused_sensor".into(),
            control_endpoint: "tcp://127.0.0.1:25721".into(),
            solve_time_endpoint: "inproc://ctrl_server_conn_test_solve_time".into(),
        };
        let server = CtrlServer::new(&ctx, &params).unwrap();
        assert!(!server.connected());

        let subscriber = ctx.socket(zmq::SUB).unwrap();
        subscriber.set_linger(0).unwrap();
        subscriber.connect(&params.control_endpoint).unwrap();

        let start = std::time::Instant::now();
        while !server.connected() {
            assert!(start.elapsed() < std::time::Duration::from_secs(5));
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
    }
}
