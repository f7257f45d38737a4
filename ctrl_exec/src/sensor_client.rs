//! # Sensor Client
//!
//! The sensor client subscribes to the sensor messages published by the robot driver. Messages
//! are received on a background thread, decoupled from the control loop clock, and written into
//! the shared [`SensorCell`] as they arrive.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{error, info, warn};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use crate::ctrl_loop::SensorCell;
use comms_if::{
    msg::{sensor::SensorMsg, Message},
    net::{zmq, MonitoredSocket, MonitoredSocketError, NetParams, SocketOptions},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct SensorClient {
    bg_jh: Option<JoinHandle<()>>,
    bg_run: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SensorClientError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SensorClient {
    /// Connect to the driver and start receiving sensor messages into `cell`.
    ///
    /// This function does not block until the driver connects.
    pub fn new(
        ctx: &zmq::Context,
        params: &NetParams,
        cell: Arc<SensorCell>,
    ) -> Result<Self, SensorClientError> {
        let socket_options = SocketOptions {
            connect_timeout: 1000,
            heartbeat_ivl: 500,
            heartbeat_timeout: 1000,
            linger: 1,
            recv_timeout: 10,
            conflate: true,
            ..Default::default()
        };

        let socket = MonitoredSocket::new(ctx, zmq::SUB, socket_options, &params.sensor_endpoint)
            .map_err(SensorClientError::SocketError)?;

        let bg_run = Arc::new(AtomicBool::new(true));
        let connected = Arc::new(AtomicBool::new(false));

        let bg_run_clone = bg_run.clone();
        let connected_clone = connected.clone();
        let bg_jh = Some(thread::spawn(move || {
            bg_thread(socket, bg_run_clone, connected_clone, cell)
        }));

        Ok(Self {
            bg_jh,
            bg_run,
            connected,
        })
    }

    /// True if the background thread's socket is connected to the driver.
    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

impl Drop for SensorClient {
    fn drop(&mut self) {
        self.bg_run.store(false, Ordering::Relaxed);

        if let Some(jh) = self.bg_jh.take() {
            if jh.join().is_err() {
                warn!("SensorClient background thread panicked");
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Background thread, writes each sensor message received from the driver into the cell.
fn bg_thread(
    socket: MonitoredSocket,
    run: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
    cell: Arc<SensorCell>,
) {
    let mut first = true;

    while run.load(Ordering::Relaxed) {
        connected.store(socket.connected(), Ordering::Relaxed);

        let msg = match socket.recv_string(0) {
            Ok(Ok(s)) => s,
            Ok(Err(_)) => {
                warn!("Non UTF-8 message from the driver");
                continue;
            }
            Err(zmq::Error::EAGAIN) => continue,
            Err(e) => {
                error!("Error receiving message from the driver: {}", e);
                cell.mark_source_lost();
                break;
            }
        };

        let sensor_msg = match SensorMsg::from_json(&msg) {
            Ok(m) => m,
            Err(e) => {
                warn!("Could not parse sensor message: {}", e);
                continue;
            }
        };

        if first {
            info!("First sensor message received");
            first = false;
        }

        cell.write_sensor(sensor_msg);
    }
}
