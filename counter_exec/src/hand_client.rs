//! # Hand Client
//!
//! Publishes position demands to the hand. Demands are fire-and-forget, the hand driver (or the
//! simulated hand) subscribes to them and the joint state cache reports the resulting motion.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{
    eqpt::hand::HandDems,
    net::{zmq, MonitoredSocket, MonitoredSocketError, NetParams, SocketOptions},
};
use log::trace;

use crate::{
    catalog::Pose,
    hand_if::{ActuatorSink, TransportError},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct HandClient {
    dems_socket: MonitoredSocket,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum HandClientError {
    #[error("Socket error: {0}")]
    SocketError(#[from] MonitoredSocketError),

    #[error("The client is not connected to the hand")]
    NotConnected,

    #[error("Could not send demands to the hand: {0}")]
    SendError(zmq::Error),

    #[error("Could not serialize the demands: {0}")]
    SerializationError(serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl HandClient {
    /// Create a new instance of the hand client.
    ///
    /// This function will not block until the hand is connected.
    pub fn new(ctx: &zmq::Context, params: &NetParams) -> Result<Self, HandClientError> {
        let dems_socket_options = SocketOptions {
            block_on_first_connect: false,
            connect_timeout: 1000,
            heartbeat_ivl: 500,
            heartbeat_ttl: 1000,
            heartbeat_timeout: 1000,
            linger: 1,
            send_timeout: 10,
            ..Default::default()
        };

        let dems_socket = MonitoredSocket::new(
            ctx,
            zmq::PUB,
            dems_socket_options,
            &params.hand_dems_endpoint,
        )?;

        Ok(Self { dems_socket })
    }

    /// Returns true if the hand is connected.
    pub fn connected(&self) -> bool {
        self.dems_socket.connected()
    }

    /// Send demands to the hand.
    pub fn send_demands(&mut self, demands: &HandDems) -> Result<(), HandClientError> {
        // A PUB socket silently drops messages when nobody is listening
        if !self.dems_socket.connected() {
            return Err(HandClientError::NotConnected);
        }

        let dems_str =
            serde_json::to_string(demands).map_err(HandClientError::SerializationError)?;

        trace!("Sending hand demands: {}", dems_str);

        self.dems_socket
            .send(&dems_str, 0)
            .map_err(HandClientError::SendError)
    }
}

impl ActuatorSink for HandClient {
    fn command(&mut self, pose: &Pose) -> Result<(), TransportError> {
        self.send_demands(&pose.to_dems())
            .map_err(TransportError::command)
    }
}
