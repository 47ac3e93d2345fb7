//! # Simulated Hand Server
//!
//! Network side of the simulated hand: a SUB socket receiving demands and a PUB socket publishing
//! the simulated joint state, mirroring the interface of the real hand driver.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{
    eqpt::hand::{HandDems, JointStateMsg},
    net::{zmq, MonitoredSocket, MonitoredSocketError, NetParams, SocketOptions},
};
use log::warn;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct HandServer {
    /// SUB socket receiving position demands
    dems_socket: MonitoredSocket,

    /// PUB socket sending joint states
    joint_state_socket: MonitoredSocket,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum HandServerError {
    #[error("Socket error: {0}")]
    SocketError(#[from] MonitoredSocketError),

    #[error("Could not send the joint state: {0}")]
    SendError(zmq::Error),

    #[error("Could not serialize the joint state: {0}")]
    SerializationError(serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl HandServer {
    /// Create a new instance of the hand server.
    ///
    /// This function will not wait for any client before returning.
    pub fn new(ctx: &zmq::Context, params: &NetParams) -> Result<Self, HandServerError> {
        let dems_socket_options = SocketOptions {
            bind: true,
            block_on_first_connect: false,
            recv_timeout: 0,
            linger: 1,
            ..Default::default()
        };
        let joint_state_socket_options = SocketOptions {
            bind: true,
            block_on_first_connect: false,
            send_timeout: 10,
            linger: 1,
            ..Default::default()
        };

        let dems_socket = MonitoredSocket::new(
            ctx,
            zmq::SUB,
            dems_socket_options,
            &params.hand_dems_endpoint,
        )?;
        let joint_state_socket = MonitoredSocket::new(
            ctx,
            zmq::PUB,
            joint_state_socket_options,
            &params.raw_joint_state_endpoint,
        )?;

        Ok(Self {
            dems_socket,
            joint_state_socket,
        })
    }

    /// Get the next demands which have arrived, if any, without blocking.
    pub fn get_demands(&mut self) -> Option<HandDems> {
        let msg = self.dems_socket.recv_msg(0).ok()?;

        match serde_json::from_str(msg.as_str().unwrap_or("")) {
            Ok(d) => Some(d),
            Err(e) => {
                warn!("Could not deserialize demands: {}", e);
                None
            }
        }
    }

    pub fn send_joint_state(&mut self, state: &JointStateMsg) -> Result<(), HandServerError> {
        let state_str =
            serde_json::to_string(state).map_err(HandServerError::SerializationError)?;

        self.joint_state_socket
            .send(&state_str, 0)
            .map_err(HandServerError::SendError)
    }
}
