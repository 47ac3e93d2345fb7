//! # Goal Client
//!
//! Client side of the counter executable's goal server: a REQ socket for requests and a SUB
//! socket receiving feedback and results.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{
    action::{GoalEvent, GoalRequest, GoalResponse},
    net::{zmq, MonitoredSocket, MonitoredSocketError, NetParams, SocketOptions},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct GoalClient {
    request_socket: MonitoredSocket,

    event_socket: MonitoredSocket,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum GoalClientError {
    #[error("Socket error: {0}")]
    SocketError(#[from] MonitoredSocketError),

    #[error("The client is not connected to the counter")]
    NotConnected,

    #[error("Could not send the request: {0}")]
    SendError(zmq::Error),

    #[error("Could not recieve a message from the counter: {0}")]
    RecvError(zmq::Error),

    #[error("Could not serialize the request: {0}")]
    SerializationError(serde_json::Error),

    #[error("Could not deserialize the message from the counter: {0}")]
    DeserializeError(serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl GoalClient {
    /// Create a new instance of the goal client.
    ///
    /// Blocks until the request socket is connected or `timeout_ms` elapses.
    pub fn new(
        ctx: &zmq::Context,
        params: &NetParams,
        timeout_ms: i32,
    ) -> Result<Self, GoalClientError> {
        let request_socket_options = SocketOptions {
            connect_timeout: timeout_ms,
            linger: 1,
            recv_timeout: timeout_ms,
            send_timeout: timeout_ms,
            req_correlate: true,
            req_relaxed: true,
            ..Default::default()
        };
        let event_socket_options = SocketOptions {
            connect_timeout: timeout_ms,
            linger: 1,
            recv_timeout: 100,
            ..Default::default()
        };

        let request_socket = MonitoredSocket::new(
            ctx,
            zmq::REQ,
            request_socket_options,
            &params.goal_request_endpoint,
        )?;
        let event_socket = MonitoredSocket::new(
            ctx,
            zmq::SUB,
            event_socket_options,
            &params.goal_event_endpoint,
        )?;

        Ok(Self {
            request_socket,
            event_socket,
        })
    }

    /// Send a request and wait for the response.
    pub fn request(&mut self, request: &GoalRequest) -> Result<GoalResponse, GoalClientError> {
        if !self.request_socket.connected() {
            return Err(GoalClientError::NotConnected);
        }

        let req_str =
            serde_json::to_string(request).map_err(GoalClientError::SerializationError)?;

        self.request_socket
            .send(&req_str, 0)
            .map_err(GoalClientError::SendError)?;

        let msg = self
            .request_socket
            .recv_msg(0)
            .map_err(GoalClientError::RecvError)?;

        serde_json::from_str(msg.as_str().unwrap_or("")).map_err(GoalClientError::DeserializeError)
    }

    /// Get the next event, returns `None` if none arrived within the receive timeout.
    pub fn next_event(&mut self) -> Result<Option<GoalEvent>, GoalClientError> {
        let msg = match self.event_socket.recv_msg(0) {
            Ok(m) => m,
            Err(zmq::Error::EAGAIN) => return Ok(None),
            Err(e) => return Err(GoalClientError::RecvError(e)),
        };

        serde_json::from_str(msg.as_str().unwrap_or(""))
            .map(Some)
            .map_err(GoalClientError::DeserializeError)
    }
}
