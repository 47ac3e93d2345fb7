//! # Goal Server
//!
//! Network side of the goal host. Requests arrive on a REP socket and each must be answered with
//! [`GoalServer::send_response`] before the next one can be received. Feedback and results are
//! published on a PUB socket to all watching clients.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{
    action::{GoalEvent, GoalRequest, GoalResponse},
    net::{zmq, MonitoredSocket, MonitoredSocketError, NetParams, SocketOptions},
};
use log::warn;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct GoalServer {
    /// REP socket receiving goal requests
    request_socket: MonitoredSocket,

    /// PUB socket sending goal events
    event_socket: MonitoredSocket,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum GoalServerError {
    #[error("Socket error: {0}")]
    SocketError(#[from] MonitoredSocketError),

    #[error("Could not receive a request: {0}")]
    RecvError(zmq::Error),

    #[error("Could not send to the client: {0}")]
    SendError(zmq::Error),

    #[error("Could not serialize the message: {0}")]
    SerializationError(serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl GoalServer {
    /// Create a new instance of the goal server.
    ///
    /// This function will not wait for a client to connect before returning.
    pub fn new(ctx: &zmq::Context, params: &NetParams) -> Result<Self, GoalServerError> {
        let request_options = SocketOptions {
            bind: true,
            block_on_first_connect: false,
            recv_timeout: 50,
            send_timeout: 10,
            linger: 1,
            ..Default::default()
        };
        let event_options = SocketOptions {
            bind: true,
            block_on_first_connect: false,
            send_timeout: 10,
            linger: 1,
            ..Default::default()
        };

        let request_socket = MonitoredSocket::new(
            ctx,
            zmq::REP,
            request_options,
            &params.goal_request_endpoint,
        )?;
        let event_socket =
            MonitoredSocket::new(ctx, zmq::PUB, event_options, &params.goal_event_endpoint)?;

        Ok(Self {
            request_socket,
            event_socket,
        })
    }

    /// Receive the next request, waiting at most for the socket's receive timeout.
    ///
    /// Returns `Ok(None)` if no request arrived. Requests which cannot be parsed are answered with
    /// [`GoalResponse::Invalid`] here and also give `Ok(None)`.
    pub fn recv_request(&mut self) -> Result<Option<GoalRequest>, GoalServerError> {
        let msg = match self.request_socket.recv_msg(0) {
            Ok(m) => m,
            Err(zmq::Error::EAGAIN) => return Ok(None),
            Err(e) => return Err(GoalServerError::RecvError(e)),
        };

        match serde_json::from_str(msg.as_str().unwrap_or("")) {
            Ok(r) => Ok(Some(r)),
            Err(e) => {
                warn!("Could not deserialize goal request: {}", e);
                self.send_response(&GoalResponse::Invalid)?;
                Ok(None)
            }
        }
    }

    /// Answer the last received request.
    pub fn send_response(&mut self, response: &GoalResponse) -> Result<(), GoalServerError> {
        let resp_str =
            serde_json::to_string(response).map_err(GoalServerError::SerializationError)?;

        self.request_socket
            .send(&resp_str, 0)
            .map_err(GoalServerError::SendError)
    }

    /// Publish a goal event to all subscribers.
    pub fn publish(&mut self, event: &GoalEvent) -> Result<(), GoalServerError> {
        let event_str =
            serde_json::to_string(event).map_err(GoalServerError::SerializationError)?;

        self.event_socket
            .send(&event_str, 0)
            .map_err(GoalServerError::SendError)
    }
}
