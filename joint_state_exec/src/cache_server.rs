//! # Joint State Cache Server
//!
//! Network side of the joint state executable: a SUB socket receiving the raw joint states
//! published by the hand, and a REP socket answering queries for the latest state.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{
    eqpt::hand::{JointStateMsg, JointStateQuery, JointStateResponse},
    net::{zmq, MonitoredSocket, MonitoredSocketError, NetParams, SocketOptions},
};
use log::warn;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct CacheServer {
    /// SUB socket receiving raw joint states from the hand
    raw_socket: MonitoredSocket,

    /// REP socket answering joint state queries
    query_socket: MonitoredSocket,
}

/// What became readable during a call to [`CacheServer::poll`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Readable {
    pub raw: bool,
    pub query: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum CacheServerError {
    #[error("Socket error: {0}")]
    SocketError(#[from] MonitoredSocketError),

    #[error("Could not poll the sockets: {0}")]
    PollError(zmq::Error),

    #[error("Could not receive a message: {0}")]
    RecvError(zmq::Error),

    #[error("Could not send the response: {0}")]
    SendError(zmq::Error),

    #[error("Could not serialize the response: {0}")]
    SerializationError(serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CacheServer {
    /// Create a new instance of the cache server.
    ///
    /// This function will not wait for the hand or any client before returning.
    pub fn new(ctx: &zmq::Context, params: &NetParams) -> Result<Self, CacheServerError> {
        let raw_socket_options = SocketOptions {
            block_on_first_connect: false,
            conflate: true,
            connect_timeout: 1000,
            heartbeat_ivl: 500,
            heartbeat_ttl: 1000,
            heartbeat_timeout: 1000,
            linger: 1,
            ..Default::default()
        };
        let query_socket_options = SocketOptions {
            bind: true,
            block_on_first_connect: false,
            send_timeout: 10,
            linger: 1,
            ..Default::default()
        };

        let raw_socket = MonitoredSocket::new(
            ctx,
            zmq::SUB,
            raw_socket_options,
            &params.raw_joint_state_endpoint,
        )?;
        let query_socket = MonitoredSocket::new(
            ctx,
            zmq::REP,
            query_socket_options,
            &params.joint_state_query_endpoint,
        )?;

        Ok(Self {
            raw_socket,
            query_socket,
        })
    }

    /// Wait up to `timeout_ms` for either socket to become readable.
    pub fn poll(&self, timeout_ms: i64) -> Result<Readable, CacheServerError> {
        let mut items = [
            self.raw_socket.as_poll_item(zmq::POLLIN),
            self.query_socket.as_poll_item(zmq::POLLIN),
        ];

        zmq::poll(&mut items, timeout_ms).map_err(CacheServerError::PollError)?;

        Ok(Readable {
            raw: items[0].is_readable(),
            query: items[1].is_readable(),
        })
    }

    /// Receive a raw joint state. Returns `None` if the message could not be deserialized.
    pub fn recv_raw(&mut self) -> Result<Option<JointStateMsg>, CacheServerError> {
        let msg = self
            .raw_socket
            .recv_msg(0)
            .map_err(CacheServerError::RecvError)?;

        match serde_json::from_str(msg.as_str().unwrap_or("")) {
            Ok(m) => Ok(Some(m)),
            Err(e) => {
                warn!("Could not deserialize joint state: {}", e);
                Ok(None)
            }
        }
    }

    /// Receive a query. Unparsable queries give `None` and MUST still be answered.
    pub fn recv_query(&mut self) -> Result<Option<JointStateQuery>, CacheServerError> {
        let msg = self
            .query_socket
            .recv_msg(0)
            .map_err(CacheServerError::RecvError)?;

        match serde_json::from_str(msg.as_str().unwrap_or("")) {
            Ok(q) => Ok(Some(q)),
            Err(e) => {
                warn!("Could not deserialize joint state query: {}", e);
                Ok(None)
            }
        }
    }

    pub fn send_response(&mut self, response: &JointStateResponse) -> Result<(), CacheServerError> {
        let resp_str =
            serde_json::to_string(response).map_err(CacheServerError::SerializationError)?;

        self.query_socket
            .send(&resp_str, 0)
            .map_err(CacheServerError::SendError)
    }
}
