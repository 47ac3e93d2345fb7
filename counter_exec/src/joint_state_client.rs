//! # Joint State Client
//!
//! Queries the joint state cache (`joint_state_exec`) for the latest measured state of the hand.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{
    eqpt::hand::{JointStateQuery, JointStateResponse},
    net::{zmq, MonitoredSocket, MonitoredSocketError, NetParams, SocketOptions},
};

use crate::{
    convergence::MeasuredState,
    hand_if::{JointStateSource, TransportError},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct JointStateClient {
    query_socket: MonitoredSocket,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum JointStateClientError {
    #[error("Socket error: {0}")]
    SocketError(#[from] MonitoredSocketError),

    #[error("The client is not connected to the joint state cache")]
    NotConnected,

    #[error("Could not send the query: {0}")]
    SendError(zmq::Error),

    #[error("Could not recieve a response from the joint state cache: {0}")]
    RecvError(zmq::Error),

    #[error("Could not serialize the query: {0}")]
    SerializationError(serde_json::Error),

    #[error("Could not deserialize the response: {0}")]
    DeserializeError(serde_json::Error),

    #[error("The joint state cache has not received any joint state yet")]
    NoData,

    #[error("The joint state cache did not understand the query")]
    InvalidQuery,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl JointStateClient {
    /// Create a new instance of the joint state client.
    ///
    /// This function will not block until the cache is connected.
    pub fn new(ctx: &zmq::Context, params: &NetParams) -> Result<Self, JointStateClientError> {
        let query_socket_options = SocketOptions {
            block_on_first_connect: false,
            connect_timeout: 1000,
            heartbeat_ivl: 500,
            heartbeat_ttl: 1000,
            heartbeat_timeout: 1000,
            linger: 1,
            recv_timeout: 200,
            send_timeout: 10,
            req_correlate: true,
            req_relaxed: true,
            ..Default::default()
        };

        let query_socket = MonitoredSocket::new(
            ctx,
            zmq::REQ,
            query_socket_options,
            &params.joint_state_query_endpoint,
        )?;

        Ok(Self { query_socket })
    }

    /// Get the latest joint state from the cache.
    pub fn latest(&mut self) -> Result<MeasuredState, JointStateClientError> {
        if !self.query_socket.connected() {
            return Err(JointStateClientError::NotConnected);
        }

        let query_str = serde_json::to_string(&JointStateQuery::Latest)
            .map_err(JointStateClientError::SerializationError)?;

        self.query_socket
            .send(&query_str, 0)
            .map_err(JointStateClientError::SendError)?;

        let msg = self
            .query_socket
            .recv_msg(0)
            .map_err(JointStateClientError::RecvError)?;

        let response: JointStateResponse = serde_json::from_str(msg.as_str().unwrap_or(""))
            .map_err(JointStateClientError::DeserializeError)?;

        match response {
            JointStateResponse::State(s) => Ok(s),
            JointStateResponse::NoData => Err(JointStateClientError::NoData),
            JointStateResponse::Invalid => Err(JointStateClientError::InvalidQuery),
        }
    }
}

impl JointStateSource for JointStateClient {
    fn query(&mut self) -> Result<MeasuredState, TransportError> {
        self.latest().map_err(TransportError::joint_state)
    }
}
