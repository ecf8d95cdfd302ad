//! Wire messages exchanged by topology managers.
//!
//! Messages are plain serde values tagged by type so any transport that can
//! carry JSON (or any other serde format) can carry them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use vast_types::{NodeId, PhysicalEstimate, RelayRecord, Timestamp};

/// An id/address pair, enough to send a message back to someone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: NodeId,
    pub address: SocketAddr,
}

/// Protocol messages of the relay mesh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelayMessage {
    /// Latency probe, carries the sender's clock reading
    Ping { send_time: Timestamp },

    /// Answer to a PING: echoes the probe time and asks for a PONG_2 carrying
    /// `reply_time` back, so both sides get a round-trip sample
    Pong {
        query_time: Timestamp,
        estimate: PhysicalEstimate,
        reply_time: Timestamp,
    },

    /// Answer to a PONG, closing the exchange
    Pong2 {
        query_time: Timestamp,
        estimate: PhysicalEstimate,
    },

    /// Gossiped relay records
    Relay { relays: Vec<RelayRecord> },

    /// Asks the receiver for its relay list
    Request,

    /// Greedy nearest-relay lookup on behalf of `requester`
    RelayQuery {
        requester: RelayRecord,
        forwarder: Contact,
    },

    /// The relay that found itself closest answers the lookup
    RelayQueryReply {
        requester: RelayRecord,
        responder: RelayRecord,
    },

    /// Asks to be served by the receiving relay
    RelayJoin { joiner: RelayRecord, as_relay: bool },

    /// Outcome of a join request
    RelayJoinReply { accepted: bool },

    /// Relays that failed to answer probes, reported to the bootstrap node
    BadLandmark { ids: Vec<NodeId> },

    /// A public relay announcing itself to the bootstrap node
    Register { record: RelayRecord },

    /// The sender (or a peer, when generated by the transport) has left
    Disconnect,
}

impl RelayMessage {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayMessage::Ping { .. } => "PING",
            RelayMessage::Pong { .. } => "PONG",
            RelayMessage::Pong2 { .. } => "PONG_2",
            RelayMessage::Relay { .. } => "RELAY",
            RelayMessage::Request => "REQUEST",
            RelayMessage::RelayQuery { .. } => "RELAY_QUERY",
            RelayMessage::RelayQueryReply { .. } => "RELAY_QUERY_R",
            RelayMessage::RelayJoin { .. } => "RELAY_JOIN",
            RelayMessage::RelayJoinReply { .. } => "RELAY_JOIN_R",
            RelayMessage::BadLandmark { .. } => "BADLANDMARK",
            RelayMessage::Register { .. } => "REGISTER",
            RelayMessage::Disconnect => "DISCONNECT",
        }
    }
}

impl fmt::Display for RelayMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// A message together with the sender's identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub from: NodeId,
    pub from_address: SocketAddr,
    pub message: RelayMessage,
}

impl Envelope {
    pub fn sender(&self) -> Contact {
        Contact {
            id: self.from,
            address: self.from_address,
        }
    }
}
