//! Inbound message handling.

use super::{JoinState, TopologyManager};
use crate::context::NetworkContext;
use crate::error::TransportError;
use crate::message::{Contact, Envelope, RelayMessage};
use std::net::SocketAddr;
use tracing::{debug, info, trace, warn};
use vast_types::{NodeId, PhysicalEstimate, RelayRecord, Timestamp};

impl TopologyManager {
    /// Reacts to one inbound message.
    ///
    /// The sender's address is recorded with [`NetworkContext::notify_mapping`]
    /// before the message is dispatched on its variant. Replies go out through
    /// `ctx` immediately and are never awaited.
    ///
    /// # Arguments
    ///
    /// * `envelope` - The message with its sender id and address
    /// * `ctx` - This node's view of the network
    ///
    /// # Errors
    ///
    /// None are returned. Faults are absorbed by pruning the offending relay
    /// or by dropping the message, and any retry happens on a later tick.
    pub fn handle_message(&mut self, envelope: Envelope, ctx: &mut dyn NetworkContext) {
        let Envelope {
            from,
            from_address,
            message,
        } = envelope;

        trace!(node = %self.id, from = %from, kind = message.kind(), "handling message");
        ctx.notify_mapping(from, from_address);

        match message {
            RelayMessage::Ping { send_time } => self.handle_ping(from, send_time, ctx),

            RelayMessage::Pong {
                query_time,
                estimate,
                reply_time,
            } => self.handle_pong(from, from_address, query_time, estimate, Some(reply_time), ctx),

            RelayMessage::Pong2 {
                query_time,
                estimate,
            } => self.handle_pong(from, from_address, query_time, estimate, None, ctx),

            RelayMessage::Relay { relays } => {
                for record in relays {
                    self.add_relay(record, ctx);
                }
            }

            RelayMessage::Request => {
                let limit = self.config.max_concurrent_ping;
                self.send_relay_list(from, limit, ctx);
            }

            RelayMessage::RelayQuery {
                requester,
                forwarder,
            } => self.handle_relay_query(requester, forwarder, ctx),

            RelayMessage::RelayQueryReply {
                requester,
                responder,
            } => self.handle_query_reply(requester, responder, ctx),

            RelayMessage::RelayJoin { joiner, as_relay } => {
                self.handle_join(joiner, as_relay, ctx)
            }

            RelayMessage::RelayJoinReply { accepted } => {
                self.handle_join_reply(from, accepted, ctx)
            }

            RelayMessage::BadLandmark { ids } => self.handle_bad_landmark(from, ids),

            RelayMessage::Register { record } => self.handle_register(record, ctx),

            RelayMessage::Disconnect => self.handle_disconnect(from),
        }
    }

    fn handle_ping(&mut self, from: NodeId, send_time: Timestamp, ctx: &mut dyn NetworkContext) {
        let pong = RelayMessage::Pong {
            query_time: send_time,
            estimate: self.estimator.estimate(),
            reply_time: ctx.now(),
        };
        if self.send_to_relay(from, pong, ctx).is_err() {
            return;
        }

        let limit = self.config.max_concurrent_ping;
        self.send_relay_list(from, limit, ctx);
    }

    /// Handles PONG (`reply_time` set) and PONG_2 (`reply_time` empty).
    fn handle_pong(
        &mut self,
        from: NodeId,
        from_address: SocketAddr,
        query_time: Timestamp,
        estimate: PhysicalEstimate,
        reply_time: Option<Timestamp>,
        ctx: &mut dyn NetworkContext,
    ) {
        let rtt = ctx.now().saturating_sub(query_time) as f64;

        if let Err(err) = self
            .estimator
            .apply_sample(from, rtt, &estimate, &mut self.rng)
        {
            warn!(node = %self.id, peer = %from, %err, "discarding sample and removing peer");
            self.stats.samples_rejected += 1;
            self.remove_relay(from);
            return;
        }
        self.stats.samples_applied += 1;

        // A PONG answers our own probe, so its sender is (or was) a relay we
        // know. A PONG_2 may come from anyone who probed us.
        if reply_time.is_some() || self.directory.contains(from) {
            self.add_relay(RelayRecord::new(from, estimate, from_address), ctx);
        }

        if self.estimator.is_settled() || self.ping_rounds > self.config.max_relay_queries {
            self.commit_coordinate(ctx);
        } else {
            // Keep probing until the estimate settles.
            self.timeout_ping = 0;
        }

        if let Some(reply_time) = reply_time {
            let pong = RelayMessage::Pong2 {
                query_time: reply_time,
                estimate: self.estimator.estimate(),
            };
            self.pending.remove(&from);
            let _ = self.send_to_relay(from, pong, ctx);
        }
    }

    /// One greedy step of the nearest-relay lookup.
    ///
    /// The minimizer of distance to the requester over this node and its
    /// directory is found, ties going to the smaller id. If that is this node
    /// the query is answered; otherwise it is forwarded unchanged, pruning
    /// unreachable relays and re-minimizing until a send succeeds.
    fn handle_relay_query(
        &mut self,
        requester: RelayRecord,
        forwarder: Contact,
        ctx: &mut dyn NetworkContext,
    ) {
        let target = requester.coord();

        loop {
            let local = Some((self.id, self.position()));
            let Some(closest) = self.directory.closest_to(target, local) else {
                return;
            };

            if closest == self.id {
                self.answer_query(requester, forwarder, ctx);
                return;
            }

            let query = RelayMessage::RelayQuery {
                requester: requester.clone(),
                forwarder,
            };
            match self.send_to_relay(closest, query, ctx) {
                Ok(()) => {
                    self.stats.queries_forwarded += 1;
                    trace!(node = %self.id, requester = %requester.id, next = %closest, "forwarded relay query");
                    return;
                }
                // Pruned: look for the next closest.
                Err(TransportError::Unreachable(_)) => continue,
                Err(err) => {
                    debug!(node = %self.id, %err, "dropping relay query");
                    return;
                }
            }
        }
    }

    fn answer_query(&mut self, requester: RelayRecord, forwarder: Contact, ctx: &mut dyn NetworkContext) {
        self.stats.queries_answered += 1;

        // Replies travel back through the forwarder, which already has a
        // connection to the requester. If that is us, answer directly.
        let destination = if forwarder.id == self.id {
            Contact {
                id: requester.id,
                address: requester.address,
            }
        } else {
            forwarder
        };

        debug!(
            node = %self.id,
            requester = %requester.id,
            via = %destination.id,
            "answering relay query as closest relay"
        );

        ctx.notify_mapping(destination.id, destination.address);
        let reply = RelayMessage::RelayQueryReply {
            requester,
            responder: self.self_record(),
        };
        if let Err(err) = ctx.send(destination.id, reply) {
            debug!(node = %self.id, %err, "query return address no longer valid, dropping request");
        }
    }

    fn handle_query_reply(
        &mut self,
        requester: RelayRecord,
        responder: RelayRecord,
        ctx: &mut dyn NetworkContext,
    ) {
        if requester.id != self.id {
            ctx.notify_mapping(requester.id, requester.address);
            let target = requester.id;
            let reply = RelayMessage::RelayQueryReply {
                requester,
                responder,
            };
            if let Err(err) = ctx.send(target, reply) {
                debug!(node = %self.id, %err, "could not pass query reply on to requester");
            }
            return;
        }

        if self.state != JoinState::Querying {
            trace!(node = %self.id, state = %self.state, "ignoring stale query reply");
            return;
        }

        let relay = responder.id;
        debug!(node = %self.id, relay = %relay, "nearest relay found");
        self.add_relay(responder, ctx);

        if let Err(err) = self.join_relay(Some(relay), ctx) {
            debug!(node = %self.id, %err, "join postponed");
        }
    }

    fn handle_join(&mut self, joiner: RelayRecord, as_relay: bool, ctx: &mut dyn NetworkContext) {
        let has_room = self.config.client_limit == 0
            || self.clients.len() < self.config.client_limit
            || self.clients.contains_key(&joiner.id);
        let accepted = joiner.id == self.id || (self.is_relay() && !as_relay && has_room);

        let target = joiner.id;
        if accepted {
            self.stats.joins_accepted += 1;
            if joiner.id != self.id {
                info!(node = %self.id, client = %joiner.id, "accepted join request");
                ctx.notify_mapping(joiner.id, joiner.address);
                self.clients.insert(joiner.id, joiner);
            }
        } else {
            self.stats.joins_rejected += 1;
            debug!(node = %self.id, joiner = %joiner.id, as_relay, "rejected join request");
        }

        if let Err(err) = ctx.send(target, RelayMessage::RelayJoinReply { accepted }) {
            debug!(node = %self.id, %err, "join reply not sent");
            return;
        }

        let limit = self.config.max_concurrent_ping;
        self.send_relay_list(target, limit, ctx);
    }

    fn handle_join_reply(&mut self, from: NodeId, accepted: bool, ctx: &mut dyn NetworkContext) {
        if self.state != JoinState::Joining {
            return;
        }

        // A public relay can always serve itself; the exchange only
        // introduced it to the mesh.
        if self.is_relay() {
            self.become_own_relay(ctx);
            return;
        }

        if accepted && self.set_joined(Some(from)) {
            return;
        }

        debug!(node = %self.id, relay = %from, accepted, "join failed, trying next relay");
        if let Err(err) = self.join_relay(None, ctx) {
            debug!(node = %self.id, %err, "join postponed");
        }
    }

    fn handle_bad_landmark(&mut self, from: NodeId, ids: Vec<NodeId>) {
        if !self.is_bootstrap() {
            trace!(node = %self.id, from = %from, "ignoring bad landmark report");
            return;
        }

        let before = self.directory.len();
        let self_id = self.id;
        for id in ids.into_iter().filter(|id| *id != self_id) {
            self.remove_relay(id);
        }
        let removed = before - self.directory.len();
        if removed > 0 {
            info!(node = %self.id, reporter = %from, removed, "removed relays reported unreachable");
        }
    }

    fn handle_register(&mut self, record: RelayRecord, ctx: &mut dyn NetworkContext) {
        if !self.is_bootstrap() {
            trace!(node = %self.id, relay = %record.id, "ignoring registration");
            return;
        }

        info!(node = %self.id, relay = %record.id, coord = %record.coord(), "relay registered");
        self.add_relay(record, ctx);
    }

    fn handle_disconnect(&mut self, from: NodeId) {
        if self.directory.contains(from) {
            info!(node = %self.id, relay = %from, "relay disconnected");
            self.remove_relay(from);
        } else if self.clients.remove(&from).is_some() {
            info!(node = %self.id, client = %from, "client disconnected");
        }
    }
}
