//! Timer-driven work: probing, the join state machine and directory upkeep.

use super::{JoinState, TopologyManager};
use crate::context::NetworkContext;
use crate::error::{RelayError, TransportError};
use crate::message::{Contact, RelayMessage};
use tracing::{debug, info, trace, warn};
use vast_types::{Coord, NodeId, PhysicalEstimate, RelayRecord, Timestamp};

impl TopologyManager {
    /// Runs one round of periodic work.
    ///
    /// Call once per clock advance. Timers are compared against
    /// [`NetworkContext::now`], so calling more often than they expire is
    /// harmless.
    ///
    /// # Arguments
    ///
    /// * `ctx` - This node's view of the network
    ///
    /// # Returns
    ///
    /// [`RelayError::NoRelayAvailable`] when the node needs a relay but knows
    /// none. The condition clears by itself once gossip or the entry points
    /// repopulate the directory.
    ///
    /// # Work Performed
    ///
    /// * **Probe expiry** - outstanding probes older than `query_timeout` are forgotten
    /// * **Probing** - every `ping_interval`, seeding from entry points when the directory is empty
    /// * **Join progress** - one step of the state machine, including the JOINING timeout
    /// * **Eviction** - distant relays beyond `relay_limit`, once joined
    pub fn tick(&mut self, ctx: &mut dyn NetworkContext) -> Result<(), RelayError> {
        let now = ctx.now();
        self.expire_pending(now);

        if now >= self.timeout_ping {
            self.timeout_ping = now + self.config.ping_interval;

            if self.directory.is_empty() {
                self.seed_entry_points(ctx);
            }

            if !self.directory.is_empty() {
                let joined = self.is_joined();
                self.ping(joined, ctx);
            }
        }

        let result = match self.state {
            JoinState::Absent => {
                self.advance_absent(ctx);
                Ok(())
            }
            JoinState::Querying => self.advance_querying(ctx),
            JoinState::Joining if now >= self.timeout_join => self.join_relay(None, ctx),
            JoinState::Joining | JoinState::Joined => Ok(()),
        };

        self.cleanup_relays();
        result
    }

    fn advance_absent(&mut self, ctx: &mut dyn NetworkContext) {
        if self.directory.is_empty() {
            // Nobody to measure against: assume this is the first node.
            if self.is_relay() {
                self.commit_coordinate(ctx);
                info!(node = %self.id, coord = %self.position(), "no relay known, starting as first relay");
                self.become_own_relay(ctx);
            } else {
                trace!(node = %self.id, "waiting for relays to become known");
            }
        } else if self.physical_coordinate().is_some() {
            debug!(node = %self.id, coord = %self.position(), "physical coordinate known, querying nearest relay");
            self.state = JoinState::Querying;
            self.maybe_register(ctx);
        }
    }

    fn advance_querying(&mut self, ctx: &mut dyn NetworkContext) -> Result<(), RelayError> {
        let now = ctx.now();
        if now < self.timeout_query {
            return Ok(());
        }
        self.timeout_query = now + self.config.query_timeout;

        let Some(target) = self.next_relay() else {
            // Probe again and retry as soon as a relay becomes known.
            self.timeout_ping = 0;
            self.timeout_query = 0;
            return Err(RelayError::NoRelayAvailable);
        };
        let Some(address) = self.directory.get(target).map(|record| record.address) else {
            return Err(RelayError::NoRelayAvailable);
        };

        debug!(node = %self.id, relay = %target, "sending nearest-relay query");
        let query = RelayMessage::RelayQuery {
            requester: self.self_record(),
            forwarder: Contact { id: target, address },
        };

        if self.send_to_relay(target, query, ctx).is_err() {
            // Try the next candidate on the following tick.
            self.timeout_query = 0;
        }
        Ok(())
    }

    // ========================================================================
    // Probing
    // ========================================================================

    /// Sends latency probes.
    ///
    /// With `current_relay_only` set only the current relay is probed (the
    /// keep-alive once joined), otherwise a random subset of up to
    /// `max_concurrent_ping` directory entries without an outstanding probe.
    /// A node that is not a relay always probes its current relay.
    ///
    /// Returns whether at least one probe went out.
    pub fn ping(&mut self, current_relay_only: bool, ctx: &mut dyn NetworkContext) -> bool {
        let now = ctx.now();
        let mut targets: Vec<NodeId> = Vec::new();

        if !current_relay_only {
            let count = self.config.max_concurrent_ping.min(self.directory.len());
            for record in self.directory.random_subset(count, &mut self.rng) {
                if !self.pending.contains_key(&record.id) {
                    targets.push(record.id);
                }
            }
        }

        if !self.is_relay() {
            if let Some(relay) = self.current_relay {
                if relay != self.id && !targets.contains(&relay) {
                    targets.push(relay);
                }
            }
        }

        if targets.is_empty() {
            return false;
        }

        let mut sent = 0usize;
        let mut failed = Vec::new();
        for target in targets {
            match ctx.send(target, RelayMessage::Ping { send_time: now }) {
                Ok(()) => {
                    self.pending.insert(target, now);
                    sent += 1;
                }
                Err(TransportError::Unreachable(id)) => failed.push(id),
                Err(err) => debug!(node = %self.id, %err, "probe not sent"),
            }
        }

        if !failed.is_empty() {
            for &id in &failed {
                debug!(node = %self.id, relay = %id, "removing unreachable relay");
                self.remove_relay(id);
            }
            self.report_bad_landmarks(failed, ctx);
        }

        if sent == 0 {
            warn!(node = %self.id, "no known relay could be probed, cannot determine physical coordinate");
            return false;
        }

        if !current_relay_only {
            self.ping_rounds += 1;
        }
        true
    }

    fn expire_pending(&mut self, now: Timestamp) {
        let timeout = self.config.query_timeout;
        self.pending
            .retain(|_, sent| now.saturating_sub(*sent) < timeout);
    }

    fn report_bad_landmarks(&mut self, ids: Vec<NodeId>, ctx: &mut dyn NetworkContext) {
        let Some(bootstrap) = self.config.bootstrap_id else {
            return;
        };
        if self.is_bootstrap() || ids.contains(&bootstrap) {
            return;
        }

        if let Some(address) = self.config.bootstrap_address() {
            ctx.notify_mapping(bootstrap, address);
        }
        if let Err(err) = ctx.send(bootstrap, RelayMessage::BadLandmark { ids }) {
            debug!(node = %self.id, %err, "could not report bad landmarks");
        }
    }

    /// Promotes the working coordinate and resets the probe round counter.
    pub(super) fn commit_coordinate(&mut self, ctx: &mut dyn NetworkContext) {
        let coord = self.estimator.commit();
        debug!(
            node = %self.id,
            %coord,
            error = self.estimator.estimate().error,
            rounds = self.ping_rounds,
            "physical coordinate committed"
        );
        self.ping_rounds = 0;
        self.maybe_register(ctx);
    }

    /// Announces a public relay to the bootstrap node, once.
    fn maybe_register(&mut self, ctx: &mut dyn NetworkContext) {
        if self.registered || !self.is_relay() || self.is_bootstrap() {
            return;
        }
        let Some(bootstrap) = self.config.bootstrap_id else {
            return;
        };

        if let Some(address) = self.config.bootstrap_address() {
            ctx.notify_mapping(bootstrap, address);
        }
        let record = self.self_record();
        match ctx.send(bootstrap, RelayMessage::Register { record }) {
            Ok(()) => {
                self.registered = true;
                debug!(node = %self.id, bootstrap = %bootstrap, "registered with bootstrap node");
            }
            Err(err) => debug!(node = %self.id, %err, "registration deferred"),
        }
    }

    // ========================================================================
    // Joining
    // ========================================================================

    /// Next relay to contact, in distance order after the previous contact.
    pub(super) fn next_relay(&mut self) -> Option<NodeId> {
        let next = self.directory.next_after(self.contact_relay, self.position());
        if next.is_none() {
            debug!(node = %self.id, "relay directory is empty, no next relay available");
        }
        self.contact_relay = next;
        next
    }

    /// Sends a join request to `preferred`, or to the next candidate in
    /// distance order when none is given.
    ///
    /// Enters JOINING and arms the join timeout. If the target is this node
    /// (a public relay), it joins itself at once.
    ///
    /// # Arguments
    ///
    /// * `preferred` - Relay to ask first, usually the answer to a nearest-relay query
    /// * `ctx` - This node's view of the network
    ///
    /// # Returns
    ///
    /// `Ok(())` once a request was issued, even if the send failed and the
    /// next tick has to retry. [`RelayError::NoRelayAvailable`] when the
    /// directory is empty.
    pub fn join_relay(
        &mut self,
        preferred: Option<NodeId>,
        ctx: &mut dyn NetworkContext,
    ) -> Result<(), RelayError> {
        let preferred = preferred.filter(|id| *id != self.id || self.is_relay());
        let target = match preferred {
            Some(id) => id,
            None => self.next_relay().ok_or(RelayError::NoRelayAvailable)?,
        };

        if target == self.id {
            self.become_own_relay(ctx);
            return Ok(());
        }

        self.contact_relay = Some(target);
        self.state = JoinState::Joining;

        let message = RelayMessage::RelayJoin {
            joiner: self.self_record(),
            as_relay: self.is_relay(),
        };
        debug!(node = %self.id, relay = %target, "sending join request");

        match self.send_to_relay(target, message, ctx) {
            Ok(()) => self.timeout_join = ctx.now() + self.config.join_timeout,
            Err(_) => self.timeout_join = 0,
        }
        Ok(())
    }

    /// Marks the node joined at `relay`, or at itself when `None`.
    ///
    /// Fails when the relay is no longer in the directory.
    pub(super) fn set_joined(&mut self, relay: Option<NodeId>) -> bool {
        let relay = match relay {
            None => self.id,
            Some(id) if self.directory.contains(id) => id,
            Some(id) => {
                debug!(node = %self.id, relay = %id, "cannot join unknown relay");
                return false;
            }
        };

        self.current_relay = Some(relay);
        self.contact_relay = None;
        self.state = JoinState::Joined;
        info!(node = %self.id, relay = %relay, "joined relay mesh");
        true
    }

    pub(super) fn become_own_relay(&mut self, ctx: &mut dyn NetworkContext) {
        self.notify_physical_coordinate(ctx);
        self.set_joined(None);
    }

    /// Tells up to `relay_limit` known relays about this node.
    pub(super) fn notify_physical_coordinate(&mut self, ctx: &mut dyn NetworkContext) {
        let limit = match self.config.relay_limit {
            0 => usize::MAX,
            limit => limit,
        };
        let targets: Vec<NodeId> = self.directory.ids().take(limit).collect();
        let record = self.self_record();

        for target in targets {
            let message = RelayMessage::Relay {
                relays: vec![record.clone()],
            };
            // Failures prune the target, nothing else to do.
            let _ = self.send_to_relay(target, message, ctx);
        }
    }

    // ========================================================================
    // Directory upkeep
    // ========================================================================

    /// Adds or refreshes a relay record. Records describing this node are
    /// ignored.
    pub(super) fn add_relay(&mut self, record: RelayRecord, ctx: &mut dyn NetworkContext) {
        if record.id == self.id {
            return;
        }

        ctx.notify_mapping(record.id, record.address);
        let id = record.id;
        if self.directory.upsert(record, ctx.now()) {
            trace!(node = %self.id, relay = %id, "learned relay");
        }
    }

    /// Drops a relay and everything that depended on it.
    pub(super) fn remove_relay(&mut self, id: NodeId) {
        if self.directory.remove(id).is_none() {
            return;
        }
        self.stats.relays_pruned += 1;
        self.pending.remove(&id);

        if self.current_relay == Some(id) {
            info!(node = %self.id, relay = %id, "lost current relay, querying again");
            self.current_relay = None;
            self.contact_relay = None;
            self.timeout_query = 0;
            self.state = JoinState::Querying;
        }

        if self.contact_relay == Some(id) {
            self.contact_relay = None;
        }

        if self.directory.is_empty() {
            debug!(node = %self.id, "no relays known, probing entry points again");
            self.timeout_ping = 0;
        }
    }

    /// Sends to a relay, pruning it if it turns out to be unreachable.
    pub(super) fn send_to_relay(
        &mut self,
        target: NodeId,
        message: RelayMessage,
        ctx: &mut dyn NetworkContext,
    ) -> Result<(), TransportError> {
        let kind = message.kind();
        let result = ctx.send(target, message);
        if let Err(TransportError::Unreachable(_)) = &result {
            debug!(node = %self.id, relay = %target, kind, "send failed, removing relay");
            self.remove_relay(target);
        }
        result
    }

    /// Sends up to `limit` random directory entries to `target` (0 sends all).
    ///
    /// Returns the number of records sent.
    pub(super) fn send_relay_list(
        &mut self,
        target: NodeId,
        limit: usize,
        ctx: &mut dyn NetworkContext,
    ) -> usize {
        if self.directory.is_empty() {
            return 0;
        }

        let count = match limit {
            0 => self.directory.len(),
            limit => limit.min(self.directory.len()),
        };
        let relays = self.directory.random_subset(count, &mut self.rng);
        let sent = relays.len();

        trace!(node = %self.id, target = %target, count = sent, "sending relay list");
        if let Err(err) = ctx.send(target, RelayMessage::Relay { relays }) {
            debug!(node = %self.id, %err, "relay list not sent");
            return 0;
        }
        sent
    }

    fn seed_entry_points(&mut self, ctx: &mut dyn NetworkContext) {
        let entries = self.config.entry_points.clone();
        for entry in entries {
            let estimate = PhysicalEstimate::new(Coord::zero(), self.config.default_error);
            self.add_relay(RelayRecord::new(entry.id, estimate, entry.address), ctx);
        }

        if self.directory.is_empty() && !self.is_bootstrap() {
            debug!(node = %self.id, "relay directory is empty, no entry points to seed from");
        }
    }

    /// Evicts the most distant relays once joined and over `relay_limit`.
    /// The current relay is never evicted.
    fn cleanup_relays(&mut self) {
        let Some(current) = self.current_relay else {
            return;
        };
        if self.config.relay_limit == 0 || self.state != JoinState::Joined {
            return;
        }

        let excess = self
            .directory
            .excess_by_distance(self.position(), self.config.relay_limit, &[current]);
        if excess.is_empty() {
            return;
        }

        debug!(node = %self.id, count = excess.len(), "evicting distant relays");
        for id in excess {
            self.remove_relay(id);
        }
    }
}
