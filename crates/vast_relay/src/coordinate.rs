//! Synthetic network coordinates (Vivaldi).
//!
//! Every node keeps one 2D coordinate and a scalar error. Each round-trip
//! sample against a peer pulls or pushes the local coordinate along the line
//! to the peer's coordinate so that coordinate distance approaches measured
//! latency. The error is a moving average of the relative prediction error and
//! doubles as the node's confidence when weighting later samples.

use crate::config::RelayConfig;
use crate::error::RelayError;
use rand::Rng;
use tracing::trace;
use vast_types::{Coord, NodeId, PhysicalEstimate};

/// Tunable constants of the Vivaldi update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VivaldiParams {
    /// Error smoothing constant (C_e)
    pub constant_error: f64,
    /// Movement constant (C_c)
    pub constant_fraction: f64,
    /// Error below which the estimate is considered settled
    pub tolerance: f64,
}

impl Default for VivaldiParams {
    fn default() -> Self {
        Self {
            constant_error: 0.1,
            constant_fraction: 0.1,
            tolerance: 0.5,
        }
    }
}

impl From<&RelayConfig> for VivaldiParams {
    fn from(config: &RelayConfig) -> Self {
        Self {
            constant_error: config.constant_error,
            constant_fraction: config.constant_fraction,
            tolerance: config.tolerance,
        }
    }
}

/// Applies one Vivaldi step to `local` given a sample against `remote`.
///
/// `fallback_direction` is used when both coordinates coincide and the line
/// between them has no direction. The caller must reject non-positive `rtt`.
pub fn vivaldi_step(
    params: &VivaldiParams,
    rtt: f64,
    local: &mut PhysicalEstimate,
    remote: &PhysicalEstimate,
    fallback_direction: Coord,
) {
    let (ei, ej) = (local.error, remote.error);

    let weight = if ei + ej == 0.0 { 0.0 } else { ei / (ei + ej) };

    let dist = local.coord.distance(remote.coord);
    let relative_error = (dist - rtt).abs() / rtt;

    let step = params.constant_error * weight;
    local.error = relative_error * step + ei * (1.0 - step);

    let direction = if dist == 0.0 {
        fallback_direction
    } else {
        (local.coord - remote.coord).unit()
    };

    local.coord += direction * ((rtt - dist) * params.constant_fraction * weight);
}

/// The coordinate estimator owned by one node.
///
/// Keeps a working estimate that moves with every sample, and a committed
/// physical coordinate that only exists once the error has settled (or once
/// the caller forces it after too many probe rounds).
///
/// A pinned estimator starts with a known physical coordinate. Samples still
/// refine its error, but the coordinate itself never moves.
#[derive(Debug, Clone)]
pub struct CoordinateEstimator {
    params: VivaldiParams,
    working: PhysicalEstimate,
    committed: Option<Coord>,
    pinned: bool,
    samples_applied: u64,
}

impl CoordinateEstimator {
    /// Creates an estimator starting from `initial` with the given error.
    pub fn new(params: VivaldiParams, initial: Coord, error: f64) -> Self {
        Self {
            params,
            working: PhysicalEstimate::new(initial, error),
            committed: None,
            pinned: false,
            samples_applied: 0,
        }
    }

    /// Creates an estimator whose physical coordinate is already known.
    pub fn pinned(params: VivaldiParams, coord: Coord, error: f64) -> Self {
        let mut estimator = Self::new(params, coord, error);
        estimator.committed = Some(coord);
        estimator.pinned = true;
        estimator
    }

    /// Creates an estimator starting at a random coordinate in `[1, 1000]²`.
    pub fn random<R: Rng + ?Sized>(params: VivaldiParams, error: f64, rng: &mut R) -> Self {
        let initial = Coord::new(
            rng.gen_range(1..=1000) as f64,
            rng.gen_range(1..=1000) as f64,
        );
        Self::new(params, initial, error)
    }

    /// The working estimate (what this node advertises in PONGs).
    pub fn estimate(&self) -> PhysicalEstimate {
        self.working
    }

    /// The committed physical coordinate, if one has been determined.
    pub fn physical_coordinate(&self) -> Option<Coord> {
        self.committed
    }

    /// Whether the working error is below the tolerance.
    pub fn is_settled(&self) -> bool {
        self.working.error < self.params.tolerance
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    /// Number of samples applied so far.
    pub fn samples_applied(&self) -> u64 {
        self.samples_applied
    }

    /// Promotes the working coordinate to the physical coordinate.
    pub fn commit(&mut self) -> Coord {
        self.committed = Some(self.working.coord);
        self.working.coord
    }

    /// Feeds one round-trip sample against `peer`.
    ///
    /// Samples with `rtt <= 0` are corrupt: the estimate is left untouched and
    /// an error naming the peer is returned so the caller can purge it.
    pub fn apply_sample<R: Rng + ?Sized>(
        &mut self,
        peer: NodeId,
        rtt: f64,
        remote: &PhysicalEstimate,
        rng: &mut R,
    ) -> Result<(), RelayError> {
        if !(rtt > 0.0) {
            return Err(RelayError::CorruptSample { peer, rtt });
        }

        let fallback = Coord::random_unit(rng);
        let anchor = self.working.coord;
        vivaldi_step(&self.params, rtt, &mut self.working, remote, fallback);
        if self.pinned {
            self.working.coord = anchor;
        }
        self.samples_applied += 1;

        trace!(
            peer = %peer,
            rtt,
            coord = %self.working.coord,
            error = self.working.error,
            "applied round-trip sample"
        );
        Ok(())
    }
}
