//! Main application logic and lifecycle management.
//!
//! The `Application` owns a [`LocalMesh`] of topology managers and one shared
//! [`SpatialNeighborEngine`]. Every tick advances the mesh clock, then moves
//! each joined node's AOI center and mirrors it into the engine.

use crate::cli::CliArgs;
use crate::config::AppConfig;
use crate::logging::display_banner;
use crate::signals::wait_for_shutdown_signal;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use vast_relay::{EntryPoint, LocalMesh, MemoryNetwork, RelayConfig};
use vast_types::{Coord, NodeId, Timestamp};
use vast_voronoi::SpatialNeighborEngine;

/// The bootstrap node every other node is pointed at.
pub const BOOTSTRAP_ID: NodeId = NodeId::new(1);

/// Snapshot of a run, returned when the application stops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub nodes: usize,
    pub joined: usize,
    pub relays: usize,
    pub sites: usize,
}

pub struct Application {
    config: AppConfig,
    mesh: LocalMesh,
    engine: SpatialNeighborEngine,
    /// Hidden positions the link latencies are derived from
    positions: BTreeMap<NodeId, Coord>,
    /// AOI centers of joined nodes
    avatars: BTreeMap<NodeId, Coord>,
    rng: StdRng,
    ticks: u64,
}

/// Scatters `count` nodes uniformly over a `world_size` square.
pub fn synthetic_positions(count: usize, world_size: f64, seed: u64) -> BTreeMap<NodeId, Coord> {
    let mut rng = StdRng::seed_from_u64(seed);
    (1..=count as u64)
        .map(|raw| {
            let position = Coord::new(rng.gen_range(0.0..world_size), rng.gen_range(0.0..world_size));
            (NodeId::new(raw), position)
        })
        .collect()
}

/// Fills in the bootstrap and entry point when the file leaves them out.
fn node_relay_config(base: &RelayConfig) -> RelayConfig {
    let mut config = base.clone();
    if config.bootstrap_id.is_none() {
        config.bootstrap_id = Some(BOOTSTRAP_ID);
    }
    if config.entry_points.is_empty() {
        config.entry_points.push(EntryPoint {
            id: BOOTSTRAP_ID,
            address: MemoryNetwork::address_for(BOOTSTRAP_ID),
        });
    }
    config
}

impl Application {
    /// Loads configuration, applies CLI overrides and builds the mesh.
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        if let Some(node_count) = args.node_count {
            config.simulation.node_count = node_count;
        }
        if let Some(relay_count) = args.relay_count {
            config.simulation.relay_count = relay_count;
        }
        if let Some(tick) = args.tick_interval_ms {
            config.simulation.tick_interval_ms = tick;
        }
        if args.max_ticks.is_some() {
            config.simulation.max_ticks = args.max_ticks;
        }
        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }
        if args.json_logs {
            config.logging.json_format = true;
        }

        display_banner();
        let app = Self::from_config(config)
            .map_err(|e| format!("Configuration validation failed: {e}"))?;
        info!("✅ Configuration loaded and validated successfully");
        Ok(app)
    }

    /// Builds the mesh described by `config`.
    pub fn from_config(config: AppConfig) -> Result<Self, String> {
        config.validate()?;
        let sim = &config.simulation;

        let positions = synthetic_positions(sim.node_count, sim.world_size, sim.seed);
        let hidden = positions.clone();
        let scale = sim.latency_scale;
        let network = MemoryNetwork::new(Box::new(move |a, b| {
            match (hidden.get(&a), hidden.get(&b)) {
                (Some(pa), Some(pb)) => (pa.distance(*pb) * scale).round() as Timestamp,
                _ => 1,
            }
        }));

        let relay_config = node_relay_config(&config.relay);
        let mut mesh = LocalMesh::new(network);
        for id in positions.keys() {
            let public = id.raw() <= sim.relay_count as u64;
            mesh.spawn(*id, public, relay_config.clone(), None);
        }

        info!(
            nodes = sim.node_count,
            relays = sim.relay_count,
            world = sim.world_size,
            seed = sim.seed,
            "🏗️ Local mesh created"
        );

        Ok(Self {
            engine: SpatialNeighborEngine::new(config.neighbors.clone()),
            rng: StdRng::seed_from_u64(sim.seed.wrapping_add(1)),
            config,
            mesh,
            positions,
            avatars: BTreeMap::new(),
            ticks: 0,
        })
    }

    pub fn mesh(&self) -> &LocalMesh {
        &self.mesh
    }

    pub fn engine(&self) -> &SpatialNeighborEngine {
        &self.engine
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            ticks: self.ticks,
            nodes: self.mesh.len(),
            joined: self.mesh.joined_count(),
            relays: self.mesh.nodes().filter(|node| node.is_relay()).count(),
            sites: self.engine.len(),
        }
    }

    /// Advances the mesh by one tick and refreshes the neighbor engine.
    pub fn tick(&mut self) {
        for (id, err) in self.mesh.step(self.config.simulation.clock_step) {
            debug!(node = %id, %err, "node cannot make progress yet");
        }
        self.ticks += 1;
        self.sync_sites();

        let interval = self.config.simulation.report_interval;
        if interval > 0 && self.ticks % interval == 0 {
            self.report();
        }
    }

    /// Ticks until every node joined or `max_ticks` passed.
    pub fn run_until_joined(&mut self, max_ticks: u64) -> bool {
        for _ in 0..max_ticks {
            self.tick();
            if self.mesh.all_joined() {
                return true;
            }
        }
        self.mesh.all_joined()
    }

    /// Runs on a wall-clock interval until a shutdown signal arrives or the
    /// configured tick limit is reached.
    pub async fn run(mut self) -> Result<RunSummary, Box<dyn std::error::Error>> {
        let sim = self.config.simulation.clone();
        info!("🚀 Starting VAST mesh with {} nodes", sim.node_count);
        info!("🛑 Press Ctrl+C to stop");

        let mut interval = tokio::time::interval(Duration::from_millis(sim.tick_interval_ms.max(1)));
        let shutdown = wait_for_shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick();
                    if sim.max_ticks.is_some_and(|limit| self.ticks >= limit) {
                        info!(ticks = self.ticks, "⏹️ Tick limit reached");
                        break;
                    }
                }
                result = &mut shutdown => {
                    if let Err(e) = result {
                        error!("❌ Signal handling failed: {e}");
                    }
                    break;
                }
            }
        }

        let summary = self.summary();
        info!(
            ticks = summary.ticks,
            joined = summary.joined,
            nodes = summary.nodes,
            sites = summary.sites,
            "📊 Final statistics"
        );
        info!("✅ VAST mesh shutdown complete");
        Ok(summary)
    }

    /// Mirrors join state into the engine: joined nodes get a site that
    /// wanders a little every tick, nodes that lost their relay drop out.
    fn sync_sites(&mut self) {
        let states: Vec<(NodeId, bool, Option<NodeId>)> = self
            .mesh
            .nodes()
            .map(|node| (node.id(), node.is_joined(), node.current_relay()))
            .collect();

        let world = self.config.simulation.world_size;
        let speed = self.config.simulation.move_speed;

        for (id, joined, relay) in states {
            match (joined, self.avatars.get(&id).copied()) {
                (true, None) => {
                    let start = self.positions.get(&id).copied().unwrap_or_default();
                    if let Err(e) = self.engine.insert(id, start) {
                        warn!(node = %id, %e, "could not track node");
                        continue;
                    }
                    self.avatars.insert(id, start);
                    info!(node = %id, relay = ?relay.map(|r| r.raw()), "🔗 Node joined the mesh");
                }
                (true, Some(current)) => {
                    let step = Coord::random_unit(&mut self.rng) * speed;
                    let moved = current + step;
                    let next = Coord::new(moved.x.clamp(0.0, world), moved.y.clamp(0.0, world));
                    if self.engine.update(id, next).is_ok() {
                        self.avatars.insert(id, next);
                    }
                }
                (false, Some(_)) => {
                    self.engine.remove(id);
                    self.avatars.remove(&id);
                    warn!(node = %id, "Node lost its relay");
                }
                (false, None) => {}
            }
        }
    }

    fn report(&mut self) {
        let summary = self.summary();
        info!(
            tick = self.ticks,
            clock = self.mesh.now(),
            joined = summary.joined,
            nodes = summary.nodes,
            states = ?self.mesh.state_counts(),
            "📊 Join progress"
        );

        let Some(center) = self.avatars.get(&BOOTSTRAP_ID).copied() else {
            return;
        };
        let radius = self.config.simulation.aoi_radius;
        let enclosing = self.engine.enclosing_neighbors(BOOTSTRAP_ID, 1);
        let boundary = self.engine.is_boundary(BOOTSTRAP_ID, center, radius);
        let others: Vec<NodeId> = self.engine.ids().filter(|id| *id != BOOTSTRAP_ID).collect();
        let visible = others
            .into_iter()
            .filter(|id| self.engine.overlaps_aoi(*id, center, radius))
            .count();

        info!(
            node = %BOOTSTRAP_ID,
            enclosing = ?enclosing.iter().map(|id| id.raw()).collect::<Vec<_>>(),
            visible,
            boundary,
            rebuilds = self.engine.stats().rebuilds,
            "🗺️ Neighbor view"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.simulation.node_count = 8;
        config.simulation.relay_count = 3;
        config.simulation.report_interval = 0;
        config
    }

    #[test]
    fn test_synthetic_positions_are_seeded() {
        let a = synthetic_positions(5, 100.0, 9);
        let b = synthetic_positions(5, 100.0, 9);
        assert_eq!(a, b);
        assert_eq!(a.len(), 5);
        assert!(a.values().all(|p| (0.0..100.0).contains(&p.x) && (0.0..100.0).contains(&p.y)));
    }

    #[test]
    fn test_relay_config_points_at_bootstrap() {
        let config = node_relay_config(&RelayConfig::default());
        assert_eq!(config.bootstrap_id, Some(BOOTSTRAP_ID));
        assert_eq!(config.entry_points.len(), 1);
        assert_eq!(config.entry_points[0].id, BOOTSTRAP_ID);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = small_config();
        config.simulation.relay_count = 9;
        assert!(Application::from_config(config).is_err());
    }

    #[test]
    fn test_every_node_joins_and_is_tracked() {
        let mut app = Application::from_config(small_config()).expect("valid config");
        assert_eq!(app.summary().relays, 3);

        assert!(app.run_until_joined(20_000), "states: {:?}", app.mesh().state_counts());
        let summary = app.summary();
        assert_eq!(summary.joined, 8);
        assert_eq!(summary.sites, 8);

        // Sites keep moving inside the world and stay tracked.
        app.tick();
        app.tick();
        assert_eq!(app.engine().len(), 8);
        for id in app.engine().ids() {
            let p = app.engine().get(id).expect("tracked");
            assert!((0.0..=1000.0).contains(&p.x) && (0.0..=1000.0).contains(&p.y));
        }
    }

    #[tokio::test]
    async fn test_run_stops_at_tick_limit() {
        let mut config = small_config();
        config.simulation.tick_interval_ms = 1;
        config.simulation.max_ticks = Some(25);

        let app = Application::from_config(config).expect("valid config");
        let summary = app.run().await.expect("run completes");
        assert_eq!(summary.ticks, 25);
        assert_eq!(summary.nodes, 8);
    }
}
