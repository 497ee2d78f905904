//! Three-peer farming session over an in-process loopback network.
//!
//! Loads the bundled valley farm data, starts an authority that plants a
//! row of turnips and carrots, and brings two farmhands in: one at the
//! start and one a few days late, caught up by full sync. A day clock
//! drives growth on the authority; the farmhands crossbreed a hybrid and
//! wander off to the orchard. Each day prints crop stages and whether
//! every peer's world hashes the same.
//!
//! Run with: `cargo run -p furrow-examples --example three_peer_session`
//! (set `RUST_LOG=debug` to watch sync batches go by).

use furrow_core::coord::{ChunkCoord, TilePos};
use furrow_core::growth::GrowthReport;
use furrow_core::id::{PeerId, PlantId, StructureId};
use furrow_core::loading::{VisualKind, VisualSpawner};
use furrow_core::sim::DayClock;
use furrow_core::tile::CropFlags;
use furrow_data::{FarmData, load_farm_data};
use furrow_net::authority::ElectedAuthority;
use furrow_net::message::FarmMessage;
use furrow_net::replicate::TileMutation;
use furrow_net::session::PeerSession;
use furrow_net::transport::{LoopbackBus, LoopbackHub};
use std::collections::HashMap;
use std::error::Error;
use std::path::Path;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

const HOST: PeerId = PeerId(1);
const FRAME: Duration = Duration::from_millis(250);
const DAY_LENGTH: Duration = Duration::from_secs(2);
const LAST_DAY: u32 = 8;

/// Counts live visuals per chunk in place of a renderer.
struct CountingSpawner {
    chunk_size: u32,
    live: HashMap<ChunkCoord, usize>,
}

impl CountingSpawner {
    fn total(&self) -> usize {
        self.live.values().sum()
    }
}

impl VisualSpawner for CountingSpawner {
    fn spawn_tile_visual(&mut self, pos: TilePos, _kind: VisualKind, _sprite_key: &str) {
        *self.live.entry(pos.chunk(self.chunk_size)).or_default() += 1;
    }

    fn destroy_chunk_visuals(&mut self, chunk: ChunkCoord) {
        self.live.remove(&chunk);
    }
}

struct Farmer {
    session: PeerSession<ElectedAuthority>,
    bus: LoopbackBus,
    spawner: CountingSpawner,
    pos: TilePos,
}

impl Farmer {
    fn join(hub: &LoopbackHub, id: PeerId, data: &FarmData) -> Result<Self, Box<dyn Error>> {
        let mut farmer = Farmer {
            session: PeerSession::new(
                id,
                ElectedAuthority::with_authority(id, HOST),
                &data.config,
                data.catalog.clone(),
            )?,
            bus: hub.connect(id),
            spawner: CountingSpawner {
                chunk_size: data.config.chunk_size,
                live: HashMap::new(),
            },
            pos: TilePos::new(10, 10),
        };
        farmer.session.start(&mut farmer.bus);
        Ok(farmer)
    }

    fn act(&mut self, mutation: TileMutation) -> Result<FarmMessage, Box<dyn Error>> {
        Ok(self.session.mutate(&mutation, &mut self.bus)?)
    }

    fn frame(&mut self, dt: Duration) {
        for envelope in self.bus.drain() {
            self.session.handle_message(envelope.from, &envelope.payload);
        }
        self.session
            .update(dt, self.pos, &mut self.bus, &mut self.spawner);
    }

    fn new_day(&mut self, day: u32) -> Option<GrowthReport> {
        self.session
            .on_day_changed(day, &mut self.bus, &mut self.spawner)
    }
}

fn introduce(farmers: &mut [Farmer], newcomer: PeerId) {
    for f in farmers.iter_mut() {
        if f.session.local_peer() != newcomer {
            f.session.on_peer_joined(newcomer);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();

    let data_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../furrow-data/data");
    let data = load_farm_data(&data_dir)?;
    info!(
        plants = data.catalog.plant_count(),
        sections = data.config.sections.len(),
        "farm data loaded"
    );

    let hub = LoopbackHub::new();
    let mut farmers = vec![Farmer::join(&hub, HOST, &data)?];

    // --- The authority plants a row before anyone else arrives ---

    let turnip = PlantId::new("turnip");
    let carrot = PlantId::new("carrot");
    let turnips = [2, 3, 4].map(|x| TilePos::new(x, 5));
    let carrots = [5, 6, 7].map(|x| TilePos::new(x, 5));
    {
        let host = &mut farmers[0];
        for pos in turnips {
            host.act(TileMutation::Till { pos })?;
            host.act(TileMutation::PlantCrop {
                pos,
                plant_id: turnip.clone(),
            })?;
        }
        for pos in carrots {
            host.act(TileMutation::Till { pos })?;
            host.act(TileMutation::PlantCrop {
                pos,
                plant_id: carrot.clone(),
            })?;
        }
        host.act(TileMutation::PlaceStructure {
            pos: TilePos::new(1, 5),
            structure_id: StructureId::new("fence"),
            day: 0,
        })?;
    }

    println!("=== Day 0: farmhand 2 joins ===\n");
    farmers.push(Farmer::join(&hub, PeerId(2), &data)?);
    introduce(&mut farmers, PeerId(2));

    // --- Days pass ---

    let mut clock = DayClock::new(0, DAY_LENGTH);
    while clock.day() < LAST_DAY {
        for f in farmers.iter_mut() {
            f.frame(FRAME);
        }

        for day in clock.advance(FRAME) {
            for f in farmers.iter_mut() {
                if let Some(report) = f.new_day(day) {
                    println!(
                        "Day {day}: {} crops aged, {} advanced",
                        report.crops_aged,
                        report.advances.len()
                    );
                }
            }

            match day {
                3 => {
                    println!("  farmhand 3 arrives late");
                    farmers.push(Farmer::join(&hub, PeerId(3), &data)?);
                    introduce(&mut farmers, PeerId(3));
                }
                4 => {
                    let hand = &mut farmers[1];
                    let pollinated = CropFlags {
                        pollinated: true,
                        ..CropFlags::default()
                    };
                    for pos in [turnips[1], carrots[1]] {
                        hand.act(TileMutation::TendCrop {
                            pos,
                            flags: pollinated,
                        })?;
                    }
                    let delta = hand.act(TileMutation::Crossbreed {
                        target: turnips[1],
                        donor: carrots[1],
                    })?;
                    println!("  farmhand 2 crossbreeds: {delta:?}");
                }
                6 => {
                    // The orchard section starts at chunk x = 6.
                    farmers[1].pos = TilePos::new(6 * data.config.chunk_size as i32 + 10, 10);
                    println!("  farmhand 2 walks to the orchard");
                }
                _ => {}
            }
        }
    }

    // Let the last messages and unload timers run out.
    for _ in 0..20 {
        for f in farmers.iter_mut() {
            f.frame(FRAME);
        }
    }

    // --- Report ---

    println!("\n=== End of day {} ===\n", clock.day());
    let world = farmers[0].session.world();
    for pos in turnips.iter().chain(carrots.iter()) {
        if let Some(crop) = world.crop(*pos) {
            println!(
                "  ({}, {}): {} stage {} age {}",
                pos.x, pos.y, crop.plant_id, crop.stage, crop.total_age
            );
        }
    }

    println!();
    let expected = farmers[0].session.world().state_hash();
    for f in &farmers {
        let hash = f.session.world().state_hash();
        println!(
            "  peer {}: hash {hash:016x} {}, {} active chunks, {} visuals",
            f.session.local_peer(),
            if hash == expected { "(match)" } else { "(DIVERGED)" },
            f.session.loading().active_count(),
            f.spawner.total(),
        );
    }
    Ok(())
}
