//! Ferry Telemetry Simulation
//!
//! Generates synthetic vessel telemetry for exercising harborwatch without
//! a live feed. A small fleet cycles between terminal pairs with jittered
//! dwell and crossing times, and the feed's real-world flaws are
//! reproduced: optional fields drop out, departures are sometimes only
//! visible through the at-dock flag, and schedules slip.
//!
//! Output is replay format: one JSON array of samples per line, one line
//! per tick.
//!
//! # Usage
//! ```bash
//! ./simulation --hours 4 --seed 7 > telemetry.jsonl
//! ./harborwatch --replay telemetry.jsonl
//! ```

use clap::Parser;
use rand::prelude::*;
use rand_distr::{Distribution, Normal};
use std::io::{self, Write};

use harborwatch::types::TelemetrySample;

// ============================================================================
// Fleet Constants
// ============================================================================

/// Terminal pairs served by the simulated fleet.
const ROUTES: [(&str, &str); 3] = [("SEA", "BBI"), ("SEA", "BRE"), ("MUK", "CLI")];
/// Vessel names, assigned round-robin to routes.
const VESSELS: [&str; 6] = ["WALLA", "TACOMA", "CHIMACUM", "SPOKANE", "KITSAP", "SUQUAMISH"];

/// Nominal crossing time per route (minutes).
const CROSSING_MINUTES: [f64; 3] = [35.0, 60.0, 20.0];
/// Nominal dwell time at the dock (minutes).
const DWELL_MINUTES: f64 = 15.0;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "harborwatch-simulation")]
#[command(about = "Synthetic ferry telemetry generator for harborwatch")]
#[command(version)]
struct Args {
    /// Simulated duration in hours
    #[arg(long, default_value = "4")]
    hours: u64,

    /// Seconds of simulated time per tick
    #[arg(long, default_value = "30")]
    tick_secs: u64,

    /// Number of vessels (capped at the fleet roster)
    #[arg(long, default_value = "3", value_parser = clap::value_parser!(u64).range(1..=6))]
    vessels: u64,

    /// RNG seed for reproducible output
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Simulation start time (epoch ms); defaults to now
    #[arg(long)]
    start: Option<u64>,
}

// ============================================================================
// Vessel State Machine
// ============================================================================

enum Phase {
    /// Tied up, waiting out the dwell until (jittered) departure.
    AtDock { departs_at: u64 },
    /// Crossing; arrives at the far terminal at `arrives_at`.
    Underway { left_at: u64, arrives_at: u64 },
}

struct VesselSim {
    vessel_id: String,
    route: usize,
    /// Index into the route pair: which terminal we are departing from.
    side: usize,
    phase: Phase,
    scheduled_departure: u64,
    crossing_noise: Normal<f64>,
    delay_noise: Normal<f64>,
}

impl VesselSim {
    fn new(index: usize, start: u64, rng: &mut StdRng) -> anyhow::Result<Self> {
        let route = index % ROUTES.len();
        // stagger the fleet so departures do not line up
        let offset_ms = rng.gen_range(0..10) * 60_000;
        let scheduled = start + (DWELL_MINUTES * 60_000.0) as u64 + offset_ms;
        Ok(Self {
            vessel_id: VESSELS[index].to_string(),
            route,
            side: index % 2,
            phase: Phase::AtDock {
                departs_at: scheduled + 60_000,
            },
            scheduled_departure: scheduled,
            crossing_noise: Normal::new(0.0, CROSSING_MINUTES[route] * 0.08)?,
            delay_noise: Normal::new(2.0, 2.5)?,
        })
    }

    fn terminals(&self) -> (&'static str, &'static str) {
        let (a, b) = ROUTES[self.route];
        if self.side == 0 {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// Advance the state machine to `now` and emit this tick's sample.
    fn tick(&mut self, now: u64, rng: &mut StdRng) -> TelemetrySample {
        match self.phase {
            Phase::AtDock { departs_at } if now >= departs_at => {
                let crossing_min =
                    (CROSSING_MINUTES[self.route] + self.crossing_noise.sample(rng)).max(5.0);
                self.phase = Phase::Underway {
                    left_at: departs_at,
                    arrives_at: now + (crossing_min * 60_000.0) as u64,
                };
            }
            Phase::Underway { arrives_at, .. } if now >= arrives_at => {
                // turn around at the far terminal
                self.side = 1 - self.side;
                let dwell_min = (DWELL_MINUTES + self.delay_noise.sample(rng)).max(5.0);
                self.scheduled_departure = now + (DWELL_MINUTES * 60_000.0) as u64;
                self.phase = Phase::AtDock {
                    departs_at: now + (dwell_min * 60_000.0) as u64,
                };
            }
            _ => {}
        }

        let (departing, arriving) = self.terminals();
        let at_dock = matches!(self.phase, Phase::AtDock { .. });

        // Feed flaws: optional fields drop out independently each tick.
        let arriving_terminal = (rng.gen::<f64>() > 0.15).then(|| arriving.to_string());
        let scheduled_departure = (rng.gen::<f64>() > 0.10).then_some(self.scheduled_departure);
        let left_dock = match self.phase {
            // the explicit departure timestamp shows up only half the time;
            // otherwise the tracker must infer it from the flag flip
            Phase::Underway { left_at, .. } if rng.gen::<f64>() > 0.5 => Some(left_at),
            _ => None,
        };
        let eta = match self.phase {
            Phase::Underway { arrives_at, .. } if rng.gen::<f64>() > 0.3 => Some(arrives_at),
            _ => None,
        };

        TelemetrySample {
            vessel_id: self.vessel_id.clone(),
            departing_terminal: departing.to_string(),
            arriving_terminal,
            latitude: 47.6 + rng.gen::<f64>() * 0.3,
            longitude: -122.5 + rng.gen::<f64>() * 0.3,
            at_dock,
            in_service: true,
            scheduled_departure,
            eta,
            left_dock,
            timestamp: now,
        }
    }
}

// ============================================================================
// Main
// ============================================================================

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut rng = StdRng::seed_from_u64(args.seed);

    let start = args
        .start
        .unwrap_or_else(|| chrono::Utc::now().timestamp_millis() as u64);
    let tick_ms = args.tick_secs * 1_000;
    let ticks = args.hours * 3_600 / args.tick_secs;

    let mut fleet: Vec<VesselSim> = (0..args.vessels as usize)
        .map(|i| VesselSim::new(i, start, &mut rng))
        .collect::<anyhow::Result<_>>()?;

    let stdout = io::stdout();
    let mut out = stdout.lock();

    for tick in 0..ticks {
        let now = start + tick * tick_ms;
        let batch: Vec<TelemetrySample> = fleet.iter_mut().map(|v| v.tick(now, &mut rng)).collect();
        serde_json::to_writer(&mut out, &batch)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;

    Ok(())
}
