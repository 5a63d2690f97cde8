//! Zone probe - evaluate one point against a zone catalog
//!
//! Stateless: nothing is persisted and no state is advanced.
//!
//! Usage:
//!   cargo run --bin zone-probe -- --lat 10.0 --lon 20.0
//!   cargo run --bin zone-probe -- --lat 10.0 --lon 20.0 --unit U1
//!   cargo run --bin zone-probe -- --catalog config/zones.json --lat 0.5 --lon 0.5 --threshold 25

use anyhow::Context;
use clap::Parser;
use geofence_engine::domain::{ContainmentState, Point, RawZone, UnitId, ZoneAssignment};
use geofence_engine::infra::Config;
use geofence_engine::io::MemoryStore;
use geofence_engine::services::{MembershipEvaluator, Verdict, ZoneSource};

#[derive(Parser, Debug)]
#[command(name = "zone-probe")]
#[command(about = "Evaluate a point against every zone in a catalog")]
struct Args {
    /// Latitude in degrees
    #[arg(long, allow_hyphen_values = true)]
    lat: f64,

    /// Longitude in degrees
    #[arg(long, allow_hyphen_values = true)]
    lon: f64,

    /// Only the zones assigned to this unit, with their stored states
    #[arg(long)]
    unit: Option<String>,

    /// Zone catalog file (defaults to the configured catalog)
    #[arg(long)]
    catalog: Option<String>,

    /// Path to TOML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Polyline threshold in meters for polylines without their own
    #[arg(long)]
    threshold: Option<f64>,
}

fn verdict_label(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Inside => "inside",
        Verdict::Outside => "outside",
        Verdict::UndefinedCenter => "undefined_center",
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load(args.config.as_deref());

    let catalog = args.catalog.clone().unwrap_or_else(|| config.catalog_file().to_string());
    let threshold = args.threshold.unwrap_or_else(|| config.polyline_threshold_m());
    let point = Point::new(args.lat, args.lon);
    anyhow::ensure!(point.is_finite(), "point {point} is not finite");

    let store = MemoryStore::load(&catalog).context("Failed to load zone catalog")?;

    let assignments: Vec<ZoneAssignment> = match &args.unit {
        Some(unit) => store
            .fetch_zones_for_unit(&UnitId::new(unit.as_str()))
            .with_context(|| format!("No zones for unit {unit}"))?,
        None => store
            .zones()
            .into_iter()
            .map(|zone: &RawZone| ZoneAssignment {
                zone: zone.clone(),
                last_known_state: ContainmentState::Unknown,
            })
            .collect(),
    };

    println!("point {point} against {} zone(s) from {catalog}", assignments.len());

    let evaluator = MembershipEvaluator::new();
    for assignment in &assignments {
        let zone = &assignment.zone;
        match evaluator.evaluate_raw(zone, point, threshold) {
            Ok(verdict) => {
                let mut line = format!(
                    "zone={} shape={} verdict={}",
                    zone.id,
                    zone.shape_code,
                    verdict_label(verdict)
                );
                if args.unit.is_some() {
                    let fresh = ContainmentState::from_inside(verdict.is_inside());
                    let change = if fresh == assignment.last_known_state { "none" } else { fresh.as_str() };
                    line.push_str(&format!(
                        " stored={} transition={}",
                        assignment.last_known_state, change
                    ));
                }
                println!("{line}");
            }
            Err(e) => println!("zone={} shape={} error=\"{}\"", zone.id, zone.shape_code, e),
        }
    }

    Ok(())
}
