/// This is a general example of how you would typically turn the step hits of
/// a simulated event into analog signals.
use anyhow::Result;
use asb::geometry::{GeomId, GeometryMap, Placement, Point3};
use asb::hit::{SimulatedData, StepHit};
use asb::properties::Properties;
use asb::registry::{Context, DriverRegistry};
use asb::signal::SignalData;
use asb::tracker::{ANODIC_WIRE_CATEGORY, CATHODIC_RING_CATEGORY};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use uom::si::energy::megaelectronvolt;
use uom::si::f64::{Energy, Time};
use uom::si::time::nanosecond;

const CALO_BLOCK: u32 = 1302;
const DRIFT_CELL: u32 = 1204;

const CALO_CONFIG: &str = r#"
id : string = "CaloSignal"
hit_category : string = "calo"
signal_category : string = "sigcalo"
model : string = "triangle"
rise_time : real = 8 ns
fall_time : real = 70 ns
energy_amplitude_factor : real = 0.3 V/MeV
"#;

const TRACKER_CONFIG: &str = r#"
id : string = "GGSignal"
hit_category : string = "gg"
signal_category : string = "siggg"
start_signal_id : integer = 1000
model : string = "triangle_gate"
amplitude : real = 100 mV
cell_dead_time : real = 1 ms
"#;

fn geometry() -> GeometryMap {
    let cell_addresses = ["module", "side", "layer", "row"];
    let mut map = GeometryMap::new();
    map.add_category("calorimeter_block", CALO_BLOCK, ["module", "side", "column", "row", "part"])
        .add_category("drift_cell_core", DRIFT_CELL, cell_addresses)
        .add_category(ANODIC_WIRE_CATEGORY, 1210, cell_addresses)
        .add_category(
            CATHODIC_RING_CATEGORY,
            1211,
            ["module", "side", "layer", "row", "ring"],
        );
    // A single tracker layer, 44 mm between wires.
    for row in 0..8 {
        let x = 44.0 * f64::from(row);
        map.add_placement(
            GeomId::new(DRIFT_CELL, [0, 1, 0, row]),
            Placement::translation(Point3::from_mm(x, 0.0, 0.0)),
        );
    }
    map
}

fn event(rng: &mut impl Rng) -> SimulatedData {
    let mut data = SimulatedData::new();
    // An electron crossing the tracker layer before stopping in a block.
    let mut hit_id = 0;
    for row in 0..8 {
        let x = 44.0 * f64::from(row);
        let drift = rng.random_range(0.5..20.0);
        let z = rng.random_range(-1000.0..1000.0);
        data.add_step_hit(
            "gg",
            StepHit::builder()
                .hit_id(hit_id)
                .gid(GeomId::new(DRIFT_CELL, [0, 1, 0, row]))
                .start_time(Time::new::<nanosecond>(0.1 * f64::from(row)))
                .start_position(Point3::from_mm(x + drift, 0.0, z))
                .stop_position(Point3::from_mm(x, 0.0, z))
                .particle_name("e-")
                .build(),
        );
        hit_id += 1;
    }
    for step in 0..3 {
        data.add_step_hit(
            "calo",
            StepHit::builder()
                .hit_id(hit_id)
                .gid(GeomId::new(CALO_BLOCK, [0, 1, 4, 7, 1]))
                .start_time(Time::new::<nanosecond>(2.0 + 0.05 * f64::from(step)))
                .energy_deposit(Energy::new::<megaelectronvolt>(rng.random_range(0.1..0.5)))
                .particle_name("e-")
                .build(),
        );
        hit_id += 1;
    }
    data
}

fn main() -> Result<()> {
    env_logger::init();

    let registry = DriverRegistry::new();
    let context = Context::new(Arc::new(geometry()));
    let mut drivers = vec![
        context.build_driver(&registry, "calo", &CALO_CONFIG.parse::<Properties>()?)?,
        context.build_driver(&registry, "tracker", &TRACKER_CONFIG.parse::<Properties>()?)?,
    ];
    for driver in &drivers {
        println!("{driver}");
    }

    let mut rng = StdRng::seed_from_u64(42);
    for event_number in 0..3 {
        let data = event(&mut rng);
        let mut signals = SignalData::new();
        for driver in &mut drivers {
            driver.process(&data, &mut signals)?;
        }

        println!("Event #{event_number}");
        for category in signals.categories() {
            for signal in signals.signals(category) {
                println!(
                    "  {category} #{} {} {} (t_ref = {} ns)",
                    signal.hit_id,
                    signal.gid,
                    signal.shape_type_id(),
                    signal.time_ref.get::<nanosecond>()
                );
            }
        }
    }

    for driver in &mut drivers {
        driver.reset()?;
    }

    Ok(())
}
