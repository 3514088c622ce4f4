use crate::geometry::{GeomId, Point3};
use crate::properties::Properties;
use std::collections::BTreeMap;
use uom::si::energy::megaelectronvolt;
use uom::si::f64::{Energy, Time};

/// A Monte-Carlo truth energy deposit in a sensitive detector volume.
///
/// For calorimeter hits the start/stop positions delimit the deposit. For
/// tracker hits the start position is where the ion/electron pair was created
/// and the stop position is where the Geiger avalanche hit the anode wire.
#[derive(Clone, Debug, PartialEq, bon::Builder)]
pub struct StepHit {
    #[builder(default)]
    pub hit_id: u32,
    pub gid: GeomId,
    #[builder(default)]
    pub start_position: Point3,
    #[builder(default)]
    pub stop_position: Point3,
    pub start_time: Time,
    /// Defaults to `start_time`.
    pub stop_time: Option<Time>,
    #[builder(default = Energy::new::<megaelectronvolt>(0.0))]
    pub energy_deposit: Energy,
    #[builder(into, default)]
    pub particle_name: String,
    #[builder(default)]
    pub auxiliaries: Properties,
}

impl StepHit {
    pub fn time_stop(&self) -> Time {
        self.stop_time.unwrap_or(self.start_time)
    }
}

/// The step hits of one simulated event, grouped by hit category.
#[derive(Clone, Debug, Default)]
pub struct SimulatedData {
    step_hits: BTreeMap<String, Vec<StepHit>>,
}

impl SimulatedData {
    pub fn new() -> Self {
        Self::default()
    }
    /// Appends a hit to the category `category`.
    pub fn add_step_hit(&mut self, category: impl Into<String>, hit: StepHit) {
        self.step_hits.entry(category.into()).or_default().push(hit);
    }
    pub fn has_step_hits(&self, category: &str) -> bool {
        self.step_hits.get(category).is_some_and(|v| !v.is_empty())
    }
    /// Returns the hits of `category` in insertion order; empty if there are
    /// none.
    pub fn step_hits(&self, category: &str) -> &[StepHit] {
        self.step_hits
            .get(category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
    pub fn number_of_step_hits(&self, category: &str) -> usize {
        self.step_hits(category).len()
    }
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.step_hits.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uom::si::time::nanosecond;

    #[test]
    fn step_hit_builder_defaults() {
        let hit = StepHit::builder()
            .gid(GeomId::new(1302, [0, 1, 2, 3]))
            .start_time(Time::new::<nanosecond>(2.0))
            .build();

        assert_eq!(hit.hit_id, 0);
        assert_eq!(hit.time_stop(), hit.start_time);
        assert_eq!(hit.energy_deposit.get::<megaelectronvolt>(), 0.0);
        assert!(hit.particle_name.is_empty());
        assert!(hit.auxiliaries.is_empty());
    }

    #[test]
    fn simulated_data_categories() {
        let mut data = SimulatedData::new();
        assert!(!data.has_step_hits("calo"));
        assert!(data.step_hits("calo").is_empty());

        for n in 0..3 {
            let hit = StepHit::builder()
                .hit_id(n)
                .gid(GeomId::new(1302, [n]))
                .start_time(Time::new::<nanosecond>(0.0))
                .build();
            data.add_step_hit("calo", hit);
        }

        assert!(data.has_step_hits("calo"));
        assert!(!data.has_step_hits("gg"));
        assert_eq!(data.number_of_step_hits("calo"), 3);
        assert_eq!(
            data.step_hits("calo")
                .iter()
                .map(|h| h.hit_id)
                .collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(data.categories().collect::<Vec<_>>(), vec!["calo"]);
    }
}
