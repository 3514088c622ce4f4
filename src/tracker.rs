use crate::driver::{compose_multi_signal, DriverCore, SignalGenerator};
use crate::error::{Error, Result};
use crate::geiger::{AnodeEfficiencyMode, GeigerRegime};
use crate::geometry::{GeomId, GeometryLookup};
use crate::hit::StepHit;
use crate::properties::Properties;
use crate::signal::{Polarity, Shape, Signal, SignalSink};
use rand::{Rng, RngCore};
use rand_distr::{Distribution, Normal};
use std::fmt;
use std::str::FromStr;
use uom::si::electric_potential::{millivolt, volt};
use uom::si::f64::{ElectricPotential, Length, Time};
use uom::si::length::{meter, millimeter};
use uom::si::time::{microsecond, nanosecond, second};
use uom::si::velocity::meter_per_second;

/// Geometry category of the anode wire of a drift cell.
pub const ANODIC_WIRE_CATEGORY: &str = "drift_cell_anodic_wire";
/// Geometry category of the cathode rings at both ends of a drift cell.
pub const CATHODIC_RING_CATEGORY: &str = "drift_cell_cathodic_ring";
const RING_SUBADDRESS: &str = "ring";
const BOTTOM_RING: u32 = 0;
const TOP_RING: u32 = 1;

/// Random source used by [`DriftTimePolicy::Randomized`].
pub type RandomSource = Box<dyn RngCore + Send>;

/// Pulse model of the tracker driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackerModel {
    /// Anodic gates closed by the plasma reaching the cathode rings.
    TriangleGate,
}

impl FromStr for TrackerModel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "triangle_gate" => Ok(TrackerModel::TriangleGate),
            _ => Err(Error::UnsupportedModel(s.to_string())),
        }
    }
}

impl fmt::Display for TrackerModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackerModel::TriangleGate => write!(f, "triangle_gate"),
        }
    }
}

/// How the anode and cathode times of a hit are obtained from the Geiger
/// regime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DriftTimePolicy {
    /// Calibrated expectation values, no randomness.
    #[default]
    Expectation,
    /// Anode efficiency and time resolutions are sampled from the attached
    /// random source.
    Randomized,
}

impl FromStr for DriftTimePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "expectation" => Ok(DriftTimePolicy::Expectation),
            "randomized" => Ok(DriftTimePolicy::Randomized),
            _ => Err(Error::invalid_value(
                "drift_time_policy",
                format!("unknown policy '{s}'"),
            )),
        }
    }
}

impl fmt::Display for DriftTimePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriftTimePolicy::Expectation => write!(f, "expectation"),
            DriftTimePolicy::Randomized => write!(f, "randomized"),
        }
    }
}

// Anode time and plasma propagation delays to both ends of the cell.
#[derive(Clone, Copy, Debug)]
struct CellResponse {
    anode_time: Time,
    bottom_cathode_time: Time,
    top_cathode_time: Time,
}

// Identifiers of the readout channels of one drift cell.
struct CellChannels {
    anodic_wire: GeomId,
    bottom_ring: GeomId,
    top_ring: GeomId,
}

// Geometry categories resolved once per event.
struct ChannelTypes {
    anodic_wire: u32,
    cathodic_ring: u32,
    ring_index: usize,
}

impl ChannelTypes {
    fn resolve(geometry: &dyn GeometryLookup) -> Result<Self> {
        let category_type = |name: &str| {
            geometry
                .category_type(name)
                .ok_or_else(|| Error::Geometry(format!("unknown category '{name}'")))
        };
        let anodic_wire = category_type(ANODIC_WIRE_CATEGORY)?;
        let cathodic_ring = category_type(CATHODIC_RING_CATEGORY)?;
        let ring_index = geometry
            .subaddress_index(cathodic_ring, RING_SUBADDRESS)
            .ok_or_else(|| {
                Error::Geometry(format!(
                    "no '{RING_SUBADDRESS}' subaddress in category '{CATHODIC_RING_CATEGORY}'"
                ))
            })?;

        Ok(Self {
            anodic_wire,
            cathodic_ring,
            ring_index,
        })
    }

    fn channels(&self, cell: &GeomId) -> Result<CellChannels> {
        let mut anodic_wire = cell.clone();
        anodic_wire.set_geom_type(self.anodic_wire);

        let ring = |address: u32| -> Result<GeomId> {
            let mut gid = cell.clone();
            gid.set_geom_type(self.cathodic_ring);
            gid.set_depth(gid.depth() + 1);
            gid.set(self.ring_index, address)?;
            Ok(gid)
        };

        Ok(CellChannels {
            anodic_wire,
            bottom_ring: ring(BOTTOM_RING)?,
            top_ring: ring(TOP_RING)?,
        })
    }
}

fn drift_distance(hit: &StepHit) -> Length {
    hit.stop_position.distance(&hit.start_position)
}

/// Flags the hits that occur while their cell is still dead from an earlier
/// hit.
///
/// Hits are compared pairwise within the same cell using their anode times; of
/// two hits closer than `dead_time`, the later one is flagged. Hits without an
/// anode time take no part in the comparison.
fn dead_time_flags(hits: &[StepHit], anode_times: &[Option<Time>], dead_time: Time) -> Vec<bool> {
    let mut flagged = vec![false; hits.len()];
    for (i, (hit, time)) in hits.iter().zip(anode_times).enumerate() {
        let Some(time) = *time else { continue };
        for (j, (other, other_time)) in hits.iter().zip(anode_times).enumerate().skip(i + 1) {
            let Some(other_time) = *other_time else {
                continue;
            };
            if hit.gid != other.gid {
                continue;
            }
            if time > other_time && time < other_time + dead_time {
                flagged[i] = true;
            } else if other_time > time && other_time < time + dead_time {
                flagged[j] = true;
            }
        }
    }

    flagged
}

fn smear(rng: &mut RandomSource, mean: Time, sigma: Time, key: &str) -> Result<Time> {
    let normal = Normal::new(mean.get::<nanosecond>(), sigma.get::<nanosecond>())
        .map_err(|e| Error::invalid_value(key, e.to_string()))?;

    Ok(Time::new::<nanosecond>(normal.sample(rng)))
}

fn default_rise_time() -> Time {
    Time::new::<microsecond>(1.0)
}

fn default_fall_time() -> Time {
    Time::new::<microsecond>(1.0)
}

fn default_amplitude() -> ElectricPotential {
    ElectricPotential::new::<millivolt>(100.0)
}

/// Signal generator for drift cells operated in Geiger regime.
///
/// Each modelled hit yields a composite anodic signal on the anode wire and a
/// positive pulse on each cathode ring. Hits falling in the dead time of an
/// earlier hit in the same cell are suppressed.
pub struct TrackerDriver {
    core: DriverCore,
    model: Option<TrackerModel>,
    drift_time_policy: DriftTimePolicy,
    rise_time: Time,
    fall_time: Time,
    amplitude: ElectricPotential,
    geiger: GeigerRegime,
    random: Option<RandomSource>,
}

impl Default for TrackerDriver {
    fn default() -> Self {
        Self {
            core: DriverCore::new(),
            model: None,
            drift_time_policy: DriftTimePolicy::default(),
            rise_time: default_rise_time(),
            fall_time: default_fall_time(),
            amplitude: default_amplitude(),
            geiger: GeigerRegime::default(),
            random: None,
        }
    }
}

impl TrackerDriver {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_id(id: impl Into<String>) -> Self {
        let mut driver = Self::default();
        driver.core = DriverCore::with_id(id);
        driver
    }

    fn ensure_unlocked(&self) -> Result<()> {
        if self.is_initialized() {
            return Err(Error::AlreadyInitialized);
        }
        Ok(())
    }

    pub fn model(&self) -> Option<TrackerModel> {
        self.model
    }
    pub fn set_model(&mut self, model: TrackerModel) -> Result<()> {
        self.ensure_unlocked()?;
        self.model = Some(model);
        Ok(())
    }
    pub fn drift_time_policy(&self) -> DriftTimePolicy {
        self.drift_time_policy
    }
    pub fn set_drift_time_policy(&mut self, policy: DriftTimePolicy) -> Result<()> {
        self.ensure_unlocked()?;
        self.drift_time_policy = policy;
        Ok(())
    }
    pub fn rise_time(&self) -> Time {
        self.rise_time
    }
    pub fn set_rise_time(&mut self, rise_time: Time) -> Result<()> {
        self.ensure_unlocked()?;
        self.rise_time = rise_time;
        Ok(())
    }
    pub fn fall_time(&self) -> Time {
        self.fall_time
    }
    pub fn set_fall_time(&mut self, fall_time: Time) -> Result<()> {
        self.ensure_unlocked()?;
        self.fall_time = fall_time;
        Ok(())
    }
    /// Full amplitude of the anodic signal.
    pub fn amplitude(&self) -> ElectricPotential {
        self.amplitude
    }
    pub fn set_amplitude(&mut self, amplitude: ElectricPotential) -> Result<()> {
        self.ensure_unlocked()?;
        self.amplitude = amplitude;
        Ok(())
    }
    pub fn geiger(&self) -> &GeigerRegime {
        &self.geiger
    }
    /// Replaces the Geiger regime with a custom, not yet initialized, one.
    pub fn set_geiger(&mut self, geiger: GeigerRegime) -> Result<()> {
        self.ensure_unlocked()?;
        if geiger.is_initialized() {
            return Err(Error::AlreadyInitialized);
        }
        self.geiger = geiger;
        Ok(())
    }

    pub fn has_random_source(&self) -> bool {
        self.random.is_some()
    }
    pub fn attach_random_source(&mut self, random: RandomSource) -> Result<()> {
        self.ensure_unlocked()?;
        self.random = Some(random);
        Ok(())
    }
    /// Removes the random source. A randomized driver fails to process events
    /// until a new source is attached.
    pub fn detach_random_source(&mut self) -> Option<RandomSource> {
        self.random.take()
    }

    fn expected_anode_time(&self, hit: &StepHit) -> Result<Option<Time>> {
        let drift_time = self
            .geiger
            .compute_drift_time_from_drift_distance(drift_distance(hit))?;

        Ok(drift_time.map(|t| hit.start_time + t))
    }

    fn cathode_times(&self, geometry: &dyn GeometryLookup, hit: &StepHit) -> Result<(Time, Time)> {
        let local = geometry.world_to_local(&hit.gid, &hit.stop_position)?;
        let z = local.z.get::<meter>();
        let half_length = 0.5 * self.geiger.cell_length().get::<meter>();
        let speed = self
            .geiger
            .plasma_longitudinal_speed()
            .get::<meter_per_second>();

        let bottom = Time::new::<second>((z + half_length) / speed);
        let top = Time::new::<second>((half_length - z) / speed);
        Ok((bottom, top))
    }

    // Returns `None` if the anode did not fire.
    fn randomize(&mut self, hit: &StepHit, expected: CellResponse) -> Result<Option<CellResponse>> {
        let rng = self.random.as_mut().ok_or(Error::MissingRandomSource)?;

        let efficiency = self
            .geiger
            .get_anode_efficiency(drift_distance(hit), AnodeEfficiencyMode::Sigmoid)?;
        if rng.random::<f64>() >= efficiency {
            log::trace!("hit {} lost to anode inefficiency", hit.hit_id);
            return Ok(None);
        }

        let sigma_anode = self.geiger.get_sigma_anode_time(expected.anode_time)?;
        let sigma_cathode = self.geiger.get_sigma_cathode_time()?;
        let zero = Time::new::<nanosecond>(0.0);
        let anode_time = smear(rng, expected.anode_time, sigma_anode, "sigma_anode_time")?;
        let bottom = smear(
            rng,
            expected.bottom_cathode_time,
            sigma_cathode,
            "sigma_cathode_time",
        )?;
        let top = smear(
            rng,
            expected.top_cathode_time,
            sigma_cathode,
            "sigma_cathode_time",
        )?;

        Ok(Some(CellResponse {
            anode_time,
            bottom_cathode_time: if bottom < zero { zero } else { bottom },
            top_cathode_time: if top < zero { zero } else { top },
        }))
    }

    fn new_signal(&mut self, gid: &GeomId, shape: Shape, subcategory: &str) -> Result<Signal> {
        let id = self.core.allocate_signal_id()?;
        let time_ref = Time::new::<nanosecond>(0.0);
        let mut signal = Signal::new(id, gid.clone(), self.core.signal_category(), time_ref, shape);
        signal.auxiliaries.store_string("subcategory", subcategory);
        Ok(signal)
    }

    fn emit(
        &mut self,
        channels: &CellChannels,
        response: CellResponse,
        sink: &mut dyn SignalSink,
    ) -> Result<()> {
        let half_amplitude = 0.5 * self.amplitude;
        let t0 = response.anode_time;
        let t1 = t0 + self.rise_time;

        // One gate per plasma front, closed when it reaches a cathode ring.
        let bottom_t2 = t1 + response.bottom_cathode_time;
        let top_t2 = t1 + response.top_cathode_time;
        let gate = |t2: Time| Shape::TriangleGate {
            polarity: Polarity::Negative,
            t0,
            t1,
            t2,
            t3: t2 + self.fall_time,
            amplitude: half_amplitude,
        };
        let peak = |polarity: Polarity, start: Time, amplitude: ElectricPotential| {
            let t1 = start + 0.5 * self.rise_time;
            Shape::Triangle {
                polarity,
                t0: start,
                t1,
                t2: t1 + 0.5 * self.fall_time,
                amplitude,
            }
        };
        let shapes = [
            gate(bottom_t2),
            gate(top_t2),
            peak(Polarity::Negative, top_t2, 2.0 * half_amplitude),
            peak(Polarity::Negative, bottom_t2, 2.0 * half_amplitude),
        ];
        let top_cathode = peak(Polarity::Positive, top_t2, half_amplitude);
        let bottom_cathode = peak(Polarity::Positive, bottom_t2, half_amplitude);

        let atomic: Vec<Signal> = shapes
            .into_iter()
            .map(|shape| self.new_signal(&channels.anodic_wire, shape, "anodic"))
            .collect::<Result<_>>()?;
        let mut anodic = self.new_signal(
            &channels.anodic_wire,
            Shape::Multi {
                components: Vec::new(),
            },
            "anodic",
        )?;
        compose_multi_signal(&mut anodic, &atomic);
        let top = self.new_signal(&channels.top_ring, top_cathode, "cathodic")?;
        let bottom = self.new_signal(&channels.bottom_ring, bottom_cathode, "cathodic")?;

        let category = self.core.signal_category().to_string();
        sink.add_signal(&category, anodic);
        sink.add_signal(&category, top);
        sink.add_signal(&category, bottom);

        Ok(())
    }

    fn process_triangle_gate(&mut self, hits: &[StepHit], sink: &mut dyn SignalSink) -> Result<()> {
        if self.drift_time_policy == DriftTimePolicy::Randomized && !self.has_random_source() {
            return Err(Error::MissingRandomSource);
        }
        let geometry = self.core.geometry()?;
        let types = ChannelTypes::resolve(geometry.as_ref())?;

        let anode_times = hits
            .iter()
            .map(|hit| self.expected_anode_time(hit))
            .collect::<Result<Vec<_>>>()?;
        let flagged = dead_time_flags(hits, &anode_times, self.geiger.cell_dead_time());

        // Every hit is resolved before the first signal is built.
        let mut modelled = Vec::new();
        for ((hit, anode_time), flagged) in hits.iter().zip(anode_times).zip(flagged) {
            let Some(anode_time) = anode_time else {
                log::warn!(
                    "tracker hit {} in {}: drift distance {} mm is beyond the calibrated range",
                    hit.hit_id,
                    hit.gid,
                    drift_distance(hit).get::<millimeter>()
                );
                continue;
            };
            if flagged {
                log::trace!("tracker hit {} in {} suppressed by dead time", hit.hit_id, hit.gid);
                continue;
            }

            let (bottom_cathode_time, top_cathode_time) =
                self.cathode_times(geometry.as_ref(), hit)?;
            let expected = CellResponse {
                anode_time,
                bottom_cathode_time,
                top_cathode_time,
            };
            let response = match self.drift_time_policy {
                DriftTimePolicy::Expectation => expected,
                DriftTimePolicy::Randomized => match self.randomize(hit, expected)? {
                    Some(response) => response,
                    None => continue,
                },
            };

            modelled.push((types.channels(&hit.gid)?, response));
        }
        for (channels, response) in &modelled {
            self.emit(channels, *response, sink)?;
        }
        log::debug!(
            "{} of {} tracker hits modelled, next signal id {}",
            modelled.len(),
            hits.len(),
            self.core.running_signal_id().unwrap_or_default()
        );

        Ok(())
    }
}

impl SignalGenerator for TrackerDriver {
    fn core(&self) -> &DriverCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut DriverCore {
        &mut self.core
    }

    fn initialize_model(&mut self, config: &Properties) -> Result<()> {
        let model = match self.model {
            Some(model) => model,
            None if config.has_key("model") => {
                config.fetch_string("model")?.parse::<TrackerModel>()?
            }
            None => return Err(Error::MissingConfiguration(String::from("model"))),
        };
        let policy = if config.has_key("drift_time_policy") {
            config.fetch_string("drift_time_policy")?.parse::<DriftTimePolicy>()?
        } else {
            self.drift_time_policy
        };
        if policy == DriftTimePolicy::Randomized && !self.has_random_source() {
            return Err(Error::MissingRandomSource);
        }
        let rise_time = if config.has_key("rise_time") {
            config.fetch_time("rise_time", None)?
        } else {
            self.rise_time
        };
        let fall_time = if config.has_key("fall_time") {
            config.fetch_time("fall_time", None)?
        } else {
            self.fall_time
        };
        let amplitude = if config.has_key("amplitude") {
            config.fetch_potential("amplitude", None)?
        } else {
            self.amplitude
        };

        self.geiger.initialize(config)?;
        self.model = Some(model);
        self.drift_time_policy = policy;
        self.rise_time = rise_time;
        self.fall_time = fall_time;
        self.amplitude = amplitude;

        Ok(())
    }

    fn reset_model(&mut self) {
        self.model = None;
        self.drift_time_policy = DriftTimePolicy::default();
        self.rise_time = default_rise_time();
        self.fall_time = default_fall_time();
        self.amplitude = default_amplitude();
        self.geiger = GeigerRegime::default();
        self.random = None;
    }

    fn process_hits(&mut self, hits: &[StepHit], sink: &mut dyn SignalSink) -> Result<()> {
        match self.model {
            Some(TrackerModel::TriangleGate) => self.process_triangle_gate(hits, sink),
            None => Err(Error::NotInitialized),
        }
    }
}

impl fmt::Display for TrackerDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.core)?;
        writeln!(f, "|-- Driver specific parameters :")?;
        let model = self
            .model
            .map_or_else(|| String::from("<none>"), |m| m.to_string());
        writeln!(f, "|   |-- Model       : '{model}'")?;
        writeln!(f, "|   |-- Drift time  : {}", self.drift_time_policy)?;
        writeln!(f, "|   |-- Rise time   : {} ns", self.rise_time.get::<nanosecond>())?;
        writeln!(f, "|   |-- Fall time   : {} ns", self.fall_time.get::<nanosecond>())?;
        writeln!(f, "|   `-- Amplitude   : {} V", self.amplitude.get::<volt>())?;
        writeln!(f, "|-- Geiger regime :")?;
        for line in self.geiger.to_string().lines() {
            writeln!(f, "|   {line}")?;
        }
        write!(f, "`-- Initialized : {}", self.is_initialized())
    }
}

impl Drop for TrackerDriver {
    fn drop(&mut self) {
        if self.is_initialized() {
            if let Err(e) = self.reset() {
                log::warn!("failed to reset tracker driver on drop: {e}");
            }
        }
    }
}
