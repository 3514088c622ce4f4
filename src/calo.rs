use crate::driver::{compose_multi_signal, DriverCore, SignalGenerator};
use crate::error::{Error, Result};
use crate::geometry::GeomId;
use crate::hit::StepHit;
use crate::properties::Properties;
use crate::signal::{Polarity, Shape, Signal, SignalSink};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uom::si::electric_potential::volt;
use uom::si::energy::megaelectronvolt;
use uom::si::f64::{ElectricPotential, Time};
use uom::si::time::nanosecond;

/// Auxiliary flag set by the simulation on electrons attached to an alpha
/// track.
pub const ALPHA_QUENCHING_FLAG: &str = "sensitive.record_alpha_quenching";

/// Correction factor applied to the energy deposited by a hit.
pub type CorrectionFn = fn(&StepHit) -> f64;

fn no_correction(_: &StepHit) -> f64 {
    1.0
}

/// Returns `true` if the energy deposit of `hit` is subject to alpha
/// quenching.
pub fn is_alpha_quenched(hit: &StepHit) -> bool {
    match hit.particle_name.as_str() {
        "alpha" => true,
        "electron" => hit.auxiliaries.has_flag(ALPHA_QUENCHING_FLAG),
        _ => false,
    }
}

/// Pulse model of the calorimeter driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaloModel {
    /// One negative triangular pulse per hit.
    Triangle,
}

impl FromStr for CaloModel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "triangle" => Ok(CaloModel::Triangle),
            _ => Err(Error::UnsupportedModel(s.to_string())),
        }
    }
}

impl fmt::Display for CaloModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaloModel::Triangle => write!(f, "triangle"),
        }
    }
}

fn default_rise_time() -> Time {
    Time::new::<nanosecond>(8.0)
}

fn default_fall_time() -> Time {
    Time::new::<nanosecond>(70.0)
}

const DEFAULT_ENERGY_AMPLITUDE_FACTOR: f64 = 0.3;

/// Signal generator for calorimeter blocks.
///
/// Every hit produces an atomic triangular pulse whose amplitude is
/// proportional to the deposited energy. Blocks hit once emit their atomic
/// pulse; blocks hit several times emit a single composite pulse built from
/// all of them.
///
/// # Examples
///
/// ```
/// use asb::calo::CaloDriver;
/// use asb::driver::SignalGenerator;
/// use asb::geometry::GeomId;
/// use asb::hit::{SimulatedData, StepHit};
/// use asb::signal::SignalData;
/// use uom::si::energy::megaelectronvolt;
/// use uom::si::f64::{Energy, Time};
/// use uom::si::time::nanosecond;
///
/// let config = r#"id : string = "calo"
/// hit_category : string = "calo"
/// signal_category : string = "sigcalo"
/// model : string = "triangle"
/// "#;
/// let mut driver = CaloDriver::new();
/// driver.initialize(&config.parse()?)?;
///
/// let mut event = SimulatedData::new();
/// for t in [0.0, 2.0] {
///     let hit = StepHit::builder()
///         .gid(GeomId::new(1302, [0, 1, 3, 5]))
///         .start_time(Time::new::<nanosecond>(t))
///         .energy_deposit(Energy::new::<megaelectronvolt>(1.0))
///         .build();
///     event.add_step_hit("calo", hit);
/// }
/// let mut signals = SignalData::new();
/// driver.process(&event, &mut signals)?;
///
/// assert_eq!(signals.number_of_signals("sigcalo"), 1);
/// assert!(signals.signals("sigcalo")[0].is_composite());
/// # Ok::<(), asb::Error>(())
/// ```
pub struct CaloDriver {
    core: DriverCore,
    model: Option<CaloModel>,
    rise_time: Time,
    fall_time: Time,
    // V/MeV
    energy_amplitude_factor: f64,
    quenching_correction: CorrectionFn,
    geometric_correction: CorrectionFn,
}

impl Default for CaloDriver {
    fn default() -> Self {
        Self {
            core: DriverCore::new(),
            model: None,
            rise_time: default_rise_time(),
            fall_time: default_fall_time(),
            energy_amplitude_factor: DEFAULT_ENERGY_AMPLITUDE_FACTOR,
            quenching_correction: no_correction,
            geometric_correction: no_correction,
        }
    }
}

impl CaloDriver {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            core: DriverCore::with_id(id),
            ..Self::default()
        }
    }

    fn ensure_unlocked(&self) -> Result<()> {
        if self.is_initialized() {
            return Err(Error::AlreadyInitialized);
        }
        Ok(())
    }

    pub fn model(&self) -> Option<CaloModel> {
        self.model
    }
    pub fn set_model(&mut self, model: CaloModel) -> Result<()> {
        self.ensure_unlocked()?;
        self.model = Some(model);
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
    /// Energy to amplitude gain, in V/MeV.
    pub fn energy_amplitude_factor(&self) -> f64 {
        self.energy_amplitude_factor
    }
    pub fn set_energy_amplitude_factor(&mut self, factor: f64) -> Result<()> {
        self.ensure_unlocked()?;
        self.energy_amplitude_factor = factor;
        Ok(())
    }
    /// Replaces the quenching correction, 1.0 for every hit by default.
    pub fn set_quenching_correction(&mut self, correction: CorrectionFn) -> Result<()> {
        self.ensure_unlocked()?;
        self.quenching_correction = correction;
        Ok(())
    }
    /// Replaces the geometric correction, 1.0 for every hit by default.
    pub fn set_geometric_correction(&mut self, correction: CorrectionFn) -> Result<()> {
        self.ensure_unlocked()?;
        self.geometric_correction = correction;
        Ok(())
    }

    fn atomic_signal(&mut self, hit: &StepHit, time_ref: Time) -> Result<Signal> {
        let quenching = (self.quenching_correction)(hit);
        let geometric = (self.geometric_correction)(hit);
        if is_alpha_quenched(hit) {
            log::trace!("hit {} is subject to alpha quenching", hit.hit_id);
        }
        let effective_energy = hit.energy_deposit.get::<megaelectronvolt>() * quenching * geometric;

        let t0 = hit.start_time - time_ref;
        let t1 = t0 + self.rise_time;
        let t2 = t1 + self.fall_time;
        let shape = Shape::Triangle {
            polarity: Polarity::Negative,
            t0,
            t1,
            t2,
            amplitude: ElectricPotential::new::<volt>(self.energy_amplitude_factor * effective_energy),
        };

        let id = self.core.allocate_signal_id()?;
        let category = self.core.signal_category();
        let mut signal = Signal::new(id, hit.gid.clone(), category, time_ref, shape);
        signal
            .auxiliaries
            .store_integer("origin_hit_id", i64::from(hit.hit_id));
        log::trace!("atomic signal {id} for hit {} in {}", hit.hit_id, hit.gid);

        Ok(signal)
    }

    fn process_triangle(&mut self, hits: &[StepHit], sink: &mut dyn SignalSink) -> Result<()> {
        let Some(time_ref) = hits
            .iter()
            .map(|hit| hit.start_time)
            .reduce(|a, b| if b < a { b } else { a })
        else {
            return Ok(());
        };

        let mut atomic_signals = Vec::with_capacity(hits.len());
        let mut multiplicity: BTreeMap<GeomId, usize> = BTreeMap::new();
        for hit in hits {
            atomic_signals.push(self.atomic_signal(hit, time_ref)?);
            *multiplicity.entry(hit.gid.clone()).or_default() += 1;
        }

        let category = self.core.signal_category().to_string();
        for (gid, count) in multiplicity {
            let mut in_block = atomic_signals.iter().filter(|s| s.gid == gid);
            if count == 1 {
                if let Some(signal) = in_block.next() {
                    sink.add_signal(&category, signal.clone());
                }
                continue;
            }

            log::debug!("merging {count} calorimeter signals in {gid}");
            let members: Vec<Signal> = in_block.cloned().collect();
            let id = self.core.allocate_signal_id()?;
            let mut composite = Signal::new(
                id,
                gid,
                category.as_str(),
                time_ref,
                Shape::Multi {
                    components: Vec::new(),
                },
            );
            compose_multi_signal(&mut composite, &members);
            sink.add_signal(&category, composite);
        }
        log::debug!(
            "{} calorimeter hits processed, next signal id {}",
            hits.len(),
            self.core.running_signal_id().unwrap_or_default()
        );

        Ok(())
    }
}

impl SignalGenerator for CaloDriver {
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
                config.fetch_string("model")?.parse::<CaloModel>()?
            }
            None => return Err(Error::MissingConfiguration(String::from("model"))),
        };
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
        let energy_amplitude_factor = if config.has_key("energy_amplitude_factor") {
            config.fetch_gain("energy_amplitude_factor", Some("V/MeV"))?
        } else {
            self.energy_amplitude_factor
        };

        self.model = Some(model);
        self.rise_time = rise_time;
        self.fall_time = fall_time;
        self.energy_amplitude_factor = energy_amplitude_factor;

        Ok(())
    }

    fn reset_model(&mut self) {
        let core = std::mem::take(&mut self.core);
        *self = Self {
            core,
            ..Self::default()
        };
    }

    fn process_hits(&mut self, hits: &[StepHit], sink: &mut dyn SignalSink) -> Result<()> {
        match self.model {
            Some(CaloModel::Triangle) => self.process_triangle(hits, sink),
            None => Err(Error::NotInitialized),
        }
    }
}

impl fmt::Display for CaloDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.core)?;
        writeln!(f, "|-- Driver specific parameters :")?;
        let model = self
            .model
            .map_or_else(|| String::from("<none>"), |m| m.to_string());
        writeln!(f, "|   |-- Model      : '{model}'")?;
        writeln!(f, "|   |-- Rise time  : {} ns", self.rise_time.get::<nanosecond>())?;
        writeln!(f, "|   |-- Fall time  : {} ns", self.fall_time.get::<nanosecond>())?;
        writeln!(f, "|   `-- E/A factor : {} V/MeV", self.energy_amplitude_factor)?;
        write!(f, "`-- Initialized : {}", self.is_initialized())
    }
}

impl Drop for CaloDriver {
    fn drop(&mut self) {
        if self.is_initialized() {
            if let Err(e) = self.reset() {
                log::warn!("failed to reset calorimeter driver on drop: {e}");
            }
        }
    }
}
