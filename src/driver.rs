use crate::error::{Error, Result};
use crate::geometry::GeometryLookup;
use crate::hit::{SimulatedData, StepHit};
use crate::properties::Properties;
use crate::signal::{private_signal_name, Component, PrivateShape, Shape, Signal, SignalSink};
use std::fmt;
use std::sync::Arc;
use uom::si::f64::Time;
use uom::si::time::nanosecond;

/// State shared by every signal generator driver.
///
/// The identifier, the input and output categories and the first signal
/// identifier can be set explicitly before initialization; anything left
/// unset is resolved from the configuration keys of the same name.
#[derive(Clone, Default)]
pub struct DriverCore {
    id: String,
    hit_category: String,
    signal_category: String,
    start_signal_id: Option<u32>,
    running_signal_id: u32,
    geometry: Option<Arc<dyn GeometryLookup>>,
    initialized: bool,
}

// Common state resolved from the configuration, committed by `lock`.
struct Settings {
    id: String,
    hit_category: String,
    signal_category: String,
    start_signal_id: u32,
}

// Signals of the event being processed, held back until it succeeds.
#[derive(Default)]
struct PendingSignals(Vec<(String, Signal)>);

impl SignalSink for PendingSignals {
    fn add_signal(&mut self, category: &str, signal: Signal) {
        self.0.push((category.to_string(), signal));
    }
}

impl DriverCore {
    pub fn new() -> Self {
        Self::default()
    }
    /// Creates a core with the driver identifier already set.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    fn ensure_unlocked(&self) -> Result<()> {
        if self.initialized {
            return Err(Error::AlreadyInitialized);
        }
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn set_id(&mut self, id: impl Into<String>) -> Result<()> {
        self.ensure_unlocked()?;
        self.id = id.into();
        Ok(())
    }
    /// Name of the step hit category consumed by the driver.
    pub fn hit_category(&self) -> &str {
        &self.hit_category
    }
    pub fn set_hit_category(&mut self, category: impl Into<String>) -> Result<()> {
        self.ensure_unlocked()?;
        self.hit_category = category.into();
        Ok(())
    }
    /// Name of the signal category produced by the driver.
    pub fn signal_category(&self) -> &str {
        &self.signal_category
    }
    pub fn set_signal_category(&mut self, category: impl Into<String>) -> Result<()> {
        self.ensure_unlocked()?;
        self.signal_category = category.into();
        Ok(())
    }
    pub fn start_signal_id(&self) -> Option<u32> {
        self.start_signal_id
    }
    pub fn set_start_signal_id(&mut self, id: u32) -> Result<()> {
        self.ensure_unlocked()?;
        self.start_signal_id = Some(id);
        Ok(())
    }
    /// Identifier the next allocated signal will receive, once initialized.
    pub fn running_signal_id(&self) -> Option<u32> {
        self.initialized.then_some(self.running_signal_id)
    }
    pub fn has_geometry(&self) -> bool {
        self.geometry.is_some()
    }
    pub fn set_geometry(&mut self, geometry: Arc<dyn GeometryLookup>) -> Result<()> {
        self.ensure_unlocked()?;
        self.geometry = Some(geometry);
        Ok(())
    }
    /// Shared handle on the attached geometry.
    pub fn geometry(&self) -> Result<Arc<dyn GeometryLookup>> {
        self.geometry
            .clone()
            .ok_or_else(|| Error::Geometry(String::from("no geometry attached to the driver")))
    }

    /// Returns the running signal identifier and advances it.
    ///
    /// Fails with [`Error::Range`] once the identifier space is exhausted;
    /// `u32::MAX` is never handed out.
    pub fn allocate_signal_id(&mut self) -> Result<u32> {
        let id = self.running_signal_id;
        self.running_signal_id = id.checked_add(1).ok_or_else(|| {
            Error::Range(format!("no signal identifier left after {id}"))
        })?;

        Ok(id)
    }

    // Nothing is stored until the driver is locked.
    fn configure(&self, config: &Properties) -> Result<Settings> {
        self.ensure_unlocked()?;

        let resolve = |field: &str, key: &str| -> Result<String> {
            let value = if field.is_empty() && config.has_key(key) {
                config.fetch_string(key)?
            } else {
                field
            };
            if value.is_empty() {
                return Err(Error::MissingConfiguration(key.to_string()));
            }
            Ok(value.to_string())
        };
        let id = resolve(&self.id, "id")?;
        let hit_category = resolve(&self.hit_category, "hit_category")?;
        let signal_category = resolve(&self.signal_category, "signal_category")?;

        let start_signal_id = match self.start_signal_id {
            Some(id) => id,
            None if config.has_key("start_signal_id") => {
                let value = config.fetch_integer("start_signal_id")?;
                u32::try_from(value).map_err(|_| {
                    Error::invalid_value(
                        "start_signal_id",
                        format!("{value} is not a valid signal id"),
                    )
                })?
            }
            None => 0,
        };

        Ok(Settings {
            id,
            hit_category,
            signal_category,
            start_signal_id,
        })
    }

    fn lock(&mut self, settings: Settings) {
        self.id = settings.id;
        self.hit_category = settings.hit_category;
        self.signal_category = settings.signal_category;
        self.start_signal_id = Some(settings.start_signal_id);
        self.running_signal_id = settings.start_signal_id;
        self.initialized = true;
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

impl fmt::Debug for DriverCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverCore")
            .field("id", &self.id)
            .field("hit_category", &self.hit_category)
            .field("signal_category", &self.signal_category)
            .field("start_signal_id", &self.start_signal_id)
            .field("running_signal_id", &self.running_signal_id)
            .field("geometry", &self.has_geometry())
            .field("initialized", &self.initialized)
            .finish()
    }
}

impl fmt::Display for DriverCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let optional = |v: Option<u32>| v.map_or_else(|| String::from("<none>"), |v| v.to_string());
        writeln!(f, "|-- ID : '{}'", self.id)?;
        writeln!(f, "|-- Hit category : '{}'", self.hit_category)?;
        writeln!(f, "|-- Signal category : '{}'", self.signal_category)?;
        writeln!(f, "|-- Start signal ID : {}", optional(self.start_signal_id))?;
        writeln!(f, "|-- Running signal ID : {}", optional(self.running_signal_id()))?;
        let geometry = if self.has_geometry() { "<yes>" } else { "<no>" };
        write!(f, "|-- Geometry : {geometry}")
    }
}

/// Interface of a driver turning the step hits of one category into signals.
///
/// Implementors provide the model specific hooks; the lifecycle itself
/// (`initialize`, `process`, `reset`) is implemented once here and should not
/// be overridden.
pub trait SignalGenerator: fmt::Display + Send {
    fn core(&self) -> &DriverCore;
    fn core_mut(&mut self) -> &mut DriverCore;

    /// Called during initialization, once the common state is resolved.
    fn initialize_model(&mut self, config: &Properties) -> Result<()>;
    /// Called during reset, after the common state is cleared.
    fn reset_model(&mut self);
    /// Called with the non-empty list of hits of the driver's hit category.
    fn process_hits(&mut self, hits: &[StepHit], sink: &mut dyn SignalSink) -> Result<()>;

    fn is_initialized(&self) -> bool {
        self.core().is_initialized()
    }

    fn set_id(&mut self, id: &str) -> Result<()> {
        self.core_mut().set_id(id)
    }
    fn set_hit_category(&mut self, category: &str) -> Result<()> {
        self.core_mut().set_hit_category(category)
    }
    fn set_signal_category(&mut self, category: &str) -> Result<()> {
        self.core_mut().set_signal_category(category)
    }
    fn set_start_signal_id(&mut self, id: u32) -> Result<()> {
        self.core_mut().set_start_signal_id(id)
    }
    fn set_geometry(&mut self, geometry: Arc<dyn GeometryLookup>) -> Result<()> {
        self.core_mut().set_geometry(geometry)
    }

    /// Resolves the common state and the model configuration and locks the
    /// driver.
    fn initialize(&mut self, config: &Properties) -> Result<()> {
        let settings = self.core().configure(config)?;
        self.initialize_model(config)?;
        self.core_mut().lock(settings);
        log::info!(
            "signal generator '{}' initialized ({} -> {})",
            self.core().id(),
            self.core().hit_category(),
            self.core().signal_category()
        );

        Ok(())
    }

    fn initialize_simple(&mut self) -> Result<()> {
        self.initialize(&Properties::new())
    }

    /// Builds the signals of one event and appends them to `sink`.
    ///
    /// An event is processed as a whole: on error nothing is appended to
    /// `sink` and the running signal identifier is left where it was.
    fn process(&mut self, data: &SimulatedData, sink: &mut dyn SignalSink) -> Result<()> {
        if !self.is_initialized() {
            return Err(Error::NotInitialized);
        }
        let hits = data.step_hits(self.core().hit_category());
        if hits.is_empty() {
            return Ok(());
        }

        let running_signal_id = self.core().running_signal_id;
        let mut pending = PendingSignals::default();
        if let Err(e) = self.process_hits(hits, &mut pending) {
            log::debug!(
                "signal generator '{}' dropped {} signals: {e}",
                self.core().id(),
                pending.0.len()
            );
            self.core_mut().running_signal_id = running_signal_id;
            return Err(e);
        }
        for (category, signal) in pending.0 {
            sink.add_signal(&category, signal);
        }

        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        if !self.is_initialized() {
            return Err(Error::NotInitialized);
        }
        let id = self.core().id().to_string();
        self.core_mut().clear();
        self.reset_model();
        log::info!("signal generator '{id}' reset");

        Ok(())
    }
}

/// Turns `output` into the superposition of `atomic_signals`.
///
/// Each atomic signal becomes a private shape of `output`, keyed by its
/// identifier, and contributes one unshifted and unscaled component. The
/// components keep the order of `atomic_signals`.
///
/// # Examples
///
/// ```
/// use asb::driver::compose_multi_signal;
/// use asb::geometry::GeomId;
/// use asb::signal::{Polarity, Shape, Signal};
/// use uom::si::electric_potential::volt;
/// use uom::si::f64::{ElectricPotential, Time};
/// use uom::si::time::nanosecond;
///
/// let gid = GeomId::new(1302, [0, 0, 3, 4]);
/// let zero = Time::new::<nanosecond>(0.0);
/// let pulse = Shape::Triangle {
///     polarity: Polarity::Negative,
///     t0: zero,
///     t1: Time::new::<nanosecond>(8.0),
///     t2: Time::new::<nanosecond>(78.0),
///     amplitude: ElectricPotential::new::<volt>(0.3),
/// };
/// let atomic = [
///     Signal::new(0, gid.clone(), "sigcalo", zero, pulse.clone()),
///     Signal::new(1, gid.clone(), "sigcalo", zero, pulse),
/// ];
///
/// let mut composite = Signal::new(2, gid, "sigcalo", zero, atomic[0].shape.clone());
/// compose_multi_signal(&mut composite, &atomic);
///
/// assert!(composite.is_composite());
/// assert_eq!(composite.private_shapes.len(), 2);
/// assert!(composite.private_shape("__shape.1").is_some());
/// ```
pub fn compose_multi_signal(output: &mut Signal, atomic_signals: &[Signal]) {
    let mut components = Vec::with_capacity(atomic_signals.len());
    for atomic in atomic_signals {
        let key = private_signal_name(atomic.hit_id);
        output.private_shapes.push(PrivateShape {
            name: key.clone(),
            shape: atomic.shape.clone(),
        });
        components.push(Component {
            label: format!("sig{}", atomic.hit_id),
            key,
            time_shift: Time::new::<nanosecond>(0.0),
            scaling: 1.0,
        });
    }
    output.shape = Shape::Multi { components };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{GeomId, GeometryMap};
    use crate::properties::Value;
    use crate::signal::{Polarity, SignalData};
    use uom::si::electric_potential::volt;
    use uom::si::f64::ElectricPotential;

    // One triangle per hit, no merging.
    #[derive(Default)]
    struct EchoDriver {
        core: DriverCore,
        resets: usize,
    }

    impl fmt::Display for EchoDriver {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.core)
        }
    }

    impl SignalGenerator for EchoDriver {
        fn core(&self) -> &DriverCore {
            &self.core
        }
        fn core_mut(&mut self) -> &mut DriverCore {
            &mut self.core
        }
        fn initialize_model(&mut self, config: &Properties) -> Result<()> {
            if config.has_flag("fail") {
                return Err(Error::UnsupportedModel(String::from("fail")));
            }
            Ok(())
        }
        fn reset_model(&mut self) {
            self.resets += 1;
        }
        fn process_hits(&mut self, hits: &[StepHit], sink: &mut dyn SignalSink) -> Result<()> {
            for hit in hits {
                if hit.particle_name == "fail" {
                    return Err(Error::Range(String::from("unmodelled hit")));
                }
                let id = self.core.allocate_signal_id()?;
                let signal = Signal::new(
                    id,
                    hit.gid.clone(),
                    self.core.signal_category(),
                    hit.start_time,
                    pulse(),
                );
                sink.add_signal(self.core.signal_category(), signal);
            }
            Ok(())
        }
    }

    fn pulse() -> Shape {
        Shape::Triangle {
            polarity: Polarity::Negative,
            t0: Time::new::<nanosecond>(0.0),
            t1: Time::new::<nanosecond>(8.0),
            t2: Time::new::<nanosecond>(78.0),
            amplitude: ElectricPotential::new::<volt>(0.3),
        }
    }

    fn config() -> Properties {
        Properties::from([
            ("id", Value::String("echo".into())),
            ("hit_category", Value::String("calo".into())),
            ("signal_category", Value::String("sigcalo".into())),
        ])
    }

    fn event(n: u32) -> SimulatedData {
        let mut data = SimulatedData::new();
        for i in 0..n {
            let hit = StepHit::builder()
                .hit_id(i)
                .gid(GeomId::new(1302, [0, 0, i]))
                .start_time(Time::new::<nanosecond>(f64::from(i)))
                .build();
            data.add_step_hit("calo", hit);
        }
        data
    }

    #[test]
    fn initialize_from_config() {
        let mut driver = EchoDriver::default();
        driver.initialize(&config()).unwrap();

        assert!(driver.is_initialized());
        assert_eq!(driver.core().id(), "echo");
        assert_eq!(driver.core().hit_category(), "calo");
        assert_eq!(driver.core().signal_category(), "sigcalo");
        assert_eq!(driver.core().running_signal_id(), Some(0));
    }

    #[test]
    fn explicit_setters_take_precedence() {
        let mut driver = EchoDriver::default();
        driver.set_id("explicit").unwrap();
        driver.set_start_signal_id(100).unwrap();

        let mut config = config();
        config.store_integer("start_signal_id", 5);
        driver.initialize(&config).unwrap();

        assert_eq!(driver.core().id(), "explicit");
        assert_eq!(driver.core().start_signal_id(), Some(100));
        assert_eq!(driver.core().running_signal_id(), Some(100));
        assert!(matches!(driver.set_id("late"), Err(Error::AlreadyInitialized)));
        assert!(matches!(
            driver.set_start_signal_id(3),
            Err(Error::AlreadyInitialized)
        ));
    }

    #[test]
    fn missing_configuration() {
        for key in ["id", "hit_category", "signal_category"] {
            let mut config = config();
            config.remove(key);
            let mut driver = EchoDriver::default();

            match driver.initialize(&config) {
                Err(Error::MissingConfiguration(missing)) => assert_eq!(missing, key),
                other => panic!("unexpected result {other:?}"),
            }
            assert!(!driver.is_initialized());
        }
    }

    #[test]
    fn negative_start_signal_id() {
        let mut config = config();
        config.store_integer("start_signal_id", -1);
        let mut driver = EchoDriver::default();

        assert!(matches!(
            driver.initialize(&config),
            Err(Error::InvalidValue { .. })
        ));
    }

    #[test]
    fn model_failure_leaves_driver_uninitialized() {
        let mut failing = config();
        failing.store_flag("fail");
        let mut driver = EchoDriver::default();

        assert!(matches!(
            driver.initialize(&failing),
            Err(Error::UnsupportedModel(_))
        ));
        assert!(!driver.is_initialized());
        // Nothing was taken from the rejected configuration.
        assert!(driver.core().id().is_empty());
        assert!(driver.core().hit_category().is_empty());
        assert_eq!(driver.core().start_signal_id(), None);

        driver.set_id("retry").unwrap();
        driver.initialize(&config()).unwrap();
        assert_eq!(driver.core().id(), "retry");
    }

    #[test]
    fn failed_event_leaves_no_signals() {
        let mut driver = EchoDriver::default();
        driver.initialize(&config()).unwrap();
        let mut sink = SignalData::new();
        driver.process(&event(2), &mut sink).unwrap();

        let mut data = event(3);
        data.add_step_hit(
            "calo",
            StepHit::builder()
                .gid(GeomId::new(1302, [0, 1, 0]))
                .start_time(Time::new::<nanosecond>(5.0))
                .particle_name("fail")
                .build(),
        );
        assert!(matches!(
            driver.process(&data, &mut sink),
            Err(Error::Range(_))
        ));
        assert_eq!(sink.number_of_signals("sigcalo"), 2);
        assert_eq!(driver.core().running_signal_id(), Some(2));

        driver.process(&event(1), &mut sink).unwrap();
        let ids: Vec<u32> = sink.signals("sigcalo").iter().map(|s| s.hit_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn signal_id_exhaustion() {
        let mut config = config();
        config.store_integer("start_signal_id", i64::from(u32::MAX) - 1);
        let mut driver = EchoDriver::default();
        driver.initialize(&config).unwrap();
        let mut sink = SignalData::new();

        driver.process(&event(1), &mut sink).unwrap();
        assert_eq!(sink.signals("sigcalo")[0].hit_id, u32::MAX - 1);
        assert_eq!(driver.core().running_signal_id(), Some(u32::MAX));

        assert!(matches!(
            driver.process(&event(1), &mut sink),
            Err(Error::Range(_))
        ));
        assert_eq!(sink.number_of_signals("sigcalo"), 1);
        assert_eq!(driver.core().running_signal_id(), Some(u32::MAX));
    }

    #[test]
    fn lifecycle_errors() {
        let mut driver = EchoDriver::default();
        let mut sink = SignalData::new();

        assert!(matches!(
            driver.process(&event(1), &mut sink),
            Err(Error::NotInitialized)
        ));
        assert!(matches!(driver.reset(), Err(Error::NotInitialized)));

        driver.initialize(&config()).unwrap();
        assert!(matches!(
            driver.initialize(&config()),
            Err(Error::AlreadyInitialized)
        ));

        driver.reset().unwrap();
        assert!(!driver.is_initialized());
        assert_eq!(driver.resets, 1);
        assert!(driver.core().id().is_empty());
        assert_eq!(driver.core().running_signal_id(), None);
    }

    #[test]
    fn running_signal_id_advances() {
        let mut config = config();
        config.store_integer("start_signal_id", 40);
        let mut driver = EchoDriver::default();
        driver.initialize(&config).unwrap();
        let mut sink = SignalData::new();

        driver.process(&event(3), &mut sink).unwrap();
        driver.process(&event(2), &mut sink).unwrap();

        assert_eq!(driver.core().running_signal_id(), Some(45));
        let ids: Vec<u32> = sink.signals("sigcalo").iter().map(|s| s.hit_id).collect();
        assert_eq!(ids, vec![40, 41, 42, 43, 44]);
    }

    #[test]
    fn other_categories_are_ignored() {
        let mut driver = EchoDriver::default();
        driver.initialize(&config()).unwrap();
        let mut data = event(0);
        data.add_step_hit(
            "gg",
            StepHit::builder()
                .gid(GeomId::new(1204, [0]))
                .start_time(Time::new::<nanosecond>(0.0))
                .build(),
        );
        let mut sink = SignalData::new();

        driver.process(&data, &mut sink).unwrap();
        assert_eq!(sink.categories().count(), 0);
        assert_eq!(driver.core().running_signal_id(), Some(0));
    }

    #[test]
    fn geometry_is_dropped_on_reset() {
        let mut driver = EchoDriver::default();
        assert!(driver.core().geometry().is_err());

        driver.set_geometry(Arc::new(GeometryMap::new())).unwrap();
        driver.initialize(&config()).unwrap();
        assert!(driver.core().has_geometry());
        assert!(driver.to_string().contains("Geometry : <yes>"));

        driver.reset().unwrap();
        assert!(!driver.core().has_geometry());
    }

    #[test]
    fn compose_keeps_component_order() {
        let gid = GeomId::new(1302, [0, 0, 1]);
        let zero = Time::new::<nanosecond>(0.0);
        let atomic: Vec<Signal> = [7, 3, 5]
            .into_iter()
            .map(|id| Signal::new(id, gid.clone(), "sigcalo", zero, pulse()))
            .collect();
        let mut composite = Signal::new(8, gid, "sigcalo", zero, pulse());

        compose_multi_signal(&mut composite, &atomic);

        let Shape::Multi { components } = &composite.shape else {
            panic!("expected a multi signal shape");
        };
        let keys: Vec<&str> = components.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["__shape.7", "__shape.3", "__shape.5"]);
        assert!(components
            .iter()
            .all(|c| c.scaling == 1.0 && c.time_shift == zero));
        assert_eq!(components[1].label, "sig3");
        assert_eq!(composite.private_shape("__shape.5"), Some(&pulse()));
    }
}
