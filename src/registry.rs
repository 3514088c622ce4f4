use crate::calo::CaloDriver;
use crate::driver::SignalGenerator;
use crate::error::{Error, Result};
use crate::geometry::GeometryLookup;
use crate::properties::Properties;
use crate::tracker::TrackerDriver;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Creates a fresh, uninitialized driver.
pub type Constructor = fn() -> Box<dyn SignalGenerator>;

/// The signal generators shipped with the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverKind {
    Calo,
    Tracker,
}

impl DriverKind {
    /// Short type name under which the driver is registered.
    pub fn type_id(&self) -> &'static str {
        match self {
            DriverKind::Calo => "calo",
            DriverKind::Tracker => "tracker",
        }
    }

    fn constructor(&self) -> Constructor {
        match self {
            DriverKind::Calo => || Box::new(CaloDriver::new()),
            DriverKind::Tracker => || Box::new(TrackerDriver::new()),
        }
    }
}

impl FromStr for DriverKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "calo" | "snemo::asb::calo_signal_generator_driver" => Ok(DriverKind::Calo),
            "tracker" | "snemo::asb::tracker_signal_generator_driver" => Ok(DriverKind::Tracker),
            _ => Err(Error::UnknownDriver(s.to_string())),
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_id())
    }
}

/// Maps driver type names to their constructors.
///
/// A new registry knows the built-in drivers; other implementations of
/// [`SignalGenerator`] can be added with [`DriverRegistry::register`].
///
/// # Examples
///
/// ```
/// use asb::registry::DriverRegistry;
///
/// let registry = DriverRegistry::new();
/// let driver = registry.create("calo")?;
/// assert!(!driver.is_initialized());
/// assert!(registry.create("pmt").is_err());
/// # Ok::<(), asb::Error>(())
/// ```
#[derive(Clone)]
pub struct DriverRegistry {
    constructors: BTreeMap<String, Constructor>,
}

impl Default for DriverRegistry {
    fn default() -> Self {
        let mut registry = Self {
            constructors: BTreeMap::new(),
        };
        for kind in [DriverKind::Calo, DriverKind::Tracker] {
            registry.register(kind.type_id(), kind.constructor());
        }
        registry
    }
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `constructor` under `type_id`, replacing any previous entry.
    pub fn register(&mut self, type_id: impl Into<String>, constructor: Constructor) {
        let type_id = type_id.into();
        log::debug!("registering signal generator type '{type_id}'");
        self.constructors.insert(type_id, constructor);
    }

    pub fn is_registered(&self, type_id: &str) -> bool {
        self.resolve(type_id).is_some()
    }

    pub fn type_ids(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    /// Creates an uninitialized driver of type `type_id`.
    ///
    /// Legacy fully qualified names of the built-in drivers are accepted.
    pub fn create(&self, type_id: &str) -> Result<Box<dyn SignalGenerator>> {
        let constructor = self
            .resolve(type_id)
            .ok_or_else(|| Error::UnknownDriver(type_id.to_string()))?;

        Ok(constructor())
    }

    fn resolve(&self, type_id: &str) -> Option<Constructor> {
        self.constructors.get(type_id).copied().or_else(|| {
            let kind = type_id.parse::<DriverKind>().ok()?;
            self.constructors.get(kind.type_id()).copied()
        })
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.type_ids()).finish()
    }
}

/// Services shared by all the drivers of a pipeline while they are being
/// configured.
#[derive(Clone)]
pub struct Context {
    geometry: Arc<dyn GeometryLookup>,
}

impl Context {
    pub fn new(geometry: Arc<dyn GeometryLookup>) -> Self {
        Self { geometry }
    }

    pub fn geometry(&self) -> &Arc<dyn GeometryLookup> {
        &self.geometry
    }

    /// Creates a driver of type `type_id`, attaches the shared geometry and
    /// initializes it from `config`.
    pub fn build_driver(
        &self,
        registry: &DriverRegistry,
        type_id: &str,
        config: &Properties,
    ) -> Result<Box<dyn SignalGenerator>> {
        let mut driver = registry.create(type_id)?;
        driver.set_geometry(Arc::clone(&self.geometry))?;
        driver.initialize(config)?;

        Ok(driver)
    }
}
