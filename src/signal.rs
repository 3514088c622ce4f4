use crate::geometry::GeomId;
use crate::properties::Properties;
use std::collections::BTreeMap;
use std::fmt;
use uom::si::electric_potential::volt;
use uom::si::f64::{ElectricPotential, Time};
use uom::si::time::nanosecond;

/// Shape family of a single triangular pulse.
pub const TRIANGLE_SHAPE: &str = "mctools::signal::triangle_signal_shape";
/// Shape family of a triangular gate (rise, plateau, fall).
pub const TRIANGLE_GATE_SHAPE: &str = "mctools::signal::triangle_gate_signal_shape";
/// Shape family of a linear superposition of private shapes.
pub const MULTI_SIGNAL_SHAPE: &str = "mctools::signal::multi_signal_shape";

const PRIVATE_SHAPE_PREFIX: &str = "__shape.";

/// Name of the shape of signal `id` in a shape evaluation registry.
pub fn signal_name(id: u32) -> String {
    format!("shape.{id}")
}

/// Name of a shape private to a composite signal, derived from the id of the
/// atomic signal it was built from.
///
/// # Examples
///
/// ```
/// use asb::signal::{is_private_signal_name, private_signal_name, signal_name};
///
/// assert_eq!(private_signal_name(12), "__shape.12");
/// assert!(is_private_signal_name(&private_signal_name(12)));
/// assert!(!is_private_signal_name(&signal_name(12)));
/// ```
pub fn private_signal_name(id: u32) -> String {
    format!("{PRIVATE_SHAPE_PREFIX}{id}")
}

pub fn is_private_signal_name(name: &str) -> bool {
    name.starts_with(PRIVATE_SHAPE_PREFIX)
}

/// Polarity of a pulse.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Polarity {
    Negative,
    Positive,
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Polarity::Negative => write!(f, "-"),
            Polarity::Positive => write!(f, "+"),
        }
    }
}

/// One term of a [`Shape::Multi`] superposition.
#[derive(Clone, Debug, PartialEq)]
pub struct Component {
    /// Label of the component within the superposition.
    pub label: String,
    /// Name of the private shape the component refers to.
    pub key: String,
    pub time_shift: Time,
    pub scaling: f64,
}

/// Declarative description of a pulse.
///
/// Times are relative to the owning signal's `time_ref`. Amplitudes are
/// magnitudes; the sign is carried by the polarity.
#[derive(Clone, Debug, PartialEq)]
pub enum Shape {
    /// Linear rise from `t0` to the peak at `t1`, linear fall back to zero at
    /// `t2`.
    Triangle {
        polarity: Polarity,
        t0: Time,
        t1: Time,
        t2: Time,
        amplitude: ElectricPotential,
    },
    /// Linear rise from `t0` to `t1`, plateau until `t2`, linear fall to zero
    /// at `t3`.
    TriangleGate {
        polarity: Polarity,
        t0: Time,
        t1: Time,
        t2: Time,
        t3: Time,
        amplitude: ElectricPotential,
    },
    Multi { components: Vec<Component> },
}

impl Shape {
    pub fn shape_type_id(&self) -> &'static str {
        match self {
            Shape::Triangle { .. } => TRIANGLE_SHAPE,
            Shape::TriangleGate { .. } => TRIANGLE_GATE_SHAPE,
            Shape::Multi { .. } => MULTI_SIGNAL_SHAPE,
        }
    }

    /// Exports the flat set of named shape parameters consumed by the shape
    /// evaluation engine.
    pub fn parameters(&self) -> Properties {
        let mut params = Properties::new();
        let store_time = |params: &mut Properties, key: &str, t: &Time| {
            params.store_real_with_unit(key, t.get::<nanosecond>(), "ns");
        };
        match self {
            Shape::Triangle {
                polarity,
                t0,
                t1,
                t2,
                amplitude,
            } => {
                params.store_string("polarity", polarity.to_string());
                store_time(&mut params, "t0", t0);
                store_time(&mut params, "t1", t1);
                store_time(&mut params, "t2", t2);
                params.store_real_with_unit("amplitude", amplitude.get::<volt>(), "V");
            }
            Shape::TriangleGate {
                polarity,
                t0,
                t1,
                t2,
                t3,
                amplitude,
            } => {
                params.store_string("polarity", polarity.to_string());
                store_time(&mut params, "t0", t0);
                store_time(&mut params, "t1", t1);
                store_time(&mut params, "t2", t2);
                store_time(&mut params, "t3", t3);
                params.store_real_with_unit("amplitude", amplitude.get::<volt>(), "V");
            }
            Shape::Multi { components } => {
                params.store_string_list("components", components.iter().map(|c| c.label.clone()));
                for c in components {
                    let prefix = format!("components.{}.", c.label);
                    params.store_string(format!("{prefix}key"), c.key.clone());
                    store_time(&mut params, &format!("{prefix}time_shift"), &c.time_shift);
                    params.store_real(format!("{prefix}scaling"), c.scaling);
                }
            }
        }

        params
    }
}

/// A shape owned by a composite signal and referenced by its components.
#[derive(Clone, Debug, PartialEq)]
pub struct PrivateShape {
    pub name: String,
    pub shape: Shape,
}

/// An analog pulse descriptor on a readout channel.
#[derive(Clone, Debug, PartialEq)]
pub struct Signal {
    /// Driver-local identifier.
    pub hit_id: u32,
    pub gid: GeomId,
    /// Output stream the signal belongs to.
    pub category: String,
    /// Time origin of the shape.
    pub time_ref: Time,
    pub shape: Shape,
    pub private_shapes: Vec<PrivateShape>,
    pub auxiliaries: Properties,
}

impl Signal {
    pub fn new(
        hit_id: u32,
        gid: GeomId,
        category: impl Into<String>,
        time_ref: Time,
        shape: Shape,
    ) -> Self {
        Self {
            hit_id,
            gid,
            category: category.into(),
            time_ref,
            shape,
            private_shapes: Vec::new(),
            auxiliaries: Properties::new(),
        }
    }
    pub fn shape_type_id(&self) -> &'static str {
        self.shape.shape_type_id()
    }
    pub fn shape_parameters(&self) -> Properties {
        self.shape.parameters()
    }
    /// Returns `true` if the signal is a superposition of private shapes.
    pub fn is_composite(&self) -> bool {
        matches!(self.shape, Shape::Multi { .. })
    }
    pub fn private_shape(&self, name: &str) -> Option<&Shape> {
        self.private_shapes
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.shape)
    }
}

/// Append-only destination of the signals built by a driver.
pub trait SignalSink {
    /// Appends `signal` to the stream `category`.
    fn add_signal(&mut self, category: &str, signal: Signal);
}

/// The signals of one simulated event, grouped by signal category.
#[derive(Clone, Debug, Default)]
pub struct SignalData {
    signals: BTreeMap<String, Vec<Signal>>,
}

impl SignalData {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn has_signals(&self, category: &str) -> bool {
        self.signals.get(category).is_some_and(|v| !v.is_empty())
    }
    /// Returns the signals of `category` in the order they were added.
    pub fn signals(&self, category: &str) -> &[Signal] {
        self.signals
            .get(category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
    pub fn number_of_signals(&self, category: &str) -> usize {
        self.signals(category).len()
    }
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.signals.keys().map(String::as_str)
    }
    pub fn clear(&mut self) {
        self.signals.clear();
    }
}

impl SignalSink for SignalData {
    fn add_signal(&mut self, category: &str, signal: Signal) {
        self.signals
            .entry(category.to_string())
            .or_default()
            .push(signal);
    }
}
