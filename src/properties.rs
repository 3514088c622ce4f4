use crate::error::{Error, Result};
use crate::units;
use std::collections::BTreeMap;
use std::fmt;
use uom::si::f64::{ElectricPotential, Length, Time, Velocity};
use winnow::ascii::{dec_int, float, line_ending, space0, space1, till_line_ending};
use winnow::combinator::{alt, delimited, opt, preceded, separated, terminated};
use winnow::error::ContextError;
use winnow::token::{take_till, take_while};
use winnow::Parser;

/// A typed configuration value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    String(String),
    /// A real number, optionally carrying an explicit unit symbol.
    Real {
        value: f64,
        unit: Option<String>,
    },
    Integer(i64),
    Boolean(bool),
    StringList(Vec<String>),
}

impl Value {
    /// A real number without unit.
    pub fn real(value: f64) -> Self {
        Value::Real { value, unit: None }
    }
    /// A real number with an explicit unit symbol.
    pub fn real_with_unit(value: f64, unit: impl Into<String>) -> Self {
        Value::Real {
            value,
            unit: Some(unit.into()),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Real { .. } => "real",
            Value::Integer(_) => "integer",
            Value::Boolean(_) => "boolean",
            Value::StringList(_) => "string[]",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = ", self.type_name())?;
        match self {
            Value::String(s) => write!(f, "\"{s}\""),
            Value::Real { value, unit: None } => write!(f, "{value}"),
            Value::Real {
                value,
                unit: Some(unit),
            } => write!(f, "{value} {unit}"),
            Value::Integer(n) => write!(f, "{n}"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::StringList(list) => {
                let text = list
                    .iter()
                    .map(|s| format!("\"{s}\""))
                    .collect::<Vec<_>>()
                    .join(" ");
                write!(f, "{text}")
            }
        }
    }
}

/// Ordered set of named configuration values.
///
/// [`Properties`] is the configuration surface of every driver and of the
/// Geiger regime model. It can be built programmatically or parsed from a
/// line oriented text format:
///
/// ```text
/// # comment
/// id : string = "CaloSignal"
/// rise_time : real = 8 ns
/// start_signal_id : integer = 0
/// ```
///
/// Strings may not contain double quotes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Properties {
    entries: BTreeMap<String, Value>,
}

impl Properties {
    /// Creates an empty set of properties.
    pub fn new() -> Self {
        Self::default()
    }
    /// Stores a value, returning the value previously stored under `key`.
    ///
    /// # Examples
    ///
    /// ```
    /// use asb::properties::{Properties, Value};
    ///
    /// let mut config = Properties::new();
    /// assert_eq!(config.store("model", Value::String("triangle".into())), None);
    /// assert!(config.has_key("model"));
    /// ```
    pub fn store(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(key.into(), value)
    }
    pub fn store_string(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.store(key, Value::String(value.into()));
    }
    pub fn store_real(&mut self, key: impl Into<String>, value: f64) {
        self.store(key, Value::real(value));
    }
    pub fn store_real_with_unit(
        &mut self,
        key: impl Into<String>,
        value: f64,
        unit: impl Into<String>,
    ) {
        self.store(key, Value::real_with_unit(value, unit));
    }
    pub fn store_integer(&mut self, key: impl Into<String>, value: i64) {
        self.store(key, Value::Integer(value));
    }
    pub fn store_boolean(&mut self, key: impl Into<String>, value: bool) {
        self.store(key, Value::Boolean(value));
    }
    /// Stores a boolean `true` under `key`.
    pub fn store_flag(&mut self, key: impl Into<String>) {
        self.store_boolean(key, true);
    }
    pub fn store_string_list<S: Into<String>>(
        &mut self,
        key: impl Into<String>,
        values: impl IntoIterator<Item = S>,
    ) {
        let list = values.into_iter().map(Into::into).collect();
        self.store(key, Value::StringList(list));
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
    /// Returns `true` if `key` holds the boolean `true`.
    pub fn has_flag(&self, key: &str) -> bool {
        matches!(self.entries.get(key), Some(Value::Boolean(true)))
    }
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
    pub fn clear(&mut self) {
        self.entries.clear();
    }
    /// Iterates over the entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn fetch(&self, key: &str) -> Result<&Value> {
        self.entries
            .get(key)
            .ok_or_else(|| Error::MissingConfiguration(key.to_string()))
    }

    fn wrong_type(key: &str, expected: &str, found: &Value) -> Error {
        Error::invalid_value(
            key,
            format!("expected {expected}, found {}", found.type_name()),
        )
    }

    pub fn fetch_string(&self, key: &str) -> Result<&str> {
        match self.fetch(key)? {
            Value::String(s) => Ok(s),
            other => Err(Self::wrong_type(key, "string", other)),
        }
    }
    pub fn fetch_integer(&self, key: &str) -> Result<i64> {
        match self.fetch(key)? {
            Value::Integer(n) => Ok(*n),
            other => Err(Self::wrong_type(key, "integer", other)),
        }
    }
    pub fn fetch_boolean(&self, key: &str) -> Result<bool> {
        match self.fetch(key)? {
            Value::Boolean(b) => Ok(*b),
            other => Err(Self::wrong_type(key, "boolean", other)),
        }
    }
    pub fn fetch_string_list(&self, key: &str) -> Result<&[String]> {
        match self.fetch(key)? {
            Value::StringList(list) => Ok(list),
            other => Err(Self::wrong_type(key, "string[]", other)),
        }
    }
    /// Returns a real number and its explicit unit symbol, if any. Integers are
    /// accepted as unit-less reals.
    pub fn fetch_real(&self, key: &str) -> Result<(f64, Option<&str>)> {
        match self.fetch(key)? {
            Value::Real { value, unit } => Ok((*value, unit.as_deref())),
            Value::Integer(n) => Ok((*n as f64, None)),
            other => Err(Self::wrong_type(key, "real", other)),
        }
    }
    /// Returns a dimensionless real number.
    pub fn fetch_dimensionless_real(&self, key: &str) -> Result<f64> {
        match self.fetch_real(key)? {
            (value, None) => Ok(value),
            (_, Some(unit)) => Err(Error::invalid_value(
                key,
                format!("expected a dimensionless value, found unit '{unit}'"),
            )),
        }
    }

    fn fetch_quantity<Q>(
        &self,
        key: &str,
        default_unit: Option<&str>,
        dimension: &str,
        convert: fn(f64, &str) -> Option<Q>,
    ) -> Result<Q> {
        let (value, unit) = self.fetch_real(key)?;
        let symbol = unit.or(default_unit).ok_or_else(|| {
            Error::invalid_value(key, format!("an explicit {dimension} unit is required"))
        })?;
        convert(value, symbol)
            .ok_or_else(|| Error::invalid_value(key, format!("'{symbol}' is not a {dimension} unit")))
    }

    /// Fetches a time. Unit-less values are expressed in `default_unit`; when
    /// `default_unit` is `None` an explicit unit is required.
    ///
    /// # Examples
    ///
    /// ```
    /// use asb::properties::Properties;
    /// use uom::si::time::nanosecond;
    ///
    /// let mut config = Properties::new();
    /// config.store_real_with_unit("rise_time", 8.0, "ns");
    /// config.store_real("tcut", 13.0);
    ///
    /// let rise_time = config.fetch_time("rise_time", None)?;
    /// assert!((rise_time.get::<nanosecond>() - 8.0).abs() < 1e-9);
    /// assert!(config.fetch_time("tcut", None).is_err());
    /// assert!(config.fetch_time("tcut", Some("us")).is_ok());
    /// # Ok::<(), asb::Error>(())
    /// ```
    pub fn fetch_time(&self, key: &str, default_unit: Option<&str>) -> Result<Time> {
        self.fetch_quantity(key, default_unit, "time", units::time)
    }
    pub fn fetch_length(&self, key: &str, default_unit: Option<&str>) -> Result<Length> {
        self.fetch_quantity(key, default_unit, "length", units::length)
    }
    pub fn fetch_velocity(&self, key: &str, default_unit: Option<&str>) -> Result<Velocity> {
        self.fetch_quantity(key, default_unit, "velocity", units::velocity)
    }
    pub fn fetch_potential(
        &self,
        key: &str,
        default_unit: Option<&str>,
    ) -> Result<ElectricPotential> {
        self.fetch_quantity(key, default_unit, "electric potential", units::potential)
    }
    /// Fetches an energy to amplitude gain, in V/MeV.
    pub fn fetch_gain(&self, key: &str, default_unit: Option<&str>) -> Result<f64> {
        self.fetch_quantity(key, default_unit, "energy to amplitude gain", units::gain)
    }

    /// Reads properties from a configuration file.
    pub fn read_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::MissingConfiguration(format!("cannot read '{}': {e}", path.display()))
        })?;
        Ok(text.parse::<Properties>()?)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Properties {
    fn from_iter<T>(iter: T) -> Self
    where
        T: IntoIterator<Item = (K, Value)>,
    {
        let mut properties = Self::new();
        for (key, value) in iter {
            properties.store(key, value);
        }

        properties
    }
}

impl<K: Into<String>, const N: usize> From<[(K, Value); N]> for Properties {
    /// Converts a `[(key, Value); N]` into [`Properties`].
    ///
    /// If the array contains duplicate keys, the last value wins.
    ///
    /// # Examples
    ///
    /// ```
    /// use asb::properties::{Properties, Value};
    ///
    /// let config = Properties::from([
    ///     ("id", Value::String("CaloSignal".into())),
    ///     ("start_signal_id", Value::Integer(10)),
    /// ]);
    /// assert_eq!(config.fetch_integer("start_signal_id")?, 10);
    /// # Ok::<(), asb::Error>(())
    /// ```
    fn from(arr: [(K, Value); N]) -> Self {
        Self::from_iter(arr)
    }
}

impl fmt::Display for Properties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self
            .entries
            .iter()
            .map(|(key, value)| format!("{key} : {value}"))
            .collect::<Vec<_>>()
            .join("\n");

        write!(f, "{text}")
    }
}

fn key<'s>(input: &mut &'s str) -> winnow::Result<&'s str> {
    take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '.').parse_next(input)
}

fn quoted<'s>(input: &mut &'s str) -> winnow::Result<&'s str> {
    delimited('"', take_till(0.., '"'), '"').parse_next(input)
}

fn unit_symbol<'s>(input: &mut &'s str) -> winnow::Result<&'s str> {
    take_while(1.., |c: char| c.is_alphanumeric() || c == '/').parse_next(input)
}

fn real(input: &mut &str) -> winnow::Result<Value> {
    let value: f64 = float.parse_next(input)?;
    let unit = opt(preceded(space1, unit_symbol)).parse_next(input)?;

    Ok(Value::Real {
        value,
        unit: unit.map(str::to_string),
    })
}

fn entry(input: &mut &str) -> winnow::Result<(String, Value)> {
    let name = key.parse_next(input)?;
    let _ = (space0, ':', space0).parse_next(input)?;
    let kind = alt(("string[]", "string", "real", "integer", "boolean")).parse_next(input)?;
    let _ = (space0, '=', space0).parse_next(input)?;
    let value = match kind {
        "string[]" => separated(0.., quoted.map(str::to_string), space1)
            .map(Value::StringList)
            .parse_next(input)?,
        "string" => quoted
            .map(|s: &str| Value::String(s.to_string()))
            .parse_next(input)?,
        "real" => real.parse_next(input)?,
        "integer" => dec_int.map(Value::Integer).parse_next(input)?,
        _ => alt(("true".value(true), "false".value(false)))
            .map(Value::Boolean)
            .parse_next(input)?,
    };
    let _ = space0.parse_next(input)?;

    Ok((name.to_string(), value))
}

// Blank lines and comments yield `None`. A malformed entry also falls back to
// the blank alternative, which leaves the line unconsumed and makes the whole
// parse fail at its first character.
fn line(input: &mut &str) -> winnow::Result<Option<(String, Value)>> {
    preceded(
        space0,
        alt((
            ('#', till_line_ending).value(None),
            entry.map(Some),
            space0.value(None),
        )),
    )
    .parse_next(input)
}

/// The error type returned when parsing [`Properties`] fails.
#[derive(Debug)]
pub struct ParseError {
    input: String,
    span: std::ops::Range<usize>,
}

impl ParseError {
    fn from_parse(error: winnow::error::ParseError<&str, ContextError>) -> Self {
        let input = error.input().to_string();
        let span = error.char_span();
        Self { input, span }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = annotate_snippets::Level::Error
            .title("invalid configuration line starting here")
            .snippet(
                annotate_snippets::Snippet::source(&self.input)
                    .fold(true)
                    .annotation(annotate_snippets::Level::Error.span(self.span.clone())),
            );
        let renderer = annotate_snippets::Renderer::plain();
        let rendered = renderer.render(message);
        rendered.fmt(f)
    }
}

impl std::error::Error for ParseError {}

impl std::str::FromStr for Properties {
    type Err = ParseError;

    /// Parse [`Properties`] from their text representation.
    ///
    /// # Examples
    ///
    /// ```
    /// # use asb::properties::Properties;
    /// # use std::str::FromStr;
    /// let config = Properties::from_str(
    ///     "# calorimeter driver\n\
    ///      model : string = \"triangle\"\n\
    ///      rise_time : real = 8 ns\n",
    /// )?;
    /// assert_eq!(config.fetch_string("model")?, "triangle");
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    fn from_str(input: &str) -> std::result::Result<Self, Self::Err> {
        let mut entries = BTreeMap::new();

        let () = terminated(
            separated(
                0..,
                line.map(|entry| {
                    if let Some((key, value)) = entry {
                        entries.insert(key, value);
                    }
                }),
                line_ending,
            ),
            opt(line_ending),
        )
        .parse(input)
        .map_err(ParseError::from_parse)?;

        Ok(Self { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use uom::si::electric_potential::millivolt;
    use uom::si::length::millimeter;
    use uom::si::time::microsecond;
    use uom::si::velocity::meter_per_second;

    #[test]
    fn properties_store_replaces() {
        let mut config = Properties::new();

        assert!(config.is_empty());
        assert_eq!(config.store("a", Value::Integer(1)), None);
        assert_eq!(
            config.store("a", Value::Integer(2)),
            Some(Value::Integer(1))
        );
        assert_eq!(config.len(), 1);
        assert_eq!(config.fetch_integer("a").unwrap(), 2);
    }

    #[test]
    fn properties_missing_key() {
        let config = Properties::new();

        assert!(matches!(
            config.fetch_string("id"),
            Err(Error::MissingConfiguration(key)) if key == "id"
        ));
    }

    #[test]
    fn properties_wrong_type() {
        let config = Properties::from([("id", Value::Integer(3))]);

        assert!(matches!(
            config.fetch_string("id"),
            Err(Error::InvalidValue { .. })
        ));
    }

    #[test]
    fn properties_flags() {
        let mut config = Properties::new();
        config.store_flag("geiger_already_hit");
        config.store_boolean("other", false);

        assert!(config.has_flag("geiger_already_hit"));
        assert!(!config.has_flag("other"));
        assert!(!config.has_flag("missing"));
    }

    #[test]
    fn properties_fetch_quantities() {
        let mut config = Properties::new();
        config.store_real("cell_diameter", 44.0);
        config.store_real_with_unit("cell_length", 290.0, "cm");
        config.store_real_with_unit("amplitude", 100.0, "mV");
        config.store_real_with_unit("plasma_longitudinal_speed", 5.0, "cm/us");
        config.store_integer("tcut", 13);

        let diameter = config.fetch_length("cell_diameter", Some("mm")).unwrap();
        assert!((diameter.get::<millimeter>() - 44.0).abs() < 1e-9);
        let length = config.fetch_length("cell_length", Some("mm")).unwrap();
        assert!((length.get::<millimeter>() - 2900.0).abs() < 1e-9);
        let amplitude = config.fetch_potential("amplitude", None).unwrap();
        assert!((amplitude.get::<millivolt>() - 100.0).abs() < 1e-9);
        let speed = config
            .fetch_velocity("plasma_longitudinal_speed", Some("cm/us"))
            .unwrap();
        assert!((speed.get::<meter_per_second>() - 5.0e4).abs() < 1e-6);
        let tcut = config.fetch_time("tcut", Some("us")).unwrap();
        assert!((tcut.get::<microsecond>() - 13.0).abs() < 1e-9);
    }

    #[test]
    fn properties_fetch_wrong_dimension() {
        let mut config = Properties::new();
        config.store_real_with_unit("rise_time", 8.0, "mm");

        assert!(matches!(
            config.fetch_time("rise_time", None),
            Err(Error::InvalidValue { .. })
        ));
    }

    #[test]
    fn properties_dimensionless() {
        let mut config = Properties::new();
        config.store_real("sigma_r_b", 0.0083);
        config.store_real_with_unit("sigma_r_a", 0.425, "mm");

        assert_eq!(config.fetch_dimensionless_real("sigma_r_b").unwrap(), 0.0083);
        assert!(config.fetch_dimensionless_real("sigma_r_a").is_err());
    }

    #[test]
    fn properties_to_string() {
        let mut config = Properties::new();
        assert_eq!(config.to_string(), "");

        config.store_string("model", "triangle");
        config.store_real_with_unit("rise_time", 8.0, "ns");
        config.store_real("energy_amplitude_factor", 0.3);
        config.store_integer("start_signal_id", 0);
        config.store_boolean("verbose", true);
        config.store_string_list("components", ["sig0", "sig1"]);
        assert_eq!(
            config.to_string(),
            "components : string[] = \"sig0\" \"sig1\"
energy_amplitude_factor : real = 0.3
model : string = \"triangle\"
rise_time : real = 8 ns
start_signal_id : integer = 0
verbose : boolean = true"
        );
    }

    #[test]
    fn properties_from_str() {
        let mut string = String::new();
        let mut config = Properties::new();
        assert_eq!(config, Properties::from_str(&string).unwrap());

        string.push_str("# Tracker signal generator\n\n");
        assert_eq!(config, Properties::from_str(&string).unwrap());

        string.push_str("model : string = \"triangle_gate\"\n");
        config.store_string("model", "triangle_gate");
        assert_eq!(config, Properties::from_str(&string).unwrap());

        string.push_str("  tcut   :   real   =   13 us  \n");
        config.store_real_with_unit("tcut", 13.0, "us");
        assert_eq!(config, Properties::from_str(&string).unwrap());

        string.push_str("sigma_r_b : real = 0.0083\n");
        config.store_real("sigma_r_b", 0.0083);
        assert_eq!(config, Properties::from_str(&string).unwrap());

        string.push_str("start_signal_id : integer = -2\nverbose : boolean = false");
        config.store_integer("start_signal_id", -2);
        config.store_boolean("verbose", false);
        assert_eq!(config, Properties::from_str(&string).unwrap());

        assert_eq!(config, Properties::from_str(&config.to_string()).unwrap());
    }

    #[test]
    fn properties_from_str_invalid() {
        let error = Properties::from_str("model : string = \"triangle\"\nrise_time : real = fast\n")
            .unwrap_err();
        assert!(error.to_string().contains("invalid configuration line"));

        assert!(Properties::from_str("rise_time = 8 ns").is_err());
        assert!(Properties::from_str("rise_time : complex = 8").is_err());
    }
}
