use uom::si::electric_potential::{kilovolt, microvolt, millivolt, volt};
use uom::si::f64::{ElectricPotential, Length, Time, Velocity};
use uom::si::length::{centimeter, meter, micrometer, millimeter};
use uom::si::time::{microsecond, millisecond, nanosecond, picosecond, second};
use uom::si::velocity::meter_per_second;

/// Converts `value` expressed in the time unit `symbol`.
///
/// # Examples
///
/// ```
/// use asb::units;
/// use uom::si::time::nanosecond;
///
/// let t = units::time(8.0, "ns").unwrap();
/// assert!((t.get::<nanosecond>() - 8.0).abs() < 1e-9);
/// assert!(units::time(8.0, "mm").is_none());
/// ```
pub fn time(value: f64, symbol: &str) -> Option<Time> {
    let t = match symbol {
        "ps" => Time::new::<picosecond>(value),
        "ns" => Time::new::<nanosecond>(value),
        "us" | "µs" => Time::new::<microsecond>(value),
        "ms" => Time::new::<millisecond>(value),
        "s" => Time::new::<second>(value),
        _ => return None,
    };
    Some(t)
}

/// Converts `value` expressed in the length unit `symbol`.
pub fn length(value: f64, symbol: &str) -> Option<Length> {
    let l = match symbol {
        "um" | "µm" => Length::new::<micrometer>(value),
        "mm" => Length::new::<millimeter>(value),
        "cm" => Length::new::<centimeter>(value),
        "m" => Length::new::<meter>(value),
        _ => return None,
    };
    Some(l)
}

/// Converts `value` expressed in the speed unit `symbol`.
pub fn velocity(value: f64, symbol: &str) -> Option<Velocity> {
    // Factors to m/s.
    let factor = match symbol {
        "m/s" => 1.0,
        "km/s" => 1.0e3,
        "cm/us" | "cm/µs" => 1.0e4,
        "mm/us" | "mm/µs" => 1.0e3,
        "cm/ns" => 1.0e7,
        "mm/ns" => 1.0e6,
        _ => return None,
    };
    Some(Velocity::new::<meter_per_second>(value * factor))
}

/// Converts `value` expressed in the electric potential unit `symbol`.
pub fn potential(value: f64, symbol: &str) -> Option<ElectricPotential> {
    let v = match symbol {
        "uV" | "µV" => ElectricPotential::new::<microvolt>(value),
        "mV" => ElectricPotential::new::<millivolt>(value),
        "V" => ElectricPotential::new::<volt>(value),
        "kV" => ElectricPotential::new::<kilovolt>(value),
        _ => return None,
    };
    Some(v)
}

/// Converts an energy to amplitude gain expressed in `symbol` to V/MeV.
pub fn gain(value: f64, symbol: &str) -> Option<f64> {
    let factor = match symbol {
        "V/MeV" => 1.0,
        "mV/MeV" => 1.0e-3,
        "V/keV" => 1.0e3,
        "mV/keV" => 1.0,
        _ => return None,
    };
    Some(value * factor)
}

/// Speed given in cm/µs, the natural unit of the plasma propagation.
pub(crate) fn cm_per_us(value: f64) -> Velocity {
    Velocity::new::<meter_per_second>(value * 1.0e4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_symbols() {
        assert_eq!(time(1.0, "us"), time(1.0, "µs"));
        let t = time(1000.0, "ns").unwrap();
        assert!((t.get::<microsecond>() - 1.0).abs() < 1e-12);
        assert!(time(1.0, "V").is_none());
    }

    #[test]
    fn length_symbols() {
        let l = length(44.0, "mm").unwrap();
        assert!((l.get::<centimeter>() - 4.4).abs() < 1e-12);
        assert!(length(1.0, "ns").is_none());
    }

    #[test]
    fn velocity_symbols() {
        let v = velocity(5.0, "cm/us").unwrap();
        assert!((v.get::<meter_per_second>() - 5.0e4).abs() < 1e-6);
        assert_eq!(v, cm_per_us(5.0));
        assert!(velocity(5.0, "cm").is_none());
    }

    #[test]
    fn potential_symbols() {
        let v = potential(100.0, "mV").unwrap();
        assert!((v.get::<volt>() - 0.1).abs() < 1e-12);
        assert!(potential(1.0, "MeV").is_none());
    }

    #[test]
    fn gain_symbols() {
        assert_eq!(gain(0.3, "V/MeV"), Some(0.3));
        let g = gain(300.0, "mV/MeV").unwrap();
        assert!((g - 0.3).abs() < 1e-12);
        assert!(gain(0.3, "V").is_none());
    }
}
