use crate::error::{Error, Result};
use crate::properties::Properties;
use crate::tabulated::Interpolant;
use crate::units;
use std::fmt;
use uom::si::f64::{Length, Time, Velocity};
use uom::si::length::{centimeter, millimeter};
use uom::si::time::{microsecond, millisecond, nanosecond};

// Drift radius (cm) as a function of the drift time (µs) below `t0`.
const FIT_A1: f64 = 0.561467153108633;
const FIT_B1: f64 = 0.580448313540993;
const FIT_C1: f64 = 1.69887483468611;

const T0_US: f64 = 4.0;
const MIN_TCUT_US: f64 = 8.0;
const MAX_TCUT_US: f64 = 1000.0;
const TABLE_STEP_US: f64 = 0.1;

// Logistic roll-off of the anode efficiency, in mm.
const SIGMOID_CENTER_OFFSET_MM: f64 = 1.0;
const SIGMOID_WIDTH_MM: f64 = 3.0;

/// Anode efficiency model of [`GeigerRegime::get_anode_efficiency`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AnodeEfficiencyMode {
    /// Full efficiency inside the cell radius, none outside.
    #[default]
    Window,
    /// Full efficiency well inside the cell, logistic roll-off towards the
    /// cell corners.
    Sigmoid,
}

/// Drift time to drift radius calibration curve, evaluated in µs and cm.
#[derive(Clone, Copy, Debug)]
struct DriftCurve {
    t0: f64,
    tcut: f64,
    r0: f64,
    rdiag: f64,
}

impl DriftCurve {
    fn radius(&self, t: f64) -> f64 {
        if t > 0.0 && t <= self.t0 {
            let ut = 10.0 * t;
            FIT_A1 * ut / (ut.powf(FIT_B1) + FIT_C1)
        } else if t > self.t0 && t <= self.tcut {
            self.r0 + (self.rdiag - self.r0) * (t - self.t0) / (self.tcut - self.t0)
        } else {
            0.0
        }
    }
}

#[derive(Clone, Debug)]
struct Calibration {
    curve: DriftCurve,
    // Drift radius (cm) to drift time (µs).
    base_rt: Interpolant<f64>,
}

/// Analog response model of a drift cell operated in Geiger regime.
///
/// The model holds the physical constants of one cell design. Calling
/// [`GeigerRegime::initialize`] applies configuration overrides and builds a
/// locked drift radius to drift time table; the model is immutable afterwards
/// until [`GeigerRegime::reset`].
///
/// # Examples
///
/// ```
/// use asb::geiger::GeigerRegime;
/// use asb::properties::Properties;
/// use uom::si::f64::Length;
/// use uom::si::length::millimeter;
/// use uom::si::time::microsecond;
///
/// let mut regime = GeigerRegime::default();
/// regime.initialize(&Properties::new())?;
///
/// let distance = Length::new::<millimeter>(22.0);
/// let drift_time = regime.compute_drift_time_from_drift_distance(distance)?.unwrap();
/// assert!((drift_time.get::<microsecond>() - 4.0).abs() < 0.01);
/// # Ok::<(), asb::Error>(())
/// ```
#[derive(Clone, Debug, bon::Builder)]
pub struct GeigerRegime {
    #[builder(default = Length::new::<millimeter>(44.0))]
    cell_diameter: Length,
    #[builder(default = Length::new::<millimeter>(2900.0))]
    cell_length: Length,
    #[builder(default = Time::new::<millisecond>(1.0))]
    cell_dead_time: Time,
    #[builder(default = Time::new::<microsecond>(13.0))]
    tcut: Time,
    #[builder(default = Time::new::<nanosecond>(12.5))]
    sigma_anode_time: Time,
    #[builder(default = Time::new::<nanosecond>(100.0))]
    sigma_cathode_time: Time,
    #[builder(default = Length::new::<centimeter>(1.0))]
    sigma_z: Length,
    #[builder(default = Length::new::<centimeter>(5.0))]
    sigma_z_missing_cathode: Length,
    #[builder(default = Length::new::<millimeter>(0.425))]
    sigma_r_a: Length,
    #[builder(default = 0.0083)]
    sigma_r_b: f64,
    #[builder(default = Length::new::<millimeter>(12.25))]
    sigma_r_r0: Length,
    #[builder(default = 1.0)]
    base_anode_efficiency: f64,
    #[builder(default = 1.0)]
    base_cathode_efficiency: f64,
    #[builder(default = units::cm_per_us(5.0))]
    plasma_longitudinal_speed: Velocity,
    #[builder(default = units::cm_per_us(0.5))]
    sigma_plasma_longitudinal_speed: Velocity,
    #[builder(skip)]
    calibration: Option<Calibration>,
}

impl Default for GeigerRegime {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl GeigerRegime {
    pub fn is_initialized(&self) -> bool {
        self.calibration.is_some()
    }

    /// Applies the configuration overrides and builds the drift table.
    ///
    /// Unit-less lengths are read in mm, times in µs and speeds in cm/µs.
    ///
    /// The drift curve below `t0` is a fit made for 44 mm cells and reaches
    /// about 22 mm at `t0`. Cells narrower than that would give a drift radius
    /// that decreases after `t0`, so initialization fails with
    /// [`Error::Range`] unless the cut drift time lies in `[8 µs, 1 ms]` and
    /// the tabulated radii strictly increase.
    pub fn initialize(&mut self, config: &Properties) -> Result<()> {
        if self.is_initialized() {
            return Err(Error::AlreadyInitialized);
        }

        // A failed initialization leaves the model untouched.
        let mut model = self.clone();
        let length = |target: &mut Length, key: &str| -> Result<()> {
            if config.has_key(key) {
                *target = config.fetch_length(key, Some("mm"))?;
            }
            Ok(())
        };
        length(&mut model.cell_diameter, "cell_diameter")?;
        length(&mut model.cell_length, "cell_length")?;
        length(&mut model.sigma_z, "sigma_z")?;
        length(&mut model.sigma_z_missing_cathode, "sigma_z_missing_cathode")?;
        length(&mut model.sigma_r_a, "sigma_r_a")?;
        length(&mut model.sigma_r_r0, "sigma_r_r0")?;

        let time = |target: &mut Time, key: &str| -> Result<()> {
            if config.has_key(key) {
                *target = config.fetch_time(key, Some("us"))?;
            }
            Ok(())
        };
        time(&mut model.cell_dead_time, "cell_dead_time")?;
        time(&mut model.tcut, "tcut")?;
        time(&mut model.sigma_anode_time, "sigma_anode_time")?;
        time(&mut model.sigma_cathode_time, "sigma_cathode_time")?;

        let speed = |target: &mut Velocity, key: &str| -> Result<()> {
            if config.has_key(key) {
                *target = config.fetch_velocity(key, Some("cm/us"))?;
            }
            Ok(())
        };
        speed(&mut model.plasma_longitudinal_speed, "plasma_longitudinal_speed")?;
        speed(
            &mut model.sigma_plasma_longitudinal_speed,
            "sigma_plasma_longitudinal_speed",
        )?;

        let ratio = |target: &mut f64, key: &str| -> Result<()> {
            if config.has_key(key) {
                *target = config.fetch_dimensionless_real(key)?;
            }
            Ok(())
        };
        ratio(&mut model.base_anode_efficiency, "base_anode_efficiency")?;
        ratio(&mut model.base_cathode_efficiency, "base_cathode_efficiency")?;
        ratio(&mut model.sigma_r_b, "sigma_r_b")?;

        let tcut = model.tcut.get::<microsecond>();
        if tcut < MIN_TCUT_US {
            return Err(Error::Range(format!(
                "cut drift time is too short ({tcut} us < {MIN_TCUT_US} us)"
            )));
        }
        if tcut.is_nan() || tcut > MAX_TCUT_US {
            return Err(Error::Range(format!(
                "cut drift time is too long ({tcut} us > {MAX_TCUT_US} us)"
            )));
        }
        if model.cell_diameter.get::<millimeter>() <= 0.0 {
            return Err(Error::invalid_value(
                "cell_diameter",
                "must be strictly positive",
            ));
        }

        let r0 = 0.5 * model.cell_diameter.get::<centimeter>();
        let curve = DriftCurve {
            t0: T0_US,
            tcut,
            r0,
            rdiag: r0 * std::f64::consts::SQRT_2,
        };

        let steps = (tcut / TABLE_STEP_US + 1.0e-9).floor() as usize;
        // Rounding must not push the last grid point beyond tcut.
        let mut times: Vec<f64> = (0..=steps)
            .map(|i| (i as f64 * TABLE_STEP_US).min(tcut))
            .collect();
        if tcut - steps as f64 * TABLE_STEP_US > 1.0e-9 {
            times.push(tcut);
        }
        let points: Vec<(f64, f64)> = times.into_iter().map(|t| (curve.radius(t), t)).collect();
        // The fit below t0 does not depend on the cell diameter; small cells
        // overshoot r0 and the drift radius stops growing with time.
        if let Some(w) = points.windows(2).find(|w| w[1].0 <= w[0].0) {
            return Err(Error::Range(format!(
                "drift radius is not increasing with drift time at {} us for a {} mm cell",
                w[1].1,
                model.cell_diameter.get::<millimeter>()
            )));
        }
        let mut base_rt = Interpolant::new();
        for (r, t) in points {
            base_rt.add_point(r, t)?;
        }
        base_rt.lock()?;
        log::debug!(
            "drift table locked with {} points up to r = {:.3} mm",
            base_rt.len(),
            10.0 * curve.rdiag
        );

        model.calibration = Some(Calibration { curve, base_rt });
        *self = model;

        Ok(())
    }

    /// Drops the drift table and restores every constant to its documented
    /// default.
    pub fn reset(&mut self) -> Result<()> {
        if !self.is_initialized() {
            return Err(Error::NotInitialized);
        }
        *self = Self::default();

        Ok(())
    }

    fn calibration(&self) -> Result<&Calibration> {
        self.calibration.as_ref().ok_or(Error::NotInitialized)
    }

    /// Drift radius associated with `time` by the calibration curve.
    ///
    /// Returns zero at or beyond `tcut` as well as for `time == 0`.
    pub fn base_t_2_r(&self, time: Time) -> Result<Length> {
        let calibration = self.calibration()?;
        let t = time.get::<microsecond>();
        if t < 0.0 {
            return Err(Error::Range(format!("invalid drift time {t} us")));
        }

        Ok(Length::new::<centimeter>(calibration.curve.radius(t)))
    }

    /// Calibrated drift time of an avalanche created at `distance` from the
    /// anode wire.
    ///
    /// Returns `Ok(None)` if `distance` lies beyond the largest tabulated
    /// radius.
    pub fn compute_drift_time_from_drift_distance(&self, distance: Length) -> Result<Option<Time>> {
        let calibration = self.calibration()?;
        let r = distance.get::<centimeter>();
        if r < 0.0 {
            return Err(Error::Range(format!(
                "invalid drift distance {} mm",
                distance.get::<millimeter>()
            )));
        }
        let drift_time = calibration.base_rt.eval(r).map(Time::new::<microsecond>);
        log::trace!("drift distance {r} cm -> drift time {drift_time:?}");

        Ok(drift_time)
    }

    pub fn get_anode_efficiency(&self, r: Length, mode: AnodeEfficiencyMode) -> Result<f64> {
        let calibration = self.calibration()?;
        let max_eff = self.base_anode_efficiency;
        let r = r.get::<millimeter>();
        let r0 = 10.0 * calibration.curve.r0;
        let rdiag = 10.0 * calibration.curve.rdiag;

        let efficiency = match mode {
            AnodeEfficiencyMode::Window if r <= r0 => max_eff,
            AnodeEfficiencyMode::Window => 0.0,
            AnodeEfficiencyMode::Sigmoid if r <= r0 - SIGMOID_WIDTH_MM => max_eff,
            AnodeEfficiencyMode::Sigmoid if r < rdiag => {
                let center = r0 + SIGMOID_CENTER_OFFSET_MM;
                max_eff - max_eff / (1.0 + (-SIGMOID_WIDTH_MM * (r - center)).exp())
            }
            AnodeEfficiencyMode::Sigmoid => 0.0,
        };

        Ok(efficiency)
    }

    /// Longitudinal resolution given the number of cathode rings that did not
    /// fire.
    pub fn get_sigma_z(&self, _z: Length, missing_cathodes: usize) -> Result<Length> {
        self.calibration()?;
        Ok(match missing_cathodes {
            0 => self.sigma_z,
            1 => self.sigma_z_missing_cathode,
            _ => 0.5 * self.cell_length,
        })
    }

    /// Transverse resolution at drift radius `r`.
    pub fn get_sigma_r(&self, r: Length) -> Result<Length> {
        self.calibration()?;
        let dr = (r - self.sigma_r_r0).get::<millimeter>();

        Ok(self.sigma_r_a * (1.0 + self.sigma_r_b * dr * dr))
    }

    pub fn get_sigma_anode_time(&self, _anode_time: Time) -> Result<Time> {
        self.calibration()?;
        Ok(self.sigma_anode_time)
    }

    pub fn get_sigma_cathode_time(&self) -> Result<Time> {
        self.calibration()?;
        Ok(self.sigma_cathode_time)
    }

    /// Drift time associated with the cell radius.
    pub fn t0(&self) -> Result<Time> {
        Ok(Time::new::<microsecond>(self.calibration()?.curve.t0))
    }
    /// Cell radius.
    pub fn r0(&self) -> Result<Length> {
        Ok(Length::new::<centimeter>(self.calibration()?.curve.r0))
    }
    /// Distance from the anode wire to a cell corner.
    pub fn rdiag(&self) -> Result<Length> {
        Ok(Length::new::<centimeter>(self.calibration()?.curve.rdiag))
    }

    pub fn cell_diameter(&self) -> Length {
        self.cell_diameter
    }
    pub fn cell_radius(&self) -> Length {
        0.5 * self.cell_diameter
    }
    pub fn cell_length(&self) -> Length {
        self.cell_length
    }
    pub fn cell_dead_time(&self) -> Time {
        self.cell_dead_time
    }
    pub fn tcut(&self) -> Time {
        self.tcut
    }
    pub fn base_anode_efficiency(&self) -> f64 {
        self.base_anode_efficiency
    }
    pub fn base_cathode_efficiency(&self) -> f64 {
        self.base_cathode_efficiency
    }
    pub fn cathode_efficiency(&self) -> f64 {
        self.base_cathode_efficiency
    }
    pub fn plasma_longitudinal_speed(&self) -> Velocity {
        self.plasma_longitudinal_speed
    }
    pub fn sigma_plasma_longitudinal_speed(&self) -> Velocity {
        self.sigma_plasma_longitudinal_speed
    }
}

impl fmt::Display for GeigerRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "|-- Initialized    = {}", self.is_initialized())?;
        writeln!(f, "|-- Cell diameter  = {} mm", self.cell_diameter.get::<millimeter>())?;
        writeln!(f, "|-- Cell length    = {} cm", self.cell_length.get::<centimeter>())?;
        writeln!(f, "|-- Cell dead time = {} ms", self.cell_dead_time.get::<millisecond>())?;
        writeln!(f, "|-- Sigma z        = {} mm", self.sigma_z.get::<millimeter>())?;
        writeln!(f, "|-- Sigma r/a      = {} mm", self.sigma_r_a.get::<millimeter>())?;
        writeln!(f, "|-- Sigma r/b      = {}", self.sigma_r_b)?;
        writeln!(f, "|-- Sigma r/r0     = {} mm", self.sigma_r_r0.get::<millimeter>())?;
        writeln!(f, "|-- tcut           = {} ns", self.tcut.get::<nanosecond>())?;
        match &self.calibration {
            Some(calibration) => {
                let curve = calibration.curve;
                writeln!(f, "|-- t0             = {} ns", 1000.0 * curve.t0)?;
                writeln!(f, "|-- r0             = {} mm", 10.0 * curve.r0)?;
                write!(f, "`-- rdiag          = {} mm", 10.0 * curve.rdiag)
            }
            None => write!(f, "`-- Calibration    = <none>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::Value;

    fn initialized() -> GeigerRegime {
        let mut regime = GeigerRegime::default();
        regime.initialize(&Properties::new()).unwrap();
        regime
    }

    fn mm(value: f64) -> Length {
        Length::new::<millimeter>(value)
    }

    fn us(value: f64) -> Time {
        Time::new::<microsecond>(value)
    }

    #[test]
    fn derived_radii() {
        let regime = initialized();

        assert!((regime.r0().unwrap().get::<millimeter>() - 22.0).abs() < 1e-9);
        let expected = 22.0 * 2.0_f64.sqrt();
        assert!((regime.rdiag().unwrap().get::<millimeter>() - expected).abs() < 1e-9);
        assert!((regime.t0().unwrap().get::<microsecond>() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn derived_radii_follow_diameter() {
        let mut regime = GeigerRegime::builder().cell_diameter(mm(50.0)).build();
        regime.initialize(&Properties::new()).unwrap();

        assert!((regime.r0().unwrap().get::<millimeter>() - 25.0).abs() < 1e-9);
        let expected = 25.0 * 2.0_f64.sqrt();
        assert!((regime.rdiag().unwrap().get::<millimeter>() - expected).abs() < 1e-9);
    }

    #[test]
    fn base_t_2_r_boundaries() {
        let regime = initialized();

        assert_eq!(regime.base_t_2_r(us(0.0)).unwrap().get::<millimeter>(), 0.0);
        assert_eq!(regime.base_t_2_r(us(13.5)).unwrap().get::<millimeter>(), 0.0);
        assert!(matches!(regime.base_t_2_r(us(-1.0)), Err(Error::Range(_))));

        let rdiag = regime.rdiag().unwrap().get::<millimeter>();
        let at_tcut = regime.base_t_2_r(us(13.0)).unwrap().get::<millimeter>();
        assert!((at_tcut - rdiag).abs() < 1e-9);
    }

    #[test]
    fn base_t_2_r_is_continuous_at_t0() {
        let regime = initialized();

        let below = regime.base_t_2_r(us(4.0)).unwrap().get::<millimeter>();
        let above = regime.base_t_2_r(us(4.0 + 1e-9)).unwrap().get::<millimeter>();
        assert!((below - above).abs() < 0.05, "{below} != {above}");
    }

    #[test]
    fn base_t_2_r_is_increasing() {
        let regime = initialized();

        let radii: Vec<f64> = (0..=130)
            .map(|i| {
                regime
                    .base_t_2_r(us((f64::from(i) * 0.1).min(13.0)))
                    .unwrap()
                    .get::<millimeter>()
            })
            .collect();
        assert!(radii.windows(2).all(|w| w[0] < w[1]));
        assert!(radii.iter().all(|r| *r >= 0.0));
    }

    #[test]
    fn drift_time_inverts_calibration_curve() {
        let regime = initialized();

        for t in [0.5, 1.05, 2.0, 3.33, 4.0, 6.0, 12.5] {
            let r = regime.base_t_2_r(us(t)).unwrap();
            let back = regime
                .compute_drift_time_from_drift_distance(r)
                .unwrap()
                .unwrap();
            assert!((back.get::<microsecond>() - t).abs() < 5e-3, "t = {t}");
        }
    }

    #[test]
    fn drift_time_outside_table() {
        let regime = initialized();
        let rdiag = regime.rdiag().unwrap();

        assert!(regime
            .compute_drift_time_from_drift_distance(rdiag + mm(1.0))
            .unwrap()
            .is_none());
        assert!(matches!(
            regime.compute_drift_time_from_drift_distance(mm(-1.0)),
            Err(Error::Range(_))
        ));
    }

    #[test]
    fn short_tcut_is_rejected() {
        let mut regime = GeigerRegime::default();
        let config = Properties::from([("tcut", Value::real(5.0))]);

        assert!(matches!(regime.initialize(&config), Err(Error::Range(_))));
        assert!(!regime.is_initialized());
    }

    #[test]
    fn long_tcut_is_rejected() {
        let mut regime = GeigerRegime::default();
        let config = Properties::from([("tcut", Value::real_with_unit(1.0e9, "s"))]);

        assert!(matches!(regime.initialize(&config), Err(Error::Range(_))));
        assert!(!regime.is_initialized());

        let config = Properties::from([("tcut", Value::real(1000.0))]);
        assert!(regime.initialize(&config).is_ok());
    }

    #[test]
    fn narrow_cell_is_rejected() {
        let mut regime = GeigerRegime::builder().cell_diameter(mm(30.0)).build();

        assert!(matches!(
            regime.initialize(&Properties::new()),
            Err(Error::Range(_))
        ));
        assert!(!regime.is_initialized());
        assert!((regime.cell_diameter().get::<millimeter>() - 30.0).abs() < 1e-9);
    }

    #[test]
    fn tcut_off_grid_keeps_endpoint() {
        let mut regime = GeigerRegime::default();
        let config = Properties::from([("tcut", Value::real_with_unit(9050.0, "ns"))]);
        regime.initialize(&config).unwrap();

        let near_rdiag = regime.rdiag().unwrap() - mm(1e-6);
        let drift_time = regime
            .compute_drift_time_from_drift_distance(near_rdiag)
            .unwrap()
            .unwrap();
        assert!(drift_time.get::<microsecond>() > 9.0);
        assert!((drift_time.get::<microsecond>() - 9.05).abs() < 1e-5);
    }

    #[test]
    fn unitless_configuration() {
        let mut regime = GeigerRegime::default();
        let config = Properties::from([
            ("cell_diameter", Value::real(48.0)),
            ("cell_length", Value::real_with_unit(2.5, "m")),
            ("cell_dead_time", Value::real(500.0)),
            ("plasma_longitudinal_speed", Value::real(4.0)),
            ("base_anode_efficiency", Value::real(0.9)),
        ]);
        regime.initialize(&config).unwrap();

        assert!((regime.cell_diameter().get::<millimeter>() - 48.0).abs() < 1e-9);
        assert!((regime.cell_radius().get::<millimeter>() - 24.0).abs() < 1e-9);
        assert!((regime.cell_length().get::<millimeter>() - 2500.0).abs() < 1e-9);
        assert!((regime.cell_dead_time().get::<microsecond>() - 500.0).abs() < 1e-9);
        assert_eq!(regime.plasma_longitudinal_speed(), units::cm_per_us(4.0));
        assert_eq!(regime.base_anode_efficiency(), 0.9);
    }

    #[test]
    fn invalid_configuration_values() {
        let mut regime = GeigerRegime::default();
        let config = Properties::from([("cell_diameter", Value::real_with_unit(40.0, "ns"))]);
        assert!(matches!(
            regime.initialize(&config),
            Err(Error::InvalidValue { .. })
        ));

        let config = Properties::from([("sigma_r_b", Value::real_with_unit(1.0, "mm"))]);
        assert!(matches!(
            regime.initialize(&config),
            Err(Error::InvalidValue { .. })
        ));
    }

    #[test]
    fn lifecycle() {
        let mut regime = GeigerRegime::default();
        assert!(matches!(regime.reset(), Err(Error::NotInitialized)));
        assert!(matches!(regime.r0(), Err(Error::NotInitialized)));
        assert!(matches!(
            regime.get_sigma_cathode_time(),
            Err(Error::NotInitialized)
        ));
        assert!(matches!(
            regime.compute_drift_time_from_drift_distance(mm(1.0)),
            Err(Error::NotInitialized)
        ));

        let config = Properties::from([("cell_diameter", Value::real(46.0))]);
        regime.initialize(&config).unwrap();
        assert!(matches!(
            regime.initialize(&Properties::new()),
            Err(Error::AlreadyInitialized)
        ));

        regime.reset().unwrap();
        assert!(!regime.is_initialized());
        assert!((regime.cell_diameter().get::<millimeter>() - 44.0).abs() < 1e-9);
    }

    #[test]
    fn anode_efficiency_window() {
        let regime = initialized();

        let window = AnodeEfficiencyMode::Window;
        assert_eq!(regime.get_anode_efficiency(mm(21.9), window).unwrap(), 1.0);
        assert_eq!(regime.get_anode_efficiency(mm(22.1), window).unwrap(), 0.0);
    }

    #[test]
    fn anode_efficiency_sigmoid() {
        let regime = initialized();

        let sigmoid = AnodeEfficiencyMode::Sigmoid;
        assert_eq!(regime.get_anode_efficiency(mm(10.0), sigmoid).unwrap(), 1.0);
        let center = regime.get_anode_efficiency(mm(23.0), sigmoid).unwrap();
        assert!((center - 0.5).abs() < 1e-12);
        let inner = regime.get_anode_efficiency(mm(20.0), sigmoid).unwrap();
        let outer = regime.get_anode_efficiency(mm(25.0), sigmoid).unwrap();
        assert!(inner > center && center > outer);
        let beyond = regime.rdiag().unwrap() + mm(0.01);
        assert_eq!(regime.get_anode_efficiency(beyond, sigmoid).unwrap(), 0.0);
    }

    #[test]
    fn resolutions() {
        let regime = initialized();

        let z = mm(100.0);
        assert!((regime.get_sigma_z(z, 0).unwrap().get::<millimeter>() - 10.0).abs() < 1e-9);
        assert!((regime.get_sigma_z(z, 1).unwrap().get::<millimeter>() - 50.0).abs() < 1e-9);
        assert!((regime.get_sigma_z(z, 2).unwrap().get::<millimeter>() - 1450.0).abs() < 1e-9);

        let at_r0 = regime.get_sigma_r(mm(12.25)).unwrap().get::<millimeter>();
        assert!((at_r0 - 0.425).abs() < 1e-12);
        let away = regime.get_sigma_r(mm(22.25)).unwrap().get::<millimeter>();
        assert!((away - 0.425 * 1.83).abs() < 1e-9);

        let sigma_anode = regime.get_sigma_anode_time(us(3.0)).unwrap();
        assert!((sigma_anode.get::<nanosecond>() - 12.5).abs() < 1e-9);
        let sigma_cathode = regime.get_sigma_cathode_time().unwrap();
        assert!((sigma_cathode.get::<nanosecond>() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn display_dump() {
        let mut regime = GeigerRegime::default();
        assert!(regime.to_string().ends_with("<none>"));

        regime.initialize(&Properties::new()).unwrap();
        let dump = regime.to_string();
        assert!(dump.contains("Cell diameter"));
        assert!(dump.contains("rdiag"));
    }
}
