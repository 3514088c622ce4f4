use crate::error::{Error, Result};
use num_traits::Float;

/// Piecewise linear function through a set of tabulated points.
///
/// Points are accumulated with [`Interpolant::add_point`] and the table must be
/// locked before it can be evaluated. Once locked, the abscissas are sorted and
/// strictly increasing, and no more points can be added.
///
/// # Examples
///
/// ```
/// use asb::tabulated::Interpolant;
///
/// let mut f = Interpolant::new();
/// f.add_point(0.0, 0.0)?;
/// f.add_point(2.0, 4.0)?;
/// f.lock()?;
///
/// assert_eq!(f.eval(1.0), Some(2.0));
/// assert_eq!(f.eval(3.0), None);
/// # Ok::<(), asb::Error>(())
/// ```
#[derive(Clone, Debug, Default)]
pub struct Interpolant<T> {
    points: Vec<(T, T)>,
    locked: bool,
}

impl<T: Float> Interpolant<T> {
    pub fn new() -> Self {
        Self {
            points: Vec::new(),
            locked: false,
        }
    }

    /// Adds the point `(x, y)` to an unlocked table.
    pub fn add_point(&mut self, x: T, y: T) -> Result<()> {
        if self.locked {
            return Err(Error::AlreadyInitialized);
        }
        if x.is_nan() || y.is_nan() {
            return Err(Error::Range(String::from("tabulated point is NaN")));
        }
        self.points.push((x, y));

        Ok(())
    }

    /// Sorts the tabulated points and freezes the table.
    ///
    /// At least two points are required and no two points may share the same
    /// abscissa.
    pub fn lock(&mut self) -> Result<()> {
        if self.locked {
            return Err(Error::AlreadyInitialized);
        }
        if self.points.len() < 2 {
            return Err(Error::Range(format!(
                "at least 2 tabulated points are required, found {}",
                self.points.len()
            )));
        }
        self.points
            .sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        if self.points.windows(2).any(|w| w[0].0 >= w[1].0) {
            return Err(Error::Range(String::from(
                "tabulated abscissas are not strictly increasing",
            )));
        }
        self.locked = true;

        Ok(())
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Smallest tabulated abscissa of a locked table.
    pub fn x_min(&self) -> Option<T> {
        self.locked.then(|| self.points[0].0)
    }

    /// Largest tabulated abscissa of a locked table.
    pub fn x_max(&self) -> Option<T> {
        self.locked
            .then(|| self.points.last().map(|p| p.0))
            .flatten()
    }

    /// Evaluates the function at `x`.
    ///
    /// Returns `None` if the table is not locked or `x` lies outside
    /// `[x_min, x_max]`.
    pub fn eval(&self, x: T) -> Option<T> {
        let (x_min, x_max) = (self.x_min()?, self.x_max()?);
        if !(x >= x_min && x <= x_max) {
            return None;
        }
        // First point strictly beyond x, clamped to keep a valid segment.
        let upper = self
            .points
            .partition_point(|p| p.0 <= x)
            .clamp(1, self.points.len() - 1);
        let (x1, y1) = self.points[upper - 1];
        let (x2, y2) = self.points[upper];

        Some(y1 + (y2 - y1) * (x - x1) / (x2 - x1))
    }

    /// Drops all points and unlocks the table.
    pub fn reset(&mut self) {
        self.points.clear();
        self.locked = false;
    }
}
