use crate::error::{Error, Result};
use nalgebra::{Rotation3, Vector3};
use std::collections::BTreeMap;
use std::fmt;
use uom::si::f64::Length;
use uom::si::length::millimeter;

/// Value of an address slot that has not been assigned.
pub const INVALID_ADDRESS: u32 = u32::MAX;

/// Geometry identifier of a physical detector element.
///
/// A [`GeomId`] is made of the type of its geometry category and of an
/// address path (module, side, layer, row...). Identifiers are totally
/// ordered, first by type, then by address.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GeomId {
    geom_type: u32,
    addresses: Vec<u32>,
}

impl GeomId {
    /// Creates a new identifier.
    ///
    /// # Examples
    ///
    /// ```
    /// use asb::geometry::GeomId;
    ///
    /// let gid = GeomId::new(1204, [0, 1, 3, 106]);
    /// assert_eq!(gid.depth(), 4);
    /// assert_eq!(gid.to_string(), "[1204:0.1.3.106]");
    /// ```
    pub fn new(geom_type: u32, addresses: impl Into<Vec<u32>>) -> Self {
        Self {
            geom_type,
            addresses: addresses.into(),
        }
    }
    pub fn geom_type(&self) -> u32 {
        self.geom_type
    }
    pub fn set_geom_type(&mut self, geom_type: u32) {
        self.geom_type = geom_type;
    }
    /// Number of address slots.
    pub fn depth(&self) -> usize {
        self.addresses.len()
    }
    /// Changes the number of address slots. New slots hold [`INVALID_ADDRESS`].
    pub fn set_depth(&mut self, depth: usize) {
        self.addresses.resize(depth, INVALID_ADDRESS);
    }
    pub fn get(&self, index: usize) -> Option<u32> {
        self.addresses.get(index).copied()
    }
    /// Sets the address at `index`, which must be below [`GeomId::depth`].
    pub fn set(&mut self, index: usize, value: u32) -> Result<()> {
        let depth = self.depth();
        let slot = self.addresses.get_mut(index).ok_or_else(|| {
            Error::Geometry(format!("address index {index} out of depth {depth}"))
        })?;
        *slot = value;

        Ok(())
    }
    pub fn addresses(&self) -> &[u32] {
        &self.addresses
    }
    /// Returns `true` if every address slot is assigned.
    pub fn is_complete(&self) -> bool {
        self.addresses.iter().all(|&a| a != INVALID_ADDRESS)
    }
}

impl fmt::Display for GeomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = self
            .addresses
            .iter()
            .map(|&a| match a {
                INVALID_ADDRESS => "*".to_string(),
                a => a.to_string(),
            })
            .collect::<Vec<_>>()
            .join(".");

        write!(f, "[{}:{path}]", self.geom_type)
    }
}

/// A point in a 3D frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point3 {
    pub x: Length,
    pub y: Length,
    pub z: Length,
}

impl Point3 {
    pub fn new(x: Length, y: Length, z: Length) -> Self {
        Self { x, y, z }
    }
    /// Creates a point from coordinates in millimeters.
    pub fn from_mm(x: f64, y: f64, z: f64) -> Self {
        Self::new(
            Length::new::<millimeter>(x),
            Length::new::<millimeter>(y),
            Length::new::<millimeter>(z),
        )
    }
    pub fn origin() -> Self {
        Self::from_mm(0.0, 0.0, 0.0)
    }
    /// Coordinates in millimeters.
    pub fn to_mm(self) -> Vector3<f64> {
        Vector3::new(
            self.x.get::<millimeter>(),
            self.y.get::<millimeter>(),
            self.z.get::<millimeter>(),
        )
    }
    fn from_mm_vector(v: Vector3<f64>) -> Self {
        Self::from_mm(v.x, v.y, v.z)
    }
    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Point3) -> Length {
        Length::new::<millimeter>((self.to_mm() - other.to_mm()).norm())
    }
}

impl Default for Point3 {
    fn default() -> Self {
        Self::origin()
    }
}

/// Placement of a volume in its mother frame.
///
/// A point `c` in the child frame sits at `rotation · c + translation` in the
/// mother frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    // In mm.
    translation: Vector3<f64>,
    rotation: Rotation3<f64>,
}

impl Placement {
    pub fn new(translation: Point3, rotation: Rotation3<f64>) -> Self {
        Self {
            translation: translation.to_mm(),
            rotation,
        }
    }
    /// A pure translation.
    pub fn translation(translation: Point3) -> Self {
        Self::new(translation, Rotation3::identity())
    }
    /// A translation combined with a rotation of `angle` radians around the
    /// mother's z axis.
    pub fn rotated_z(translation: Point3, angle: f64) -> Self {
        Self::new(
            translation,
            Rotation3::from_axis_angle(&Vector3::z_axis(), angle),
        )
    }
    /// Expresses a point of the mother frame in the child frame.
    pub fn mother_to_child(&self, point: &Point3) -> Point3 {
        let local = self
            .rotation
            .inverse_transform_vector(&(point.to_mm() - self.translation));
        Point3::from_mm_vector(local)
    }
    /// Expresses a point of the child frame in the mother frame.
    pub fn child_to_mother(&self, point: &Point3) -> Point3 {
        Point3::from_mm_vector(self.rotation * point.to_mm() + self.translation)
    }
}

impl Default for Placement {
    fn default() -> Self {
        Self::translation(Point3::origin())
    }
}

/// Geometry services consumed by the signal generator drivers.
///
/// The mapping between category names, category types and subaddress names is
/// data owned by the geometry description; drivers always query it.
pub trait GeometryLookup: Send + Sync {
    /// Expresses a world frame point in the local frame of the volume `gid`.
    fn world_to_local(&self, gid: &GeomId, world: &Point3) -> Result<Point3>;
    /// Returns the type of the geometry category called `category`.
    fn category_type(&self, category: &str) -> Option<u32>;
    /// Returns the address slot of the subaddress `subaddress` in identifiers
    /// of type `geom_type`.
    fn subaddress_index(&self, geom_type: u32, subaddress: &str) -> Option<usize>;
}

/// Description of a geometry category.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CategoryInfo {
    pub geom_type: u32,
    /// Names of the address slots, outermost first.
    pub addresses: Vec<String>,
}

/// In-memory [`GeometryLookup`] built from explicit categories and world
/// placements.
#[derive(Clone, Debug, Default)]
pub struct GeometryMap {
    categories: BTreeMap<String, CategoryInfo>,
    placements: BTreeMap<GeomId, Placement>,
}

impl GeometryMap {
    pub fn new() -> Self {
        Self::default()
    }
    /// Declares a geometry category.
    pub fn add_category<S: Into<String>>(
        &mut self,
        name: impl Into<String>,
        geom_type: u32,
        addresses: impl IntoIterator<Item = S>,
    ) -> &mut Self {
        let info = CategoryInfo {
            geom_type,
            addresses: addresses.into_iter().map(Into::into).collect(),
        };
        self.categories.insert(name.into(), info);
        self
    }
    /// Declares the world placement of the volume `gid`.
    pub fn add_placement(&mut self, gid: GeomId, placement: Placement) -> &mut Self {
        self.placements.insert(gid, placement);
        self
    }
    pub fn category(&self, name: &str) -> Option<&CategoryInfo> {
        self.categories.get(name)
    }
    pub fn placement(&self, gid: &GeomId) -> Option<&Placement> {
        self.placements.get(gid)
    }
}

impl GeometryLookup for GeometryMap {
    fn world_to_local(&self, gid: &GeomId, world: &Point3) -> Result<Point3> {
        let placement = self
            .placements
            .get(gid)
            .ok_or_else(|| Error::Geometry(format!("no placement for {gid}")))?;

        Ok(placement.mother_to_child(world))
    }

    fn category_type(&self, category: &str) -> Option<u32> {
        self.categories.get(category).map(|info| info.geom_type)
    }

    fn subaddress_index(&self, geom_type: u32, subaddress: &str) -> Option<usize> {
        self.categories
            .values()
            .find(|info| info.geom_type == geom_type)?
            .addresses
            .iter()
            .position(|name| name == subaddress)
    }
}
