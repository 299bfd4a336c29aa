use log::warn;

use crate::OutputSize;

/// The unit a single geometry value is currently stored in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Unit {
    /// Surface-local pixels
    #[default]
    Pixels,
    /// Percentage of the output width (x, width) or height (y, height)
    Percent,
}

/// One of the four geometry values of a region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Width,
    Height,
}

impl Axis {
    /// All axes in the order they are stored and saved
    pub const ALL: [Axis; 4] = [Axis::X, Axis::Y, Axis::Width, Axis::Height];

    /// The output dimension that percentages of this axis refer to
    pub const fn dimension(self, output: OutputSize) -> u32 {
        match self {
            Axis::X | Axis::Width => output.width,
            Axis::Y | Axis::Height => output.height,
        }
    }
}

/// A rectangle with real-valued offset and size
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Geometry {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Geometry {
    /// Creates a new instance from the given offset and size
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// A rectangle without a positive area contains no point
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Whether the point lies inside the rectangle. The left and top edges are inside, the right
    /// and bottom edges are not.
    ///
    /// # Example
    /// ```
    /// # use regions_shared::Geometry;
    /// let geometry = Geometry::new(10.0, 10.0, 20.0, 20.0);
    /// assert!(geometry.contains(10.0, 10.0));
    /// assert!(!geometry.contains(30.0, 15.0));
    /// ```
    pub fn contains(&self, x: f64, y: f64) -> bool {
        if self.is_empty() {
            return false;
        }
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }

    /// Moves the rectangle by the given offset
    pub fn translate(&mut self, dx: f64, dy: f64) {
        self.x += dx;
        self.y += dy;
    }

    pub fn get(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Width => self.width,
            Axis::Height => self.height,
        }
    }

    pub fn get_mut(&mut self, axis: Axis) -> &mut f64 {
        match axis {
            Axis::X => &mut self.x,
            Axis::Y => &mut self.y,
            Axis::Width => &mut self.width,
            Axis::Height => &mut self.height,
        }
    }
}

/// Per-axis units. The four values are independent, mixed units are legal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Units {
    pub x: Unit,
    pub y: Unit,
    pub width: Unit,
    pub height: Unit,
}

impl Units {
    /// All four axes in the same unit
    pub const fn all(unit: Unit) -> Self {
        Self {
            x: unit,
            y: unit,
            width: unit,
            height: unit,
        }
    }

    pub fn get(&self, axis: Axis) -> Unit {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Width => self.width,
            Axis::Height => self.height,
        }
    }

    pub fn get_mut(&mut self, axis: Axis) -> &mut Unit {
        match axis {
            Axis::X => &mut self.x,
            Axis::Y => &mut self.y,
            Axis::Width => &mut self.width,
            Axis::Height => &mut self.height,
        }
    }
}

/// Index of a field (element text or attribute value) in the document a region was loaded from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldRef(pub usize);

/// The document fields a region writes its geometry back to on save
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldRefs {
    pub x: Option<FieldRef>,
    pub y: Option<FieldRef>,
    pub width: Option<FieldRef>,
    pub height: Option<FieldRef>,
}

impl FieldRefs {
    pub fn get(&self, axis: Axis) -> Option<FieldRef> {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Width => self.width,
            Axis::Height => self.height,
        }
    }

    pub fn set(&mut self, axis: Axis, field: FieldRef) {
        match axis {
            Axis::X => self.x = Some(field),
            Axis::Y => self.y = Some(field),
            Axis::Width => self.width = Some(field),
            Axis::Height => self.height = Some(field),
        }
    }
}

/// A named rectangle that windows can be snapped to
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    /// The name of the region, also used as its label
    pub name: String,
    /// The geometry, each value in the unit recorded in `units`
    pub geometry: Geometry,
    /// The unit of each geometry value
    pub units: Units,
    /// Where each geometry value came from in the config document
    pub source: FieldRefs,
}

impl Region {
    /// Creates a new region with an empty pixel geometry
    pub fn new(name: String) -> Self {
        Self {
            name,
            geometry: Geometry::default(),
            units: Units::default(),
            source: FieldRefs::default(),
        }
    }

    /// Sets a single geometry value together with its unit
    pub fn set_axis(&mut self, axis: Axis, value: f64, unit: Unit) {
        *self.geometry.get_mut(axis) = value;
        *self.units.get_mut(axis) = unit;
    }

    /// Converts every percentage axis to pixels of the given output
    pub fn to_pixels(&mut self, output: OutputSize) {
        self.convert(Unit::Pixels, output);
    }

    /// Converts every pixel axis to a percentage of the given output
    pub fn to_percent(&mut self, output: OutputSize) {
        self.convert(Unit::Percent, output);
    }

    fn convert(&mut self, target: Unit, output: OutputSize) {
        for axis in Axis::ALL {
            let unit = self.units.get_mut(axis);
            if *unit == target {
                continue;
            }
            let dimension = f64::from(axis.dimension(output));
            if dimension == 0.0 {
                warn!(
                    "Unable to convert {axis:?} of region {} without an output size",
                    self.name
                );
                continue;
            }
            let value = self.geometry.get_mut(axis);
            *value = match target {
                Unit::Pixels => *value * dimension / 100.0,
                Unit::Percent => *value * 100.0 / dimension,
            };
            *unit = target;
        }
    }
}

/// Converts all regions to pixels of the given output
pub fn regions_to_pixels(regions: &mut [Region], output: OutputSize) {
    for region in regions {
        region.to_pixels(output);
    }
}

/// Converts all regions to percentages of the given output
pub fn regions_to_percent(regions: &mut [Region], output: OutputSize) {
    for region in regions {
        region.to_percent(output);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTPUT: OutputSize = OutputSize::new(1920, 1080);

    fn percent_region(x: f64, y: f64, width: f64, height: f64) -> Region {
        let mut region = Region::new(String::from("test"));
        region.geometry = Geometry::new(x, y, width, height);
        region.units = Units::all(Unit::Percent);
        region
    }

    #[test]
    fn to_pixels_uses_width_for_x_and_height_for_y() {
        let mut region = percent_region(50.0, 25.0, 50.0, 75.0);
        region.to_pixels(OUTPUT);
        assert_eq!(region.geometry, Geometry::new(960.0, 270.0, 960.0, 810.0));
        assert_eq!(region.units, Units::all(Unit::Pixels));
    }

    #[test]
    fn pixels_and_back_stays_within_rounding() {
        for (x, y, width, height) in [(0, 0, 50, 50), (33, 17, 33, 66), (1, 99, 7, 1)] {
            let mut region =
                percent_region(x.into(), y.into(), width.into(), height.into());
            region.to_pixels(OutputSize::new(1366, 768));
            region.to_percent(OutputSize::new(1366, 768));
            for (axis, expected) in Axis::ALL.into_iter().zip([x, y, width, height]) {
                let value = region.geometry.get(axis).round() as i32;
                assert!((value - expected).abs() <= 1, "{axis:?}: {value} vs {expected}");
            }
        }
    }

    #[test]
    fn repeated_conversion_is_a_no_op() {
        let mut region = percent_region(10.0, 20.0, 30.0, 40.0);
        let before = region.clone();
        region.to_percent(OUTPUT);
        region.to_percent(OUTPUT);
        assert_eq!(region, before);
    }

    #[test]
    fn mixed_units_only_convert_foreign_axes() {
        let mut region = Region::new(String::from("mixed"));
        region.set_axis(Axis::X, 50.0, Unit::Percent);
        region.set_axis(Axis::Y, 100.0, Unit::Pixels);
        region.set_axis(Axis::Width, 200.0, Unit::Pixels);
        region.set_axis(Axis::Height, 10.0, Unit::Percent);

        region.to_pixels(OUTPUT);
        assert_eq!(region.geometry, Geometry::new(960.0, 100.0, 200.0, 108.0));
        assert_eq!(region.units, Units::all(Unit::Pixels));
    }

    #[test]
    fn conversion_without_output_size_keeps_values() {
        let mut region = percent_region(10.0, 20.0, 30.0, 40.0);
        region.to_pixels(OutputSize::default());
        assert_eq!(region.geometry, Geometry::new(10.0, 20.0, 30.0, 40.0));
        assert_eq!(region.units, Units::all(Unit::Percent));
    }

    #[test]
    fn contains_includes_left_and_top_edges_only() {
        let geometry = Geometry::new(10.0, 20.0, 100.0, 50.0);
        assert!(geometry.contains(10.0, 20.0));
        assert!(geometry.contains(109.9, 69.9));
        assert!(!geometry.contains(110.0, 30.0));
        assert!(!geometry.contains(50.0, 70.0));
        assert!(!geometry.contains(9.9, 30.0));
    }

    #[test]
    fn empty_geometry_contains_nothing() {
        assert!(!Geometry::new(0.0, 0.0, 0.0, 10.0).contains(0.0, 0.0));
        assert!(!Geometry::new(0.0, 0.0, 10.0, -1.0).contains(0.0, 0.0));
        assert!(!Geometry::new(5.0, 5.0, -10.0, -10.0).contains(0.0, 0.0));
    }

    #[test]
    fn slice_helpers_convert_every_region() {
        let mut regions = vec![
            percent_region(0.0, 0.0, 50.0, 100.0),
            percent_region(50.0, 0.0, 50.0, 100.0),
        ];
        regions_to_pixels(&mut regions, OUTPUT);
        assert_eq!(regions[1].geometry, Geometry::new(960.0, 0.0, 960.0, 1080.0));
        regions_to_percent(&mut regions, OUTPUT);
        assert_eq!(regions[1].geometry, Geometry::new(50.0, 0.0, 50.0, 100.0));
    }
}
