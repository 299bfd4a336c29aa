use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use log::{debug, info};
use regions_shared::{Axis, Region};

mod document;
mod extract;

pub use document::{Attribute, Document, Element, ElementId};

const PIXEL_FORMAT_VAR: &str = "REGIONS_PIXEL_FORMAT";

/// How geometry values are written back to the config file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveFormat {
    /// `<int>%`, relative to the output size
    Percent,
    /// `<int>`, absolute pixels
    Pixels,
}

impl SaveFormat {
    /// Pixels if `REGIONS_PIXEL_FORMAT` is set, percentages otherwise
    pub fn from_env() -> Self {
        if env::var_os(PIXEL_FORMAT_VAR).is_some() {
            SaveFormat::Pixels
        } else {
            SaveFormat::Percent
        }
    }

    fn format(self, value: f64) -> String {
        let value = value.round() as i64;
        match self {
            SaveFormat::Percent => format!("{value}%"),
            SaveFormat::Pixels => value.to_string(),
        }
    }
}

/// `labwc/rc.xml` in the XDG config directories
pub fn default_config_path() -> Option<PathBuf> {
    let dirs = xdg::BaseDirectories::with_prefix("labwc");
    dirs.find_config_file("rc.xml")
        .or_else(|| dirs.get_config_file("rc.xml"))
}

/// The parsed config document together with the regions found in it
#[derive(Debug)]
pub struct ConfigStore {
    document: Document,
    regions: Vec<Region>,
}

impl ConfigStore {
    /// Reads and parses the config file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path)
            .with_context(|| format!("Unable to read config file {}", path.display()))?;
        let store = Self::from_source(source)
            .with_context(|| format!("Unable to parse config file {}", path.display()))?;
        info!(
            "Loaded {} regions from {}",
            store.regions.len(),
            path.display()
        );

        Ok(store)
    }

    /// Parses a config document that is already in memory
    pub fn from_source(source: String) -> anyhow::Result<Self> {
        let document = Document::parse(source)?;
        let regions = extract::extract_regions(&document);
        for region in &regions {
            debug!(
                "Region {}: {:?} {:?}",
                region.name, region.geometry, region.units
            );
        }

        Ok(Self { document, regions })
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn regions_mut(&mut self) -> &mut [Region] {
        &mut self.regions
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Writes the geometry of every region back to the fields it was read from
    pub fn apply(&mut self, format: SaveFormat) {
        for region in &self.regions {
            for axis in Axis::ALL {
                if let Some(field) = region.source.get(axis) {
                    self.document
                        .set_field(field, format.format(region.geometry.get(axis)));
                }
            }
        }
    }

    /// Applies the geometry to the document and writes the whole document to `path`
    pub fn save(&mut self, path: impl AsRef<Path>, format: SaveFormat) -> anyhow::Result<()> {
        let path = path.as_ref();
        self.apply(format);
        fs::write(path, self.document.serialize())
            .with_context(|| format!("Unable to write config file {}", path.display()))?;
        info!("Saved {} regions to {}", self.regions.len(), path.display());

        Ok(())
    }
}
