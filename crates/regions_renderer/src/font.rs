//! TrueType label font, resolved through fontconfig and rasterized with fontdue

use std::{
    env,
    ffi::CString,
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use fontconfig::{Fontconfig, Pattern};
use fontdue::{Font, FontSettings, Metrics};
use log::{debug, warn};

/// Pixel size of region labels
pub const LABEL_SIZE: f32 = 14.0;

/// Family asked from fontconfig unless `REGIONS_FONT` names another one
const DEFAULT_FAMILY: &str = "Sans";

/// Tried when fontconfig has nothing usable
const FALLBACK_FONTS: [&str; 4] = [
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
];

/// Asks fontconfig for the file of the best match for a family name
pub fn find_font_path(family: &str) -> anyhow::Result<PathBuf> {
    let family_cstr =
        CString::new(family).with_context(|| format!("Invalid font family {family:?}"))?;
    let fc = Fontconfig::new().context("Failed to initialize fontconfig")?;

    let mut pattern = Pattern::new(&fc);
    pattern.add_string(fontconfig::FC_FAMILY, &family_cstr);
    let matched = pattern.font_match();
    let path = matched
        .filename()
        .map(PathBuf::from)
        .with_context(|| format!("No font file found for {family}"))?;
    debug!(
        "Font {family} resolved to {} ({})",
        path.display(),
        matched.get_string(fontconfig::FC_FAMILY).unwrap_or("unknown family")
    );

    Ok(path)
}

/// The coverage mask of a single character
pub(crate) struct Glyph {
    pub metrics: Metrics,
    /// One byte per pixel, row by row, `metrics.width` bytes per row
    pub coverage: Vec<u8>,
}

/// Font used for the region names
#[derive(Debug)]
pub struct LabelFont {
    font: Font,
    size: f32,
}

impl LabelFont {
    /// Loads a TrueType or OpenType font file
    pub fn from_path(path: &Path, size: f32) -> anyhow::Result<Self> {
        let data = fs::read(path)
            .with_context(|| format!("Failed to read font file {}", path.display()))?;
        let font = Font::from_bytes(data, FontSettings::default())
            .map_err(|err| anyhow::anyhow!("Failed to parse font {}: {err}", path.display()))?;

        Ok(Self { font, size })
    }

    /// Resolves a family name through fontconfig and loads the matching file
    pub fn from_family(family: &str, size: f32) -> anyhow::Result<Self> {
        let path = find_font_path(family)?;
        Self::from_path(&path, size)
    }

    /// Loads `REGIONS_FONT`, a font file or a family name, then the default sans family, then a
    /// few well known files. Without any usable font the labels are not drawn.
    pub fn load() -> Option<Self> {
        if let Ok(requested) = env::var("REGIONS_FONT") {
            match Self::from_setting(&requested) {
                Ok(font) => return Some(font),
                Err(err) => warn!("Ignoring REGIONS_FONT: {err:#}"),
            }
        }

        match Self::from_family(DEFAULT_FAMILY, LABEL_SIZE) {
            Ok(font) => return Some(font),
            Err(err) => debug!("No {DEFAULT_FAMILY} font from fontconfig: {err:#}"),
        }

        for path in FALLBACK_FONTS {
            if let Ok(font) = Self::from_path(Path::new(path), LABEL_SIZE) {
                debug!("Using font {path}");
                return Some(font);
            }
        }

        warn!("No usable font found, region names are not drawn. Set REGIONS_FONT to a font");
        None
    }

    /// A path to an existing file is loaded directly, anything else is a family name
    fn from_setting(requested: &str) -> anyhow::Result<Self> {
        let path = Path::new(requested);
        if path.is_file() {
            Self::from_path(path, LABEL_SIZE)
        } else {
            Self::from_family(requested, LABEL_SIZE)
        }
    }

    /// Distance from the top of a line to its baseline, in whole pixels
    pub(crate) fn ascent(&self) -> i32 {
        self.font
            .horizontal_line_metrics(self.size)
            .map_or(self.size, |metrics| metrics.ascent)
            .ceil() as i32
    }

    pub(crate) fn rasterize(&self, character: char) -> Glyph {
        let (metrics, coverage) = self.font.rasterize(character, self.size);
        Glyph { metrics, coverage }
    }
}
