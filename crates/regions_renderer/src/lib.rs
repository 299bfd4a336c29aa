//! Software rendering of the region overlay into a shared memory pixel buffer

use anyhow::bail;
use regions_shared::{Geometry, Region};

mod font;

pub use font::LabelFont;

/// Background of the whole overlay
pub const COLOR_BACKGROUND: Color = Color::from_rgba(0x000000AA);
/// Region outlines and labels
pub const COLOR_FOREGROUND: Color = Color::from_rgba(0xCCCCCCFF);
/// Offset of a label from the top left corner of its region
const LABEL_OFFSET: f64 = 5.0;

/// A straight alpha color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const TRANSPARENT: Color = Color::from_rgba(0);

    /// Creates a color from a `0xRRGGBBAA` value
    pub const fn from_rgba(rgba: u32) -> Self {
        Self {
            r: (rgba >> 24) as u8,
            g: (rgba >> 16) as u8,
            b: (rgba >> 8) as u8,
            a: rgba as u8,
        }
    }

    /// The color as a premultiplied ARGB8888 pixel
    ///
    /// # Example
    /// ```
    /// # use regions_renderer::Color;
    /// assert_eq!(Color::from_rgba(0x000000AA).to_argb_premultiplied(), 0xAA000000);
    /// ```
    pub const fn to_argb_premultiplied(self) -> u32 {
        self.scaled(255)
    }

    /// Premultiplied ARGB8888 pixel with the alpha scaled by `coverage`
    const fn scaled(self, coverage: u8) -> u32 {
        let a = mul_div_255(self.a as u32, coverage as u32);
        (a << 24)
            | (mul_div_255(self.r as u32, a) << 16)
            | (mul_div_255(self.g as u32, a) << 8)
            | mul_div_255(self.b as u32, a)
    }
}

const fn mul_div_255(value: u32, factor: u32) -> u32 {
    (value * factor + 127) / 255
}

/// Source over blending of two premultiplied ARGB8888 pixels
fn blend(destination: u32, source: u32) -> u32 {
    let inverse_alpha = 255 - (source >> 24);
    if inverse_alpha == 0 {
        return source;
    }
    let mut pixel = 0;
    for shift in [0, 8, 16, 24] {
        let channel = ((source >> shift) & 0xff)
            + mul_div_255((destination >> shift) & 0xff, inverse_alpha);
        pixel |= channel.min(255) << shift;
    }
    pixel
}

/// Integer pixel bounds `[x0, x1) × [y0, y1)` of a rectangle, not yet clipped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PixelRect {
    x0: i64,
    y0: i64,
    x1: i64,
    y1: i64,
}

impl PixelRect {
    fn from_geometry(geometry: &Geometry) -> Self {
        Self {
            x0: geometry.x.round() as i64,
            y0: geometry.y.round() as i64,
            x1: (geometry.x + geometry.width).round() as i64,
            y1: (geometry.y + geometry.height).round() as i64,
        }
    }

    fn is_empty(&self) -> bool {
        self.x1 <= self.x0 || self.y1 <= self.y0
    }
}

/// A premultiplied ARGB8888 image borrowed from a pixel buffer, one `u32` per pixel
#[derive(Debug)]
pub struct Canvas<'a> {
    pixels: &'a mut [u32],
    width: u32,
    height: u32,
}

impl<'a> Canvas<'a> {
    /// Wraps a buffer of at least `width * height` pixels
    pub fn new(pixels: &'a mut [u32], width: u32, height: u32) -> anyhow::Result<Self> {
        let needed = width as usize * height as usize;
        if pixels.len() < needed {
            bail!(
                "Pixel buffer holds {} pixels, {width}x{height} needs {needed}",
                pixels.len()
            );
        }
        Ok(Self {
            pixels,
            width,
            height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// The pixel at the given position, `None` outside the canvas
    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Replaces every pixel, without blending
    pub fn clear(&mut self, color: Color) {
        let pixel = color.to_argb_premultiplied();
        let len = self.width as usize * self.height as usize;
        self.pixels[..len].fill(pixel);
    }

    /// Blends a filled rectangle over the canvas
    pub fn fill_rect(&mut self, geometry: &Geometry, color: Color) {
        let rect = PixelRect::from_geometry(geometry);
        self.fill_pixels(rect, color.to_argb_premultiplied());
    }

    /// Blends a one pixel wide outline along the inner edge of the rectangle
    pub fn stroke_rect(&mut self, geometry: &Geometry, color: Color) {
        let rect = PixelRect::from_geometry(geometry);
        if rect.is_empty() {
            return;
        }
        let pixel = color.to_argb_premultiplied();
        let PixelRect { x0, y0, x1, y1 } = rect;

        self.fill_pixels(PixelRect { x0, y0, x1, y1: y0 + 1 }, pixel);
        if y1 - 1 > y0 {
            self.fill_pixels(PixelRect { x0, y0: y1 - 1, x1, y1 }, pixel);
        }
        // Vertical edges without the corners that the rows above already covered
        let inner = PixelRect { x0, y0: y0 + 1, x1: x0 + 1, y1: y1 - 1 };
        self.fill_pixels(inner, pixel);
        if x1 - 1 > x0 {
            self.fill_pixels(PixelRect { x0: x1 - 1, x1, ..inner }, pixel);
        }
    }

    /// Draws a single line of text with its top left corner at the given position
    pub fn text(&mut self, font: &LabelFont, x: f64, y: f64, text: &str, color: Color) {
        let baseline = y.round() as i64 + i64::from(font.ascent());
        let mut pen = x;
        for character in text.chars() {
            let glyph = font.rasterize(character);
            let left = pen.round() as i64 + i64::from(glyph.metrics.xmin);
            let top = baseline - glyph.metrics.height as i64 - i64::from(glyph.metrics.ymin);
            let rows = glyph.coverage.chunks(glyph.metrics.width.max(1));
            for (row, coverage) in rows.enumerate() {
                for (column, coverage) in coverage.iter().enumerate() {
                    if *coverage == 0 {
                        continue;
                    }
                    let pixel = color.scaled(*coverage);
                    self.blend_pixel(left + column as i64, top + row as i64, pixel);
                }
            }
            pen += f64::from(glyph.metrics.advance_width);
        }
    }

    fn fill_pixels(&mut self, rect: PixelRect, pixel: u32) {
        let x0 = rect.x0.clamp(0, i64::from(self.width)) as usize;
        let x1 = rect.x1.clamp(0, i64::from(self.width)) as usize;
        let y0 = rect.y0.clamp(0, i64::from(self.height)) as usize;
        let y1 = rect.y1.clamp(0, i64::from(self.height)) as usize;
        if x1 <= x0 || y1 <= y0 {
            return;
        }

        let stride = self.width as usize;
        for row in self.pixels[y0 * stride..y1 * stride].chunks_exact_mut(stride) {
            for destination in &mut row[x0..x1] {
                *destination = blend(*destination, pixel);
            }
        }
    }

    fn blend_pixel(&mut self, x: i64, y: i64, pixel: u32) {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return;
        }
        let index = y as usize * self.width as usize + x as usize;
        self.pixels[index] = blend(self.pixels[index], pixel);
    }
}

/// Draws the dimmed background, then the outline and name of every region in pixels.
/// Labels are skipped without a font.
pub fn draw_scene(canvas: &mut Canvas, regions: &[Region], font: Option<&LabelFont>) {
    canvas.clear(Color::TRANSPARENT);
    let background = Geometry::new(
        0.0,
        0.0,
        f64::from(canvas.width()),
        f64::from(canvas.height()),
    );
    canvas.fill_rect(&background, COLOR_BACKGROUND);

    for region in regions {
        let geometry = &region.geometry;
        canvas.stroke_rect(geometry, COLOR_FOREGROUND);
        if let Some(font) = font {
            canvas.text(
                font,
                geometry.x + LABEL_OFFSET,
                geometry.y + LABEL_OFFSET,
                &region.name,
                COLOR_FOREGROUND,
            );
        }
    }
}
