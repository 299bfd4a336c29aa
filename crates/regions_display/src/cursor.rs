//! The pointer image shown while the pointer is over the overlay, taken from the xcursor theme

use std::{env, fs};

use anyhow::Context;
use log::{debug, warn};
use regions_shared::OutputSize;
use regions_wayland_protocol::{Connection, Interface, ObjectId};
use xcursor::{CursorTheme, parser::parse_xcursor};

use crate::shm::ShmBuffer;

const CURSOR_NAME: &str = "left_ptr";
const DEFAULT_THEME: &str = "default";
const DEFAULT_SIZE: u32 = 24;
/// First version of `wl_surface` with `set_buffer_scale`
const BUFFER_SCALE_SINCE_VERSION: u32 = 3;

/// A decoded cursor image in premultiplied ARGB
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorImage {
    pub width: u32,
    pub height: u32,
    pub hotspot: (i32, i32),
    pub pixels: Vec<u32>,
}

impl CursorImage {
    /// Looks up `left_ptr` in `XCURSOR_THEME` at `XCURSOR_SIZE`
    pub fn load() -> anyhow::Result<Self> {
        let theme = env::var("XCURSOR_THEME").unwrap_or_else(|_| DEFAULT_THEME.to_owned());
        let size = env::var("XCURSOR_SIZE")
            .ok()
            .and_then(|size| size.parse().ok())
            .filter(|size| *size > 0)
            .unwrap_or(DEFAULT_SIZE);

        let path = CursorTheme::load(&theme)
            .load_icon(CURSOR_NAME)
            .with_context(|| format!("Cursor theme {theme} has no {CURSOR_NAME}"))?;
        let data = fs::read(&path)
            .with_context(|| format!("Failed to read cursor file {}", path.display()))?;
        debug!("Using cursor {} at size {size}", path.display());

        Self::parse(&data, size)
    }

    /// Decodes an xcursor file and picks the image closest to the nominal size
    pub fn parse(data: &[u8], size: u32) -> anyhow::Result<Self> {
        let images = parse_xcursor(data).context("Not an xcursor file")?;
        let image = images
            .iter()
            .min_by_key(|image| image.size.abs_diff(size))
            .context("Cursor file contains no images")?;

        let pixels = image
            .pixels_rgba
            .chunks_exact(4)
            .map(|rgba| {
                let [r, g, b, a] = [rgba[0], rgba[1], rgba[2], rgba[3]].map(u32::from);
                (a << 24) | (r << 16) | (g << 8) | b
            })
            .collect::<Vec<_>>();
        if pixels.len() != image.width as usize * image.height as usize {
            anyhow::bail!(
                "Cursor image has {} pixels, expected {}x{}",
                pixels.len(),
                image.width,
                image.height
            );
        }

        Ok(Self {
            width: image.width,
            height: image.height,
            hotspot: (
                i32::try_from(image.xhot).unwrap_or(0),
                i32::try_from(image.yhot).unwrap_or(0),
            ),
            pixels,
        })
    }
}

/// The cursor surface and the buffer holding the image. The image is loaded the first time the
/// pointer enters the overlay.
#[derive(Debug)]
pub struct Cursor {
    surface: ObjectId,
    buffer: Option<(ShmBuffer, (i32, i32))>,
    /// Loading failed once, the compositor's cursor stays
    unavailable: bool,
}

impl Cursor {
    pub fn create(connection: &mut Connection, compositor: ObjectId) -> Self {
        let surface = connection.new_object(Interface::WlSurface, connection.version(compositor));
        connection
            .writer()
            .wl_compositor_create_surface(compositor, surface);
        Self {
            surface,
            buffer: None,
            unavailable: false,
        }
    }

    /// Shows the cursor for the pointer that just entered the overlay
    pub fn show(
        &mut self,
        connection: &mut Connection,
        shm: ObjectId,
        pointer: ObjectId,
        serial: u32,
    ) {
        if self.buffer.is_none() && !self.unavailable {
            match CursorImage::load().and_then(|image| upload(connection, shm, &image)) {
                Ok(buffer) => self.buffer = Some(buffer),
                Err(err) => {
                    warn!("Keeping the compositor's cursor: {err:#}");
                    self.unavailable = true;
                }
            }
        }
        let Some((buffer, (hotspot_x, hotspot_y))) = &self.buffer else {
            return;
        };

        let set_scale = connection.version(self.surface) >= BUFFER_SCALE_SINCE_VERSION;
        let writer = connection.writer();
        if set_scale {
            writer.wl_surface_set_buffer_scale(self.surface, 1);
        }
        writer.wl_surface_attach(self.surface, buffer.id(), 0, 0);
        writer.wl_pointer_set_cursor(pointer, serial, self.surface, *hotspot_x, *hotspot_y);
        writer.wl_surface_damage_buffer(self.surface, 0, 0, i32::MAX, i32::MAX);
        writer.wl_surface_commit(self.surface);
    }

    pub fn destroy(self, connection: &mut Connection) {
        if let Some((buffer, _)) = self.buffer {
            buffer.destroy(connection);
        }
        connection.writer().wl_surface_destroy(self.surface);
    }
}

/// Copies the image into a new shm buffer
fn upload(
    connection: &mut Connection,
    shm: ObjectId,
    image: &CursorImage,
) -> anyhow::Result<(ShmBuffer, (i32, i32))> {
    let size = OutputSize::new(image.width, image.height);
    let mut buffer = ShmBuffer::create(connection, shm, size)?;
    buffer.pixels_mut().copy_from_slice(&image.pixels);
    Ok((buffer, image.hotspot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixStream;

    const IMAGE_TYPE: u32 = 0xfffd_0002;

    fn push(data: &mut Vec<u8>, value: u32) {
        data.extend_from_slice(&value.to_le_bytes());
    }

    /// Builds an xcursor file with one 2x1 image per nominal size. The second pixel is a grey
    /// whose channels hold the nominal size.
    fn xcursor_file(sizes: &[u32]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(b"Xcur");
        push(&mut data, 16);
        push(&mut data, 0x1_0000);
        push(&mut data, sizes.len() as u32);

        let image_len = 36 + 2 * 4;
        let first_image = 16 + 12 * sizes.len() as u32;
        for (index, size) in sizes.iter().enumerate() {
            push(&mut data, IMAGE_TYPE);
            push(&mut data, *size);
            push(&mut data, first_image + index as u32 * image_len);
        }
        for size in sizes {
            push(&mut data, 36);
            push(&mut data, IMAGE_TYPE);
            push(&mut data, *size);
            push(&mut data, 1);
            push(&mut data, 2);
            push(&mut data, 1);
            push(&mut data, 1);
            push(&mut data, 0);
            push(&mut data, 0);
            push(&mut data, 0xFF10_2030);
            push(&mut data, 0xFF00_0000 | size * 0x01_0101);
        }
        data
    }

    #[test]
    fn image_closest_to_the_size_is_used() {
        let image = CursorImage::parse(&xcursor_file(&[16, 24, 32]), 22).unwrap();
        assert_eq!((image.width, image.height), (2, 1));
        assert_eq!(image.hotspot, (1, 0));
        assert_eq!(image.pixels, [0xFF10_2030, 0xFF18_1818]);
    }

    #[test]
    fn garbage_is_not_a_cursor() {
        assert!(CursorImage::parse(b"definitely not a cursor", 24).is_err());
    }

    #[test]
    fn cursor_is_attached_to_its_own_surface() {
        let (_server, client) = UnixStream::pair().unwrap();
        let mut connection = Connection::from_stream(client).unwrap();
        let compositor = connection.new_object(Interface::WlCompositor, 4);
        let shm = connection.new_object(Interface::WlShm, 1);
        let pointer = connection.new_object(Interface::WlPointer, 7);

        let mut cursor = Cursor::create(&mut connection, compositor);
        let image = CursorImage {
            width: 2,
            height: 2,
            hotspot: (1, 1),
            pixels: vec![0xFFFF_FFFF; 4],
        };
        cursor.buffer = Some(upload(&mut connection, shm, &image).unwrap());
        let before = connection.writer().pending().len();

        cursor.show(&mut connection, shm, pointer, 9);
        // set_buffer_scale, attach, set_cursor, damage_buffer, commit
        let written = connection.writer().pending().len() - before;
        assert_eq!(written, 12 + 20 + 24 + 24 + 8);
        assert_eq!(connection.version(cursor.surface), 4);

        cursor.destroy(&mut connection);
    }
}
