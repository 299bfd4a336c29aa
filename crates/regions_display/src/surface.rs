use anyhow::Context;
use log::{debug, trace, warn};
use regions_renderer::Canvas;
use regions_shared::OutputSize;
use regions_wayland_protocol::{
    Connection, Interface, ObjectId,
    protocols::wlr_layer_shell::{
        ZWLR_LAYER_SHELL_V1_LAYER_TOP, ZWLR_LAYER_SURFACE_V1_ANCHOR_BOTTOM,
        ZWLR_LAYER_SURFACE_V1_ANCHOR_LEFT, ZWLR_LAYER_SURFACE_V1_ANCHOR_RIGHT,
        ZWLR_LAYER_SURFACE_V1_ANCHOR_TOP, ZWLR_LAYER_SURFACE_V1_KEYBOARD_INTERACTIVITY_EXCLUSIVE,
    },
};

use crate::{SessionHandler, Window, shm::BufferPool};

const NAMESPACE: &str = "regions";
const CALLBACK_VERSION: u32 = 1;

/// The overlay's layer surface and its frame scheduling state
#[derive(Debug)]
pub struct Surface {
    surface: ObjectId,
    layer_surface: ObjectId,
    size: OutputSize,
    /// Something changed since the last frame was drawn
    dirty: bool,
    /// A frame callback was requested and has not fired yet
    frame_pending: bool,
    frame_callback: Option<ObjectId>,
    /// A frame was due but had no buffer to draw into. It is drawn on the next buffer release
    /// or damage.
    stalled: bool,
    pub buffers: BufferPool,
}

impl Surface {
    /// Creates a layer surface on the top layer that spans the whole output. `output` 0 lets the
    /// compositor choose.
    pub fn create(
        connection: &mut Connection,
        compositor: ObjectId,
        layer_shell: ObjectId,
        output: ObjectId,
    ) -> Self {
        let surface = connection.new_object(Interface::WlSurface, connection.version(compositor));
        let layer_surface = connection.new_object(
            Interface::ZwlrLayerSurfaceV1,
            connection.version(layer_shell),
        );

        let writer = connection.writer();
        writer.wl_compositor_create_surface(compositor, surface);
        writer.zwlr_layer_shell_v1_get_layer_surface(
            layer_shell,
            layer_surface,
            surface,
            output,
            ZWLR_LAYER_SHELL_V1_LAYER_TOP,
            NAMESPACE,
        );
        writer.zwlr_layer_surface_v1_set_size(layer_surface, 0, 0);
        writer.zwlr_layer_surface_v1_set_anchor(
            layer_surface,
            ZWLR_LAYER_SURFACE_V1_ANCHOR_TOP
                | ZWLR_LAYER_SURFACE_V1_ANCHOR_RIGHT
                | ZWLR_LAYER_SURFACE_V1_ANCHOR_BOTTOM
                | ZWLR_LAYER_SURFACE_V1_ANCHOR_LEFT,
        );
        writer.zwlr_layer_surface_v1_set_exclusive_zone(layer_surface, 0);
        writer.zwlr_layer_surface_v1_set_keyboard_interactivity(
            layer_surface,
            ZWLR_LAYER_SURFACE_V1_KEYBOARD_INTERACTIVITY_EXCLUSIVE,
        );
        writer.wl_surface_commit(surface);

        Self {
            surface,
            layer_surface,
            size: OutputSize::default(),
            dirty: false,
            frame_pending: false,
            frame_callback: None,
            stalled: false,
            buffers: BufferPool::default(),
        }
    }

    /// The size of the last configure, `None` before the first one
    pub fn size(&self) -> Option<OutputSize> {
        (!self.size.is_empty()).then_some(self.size)
    }

    pub fn is_frame_callback(&self, callback: ObjectId) -> bool {
        self.frame_callback == Some(callback)
    }

    /// Marks the surface dirty. Returns `true` if a frame callback has to be requested.
    fn mark_dirty(&mut self) -> bool {
        if self.size().is_none() {
            return false;
        }
        self.dirty = true;
        !self.frame_pending
    }

    /// Handles a fired frame callback. Returns `true` if the dirty surface has to be drawn now,
    /// together with a new frame callback.
    fn frame_done(&mut self) -> bool {
        self.frame_callback = None;
        self.frame_pending = false;
        if !self.dirty {
            return false;
        }
        self.dirty = false;
        true
    }

    fn request_frame(&mut self, connection: &mut Connection) {
        let callback = connection.new_object(Interface::WlCallback, CALLBACK_VERSION);
        connection.writer().wl_surface_frame(self.surface, callback);
        self.frame_callback = Some(callback);
        self.frame_pending = true;
    }

    pub fn destroy(mut self, connection: &mut Connection) {
        self.buffers.destroy(connection);
        let writer = connection.writer();
        writer.zwlr_layer_surface_v1_destroy(self.layer_surface);
        writer.wl_surface_destroy(self.surface);
    }
}

impl<H: SessionHandler + 'static> Window<H> {
    /// Stores the new size, acknowledges it and draws right away
    pub(crate) fn configure(&mut self, serial: u32, size: OutputSize) -> anyhow::Result<()> {
        debug!("Configured to {}x{}", size.width, size.height);
        self.surface.size = size;
        self.connection
            .writer()
            .zwlr_layer_surface_v1_ack_configure(self.surface.layer_surface, serial);
        self.render_frame()
    }

    /// Schedules a redraw for the next frame callback. A stalled frame is retried right away.
    pub(crate) fn damage(&mut self) {
        if self.surface.stalled {
            if let Err(err) = self.render_frame() {
                warn!("Unable to draw the overlay: {err:#}");
            }
            return;
        }
        if self.surface.mark_dirty() {
            self.surface.request_frame(&mut self.connection);
            self.connection
                .writer()
                .wl_surface_commit(self.surface.surface);
        }
    }

    pub(crate) fn frame_done(&mut self) -> anyhow::Result<()> {
        if !self.surface.frame_done() {
            return Ok(());
        }
        self.surface.request_frame(&mut self.connection);
        self.render_frame()
    }

    /// Returns the buffer to the pool and draws the frame that was waiting for it
    pub(crate) fn buffer_released(&mut self, buffer: ObjectId) -> anyhow::Result<()> {
        self.surface.buffers.release(buffer);
        if self.surface.stalled {
            trace!("Buffer {buffer} released, drawing the stalled frame");
            return self.render_frame();
        }
        Ok(())
    }

    /// Draws into the next free buffer and commits it. Without a free buffer the frame stalls
    /// until a buffer is released. Failing to allocate the very first buffer is an error.
    fn render_frame(&mut self) -> anyhow::Result<()> {
        let Some(size) = self.surface.size() else {
            return Ok(());
        };
        let allocated = self.surface.buffers.has_allocated();
        let buffer = match self
            .surface
            .buffers
            .next_buffer(&mut self.connection, self.globals.shm, size)
        {
            Ok(Some(buffer)) => buffer,
            Ok(None) => {
                trace!("No free buffer, waiting for a release");
                self.surface.stalled = true;
                return Ok(());
            }
            Err(err) if allocated => {
                debug!("Skipping frame: {err:#}");
                self.surface.stalled = true;
                return Ok(());
            }
            Err(err) => return Err(err).context("Unable to allocate the first buffer"),
        };

        let mut canvas = Canvas::new(buffer.pixels_mut(), size.width, size.height)?;
        self.handler.draw(&mut canvas);
        let buffer = buffer.id();

        let surface = self.surface.surface;
        let writer = self.connection.writer();
        writer.wl_surface_attach(surface, buffer, 0, 0);
        writer.wl_surface_damage_buffer(surface, 0, 0, i32::MAX, i32::MAX);
        writer.wl_surface_commit(surface);
        self.surface.stalled = false;

        Ok(())
    }
}
