//! The overlay window: a layer surface covering one output that shows the regions and forwards
//! pointer and keyboard input to a [`SessionHandler`].

use std::{collections::VecDeque, os::fd::AsRawFd};

use anyhow::{Context, anyhow, bail};
use log::{debug, info, trace, warn};
use mio::Interest;
use regions_renderer::Canvas;
use regions_shared::{InputEvent, InputResponse, OutputSize, Reactor, Readiness, Timers};
use regions_wayland_protocol::{Connection, Event, ObjectId, buffer::ReadResult};

mod cursor;
mod globals;
mod seat;
mod shm;
mod surface;

use cursor::Cursor;
use globals::{Discovery, Globals, Output};
use seat::{RepeatInfo, Seat};
use surface::Surface;

/// What the window asks of the session it displays
pub trait SessionHandler {
    /// Draws a frame. The canvas covers the whole surface.
    fn draw(&mut self, canvas: &mut Canvas<'_>);

    /// Handles input in surface coordinates
    fn input(&mut self, event: InputEvent) -> InputResponse;
}

pub struct Window<H> {
    connection: Connection,
    globals: Globals,
    seat: Seat,
    cursor: Cursor,
    outputs: Vec<Output>,
    surface: Surface,
    handler: H,
    /// Decoded events that were not dispatched yet
    events: VecDeque<Event>,
    running: bool,
    error: Option<anyhow::Error>,
}

impl<H: SessionHandler + 'static> Window<H> {
    /// Connects to the compositor, binds the globals and maps the overlay on the first output
    pub fn connect(handler: H) -> anyhow::Result<Self> {
        let mut connection = Connection::connect()?;
        let registry = connection.get_registry();
        let mut events = VecDeque::new();
        connection
            .roundtrip(&mut events)
            .context("Unable to receive the globals")?;

        let mut discovery = Discovery::new(registry);
        let mut pending = VecDeque::new();
        for event in events {
            match event {
                Event::Global {
                    name,
                    interface,
                    version,
                } => discovery.add(&mut connection, name, &interface, version),
                Event::DisplayError {
                    object_id,
                    code,
                    message,
                } => return Err(display_error(object_id, code, &message)),
                event => pending.push_back(event),
            }
        }
        let (globals, seat, outputs) = discovery.finish()?;

        // Seat capabilities and output details
        connection
            .roundtrip(&mut pending)
            .context("Unable to receive the seat capabilities")?;

        let output = outputs.first().map_or(0, Output::id);
        debug!("Placing the overlay on output {output}");
        let surface = Surface::create(
            &mut connection,
            globals.compositor,
            globals.layer_shell,
            output,
        );
        let cursor = Cursor::create(&mut connection, globals.compositor);
        connection.flush()?;

        Ok(Self {
            connection,
            globals,
            seat,
            cursor,
            outputs,
            surface,
            handler,
            events: pending,
            running: false,
            error: None,
        })
    }

    /// Dispatches events until the session ends, the surface is closed or the compositor goes
    /// away
    pub fn run(&mut self) -> anyhow::Result<()> {
        let mut reactor = Reactor::new()?;
        let token = reactor.add_fd(
            self.connection.as_raw_fd(),
            Interest::READABLE,
            |window: &mut Self, readiness, timers| {
                if let Err(err) = window.handle_connection(readiness, timers) {
                    window.error = Some(err);
                    window.running = false;
                }
            },
        )?;

        self.running = true;
        self.dispatch_events(reactor.timers_mut())?;
        while self.running {
            // Wait for the socket to drain if not everything could be sent
            let interest = if self.connection.flush()? {
                Interest::READABLE
            } else {
                trace!("Compositor socket is full, flushing the rest once it is writable");
                Interest::READABLE | Interest::WRITABLE
            };
            reactor.set_interest(token, interest)?;
            reactor.poll(self)?;
            if let Some(err) = self.error.take() {
                return Err(err);
            }
        }

        Ok(())
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Unmaps the overlay and releases every object
    pub fn destroy(self) -> anyhow::Result<()> {
        let Self {
            mut connection,
            globals,
            seat,
            cursor,
            outputs,
            surface,
            ..
        } = self;

        surface.destroy(&mut connection);
        cursor.destroy(&mut connection);
        seat.destroy(&mut connection);
        for output in outputs {
            output.destroy(&mut connection);
        }
        globals.destroy(&mut connection);
        if !connection.flush()? {
            warn!("Compositor socket is full, not all objects were released");
        }

        Ok(())
    }

    fn handle_connection(
        &mut self,
        readiness: Readiness,
        timers: &mut Timers<Self>,
    ) -> anyhow::Result<()> {
        if readiness.error {
            bail!("Error on the compositor connection");
        }
        if !readiness.readable && !readiness.hangup {
            return Ok(());
        }
        let result = self.connection.read_events(&mut self.events)?;
        self.dispatch_events(timers)?;
        if result == ReadResult::EndOfStream {
            warn!("Compositor closed the connection");
            self.running = false;
        }

        Ok(())
    }

    fn dispatch_events(&mut self, timers: &mut Timers<Self>) -> anyhow::Result<()> {
        while let Some(event) = self.events.pop_front() {
            self.dispatch(event, timers)?;
        }
        Ok(())
    }

    fn dispatch(&mut self, event: Event, timers: &mut Timers<Self>) -> anyhow::Result<()> {
        match event {
            Event::DisplayError {
                object_id,
                code,
                message,
            } => return Err(display_error(object_id, code, &message)),
            Event::Global {
                name,
                interface,
                version,
            } => {
                if interface == "wl_output" {
                    let output =
                        Output::bind(&mut self.connection, self.globals.registry, name, version);
                    self.outputs.push(output);
                } else {
                    debug!("Ignoring late global {interface} ({name})");
                }
            }
            Event::GlobalRemove { name } => {
                if let Some(index) = self.outputs.iter().position(|o| o.global() == name) {
                    let output = self.outputs.remove(index);
                    info!("Output {} went away", output.name().unwrap_or("without a name"));
                    output.destroy(&mut self.connection);
                }
            }
            Event::CallbackDone { callback, .. } => {
                if self.surface.is_frame_callback(callback) {
                    self.frame_done()?;
                }
            }
            Event::BufferRelease { buffer } => self.buffer_released(buffer)?,
            Event::SeatCapabilities { seat, capabilities } => {
                self.seat
                    .set_capabilities(&mut self.connection, seat, capabilities);
            }
            Event::PointerEnter { serial, .. } => self.pointer_enter(serial),
            Event::PointerMotion { x, y, .. } => {
                self.seat.pointer_frame.motion = Some((x, y));
                if !self.seat.has_pointer_frames(&self.connection) {
                    self.pointer_frame();
                }
            }
            Event::PointerButton { state, .. } => {
                self.seat.pointer_frame.button = Some(state);
                if !self.seat.has_pointer_frames(&self.connection) {
                    self.pointer_frame();
                }
            }
            Event::PointerFrame => self.pointer_frame(),
            Event::KeyboardKey { key, state, .. } => self.keyboard_key(key, state, timers),
            Event::KeyboardRepeatInfo { rate, delay } => {
                self.seat.repeat = RepeatInfo::new(rate, delay);
            }
            Event::OutputGeometry { .. } | Event::OutputScale { .. } => {
                if self.running {
                    self.damage();
                }
            }
            Event::OutputName { output, name } => {
                if let Some(output) = self.outputs.iter_mut().find(|o| o.id() == output) {
                    info!("Output {name} is available");
                    output.set_name(name);
                }
            }
            Event::LayerSurfaceConfigure {
                serial,
                width,
                height,
                ..
            } => self.configure(serial, OutputSize::new(width, height))?,
            Event::LayerSurfaceClosed { .. } => {
                info!("Compositor closed the overlay");
                self.running = false;
            }
            event => trace!("Unhandled event {event:?}"),
        }

        Ok(())
    }

    /// Hands the event to the session and applies its response
    fn input(&mut self, event: InputEvent) {
        let response = self.handler.input(event);
        if response.end_session && self.running {
            debug!("Session ended by {event:?}");
            self.running = false;
        }
        if response.redraw {
            self.damage();
        }
    }
}

fn display_error(object_id: ObjectId, code: u32, message: &str) -> anyhow::Error {
    anyhow!("Compositor error {code} on object {object_id}: {message}")
}
