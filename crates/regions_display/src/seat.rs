use std::time::Duration;

use log::{debug, trace};
use regions_shared::{InputEvent, Key, TimerHandle, Timers};
use regions_wayland_protocol::{
    Connection, Interface, ObjectId,
    protocols::wayland::{
        WL_KEYBOARD_KEY_STATE_PRESSED, WL_POINTER_BUTTON_STATE_PRESSED,
        WL_POINTER_BUTTON_STATE_RELEASED, WL_POINTER_FRAME_SINCE_VERSION,
        WL_SEAT_CAPABILITY_KEYBOARD, WL_SEAT_CAPABILITY_POINTER,
    },
};

use crate::{SessionHandler, Window};

/// First version of `wl_pointer` and `wl_keyboard` with a release request
const RELEASE_SINCE_VERSION: u32 = 3;
/// First version of `wl_seat` with a release request
const SEAT_RELEASE_SINCE_VERSION: u32 = 5;

/// Pointer events received since the last `wl_pointer.frame`
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct PointerFrame {
    /// Last reported position in surface coordinates
    pub motion: Option<(f64, f64)>,
    /// Last reported button state
    pub button: Option<u32>,
}

impl PointerFrame {
    /// Turns the accumulated events into editor input: the motion first, then the button at the
    /// (possibly just updated) pointer position. Positions are truncated to whole pixels.
    pub fn into_input(self, position: &mut (f64, f64)) -> Vec<InputEvent> {
        let mut input = Vec::with_capacity(2);
        if let Some((x, y)) = self.motion {
            *position = (x.trunc(), y.trunc());
            input.push(InputEvent::PointerMotion {
                x: position.0,
                y: position.1,
            });
        }
        let (x, y) = *position;
        match self.button {
            Some(WL_POINTER_BUTTON_STATE_PRESSED) => input.push(InputEvent::ButtonPress { x, y }),
            Some(WL_POINTER_BUTTON_STATE_RELEASED) => {
                input.push(InputEvent::ButtonRelease { x, y })
            }
            _ => {}
        }
        input
    }
}

/// Key repeat settings announced by the compositor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeatInfo {
    /// Time between repeated keys, `None` disables repeating
    pub period: Option<Duration>,
    /// Time from the key press to the first repeat
    pub delay: Duration,
}

impl Default for RepeatInfo {
    fn default() -> Self {
        Self {
            period: None,
            delay: Duration::ZERO,
        }
    }
}

impl RepeatInfo {
    /// Converts `wl_keyboard.repeat_info`, a rate in keys per second and a delay in ms
    pub fn new(rate: i32, delay: i32) -> Self {
        let period = u64::try_from(rate)
            .ok()
            .filter(|rate| *rate > 0)
            .map(|rate| Duration::from_millis(1_000 / rate));
        Self {
            period,
            delay: Duration::from_millis(u64::try_from(delay).unwrap_or(0)),
        }
    }
}

#[derive(Debug)]
pub struct Seat {
    seat: ObjectId,
    pointer: Option<ObjectId>,
    keyboard: Option<ObjectId>,
    pub pointer_frame: PointerFrame,
    pub pointer_position: (f64, f64),
    pub repeat: RepeatInfo,
    pub repeat_timer: Option<TimerHandle>,
}

impl Seat {
    pub fn new(seat: ObjectId) -> Self {
        Self {
            seat,
            pointer: None,
            keyboard: None,
            pointer_frame: PointerFrame::default(),
            pointer_position: (0.0, 0.0),
            repeat: RepeatInfo::default(),
            repeat_timer: None,
        }
    }

    pub fn id(&self) -> ObjectId {
        self.seat
    }

    /// Whether the compositor groups pointer events with `wl_pointer.frame`
    pub fn has_pointer_frames(&self, connection: &Connection) -> bool {
        connection.version(self.seat) >= WL_POINTER_FRAME_SINCE_VERSION
    }

    /// Drops the current devices and creates new ones for the capabilities announced by `seat`.
    /// Announcements of other seats are ignored.
    pub fn set_capabilities(
        &mut self,
        connection: &mut Connection,
        seat: ObjectId,
        capabilities: u32,
    ) {
        if seat != self.seat {
            trace!("Ignoring capabilities of unused seat {seat}");
            return;
        }
        self.release_devices(connection);

        let version = connection.version(self.seat);
        if capabilities & WL_SEAT_CAPABILITY_POINTER != 0 {
            let pointer = connection.new_object(Interface::WlPointer, version);
            connection.writer().wl_seat_get_pointer(self.seat, pointer);
            self.pointer = Some(pointer);
        }
        if capabilities & WL_SEAT_CAPABILITY_KEYBOARD != 0 {
            let keyboard = connection.new_object(Interface::WlKeyboard, version);
            connection.writer().wl_seat_get_keyboard(self.seat, keyboard);
            self.keyboard = Some(keyboard);
        }
        debug!(
            "Seat capabilities {capabilities:#x}, pointer {:?}, keyboard {:?}",
            self.pointer, self.keyboard
        );
    }

    fn release_devices(&mut self, connection: &mut Connection) {
        self.pointer_frame = PointerFrame::default();
        if let Some(timer) = self.repeat_timer.take() {
            timer.cancel();
        }
        if let Some(pointer) = self.pointer.take() {
            if connection.version(pointer) >= RELEASE_SINCE_VERSION {
                connection.writer().wl_pointer_release(pointer);
            }
        }
        if let Some(keyboard) = self.keyboard.take() {
            if connection.version(keyboard) >= RELEASE_SINCE_VERSION {
                connection.writer().wl_keyboard_release(keyboard);
            }
        }
    }

    pub fn destroy(mut self, connection: &mut Connection) {
        self.release_devices(connection);
        if connection.version(self.seat) >= SEAT_RELEASE_SINCE_VERSION {
            connection.writer().wl_seat_release(self.seat);
        }
    }
}

impl<H: SessionHandler + 'static> Window<H> {
    /// Sets the cursor image for the pointer that entered the overlay
    pub(crate) fn pointer_enter(&mut self, serial: u32) {
        if let Some(pointer) = self.seat.pointer {
            self.cursor
                .show(&mut self.connection, self.globals.shm, pointer, serial);
        }
    }

    /// Delivers the pointer events collected since the last frame
    pub(crate) fn pointer_frame(&mut self) {
        let frame = std::mem::take(&mut self.seat.pointer_frame);
        for event in frame.into_input(&mut self.seat.pointer_position) {
            self.input(event);
        }
        self.damage();
    }

    /// Handles a key press or release. A press starts the repeat timer, any key event stops the
    /// running one.
    pub(crate) fn keyboard_key(&mut self, key: u32, state: u32, timers: &mut Timers<Self>) {
        let pressed = state == WL_KEYBOARD_KEY_STATE_PRESSED;
        if pressed {
            self.input(InputEvent::Key(Key::from_evdev(key)));
        }

        if let Some(timer) = self.seat.repeat_timer.take() {
            timer.cancel();
        }
        if !pressed {
            return;
        }
        if let Some(period) = self.seat.repeat.period {
            let timer = timers.add(self.seat.repeat.delay, move |window: &mut Self, timers| {
                window.repeat_key(key, period, timers);
            });
            self.seat.repeat_timer = Some(timer);
        }
    }

    fn repeat_key(&mut self, key: u32, period: Duration, timers: &mut Timers<Self>) {
        let timer = timers.add(period, move |window: &mut Self, timers| {
            window.repeat_key(key, period, timers);
        });
        self.seat.repeat_timer = Some(timer);
        self.input(InputEvent::Key(Key::from_evdev(key)));
    }
}
