use std::os::fd::RawFd;

use crate::{ObjectId, Opcode, buffer::Writer, registry::Interface};

// wl_display
pub const WL_DISPLAY_SYNC: Opcode = 0;
pub const WL_DISPLAY_GET_REGISTRY: Opcode = 1;
pub const WL_DISPLAY_ERROR: Opcode = 0;
pub const WL_DISPLAY_DELETE_ID: Opcode = 1;

// wl_registry
pub const WL_REGISTRY_BIND: Opcode = 0;
pub const WL_REGISTRY_GLOBAL: Opcode = 0;
pub const WL_REGISTRY_GLOBAL_REMOVE: Opcode = 1;

// wl_callback
pub const WL_CALLBACK_DONE: Opcode = 0;

// wl_compositor
pub const WL_COMPOSITOR_CREATE_SURFACE: Opcode = 0;

// wl_surface
pub const WL_SURFACE_DESTROY: Opcode = 0;
pub const WL_SURFACE_ATTACH: Opcode = 1;
pub const WL_SURFACE_FRAME: Opcode = 3;
pub const WL_SURFACE_COMMIT: Opcode = 6;
pub const WL_SURFACE_SET_BUFFER_SCALE: Opcode = 8;
pub const WL_SURFACE_DAMAGE_BUFFER: Opcode = 9;
pub const WL_SURFACE_ENTER: Opcode = 0;
pub const WL_SURFACE_LEAVE: Opcode = 1;

// wl_shm
pub const WL_SHM_CREATE_POOL: Opcode = 0;
pub const WL_SHM_FORMAT: Opcode = 0;
pub const WL_SHM_FORMAT_ARGB8888: u32 = 0;

// wl_shm_pool
pub const WL_SHM_POOL_CREATE_BUFFER: Opcode = 0;
pub const WL_SHM_POOL_DESTROY: Opcode = 1;

// wl_buffer
pub const WL_BUFFER_DESTROY: Opcode = 0;
pub const WL_BUFFER_RELEASE: Opcode = 0;

// wl_seat
pub const WL_SEAT_GET_POINTER: Opcode = 0;
pub const WL_SEAT_GET_KEYBOARD: Opcode = 1;
pub const WL_SEAT_RELEASE: Opcode = 3;
pub const WL_SEAT_CAPABILITIES: Opcode = 0;
pub const WL_SEAT_NAME: Opcode = 1;
pub const WL_SEAT_CAPABILITY_POINTER: u32 = 1;
pub const WL_SEAT_CAPABILITY_KEYBOARD: u32 = 2;

// wl_pointer
pub const WL_POINTER_SET_CURSOR: Opcode = 0;
pub const WL_POINTER_RELEASE: Opcode = 1;
pub const WL_POINTER_ENTER: Opcode = 0;
pub const WL_POINTER_LEAVE: Opcode = 1;
pub const WL_POINTER_MOTION: Opcode = 2;
pub const WL_POINTER_BUTTON: Opcode = 3;
pub const WL_POINTER_AXIS: Opcode = 4;
pub const WL_POINTER_FRAME: Opcode = 5;
pub const WL_POINTER_BUTTON_STATE_RELEASED: u32 = 0;
pub const WL_POINTER_BUTTON_STATE_PRESSED: u32 = 1;
/// First version that groups pointer events with `wl_pointer.frame`
pub const WL_POINTER_FRAME_SINCE_VERSION: u32 = 5;

// wl_keyboard
pub const WL_KEYBOARD_RELEASE: Opcode = 0;
pub const WL_KEYBOARD_KEYMAP: Opcode = 0;
pub const WL_KEYBOARD_ENTER: Opcode = 1;
pub const WL_KEYBOARD_LEAVE: Opcode = 2;
pub const WL_KEYBOARD_KEY: Opcode = 3;
pub const WL_KEYBOARD_MODIFIERS: Opcode = 4;
pub const WL_KEYBOARD_REPEAT_INFO: Opcode = 5;
pub const WL_KEYBOARD_KEY_STATE_RELEASED: u32 = 0;
pub const WL_KEYBOARD_KEY_STATE_PRESSED: u32 = 1;

// wl_output
pub const WL_OUTPUT_RELEASE: Opcode = 0;
pub const WL_OUTPUT_GEOMETRY: Opcode = 0;
pub const WL_OUTPUT_MODE: Opcode = 1;
pub const WL_OUTPUT_DONE: Opcode = 2;
pub const WL_OUTPUT_SCALE: Opcode = 3;
pub const WL_OUTPUT_NAME: Opcode = 4;
pub const WL_OUTPUT_DESCRIPTION: Opcode = 5;

/// Versions of objects that are not bound through the registry, but created by a request on a
/// bound object, follow the version of their parent
pub(crate) const WL_REGISTRY_VERSION: u32 = 1;
pub(crate) const WL_CALLBACK_VERSION: u32 = 1;

impl Writer {
    pub fn wl_display_sync(&mut self, display: ObjectId, callback: ObjectId) {
        self.start_message(display, WL_DISPLAY_SYNC);
        self.write_u32(callback);
        self.write_message_length();
    }

    pub fn wl_display_get_registry(&mut self, display: ObjectId, registry: ObjectId) {
        self.start_message(display, WL_DISPLAY_GET_REGISTRY);
        self.write_u32(registry);
        self.write_message_length();
    }

    /// Binds a global with an untyped new id, which carries the interface name and version
    pub fn wl_registry_bind(
        &mut self,
        registry: ObjectId,
        name: u32,
        interface: Interface,
        version: u32,
        id: ObjectId,
    ) {
        self.start_message(registry, WL_REGISTRY_BIND);
        self.write_u32(name);
        self.write_str(interface.name());
        self.write_u32(version);
        self.write_u32(id);
        self.write_message_length();
    }

    pub fn wl_compositor_create_surface(&mut self, compositor: ObjectId, surface: ObjectId) {
        self.start_message(compositor, WL_COMPOSITOR_CREATE_SURFACE);
        self.write_u32(surface);
        self.write_message_length();
    }

    pub fn wl_surface_destroy(&mut self, surface: ObjectId) {
        self.start_message(surface, WL_SURFACE_DESTROY);
        self.write_message_length();
    }

    pub fn wl_surface_attach(&mut self, surface: ObjectId, buffer: ObjectId, x: i32, y: i32) {
        self.start_message(surface, WL_SURFACE_ATTACH);
        self.write_u32(buffer);
        self.write_i32(x);
        self.write_i32(y);
        self.write_message_length();
    }

    pub fn wl_surface_frame(&mut self, surface: ObjectId, callback: ObjectId) {
        self.start_message(surface, WL_SURFACE_FRAME);
        self.write_u32(callback);
        self.write_message_length();
    }

    pub fn wl_surface_commit(&mut self, surface: ObjectId) {
        self.start_message(surface, WL_SURFACE_COMMIT);
        self.write_message_length();
    }

    /// Available since version 3
    pub fn wl_surface_set_buffer_scale(&mut self, surface: ObjectId, scale: i32) {
        self.start_message(surface, WL_SURFACE_SET_BUFFER_SCALE);
        self.write_i32(scale);
        self.write_message_length();
    }

    pub fn wl_surface_damage_buffer(
        &mut self,
        surface: ObjectId,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    ) {
        self.start_message(surface, WL_SURFACE_DAMAGE_BUFFER);
        self.write_i32(x);
        self.write_i32(y);
        self.write_i32(width);
        self.write_i32(height);
        self.write_message_length();
    }

    pub fn wl_shm_create_pool(&mut self, shm: ObjectId, pool: ObjectId, fd: RawFd, size: i32) {
        self.start_message(shm, WL_SHM_CREATE_POOL);
        self.write_u32(pool);
        self.write_fd(fd);
        self.write_i32(size);
        self.write_message_length();
    }

    #[allow(clippy::too_many_arguments)]
    pub fn wl_shm_pool_create_buffer(
        &mut self,
        pool: ObjectId,
        buffer: ObjectId,
        offset: i32,
        width: i32,
        height: i32,
        stride: i32,
        format: u32,
    ) {
        self.start_message(pool, WL_SHM_POOL_CREATE_BUFFER);
        self.write_u32(buffer);
        self.write_i32(offset);
        self.write_i32(width);
        self.write_i32(height);
        self.write_i32(stride);
        self.write_u32(format);
        self.write_message_length();
    }

    pub fn wl_shm_pool_destroy(&mut self, pool: ObjectId) {
        self.start_message(pool, WL_SHM_POOL_DESTROY);
        self.write_message_length();
    }

    pub fn wl_buffer_destroy(&mut self, buffer: ObjectId) {
        self.start_message(buffer, WL_BUFFER_DESTROY);
        self.write_message_length();
    }

    pub fn wl_seat_get_pointer(&mut self, seat: ObjectId, pointer: ObjectId) {
        self.start_message(seat, WL_SEAT_GET_POINTER);
        self.write_u32(pointer);
        self.write_message_length();
    }

    pub fn wl_seat_get_keyboard(&mut self, seat: ObjectId, keyboard: ObjectId) {
        self.start_message(seat, WL_SEAT_GET_KEYBOARD);
        self.write_u32(keyboard);
        self.write_message_length();
    }

    pub fn wl_seat_release(&mut self, seat: ObjectId) {
        self.start_message(seat, WL_SEAT_RELEASE);
        self.write_message_length();
    }

    pub fn wl_pointer_set_cursor(
        &mut self,
        pointer: ObjectId,
        serial: u32,
        surface: ObjectId,
        hotspot_x: i32,
        hotspot_y: i32,
    ) {
        self.start_message(pointer, WL_POINTER_SET_CURSOR);
        self.write_u32(serial);
        self.write_u32(surface);
        self.write_i32(hotspot_x);
        self.write_i32(hotspot_y);
        self.write_message_length();
    }

    pub fn wl_pointer_release(&mut self, pointer: ObjectId) {
        self.start_message(pointer, WL_POINTER_RELEASE);
        self.write_message_length();
    }

    pub fn wl_keyboard_release(&mut self, keyboard: ObjectId) {
        self.start_message(keyboard, WL_KEYBOARD_RELEASE);
        self.write_message_length();
    }

    pub fn wl_output_release(&mut self, output: ObjectId) {
        self.start_message(output, WL_OUTPUT_RELEASE);
        self.write_message_length();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_carries_interface_and_version() {
        let mut writer = Writer::new(-1);
        writer.wl_registry_bind(2, 9, Interface::WlSeat, 7, 5);

        let bytes = writer.pending();
        // header, name, string length, "wl_seat\0", version, id
        assert_eq!(bytes.len(), 8 + 4 + 4 + 8 + 4 + 4);
        assert_eq!(&bytes[16..24], b"wl_seat\0");
        assert_eq!(&bytes[24..28], &7u32.to_ne_bytes());
        assert_eq!(&bytes[28..32], &5u32.to_ne_bytes());
    }

    #[test]
    fn requests_are_appended_in_order() {
        let mut writer = Writer::new(-1);
        writer.wl_surface_attach(3, 0, 0, 0);
        writer.wl_surface_damage_buffer(3, 0, 0, i32::MAX, i32::MAX);
        writer.wl_surface_commit(3);

        let bytes = writer.pending();
        assert_eq!(bytes.len(), 20 + 24 + 8);
        let commit = u32::from_ne_bytes(bytes[48..52].try_into().unwrap());
        assert_eq!(commit, (8 << 16) | u32::from(WL_SURFACE_COMMIT));
    }

    #[test]
    fn set_cursor_encodes_serial_surface_and_hotspot() {
        let mut writer = Writer::new(-1);
        writer.wl_pointer_set_cursor(7, 42, 12, 3, -1);

        let bytes = writer.pending();
        assert_eq!(bytes.len(), 8 + 16);
        let word = |at: usize| u32::from_ne_bytes(bytes[at..at + 4].try_into().unwrap());
        assert_eq!(word(0), 7);
        assert_eq!(word(4), (24 << 16) | u32::from(WL_POINTER_SET_CURSOR));
        assert_eq!(word(8), 42);
        assert_eq!(word(12), 12);
        assert_eq!(word(16), 3);
        assert_eq!(word(20) as i32, -1);
    }
}
