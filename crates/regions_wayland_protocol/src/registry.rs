use std::collections::HashMap;

use crate::ObjectId;

pub const DISPLAY_ID: ObjectId = 1;

/// The interfaces this client knows how to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interface {
    WlDisplay,
    WlRegistry,
    WlCallback,
    WlCompositor,
    WlSurface,
    WlShm,
    WlShmPool,
    WlBuffer,
    WlSeat,
    WlPointer,
    WlKeyboard,
    WlOutput,
    ZwlrLayerShellV1,
    ZwlrLayerSurfaceV1,
}

impl Interface {
    pub fn name(self) -> &'static str {
        match self {
            Interface::WlDisplay => "wl_display",
            Interface::WlRegistry => "wl_registry",
            Interface::WlCallback => "wl_callback",
            Interface::WlCompositor => "wl_compositor",
            Interface::WlSurface => "wl_surface",
            Interface::WlShm => "wl_shm",
            Interface::WlShmPool => "wl_shm_pool",
            Interface::WlBuffer => "wl_buffer",
            Interface::WlSeat => "wl_seat",
            Interface::WlPointer => "wl_pointer",
            Interface::WlKeyboard => "wl_keyboard",
            Interface::WlOutput => "wl_output",
            Interface::ZwlrLayerShellV1 => "zwlr_layer_shell_v1",
            Interface::ZwlrLayerSurfaceV1 => "zwlr_layer_surface_v1",
        }
    }
}

/// Maps the ids of live objects to their interface and version. Ids are only reused after the
/// compositor confirmed the deletion with `wl_display.delete_id`.
#[derive(Debug)]
pub struct Registry {
    objects: HashMap<ObjectId, (Interface, u32)>,
    next_object_id: ObjectId,
    freed_object_ids: Vec<ObjectId>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        let mut objects = HashMap::new();
        objects.insert(DISPLAY_ID, (Interface::WlDisplay, 1));
        Self {
            objects,
            next_object_id: DISPLAY_ID + 1,
            freed_object_ids: Vec::new(),
        }
    }

    pub fn interface(&self, object_id: ObjectId) -> Option<Interface> {
        self.objects.get(&object_id).map(|(interface, _)| *interface)
    }

    pub fn version(&self, object_id: ObjectId) -> Option<u32> {
        self.objects.get(&object_id).map(|(_, version)| *version)
    }

    /// Allocates an id for a new object
    pub fn create_object(&mut self, interface: Interface, version: u32) -> ObjectId {
        let object_id = self.next_object_id();
        self.objects.insert(object_id, (interface, version));
        object_id
    }

    /// Releases an id after the compositor deleted the object
    pub fn delete_object(&mut self, object_id: ObjectId) -> Option<Interface> {
        let (interface, _) = self.objects.remove(&object_id)?;
        self.freed_object_ids.push(object_id);
        Some(interface)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn next_object_id(&mut self) -> ObjectId {
        self.freed_object_ids.pop().unwrap_or_else(|| {
            let object_id = self.next_object_id;
            self.next_object_id += 1;
            object_id
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_object_one() {
        let registry = Registry::new();
        assert_eq!(registry.interface(DISPLAY_ID), Some(Interface::WlDisplay));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn deleted_ids_are_reused() {
        let mut registry = Registry::new();
        let callback = registry.create_object(Interface::WlCallback, 1);
        let surface = registry.create_object(Interface::WlSurface, 4);
        assert_eq!((callback, surface), (2, 3));
        assert_eq!(registry.version(surface), Some(4));

        assert_eq!(registry.delete_object(callback), Some(Interface::WlCallback));
        assert_eq!(registry.delete_object(callback), None);
        assert_eq!(registry.interface(callback), None);

        let buffer = registry.create_object(Interface::WlBuffer, 1);
        assert_eq!(buffer, callback);
        assert_eq!(registry.interface(buffer), Some(Interface::WlBuffer));
        assert_eq!(registry.create_object(Interface::WlBuffer, 1), 4);
    }
}
