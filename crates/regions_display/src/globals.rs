use anyhow::Context;
use log::{debug, info};
use regions_wayland_protocol::{Connection, Interface, ObjectId};

use crate::seat::Seat;

const COMPOSITOR_VERSION: u32 = 4;
const SHM_VERSION: u32 = 1;
const SEAT_MAX_VERSION: u32 = 7;
const LAYER_SHELL_MAX_VERSION: u32 = 4;
const OUTPUT_MAX_VERSION: u32 = 4;
/// First version of `wl_output` with a release request
const OUTPUT_RELEASE_SINCE_VERSION: u32 = 3;
/// First version of `zwlr_layer_shell_v1` with a destroy request
const LAYER_SHELL_DESTROY_SINCE_VERSION: u32 = 3;

/// Binds the global `name` and returns the id of the new object
fn bind(
    connection: &mut Connection,
    registry: ObjectId,
    name: u32,
    interface: Interface,
    version: u32,
) -> ObjectId {
    let id = connection.new_object(interface, version);
    connection
        .writer()
        .wl_registry_bind(registry, name, interface, version, id);
    debug!("Bound {}@{id} version {version}", interface.name());
    id
}

/// The globals the overlay can not work without
#[derive(Debug, Clone, Copy)]
pub struct Globals {
    pub registry: ObjectId,
    pub compositor: ObjectId,
    pub shm: ObjectId,
    pub layer_shell: ObjectId,
}

impl Globals {
    pub fn destroy(self, connection: &mut Connection) {
        if connection.version(self.layer_shell) >= LAYER_SHELL_DESTROY_SINCE_VERSION {
            connection
                .writer()
                .zwlr_layer_shell_v1_destroy(self.layer_shell);
        }
    }
}

#[derive(Debug)]
pub struct Output {
    id: ObjectId,
    /// Name of the global the output was bound from
    global: u32,
    name: Option<String>,
}

impl Output {
    pub fn bind(connection: &mut Connection, registry: ObjectId, global: u32, version: u32) -> Self {
        let version = version.min(OUTPUT_MAX_VERSION);
        Self {
            id: bind(connection, registry, global, Interface::WlOutput, version),
            global,
            name: None,
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn global(&self) -> u32 {
        self.global
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: String) {
        self.name = Some(name);
    }

    pub fn destroy(self, connection: &mut Connection) {
        if connection.version(self.id) >= OUTPUT_RELEASE_SINCE_VERSION {
            connection.writer().wl_output_release(self.id);
        }
    }
}

/// Collects the globals announced during startup
#[derive(Debug)]
pub struct Discovery {
    registry: ObjectId,
    compositor: Option<ObjectId>,
    shm: Option<ObjectId>,
    layer_shell: Option<ObjectId>,
    seat: Option<Seat>,
    outputs: Vec<Output>,
}

impl Discovery {
    pub fn new(registry: ObjectId) -> Self {
        Self {
            registry,
            compositor: None,
            shm: None,
            layer_shell: None,
            seat: None,
            outputs: Vec::new(),
        }
    }

    /// Binds the announced global if the overlay uses it
    pub fn add(&mut self, connection: &mut Connection, name: u32, interface: &str, version: u32) {
        let registry = self.registry;
        match interface {
            "wl_compositor" => {
                self.compositor = Some(bind(
                    connection,
                    registry,
                    name,
                    Interface::WlCompositor,
                    COMPOSITOR_VERSION,
                ));
            }
            "wl_shm" => {
                self.shm = Some(bind(
                    connection,
                    registry,
                    name,
                    Interface::WlShm,
                    SHM_VERSION,
                ));
            }
            "wl_seat" => {
                let version = version.min(SEAT_MAX_VERSION);
                let seat = bind(connection, registry, name, Interface::WlSeat, version);
                if let Some(previous) = self.seat.replace(Seat::new(seat)) {
                    info!("Ignoring seat {}, using the last one announced", previous.id());
                }
            }
            "zwlr_layer_shell_v1" => {
                let version = version.min(LAYER_SHELL_MAX_VERSION);
                self.layer_shell = Some(bind(
                    connection,
                    registry,
                    name,
                    Interface::ZwlrLayerShellV1,
                    version,
                ));
            }
            "wl_output" => self
                .outputs
                .push(Output::bind(connection, registry, name, version)),
            _ => {}
        }
    }

    /// Fails if one of the required globals was not announced
    pub fn finish(self) -> anyhow::Result<(Globals, Seat, Vec<Output>)> {
        let globals = Globals {
            registry: self.registry,
            compositor: self.compositor.context("Compositor has no wl_compositor")?,
            shm: self.shm.context("Compositor has no wl_shm")?,
            layer_shell: self
                .layer_shell
                .context("Compositor has no zwlr_layer_shell_v1")?,
        };
        let seat = self.seat.context("Compositor has no wl_seat")?;

        Ok((globals, seat, self.outputs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixStream;

    fn connection() -> (UnixStream, Connection) {
        let (server, client) = UnixStream::pair().unwrap();
        (server, Connection::from_stream(client).unwrap())
    }

    #[test]
    fn versions_are_capped() {
        let (_server, mut connection) = connection();
        let registry = connection.get_registry();
        let mut discovery = Discovery::new(registry);
        discovery.add(&mut connection, 1, "wl_compositor", 6);
        discovery.add(&mut connection, 2, "wl_shm", 2);
        discovery.add(&mut connection, 3, "wl_seat", 9);
        discovery.add(&mut connection, 4, "zwlr_layer_shell_v1", 2);
        discovery.add(&mut connection, 5, "wl_output", 4);
        discovery.add(&mut connection, 6, "xdg_wm_base", 5);

        let (globals, seat, outputs) = discovery.finish().unwrap();
        assert_eq!(connection.version(globals.compositor), 4);
        assert_eq!(connection.version(globals.shm), 1);
        assert_eq!(connection.version(seat.id()), 7);
        assert_eq!(connection.version(globals.layer_shell), 2);
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].global(), 5);
        assert_eq!(
            connection.registry().interface(outputs[0].id()),
            Some(Interface::WlOutput)
        );
    }

    #[test]
    fn missing_layer_shell_is_fatal() {
        let (_server, mut connection) = connection();
        let registry = connection.get_registry();
        let mut discovery = Discovery::new(registry);
        discovery.add(&mut connection, 1, "wl_compositor", 4);
        discovery.add(&mut connection, 2, "wl_shm", 1);
        discovery.add(&mut connection, 3, "wl_seat", 7);

        let err = discovery.finish().unwrap_err();
        assert!(err.to_string().contains("zwlr_layer_shell_v1"));
    }
}
