use anyhow::{Context, bail};
use log::{debug, trace, warn};
use std::{
    collections::VecDeque,
    env,
    os::{
        fd::{AsRawFd, FromRawFd, RawFd},
        unix::net::UnixStream,
    },
    path::PathBuf,
};

pub mod buffer;
mod event;
pub mod header;
pub mod protocols;
pub mod registry;

use buffer::{ReadResult, Reader, Writer};
pub use event::Event;
use protocols::wayland::{WL_CALLBACK_VERSION, WL_REGISTRY_VERSION};
pub use registry::{DISPLAY_ID, Interface, Registry};

pub type ObjectId = u32;
pub type Opcode = u16;

/// A client connection to the compositor
#[derive(Debug)]
pub struct Connection {
    stream: UnixStream,
    registry: Registry,
    reader: Reader,
    writer: Writer,
}

impl Connection {
    /// Connects to the socket named by `WAYLAND_SOCKET` or `WAYLAND_DISPLAY`
    pub fn connect() -> anyhow::Result<Self> {
        if let Some(fd) = env::var_os("WAYLAND_SOCKET") {
            let fd: RawFd = fd
                .to_string_lossy()
                .parse()
                .context("WAYLAND_SOCKET is not a file descriptor")?;
            debug!("Using inherited wayland socket {fd}");
            // SAFETY: the parent process handed this socket to us
            let stream = unsafe { UnixStream::from_raw_fd(fd) };
            return Self::from_stream(stream);
        }

        let socket_path = socket_path()?;
        let stream = UnixStream::connect(&socket_path).with_context(|| {
            format!(
                "Unable to connect to wayland display at {}",
                socket_path.display()
            )
        })?;
        debug!("Connected to {}", socket_path.display());
        Self::from_stream(stream)
    }

    pub fn from_stream(stream: UnixStream) -> anyhow::Result<Self> {
        stream
            .set_nonblocking(true)
            .context("Failed to set socket to non-blocking mode")?;

        Ok(Self {
            reader: Reader::new(stream.as_raw_fd()),
            writer: Writer::new(stream.as_raw_fd()),
            stream,
            registry: Registry::new(),
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Allocates an id for an object that the next request creates
    pub fn new_object(&mut self, interface: Interface, version: u32) -> ObjectId {
        self.registry.create_object(interface, version)
    }

    /// Version the object was created with, 0 for unknown objects
    pub fn version(&self, object_id: ObjectId) -> u32 {
        self.registry.version(object_id).unwrap_or(0)
    }

    pub fn writer(&mut self) -> &mut Writer {
        &mut self.writer
    }

    /// Creates the `wl_registry` object that announces the globals
    pub fn get_registry(&mut self) -> ObjectId {
        let registry = self.new_object(Interface::WlRegistry, WL_REGISTRY_VERSION);
        self.writer.wl_display_get_registry(DISPLAY_ID, registry);
        registry
    }

    /// Requests a `wl_callback.done` once the compositor processed all previous requests
    pub fn sync(&mut self) -> ObjectId {
        let callback = self.new_object(Interface::WlCallback, WL_CALLBACK_VERSION);
        self.writer.wl_display_sync(DISPLAY_ID, callback);
        callback
    }

    /// Sends all queued requests. Returns `false` if the socket would block.
    pub fn flush(&mut self) -> anyhow::Result<bool> {
        self.writer.flush()
    }

    /// Reads until the socket would block and decodes every complete message into `events`
    pub fn read_events(&mut self, events: &mut VecDeque<Event>) -> anyhow::Result<ReadResult> {
        loop {
            match self.read_once(events)? {
                ReadResult::ReadData => {}
                result => return Ok(result),
            }
        }
    }

    /// Blocks until the compositor answered all requests sent so far. Events that arrive in the
    /// meantime are appended to `events`.
    pub fn roundtrip(&mut self, events: &mut VecDeque<Event>) -> anyhow::Result<()> {
        let callback = self.sync();
        self.stream
            .set_nonblocking(false)
            .context("Failed to set socket to blocking mode")?;
        let result = self.wait_for_callback(callback, events);
        self.stream
            .set_nonblocking(true)
            .context("Failed to set socket to non-blocking mode")?;
        result
    }

    fn wait_for_callback(
        &mut self,
        callback: ObjectId,
        events: &mut VecDeque<Event>,
    ) -> anyhow::Result<()> {
        self.flush()?;
        loop {
            let done = |event: &Event| {
                matches!(event, Event::CallbackDone { callback: id, .. } if *id == callback)
            };
            if events.iter().any(done) {
                events.retain(|event| !done(event));
                return Ok(());
            }
            if self.read_once(events)? == ReadResult::EndOfStream {
                bail!("Compositor closed the connection");
            }
        }
    }

    fn read_once(&mut self, events: &mut VecDeque<Event>) -> anyhow::Result<ReadResult> {
        let result = self.reader.read()?;
        while let Some((header, data, fds)) = self.reader.next()? {
            let Some(interface) = self.registry.interface(header.object_id) else {
                warn!(
                    "Event {} for unknown object {}",
                    header.opcode, header.object_id
                );
                let size = usize::from(header.size);
                self.reader.message_handled(size);
                continue;
            };
            let event = Event::decode(interface, header.object_id, header.opcode, data, fds)
                .with_context(|| {
                    format!(
                        "Unable to decode event {} of {}@{}",
                        header.opcode,
                        interface.name(),
                        header.object_id
                    )
                })?;
            self.reader.message_handled(usize::from(header.size));
            trace!("{}@{} <- {event:?}", interface.name(), header.object_id);

            match event {
                Event::DeleteId { id } => {
                    self.registry.delete_object(id);
                }
                event => events.push_back(event),
            }
        }

        Ok(result)
    }
}

impl AsRawFd for Connection {
    fn as_raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }
}

/// `WAYLAND_DISPLAY` is either an absolute path or relative to `XDG_RUNTIME_DIR`
fn socket_path() -> anyhow::Result<PathBuf> {
    let display =
        PathBuf::from(env::var_os("WAYLAND_DISPLAY").unwrap_or_else(|| "wayland-0".into()));
    if display.is_absolute() {
        return Ok(display);
    }
    let runtime_dir = env::var_os("XDG_RUNTIME_DIR").context("XDG_RUNTIME_DIR is not set")?;

    Ok(PathBuf::from(runtime_dir).join(display))
}
