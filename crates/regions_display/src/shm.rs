use std::{
    ffi::c_void,
    io,
    os::fd::{AsRawFd, FromRawFd, OwnedFd},
    ptr, slice,
};

use anyhow::{Context, bail};
use libc::{
    MAP_FAILED, MAP_SHARED, MFD_CLOEXEC, PROT_READ, PROT_WRITE, ftruncate, memfd_create, mmap,
    munmap, off_t,
};
use log::{debug, warn};
use regions_shared::OutputSize;
use regions_wayland_protocol::{
    Connection, Interface, ObjectId, protocols::wayland::WL_SHM_FORMAT_ARGB8888,
};

const BYTES_PER_PIXEL: usize = 4;
/// Objects created from a `wl_shm_pool` only exist in version 1
const SHM_OBJECT_VERSION: u32 = 1;

/// A `wl_buffer` backed by its own memory mapped file
#[derive(Debug)]
pub struct ShmBuffer {
    buffer: ObjectId,
    size: OutputSize,
    address: *mut c_void,
    len: usize,
    // Kept open until the buffer is gone, the fd may still sit in the unsent request queue
    _fd: OwnedFd,
    busy: bool,
}

impl ShmBuffer {
    pub fn create(
        connection: &mut Connection,
        shm: ObjectId,
        size: OutputSize,
    ) -> anyhow::Result<Self> {
        let stride = size.width as usize * BYTES_PER_PIXEL;
        let len = stride * size.height as usize;
        let (Ok(pool_size), Ok(stride), Ok(width), Ok(height)) = (
            i32::try_from(len),
            i32::try_from(stride),
            i32::try_from(size.width),
            i32::try_from(size.height),
        ) else {
            bail!("Buffer of {}x{} is too large", size.width, size.height);
        };

        let fd = create_memfd(len)?;
        let address = unsafe {
            mmap(
                ptr::null_mut(),
                len,
                PROT_READ | PROT_WRITE,
                MAP_SHARED,
                fd.as_raw_fd(),
                0,
            )
        };
        if address == MAP_FAILED {
            return Err(io::Error::last_os_error()).context("Unable to map shm buffer");
        }

        let pool = connection.new_object(Interface::WlShmPool, SHM_OBJECT_VERSION);
        let buffer = connection.new_object(Interface::WlBuffer, SHM_OBJECT_VERSION);
        let writer = connection.writer();
        writer.wl_shm_create_pool(shm, pool, fd.as_raw_fd(), pool_size);
        writer.wl_shm_pool_create_buffer(
            pool,
            buffer,
            0,
            width,
            height,
            stride,
            WL_SHM_FORMAT_ARGB8888,
        );
        writer.wl_shm_pool_destroy(pool);
        debug!(
            "Created shm buffer {buffer} of {}x{}",
            size.width, size.height
        );

        Ok(Self {
            buffer,
            size,
            address,
            len,
            _fd: fd,
            busy: false,
        })
    }

    pub fn id(&self) -> ObjectId {
        self.buffer
    }

    /// The mapped memory, one ARGB8888 pixel per `u32`
    pub fn pixels_mut(&mut self) -> &mut [u32] {
        // SAFETY: the mapping is page aligned, `len` bytes long and lives as long as `self`
        unsafe {
            slice::from_raw_parts_mut(self.address.cast::<u32>(), self.len / BYTES_PER_PIXEL)
        }
    }

    pub fn destroy(self, connection: &mut Connection) {
        connection.writer().wl_buffer_destroy(self.buffer);
    }
}

impl Drop for ShmBuffer {
    fn drop(&mut self) {
        if unsafe { munmap(self.address, self.len) } != 0 {
            warn!(
                "Unable to unmap shm buffer {}: {}",
                self.buffer,
                io::Error::last_os_error()
            );
        }
    }
}

fn create_memfd(len: usize) -> anyhow::Result<OwnedFd> {
    let fd = unsafe { memfd_create(c"labwc-regions".as_ptr(), MFD_CLOEXEC) };
    if fd < 0 {
        return Err(io::Error::last_os_error()).context("Unable to create shm file");
    }
    // SAFETY: memfd_create returned a new descriptor that nothing else owns
    let fd = unsafe { OwnedFd::from_raw_fd(fd) };
    let len = off_t::try_from(len).context("shm file too large")?;
    if unsafe { ftruncate(fd.as_raw_fd(), len) } < 0 {
        return Err(io::Error::last_os_error()).context("Unable to resize shm file");
    }

    Ok(fd)
}

/// Two buffers that are drawn into alternately. A buffer is busy from the moment it is handed
/// out until the compositor releases it.
#[derive(Debug, Default)]
pub struct BufferPool {
    buffers: [Option<ShmBuffer>; 2],
    allocated: bool,
}

impl BufferPool {
    /// Returns a free buffer of the given size, recreating it if the size changed. `None` if both
    /// buffers are still in use by the compositor.
    pub fn next_buffer(
        &mut self,
        connection: &mut Connection,
        shm: ObjectId,
        size: OutputSize,
    ) -> anyhow::Result<Option<&mut ShmBuffer>> {
        let Some(slot) = self
            .buffers
            .iter_mut()
            .find(|slot| slot.as_ref().is_none_or(|buffer| !buffer.busy))
        else {
            return Ok(None);
        };

        if slot.as_ref().is_some_and(|buffer| buffer.size != size) {
            if let Some(buffer) = slot.take() {
                buffer.destroy(connection);
            }
        }
        let buffer = match slot {
            Some(buffer) => buffer,
            None => {
                let buffer = ShmBuffer::create(connection, shm, size)?;
                self.allocated = true;
                slot.insert(buffer)
            }
        };
        buffer.busy = true;

        Ok(Some(buffer))
    }

    /// Whether a buffer was ever created successfully
    pub fn has_allocated(&self) -> bool {
        self.allocated
    }

    /// Marks the buffer as free again after `wl_buffer.release`
    pub fn release(&mut self, buffer: ObjectId) {
        if let Some(buffer) = self.buffers.iter_mut().flatten().find(|b| b.buffer == buffer) {
            buffer.busy = false;
        }
    }

    /// Ids of the buffers allocated so far
    #[cfg(test)]
    pub(crate) fn ids(&self) -> Vec<ObjectId> {
        self.buffers.iter().flatten().map(ShmBuffer::id).collect()
    }

    pub fn destroy(&mut self, connection: &mut Connection) {
        for buffer in self.buffers.iter_mut().filter_map(Option::take) {
            buffer.destroy(connection);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixStream;

    const SHM: ObjectId = 3;

    fn connection() -> (UnixStream, Connection) {
        let (server, client) = UnixStream::pair().unwrap();
        (server, Connection::from_stream(client).unwrap())
    }

    #[test]
    fn buffers_are_handed_out_until_both_are_busy() {
        let (_server, mut connection) = connection();
        let mut pool = BufferPool::default();
        let size = OutputSize::new(4, 2);

        let first = pool
            .next_buffer(&mut connection, SHM, size)
            .unwrap()
            .unwrap();
        assert_eq!(first.pixels_mut().len(), 8);
        let first = first.id();
        let second = pool
            .next_buffer(&mut connection, SHM, size)
            .unwrap()
            .unwrap()
            .id();
        assert_ne!(first, second);
        assert!(pool.has_allocated());
        assert!(pool.next_buffer(&mut connection, SHM, size).unwrap().is_none());

        pool.release(second);
        let again = pool
            .next_buffer(&mut connection, SHM, size)
            .unwrap()
            .unwrap()
            .id();
        assert_eq!(again, second);
    }

    #[test]
    fn released_buffer_is_recreated_on_resize() {
        let (_server, mut connection) = connection();
        let mut pool = BufferPool::default();

        let buffer = pool
            .next_buffer(&mut connection, SHM, OutputSize::new(2, 2))
            .unwrap()
            .unwrap();
        buffer.pixels_mut().fill(0xFFFFFFFF);
        let old = buffer.id();
        pool.release(old);

        let buffer = pool
            .next_buffer(&mut connection, SHM, OutputSize::new(3, 3))
            .unwrap()
            .unwrap();
        assert_ne!(buffer.id(), old);
        assert_eq!(buffer.size, OutputSize::new(3, 3));
        assert_eq!(buffer.pixels_mut().len(), 9);
        assert!(buffer.pixels_mut().iter().all(|pixel| *pixel == 0));
    }

    #[test]
    fn release_of_unknown_buffer_is_ignored() {
        let mut pool = BufferPool::default();
        pool.release(42);
        assert!(!pool.has_allocated());
    }
}
