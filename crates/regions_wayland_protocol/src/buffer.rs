use std::{
    collections::VecDeque,
    mem,
    os::fd::{FromRawFd, OwnedFd, RawFd},
    ptr,
};

use anyhow::{Context, bail};
use log::{debug, trace};
use nix::{
    errno::Errno,
    libc::{
        CMSG_DATA, CMSG_FIRSTHDR, CMSG_LEN, CMSG_NXTHDR, CMSG_SPACE, MSG_CMSG_CLOEXEC,
        MSG_NOSIGNAL, SCM_RIGHTS, SOL_SOCKET, iovec, msghdr, recvmsg, sendmsg,
    },
};

use crate::{
    ObjectId, Opcode,
    header::{HEADER_SIZE, MessageHeader},
};

const MAX_MESSAGE_SIZE: usize = u16::MAX as usize;
const BUFFER_SIZE: usize = MAX_MESSAGE_SIZE * 2;
/// Most file descriptors passed along with a single `sendmsg`
const MAX_FDS_OUT: usize = 28;
/// Control message space, as `u64` to get the alignment `cmsghdr` needs
const CMSG_BUFFER_WORDS: usize = 128;
const MAX_STRING_LENGTH: usize = 1_024 * 2;

#[derive(Debug)]
pub struct Reader {
    fd: RawFd,
    buffer: Box<[u8]>,
    bytes_in_buffer: usize,
    current_buffer_offset: usize,
    fds: VecDeque<OwnedFd>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadResult {
    ReadData,
    NoMoreData,
    EndOfStream,
}

impl Reader {
    pub(crate) fn new(stream_fd: RawFd) -> Self {
        Self {
            fd: stream_fd,
            buffer: vec![0; BUFFER_SIZE].into_boxed_slice(),
            bytes_in_buffer: 0,
            current_buffer_offset: 0,
            fds: VecDeque::new(),
        }
    }

    /// Receives the next chunk of data and any file descriptors sent along with it
    pub fn read(&mut self) -> anyhow::Result<ReadResult> {
        if self.current_buffer_offset > 0 {
            self.buffer
                .copy_within(self.current_buffer_offset..self.bytes_in_buffer, 0);
            self.bytes_in_buffer -= self.current_buffer_offset;
            self.current_buffer_offset = 0;
        }
        let usable_buffer = &mut self.buffer[self.bytes_in_buffer..];
        if usable_buffer.is_empty() {
            bail!("Message does not fit into the receive buffer");
        }

        let mut cmsg_buffer = [0u64; CMSG_BUFFER_WORDS];
        let mut iov = iovec {
            iov_base: usable_buffer.as_mut_ptr().cast(),
            iov_len: usable_buffer.len(),
        };
        // SAFETY: msghdr is a plain C struct, all-zero is a valid value
        let mut msghdr: msghdr = unsafe { mem::zeroed() };
        msghdr.msg_iov = &mut iov;
        msghdr.msg_iovlen = 1;
        msghdr.msg_control = cmsg_buffer.as_mut_ptr().cast();
        msghdr.msg_controllen = mem::size_of_val(&cmsg_buffer) as _;

        let received_bytes = unsafe { recvmsg(self.fd, &mut msghdr, MSG_CMSG_CLOEXEC) };
        match received_bytes {
            0 => Ok(ReadResult::EndOfStream),
            -1 => match Errno::last() {
                Errno::EAGAIN | Errno::EINTR => Ok(ReadResult::NoMoreData),
                err => Err(err).context("Error reading from socket"),
            },
            _ => {
                self.bytes_in_buffer += received_bytes as usize;
                // SAFETY: the kernel filled the control buffer that msghdr points to
                unsafe {
                    let mut cmsg = CMSG_FIRSTHDR(&msghdr);
                    while !cmsg.is_null() {
                        if (*cmsg).cmsg_level == SOL_SOCKET && (*cmsg).cmsg_type == SCM_RIGHTS {
                            let data_ptr = CMSG_DATA(cmsg) as *const RawFd;
                            let data_len = (*cmsg).cmsg_len as usize - CMSG_LEN(0) as usize;
                            let fd_count = data_len / mem::size_of::<RawFd>();
                            for index in 0..fd_count {
                                let fd = ptr::read_unaligned(data_ptr.add(index));
                                self.fds.push_back(OwnedFd::from_raw_fd(fd));
                            }
                        }
                        cmsg = CMSG_NXTHDR(&msghdr, cmsg);
                    }
                }
                trace!("Received {received_bytes} bytes");
                Ok(ReadResult::ReadData)
            }
        }
    }

    /// The next complete message in the buffer, its arguments and the received file descriptors
    pub fn next(
        &mut self,
    ) -> anyhow::Result<Option<(MessageHeader, &[u8], &mut VecDeque<OwnedFd>)>> {
        let available = &self.buffer[self.current_buffer_offset..self.bytes_in_buffer];
        let Some(header) = MessageHeader::read(available) else {
            return Ok(None);
        };
        let size = usize::from(header.size);
        if size < HEADER_SIZE {
            bail!(
                "Invalid message size {size} for object {} opcode {}",
                header.object_id,
                header.opcode
            );
        }
        if size > available.len() {
            return Ok(None);
        }

        Ok(Some((
            header,
            &available[HEADER_SIZE..size],
            &mut self.fds,
        )))
    }

    pub fn message_handled(&mut self, message_size: usize) {
        self.current_buffer_offset += message_size;
        if self.bytes_in_buffer == self.current_buffer_offset {
            // If we've read all the data in the buffer, reset the offset
            self.current_buffer_offset = 0;
            self.bytes_in_buffer = 0;
        }
    }
}

/// Decodes the arguments of a single message
#[derive(Debug)]
pub struct Arguments<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Arguments<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn take(&mut self, length: usize) -> anyhow::Result<&'a [u8]> {
        let end = self.offset + length;
        let Some(bytes) = self.data.get(self.offset..end) else {
            bail!("Message ended after {} bytes", self.data.len());
        };
        self.offset = end;
        Ok(bytes)
    }

    pub fn u32(&mut self) -> anyhow::Result<u32> {
        Ok(u32::from_ne_bytes(self.take(4)?.try_into()?))
    }

    pub fn i32(&mut self) -> anyhow::Result<i32> {
        Ok(i32::from_ne_bytes(self.take(4)?.try_into()?))
    }

    pub fn object(&mut self) -> anyhow::Result<ObjectId> {
        self.u32()
    }

    pub fn fixed(&mut self) -> anyhow::Result<f64> {
        Ok(fixed_to_f64(self.i32()?))
    }

    pub fn string(&mut self) -> anyhow::Result<String> {
        let length = self.u32()? as usize;
        if length == 0 {
            return Ok(String::new());
        }
        let bytes = self.take(length.next_multiple_of(4))?;
        // Strip the terminating nul byte
        Ok(String::from_utf8_lossy(&bytes[..length - 1]).into_owned())
    }

    pub fn array(&mut self) -> anyhow::Result<&'a [u8]> {
        let length = self.u32()? as usize;
        let bytes = self.take(length.next_multiple_of(4))?;
        Ok(&bytes[..length])
    }
}

#[derive(Debug)]
pub struct Writer {
    fd: RawFd,
    buffer: Vec<u8>,
    message: Option<(usize, ObjectId, Opcode)>,
    fds: VecDeque<RawFd>,
}

impl Writer {
    pub fn new(fd: RawFd) -> Self {
        Self {
            fd,
            buffer: Vec::with_capacity(MAX_MESSAGE_SIZE),
            message: None,
            fds: VecDeque::new(),
        }
    }

    /// Starts a request. The header is completed by [`Writer::write_message_length`].
    pub fn start_message(&mut self, object_id: ObjectId, opcode: Opcode) {
        self.message = Some((self.buffer.len(), object_id, opcode));
        self.buffer.extend_from_slice(&[0; HEADER_SIZE]);
    }

    pub fn write_message_length(&mut self) {
        let Some((start, object_id, opcode)) = self.message.take() else {
            return;
        };
        let header = MessageHeader {
            object_id,
            opcode,
            size: (self.buffer.len() - start) as u16,
        };
        header.write(&mut self.buffer[start..start + HEADER_SIZE]);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_ne_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_ne_bytes());
    }

    pub fn write_fixed(&mut self, value: f64) {
        self.write_i32(f64_to_fixed(value));
    }

    pub fn write_str(&mut self, value: &str) {
        let bytes = value.as_bytes();
        let bytes = &bytes[0..bytes.len().min(MAX_STRING_LENGTH)];
        // The length includes the terminating nul byte
        let length = bytes.len() + 1;
        self.write_u32(length as u32);
        self.buffer.extend_from_slice(bytes);
        // Nul terminator and padding to the 32-bit boundary
        let padding = length.next_multiple_of(4) - bytes.len();
        self.buffer.extend(std::iter::repeat_n(0, padding));
    }

    /// Queues a file descriptor. It has to stay open until the next flush.
    pub fn write_fd(&mut self, fd: RawFd) {
        self.fds.push_back(fd);
    }

    /// Bytes that were written but not yet sent
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Sends everything that was written. Returns `false` if the socket would block, the rest
    /// is sent by the next flush.
    pub fn flush(&mut self) -> anyhow::Result<bool> {
        while !self.buffer.is_empty() {
            match self.send() {
                Ok(sent) => {
                    self.buffer.drain(..sent);
                }
                Err(Errno::EAGAIN) => {
                    debug!("Socket is full, {} bytes left", self.buffer.len());
                    return Ok(false);
                }
                Err(Errno::EINTR) => {}
                Err(err) => return Err(err).context("Error sending message"),
            }
        }

        Ok(true)
    }

    fn send(&mut self) -> Result<usize, Errno> {
        let mut cmsg_buffer = [0u64; CMSG_BUFFER_WORDS];
        let mut iov = iovec {
            iov_base: self.buffer.as_mut_ptr().cast(),
            iov_len: self.buffer.len().min(MAX_MESSAGE_SIZE),
        };
        // SAFETY: msghdr is a plain C struct, all-zero is a valid value
        let mut msghdr: msghdr = unsafe { mem::zeroed() };
        msghdr.msg_iov = &mut iov;
        msghdr.msg_iovlen = 1;

        let fd_count = self.fds.len().min(MAX_FDS_OUT);
        if fd_count > 0 {
            let fd_bytes = (fd_count * mem::size_of::<RawFd>()) as u32;
            msghdr.msg_control = cmsg_buffer.as_mut_ptr().cast();
            // SAFETY: the control buffer is large enough for MAX_FDS_OUT descriptors
            unsafe {
                msghdr.msg_controllen = CMSG_SPACE(fd_bytes) as _;
                let cmsg = CMSG_FIRSTHDR(&msghdr);
                (*cmsg).cmsg_level = SOL_SOCKET;
                (*cmsg).cmsg_type = SCM_RIGHTS;
                (*cmsg).cmsg_len = CMSG_LEN(fd_bytes) as _;
                let data_ptr = CMSG_DATA(cmsg) as *mut RawFd;
                for (index, fd) in self.fds.iter().take(fd_count).enumerate() {
                    ptr::write_unaligned(data_ptr.add(index), *fd);
                }
            }
        }

        let result = unsafe { sendmsg(self.fd, &msghdr, MSG_NOSIGNAL) };
        if result < 0 {
            return Err(Errno::last());
        }
        self.fds.drain(..fd_count);

        Ok(result as usize)
    }
}

pub fn fixed_to_f64(value: i32) -> f64 {
    f64::from(value) / 256.0
}

pub fn f64_to_fixed(value: f64) -> i32 {
    (value * 256.0).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        fs::File,
        io::Write,
        os::{fd::AsRawFd, unix::net::UnixStream},
    };

    fn words(bytes: &[u8]) -> Vec<u32> {
        bytes
            .chunks(4)
            .map(|chunk| u32::from_ne_bytes(chunk.try_into().unwrap()))
            .collect()
    }

    #[test]
    fn writer_encodes_header_and_padded_string() {
        let mut writer = Writer::new(-1);
        writer.start_message(2, 0);
        writer.write_u32(7);
        writer.write_str("wl_shm");
        writer.write_u32(1);
        writer.write_message_length();

        let bytes = writer.pending();
        assert_eq!(bytes.len(), 28);
        assert_eq!(&bytes[16..23], b"wl_shm\0");
        assert_eq!(bytes[23], 0);
        let words = words(bytes);
        assert_eq!(words[0], 2);
        assert_eq!(words[1], 28 << 16);
        assert_eq!(words[2], 7);
        assert_eq!(words[3], 7);
        assert_eq!(words[6], 1);
    }

    #[test]
    fn string_length_multiple_of_four_gets_a_full_padding_word() {
        let mut writer = Writer::new(-1);
        writer.write_str("abc");
        assert_eq!(writer.pending().len(), 8);

        let mut writer = Writer::new(-1);
        writer.write_str("abcd");
        assert_eq!(writer.pending().len(), 12);

        let mut arguments = Arguments::new(writer.pending());
        assert_eq!(arguments.string().unwrap(), "abcd");
    }

    #[test]
    fn reader_decodes_a_framed_event() {
        let (mut server, client) = UnixStream::pair().unwrap();
        client.set_nonblocking(true).unwrap();

        let mut writer = Writer::new(-1);
        writer.start_message(1, 0);
        writer.write_u32(5);
        writer.write_u32(1);
        writer.write_str("invalid method");
        writer.write_message_length();
        server.write_all(writer.pending()).unwrap();

        let mut reader = Reader::new(client.as_raw_fd());
        assert_eq!(reader.read().unwrap(), ReadResult::ReadData);
        let (header, data, _) = reader.next().unwrap().unwrap();
        assert_eq!(header.object_id, 1);
        assert_eq!(header.opcode, 0);
        let mut arguments = Arguments::new(data);
        assert_eq!(arguments.object().unwrap(), 5);
        assert_eq!(arguments.u32().unwrap(), 1);
        assert_eq!(arguments.string().unwrap(), "invalid method");
        assert!(arguments.u32().is_err());

        let size = usize::from(header.size);
        reader.message_handled(size);
        assert!(reader.next().unwrap().is_none());
        assert_eq!(reader.read().unwrap(), ReadResult::NoMoreData);
    }

    #[test]
    fn partial_message_waits_for_more_data() {
        let (mut server, client) = UnixStream::pair().unwrap();
        client.set_nonblocking(true).unwrap();

        let mut writer = Writer::new(-1);
        writer.start_message(3, 1);
        writer.write_i32(-4);
        writer.write_message_length();
        let bytes = writer.pending().to_vec();

        let mut reader = Reader::new(client.as_raw_fd());
        server.write_all(&bytes[..6]).unwrap();
        assert_eq!(reader.read().unwrap(), ReadResult::ReadData);
        assert!(reader.next().unwrap().is_none());

        server.write_all(&bytes[6..]).unwrap();
        assert_eq!(reader.read().unwrap(), ReadResult::ReadData);
        let (header, data, _) = reader.next().unwrap().unwrap();
        assert_eq!(header.opcode, 1);
        assert_eq!(Arguments::new(data).i32().unwrap(), -4);

        drop(server);
        reader.message_handled(bytes.len());
        assert_eq!(reader.read().unwrap(), ReadResult::EndOfStream);
    }

    #[test]
    fn file_descriptors_travel_with_the_message() {
        let (server, client) = UnixStream::pair().unwrap();
        client.set_nonblocking(true).unwrap();
        let file = File::open("/dev/null").unwrap();

        let mut writer = Writer::new(server.as_raw_fd());
        writer.start_message(4, 0);
        writer.write_fd(file.as_raw_fd());
        writer.write_u32(4096);
        writer.write_message_length();
        assert!(writer.flush().unwrap());
        assert!(writer.pending().is_empty());

        let mut reader = Reader::new(client.as_raw_fd());
        assert_eq!(reader.read().unwrap(), ReadResult::ReadData);
        let (_, data, fds) = reader.next().unwrap().unwrap();
        assert_eq!(Arguments::new(data).u32().unwrap(), 4096);
        assert_eq!(fds.len(), 1);
    }

    #[test]
    fn fixed_point_conversion() {
        assert_eq!(fixed_to_f64(256), 1.0);
        assert_eq!(fixed_to_f64(-384), -1.5);
        assert_eq!(f64_to_fixed(10.25), 2624);
    }
}
