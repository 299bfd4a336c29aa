use crate::{ObjectId, Opcode};

pub const HEADER_SIZE: usize = 8;

/// The two words in front of every message: the object id, then the message size in the upper
/// and the opcode in the lower 16 bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub object_id: ObjectId,
    pub opcode: Opcode,
    /// Size of the whole message including the header
    pub size: u16,
}

impl MessageHeader {
    pub fn read(buffer: &[u8]) -> Option<Self> {
        let object_id = u32::from_ne_bytes(buffer.get(0..4)?.try_into().ok()?);
        let word = u32::from_ne_bytes(buffer.get(4..8)?.try_into().ok()?);

        Some(Self {
            object_id,
            opcode: (word & 0xffff) as Opcode,
            size: (word >> 16) as u16,
        })
    }

    pub fn write(&self, buffer: &mut [u8]) {
        let word = (u32::from(self.size) << 16) | u32::from(self.opcode);
        buffer[0..4].copy_from_slice(&self.object_id.to_ne_bytes());
        buffer[4..8].copy_from_slice(&word.to_ne_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_is_in_the_upper_half() {
        let mut buffer = [0; HEADER_SIZE];
        buffer[0..4].copy_from_slice(&3u32.to_ne_bytes());
        buffer[4..8].copy_from_slice(&((24u32 << 16) | 2).to_ne_bytes());

        let header = MessageHeader::read(&buffer).unwrap();
        assert_eq!(
            header,
            MessageHeader {
                object_id: 3,
                opcode: 2,
                size: 24
            }
        );

        let mut written = [0; HEADER_SIZE];
        header.write(&mut written);
        assert_eq!(written, buffer);
    }

    #[test]
    fn short_buffer_has_no_header() {
        assert_eq!(MessageHeader::read(&[0; 7]), None);
    }
}
