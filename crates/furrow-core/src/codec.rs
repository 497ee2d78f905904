//! Binary wire format for chunks.
//!
//! The same encoding is used for full-sync batches and for snapshots. All
//! integers are little-endian.
//!
//! # Layout
//!
//! ```text
//! header: chunk_x i32 | chunk_y i32 | section u32 | slot_count u16
//! slot:   world_x i32 | world_y i32 | flags u8
//!         [crop]      plant_id str | stage u8 | age u32 | pollen u8
//!                     | watered u8 | fertilized u8 | pollinated u8
//!         [structure] structure_id str | placed_day u32
//! str:    len u16 | utf-8 bytes
//! ```
//!
//! Flags: bit0 tilled, bit1 crop, bit2 structure. Decoding fails closed on
//! truncated input, trailing bytes, unknown flag bits, a slot claiming both
//! a crop and a structure, boolean bytes other than 0/1, and invalid UTF-8.

use crate::chunk::Chunk;
use crate::coord::{ChunkCoord, TilePos};
use crate::id::{PlantId, SectionId, StructureId};
use crate::tile::{Crop, FLAG_CROP, FLAG_STRUCTURE, FLAG_TILLED, Structure, TileSlot};
use bytes::{Buf, BufMut};

/// Size of the chunk header in bytes.
pub const CHUNK_HEADER_LEN: usize = 14;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from encoding or decoding wire data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("unexpected end of data: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },
    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),
    #[error("invalid slot flags 0b{0:08b}")]
    InvalidFlags(u8),
    #[error("invalid boolean byte {0}")]
    InvalidBool(u8),
    #[error("string is not valid utf-8")]
    InvalidUtf8,
    #[error("string of {0} bytes exceeds the u16 length prefix")]
    StringTooLong(usize),
    #[error("blob of {0} bytes exceeds the u32 length prefix")]
    BlobTooLong(usize),
    #[error("{0} slots exceed the u16 slot count")]
    TooManySlots(usize),
    #[error("{0} entries exceed the u16 count prefix")]
    TooManyEntries(usize),
}

// ---------------------------------------------------------------------------
// WireReader
// ---------------------------------------------------------------------------

/// Bounds-checked reader over a byte slice. Every read verifies the
/// remaining length first, so malformed input yields an error, never a panic.
#[derive(Debug)]
pub struct WireReader<'a> {
    buf: &'a [u8],
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn need(&self, n: usize) -> Result<(), CodecError> {
        if self.buf.remaining() < n {
            Err(CodecError::Truncated {
                needed: n,
                remaining: self.buf.remaining(),
            })
        } else {
            Ok(())
        }
    }

    pub fn u8(&mut self) -> Result<u8, CodecError> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn u16(&mut self) -> Result<u16, CodecError> {
        self.need(2)?;
        Ok(self.buf.get_u16_le())
    }

    pub fn u32(&mut self) -> Result<u32, CodecError> {
        self.need(4)?;
        Ok(self.buf.get_u32_le())
    }

    pub fn i32(&mut self) -> Result<i32, CodecError> {
        self.need(4)?;
        Ok(self.buf.get_i32_le())
    }

    pub fn bool(&mut self) -> Result<bool, CodecError> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::InvalidBool(other)),
        }
    }

    /// A `u16`-length-prefixed UTF-8 string.
    pub fn string(&mut self) -> Result<String, CodecError> {
        let len = self.u16()? as usize;
        let bytes = self.bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }

    /// A `u32`-length-prefixed byte blob.
    pub fn blob(&mut self) -> Result<&'a [u8], CodecError> {
        let len = self.u32()? as usize;
        self.bytes(len)
    }

    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        self.need(len)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    /// Fail if any bytes are left over.
    pub fn finish(self) -> Result<(), CodecError> {
        match self.buf.remaining() {
            0 => Ok(()),
            n => Err(CodecError::TrailingBytes(n)),
        }
    }
}

// ---------------------------------------------------------------------------
// Writer helpers
// ---------------------------------------------------------------------------

/// Write a `u16`-length-prefixed UTF-8 string.
pub fn put_string(buf: &mut Vec<u8>, s: &str) -> Result<(), CodecError> {
    let len = u16::try_from(s.len()).map_err(|_| CodecError::StringTooLong(s.len()))?;
    buf.put_u16_le(len);
    buf.put_slice(s.as_bytes());
    Ok(())
}

/// Write a `u32`-length-prefixed byte blob.
pub fn put_blob(buf: &mut Vec<u8>, data: &[u8]) -> Result<(), CodecError> {
    buf.put_u32_le(blob_len(data.len())?);
    buf.put_slice(data);
    Ok(())
}

fn blob_len(len: usize) -> Result<u32, CodecError> {
    u32::try_from(len).map_err(|_| CodecError::BlobTooLong(len))
}

pub fn put_bool(buf: &mut Vec<u8>, value: bool) {
    buf.put_u8(value as u8);
}

// ---------------------------------------------------------------------------
// Chunk encoding
// ---------------------------------------------------------------------------

/// A decoded chunk: its identity and the slots it carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPayload {
    pub coord: ChunkCoord,
    pub section: SectionId,
    pub slots: Vec<TileSlot>,
}

/// Encode a chunk and all of its slots.
pub fn encode_chunk(chunk: &Chunk) -> Result<Vec<u8>, CodecError> {
    let count = chunk.slot_count();
    let count = u16::try_from(count).map_err(|_| CodecError::TooManySlots(count))?;

    let mut buf = Vec::with_capacity(CHUNK_HEADER_LEN + count as usize * 16);
    let coord = chunk.coord();
    buf.put_i32_le(coord.x);
    buf.put_i32_le(coord.y);
    buf.put_u32_le(chunk.section().0);
    buf.put_u16_le(count);

    for slot in chunk.slots() {
        encode_slot(&mut buf, slot)?;
    }
    Ok(buf)
}

/// Encode one slot.
pub fn encode_slot(buf: &mut Vec<u8>, slot: &TileSlot) -> Result<(), CodecError> {
    buf.put_i32_le(slot.x);
    buf.put_i32_le(slot.y);
    buf.put_u8(slot.flags());

    if let Some(crop) = &slot.crop {
        put_string(buf, crop.plant_id.as_str())?;
        buf.put_u8(crop.stage);
        buf.put_u32_le(crop.total_age);
        buf.put_u8(crop.pollen_harvest_count);
        put_bool(buf, crop.watered);
        put_bool(buf, crop.fertilized);
        put_bool(buf, crop.pollinated);
    }
    if let Some(structure) = &slot.structure {
        put_string(buf, structure.structure_id.as_str())?;
        buf.put_u32_le(structure.placed_day);
    }
    Ok(())
}

/// Decode a chunk produced by [`encode_chunk`]. The whole input must be
/// consumed.
pub fn decode_chunk(data: &[u8]) -> Result<ChunkPayload, CodecError> {
    let mut reader = WireReader::new(data);
    let payload = read_chunk(&mut reader)?;
    reader.finish()?;
    Ok(payload)
}

/// Decode a chunk from the front of a reader.
pub fn read_chunk(reader: &mut WireReader<'_>) -> Result<ChunkPayload, CodecError> {
    let x = reader.i32()?;
    let y = reader.i32()?;
    let section = SectionId(reader.u32()?);
    let count = reader.u16()? as usize;

    // Each slot needs at least 9 bytes; cap the pre-allocation by what the
    // input can actually hold.
    let mut slots = Vec::with_capacity(count.min(reader.remaining() / 9));
    for _ in 0..count {
        slots.push(read_slot(reader)?);
    }

    Ok(ChunkPayload {
        coord: ChunkCoord::new(x, y),
        section,
        slots,
    })
}

/// Decode one slot.
pub fn read_slot(reader: &mut WireReader<'_>) -> Result<TileSlot, CodecError> {
    let x = reader.i32()?;
    let y = reader.i32()?;
    let flags = reader.u8()?;

    let known = FLAG_TILLED | FLAG_CROP | FLAG_STRUCTURE;
    if flags & !known != 0 {
        return Err(CodecError::InvalidFlags(flags));
    }
    if flags & FLAG_CROP != 0 && flags & FLAG_STRUCTURE != 0 {
        return Err(CodecError::InvalidFlags(flags));
    }

    let mut slot = TileSlot::empty(TilePos::new(x, y));
    slot.tilled = flags & FLAG_TILLED != 0;

    if flags & FLAG_CROP != 0 {
        let plant_id = PlantId(reader.string()?);
        let stage = reader.u8()?;
        let total_age = reader.u32()?;
        let pollen_harvest_count = reader.u8()?;
        let watered = reader.bool()?;
        let fertilized = reader.bool()?;
        let pollinated = reader.bool()?;
        slot.crop = Some(Crop {
            plant_id,
            stage,
            total_age,
            pollen_harvest_count,
            watered,
            fertilized,
            pollinated,
        });
    }
    if flags & FLAG_STRUCTURE != 0 {
        let structure_id = StructureId(reader.string()?);
        let placed_day = reader.u32()?;
        slot.structure = Some(Structure {
            structure_id,
            placed_day,
        });
    }
    Ok(slot)
}
