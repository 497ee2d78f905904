//! Replication messages and their wire encoding.
//!
//! Every message starts with a one-byte opcode. Opcode values are part of
//! the wire contract between peers and never change; new messages are only
//! ever appended. Payload fields reuse the little-endian primitives of
//! [`furrow_core::codec`], and full-sync batches carry chunks in the chunk
//! wire format unchanged.
//!
//! ```text
//! SyncRequest       (empty)
//! SyncBatch         batch_index u16 | total_batches u16 | count u16 | count x (len u32 | chunk)
//! SyncComplete      chunk_count u32
//! CropPlanted       pos | plant_id str
//! CropRemoved       pos
//! CropStageUpdated  pos | stage u8 | total_age u32
//! Tilled            pos
//! Untilled          pos
//! PollenHarvested   pos | count u8
//! Crossbred         pos | plant_id str
//! StructurePlaced   pos | structure_id str | placed_day u32
//! StructureRemoved  pos
//! CropTended        pos | watered u8 | fertilized u8 | pollinated u8
//! pos:              world_x i32 | world_y i32
//! ```

use bytes::BufMut;
use furrow_core::codec::{CodecError, WireReader, put_blob, put_bool, put_string};
use furrow_core::coord::TilePos;
use furrow_core::id::{PlantId, StructureId};
use furrow_core::tile::CropFlags;

// ---------------------------------------------------------------------------
// Opcodes
// ---------------------------------------------------------------------------

/// Stable message discriminants.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    SyncRequest = 1,
    SyncBatch = 2,
    SyncComplete = 3,
    CropPlanted = 4,
    CropRemoved = 5,
    CropStageUpdated = 6,
    Tilled = 7,
    Untilled = 8,
    PollenHarvested = 9,
    Crossbred = 10,
    StructurePlaced = 11,
    StructureRemoved = 12,
    CropTended = 13,
}

impl TryFrom<u8> for Opcode {
    type Error = MessageError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use Opcode::*;
        Ok(match value {
            1 => SyncRequest,
            2 => SyncBatch,
            3 => SyncComplete,
            4 => CropPlanted,
            5 => CropRemoved,
            6 => CropStageUpdated,
            7 => Tilled,
            8 => Untilled,
            9 => PollenHarvested,
            10 => Crossbred,
            11 => StructurePlaced,
            12 => StructureRemoved,
            13 => CropTended,
            other => return Err(MessageError::UnknownOpcode(other)),
        })
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    #[error("empty message")]
    Empty,
    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),
    #[error("payload: {0}")]
    Codec(#[from] CodecError),
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// One replication message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FarmMessage {
    // -- Full sync --
    SyncRequest,
    SyncBatch {
        batch_index: u16,
        total_batches: u16,
        /// Encoded chunks.
        chunks: Vec<Vec<u8>>,
    },
    SyncComplete {
        chunk_count: u32,
    },

    // -- Incremental deltas --
    CropPlanted {
        pos: TilePos,
        plant_id: PlantId,
    },
    CropRemoved {
        pos: TilePos,
    },
    CropStageUpdated {
        pos: TilePos,
        stage: u8,
        total_age: u32,
    },
    Tilled {
        pos: TilePos,
    },
    Untilled {
        pos: TilePos,
    },
    PollenHarvested {
        pos: TilePos,
        count: u8,
    },
    Crossbred {
        pos: TilePos,
        plant_id: PlantId,
    },
    StructurePlaced {
        pos: TilePos,
        structure_id: StructureId,
        placed_day: u32,
    },
    StructureRemoved {
        pos: TilePos,
    },
    CropTended {
        pos: TilePos,
        flags: CropFlags,
    },
}

impl FarmMessage {
    pub fn opcode(&self) -> Opcode {
        match self {
            FarmMessage::SyncRequest => Opcode::SyncRequest,
            FarmMessage::SyncBatch { .. } => Opcode::SyncBatch,
            FarmMessage::SyncComplete { .. } => Opcode::SyncComplete,
            FarmMessage::CropPlanted { .. } => Opcode::CropPlanted,
            FarmMessage::CropRemoved { .. } => Opcode::CropRemoved,
            FarmMessage::CropStageUpdated { .. } => Opcode::CropStageUpdated,
            FarmMessage::Tilled { .. } => Opcode::Tilled,
            FarmMessage::Untilled { .. } => Opcode::Untilled,
            FarmMessage::PollenHarvested { .. } => Opcode::PollenHarvested,
            FarmMessage::Crossbred { .. } => Opcode::Crossbred,
            FarmMessage::StructurePlaced { .. } => Opcode::StructurePlaced,
            FarmMessage::StructureRemoved { .. } => Opcode::StructureRemoved,
            FarmMessage::CropTended { .. } => Opcode::CropTended,
        }
    }

    /// The tile a delta message addresses. `None` for full-sync messages.
    pub fn delta_pos(&self) -> Option<TilePos> {
        match self {
            FarmMessage::SyncRequest
            | FarmMessage::SyncBatch { .. }
            | FarmMessage::SyncComplete { .. } => None,
            FarmMessage::CropPlanted { pos, .. }
            | FarmMessage::CropRemoved { pos }
            | FarmMessage::CropStageUpdated { pos, .. }
            | FarmMessage::Tilled { pos }
            | FarmMessage::Untilled { pos }
            | FarmMessage::PollenHarvested { pos, .. }
            | FarmMessage::Crossbred { pos, .. }
            | FarmMessage::StructurePlaced { pos, .. }
            | FarmMessage::StructureRemoved { pos }
            | FarmMessage::CropTended { pos, .. } => Some(*pos),
        }
    }

    pub fn is_delta(&self) -> bool {
        self.delta_pos().is_some()
    }

    pub fn encode(&self) -> Result<Vec<u8>, MessageError> {
        let mut buf = Vec::with_capacity(16);
        buf.put_u8(self.opcode() as u8);
        match self {
            FarmMessage::SyncRequest => {}
            FarmMessage::SyncBatch {
                batch_index,
                total_batches,
                chunks,
            } => {
                let count = u16::try_from(chunks.len())
                    .map_err(|_| CodecError::TooManyEntries(chunks.len()))?;
                buf.put_u16_le(*batch_index);
                buf.put_u16_le(*total_batches);
                buf.put_u16_le(count);
                for chunk in chunks {
                    put_blob(&mut buf, chunk)?;
                }
            }
            FarmMessage::SyncComplete { chunk_count } => buf.put_u32_le(*chunk_count),
            FarmMessage::CropPlanted { pos, plant_id } | FarmMessage::Crossbred { pos, plant_id } => {
                put_pos(&mut buf, *pos);
                put_string(&mut buf, plant_id.as_str())?;
            }
            FarmMessage::CropRemoved { pos }
            | FarmMessage::Tilled { pos }
            | FarmMessage::Untilled { pos }
            | FarmMessage::StructureRemoved { pos } => put_pos(&mut buf, *pos),
            FarmMessage::CropStageUpdated {
                pos,
                stage,
                total_age,
            } => {
                put_pos(&mut buf, *pos);
                buf.put_u8(*stage);
                buf.put_u32_le(*total_age);
            }
            FarmMessage::PollenHarvested { pos, count } => {
                put_pos(&mut buf, *pos);
                buf.put_u8(*count);
            }
            FarmMessage::StructurePlaced {
                pos,
                structure_id,
                placed_day,
            } => {
                put_pos(&mut buf, *pos);
                put_string(&mut buf, structure_id.as_str())?;
                buf.put_u32_le(*placed_day);
            }
            FarmMessage::CropTended { pos, flags } => {
                put_pos(&mut buf, *pos);
                put_bool(&mut buf, flags.watered);
                put_bool(&mut buf, flags.fertilized);
                put_bool(&mut buf, flags.pollinated);
            }
        }
        Ok(buf)
    }

    /// Decode one message. The whole input must be consumed.
    pub fn decode(data: &[u8]) -> Result<Self, MessageError> {
        let (&op, rest) = data.split_first().ok_or(MessageError::Empty)?;
        let opcode = Opcode::try_from(op)?;
        let mut r = WireReader::new(rest);

        let message = match opcode {
            Opcode::SyncRequest => FarmMessage::SyncRequest,
            Opcode::SyncBatch => {
                let batch_index = r.u16()?;
                let total_batches = r.u16()?;
                let count = r.u16()? as usize;
                let mut chunks = Vec::with_capacity(count.min(r.remaining() / 4));
                for _ in 0..count {
                    chunks.push(r.blob()?.to_vec());
                }
                FarmMessage::SyncBatch {
                    batch_index,
                    total_batches,
                    chunks,
                }
            }
            Opcode::SyncComplete => FarmMessage::SyncComplete {
                chunk_count: r.u32()?,
            },
            Opcode::CropPlanted => FarmMessage::CropPlanted {
                pos: read_pos(&mut r)?,
                plant_id: PlantId(r.string()?),
            },
            Opcode::CropRemoved => FarmMessage::CropRemoved {
                pos: read_pos(&mut r)?,
            },
            Opcode::CropStageUpdated => FarmMessage::CropStageUpdated {
                pos: read_pos(&mut r)?,
                stage: r.u8()?,
                total_age: r.u32()?,
            },
            Opcode::Tilled => FarmMessage::Tilled {
                pos: read_pos(&mut r)?,
            },
            Opcode::Untilled => FarmMessage::Untilled {
                pos: read_pos(&mut r)?,
            },
            Opcode::PollenHarvested => FarmMessage::PollenHarvested {
                pos: read_pos(&mut r)?,
                count: r.u8()?,
            },
            Opcode::Crossbred => FarmMessage::Crossbred {
                pos: read_pos(&mut r)?,
                plant_id: PlantId(r.string()?),
            },
            Opcode::StructurePlaced => FarmMessage::StructurePlaced {
                pos: read_pos(&mut r)?,
                structure_id: StructureId(r.string()?),
                placed_day: r.u32()?,
            },
            Opcode::StructureRemoved => FarmMessage::StructureRemoved {
                pos: read_pos(&mut r)?,
            },
            Opcode::CropTended => FarmMessage::CropTended {
                pos: read_pos(&mut r)?,
                flags: CropFlags {
                    watered: r.bool()?,
                    fertilized: r.bool()?,
                    pollinated: r.bool()?,
                },
            },
        };
        r.finish()?;
        Ok(message)
    }
}

fn put_pos(buf: &mut Vec<u8>, pos: TilePos) {
    buf.put_i32_le(pos.x);
    buf.put_i32_le(pos.y);
}

fn read_pos(r: &mut WireReader<'_>) -> Result<TilePos, CodecError> {
    let x = r.i32()?;
    let y = r.i32()?;
    Ok(TilePos::new(x, y))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos() -> TilePos {
        TilePos::new(-31, 7)
    }

    #[test]
    fn opcodes_are_stable() {
        assert_eq!(Opcode::SyncRequest as u8, 1);
        assert_eq!(Opcode::SyncBatch as u8, 2);
        assert_eq!(Opcode::SyncComplete as u8, 3);
        assert_eq!(Opcode::CropPlanted as u8, 4);
        assert_eq!(Opcode::CropRemoved as u8, 5);
        assert_eq!(Opcode::CropStageUpdated as u8, 6);
        assert_eq!(Opcode::Tilled as u8, 7);
        assert_eq!(Opcode::Untilled as u8, 8);
        assert_eq!(Opcode::PollenHarvested as u8, 9);
        assert_eq!(Opcode::Crossbred as u8, 10);
        assert_eq!(Opcode::StructurePlaced as u8, 11);
        assert_eq!(Opcode::StructureRemoved as u8, 12);
        assert_eq!(Opcode::CropTended as u8, 13);
    }

    #[test]
    fn every_message_round_trips() {
        let messages = vec![
            FarmMessage::SyncRequest,
            FarmMessage::SyncBatch {
                batch_index: 1,
                total_batches: 3,
                chunks: vec![vec![1, 2, 3], vec![], vec![9; 40]],
            },
            FarmMessage::SyncComplete { chunk_count: 23 },
            FarmMessage::CropPlanted {
                pos: pos(),
                plant_id: PlantId::from("turnip"),
            },
            FarmMessage::CropRemoved { pos: pos() },
            FarmMessage::CropStageUpdated {
                pos: pos(),
                stage: 2,
                total_age: 5,
            },
            FarmMessage::Tilled { pos: pos() },
            FarmMessage::Untilled { pos: pos() },
            FarmMessage::PollenHarvested { pos: pos(), count: 2 },
            FarmMessage::Crossbred {
                pos: pos(),
                plant_id: PlantId::from("glowroot"),
            },
            FarmMessage::StructurePlaced {
                pos: pos(),
                structure_id: StructureId::from("fence"),
                placed_day: 14,
            },
            FarmMessage::StructureRemoved { pos: pos() },
            FarmMessage::CropTended {
                pos: pos(),
                flags: CropFlags {
                    watered: true,
                    fertilized: false,
                    pollinated: true,
                },
            },
        ];
        for message in messages {
            let bytes = message.encode().unwrap();
            assert_eq!(bytes[0], message.opcode() as u8);
            assert_eq!(FarmMessage::decode(&bytes).unwrap(), message);
        }
    }

    #[test]
    fn tilled_is_nine_bytes() {
        let bytes = FarmMessage::Tilled { pos: pos() }.encode().unwrap();
        assert_eq!(bytes.len(), 9);
    }

    #[test]
    fn empty_and_unknown_rejected() {
        assert_eq!(FarmMessage::decode(&[]), Err(MessageError::Empty));
        assert_eq!(
            FarmMessage::decode(&[0]),
            Err(MessageError::UnknownOpcode(0))
        );
        assert_eq!(
            FarmMessage::decode(&[200, 1, 2]),
            Err(MessageError::UnknownOpcode(200))
        );
    }

    #[test]
    fn truncated_batch_rejected() {
        let mut bytes = FarmMessage::SyncBatch {
            batch_index: 0,
            total_batches: 1,
            chunks: vec![vec![7; 20]],
        }
        .encode()
        .unwrap();
        bytes.truncate(bytes.len() - 5);
        assert!(matches!(
            FarmMessage::decode(&bytes),
            Err(MessageError::Codec(CodecError::Truncated { .. }))
        ));
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut bytes = FarmMessage::SyncComplete { chunk_count: 1 }.encode().unwrap();
        bytes.push(0);
        assert_eq!(
            FarmMessage::decode(&bytes),
            Err(MessageError::Codec(CodecError::TrailingBytes(1)))
        );
    }

    #[test]
    fn bad_bool_rejected() {
        let mut bytes = FarmMessage::CropTended {
            pos: pos(),
            flags: CropFlags::default(),
        }
        .encode()
        .unwrap();
        bytes[9] = 2;
        assert_eq!(
            FarmMessage::decode(&bytes),
            Err(MessageError::Codec(CodecError::InvalidBool(2)))
        );
    }

    #[test]
    fn delta_classification() {
        assert!(!FarmMessage::SyncRequest.is_delta());
        assert!(!FarmMessage::SyncComplete { chunk_count: 0 }.is_delta());
        assert_eq!(
            FarmMessage::Untilled { pos: pos() }.delta_pos(),
            Some(pos())
        );
    }
}
