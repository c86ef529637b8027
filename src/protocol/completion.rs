use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::layer::tx::DescId;

use super::DecodingError;

pub const COMPLETION_HDR_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum CompletionStatus {
    Ok = 0,
    Discard = 1,
    NoAck = 2,
    DownloadFail = 3,
}

impl CompletionStatus {
    #[must_use]
    #[inline]
    pub fn is_error(self) -> bool {
        self != CompletionStatus::Ok
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRecord {
    status: CompletionStatus,
    ids: Vec<DescId>,
}

pub struct CompletionRecordBuilder {
    pub status: CompletionStatus,
    pub ids: Vec<DescId>,
}

impl CompletionRecordBuilder {
    pub fn build(self) -> Result<CompletionRecord, Error> {
        if self.ids.len() > u16::MAX as usize {
            return Err(Error::TooManyIds);
        }
        Ok(CompletionRecord {
            status: self.status,
            ids: self.ids,
        })
    }
}

#[derive(Debug)]
pub enum Error {
    TooManyIds,
}

impl CompletionRecord {
    /// Reads one record and advances `rdr` past it.
    pub fn read_from(rdr: &mut &[u8]) -> Result<Self, DecodingError> {
        let status = rdr
            .read_u8()
            .map_err(|_e| DecodingError::Decoding { field: "status" })?;
        let status = CompletionStatus::try_from(status)
            .map_err(|_e| DecodingError::Decoding { field: "status" })?;
        let count = rdr
            .read_u16::<BigEndian>()
            .map_err(|_e| DecodingError::Decoding { field: "count" })?;
        let mut ids = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let id = rdr
                .read_u16::<BigEndian>()
                .map_err(|_e| DecodingError::Decoding { field: "id" })?;
            ids.push(DescId::from_u16(id));
        }
        Ok(CompletionRecord { status, ids })
    }

    pub fn append_to(&self, wtr: &mut Vec<u8>) {
        let mut record = Vec::with_capacity(self.len());
        record.write_u8(self.status.into()).unwrap();
        record.write_u16::<BigEndian>(self.ids.len() as u16).unwrap();
        for id in &self.ids {
            record.write_u16::<BigEndian>(id.to_u16()).unwrap();
        }
        assert_eq!(record.len(), self.len());
        wtr.extend_from_slice(&record);
    }

    #[must_use]
    #[inline]
    pub fn status(&self) -> CompletionStatus {
        self.status
    }

    #[must_use]
    #[inline]
    pub fn ids(&self) -> &[DescId] {
        &self.ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        COMPLETION_HDR_LEN + self.ids.len() * 2
    }
}
