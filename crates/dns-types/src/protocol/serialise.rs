//! Serialisation of DNS queries to the wire format.  See the `types`
//! module for details of the format.
//!
//! Names are always written out in full: compression only matters
//! when decoding responses.

use bytes::{BufMut, Bytes, BytesMut};

use crate::protocol::types::*;

impl Query {
    /// # Errors
    ///
    /// If the hostname has a label longer than 63 octets.
    pub fn to_octets(&self) -> Result<Bytes, Error> {
        let mut buffer = WritableBuffer::default();
        self.serialise(&mut buffer)?;
        Ok(buffer.octets.freeze())
    }

    /// # Errors
    ///
    /// If the hostname has a label longer than 63 octets.
    pub fn serialise(&self, buffer: &mut WritableBuffer) -> Result<(), Error> {
        // standard query, not authoritative, not truncated, recursion
        // not desired: resolution is iterative.
        buffer.write_u16(self.id);
        buffer.write_u8(0);
        buffer.write_u8(0);
        buffer.write_u16(1);
        buffer.write_u16(0);
        buffer.write_u16(0);
        buffer.write_u16(0);

        self.question.serialise(buffer)
    }
}

impl Question {
    /// # Errors
    ///
    /// If the hostname has a label longer than 63 octets.
    pub fn serialise(&self, buffer: &mut WritableBuffer) -> Result<(), Error> {
        buffer.write_domain(&self.name)?;
        buffer.write_u16(self.rtype.into());
        buffer.write_u16(CLASS_IN);
        Ok(())
    }
}

/// Errors encountered when serialising a query.
#[derive(Debug, Clone, Eq, PartialEq, Hash, thiserror::Error)]
pub enum Error {
    /// A label does not fit in a single length octet.
    #[error("label '{label}' is longer than 63 octets")]
    LabelTooLong { label: String },
}

/// A buffer which can be written to, for serialisation purposes.
pub struct WritableBuffer {
    pub octets: BytesMut,
}

impl Default for WritableBuffer {
    fn default() -> Self {
        Self {
            octets: BytesMut::with_capacity(512),
        }
    }
}

impl WritableBuffer {
    pub fn write_u8(&mut self, octet: u8) {
        self.octets.put_u8(octet);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.octets.put_u16(value);
    }

    pub fn write_octets(&mut self, octets: &[u8]) {
        self.octets.put_slice(octets);
    }

    /// Write a dotted hostname as length-prefixed labels followed by
    /// the zero-length root label.  Empty labels (from a trailing dot,
    /// or the empty name) are skipped.
    ///
    /// # Errors
    ///
    /// If a label is longer than 63 octets.
    pub fn write_domain(&mut self, name: &str) -> Result<(), Error> {
        for label in name.split('.').filter(|label| !label.is_empty()) {
            match u8::try_from(label.len()) {
                Ok(len) if usize::from(len) <= LABEL_MAX_LEN => {
                    self.write_u8(len);
                    self.write_octets(label.as_bytes());
                }
                _ => {
                    return Err(Error::LabelTooLong {
                        label: label.to_string(),
                    })
                }
            }
        }
        self.write_u8(0);
        Ok(())
    }
}
