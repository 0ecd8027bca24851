//! Deserialisation of DNS responses from the network.  See the `types`
//! module for details of the format.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::protocol::types::*;

impl Response {
    /// # Errors
    ///
    /// If the response cannot be parsed.
    pub fn from_octets(octets: &[u8]) -> Result<Self, Error> {
        Self::deserialise(&mut DecodeContext::new(octets))
    }

    /// # Errors
    ///
    /// If the response cannot be parsed.
    pub fn deserialise(context: &mut DecodeContext) -> Result<Self, Error> {
        let header = Header::deserialise(&mut context.buffer)?;
        tracing::trace!(id = %header.id, authoritative = %header.is_authoritative, "response");

        // skip the single question: it is the one we sent.
        context.domain(header.id)?;
        context
            .buffer
            .take(4)
            .ok_or(Error::QuestionTooShort(header.id))?;

        let answers = deserialise_section(context, header.id, "answers", header.ancount)?;
        let authority = deserialise_section(context, header.id, "nameservers", header.nscount)?;
        let additional = deserialise_section(context, header.id, "additional", header.arcount)?;

        Ok(Self {
            header,
            answers,
            authority,
            additional,
        })
    }
}

/// Helper for `Response::deserialise`: read `count` records.
fn deserialise_section(
    context: &mut DecodeContext,
    id: u16,
    section: &'static str,
    count: u16,
) -> Result<Vec<ResourceRecord>, Error> {
    tracing::trace!(%count, "{section}");

    let mut rrs = Vec::with_capacity(count.into());
    for _ in 0..count {
        let rr = ResourceRecord::deserialise(id, context)?;
        tracing::trace!(name = %rr.name, ttl = %rr.ttl, rtype = %rr.rtype, data = %rr.data, "record");
        rrs.push(rr);
    }
    Ok(rrs)
}

impl Header {
    /// # Errors
    ///
    /// If the header is too short.
    pub fn deserialise(buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let id = buffer.next_u16().ok_or(Error::CompletelyBusted)?;
        let flags1 = buffer.next_u8().ok_or(Error::HeaderTooShort(id))?;
        let _flags2 = buffer.next_u8().ok_or(Error::HeaderTooShort(id))?;
        let qdcount = buffer.next_u16().ok_or(Error::HeaderTooShort(id))?;
        let ancount = buffer.next_u16().ok_or(Error::HeaderTooShort(id))?;
        let nscount = buffer.next_u16().ok_or(Error::HeaderTooShort(id))?;
        let arcount = buffer.next_u16().ok_or(Error::HeaderTooShort(id))?;

        Ok(Self {
            id,
            is_authoritative: flags1 & HEADER_MASK_AA != 0,
            qdcount,
            ancount,
            nscount,
            arcount,
        })
    }
}

impl ResourceRecord {
    /// # Errors
    ///
    /// If the record cannot be parsed.
    pub fn deserialise(id: u16, context: &mut DecodeContext) -> Result<Self, Error> {
        let name = context.domain(id)?;
        let rtype = RecordType::from(
            context
                .buffer
                .next_u16()
                .ok_or(Error::ResourceRecordTooShort(id))?,
        );
        let _rclass = context
            .buffer
            .next_u16()
            .ok_or(Error::ResourceRecordTooShort(id))?;
        let ttl = context
            .buffer
            .next_i32()
            .ok_or(Error::ResourceRecordTooShort(id))?;
        let rdlength = context
            .buffer
            .next_u16()
            .ok_or(Error::ResourceRecordTooShort(id))?;

        let data = match rtype {
            // the name consumes its own octets, whatever RDLENGTH says.
            RecordType::NS | RecordType::CNAME => RecordData::Text(context.domain(id)?),
            RecordType::AAAA => {
                let octets = context
                    .buffer
                    .take(16)
                    .ok_or(Error::ResourceRecordTooShort(id))?;
                let mut address = [0; 16];
                address.copy_from_slice(octets);
                RecordData::Address(IpAddr::V6(Ipv6Addr::from(address)))
            }
            _ => {
                let rdata_start = context.buffer.position();
                let rdata = context
                    .buffer
                    .take(rdlength.into())
                    .ok_or(Error::ResourceRecordTooShort(id))?;

                match rtype {
                    RecordType::A => match <[u8; 4]>::try_from(rdata) {
                        Ok(octets) => RecordData::Address(IpAddr::V4(Ipv4Addr::from(octets))),
                        Err(_) => {
                            tracing::debug!(%name, %rdlength, "A record with bad RDLENGTH");
                            RecordData::Uninterpreted
                        }
                    },
                    // preference, then exchange
                    RecordType::MX if rdata.len() > 2 => {
                        RecordData::Text(context.domain_at(id, rdata_start + 2, 0)?)
                    }
                    _ => RecordData::Uninterpreted,
                }
            }
        };

        Ok(Self {
            name,
            rtype,
            ttl,
            data,
        })
    }
}

/// State for decoding a single message: the read cursor, and every
/// name found at the target of a compression pointer so far, by
/// offset.
///
/// A name is decoded by reading labels until a zero octet or a
/// pointer.  A pointer (`0xC0` followed by a one-octet offset)
/// splices in the name found at that offset, which may itself end in
/// another pointer.
pub struct DecodeContext<'a> {
    pub buffer: ConsumableBuffer<'a>,
    pointers: HashMap<usize, String>,
}

impl<'a> DecodeContext<'a> {
    pub fn new(octets: &'a [u8]) -> Self {
        Self {
            buffer: ConsumableBuffer::new(octets),
            pointers: HashMap::new(),
        }
    }

    /// Decode the name at the cursor, advancing past it.
    ///
    /// # Errors
    ///
    /// If the name is truncated, has an invalid label, or follows too
    /// many pointers.
    pub fn domain(&mut self, id: u16) -> Result<String, Error> {
        let mut cursor = self.buffer;
        let name = self.labels(id, &mut cursor, 0)?;
        self.buffer = cursor;
        Ok(name)
    }

    /// The name previously found at this offset, if any.
    pub fn memoised(&self, offset: usize) -> Option<&str> {
        self.pointers.get(&offset).map(String::as_str)
    }

    /// Decode the name at an absolute offset, without moving the
    /// cursor.  `hops` is the number of pointers already followed to
    /// get here.
    fn domain_at(&mut self, id: u16, offset: usize, hops: usize) -> Result<String, Error> {
        if let Some(name) = self.pointers.get(&offset) {
            return Ok(name.clone());
        }

        if hops >= MAX_POINTER_HOPS {
            return Err(Error::DomainPointerLoop(id));
        }

        let mut cursor = self.buffer.at_offset(offset);
        let name = self.labels(id, &mut cursor, hops + 1)?;
        self.pointers.insert(offset, name.clone());
        Ok(name)
    }

    fn labels(
        &mut self,
        id: u16,
        cursor: &mut ConsumableBuffer<'a>,
        hops: usize,
    ) -> Result<String, Error> {
        let mut name = String::new();

        loop {
            let size = cursor.next_u8().ok_or(Error::DomainTooShort(id))?;

            if size == 0 {
                break;
            }

            if size == POINTER_INTRODUCER {
                let offset = cursor.next_u8().ok_or(Error::DomainTooShort(id))?;
                let suffix = self.domain_at(id, offset.into(), hops)?;
                if !suffix.is_empty() {
                    if !name.is_empty() {
                        name.push('.');
                    }
                    name.push_str(&suffix);
                }
                break;
            }

            if usize::from(size) > LABEL_MAX_LEN {
                return Err(Error::DomainLabelInvalid(id));
            }

            let label = cursor
                .take(size.into())
                .ok_or(Error::DomainTooShort(id))?;
            if !name.is_empty() {
                name.push('.');
            }
            name.push_str(&String::from_utf8_lossy(label));
        }

        Ok(name)
    }
}

/// Errors encountered when parsing a datagram.  In all the errors
/// which have a `u16` parameter, that is the ID from the header.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, thiserror::Error)]
pub enum Error {
    /// The datagram is not even 2 octets long, so it doesn't even
    /// contain a valid ID.
    #[error("datagram too short to hold an ID")]
    CompletelyBusted,

    /// The header is missing one or more required fields.
    #[error("header too short (id {0})")]
    HeaderTooShort(u16),

    /// A question ends with an incomplete field.
    #[error("question too short (id {0})")]
    QuestionTooShort(u16),

    /// A resource record ends with an incomplete field.
    #[error("resource record too short (id {0})")]
    ResourceRecordTooShort(u16),

    /// A domain is incomplete.
    #[error("domain too short (id {0})")]
    DomainTooShort(u16),

    /// A domain label is longer than 63 octets, but not a pointer
    /// this decoder understands.
    #[error("domain label invalid (id {0})")]
    DomainLabelInvalid(u16),

    /// Following compression pointers did not reach the end of the
    /// name.
    #[error("domain pointers loop (id {0})")]
    DomainPointerLoop(u16),
}

impl Error {
    pub fn id(self) -> Option<u16> {
        match self {
            Error::CompletelyBusted => None,
            Error::HeaderTooShort(id) => Some(id),
            Error::QuestionTooShort(id) => Some(id),
            Error::ResourceRecordTooShort(id) => Some(id),
            Error::DomainTooShort(id) => Some(id),
            Error::DomainLabelInvalid(id) => Some(id),
            Error::DomainPointerLoop(id) => Some(id),
        }
    }
}

/// A buffer which will be consumed by the parsing process.
#[derive(Debug, Copy, Clone)]
pub struct ConsumableBuffer<'a> {
    octets: &'a [u8],
    position: usize,
}

impl<'a> ConsumableBuffer<'a> {
    pub fn new(octets: &'a [u8]) -> Self {
        Self {
            octets,
            position: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn next_u8(&mut self) -> Option<u8> {
        let octet = *self.octets.get(self.position)?;
        self.position += 1;
        Some(octet)
    }

    pub fn next_u16(&mut self) -> Option<u16> {
        let octets = self.take(2)?;
        Some(u16::from_be_bytes([octets[0], octets[1]]))
    }

    pub fn next_i32(&mut self) -> Option<i32> {
        let octets = self.take(4)?;
        Some(i32::from_be_bytes([
            octets[0], octets[1], octets[2], octets[3],
        ]))
    }

    pub fn take(&mut self, size: usize) -> Option<&'a [u8]> {
        if self.octets.len() >= self.position + size {
            let slice = &self.octets[self.position..self.position + size];
            self.position += size;
            Some(slice)
        } else {
            None
        }
    }

    pub fn at_offset(&self, position: usize) -> ConsumableBuffer<'a> {
        Self {
            octets: self.octets,
            position,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::protocol::serialise::WritableBuffer;
    use crate::protocol::types::test_util::*;

    /// A response for `example.com A` whose question name starts at
    /// offset 12, followed by the given records.
    fn compressed_response(ancount: u16, records: &[u8]) -> Vec<u8> {
        let mut octets = vec![
            0x12, 0x34, // id
            0x84, 0x00, // flags: response, authoritative
            0x00, 0x01, // qdcount
            0x00, 0x00, // ancount
            0x00, 0x00, // nscount
            0x00, 0x00, // arcount
        ];
        octets[6..8].copy_from_slice(&ancount.to_be_bytes());
        octets.push(7);
        octets.extend_from_slice(b"example");
        octets.push(3);
        octets.extend_from_slice(b"com");
        octets.push(0);
        octets.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]);
        octets.extend_from_slice(records);
        octets
    }

    fn rr_fields(rtype: u16, ttl: i32, rdata: &[u8]) -> Vec<u8> {
        let mut octets = Vec::new();
        octets.extend_from_slice(&rtype.to_be_bytes());
        octets.extend_from_slice(&[0x00, 0x01]);
        octets.extend_from_slice(&ttl.to_be_bytes());
        octets.extend_from_slice(&u16::try_from(rdata.len()).unwrap().to_be_bytes());
        octets.extend_from_slice(rdata);
        octets
    }

    #[test]
    fn header_flags_and_counts() {
        let octets = compressed_response(0, &[]);
        let response = Response::from_octets(&octets).unwrap();

        assert_eq!(
            Header {
                id: 0x1234,
                is_authoritative: true,
                qdcount: 1,
                ancount: 0,
                nscount: 0,
                arcount: 0,
            },
            response.header
        );
    }

    #[test]
    fn owner_name_pointer() {
        let mut records = vec![0xc0, 12];
        records.extend(rr_fields(1, 300, &[1, 2, 3, 4]));
        let octets = compressed_response(1, &records);

        let mut context = DecodeContext::new(&octets);
        let response = Response::deserialise(&mut context).unwrap();

        assert_eq!(
            vec![a_record("example.com", Ipv4Addr::new(1, 2, 3, 4))],
            response.answers
        );
        assert_eq!(Some("example.com"), context.memoised(12));
    }

    #[test]
    fn second_pointer_uses_memoised_name() {
        let mut records = vec![0xc0, 12];
        records.extend(rr_fields(1, 300, &[1, 2, 3, 4]));
        records.extend([0xc0, 12]);
        records.extend(rr_fields(1, 300, &[5, 6, 7, 8]));
        let octets = compressed_response(2, &records);

        let mut context = DecodeContext::new(&octets);
        let header = Header::deserialise(&mut context.buffer).unwrap();
        context.domain(header.id).unwrap();
        context.buffer.take(4).unwrap();

        let first = ResourceRecord::deserialise(header.id, &mut context).unwrap();
        // anything decoded from offset 12 now comes from the memo,
        // not from the octets.
        context.pointers.insert(12, "memo.invalid".to_string());
        let second = ResourceRecord::deserialise(header.id, &mut context).unwrap();

        assert_eq!("example.com", first.name);
        assert_eq!("memo.invalid", second.name);
    }

    #[test]
    fn label_then_pointer_is_spliced() {
        let mut records = vec![3, b'w', b'w', b'w', 0xc0, 12];
        records.extend(rr_fields(5, 60, &[0xc0, 12]));
        let octets = compressed_response(1, &records);

        let response = Response::from_octets(&octets).unwrap();

        let mut expected = cname_record("www.example.com", "example.com");
        expected.ttl = 60;
        assert_eq!(vec![expected], response.answers);
    }

    #[test]
    fn pointer_to_name_ending_in_pointer() {
        // record 1 owner is "www" + pointer to 12, at offset 29
        let mut records = vec![3, b'w', b'w', b'w', 0xc0, 12];
        records.extend(rr_fields(1, 300, &[1, 1, 1, 1]));
        // record 2 owner points at record 1's owner
        records.extend([0xc0, 29]);
        records.extend(rr_fields(1, 300, &[2, 2, 2, 2]));
        let octets = compressed_response(2, &records);

        let response = Response::from_octets(&octets).unwrap();

        assert_eq!(
            vec![
                a_record("www.example.com", Ipv4Addr::new(1, 1, 1, 1)),
                a_record("www.example.com", Ipv4Addr::new(2, 2, 2, 2)),
            ],
            response.answers
        );
    }

    #[test]
    fn self_referential_pointer_is_an_error() {
        // offset 29 points at itself
        let mut records = vec![0xc0, 29];
        records.extend(rr_fields(1, 300, &[1, 1, 1, 1]));
        let octets = compressed_response(1, &records);

        assert_eq!(
            Err(Error::DomainPointerLoop(0x1234)),
            Response::from_octets(&octets)
        );
    }

    #[test]
    fn wide_pointer_is_rejected() {
        let mut records = vec![0xc1, 12];
        records.extend(rr_fields(1, 300, &[1, 1, 1, 1]));
        let octets = compressed_response(1, &records);

        assert_eq!(
            Err(Error::DomainLabelInvalid(0x1234)),
            Response::from_octets(&octets)
        );
    }

    #[test]
    fn names_preserve_case() {
        let mut records = vec![3, b'W', b'w', b'W', 0];
        records.extend(rr_fields(1, 300, &[1, 1, 1, 1]));
        let octets = compressed_response(1, &records);

        let response = Response::from_octets(&octets).unwrap();

        assert_eq!("WwW", response.answers[0].name);
    }

    #[test]
    fn unknown_type_is_skipped() {
        let mut records = vec![0xc0, 12];
        records.extend(rr_fields(99, 300, &[9, 9, 9, 9, 9]));
        records.extend([0xc0, 12]);
        records.extend(rr_fields(1, 300, &[1, 2, 3, 4]));
        let octets = compressed_response(2, &records);

        let response = Response::from_octets(&octets).unwrap();

        assert_eq!(
            vec![
                other_record("example.com", 99),
                a_record("example.com", Ipv4Addr::new(1, 2, 3, 4)),
            ],
            response.answers
        );
        assert_eq!("----", response.answers[0].data.to_string());
    }

    #[test]
    fn a_record_with_bad_rdlength_stays_aligned() {
        let mut records = vec![0xc0, 12];
        records.extend(rr_fields(1, 300, &[1, 2, 3, 4, 5, 6]));
        records.extend([0xc0, 12]);
        records.extend(rr_fields(1, 300, &[1, 2, 3, 4]));
        let octets = compressed_response(2, &records);

        let response = Response::from_octets(&octets).unwrap();

        assert_eq!(RecordData::Uninterpreted, response.answers[0].data);
        assert_eq!(
            a_record("example.com", Ipv4Addr::new(1, 2, 3, 4)),
            response.answers[1]
        );
    }

    #[test]
    fn mx_exchange_is_decoded() {
        let mut records = vec![0xc0, 12];
        let mut rdata = vec![0x00, 0x0a, 4];
        rdata.extend_from_slice(b"mail");
        rdata.extend([0xc0, 12]);
        records.extend(rr_fields(15, 300, &rdata));
        records.extend([0xc0, 12]);
        records.extend(rr_fields(1, 300, &[1, 2, 3, 4]));
        let octets = compressed_response(2, &records);

        let response = Response::from_octets(&octets).unwrap();

        assert_eq!(
            vec![
                mx_record("example.com", "mail.example.com"),
                a_record("example.com", Ipv4Addr::new(1, 2, 3, 4)),
            ],
            response.answers
        );
    }

    #[test]
    fn negative_ttl_is_kept() {
        let mut records = vec![0xc0, 12];
        records.extend(rr_fields(1, -1, &[1, 2, 3, 4]));
        let octets = compressed_response(1, &records);

        let response = Response::from_octets(&octets).unwrap();

        assert_eq!(-1, response.answers[0].ttl);
    }

    #[test]
    fn zero_filled_buffer_has_no_records() {
        let octets = vec![0; 1024];
        let response = Response::from_octets(&octets).unwrap();

        assert!(response.records().is_empty());
    }

    #[test]
    fn truncated_response_is_an_error() {
        let mut records = vec![0xc0, 12];
        records.extend(rr_fields(1, 300, &[1, 2, 3, 4]));
        let octets = compressed_response(1, &records);

        for len in 0..octets.len() {
            assert!(Response::from_octets(&octets[..len]).is_err());
        }
    }

    #[test]
    fn query_then_response_roundtrip() {
        let question = Question::new("Host.Example.com", RecordType::A);
        let query = Query {
            id: 7,
            question: question.clone(),
        };
        let query_octets = query.to_octets().unwrap();

        // a nameserver echoes the header ID and question section
        let mut buffer = WritableBuffer::default();
        buffer.write_octets(&query_octets[..2]);
        buffer.write_u8(0b1000_0000);
        buffer.write_u8(0);
        buffer.write_u16(1);
        buffer.write_u16(1);
        buffer.write_u16(0);
        buffer.write_u16(0);
        buffer.write_octets(&query_octets[HEADER_LEN..]);
        write_record(
            &mut buffer,
            &a_record("Host.Example.com", Ipv4Addr::new(10, 0, 0, 1)),
        );

        let response = Response::from_octets(&buffer.octets).unwrap();

        assert_eq!(7, response.header.id);
        assert_eq!(question.name, response.answers[0].name);
    }

    #[test]
    fn sections_are_kept_apart() {
        let question = Question::new("www.example.com", RecordType::A);
        let octets = response_octets(
            99,
            false,
            &question,
            &[],
            &[ns_record("example.com", "ns1.example.com")],
            &[a_record("ns1.example.com", Ipv4Addr::new(192, 0, 2, 1))],
        );

        let response = Response::from_octets(&octets).unwrap();

        assert!(response.answers.is_empty());
        assert_eq!(
            vec![ns_record("example.com", "ns1.example.com")],
            response.authority
        );
        assert_eq!(
            vec![a_record("ns1.example.com", Ipv4Addr::new(192, 0, 2, 1))],
            response.additional
        );
    }
}
