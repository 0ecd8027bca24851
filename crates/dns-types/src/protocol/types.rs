use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Maximum length of a single label in a domain name.
pub const LABEL_MAX_LEN: usize = 63;

/// Length of the fixed-size message header.
pub const HEADER_LEN: usize = 12;

/// Octet mask for the AA flag being set (authoritative)
pub const HEADER_MASK_AA: u8 = 0b0000_0100;

/// The only octet recognised as introducing a compression pointer.
///
/// RFC 1035 pointers are 14 bits wide, with the low 6 bits of this
/// octet being the high bits of the offset.  Only offsets which fit in
/// the following octet are supported: an introducer with any of its
/// low 6 bits set is rejected as an invalid label.
pub const POINTER_INTRODUCER: u8 = 0b1100_0000;

/// Maximum number of compression pointers followed while decoding a
/// single name.  A pointer which refers to itself, or a chain which
/// loops, hits this and becomes a decode error.
pub const MAX_POINTER_HOPS: usize = 32;

/// The Internet class, the only class queries are sent for.
pub const CLASS_IN: u16 = 1;

/// Textual rendering of a record with no modelled payload.
pub const NO_DATA: &str = "----";

/// A query sent to a nameserver: a transaction ID and a single
/// question.
///
/// On the wire, the header has all flags clear (a standard query,
/// recursion not desired), QDCOUNT is 1, and all other counts are 0.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Query {
    pub id: u16,
    pub question: Question,
}

/// A decoded response: a summary of the header, and the resource
/// records of each section in the order they appeared.
///
/// The question section is skipped during decoding.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Response {
    pub header: Header,
    pub answers: Vec<ResourceRecord>,
    pub authority: Vec<ResourceRecord>,
    pub additional: Vec<ResourceRecord>,
}

impl Response {
    /// All records, answers first, then authority, then additional.
    ///
    /// Records are value objects: a record identical to one seen
    /// earlier in the response is dropped, so the first occurrence
    /// determines the position.
    pub fn records(&self) -> Vec<ResourceRecord> {
        let mut records = Vec::<ResourceRecord>::with_capacity(
            self.answers.len() + self.authority.len() + self.additional.len(),
        );
        for rr in self
            .answers
            .iter()
            .chain(self.authority.iter())
            .chain(self.additional.iter())
        {
            if !records.contains(rr) {
                records.push(rr.clone());
            }
        }
        records
    }
}

/// The parts of the response header this resolver looks at.
///
/// ```text
///                                     1  1  1  1  1  1
///       0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                      ID                       |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |QR|   Opcode  |AA|TC|RD|RA|   Z    |   RCODE   |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                    QDCOUNT                    |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                    ANCOUNT                    |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                    NSCOUNT                    |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                    ARCOUNT                    |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
/// ```
///
/// See section 4.1.1 of RFC 1035.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Header {
    /// A 16 bit identifier assigned by the program that generates any
    /// kind of query.  This identifier is copied the corresponding
    /// reply and can be used by the requester to match up replies to
    /// outstanding queries.
    pub id: u16,

    /// Authoritative Answer - this bit is valid in responses, and
    /// specifies that the responding name server is an authority for
    /// the domain name in question section.
    pub is_authoritative: bool,

    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

/// A single query: a hostname and a record type.
///
/// Hostnames are dot-separated labels without a trailing dot, and are
/// compared exactly: `Example.com` and `example.com` are different
/// questions.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Question {
    pub name: String,
    pub rtype: RecordType,
}

impl Question {
    pub fn new(name: impl Into<String>, rtype: RecordType) -> Self {
        Self {
            name: name.into(),
            rtype,
        }
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.name, self.rtype)
    }
}

/// A resource record, as decoded from a response or held in the cache.
///
/// Two records are the same record if all of their fields are equal.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ResourceRecord {
    /// The owner name.
    pub name: String,

    pub rtype: RecordType,

    /// Time to live, in seconds.  This is recorded but never counted
    /// down.
    pub ttl: i32,

    pub data: RecordData,
}

impl ResourceRecord {
    /// The question this record answers, which is also its cache key.
    pub fn question(&self) -> Question {
        Question::new(self.name.clone(), self.rtype)
    }

    pub fn address(&self) -> Option<IpAddr> {
        match self.data {
            RecordData::Address(address) => Some(address),
            _ => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.data {
            RecordData::Text(text) => Some(text),
            _ => None,
        }
    }

    /// The same record under a different owner name.
    pub fn with_name(&self, name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..self.clone()
        }
    }
}

impl fmt::Display for ResourceRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} {} {}", self.name, self.ttl, self.rtype, self.data)
    }
}

/// The payload of a record: an address for `A` and `AAAA` records,
/// and text (a domain name) for `NS`, `CNAME`, and `MX` records.
/// Everything else is kept only as a placeholder.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum RecordData {
    Address(IpAddr),
    Text(String),
    Uninterpreted,
}

impl fmt::Display for RecordData {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RecordData::Address(address) => write!(f, "{address}"),
            RecordData::Text(text) => write!(f, "{text}"),
            RecordData::Uninterpreted => write!(f, "{NO_DATA}"),
        }
    }
}

/// Record types are used by resource records and by queries.
///
/// Every 16-bit code has a `RecordType`: codes without their own
/// variant become `Other`, so decoding never fails on an unfamiliar
/// type.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum RecordType {
    A,
    NS,
    CNAME,
    SOA,
    MX,
    AAAA,
    Other(RecordTypeOther),
}

/// A struct with a private constructor, to ensure invalid `RecordType`s
/// cannot be created.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RecordTypeOther(u16);

impl RecordType {
    pub fn is_other(&self) -> bool {
        matches!(self, RecordType::Other(_))
    }

    /// Whether a record of this type, owned by the queried name,
    /// settles a query: either it is the address, or it says where
    /// to look instead.
    pub fn is_answer(&self) -> bool {
        matches!(self, RecordType::A | RecordType::AAAA | RecordType::CNAME)
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RecordType::A => write!(f, "A"),
            RecordType::NS => write!(f, "NS"),
            RecordType::CNAME => write!(f, "CNAME"),
            RecordType::SOA => write!(f, "SOA"),
            RecordType::MX => write!(f, "MX"),
            RecordType::AAAA => write!(f, "AAAA"),
            RecordType::Other(RecordTypeOther(n)) => write!(f, "TYPE{n}"),
        }
    }
}

impl FromStr for RecordType {
    type Err = RecordTypeFromStr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A" => Ok(RecordType::A),
            "NS" => Ok(RecordType::NS),
            "CNAME" => Ok(RecordType::CNAME),
            "SOA" => Ok(RecordType::SOA),
            "MX" => Ok(RecordType::MX),
            "AAAA" => Ok(RecordType::AAAA),
            _ => {
                if let Some(type_str) = s.strip_prefix("TYPE") {
                    if let Ok(type_num) = u16::from_str(type_str) {
                        Ok(RecordType::from(type_num))
                    } else {
                        Err(RecordTypeFromStr::BadType)
                    }
                } else {
                    Err(RecordTypeFromStr::NoParse)
                }
            }
        }
    }
}

/// Errors that can arise when converting a `&str` into a `RecordType`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, thiserror::Error)]
pub enum RecordTypeFromStr {
    #[error("TYPE<num> number must be a u16")]
    BadType,
    #[error("could not parse string to type")]
    NoParse,
}

impl From<u16> for RecordType {
    fn from(value: u16) -> Self {
        match value {
            1 => RecordType::A,
            2 => RecordType::NS,
            5 => RecordType::CNAME,
            6 => RecordType::SOA,
            15 => RecordType::MX,
            28 => RecordType::AAAA,
            _ => RecordType::Other(RecordTypeOther(value)),
        }
    }
}

impl From<RecordType> for u16 {
    fn from(value: RecordType) -> Self {
        match value {
            RecordType::A => 1,
            RecordType::NS => 2,
            RecordType::CNAME => 5,
            RecordType::SOA => 6,
            RecordType::MX => 15,
            RecordType::AAAA => 28,
            RecordType::Other(RecordTypeOther(value)) => value,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::test_util::*;
    use super::*;

    #[test]
    fn u16_recordtype_roundtrip() {
        for i in 0..100 {
            assert_eq!(u16::from(RecordType::from(i)), i);
        }
    }

    #[test]
    fn unmodelled_codes_are_other() {
        assert_eq!("TYPE99", RecordType::from(99).to_string());
        assert!(RecordType::from(99).is_other());
        assert!(!RecordType::from(28).is_other());
    }

    #[test]
    fn recordtype_from_str() {
        assert_eq!(Ok(RecordType::AAAA), "AAAA".parse());
        assert_eq!(Ok(RecordType::MX), "TYPE15".parse());
        assert_eq!(Ok(RecordType::from(99)), "TYPE99".parse());
        assert_eq!(
            Err(RecordTypeFromStr::BadType),
            "TYPE70000".parse::<RecordType>()
        );
        assert_eq!(Err(RecordTypeFromStr::NoParse), "a".parse::<RecordType>());
    }

    #[test]
    fn records_are_deduplicated_in_order() {
        let response = Response {
            header: Header {
                id: 1,
                is_authoritative: false,
                qdcount: 1,
                ancount: 0,
                nscount: 2,
                arcount: 2,
            },
            answers: Vec::new(),
            authority: vec![
                ns_record("com", "b.gtld-servers.net"),
                ns_record("com", "a.gtld-servers.net"),
            ],
            additional: vec![
                a_record("b.gtld-servers.net", Ipv4Addr::new(192, 33, 14, 30)),
                ns_record("com", "b.gtld-servers.net"),
            ],
        };

        assert_eq!(
            vec![
                ns_record("com", "b.gtld-servers.net"),
                ns_record("com", "a.gtld-servers.net"),
                a_record("b.gtld-servers.net", Ipv4Addr::new(192, 33, 14, 30)),
            ],
            response.records()
        );
    }

    #[test]
    fn uninterpreted_renders_placeholder() {
        assert_eq!("----", other_record("example.com", 99).data.to_string());
    }
}

#[cfg(any(feature = "test-util", test))]
#[allow(clippy::missing_panics_doc)]
pub mod test_util {
    use std::net::{Ipv4Addr, Ipv6Addr};

    use super::*;
    use crate::protocol::serialise::WritableBuffer;

    pub fn a_record(name: &str, address: Ipv4Addr) -> ResourceRecord {
        ResourceRecord {
            name: name.to_string(),
            rtype: RecordType::A,
            ttl: 300,
            data: RecordData::Address(IpAddr::V4(address)),
        }
    }

    pub fn aaaa_record(name: &str, address: Ipv6Addr) -> ResourceRecord {
        ResourceRecord {
            name: name.to_string(),
            rtype: RecordType::AAAA,
            ttl: 300,
            data: RecordData::Address(IpAddr::V6(address)),
        }
    }

    pub fn cname_record(name: &str, target_name: &str) -> ResourceRecord {
        ResourceRecord {
            name: name.to_string(),
            rtype: RecordType::CNAME,
            ttl: 300,
            data: RecordData::Text(target_name.to_string()),
        }
    }

    pub fn ns_record(superdomain_name: &str, nameserver_name: &str) -> ResourceRecord {
        ResourceRecord {
            name: superdomain_name.to_string(),
            rtype: RecordType::NS,
            ttl: 300,
            data: RecordData::Text(nameserver_name.to_string()),
        }
    }

    pub fn mx_record(name: &str, exchange: &str) -> ResourceRecord {
        ResourceRecord {
            name: name.to_string(),
            rtype: RecordType::MX,
            ttl: 300,
            data: RecordData::Text(exchange.to_string()),
        }
    }

    pub fn other_record(name: &str, code: u16) -> ResourceRecord {
        ResourceRecord {
            name: name.to_string(),
            rtype: RecordType::from(code),
            ttl: 300,
            data: RecordData::Uninterpreted,
        }
    }

    /// Serialise a response the way a nameserver would, without name
    /// compression.  `Uninterpreted` records get empty RDATA.
    pub fn response_octets(
        id: u16,
        is_authoritative: bool,
        question: &Question,
        answers: &[ResourceRecord],
        authority: &[ResourceRecord],
        additional: &[ResourceRecord],
    ) -> Vec<u8> {
        let mut buffer = WritableBuffer::default();
        buffer.write_u16(id);
        buffer.write_u8(if is_authoritative {
            0b1000_0000 | HEADER_MASK_AA
        } else {
            0b1000_0000
        });
        buffer.write_u8(0);
        buffer.write_u16(1);
        buffer.write_u16(answers.len().try_into().unwrap());
        buffer.write_u16(authority.len().try_into().unwrap());
        buffer.write_u16(additional.len().try_into().unwrap());
        buffer.write_domain(&question.name).unwrap();
        buffer.write_u16(question.rtype.into());
        buffer.write_u16(CLASS_IN);

        for rr in answers.iter().chain(authority).chain(additional) {
            write_record(&mut buffer, rr);
        }

        buffer.octets.to_vec()
    }

    pub fn write_record(buffer: &mut WritableBuffer, rr: &ResourceRecord) {
        let mut rdata = WritableBuffer::default();
        match (&rr.rtype, &rr.data) {
            (_, RecordData::Address(IpAddr::V4(address))) => rdata.write_octets(&address.octets()),
            (_, RecordData::Address(IpAddr::V6(address))) => rdata.write_octets(&address.octets()),
            (RecordType::MX, RecordData::Text(exchange)) => {
                rdata.write_u16(10);
                rdata.write_domain(exchange).unwrap();
            }
            (_, RecordData::Text(name)) => rdata.write_domain(name).unwrap(),
            (_, RecordData::Uninterpreted) => (),
        }

        buffer.write_domain(&rr.name).unwrap();
        buffer.write_u16(rr.rtype.into());
        buffer.write_u16(CLASS_IN);
        buffer.write_octets(&rr.ttl.to_be_bytes());
        buffer.write_u16(rdata.octets.len().try_into().unwrap());
        buffer.write_octets(&rdata.octets);
    }
}
