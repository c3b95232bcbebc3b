// ── BER codec ──
//
// Just enough ASN.1 BER for SNMPv2c GetRequest / GetNextRequest /
// Response messages. Definite lengths only; lengths up to 4 octets.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::Error;
use crate::oid::Oid;
use crate::value::{Value, VarBind};

/// `version` field of an SNMPv2c message.
pub const SNMP_V2C: i64 = 1;

mod tag {
    pub const INTEGER: u8 = 0x02;
    pub const OCTET_STRING: u8 = 0x04;
    pub const NULL: u8 = 0x05;
    pub const OBJECT_IDENTIFIER: u8 = 0x06;
    pub const SEQUENCE: u8 = 0x30;
    pub const IP_ADDRESS: u8 = 0x40;
    pub const COUNTER32: u8 = 0x41;
    pub const GAUGE32: u8 = 0x42;
    pub const TIME_TICKS: u8 = 0x43;
    pub const OPAQUE: u8 = 0x44;
    pub const COUNTER64: u8 = 0x46;
    pub const NO_SUCH_OBJECT: u8 = 0x80;
    pub const NO_SUCH_INSTANCE: u8 = 0x81;
    pub const END_OF_MIB_VIEW: u8 = 0x82;
    pub const GET_REQUEST: u8 = 0xA0;
    pub const GET_NEXT_REQUEST: u8 = 0xA1;
    pub const RESPONSE: u8 = 0xA2;
}

// ── Message types ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PduKind {
    GetRequest,
    GetNextRequest,
    Response,
}

impl PduKind {
    fn tag(self) -> u8 {
        match self {
            Self::GetRequest => tag::GET_REQUEST,
            Self::GetNextRequest => tag::GET_NEXT_REQUEST,
            Self::Response => tag::RESPONSE,
        }
    }

    fn from_tag(t: u8) -> Option<Self> {
        match t {
            tag::GET_REQUEST => Some(Self::GetRequest),
            tag::GET_NEXT_REQUEST => Some(Self::GetNextRequest),
            tag::RESPONSE => Some(Self::Response),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdu {
    pub kind: PduKind,
    pub request_id: i32,
    pub error_status: u32,
    pub error_index: u32,
    pub varbinds: Vec<VarBind>,
}

impl Pdu {
    /// A request PDU with NULL values for every OID.
    pub fn request(kind: PduKind, request_id: i32, oids: &[Oid]) -> Self {
        Self {
            kind,
            request_id,
            error_status: 0,
            error_index: 0,
            varbinds: oids.iter().cloned().map(VarBind::null).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub version: i64,
    pub community: Bytes,
    pub pdu: Pdu,
}

// ── Encoding ─────────────────────────────────────────────────────────

pub fn encode_message(msg: &Message) -> Result<Bytes, Error> {
    let mut varbinds = BytesMut::new();
    for vb in &msg.pdu.varbinds {
        let mut inner = BytesMut::new();
        put_oid(&mut inner, &vb.oid)?;
        put_value(&mut inner, &vb.value)?;
        put_tlv(&mut varbinds, tag::SEQUENCE, &inner);
    }

    let mut pdu = BytesMut::new();
    put_integer(&mut pdu, i64::from(msg.pdu.request_id));
    put_integer(&mut pdu, i64::from(msg.pdu.error_status));
    put_integer(&mut pdu, i64::from(msg.pdu.error_index));
    put_tlv(&mut pdu, tag::SEQUENCE, &varbinds);

    let mut body = BytesMut::new();
    put_integer(&mut body, msg.version);
    put_tlv(&mut body, tag::OCTET_STRING, &msg.community);
    put_tlv(&mut body, msg.pdu.kind.tag(), &pdu);

    let mut out = BytesMut::with_capacity(body.len() + 6);
    put_tlv(&mut out, tag::SEQUENCE, &body);
    Ok(out.freeze())
}

fn put_tlv(buf: &mut BytesMut, t: u8, content: &[u8]) {
    buf.put_u8(t);
    put_length(buf, content.len());
    buf.put_slice(content);
}

fn put_length(buf: &mut BytesMut, len: usize) {
    match u8::try_from(len) {
        Ok(short) if short < 0x80 => buf.put_u8(short),
        _ => {
            let be = len.to_be_bytes();
            let skip = be.iter().take_while(|b| **b == 0).count();
            let significant = &be[skip..];
            let count = u8::try_from(significant.len()).unwrap_or(8);
            buf.put_u8(0x80 | count);
            buf.put_slice(significant);
        }
    }
}

fn put_integer(buf: &mut BytesMut, v: i64) {
    let be = v.to_be_bytes();
    let mut start = 0;
    // Drop redundant sign octets, keeping two's complement minimal.
    while start < be.len() - 1 {
        let head = be[start];
        let next_high = be[start + 1] & 0x80;
        if (head == 0x00 && next_high == 0) || (head == 0xFF && next_high != 0) {
            start += 1;
        } else {
            break;
        }
    }
    put_tlv(buf, tag::INTEGER, &be[start..]);
}

fn put_unsigned(buf: &mut BytesMut, t: u8, v: u64) {
    let be = v.to_be_bytes();
    let skip = be.iter().take_while(|b| **b == 0).count().min(be.len() - 1);
    let digits = &be[skip..];
    let mut content = Vec::with_capacity(9);
    if digits.first().is_some_and(|b| b & 0x80 != 0) {
        content.push(0);
    }
    content.extend_from_slice(digits);
    put_tlv(buf, t, &content);
}

fn put_oid(buf: &mut BytesMut, oid: &Oid) -> Result<(), Error> {
    let (first, second, rest) = match oid.arcs() {
        [a, b, rest @ ..] if *a <= 2 && (*a == 2 || *b < 40) => (*a, *b, rest),
        _ => return Err(Error::Encode(format!("cannot encode OID {oid}"))),
    };
    let mut content = Vec::with_capacity(oid.len() + 4);
    put_base128(&mut content, u64::from(first) * 40 + u64::from(second));
    for arc in rest {
        put_base128(&mut content, u64::from(*arc));
    }
    put_tlv(buf, tag::OBJECT_IDENTIFIER, &content);
    Ok(())
}

#[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
fn put_base128(out: &mut Vec<u8>, mut v: u64) {
    let mut groups = [0u8; 10];
    let mut start = groups.len();
    loop {
        start -= 1;
        groups[start] = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            break;
        }
    }
    let last = groups.len() - 1;
    for (pos, group) in groups.iter().enumerate().skip(start) {
        out.push(if pos == last { *group } else { *group | 0x80 });
    }
}

fn put_value(buf: &mut BytesMut, value: &Value) -> Result<(), Error> {
    match value {
        Value::Integer(v) => put_integer(buf, *v),
        Value::OctetString(b) => put_tlv(buf, tag::OCTET_STRING, b),
        Value::Null => put_tlv(buf, tag::NULL, &[]),
        Value::ObjectIdentifier(oid) => put_oid(buf, oid)?,
        Value::IpAddress(addr) => put_tlv(buf, tag::IP_ADDRESS, addr),
        Value::Counter32(v) => put_unsigned(buf, tag::COUNTER32, u64::from(*v)),
        Value::Gauge32(v) => put_unsigned(buf, tag::GAUGE32, u64::from(*v)),
        Value::TimeTicks(v) => put_unsigned(buf, tag::TIME_TICKS, u64::from(*v)),
        Value::Opaque(b) => put_tlv(buf, tag::OPAQUE, b),
        Value::Counter64(v) => put_unsigned(buf, tag::COUNTER64, *v),
        Value::NoSuchObject => put_tlv(buf, tag::NO_SUCH_OBJECT, &[]),
        Value::NoSuchInstance => put_tlv(buf, tag::NO_SUCH_INSTANCE, &[]),
        Value::EndOfMibView => put_tlv(buf, tag::END_OF_MIB_VIEW, &[]),
    }
    Ok(())
}

// ── Decoding ─────────────────────────────────────────────────────────

pub fn decode_message(data: &[u8]) -> Result<Message, Error> {
    let mut input = Bytes::copy_from_slice(data);
    let mut message = expect(&mut input, tag::SEQUENCE)?;

    let version = decode_integer(&expect(&mut message, tag::INTEGER)?)?;
    let community = expect(&mut message, tag::OCTET_STRING)?;

    let (pdu_tag, mut pdu) = read_tlv(&mut message)?;
    let kind = PduKind::from_tag(pdu_tag)
        .ok_or_else(|| decode_err(format!("unsupported PDU type 0x{pdu_tag:02x}")))?;

    let request_id = i32::try_from(decode_integer(&expect(&mut pdu, tag::INTEGER)?)?)
        .map_err(|_| decode_err("request-id out of range"))?;
    let error_status = u32::try_from(decode_integer(&expect(&mut pdu, tag::INTEGER)?)?)
        .map_err(|_| decode_err("error-status out of range"))?;
    let error_index = u32::try_from(decode_integer(&expect(&mut pdu, tag::INTEGER)?)?)
        .map_err(|_| decode_err("error-index out of range"))?;

    let mut list = expect(&mut pdu, tag::SEQUENCE)?;
    let mut varbinds = Vec::new();
    while list.has_remaining() {
        let mut vb = expect(&mut list, tag::SEQUENCE)?;
        let oid = decode_oid(&expect(&mut vb, tag::OBJECT_IDENTIFIER)?)?;
        let (value_tag, content) = read_tlv(&mut vb)?;
        varbinds.push(VarBind::new(oid, decode_value(value_tag, content)?));
    }

    Ok(Message {
        version,
        community,
        pdu: Pdu {
            kind,
            request_id,
            error_status,
            error_index,
            varbinds,
        },
    })
}

fn decode_err(msg: impl Into<String>) -> Error {
    Error::Decode(msg.into())
}

fn read_tlv(buf: &mut Bytes) -> Result<(u8, Bytes), Error> {
    if !buf.has_remaining() {
        return Err(decode_err("unexpected end of input"));
    }
    let t = buf.get_u8();
    let len = read_length(buf)?;
    if buf.remaining() < len {
        return Err(decode_err(format!(
            "length {len} exceeds remaining {} octets",
            buf.remaining()
        )));
    }
    Ok((t, buf.split_to(len)))
}

fn read_length(buf: &mut Bytes) -> Result<usize, Error> {
    if !buf.has_remaining() {
        return Err(decode_err("missing length octet"));
    }
    let first = buf.get_u8();
    if first & 0x80 == 0 {
        return Ok(usize::from(first));
    }
    let count = usize::from(first & 0x7f);
    if count == 0 || count > 4 || buf.remaining() < count {
        return Err(decode_err(format!("unsupported length form 0x{first:02x}")));
    }
    let mut len = 0usize;
    for _ in 0..count {
        len = (len << 8) | usize::from(buf.get_u8());
    }
    Ok(len)
}

fn expect(buf: &mut Bytes, want: u8) -> Result<Bytes, Error> {
    let (got, content) = read_tlv(buf)?;
    if got != want {
        return Err(decode_err(format!(
            "expected tag 0x{want:02x}, found 0x{got:02x}"
        )));
    }
    Ok(content)
}

fn decode_integer(content: &[u8]) -> Result<i64, Error> {
    let Some(first) = content.first() else {
        return Err(decode_err("empty INTEGER"));
    };
    if content.len() > 8 {
        return Err(decode_err("INTEGER wider than 64 bits"));
    }
    let mut v: i64 = if first & 0x80 == 0 { 0 } else { -1 };
    for b in content {
        v = (v << 8) | i64::from(*b);
    }
    Ok(v)
}

fn decode_unsigned(content: &[u8]) -> Result<u64, Error> {
    let skip = content.iter().take_while(|b| **b == 0).count();
    let digits = &content[skip..];
    if content.is_empty() || digits.len() > 8 {
        return Err(decode_err("unsigned value out of range"));
    }
    Ok(digits.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}

fn decode_u32(content: &[u8]) -> Result<u32, Error> {
    u32::try_from(decode_unsigned(content)?).map_err(|_| decode_err("32-bit value out of range"))
}

fn decode_oid(content: &[u8]) -> Result<Oid, Error> {
    if content.is_empty() {
        return Err(decode_err("empty OBJECT IDENTIFIER"));
    }
    let mut arcs: Vec<u32> = Vec::with_capacity(content.len() + 1);
    let mut acc: u64 = 0;
    let mut pending = false;
    for b in content {
        if acc > (u64::MAX >> 7) {
            return Err(decode_err("OID sub-identifier overflow"));
        }
        acc = (acc << 7) | u64::from(b & 0x7f);
        pending = b & 0x80 != 0;
        if pending {
            continue;
        }
        if arcs.is_empty() {
            let (x, y) = match acc {
                0..40 => (0, acc),
                40..80 => (1, acc - 40),
                _ => (2, acc - 80),
            };
            arcs.push(x);
            arcs.push(u32::try_from(y).map_err(|_| decode_err("OID arc out of range"))?);
        } else {
            arcs.push(u32::try_from(acc).map_err(|_| decode_err("OID arc out of range"))?);
        }
        acc = 0;
    }
    if pending {
        return Err(decode_err("truncated OID sub-identifier"));
    }
    Ok(Oid::new(arcs))
}

fn decode_value(t: u8, content: Bytes) -> Result<Value, Error> {
    Ok(match t {
        tag::INTEGER => Value::Integer(decode_integer(&content)?),
        tag::OCTET_STRING => Value::OctetString(content),
        tag::NULL => Value::Null,
        tag::OBJECT_IDENTIFIER => Value::ObjectIdentifier(decode_oid(&content)?),
        tag::IP_ADDRESS => Value::IpAddress(
            <[u8; 4]>::try_from(content.as_ref())
                .map_err(|_| decode_err("IpAddress must be 4 octets"))?,
        ),
        tag::COUNTER32 => Value::Counter32(decode_u32(&content)?),
        tag::GAUGE32 => Value::Gauge32(decode_u32(&content)?),
        tag::TIME_TICKS => Value::TimeTicks(decode_u32(&content)?),
        tag::OPAQUE => Value::Opaque(content),
        tag::COUNTER64 => Value::Counter64(decode_unsigned(&content)?),
        tag::NO_SUCH_OBJECT => Value::NoSuchObject,
        tag::NO_SUCH_INSTANCE => Value::NoSuchInstance,
        tag::END_OF_MIB_VIEW => Value::EndOfMibView,
        other => return Err(decode_err(format!("unsupported value tag 0x{other:02x}"))),
    })
}
