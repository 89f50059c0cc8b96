//! Decoder for PostgreSQL pgoutput logical replication protocol.
//!
//! Reference: https://www.postgresql.org/docs/current/protocol-logicalrep-message-formats.html

use std::io::{Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt};
use serde::Serialize;

use crate::error::{PgError, PgResult};

/// A decoded pgoutput message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PgOutputMessage {
    Begin(BeginMessage),
    Commit(CommitMessage),
    Origin(OriginMessage),
    Relation(RelationMessage),
    Type(TypeMessage),
    Insert(InsertMessage),
    Update(UpdateMessage),
    Delete(DeleteMessage),
    Truncate(TruncateMessage),
    Message(LogicalMessage),
}

impl PgOutputMessage {
    /// The one-byte tag this message is framed with.
    pub fn tag(&self) -> u8 {
        match self {
            PgOutputMessage::Begin(_) => b'B',
            PgOutputMessage::Commit(_) => b'C',
            PgOutputMessage::Origin(_) => b'O',
            PgOutputMessage::Relation(_) => b'R',
            PgOutputMessage::Type(_) => b'Y',
            PgOutputMessage::Insert(_) => b'I',
            PgOutputMessage::Update(_) => b'U',
            PgOutputMessage::Delete(_) => b'D',
            PgOutputMessage::Truncate(_) => b'T',
            PgOutputMessage::Message(_) => b'M',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BeginMessage {
    pub final_lsn: u64,
    pub timestamp: i64, // microseconds since 2000-01-01
    pub xid: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitMessage {
    pub flags: u8,
    pub commit_lsn: u64,
    pub end_lsn: u64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OriginMessage {
    pub origin_lsn: u64,
    pub origin_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationMessage {
    pub relation_id: u32,
    pub namespace: String,
    pub name: String,
    pub replica_identity: ReplicaIdentity,
    pub columns: Vec<ColumnInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicaIdentity {
    Default, // 'd' - default (primary key or unique index)
    Nothing, // 'n' - nothing
    Full,    // 'f' - full (all columns)
    Index,   // 'i' - index
    Other(u8),
}

impl From<u8> for ReplicaIdentity {
    fn from(b: u8) -> Self {
        match b {
            b'd' => ReplicaIdentity::Default,
            b'n' => ReplicaIdentity::Nothing,
            b'f' => ReplicaIdentity::Full,
            b'i' => ReplicaIdentity::Index,
            other => ReplicaIdentity::Other(other),
        }
    }
}

impl From<ReplicaIdentity> for u8 {
    fn from(r: ReplicaIdentity) -> Self {
        match r {
            ReplicaIdentity::Default => b'd',
            ReplicaIdentity::Nothing => b'n',
            ReplicaIdentity::Full => b'f',
            ReplicaIdentity::Index => b'i',
            ReplicaIdentity::Other(b) => b,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnInfo {
    pub flags: u8, // 1 = part of key
    pub name: String,
    pub type_oid: u32,
    pub type_modifier: i32,
}

impl ColumnInfo {
    pub fn is_pk(&self) -> bool {
        self.flags == 1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeMessage {
    pub type_id: u32,
    pub namespace: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsertMessage {
    pub relation_id: u32,
    pub tuple: TupleData,
}

/// The tuple an update or delete carries to identify the old row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "tuple", rename_all = "lowercase")]
pub enum IdentityTuple {
    /// 'K': only the replica identity key columns.
    Key(TupleData),
    /// 'O': the full old row (REPLICA IDENTITY FULL).
    Old(TupleData),
}

impl IdentityTuple {
    pub fn tuple(&self) -> &TupleData {
        match self {
            IdentityTuple::Key(t) | IdentityTuple::Old(t) => t,
        }
    }

    pub(crate) fn marker(&self) -> u8 {
        match self {
            IdentityTuple::Key(_) => b'K',
            IdentityTuple::Old(_) => b'O',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateMessage {
    pub relation_id: u32,
    pub identity: Option<IdentityTuple>,
    pub new_tuple: TupleData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeleteMessage {
    pub relation_id: u32,
    pub identity: IdentityTuple,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TruncateMessage {
    pub options: u8,
    pub relation_ids: Vec<u32>,
}

impl TruncateMessage {
    pub fn cascade(&self) -> bool {
        self.options & 1 == 1
    }

    pub fn restart_identity(&self) -> bool {
        self.options & 2 == 2
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogicalMessage {
    pub flags: u8,
    pub lsn: u64,
    pub prefix: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TupleData {
    pub columns: Vec<ColumnValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ColumnValue {
    Null,
    /// TOASTed value that did not change; the message does not carry it.
    Unchanged,
    Text(String),
    Binary(Vec<u8>),
}

/// Bounds-checked big-endian reader over one frame.
struct FrameReader<'a> {
    tag: u8,
    cursor: Cursor<&'a [u8]>,
}

impl<'a> FrameReader<'a> {
    fn new(tag: u8, payload: &'a [u8]) -> Self {
        Self {
            tag,
            cursor: Cursor::new(payload),
        }
    }

    fn truncated(&self, field: &str) -> PgError {
        PgError::malformed(self.tag, format!("truncated {}", field))
    }

    fn u8(&mut self, field: &str) -> PgResult<u8> {
        self.cursor.read_u8().map_err(|_| self.truncated(field))
    }

    fn u16(&mut self, field: &str) -> PgResult<u16> {
        self.cursor
            .read_u16::<BigEndian>()
            .map_err(|_| self.truncated(field))
    }

    fn u32(&mut self, field: &str) -> PgResult<u32> {
        self.cursor
            .read_u32::<BigEndian>()
            .map_err(|_| self.truncated(field))
    }

    fn i32(&mut self, field: &str) -> PgResult<i32> {
        self.cursor
            .read_i32::<BigEndian>()
            .map_err(|_| self.truncated(field))
    }

    fn u64(&mut self, field: &str) -> PgResult<u64> {
        self.cursor
            .read_u64::<BigEndian>()
            .map_err(|_| self.truncated(field))
    }

    fn i64(&mut self, field: &str) -> PgResult<i64> {
        self.cursor
            .read_i64::<BigEndian>()
            .map_err(|_| self.truncated(field))
    }

    fn remaining(&self) -> usize {
        let len = self.cursor.get_ref().len() as u64;
        (len - self.cursor.position().min(len)) as usize
    }

    /// Read exactly `len` bytes, checking the length before allocating.
    fn bytes(&mut self, len: usize, field: &str) -> PgResult<Vec<u8>> {
        if len > self.remaining() {
            return Err(self.truncated(field));
        }
        let mut buf = vec![0u8; len];
        self.cursor
            .read_exact(&mut buf)
            .map_err(|_| self.truncated(field))?;
        Ok(buf)
    }

    /// Read a null-terminated string.
    fn cstr(&mut self, field: &str) -> PgResult<String> {
        let mut bytes = Vec::new();
        loop {
            let b = self
                .cursor
                .read_u8()
                .map_err(|_| PgError::malformed(self.tag, format!("unterminated {}", field)))?;
            if b == 0 {
                break;
            }
            bytes.push(b);
        }
        self.utf8(bytes, field)
    }

    fn utf8(&self, bytes: Vec<u8>, field: &str) -> PgResult<String> {
        String::from_utf8(bytes)
            .map_err(|_| PgError::malformed(self.tag, format!("{} is not valid UTF-8", field)))
    }

    fn finish(self) -> PgResult<()> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(PgError::malformed(
                self.tag,
                format!("{} trailing bytes", n),
            )),
        }
    }
}

/// Decoder for pgoutput binary protocol messages.
pub struct PgOutputDecoder;

impl PgOutputDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decode a pgoutput message from raw bytes.
    ///
    /// The frame must hold exactly one message; leftover bytes are an error.
    pub fn decode(&self, data: &[u8]) -> PgResult<PgOutputMessage> {
        let Some((&msg_type, payload)) = data.split_first() else {
            return Err(PgError::MalformedMessage {
                tag: String::new(),
                reason: "empty message".into(),
            });
        };

        let mut reader = FrameReader::new(msg_type, payload);

        let msg = match msg_type {
            b'B' => self.decode_begin(&mut reader)?,
            b'C' => self.decode_commit(&mut reader)?,
            b'O' => self.decode_origin(&mut reader)?,
            b'R' => self.decode_relation(&mut reader)?,
            b'Y' => self.decode_type(&mut reader)?,
            b'I' => self.decode_insert(&mut reader)?,
            b'U' => self.decode_update(&mut reader)?,
            b'D' => self.decode_delete(&mut reader)?,
            b'T' => self.decode_truncate(&mut reader)?,
            b'M' => self.decode_message(&mut reader)?,
            other => {
                return Err(PgError::malformed(
                    other,
                    format!("unknown message type (0x{:02X})", other),
                ))
            }
        };

        reader.finish()?;
        Ok(msg)
    }

    fn decode_begin(&self, r: &mut FrameReader<'_>) -> PgResult<PgOutputMessage> {
        Ok(PgOutputMessage::Begin(BeginMessage {
            final_lsn: r.u64("final_lsn")?,
            timestamp: r.i64("commit_ts")?,
            xid: r.u32("xid")?,
        }))
    }

    fn decode_commit(&self, r: &mut FrameReader<'_>) -> PgResult<PgOutputMessage> {
        Ok(PgOutputMessage::Commit(CommitMessage {
            flags: r.u8("flags")?,
            commit_lsn: r.u64("commit_lsn")?,
            end_lsn: r.u64("end_lsn")?,
            timestamp: r.i64("commit_ts")?,
        }))
    }

    fn decode_origin(&self, r: &mut FrameReader<'_>) -> PgResult<PgOutputMessage> {
        Ok(PgOutputMessage::Origin(OriginMessage {
            origin_lsn: r.u64("commit_lsn")?,
            origin_name: r.cstr("origin name")?,
        }))
    }

    fn decode_relation(&self, r: &mut FrameReader<'_>) -> PgResult<PgOutputMessage> {
        let relation_id = r.u32("relation_id")?;
        let namespace = r.cstr("namespace")?;
        let name = r.cstr("relation name")?;
        let replica_identity = r.u8("replica_identity")?.into();
        let num_columns = r.u16("column count")? as usize;

        let mut columns = Vec::with_capacity(num_columns.min(r.remaining()));
        for _ in 0..num_columns {
            columns.push(ColumnInfo {
                flags: r.u8("column flags")?,
                name: r.cstr("column name")?,
                type_oid: r.u32("column type_id")?,
                type_modifier: r.i32("column type_modifier")?,
            });
        }

        Ok(PgOutputMessage::Relation(RelationMessage {
            relation_id,
            namespace,
            name,
            replica_identity,
            columns,
        }))
    }

    fn decode_type(&self, r: &mut FrameReader<'_>) -> PgResult<PgOutputMessage> {
        Ok(PgOutputMessage::Type(TypeMessage {
            type_id: r.u32("type_id")?,
            namespace: r.cstr("namespace")?,
            name: r.cstr("type name")?,
        }))
    }

    fn decode_insert(&self, r: &mut FrameReader<'_>) -> PgResult<PgOutputMessage> {
        let relation_id = r.u32("relation_id")?;
        let tuple_type = r.u8("tuple marker")?;

        if tuple_type != b'N' {
            return Err(PgError::malformed(
                b'I',
                format!("expected 'N' for new tuple, got '{}'", tuple_type as char),
            ));
        }

        let tuple = self.decode_tuple(r)?;

        Ok(PgOutputMessage::Insert(InsertMessage { relation_id, tuple }))
    }

    fn decode_update(&self, r: &mut FrameReader<'_>) -> PgResult<PgOutputMessage> {
        let relation_id = r.u32("relation_id")?;

        let identity = match r.u8("tuple marker")? {
            b'N' => None,
            marker @ (b'K' | b'O') => {
                let tuple = self.decode_tuple(r)?;
                let new_type = r.u8("new tuple marker")?;
                if new_type != b'N' {
                    return Err(PgError::malformed(
                        b'U',
                        format!("expected 'N' for new tuple, got '{}'", new_type as char),
                    ));
                }
                Some(if marker == b'K' {
                    IdentityTuple::Key(tuple)
                } else {
                    IdentityTuple::Old(tuple)
                })
            }
            other => {
                return Err(PgError::malformed(
                    b'U',
                    format!("unexpected tuple marker '{}'", other as char),
                ));
            }
        };

        let new_tuple = self.decode_tuple(r)?;

        Ok(PgOutputMessage::Update(UpdateMessage {
            relation_id,
            identity,
            new_tuple,
        }))
    }

    fn decode_delete(&self, r: &mut FrameReader<'_>) -> PgResult<PgOutputMessage> {
        let relation_id = r.u32("relation_id")?;

        let identity = match r.u8("tuple marker")? {
            b'K' => IdentityTuple::Key(self.decode_tuple(r)?),
            b'O' => IdentityTuple::Old(self.decode_tuple(r)?),
            other => {
                return Err(PgError::malformed(
                    b'D',
                    format!("expected 'K' or 'O' for delete tuple, got '{}'", other as char),
                ));
            }
        };

        Ok(PgOutputMessage::Delete(DeleteMessage {
            relation_id,
            identity,
        }))
    }

    fn decode_truncate(&self, r: &mut FrameReader<'_>) -> PgResult<PgOutputMessage> {
        let num_relations = r.u32("relation count")? as usize;
        let options = r.u8("options")?;

        let mut relation_ids = Vec::with_capacity(num_relations.min(r.remaining() / 4));
        for _ in 0..num_relations {
            relation_ids.push(r.u32("relation_id")?);
        }

        Ok(PgOutputMessage::Truncate(TruncateMessage {
            options,
            relation_ids,
        }))
    }

    fn decode_message(&self, r: &mut FrameReader<'_>) -> PgResult<PgOutputMessage> {
        let flags = r.u8("flags")?;
        let lsn = r.u64("lsn")?;
        let prefix = r.cstr("prefix")?;
        let content_len = r.u32("content length")? as usize;
        let content = r.bytes(content_len, "content")?;

        Ok(PgOutputMessage::Message(LogicalMessage {
            flags,
            lsn,
            prefix,
            content,
        }))
    }

    fn decode_tuple(&self, r: &mut FrameReader<'_>) -> PgResult<TupleData> {
        let num_columns = r.u16("tuple column count")? as usize;
        let mut columns = Vec::with_capacity(num_columns.min(r.remaining()));

        for _ in 0..num_columns {
            let value = match r.u8("tuple column kind")? {
                b'n' => ColumnValue::Null,
                b'u' => ColumnValue::Unchanged,
                b't' => {
                    let len = r.i32("text length")?;
                    let len = usize::try_from(len).map_err(|_| {
                        PgError::malformed(r.tag, format!("negative text length {}", len))
                    })?;
                    let bytes = r.bytes(len, "text value")?;
                    ColumnValue::Text(r.utf8(bytes, "text value")?)
                }
                b'b' => {
                    let len = r.i32("binary length")?;
                    let len = usize::try_from(len).map_err(|_| {
                        PgError::malformed(r.tag, format!("negative binary length {}", len))
                    })?;
                    ColumnValue::Binary(r.bytes(len, "binary value")?)
                }
                other => {
                    return Err(PgError::malformed(
                        r.tag,
                        format!(
                            "unknown column value type: '{}' (0x{:02X})",
                            other as char, other
                        ),
                    ));
                }
            };
            columns.push(value);
        }

        Ok(TupleData { columns })
    }
}

impl Default for PgOutputDecoder {
    fn default() -> Self {
        Self::new()
    }
}
