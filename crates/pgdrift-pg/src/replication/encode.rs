//! Encoder for pgoutput messages, the inverse of [`PgOutputDecoder`].
//!
//! [`PgOutputDecoder`]: super::pgoutput::PgOutputDecoder

use bytes::{BufMut, Bytes, BytesMut};

use super::pgoutput::{ColumnValue, PgOutputMessage, TupleData};

impl PgOutputMessage {
    /// Serialize the message into a single pgoutput frame.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u8(self.tag());

        match self {
            PgOutputMessage::Begin(m) => {
                buf.put_u64(m.final_lsn);
                buf.put_i64(m.timestamp);
                buf.put_u32(m.xid);
            }
            PgOutputMessage::Commit(m) => {
                buf.put_u8(m.flags);
                buf.put_u64(m.commit_lsn);
                buf.put_u64(m.end_lsn);
                buf.put_i64(m.timestamp);
            }
            PgOutputMessage::Origin(m) => {
                buf.put_u64(m.origin_lsn);
                put_cstr(&mut buf, &m.origin_name);
            }
            PgOutputMessage::Relation(m) => {
                buf.put_u32(m.relation_id);
                put_cstr(&mut buf, &m.namespace);
                put_cstr(&mut buf, &m.name);
                buf.put_u8(m.replica_identity.into());
                buf.put_u16(m.columns.len() as u16);
                for column in &m.columns {
                    buf.put_u8(column.flags);
                    put_cstr(&mut buf, &column.name);
                    buf.put_u32(column.type_oid);
                    buf.put_i32(column.type_modifier);
                }
            }
            PgOutputMessage::Type(m) => {
                buf.put_u32(m.type_id);
                put_cstr(&mut buf, &m.namespace);
                put_cstr(&mut buf, &m.name);
            }
            PgOutputMessage::Insert(m) => {
                buf.put_u32(m.relation_id);
                buf.put_u8(b'N');
                put_tuple(&mut buf, &m.tuple);
            }
            PgOutputMessage::Update(m) => {
                buf.put_u32(m.relation_id);
                if let Some(identity) = &m.identity {
                    buf.put_u8(identity.marker());
                    put_tuple(&mut buf, identity.tuple());
                }
                buf.put_u8(b'N');
                put_tuple(&mut buf, &m.new_tuple);
            }
            PgOutputMessage::Delete(m) => {
                buf.put_u32(m.relation_id);
                buf.put_u8(m.identity.marker());
                put_tuple(&mut buf, m.identity.tuple());
            }
            PgOutputMessage::Truncate(m) => {
                buf.put_u32(m.relation_ids.len() as u32);
                buf.put_u8(m.options);
                for id in &m.relation_ids {
                    buf.put_u32(*id);
                }
            }
            PgOutputMessage::Message(m) => {
                buf.put_u8(m.flags);
                buf.put_u64(m.lsn);
                put_cstr(&mut buf, &m.prefix);
                buf.put_u32(m.content.len() as u32);
                buf.put_slice(&m.content);
            }
        }

        buf.freeze()
    }
}

fn put_cstr(buf: &mut BytesMut, s: &str) {
    buf.put_slice(s.as_bytes());
    buf.put_u8(0);
}

fn put_tuple(buf: &mut BytesMut, tuple: &TupleData) {
    buf.put_u16(tuple.columns.len() as u16);
    for value in &tuple.columns {
        match value {
            ColumnValue::Null => buf.put_u8(b'n'),
            ColumnValue::Unchanged => buf.put_u8(b'u'),
            ColumnValue::Text(s) => {
                buf.put_u8(b't');
                buf.put_i32(s.len() as i32);
                buf.put_slice(s.as_bytes());
            }
            ColumnValue::Binary(b) => {
                buf.put_u8(b'b');
                buf.put_i32(b.len() as i32);
                buf.put_slice(b);
            }
        }
    }
}
