/// A minimal RESP value tree: the response-framing half of the wire
/// protocol. Request framing (parsing inbound RESP into argument vectors)
/// is out of scope — only responses are encoded here, since the scan
/// writer must still *produce* RESP bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    Integer(i64),
    BulkString(String),
    Array(Vec<RespValue>),
    Null,
}

impl RespValue {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.append(&mut buf);
        buf
    }

    fn append(&self, buf: &mut Vec<u8>) {
        match self {
            RespValue::Integer(n) => {
                buf.extend_from_slice(format!(":{n}\r\n").as_bytes());
            }
            RespValue::BulkString(s) => {
                buf.extend_from_slice(format!("${}\r\n", s.len()).as_bytes());
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            RespValue::Array(items) => {
                buf.extend_from_slice(format!("*{}\r\n", items.len()).as_bytes());
                for item in items {
                    item.append(buf);
                }
            }
            RespValue::Null => {
                buf.extend_from_slice(b"$-1\r\n");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_integer() {
        assert_eq!(RespValue::Integer(5).encode(), b":5\r\n");
    }

    #[test]
    fn encodes_bulk_string() {
        assert_eq!(RespValue::BulkString("ok".into()).encode(), b"$2\r\nok\r\n");
    }

    #[test]
    fn encodes_nested_array() {
        let v = RespValue::Array(vec![
            RespValue::Integer(0),
            RespValue::Array(vec![RespValue::BulkString("t1".into())]),
        ]);
        assert_eq!(v.encode(), b"*2\r\n:0\r\n*1\r\n$2\r\nt1\r\n");
    }
}
