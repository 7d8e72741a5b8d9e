//! Bencode encoder

use bytes::BufMut;

use super::value::BencodeValue;

/// Encode a value into its canonical bencoded form.
///
/// Dictionary keys come out in byte-lexicographic order regardless of how the
/// dictionary was built.
pub fn encode(value: &BencodeValue) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_into(value, &mut buf);
    buf
}

/// Append the encoding of `value` to `buf`
pub fn encode_into<B: BufMut>(value: &BencodeValue, buf: &mut B) {
    match value {
        BencodeValue::Integer(i) => {
            buf.put_u8(b'i');
            buf.put_slice(i.to_string().as_bytes());
            buf.put_u8(b'e');
        }
        BencodeValue::Bytes(bytes) => encode_bytes(bytes, buf),
        BencodeValue::List(items) => {
            buf.put_u8(b'l');
            for item in items {
                encode_into(item, buf);
            }
            buf.put_u8(b'e');
        }
        BencodeValue::Dict(entries) => {
            buf.put_u8(b'd');
            for (key, item) in entries {
                encode_bytes(key, buf);
                encode_into(item, buf);
            }
            buf.put_u8(b'e');
        }
    }
}

fn encode_bytes<B: BufMut>(bytes: &[u8], buf: &mut B) {
    buf.put_slice(bytes.len().to_string().as_bytes());
    buf.put_u8(b':');
    buf.put_slice(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bencode::decode;

    #[test]
    fn test_encode_scalars() {
        assert_eq!(encode(&BencodeValue::Integer(42)), b"i42e");
        assert_eq!(encode(&BencodeValue::Integer(-7)), b"i-7e");
        assert_eq!(encode(&BencodeValue::Integer(0)), b"i0e");
        assert_eq!(encode(&BencodeValue::bytes("spam")), b"4:spam");
        assert_eq!(encode(&BencodeValue::bytes("")), b"0:");
    }

    #[test]
    fn test_encode_dict_sorts_keys() {
        let value = BencodeValue::dict([
            ("zebra", BencodeValue::Integer(1)),
            ("apple", BencodeValue::Integer(2)),
            ("mango", BencodeValue::Integer(3)),
        ]);
        assert_eq!(encode(&value), b"d5:applei2e5:mangoi3e5:zebrai1ee");
    }

    #[test]
    fn test_encode_dict_sorts_raw_bytes() {
        // 0xff sorts after ASCII, and a prefix sorts before its extension
        let value = BencodeValue::dict([
            (vec![0xffu8], BencodeValue::Integer(1)),
            (b"ab".to_vec(), BencodeValue::Integer(2)),
            (b"a".to_vec(), BencodeValue::Integer(3)),
        ]);
        assert_eq!(encode(&value), b"d1:ai3e2:abi2e1:\xffi1ee");
    }

    #[test]
    fn test_round_trip_nested() {
        let value = BencodeValue::dict([
            (
                "outer",
                BencodeValue::List(vec![
                    BencodeValue::dict([
                        ("inner", BencodeValue::List(vec![BencodeValue::Integer(0), BencodeValue::Integer(-12345), "".into()])),
                        ("empty", BencodeValue::dict(Vec::<(&str, BencodeValue)>::new())),
                    ]),
                    BencodeValue::List(vec![]),
                    BencodeValue::Bytes(vec![0, 1, 2, 255]),
                ]),
            ),
            ("n", i64::MIN.into()),
            ("m", i64::MAX.into()),
        ]);

        let encoded = encode(&value);
        let (decoded, consumed) = decode(&encoded).unwrap();
        assert_eq!(decoded, value);
        assert_eq!(consumed, encoded.len());
    }

    #[test]
    fn test_reencode_is_canonical() {
        let canonical = b"d3:foo3:bar5:helloi52ee";
        let (value, _) = decode(canonical).unwrap();
        assert_eq!(encode(&value), canonical);
    }
}
