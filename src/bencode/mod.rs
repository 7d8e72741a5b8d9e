//! Bencode codec
//!
//! Encoding and decoding of the value format used by .torrent files and
//! tracker responses: integers (`i42e`), byte strings (`4:spam`), lists
//! (`l...e`) and dictionaries (`d...e`).

pub mod decode;
pub mod encode;
pub mod value;

pub use decode::{decode, decode_all, dict_value_span, MAX_DEPTH};
pub use encode::{encode, encode_into};
pub use value::BencodeValue;
