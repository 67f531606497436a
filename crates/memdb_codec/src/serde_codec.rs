//! serde-backed codecs.

use crate::codec::RecordCodec;
use crate::error::{CodecError, CodecResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;

/// Encodes records as CBOR through serde.
pub struct CborCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> CborCodec<T> {
    /// Creates a new CBOR codec.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for CborCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for CborCodec<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for CborCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CborCodec<{}>", std::any::type_name::<T>())
    }
}

impl<T: Serialize + DeserializeOwned> RecordCodec<T> for CborCodec<T> {
    fn encode(&self, record: &T) -> CodecResult<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(record, &mut buf)
            .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
        Ok(buf)
    }

    fn decode(&self, bytes: &[u8]) -> CodecResult<T> {
        ciborium::de::from_reader(bytes).map_err(|e| CodecError::decoding_failed(e.to_string()))
    }
}

/// Encodes records as JSON through serde.
///
/// Larger than CBOR but readable with ordinary tools, which helps when
/// inspecting a WAL by hand.
pub struct JsonCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    /// Creates a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonCodec<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JsonCodec<{}>", std::any::type_name::<T>())
    }
}

impl<T: Serialize + DeserializeOwned> RecordCodec<T> for JsonCodec<T> {
    fn encode(&self, record: &T) -> CodecResult<Vec<u8>> {
        serde_json::to_vec(record).map_err(|e| CodecError::encoding_failed(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> CodecResult<T> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::decoding_failed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Item {
        id: String,
        count: u32,
        tags: Vec<String>,
        blob: Vec<u8>,
    }

    fn item() -> Item {
        Item {
            id: "0001".into(),
            count: 7,
            tags: vec!["a".into(), "b".into()],
            blob: vec![0, 1, 255],
        }
    }

    #[test]
    fn cbor_roundtrip() {
        let codec = CborCodec::<Item>::new();
        let bytes = codec.encode(&item()).unwrap();
        assert_eq!(codec.decode(&bytes).unwrap(), item());
    }

    #[test]
    fn json_roundtrip() {
        let codec = JsonCodec::<Item>::new();
        let bytes = codec.encode(&item()).unwrap();
        assert!(std::str::from_utf8(&bytes).unwrap().contains("\"0001\""));
        assert_eq!(codec.decode(&bytes).unwrap(), item());
    }

    #[test]
    fn cbor_rejects_garbage() {
        let codec = CborCodec::<Item>::new();
        let err = codec.decode(&[0xff, 0x00, 0x13]).unwrap_err();
        assert!(matches!(err, CodecError::DecodingFailed { .. }));
    }

    #[test]
    fn json_rejects_wrong_shape() {
        let codec = JsonCodec::<Item>::new();
        let err = codec.decode(br#"{"id": 5}"#).unwrap_err();
        assert!(matches!(err, CodecError::DecodingFailed { .. }));
    }

    #[test]
    fn codecs_are_object_safe() {
        let codecs: Vec<Box<dyn RecordCodec<Item>>> =
            vec![Box::new(CborCodec::new()), Box::new(JsonCodec::new())];
        for codec in &codecs {
            let bytes = codec.encode(&item()).unwrap();
            assert_eq!(codec.decode(&bytes).unwrap(), item());
        }
    }

    proptest! {
        #[test]
        fn cbor_roundtrips_any_item(
            id in ".{0,16}",
            count in any::<u32>(),
            tags in prop::collection::vec("[a-z]{0,4}", 0..4),
            blob in prop::collection::vec(any::<u8>(), 0..32),
        ) {
            let codec = CborCodec::<Item>::new();
            let item = Item { id, count, tags, blob };
            let bytes = codec.encode(&item).unwrap();
            prop_assert_eq!(codec.decode(&bytes).unwrap(), item);
        }
    }
}
