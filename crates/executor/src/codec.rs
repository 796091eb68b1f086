//! Serialization of tasks, operations and results

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::CodecError;

/// Serialization service used for everything crossing a member boundary
pub trait Codec: Send + Sync + 'static {
    /// Encode a value into a wire payload
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] if the value cannot be represented.
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Bytes, CodecError>;

    /// Decode a wire payload into a value
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Decode`] if the payload is malformed or of another shape.
    fn decode<T: DeserializeOwned>(&self, payload: &[u8]) -> Result<T, CodecError>;
}

/// Decoding capability for a single target type
///
/// Lets a [`ResultFuture`](crate::ResultFuture) hold onto its codec without
/// carrying the codec type.
pub trait Decode<T>: Send + Sync {
    /// Decode a wire payload into `T`
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Decode`] if the payload is not a valid `T`.
    fn decode_payload(&self, payload: &[u8]) -> Result<T, CodecError>;
}

impl<T: DeserializeOwned, C: Codec> Decode<T> for C {
    fn decode_payload(&self, payload: &[u8]) -> Result<T, CodecError> {
        self.decode(payload)
    }
}

/// CBOR codec
#[derive(Clone, Copy, Debug, Default)]
pub struct CborCodec;

impl Codec for CborCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Bytes, CodecError> {
        let mut buffer = Vec::new();
        ciborium::into_writer(value, &mut buffer)
            .map_err(|e| CodecError::Encode(e.to_string()))?;
        Ok(Bytes::from(buffer))
    }

    fn decode<T: DeserializeOwned>(&self, payload: &[u8]) -> Result<T, CodecError> {
        ciborium::from_reader(payload).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Order {
        id: u64,
        sku: String,
    }

    #[test]
    fn test_decode_wrong_shape_fails() {
        let codec = CborCodec;
        let payload = codec.encode(&"not an order").unwrap();

        let result: Result<Order, _> = codec.decode(&payload);
        assert_matches!(result, Err(CodecError::Decode(_)));
    }

    #[test]
    fn test_decode_through_erased_decoder() {
        let codec = std::sync::Arc::new(CborCodec);
        let payload = codec
            .encode(&Order {
                id: 7,
                sku: "A-1".to_string(),
            })
            .unwrap();

        let decoder: std::sync::Arc<dyn Decode<Order>> = codec;
        let order = decoder.decode_payload(&payload).unwrap();
        assert_eq!(order.id, 7);
        assert_eq!(order.sku, "A-1");
    }
}
