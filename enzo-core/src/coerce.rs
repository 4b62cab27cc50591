//! Conversions between application values and frame data.
//!
//! The core only moves bytes. Strings are UTF-8 encoded and anything
//! else goes through JSON via [`Json`].

use bytes::Bytes;
use serde::Serialize;

use crate::error::EnzoError;

/// A value that can be carried as frame data.
pub trait IntoPayload {
    fn into_payload(self) -> Result<Bytes, EnzoError>;
}

impl IntoPayload for Bytes {
    fn into_payload(self) -> Result<Bytes, EnzoError> {
        Ok(self)
    }
}

impl IntoPayload for Vec<u8> {
    fn into_payload(self) -> Result<Bytes, EnzoError> {
        Ok(Bytes::from(self))
    }
}

impl IntoPayload for &[u8] {
    fn into_payload(self) -> Result<Bytes, EnzoError> {
        Ok(Bytes::copy_from_slice(self))
    }
}

impl IntoPayload for String {
    fn into_payload(self) -> Result<Bytes, EnzoError> {
        Ok(Bytes::from(self))
    }
}

impl IntoPayload for &str {
    fn into_payload(self) -> Result<Bytes, EnzoError> {
        Ok(string_to_bytes(self))
    }
}

impl IntoPayload for () {
    fn into_payload(self) -> Result<Bytes, EnzoError> {
        Ok(Bytes::new())
    }
}

/// Serialize the wrapped value as JSON.
#[derive(Debug, Clone)]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoPayload for Json<T> {
    fn into_payload(self) -> Result<Bytes, EnzoError> {
        Ok(Bytes::from(serde_json::to_vec(&self.0)?))
    }
}

/// UTF-8 encode a string.
pub fn string_to_bytes(s: &str) -> Bytes {
    Bytes::copy_from_slice(s.as_bytes())
}

/// UTF-8 decode frame data.
pub fn bytes_to_string(bytes: &[u8]) -> Result<String, EnzoError> {
    Ok(std::str::from_utf8(bytes)?.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn strings_are_utf8() {
        assert_eq!("héllo".into_payload().unwrap(), Bytes::from("héllo"));
        assert_eq!(bytes_to_string(&string_to_bytes("héllo")).unwrap(), "héllo");
    }

    #[test]
    fn json_values_are_serialized() {
        let mut map = BTreeMap::new();
        map.insert("a", 1);
        assert_eq!(Json(map).into_payload().unwrap(), Bytes::from(r#"{"a":1}"#));
    }

    #[test]
    fn json_failure_is_an_error() {
        // Non-string map keys cannot be represented in JSON.
        let mut map = BTreeMap::new();
        map.insert(vec![1u8], 1);
        assert!(matches!(
            Json(map).into_payload(),
            Err(EnzoError::Json(_))
        ));
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        assert!(bytes_to_string(&[0xff, 0xfe]).is_err());
    }
}
