//! 이벤트 페이로드 직렬화 코덱
//!
//! 버스 경계에서 페이로드 레코드를 JSON 바이트로 변환합니다.
//! 잘못된 입력에는 항상 [`IngestError::Serialization`]으로 닫힌 실패를 반환합니다.
//!
//! - `encode(None)` -- 값 부재는 에러
//! - `decode(b"[]")` -- 문법은 맞지만 레코드가 아닌 입력도 에러

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::IngestError;

/// 페이로드 레코드를 바이트로 인코딩합니다.
pub fn encode<T: Serialize>(value: Option<&T>) -> Result<Bytes, IngestError> {
    let value = value.ok_or_else(|| {
        IngestError::Serialization("cannot encode an absent value".to_owned())
    })?;
    let bytes = serde_json::to_vec(value)
        .map_err(|e| IngestError::Serialization(format!("encode failed: {e}")))?;
    Ok(Bytes::from(bytes))
}

/// 바이트를 페이로드 레코드로 디코딩합니다.
///
/// 최상위 JSON 값이 객체가 아니면 대상 타입과 무관하게 실패합니다.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, IngestError> {
    if bytes.is_empty() {
        return Err(IngestError::Serialization(
            "cannot decode an empty payload".to_owned(),
        ));
    }

    let value: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| IngestError::Serialization(format!("malformed payload: {e}")))?;

    if !value.is_object() {
        return Err(IngestError::Serialization(format!(
            "expected a record, found {}",
            json_kind(&value)
        )));
    }

    serde_json::from_value(value)
        .map_err(|e| IngestError::Serialization(format!("schema mismatch: {e}")))
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        uuid: String,
        purl: Option<String>,
    }

    fn sample() -> Sample {
        Sample {
            uuid: "786b9343-9b98-477d-82b5-4b12ac5f5cec".to_owned(),
            purl: Some("pkg:maven/acme/a@9.1.1".to_owned()),
        }
    }

    #[test]
    fn encode_then_decode_returns_same_value() {
        let bytes = encode(Some(&sample())).unwrap();
        let back: Sample = decode(&bytes).unwrap();
        assert_eq!(back, sample());
    }

    #[test]
    fn encode_absent_value_fails() {
        let err = encode::<Sample>(None).unwrap_err();
        assert!(matches!(err, IngestError::Serialization(_)));
    }

    #[test]
    fn decode_array_into_record_fails() {
        let err = decode::<Sample>(b"[]").unwrap_err();
        assert!(err.to_string().contains("array"));
    }

    #[test]
    fn decode_positional_array_is_still_rejected() {
        // serde는 구조체를 시퀀스로도 받을 수 있으므로 최상위 검사가 필요함
        let err = decode::<Sample>(br#"["786b9343", null]"#).unwrap_err();
        assert!(matches!(err, IngestError::Serialization(_)));
    }

    #[test]
    fn decode_wrong_schema_fails() {
        let err = decode::<Sample>(br#"{"name":"a"}"#).unwrap_err();
        assert!(err.to_string().contains("schema mismatch"));
    }

    #[test]
    fn decode_garbage_and_empty_fail() {
        assert!(decode::<Sample>(b"\x00\xffnot json").is_err());
        assert!(decode::<Sample>(b"").is_err());
        assert!(decode::<Sample>(b"{\"uuid\":\"a\"} trailing").is_err());
    }
}
