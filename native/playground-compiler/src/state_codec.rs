//! Serialized project state
//!
//! A JSON object of `path -> code` plus the reserved `_o` options key,
//! zlib-compressed and base64 encoded for use in a URL fragment.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::io::{Read, Write};
use thiserror::Error;

use crate::config::UserOptions;

pub const OPTIONS_KEY: &str = "_o";

/// Upper bound on the inflated JSON of a serialized project.
pub const MAX_STATE_BYTES: u64 = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum StateCodecError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid compressed data: {0}")]
    Compression(#[from] std::io::Error),

    #[error("invalid project JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("serialized project must be a JSON object")]
    NotAnObject,

    #[error("serialized project inflates past {0} bytes")]
    TooLarge(u64),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SerializedProject {
    pub files: IndexMap<String, String>,
    pub options: UserOptions,
}

pub fn encode_state(project: &SerializedProject) -> Result<String, StateCodecError> {
    let mut object = Map::new();
    for (name, code) in &project.files {
        object.insert(name.clone(), Value::String(code.clone()));
    }
    object.insert(OPTIONS_KEY.to_string(), serde_json::to_value(&project.options)?);
    let json = serde_json::to_string(&Value::Object(object))?;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(json.as_bytes())?;
    let compressed = encoder.finish()?;
    Ok(URL_SAFE_NO_PAD.encode(compressed))
}

/// Accepts URL-safe and standard base64, with or without a leading `#`.
pub fn decode_state(text: &str) -> Result<SerializedProject, StateCodecError> {
    decode_with_limit(text, MAX_STATE_BYTES)
}

fn decode_with_limit(text: &str, limit: u64) -> Result<SerializedProject, StateCodecError> {
    let text = text.trim().trim_start_matches('#');
    let bytes = match URL_SAFE_NO_PAD.decode(text.trim_end_matches('=')) {
        Ok(bytes) => bytes,
        Err(_) => STANDARD.decode(text)?,
    };

    let mut json = Vec::new();
    ZlibDecoder::new(bytes.as_slice())
        .take(limit + 1)
        .read_to_end(&mut json)?;
    if json.len() as u64 > limit {
        return Err(StateCodecError::TooLarge(limit));
    }
    let Value::Object(object) = serde_json::from_slice::<Value>(&json)? else {
        return Err(StateCodecError::NotAnObject);
    };

    let mut project = SerializedProject::default();
    for (key, value) in object {
        if key == OPTIONS_KEY {
            project.options = serde_json::from_value(value).unwrap_or_default();
            continue;
        }
        if let Value::String(code) = value {
            project.files.insert(key, code);
        }
    }
    Ok(project)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_preserves_files_and_options() {
        let mut project = SerializedProject::default();
        project.files.insert("src/App.vue".to_string(), "<template>é</template>".to_string());
        project.files.insert("import-map.json".to_string(), "{}".to_string());
        project.options.show_hidden = Some(true);

        let encoded = encode_state(&project).unwrap();
        assert!(!encoded.contains('+') && !encoded.contains('/') && !encoded.contains('='));
        let decoded = decode_state(&format!("#{}", encoded)).unwrap();
        assert_eq!(decoded, project);
    }

    #[test]
    fn test_decodes_standard_base64() {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(br#"{"App.vue":"<p/>","_o":{}}"#).unwrap();
        let text = STANDARD.encode(encoder.finish().unwrap());
        let decoded = decode_state(&text).unwrap();
        assert_eq!(decoded.files.get("App.vue").map(String::as_str), Some("<p/>"));
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert!(decode_state("!!!").is_err());
        let text = URL_SAFE_NO_PAD.encode(b"not zlib");
        assert!(matches!(decode_state(&text), Err(StateCodecError::Compression(_))));
    }

    #[test]
    fn test_inflated_size_is_capped() {
        let mut project = SerializedProject::default();
        project.files.insert("src/App.vue".to_string(), "x".repeat(4096));
        let encoded = encode_state(&project).unwrap();

        assert!(matches!(
            decode_with_limit(&encoded, 1024),
            Err(StateCodecError::TooLarge(1024))
        ));
        assert_eq!(decode_with_limit(&encoded, 8192).unwrap(), project);
    }
}
