//! Opaque offset cursors.
//!
//! A cursor is the URL-safe base64 encoding of a form-urlencoded payload carrying the absolute
//! zero-based offset of an element, e.g. `offset=5`. Clients treat it as opaque; negative offsets
//! are rejected on decode.

use std::fmt;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

use crate::errors::{Error, Result};

const OFFSET_FIELD: &str = "offset";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cursor {
    pub offset: i64,
}

impl Cursor {
    pub const fn new(offset: i64) -> Self {
        Self { offset }
    }

    pub fn encode(&self) -> String {
        let payload = url::form_urlencoded::Serializer::new(String::new())
            .append_pair(OFFSET_FIELD, &self.offset.to_string())
            .finish();
        URL_SAFE_NO_PAD.encode(payload)
    }

    /// Decode a client-supplied token. Padded tokens are accepted.
    pub fn decode(token: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.trim_end_matches('='))
            .map_err(|_| invalid_cursor())?;
        let payload = String::from_utf8(bytes).map_err(|_| invalid_cursor())?;

        let offset = url::form_urlencoded::parse(payload.as_bytes())
            .find(|(key, _)| key == OFFSET_FIELD)
            .map(|(_, value)| value)
            .ok_or_else(invalid_cursor)?;

        let offset = offset.parse::<i64>().map_err(|_| invalid_cursor())?;
        if offset < 0 {
            return Err(invalid_cursor());
        }
        Ok(Self { offset })
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

fn invalid_cursor() -> Error {
    Error::invalid_argument("invalid cursor")
}
