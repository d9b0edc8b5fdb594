//! Wire codec for the persisted settings string
//!
//! The durable store holds the whole settings map as one flat string of
//! colon-separated integer tokens: `key1:value1:key2:value2:...`. An empty
//! map is the empty string. This format is a compatibility surface shared
//! with every other reader of the settings key, so it must be parsed and
//! produced exactly as specified here.
//!
//! The codec is pure and stateless: it transforms between the token string
//! and a `HashMap<u32, u32>` and knows nothing about policies or defaults.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// Token separator in the persisted settings string
pub const SEPARATOR: char = ':';

/// Serialize a settings map into the flat token string
///
/// Entry order follows the map's internal iteration order; decoding does not
/// depend on it. An empty map encodes as the empty string, the explicit
/// "no settings" marker.
pub fn encode(settings: &HashMap<u32, u32>) -> String {
    let mut out = String::new();
    for (key, value) in settings {
        if !out.is_empty() {
            out.push(SEPARATOR);
        }
        out.push_str(&key.to_string());
        out.push(SEPARATOR);
        out.push_str(&value.to_string());
    }
    out
}

/// Deserialize the flat token string into a settings map
///
/// Returns `Error::CorruptSettings` when the token count is odd or any token
/// is not an integer. The caller is expected to discard the persisted value
/// entirely on error; no partial map is ever returned.
pub fn decode(raw: &str) -> Result<HashMap<u32, u32>> {
    if raw.is_empty() {
        return Ok(HashMap::new());
    }

    let tokens: Vec<&str> = raw.split(SEPARATOR).collect();
    if tokens.len() % 2 != 0 {
        return Err(Error::corrupt(format!(
            "odd token count {} in persisted settings",
            tokens.len()
        )));
    }

    let mut settings = HashMap::with_capacity(tokens.len() / 2);
    for pair in tokens.chunks_exact(2) {
        let key: u32 = pair[0]
            .parse()
            .map_err(|_| Error::corrupt(format!("non-integer key token {:?}", pair[0])))?;
        let value: u32 = pair[1]
            .parse()
            .map_err(|_| Error::corrupt(format!("non-integer value token {:?}", pair[1])))?;
        settings.insert(key, value);
    }

    Ok(settings)
}
