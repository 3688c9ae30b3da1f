//! Query-string parsing with percent-decoding and caps.

use thiserror::Error;

pub const MAX_QUERY_PARAMS: usize = 128;
pub const MAX_QUERY_KEY_LEN: usize = 512;
pub const MAX_QUERY_VALUE_LEN: usize = 8192;

/// Query strings that violate the caps or the encoding surface as invalid
/// arguments; handlers usually translate them to 400.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("too many query parameters")]
    TooManyParams,
    #[error("query key too long")]
    KeyTooLong,
    #[error("query value too long")]
    ValueTooLong,
    #[error("invalid percent-encoding in query")]
    BadEncoding,
}

/// Parse `a=1&b=two` into decoded pairs, preserving order. A key without
/// `=` gets an empty value. `+` decodes to space.
pub fn parse_query(query: &str) -> Result<Vec<(String, String)>, QueryError> {
    let mut params = Vec::new();
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        if params.len() >= MAX_QUERY_PARAMS {
            return Err(QueryError::TooManyParams);
        }
        let (raw_key, raw_value) = match pair.find('=') {
            Some(idx) => (&pair[..idx], &pair[idx + 1..]),
            None => (pair, ""),
        };
        if raw_key.len() > MAX_QUERY_KEY_LEN {
            return Err(QueryError::KeyTooLong);
        }
        if raw_value.len() > MAX_QUERY_VALUE_LEN {
            return Err(QueryError::ValueTooLong);
        }
        params.push((decode_component(raw_key)?, decode_component(raw_value)?));
    }
    Ok(params)
}

/// Find the first value for `name` in a parsed query.
pub fn query_param<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

fn decode_component(raw: &str) -> Result<String, QueryError> {
    // The decoder passes malformed `%` sequences through untouched, so
    // validate them up front.
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if bytes.len() < i + 3
                || !bytes[i + 1].is_ascii_hexdigit()
                || !bytes[i + 2].is_ascii_hexdigit()
            {
                return Err(QueryError::BadEncoding);
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    let plus_decoded = raw.replace('+', " ");
    urlencoding::decode(&plus_decoded)
        .map(|cow| cow.into_owned())
        .map_err(|_| QueryError::BadEncoding)
}
