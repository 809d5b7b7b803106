use std::collections::HashMap;

use super::error::MetainfoError;
use super::info_hash::InfoHash;

/// A parsed magnet link.
///
/// Magnet links share a torrent identity without a `.torrent` file:
/// `magnet:?xt=urn:btih:<info-hash>&dn=<name>&tr=<tracker>...`
#[derive(Debug, Clone)]
pub struct MagnetLink {
    /// The torrent's info hash (required).
    pub info_hash: InfoHash,
    /// Suggested display name for the torrent.
    pub display_name: Option<String>,
    /// Tracker URLs from the `tr` parameter.
    pub trackers: Vec<String>,
    /// Exact content length from the `xl` parameter.
    pub exact_length: Option<u64>,
}

impl MagnetLink {
    /// Parses a magnet URI.
    ///
    /// The `xt=urn:btih:` parameter is required and may carry the hash as
    /// 40 hex characters (case-insensitive) or 32 Base32 characters
    /// (RFC-4648). `dn`, repeatable `tr` and `xl` are honoured; `ws` web
    /// seeds are accepted and ignored.
    ///
    /// # Errors
    ///
    /// Returns [`MetainfoError::InvalidMagnetLink`] if the URI prefix or
    /// the `xt` parameter is missing, or the hash encoding is invalid.
    pub fn parse(uri: &str) -> Result<Self, MetainfoError> {
        let query = uri
            .strip_prefix("magnet:?")
            .ok_or_else(|| MetainfoError::InvalidMagnetLink("missing magnet:? prefix".into()))?;

        let params = parse_query_string(query);

        let xt = params
            .get("xt")
            .and_then(|v| v.first())
            .ok_or_else(|| MetainfoError::InvalidMagnetLink("missing xt parameter".into()))?;

        let hash = xt
            .strip_prefix("urn:btih:")
            .ok_or_else(|| MetainfoError::InvalidMagnetLink("unsupported xt format".into()))?;

        let info_hash = if hash.len() == 40 {
            InfoHash::from_hex(hash)?
        } else if hash.len() == 32 {
            let decoded = base32_decode(hash)
                .ok_or_else(|| MetainfoError::InvalidMagnetLink("invalid base32".into()))?;
            InfoHash::from_bytes(&decoded)?
        } else {
            return Err(MetainfoError::InvalidMagnetLink(
                "invalid info hash length".into(),
            ));
        };

        let display_name = params
            .get("dn")
            .and_then(|v| v.first())
            .map(|s| url_decode(s));

        let trackers = params
            .get("tr")
            .map(|v| v.iter().map(|s| url_decode(s)).collect())
            .unwrap_or_default();

        let exact_length = params
            .get("xl")
            .and_then(|v| v.first())
            .and_then(|s| s.parse().ok());

        Ok(Self {
            info_hash,
            display_name,
            trackers,
            exact_length,
        })
    }
}

fn parse_query_string(query: &str) -> HashMap<String, Vec<String>> {
    let mut params: HashMap<String, Vec<String>> = HashMap::new();

    for part in query.split('&') {
        if let Some((key, value)) = part.split_once('=') {
            params
                .entry(key.to_string())
                .or_default()
                .push(value.to_string());
        }
    }

    params
}

fn url_decode(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '%' {
            let hex: String = chars.by_ref().take(2).collect();
            if hex.len() == 2 {
                if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                    result.push(byte as char);
                    continue;
                }
            }
            result.push('%');
            result.push_str(&hex);
        } else if c == '+' {
            result.push(' ');
        } else {
            result.push(c);
        }
    }

    result
}

fn base32_decode(input: &str) -> Option<Vec<u8>> {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

    let input = input.to_uppercase();
    let input = input.trim_end_matches('=');

    let mut output = Vec::with_capacity(input.len() * 5 / 8);
    let mut buffer: u64 = 0;
    let mut bits_in_buffer = 0;

    for c in input.chars() {
        let value = ALPHABET.iter().position(|&x| x == c as u8)? as u64;
        buffer = (buffer << 5) | value;
        bits_in_buffer += 5;

        if bits_in_buffer >= 8 {
            bits_in_buffer -= 8;
            output.push((buffer >> bits_in_buffer) as u8);
            buffer &= (1 << bits_in_buffer) - 1;
        }
    }

    Some(output)
}
