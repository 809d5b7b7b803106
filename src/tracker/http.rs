use reqwest::Client;

use crate::constants::{HTTP_ANNOUNCE_TIMEOUT, NUMWANT, USER_AGENT};

use super::error::TrackerError;
use super::response::{parse_http_response, AnnounceParams, AnnounceResponse};

/// An HTTP(S) tracker client.
///
/// Announces are plain GET requests with the torrent identity and transfer
/// statistics in the query string; the response is a bencoded dictionary.
pub struct HttpTracker {
    client: Client,
    url: String,
    cookie: Option<String>,
}

impl HttpTracker {
    /// Creates a client for one announce URL.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::InvalidUrl`] for non-HTTP(S) schemes.
    pub fn new(url: &str) -> Result<Self, TrackerError> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(TrackerError::InvalidUrl(url.to_string()));
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(HTTP_ANNOUNCE_TIMEOUT)
            .build()
            .map_err(TrackerError::Http)?;

        Ok(Self {
            client,
            url: url.to_string(),
            cookie: None,
        })
    }

    /// Attaches a session cookie sent with every announce. Used for
    /// private trackers whose announces require authentication.
    pub fn with_cookie(mut self, cookie: String) -> Self {
        self.cookie = Some(cookie);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Performs one announce.
    pub async fn announce(&self, params: &AnnounceParams) -> Result<AnnounceResponse, TrackerError> {
        let mut url = format!(
            "{}?info_hash={}&peer_id={}&port={}&uploaded={}&downloaded={}&left={}&compact=1&numwant={}",
            self.url,
            percent_encode(&params.info_hash),
            percent_encode(&params.peer_id),
            params.port,
            params.uploaded,
            params.downloaded,
            params.left,
            NUMWANT,
        );

        let event = params.event.as_str();
        if !event.is_empty() {
            url.push_str("&event=");
            url.push_str(event);
        }

        let mut request = self.client.get(&url);
        if let Some(ref cookie) = self.cookie {
            request = request.header(reqwest::header::COOKIE, cookie.clone());
        }

        let response = request.send().await?;
        let body = response.bytes().await?;

        parse_http_response(&body)
    }
}

/// Percent-encodes raw bytes for a query string: unreserved characters
/// pass through, everything else becomes `%XX`.
pub fn percent_encode(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| {
            if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.' || b == b'~' {
                (b as char).to_string()
            } else {
                format!("%{:02X}", b)
            }
        })
        .collect()
}
