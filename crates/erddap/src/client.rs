use crate::error::{Error, Result};
use crate::models::{Table, TableResponse};
use diagnostics::*;
use std::fmt;
use std::io::Read;
use std::time::Duration;

/// Outcome of a GET against the remote server.
pub enum Fetched {
    /// Success; the body is streamed, never buffered whole.
    Body(Box<dyn Read + Send>),
    /// Any non-success HTTP status.
    Status(u16),
}

impl fmt::Debug for Fetched {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fetched::Body(_) => f.write_str("Fetched::Body(..)"),
            Fetched::Status(code) => write!(f, "Fetched::Status({code})"),
        }
    }
}

/// The low-level HTTP seam. Errors are connection-level failures only;
/// HTTP status codes come back as [`Fetched::Status`].
pub trait Transport {
    fn get(&self, url: &str) -> Result<Fetched>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn get(&self, url: &str) -> Result<Fetched> {
        (**self).get(url)
    }
}

/// Blocking reqwest transport.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    /// `timeout` bounds a whole request including the body; `None` disables it
    /// so that long data streams are not cut off.
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| Error::Http {
                url: String::new(),
                source,
            })?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> Result<Fetched> {
        debug!("GET {url}");
        let response = self.client.get(url).send().map_err(|source| Error::Http {
            url: url.to_string(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            let code = status.as_u16();
            debug!("HTTP {code} from {url}");
            return Ok(Fetched::Status(code));
        }
        Ok(Fetched::Body(Box::new(response)))
    }
}

/// Fetch a `.json` table. A non-success status yields `None`, which is how
/// ERDDAP reports a query with no matching rows.
pub fn fetch_table<T: Transport + ?Sized>(transport: &T, url: &str) -> Result<Option<Table>> {
    match transport.get(url)? {
        Fetched::Status(_) => Ok(None),
        Fetched::Body(body) => {
            let response: TableResponse =
                serde_json::from_reader(body).map_err(|source| Error::Json {
                    url: url.to_string(),
                    source,
                })?;
            Ok(Some(response.table))
        }
    }
}

/// Like [`fetch_table`] but a non-success status is an error.
pub fn require_table<T: Transport + ?Sized>(transport: &T, url: &str) -> Result<Table> {
    match transport.get(url)? {
        Fetched::Status(status) => Err(Error::Status {
            url: url.to_string(),
            status,
        }),
        Fetched::Body(body) => {
            let response: TableResponse =
                serde_json::from_reader(body).map_err(|source| Error::Json {
                    url: url.to_string(),
                    source,
                })?;
            Ok(response.table)
        }
    }
}

/// Form-encode a free-form constraint (`temp<=25` becomes `temp%3C%3D25`).
pub fn quote_plus(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
