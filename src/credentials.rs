use crate::error::{Error, Result};
use crate::DEFAULT_PORT;
use std::str::FromStr;
use url::Url;

/// Address and password used to reach the remote application.
///
/// Both are optional so they can be filled in after construction; an
/// address is required by the time a connection is attempted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObsCredentials {
    /// WebSocket address, e.g. `ws://127.0.0.1:4455`
    pub address: Option<String>,

    /// Server password
    pub password: Option<String>,
}

impl ObsCredentials {
    /// Credentials for an address without password
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            password: None,
        }
    }

    /// Set the password
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Parse a connection string.
    ///
    /// Accepts `ws://[:password@]host[:port][/path]`, `wss://...`, or the
    /// scheme-less shorthand `[password@]host[:port]`. The port defaults to
    /// [`DEFAULT_PORT`].
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(Error::Config("Empty connection string".to_string()));
        }

        let url = if input.contains("://") {
            Url::parse(input)?
        } else {
            Url::parse(&format!("ws://{}", input))?
        };

        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(Error::Config(format!(
                "Unsupported scheme in connection string: {}",
                url.scheme()
            )));
        }

        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| Error::Config("Invalid host in connection string".to_string()))?;
        let port = url.port().unwrap_or(DEFAULT_PORT);

        // `secret@host` carries the password in the user slot
        let password = match url.password() {
            Some(pass) if !pass.is_empty() => Some(pass.to_string()),
            Some(_) => None,
            None if !url.username().is_empty() => Some(url.username().to_string()),
            None => None,
        };

        let path = if url.path() == "/" || url.path().is_empty() {
            String::new()
        } else {
            url.path().to_string()
        };

        Ok(Self {
            address: Some(format!("{}://{}:{}{}", url.scheme(), host, port, path)),
            password,
        })
    }
}

impl FromStr for ObsCredentials {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ObsCredentials::parse(s)
    }
}
