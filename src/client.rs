use crate::error::{RemoteError, RemoteResult, SecomatError};
use crate::protocol::{
    self, CommandRequest, CommandResponse, API_URL, API_VERSION, API_VERSION_HEADER,
    CLAIM_TOKEN_HEADER, USER_AGENT,
};
use crate::types::StateSnapshot;
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT as USER_AGENT_HEADER};
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;
use tokio::sync::Mutex;

/// Timeout applied to every request
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client slot, filled on first use
struct HttpSlot {
    client: Option<Client>,
    /// Whether the client was built here (and may therefore be released here)
    owned: bool,
}

/// Client for the Secomat cloud API
///
/// One client talks to one device, identified by its claim token. The
/// underlying HTTP client is created lazily on the first request and reused
/// until [`SecomatClient::release`] is called.
pub struct SecomatClient {
    claim_token: String,
    url: Url,
    timeout: Duration,
    user_agent: String,
    https_only: bool,
    http: Mutex<HttpSlot>,
}

/// Builder for [`SecomatClient`]
pub struct ClientBuilder {
    claim_token: String,
    base_url: String,
    timeout: Duration,
    user_agent: String,
    https_only: bool,
    http_client: Option<Client>,
}

impl ClientBuilder {
    fn new(claim_token: String) -> Self {
        Self {
            claim_token,
            base_url: API_URL.to_string(),
            timeout: REQUEST_TIMEOUT,
            user_agent: USER_AGENT.to_string(),
            https_only: true,
            http_client: None,
        }
    }

    /// Override the endpoint URL
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the per-request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the user agent sent with every request
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Allow plain HTTP endpoints (local test servers only)
    pub fn https_only(mut self, https_only: bool) -> Self {
        self.https_only = https_only;
        self
    }

    /// Use an externally owned HTTP client
    ///
    /// A supplied client is never dropped by [`SecomatClient::release`].
    pub fn http_client(mut self, client: Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Build the client; fails on an invalid or (by default) non-https URL
    pub fn build(self) -> Result<SecomatClient, SecomatError> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| SecomatError::Config(format!("Invalid API URL {}: {}", self.base_url, e)))?;

        if self.https_only && url.scheme() != "https" {
            return Err(SecomatError::Config(format!(
                "API URL must use https: {}",
                self.base_url
            )));
        }

        let owned = self.http_client.is_none();
        Ok(SecomatClient {
            claim_token: self.claim_token,
            url,
            timeout: self.timeout,
            user_agent: self.user_agent,
            https_only: self.https_only,
            http: Mutex::new(HttpSlot {
                client: self.http_client,
                owned,
            }),
        })
    }
}

impl SecomatClient {
    /// Create a client for the fixed Secomat endpoint
    ///
    /// # Example
    ///
    /// ```no_run
    /// use secomat::SecomatClient;
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let client = SecomatClient::new("my-claim-token")?;
    ///     let state = client.fetch_state().await?;
    ///     println!("Humidity: {:?}", state.humidity());
    ///     client.release().await;
    ///     Ok(())
    /// }
    /// ```
    pub fn new(claim_token: impl Into<String>) -> Result<Self, SecomatError> {
        Self::builder(claim_token).build()
    }

    /// Start configuring a client
    pub fn builder(claim_token: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(claim_token.into())
    }

    /// Endpoint this client talks to
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Get the shared HTTP client, creating it on first use
    async fn http(&self) -> RemoteResult<Client> {
        let mut slot = self.http.lock().await;
        if let Some(client) = &slot.client {
            return Ok(client.clone());
        }

        tracing::debug!("Creating HTTP client for {}", self.url);
        let client = Client::builder()
            .timeout(self.timeout)
            .https_only(self.https_only)
            .build()
            .map_err(RemoteError::Connection)?;

        slot.client = Some(client.clone());
        slot.owned = true;
        Ok(client)
    }

    /// Attach the headers every request carries
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(CLAIM_TOKEN_HEADER, &self.claim_token)
            .header(API_VERSION_HEADER, API_VERSION)
            .header(ACCEPT, "*/*")
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT_HEADER, &self.user_agent)
            .timeout(self.timeout)
    }

    /// Send a request and decode the JSON body of a 200 response
    async fn execute(&self, request: RequestBuilder) -> RemoteResult<Value> {
        let response = request.send().await?;

        let status = response.status();
        if status != StatusCode::OK {
            tracing::debug!("API returned {}", status);
            return Err(RemoteError::Status(status.as_u16()));
        }

        let body = response.json::<Value>().await?;
        tracing::trace!("Received: {}", body);
        Ok(body)
    }

    /// Fetch the current device state
    ///
    /// Enveloped responses (`{"type": "STATE", "payload": {...}}`) yield the
    /// payload, bare objects are returned unchanged. A state that is not a
    /// JSON object is rejected with [`RemoteError::Decode`].
    pub async fn fetch_state(&self) -> RemoteResult<StateSnapshot> {
        let http = self.http().await?;
        tracing::debug!("Fetching state from {}", self.url);

        let body = self.execute(self.authorize(http.get(self.url.clone()))).await?;

        match protocol::unwrap_state(body) {
            Value::Object(fields) => Ok(StateSnapshot::new(fields)),
            other => Err(RemoteError::Decode(format!(
                "State is not an object: {}",
                other
            ))),
        }
    }

    /// Send a command
    ///
    /// Returns `Ok(true)` when the API reports `status: "OK"` and `Ok(false)`
    /// for any other status, including none at all.
    pub async fn send_command(
        &self,
        command: &str,
        args: Option<Map<String, Value>>,
    ) -> RemoteResult<bool> {
        let request = CommandRequest::new(command).with_args(args.unwrap_or_default());
        self.send(&request).await
    }

    /// Send a prepared command request
    pub async fn send(&self, request: &CommandRequest) -> RemoteResult<bool> {
        let http = self.http().await?;
        tracing::debug!("Sending command {} with args {:?}", request.command, request.args);

        let body = self
            .execute(self.authorize(http.post(self.url.clone())).json(request))
            .await?;

        let response = CommandResponse::from_value(&body);
        if !response.is_ok() {
            tracing::debug!(
                "Command {} not accepted, status {:?}",
                request.command,
                response.status
            );
        }
        Ok(response.is_ok())
    }

    /// Check that the claim token gives access to a device
    ///
    /// Any remote failure, including a 401/403 rejection, yields `false`.
    pub async fn validate_credential(&self) -> bool {
        match self.fetch_state().await {
            Ok(state) => state.contains_key(StateSnapshot::SERIAL_NUMBER),
            Err(e) => {
                tracing::debug!("Credential validation failed: {}", e);
                false
            }
        }
    }

    /// Fetch the device serial number, the stable identifier of the device
    pub async fn serial_number(&self) -> RemoteResult<Option<String>> {
        Ok(self.fetch_state().await?.serial_number())
    }

    /// Release the HTTP client
    ///
    /// Safe to call repeatedly. An externally supplied client is left alone.
    /// A later request creates a fresh client.
    pub async fn release(&self) {
        let mut slot = self.http.lock().await;
        if slot.owned && slot.client.take().is_some() {
            tracing::debug!("Released HTTP client for {}", self.url);
        }
    }
}

impl fmt::Debug for SecomatClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecomatClient")
            .field("claim_token", &"<redacted>")
            .field("url", &self.url.as_str())
            .field("timeout", &self.timeout)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}
