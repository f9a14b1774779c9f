//! # Telecall
//!
//! Telecall is a thin client layer over AWS service lookups. Some services
//! (AWS Elemental MediaConvert, for example) must be asked for an
//! account-specific endpoint before the real request can be issued, others
//! are addressed statically. Telecall hides that difference behind a single
//! [`ApiCommand::execute`] call with uniform error handling.
//!
//! ## Concepts
//!
//! - **Factory**: a [`ClientFactory`] knows how to build a [`ServiceClient`]
//!   for a given [`ClientConfig`], whether its service needs
//!   [`Discovery::Dynamic`] endpoint resolution, and how to render a result.
//! - **Client**: a [`ServiceClient`] issues the network calls. It is owned by
//!   a single invocation and dropped before that invocation returns.
//! - **Command**: an [`ApiCommand`] drives one lookup through its states,
//!   [`State::Unresolved`] to [`State::Resolved`] to [`State::Completed`] or
//!   [`State::Failed`].
//!
//! AWS-backed factories live in [`aws`].
//!
//! ## Error Handling
//!
//! Every fallible operation returns [`Error`]. Nothing is retried here and
//! nothing exits the process; that is left to the caller.

use std::{collections::BTreeMap, future::Future};

use snafu::prelude::*;

pub mod aws;
pub mod config;

/// Upper bound on the number of endpoints requested during discovery.
pub const MAX_ENDPOINT_RESULTS: i32 = 20;

/// Longest identifier accepted by [`validate_identifier`], in bytes.
pub const MAX_IDENTIFIER_LEN: usize = 1024;

/// Top-level error enum that encompasses all errors.
#[derive(snafu::Snafu, Debug)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Invalid argument: {reason}"))]
    InvalidArgument { reason: String },

    #[snafu(display("Cannot find {service} service endpoint URL!"))]
    EndpointUnavailable { service: String },

    /// Raised by the provider. Displays the provider's message verbatim.
    #[snafu(display("{message}"))]
    Service {
        code: Option<String>,
        message: String,
    },

    #[snafu(display("Could not build the {service} request: {message}"))]
    BuildRequest { service: String, message: String },

    #[snafu(display("Could not read config file '{path:?}': {source}"))]
    ConfigRead {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Could not parse config file '{path:?}': {source}"))]
    ConfigParse {
        path: std::path::PathBuf,
        source: toml::de::Error,
    },

    #[snafu(display("Invalid configuration: {reason}"))]
    ConfigInvalid { reason: String },
}

impl Error {
    /// Whether this error was caused by the caller's input (arguments or
    /// configuration) rather than by the provider.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Error::InvalidArgument { .. }
                | Error::ConfigRead { .. }
                | Error::ConfigParse { .. }
                | Error::ConfigInvalid { .. }
        )
    }
}

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// A single request parameter value.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    String(String),
    Number(i64),
    Bool(bool),
}

impl ParamValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::String(value.to_owned())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::String(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Number(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

/// A request for one operation, built once per invocation.
///
/// Parameters can only be added while building; there are no setters.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct ApiRequest {
    operation_name: String,
    parameters: BTreeMap<String, ParamValue>,
}

impl ApiRequest {
    pub fn new(operation_name: impl Into<String>) -> Self {
        ApiRequest {
            operation_name: operation_name.into(),
            parameters: BTreeMap::default(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn operation_name(&self) -> &str {
        &self.operation_name
    }

    pub fn parameters(&self) -> &BTreeMap<String, ParamValue> {
        &self.parameters
    }

    pub fn param(&self, key: &str) -> Option<&ParamValue> {
        self.parameters.get(key)
    }

    /// Returns the string parameter `key`, or an `InvalidArgument` error if
    /// it is missing or not a string.
    pub fn str_param(&self, key: &str) -> Result<&str> {
        self.param(key)
            .and_then(ParamValue::as_str)
            .with_context(|| InvalidArgumentSnafu {
                reason: format!(
                    "operation '{}' requires a string parameter '{key}'",
                    self.operation_name
                ),
            })
    }
}

/// Read-only view of a provider response.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiResponse {
    primary_identifier: Option<String>,
    raw_payload: serde_json::Value,
}

impl ApiResponse {
    pub fn new(primary_identifier: Option<String>, raw_payload: serde_json::Value) -> Self {
        ApiResponse {
            primary_identifier,
            raw_payload,
        }
    }

    /// The unique key of the returned resource, exactly as the provider sent it.
    pub fn primary_identifier(&self) -> Option<&str> {
        self.primary_identifier.as_deref()
    }

    pub fn raw_payload(&self) -> &serde_json::Value {
        &self.raw_payload
    }
}

/// A service endpoint returned by discovery.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ServiceEndpoint {
    pub url: String,
    pub region: String,
}

/// Immutable client configuration handed to a [`ClientFactory`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    region: String,
    endpoint: Option<ServiceEndpoint>,
}

impl ClientConfig {
    pub fn new(region: impl Into<String>) -> Self {
        ClientConfig {
            region: region.into(),
            endpoint: None,
        }
    }

    /// Returns a new config bound to `endpoint`. The endpoint's region
    /// scopes the credentials of any client built from it.
    pub fn with_endpoint(&self, endpoint: ServiceEndpoint) -> Self {
        ClientConfig {
            region: endpoint.region.clone(),
            endpoint: Some(endpoint),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn endpoint(&self) -> Option<&ServiceEndpoint> {
        self.endpoint.as_ref()
    }

    pub fn endpoint_url(&self) -> Option<&str> {
        self.endpoint.as_ref().map(|e| e.url.as_str())
    }
}

/// How a service is addressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Discovery {
    /// The SDK's default endpoint for the region is used.
    Static,
    /// Endpoints must be listed first, and the client rebound to the first one.
    Dynamic,
}

/// The network side of a service.
///
/// Clients are closed by dropping them.
pub trait ServiceClient {
    /// Lists the endpoints available to the caller, at most `max_results`.
    ///
    /// Statically addressed services have nothing to discover, so the
    /// default returns an empty list.
    fn describe_endpoints(
        &self,
        _max_results: i32,
    ) -> impl Future<Output = Result<Vec<ServiceEndpoint>>> {
        async { Ok(Vec::new()) }
    }

    /// Issues the primary call.
    fn call(&self, request: &ApiRequest) -> impl Future<Output = Result<ApiResponse>>;
}

/// Builds clients for one service.
pub trait ClientFactory {
    type Client: ServiceClient;

    /// Human readable service name, used in errors and logs.
    fn service_name(&self) -> &str;

    fn discovery(&self) -> Discovery;

    /// Names of the operations this service's clients accept.
    fn operations(&self) -> &[&'static str];

    fn connect(&self, config: &ClientConfig) -> Self::Client;

    /// Renders the single output line for a successful lookup of `identifier`.
    fn report(&self, identifier: &str, response: &ApiResponse) -> String;
}

/// Lifecycle of one [`ApiCommand::execute`] invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum State {
    Unresolved,
    /// Bound to a discovered endpoint, or to the static one when `None`.
    Resolved { endpoint: Option<ServiceEndpoint> },
    Completed,
    Failed,
}

impl core::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            State::Unresolved => f.write_str("unresolved"),
            State::Resolved { endpoint: None } => f.write_str("resolved (static)"),
            State::Resolved {
                endpoint: Some(endpoint),
            } => write!(f, "resolved ({} in {})", endpoint.url, endpoint.region),
            State::Completed => f.write_str("completed"),
            State::Failed => f.write_str("failed"),
        }
    }
}

/// Checks that `identifier` is usable as a resource identifier.
pub fn validate_identifier(identifier: &str) -> Result<()> {
    ensure!(
        !identifier.trim().is_empty(),
        InvalidArgumentSnafu {
            reason: "identifier must not be empty"
        }
    );
    ensure!(
        !identifier
            .chars()
            .any(|c| c.is_whitespace() || c.is_control()),
        InvalidArgumentSnafu {
            reason: format!("identifier {identifier:?} contains whitespace or control characters")
        }
    );
    ensure!(
        identifier.len() <= MAX_IDENTIFIER_LEN,
        InvalidArgumentSnafu {
            reason: format!("identifier exceeds {MAX_IDENTIFIER_LEN} bytes")
        }
    );
    Ok(())
}

/// Resolves a service endpoint (when needed) and issues a single call.
pub struct ApiCommand<F> {
    factory: F,
    config: ClientConfig,
    state: State,
}

impl<F: ClientFactory> ApiCommand<F> {
    pub fn new(factory: F, config: ClientConfig) -> Self {
        ApiCommand {
            factory,
            config,
            state: State::Unresolved,
        }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// State reached by the most recent invocation.
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Executes `operation` against the resource named by `identifier`.
    ///
    /// Invalid input is rejected before any client is opened. Every client
    /// opened here is dropped before this returns.
    pub async fn execute(&mut self, operation: &str, identifier: &str) -> Result<ApiResponse> {
        self.transition(State::Unresolved);
        let result = self.run(operation, identifier).await;
        match &result {
            Ok(response) => {
                log::info!(
                    "{operation} on {} returned {:?}",
                    self.factory.service_name(),
                    response.primary_identifier()
                );
                self.transition(State::Completed);
            }
            Err(e) => {
                log::debug!("{operation} on {} failed: {e}", self.factory.service_name());
                self.transition(State::Failed);
            }
        }
        result
    }

    async fn run(&mut self, operation: &str, identifier: &str) -> Result<ApiResponse> {
        validate_identifier(identifier)?;
        ensure!(
            self.factory.operations().iter().any(|op| *op == operation),
            InvalidArgumentSnafu {
                reason: format!(
                    "{} does not support the operation '{operation}'",
                    self.factory.service_name()
                )
            }
        );
        let request = ApiRequest::new(operation).with_param("id", identifier);
        let client = self.resolve().await?;
        client.call(&request).await
    }

    async fn resolve(&mut self) -> Result<F::Client> {
        match self.factory.discovery() {
            Discovery::Static => {
                let client = self.factory.connect(&self.config);
                self.transition(State::Resolved { endpoint: None });
                Ok(client)
            }
            Discovery::Dynamic => {
                let endpoints = {
                    let discovery = self.factory.connect(&self.config);
                    discovery.describe_endpoints(MAX_ENDPOINT_RESULTS).await?
                };
                log::debug!(
                    "{} discovery returned {} endpoint(s)",
                    self.factory.service_name(),
                    endpoints.len()
                );
                let endpoint = endpoints.into_iter().next().context(EndpointUnavailableSnafu {
                    service: self.factory.service_name(),
                })?;
                let config = self.config.with_endpoint(endpoint.clone());
                let client = self.factory.connect(&config);
                self.transition(State::Resolved {
                    endpoint: Some(endpoint),
                });
                Ok(client)
            }
        }
    }

    fn transition(&mut self, next: State) {
        log::debug!("{}: {} -> {next}", self.factory.service_name(), self.state);
        self.state = next;
    }
}
