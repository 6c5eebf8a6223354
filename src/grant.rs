//! GNAP grant negotiation.
//!
//! This module implements the client side of the Grant Negotiation and
//! Authorization Protocol: submitting grant requests to an authorization
//! server, distinguishing immediate from interactive grants, and driving the
//! continuation sub-flow after the user completes an out-of-band consent
//! interaction.
//!
//! Each attempt is an explicit state machine rather than branching on raw
//! response shapes, so every transition and terminal state is enumerable:
//!
//! ```text
//! Requested ── immediate token ──────────▶ Granted ── out-of-band ──▶ Revoked
//!     │
//!     └── interaction required ──▶ AwaitingInteraction
//!                                        │ user completed interaction
//!                                        ▼
//!                                   Continuing ── token issued ──▶ Granted
//!                                        │
//!                                        ├── deadline exceeded ──▶ Failed(Timeout)
//!                                        └── server refuses ─────▶ Failed(Denied | ServerError)
//! ```

use crate::errors::{OpError, Result};
use crate::keys::KeyStore;
use crate::signing::sign_request;
use crate::transport::{HttpRequest, HttpTransport};
use crate::types::{AccessRight, AccessToken};
use crate::utils::{current_timestamp, generate_nonce};
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Minimum delay between continuation polls when the server declares none.
/// Polling is never more aggressive than the server-declared wait.
const DEFAULT_MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Why a grant attempt terminally failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantFailure {
    /// The authorization server explicitly refused the grant
    Denied(String),
    /// The authorization server answered with an unexpected error status
    ServerError(u16),
    /// The caller-supplied deadline elapsed before continuation succeeded
    Timeout,
}

/// State of one grant negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantState {
    /// Grant request sent, response not yet classified
    Requested,
    /// The server requires user interaction; a redirect URI is available
    AwaitingInteraction,
    /// Continuation in progress after the interaction signal
    Continuing,
    /// A usable access token has been issued (terminal unless revoked)
    Granted,
    /// Terminal failure
    Failed(GrantFailure),
    /// The granted token was invalidated out-of-band; a fresh request cycle
    /// is required
    Revoked,
}

/// Continuation descriptor handed back with a pending grant.
#[derive(Debug, Clone)]
struct Continuation {
    uri: String,
    token: String,
    wait: Option<u64>,
}

/// One grant attempt and its state.
///
/// The access token is observable only in the `Granted` state: a pending
/// negotiation never leaks a usable token, even when the server included a
/// partial token fragment alongside an interaction requirement.
#[derive(Debug)]
pub struct GrantNegotiation {
    state: GrantState,
    redirect_uri: Option<String>,
    continuation: Option<Continuation>,
    token: Option<AccessToken>,
    requested: Vec<AccessRight>,
}

impl GrantNegotiation {
    /// Current state of this negotiation.
    pub fn state(&self) -> &GrantState {
        &self.state
    }

    /// The access token, available only once the negotiation is `Granted`.
    pub fn token(&self) -> Option<&AccessToken> {
        match self.state {
            GrantState::Granted => self.token.as_ref(),
            _ => None,
        }
    }

    /// The consent redirect URI, available while awaiting interaction.
    pub fn redirect_uri(&self) -> Option<&str> {
        self.redirect_uri.as_deref()
    }

    /// Returns true if user interaction is still required.
    pub fn needs_interaction(&self) -> bool {
        matches!(
            self.state,
            GrantState::AwaitingInteraction | GrantState::Continuing
        )
    }

    /// Marks the granted token as invalidated out-of-band.
    ///
    /// Subsequent resource calls must start a fresh request cycle; the token
    /// is no longer observable through this negotiation.
    pub fn mark_revoked(&mut self) {
        self.state = GrantState::Revoked;
        self.token = None;
    }
}

/// Interaction parameters for grants requiring user consent.
#[derive(Debug, Clone)]
pub struct InteractConfig {
    /// URI the identity provider redirects back to after consent
    pub finish_uri: String,
}

impl InteractConfig {
    /// Creates an interaction config with a redirect finish method.
    pub fn redirect(finish_uri: impl Into<String>) -> Self {
        Self {
            finish_uri: finish_uri.into(),
        }
    }
}

// Wire shapes of grant and continuation responses.

#[derive(Deserialize)]
struct GrantResponseBody {
    access_token: Option<TokenBody>,
    interact: Option<InteractBody>,
    #[serde(rename = "continue")]
    continuation: Option<ContinueBody>,
}

#[derive(Deserialize)]
struct TokenBody {
    value: String,
    #[serde(default)]
    manage: String,
    expires_in: Option<i64>,
    access: Option<Vec<AccessRight>>,
}

#[derive(Deserialize)]
struct InteractBody {
    redirect: String,
}

#[derive(Deserialize)]
struct ContinueBody {
    access_token: ContinueTokenBody,
    uri: String,
    wait: Option<u64>,
}

#[derive(Deserialize)]
struct ContinueTokenBody {
    value: String,
}

/// GNAP client for one authorization server.
///
/// Shares the key store and transport with other components; safe to use
/// from multiple concurrent flows.
pub struct GrantNegotiator {
    auth_server_url: String,
    client_id: String,
    keys: Arc<KeyStore>,
    transport: Arc<dyn HttpTransport>,
    min_poll_interval: Duration,
}

impl GrantNegotiator {
    /// Creates a negotiator for an authorization server.
    pub fn new(
        auth_server_url: impl Into<String>,
        client_id: impl Into<String>,
        keys: Arc<KeyStore>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            auth_server_url: auth_server_url.into(),
            client_id: client_id.into(),
            keys,
            transport,
            min_poll_interval: DEFAULT_MIN_POLL_INTERVAL,
        }
    }

    /// Overrides the minimum continuation poll interval.
    pub fn with_min_poll_interval(mut self, interval: Duration) -> Self {
        self.min_poll_interval = interval;
        self
    }

    /// The authorization server this negotiator talks to.
    pub fn auth_server_url(&self) -> &str {
        &self.auth_server_url
    }

    /// Submits a grant request for the given access rights.
    ///
    /// With `interact` set, the server may answer with an interaction
    /// requirement; the returned negotiation is then `AwaitingInteraction`
    /// and exposes the redirect URI. Without it, only an immediate grant can
    /// succeed.
    ///
    /// A response carrying both a token and an interaction requirement is a
    /// partial grant: it is treated as `AwaitingInteraction` and the token
    /// fragment is discarded, since partial tokens are not assumed usable.
    pub async fn request(
        &self,
        access: Vec<AccessRight>,
        interact: Option<InteractConfig>,
    ) -> Result<GrantNegotiation> {
        let url = self.grant_url();
        let mut body = json!({
            "access_token": access,
            "client": self.client_id,
        });
        if let Some(config) = &interact {
            body["interact"] = json!({
                "start": ["redirect"],
                "finish": {
                    "method": "redirect",
                    "uri": config.finish_uri,
                    "nonce": generate_nonce(),
                },
            });
        }
        let body = body.to_string();

        tracing::debug!(
            auth_server = %self.auth_server_url,
            interactive = interact.is_some(),
            "requesting grant"
        );

        let response = self.post_signed(&url, &body).await?;
        if !response.is_success() {
            return Err(self.status_error(&url, response.status, response.body));
        }

        let parsed: GrantResponseBody = serde_json::from_str(&response.body).map_err(|e| {
            OpError::SchemaError {
                context: format!("grant request to {}", url),
                detail: e.to_string(),
                payload: response.body.clone(),
            }
        })?;

        let mut negotiation = GrantNegotiation {
            state: GrantState::Requested,
            redirect_uri: None,
            continuation: None,
            token: None,
            requested: access,
        };

        match (parsed.interact, parsed.continuation, parsed.access_token) {
            (Some(interact), Some(cont), _) => {
                // Interaction required; any token fragment is ignored until
                // continuation completes.
                tracing::debug!(redirect = %interact.redirect, "grant awaiting interaction");
                negotiation.state = GrantState::AwaitingInteraction;
                negotiation.redirect_uri = Some(interact.redirect);
                negotiation.continuation = Some(Continuation {
                    uri: cont.uri,
                    token: cont.access_token.value,
                    wait: cont.wait,
                });
            }
            (None, _, Some(token)) => {
                tracing::debug!("grant issued immediately");
                negotiation.state = GrantState::Granted;
                negotiation.token = Some(self.build_token(token, &negotiation.requested));
            }
            _ => {
                return Err(OpError::SchemaError {
                    context: format!("grant request to {}", url),
                    detail: "response carries neither an access token nor an interaction"
                        .to_string(),
                    payload: response.body,
                });
            }
        }

        Ok(negotiation)
    }

    /// Continues a pending grant after the user completed the interaction.
    ///
    /// Polls the continuation endpoint until a token is issued, honoring the
    /// server-declared wait between attempts (never less, never busy). If no
    /// token is issued within `deadline` the negotiation transitions to
    /// `Failed(Timeout)` and an `InteractionTimeout` error is returned.
    pub async fn resume(
        &self,
        negotiation: &mut GrantNegotiation,
        deadline: Duration,
    ) -> Result<AccessToken> {
        if let GrantState::Granted = negotiation.state {
            // Already complete; tokens are immutable snapshots.
            if let Some(token) = &negotiation.token {
                return Ok(token.clone());
            }
        }
        if !negotiation.needs_interaction() {
            return Err(OpError::AuthorizationDenied {
                server: self.auth_server_url.clone(),
                reason: format!("grant is not continuable from state {:?}", negotiation.state),
            });
        }

        let started = Instant::now();
        loop {
            negotiation.state = GrantState::Continuing;
            let continuation = negotiation
                .continuation
                .clone()
                .ok_or_else(|| OpError::SchemaError {
                    context: format!("grant continuation at {}", self.auth_server_url),
                    detail: "pending grant has no continuation descriptor".to_string(),
                    payload: String::new(),
                })?;

            tracing::debug!(uri = %continuation.uri, "continuing grant");
            let request = HttpRequest::new(Method::POST, &continuation.uri)
                .header("Authorization", format!("GNAP {}", continuation.token))
                .header("Content-Type", "application/json");
            let response = self.transport.send(request).await?;

            if !response.is_success() {
                let failure = match response.status {
                    401 | 403 => GrantFailure::Denied(response.body.clone()),
                    status => GrantFailure::ServerError(status),
                };
                negotiation.state = GrantState::Failed(failure);
                return Err(self.status_error(&continuation.uri, response.status, response.body));
            }

            let parsed: GrantResponseBody =
                serde_json::from_str(&response.body).map_err(|e| OpError::SchemaError {
                    context: format!("grant continuation at {}", continuation.uri),
                    detail: e.to_string(),
                    payload: response.body.clone(),
                })?;

            if let Some(token) = parsed.access_token {
                tracing::debug!("grant continuation succeeded");
                let token = self.build_token(token, &negotiation.requested);
                negotiation.state = GrantState::Granted;
                negotiation.continuation = None;
                negotiation.token = Some(token.clone());
                return Ok(token);
            }

            // Still pending: the server may rotate the continuation handle.
            let wait = match parsed.continuation {
                Some(cont) => {
                    let wait = cont.wait;
                    negotiation.continuation = Some(Continuation {
                        uri: cont.uri,
                        token: cont.access_token.value,
                        wait,
                    });
                    wait
                }
                None => continuation.wait,
            };

            let interval = std::cmp::max(
                wait.map(Duration::from_secs).unwrap_or(self.min_poll_interval),
                self.min_poll_interval,
            );
            if started.elapsed() + interval > deadline {
                negotiation.state = GrantState::Failed(GrantFailure::Timeout);
                return Err(OpError::InteractionTimeout {
                    waited: started.elapsed(),
                });
            }
            tracing::debug!(?interval, "grant still pending, backing off");
            tokio::time::sleep(interval).await;
        }
    }

    /// Revokes an issued access token via its manage URI.
    ///
    /// The holder's negotiation should be marked revoked with
    /// [`GrantNegotiation::mark_revoked`]; any further resource call with the
    /// old token value will be refused by the server.
    pub async fn revoke_token(&self, token: &AccessToken) -> Result<()> {
        let request = HttpRequest::new(Method::DELETE, &token.manage)
            .header("Authorization", format!("GNAP {}", token.value));
        let response = self.transport.send(request).await?;
        if !response.is_success() {
            return Err(self.status_error(&token.manage, response.status, response.body));
        }
        tracing::debug!(manage = %token.manage, "access token revoked");
        Ok(())
    }

    fn grant_url(&self) -> String {
        format!("{}/", self.auth_server_url.trim_end_matches('/'))
    }

    async fn post_signed(
        &self,
        url: &str,
        body: &str,
    ) -> Result<crate::transport::HttpResponse> {
        let headers =
            sign_request(&self.keys, &Method::POST, url, current_timestamp(), Some(body))?;
        let mut request = HttpRequest::new(Method::POST, url)
            .header("Content-Type", "application/json")
            .body(body);
        headers.apply(&mut request.headers);
        self.transport.send(request).await
    }

    fn build_token(&self, body: TokenBody, requested: &[AccessRight]) -> AccessToken {
        AccessToken {
            value: body.value,
            manage: body.manage,
            expires_at: body
                .expires_in
                .map(|secs| chrono::Utc::now() + chrono::Duration::seconds(secs)),
            // Servers may omit the bound capabilities; the grant is then
            // assumed to cover exactly what was requested.
            access: body.access.unwrap_or_else(|| requested.to_vec()),
        }
    }

    fn status_error(&self, url: &str, status: u16, body: String) -> OpError {
        match status {
            401 | 403 => OpError::AuthorizationDenied {
                server: self.auth_server_url.clone(),
                reason: body,
            },
            _ => OpError::UnexpectedStatus {
                status,
                url: url.to_string(),
                body,
            },
        }
    }
}
