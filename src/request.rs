use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use crossbeam_channel::{bounded, RecvTimeoutError};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use url::Url;

/// Statuses treated as a completed call. Anything else is a transient failure
/// unless it is a 404.
const ACCEPTED_STATUSES: [u16; 6] = [200, 201, 202, 301, 302, 303];
const OVERLOAD_STATUSES: [u16; 4] = [503, 504, 520, 521];

/// Status reported when the transport never reached the remote.
pub const STATUS_BLOCKED: u16 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub form: Option<Vec<(String, String)>>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            query: Vec::new(),
            form: None,
        }
    }

    pub fn post(path: impl Into<String>, form: Vec<(String, String)>) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            query: Vec::new(),
            form: Some(form),
        }
    }

    pub fn with_query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn blocked() -> Self {
        Self::new(STATUS_BLOCKED, "")
    }

    pub fn is_accepted(&self) -> bool {
        ACCEPTED_STATUSES.contains(&self.status)
    }
}

/// Performs one outbound call. Implementations block until the remote answers
/// and report network-level failures as [`STATUS_BLOCKED`].
pub trait Transport: Send + Sync {
    fn execute(&self, request: &ApiRequest) -> TransportResponse;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    RemoteOverload,
    Blocked,
    ConnectivityTimeout,
    MalformedResponse,
    GenericRemoteError,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        !matches!(self, ErrorKind::NotFound | ErrorKind::MalformedResponse)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("the requested item does not exist")]
    NotFound,
    #[error("the discussion service is overloaded (status {status})")]
    RemoteOverload { status: u16 },
    #[error("the request was blocked before reaching the discussion service")]
    Blocked,
    #[error("no response within {0:?}")]
    ConnectivityTimeout(Duration),
    #[error("unexpected response shape: {0}")]
    MalformedResponse(String),
    #[error("discussion service error {status}: {body}")]
    Remote { status: u16, body: String },
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::NotFound => ErrorKind::NotFound,
            ApiError::RemoteOverload { .. } => ErrorKind::RemoteOverload,
            ApiError::Blocked => ErrorKind::Blocked,
            ApiError::ConnectivityTimeout(_) => ErrorKind::ConnectivityTimeout,
            ApiError::MalformedResponse(_) => ErrorKind::MalformedResponse,
            ApiError::Remote { .. } => ErrorKind::GenericRemoteError,
        }
    }

    /// Raw body or parser message kept for diagnostics.
    pub fn detail(&self) -> Option<&str> {
        match self {
            ApiError::Remote { body, .. } if !body.is_empty() => Some(body),
            ApiError::MalformedResponse(message) => Some(message),
            _ => None,
        }
    }

    fn classify(response: TransportResponse) -> Self {
        match response.status {
            404 => ApiError::NotFound,
            STATUS_BLOCKED => ApiError::Blocked,
            status if OVERLOAD_STATUSES.contains(&status) => ApiError::RemoteOverload { status },
            status => ApiError::Remote {
                status,
                body: response.body,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestPolicy {
    pub attempts: u32,
    pub slow_after: Duration,
    pub timeout: Duration,
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            slow_after: Duration::from_secs(3),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Progress hooks for the presentation layer. Both fire on the calling thread.
pub trait RequestObserver: Send + Sync {
    fn slow(&self, _request: &ApiRequest) {}
    fn retrying(&self, _request: &ApiRequest, _attempt: u32) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl RequestObserver for NoopObserver {}

/// Retry, slow-signal and deadline handling around a [`Transport`].
///
/// The deadline covers every attempt of one call. A call that misses it is
/// reported as [`ApiError::ConnectivityTimeout`]; the transport keeps running
/// in the background and its eventual answer is discarded.
pub struct Orchestrator {
    transport: Arc<dyn Transport>,
    policy: RequestPolicy,
    observer: Arc<dyn RequestObserver>,
}

impl Orchestrator {
    pub fn new(
        transport: Arc<dyn Transport>,
        policy: RequestPolicy,
        observer: Arc<dyn RequestObserver>,
    ) -> Self {
        Self {
            transport,
            policy,
            observer,
        }
    }

    /// Same transport and policy, reporting progress to `observer`.
    pub fn with_observer(&self, observer: Arc<dyn RequestObserver>) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            policy: self.policy,
            observer,
        }
    }

    pub fn execute(&self, request: &ApiRequest) -> Result<String, ApiError> {
        let started = Instant::now();
        let mut slow_reported = false;
        let attempts = self.policy.attempts.max(1);
        let mut last = TransportResponse::blocked();

        for attempt in 1..=attempts {
            tracing::debug!(path = %request.path, attempt, "dispatching request");
            let response = self.await_attempt(request, started, &mut slow_reported)?;
            if response.is_accepted() {
                return Ok(response.body);
            }
            if response.status == 404 {
                tracing::debug!(path = %request.path, "remote reports not found");
                return Err(ApiError::NotFound);
            }
            tracing::warn!(
                path = %request.path,
                status = response.status,
                attempt,
                "request failed"
            );
            last = response;
            if attempt < attempts {
                self.observer.retrying(request, attempt + 1);
            }
        }

        Err(ApiError::classify(last))
    }

    pub fn execute_json<T>(&self, request: &ApiRequest) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        let body = self.execute(request)?;
        serde_json::from_str(&body).map_err(|err| {
            tracing::warn!(path = %request.path, error = %err, "malformed response");
            ApiError::MalformedResponse(err.to_string())
        })
    }

    fn await_attempt(
        &self,
        request: &ApiRequest,
        started: Instant,
        slow_reported: &mut bool,
    ) -> Result<TransportResponse, ApiError> {
        let (tx, rx) = bounded(1);
        let transport = Arc::clone(&self.transport);
        let owned = request.clone();
        thread::spawn(move || {
            let response = transport.execute(&owned);
            let _ = tx.send(response);
        });

        loop {
            let elapsed = started.elapsed();
            if elapsed >= self.policy.timeout {
                tracing::warn!(path = %request.path, "request timed out");
                return Err(ApiError::ConnectivityTimeout(self.policy.timeout));
            }
            let mut wait = self.policy.timeout - elapsed;
            if !*slow_reported {
                wait = wait.min(self.policy.slow_after.saturating_sub(elapsed));
            }
            match rx.recv_timeout(wait) {
                Ok(response) => return Ok(response),
                Err(RecvTimeoutError::Timeout) => {
                    if !*slow_reported && started.elapsed() >= self.policy.slow_after {
                        *slow_reported = true;
                        tracing::info!(path = %request.path, "request is taking a while");
                        self.observer.slow(request);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return Ok(TransportResponse::blocked()),
            }
        }
    }
}

/// Blocking HTTP transport against the discussion API.
pub struct HttpTransport {
    http: HttpClient,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(base_url: &str, user_agent: &str) -> Result<Self> {
        if user_agent.trim().is_empty() {
            bail!("http transport user agent required");
        }
        let base_url = Url::parse(base_url)?;
        // The orchestrator owns the call deadline; this only stops leaked threads.
        let http = HttpClient::builder()
            .user_agent(user_agent.to_string())
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self { http, base_url })
    }

    fn send(&self, request: &ApiRequest) -> Result<TransportResponse> {
        let mut url = self.base_url.join(request.path.trim_start_matches('/'))?;
        if !request.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in &request.query {
                pairs.append_pair(k, v);
            }
        }

        let mut req = match request.method {
            Method::Get => self.http.get(url),
            Method::Post => self.http.post(url),
        };
        if let Some(form) = &request.form {
            req = req.header(CONTENT_TYPE, "application/x-www-form-urlencoded");
            req = req.form(form);
        }

        let resp = req.send()?;
        let status = resp.status().as_u16();
        let body = resp.text().unwrap_or_default();
        Ok(TransportResponse { status, body })
    }
}

impl Transport for HttpTransport {
    fn execute(&self, request: &ApiRequest) -> TransportResponse {
        match self.send(request) {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!(path = %request.path, error = %err, "transport failure");
                TransportResponse::blocked()
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::testing::ScriptedTransport;
    use super::*;

    #[derive(Default)]
    struct CountingObserver {
        slow: AtomicU32,
        retries: AtomicU32,
    }

    impl RequestObserver for CountingObserver {
        fn slow(&self, _request: &ApiRequest) {
            self.slow.fetch_add(1, Ordering::SeqCst);
        }

        fn retrying(&self, _request: &ApiRequest, _attempt: u32) {
            self.retries.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn orchestrator(
        transport: Arc<ScriptedTransport>,
        policy: RequestPolicy,
    ) -> (Orchestrator, Arc<CountingObserver>) {
        let observer = Arc::new(CountingObserver::default());
        (
            Orchestrator::new(transport, policy, observer.clone()),
            observer,
        )
    }

    #[test]
    fn succeeds_on_third_attempt() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .respond("/x", 500, "")
            .respond("/x", 500, "")
            .respond("/x", 200, "ok");
        let (orch, observer) = orchestrator(transport.clone(), RequestPolicy::default());
        let body = orch.execute(&ApiRequest::get("/x")).unwrap();
        assert_eq!(body, "ok");
        assert_eq!(transport.calls_to("/x"), 3);
        assert_eq!(observer.retries.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn not_found_is_terminal_without_retry() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("/gone", 404, "");
        let (orch, observer) = orchestrator(transport.clone(), RequestPolicy::default());
        let err = orch.execute(&ApiRequest::get("/gone")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(transport.calls_to("/gone"), 1);
        assert_eq!(observer.retries.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn classifies_after_exhausting_retries() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("/busy", 503, "");
        transport.respond("/blocked", 0, "");
        transport.respond("/teapot", 418, "short and stout");
        let (orch, _) = orchestrator(transport.clone(), RequestPolicy::default());

        let err = orch.execute(&ApiRequest::get("/busy")).unwrap_err();
        assert_eq!(err, ApiError::RemoteOverload { status: 503 });
        assert_eq!(transport.calls_to("/busy"), 3);

        let err = orch.execute(&ApiRequest::get("/blocked")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Blocked);

        let err = orch.execute(&ApiRequest::get("/teapot")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GenericRemoteError);
        assert_eq!(err.detail(), Some("short and stout"));
    }

    #[test]
    fn malformed_body_is_not_retried() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("/json", 200, "<html>");
        let (orch, _) = orchestrator(transport.clone(), RequestPolicy::default());
        let err = orch
            .execute_json::<serde_json::Value>(&ApiRequest::get("/json"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
        assert!(!err.kind().is_retryable());
        assert_eq!(transport.calls_to("/json"), 1);
    }

    #[test]
    fn slow_signal_fires_once_without_cancelling() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond_after("/slow", Duration::from_millis(120), 200, "late");
        let policy = RequestPolicy {
            attempts: 3,
            slow_after: Duration::from_millis(30),
            timeout: Duration::from_secs(5),
        };
        let (orch, observer) = orchestrator(transport, policy);
        let body = orch.execute(&ApiRequest::get("/slow")).unwrap();
        assert_eq!(body, "late");
        assert_eq!(observer.slow.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn deadline_reports_connectivity_timeout() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond_after("/hang", Duration::from_millis(500), 200, "too late");
        let policy = RequestPolicy {
            attempts: 3,
            slow_after: Duration::from_millis(10),
            timeout: Duration::from_millis(60),
        };
        let (orch, _) = orchestrator(transport.clone(), policy);
        let err = orch.execute(&ApiRequest::get("/hang")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectivityTimeout);
        assert_eq!(transport.calls_to("/hang"), 1);
    }

    #[test]
    fn retryable_set_excludes_terminal_kinds() {
        assert!(ErrorKind::RemoteOverload.is_retryable());
        assert!(ErrorKind::Blocked.is_retryable());
        assert!(ErrorKind::ConnectivityTimeout.is_retryable());
        assert!(ErrorKind::GenericRemoteError.is_retryable());
        assert!(!ErrorKind::NotFound.is_retryable());
        assert!(!ErrorKind::MalformedResponse.is_retryable());
    }
}
