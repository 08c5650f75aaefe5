//! Scripted transport and helpers shared by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use tokio::sync::Notify;

use crate::api::transport::{HttpRequest, HttpResponse, Method, Transport};
use crate::api::{ApiClient, ApiError};
use crate::auth::{CredentialStore, Navigator, TokenPair};

pub const TEST_BASE: &str = "http://okr.test";

type Handler = Box<dyn Fn(&HttpRequest) -> Result<HttpResponse, ApiError> + Send + Sync>;

/// Transport answering from a closure and recording every request.
///
/// Each send yields to the scheduler once before answering so concurrent
/// callers interleave the way real network calls do.
pub struct MockTransport {
    handler: Handler,
    requests: Mutex<Vec<HttpRequest>>,
    gates: Mutex<Vec<(Method, String, Arc<Notify>)>>,
}

impl MockTransport {
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&HttpRequest) -> Result<HttpResponse, ApiError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
            gates: Mutex::new(Vec::new()),
        })
    }

    /// Hold the next request to `method path` until `notify` fires
    pub fn gate(&self, method: Method, path: &str, notify: Arc<Notify>) {
        self.gates
            .lock()
            .unwrap()
            .push((method, path.to_string(), notify));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self, method: Method, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == method && path_of(r) == path)
            .count()
    }
}

impl Transport for MockTransport {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, ApiError>> {
        Box::pin(async move {
            self.requests.lock().unwrap().push(request.clone());
            tokio::task::yield_now().await;

            let gate = {
                let mut gates = self.gates.lock().unwrap();
                gates
                    .iter()
                    .position(|(method, path, _)| *method == request.method && path == path_of(&request))
                    .map(|i| gates.remove(i).2)
            };
            if let Some(notify) = gate {
                notify.notified().await;
            }

            (self.handler)(&request)
        })
    }
}

/// Request path with the test base stripped
pub fn path_of(request: &HttpRequest) -> &str {
    request.url.strip_prefix(TEST_BASE).unwrap_or(&request.url)
}

pub fn bearer(request: &HttpRequest) -> Option<&str> {
    request
        .header("Authorization")
        .and_then(|h| h.strip_prefix("Bearer "))
}

pub fn respond(status: u16, body: &str) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::new(status, body))
}

#[derive(Default)]
pub struct CountingNavigator {
    redirects: AtomicUsize,
}

impl CountingNavigator {
    pub fn redirects(&self) -> usize {
        self.redirects.load(Ordering::SeqCst)
    }
}

impl Navigator for CountingNavigator {
    fn redirect_to_login(&self) {
        self.redirects.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn pair(access: &str, refresh: &str) -> TokenPair {
    TokenPair {
        access_token: access.to_string(),
        refresh_token: refresh.to_string(),
    }
}

/// Client on the mock transport with a counting navigator
pub fn client(
    transport: Arc<MockTransport>,
    credentials: CredentialStore,
) -> (ApiClient, Arc<CountingNavigator>) {
    let navigator = Arc::new(CountingNavigator::default());
    let api = ApiClient::with_transport(transport, credentials, TEST_BASE)
        .with_navigator(navigator.clone());
    (api, navigator)
}
