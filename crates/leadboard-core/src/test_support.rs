//! In-memory transport for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::Semaphore;

use crate::api::{ApiClient, ApiError, HttpRequest, HttpResponse, HttpTransport};
use crate::config::Config;

pub const BASE_URL: &str = "http://backend.test";

/// Responds from a table keyed by endpoint path; unknown paths get a 404.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<String, (u16, String)>>,
    requests: Mutex<Vec<HttpRequest>>,
    calls: AtomicUsize,
    delay: Mutex<Option<Duration>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, endpoint: &str, status: u16, body: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), (status, body.to_string()));
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Hold every request until a permit is added to the returned semaphore.
    pub fn hold(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn client(self: &Arc<Self>) -> ApiClient {
        let config = Config::default().with_api_base_url(BASE_URL);
        ApiClient::with_transport(&config, self.clone())
    }
}

impl HttpTransport for MockTransport {
    fn send(&self, request: HttpRequest) -> BoxFuture<'static, Result<HttpResponse, ApiError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let path = request
            .url
            .strip_prefix(BASE_URL)
            .unwrap_or(&request.url)
            .trim_start_matches('/')
            .to_string();
        let (status, body) = self
            .routes
            .lock()
            .unwrap()
            .get(&path)
            .cloned()
            .unwrap_or((404, r#"{"message": "Not found"}"#.to_string()));
        self.requests.lock().unwrap().push(request);
        let delay = *self.delay.lock().unwrap();
        let gate = self.gate.lock().unwrap().clone();

        async move {
            if let Some(gate) = gate {
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
            }
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            Ok(HttpResponse { status, body })
        }
        .boxed()
    }
}
