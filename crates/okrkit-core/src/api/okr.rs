//! Objective and key result endpoints.
//!
//! Reads go through the response cache. Writes invalidate every cached read
//! of the collections they touch.

use futures::future::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use super::{ApiClient, ApiError, RequestOptions};
use crate::cache::ResponseCache;
use crate::models::{KeyResult, Objective};

const OBJECTIVES_PATTERN: &str = "^/objectives";
const KEY_RESULTS_PATTERN: &str = "^/key-results";

#[derive(Clone)]
pub struct OkrApi {
    api: ApiClient,
    cache: ResponseCache,
}

impl OkrApi {
    pub fn new(api: ApiClient, cache: ResponseCache) -> Self {
        Self { api, cache }
    }

    // ===== Reads =====

    pub async fn list_objectives(&self) -> Result<Vec<Objective>, ApiError> {
        self.cached_get("/objectives".to_string()).await
    }

    pub async fn get_objective(&self, id: &str) -> Result<Objective, ApiError> {
        self.cached_get(format!("/objectives/{}", id)).await
    }

    pub async fn list_key_results(&self, objective_id: &str) -> Result<Vec<KeyResult>, ApiError> {
        self.cached_get(format!("/key-results/objective/{}", objective_id))
            .await
    }

    // ===== Writes =====

    pub async fn duplicate_objective(&self, id: &str) -> Result<Objective, ApiError> {
        let path = format!("/objectives/{}/duplicate", id);
        let copy = self.api.send_json(&path, RequestOptions::post(json!({}))).await?;
        self.invalidate(&[OBJECTIVES_PATTERN])?;
        Ok(copy)
    }

    pub async fn duplicate_key_result(&self, id: &str) -> Result<KeyResult, ApiError> {
        let path = format!("/key-results/{}/duplicate", id);
        let copy = self.api.send_json(&path, RequestOptions::post(json!({}))).await?;
        self.invalidate(&[KEY_RESULTS_PATTERN, OBJECTIVES_PATTERN])?;
        Ok(copy)
    }

    pub async fn move_objective(
        &self,
        id: &str,
        team_id: Option<&str>,
        workspace_id: Option<&str>,
    ) -> Result<Objective, ApiError> {
        let path = format!("/objectives/{}/move", id);
        let body = json!({ "team_id": team_id, "workspace_id": workspace_id });
        let moved = self.api.send_json(&path, RequestOptions::patch(body)).await?;
        self.invalidate(&[OBJECTIVES_PATTERN])?;
        Ok(moved)
    }

    pub async fn delete_objective(&self, id: &str) -> Result<(), ApiError> {
        let path = format!("/objectives/{}", id);
        self.api.request(&path, RequestOptions::delete()).await?;
        self.invalidate(&[OBJECTIVES_PATTERN, KEY_RESULTS_PATTERN])
    }

    pub async fn delete_key_result(&self, id: &str) -> Result<(), ApiError> {
        let path = format!("/key-results/{}", id);
        self.api.request(&path, RequestOptions::delete()).await?;
        self.invalidate(&[KEY_RESULTS_PATTERN, OBJECTIVES_PATTERN])
    }

    async fn cached_get<T: DeserializeOwned>(&self, path: String) -> Result<T, ApiError> {
        let api = self.api.clone();
        let load_path = path.clone();
        let value = self
            .cache
            .get_or_fetch(&path, self.cache.default_ttl(), move || {
                async move { api.request(&load_path, RequestOptions::get()).await }.boxed()
            })
            .await?;
        serde_json::from_value(value)
            .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", path, e)))
    }

    fn invalidate(&self, patterns: &[&str]) -> Result<(), ApiError> {
        for pattern in patterns {
            let removed = self.cache.invalidate_pattern(pattern)?;
            debug!(pattern = pattern, removed = removed, "Cache invalidated after write");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::transport::Method;
    use crate::auth::CredentialStore;
    use crate::testing::{client, pair, path_of, respond, MockTransport};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio::sync::Notify;

    const OBJECTIVE: &str = r#"{"id": "obj-1", "title": "Grow revenue", "status": "ON_TRACK"}"#;

    async fn setup(transport: Arc<MockTransport>) -> (OkrApi, ResponseCache) {
        let creds = CredentialStore::in_memory();
        creds.set(pair("a1", "r1")).await;
        let (api, _) = client(transport, creds);
        let cache = ResponseCache::new();
        (OkrApi::new(api, cache.clone()), cache)
    }

    #[tokio::test]
    async fn test_repeated_reads_hit_network_once() {
        let transport = MockTransport::new(|_| respond(200, &format!("[{}]", OBJECTIVE)));
        let (okr, _) = setup(transport.clone()).await;

        let first = okr.list_objectives().await.unwrap();
        let second = okr.list_objectives().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0].title, "Grow revenue");
        assert_eq!(transport.calls(Method::Get, "/objectives"), 1);
    }

    #[tokio::test]
    async fn test_delete_invalidates_objective_reads() {
        let transport = MockTransport::new(|req| match (req.method, path_of(req)) {
            (Method::Delete, _) => respond(204, ""),
            (Method::Get, "/objectives") => respond(200, &format!("[{}]", OBJECTIVE)),
            (Method::Get, "/objectives/obj-1") => respond(200, OBJECTIVE),
            _ => respond(404, ""),
        });
        let (okr, cache) = setup(transport.clone()).await;
        cache.set("/key-results/objective/obj-1", json!([]), chrono::Duration::minutes(5));
        cache.set("/workspaces", json!([]), chrono::Duration::minutes(5));

        okr.list_objectives().await.unwrap();
        okr.get_objective("obj-1").await.unwrap();
        okr.delete_objective("obj-1").await.unwrap();

        assert_eq!(cache.keys(), vec!["/workspaces".to_string()]);
        okr.list_objectives().await.unwrap();
        assert_eq!(transport.calls(Method::Get, "/objectives"), 2);
    }

    #[tokio::test]
    async fn test_move_objective_body() {
        let transport = MockTransport::new(|_| respond(200, OBJECTIVE));
        let (okr, _) = setup(transport.clone()).await;

        okr.move_objective("obj-1", Some("team-7"), None).await.unwrap();
        let sent = &transport.requests()[0];
        assert_eq!(sent.method, Method::Patch);
        assert_eq!(path_of(sent), "/objectives/obj-1/move");
        assert_eq!(sent.body, Some(json!({"team_id": "team-7", "workspace_id": null})));
    }

    #[tokio::test]
    async fn test_failed_write_keeps_cache() {
        let transport = MockTransport::new(|req| match req.method {
            Method::Post => respond(404, r#"{"message": "Key result not found"}"#),
            _ => respond(200, "[]"),
        });
        let (okr, cache) = setup(transport).await;
        okr.list_key_results("obj-1").await.unwrap();

        let err = okr.duplicate_key_result("kr-404").await.unwrap_err();
        assert_eq!(err.to_string(), "Key result not found");
        assert!(cache.contains("/key-results/objective/obj-1"));
    }

    #[tokio::test]
    async fn test_duplicate_objective_returns_copy() {
        let transport = MockTransport::new(|_| {
            respond(200, r#"{"id": "obj-2", "title": "Grow revenue (copy)"}"#)
        });
        let (okr, cache) = setup(transport.clone()).await;
        cache.set("/objectives", json!([]), chrono::Duration::minutes(5));

        let copy = okr.duplicate_objective("obj-1").await.unwrap();
        assert_eq!(copy.id, "obj-2");
        assert!(cache.is_empty());
        assert_eq!(transport.calls(Method::Post, "/objectives/obj-1/duplicate"), 1);
    }

    #[tokio::test]
    async fn test_read_after_delete_does_not_join_earlier_load() {
        let deleted = Arc::new(AtomicBool::new(false));
        let transport = {
            let deleted = deleted.clone();
            MockTransport::new(move |req| match req.method {
                Method::Delete => {
                    deleted.store(true, Ordering::SeqCst);
                    respond(204, "")
                }
                _ if deleted.load(Ordering::SeqCst) => respond(200, "[]"),
                _ => respond(200, &format!("[{}]", OBJECTIVE)),
            })
        };
        let gate = Arc::new(Notify::new());
        transport.gate(Method::Get, "/objectives", gate.clone());
        let (okr, cache) = setup(transport.clone()).await;

        let delete_then_read = async {
            tokio::task::yield_now().await;
            okr.delete_objective("obj-1").await.unwrap();
            let fresh = okr.list_objectives().await.unwrap();
            gate.notify_one();
            fresh
        };
        let (earlier, fresh) = tokio::join!(okr.list_objectives(), delete_then_read);

        assert!(earlier.is_ok());
        assert!(fresh.is_empty());
        assert_eq!(transport.calls(Method::Get, "/objectives"), 2);
        assert_eq!(cache.get("/objectives"), Some(json!([])));
    }
}
