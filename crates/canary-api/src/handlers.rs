//! REST API handlers.
//!
//! Each handler reads/writes via `StateStore` and returns JSON responses.
//! Store errors map onto HTTP statuses: not found → 404, revision
//! conflicts and duplicates → 409, rejected objects → 400.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{info, warn};

use canary_core::{DesiredState, DesiredStateEvent, LabelSelector, ObjectMeta, Workload, object_key};
use canary_state::StateError;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
        .into_response()
}

fn state_error(e: &StateError) -> Response {
    let status = match e {
        StateError::NotFound(_) => StatusCode::NOT_FOUND,
        StateError::Invalid(_) => StatusCode::BAD_REQUEST,
        e if e.is_conflict() => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(&e.to_string(), status)
}

/// Optional `?namespace=` filter for list endpoints.
#[derive(Debug, Default, serde::Deserialize)]
pub struct ListQuery {
    pub namespace: Option<String>,
}

/// Pin an object's identity to the path it was sent to. A body naming a
/// different object is rejected.
fn bind_path(meta: &mut ObjectMeta, namespace: &str, name: &str) -> Result<(), Response> {
    for (field, value, expected) in [
        ("namespace", &mut meta.namespace, namespace),
        ("name", &mut meta.name, name),
    ] {
        if value.is_empty() {
            *value = expected.to_string();
        } else if value.as_str() != expected {
            return Err(error_response(
                &format!("body {field} {value:?} does not match path {expected:?}"),
                StatusCode::BAD_REQUEST,
            ));
        }
    }
    Ok(())
}

// ── Workloads ──────────────────────────────────────────────────

/// GET /api/v1/workloads
pub async fn list_workloads(
    State(state): State<ApiState>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    match state.store.list_workloads(query.namespace.as_deref()) {
        Ok(workloads) => ApiResponse::ok(workloads).into_response(),
        Err(e) => state_error(&e),
    }
}

/// GET /api/v1/workloads/{namespace}/{name}
pub async fn get_workload(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.store.get_workload(&object_key(&namespace, &name)) {
        Ok(Some(workload)) => ApiResponse::ok(workload).into_response(),
        Ok(None) => error_response("workload not found", StatusCode::NOT_FOUND),
        Err(e) => state_error(&e),
    }
}

/// POST /api/v1/workloads
pub async fn create_workload(
    State(state): State<ApiState>,
    Json(workload): Json<Workload>,
) -> impl IntoResponse {
    match state.store.create_workload(&workload) {
        Ok(created) => (StatusCode::CREATED, ApiResponse::ok(created)).into_response(),
        Err(e) => state_error(&e),
    }
}

/// PUT /api/v1/workloads/{namespace}/{name}
///
/// The body must carry the `resourceVersion` it was read at.
pub async fn update_workload(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
    Json(mut workload): Json<Workload>,
) -> impl IntoResponse {
    if let Err(resp) = bind_path(&mut workload.metadata, &namespace, &name) {
        return resp;
    }
    match state.store.update_workload(&workload) {
        Ok(updated) => ApiResponse::ok(updated).into_response(),
        Err(e) => state_error(&e),
    }
}

/// DELETE /api/v1/workloads/{namespace}/{name}
pub async fn delete_workload(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.store.delete_workload(&object_key(&namespace, &name)) {
        Ok(Some(_)) => ApiResponse::ok("deleted").into_response(),
        Ok(None) => error_response("workload not found", StatusCode::NOT_FOUND),
        Err(e) => state_error(&e),
    }
}

// ── Canary deploys ─────────────────────────────────────────────

/// Reject desired states the controller could never act on.
fn validate_desired(desired: &DesiredState) -> Result<(), Response> {
    if desired.spec.image.trim().is_empty() {
        return Err(error_response("image must not be empty", StatusCode::BAD_REQUEST));
    }
    if let Err(e) = LabelSelector::parse(&desired.spec.label_selectors) {
        return Err(error_response(
            &format!("invalid labelSelectors: {e}"),
            StatusCode::BAD_REQUEST,
        ));
    }
    Ok(())
}

/// Hand an event to the controller. The write already happened, so a
/// stopped controller is logged, not reported to the client.
async fn publish(state: &ApiState, event: DesiredStateEvent) {
    let key = event.object().key();
    let kind = event.kind();
    if let Err(e) = state.feed.publish(event).await {
        warn!(desired = %key, kind, error = %e, "change not delivered to controller");
    }
}

/// GET /api/v1/canarydeploys
pub async fn list_canary_deploys(
    State(state): State<ApiState>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    match state.store.list_desired_states_in(query.namespace.as_deref()) {
        Ok(all) => ApiResponse::ok(all).into_response(),
        Err(e) => state_error(&e),
    }
}

/// GET /api/v1/canarydeploys/{namespace}/{name}
pub async fn get_canary_deploy(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.store.get_desired_state(&object_key(&namespace, &name)) {
        Ok(Some(desired)) => ApiResponse::ok(desired).into_response(),
        Ok(None) => error_response("canary deploy not found", StatusCode::NOT_FOUND),
        Err(e) => state_error(&e),
    }
}

/// POST /api/v1/canarydeploys
pub async fn create_canary_deploy(
    State(state): State<ApiState>,
    Json(desired): Json<DesiredState>,
) -> impl IntoResponse {
    if let Err(resp) = validate_desired(&desired) {
        return resp;
    }
    match state.store.create_desired_state(&desired) {
        Ok(created) => {
            info!(desired = %created.key(), image = %created.spec.image, "canary deploy created");
            publish(&state, DesiredStateEvent::Added(created.clone())).await;
            (StatusCode::CREATED, ApiResponse::ok(created)).into_response()
        }
        Err(e) => state_error(&e),
    }
}

/// PUT /api/v1/canarydeploys/{namespace}/{name}
pub async fn update_canary_deploy(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
    Json(mut desired): Json<DesiredState>,
) -> impl IntoResponse {
    if let Err(resp) = bind_path(&mut desired.metadata, &namespace, &name) {
        return resp;
    }
    if let Err(resp) = validate_desired(&desired) {
        return resp;
    }
    let old = match state.store.get_desired_state(&desired.key()) {
        Ok(Some(old)) => old,
        Ok(None) => return error_response("canary deploy not found", StatusCode::NOT_FOUND),
        Err(e) => return state_error(&e),
    };
    match state.store.update_desired_state(&desired) {
        Ok(updated) => {
            info!(desired = %updated.key(), image = %updated.spec.image, "canary deploy updated");
            publish(
                &state,
                DesiredStateEvent::Updated {
                    old,
                    new: updated.clone(),
                },
            )
            .await;
            ApiResponse::ok(updated).into_response()
        }
        Err(e) => state_error(&e),
    }
}

/// DELETE /api/v1/canarydeploys/{namespace}/{name}
pub async fn delete_canary_deploy(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.store.delete_desired_state(&object_key(&namespace, &name)) {
        Ok(Some(deleted)) => {
            info!(desired = %deleted.key(), "canary deploy deleted");
            publish(&state, DesiredStateEvent::Deleted(deleted)).await;
            ApiResponse::ok("deleted").into_response()
        }
        Ok(None) => error_response("canary deploy not found", StatusCode::NOT_FOUND),
        Err(e) => state_error(&e),
    }
}

/// POST /api/v1/canarydeploys/resync
pub async fn resync_canary_deploys(State(state): State<ApiState>) -> impl IntoResponse {
    match state.feed.resync(&state.store).await {
        Ok(published) => ApiResponse::ok(serde_json::json!({ "published": published })).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::SERVICE_UNAVAILABLE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canary_rollout::FeedReceiver;
    use canary_rollout::feed;
    use canary_state::StateStore;

    fn test_state() -> (ApiState, FeedReceiver) {
        let store = StateStore::open_in_memory().unwrap();
        let (feed, rx) = feed::channel(16);
        (ApiState { store, feed }, rx)
    }

    fn web() -> Workload {
        Workload::new("default", "web", "web:v1", 4).with_label("app", "web")
    }

    fn rollout() -> DesiredState {
        DesiredState::new("default", "web-rollout", "app=web", "web:v2")
    }

    fn path(ns: &str, name: &str) -> Path<(String, String)> {
        Path((ns.to_string(), name.to_string()))
    }

    #[tokio::test]
    async fn list_workloads_empty() {
        let (state, _rx) = test_state();
        let resp = list_workloads(State(state), Query(ListQuery::default()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn create_and_get_workload() {
        let (state, _rx) = test_state();
        let resp = create_workload(State(state.clone()), Json(web()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let resp = get_workload(State(state), path("default", "web"))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn duplicate_workload_conflicts() {
        let (state, _rx) = test_state();
        create_workload(State(state.clone()), Json(web())).await;
        let resp = create_workload(State(state), Json(web()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn stale_workload_update_conflicts() {
        let (state, _rx) = test_state();
        let stored = state.store.create_workload(&web()).unwrap();

        let mut fresh = stored.clone();
        fresh.spec.replicas = 5;
        let resp = update_workload(State(state.clone()), path("default", "web"), Json(fresh))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        // Still carries revision 1.
        let resp = update_workload(State(state), path("default", "web"), Json(stored))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn update_path_mismatch_is_rejected() {
        let (state, _rx) = test_state();
        state.store.create_workload(&web()).unwrap();
        let resp = update_workload(State(state), path("default", "api"), Json(web()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn get_and_delete_missing_workload() {
        let (state, _rx) = test_state();
        let resp = get_workload(State(state.clone()), path("default", "nope"))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let resp = delete_workload(State(state), path("default", "nope"))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn canary_deploy_lifecycle_publishes_events() {
        let (state, mut rx) = test_state();

        let resp = create_canary_deploy(State(state.clone()), Json(rollout()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert!(matches!(rx.recv().await, Some(DesiredStateEvent::Added(_))));

        let mut v3 = state
            .store
            .get_desired_state("default/web-rollout")
            .unwrap()
            .unwrap();
        v3.spec.image = "web:v3".to_string();
        let resp = update_canary_deploy(
            State(state.clone()),
            path("default", "web-rollout"),
            Json(v3),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        match rx.recv().await {
            Some(DesiredStateEvent::Updated { old, new }) => {
                assert_eq!(old.spec.image, "web:v2");
                assert_eq!(new.spec.image, "web:v3");
            }
            other => panic!("expected update event, got {other:?}"),
        }

        let resp = delete_canary_deploy(State(state), path("default", "web-rollout"))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(matches!(rx.recv().await, Some(DesiredStateEvent::Deleted(_))));
    }

    #[tokio::test]
    async fn invalid_selector_is_rejected_without_event() {
        let (state, mut rx) = test_state();
        let bad = DesiredState::new("default", "r", "app=web,,", "web:v2");
        let resp = create_canary_deploy(State(state.clone()), Json(bad))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(state.store.list_desired_states_in(None).unwrap().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn resync_republishes_stored_deploys() {
        let (state, mut rx) = test_state();
        state.store.create_desired_state(&rollout()).unwrap();

        let resp = resync_canary_deploys(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(matches!(rx.recv().await, Some(DesiredStateEvent::Added(d)) if d.key() == "default/web-rollout"));
    }
}
