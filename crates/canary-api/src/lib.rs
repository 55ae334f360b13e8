//! canary-api — REST API for canaryd.
//!
//! Workloads are plain CRUD over the object store. Canary deploy writes
//! also publish a [`DesiredStateEvent`](canary_core::DesiredStateEvent) on
//! the change feed so the controller reconciles them.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/workloads` | List workloads (`?namespace=`) |
//! | POST | `/api/v1/workloads` | Create a workload |
//! | GET | `/api/v1/workloads/{namespace}/{name}` | Get a workload |
//! | PUT | `/api/v1/workloads/{namespace}/{name}` | Update a workload |
//! | DELETE | `/api/v1/workloads/{namespace}/{name}` | Delete a workload |
//! | GET | `/api/v1/canarydeploys` | List canary deploys (`?namespace=`) |
//! | POST | `/api/v1/canarydeploys` | Create a canary deploy |
//! | POST | `/api/v1/canarydeploys/resync` | Re-publish every canary deploy |
//! | GET | `/api/v1/canarydeploys/{namespace}/{name}` | Get a canary deploy |
//! | PUT | `/api/v1/canarydeploys/{namespace}/{name}` | Update a canary deploy |
//! | DELETE | `/api/v1/canarydeploys/{namespace}/{name}` | Delete a canary deploy |

pub mod handlers;

use axum::Router;
use axum::routing::{get, post};
use canary_rollout::ChangeFeed;
use canary_state::StateStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: StateStore,
    pub feed: ChangeFeed,
}

/// Build the complete API router.
pub fn build_router(store: StateStore, feed: ChangeFeed) -> Router {
    let state = ApiState { store, feed };

    let api_routes = Router::new()
        .route(
            "/workloads",
            get(handlers::list_workloads).post(handlers::create_workload),
        )
        .route(
            "/workloads/{namespace}/{name}",
            get(handlers::get_workload)
                .put(handlers::update_workload)
                .delete(handlers::delete_workload),
        )
        .route(
            "/canarydeploys",
            get(handlers::list_canary_deploys).post(handlers::create_canary_deploy),
        )
        .route("/canarydeploys/resync", post(handlers::resync_canary_deploys))
        .route(
            "/canarydeploys/{namespace}/{name}",
            get(handlers::get_canary_deploy)
                .put(handlers::update_canary_deploy)
                .delete(handlers::delete_canary_deploy),
        )
        .with_state(state);

    Router::new().nest("/api/v1", api_routes)
}
