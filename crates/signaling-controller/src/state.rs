//! Shared application state handed to the WebSocket and HTTP handlers.
//!
//! All components are constructed once at process start and shared by
//! reference; there is no global mutable state.

use crate::auth::TokenVerifier;
use crate::lifecycle::RoomLifecycleManager;
use crate::observability::CoreStats;
use crate::registry::ConnectionRegistry;
use crate::router::SignalingRouter;
use crate::store::RoomStore;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RoomStore>,
    pub registry: Arc<ConnectionRegistry>,
    pub router: Arc<SignalingRouter>,
    pub lifecycle: Arc<RoomLifecycleManager>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub stats: Arc<CoreStats>,
    /// Idle-connection timeout applied by the supervisors.
    pub idle_timeout: Duration,
    /// Roles allowed on the administrative surface.
    pub admin_roles: Arc<Vec<String>>,
    /// Root token whose children cover every live connection.
    pub shutdown: CancellationToken,
}
