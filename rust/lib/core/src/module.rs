use axum::Router;

/// A mountable piece of the service.
///
/// The daemon mounts every module's router under `/{name}` next to the
/// built-in `/health` and `/version` endpoints.
pub trait Module: Send + Sync {
    /// Path prefix and log label.
    fn name(&self) -> &str;

    fn routes(&self) -> Router;
}
