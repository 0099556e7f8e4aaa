//! API handlers for the notifier and monitor endpoints

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use tracing::{error, info};

use crate::error::Error;
use crate::models::{
    MonitorResult, MonitorSpec, Notification, NotificationKind, NotificationTriggerResult,
    TriggerSpec,
};
use crate::monitor::{History, MonitorService};
use crate::notification::NotificationHub;

/// Header carrying the api key in older clients
const LEGACY_KEY_HEADER: &str = "ApiKey";

/// Header overriding the notification text
const TEXT_HEADER: &str = "Text";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Notification registration and triggering
    pub hub: Arc<NotificationHub>,
    /// Monitor management, absent on notifier-only deployments
    pub monitors: Option<Arc<MonitorService>>,
}

type ApiError = (StatusCode, String);

fn api_error(err: &Error) -> ApiError {
    let status = match err {
        Error::NotFound { .. } | Error::Auth(_) => StatusCode::NOT_FOUND,
        Error::UnsupportedType(_) => StatusCode::BAD_GATEWAY,
        Error::Validation(_) | Error::Encoding(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

fn monitors(state: &AppState) -> Result<&MonitorService, ApiError> {
    state.monitors.as_deref().ok_or((
        StatusCode::SERVICE_UNAVAILABLE,
        "Monitoring not enabled".to_string(),
    ))
}

/// Health check endpoint
pub async fn health() -> &'static str {
    "I'm fine"
}

/// Query parameters for notification registration
#[derive(Debug, Deserialize)]
pub struct RegisterQuery {
    /// `email`, `webhook` or `slack`
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// Register or update a notification, returning its api key
pub async fn register_notification(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<RegisterQuery>,
    body: Bytes,
) -> Result<String, ApiError> {
    let kind: NotificationKind = query
        .kind
        .unwrap_or_default()
        .parse()
        .map_err(|e: Error| api_error(&e))?;

    let notification = Notification::from_payload(kind, &body).map_err(|e| api_error(&e))?;

    state.hub.register(&id, &notification).await.map_err(|e| {
        error!(id = %id, error = %e, "Failed to register notification");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })
}

/// Enqueue the notification addressed by the request's virtual host
pub async fn trigger_notification(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<String, ApiError> {
    let host = header_str(&headers, header::HOST.as_str()).unwrap_or_default();
    let id = id_from_host(host);
    if id.is_empty() {
        return Err((StatusCode::NOT_FOUND, "No notification id in host".to_string()));
    }

    let api_key = header_str(&headers, header::AUTHORIZATION.as_str())
        .or_else(|| header_str(&headers, LEGACY_KEY_HEADER));
    let text = header_str(&headers, TEXT_HEADER);

    match state.hub.trigger(id, api_key, text).await {
        Ok(()) => Ok(format!("Notification: {id} reserved.\n")),
        Err(
            e @ (Error::NotFound { .. }
            | Error::Auth(_)
            | Error::Encoding(_)
            | Error::UnsupportedType(_)),
        ) => Err((StatusCode::NOT_FOUND, e.to_string())),
        Err(e) => {
            error!(id = %id, error = %e, "Failed to enqueue notification");
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// First DNS label of a `Host` value, port ignored
pub fn id_from_host(host: &str) -> &str {
    let host = host.split(':').next().unwrap_or_default();
    host.split('.').next().unwrap_or_default()
}

/// Monitor definition body
#[derive(Debug, Deserialize)]
pub struct MonitorRequest {
    /// Resource URL
    pub url: String,
    /// Request body
    #[serde(default)]
    pub body: String,
    /// Poll interval in seconds
    pub interval: u64,
}

/// List watched monitors
pub async fn list_monitors(State(state): State<AppState>) -> Result<Json<Vec<MonitorSpec>>, ApiError> {
    Ok(Json(monitors(&state)?.monitors()))
}

/// Create or replace a monitor
pub async fn put_monitor(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<MonitorRequest>,
) -> Result<Json<MonitorSpec>, ApiError> {
    let spec = MonitorSpec::new(name, req.url, req.interval).with_body(req.body);
    monitors(&state)?
        .watch(spec.clone())
        .map_err(|e| api_error(&e))?;
    Ok(Json(spec))
}

/// Stop watching a monitor
pub async fn delete_monitor(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    if monitors(&state)?.unwatch(&name) {
        info!(monitor = %name, "Monitor deleted");
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Recent fetch results of a monitor
pub async fn monitor_history(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<History<MonitorResult>>, ApiError> {
    let history = monitors(&state)?
        .monitor_history(&name)
        .await
        .map_err(|e| api_error(&e))?;
    Ok(Json(history))
}

/// Trigger definition body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRequest {
    /// Registry id of the notification to deliver
    pub notification: String,
    /// Dot-separated path into the fetched JSON
    pub field_path: String,
    /// Comparison operator
    pub op: String,
    /// Right-hand side of the comparison
    pub operand: String,
}

/// Subscribe a trigger to a monitor
pub async fn put_trigger(
    State(state): State<AppState>,
    Path((name, trigger)): Path<(String, String)>,
    Json(req): Json<TriggerRequest>,
) -> Result<Json<TriggerSpec>, ApiError> {
    let spec = TriggerSpec {
        name: trigger,
        notification: req.notification,
        field_path: req.field_path,
        op: req.op,
        operand: req.operand,
    };
    monitors(&state)?
        .subscribe(&name, spec.clone())
        .map_err(|e| api_error(&e))?;
    Ok(Json(spec))
}

/// Remove a trigger from a monitor
pub async fn delete_trigger(
    State(state): State<AppState>,
    Path((name, trigger)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    monitors(&state)?.unsubscribe(&name, &trigger);
    Ok(StatusCode::NO_CONTENT)
}

/// Recent evaluations of a trigger
pub async fn trigger_history(
    State(state): State<AppState>,
    Path((name, trigger)): Path<(String, String)>,
) -> Result<Json<History<NotificationTriggerResult>>, ApiError> {
    let history = monitors(&state)?
        .trigger_history(&name, &trigger)
        .await
        .map_err(|e| api_error(&e))?;
    Ok(Json(history))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_from_host() {
        assert_eq!(id_from_host("alert1.notifier.local"), "alert1");
        assert_eq!(id_from_host("alert1.notifier.local:8080"), "alert1");
        assert_eq!(id_from_host("alert1:8080"), "alert1");
        assert_eq!(id_from_host(""), "");
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(api_error(&Error::unsupported_type("sms")).0, StatusCode::BAD_GATEWAY);
        assert_eq!(api_error(&Error::encoding("bad")).0, StatusCode::BAD_REQUEST);
        assert_eq!(api_error(&Error::not_found("notification", "x")).0, StatusCode::NOT_FOUND);
        assert_eq!(api_error(&Error::internal("boom")).0, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
