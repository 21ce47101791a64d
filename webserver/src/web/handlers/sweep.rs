//! Sweep control handlers
//!
//! Thin adapters from JSON bodies onto the supervisor. Every error maps onto a
//! status code through `WebServerError`.

use axum::{extract::State, response::Json};
use serde_json::{json, Value};
use shared::logging::Component;
use shared::{component_info, FrequencyRange, StartSweepRequest};
use std::time::Duration;
use supervisor::core::MAX_CYCLE_TIME;
use supervisor::{HostProbe, ProcessControl};

use crate::error::{WebServerError, WebServerResult};
use crate::state::AppState;

/// Start sweep - /api/sweep/start
pub async fn start_sweep<P, H>(
    State(state): State<AppState<P, H>>,
    Json(request): Json<StartSweepRequest>,
) -> WebServerResult<Json<Value>>
where
    P: ProcessControl + 'static,
    H: HostProbe + 'static,
{
    let ranges = request
        .frequencies
        .iter()
        .map(|f| f.to_range())
        .collect::<Result<Vec<FrequencyRange>, _>>()?;

    let cycle_time = match request.cycle_time_ms {
        Some(0) => {
            return Err(WebServerError::InvalidRequest {
                details: "cycleTimeMs must be positive".to_string(),
            });
        }
        Some(ms) if Duration::from_millis(ms) > MAX_CYCLE_TIME => {
            return Err(WebServerError::InvalidRequest {
                details: format!("cycleTimeMs must be at most {}", MAX_CYCLE_TIME.as_millis()),
            });
        }
        other => other.map(Duration::from_millis),
    };

    let status = state.supervisor.start(ranges, cycle_time).await?;
    let cycle_config = state.supervisor.cycle_config();
    component_info!(
        Component::WebServer,
        "▶️ Sweep started over {} range(s)",
        cycle_config.frequencies.len()
    );

    Ok(Json(json!({
        "success": true,
        "message": format!("Sweep started over {} range(s)", cycle_config.frequencies.len()),
        "status": status,
        "cycleConfig": cycle_config,
    })))
}

/// Stop sweep - /api/sweep/stop
pub async fn stop_sweep<P, H>(State(state): State<AppState<P, H>>) -> WebServerResult<Json<Value>>
where
    P: ProcessControl + 'static,
    H: HostProbe + 'static,
{
    let status = state.supervisor.stop().await?;
    Ok(Json(json!({
        "success": true,
        "message": "Sweep stopped",
        "status": status,
    })))
}

/// Emergency stop - /api/sweep/emergency-stop
pub async fn emergency_stop<P, H>(State(state): State<AppState<P, H>>) -> WebServerResult<Json<Value>>
where
    P: ProcessControl + 'static,
    H: HostProbe + 'static,
{
    let status = state.supervisor.emergency_stop().await?;
    Ok(Json(json!({
        "success": true,
        "message": "Emergency stop complete",
        "status": status,
    })))
}

/// Current snapshot - /api/sweep/status
pub async fn sweep_status<P, H>(State(state): State<AppState<P, H>>) -> Json<Value>
where
    P: ProcessControl + 'static,
    H: HostProbe + 'static,
{
    Json(json!({
        "status": state.supervisor.status(),
        "cycleConfig": state.supervisor.cycle_config(),
        "connections": state.broadcaster.connection_count(),
    }))
}

/// Liveness - /health
pub async fn health_check<P, H>(State(state): State<AppState<P, H>>) -> Json<Value>
where
    P: ProcessControl + 'static,
    H: HostProbe + 'static,
{
    Json(json!({
        "status": "healthy",
        "service": "webserver",
        "version": env!("CARGO_PKG_VERSION"),
        "uptimeSeconds": state.uptime_seconds(),
        "connections": state.broadcaster.connection_count(),
        "sweepActive": state.supervisor.is_active(),
    }))
}
