//! Hardware arbitration handlers

use axum::{extract::State, http::StatusCode, response::Json};
use shared::logging::Component;
use shared::{
    component_warn, AcquireResponse, ForceReleaseRequest, ForceReleaseResponse, HardwareRequest, ReleaseResponse,
    ResourceLock,
};
use supervisor::core::{Acquisition, Release};
use supervisor::{HostProbe, ProcessControl};

use crate::error::{WebServerError, WebServerResult};
use crate::state::AppState;

fn validate_tool(request: &HardwareRequest) -> WebServerResult<()> {
    if request.tool.trim().is_empty() {
        return Err(WebServerError::InvalidRequest {
            details: "tool must not be empty".to_string(),
        });
    }
    Ok(())
}

/// Lock table - /api/hardware/status
pub async fn hardware_status<P, H>(State(state): State<AppState<P, H>>) -> Json<Vec<ResourceLock>>
where
    P: ProcessControl + 'static,
    H: HostProbe + 'static,
{
    Json(state.arbiter.status())
}

/// Acquire a device - /api/hardware/acquire
///
/// A denied request answers 409 with the current owner.
pub async fn acquire_hardware<P, H>(
    State(state): State<AppState<P, H>>,
    Json(request): Json<HardwareRequest>,
) -> WebServerResult<(StatusCode, Json<AcquireResponse>)>
where
    P: ProcessControl + 'static,
    H: HostProbe + 'static,
{
    validate_tool(&request)?;
    let reply = match state.arbiter.acquire(&request.tool, request.device) {
        Acquisition::Granted => (
            StatusCode::OK,
            Json(AcquireResponse {
                success: true,
                owner: None,
            }),
        ),
        Acquisition::Denied { owner } => (
            StatusCode::CONFLICT,
            Json(AcquireResponse {
                success: false,
                owner: Some(owner),
            }),
        ),
    };
    Ok(reply)
}

/// Release a device - /api/hardware/release
pub async fn release_hardware<P, H>(
    State(state): State<AppState<P, H>>,
    Json(request): Json<HardwareRequest>,
) -> WebServerResult<Json<ReleaseResponse>>
where
    P: ProcessControl + 'static,
    H: HostProbe + 'static,
{
    validate_tool(&request)?;
    let reply = match state.arbiter.release(&request.tool, request.device) {
        Release::Released => ReleaseResponse {
            success: true,
            message: None,
        },
        Release::NotOwner { owner: Some(owner) } => ReleaseResponse {
            success: false,
            message: Some(format!("{} is held by {}", request.device, owner)),
        },
        Release::NotOwner { owner: None } => ReleaseResponse {
            success: false,
            message: Some(format!("{} is not held", request.device)),
        },
    };
    Ok(Json(reply))
}

/// Take a device back from whoever holds it - /api/hardware/force-release
///
/// When the sweep itself holds the HackRF, supervision is emergency stopped
/// first so no process keeps using the radio.
pub async fn force_release_hardware<P, H>(
    State(state): State<AppState<P, H>>,
    Json(request): Json<ForceReleaseRequest>,
) -> WebServerResult<Json<ForceReleaseResponse>>
where
    P: ProcessControl + 'static,
    H: HostProbe + 'static,
{
    let previous_owner = state.supervisor.force_release(request.device).await?;
    if let Some(owner) = &previous_owner {
        component_warn!(Component::WebServer, "🔓 Forced release of {} from {}", request.device, owner);
    }
    Ok(Json(ForceReleaseResponse {
        success: true,
        previous_owner,
    }))
}
