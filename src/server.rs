// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The JSON admin surface.
//!
//! A small HTTP API for front ends: inspect the active instruments,
//! switch banks, change presets and volumes, panic, and request a
//! configuration reload. Everything it can do, a MIDI binding can do
//! too; this is the remote control, not the instrument.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::Sender;
use tracing::{info, warn};

use crate::engine::Preset;
use crate::router::{BankSummary, InstrumentStatus, Router, RouterError};

#[derive(Clone)]
struct AppState {
    router: Arc<Router>,
    reload: Sender<()>,
}

/// A router error mapped onto an HTTP response.
#[derive(Debug)]
struct ApiError(RouterError);

impl From<RouterError> for ApiError {
    fn from(err: RouterError) -> ApiError {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            RouterError::BankNotFound(_)
            | RouterError::UnknownInstrument(_)
            | RouterError::ResourceNotFound(_) => StatusCode::NOT_FOUND,
            RouterError::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({
            "ok": false,
            "error": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct Status {
    active_bank: Option<String>,
    instruments: Vec<InstrumentStatus>,
}

#[derive(Deserialize)]
struct SwitchBankRequest {
    bank: String,
}

#[derive(Deserialize)]
struct SetPresetRequest {
    instrument: String,
    preset: u8,
}

#[derive(Deserialize)]
struct SetVolumeRequest {
    name: String,
    value: u8,
}

#[derive(Serialize)]
struct Ack {
    ok: bool,
}

const ACK: Ack = Ack { ok: true };

async fn status(State(state): State<AppState>) -> Json<Status> {
    Json(Status {
        active_bank: state.router.active_bank(),
        instruments: state.router.statuses(),
    })
}

async fn banks(State(state): State<AppState>) -> Json<Vec<BankSummary>> {
    Json(state.router.list_banks())
}

async fn switch_bank(
    State(state): State<AppState>,
    Json(request): Json<SwitchBankRequest>,
) -> Result<Json<Status>, ApiError> {
    state.router.switch_bank(&request.bank)?;
    Ok(Json(Status {
        active_bank: state.router.active_bank(),
        instruments: state.router.statuses(),
    }))
}

async fn panic(State(state): State<AppState>) -> Json<Ack> {
    state.router.panic();
    Json(ACK)
}

async fn presets(
    State(state): State<AppState>,
    Path(instrument): Path<String>,
) -> Result<Json<Vec<Preset>>, ApiError> {
    Ok(Json(state.router.presets_for_instrument(&instrument)?))
}

#[derive(Serialize)]
struct SetPresetResponse {
    ok: bool,
    preset_name: String,
}

async fn set_preset(
    State(state): State<AppState>,
    Json(request): Json<SetPresetRequest>,
) -> Result<Json<SetPresetResponse>, ApiError> {
    let preset_name = state
        .router
        .set_preset(&request.instrument, request.preset)?;
    Ok(Json(SetPresetResponse {
        ok: true,
        preset_name,
    }))
}

#[derive(Serialize)]
struct SetVolumeResponse {
    ok: bool,
    volume: u8,
}

async fn set_volume(
    State(state): State<AppState>,
    Json(request): Json<SetVolumeRequest>,
) -> Result<Json<SetVolumeResponse>, ApiError> {
    let volume = state
        .router
        .set_instrument_volume(&request.name, request.value)?;
    Ok(Json(SetVolumeResponse { ok: true, volume }))
}

async fn reload(State(state): State<AppState>) -> Json<Ack> {
    if let Err(e) = state.reload.try_send(()) {
        // A reload is already queued; this request rides along.
        warn!(err = e.to_string(), "Reload already pending.");
    }
    Json(ACK)
}

fn app(router: Arc<Router>, reload_requests: Sender<()>) -> axum::Router {
    axum::Router::new()
        .route("/status", get(status))
        .route("/banks", get(banks))
        .route("/switch_bank", post(switch_bank))
        .route("/panic", post(panic))
        .route("/presets/:instrument", get(presets))
        .route("/set_preset", post(set_preset))
        .route("/set_volume", post(set_volume))
        .route("/reload", post(reload))
        .with_state(AppState {
            router,
            reload: reload_requests,
        })
}

/// Serves the admin API on the given address until the process exits.
pub async fn serve(
    bind: SocketAddr,
    router: Arc<Router>,
    reload_requests: Sender<()>,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(bind = %bind, "Admin API listening.");
    axum::serve(listener, app(router, reload_requests)).await
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::sync::Arc;

    use axum::extract::{Path, State};
    use axum::Json;
    use tokio::sync::mpsc;

    use crate::config::{Bank, Config, Instrument};
    use crate::engine::mock::Engine as MockEngine;
    use crate::engine::Preset;
    use crate::router::Router;

    use super::AppState;

    fn state(dir: &std::path::Path) -> (AppState, mpsc::Receiver<()>) {
        fs::write(dir.join("piano.sf2"), b"sf2").expect("write failed");
        let file = dir.join("piano.sf2");

        let engine = MockEngine::get();
        engine.set_presets(
            &file.canonicalize().unwrap(),
            vec![Preset {
                bank: 0,
                preset: 3,
                name: "Honky Tonk".to_string(),
            }],
        );

        let file = file.to_str().unwrap();
        let config = Config::new_for_test(
            Some("main"),
            vec![
                Bank::new_for_test(
                    "main",
                    vec![Instrument::new_for_test(
                        "piano", file, 0, 0, 0, 100, None, false, (0, 127),
                    )],
                ),
                Bank::new_for_test(
                    "alt",
                    vec![Instrument::new_for_test(
                        "organ", file, 0, 0, 1, 90, None, true, (0, 127),
                    )],
                ),
            ],
            vec![],
        );

        let router = Arc::new(Router::new(Arc::new(engine), &config));
        router.preload_all();
        router.activate_current();

        let (reload_tx, reload_rx) = mpsc::channel(1);
        (
            AppState {
                router,
                reload: reload_tx,
            },
            reload_rx,
        )
    }

    #[tokio::test]
    async fn test_status_and_banks() {
        let dir = tempfile::tempdir().expect("unable to create temp dir");
        let (state, _reload) = state(dir.path());

        let Json(status) = super::status(State(state.clone())).await;
        assert_eq!(Some("main".to_string()), status.active_bank);
        assert_eq!(1, status.instruments.len());
        assert_eq!("piano", status.instruments[0].name);

        let Json(banks) = super::banks(State(state)).await;
        assert_eq!(2, banks.len());
        assert!(banks[0].active);
    }

    #[tokio::test]
    async fn test_switch_bank() {
        let dir = tempfile::tempdir().expect("unable to create temp dir");
        let (state, _reload) = state(dir.path());

        let Json(status) = super::switch_bank(
            State(state.clone()),
            Json(super::SwitchBankRequest {
                bank: "alt".to_string(),
            }),
        )
        .await
        .expect("switch failed");
        assert_eq!(Some("alt".to_string()), status.active_bank);
        assert_eq!("organ", status.instruments[0].name);

        // An unknown bank maps to a not-found error.
        let result = super::switch_bank(
            State(state),
            Json(super::SwitchBankRequest {
                bank: "ska".to_string(),
            }),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_presets_and_set_preset() {
        let dir = tempfile::tempdir().expect("unable to create temp dir");
        let (state, _reload) = state(dir.path());

        let Json(presets) = super::presets(State(state.clone()), Path("piano".to_string()))
            .await
            .expect("presets failed");
        assert_eq!(1, presets.len());
        assert_eq!("Honky Tonk", presets[0].name);

        let Json(response) = super::set_preset(
            State(state.clone()),
            Json(super::SetPresetRequest {
                instrument: "piano".to_string(),
                preset: 3,
            }),
        )
        .await
        .expect("set_preset failed");
        assert_eq!("Honky Tonk", response.preset_name);

        assert!(
            super::presets(State(state), Path("theremin".to_string()))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_set_volume_and_reload() {
        let dir = tempfile::tempdir().expect("unable to create temp dir");
        let (state, mut reload) = state(dir.path());

        let Json(response) = super::set_volume(
            State(state.clone()),
            Json(super::SetVolumeRequest {
                name: "piano".to_string(),
                value: 200,
            }),
        )
        .await
        .expect("set_volume failed");
        assert_eq!(127, response.volume);

        let Json(ok) = super::reload(State(state)).await;
        assert!(ok.ok);
        assert!(reload.try_recv().is_ok());
    }
}
