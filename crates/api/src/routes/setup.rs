//! Setup Routes

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, Redirect},
    Form, Json,
};
use serde::Serialize;
use signals::SignalState;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::error;

use crate::views;
use crate::AppState;

/// Catalog entry with its current selection state
#[derive(Debug, Serialize)]
pub struct SignalEntry {
    pub key: String,
    pub label: String,
    pub unit: &'static str,
    pub pid: String,
    pub state: SignalState,
}

/// Response for the signals endpoint
#[derive(Debug, Serialize)]
pub struct SignalsResponse {
    pub data: Vec<SignalEntry>,
    pub count: usize,
    pub enabled_count: usize,
}

/// `/` sends visitors to the setup form
pub async fn index() -> Redirect {
    Redirect::to("/setup")
}

/// Render the selection form
pub async fn show(State(state): State<Arc<AppState>>) -> Html<String> {
    let selection = state.selection.current();
    Html(views::setup_page(&state.catalog, &selection))
}

/// Apply a form submission and continue to the dashboard
pub async fn submit(
    State(state): State<Arc<AppState>>,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Redirect, StatusCode> {
    let store = state.selection.clone();
    tokio::task::spawn_blocking(move || store.update(&form))
        .await
        .map_err(|err| {
            error!(error = %err, "Selection update task failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    Ok(Redirect::to("/dashboard"))
}

/// Catalog and current selection as JSON
pub async fn list_signals(State(state): State<Arc<AppState>>) -> Json<SignalsResponse> {
    let selection = state.selection.current();
    let data: Vec<SignalEntry> = state
        .catalog
        .iter()
        .map(|signal| SignalEntry {
            key: signal.key.clone(),
            label: signal.label.clone(),
            unit: signal.unit(),
            pid: format!("{:02X}", signal.command.as_hex()),
            state: selection.state(&signal.key),
        })
        .collect();
    let enabled_count = data
        .iter()
        .filter(|entry| entry.state == SignalState::Enabled)
        .count();

    Json(SignalsResponse {
        count: data.len(),
        enabled_count,
        data,
    })
}
