//! Dashboard Route

use axum::{extract::State, response::Html};
use std::sync::Arc;

use crate::views;
use crate::AppState;

/// Gauge page listing only the enabled signals
pub async fn show(State(state): State<Arc<AppState>>) -> Html<String> {
    let selection = state.selection.current();
    Html(views::dashboard_page(selection.enabled(&state.catalog)))
}
