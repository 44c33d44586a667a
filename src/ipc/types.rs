use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::recalc::{self, SharedProgress};

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub progress: SharedProgress,
}

impl AppState {
    pub fn new() -> Self {
        AppState {
            workspace: None,
            db: None,
            progress: recalc::new_shared_progress(),
        }
    }
}
