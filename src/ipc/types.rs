use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::cache::DataCache;
use crate::seating::SeatingSession;

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
    pub cache: DataCache,
    pub session: Option<SeatingSession>,
}

impl AppState {
    pub fn new() -> Self {
        AppState {
            workspace: None,
            db: None,
            cache: DataCache::default(),
            session: None,
        }
    }
}
