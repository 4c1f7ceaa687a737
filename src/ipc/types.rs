use std::path::PathBuf;

use crossbeam::channel::Receiver;
use rusqlite::Connection;
use serde::Deserialize;

use crate::config::DaemonConfig;
use crate::notify::Notification;
use crate::session::GradebookSession;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// The class currently being edited and the adapter's own change feed.
pub struct OpenSession {
    pub session: GradebookSession,
    pub events: Receiver<Notification>,
}

#[derive(Default)]
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub config: DaemonConfig,
    pub session: Option<OpenSession>,
}
