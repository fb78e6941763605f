//! Two-phase destructive cleanup: move archived messages to Trash, then
//! optionally purge Trash.

use tracing::{error, info};

use crate::config::{SortOrder, TRASH_FOLDER};
use crate::error::{Error, RemoteStateError};
use crate::webmail::WebmailApi;
use crate::window::{Bounds, RangeWindow};

/// Remote action requested for one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupAction {
    MoveToTrash,
    /// `already_deleted` counts the purge's earlier, acknowledged deletes.
    PermanentDelete { already_deleted: usize },
}

/// Intent to act on `(folder, uid)`, consumed by a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupTicket {
    pub folder: String,
    pub uid: u64,
    pub action: CleanupAction,
}

impl CleanupTicket {
    pub fn move_to_trash(folder: impl Into<String>, uid: u64) -> Self {
        Self {
            folder: folder.into(),
            uid,
            action: CleanupAction::MoveToTrash,
        }
    }

    pub fn permanent_delete(uid: u64, already_deleted: usize) -> Self {
        Self {
            folder: TRASH_FOLDER.to_string(),
            uid,
            action: CleanupAction::PermanentDelete { already_deleted },
        }
    }
}

/// Issues move and delete requests; any unacknowledged answer is fatal.
pub struct CleanupOrchestrator {
    api: WebmailApi,
}

impl CleanupOrchestrator {
    pub fn new(api: WebmailApi) -> Self {
        Self { api }
    }

    /// Execute one ticket against the backend.
    pub async fn execute(&self, ticket: &CleanupTicket) -> Result<(), Error> {
        match ticket.action {
            CleanupAction::MoveToTrash => {
                let reply = self.api.move_to_trash(&ticket.folder, ticket.uid).await?;
                if !reply.succeeded() {
                    return Err(RemoteStateError::MoveFailed {
                        folder: ticket.folder.clone(),
                        uid: ticket.uid,
                        response: reply.to_string(),
                    }
                    .into());
                }
                info!(folder = %ticket.folder, uid = ticket.uid, "Moved message to trash");
            }
            CleanupAction::PermanentDelete { already_deleted } => {
                let reply = self.api.delete_from_trash(ticket.uid).await?;
                if !reply.succeeded() {
                    return Err(RemoteStateError::DeleteFailed {
                        uid: ticket.uid,
                        already_deleted,
                        response: reply.to_string(),
                    }
                    .into());
                }
                info!(uid = ticket.uid, "Deleted message");
            }
        }
        Ok(())
    }

    /// Move phase for one just-archived message.
    pub async fn move_to_trash(&self, folder: &str, uid: u64) -> Result<(), Error> {
        self.execute(&CleanupTicket::move_to_trash(folder, uid)).await
    }

    /// Purge phase: permanently delete everything in the first page of Trash.
    ///
    /// Only one window is examined; messages beyond it stay in Trash.
    pub async fn purge_trash(&self) -> Result<Vec<u64>, Error> {
        info!("Getting list of trash for deletion");
        let window = RangeWindow::fetch(
            &self.api,
            TRASH_FOLDER,
            Bounds::default(),
            SortOrder::DateAscending,
        )
        .await?;

        let mut deleted = Vec::with_capacity(window.messages.len());
        for meta in &window.messages {
            let ticket = CleanupTicket::permanent_delete(meta.uid, deleted.len());
            if let Err(e) = self.execute(&ticket).await {
                error!(
                    deleted = deleted.len(),
                    remaining = window.messages.len() - deleted.len(),
                    "Purge aborted part way"
                );
                return Err(e);
            }
            deleted.push(meta.uid);
        }
        Ok(deleted)
    }
}
