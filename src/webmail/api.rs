//! Thin wrappers over the webmail endpoints.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::io::AsyncWrite;
use tracing::debug;

use super::types::{CountsReply, FolderList, MessageListing, MutationReply};
use crate::config::{API_PATH, SortOrder, TRASH_FOLDER};
use crate::error::TransportError;
use crate::session::SessionHandle;
use crate::window::Bounds;

/// Endpoint-level view of a session.
#[derive(Clone)]
pub struct WebmailApi {
    session: Arc<dyn SessionHandle>,
}

impl WebmailApi {
    pub fn new(session: Arc<dyn SessionHandle>) -> Self {
        Self { session }
    }

    /// Account-wide message and unseen counts; also tells whether the session is live.
    pub async fn counts(&self) -> Result<CountsReply, TransportError> {
        self.get_json(&[("action", "unseenandcount".to_string())])
            .await
    }

    /// Folders owned by the account.
    pub async fn folder_list(&self) -> Result<FolderList, TransportError> {
        self.get_json(&[("action", "folderlist".to_string())]).await
    }

    /// One window of a folder's message list.
    pub async fn message_list(
        &self,
        folder: &str,
        bounds: Bounds,
        sort: SortOrder,
    ) -> Result<MessageListing, TransportError> {
        self.get_json(&[
            ("range", bounds.range_param()),
            ("sort", "date".to_string()),
            ("order", sort.order_param().to_string()),
            ("selected", String::new()),
            ("action", "maillist".to_string()),
            ("mailbox", folder.to_string()),
        ])
        .await
    }

    /// Stream one raw message body into `sink`.
    pub async fn download_message(
        &self,
        folder: &str,
        uid: u64,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, TransportError> {
        let query = [
            ("mailbox", folder.to_string()),
            ("uid", uid.to_string()),
            ("action", "downloadmessage".to_string()),
        ];
        debug!(folder, uid, "Downloading message");
        self.session.download(API_PATH, &query, sink).await
    }

    /// Ask the backend to move a message into Trash.
    pub async fn move_to_trash(
        &self,
        folder: &str,
        uid: u64,
    ) -> Result<MutationReply, TransportError> {
        self.post_json(&[
            ("action", "move".to_string()),
            ("mailbox", folder.to_string()),
            ("dest", TRASH_FOLDER.to_string()),
            ("uids", uid.to_string()),
        ])
        .await
    }

    /// Ask the backend to permanently delete a message from Trash.
    pub async fn delete_from_trash(&self, uid: u64) -> Result<MutationReply, TransportError> {
        self.post_json(&[
            ("action", "deletemessage".to_string()),
            ("mailbox", TRASH_FOLDER.to_string()),
            ("uids", uid.to_string()),
        ])
        .await
    }

    /// Obtain the CSRF token mutating calls need.
    pub async fn arm_mutations(&self) -> Result<(), TransportError> {
        self.session.arm_mutations().await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        query: &[(&str, String)],
    ) -> Result<T, TransportError> {
        let body = self.session.get_text(API_PATH, query).await?;
        debug!(?query, body = %body, "Webmail response");
        decode(&body)
    }

    async fn post_json(&self, form: &[(&str, String)]) -> Result<MutationReply, TransportError> {
        let body = self.session.post_form(API_PATH, form).await?;
        debug!(?form, body = %body, "Webmail mutation response");
        decode(&body).map(MutationReply)
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, TransportError> {
    serde_json::from_str(body).map_err(|e| TransportError::Decode {
        url: API_PATH.to_string(),
        source: e,
    })
}
