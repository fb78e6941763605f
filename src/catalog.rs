//! Folder discovery and validation.

use tracing::debug;

use crate::error::{InputError, TransportError};
use crate::webmail::WebmailApi;

/// Resolves folder names against the folders the account owns.
pub struct FolderCatalog {
    api: WebmailApi,
}

impl FolderCatalog {
    pub fn new(api: WebmailApi) -> Self {
        Self { api }
    }

    /// Names of every folder, in backend order.
    pub async fn list_folders(&self) -> Result<Vec<String>, TransportError> {
        let list = self.api.folder_list().await?;
        let names: Vec<String> = list.folders.into_iter().map(|f| f.name).collect();
        debug!(count = names.len(), "Listed folders");
        Ok(names)
    }

    /// Check that `name` is one of `available`.
    ///
    /// The error carries the full listing so the caller can print it.
    pub fn validate(name: &str, available: &[String]) -> Result<(), InputError> {
        if available.iter().any(|f| f == name) {
            Ok(())
        } else {
            Err(InputError::NoSuchFolder {
                folder: name.to_string(),
                available: available.to_vec(),
            })
        }
    }
}

/// Render folder names the way `--list` and the unknown-folder path print them.
pub fn format_folder_listing(names: &[String]) -> String {
    let mut out = String::from("Available folders:\n");
    for name in names {
        out.push('\t');
        out.push_str(name);
        out.push('\n');
    }
    out
}
