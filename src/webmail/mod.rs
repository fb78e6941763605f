//! Webmail backend endpoints and their JSON payloads.

pub mod api;
pub mod types;

pub use api::WebmailApi;
pub use types::{
    CountsReply, FolderList, FolderRecord, MailboxCounts, MessageListing, MessageMeta,
    MutationReply,
};
