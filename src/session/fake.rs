//! In-memory webmail backend for unit tests.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::{Params, SessionHandle};
use crate::config::TRASH_FOLDER;
use crate::error::TransportError;

/// A request the fake received, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Counts,
    FolderList,
    List { folder: String, range: String },
    Download { folder: String, uid: u64 },
    Move { folder: String, uid: u64 },
    Delete { uid: u64 },
    Arm,
}

#[derive(Default)]
struct State {
    folders: BTreeMap<String, Vec<u64>>,
    calls: Vec<Call>,
    failing_moves: HashSet<u64>,
    failing_deletes: HashSet<u64>,
    failing_download: Option<u64>,
    total_override: Option<u64>,
}

/// Scripted mailbox implementing [`SessionHandle`].
pub struct FakeWebmail {
    state: Mutex<State>,
}

impl FakeWebmail {
    /// Empty account holding only a Trash folder.
    pub fn new() -> Self {
        let mut state = State::default();
        state.folders.insert(TRASH_FOLDER.to_string(), Vec::new());
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn with_folder(self, name: &str, uids: &[u64]) -> Self {
        self.lock().folders.insert(name.to_string(), uids.to_vec());
        self
    }

    /// Answer moves of `uid` without a success key.
    pub fn failing_move(self, uid: u64) -> Self {
        self.lock().failing_moves.insert(uid);
        self
    }

    /// Answer deletes of `uid` without a success key.
    pub fn failing_delete(self, uid: u64) -> Self {
        self.lock().failing_deletes.insert(uid);
        self
    }

    /// Break the connection halfway through downloading `uid`.
    pub fn failing_download(self, uid: u64) -> Self {
        self.lock().failing_download = Some(uid);
        self
    }

    /// Report this folder total instead of the real one.
    pub fn reporting_total(self, total: u64) -> Self {
        self.lock().total_override = Some(total);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn uids(&self, folder: &str) -> Vec<u64> {
        self.lock().folders.get(folder).cloned().unwrap_or_default()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| pred(c)).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn body(folder: &str, uid: u64) -> Vec<u8> {
        format!("Subject: message {uid}\r\nX-Folder: {folder}\r\n\r\nbody of {uid}\r\n").into_bytes()
    }
}

fn param<'a>(params: &'a Params<'_>, key: &str) -> &'a str {
    params
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v.as_str())
        .unwrap_or_default()
}

#[async_trait]
impl SessionHandle for FakeWebmail {
    async fn get_text(&self, _path: &str, query: &Params<'_>) -> Result<String, TransportError> {
        let mut state = self.lock();
        let body = match param(query, "action") {
            "unseenandcount" => {
                state.calls.push(Call::Counts);
                let messages: usize = state.folders.values().map(Vec::len).sum();
                serde_json::json!({ "messages": messages, "unseen": 0 })
            }
            "folderlist" => {
                state.calls.push(Call::FolderList);
                let folders: Vec<_> = state
                    .folders
                    .keys()
                    .map(|name| serde_json::json!({ "name": name }))
                    .collect();
                serde_json::json!({ "folders": folders })
            }
            "maillist" => {
                let folder = param(query, "mailbox").to_string();
                let range = param(query, "range").to_string();
                let (lower, upper) = range
                    .split_once('-')
                    .and_then(|(l, u)| Some((l.parse::<usize>().ok()?, u.parse::<usize>().ok()?)))
                    .unwrap_or((1, 0));
                state.calls.push(Call::List {
                    folder: folder.clone(),
                    range,
                });
                let uids = state.folders.get(&folder).cloned().unwrap_or_default();
                let page: Vec<_> = uids
                    .iter()
                    .skip(lower.saturating_sub(1))
                    .take((upper + 1).saturating_sub(lower))
                    .map(|uid| serde_json::json!({ "uid": uid, "subject": format!("message {uid}") }))
                    .collect();
                let total = state.total_override.unwrap_or(uids.len() as u64);
                serde_json::json!({ "partial_list": page, "total": total })
            }
            other => serde_json::json!({ "error_info": format!("unknown action {other}") }),
        };
        Ok(body.to_string())
    }

    async fn download(
        &self,
        _path: &str,
        query: &Params<'_>,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, TransportError> {
        let folder = param(query, "mailbox").to_string();
        let uid: u64 = param(query, "uid").parse().unwrap_or_default();
        let failing = {
            let mut state = self.lock();
            state.calls.push(Call::Download {
                folder: folder.clone(),
                uid,
            });
            state.failing_download == Some(uid)
        };

        let body = Self::body(&folder, uid);
        if failing {
            sink.write_all(&body[..body.len() / 2]).await?;
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset mid-body",
            )));
        }
        sink.write_all(&body).await?;
        Ok(body.len() as u64)
    }

    async fn post_form(&self, _path: &str, form: &Params<'_>) -> Result<String, TransportError> {
        let mut state = self.lock();
        let uid: u64 = param(form, "uids").parse().unwrap_or_default();
        let reply = match param(form, "action") {
            "move" => {
                let folder = param(form, "mailbox").to_string();
                state.calls.push(Call::Move {
                    folder: folder.clone(),
                    uid,
                });
                if state.failing_moves.contains(&uid) {
                    serde_json::json!({ "error": "move refused" })
                } else {
                    if let Some(uids) = state.folders.get_mut(&folder) {
                        uids.retain(|u| *u != uid);
                    }
                    state
                        .folders
                        .entry(param(form, "dest").to_string())
                        .or_default()
                        .push(uid);
                    serde_json::json!({ "success": true })
                }
            }
            "deletemessage" => {
                state.calls.push(Call::Delete { uid });
                if state.failing_deletes.contains(&uid) {
                    serde_json::json!({ "error": "delete refused" })
                } else {
                    if let Some(uids) = state.folders.get_mut(TRASH_FOLDER) {
                        uids.retain(|u| *u != uid);
                    }
                    serde_json::json!({ "success": true })
                }
            }
            other => serde_json::json!({ "error": format!("unknown action {other}") }),
        };
        Ok(reply.to_string())
    }

    async fn arm_mutations(&self) -> Result<(), TransportError> {
        self.lock().calls.push(Call::Arm);
        Ok(())
    }
}
