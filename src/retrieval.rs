//! Retrieval loop: walks a folder window by window, archiving each message
//! and optionally moving it to Trash.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::catalog::FolderCatalog;
use crate::cleanup::CleanupOrchestrator;
use crate::config::{ArchiveConfig, CollisionPolicy, ShowFields};
use crate::error::{Error, Result, SafetyError};
use crate::session::SessionHandle;
use crate::store::{ArchiveStore, Resolution};
use crate::webmail::{MessageMeta, WebmailApi};
use crate::window::{Bounds, RangeWindow};

/// Phase of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Validating,
    Paging,
    Downloading,
    MaybeTrashing,
    Advancing,
    Done,
}

impl LoopState {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: LoopState) -> bool {
        use LoopState::*;

        matches!(
            (self, target),
            (Idle, Validating)
                | (Validating, Paging)
                | (Paging, Downloading)
                | (Paging, Done)
                | (Downloading, Downloading)
                | (Downloading, MaybeTrashing)
                | (Downloading, Advancing)
                | (MaybeTrashing, Downloading)
                | (MaybeTrashing, Advancing)
                | (Advancing, Paging)
                | (Advancing, Done)
        )
    }
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::Paging => "paging",
            Self::Downloading => "downloading",
            Self::MaybeTrashing => "maybe_trashing",
            Self::Advancing => "advancing",
            Self::Done => "done",
        };
        write!(f, "{s}")
    }
}

/// A message saved during the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedMessage {
    pub uid: u64,
    pub path: PathBuf,
    pub bytes: u64,
    /// Operator-requested listing fields, rendered for display.
    pub details: Option<String>,
}

/// What a run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub windows_fetched: u32,
    pub saved: Vec<SavedMessage>,
    /// Uids already archived and not downloaded again.
    pub skipped: Vec<u64>,
    /// Uids moved to Trash.
    pub moved: Vec<u64>,
    /// Uids permanently deleted from Trash.
    pub purged: Vec<u64>,
    /// Destructive actions were switched off after suspected uid reuse.
    pub destructive_disabled: bool,
}

/// Render the listing fields the operator asked to see.
pub fn describe(meta: &MessageMeta, show: ShowFields) -> Option<String> {
    let mut parts = Vec::new();
    if show.subject {
        parts.push(format!(
            "subject: {}",
            meta.subject.as_deref().unwrap_or("(no subject)")
        ));
    }
    if show.sender {
        parts.push(format!("from: {}", meta.sender()));
    }
    if show.attachment {
        let flag = if meta.has_attachment() { "yes" } else { "no" };
        parts.push(format!("attachment: {flag}"));
    }
    (!parts.is_empty()).then(|| parts.join(", "))
}

/// Drives one archiving run over a single folder.
pub struct RetrievalLoop {
    api: WebmailApi,
    catalog: FolderCatalog,
    store: ArchiveStore,
    cleanup: CleanupOrchestrator,
    config: ArchiveConfig,
    state: LoopState,
    policy: CollisionPolicy,
    /// Move each archived message to Trash.
    trash_pending: bool,
    /// Purge Trash once the loop finishes.
    purge_pending: bool,
    report: RunReport,
}

impl RetrievalLoop {
    /// Prepare a run; opens (and creates) the output directory.
    pub async fn new(session: Arc<dyn SessionHandle>, config: ArchiveConfig) -> Result<Self> {
        let api = WebmailApi::new(session);
        let store = ArchiveStore::open(&config.output_dir).await?;
        let policy = config.effective_collision();
        debug!(%policy, output = %store.dir().display(), "Prepared retrieval loop");
        Ok(Self {
            catalog: FolderCatalog::new(api.clone()),
            cleanup: CleanupOrchestrator::new(api.clone()),
            api,
            store,
            trash_pending: config.destructive(),
            purge_pending: config.delete,
            config,
            state: LoopState::Idle,
            policy,
            report: RunReport::default(),
        })
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Run to completion. Safety-interlock and remote-state failures abort
    /// immediately; nothing is rolled back.
    pub async fn run(mut self) -> Result<RunReport> {
        self.transition(LoopState::Validating);
        let available = self.catalog.list_folders().await?;
        FolderCatalog::validate(&self.config.folder, &available)?;

        if self.trash_pending {
            self.api.arm_mutations().await?;
        }

        let sort = self.config.effective_sort();
        let mut bounds = self.config.bounds;
        info!(folder = %self.config.folder, range = %bounds, auto = self.config.auto, "Getting list of emails");

        loop {
            self.transition(LoopState::Paging);
            let window = RangeWindow::fetch(&self.api, &self.config.folder, bounds, sort).await?;
            self.report.windows_fetched += 1;

            if window.is_empty() {
                info!(range = %bounds, "No messages in window");
                break;
            }

            let moved = self.process_window(&window).await?;

            self.transition(LoopState::Advancing);
            match self.next_bounds(&window, moved) {
                Some(next) => bounds = next,
                None => break,
            }
        }

        self.transition(LoopState::Done);
        if self.purge_pending {
            self.report.purged = self.cleanup.purge_trash().await?;
        }
        Ok(self.report)
    }

    /// Archive every message of `window` in listing order. Returns how many
    /// were moved out of the folder.
    async fn process_window(&mut self, window: &RangeWindow) -> Result<usize> {
        let folder = window.folder.as_str();
        let mut moved = 0;

        for meta in &window.messages {
            self.transition(LoopState::Downloading);
            let resolution = self
                .store
                .resolve(folder, meta.uid, self.policy, self.trash_pending)
                .await?;

            match resolution {
                Resolution::Fresh(path) => self.download(folder, meta, path).await?,
                Resolution::Existing(path) => {
                    info!(folder, uid = meta.uid, path = %path.display(), "Already downloaded");
                    self.report.skipped.push(meta.uid);
                }
                Resolution::Conflict(path) => {
                    if self.config.stop_on_existing {
                        return Err(SafetyError::SuspectedUidReuse {
                            folder: folder.to_string(),
                            uid: meta.uid,
                            path,
                        }
                        .into());
                    }
                    warn!(
                        folder,
                        uid = meta.uid,
                        path = %path.display(),
                        "Already downloaded; stopping trash and deletion in case of uid reuse"
                    );
                    self.trash_pending = false;
                    self.purge_pending = false;
                    self.report.destructive_disabled = true;
                    self.report.skipped.push(meta.uid);
                }
            }

            if !self.trash_pending {
                continue;
            }

            self.transition(LoopState::MaybeTrashing);
            self.cleanup.move_to_trash(folder, meta.uid).await?;
            self.report.moved.push(meta.uid);
            moved += 1;
        }

        Ok(moved)
    }

    async fn download(&mut self, folder: &str, meta: &MessageMeta, path: PathBuf) -> Result<()> {
        let mut pending = self.store.begin(path).await?;
        let bytes = match self
            .api
            .download_message(folder, meta.uid, pending.writer())
            .await
        {
            Ok(bytes) => bytes,
            Err(e) => {
                pending.abort().await;
                return Err(Error::from(e));
            }
        };
        let path = pending.commit().await?;

        let details = describe(meta, self.config.show);
        match &details {
            Some(details) => {
                info!(folder, uid = meta.uid, path = %path.display(), bytes, "Saved message ({details})")
            }
            None => info!(folder, uid = meta.uid, path = %path.display(), bytes, "Saved message"),
        }
        self.report.saved.push(SavedMessage {
            uid: meta.uid,
            path,
            bytes,
            details,
        });
        Ok(())
    }

    /// Bounds of the next window, or `None` when the run is over.
    ///
    /// Messages moved out of the folder shift the rest down, so the next
    /// window starts after the ones that stayed. A folder total below the
    /// next lower bound ends the run early; an empty page always does.
    fn next_bounds(&self, window: &RangeWindow, moved: usize) -> Option<Bounds> {
        if !self.config.auto {
            return None;
        }

        let retained = window.messages.len().saturating_sub(moved);
        let retained = u32::try_from(retained).unwrap_or(u32::MAX);
        let next = window.bounds.advanced_by(retained);

        match window.total {
            Some(total) if total < u64::from(next.lower()) => {
                debug!(total, next = %next, "Folder exhausted by reported total");
                None
            }
            _ => Some(next),
        }
    }

    fn transition(&mut self, to: LoopState) {
        debug_assert!(
            self.state.can_transition_to(to),
            "invalid loop transition {} -> {}",
            self.state,
            to
        );
        debug!(from = %self.state, to = %to, "Loop state");
        self.state = to;
    }
}
