//! One lookup session: the video being watched, its ranked threads, and the
//! comment tree of the active thread.
//!
//! Remote calls run on background threads and report back over a channel.
//! Only [`Session`] mutates state, and only while draining that channel, so
//! responses for a video or thread that has since been replaced are dropped
//! instead of applied.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::comments::{CommentTree, MoreRequest, StubId, TreeError, TreeOptions};
use crate::config::{PreferenceStore, Preferences, Thresholds};
use crate::layout::{TabLayout, TabMetrics, TabStrip};
use crate::ranking::{self, PreferredThread, Ranked, RankingOptions};
use crate::reddit::{
    CandidateItem, Client, ClientConfig, Comment, CommentSort, CommentThing, ThreadListing,
};
use crate::request::{
    ApiError, ApiRequest, ErrorKind, NoopObserver, RequestObserver, RequestPolicy, Transport,
};
use crate::target::MediaTarget;
use crate::validate;
use crate::vote::{Arrow, PendingVote, SaveToggle, Votable, VoteError};

pub fn unix_now() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Terminal error as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorState {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorState {
    pub fn from_api(err: &ApiError) -> Self {
        let summary = match err.kind() {
            ErrorKind::NotFound => "That discussion no longer exists.",
            ErrorKind::RemoteOverload => {
                "The discussion service is under heavy load. Try again in a moment."
            }
            ErrorKind::Blocked => {
                "The request was blocked. Check your connection or any filtering extensions."
            }
            ErrorKind::ConnectivityTimeout => "The discussion service did not answer in time.",
            ErrorKind::MalformedResponse => "The discussion service sent an unreadable response.",
            ErrorKind::GenericRemoteError => "The discussion service returned an error.",
        };
        let message = match err.detail() {
            Some(detail) => format!("{summary} ({detail})"),
            None => summary.to_string(),
        };
        Self {
            kind: err.kind(),
            message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Progress {
    #[default]
    Idle,
    Loading,
    Slow,
    Retrying(u32),
    Ready,
    NoResults,
    Error(ErrorState),
}

impl Progress {
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            Progress::Ready | Progress::NoResults | Progress::Error(_)
        )
    }

    fn is_loading(&self) -> bool {
        matches!(
            self,
            Progress::Loading | Progress::Slow | Progress::Retrying(_)
        )
    }
}

/// Addresses a votable or saveable item in the active thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemRef {
    Post,
    Comment(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no thread is open")]
    NoThread,
    #[error("sign in first")]
    NotSignedIn,
    #[error("text is empty")]
    EmptyText,
    #[error("no comment with id {0}")]
    UnknownComment(String),
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error(transparent)]
    Vote(#[from] VoteError),
}

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub container_width: u32,
    pub metrics: TabMetrics,
    /// Seconds since the Unix epoch.
    pub clock: fn() -> f64,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            container_width: 1280,
            metrics: TabMetrics::default(),
            clock: unix_now,
        }
    }
}

enum AsyncResponse {
    Search {
        generation: u64,
        result: Result<Vec<CandidateItem>, ApiError>,
    },
    Thread {
        generation: u64,
        thread_id: String,
        sort: CommentSort,
        result: Result<ThreadListing, ApiError>,
    },
    More {
        generation: u64,
        thread_id: String,
        stub: StubId,
        result: Result<Vec<CommentThing>, ApiError>,
    },
    VoteResult {
        generation: u64,
        thread_id: String,
        item: ItemRef,
        pending: PendingVote,
        error: Option<ApiError>,
    },
    SaveResult {
        generation: u64,
        thread_id: String,
        item: ItemRef,
        requested: bool,
        error: Option<ApiError>,
    },
    Reply {
        generation: u64,
        thread_id: String,
        parent: Option<String>,
        result: Result<Comment, ApiError>,
    },
    Edit {
        generation: u64,
        thread_id: String,
        comment_id: String,
        result: Result<Comment, ApiError>,
    },
    Delete {
        generation: u64,
        thread_id: String,
        comment_id: String,
        result: Result<(), ApiError>,
    },
    Identity {
        result: Result<String, ApiError>,
    },
    Slow {
        generation: u64,
        path: String,
    },
    Retrying {
        generation: u64,
        path: String,
        attempt: u32,
    },
}

/// Forwards orchestrator progress hooks into the session channel, tagged
/// with the generation the call was started under.
struct ChannelObserver {
    tx: Sender<AsyncResponse>,
    generation: u64,
}

impl RequestObserver for ChannelObserver {
    fn slow(&self, request: &ApiRequest) {
        let _ = self.tx.send(AsyncResponse::Slow {
            generation: self.generation,
            path: request.path.clone(),
        });
    }

    fn retrying(&self, request: &ApiRequest, attempt: u32) {
        let _ = self.tx.send(AsyncResponse::Retrying {
            generation: self.generation,
            path: request.path.clone(),
            attempt,
        });
    }
}

struct ItemMut<'a> {
    name: String,
    vote: &'a mut Votable,
    save: &'a mut SaveToggle,
}

fn item_mut<'a>(tree: &'a mut CommentTree, item: &ItemRef) -> Option<ItemMut<'a>> {
    match item {
        ItemRef::Post => {
            let post = tree.post_mut();
            Some(ItemMut {
                name: post.name.clone(),
                vote: &mut post.vote,
                save: &mut post.save,
            })
        }
        ItemRef::Comment(id) => tree.comment_mut(id).map(|node| ItemMut {
            name: node.name.clone(),
            vote: &mut node.vote,
            save: &mut node.save,
        }),
    }
}

pub struct Session {
    client: Client,
    store: Arc<dyn PreferenceStore>,
    preferences: Preferences,
    options: SessionOptions,
    response_tx: Sender<AsyncResponse>,
    response_rx: Receiver<AsyncResponse>,
    generation: u64,
    outstanding: usize,
    progress: Progress,
    target: Option<MediaTarget>,
    preferred: Option<PreferredThread>,
    candidates: Option<Vec<CandidateItem>>,
    strip: Option<TabStrip>,
    tree: Option<CommentTree>,
    cache: HashMap<String, CommentTree>,
    loading_thread: Option<String>,
    identity: Option<String>,
    identity_requested: bool,
    notice: Option<ErrorState>,
}

impl Session {
    pub fn new(
        transport: Arc<dyn Transport>,
        policy: RequestPolicy,
        store: Arc<dyn PreferenceStore>,
        options: SessionOptions,
    ) -> Result<Self> {
        let preferences = store.load().context("load preferences")?;
        let (response_tx, response_rx) = unbounded();
        let client = Client::new(transport, ClientConfig { policy }, Arc::new(NoopObserver));
        Ok(Self {
            client,
            store,
            preferences,
            options,
            response_tx,
            response_rx,
            generation: 0,
            outstanding: 0,
            progress: Progress::Idle,
            target: None,
            preferred: None,
            candidates: None,
            strip: None,
            tree: None,
            cache: HashMap::new(),
            loading_thread: None,
            identity: None,
            identity_requested: false,
            notice: None,
        })
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    pub fn target(&self) -> Option<&MediaTarget> {
        self.target.as_ref()
    }

    pub fn strip(&self) -> Option<&TabStrip> {
        self.strip.as_ref()
    }

    pub fn layout(&self) -> Option<&TabLayout> {
        self.strip.as_ref().map(TabStrip::layout)
    }

    pub fn tree(&self) -> Option<&CommentTree> {
        self.tree.as_ref()
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn is_signed_in(&self) -> bool {
        self.client.is_signed_in()
    }

    /// True when no background call is outstanding.
    pub fn is_idle(&self) -> bool {
        self.outstanding == 0
    }

    /// Error from the last failed interaction (vote, save, reply, ...).
    pub fn take_notice(&mut self) -> Option<ErrorState> {
        self.notice.take()
    }

    /// Starts a fresh lookup. Everything belonging to the previous video is
    /// discarded and its outstanding responses become stale.
    pub fn open_video(&mut self, target: MediaTarget, preferred: Option<PreferredThread>) {
        self.generation += 1;
        let generation = self.generation;
        self.candidates = None;
        self.strip = None;
        self.tree = None;
        self.cache.clear();
        self.loading_thread = None;
        self.notice = None;
        self.progress = Progress::Loading;
        tracing::info!(video = %target, generation, "looking up discussions");

        let query = target.search_query();
        self.target = Some(target);
        self.preferred = preferred;
        self.spawn(move |client| AsyncResponse::Search {
            generation,
            result: client.search(&query),
        });
    }

    /// Re-runs the lookup for the current video.
    pub fn refresh(&mut self) {
        if let Some(target) = self.target.clone() {
            let preferred = self.preferred.clone();
            self.open_video(target, preferred);
        }
    }

    pub fn select_tab(&mut self, index: usize) -> bool {
        let changed = self
            .strip
            .as_mut()
            .and_then(|strip| strip.select_tab(index))
            .is_some();
        if changed {
            self.open_active();
        }
        changed
    }

    pub fn select_overflow(&mut self, index: usize) -> bool {
        let changed = self
            .strip
            .as_mut()
            .and_then(|strip| strip.select_overflow(index))
            .is_some();
        if changed {
            self.open_active();
        }
        changed
    }

    pub fn resize(&mut self, container_width: u32) {
        self.options.container_width = container_width;
        if let Some(strip) = self.strip.as_mut() {
            strip.resize(container_width);
        }
    }

    /// Changes the comment order; cached trees are dropped and the active
    /// thread is fetched again.
    pub fn set_sort(&mut self, sort: CommentSort) {
        if sort == self.preferences.comment_sort {
            return;
        }
        self.preferences.comment_sort = sort;
        self.cache.clear();
        self.tree = None;
        self.loading_thread = None;
        self.open_active();
    }

    /// Applies new thresholds and exclusions, persists them, and re-ranks the
    /// current video without searching again.
    pub fn configure(&mut self, thresholds: Thresholds, excluded: Vec<String>) -> Result<()> {
        if thresholds.comment != self.preferences.thresholds.comment {
            self.cache.clear();
            self.tree = None;
            self.loading_thread = None;
        }
        self.preferences.thresholds = thresholds;
        self.preferences.excluded_subreddits = excluded;
        if self.candidates.is_some() {
            self.rerank();
        }
        self.store
            .save(&self.preferences)
            .context("save preferences")
    }

    pub fn expand_more(&mut self, stub: StubId) -> Result<(), SessionError> {
        let tree = self.tree.as_mut().ok_or(SessionError::NoThread)?;
        let request = tree.begin_expand(stub)?;
        let post = tree.post();
        let (subreddit, thread_id, link) =
            (post.subreddit.clone(), post.id.clone(), post.name.clone());
        let generation = self.current_generation();
        let sort = self.preferences.comment_sort;
        self.spawn(move |client| {
            let result = match &request {
                MoreRequest::Subtree { anchor, .. } => {
                    client.subtree(&subreddit, &thread_id, anchor, sort)
                }
                MoreRequest::Children { ids, .. } => client.more_children(&link, ids, sort),
            };
            AsyncResponse::More {
                generation,
                thread_id,
                stub: request.stub(),
                result,
            }
        });
        Ok(())
    }

    pub fn vote(&mut self, item: ItemRef, arrow: Arrow) -> Result<(), SessionError> {
        if !self.client.is_signed_in() {
            return Err(SessionError::NotSignedIn);
        }
        let tree = self.tree.as_mut().ok_or(SessionError::NoThread)?;
        let thread_id = tree.post().id.clone();
        let target = item_mut(tree, &item).ok_or_else(|| unknown(&item))?;
        let pending = target.vote.click(arrow)?;
        let fullname = target.name;
        let generation = self.current_generation();
        tracing::debug!(item = %fullname, direction = pending.direction(), "sending {arrow}");
        self.spawn(move |client| {
            let error = client.vote(&fullname, pending.direction()).err();
            AsyncResponse::VoteResult {
                generation,
                thread_id,
                item,
                pending,
                error,
            }
        });
        Ok(())
    }

    pub fn toggle_save(&mut self, item: ItemRef) -> Result<(), SessionError> {
        if !self.client.is_signed_in() {
            return Err(SessionError::NotSignedIn);
        }
        let tree = self.tree.as_mut().ok_or(SessionError::NoThread)?;
        let thread_id = tree.post().id.clone();
        let target = item_mut(tree, &item).ok_or_else(|| unknown(&item))?;
        let requested = target.save.toggle()?;
        let fullname = target.name;
        let generation = self.current_generation();
        self.spawn(move |client| {
            let result = if requested {
                client.save(&fullname)
            } else {
                client.unsave(&fullname)
            };
            AsyncResponse::SaveResult {
                generation,
                thread_id,
                item,
                requested,
                error: result.err(),
            }
        });
        Ok(())
    }

    /// Replies to a comment, or to the thread itself when `parent` is `None`.
    pub fn reply(&mut self, parent: Option<&str>, text: &str) -> Result<(), SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyText);
        }
        if !self.client.is_signed_in() {
            return Err(SessionError::NotSignedIn);
        }
        let tree = self.tree.as_ref().ok_or(SessionError::NoThread)?;
        if !tree.can_reply() {
            return Err(TreeError::Preserved.into());
        }
        let parent_name = match parent {
            None => tree.post().name.clone(),
            Some(id) => tree
                .comment(id)
                .ok_or_else(|| SessionError::UnknownComment(id.to_string()))?
                .name
                .clone(),
        };
        let thread_id = tree.post().id.clone();
        let parent = parent.map(str::to_string);
        let text = text.to_string();
        let generation = self.current_generation();
        self.spawn(move |client| AsyncResponse::Reply {
            generation,
            thread_id,
            parent,
            result: client.reply(&parent_name, &text),
        });
        Ok(())
    }

    pub fn edit(&mut self, comment_id: &str, text: &str) -> Result<(), SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyText);
        }
        let (thread_id, fullname) = self.writable_comment(comment_id)?;
        let comment_id = comment_id.to_string();
        let text = text.to_string();
        let generation = self.current_generation();
        self.spawn(move |client| AsyncResponse::Edit {
            generation,
            thread_id,
            comment_id,
            result: client.edit(&fullname, &text),
        });
        Ok(())
    }

    pub fn delete(&mut self, comment_id: &str) -> Result<(), SessionError> {
        let (thread_id, fullname) = self.writable_comment(comment_id)?;
        let comment_id = comment_id.to_string();
        let generation = self.current_generation();
        self.spawn(move |client| AsyncResponse::Delete {
            generation,
            thread_id,
            comment_id,
            result: client.delete(&fullname),
        });
        Ok(())
    }

    pub fn toggle_collapsed(&mut self, comment_id: &str) -> Result<bool, SessionError> {
        let tree = self.tree.as_mut().ok_or(SessionError::NoThread)?;
        Ok(tree.toggle_collapsed(comment_id)?)
    }

    /// Applies every response that has already arrived.
    pub fn poll(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(message) = self.response_rx.try_recv() {
            self.handle_async_response(message);
            applied += 1;
        }
        applied
    }

    /// Waits up to `timeout` for the next response, then drains the rest.
    pub fn poll_blocking(&mut self, timeout: Duration) -> usize {
        match self.response_rx.recv_timeout(timeout) {
            Ok(message) => {
                self.handle_async_response(message);
                1 + self.poll()
            }
            Err(_) => 0,
        }
    }

    pub fn wait_until<F>(&mut self, timeout: Duration, done: F) -> bool
    where
        F: Fn(&Session) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            if done(self) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.poll_blocking(deadline - now);
        }
    }

    pub fn wait_until_settled(&mut self, timeout: Duration) -> bool {
        self.wait_until(timeout, |session| session.progress.is_settled())
    }

    fn current_generation(&self) -> u64 {
        self.generation
    }

    fn is_stale(&self, generation: u64) -> bool {
        generation != self.current_generation()
    }

    fn spawn<F>(&mut self, job: F)
    where
        F: FnOnce(&Client) -> AsyncResponse + Send + 'static,
    {
        self.outstanding += 1;
        let observer = Arc::new(ChannelObserver {
            tx: self.response_tx.clone(),
            generation: self.generation,
        });
        let client = self.client.with_observer(observer);
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let response = job(&client);
            let _ = tx.send(response);
        });
    }

    fn writable_comment(&self, comment_id: &str) -> Result<(String, String), SessionError> {
        if !self.client.is_signed_in() {
            return Err(SessionError::NotSignedIn);
        }
        let tree = self.tree.as_ref().ok_or(SessionError::NoThread)?;
        let node = tree
            .comment(comment_id)
            .ok_or_else(|| SessionError::UnknownComment(comment_id.to_string()))?;
        Ok((tree.post().id.clone(), node.name.clone()))
    }

    fn tree_for(&mut self, thread_id: &str) -> Option<&mut CommentTree> {
        match self.tree.as_mut() {
            Some(tree) if tree.post().id == thread_id => Some(tree),
            _ => self.cache.get_mut(thread_id),
        }
    }

    fn rerank(&mut self) {
        let Some(candidates) = self.candidates.clone() else {
            return;
        };
        let now = (self.options.clock)();
        let options = RankingOptions::new(
            &self.preferences.excluded_subreddits,
            self.preferences.thresholds.post,
        );
        match ranking::rank(candidates, self.preferred.as_ref(), &options, now) {
            Ranked::NoResults => {
                self.strip = None;
                self.tree = None;
                self.loading_thread = None;
                self.progress = Progress::NoResults;
            }
            Ranked::Threads(threads) => {
                self.strip = Some(TabStrip::new(
                    threads,
                    self.options.container_width,
                    self.options.metrics,
                ));
                self.open_active();
            }
        }
    }

    /// Shows the active tab's comments, from the cache when allowed.
    fn open_active(&mut self) {
        let Some(thread) = self
            .strip
            .as_ref()
            .and_then(TabStrip::active_thread)
            .cloned()
        else {
            return;
        };
        if self
            .tree
            .as_ref()
            .is_some_and(|tree| tree.post().id == thread.id)
        {
            self.loading_thread = None;
            self.progress = Progress::Ready;
            return;
        }
        self.stash_tree();
        if self.preferences.keep_visited_tabs {
            if let Some(tree) = self.cache.remove(&thread.id) {
                tracing::debug!(thread = %thread.id, "reusing cached comments");
                self.tree = Some(tree);
                self.loading_thread = None;
                self.progress = Progress::Ready;
                return;
            }
        }

        self.progress = Progress::Loading;
        self.loading_thread = Some(thread.id.clone());
        let generation = self.current_generation();
        let sort = self.preferences.comment_sort;
        self.spawn(move |client| {
            let result = client.thread(&thread.subreddit, &thread.id, sort);
            AsyncResponse::Thread {
                generation,
                thread_id: thread.id,
                sort,
                result,
            }
        });
    }

    fn stash_tree(&mut self) {
        if let Some(tree) = self.tree.take() {
            if self.preferences.keep_visited_tabs {
                self.cache.insert(tree.post().id.clone(), tree);
            }
        }
    }

    fn request_identity(&mut self) {
        if self.identity_requested || !self.client.is_signed_in() {
            return;
        }
        self.identity_requested = true;
        self.spawn(|client| AsyncResponse::Identity {
            result: client.identity(),
        });
    }

    fn fail(&mut self, err: &ApiError) {
        tracing::warn!(error = %err, kind = ?err.kind(), "lookup failed");
        self.progress = Progress::Error(ErrorState::from_api(err));
    }

    fn interaction_failed(&mut self, action: &str, err: &ApiError) {
        tracing::warn!(error = %err, "{action} failed");
        self.notice = Some(ErrorState::from_api(err));
    }

    fn handle_async_response(&mut self, message: AsyncResponse) {
        match message {
            AsyncResponse::Slow { generation, path } => {
                if !self.is_stale(generation) && self.progress.is_loading() {
                    tracing::debug!(path = %path, "showing slow indicator");
                    self.progress = Progress::Slow;
                }
                return;
            }
            AsyncResponse::Retrying {
                generation,
                path,
                attempt,
            } => {
                if !self.is_stale(generation) && self.progress.is_loading() {
                    tracing::debug!(path = %path, attempt, "showing retry indicator");
                    self.progress = Progress::Retrying(attempt);
                }
                return;
            }
            _ => {}
        }

        self.outstanding = self.outstanding.saturating_sub(1);
        match message {
            AsyncResponse::Search { generation, result } => {
                if self.is_stale(generation) {
                    tracing::debug!(generation, "dropping superseded search");
                    return;
                }
                match result {
                    Ok(items) => {
                        let Some(target_id) = self.target.as_ref().map(|t| t.id.clone()) else {
                            return;
                        };
                        let now = (self.options.clock)();
                        self.candidates = Some(validate::filter(items, &target_id, now));
                        self.rerank();
                    }
                    Err(err) => self.fail(&err),
                }
            }
            AsyncResponse::Thread {
                generation,
                thread_id,
                sort,
                result,
            } => {
                if self.is_stale(generation)
                    || self.loading_thread.as_deref() != Some(thread_id.as_str())
                    || sort != self.preferences.comment_sort
                {
                    tracing::debug!(thread = %thread_id, "dropping superseded thread listing");
                    return;
                }
                self.loading_thread = None;
                match result {
                    Ok(listing) => {
                        let now = (self.options.clock)();
                        let options = TreeOptions {
                            hidden_threshold: self.preferences.thresholds.comment,
                        };
                        let mut tree =
                            CommentTree::build(listing.post, listing.comments.children, options, now);
                        tree.post_mut().official = self
                            .strip
                            .as_ref()
                            .and_then(|strip| strip.threads().iter().find(|t| t.id == thread_id))
                            .is_some_and(|thread| thread.is_official);
                        self.tree = Some(tree);
                        self.progress = Progress::Ready;
                        self.request_identity();
                    }
                    Err(err) => self.fail(&err),
                }
            }
            AsyncResponse::More {
                generation,
                thread_id,
                stub,
                result,
            } => {
                if self.is_stale(generation) {
                    return;
                }
                let Some(tree) = self.tree_for(&thread_id) else {
                    tracing::debug!(thread = %thread_id, "dropping comments for closed thread");
                    return;
                };
                match result {
                    Ok(things) => {
                        if let Err(err) = tree.complete_expand(stub, things) {
                            tracing::warn!(error = %err, "could not splice loaded comments");
                        }
                    }
                    Err(err) => {
                        let _ = tree.abort_expand(stub);
                        self.interaction_failed("loading more comments", &err);
                    }
                }
            }
            AsyncResponse::VoteResult {
                generation,
                thread_id,
                item,
                pending,
                error,
            } => {
                if self.is_stale(generation) {
                    return;
                }
                let reverted = self
                    .tree_for(&thread_id)
                    .and_then(|tree| item_mut(tree, &item))
                    .is_some_and(|target| target.vote.settle(&pending, error.is_none()));
                if let Some(err) = error {
                    tracing::debug!(reverted, "vote was not recorded");
                    self.interaction_failed("vote", &err);
                }
            }
            AsyncResponse::SaveResult {
                generation,
                thread_id,
                item,
                requested,
                error,
            } => {
                if self.is_stale(generation) {
                    return;
                }
                let reverted = self
                    .tree_for(&thread_id)
                    .and_then(|tree| item_mut(tree, &item))
                    .is_some_and(|target| target.save.settle(requested, error.is_none()));
                if let Some(err) = error {
                    tracing::debug!(reverted, "save was not recorded");
                    self.interaction_failed("save", &err);
                }
            }
            AsyncResponse::Reply {
                generation,
                thread_id,
                parent,
                result,
            } => {
                if self.is_stale(generation) {
                    return;
                }
                match result {
                    Ok(comment) => {
                        if let Some(tree) = self.tree_for(&thread_id) {
                            if let Err(err) = tree.insert_reply(parent.as_deref(), comment) {
                                tracing::warn!(error = %err, "could not place reply");
                            }
                        }
                    }
                    Err(err) => self.interaction_failed("reply", &err),
                }
            }
            AsyncResponse::Edit {
                generation,
                thread_id,
                comment_id,
                result,
            } => {
                if self.is_stale(generation) {
                    return;
                }
                match result {
                    Ok(comment) => {
                        if let Some(tree) = self.tree_for(&thread_id) {
                            if let Err(err) = tree.apply_edit(&comment_id, comment.body) {
                                tracing::warn!(error = %err, "could not apply edit");
                            }
                        }
                    }
                    Err(err) => self.interaction_failed("edit", &err),
                }
            }
            AsyncResponse::Delete {
                generation,
                thread_id,
                comment_id,
                result,
            } => {
                if self.is_stale(generation) {
                    return;
                }
                match result {
                    Ok(()) => {
                        if let Some(tree) = self.tree_for(&thread_id) {
                            if let Err(err) = tree.mark_deleted(&comment_id) {
                                tracing::warn!(error = %err, "could not mark comment deleted");
                            }
                        }
                    }
                    Err(err) => self.interaction_failed("delete", &err),
                }
            }
            AsyncResponse::Identity { result } => match result {
                Ok(name) => {
                    tracing::info!(user = %name, "signed in");
                    self.identity = Some(name);
                }
                Err(err) => tracing::debug!(error = %err, "identity lookup failed"),
            },
            AsyncResponse::Slow { .. } | AsyncResponse::Retrying { .. } => {}
        }
    }
}

fn unknown(item: &ItemRef) -> SessionError {
    match item {
        ItemRef::Post => SessionError::NoThread,
        ItemRef::Comment(id) => SessionError::UnknownComment(id.clone()),
    }
}
