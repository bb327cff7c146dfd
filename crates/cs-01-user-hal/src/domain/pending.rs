//! Pending Request Table - correlates HAL responses with waiting callbacks.
//!
//! Flow:
//! 1. Service allocates a request id and calls `insert()` with the callback
//! 2. A deadline task is armed with `arm()`
//! 3. The response event (or the deadline) calls `take()`
//! 4. Whoever takes the entry resolves the callback; the other side no-ops
//!
//! At most one entry per [`ResponseKind`] exists at any time.

use car_types::{
    CreateUserResponse, HalCallback, HalCallbackStatus, InitialUserInfoResponse,
    SwitchUserResponse,
};
use std::collections::HashMap;
use std::fmt;
use tokio::task::AbortHandle;
use tokio::time::Instant;

/// Kind of response a pending request is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseKind {
    InitialUserInfo,
    SwitchUser,
    CreateUser,
}

impl ResponseKind {
    /// Label used in logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InitialUserInfo => "initial_user_info",
            Self::SwitchUser => "switch_user",
            Self::CreateUser => "create_user",
        }
    }
}

impl fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Callback of a pending request, tagged with its response type.
pub enum PendingCallback {
    InitialUserInfo(HalCallback<InitialUserInfoResponse>),
    SwitchUser(HalCallback<SwitchUserResponse>),
    CreateUser(HalCallback<CreateUserResponse>),
}

impl PendingCallback {
    /// The response kind this callback expects.
    #[must_use]
    pub fn kind(&self) -> ResponseKind {
        match self {
            Self::InitialUserInfo(_) => ResponseKind::InitialUserInfo,
            Self::SwitchUser(_) => ResponseKind::SwitchUser,
            Self::CreateUser(_) => ResponseKind::CreateUser,
        }
    }

    /// Resolve with a terminal non-OK status and no response.
    pub fn fail(self, status: HalCallbackStatus) {
        match self {
            Self::InitialUserInfo(callback) => callback(status, None),
            Self::SwitchUser(callback) => callback(status, None),
            Self::CreateUser(callback) => callback(status, None),
        }
    }
}

/// A request waiting for its response event.
pub struct PendingRequest {
    /// Correlation id written into the request payload.
    pub request_id: i32,
    /// Who to tell.
    pub callback: PendingCallback,
    /// When the request was issued.
    pub created_at: Instant,
    deadline: Option<AbortHandle>,
}

impl PendingRequest {
    /// Stop the deadline task, if one is armed.
    pub fn cancel_deadline(&mut self) {
        if let Some(deadline) = self.deadline.take() {
            deadline.abort();
        }
    }

    /// Response kind of this request.
    #[must_use]
    pub fn kind(&self) -> ResponseKind {
        self.callback.kind()
    }
}

/// Table of outstanding correlated requests.
#[derive(Default)]
pub struct PendingRequestTable {
    entries: HashMap<i32, PendingRequest>,
}

impl PendingRequestTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a request of `kind` is outstanding.
    #[must_use]
    pub fn has_kind(&self, kind: ResponseKind) -> bool {
        self.entries.values().any(|p| p.kind() == kind)
    }

    /// Record a new pending request.
    pub fn insert(&mut self, request_id: i32, callback: PendingCallback) {
        self.entries.insert(
            request_id,
            PendingRequest {
                request_id,
                callback,
                created_at: Instant::now(),
                deadline: None,
            },
        );
    }

    /// Attach the deadline task of `request_id`.
    ///
    /// Aborts `deadline` right away if the request is already gone.
    pub fn arm(&mut self, request_id: i32, deadline: AbortHandle) {
        match self.entries.get_mut(&request_id) {
            Some(pending) => pending.deadline = Some(deadline),
            None => deadline.abort(),
        }
    }

    /// Response kind the request `request_id` is waiting for.
    #[must_use]
    pub fn kind_of(&self, request_id: i32) -> Option<ResponseKind> {
        self.entries.get(&request_id).map(PendingRequest::kind)
    }

    /// Remove and return the request. `None` if it was already resolved.
    pub fn take(&mut self, request_id: i32) -> Option<PendingRequest> {
        self.entries.remove(&request_id)
    }

    /// Remove every request and stop all deadlines.
    ///
    /// The caller owns the returned requests and must resolve their
    /// callbacks.
    pub fn drain(&mut self) -> Vec<PendingRequest> {
        self.entries
            .drain()
            .map(|(_, mut pending)| {
                pending.cancel_deadline();
                pending
            })
            .collect()
    }

    /// Number of outstanding requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no request is outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
