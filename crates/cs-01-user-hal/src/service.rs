//! User HAL Service - correlates user management requests with HAL events.
//!
//! ```text
//! switch_user() ──→ [IDLE] ──issue──→ [PENDING] ──event──→ [RESOLVED]  STATUS_OK
//!                                         │
//!                                         ├──deadline──→ [TIMED_OUT]  STATUS_HAL_RESPONSE_TIMEOUT
//!                                         └──set fails─→ [TIMED_OUT]  STATUS_HAL_SET_TIMEOUT
//! ```
//!
//! Only one request per response kind may be pending. A second one is
//! answered with `STATUS_CONCURRENT_OPERATION` and never reaches the HAL.

use crate::domain::codec::{self, DecodeError};
use crate::domain::{PendingCallback, PendingRequestTable, ResponseKind};
use crate::error::{UserHalError, UserHalResult};
use crate::metrics;
use car_types::vehicle_property::{
    CREATE_USER, INITIAL_USER_INFO, REMOVE_USER, SWITCH_USER, USER_IDENTIFICATION_ASSOCIATION,
};
use car_types::{
    CreateUserRequest, CreateUserResponse, HalCallback, HalCallbackStatus, HalPropValue,
    InitialUserInfoRequestType, InitialUserInfoResponse, PropertyId, RemoveUserRequest,
    SwitchUserMessageType, SwitchUserRequest, SwitchUserResponse, UserIdentificationGetRequest,
    UserIdentificationResponse, UsersInfo, VehiclePropConfig,
};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};
use vhal_bus::{supported_subset, HalServiceBase, PropertyChannel};

/// Every property this service claims.
const SUPPORTED_PROPERTIES: [PropertyId; 5] = [
    INITIAL_USER_INFO,
    SWITCH_USER,
    CREATE_USER,
    REMOVE_USER,
    USER_IDENTIFICATION_ASSOCIATION,
];

/// Properties required for the service to be usable.
const CORE_PROPERTIES: [PropertyId; 4] = [INITIAL_USER_INFO, SWITCH_USER, CREATE_USER, REMOVE_USER];

/// Properties carrying correlated responses.
const RESPONSE_PROPERTIES: [PropertyId; 3] = [INITIAL_USER_INFO, SWITCH_USER, CREATE_USER];

struct UserHalState {
    next_request_id: i32,
    pending: PendingRequestTable,
    supported: bool,
    association_supported: bool,
}

impl UserHalState {
    fn next_request_id(&mut self) -> i32 {
        let id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        id
    }
}

enum Registration {
    Issued(i32),
    Rejected(PendingCallback),
}

struct Inner {
    channel: Arc<dyn PropertyChannel>,
    state: Mutex<UserHalState>,
}

/// Service talking to the Vehicle HAL user management properties.
///
/// Cheap to clone; clones share the pending request table.
#[derive(Clone)]
pub struct UserHalService {
    inner: Arc<Inner>,
}

impl UserHalService {
    /// Create a service writing requests to `channel`.
    ///
    /// Not usable until [`HalServiceBase::take_properties`] found the user
    /// management properties.
    pub fn new(channel: Arc<dyn PropertyChannel>) -> Self {
        Self {
            inner: Arc::new(Inner {
                channel,
                state: Mutex::new(UserHalState {
                    next_request_id: 1,
                    pending: PendingRequestTable::new(),
                    supported: false,
                    association_supported: false,
                }),
            }),
        }
    }

    /// Whether the HAL supports the user management properties.
    pub fn is_supported(&self) -> bool {
        self.inner.state.lock().supported
    }

    /// Whether the HAL supports USER_IDENTIFICATION_ASSOCIATION.
    pub fn is_user_association_supported(&self) -> bool {
        self.inner.state.lock().association_supported
    }

    /// Number of requests waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// Ask the HAL which user to boot or resume into.
    pub async fn get_initial_user_info(
        &self,
        request_type: InitialUserInfoRequestType,
        timeout_ms: i64,
        users_info: &UsersInfo,
        callback: HalCallback<InitialUserInfoResponse>,
    ) -> UserHalResult<()> {
        self.issue(
            "get_initial_user_info",
            timeout_ms,
            PendingCallback::InitialUserInfo(callback),
            |request_id| codec::encode_initial_user_info(request_id, request_type, users_info),
        )
        .await
    }

    /// Ask the HAL to approve a user switch.
    pub async fn switch_user(
        &self,
        request: &SwitchUserRequest,
        timeout_ms: i64,
        callback: HalCallback<SwitchUserResponse>,
    ) -> UserHalResult<()> {
        self.issue(
            "switch_user",
            timeout_ms,
            PendingCallback::SwitchUser(callback),
            |request_id| codec::encode_switch_user(request_id, request),
        )
        .await
    }

    /// Ask the HAL to create a user.
    pub async fn create_user(
        &self,
        request: &CreateUserRequest,
        timeout_ms: i64,
        callback: HalCallback<CreateUserResponse>,
    ) -> UserHalResult<()> {
        self.issue(
            "create_user",
            timeout_ms,
            PendingCallback::CreateUser(callback),
            |request_id| codec::encode_create_user(request_id, request),
        )
        .await
    }

    /// Tell the HAL a switch it approved has completed.
    ///
    /// Reuses the request id of the original switch; no response is expected.
    pub async fn post_switch_response(&self, request: &SwitchUserRequest) -> UserHalResult<()> {
        self.ensure_supported("post_switch_response")?;
        let mut request = request.clone();
        request.message_type = SwitchUserMessageType::AndroidPostSwitch;
        let value = codec::encode_switch_user(request.request_id, &request);
        debug!(request_id = request.request_id, "Posting switch response");
        self.inner.channel.set_value(value).await?;
        Ok(())
    }

    /// Tell the HAL a user was removed. No response is expected.
    pub async fn remove_user(&self, request: &RemoveUserRequest) -> UserHalResult<()> {
        let request_id = {
            let mut state = self.inner.state.lock();
            if !state.supported {
                return Err(UserHalError::NotSupported {
                    operation: "remove_user",
                });
            }
            state.next_request_id()
        };
        let value = codec::encode_remove_user(request_id, request);
        debug!(
            request_id,
            user_id = request.removed_user_info.user_id,
            "Notifying user removal"
        );
        self.inner.channel.set_value(value).await?;
        Ok(())
    }

    /// Query user identification associations with a synchronous get.
    pub async fn get_user_association(
        &self,
        request: &UserIdentificationGetRequest,
    ) -> UserHalResult<UserIdentificationResponse> {
        if request.association_types.is_empty() {
            return Err(UserHalError::InvalidRequest {
                reason: "no association types".into(),
            });
        }
        let request_id = {
            let mut state = self.inner.state.lock();
            if !state.association_supported {
                return Err(UserHalError::NotSupported {
                    operation: "get_user_association",
                });
            }
            state.next_request_id()
        };

        let value = codec::encode_user_identification_get(request_id, request);
        let raw = self.inner.channel.get_value(value).await?;
        let response = codec::decode_user_identification(&raw)?;
        if response.request_id != request_id {
            return Err(UserHalError::WrongResponse {
                reason: format!(
                    "request id mismatch: sent {request_id}, got {}",
                    response.request_id
                ),
            });
        }
        if response.associations.len() != request.association_types.len() {
            return Err(UserHalError::WrongResponse {
                reason: format!(
                    "asked for {} associations, got {}",
                    request.association_types.len(),
                    response.associations.len()
                ),
            });
        }
        Ok(response)
    }

    fn ensure_supported(&self, operation: &'static str) -> UserHalResult<()> {
        if self.is_supported() {
            Ok(())
        } else {
            Err(UserHalError::NotSupported { operation })
        }
    }

    async fn issue<F>(
        &self,
        operation: &'static str,
        timeout_ms: i64,
        callback: PendingCallback,
        encode: F,
    ) -> UserHalResult<()>
    where
        F: FnOnce(i32) -> HalPropValue,
    {
        let timeout = match u64::try_from(timeout_ms) {
            Ok(ms) if ms > 0 => Duration::from_millis(ms),
            _ => return Err(UserHalError::InvalidTimeout { timeout_ms }),
        };
        let kind = callback.kind();
        let request_id = match self.inner.register(operation, timeout, callback)? {
            Registration::Issued(request_id) => request_id,
            Registration::Rejected(callback) => {
                warn!(kind = %kind, "Request rejected, another one is pending");
                metrics::record_response(kind.as_str(), "STATUS_CONCURRENT_OPERATION");
                callback.fail(HalCallbackStatus::ConcurrentOperation);
                return Ok(());
            }
        };
        metrics::record_request(kind.as_str());

        let value = encode(request_id);
        debug!(request_id, kind = %kind, timeout_ms, value = %value, "Issuing request");
        if let Err(err) = self.inner.channel.set_value(value).await {
            warn!(request_id, kind = %kind, error = %err, "Failed to set request");
            self.inner
                .resolve_failure(request_id, HalCallbackStatus::HalSetTimeout);
        }
        Ok(())
    }
}

impl Inner {
    fn register(
        self: &Arc<Self>,
        operation: &'static str,
        timeout: Duration,
        callback: PendingCallback,
    ) -> UserHalResult<Registration> {
        let mut state = self.state.lock();
        if !state.supported {
            return Err(UserHalError::NotSupported { operation });
        }
        if state.pending.has_kind(callback.kind()) {
            return Ok(Registration::Rejected(callback));
        }

        let request_id = state.next_request_id();
        state.pending.insert(request_id, callback);

        let weak: Weak<Self> = Arc::downgrade(self);
        let deadline = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(inner) = weak.upgrade() {
                inner.on_timeout(request_id);
            }
        });
        state.pending.arm(request_id, deadline.abort_handle());
        Ok(Registration::Issued(request_id))
    }

    fn on_timeout(&self, request_id: i32) {
        // Runs on the deadline task itself, so the deadline is not aborted
        let pending = self.state.lock().pending.take(request_id);
        let Some(pending) = pending else {
            debug!(request_id, "Deadline fired for resolved request");
            return;
        };
        let kind = pending.kind();
        warn!(
            request_id,
            kind = %kind,
            elapsed_ms = pending.created_at.elapsed().as_millis() as u64,
            "Request timed out"
        );
        metrics::record_response(kind.as_str(), "STATUS_HAL_RESPONSE_TIMEOUT");
        pending.callback.fail(HalCallbackStatus::HalResponseTimeout);
    }

    fn resolve_failure(&self, request_id: i32, status: HalCallbackStatus) {
        let pending = self.state.lock().pending.take(request_id);
        if let Some(mut pending) = pending {
            pending.cancel_deadline();
            metrics::record_response(pending.kind().as_str(), &status.to_string());
            pending.callback.fail(status);
        }
    }

    fn on_response(&self, kind: ResponseKind, value: &HalPropValue) {
        let Some(request_id) = codec::request_id_of(value) else {
            warn!(value = %value, "Response without request id");
            metrics::record_dropped_event();
            return;
        };
        let pending = {
            let mut state = self.state.lock();
            match state.pending.kind_of(request_id) {
                Some(expected) if expected != kind => {
                    // Left pending; its own response or the deadline resolves it
                    warn!(
                        request_id,
                        expected = %expected,
                        received = %kind,
                        "Response of the wrong kind dropped"
                    );
                    metrics::record_dropped_event();
                    return;
                }
                _ => state.pending.take(request_id),
            }
        };
        let Some(mut pending) = pending else {
            warn!(request_id, kind = %kind, "No pending request for response");
            metrics::record_dropped_event();
            return;
        };
        pending.cancel_deadline();

        debug!(request_id, kind = %kind, "Resolving request");
        match pending.callback {
            PendingCallback::InitialUserInfo(callback) => {
                complete(kind, callback, codec::decode_initial_user_info(value));
            }
            PendingCallback::SwitchUser(callback) => {
                let decoded = codec::decode_switch_user(value).and_then(|response| {
                    match response.message_type {
                        SwitchUserMessageType::VehicleResponse => Ok(response),
                        other => Err(DecodeError::UnknownCode(car_types::UnknownCode::new(
                            "SwitchUserMessageType",
                            other.into(),
                        ))),
                    }
                });
                complete(kind, callback, decoded);
            }
            PendingCallback::CreateUser(callback) => {
                complete(kind, callback, codec::decode_create_user(value));
            }
        }
    }
}

fn complete<R>(kind: ResponseKind, callback: HalCallback<R>, decoded: Result<R, DecodeError>) {
    match decoded {
        Ok(response) => {
            metrics::record_response(kind.as_str(), "STATUS_OK");
            callback(HalCallbackStatus::Ok, Some(response));
        }
        Err(err) => {
            warn!(kind = %kind, error = %err, "Malformed HAL response");
            metrics::record_response(kind.as_str(), "STATUS_WRONG_HAL_RESPONSE");
            callback(HalCallbackStatus::WrongHalResponse, None);
        }
    }
}

impl HalServiceBase for UserHalService {
    fn name(&self) -> &'static str {
        "UserHalService"
    }

    fn supported_properties(&self) -> &'static [PropertyId] {
        &SUPPORTED_PROPERTIES
    }

    fn take_properties(&self, configs: &[VehiclePropConfig]) -> Vec<PropertyId> {
        let taken: Vec<PropertyId> = supported_subset(&SUPPORTED_PROPERTIES, configs)
            .iter()
            .map(|c| c.prop)
            .collect();
        let supported = CORE_PROPERTIES.iter().all(|p| taken.contains(p));
        let association_supported = taken.contains(&USER_IDENTIFICATION_ASSOCIATION);
        {
            let mut state = self.inner.state.lock();
            state.supported = supported;
            state.association_supported = association_supported;
        }
        if supported {
            info!(association_supported, "User HAL supported");
        } else {
            warn!(taken = taken.len(), "User HAL missing core properties, disabled");
            return Vec::new();
        }
        RESPONSE_PROPERTIES.to_vec()
    }

    fn on_hal_events(&self, values: Vec<HalPropValue>) {
        for value in values {
            match value.prop {
                INITIAL_USER_INFO => self.inner.on_response(ResponseKind::InitialUserInfo, &value),
                SWITCH_USER => {
                    if codec::switch_message_type(&value)
                        == Some(SwitchUserMessageType::VehicleRequest)
                    {
                        info!(value = %value, "Ignoring vehicle-initiated switch request");
                        continue;
                    }
                    self.inner.on_response(ResponseKind::SwitchUser, &value);
                }
                CREATE_USER => self.inner.on_response(ResponseKind::CreateUser, &value),
                _ => debug!(value = %value, "Ignoring event"),
            }
        }
    }

    fn release(&self) {
        let drained = self.inner.state.lock().pending.drain();
        info!(outstanding = drained.len(), "User HAL service released");
        for pending in drained {
            let kind = pending.kind();
            debug!(request_id = pending.request_id, kind = %kind, "Timing out request on release");
            metrics::record_response(kind.as_str(), "STATUS_HAL_RESPONSE_TIMEOUT");
            pending.callback.fail(HalCallbackStatus::HalResponseTimeout);
        }
    }
}
