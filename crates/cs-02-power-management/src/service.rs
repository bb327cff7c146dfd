//! Car Power Management Service - drives the power state machine.
//!
//! ```text
//! vehicle ──AP_POWER_STATE_REQ──→ PendingStateSlot ──→ [handler] ──→ handle_*()
//!                                                          │
//!   listeners ←──on_state_changed── send_power_manager_event()
//!       │
//!       └──finished()──→ CompletionBarrier ──closed──→ ProcessingComplete
//!                                                          │
//!   polling timer ──expired─────────────────────────────→──┘
//! ```
//!
//! Every state handler runs on the power handler task. Listener callbacks are
//! invoked from a snapshot taken under the lock, never with the lock held.

use crate::config::{
    PowerConfig, INITIAL_SUSPEND_RETRY_INTERVAL, MAX_SUSPEND_RETRY_INTERVAL,
    SHUTDOWN_EXTEND_MAX_MS,
};
use crate::domain::{
    check_transition, CompletionBarrier, CpmsState, ListenerHandle, ListenerRegistry,
    ListenerState, PendingStateSlot, PowerStateKind, PowerStateListener, TransitionCheck,
};
use crate::error::{PowerError, PowerResult};
use crate::handler::{PowerHandler, PowerHandlerMessage, PowerMessageProcessor};
use crate::metrics;
use crate::ports::{
    InitialUserBehavior, InitialUserSetter, PowerEventListener, PowerHal, SystemInterface,
    UserHalGateway,
};
use crate::timer::{PollTickTarget, ShutdownPollTimer, TickOutcome};
use async_trait::async_trait;
use car_types::{
    HalCallback, HalCallbackStatus, InitialUserInfoRequestType, InitialUserInfoResponse,
    InitialUserInfoResponseAction, PowerState,
};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Reason passed to the system when rebooting after simulated garage mode.
const GARAGE_MODE_REBOOT_REASON: &str = "GarageModeReboot";

struct PowerServiceState {
    current: Option<CpmsState>,
    pending: PendingStateSlot,
    /// Bumped whenever a state is applied. Tags processing-complete signals.
    generation: u64,
    listeners: ListenerRegistry,
    barrier: CompletionBarrier,
    timer: Option<ShutdownPollTimer>,
    shutdown_on_next_suspend: bool,
    shutdown_on_finish: bool,
    is_booting: bool,
    is_resuming: bool,
    next_wakeup_sec: i32,
    processing_start: Option<Instant>,
    last_sleep_entry: Option<Instant>,
    in_simulated_deep_sleep: bool,
    wake_from_simulated_sleep: bool,
    reboot_after_garage_mode: bool,
}

impl PowerServiceState {
    fn new() -> Self {
        Self {
            current: None,
            pending: PendingStateSlot::new(),
            generation: 0,
            listeners: ListenerRegistry::new(),
            barrier: CompletionBarrier::new(),
            timer: None,
            shutdown_on_next_suspend: false,
            shutdown_on_finish: false,
            is_booting: true,
            is_resuming: false,
            next_wakeup_sec: 0,
            processing_start: None,
            last_sleep_entry: None,
            in_simulated_deep_sleep: false,
            wake_from_simulated_sleep: false,
            reboot_after_garage_mode: false,
        }
    }

    fn release_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            debug!(timer_id = timer.id(), ticks = timer.current_count(), "Polling timer released");
            timer.cancel();
        }
    }

    /// Deep sleep already happened for the current shutdown processing.
    fn already_slept(&self) -> bool {
        !self.shutdown_on_finish
            && matches!(
                (self.last_sleep_entry, self.processing_start),
                (Some(sleep), Some(start)) if sleep > start
            )
    }

    fn in_shutdown_prepare(&self) -> bool {
        matches!(
            self.current.map(|c| c.state),
            Some(PowerStateKind::ShutdownPrepare | PowerStateKind::SimulateSleep)
        )
    }
}

enum SuspendOutcome {
    Resumed,
    Failed,
    /// A new power state arrived while retrying.
    Interrupted,
}

struct Inner {
    config: PowerConfig,
    hal: Arc<dyn PowerHal>,
    system: Arc<dyn SystemInterface>,
    user_setter: Arc<dyn InitialUserSetter>,
    user_hal: Option<Arc<dyn UserHalGateway>>,
    state: Mutex<PowerServiceState>,
    simulated_resume: Notify,
    handler: PowerHandler,
    self_ref: Weak<Inner>,
}

/// Car power management service.
///
/// Cheap to clone; clones share the state machine.
#[derive(Clone)]
pub struct CarPowerManagementService {
    inner: Arc<Inner>,
}

impl CarPowerManagementService {
    /// Create the service. Nothing happens until [`init`](Self::init).
    pub fn new(
        config: PowerConfig,
        hal: Arc<dyn PowerHal>,
        system: Arc<dyn SystemInterface>,
        user_setter: Arc<dyn InitialUserSetter>,
        user_hal: Option<Arc<dyn UserHalGateway>>,
    ) -> Self {
        let inner = Arc::new_cyclic(|self_ref| Inner {
            config,
            hal,
            system,
            user_setter,
            user_hal,
            state: Mutex::new(PowerServiceState::new()),
            simulated_resume: Notify::new(),
            handler: PowerHandler::new(),
            self_ref: self_ref.clone(),
        });
        Self { inner }
    }

    /// Hook into the vehicle, start the handler and request the first state.
    pub fn init(&self) -> PowerResult<()> {
        let listener: Weak<dyn PowerEventListener> = self.inner.self_ref.clone();
        self.inner.handler.start(self.inner.self_ref.clone())?;
        self.inner.hal.set_listener(listener);

        let initial = if self.inner.hal.is_power_state_supported() {
            CpmsState::new(PowerStateKind::WaitForVhal, ListenerState::WaitForVhal)
        } else {
            warn!("Vehicle has no power state support, assuming ON");
            CpmsState::new(PowerStateKind::On, ListenerState::On)
        };
        info!(state = %initial, "Car power management started");
        self.inner.request_state(initial);
        Ok(())
    }

    /// Stop the handler and drop timers, pending states and listeners.
    pub fn release(&self) {
        {
            let mut state = self.inner.state.lock();
            state.release_timer();
            state.current = None;
            state.pending.clear();
            state.barrier.clear();
            state.listeners.clear();
            state.generation += 1;
        }
        self.inner.handler.stop();
        info!("Car power management released");
    }

    /// Register a listener that is only notified.
    pub fn register_listener(&self, listener: Arc<dyn PowerStateListener>) -> ListenerHandle {
        let handle = self.inner.state.lock().listeners.register(listener, false);
        debug!(%handle, "Power state listener registered");
        handle
    }

    /// Register a listener that must call [`finished`](Self::finished) after
    /// SHUTDOWN_PREPARE.
    pub fn register_listener_with_completion(
        &self,
        listener: Arc<dyn PowerStateListener>,
    ) -> ListenerHandle {
        let handle = self.inner.state.lock().listeners.register(listener, true);
        debug!(%handle, "Power state listener with completion registered");
        handle
    }

    /// Remove a listener. An open barrier stops waiting for it.
    pub fn unregister_listener(&self, handle: ListenerHandle) -> PowerResult<()> {
        if self.inner.remove_listener(handle) {
            Ok(())
        } else {
            Err(PowerError::UnknownListener { handle })
        }
    }

    /// A completion listener finished its shutdown preparation.
    pub fn finished(&self, handle: ListenerHandle) -> PowerResult<()> {
        let (closed, waiting) = {
            let mut state = self.inner.state.lock();
            if !state.listeners.contains(handle) {
                return Err(PowerError::UnknownListener { handle });
            }
            let closed = state.barrier.acknowledge(handle);
            (closed, state.barrier.waiting_count())
        };
        debug!(%handle, closed, waiting, "Listener finished");
        if closed {
            self.inner.signal_complete();
        }
        Ok(())
    }

    /// The process hosting `handle` is gone.
    pub fn listener_died(&self, handle: ListenerHandle) {
        if self.inner.remove_listener(handle) {
            warn!(%handle, "Power state listener died");
            metrics::record_listener_death();
        }
    }

    /// Ask the vehicle to wake us up after `seconds` on the next shutdown or
    /// sleep. The earliest request wins.
    pub fn schedule_next_wakeup_time(&self, seconds: i32) -> PowerResult<()> {
        if seconds < 0 {
            return Err(PowerError::InvalidWakeupTime { seconds });
        }
        let mut state = self.inner.state.lock();
        if !self.inner.hal.is_timed_wakeup_allowed() {
            info!(seconds, "Timed wakeup not allowed by the vehicle, ignored");
            state.next_wakeup_sec = 0;
            return Ok(());
        }
        if state.next_wakeup_sec == 0 || state.next_wakeup_sec > seconds {
            state.next_wakeup_sec = seconds;
        }
        debug!(next_wakeup_sec = state.next_wakeup_sec, "Wakeup scheduled");
        Ok(())
    }

    /// Shut down instead of sleeping at the next SHUTDOWN_PREPARE.
    pub fn request_shutdown_on_next_suspend(&self) {
        self.inner.state.lock().shutdown_on_next_suspend = true;
        info!("Shutdown requested for next suspend");
    }

    /// Run a simulated suspend. Listeners see a regular suspend; the hardware
    /// is never suspended. Reboots at the end when `should_reboot`.
    pub fn force_suspend_and_maybe_reboot(&self, should_reboot: bool) {
        {
            let mut state = self.inner.state.lock();
            state.in_simulated_deep_sleep = true;
            state.wake_from_simulated_sleep = false;
            state.reboot_after_garage_mode = should_reboot;
        }
        info!(should_reboot, "Forcing simulated suspend");
        self.inner.request_state(CpmsState::new(
            PowerStateKind::SimulateSleep,
            ListenerState::ShutdownPrepare,
        ));
    }

    /// Wake up from a simulated suspend.
    pub fn force_simulated_resume(&self) {
        self.inner.state.lock().wake_from_simulated_sleep = true;
        self.inner.simulated_resume.notify_one();
        info!("Simulated resume requested");
    }

    /// Current power state, `None` before init or after release.
    #[must_use]
    pub fn power_state(&self) -> Option<CpmsState> {
        self.inner.state.lock().current
    }

    /// Listener state of the current power state.
    #[must_use]
    pub fn listener_state(&self) -> ListenerState {
        self.power_state()
            .map_or(ListenerState::Invalid, |state| state.listener_state)
    }

    /// Whether the shutdown polling timer is running.
    #[must_use]
    pub fn is_shutdown_polling(&self) -> bool {
        self.inner.state.lock().timer.is_some()
    }

    /// Wakeup time that will be sent with the next shutdown or sleep.
    #[must_use]
    pub fn next_wakeup_sec(&self) -> i32 {
        self.inner.state.lock().next_wakeup_sec
    }

    /// Report display brightness (percent) to the vehicle.
    pub async fn send_display_brightness(&self, brightness: i32) {
        self.inner.hal.send_display_brightness(brightness).await;
    }

    /// The vehicle changed display brightness (percent).
    pub fn on_display_brightness_change(&self, brightness: i32) {
        self.inner
            .post(PowerHandlerMessage::DisplayBrightness(brightness));
    }

    /// The main display turned on or off.
    pub fn on_main_display_changed(&self, on: bool) {
        self.inner.post(PowerHandlerMessage::MainDisplayChanged(on));
    }
}

impl Inner {
    fn post(&self, message: PowerHandlerMessage) {
        if let Err(err) = self.handler.post(message) {
            warn!(?message, error = %err, "Power message dropped");
        }
    }

    fn request_state(&self, state: CpmsState) {
        let (version, replaced, superseded) = {
            let mut guard = self.state.lock();
            let replaced = guard.pending.peek().copied();
            let version = guard.pending.push(state);
            (version, replaced, guard.pending.superseded())
        };
        if let Some(replaced) = replaced {
            metrics::record_superseded_state();
            debug!(state = %replaced, superseded, "Unprocessed power state superseded");
        }
        debug!(state = %state, version, "Power state requested");
        self.post(PowerHandlerMessage::PowerStateChange);
    }

    async fn handle_power_state_change(&self) {
        let state = {
            let mut guard = self.state.lock();
            let Some(next) = guard.pending.take_latest() else {
                return;
            };
            match check_transition(
                guard.current.as_ref(),
                &next,
                self.config.refresh_postponable_shutdown_prepare,
            ) {
                TransitionCheck::Apply => {}
                TransitionCheck::AlreadyInEffect => {
                    debug!(state = %next, "Power state already in effect");
                    return;
                }
                TransitionCheck::NotAllowed => {
                    warn!(
                        current = guard.current.map_or("NONE", |c| c.state.name()),
                        requested = %next,
                        "Illegal power state transition dropped"
                    );
                    return;
                }
            }
            guard.release_timer();
            guard.current = Some(next);
            guard.generation += 1;
            next
        };

        info!(state = %state, "Power state changed");
        metrics::record_transition(state.state.name());
        match state.state {
            PowerStateKind::WaitForVhal => self.handle_wait_for_vhal(state).await,
            PowerStateKind::On => self.handle_on().await,
            PowerStateKind::ShutdownPrepare => self.handle_shutdown_prepare(state).await,
            PowerStateKind::SimulateSleep => self.simulate_shutdown_prepare().await,
            PowerStateKind::WaitForFinish => self.handle_wait_for_finish(state).await,
            PowerStateKind::Suspend => self.handle_finish().await,
        }
    }

    async fn handle_wait_for_vhal(&self, state: CpmsState) {
        self.send_power_manager_event(state.listener_state);
        match state.listener_state {
            ListenerState::WaitForVhal => self.hal.send_wait_for_vhal().await,
            ListenerState::ShutdownCancelled => {
                self.state.lock().shutdown_on_next_suspend = false;
                self.hal.send_shutdown_cancel().await;
            }
            ListenerState::SuspendExit => self.hal.send_sleep_exit().await,
            other => debug!(listener_state = ?other, "Nothing to report for WAIT_FOR_VHAL"),
        }
    }

    async fn handle_on(&self) {
        self.system.set_display_state(true);
        self.send_power_manager_event(ListenerState::On);
        self.hal.send_on().await;

        let allow_user_switch = {
            let mut state = self.state.lock();
            let allow = if state.is_booting {
                info!("User switch disallowed while booting");
                false
            } else {
                let allow = !self.config.disable_user_switch_during_resume;
                if !allow {
                    info!(resuming = state.is_resuming, "User switch disallowed while resuming");
                }
                allow
            };
            state.is_booting = false;
            state.is_resuming = false;
            allow
        };
        if allow_user_switch {
            self.switch_user_on_resume_if_necessary();
        }
    }

    /// Ask the user HAL who should be in the foreground after resume.
    ///
    /// The round trip runs off the handler task; its callback runs on the HAL
    /// event dispatcher.
    fn switch_user_on_resume_if_necessary(&self) {
        let replace_guest = !self.config.switch_guest_user_before_sleep;
        let gateway = match &self.user_hal {
            Some(gateway) if gateway.is_supported() => Arc::clone(gateway),
            _ => {
                info!("User HAL not supported, applying default initial user behavior");
                self.user_setter
                    .set(InitialUserBehavior::DefaultBehavior { replace_guest });
                return;
            }
        };

        let setter = Arc::clone(&self.user_setter);
        let callback: HalCallback<InitialUserInfoResponse> = Box::new(move |status, response| {
            setter.set(initial_user_behavior(status, response, replace_guest));
        });
        let fallback = Arc::clone(&self.user_setter);
        let timeout_ms = self.config.user_hal_timeout_ms;
        tokio::spawn(async move {
            if let Err(err) = gateway
                .get_initial_user_info(InitialUserInfoRequestType::Resume, timeout_ms, callback)
                .await
            {
                warn!(error = %err, "Initial user info request failed, applying default behavior");
                fallback.set(InitialUserBehavior::DefaultBehavior { replace_guest });
            }
        });
    }

    async fn handle_shutdown_prepare(&self, state: CpmsState) {
        self.system.set_display_state(false);
        let shutdown_on_finish = {
            let mut guard = self.state.lock();
            guard.shutdown_on_finish = guard.shutdown_on_next_suspend
                || !self.hal.is_deep_sleep_allowed()
                || !self.system.is_system_supporting_deep_sleep()
                || !state.can_sleep;
            guard.processing_start = Some(Instant::now());
            guard.shutdown_on_finish
        };
        info!(
            shutdown_on_finish,
            can_postpone = state.can_postpone,
            "Preparing for shutdown"
        );

        if state.can_postpone {
            self.send_power_manager_event(ListenerState::ShutdownPrepare);
            self.hal.send_shutdown_prepare().await;
            self.do_handle_preprocessing();
        } else {
            self.state.lock().release_timer();
            info!("Shutdown cannot be postponed, shutting down now");
            self.hal.send_shutdown_start(0).await;
            self.system.shutdown();
        }
    }

    async fn simulate_shutdown_prepare(&self) {
        info!("Starting simulated shutdown prepare");
        self.system.set_display_state(false);
        {
            let mut state = self.state.lock();
            state.shutdown_on_finish = false;
            state.processing_start = Some(Instant::now());
        }
        self.send_power_manager_event(ListenerState::ShutdownPrepare);
        self.hal.send_shutdown_prepare().await;
        self.do_handle_preprocessing();
    }

    fn do_handle_preprocessing(&self) {
        let interval = self.config.polling_interval();
        let polling_count = self.config.polling_count();
        {
            let mut state = self.state.lock();
            state.release_timer();
            state.timer = Some(ShutdownPollTimer::start(
                self.self_ref.clone(),
                interval,
                polling_count,
            ));
        }
        debug!(
            interval_ms = interval.as_millis() as u64,
            polling_count, "Shutdown polling started"
        );
        if self.config.switch_guest_user_before_sleep {
            self.user_setter.set(InitialUserBehavior::ReplaceGuestIfNeeded);
        }
    }

    /// Notify every listener of `listener_state`.
    ///
    /// For SHUTDOWN_PREPARE the completion barrier is opened with the
    /// completion pool captured in the same critical section as the snapshot.
    fn send_power_manager_event(&self, listener_state: ListenerState) {
        let (plain, completers, nobody_to_wait_for) = {
            let mut state = self.state.lock();
            let plain = state.listeners.snapshot(false);
            let completers = state.listeners.snapshot(true);
            let nobody_to_wait_for = if listener_state == ListenerState::ShutdownPrepare {
                state.barrier.open(completers.iter().map(|(handle, _)| *handle))
            } else {
                false
            };
            (plain, completers, nobody_to_wait_for)
        };
        debug!(
            ?listener_state,
            listeners = plain.len(),
            completers = completers.len(),
            "Broadcasting power state"
        );

        self.notify_listeners(plain, listener_state);
        self.notify_listeners(completers, listener_state);
        if nobody_to_wait_for {
            self.signal_complete();
        }
    }

    fn notify_listeners(
        &self,
        listeners: Vec<(ListenerHandle, Arc<dyn PowerStateListener>)>,
        listener_state: ListenerState,
    ) {
        for (handle, listener) in listeners {
            if let Err(err) = listener.on_state_changed(listener_state) {
                warn!(%handle, error = %err, "Power state listener unreachable, removing");
                metrics::record_listener_death();
                self.remove_listener(handle);
            }
        }
    }

    /// Returns whether `handle` was registered.
    fn remove_listener(&self, handle: ListenerHandle) -> bool {
        let (found, closed) = {
            let mut state = self.state.lock();
            match state.listeners.unregister(handle) {
                None => (false, false),
                Some(requires_completion) => {
                    (true, requires_completion && state.barrier.acknowledge(handle))
                }
            }
        };
        if closed {
            debug!(%handle, "Barrier closed by listener removal");
            self.signal_complete();
        }
        found
    }

    fn signal_complete(&self) {
        let generation = {
            let state = self.state.lock();
            if !state.in_shutdown_prepare() {
                debug!("Processing complete outside shutdown prepare, ignored");
                return;
            }
            if state.already_slept() {
                info!("Already slept, processing complete ignored");
                return;
            }
            state.generation
        };
        self.post(PowerHandlerMessage::ProcessingComplete { generation });
    }

    fn handle_processing_complete(&self, generation: u64) {
        let listener_state = {
            let mut state = self.state.lock();
            if state.generation != generation {
                debug!(
                    generation,
                    current = state.generation,
                    "Stale processing complete ignored"
                );
                return;
            }
            state.release_timer();
            if state.already_slept() {
                info!("Already slept, processing complete ignored");
                return;
            }
            if state.shutdown_on_finish {
                ListenerState::ShutdownEnter
            } else {
                ListenerState::SuspendEnter
            }
        };
        info!(?listener_state, "Shutdown processing complete");
        self.request_state(CpmsState::new(PowerStateKind::WaitForFinish, listener_state));
    }

    async fn handle_wait_for_finish(&self, state: CpmsState) {
        self.send_power_manager_event(state.listener_state);
        let (wakeup_sec, simulated) = {
            let guard = self.state.lock();
            (guard.next_wakeup_sec, guard.in_simulated_deep_sleep)
        };
        match state.listener_state {
            ListenerState::SuspendEnter => self.hal.send_sleep_entry(wakeup_sec).await,
            ListenerState::ShutdownEnter => self.hal.send_shutdown_start(wakeup_sec).await,
            other => warn!(listener_state = ?other, "Unexpected WAIT_FOR_FINISH listener state"),
        }
        if simulated {
            self.handle_finish().await;
        }
    }

    async fn handle_finish(&self) {
        let (simulated, must_shut_down, force_reboot) = {
            let mut state = self.state.lock();
            let simulated = state.in_simulated_deep_sleep;
            let force_reboot = std::mem::take(&mut state.reboot_after_garage_mode);
            (simulated, state.shutdown_on_finish && !simulated, force_reboot)
        };

        if force_reboot {
            info!("Rebooting after garage mode");
            self.system.reboot(GARAGE_MODE_REBOOT_REASON);
            return;
        }
        if must_shut_down {
            info!("Shutting down");
            self.system.shutdown();
        } else {
            self.do_handle_deep_sleep(simulated).await;
        }
        self.state.lock().shutdown_on_next_suspend = false;
    }

    async fn do_handle_deep_sleep(&self, simulated: bool) {
        self.state.lock().last_sleep_entry = Some(Instant::now());

        let next_listener_state = if simulated {
            info!("Entering simulated deep sleep");
            self.simulate_sleep_by_waiting().await;
            ListenerState::ShutdownCancelled
        } else {
            match self.suspend_with_retries().await {
                SuspendOutcome::Resumed => ListenerState::SuspendExit,
                SuspendOutcome::Interrupted => {
                    info!("Suspend abandoned for a new power state");
                    return;
                }
                SuspendOutcome::Failed => {
                    error!("Unable to enter deep sleep, shutting down");
                    metrics::record_suspend_failure();
                    self.system.shutdown();
                    return;
                }
            }
        };

        {
            let mut state = self.state.lock();
            state.next_wakeup_sec = 0;
            state.is_resuming = true;
            state.in_simulated_deep_sleep = false;
        }
        info!(?next_listener_state, "Resumed from deep sleep");
        self.system.refresh_display_brightness();
        self.request_state(CpmsState::new(PowerStateKind::WaitForVhal, next_listener_state));
    }

    /// Enter deep sleep, retrying with back-off within `max_suspend_wait`.
    async fn suspend_with_retries(&self) -> SuspendOutcome {
        let max_wait = self.config.max_suspend_wait();
        let mut retry_interval = INITIAL_SUSPEND_RETRY_INTERVAL;
        let mut total_wait = Duration::ZERO;
        loop {
            info!("Entering suspend to RAM");
            if self.system.enter_deep_sleep().await {
                return SuspendOutcome::Resumed;
            }
            if total_wait >= max_wait {
                return SuspendOutcome::Failed;
            }
            if self.has_applicable_pending_state() {
                return SuspendOutcome::Interrupted;
            }
            warn!(
                retry_ms = retry_interval.as_millis() as u64,
                "Suspend to RAM failed, retrying"
            );
            tokio::time::sleep(retry_interval).await;
            total_wait += retry_interval;
            retry_interval = (retry_interval * 2).min(MAX_SUSPEND_RETRY_INTERVAL);
        }
    }

    fn has_applicable_pending_state(&self) -> bool {
        let state = self.state.lock();
        state.pending.peek().is_some_and(|next| {
            check_transition(
                state.current.as_ref(),
                next,
                self.config.refresh_postponable_shutdown_prepare,
            ) == TransitionCheck::Apply
        })
    }

    async fn simulate_sleep_by_waiting(&self) {
        loop {
            let woke = std::mem::take(&mut self.state.lock().wake_from_simulated_sleep);
            if woke {
                break;
            }
            self.simulated_resume.notified().await;
        }
        info!("Exiting simulated deep sleep");
    }
}

/// Map the user HAL answer to a local behavior. Anything but a decoded
/// answer falls back to the default.
fn initial_user_behavior(
    status: HalCallbackStatus,
    response: Option<InitialUserInfoResponse>,
    replace_guest: bool,
) -> InitialUserBehavior {
    let fallback = InitialUserBehavior::DefaultBehavior { replace_guest };
    if status != HalCallbackStatus::Ok {
        warn!(%status, "User HAL failed, applying default initial user behavior");
        return fallback;
    }
    let Some(response) = response else {
        warn!("User HAL answered without a response, applying default behavior");
        return fallback;
    };
    match response.action {
        InitialUserInfoResponseAction::Default => fallback,
        InitialUserInfoResponseAction::Switch => InitialUserBehavior::Switch {
            user_id: response.user_to_switch_or_create.user_id,
            replace_guest,
        },
        InitialUserInfoResponseAction::Create => InitialUserBehavior::Create {
            name: response.user_name_to_create,
            flags: response.user_to_switch_or_create.flags,
        },
    }
}

#[async_trait]
impl PowerMessageProcessor for Inner {
    async fn process(&self, message: PowerHandlerMessage) {
        match message {
            PowerHandlerMessage::PowerStateChange => self.handle_power_state_change().await,
            PowerHandlerMessage::DisplayBrightness(brightness) => {
                self.system.set_display_brightness(brightness);
            }
            PowerHandlerMessage::MainDisplayChanged(on) => self.system.set_display_state(on),
            PowerHandlerMessage::ProcessingComplete { generation } => {
                self.handle_processing_complete(generation);
            }
        }
    }
}

#[async_trait]
impl PollTickTarget for Inner {
    async fn on_poll_tick(&self, timer_id: u64) -> bool {
        let (outcome, generation) = {
            let mut state = self.state.lock();
            let Some(timer) = state.timer.as_mut().filter(|t| t.id() == timer_id) else {
                return false;
            };
            let outcome = timer.tick();
            if outcome == TickOutcome::Expired {
                state.release_timer();
            }
            (outcome, state.generation)
        };
        match outcome {
            TickOutcome::Expired => {
                info!("Shutdown polling expired, forcing processing complete");
                self.post(PowerHandlerMessage::ProcessingComplete { generation });
                false
            }
            TickOutcome::Postpone => {
                metrics::record_polling_tick();
                self.hal.send_shutdown_postpone(SHUTDOWN_EXTEND_MAX_MS).await;
                true
            }
        }
    }
}

impl PowerEventListener for Inner {
    fn on_ap_power_state_change(&self, state: PowerState) {
        info!(state = ?state.state, param = state.param, "Power state request from vehicle");
        self.request_state(CpmsState::from_hal(state));
    }

    fn on_display_brightness_change(&self, brightness: i32) {
        self.post(PowerHandlerMessage::DisplayBrightness(brightness));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ListenerGone;
    use car_types::{shutdown_param, UserInfo, VehicleApPowerStateReq};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum HalCall {
        WaitForVhal,
        ShutdownPrepare,
        ShutdownPostpone(i32),
        ShutdownStart(i32),
        SleepEntry(i32),
        SleepExit,
        ShutdownCancel,
        On,
        DisplayBrightness(i32),
    }

    struct FakeHal {
        calls: Mutex<Vec<HalCall>>,
        listener: Mutex<Option<Weak<dyn PowerEventListener>>>,
        deep_sleep_allowed: bool,
        timed_wakeup_allowed: bool,
    }

    impl FakeHal {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                listener: Mutex::new(None),
                deep_sleep_allowed: true,
                timed_wakeup_allowed: true,
            })
        }

        fn without_deep_sleep() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                listener: Mutex::new(None),
                deep_sleep_allowed: false,
                timed_wakeup_allowed: true,
            })
        }

        fn emit(&self, state: VehicleApPowerStateReq, param: i32) {
            let listener = self.listener.lock().as_ref().and_then(Weak::upgrade);
            listener
                .expect("listener installed")
                .on_ap_power_state_change(PowerState::new(state, param));
        }

        fn record(&self, call: HalCall) {
            self.calls.lock().push(call);
        }

        fn calls(&self) -> Vec<HalCall> {
            self.calls.lock().clone()
        }

        fn count(&self, call: &HalCall) -> usize {
            self.calls.lock().iter().filter(|c| *c == call).count()
        }

        fn postpones(&self) -> usize {
            self.calls
                .lock()
                .iter()
                .filter(|c| matches!(c, HalCall::ShutdownPostpone(_)))
                .count()
        }
    }

    #[async_trait]
    impl PowerHal for FakeHal {
        fn set_listener(&self, listener: Weak<dyn PowerEventListener>) {
            *self.listener.lock() = Some(listener);
        }
        fn is_power_state_supported(&self) -> bool {
            true
        }
        fn is_deep_sleep_allowed(&self) -> bool {
            self.deep_sleep_allowed
        }
        fn is_timed_wakeup_allowed(&self) -> bool {
            self.timed_wakeup_allowed
        }
        async fn send_wait_for_vhal(&self) {
            self.record(HalCall::WaitForVhal);
        }
        async fn send_shutdown_prepare(&self) {
            self.record(HalCall::ShutdownPrepare);
        }
        async fn send_shutdown_postpone(&self, postpone_ms: i32) {
            self.record(HalCall::ShutdownPostpone(postpone_ms));
        }
        async fn send_shutdown_start(&self, wakeup_sec: i32) {
            self.record(HalCall::ShutdownStart(wakeup_sec));
        }
        async fn send_sleep_entry(&self, wakeup_sec: i32) {
            self.record(HalCall::SleepEntry(wakeup_sec));
        }
        async fn send_sleep_exit(&self) {
            self.record(HalCall::SleepExit);
        }
        async fn send_shutdown_cancel(&self) {
            self.record(HalCall::ShutdownCancel);
        }
        async fn send_on(&self) {
            self.record(HalCall::On);
        }
        async fn send_display_brightness(&self, brightness: i32) {
            self.record(HalCall::DisplayBrightness(brightness));
        }
    }

    #[derive(Default)]
    struct FakeSystem {
        sleep_fails: AtomicBool,
        sleep_attempts: AtomicUsize,
        shutdowns: AtomicUsize,
        reboots: Mutex<Vec<String>>,
        display_on: Mutex<Option<bool>>,
        brightness: Mutex<Option<i32>>,
    }

    #[async_trait]
    impl SystemInterface for FakeSystem {
        fn is_system_supporting_deep_sleep(&self) -> bool {
            true
        }
        async fn enter_deep_sleep(&self) -> bool {
            self.sleep_attempts.fetch_add(1, Ordering::SeqCst);
            !self.sleep_fails.load(Ordering::SeqCst)
        }
        fn shutdown(&self) {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
        fn reboot(&self, reason: &str) {
            self.reboots.lock().push(reason.to_string());
        }
        fn set_display_state(&self, on: bool) {
            *self.display_on.lock() = Some(on);
        }
        fn set_display_brightness(&self, brightness: i32) {
            *self.brightness.lock() = Some(brightness);
        }
        fn refresh_display_brightness(&self) {}
    }

    #[derive(Default)]
    struct FakeUserSetter {
        behaviors: Mutex<Vec<InitialUserBehavior>>,
    }

    impl InitialUserSetter for FakeUserSetter {
        fn set(&self, behavior: InitialUserBehavior) {
            self.behaviors.lock().push(behavior);
        }
    }

    struct FakeUserHal {
        status: HalCallbackStatus,
        response: Option<InitialUserInfoResponse>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl UserHalGateway for FakeUserHal {
        fn is_supported(&self) -> bool {
            true
        }

        async fn get_initial_user_info(
            &self,
            request_type: InitialUserInfoRequestType,
            _timeout_ms: i64,
            callback: HalCallback<InitialUserInfoResponse>,
        ) -> PowerResult<()> {
            assert_eq!(request_type, InitialUserInfoRequestType::Resume);
            self.calls.fetch_add(1, Ordering::SeqCst);
            callback(self.status, self.response.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingListener {
        states: Mutex<Vec<ListenerState>>,
        dies_on_prepare: bool,
    }

    impl RecordingListener {
        fn dying() -> Arc<Self> {
            Arc::new(Self {
                states: Mutex::new(Vec::new()),
                dies_on_prepare: true,
            })
        }

        fn states(&self) -> Vec<ListenerState> {
            self.states.lock().clone()
        }
    }

    impl PowerStateListener for RecordingListener {
        fn on_state_changed(&self, state: ListenerState) -> Result<(), ListenerGone> {
            if self.dies_on_prepare && state == ListenerState::ShutdownPrepare {
                return Err(ListenerGone {
                    reason: "process died".into(),
                });
            }
            self.states.lock().push(state);
            Ok(())
        }
    }

    struct Fixture {
        service: CarPowerManagementService,
        hal: Arc<FakeHal>,
        system: Arc<FakeSystem>,
        setter: Arc<FakeUserSetter>,
    }

    fn fixture_with(
        config: PowerConfig,
        hal: Arc<FakeHal>,
        user_hal: Option<Arc<dyn UserHalGateway>>,
    ) -> Fixture {
        let system = Arc::new(FakeSystem::default());
        let setter = Arc::new(FakeUserSetter::default());
        let service = CarPowerManagementService::new(
            config,
            hal.clone(),
            system.clone(),
            setter.clone(),
            user_hal,
        );
        service.init().unwrap();
        Fixture {
            service,
            hal,
            system,
            setter,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(PowerConfig::default(), FakeHal::new(), None)
    }

    async fn settle() {
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
    }

    fn kind(f: &Fixture) -> Option<PowerStateKind> {
        f.service.power_state().map(|s| s.state)
    }

    async fn turn_on(f: &Fixture) {
        settle().await;
        f.hal.emit(VehicleApPowerStateReq::On, 0);
        settle().await;
        assert_eq!(kind(f), Some(PowerStateKind::On));
    }

    #[tokio::test]
    async fn test_init_waits_for_vhal() {
        let f = fixture();
        settle().await;

        assert_eq!(kind(&f), Some(PowerStateKind::WaitForVhal));
        assert_eq!(f.hal.calls(), vec![HalCall::WaitForVhal]);
    }

    #[tokio::test]
    async fn test_illegal_transition_dropped() {
        let f = fixture();
        settle().await;
        f.hal.emit(VehicleApPowerStateReq::Finished, 0);
        settle().await;

        assert_eq!(kind(&f), Some(PowerStateKind::WaitForVhal));
        assert_eq!(f.system.sleep_attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_boot_on_does_not_switch_user() {
        let f = fixture();
        turn_on(&f).await;

        assert_eq!(*f.system.display_on.lock(), Some(true));
        assert!(f.hal.calls().contains(&HalCall::On));
        assert!(f.setter.behaviors.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_immediately_skips_polling() {
        let f = fixture();
        turn_on(&f).await;

        f.hal.emit(
            VehicleApPowerStateReq::ShutdownPrepare,
            shutdown_param::SHUTDOWN_IMMEDIATELY,
        );
        settle().await;

        assert!(f.hal.calls().contains(&HalCall::ShutdownStart(0)));
        assert_eq!(f.system.shutdowns.load(Ordering::SeqCst), 1);
        assert!(!f.service.is_shutdown_polling());
        assert_eq!(f.hal.postpones(), 0);
        assert_eq!(*f.system.display_on.lock(), Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_completers_completes_at_once() {
        let f = fixture();
        let listener = Arc::new(RecordingListener::default());
        f.service.register_listener(listener.clone());
        turn_on(&f).await;

        f.hal
            .emit(VehicleApPowerStateReq::ShutdownPrepare, shutdown_param::CAN_SLEEP);
        settle().await;

        let state = f.service.power_state().unwrap();
        assert_eq!(state.state, PowerStateKind::WaitForFinish);
        assert_eq!(state.listener_state, ListenerState::SuspendEnter);
        assert_eq!(f.hal.count(&HalCall::SleepEntry(0)), 1);
        assert!(!f.service.is_shutdown_polling());
        assert_eq!(
            listener.states(),
            vec![
                ListenerState::WaitForVhal,
                ListenerState::On,
                ListenerState::ShutdownPrepare,
                ListenerState::SuspendEnter,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_barrier_waits_for_every_completer() {
        let f = fixture();
        let first = f
            .service
            .register_listener_with_completion(Arc::new(RecordingListener::default()));
        let second = f
            .service
            .register_listener_with_completion(Arc::new(RecordingListener::default()));
        turn_on(&f).await;

        f.hal
            .emit(VehicleApPowerStateReq::ShutdownPrepare, shutdown_param::CAN_SLEEP);
        settle().await;
        assert_eq!(kind(&f), Some(PowerStateKind::ShutdownPrepare));
        assert!(f.service.is_shutdown_polling());

        f.service.finished(first).unwrap();
        settle().await;
        assert_eq!(kind(&f), Some(PowerStateKind::ShutdownPrepare));

        f.service.finished(second).unwrap();
        f.service.finished(second).unwrap();
        settle().await;
        assert_eq!(kind(&f), Some(PowerStateKind::WaitForFinish));
        assert_eq!(f.hal.count(&HalCall::SleepEntry(0)), 1);
        assert!(!f.service.is_shutdown_polling());
    }

    #[tokio::test]
    async fn test_finished_by_unknown_listener_fails() {
        let f = fixture();
        let handle = f
            .service
            .register_listener_with_completion(Arc::new(RecordingListener::default()));
        f.service.unregister_listener(handle).unwrap();

        assert_eq!(
            f.service.finished(handle),
            Err(PowerError::UnknownListener { handle })
        );
        assert_eq!(
            f.service.unregister_listener(handle),
            Err(PowerError::UnknownListener { handle })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_listener_is_removed_from_barrier() {
        let f = fixture();
        let handle = f.service.register_listener_with_completion(RecordingListener::dying());
        turn_on(&f).await;

        f.hal
            .emit(VehicleApPowerStateReq::ShutdownPrepare, shutdown_param::CAN_SLEEP);
        settle().await;

        assert_eq!(kind(&f), Some(PowerStateKind::WaitForFinish));
        assert_eq!(
            f.service.finished(handle),
            Err(PowerError::UnknownListener { handle })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_listener_death_closes_barrier() {
        let f = fixture();
        let alive = f
            .service
            .register_listener_with_completion(Arc::new(RecordingListener::default()));
        let doomed = f
            .service
            .register_listener_with_completion(Arc::new(RecordingListener::default()));
        turn_on(&f).await;

        f.hal
            .emit(VehicleApPowerStateReq::ShutdownPrepare, shutdown_param::CAN_SLEEP);
        settle().await;
        f.service.finished(alive).unwrap();
        settle().await;
        assert_eq!(kind(&f), Some(PowerStateKind::ShutdownPrepare));

        f.service.listener_died(doomed);
        settle().await;
        assert_eq!(kind(&f), Some(PowerStateKind::WaitForFinish));
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_expiry_forces_completion() {
        let config = PowerConfig {
            shutdown_polling_interval_ms: 100,
            debug_build: true,
            garage_mode_duration_override_secs: Some(1),
            ..PowerConfig::default()
        };
        let f = fixture_with(config, FakeHal::new(), None);
        f.service
            .register_listener_with_completion(Arc::new(RecordingListener::default()));
        turn_on(&f).await;

        f.hal
            .emit(VehicleApPowerStateReq::ShutdownPrepare, shutdown_param::CAN_SLEEP);
        tokio::time::sleep(Duration::from_secs(3)).await;
        settle().await;

        assert_eq!(f.hal.postpones(), 11);
        assert!(f
            .hal
            .calls()
            .contains(&HalCall::ShutdownPostpone(SHUTDOWN_EXTEND_MAX_MS)));
        assert_eq!(kind(&f), Some(PowerStateKind::WaitForFinish));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_cycle_resumes_to_wait_for_vhal() {
        let f = fixture();
        turn_on(&f).await;
        f.hal
            .emit(VehicleApPowerStateReq::ShutdownPrepare, shutdown_param::CAN_SLEEP);
        settle().await;

        f.hal.emit(VehicleApPowerStateReq::Finished, 0);
        settle().await;

        let state = f.service.power_state().unwrap();
        assert_eq!(state.state, PowerStateKind::WaitForVhal);
        assert_eq!(state.listener_state, ListenerState::SuspendExit);
        assert_eq!(f.system.sleep_attempts.load(Ordering::SeqCst), 1);
        assert_eq!(f.hal.count(&HalCall::SleepExit), 1);
        assert_eq!(f.system.shutdowns.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_sleep_shuts_down() {
        let config = PowerConfig {
            max_suspend_wait_ms: 50,
            ..PowerConfig::default()
        };
        let f = fixture_with(config, FakeHal::new(), None);
        f.system.sleep_fails.store(true, Ordering::SeqCst);
        turn_on(&f).await;
        f.hal
            .emit(VehicleApPowerStateReq::ShutdownPrepare, shutdown_param::CAN_SLEEP);
        settle().await;

        f.hal.emit(VehicleApPowerStateReq::Finished, 0);
        tokio::time::sleep(Duration::from_secs(1)).await;
        settle().await;

        assert!(f.system.sleep_attempts.load(Ordering::SeqCst) > 1);
        assert_eq!(f.system.shutdowns.load(Ordering::SeqCst), 1);
        assert_eq!(f.hal.count(&HalCall::WaitForVhal), 1);
        assert_eq!(kind(&f), Some(PowerStateKind::Suspend));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_when_vehicle_forbids_sleep() {
        let f = fixture_with(PowerConfig::default(), FakeHal::without_deep_sleep(), None);
        turn_on(&f).await;
        f.hal
            .emit(VehicleApPowerStateReq::ShutdownPrepare, shutdown_param::CAN_SLEEP);
        settle().await;

        assert_eq!(f.service.listener_state(), ListenerState::ShutdownEnter);
        assert_eq!(f.hal.count(&HalCall::ShutdownStart(0)), 1);

        f.hal.emit(VehicleApPowerStateReq::Finished, 0);
        settle().await;
        assert_eq!(f.system.shutdowns.load(Ordering::SeqCst), 1);
        assert_eq!(f.system.sleep_attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_postponable_repeat_dropped_by_default() {
        let f = fixture();
        let listener = Arc::new(RecordingListener::default());
        f.service.register_listener_with_completion(listener.clone());
        turn_on(&f).await;

        f.hal
            .emit(VehicleApPowerStateReq::ShutdownPrepare, shutdown_param::CAN_SLEEP);
        settle().await;
        f.hal
            .emit(VehicleApPowerStateReq::ShutdownPrepare, shutdown_param::CAN_SLEEP);
        settle().await;

        let prepares = listener
            .states()
            .iter()
            .filter(|s| **s == ListenerState::ShutdownPrepare)
            .count();
        assert_eq!(prepares, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_postponable_repeat_refreshes_when_enabled() {
        let config = PowerConfig {
            refresh_postponable_shutdown_prepare: true,
            ..PowerConfig::default()
        };
        let f = fixture_with(config, FakeHal::new(), None);
        let listener = Arc::new(RecordingListener::default());
        let handle = f.service.register_listener_with_completion(listener.clone());
        turn_on(&f).await;

        f.hal
            .emit(VehicleApPowerStateReq::ShutdownPrepare, shutdown_param::CAN_SLEEP);
        settle().await;
        f.hal
            .emit(VehicleApPowerStateReq::ShutdownPrepare, shutdown_param::CAN_SLEEP);
        settle().await;

        let prepares = listener
            .states()
            .iter()
            .filter(|s| **s == ListenerState::ShutdownPrepare)
            .count();
        assert_eq!(prepares, 2);
        assert_eq!(f.hal.count(&HalCall::ShutdownPrepare), 2);
        assert!(f.service.is_shutdown_polling());

        f.service.finished(handle).unwrap();
        settle().await;
        assert_eq!(kind(&f), Some(PowerStateKind::WaitForFinish));
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_suspend_and_resume() {
        let f = fixture();
        let listener = Arc::new(RecordingListener::default());
        f.service.register_listener(listener.clone());
        turn_on(&f).await;

        f.service.force_suspend_and_maybe_reboot(false);
        settle().await;
        assert_eq!(kind(&f), Some(PowerStateKind::WaitForFinish));
        assert_eq!(f.hal.count(&HalCall::SleepEntry(0)), 1);

        f.service.force_simulated_resume();
        settle().await;

        let state = f.service.power_state().unwrap();
        assert_eq!(state.state, PowerStateKind::WaitForVhal);
        assert_eq!(state.listener_state, ListenerState::ShutdownCancelled);
        assert_eq!(f.hal.count(&HalCall::ShutdownCancel), 1);
        assert_eq!(f.system.sleep_attempts.load(Ordering::SeqCst), 0);
        assert_eq!(f.system.shutdowns.load(Ordering::SeqCst), 0);
        assert_eq!(
            &listener.states()[2..],
            &[
                ListenerState::ShutdownPrepare,
                ListenerState::SuspendEnter,
                ListenerState::ShutdownCancelled,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_suspend_with_reboot() {
        let f = fixture();
        turn_on(&f).await;

        f.service.force_suspend_and_maybe_reboot(true);
        settle().await;

        assert_eq!(
            f.system.reboots.lock().clone(),
            vec![GARAGE_MODE_REBOOT_REASON.to_string()]
        );
        assert_eq!(f.system.shutdowns.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wakeup_time_sent_with_shutdown() {
        let f = fixture();
        assert_eq!(
            f.service.schedule_next_wakeup_time(-1),
            Err(PowerError::InvalidWakeupTime { seconds: -1 })
        );
        f.service.schedule_next_wakeup_time(300).unwrap();
        f.service.schedule_next_wakeup_time(100).unwrap();
        f.service.schedule_next_wakeup_time(200).unwrap();
        assert_eq!(f.service.next_wakeup_sec(), 100);

        turn_on(&f).await;
        f.hal.emit(
            VehicleApPowerStateReq::ShutdownPrepare,
            shutdown_param::SHUTDOWN_ONLY,
        );
        settle().await;

        assert_eq!(f.hal.count(&HalCall::ShutdownStart(100)), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_on_next_suspend_overrides_sleep() {
        let f = fixture();
        f.service.request_shutdown_on_next_suspend();
        turn_on(&f).await;

        f.hal
            .emit(VehicleApPowerStateReq::ShutdownPrepare, shutdown_param::CAN_SLEEP);
        settle().await;
        assert_eq!(f.service.listener_state(), ListenerState::ShutdownEnter);
    }

    async fn resume_with_user_hal(
        status: HalCallbackStatus,
        response: Option<InitialUserInfoResponse>,
    ) -> (Fixture, Arc<FakeUserHal>) {
        let user_hal = Arc::new(FakeUserHal {
            status,
            response,
            calls: AtomicUsize::new(0),
        });
        let config = PowerConfig {
            disable_user_switch_during_resume: false,
            ..PowerConfig::default()
        };
        let f = fixture_with(config, FakeHal::new(), Some(user_hal.clone()));
        turn_on(&f).await;
        f.hal
            .emit(VehicleApPowerStateReq::ShutdownPrepare, shutdown_param::CAN_SLEEP);
        settle().await;
        f.hal.emit(VehicleApPowerStateReq::Finished, 0);
        settle().await;
        turn_on(&f).await;
        settle().await;
        (f, user_hal)
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_switches_to_user_hal_choice() {
        let response = InitialUserInfoResponse {
            request_id: 1,
            action: InitialUserInfoResponseAction::Switch,
            user_to_switch_or_create: UserInfo::new(42, 0),
            user_locales: String::new(),
            user_name_to_create: String::new(),
        };
        let (f, user_hal) = resume_with_user_hal(HalCallbackStatus::Ok, Some(response)).await;

        assert_eq!(user_hal.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            f.setter.behaviors.lock().clone(),
            vec![InitialUserBehavior::Switch {
                user_id: 42,
                replace_guest: true
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_falls_back_on_timeout() {
        let (f, _) = resume_with_user_hal(HalCallbackStatus::HalResponseTimeout, None).await;

        assert_eq!(
            f.setter.behaviors.lock().clone(),
            vec![InitialUserBehavior::DefaultBehavior {
                replace_guest: true
            }]
        );
    }

    #[tokio::test]
    async fn test_display_messages_reach_system() {
        let f = fixture();
        f.service.on_display_brightness_change(40);
        f.service.on_main_display_changed(false);
        f.service.send_display_brightness(70).await;
        settle().await;

        assert_eq!(*f.system.brightness.lock(), Some(40));
        assert_eq!(*f.system.display_on.lock(), Some(false));
        assert!(f.hal.calls().contains(&HalCall::DisplayBrightness(70)));
    }

    #[tokio::test]
    async fn test_release_stops_everything() {
        let f = fixture();
        f.service.register_listener(Arc::new(RecordingListener::default()));
        settle().await;

        f.service.release();
        settle().await;
        assert_eq!(f.service.power_state(), None);
        f.hal.emit(VehicleApPowerStateReq::On, 0);
        settle().await;
        assert_eq!(f.service.power_state(), None);
    }
}
