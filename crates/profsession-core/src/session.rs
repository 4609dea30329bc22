//! Profiling session: one exclusive profiling run.
//!
//! A session is started by its constructor and ends either with
//! [`ProfilerSession::collect_data`] or when it is dropped:
//!
//! ```text
//!   create ──► acquire lock ──► (delay) ──► create plugins ──► start each
//!      │             │
//!      │             └─ lock held elsewhere ─► Failed (status frozen)
//!      └─ unsupported platform ─────────────► Failed (status frozen)
//!
//!   Running ──collect_data──► stop each ─► collect each ─► release lock ─► Collected
//!   Running ──drop──────────► stop each ─► release lock
//! ```
//!
//! Every operation that touches plugins or status runs under one mutex, so a
//! session may be shared between threads.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::clock;
use crate::error::{IgnoreError, ProfilerError};
use crate::factory::{CollectorFactory, PluginRegistry};
use crate::lock::{ProfilerGate, ProfilerLock};
use crate::options::ProfileOptions;
use crate::plugin::CollectorPlugin;
use crate::post_process::post_process_single_host_xspace;
use crate::xspace::XSpace;

const UNSUPPORTED_MESSAGE: &str = "Profiler is unimplemented for this platform.";

/// Whether profiling is available on the running target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Supported,
    /// Sessions fail immediately without touching the lock or any plugin.
    Unsupported,
}

impl Platform {
    /// Capability of the build target: mobile and wasm targets are unsupported.
    pub const fn current() -> Self {
        if cfg!(any(
            target_os = "android",
            target_os = "ios",
            target_family = "wasm"
        )) {
            Platform::Unsupported
        } else {
            Platform::Supported
        }
    }
}

/// Collaborators of a session.
///
/// The default context uses the process-wide gate and plugin registry.
#[derive(Clone)]
pub struct SessionContext {
    gate: ProfilerGate,
    factory: Arc<dyn CollectorFactory>,
    platform: Platform,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self {
            gate: ProfilerGate::global(),
            factory: PluginRegistry::global(),
            platform: Platform::current(),
        }
    }
}

impl SessionContext {
    /// Uses `gate` as the lock domain.
    pub fn with_gate(mut self, gate: ProfilerGate) -> Self {
        self.gate = gate;
        self
    }

    /// Uses `factory` to create the plugin set.
    pub fn with_factory(mut self, factory: Arc<dyn CollectorFactory>) -> Self {
        self.factory = factory;
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Failed,
    Running,
    Collected,
}

struct SessionState {
    /// Frozen at construction.
    status: Result<(), ProfilerError>,
    phase: Phase,
    options: ProfileOptions,
    lock: ProfilerLock,
    profilers: Vec<Box<dyn CollectorPlugin>>,
    /// Anchor for post-processing; 0 for failed sessions.
    start_time_ns: i64,
}

impl SessionState {
    fn failed(options: ProfileOptions, error: ProfilerError) -> Self {
        Self {
            status: Err(error),
            phase: Phase::Failed,
            options,
            lock: ProfilerLock::released(),
            profilers: Vec::new(),
            start_time_ns: 0,
        }
    }

    fn stop_all(&mut self) {
        for profiler in &mut self.profilers {
            profiler.stop().ignore_error(profiler.name(), "stop");
        }
    }

    fn collect_all(&mut self, space: &mut XSpace) {
        for profiler in &mut self.profilers {
            profiler
                .collect_data(space)
                .ignore_error(profiler.name(), "collect");
        }
    }
}

/// One exclusive profiling run.
pub struct ProfilerSession {
    state: Mutex<SessionState>,
}

impl ProfilerSession {
    /// Starts a session with the default context.
    pub fn create(options: &ProfileOptions) -> Self {
        Self::create_with(options, SessionContext::default())
    }

    /// Starts a session.
    ///
    /// Never fails outright: lock contention and unsupported platforms are
    /// reported by [`status`](Self::status). If `start_timestamp_ns` lies in the
    /// future this blocks the calling thread until then.
    pub fn create_with(options: &ProfileOptions, context: SessionContext) -> Self {
        let options = options.resolve();

        if context.platform == Platform::Unsupported {
            debug!("{}", UNSUPPORTED_MESSAGE);
            return Self::from_state(SessionState::failed(
                options,
                ProfilerError::PlatformUnsupported(UNSUPPORTED_MESSAGE.to_string()),
            ));
        }

        let lock = match context.gate.acquire() {
            Ok(lock) => lock,
            Err(e) => {
                warn!(error = %e, "profiler session not started");
                return Self::from_state(SessionState::failed(options, e));
            }
        };

        info!("profiler session initializing");
        if options.start_timestamp_ns > 0 {
            let delay_ns = options.start_timestamp_ns - clock::now_nanos();
            if delay_ns < 0 {
                warn!(
                    late_ns = -delay_ns,
                    "profiling is late and will start immediately"
                );
            } else {
                info!(delay_ns, "delaying start of profiler session");
                clock::sleep_for_nanos(delay_ns);
            }
        }

        let start_time_ns = clock::now_nanos();
        debug_assert!(lock.active());

        let mut profilers = context.factory.create(&options);
        for profiler in &mut profilers {
            if let Err(e) = profiler.start() {
                warn!(
                    profiler = profiler.name(),
                    error = %e,
                    "encountered error while starting profiler"
                );
            }
        }
        info!(
            profilers = profilers.len(),
            start_time_ns, "profiler session started"
        );

        Self::from_state(SessionState {
            status: Ok(()),
            phase: Phase::Running,
            options,
            lock,
            profilers,
            start_time_ns,
        })
    }

    fn from_state(state: SessionState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the status frozen at construction.
    pub fn status(&self) -> Result<(), ProfilerError> {
        self.state().status.clone()
    }

    /// Stops all plugins, appends their data to `space` and releases the lock.
    ///
    /// Returns the construction error of a failed session without touching
    /// `space`; on an unsupported platform that is
    /// [`ProfilerError::PlatformUnsupported`], not `Ok(())`. Otherwise succeeds
    /// even if every plugin failed. Calls after the first successful one return
    /// `Ok(())` and do nothing.
    pub fn collect_data(&self, space: &mut XSpace) -> Result<(), ProfilerError> {
        let start_time_ns = {
            let mut state = self.state();
            state.status.clone()?;
            if state.phase == Phase::Collected {
                debug!("profiler session already collected");
                return Ok(());
            }

            info!("profiler session collecting data");
            state.stop_all();
            state.collect_all(space);
            state.phase = Phase::Collected;
            // Allow another session to start.
            state.lock.release_if_active();
            state.start_time_ns
        };

        post_process_single_host_xspace(space, start_time_ns);
        Ok(())
    }

    /// Anchor timestamp recorded after the start delay. `None` if the session
    /// failed to start.
    pub fn start_time_ns(&self) -> Option<i64> {
        let state = self.state();
        (state.phase != Phase::Failed).then_some(state.start_time_ns)
    }

    /// The resolved options of this session.
    pub fn options(&self) -> ProfileOptions {
        self.state().options.clone()
    }

    pub fn plugin_count(&self) -> usize {
        self.state().profilers.len()
    }
}

impl Drop for ProfilerSession {
    fn drop(&mut self) {
        let state = self
            .state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if state.phase == Phase::Running {
            info!("profiler session tear down");
            state.stop_all();
        }
        // Allow another session to start.
        state.lock.release_if_active();
    }
}

impl std::fmt::Debug for ProfilerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("ProfilerSession")
            .field("status", &state.status)
            .field("phase", &state.phase)
            .field("profilers", &state.profilers.len())
            .field("start_time_ns", &state.start_time_ns)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{PluginJournal, RECORDING_PLANE, RecordingPlugin};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::{Duration, Instant};

    /// Factory creating one recording plugin per name; names starting with
    /// `bad` fail to start. Also returns the number of `create` calls.
    fn recording_factory(
        journal: &PluginJournal,
        names: &'static [&'static str],
    ) -> (Arc<dyn CollectorFactory>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let j = journal.clone();
        let factory = move |_: &ProfileOptions| -> Vec<Box<dyn CollectorPlugin>> {
            c.fetch_add(1, Ordering::SeqCst);
            names
                .iter()
                .map(|name| {
                    let plugin = RecordingPlugin::new(*name, &j);
                    let plugin = if name.starts_with("bad") {
                        plugin.failing_start()
                    } else {
                        plugin
                    };
                    Box::new(plugin) as Box<dyn CollectorPlugin>
                })
                .collect()
        };
        let factory: Arc<dyn CollectorFactory> = Arc::new(factory);
        (factory, calls)
    }

    fn context(gate: &ProfilerGate, factory: Arc<dyn CollectorFactory>) -> SessionContext {
        SessionContext::default()
            .with_gate(gate.clone())
            .with_factory(factory)
            .with_platform(Platform::Supported)
    }

    fn start_default(gate: &ProfilerGate, factory: Arc<dyn CollectorFactory>) -> ProfilerSession {
        ProfilerSession::create_with(&ProfileOptions::default(), context(gate, factory))
    }

    #[test]
    fn default_options_scenario() {
        let gate = ProfilerGate::new();
        let journal = PluginJournal::new();
        let (factory, _) = recording_factory(&journal, &["host", "device"]);

        let session = start_default(&gate, factory);
        assert!(session.status().is_ok());
        assert_eq!(session.plugin_count(), 2);
        assert!(!session.options().include_dataset_ops);
        assert_eq!(session.options().version, 1);

        let mut space = XSpace::default();
        assert!(session.collect_data(&mut space).is_ok());
        let plane = space.find_plane(RECORDING_PLANE).unwrap();
        assert!(plane.find_line("host").is_some());
        assert!(plane.find_line("device").is_some());

        assert!(session.status().is_ok());
    }

    #[test]
    fn second_session_observes_lock_unavailable() {
        let gate = ProfilerGate::new();
        let journal = PluginJournal::new();
        let (factory, _) = recording_factory(&journal, &["host"]);
        let first = start_default(&gate, factory);
        assert!(first.status().is_ok());

        let other_journal = PluginJournal::new();
        let (factory, calls) = recording_factory(&other_journal, &["host"]);
        let second = start_default(&gate, factory);

        let err = second.status().unwrap_err();
        assert!(err.is_lock_unavailable());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(second.plugin_count(), 0);
        assert_eq!(second.start_time_ns(), None);
        assert!(other_journal.is_empty());

        let mut space = XSpace::default();
        space
            .find_or_add_plane("/host:existing")
            .find_or_add_line(0, "main", 5)
            .add_event("before", 0, 1);
        let before = space.clone();
        assert_eq!(second.collect_data(&mut space), Err(err));
        assert_eq!(space, before);

        // The failed session must not release the first session's lock.
        drop(second);
        assert!(gate.has_active_session());
    }

    #[test]
    fn collect_data_releases_lock() {
        let gate = ProfilerGate::new();
        let journal = PluginJournal::new();
        let (factory, _) = recording_factory(&journal, &["host"]);

        let session = start_default(&gate, factory.clone());
        assert!(gate.has_active_session());
        session.collect_data(&mut XSpace::default()).unwrap();
        assert!(!gate.has_active_session());

        let next = start_default(&gate, factory);
        assert!(next.status().is_ok());
    }

    #[test]
    fn drop_stops_plugins_and_releases_lock() {
        let gate = ProfilerGate::new();
        let journal = PluginJournal::new();
        let (factory, _) = recording_factory(&journal, &["host", "device"]);

        let session = start_default(&gate, factory.clone());
        drop(session);

        assert_eq!(journal.phase("stop"), vec!["host:stop", "device:stop"]);
        assert!(journal.phase("collect").is_empty());
        assert!(!gate.has_active_session());
        let next = start_default(&gate, factory);
        assert!(next.status().is_ok());
    }

    #[test]
    fn drop_after_collect_is_a_no_op() {
        let gate = ProfilerGate::new();
        let journal = PluginJournal::new();
        let (factory, _) = recording_factory(&journal, &["host"]);

        let session = start_default(&gate, factory);
        session.collect_data(&mut XSpace::default()).unwrap();

        // Another session takes the lock before the first one is dropped.
        let other = gate.acquire().unwrap();
        drop(session);

        assert!(other.active());
        assert!(gate.has_active_session());
        assert_eq!(journal.phase("stop"), vec!["host:stop"]);
    }

    #[test]
    fn repeated_collect_is_a_no_op() {
        let gate = ProfilerGate::new();
        let journal = PluginJournal::new();
        let (factory, _) = recording_factory(&journal, &["host"]);
        let session = start_default(&gate, factory);

        let mut first = XSpace::default();
        session.collect_data(&mut first).unwrap();
        let mut second = XSpace::default();
        assert!(session.collect_data(&mut second).is_ok());

        assert_eq!(first.event_count(), 1);
        assert_eq!(second, XSpace::default());
        assert_eq!(journal.phase("collect").len(), 1);
    }

    #[test]
    fn plugins_run_in_creation_order() {
        let gate = ProfilerGate::new();
        let journal = PluginJournal::new();
        let (factory, _) = recording_factory(&journal, &["a", "b", "c"]);
        let session = start_default(&gate, factory);
        session.collect_data(&mut XSpace::default()).unwrap();

        assert_eq!(
            journal.entries(),
            vec![
                "a:start", "b:start", "c:start", "a:stop", "b:stop", "c:stop", "a:collect",
                "b:collect", "c:collect",
            ]
        );
    }

    #[test]
    fn partial_start_failure_keeps_session_ok() {
        let gate = ProfilerGate::new();
        let journal = PluginJournal::new();
        let (factory, _) = recording_factory(&journal, &["host", "bad_device", "python"]);
        let session = start_default(&gate, factory);
        assert!(session.status().is_ok());

        let mut space = XSpace::default();
        assert!(session.collect_data(&mut space).is_ok());

        let plane = space.find_plane(RECORDING_PLANE).unwrap();
        assert!(plane.find_line("host").is_some());
        assert!(plane.find_line("python").is_some());
        assert!(plane.find_line("bad_device").is_none());
        assert_eq!(space.event_count(), 2);
        assert_eq!(journal.phase("stop").len(), 3);
    }

    #[test]
    fn stop_and_collect_failures_are_swallowed() {
        let gate = ProfilerGate::new();
        let journal = PluginJournal::new();
        let j = journal.clone();
        let factory = move |_: &ProfileOptions| -> Vec<Box<dyn CollectorPlugin>> {
            vec![
                Box::new(RecordingPlugin::new("stuck", &j).failing_stop()),
                Box::new(RecordingPlugin::new("lossy", &j).failing_collect()),
                Box::new(RecordingPlugin::new("host", &j)),
            ]
        };
        let session = start_default(&gate, Arc::new(factory));

        let mut space = XSpace::default();
        assert!(session.collect_data(&mut space).is_ok());
        assert!(!gate.has_active_session());

        let plane = space.find_plane(RECORDING_PLANE).unwrap();
        assert!(plane.find_line("host").is_some());
        assert!(plane.find_line("lossy").is_none());
        assert_eq!(journal.phase("collect").len(), 3);
    }

    #[test]
    fn all_plugins_failing_still_collects_ok() {
        let gate = ProfilerGate::new();
        let journal = PluginJournal::new();
        let (factory, _) = recording_factory(&journal, &["bad_a", "bad_b"]);
        let session = start_default(&gate, factory);

        let mut space = XSpace::default();
        assert!(session.collect_data(&mut space).is_ok());
        assert_eq!(space.event_count(), 0);
    }

    #[test]
    fn future_start_timestamp_delays_start() {
        let gate = ProfilerGate::new();
        let journal = PluginJournal::new();
        let (factory, _) = recording_factory(&journal, &["host"]);

        let target = clock::now_nanos() + 50_000_000;
        let options = ProfileOptions::default_options().start_at(target);
        let started = Instant::now();
        let session = ProfilerSession::create_with(&options, context(&gate, factory));

        assert!(started.elapsed() >= Duration::from_millis(40));
        assert!(session.start_time_ns().unwrap() >= target);
        // Plugins are started after the delay.
        assert_eq!(journal.phase("start"), vec!["host:start"]);
    }

    #[test]
    fn past_start_timestamp_does_not_block() {
        let gate = ProfilerGate::new();
        let journal = PluginJournal::new();
        let (factory, _) = recording_factory(&journal, &["host"]);

        let options =
            ProfileOptions::default_options().start_at(clock::now_nanos() - 10_000_000_000);
        let started = Instant::now();
        let session = ProfilerSession::create_with(&options, context(&gate, factory));

        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(session.status().is_ok());
    }

    #[test]
    fn unversioned_options_ignore_start_timestamp() {
        let gate = ProfilerGate::new();
        let journal = PluginJournal::new();
        let (factory, _) = recording_factory(&journal, &[]);

        let options = ProfileOptions::default().start_at(clock::now_nanos() + 60_000_000_000);
        let started = Instant::now();
        let session = ProfilerSession::create_with(&options, context(&gate, factory));

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(session.options().start_timestamp_ns, 0);
    }

    #[test]
    fn unsupported_platform_skips_everything() {
        let gate = ProfilerGate::new();
        let journal = PluginJournal::new();
        let (factory, calls) = recording_factory(&journal, &["host"]);
        let session = ProfilerSession::create_with(
            &ProfileOptions::default(),
            context(&gate, factory).with_platform(Platform::Unsupported),
        );

        let err = session.status().unwrap_err();
        assert!(err.is_platform_unsupported());
        assert!(!gate.has_active_session());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let mut space = XSpace::default();
        assert_eq!(session.collect_data(&mut space), Err(err));
        assert_eq!(space, XSpace::default());
        drop(session);
        assert!(journal.is_empty());
    }

    #[test]
    fn collected_timestamps_are_relative_to_start() {
        let gate = ProfilerGate::new();
        let journal = PluginJournal::new();
        let (factory, _) = recording_factory(&journal, &["host"]);
        let session = start_default(&gate, factory);

        let mut space = XSpace::default();
        space
            .find_or_add_plane("/host:existing")
            .find_or_add_line(0, "main", 0)
            .add_event("before", 0, 1);
        session.collect_data(&mut space).unwrap();

        assert_eq!(space.planes[0].name, "/host:existing");
        let line = space
            .find_plane(RECORDING_PLANE)
            .unwrap()
            .find_line("host")
            .unwrap();
        assert!(line.timestamp_ns >= 0);
        assert!(line.timestamp_ns < 60_000_000_000);
    }

    #[test]
    fn concurrent_collect_runs_one_pass() {
        let gate = ProfilerGate::new();
        let journal = PluginJournal::new();
        let (factory, _) = recording_factory(&journal, &["a", "b", "c"]);
        let session = Arc::new(ProfilerSession::create_with(
            &ProfileOptions::default(),
            context(&gate, factory),
        ));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let session = Arc::clone(&session);
                thread::spawn(move || {
                    let mut space = XSpace::default();
                    assert!(session.status().is_ok());
                    session.collect_data(&mut space).unwrap();
                    assert!(session.status().is_ok());
                    space.event_count()
                })
            })
            .collect();
        let events: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(events, 3);
        assert_eq!(journal.phase("stop").len(), 3);
        assert_eq!(journal.phase("collect").len(), 3);
        assert!(!gate.has_active_session());
    }

    #[test]
    fn default_context_uses_global_gate() {
        let session = ProfilerSession::create(&ProfileOptions::default());
        if Platform::current() == Platform::Supported {
            assert!(session.status().is_ok());
            assert!(ProfilerGate::global().has_active_session());
            drop(session);
            assert!(!ProfilerGate::global().has_active_session());
        } else {
            assert!(session.status().unwrap_err().is_platform_unsupported());
        }
    }

    #[test]
    fn debug_shows_status() {
        let gate = ProfilerGate::new();
        let journal = PluginJournal::new();
        let (factory, _) = recording_factory(&journal, &[]);
        let session = start_default(&gate, factory);
        let debug = format!("{:?}", session);
        assert!(debug.contains("Running"));
        assert!(debug.contains("Ok(())"));
    }
}
