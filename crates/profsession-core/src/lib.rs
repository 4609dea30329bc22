//! profsession-core — profiling session manager.
//!
//! Provides:
//! - `session` — `ProfilerSession`, the orchestrator of one profiling run
//! - `lock` — process-wide exclusivity (`ProfilerGate`, `ProfilerLock`)
//! - `plugin` — the `CollectorPlugin` interface implemented by collectors
//! - `factory` — `CollectorFactory` and the `PluginRegistry` of constructors
//! - `options` — `ProfileOptions` and their resolution rules
//! - `xspace` — the trace artifact collectors append to
//! - `post_process` — timestamp normalization of a collected trace
//! - `mock` — recording plugins for tests
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//! use profsession_core::mock::{PluginJournal, RecordingPlugin};
//! use profsession_core::{
//!     CollectorPlugin, ProfileOptions, ProfilerGate, ProfilerSession, SessionContext, XSpace,
//! };
//!
//! let journal = PluginJournal::new();
//! let j = journal.clone();
//! let factory = move |_: &ProfileOptions| -> Vec<Box<dyn CollectorPlugin>> {
//!     vec![Box::new(RecordingPlugin::new("host", &j))]
//! };
//! let context = SessionContext::default()
//!     .with_gate(ProfilerGate::new())
//!     .with_factory(Arc::new(factory));
//!
//! let session = ProfilerSession::create_with(&ProfileOptions::default(), context);
//! assert!(session.status().is_ok());
//!
//! let mut space = XSpace::default();
//! session.collect_data(&mut space).unwrap();
//! assert_eq!(space.event_count(), 1);
//! ```

pub mod clock;
pub mod error;
pub mod factory;
pub mod lock;
pub mod mock;
pub mod options;
pub mod plugin;
pub mod post_process;
pub mod session;
pub mod xspace;

pub use error::{IgnoreError, ProfilerError};
pub use factory::{CollectorFactory, PluginRegistry};
pub use lock::{ProfilerGate, ProfilerLock};
pub use options::{DeviceType, ProfileOptions};
pub use plugin::CollectorPlugin;
pub use session::{Platform, ProfilerSession, SessionContext};
pub use xspace::{XEvent, XLine, XPlane, XSpace, XStat, XStatValue};
