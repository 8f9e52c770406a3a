#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Authentication bootstrap and token-refresh pipeline for the Warden console.
//!
//! Startup is gated behind an optional identity-provider handshake; afterwards
//! every outbound request is authorized through [`AuthorizedClient`], which
//! renews the token on demand and replays deferred requests exactly once.
//!
//! Layout:
//! - `adapter/`: identity adapter capability, serialized handle, loader, preset-token adapter
//! - `config.rs`: settings, token policy, client descriptor
//! - `console.rs`: console backend endpoints (probe, client config, subject validation)
//! - `context.rs`: process-wide [`AuthContext`]
//! - `gate.rs`: enablement probe and adapter loading
//! - `bootstrap.rs`: bootstrap state machine
//! - `interceptor.rs`: request authorization decorator and directory check
//! - `tasks.rs`: ordered logout task registry
//! - `teardown.rs`: single sign-out wiring
//! - `runtime.rs`: end-to-end orchestration returning a [`Session`]
//! - `error.rs`: error types

pub mod adapter;
pub mod bootstrap;
pub mod config;
pub mod console;
pub mod context;
pub mod error;
pub mod gate;
pub mod interceptor;
mod notify;
pub mod runtime;
pub mod tasks;
pub mod teardown;

pub use adapter::{
    AdapterFactory, AdapterHandle, AdapterLoader, Credentials, HttpAdapterLoader,
    IdentityAdapter, InitOptions, InitToken, PresetTokenAdapter, SessionEvent,
};
pub use bootstrap::{
    AuthBootstrap, BootstrapFailure, BootstrapOutcome, BootstrapReport, BootstrapState,
};
pub use config::{AuthSettings, ClientDescriptor, TokenPolicy};
pub use console::ConsoleClient;
pub use context::AuthContext;
pub use error::{
    AdapterError, AdapterLoadError, AdapterResult, BootstrapError, ConsoleError, GateError,
    GateResult, InterceptError, InterceptResult, RuntimeError, RuntimeResult,
};
pub use gate::{AuthRequirement, BootstrapGate};
pub use interceptor::{AuthorizedClient, DirectoryCheck, PendingRequest};
pub use runtime::{AuthRuntime, Session};
pub use tasks::{LogoutTasks, SessionTask};
pub use teardown::{LocalSession, SessionTeardownCoordinator};
