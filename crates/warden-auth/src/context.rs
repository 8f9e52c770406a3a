//! Process-wide authentication context.

use crate::adapter::AdapterHandle;
use crate::config::ClientDescriptor;

/// Whether single sign-on is active and, if so, the adapter serving it.
///
/// Created once by the gate and shared behind an `Arc`; an enabled context
/// always carries its adapter.
#[derive(Debug, Clone)]
pub struct AuthContext {
    sso: Option<(AdapterHandle, ClientDescriptor)>,
}

impl AuthContext {
    /// Context for a console that does not require single sign-on.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { sso: None }
    }

    /// Context for a console that requires single sign-on.
    #[must_use]
    pub const fn enabled(adapter: AdapterHandle, descriptor: ClientDescriptor) -> Self {
        Self {
            sso: Some((adapter, descriptor)),
        }
    }

    /// Whether single sign-on is required.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.sso.is_some()
    }

    /// Adapter handle, present iff enabled.
    #[must_use]
    pub fn adapter(&self) -> Option<&AdapterHandle> {
        self.sso.as_ref().map(|(adapter, _)| adapter)
    }

    /// Client descriptor the adapter was built from.
    #[must_use]
    pub fn descriptor(&self) -> Option<&ClientDescriptor> {
        self.sso.as_ref().map(|(_, descriptor)| descriptor)
    }
}
