//! Intercept events, handler registration and references.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use tether_protocol::{Direction, Headers, Identifier, Packet};

use crate::error::Result;
use crate::Extension;

/// The outcome of an intercept handler. Errors are wrapped with the
/// handler's message context and surfaced through the extension.
pub type HandlerResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

pub(crate) type InterceptHandler = Arc<dyn Fn(&mut Intercept) -> HandlerResult + Send + Sync>;

/// One intercepted packet, shared mutably by every handler it is
/// dispatched to.
pub struct Intercept {
    /// The intercepted packet. Mutations are re-serialized and returned
    /// to the host after dispatch.
    pub packet: Packet,
    dir: Direction,
    sequence: u32,
    blocked: bool,
    dereg: bool,
    headers: Arc<RwLock<Headers>>,
}

impl Intercept {
    pub(crate) fn new(
        packet: Packet,
        dir: Direction,
        sequence: u32,
        blocked: bool,
        headers: Arc<RwLock<Headers>>,
    ) -> Self {
        Self {
            packet,
            dir,
            sequence,
            blocked,
            dereg: false,
            headers,
        }
    }

    /// The direction of the intercepted message.
    pub fn dir(&self) -> Direction {
        self.dir
    }

    /// The incremental sequence number assigned by the host.
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Prevents the intercepted message from reaching its destination.
    pub fn block(&mut self) {
        self.blocked = true;
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    /// Deregisters the handler currently being invoked.
    pub fn deregister(&mut self) {
        self.dereg = true;
    }

    pub(crate) fn take_dereg(&mut self) -> bool {
        std::mem::take(&mut self.dereg)
    }

    /// Reports whether the intercepted packet currently has the header
    /// bound to `identifier`.
    pub fn is(&self, identifier: &Identifier) -> bool {
        self.headers.read().is(self.packet.header, identifier)
    }

    /// The name bound to the intercepted packet's header, if any.
    pub fn name(&self) -> Option<String> {
        self.headers
            .read()
            .name_of(self.packet.header)
            .map(str::to_owned)
    }
}

/// A registered intercept handler with the identifiers it listens on.
pub(crate) struct Registration {
    pub(crate) identifiers: Vec<Identifier>,
    pub(crate) handler: InterceptHandler,
    pub(crate) transient: bool,
    pub(crate) deregistered: AtomicBool,
}

impl Registration {
    pub(crate) fn is_deregistered(&self) -> bool {
        self.deregistered.load(Ordering::SeqCst)
    }

    pub(crate) fn set_deregistered(&self) {
        self.deregistered.store(true, Ordering::SeqCst);
    }
}

/// A global handler, invoked for every intercept before per-header
/// handlers.
pub(crate) struct GlobalRegistration {
    pub(crate) handler: InterceptHandler,
    pub(crate) deregistered: AtomicBool,
}

/// Configures an intercept registration for a set of identifiers.
///
/// Registrations are persistent by default: they survive disconnects and
/// are re-bound to the (possibly different) header values supplied by the
/// next connection. A [`transient`](Self::transient) registration lives
/// for one connection only.
#[must_use = "call with() to register the handler"]
pub struct InterceptBuilder {
    pub(crate) ext: Extension,
    pub(crate) identifiers: Vec<Identifier>,
    pub(crate) transient: bool,
}

impl InterceptBuilder {
    /// Marks the registration as transient: it is removed on disconnect
    /// and not replayed on the next connection.
    pub fn transient(mut self) -> Self {
        self.transient = true;
        self
    }

    /// Registers `handler` for the configured identifiers.
    ///
    /// While a connection is active the identifiers are resolved
    /// immediately; an unknown name is an error. Before the first
    /// connection, resolution is deferred to connection start.
    pub fn with(
        self,
        handler: impl Fn(&mut Intercept) -> HandlerResult + Send + Sync + 'static,
    ) -> Result<InterceptRef> {
        let reg = Arc::new(Registration {
            identifiers: self.identifiers,
            handler: Arc::new(handler),
            transient: self.transient,
            deregistered: AtomicBool::new(false),
        });
        self.ext.core().add_registration(Arc::clone(&reg))?;
        Ok(InterceptRef { ext: self.ext, reg })
    }
}

/// A handle to a registered intercept handler.
pub struct InterceptRef {
    ext: Extension,
    reg: Arc<Registration>,
}

impl InterceptRef {
    /// Removes the registration from every table it is bound in. Safe to
    /// call while a dispatch is in progress; handlers already snapshotted
    /// for the current intercept are skipped.
    pub fn deregister(&self) {
        self.ext.core().remove_registration(&self.reg);
    }
}
