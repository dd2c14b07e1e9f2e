//! The intercept dispatch engine.
//!
//! Registration tables live behind a single mutex. Dispatch snapshots the
//! relevant handler list while holding the lock, releases it, then invokes
//! the handlers, so a handler may register or deregister reentrantly.
//! Deregistrations observed during a dispatch are collected and swept once
//! at the end.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tether_protocol::{Direction, Header, Identifier};

use crate::error::{ExtError, Result};
use crate::intercept::{GlobalRegistration, HandlerResult, Intercept, InterceptHandler, Registration};
use crate::Core;

#[derive(Default)]
pub(crate) struct Tables {
    /// Bound registrations, traversed in registration order per header.
    pub(crate) by_header: HashMap<Header, Vec<Arc<Registration>>>,
    /// Registrations replayed and re-bound on every connection start.
    pub(crate) persistent: Vec<Arc<Registration>>,
    /// Transient registrations created before any connection; bound at
    /// the next connection start.
    pub(crate) unbound_transient: Vec<Arc<Registration>>,
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_owned()
    }
}

/// Invokes a handler, containing panics as handler errors.
fn invoke(handler: &InterceptHandler, intercept: &mut Intercept) -> HandlerResult {
    match catch_unwind(AssertUnwindSafe(|| handler(intercept))) {
        Ok(result) => result,
        Err(payload) => Err(panic_message(payload).into()),
    }
}

impl Core {
    pub(crate) fn resolve(&self, identifier: &Identifier) -> Result<Header> {
        match identifier.dir {
            Direction::In | Direction::Out => {}
            Direction::Unknown => return Err(ExtError::MissingDirection),
        }
        self.headers
            .read()
            .get(identifier)
            .ok_or_else(|| ExtError::Unresolved {
                dir: identifier.dir,
                name: identifier.name.to_string(),
            })
    }

    /// Adds a registration, binding it immediately when header info is
    /// available.
    pub(crate) fn add_registration(&self, reg: Arc<Registration>) -> Result<()> {
        let mut tables = self.tables.lock();
        let packet_info = self.conn.read().packet_info;
        if packet_info {
            self.bind_locked(&mut tables, &reg)?;
        } else if reg.transient {
            tables.unbound_transient.push(Arc::clone(&reg));
        }
        if !reg.transient {
            tables.persistent.push(reg);
        }
        Ok(())
    }

    /// Resolves a registration's identifiers and appends it to the
    /// per-header lists. Resolution failures bind nothing.
    fn bind_locked(&self, tables: &mut Tables, reg: &Arc<Registration>) -> Result<()> {
        let mut headers = Vec::with_capacity(reg.identifiers.len());
        for identifier in &reg.identifiers {
            headers.push(self.resolve(identifier)?);
        }
        headers.sort_by_key(|h| (h.value, h.dir as u8));
        headers.dedup();
        for header in headers {
            tables
                .by_header
                .entry(header)
                .or_default()
                .push(Arc::clone(reg));
        }
        Ok(())
    }

    /// Re-binds persistent registrations and any transient registrations
    /// created before the connection. Called at connection start, after
    /// the header registry is populated.
    pub(crate) fn flush_registrations(&self) -> Result<()> {
        let mut tables = self.tables.lock();
        let replay: Vec<_> = tables
            .persistent
            .iter()
            .chain(tables.unbound_transient.iter())
            .cloned()
            .collect();
        tables.unbound_transient.clear();
        for reg in &replay {
            if reg.is_deregistered() {
                continue;
            }
            self.bind_locked(&mut tables, reg)?;
        }
        Ok(())
    }

    /// Drops all header bindings. Transient registrations disappear with
    /// them; persistent ones are replayed on the next connection.
    pub(crate) fn clear_bindings(&self) {
        self.tables.lock().by_header.clear();
    }

    pub(crate) fn remove_registration(&self, reg: &Arc<Registration>) {
        self.remove_registrations(std::slice::from_ref(reg));
    }

    pub(crate) fn remove_registrations(&self, regs: &[Arc<Registration>]) {
        let mut tables = self.tables.lock();
        let headers = self.headers.read();
        for reg in regs {
            reg.set_deregistered();
            tables.persistent.retain(|r| !Arc::ptr_eq(r, reg));
            tables.unbound_transient.retain(|r| !Arc::ptr_eq(r, reg));
            for identifier in &reg.identifiers {
                if let Some(header) = headers.get(identifier) {
                    if let Some(list) = tables.by_header.get_mut(&header) {
                        list.retain(|r| !Arc::ptr_eq(r, reg));
                    }
                }
            }
        }
    }

    pub(crate) fn add_global(&self, handler: InterceptHandler) {
        self.globals.lock().push(Arc::new(GlobalRegistration {
            handler,
            deregistered: false.into(),
        }));
    }

    /// Runs the global pre-handlers for one intercept.
    pub(crate) fn dispatch_globals(&self, intercept: &mut Intercept) -> Result<()> {
        let snapshot: Vec<_> = self.globals.lock().clone();
        if snapshot.is_empty() {
            return Ok(());
        }

        let mut swept = false;
        let mut result = Ok(());
        for reg in &snapshot {
            if reg.deregistered.load(std::sync::atomic::Ordering::SeqCst) {
                continue;
            }
            intercept.packet.pos = 0;
            let res = invoke(&reg.handler, intercept);
            if intercept.take_dereg() {
                reg.deregistered
                    .store(true, std::sync::atomic::Ordering::SeqCst);
                swept = true;
            }
            if let Err(cause) = res {
                result = Err(self.handler_error(cause, None));
                break;
            }
        }
        if swept {
            self.globals
                .lock()
                .retain(|r| !r.deregistered.load(std::sync::atomic::Ordering::SeqCst));
        }
        result
    }

    /// Runs the per-header handlers for one intercept, in registration
    /// order, against the packet's current header.
    pub(crate) fn dispatch_per_header(&self, intercept: &mut Intercept) -> Result<()> {
        let header = intercept.packet.header;
        let snapshot = self.tables.lock().by_header.get(&header).cloned();
        let Some(snapshot) = snapshot else {
            return Ok(());
        };

        let mut removals: Vec<Arc<Registration>> = Vec::new();
        let mut result = Ok(());
        for reg in &snapshot {
            if reg.is_deregistered() {
                continue;
            }
            intercept.packet.pos = 0;
            let res = invoke(&reg.handler, intercept);
            if intercept.take_dereg() {
                reg.set_deregistered();
                removals.push(Arc::clone(reg));
            }
            if let Err(cause) = res {
                result = Err(self.handler_error(cause, Some(header)));
                break;
            }
        }
        if !removals.is_empty() {
            self.remove_registrations(&removals);
        }
        result
    }

    fn handler_error(
        &self,
        cause: Box<dyn std::error::Error + Send + Sync>,
        header: Option<Header>,
    ) -> ExtError {
        let context = match header {
            None => "global intercept handler".to_owned(),
            Some(header) => match self.headers.read().name_of(header) {
                Some(name) => format!("{} {} handler", header.dir, name),
                None => format!("{} ({}) handler", header.dir, header.value),
            },
        };
        ExtError::Handler(format!("error in {context}: {cause}"))
    }
}
