//! Routine resolution by identity, by name or by call statement.

use crate::debugger::call::CallSite;
use crate::debugger::error::Error;
use crate::debugger::protocol::connection::Connection;
use crate::debugger::protocol::Client;
use crate::debugger::source::{parameter_bounds, RoutineDescriptor};
use crate::debugger::Oid;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Schema used for routine names without a qualifier.
pub const DEFAULT_SCHEMA: &str = "public";

/// Shared cache of resolved routines, keyed by oid.
///
/// A descriptor also carries the digest of the definition it was built from,
/// [`Resolver::by_frame`] replaces it when a stack frame reports another one.
#[derive(Debug, Clone, Default)]
pub struct RoutineCache(Arc<RwLock<HashMap<Oid, Arc<RoutineDescriptor>>>>);

impl RoutineCache {
    pub fn get(&self, oid: Oid) -> Option<Arc<RoutineDescriptor>> {
        self.0.read().ok()?.get(&oid).cloned()
    }

    /// Insert a descriptor, an already cached descriptor with the same oid wins.
    pub fn insert(&self, descriptor: RoutineDescriptor) -> Arc<RoutineDescriptor> {
        let oid = descriptor.oid();
        match self.0.write() {
            Ok(mut cache) => cache.entry(oid).or_insert(Arc::new(descriptor)).clone(),
            Err(_) => Arc::new(descriptor),
        }
    }

    /// Insert a descriptor, replacing any cached descriptor with the same oid.
    pub fn replace(&self, descriptor: RoutineDescriptor) -> Arc<RoutineDescriptor> {
        let descriptor = Arc::new(descriptor);
        if let Ok(mut cache) = self.0.write() {
            cache.insert(descriptor.oid(), descriptor.clone());
        }
        descriptor
    }

    pub fn len(&self) -> usize {
        self.0.read().map(|cache| cache.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Normalize an SQL identifier the way the server does: a quoted identifier
/// is taken verbatim, an unquoted one is folded to lower case.
fn identifier(part: &str) -> String {
    let part = part.trim();
    match part
        .strip_prefix('"')
        .and_then(|quoted| quoted.strip_suffix('"'))
    {
        Some(quoted) => quoted.replace("\"\"", "\""),
        None => part.to_lowercase(),
    }
}

/// Split a possibly qualified routine name into `(schema, name)`.
pub fn split_name(name: &str) -> (String, String) {
    match name.rsplit_once('.') {
        Some((schema, name)) => (identifier(schema), identifier(name)),
        None => (DEFAULT_SCHEMA.to_string(), identifier(name)),
    }
}

/// Resolves routines through the protocol adapter, caching results.
pub struct Resolver<'a, C: Connection> {
    client: &'a mut Client<C>,
    cache: &'a RoutineCache,
}

impl<'a, C: Connection> Resolver<'a, C> {
    pub fn new(client: &'a mut Client<C>, cache: &'a RoutineCache) -> Self {
        Self { client, cache }
    }

    fn fetch(&mut self, oid: Oid) -> Result<RoutineDescriptor, Error> {
        let raw = self.client.get_routine_source(oid)?;
        if raw.oid != oid {
            log::warn!(target: "debugger", "routine {oid} requested, catalog returned {}", raw.oid);
            return Err(Error::RoutineNotFound(oid));
        }
        let descriptor = RoutineDescriptor::new(raw)?;
        log::debug!(target: "debugger", "routine {} resolved as {}", oid, descriptor.qualified_name());
        Ok(descriptor)
    }

    /// Resolve a routine by its oid.
    pub fn by_oid(&mut self, oid: Oid) -> Result<Arc<RoutineDescriptor>, Error> {
        if let Some(descriptor) = self.cache.get(oid) {
            return Ok(descriptor);
        }
        let descriptor = self.fetch(oid)?;
        Ok(self.cache.insert(descriptor))
    }

    /// Resolve the routine of a stack frame.
    ///
    /// `digest` is the definition digest reported with the frame. A cached
    /// descriptor with another digest was built before the routine was
    /// redefined, so it is fetched again and replaced.
    pub fn by_frame(
        &mut self,
        oid: Oid,
        digest: Option<&str>,
    ) -> Result<Arc<RoutineDescriptor>, Error> {
        match (self.cache.get(oid), digest) {
            (Some(cached), Some(digest)) if cached.digest() != Some(digest) => {
                log::info!(target: "debugger", "routine {} was redefined, reload source", cached.qualified_name());
                let descriptor = self.fetch(oid)?;
                Ok(self.cache.replace(descriptor))
            }
            (Some(cached), _) => Ok(cached),
            (None, _) => self.by_oid(oid),
        }
    }

    /// Resolve a routine by a (possibly qualified) name.
    ///
    /// Unquoted parts of the name are folded to lower case. With `argument_hint`
    /// only routines accepting that many arguments are candidates (parameters
    /// with a default may be omitted). Overloads accepting the same count are not
    /// told apart, the first one in catalog order wins.
    pub fn by_name(
        &mut self,
        name: &str,
        argument_hint: Option<usize>,
    ) -> Result<Arc<RoutineDescriptor>, Error> {
        let (schema, routine) = split_name(name);
        let not_found = || Error::RoutineNameNotFound(format!("{schema}.{routine}"));

        let mut candidates = self.client.search_routines(&schema, &routine)?;
        if let Some(count) = argument_hint {
            candidates.retain(|raw| parameter_bounds(&raw.arguments).contains(&count));
        }
        if candidates.len() > 1 {
            log::debug!(
                target: "debugger",
                "{} candidates for {schema}.{routine}, first one is used",
                candidates.len()
            );
        }

        let raw = candidates.into_iter().next().ok_or_else(not_found)?;
        if let Some(descriptor) = self.cache.get(raw.oid) {
            return Ok(descriptor);
        }
        Ok(self.cache.insert(RoutineDescriptor::new(raw)?))
    }

    /// Resolve the routine called by a SQL statement like `SELECT s.f(1, 2);`.
    pub fn by_call(&mut self, sql: &str) -> Result<Arc<RoutineDescriptor>, Error> {
        let call = CallSite::parse(sql)?;
        self.by_name(&call.routine, Some(call.args.len()))
    }
}
