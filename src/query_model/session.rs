//! Session - explicit per-session state threaded through parse, merge,
//! optimize and render.
//!
//! Holds everything that would otherwise be process-wide: the foreign-key
//! registry, the alias hook, and the configuration (dialect, layout,
//! default sort). Two sessions never share state, so independent sessions
//! can run on different threads without locking.
//!
//! The registry lives in a `RefCell` so parsers can register keys through a
//! shared `&Session`. A `Session` is therefore `Send` but not `Sync`: give
//! each request its own.

use std::cell::{Ref, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::{Dialect, SessionConfig};

/// Custom alias derivation, consulted for names without an explicit alias
/// or underscore.
pub type AliasHook = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// How a child table references its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    /// Column of the child table
    pub foreign_field: String,
    /// Column of the parent table; `None` falls back to the parent's key field
    pub primary_field: Option<String>,
}

/// `(child_table, parent_table) -> (foreign_field, primary_field)`.
///
/// Entries are never removed: a relationship declared once stays reusable
/// for every later query built in the same session.
#[derive(Debug, Clone, Default)]
pub struct ForeignKeyRegistry {
    references: HashMap<(String, String), Relationship>,
}

impl ForeignKeyRegistry {
    fn key(child: &str, parent: &str) -> (String, String) {
        (child.to_lowercase(), parent.to_lowercase())
    }

    pub fn register(
        &mut self,
        child: &str,
        parent: &str,
        foreign_field: &str,
        primary_field: Option<&str>,
    ) {
        log::debug!(
            "foreign key registered: {}.{} -> {}.{}",
            child,
            foreign_field,
            parent,
            primary_field.unwrap_or("<key>")
        );
        self.references.insert(
            Self::key(child, parent),
            Relationship {
                foreign_field: foreign_field.to_string(),
                primary_field: primary_field
                    .filter(|f| !f.is_empty())
                    .map(str::to_string),
            },
        );
    }

    pub fn find(&self, child: &str, parent: &str) -> Option<&Relationship> {
        self.references.get(&Self::key(child, parent))
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }
}

#[derive(Clone, Default)]
pub struct Session {
    config: SessionConfig,
    alias_hook: Option<AliasHook>,
    foreign_keys: RefCell<ForeignKeyRegistry>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Install a custom alias derivation.
    pub fn with_alias_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.alias_hook = Some(Arc::new(hook));
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut SessionConfig {
        &mut self.config
    }

    pub fn dialect(&self) -> Dialect {
        self.config.dialect
    }

    pub fn set_dialect(&mut self, dialect: Dialect) {
        self.config.dialect = dialect;
    }

    pub fn alias_hook(&self) -> Option<&AliasHook> {
        self.alias_hook.as_ref()
    }

    pub fn register_foreign_key(
        &self,
        child: &str,
        parent: &str,
        foreign_field: &str,
        primary_field: Option<&str>,
    ) {
        self.foreign_keys
            .borrow_mut()
            .register(child, parent, foreign_field, primary_field);
    }

    pub fn find_foreign_key(&self, child: &str, parent: &str) -> Option<Relationship> {
        self.foreign_keys.borrow().find(child, parent).cloned()
    }

    pub fn foreign_keys(&self) -> Ref<'_, ForeignKeyRegistry> {
        self.foreign_keys.borrow()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("alias_hook", &self.alias_hook.is_some())
            .field("foreign_keys", &self.foreign_keys.borrow().len())
            .finish()
    }
}
