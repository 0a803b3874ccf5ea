//! Role registry: the explicit, per-node table of worker mailboxes.

use super::mailbox::Mailbox;
use crate::core::{MeterflowError, Result};
use crate::model::Metric;
use std::collections::HashMap;

/// Mailboxes of every role hosted by one node, keyed by role name.
///
/// Built once at startup and shared by reference; never mutated afterwards.
pub struct RoleRegistry<M> {
    mailboxes: HashMap<String, Mailbox<M>>,
}

impl<M: Metric> RoleRegistry<M> {
    pub fn new() -> Self {
        Self {
            mailboxes: HashMap::new(),
        }
    }

    /// Register a role's mailbox. Fails on duplicates.
    pub fn register(&mut self, mailbox: Mailbox<M>) -> Result<()> {
        let role = mailbox.role().to_string();
        if self.mailboxes.contains_key(&role) {
            return Err(MeterflowError::config(format!("role '{}' registered twice", role)));
        }
        self.mailboxes.insert(role, mailbox);
        Ok(())
    }

    pub fn get(&self, role: &str) -> Option<&Mailbox<M>> {
        self.mailboxes.get(role)
    }

    /// Enqueue a record into a local role's mailbox.
    pub fn offer(&self, role: &str, record: M) -> Result<()> {
        self.mailboxes
            .get(role)
            .ok_or_else(|| MeterflowError::UnknownRole(role.to_string()))?
            .offer(record)
    }

    /// Deliver a flush tick to every role.
    pub fn tick_all(&self) {
        for mailbox in self.mailboxes.values() {
            // A full mailbox already logged and picks up the next tick.
            if let Err(MeterflowError::MailboxClosed { role }) = mailbox.tick() {
                tracing::debug!(role = %role, "Mailbox closed, flush tick skipped");
            }
        }
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.mailboxes.keys().map(String::as_str)
    }

    pub fn mailboxes(&self) -> impl Iterator<Item = &Mailbox<M>> {
        self.mailboxes.values()
    }

    pub fn len(&self) -> usize {
        self.mailboxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mailboxes.is_empty()
    }
}

impl<M: Metric> Default for RoleRegistry<M> {
    fn default() -> Self {
        Self::new()
    }
}
