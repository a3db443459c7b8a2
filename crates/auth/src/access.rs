//! The access-control handle: decides whether an identity may perform an
//! action.
//!
//! Rules are granted during role initialization (before any route is
//! mounted) and consulted read-mostly afterwards, shared by all concurrent
//! requests of a worker.

use std::sync::RwLock;

use crate::principal::Principal;

type Check = dyn Fn(Option<&Principal>) -> Option<bool> + Send + Sync;

enum ActionMatcher {
    /// Consulted for every action.
    Any,
    Action(String),
}

/// Role-based access control registry.
///
/// Rules run in registration order. The first rule returning `Some(true)`
/// grants, the first returning `Some(false)` denies; `None` passes to the
/// next rule. An action with no deciding rule is denied.
pub struct AccessControl {
    rules: RwLock<Vec<(ActionMatcher, Box<Check>)>>,
}

impl AccessControl {
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
        }
    }

    /// Register a rule for one action.
    pub fn grant<F>(&self, action: impl Into<String>, check: F)
    where
        F: Fn(Option<&Principal>) -> Option<bool> + Send + Sync + 'static,
    {
        self.rules
            .write()
            .unwrap()
            .push((ActionMatcher::Action(action.into()), Box::new(check)));
    }

    /// Register a rule consulted for every action.
    pub fn grant_any<F>(&self, check: F)
    where
        F: Fn(Option<&Principal>) -> Option<bool> + Send + Sync + 'static,
    {
        self.rules
            .write()
            .unwrap()
            .push((ActionMatcher::Any, Box::new(check)));
    }

    /// Convenience: grant `action` to holders of `role`. Non-holders pass to
    /// the next rule rather than being denied outright.
    pub fn allow_role(&self, action: impl Into<String>, role: &'static str) {
        self.grant(action, move |principal| {
            match principal {
                Some(p) if p.has_role(role) => Some(true),
                _ => None,
            }
        });
    }

    /// Decide whether `principal` may perform `action`.
    pub fn can(&self, principal: Option<&Principal>, action: &str) -> bool {
        let rules = self.rules.read().unwrap();
        for (matcher, check) in rules.iter() {
            let applies = match matcher {
                ActionMatcher::Any => true,
                ActionMatcher::Action(a) => a == action,
            };
            if !applies {
                continue;
            }
            if let Some(decision) = check(principal) {
                return decision;
            }
        }
        false
    }
}

impl Default for AccessControl {
    fn default() -> Self {
        Self::new()
    }
}
