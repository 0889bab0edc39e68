//! Manual raid target chosen by the operator.
//!
//! Two states: automatic (no override) and overridden. An override only ever
//! points at a current candidate; when that channel leaves the live set the
//! controller silently falls back to automatic on the next reconcile.

use serde::Serialize;
use tracing::info;

use crate::config::normalize_login;
use crate::error::{Result, ScoutError};
use crate::ranking::RankedEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionOrigin {
    Automatic,
    Override,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    pub login: String,
    pub origin: SuggestionOrigin,
}

/// Session-scoped override state. Each session owns one; nothing here is global.
#[derive(Debug, Clone, Default)]
pub struct OverrideController {
    target: Option<String>,
}

impl OverrideController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn is_overridden(&self) -> bool {
        self.target.is_some()
    }

    /// Force the suggestion to `login`. Rejected (state unchanged) unless the
    /// login is among `candidates`.
    pub fn set(&mut self, login: &str, candidates: &[RankedEntry]) -> Result<()> {
        let login = normalize_login(login);
        if !is_candidate(&login, candidates) {
            return Err(ScoutError::InvalidTarget(login));
        }
        info!(target: "override", %login, previous = ?self.target, "override set");
        self.target = Some(login);
        Ok(())
    }

    /// Back to automatic. Returns the cleared login, if any.
    pub fn clear(&mut self) -> Option<String> {
        let prev = self.target.take();
        if let Some(login) = &prev {
            info!(target: "override", %login, "override cleared");
        }
        prev
    }

    /// Drop an override whose channel is no longer a candidate.
    /// Returns the invalidated login, if any.
    pub fn reconcile(&mut self, candidates: &[RankedEntry]) -> Option<String> {
        match &self.target {
            Some(login) if !is_candidate(login, candidates) => {
                info!(target: "override", %login, "overridden channel went offline; back to automatic");
                self.target.take()
            }
            _ => None,
        }
    }

    /// Override wins outright; otherwise the head of the ranking, or nothing.
    pub fn resolve(&self, ranked: &[RankedEntry]) -> Option<Suggestion> {
        if let Some(login) = &self.target {
            return Some(Suggestion {
                login: login.clone(),
                origin: SuggestionOrigin::Override,
            });
        }
        ranked.first().map(|e| Suggestion {
            login: e.login.clone(),
            origin: SuggestionOrigin::Automatic,
        })
    }
}

pub(crate) fn is_candidate(login: &str, candidates: &[RankedEntry]) -> bool {
    let login = normalize_login(login);
    candidates.iter().any(|e| e.login == login)
}
