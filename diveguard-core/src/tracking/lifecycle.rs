//! Contact lifecycle state machine.
//!
//! ```text
//! Tentative ──N hits──▶ Confirmed ──silence──▶ Stale ──longer silence──▶ Expired
//!     │                     ▲                    │
//!     └──────silence────────┼────────────────────┤
//!                           └──ranging update────┘
//! ```
//!
//! A stale contact that was never confirmed restarts as tentative on its next
//! update; one that was confirmed returns straight to confirmed. Expired is
//! terminal and the contact is removed.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ContactId;
use crate::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactStatus {
    Tentative,
    Confirmed,
    Stale,
    Expired,
}

impl ContactStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactStatus::Tentative => "tentative",
            ContactStatus::Confirmed => "confirmed",
            ContactStatus::Stale => "stale",
            ContactStatus::Expired => "expired",
        }
    }

    pub fn is_live(&self) -> bool {
        !matches!(self, ContactStatus::Expired)
    }
}

impl fmt::Display for ContactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status change reported by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    pub contact_id: ContactId,
    /// `None` when the contact was just created
    pub from: Option<ContactStatus>,
    pub to: ContactStatus,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone)]
pub struct Lifecycle {
    status: ContactStatus,
    hits: u32,
    confirm_hits: u32,
    ever_confirmed: bool,
}

impl Lifecycle {
    pub fn new(confirm_hits: u32) -> Self {
        Lifecycle {
            status: ContactStatus::Tentative,
            hits: 0,
            confirm_hits: confirm_hits.max(1),
            ever_confirmed: false,
        }
    }

    pub fn status(&self) -> ContactStatus {
        self.status
    }

    /// Consecutive associated updates since creation or the last silence.
    pub fn hits(&self) -> u32 {
        self.hits
    }

    /// Associated ranging update. Returns the transition, if any.
    pub fn hit(&mut self) -> Option<(ContactStatus, ContactStatus)> {
        let from = self.status;
        match self.status {
            ContactStatus::Tentative => {
                self.hits += 1;
                if self.hits >= self.confirm_hits {
                    self.status = ContactStatus::Confirmed;
                    self.ever_confirmed = true;
                }
            }
            ContactStatus::Confirmed => {
                self.hits = self.hits.saturating_add(1);
            }
            ContactStatus::Stale => {
                self.hits = 1;
                if self.ever_confirmed || self.hits >= self.confirm_hits {
                    self.status = ContactStatus::Confirmed;
                    self.ever_confirmed = true;
                } else {
                    self.status = ContactStatus::Tentative;
                }
            }
            ContactStatus::Expired => {}
        }
        (from != self.status).then_some((from, self.status))
    }

    /// No ranging for the stale timeout, or a numerical fault.
    pub fn mark_stale(&mut self) -> Option<(ContactStatus, ContactStatus)> {
        let from = self.status;
        match self.status {
            ContactStatus::Tentative | ContactStatus::Confirmed => {
                self.status = ContactStatus::Stale;
                self.hits = 0;
                Some((from, self.status))
            }
            ContactStatus::Stale | ContactStatus::Expired => None,
        }
    }

    pub fn expire(&mut self) -> Option<(ContactStatus, ContactStatus)> {
        let from = self.status;
        if from == ContactStatus::Expired {
            return None;
        }
        self.status = ContactStatus::Expired;
        Some((from, self.status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmation_after_hits() {
        let mut lc = Lifecycle::new(3);
        assert_eq!(lc.hit(), None);
        assert_eq!(lc.hit(), None);
        assert_eq!(
            lc.hit(),
            Some((ContactStatus::Tentative, ContactStatus::Confirmed))
        );
        assert_eq!(lc.status(), ContactStatus::Confirmed);
        assert_eq!(lc.hit(), None);
    }

    #[test]
    fn test_stale_confirmed_recovers() {
        let mut lc = Lifecycle::new(1);
        lc.hit();
        assert_eq!(
            lc.mark_stale(),
            Some((ContactStatus::Confirmed, ContactStatus::Stale))
        );
        assert_eq!(lc.mark_stale(), None);
        assert_eq!(
            lc.hit(),
            Some((ContactStatus::Stale, ContactStatus::Confirmed))
        );
    }

    #[test]
    fn test_stale_tentative_restarts() {
        let mut lc = Lifecycle::new(3);
        lc.hit();
        lc.hit();
        lc.mark_stale();
        assert_eq!(
            lc.hit(),
            Some((ContactStatus::Stale, ContactStatus::Tentative))
        );
        assert_eq!(lc.hits(), 1);
    }

    #[test]
    fn test_expired_is_terminal() {
        let mut lc = Lifecycle::new(2);
        assert!(lc.expire().is_some());
        assert_eq!(lc.hit(), None);
        assert_eq!(lc.mark_stale(), None);
        assert_eq!(lc.expire(), None);
        assert_eq!(lc.status(), ContactStatus::Expired);
    }
}
