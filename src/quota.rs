//! Monthly quota guard, derived from the cache log.
//!
//! There is no quota counter anywhere: "requests used this month" is
//! recomputed on every check by counting the (user, pet) pair's
//! billable entries timestamped in the current calendar month. That
//! keeps quota state unforgeable and always consistent with the log.
//! The scan is O(entries for the pair); with a monthly cap of 3 the
//! log stays small enough that no maintained counter is warranted.
//!
//! Sentinel entries (`source == unavailable`) exist in the log for
//! audit purposes but never count against the cap.

use chrono::{DateTime, Datelike, Utc};

use crate::store::CacheStore;

/// Default monthly cap on billable generations per (user, pet).
pub const DEFAULT_QUOTA_CAP: u32 = 3;

/// Result of a quota check. Read-only snapshot; checking consumes
/// nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaStatus {
    /// Whether another generation may proceed.
    pub allowed: bool,
    /// Billable generations so far this calendar month.
    pub used: u32,
    /// Generations left this month (saturating at zero).
    pub remaining: u32,
    /// The configured cap.
    pub cap: u32,
    /// User-facing description of the state, in Spanish.
    pub message: String,
}

/// Check the quota for a (user, pet) pair against `cap`.
///
/// Anonymous callers (either id absent) are never limited. Idempotent
/// and side-effect-free; the engine calls it both before generation
/// (to gate) and after (to report the updated remaining count).
pub fn check(
    store: &CacheStore,
    user: Option<&str>,
    pet: Option<&str>,
    cap: u32,
) -> QuotaStatus {
    if user.is_none() || pet.is_none() {
        return QuotaStatus {
            allowed: true,
            used: 0,
            remaining: cap,
            cap,
            message: "Generación sin límite para consultas anónimas.".to_string(),
        };
    }

    let now = Utc::now();
    let used = store
        .entries_for(user, pet)
        .iter()
        .filter(|e| e.source.is_billable() && same_month(e.created_at, now))
        .count() as u32;

    let remaining = cap.saturating_sub(used);
    let allowed = used < cap;
    let message = if allowed {
        format!("Te quedan {remaining} consejos este mes.")
    } else {
        format!(
            "Has alcanzado el límite de {cap} consejos este mes. Podrás generar más el próximo mes."
        )
    };

    QuotaStatus {
        allowed,
        used,
        remaining,
        cap,
        message,
    }
}

/// Whether two instants fall in the same calendar (year, month).
fn same_month(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    a.year() == b.year() && a.month() == b.month()
}
