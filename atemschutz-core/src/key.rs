use std::fmt;
use std::str::FromStr;

use crate::catalog::TokenType;
use crate::layout::SiteId;

pub const ASSIGNMENTS_PREFIX: &str = "assignments/";
pub const TOMBSTONES_PREFIX: &str = "tombstones/";
pub const PENDING_PREFIX: &str = "pending/";

/// Address of one persisted record family entry.
///
/// Keys are plain text so that backups stay readable:
/// `assignments/Vehicle-3`, `tombstones/FL`, `pending/PA`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKey {
    Assignments(SiteId),
    Tombstones(TokenType),
    Pending(TokenType),
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::Assignments(site) => write!(f, "{}{}", ASSIGNMENTS_PREFIX, site),
            RecordKey::Tombstones(pool) => write!(f, "{}{}", TOMBSTONES_PREFIX, pool),
            RecordKey::Pending(pool) => write!(f, "{}{}", PENDING_PREFIX, pool),
        }
    }
}

impl FromStr for RecordKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(site) = s.strip_prefix(ASSIGNMENTS_PREFIX) {
            if site.is_empty() {
                return Err(format!("empty site in key: {}", s));
            }
            return Ok(RecordKey::Assignments(SiteId::new(site)));
        }
        if let Some(pool) = s.strip_prefix(TOMBSTONES_PREFIX) {
            return Ok(RecordKey::Tombstones(pool.parse()?));
        }
        if let Some(pool) = s.strip_prefix(PENDING_PREFIX) {
            let pool: TokenType = pool.parse()?;
            if !pool.can_host() {
                return Err(format!("{} cannot host composites: {}", pool, s));
            }
            return Ok(RecordKey::Pending(pool));
        }
        Err(format!("unknown record key: {}", s))
    }
}
