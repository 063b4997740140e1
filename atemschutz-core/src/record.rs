use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::catalog::{Palette, TokenId, TokenType};
use crate::layout::{AreaId, SiteId};
use crate::token::{Composition, Token};

/// Where a token currently is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Location {
    /// In the home list of its type.
    Pool(TokenType),
    Placed { site: SiteId, area: AreaId },
}

impl Location {
    pub fn is_pool(&self) -> bool {
        matches!(self, Location::Pool(_))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Pool(kind) => write!(f, "pool {}", kind),
            Location::Placed { site, area } => write!(f, "{} / {}", site, area),
        }
    }
}

/// Where a placed token came from when it was last moved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Origin {
    Pool(TokenType),
    Site(SiteId),
}

/// Persisted record of a token placed at a site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub token: Token,
    /// Projection of `token`, kept for readers that only scan text.
    pub label: String,
    pub area: AreaId,
    pub area_title: String,
    pub origin: Origin,
    pub target: SiteId,
    pub style: Option<Palette>,
    /// Unix timestamp millis.
    pub timestamp: u64,
}

impl AssignmentRecord {
    pub fn new(token: Token, target: SiteId, area: AreaId, origin: Origin, timestamp: u64) -> Self {
        let label = token.label();
        let style = display_style(&token);
        Self {
            token,
            label,
            area,
            area_title: area.title().to_string(),
            origin,
            target,
            style,
            timestamp,
        }
    }

    /// Replaces the composition of the placed token and refreshes the label.
    pub fn set_composition(&mut self, composition: Option<Composition>) {
        self.token.composition = composition;
        self.style = display_style(&self.token);
        self.label = self.token.label();
    }

    pub fn location(&self) -> Location {
        Location::Placed {
            site: self.target.clone(),
            area: self.area,
        }
    }
}

fn display_style(token: &Token) -> Option<Palette> {
    token
        .composition
        .map(|c| c.style)
        .or_else(|| Palette::of(&token.id))
}

/// A host/part pair joined while the host is still in its pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingComposite {
    pub host: u32,
    pub part: u32,
    pub style: Palette,
}

impl PendingComposite {
    pub fn host_id(&self, pool: TokenType) -> TokenId {
        TokenId::new(pool, self.host)
    }

    pub fn composition(&self) -> Composition {
        Composition {
            part: self.part,
            style: self.style,
        }
    }
}

/// Milliseconds since the Unix epoch, saturating at `u64::MAX`.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| millis(d.as_millis()))
        .unwrap_or_default()
}

fn millis(raw: u128) -> u64 {
    u64::try_from(raw).unwrap_or(u64::MAX)
}
