//! Atemschutz tracks where every piece of breathing-protection equipment is.
//!
//! Core concepts:
//! - **Token**: one numbered piece of equipment (`PA 12`, `FL 126`, ...)
//! - **Pool**: the home list of a token type
//! - **Site**: a vehicle or storage location, split into typed **areas**
//! - **Composite**: a breathing apparatus or safety bag carrying a cylinder
//! - **Tombstone**: a pooled token hidden from availability
//!
//! The [`PlacementEngine`] is the only writer. It keeps every token in exactly
//! one place and persists each change through a [`Store`] before returning.
//!
//! # Example
//!
//! ```
//! use atemschutz_core::{AreaId, Catalog, Layout, MemoryStore, PlacementEngine, SiteId, TokenId};
//!
//! let catalog = Catalog::standard();
//! let layout = Layout::standard();
//! let mut engine = PlacementEngine::open(&catalog, &layout, MemoryStore::new()).unwrap();
//!
//! let pa: TokenId = "PA 12".parse().unwrap();
//! let fl: TokenId = "FL 126".parse().unwrap();
//! engine.combine(pa, fl).unwrap();
//!
//! let record = engine
//!     .move_to(pa, &SiteId::new("Vehicle-3"), AreaId::BreathingApparatus)
//!     .unwrap();
//! assert_eq!(record.label, "PA 12 mit FL 126");
//! ```

mod catalog;
mod engine;
mod key;
mod layout;
mod query;
mod record;
mod rules;
mod state;
mod store;
mod token;

pub use catalog::{Catalog, Palette, TokenId, TokenType};
pub use engine::{HomeOutcome, PlacementEngine, PlacementError};
pub use key::RecordKey;
pub use layout::{AreaId, Layout, LayoutError, Site, SiteId, SiteKind};
pub use query::{AreaView, PoolEntry, Query, SearchHit, TokenState};
pub use record::{AssignmentRecord, Location, Origin, PendingComposite};
pub use rules::{allowed_areas, is_allowed};
pub use state::{InvariantViolation, StoreError, StoreState, TokenStore};
pub use store::{BatchOp, MemoryStore, Store};
pub use token::{Composition, Personalization, Token};
