use tracing::{info, warn};

use crate::catalog::{Catalog, Palette, TokenId, TokenType};
use crate::layout::{AreaId, Layout, Site, SiteId};
use crate::query::Query;
use crate::record::{AssignmentRecord, Location, now_millis};
use crate::rules::allowed_areas;
use crate::state::{StoreError, StoreState, TokenStore};
use crate::store::Store;
use crate::token::{Composition, Personalization, Token};

/// Error type for placement operations.
#[derive(Debug, thiserror::Error)]
pub enum PlacementError {
    #[error("cannot place {token} at {site}: {reason}")]
    InvalidPlacement {
        token: TokenId,
        site: SiteId,
        reason: String,
    },
    #[error("cannot combine {host} with {part}: {reason}")]
    InvalidComposition {
        host: TokenId,
        part: TokenId,
        reason: String,
    },
    #[error("{0} is not a composite")]
    NotComposite(TokenId),
    #[error("{token}: {reason}")]
    InvalidState { token: TokenId, reason: String },
    #[error("{0} is not in the catalog")]
    UnknownToken(TokenId),
    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),
}

impl PlacementError {
    fn placement(token: TokenId, site: &SiteId, reason: impl Into<String>) -> Self {
        PlacementError::InvalidPlacement {
            token,
            site: site.clone(),
            reason: reason.into(),
        }
    }

    fn composition(host: TokenId, part: TokenId, reason: impl Into<String>) -> Self {
        PlacementError::InvalidComposition {
            host,
            part,
            reason: reason.into(),
        }
    }

    fn state(token: TokenId, reason: impl Into<String>) -> Self {
        PlacementError::InvalidState {
            token,
            reason: reason.into(),
        }
    }
}

/// Result of [`PlacementEngine::return_home`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HomeOutcome {
    /// The token was already in its pool; nothing changed.
    AlreadyHome,
    /// The token left the site recorded in the removed record.
    Returned(AssignmentRecord),
}

/// Applies placement operations to a token store under the placement rules.
///
/// The catalog and layout are fixed for the lifetime of the engine.
pub struct PlacementEngine<'a, S> {
    catalog: &'a Catalog,
    layout: &'a Layout,
    store: TokenStore<S>,
    clock: fn() -> u64,
}

impl<'a, S: Store> PlacementEngine<'a, S> {
    /// Opens an engine over `backend`, loading its current state.
    ///
    /// Loaded state that breaks an invariant (e.g. after restoring an old
    /// backup) is reported but not rejected.
    pub fn open(catalog: &'a Catalog, layout: &'a Layout, backend: S) -> Result<Self, StoreError> {
        let store = TokenStore::open(backend)?;
        for violation in store.state().check_invariants(catalog) {
            warn!(%violation, "loaded state breaks an invariant");
        }
        Ok(Self {
            catalog,
            layout,
            store,
            clock: now_millis,
        })
    }

    /// Replaces the timestamp source used for new assignment records.
    pub fn with_clock(mut self, clock: fn() -> u64) -> Self {
        self.clock = clock;
        self
    }

    pub fn catalog(&self) -> &'a Catalog {
        self.catalog
    }

    pub fn layout(&self) -> &'a Layout {
        self.layout
    }

    pub fn store(&self) -> &TokenStore<S> {
        &self.store
    }

    /// State as of the last load or successful operation.
    pub fn state(&self) -> &StoreState {
        self.store.state()
    }

    /// Picks up changes written by other processes.
    pub fn reload(&mut self) -> Result<(), StoreError> {
        self.store.reload()?;
        Ok(())
    }

    /// Read-only views over the current state.
    pub fn query(&self) -> Query<'_> {
        Query::new(self.catalog, self.layout, self.store.state())
    }

    fn known(&self, id: &TokenId) -> Result<(), PlacementError> {
        if self.catalog.contains(id) {
            Ok(())
        } else {
            Err(PlacementError::UnknownToken(*id))
        }
    }

    fn site(&self, token: TokenId, id: &SiteId) -> Result<&'a Site, PlacementError> {
        self.layout
            .site(id)
            .ok_or_else(|| PlacementError::placement(token, id, "unknown site"))
    }

    /// Places a token at `area` of `site`.
    ///
    /// A pooled composite carries its pending cylinder along; the pending
    /// entry is folded into the new record.
    pub fn move_to(
        &mut self,
        id: TokenId,
        site_id: &SiteId,
        area: AreaId,
    ) -> Result<AssignmentRecord, PlacementError> {
        self.known(&id)?;
        let site = self.site(id, site_id)?;
        let now = (self.clock)();

        let record = self.store.transact(|state| {
            let token = state.token(&id);
            if state.record(&id).is_none() {
                if let Some(host) = state.absorbing_host(&id) {
                    return Err(PlacementError::state(id, format!("absorbed by {}", host)));
                }
                if state.is_tombstoned(&id) {
                    return Err(PlacementError::state(id, "removed from its pool"));
                }
            }

            let allowed = allowed_areas(&token, site);
            if !allowed.contains(&area) {
                return Err(PlacementError::placement(
                    id,
                    &site.id,
                    format!("{} not allowed (allowed: {})", area, list_areas(&allowed)),
                ));
            }

            state.clear_combination(&id);
            let (record, _) = state.place(&token, site.id.clone(), area, now);
            Ok(record)
        })?;

        info!(token = %id, site = %site_id, %area, label = %record.label, "moved");
        Ok(record)
    }

    /// Sends a token back to its pool.
    ///
    /// A composite comes apart on the way: the host returns plain and its
    /// cylinder reappears in the cylinder pool. A personalized mask loses its
    /// record while its base number stays removed from the pool until restored.
    pub fn return_home(&mut self, id: TokenId) -> Result<HomeOutcome, PlacementError> {
        self.known(&id)?;
        let now = (self.clock)();

        let outcome = self.store.transact(|state| -> Result<_, PlacementError> {
            let Some(record) = state.record(&id).cloned() else {
                return Ok(HomeOutcome::AlreadyHome);
            };
            state.set_location(&record.token, Location::Pool(id.kind), now);
            if let Some(composition) = record.token.composition {
                state.remove_tombstone(&composition.part_id());
            }
            Ok(HomeOutcome::Returned(record))
        })?;

        if let HomeOutcome::Returned(record) = &outcome {
            info!(token = %id, site = %record.target, "returned home");
        }
        Ok(outcome)
    }

    /// Joins a cylinder onto a breathing apparatus or safety bag.
    pub fn combine(&mut self, host: TokenId, part: TokenId) -> Result<Token, PlacementError> {
        self.known(&host)?;
        self.known(&part)?;
        if !host.kind.can_host() {
            return Err(PlacementError::composition(
                host,
                part,
                format!("{} cannot carry a cylinder", host.kind),
            ));
        }
        if part.kind != TokenType::Cylinder {
            return Err(PlacementError::composition(
                host,
                part,
                "only cylinders can be joined",
            ));
        }

        let token = self.store.transact(|state| {
            if let Some(existing) = state.composition_of(&host) {
                return Err(PlacementError::composition(
                    host,
                    part,
                    format!("host already carries {}", existing.part_id()),
                ));
            }
            if let Some(record) = state.record(&part) {
                return Err(PlacementError::composition(
                    host,
                    part,
                    format!("cylinder is placed at {}", record.target),
                ));
            }
            if let Some(other) = state.absorbing_host(&part) {
                return Err(PlacementError::composition(
                    host,
                    part,
                    format!("cylinder is already joined to {}", other),
                ));
            }
            if state.is_tombstoned(&part) {
                return Err(PlacementError::composition(
                    host,
                    part,
                    "cylinder is removed from its pool",
                ));
            }

            let composition = Composition {
                part: part.number,
                style: Palette::of_cylinder(part.number),
            };
            state.add_tombstone(part);
            if !state.set_record_composition(&host, Some(composition)) {
                state.set_combination(&host, composition);
            }
            Ok(state.token(&host))
        })?;

        info!(host = %host, part = %part, label = %token.label(), "combined");
        Ok(token)
    }

    /// Detaches the cylinder from a composite, returning it to its pool.
    ///
    /// The host keeps its current location.
    pub fn split(&mut self, host: TokenId) -> Result<Composition, PlacementError> {
        self.known(&host)?;

        let composition = self.store.transact(|state| -> Result<_, PlacementError> {
            let composition = state
                .composition_of(&host)
                .ok_or(PlacementError::NotComposite(host))?;
            if !state.set_record_composition(&host, None) {
                state.clear_combination(&host);
            }
            state.remove_tombstone(&composition.part_id());
            Ok(composition)
        })?;

        info!(host = %host, part = %composition.part_id(), "split");
        Ok(composition)
    }

    /// Hides a pooled token from its pool. Returns false if it already was.
    pub fn tombstone(&mut self, id: TokenId) -> Result<bool, PlacementError> {
        self.known(&id)?;
        let changed = self.store.transact(|state| -> Result<_, PlacementError> {
            ensure_pooled(state, &id)?;
            Ok(state.add_tombstone(id))
        })?;
        if changed {
            info!(token = %id, "removed from pool");
        }
        Ok(changed)
    }

    /// Makes a hidden pooled token available again. Returns false if it was
    /// not hidden.
    pub fn restore(&mut self, id: TokenId) -> Result<bool, PlacementError> {
        self.known(&id)?;
        let changed = self.store.transact(|state| -> Result<_, PlacementError> {
            ensure_pooled(state, &id)?;
            Ok(state.remove_tombstone(&id))
        })?;
        if changed {
            info!(token = %id, "restored to pool");
        }
        Ok(changed)
    }

    /// Binds a face mask to `owner` and places it in the personal-mask area
    /// of `site_id`. The anonymous mask disappears from its pool.
    pub fn personalize(
        &mut self,
        id: TokenId,
        owner: &str,
        site_id: &SiteId,
    ) -> Result<AssignmentRecord, PlacementError> {
        self.known(&id)?;
        if id.kind != TokenType::FaceMask {
            return Err(PlacementError::placement(
                id,
                site_id,
                "only face masks can be personalized",
            ));
        }
        let site = self.site(id, site_id)?;
        if !site.personal_masks {
            return Err(PlacementError::placement(
                id,
                site_id,
                "site does not keep personal masks",
            ));
        }
        let owner = owner.trim();
        if owner.is_empty() {
            return Err(PlacementError::state(id, "owner name is empty"));
        }
        let now = (self.clock)();

        let record = self.store.transact(|state| {
            if let Some(record) = state.record(&id) {
                let reason = if record.token.is_personalized() {
                    "already personalized".to_string()
                } else {
                    format!("placed at {}", record.target)
                };
                return Err(PlacementError::state(id, reason));
            }
            if state.is_tombstoned(&id) {
                return Err(PlacementError::state(id, "removed from its pool"));
            }

            let token = Token {
                personalization: Some(Personalization {
                    owner: owner.to_string(),
                }),
                ..Token::plain(id)
            };
            let allowed = allowed_areas(&token, site);
            if !allowed.contains(&AreaId::PersonalMask) {
                return Err(PlacementError::placement(
                    id,
                    &site.id,
                    "site has no personal-mask area",
                ));
            }

            state.add_tombstone(id);
            let (record, _) = state.place(&token, site.id.clone(), AreaId::PersonalMask, now);
            Ok(record)
        })?;

        info!(token = %id, site = %site_id, label = %record.label, "personalized");
        Ok(record)
    }
}

fn ensure_pooled(state: &StoreState, id: &TokenId) -> Result<(), PlacementError> {
    if let Some(record) = state.record(id) {
        return Err(PlacementError::state(
            *id,
            format!("placed at {}", record.target),
        ));
    }
    if let Some(host) = state.absorbing_host(id) {
        return Err(PlacementError::state(*id, format!("absorbed by {}", host)));
    }
    Ok(())
}

fn list_areas(areas: &[AreaId]) -> String {
    if areas.is_empty() {
        return "none".to_string();
    }
    areas
        .iter()
        .map(|area| area.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
