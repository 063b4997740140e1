use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::catalog::{Catalog, Palette, TokenId, TokenType};
use crate::key::{ASSIGNMENTS_PREFIX, PENDING_PREFIX, RecordKey, TOMBSTONES_PREFIX};
use crate::layout::{AreaId, SiteId};
use crate::record::{AssignmentRecord, Location, Origin, PendingComposite, now_millis};
use crate::store::{BatchOp, Store};
use crate::token::{Composition, Token};

/// Error type for token store persistence.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("failed to encode {key}: {message}")]
    Encode { key: String, message: String },
    #[error("failed to decode {key}: {message}")]
    Decode { key: String, message: String },
    #[error("malformed record key: {0}")]
    MalformedKey(String),
}

impl StoreError {
    fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        StoreError::Backend(Box::new(err))
    }
}

/// A broken invariant found in loaded state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("{0} is not in the catalog")]
    UnknownToken(TokenId),
    #[error("{0} has more than one assignment record")]
    DuplicateRecord(TokenId),
    #[error("{token} is filed under {filed} but targets {target}")]
    MisfiledRecord {
        token: TokenId,
        filed: SiteId,
        target: SiteId,
    },
    #[error("{0} is placed and tombstoned at the same time")]
    PlacedAndTombstoned(TokenId),
    #[error("personalized {0} is placed but its base number is visible")]
    PersonalBaseVisible(TokenId),
    #[error("{0} is absorbed by more than one host")]
    SharedPart(TokenId),
    #[error("absorbed {0} is not hidden from its pool")]
    VisiblePart(TokenId),
    #[error("absorbed {0} is placed independently")]
    PlacedPart(TokenId),
    #[error("{0} is placed but still has a pending composite")]
    PendingForPlacedHost(TokenId),
    #[error("{0} cannot host a composite")]
    InvalidHost(TokenId),
}

/// The loaded contents of the durable store.
///
/// Holds the three persisted record families: assignment records per site,
/// tombstone sets per pool and pending composites per host pool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreState {
    assignments: BTreeMap<SiteId, Vec<AssignmentRecord>>,
    tombstones: BTreeMap<TokenType, BTreeSet<TokenId>>,
    pending: BTreeMap<TokenType, Vec<PendingComposite>>,
}

impl StoreState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads every record family from `store`.
    pub fn load<S: Store>(store: &S) -> Result<Self, StoreError> {
        let mut state = StoreState::new();

        for (key, bytes) in store
            .scan_prefix(ASSIGNMENTS_PREFIX)
            .map_err(StoreError::backend)?
        {
            let RecordKey::Assignments(site) = parse_key(&key)? else {
                return Err(StoreError::MalformedKey(key));
            };
            let records: Vec<AssignmentRecord> = decode(&key, &bytes)?;
            state.assignments.insert(site, records);
        }

        for (key, bytes) in store
            .scan_prefix(TOMBSTONES_PREFIX)
            .map_err(StoreError::backend)?
        {
            let RecordKey::Tombstones(pool) = parse_key(&key)? else {
                return Err(StoreError::MalformedKey(key));
            };
            let set: BTreeSet<TokenId> = decode(&key, &bytes)?;
            state.tombstones.insert(pool, set);
        }

        for (key, bytes) in store.scan_prefix(PENDING_PREFIX).map_err(StoreError::backend)? {
            let RecordKey::Pending(pool) = parse_key(&key)? else {
                return Err(StoreError::MalformedKey(key));
            };
            let pairs: Vec<PendingComposite> = decode(&key, &bytes)?;
            state.pending.insert(pool, pairs);
        }

        debug!(
            sites = state.assignments.len(),
            tombstone_pools = state.tombstones.len(),
            pending_pools = state.pending.len(),
            "loaded store state"
        );
        Ok(state)
    }

    /// Encodes every non-empty family entry by key.
    pub fn encode(&self) -> Result<BTreeMap<String, Vec<u8>>, StoreError> {
        let mut out = BTreeMap::new();
        for (site, records) in &self.assignments {
            if !records.is_empty() {
                let key = RecordKey::Assignments(site.clone()).to_string();
                let bytes = encode(&key, records)?;
                out.insert(key, bytes);
            }
        }
        for (pool, set) in &self.tombstones {
            if !set.is_empty() {
                let key = RecordKey::Tombstones(*pool).to_string();
                let bytes = encode(&key, set)?;
                out.insert(key, bytes);
            }
        }
        for (pool, pairs) in &self.pending {
            if !pairs.is_empty() {
                let key = RecordKey::Pending(*pool).to_string();
                let bytes = encode(&key, pairs)?;
                out.insert(key, bytes);
            }
        }
        Ok(out)
    }

    // -- locations --------------------------------------------------------

    /// The live assignment record of a token, if it is placed.
    pub fn record(&self, id: &TokenId) -> Option<&AssignmentRecord> {
        self.assignments
            .values()
            .flatten()
            .find(|record| record.token.id == *id)
    }

    fn record_mut(&mut self, id: &TokenId) -> Option<&mut AssignmentRecord> {
        self.assignments
            .values_mut()
            .flatten()
            .find(|record| record.token.id == *id)
    }

    pub fn location(&self, id: &TokenId) -> Location {
        match self.record(id) {
            Some(record) => record.location(),
            None => Location::Pool(id.kind),
        }
    }

    /// The token as it currently appears, including any composition or
    /// personalization.
    pub fn token(&self, id: &TokenId) -> Token {
        if let Some(record) = self.record(id) {
            return record.token.clone();
        }
        Token {
            composition: self.combination(id),
            ..Token::plain(*id)
        }
    }

    /// Moves a token to `location`, replacing any previous assignment record.
    ///
    /// Returns the record that was removed, if any.
    pub fn set_location(
        &mut self,
        token: &Token,
        location: Location,
        timestamp: u64,
    ) -> Option<AssignmentRecord> {
        match location {
            Location::Pool(_) => self.remove_record(&token.id),
            Location::Placed { site, area } => self.place(token, site, area, timestamp).1,
        }
    }

    /// Places a token, returning the new record and the one it superseded.
    pub fn place(
        &mut self,
        token: &Token,
        site: SiteId,
        area: AreaId,
        timestamp: u64,
    ) -> (AssignmentRecord, Option<AssignmentRecord>) {
        let previous = self.remove_record(&token.id);
        let origin = match &previous {
            Some(record) => Origin::Site(record.target.clone()),
            None => Origin::Pool(token.kind()),
        };
        let record = AssignmentRecord::new(token.clone(), site.clone(), area, origin, timestamp);
        self.assignments
            .entry(site)
            .or_default()
            .push(record.clone());
        (record, previous)
    }

    /// Rewrites the composition of a placed token in its existing record.
    ///
    /// Returns false if the token is not placed.
    pub fn set_record_composition(
        &mut self,
        id: &TokenId,
        composition: Option<Composition>,
    ) -> bool {
        match self.record_mut(id) {
            Some(record) => {
                record.set_composition(composition);
                true
            }
            None => false,
        }
    }

    fn remove_record(&mut self, id: &TokenId) -> Option<AssignmentRecord> {
        let mut removed = None;
        for records in self.assignments.values_mut() {
            if let Some(pos) = records.iter().position(|r| r.token.id == *id) {
                removed = Some(records.remove(pos));
                break;
            }
        }
        self.assignments.retain(|_, records| !records.is_empty());
        removed
    }

    /// Records of one site in insertion order.
    pub fn assignments(&self, site: &SiteId) -> &[AssignmentRecord] {
        self.assignments.get(site).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every live record with the key it is filed under.
    pub fn all_assignments(&self) -> impl Iterator<Item = (&SiteId, &AssignmentRecord)> {
        self.assignments
            .iter()
            .flat_map(|(site, records)| records.iter().map(move |r| (site, r)))
    }

    // -- tombstones -------------------------------------------------------

    pub fn is_tombstoned(&self, id: &TokenId) -> bool {
        self.tombstones
            .get(&id.kind)
            .is_some_and(|set| set.contains(id))
    }

    /// Returns true if the tombstone was newly added.
    pub fn add_tombstone(&mut self, id: TokenId) -> bool {
        self.tombstones.entry(id.kind).or_default().insert(id)
    }

    /// Returns true if a tombstone was removed.
    pub fn remove_tombstone(&mut self, id: &TokenId) -> bool {
        let Some(set) = self.tombstones.get_mut(&id.kind) else {
            return false;
        };
        let removed = set.remove(id);
        if set.is_empty() {
            self.tombstones.remove(&id.kind);
        }
        removed
    }

    pub fn tombstones(&self, pool: TokenType) -> impl Iterator<Item = &TokenId> {
        self.tombstones.get(&pool).into_iter().flatten()
    }

    // -- combinations -----------------------------------------------------

    /// The pending composite recorded for a pooled host.
    pub fn combination(&self, host: &TokenId) -> Option<Composition> {
        self.pending
            .get(&host.kind)?
            .iter()
            .find(|pair| pair.host == host.number)
            .map(PendingComposite::composition)
    }

    /// Records a pending composite, replacing any previous one for the host.
    pub fn set_combination(&mut self, host: &TokenId, composition: Composition) {
        let pairs = self.pending.entry(host.kind).or_default();
        pairs.retain(|pair| pair.host != host.number);
        pairs.push(PendingComposite {
            host: host.number,
            part: composition.part,
            style: composition.style,
        });
    }

    pub fn clear_combination(&mut self, host: &TokenId) -> Option<Composition> {
        let pairs = self.pending.get_mut(&host.kind)?;
        let pos = pairs.iter().position(|pair| pair.host == host.number)?;
        let removed = pairs.remove(pos);
        if pairs.is_empty() {
            self.pending.remove(&host.kind);
        }
        Some(removed.composition())
    }

    pub fn pending(&self, pool: TokenType) -> &[PendingComposite] {
        self.pending.get(&pool).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Composition of a host wherever it is: placed record or pending map.
    pub fn composition_of(&self, host: &TokenId) -> Option<Composition> {
        match self.record(host) {
            Some(record) => record.token.composition,
            None => self.combination(host),
        }
    }

    /// The host currently carrying cylinder `part`, if any.
    pub fn absorbing_host(&self, part: &TokenId) -> Option<TokenId> {
        if part.kind != TokenType::Cylinder {
            return None;
        }
        let placed = self.all_assignments().find_map(|(_, record)| {
            record
                .token
                .composition
                .filter(|c| c.part == part.number)
                .map(|_| record.token.id)
        });
        placed.or_else(|| {
            self.pending.iter().find_map(|(pool, pairs)| {
                pairs
                    .iter()
                    .find(|pair| pair.part == part.number)
                    .map(|pair| pair.host_id(*pool))
            })
        })
    }

    // -- invariants -------------------------------------------------------

    /// Checks the structural invariants of the state against `catalog`.
    pub fn check_invariants(&self, catalog: &Catalog) -> Vec<InvariantViolation> {
        let mut violations = Vec::new();
        let mut seen = BTreeSet::new();
        let mut parts = BTreeSet::new();

        for (filed, record) in self.all_assignments() {
            let id = record.token.id;
            if !catalog.contains(&id) {
                violations.push(InvariantViolation::UnknownToken(id));
            }
            if !seen.insert(id) {
                violations.push(InvariantViolation::DuplicateRecord(id));
            }
            if *filed != record.target {
                violations.push(InvariantViolation::MisfiledRecord {
                    token: id,
                    filed: filed.clone(),
                    target: record.target.clone(),
                });
            }
            let tombstoned = self.is_tombstoned(&id);
            if record.token.is_personalized() {
                if !tombstoned {
                    violations.push(InvariantViolation::PersonalBaseVisible(id));
                }
            } else if tombstoned {
                violations.push(InvariantViolation::PlacedAndTombstoned(id));
            }
            if let Some(composition) = record.token.composition {
                if !id.kind.can_host() {
                    violations.push(InvariantViolation::InvalidHost(id));
                }
                if !parts.insert(composition.part_id()) {
                    violations.push(InvariantViolation::SharedPart(composition.part_id()));
                }
            }
            if self.combination(&id).is_some() {
                violations.push(InvariantViolation::PendingForPlacedHost(id));
            }
        }

        for (pool, pairs) in &self.pending {
            for pair in pairs {
                let host = pair.host_id(*pool);
                if !pool.can_host() || !catalog.contains(&host) {
                    violations.push(InvariantViolation::InvalidHost(host));
                }
                let part = pair.composition().part_id();
                if !parts.insert(part) {
                    violations.push(InvariantViolation::SharedPart(part));
                }
            }
        }

        for part in &parts {
            if !catalog.contains(part) {
                violations.push(InvariantViolation::UnknownToken(*part));
            }
            if !self.is_tombstoned(part) {
                violations.push(InvariantViolation::VisiblePart(*part));
            }
            if self.record(part).is_some() {
                violations.push(InvariantViolation::PlacedPart(*part));
            }
        }

        for id in self.tombstones.values().flatten() {
            if !catalog.contains(id) {
                violations.push(InvariantViolation::UnknownToken(*id));
            }
        }

        violations
    }
}

fn parse_key(key: &str) -> Result<RecordKey, StoreError> {
    key.parse()
        .map_err(|_| StoreError::MalformedKey(key.to_string()))
}

fn encode<T: Serialize>(key: &str, value: &T) -> Result<Vec<u8>, StoreError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes).map_err(|e| StoreError::Encode {
        key: key.to_string(),
        message: e.to_string(),
    })?;
    Ok(bytes)
}

fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T, StoreError> {
    ciborium::from_reader(bytes).map_err(|e| StoreError::Decode {
        key: key.to_string(),
        message: e.to_string(),
    })
}

/// Durable, write-through token store.
///
/// Every mutation re-reads the backing store, applies the change to a working
/// copy and writes the changed keys in one batch. A failed write leaves both
/// the backing store and the in-memory state at their last durable value.
pub struct TokenStore<S> {
    backend: S,
    state: StoreState,
}

impl<S: Store> TokenStore<S> {
    /// Opens a token store, loading its current contents.
    pub fn open(backend: S) -> Result<Self, StoreError> {
        let state = StoreState::load(&backend)?;
        Ok(Self { backend, state })
    }

    /// The state as of the last load or successful mutation.
    pub fn state(&self) -> &StoreState {
        &self.state
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    /// Re-reads the backing store, picking up writes made by other processes
    /// or a bulk restore.
    pub fn reload(&mut self) -> Result<&StoreState, StoreError> {
        self.state = StoreState::load(&self.backend)?;
        Ok(&self.state)
    }

    /// Runs `mutate` against freshly loaded state and persists the result.
    ///
    /// Nothing is written when `mutate` fails or changes nothing.
    pub fn transact<T, E>(
        &mut self,
        mutate: impl FnOnce(&mut StoreState) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let fresh = StoreState::load(&self.backend)?;
        let before = fresh.encode()?;
        let mut working = fresh.clone();
        self.state = fresh;

        let value = mutate(&mut working)?;

        let after = working.encode()?;
        let batch = diff(&before, after);
        if !batch.is_empty() {
            let keys = batch.len();
            self.backend.apply(batch).map_err(|e| {
                warn!(error = %e, "store flush failed, keeping last durable state");
                StoreError::backend(e)
            })?;
            debug!(keys, "flushed store mutation");
        }
        self.state = working;
        Ok(value)
    }

    pub fn location(&self, id: &TokenId) -> Location {
        self.state.location(id)
    }

    pub fn set_location(
        &mut self,
        token: &Token,
        location: Location,
    ) -> Result<Option<AssignmentRecord>, StoreError> {
        self.transact(|state| Ok(state.set_location(token, location, now_millis())))
    }

    pub fn contains_tombstone(&self, id: &TokenId) -> bool {
        self.state.is_tombstoned(id)
    }

    pub fn add_tombstone(&mut self, id: TokenId) -> Result<bool, StoreError> {
        self.transact(|state| Ok(state.add_tombstone(id)))
    }

    pub fn remove_tombstone(&mut self, id: &TokenId) -> Result<bool, StoreError> {
        self.transact(|state| Ok(state.remove_tombstone(id)))
    }

    pub fn combination(&self, host: &TokenId) -> Option<Composition> {
        self.state.combination(host)
    }

    pub fn set_combination(
        &mut self,
        host: &TokenId,
        part: u32,
        style: Palette,
    ) -> Result<(), StoreError> {
        self.transact(|state| {
            state.set_combination(host, Composition { part, style });
            Ok(())
        })
    }

    pub fn clear_combination(&mut self, host: &TokenId) -> Result<Option<Composition>, StoreError> {
        self.transact(|state| Ok(state.clear_combination(host)))
    }
}

fn diff(before: &BTreeMap<String, Vec<u8>>, after: BTreeMap<String, Vec<u8>>) -> Vec<BatchOp> {
    let mut batch: Vec<BatchOp> = before
        .keys()
        .filter(|key| !after.contains_key(*key))
        .map(|key| (key.clone(), None))
        .collect();
    for (key, bytes) in after {
        if before.get(&key) != Some(&bytes) {
            batch.push((key, Some(bytes)));
        }
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn pa(number: u32) -> TokenId {
        TokenId::new(TokenType::BreathingApparatus, number)
    }

    fn fl(number: u32) -> TokenId {
        TokenId::new(TokenType::Cylinder, number)
    }

    fn placed(site: &str, area: AreaId) -> Location {
        Location::Placed {
            site: SiteId::new(site),
            area,
        }
    }

    #[test]
    fn set_location_replaces_previous_record() {
        let mut state = StoreState::new();
        let token = Token::plain(pa(5));

        state.set_location(&token, placed("Vehicle-1", AreaId::BreathingApparatus), 1);
        let previous =
            state.set_location(&token, placed("Site-A", AreaId::BreathingApparatus), 2);

        assert_eq!(previous.unwrap().target, SiteId::new("Vehicle-1"));
        assert!(state.assignments(&SiteId::new("Vehicle-1")).is_empty());
        let record = state.record(&pa(5)).unwrap();
        assert_eq!(record.origin, Origin::Site(SiteId::new("Vehicle-1")));
        assert_eq!(record.timestamp, 2);
        assert_eq!(state.location(&pa(5)), placed("Site-A", AreaId::BreathingApparatus));
    }

    #[test]
    fn set_location_pool_removes_record() {
        let mut state = StoreState::new();
        let token = Token::plain(pa(5));
        state.set_location(&token, placed("Vehicle-1", AreaId::BreathingApparatus), 1);

        let removed = state.set_location(&token, Location::Pool(TokenType::BreathingApparatus), 2);

        assert!(removed.is_some());
        assert_eq!(state.location(&pa(5)), Location::Pool(TokenType::BreathingApparatus));
        assert_eq!(state.all_assignments().count(), 0);
    }

    #[test]
    fn tombstones_toggle() {
        let mut state = StoreState::new();
        assert!(state.add_tombstone(fl(130)));
        assert!(!state.add_tombstone(fl(130)));
        assert!(state.is_tombstoned(&fl(130)));
        assert!(state.remove_tombstone(&fl(130)));
        assert!(!state.remove_tombstone(&fl(130)));
        assert_eq!(state, StoreState::new());
    }

    #[test]
    fn combinations_and_absorbing_host() {
        let mut state = StoreState::new();
        let composition = Composition {
            part: 126,
            style: Palette::Primary,
        };
        state.set_combination(&pa(12), composition);

        assert_eq!(state.combination(&pa(12)), Some(composition));
        assert_eq!(state.absorbing_host(&fl(126)), Some(pa(12)));
        assert_eq!(state.token(&pa(12)).label(), "PA 12 mit FL 126");

        assert_eq!(state.clear_combination(&pa(12)), Some(composition));
        assert_eq!(state.absorbing_host(&fl(126)), None);
        assert_eq!(state, StoreState::new());
    }

    #[test]
    fn transact_persists_and_reloads() {
        let backend = MemoryStore::new();
        let mut store = TokenStore::open(&backend).unwrap();

        store.add_tombstone(fl(140)).unwrap();
        store
            .set_location(
                &Token::plain(pa(7)),
                placed("Site-B", AreaId::BreathingApparatus),
            )
            .unwrap();

        assert!(backend.has("tombstones/FL").unwrap());
        assert!(backend.has("assignments/Site-B").unwrap());

        let reopened = TokenStore::open(&backend).unwrap();
        assert_eq!(reopened.state(), store.state());
    }

    #[test]
    fn emptied_keys_are_deleted() {
        let backend = MemoryStore::new();
        let mut store = TokenStore::open(&backend).unwrap();

        store.add_tombstone(fl(140)).unwrap();
        store.remove_tombstone(&fl(140)).unwrap();

        assert!(!backend.has("tombstones/FL").unwrap());
    }

    #[test]
    fn transact_sees_external_writes() {
        let backend = MemoryStore::new();
        let mut first = TokenStore::open(&backend).unwrap();
        let mut second = TokenStore::open(&backend).unwrap();

        first.add_tombstone(fl(101)).unwrap();
        second.add_tombstone(fl(102)).unwrap();

        assert!(second.contains_tombstone(&fl(101)));
        assert!(second.contains_tombstone(&fl(102)));
    }

    #[test]
    fn failed_mutation_writes_nothing() {
        let backend = MemoryStore::new();
        let mut store = TokenStore::open(&backend).unwrap();

        let result: Result<(), StoreError> = store.transact(|state| {
            state.add_tombstone(fl(150));
            Err(StoreError::MalformedKey("abort".to_string()))
        });

        assert!(result.is_err());
        assert!(!store.contains_tombstone(&fl(150)));
        assert!(!backend.has("tombstones/FL").unwrap());
    }

    #[test]
    fn corrupt_value_is_a_decode_error() {
        let backend = MemoryStore::new();
        backend.put("tombstones/FL", b"\xff\x00garbage").unwrap();

        let err = TokenStore::open(&backend).err().unwrap();
        assert!(matches!(err, StoreError::Decode { .. }));
    }

    #[test]
    fn invariants_catch_visible_part() {
        let catalog = Catalog::standard();
        let mut state = StoreState::new();
        state.set_combination(
            &pa(12),
            Composition {
                part: 126,
                style: Palette::Primary,
            },
        );

        assert_eq!(
            state.check_invariants(&catalog),
            vec![InvariantViolation::VisiblePart(fl(126))]
        );

        state.add_tombstone(fl(126));
        assert!(state.check_invariants(&catalog).is_empty());
    }
}
