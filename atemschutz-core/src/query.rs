//! Read-only views derived from the token store.

use crate::catalog::{Catalog, Palette, TokenId, TokenType};
use crate::layout::{AreaId, Layout, SiteId};
use crate::record::AssignmentRecord;
use crate::state::StoreState;
use crate::token::Composition;

/// Exactly one of these holds for every catalog token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenState {
    /// In its pool and available.
    Free,
    /// In its pool but hidden.
    Tombstoned,
    Placed { site: SiteId, area: AreaId },
    /// Carried by a composite host.
    Absorbed { host: TokenId },
    /// Placed as a personal mask; the anonymous number is hidden.
    Personalized { site: SiteId, owner: String },
}

/// One item of a pool list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolEntry {
    pub id: TokenId,
    pub label: String,
    pub palette: Option<Palette>,
    /// Cylinder waiting to be placed together with this host.
    pub composition: Option<Composition>,
}

/// Records of one area of a site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AreaView<'a> {
    pub area: AreaId,
    pub title: &'static str,
    pub records: Vec<&'a AssignmentRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchHit<'a> {
    Assigned(&'a AssignmentRecord),
    Tombstoned { id: TokenId, label: String },
}

/// Query layer over a loaded state.
#[derive(Clone, Copy)]
pub struct Query<'a> {
    catalog: &'a Catalog,
    layout: &'a Layout,
    state: &'a StoreState,
}

impl<'a> Query<'a> {
    pub fn new(catalog: &'a Catalog, layout: &'a Layout, state: &'a StoreState) -> Self {
        Self {
            catalog,
            layout,
            state,
        }
    }

    pub fn state_of(&self, id: &TokenId) -> TokenState {
        if let Some(record) = self.state.record(id) {
            return match &record.token.personalization {
                Some(personalization) => TokenState::Personalized {
                    site: record.target.clone(),
                    owner: personalization.owner.clone(),
                },
                None => TokenState::Placed {
                    site: record.target.clone(),
                    area: record.area,
                },
            };
        }
        if let Some(host) = self.state.absorbing_host(id) {
            return TokenState::Absorbed { host };
        }
        if self.state.is_tombstoned(id) {
            TokenState::Tombstoned
        } else {
            TokenState::Free
        }
    }

    /// Tokens of a pool that can be picked up, in catalog order.
    pub fn available(&self, pool: TokenType) -> Vec<PoolEntry> {
        self.catalog
            .tokens(pool)
            .iter()
            .filter(|id| self.state_of(id) == TokenState::Free)
            .map(|id| {
                let token = self.state.token(id);
                PoolEntry {
                    id: *id,
                    label: token.label(),
                    palette: Palette::of(id),
                    composition: token.composition,
                }
            })
            .collect()
    }

    /// Tokens hidden from a pool by hand (absorbed cylinders excluded).
    pub fn tombstoned(&self, pool: TokenType) -> Vec<TokenId> {
        self.catalog
            .tokens(pool)
            .iter()
            .filter(|id| self.state_of(id) == TokenState::Tombstoned)
            .copied()
            .collect()
    }

    /// Cylinders currently carried by a composite, with their hosts, in
    /// catalog order.
    pub fn absorbed(&self) -> Vec<(TokenId, TokenId)> {
        self.catalog
            .tokens(TokenType::Cylinder)
            .iter()
            .filter_map(|part| match self.state_of(part) {
                TokenState::Absorbed { host } => Some((*part, host)),
                _ => None,
            })
            .collect()
    }

    /// Records of a site in the order they were placed.
    pub fn assigned(&self, site: &SiteId) -> &'a [AssignmentRecord] {
        self.state.assignments(site)
    }

    /// Records of a site grouped by area, in the site's area order.
    ///
    /// Records filed under an area the site no longer exposes are appended
    /// in a trailing group so they stay visible.
    pub fn assigned_by_area(&self, site: &SiteId) -> Vec<AreaView<'a>> {
        let records = self.state.assignments(site);
        let mut areas: Vec<AreaId> = self
            .layout
            .site(site)
            .map(|s| s.areas.clone())
            .unwrap_or_default();
        for record in records {
            if !areas.contains(&record.area) {
                areas.push(record.area);
            }
        }
        areas
            .into_iter()
            .map(|area| AreaView {
                area,
                title: area.title(),
                records: records.iter().filter(|r| r.area == area).collect(),
            })
            .collect()
    }

    /// Case-insensitive substring search over placed and hidden tokens.
    pub fn search(&self, needle: &str) -> Vec<SearchHit<'a>> {
        let needle = needle.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let mut hits: Vec<SearchHit<'a>> = self
            .state
            .all_assignments()
            .map(|(_, record)| record)
            .filter(|record| {
                record.label.to_lowercase().contains(&needle)
                    || record.target.as_str().to_lowercase().contains(&needle)
            })
            .map(SearchHit::Assigned)
            .collect();
        for pool in TokenType::ALL {
            for id in self.state.tombstones(pool) {
                let label = id.to_string();
                if label.to_lowercase().contains(&needle) {
                    hits.push(SearchHit::Tombstoned { id: *id, label });
                }
            }
        }
        hits
    }
}
