use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Identifier of a vehicle or fixed storage location.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteId(String);

impl SiteId {
    pub fn new(id: impl Into<String>) -> Self {
        SiteId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SiteId {
    fn from(s: &str) -> Self {
        SiteId::new(s)
    }
}

/// Typed sub-bin of a site. The list is global and fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AreaId {
    #[serde(rename = "BreathingApparatus-Area")]
    BreathingApparatus,
    #[serde(rename = "Cylinder-Area")]
    Cylinder,
    #[serde(rename = "TechnicalCylinder-Area")]
    TechnicalCylinder,
    #[serde(rename = "Sprungretter-Area")]
    Sprungretter,
    #[serde(rename = "EscapeHood-Area")]
    EscapeHood,
    #[serde(rename = "FaceMask-Area")]
    FaceMask,
    #[serde(rename = "PersonalMask-Area")]
    PersonalMask,
    #[serde(rename = "SafetyBag-Area")]
    SafetyBag,
    /// Vehicle only.
    #[serde(rename = "Cabin-Area")]
    Cabin,
    /// Vehicle only.
    #[serde(rename = "Reserve-Area")]
    Reserve,
}

impl AreaId {
    pub const ALL: [AreaId; 10] = [
        AreaId::BreathingApparatus,
        AreaId::Cylinder,
        AreaId::TechnicalCylinder,
        AreaId::Sprungretter,
        AreaId::EscapeHood,
        AreaId::FaceMask,
        AreaId::PersonalMask,
        AreaId::SafetyBag,
        AreaId::Cabin,
        AreaId::Reserve,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AreaId::BreathingApparatus => "BreathingApparatus-Area",
            AreaId::Cylinder => "Cylinder-Area",
            AreaId::TechnicalCylinder => "TechnicalCylinder-Area",
            AreaId::Sprungretter => "Sprungretter-Area",
            AreaId::EscapeHood => "EscapeHood-Area",
            AreaId::FaceMask => "FaceMask-Area",
            AreaId::PersonalMask => "PersonalMask-Area",
            AreaId::SafetyBag => "SafetyBag-Area",
            AreaId::Cabin => "Cabin-Area",
            AreaId::Reserve => "Reserve-Area",
        }
    }

    /// Human-readable heading shown above the area.
    pub fn title(self) -> &'static str {
        match self {
            AreaId::BreathingApparatus => "Atemschutzgeräte",
            AreaId::Cylinder => "Flaschen",
            AreaId::TechnicalCylinder => "Technische Flaschen",
            AreaId::Sprungretter => "Sprungretter",
            AreaId::EscapeHood => "Fluchthauben",
            AreaId::FaceMask => "Atemschutzmasken",
            AreaId::PersonalMask => "Persönliche Masken",
            AreaId::SafetyBag => "Sicherheitstrupptaschen",
            AreaId::Cabin => "Mannschaftsraum",
            AreaId::Reserve => "Reserve",
        }
    }

    pub fn vehicle_only(self) -> bool {
        matches!(self, AreaId::Cabin | AreaId::Reserve)
    }
}

impl fmt::Display for AreaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AreaId {
    type Err = String;

    /// Accepts the full id (`"SafetyBag-Area"`) or its stem (`"SafetyBag"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stem = s.strip_suffix("-Area").unwrap_or(s);
        AreaId::ALL
            .into_iter()
            .find(|area| {
                area.as_str()
                    .strip_suffix("-Area")
                    .is_some_and(|own| own.eq_ignore_ascii_case(stem))
            })
            .ok_or_else(|| format!("unknown area: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteKind {
    Vehicle,
    Storage,
}

/// A vehicle or fixed location able to host placed tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub id: SiteId,
    pub title: String,
    pub kind: SiteKind,
    /// Areas exposed by this site, in display order.
    pub areas: Vec<AreaId>,
    /// Whether personalized masks may be placed here.
    #[serde(default)]
    pub personal_masks: bool,
    /// Vehicle that loose cylinders may be moved onto directly.
    #[serde(default)]
    pub quick_transit: bool,
}

impl Site {
    pub fn is_vehicle(&self) -> bool {
        self.kind == SiteKind::Vehicle
    }

    pub fn exposes(&self, area: AreaId) -> bool {
        self.areas.contains(&area)
    }
}

/// Error raised when a layout breaks one of its structural rules.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("site titled {0:?} has an empty id")]
    EmptySiteId(String),
    #[error("duplicate site id: {0}")]
    DuplicateSite(SiteId),
    #[error("site {site} lists area {area} twice")]
    DuplicateArea { site: SiteId, area: AreaId },
    #[error("storage site {site} cannot expose vehicle-only area {area}")]
    VehicleOnlyArea { site: SiteId, area: AreaId },
    #[error("site {0} is not a vehicle but is marked quick-transit")]
    QuickTransitStorage(SiteId),
}

/// All sites known to the system, built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    sites: IndexMap<SiteId, Site>,
}

impl Layout {
    /// Builds a layout from a list of sites, validating it.
    pub fn new(sites: impl IntoIterator<Item = Site>) -> Result<Self, LayoutError> {
        let mut map = IndexMap::new();
        for site in sites {
            if site.id.as_str().trim().is_empty() {
                return Err(LayoutError::EmptySiteId(site.title));
            }
            for (i, area) in site.areas.iter().enumerate() {
                if site.areas[..i].contains(area) {
                    return Err(LayoutError::DuplicateArea {
                        site: site.id.clone(),
                        area: *area,
                    });
                }
                if area.vehicle_only() && !site.is_vehicle() {
                    return Err(LayoutError::VehicleOnlyArea {
                        site: site.id.clone(),
                        area: *area,
                    });
                }
            }
            if site.quick_transit && !site.is_vehicle() {
                return Err(LayoutError::QuickTransitStorage(site.id));
            }
            if map.contains_key(&site.id) {
                return Err(LayoutError::DuplicateSite(site.id));
            }
            map.insert(site.id.clone(), site);
        }
        Ok(Self { sites: map })
    }

    /// The built-in fire-station layout.
    pub fn standard() -> Self {
        let vehicle = |id: &str, title: &str, quick_transit: bool| Site {
            id: SiteId::new(id),
            title: title.to_string(),
            kind: SiteKind::Vehicle,
            areas: vec![
                AreaId::BreathingApparatus,
                AreaId::Cylinder,
                AreaId::TechnicalCylinder,
                AreaId::Sprungretter,
                AreaId::EscapeHood,
                AreaId::FaceMask,
                AreaId::SafetyBag,
                AreaId::Cabin,
                AreaId::Reserve,
            ],
            personal_masks: false,
            quick_transit,
        };
        let storage = |id: &str, title: &str, personal_masks: bool| {
            let mut areas = vec![
                AreaId::BreathingApparatus,
                AreaId::Cylinder,
                AreaId::TechnicalCylinder,
                AreaId::Sprungretter,
                AreaId::EscapeHood,
                AreaId::FaceMask,
                AreaId::SafetyBag,
            ];
            if personal_masks {
                areas.push(AreaId::PersonalMask);
            }
            Site {
                id: SiteId::new(id),
                title: title.to_string(),
                kind: SiteKind::Storage,
                areas,
                personal_masks,
                quick_transit: false,
            }
        };

        let sites = vec![
            vehicle("Vehicle-1", "HLF 20", true),
            vehicle("Vehicle-2", "LF 10", true),
            vehicle("Vehicle-3", "DLK 23/12", false),
            vehicle("Vehicle-4", "GW-Atemschutz", true),
            vehicle("Vehicle-5", "MTW", false),
            storage("Site-A", "Gerätehaus Nord", true),
            storage("Site-B", "Gerätehaus Süd", true),
            storage("Workshop", "Atemschutzwerkstatt", false),
        ];
        // The built-in list is known to be valid.
        Self {
            sites: sites.into_iter().map(|s| (s.id.clone(), s)).collect(),
        }
    }

    pub fn site(&self, id: &SiteId) -> Option<&Site> {
        self.sites.get(id)
    }

    pub fn sites(&self) -> impl Iterator<Item = &Site> {
        self.sites.values()
    }

    pub fn contains(&self, id: &SiteId) -> bool {
        self.sites.contains_key(id)
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_layout_is_valid() {
        let standard = Layout::standard();
        let rebuilt = Layout::new(standard.sites().cloned()).unwrap();
        assert_eq!(rebuilt, standard);
    }

    #[test]
    fn standard_has_three_quick_transit_vehicles() {
        let layout = Layout::standard();
        assert_eq!(layout.sites().filter(|s| s.quick_transit).count(), 3);
        assert!(layout.sites().filter(|s| s.quick_transit).all(Site::is_vehicle));
    }

    #[test]
    fn rejects_duplicate_site() {
        let site = Layout::standard().site(&"Site-A".into()).unwrap().clone();
        let err = Layout::new([site.clone(), site]).unwrap_err();
        assert_eq!(err, LayoutError::DuplicateSite("Site-A".into()));
    }

    #[test]
    fn rejects_empty_site_id() {
        let mut site = Layout::standard().site(&"Site-A".into()).unwrap().clone();
        site.id = SiteId::new("");
        assert_eq!(
            Layout::new([site.clone()]).unwrap_err(),
            LayoutError::EmptySiteId(site.title.clone())
        );

        site.id = SiteId::new("  ");
        assert!(matches!(
            Layout::new([site]),
            Err(LayoutError::EmptySiteId(_))
        ));
    }

    #[test]
    fn rejects_vehicle_area_in_storage() {
        let mut site = Layout::standard().site(&"Site-A".into()).unwrap().clone();
        site.areas.push(AreaId::Cabin);
        assert!(matches!(
            Layout::new([site]),
            Err(LayoutError::VehicleOnlyArea { area: AreaId::Cabin, .. })
        ));
    }

    #[test]
    fn parse_area_ids() {
        assert_eq!("SafetyBag-Area".parse::<AreaId>(), Ok(AreaId::SafetyBag));
        assert_eq!("personalmask".parse::<AreaId>(), Ok(AreaId::PersonalMask));
        assert!("Roof".parse::<AreaId>().is_err());
    }
}
