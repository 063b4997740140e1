//! Category restrictions deciding which areas a token may be placed in.

use crate::catalog::TokenType;
use crate::layout::{AreaId, Site};
use crate::token::Token;

/// Areas of `site` that may receive `token`, in display order.
///
/// The first matching rule wins. The result only ever contains areas the
/// site actually exposes.
pub fn allowed_areas(token: &Token, site: &Site) -> Vec<AreaId> {
    let candidates: Vec<AreaId> = match token.kind() {
        TokenType::SafetyBag => vec![AreaId::SafetyBag],
        TokenType::BreathingApparatus => vec![AreaId::BreathingApparatus],
        TokenType::FaceMask if token.is_personalized() => {
            if site.personal_masks {
                vec![AreaId::PersonalMask]
            } else {
                Vec::new()
            }
        }
        TokenType::FaceMask => vec![AreaId::FaceMask],
        TokenType::EscapeHood => vec![AreaId::EscapeHood],
        TokenType::TechnicalCylinder if site.is_vehicle() => {
            vec![AreaId::Sprungretter, AreaId::TechnicalCylinder]
        }
        TokenType::TechnicalCylinder => vec![AreaId::TechnicalCylinder, AreaId::Sprungretter],
        // Loose cylinders travel on vehicles only as part of a composite.
        TokenType::Cylinder if site.is_vehicle() && !site.quick_transit => Vec::new(),
        TokenType::Cylinder => site.areas.clone(),
    };

    candidates
        .into_iter()
        .filter(|area| site.exposes(*area))
        .collect()
}

/// Whether `token` may be placed in `area` of `site`.
pub fn is_allowed(token: &Token, site: &Site, area: AreaId) -> bool {
    allowed_areas(token, site).contains(&area)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Palette, TokenId};
    use crate::layout::{Layout, SiteId};
    use crate::token::{Composition, Personalization};

    fn site(id: &str) -> Site {
        Layout::standard().site(&SiteId::new(id)).unwrap().clone()
    }

    fn token(kind: TokenType, number: u32) -> Token {
        Token::plain(TokenId::new(kind, number))
    }

    #[test]
    fn safety_bag_only_in_bag_area() {
        let bag = token(TokenType::SafetyBag, 1);
        assert_eq!(allowed_areas(&bag, &site("Vehicle-1")), vec![AreaId::SafetyBag]);

        let composite = Token {
            composition: Some(Composition {
                part: 150,
                style: Palette::Primary,
            }),
            ..bag
        };
        assert_eq!(
            allowed_areas(&composite, &site("Site-A")),
            vec![AreaId::SafetyBag]
        );
    }

    #[test]
    fn personal_masks_need_eligible_site() {
        let mask = Token {
            personalization: Some(Personalization {
                owner: "A. Schmidt".to_string(),
            }),
            ..token(TokenType::FaceMask, 3)
        };
        assert_eq!(
            allowed_areas(&mask, &site("Site-A")),
            vec![AreaId::PersonalMask]
        );
        assert!(allowed_areas(&mask, &site("Workshop")).is_empty());
        assert!(allowed_areas(&mask, &site("Vehicle-1")).is_empty());

        let anonymous = token(TokenType::FaceMask, 3);
        assert_eq!(
            allowed_areas(&anonymous, &site("Site-A")),
            vec![AreaId::FaceMask]
        );
    }

    #[test]
    fn technical_cylinder_order_depends_on_site_kind() {
        let tf = token(TokenType::TechnicalCylinder, 4);
        assert_eq!(
            allowed_areas(&tf, &site("Vehicle-2")),
            vec![AreaId::Sprungretter, AreaId::TechnicalCylinder]
        );
        assert_eq!(
            allowed_areas(&tf, &site("Site-B")),
            vec![AreaId::TechnicalCylinder, AreaId::Sprungretter]
        );
    }

    #[test]
    fn loose_cylinders_restricted_on_vehicles() {
        let fl = token(TokenType::Cylinder, 120);
        assert!(allowed_areas(&fl, &site("Vehicle-3")).is_empty());
        assert!(allowed_areas(&fl, &site("Vehicle-5")).is_empty());

        let transit = site("Vehicle-1");
        assert_eq!(allowed_areas(&fl, &transit), transit.areas);

        let storage = site("Workshop");
        assert_eq!(allowed_areas(&fl, &storage), storage.areas);
    }

    #[test]
    fn result_limited_to_exposed_areas() {
        let mut bare = site("Site-A");
        bare.areas.retain(|a| *a != AreaId::EscapeHood);
        assert!(allowed_areas(&token(TokenType::EscapeHood, 1), &bare).is_empty());
        assert!(!is_allowed(
            &token(TokenType::EscapeHood, 1),
            &bare,
            AreaId::EscapeHood
        ));
    }
}
