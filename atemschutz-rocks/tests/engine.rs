//! The placement engine running on RocksDB.

use atemschutz_core::{AreaId, Catalog, Layout, PlacementEngine, SiteId, TokenId, TokenState};
use atemschutz_rocks::RocksStore;
use tempfile::TempDir;

#[test]
fn placements_survive_restart() {
    let dir = TempDir::new().unwrap();
    let catalog = Catalog::standard();
    let layout = Layout::standard();
    let pa: TokenId = "PA 12".parse().unwrap();
    let fl: TokenId = "FL 126".parse().unwrap();
    let am: TokenId = "AM 45".parse().unwrap();

    {
        let store = RocksStore::open(dir.path()).unwrap();
        let mut engine = PlacementEngine::open(&catalog, &layout, store).unwrap();
        engine.combine(pa, fl).unwrap();
        engine
            .move_to(pa, &SiteId::new("Vehicle-3"), AreaId::BreathingApparatus)
            .unwrap();
        engine
            .personalize(am, "J. Müller", &SiteId::new("Site-A"))
            .unwrap();
    }

    let store = RocksStore::open(dir.path()).unwrap();
    let mut engine = PlacementEngine::open(&catalog, &layout, store).unwrap();
    let records = engine.query().assigned(&SiteId::new("Vehicle-3"));
    assert_eq!(records[0].label, "PA 12 mit FL 126");
    assert_eq!(
        engine.query().state_of(&fl),
        TokenState::Absorbed { host: pa }
    );
    assert!(matches!(
        engine.query().state_of(&am),
        TokenState::Personalized { .. }
    ));

    engine.split(pa).unwrap();
    assert_eq!(engine.query().state_of(&fl), TokenState::Free);
    assert!(engine.state().check_invariants(&catalog).is_empty());
}
