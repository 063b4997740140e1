use atemschutz_core::{
    AreaId, Catalog, Layout, MemoryStore, PlacementEngine, SiteId, TokenId, TokenState, TokenType,
};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Move(TokenId, usize, AreaId),
    Home(TokenId),
    Combine(TokenId, TokenId),
    Split(TokenId),
    Tombstone(TokenId),
    Restore(TokenId),
    Personalize(TokenId, usize),
}

const SITES: [&str; 5] = ["Vehicle-1", "Vehicle-3", "Site-A", "Site-B", "Workshop"];

fn token_strategy() -> impl Strategy<Value = TokenId> {
    prop_oneof![
        (1u32..=4).prop_map(|n| TokenId::new(TokenType::BreathingApparatus, n)),
        (101u32..=104).prop_map(|n| TokenId::new(TokenType::Cylinder, n)),
        (1u32..=3).prop_map(|n| TokenId::new(TokenType::SafetyBag, n)),
        (1u32..=3).prop_map(|n| TokenId::new(TokenType::FaceMask, n)),
        (1u32..=2).prop_map(|n| TokenId::new(TokenType::TechnicalCylinder, n)),
        (0u8..=1).prop_map(|o| TokenId::with_occurrence(TokenType::EscapeHood, 17, o)),
    ]
}

fn area_strategy() -> impl Strategy<Value = AreaId> {
    proptest::sample::select(AreaId::ALL.to_vec())
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (token_strategy(), 0..SITES.len(), area_strategy())
            .prop_map(|(t, s, a)| Op::Move(t, s, a)),
        token_strategy().prop_map(Op::Home),
        (token_strategy(), token_strategy()).prop_map(|(h, p)| Op::Combine(h, p)),
        token_strategy().prop_map(Op::Split),
        token_strategy().prop_map(Op::Tombstone),
        token_strategy().prop_map(Op::Restore),
        (token_strategy(), 0..SITES.len()).prop_map(|(t, s)| Op::Personalize(t, s)),
    ]
}

fn apply(engine: &mut PlacementEngine<'_, &MemoryStore>, op: &Op) {
    // Rejections are expected; only the resulting state matters here.
    let _ = match op {
        Op::Move(t, s, a) => engine.move_to(*t, &SiteId::new(SITES[*s]), *a).map(drop),
        Op::Home(t) => engine.return_home(*t).map(drop),
        Op::Combine(h, p) => engine.combine(*h, *p).map(drop),
        Op::Split(h) => engine.split(*h).map(drop),
        Op::Tombstone(t) => engine.tombstone(*t).map(drop),
        Op::Restore(t) => engine.restore(*t).map(drop),
        Op::Personalize(t, s) => engine
            .personalize(*t, "P. Probe", &SiteId::new(SITES[*s]))
            .map(drop),
    };
}

proptest! {
    #[test]
    fn invariants_hold_after_any_sequence(ops in proptest::collection::vec(op_strategy(), 0..40)) {
        let catalog = Catalog::standard();
        let layout = Layout::standard();
        let backend = MemoryStore::new();
        let mut engine = PlacementEngine::open(&catalog, &layout, &backend).unwrap();

        for op in &ops {
            apply(&mut engine, op);
            let violations = engine.state().check_invariants(&catalog);
            prop_assert!(violations.is_empty(), "after {:?}: {:?}", op, violations);
        }

        // The in-memory state always matches what is durable.
        let reopened = PlacementEngine::open(&catalog, &layout, &backend).unwrap();
        prop_assert_eq!(reopened.state(), engine.state());
    }

    #[test]
    fn combine_then_split_restores_both(
        setup in proptest::collection::vec(op_strategy(), 0..20),
        host in (1u32..=4).prop_map(|n| TokenId::new(TokenType::BreathingApparatus, n)),
        part in (101u32..=104).prop_map(|n| TokenId::new(TokenType::Cylinder, n)),
    ) {
        let catalog = Catalog::standard();
        let layout = Layout::standard();
        let backend = MemoryStore::new();
        let mut engine = PlacementEngine::open(&catalog, &layout, &backend).unwrap();
        for op in &setup {
            apply(&mut engine, op);
        }

        let location = engine.state().location(&host);
        let label = engine.state().token(&host).label();

        if engine.combine(host, part).is_ok() {
            engine.split(host).unwrap();
            prop_assert_eq!(engine.query().state_of(&part), TokenState::Free);
            prop_assert_eq!(engine.state().location(&host), location);
            prop_assert_eq!(engine.state().token(&host).label(), label);
        }
    }

    #[test]
    fn tombstone_then_restore_is_invisible(
        setup in proptest::collection::vec(op_strategy(), 0..20),
        token in token_strategy(),
    ) {
        let catalog = Catalog::standard();
        let layout = Layout::standard();
        let backend = MemoryStore::new();
        let mut engine = PlacementEngine::open(&catalog, &layout, &backend).unwrap();
        for op in &setup {
            apply(&mut engine, op);
        }

        if engine.query().state_of(&token) == TokenState::Free {
            let before = engine.state().clone();
            engine.tombstone(token).unwrap();
            engine.restore(token).unwrap();
            prop_assert_eq!(engine.state(), &before);
        }
    }

    #[test]
    fn move_then_home_frees_token(
        token in token_strategy(),
        site in 0..SITES.len(),
        area in area_strategy(),
    ) {
        let catalog = Catalog::standard();
        let layout = Layout::standard();
        let backend = MemoryStore::new();
        let mut engine = PlacementEngine::open(&catalog, &layout, &backend).unwrap();

        if engine.move_to(token, &SiteId::new(SITES[site]), area).is_ok() {
            engine.return_home(token).unwrap();
            prop_assert_eq!(engine.query().state_of(&token), TokenState::Free);
            prop_assert_eq!(engine.state().all_assignments().count(), 0);
        }
    }
}
