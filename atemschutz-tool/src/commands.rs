use std::io::Write;

use atemschutz_core::{
    AreaId, HomeOutcome, PlacementEngine, SearchHit, SiteId, Store, TokenId, TokenState,
    TokenType,
};
use clap::Subcommand;

use crate::error::ToolError;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the available tokens of a pool
    Pool {
        /// Token type: PA, FL, TF, FH, AM or Si
        kind: TokenType,
    },
    /// List what is placed at a site, by area
    Site { site: String },
    /// List all sites
    Sites,
    /// Show where a token is
    State { token: TokenId },
    /// Place a token in an area of a site
    Move {
        token: TokenId,
        site: String,
        area: AreaId,
    },
    /// Send a token back to its pool
    Home { token: TokenId },
    /// Join a cylinder onto a breathing apparatus or safety bag
    Combine { host: TokenId, part: TokenId },
    /// Detach the cylinder from a composite
    Split { host: TokenId },
    /// Hide a pooled token from availability
    Remove { token: TokenId },
    /// Make a hidden token available again
    Restore { token: TokenId },
    /// Bind a face mask to its owner at a site
    Personalize {
        token: TokenId,
        owner: String,
        site: String,
    },
    /// Find placed or hidden tokens by text
    Search { text: String },
    /// Verify the stored state
    Check,
}

pub fn run<S: Store>(
    engine: &mut PlacementEngine<'_, S>,
    command: Command,
    out: &mut impl Write,
) -> Result<(), ToolError> {
    match command {
        Command::Pool { kind } => {
            let query = engine.query();
            let available = query.available(kind);
            writeln!(out, "{} available: {}", kind, available.len())?;
            for entry in available {
                writeln!(out, "  {}", entry.label)?;
            }
            let hidden = query.tombstoned(kind);
            if !hidden.is_empty() {
                writeln!(out, "{} removed: {}", kind, hidden.len())?;
                for id in hidden {
                    writeln!(out, "  {}", id)?;
                }
            }
        }
        Command::Site { site } => {
            let site = known_site(engine, site)?;
            for view in engine.query().assigned_by_area(&site) {
                writeln!(out, "{} ({})", view.title, view.area)?;
                for record in view.records {
                    writeln!(out, "  {}", record.label)?;
                }
            }
        }
        Command::Sites => {
            for site in engine.layout().sites() {
                let count = engine.query().assigned(&site.id).len();
                writeln!(out, "{}  {}  [{} placed]", site.id, site.title, count)?;
            }
        }
        Command::State { token } => {
            let state = engine.query().state_of(&token);
            writeln!(out, "{}: {}", token, describe(&state))?;
        }
        Command::Move { token, site, area } => {
            let site = known_site(engine, site)?;
            let record = engine.move_to(token, &site, area)?;
            writeln!(out, "{} -> {} / {}", record.label, record.target, record.area_title)?;
        }
        Command::Home { token } => match engine.return_home(token)? {
            HomeOutcome::AlreadyHome => writeln!(out, "{} is already in its pool", token)?,
            HomeOutcome::Returned(record) => {
                writeln!(out, "{} returned from {}", record.label, record.target)?
            }
        },
        Command::Combine { host, part } => {
            let token = engine.combine(host, part)?;
            writeln!(out, "{}", token.label())?;
        }
        Command::Split { host } => {
            let composition = engine.split(host)?;
            writeln!(out, "{} released from {}", composition.part_id(), host)?;
        }
        Command::Remove { token } => {
            if engine.tombstone(token)? {
                writeln!(out, "{} removed from pool", token)?;
            } else {
                writeln!(out, "{} was already removed", token)?;
            }
        }
        Command::Restore { token } => {
            if engine.restore(token)? {
                writeln!(out, "{} restored to pool", token)?;
            } else {
                writeln!(out, "{} was not removed", token)?;
            }
        }
        Command::Personalize { token, owner, site } => {
            let site = known_site(engine, site)?;
            let record = engine.personalize(token, &owner, &site)?;
            writeln!(out, "{} -> {} / {}", record.label, record.target, record.area_title)?;
        }
        Command::Search { text } => {
            for hit in engine.query().search(&text) {
                match hit {
                    SearchHit::Assigned(record) => {
                        writeln!(out, "{}  {} / {}", record.label, record.target, record.area)?
                    }
                    SearchHit::Tombstoned { label, .. } => writeln!(out, "{}  removed", label)?,
                }
            }
        }
        Command::Check => {
            let violations = engine.state().check_invariants(engine.catalog());
            if violations.is_empty() {
                writeln!(out, "ok")?;
            }
            for violation in violations {
                writeln!(out, "{}", violation)?;
            }
        }
    }
    Ok(())
}

fn known_site<S: Store>(engine: &PlacementEngine<'_, S>, site: String) -> Result<SiteId, ToolError> {
    let id = SiteId::new(site);
    if engine.layout().contains(&id) {
        Ok(id)
    } else {
        Err(ToolError::UnknownSite(id.to_string()))
    }
}

fn describe(state: &TokenState) -> String {
    match state {
        TokenState::Free => "available in pool".to_string(),
        TokenState::Tombstoned => "removed from pool".to_string(),
        TokenState::Placed { site, area } => format!("at {} / {}", site, area),
        TokenState::Absorbed { host } => format!("joined to {}", host),
        TokenState::Personalized { site, owner } => format!("personal mask of {} at {}", owner, site),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atemschutz_core::{Catalog, Layout, MemoryStore};

    fn run_lines(engine: &mut PlacementEngine<'_, &MemoryStore>, command: Command) -> String {
        let mut out = Vec::new();
        run(engine, command, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn move_and_show_site() {
        let catalog = Catalog::standard();
        let layout = Layout::standard();
        let backend = MemoryStore::new();
        let mut engine = PlacementEngine::open(&catalog, &layout, &backend).unwrap();

        run_lines(
            &mut engine,
            Command::Combine {
                host: "PA 12".parse().unwrap(),
                part: "FL 126".parse().unwrap(),
            },
        );
        let moved = run_lines(
            &mut engine,
            Command::Move {
                token: "PA 12".parse().unwrap(),
                site: "Vehicle-3".to_string(),
                area: AreaId::BreathingApparatus,
            },
        );
        assert_eq!(moved, "PA 12 mit FL 126 -> Vehicle-3 / Atemschutzgeräte\n");

        let site = run_lines(
            &mut engine,
            Command::Site {
                site: "Vehicle-3".to_string(),
            },
        );
        assert!(site.starts_with("Atemschutzgeräte (BreathingApparatus-Area)\n  PA 12 mit FL 126\n"));

        let state = run_lines(
            &mut engine,
            Command::State {
                token: "FL 126".parse().unwrap(),
            },
        );
        assert_eq!(state, "FL 126: joined to PA 12\n");
    }

    #[test]
    fn unknown_site_is_reported() {
        let catalog = Catalog::standard();
        let layout = Layout::standard();
        let backend = MemoryStore::new();
        let mut engine = PlacementEngine::open(&catalog, &layout, &backend).unwrap();

        let mut out = Vec::new();
        let err = run(
            &mut engine,
            Command::Site {
                site: "Mars".to_string(),
            },
            &mut out,
        )
        .unwrap_err();
        assert!(matches!(err, ToolError::UnknownSite(_)));
    }

    #[test]
    fn home_twice_reports_noop() {
        let catalog = Catalog::standard();
        let layout = Layout::standard();
        let backend = MemoryStore::new();
        let mut engine = PlacementEngine::open(&catalog, &layout, &backend).unwrap();
        let token: TokenId = "FH 4".parse().unwrap();

        run_lines(
            &mut engine,
            Command::Move {
                token,
                site: "Site-A".to_string(),
                area: AreaId::EscapeHood,
            },
        );
        assert_eq!(
            run_lines(&mut engine, Command::Home { token }),
            "FH 4 returned from Site-A\n"
        );
        assert_eq!(
            run_lines(&mut engine, Command::Home { token }),
            "FH 4 is already in its pool\n"
        );
    }

    #[test]
    fn check_reports_ok() {
        let catalog = Catalog::standard();
        let layout = Layout::standard();
        let backend = MemoryStore::new();
        let mut engine = PlacementEngine::open(&catalog, &layout, &backend).unwrap();

        assert_eq!(run_lines(&mut engine, Command::Check), "ok\n");
    }
}
