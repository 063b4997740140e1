use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Category of a piece of equipment.
///
/// Every token carries its type explicitly; it is never inferred from a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TokenType {
    /// Breathing apparatus ("PA").
    BreathingApparatus,
    /// Air cylinder ("FL").
    Cylinder,
    /// Technical cylinder ("TF").
    TechnicalCylinder,
    /// Escape hood ("FH").
    EscapeHood,
    /// Face mask ("AM").
    FaceMask,
    /// Safety-team bag ("Si").
    SafetyBag,
}

impl TokenType {
    pub const ALL: [TokenType; 6] = [
        TokenType::BreathingApparatus,
        TokenType::Cylinder,
        TokenType::TechnicalCylinder,
        TokenType::EscapeHood,
        TokenType::FaceMask,
        TokenType::SafetyBag,
    ];

    /// Short prefix used in labels and persisted keys.
    pub fn prefix(self) -> &'static str {
        match self {
            TokenType::BreathingApparatus => "PA",
            TokenType::Cylinder => "FL",
            TokenType::TechnicalCylinder => "TF",
            TokenType::EscapeHood => "FH",
            TokenType::FaceMask => "AM",
            TokenType::SafetyBag => "Si",
        }
    }

    /// Whether tokens of this type can host a cylinder.
    pub fn can_host(self) -> bool {
        matches!(self, TokenType::BreathingApparatus | TokenType::SafetyBag)
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

impl FromStr for TokenType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TokenType::ALL
            .into_iter()
            .find(|kind| kind.prefix().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown token type: {}", s))
    }
}

/// Identity of one catalog entry.
///
/// `occurrence` separates entries that share a number within the same type
/// (the escape-hood list repeats some numbers). It is 0 for the first entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TokenId {
    pub kind: TokenType,
    pub number: u32,
    #[serde(default)]
    pub occurrence: u8,
}

impl TokenId {
    pub fn new(kind: TokenType, number: u32) -> Self {
        Self {
            kind,
            number,
            occurrence: 0,
        }
    }

    pub fn with_occurrence(kind: TokenType, number: u32, occurrence: u8) -> Self {
        Self {
            kind,
            number,
            occurrence,
        }
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.number)?;
        if self.occurrence > 0 {
            write!(f, "/{}", self.occurrence + 1)?;
        }
        Ok(())
    }
}

impl FromStr for TokenId {
    type Err = String;

    /// Accepts `"PA 12"`, `"PA12"` and `"FH 17/2"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| format!("missing number in token: {}", s))?;
        let kind: TokenType = s[..split].trim().parse()?;
        let rest = &s[split..];

        let (number, occurrence) = match rest.split_once('/') {
            Some((number, nth)) => {
                let nth: u8 = nth
                    .trim()
                    .parse()
                    .map_err(|_| format!("invalid occurrence in token: {}", s))?;
                if nth == 0 {
                    return Err(format!("occurrence starts at 1: {}", s));
                }
                (number, nth - 1)
            }
            None => (rest, 0),
        };
        let number: u32 = number
            .trim()
            .parse()
            .map_err(|_| format!("invalid number in token: {}", s))?;

        Ok(TokenId::with_occurrence(kind, number, occurrence))
    }
}

/// Display sub-palette of air cylinders. Cosmetic only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Palette {
    Primary,
    Secondary,
}

impl Palette {
    /// Palette of a cylinder; `None` for every other type.
    pub fn of(id: &TokenId) -> Option<Palette> {
        (id.kind == TokenType::Cylinder).then(|| Palette::of_cylinder(id.number))
    }

    pub fn of_cylinder(number: u32) -> Palette {
        if PRIMARY_CYLINDERS.contains(&number) {
            Palette::Primary
        } else {
            Palette::Secondary
        }
    }
}

const BREATHING_APPARATUS: [u32; 63] = [
    1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26,
    27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47, 48, 49, 50,
    60, 61, 62, 63, 64, 65, 66, 67, 68, 69, 70, 71, 72,
];

const PRIMARY_CYLINDERS: std::ops::RangeInclusive<u32> = 101..=200;
const SECONDARY_CYLINDERS: std::ops::RangeInclusive<u32> = 201..=300;

// 17 and 33 are listed twice.
const ESCAPE_HOODS: [u32; 57] = [
    1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 17, 18, 19, 20, 21, 22, 23, 24, 25,
    26, 27, 28, 29, 30, 31, 32, 33, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47, 48,
    49, 50, 51, 52, 53, 54, 55,
];

const SAFETY_BAGS: [u32; 6] = [1, 2, 3, 11, 12, 13];

/// The fixed set of equipment tokens known to the system.
#[derive(Debug, Clone)]
pub struct Catalog {
    entries: IndexMap<TokenType, Vec<TokenId>>,
}

impl Catalog {
    /// Builds the standard equipment catalog.
    pub fn standard() -> Self {
        let mut builder = CatalogBuilder::default();
        builder.extend(TokenType::BreathingApparatus, BREATHING_APPARATUS);
        builder.extend(TokenType::Cylinder, PRIMARY_CYLINDERS.chain(SECONDARY_CYLINDERS));
        builder.extend(TokenType::TechnicalCylinder, 1..=20);
        builder.extend(TokenType::EscapeHood, ESCAPE_HOODS);
        builder.extend(TokenType::FaceMask, 1..=264);
        builder.extend(TokenType::SafetyBag, SAFETY_BAGS);
        builder.build()
    }

    /// All entries of a type, in catalog order.
    pub fn tokens(&self, kind: TokenType) -> &[TokenId] {
        self.entries.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Iterates over every entry of every type.
    pub fn iter(&self) -> impl Iterator<Item = TokenId> + '_ {
        self.entries.values().flatten().copied()
    }

    pub fn contains(&self, id: &TokenId) -> bool {
        self.tokens(id.kind).contains(id)
    }

    /// Display palette for cylinders; `None` for every other type.
    pub fn palette(&self, id: &TokenId) -> Option<Palette> {
        if !self.contains(id) {
            return None;
        }
        Palette::of(id)
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::standard()
    }
}

#[derive(Default)]
struct CatalogBuilder {
    entries: IndexMap<TokenType, Vec<TokenId>>,
}

impl CatalogBuilder {
    fn extend(&mut self, kind: TokenType, numbers: impl IntoIterator<Item = u32>) {
        let list = self.entries.entry(kind).or_default();
        for number in numbers {
            let occurrence = list.iter().filter(|id| id.number == number).count() as u8;
            list.push(TokenId::with_occurrence(kind, number, occurrence));
        }
    }

    fn build(self) -> Catalog {
        Catalog {
            entries: self.entries,
        }
    }
}
