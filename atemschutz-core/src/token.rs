use serde::{Deserialize, Serialize};

use crate::catalog::{Palette, TokenId, TokenType};

/// Binding of a face mask to its owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Personalization {
    pub owner: String,
}

/// A host token carrying an absorbed cylinder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Composition {
    /// Number of the absorbed cylinder.
    pub part: u32,
    /// Palette of the absorbed cylinder, used for display.
    pub style: Palette,
}

impl Composition {
    pub fn part_id(&self) -> TokenId {
        TokenId::new(TokenType::Cylinder, self.part)
    }
}

/// A token as it currently appears: its identity plus optional roles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token {
    pub id: TokenId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personalization: Option<Personalization>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composition: Option<Composition>,
}

impl Token {
    pub fn plain(id: TokenId) -> Self {
        Self {
            id,
            personalization: None,
            composition: None,
        }
    }

    pub fn kind(&self) -> TokenType {
        self.id.kind
    }

    pub fn is_composite(&self) -> bool {
        self.composition.is_some()
    }

    pub fn is_personalized(&self) -> bool {
        self.personalization.is_some()
    }

    /// Display text, derived from the structured roles.
    ///
    /// `"PA 12"`, `"PA 12 mit FL 126"`, `"AM 45 (J. Müller)"`.
    pub fn label(&self) -> String {
        let mut label = self.id.to_string();
        if let Some(composition) = &self.composition {
            label.push_str(" mit ");
            label.push_str(&composition.part_id().to_string());
        }
        if let Some(personalization) = &self.personalization {
            label.push_str(&format!(" ({})", personalization.owner));
        }
        label
    }
}

impl From<TokenId> for Token {
    fn from(id: TokenId) -> Self {
        Token::plain(id)
    }
}
