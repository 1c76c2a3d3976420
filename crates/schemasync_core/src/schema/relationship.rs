//! Declarative foreign-key relationships between entities.
//!
//! # Responsibility
//! - Record relationships once, before any synchronization starts.
//! - Answer which foreign-key columns an entity owns.
//!
//! # Invariants
//! - Aliases are unique per declaring (`from`) entity.
//! - Entity names, foreign keys and aliases are valid SQL identifiers.
//! - The graph never drives visitation order.

use super::is_valid_identifier;
use serde::Serialize;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    /// `from` has many `to`; the key column lives on `to`.
    OneToMany,
    /// `from` belongs to `to`; the key column lives on `from`.
    ManyToOne,
    /// `from` has one `to`; the key column lives on `to`.
    OneToOne,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Relationship {
    pub from: String,
    pub to: String,
    pub kind: RelationshipKind,
    pub foreign_key: String,
    pub alias: String,
}

impl Relationship {
    pub fn has_many(
        from: impl Into<String>,
        to: impl Into<String>,
        foreign_key: impl Into<String>,
        alias: impl Into<String>,
    ) -> Self {
        Self::new(RelationshipKind::OneToMany, from, to, foreign_key, alias)
    }

    pub fn belongs_to(
        from: impl Into<String>,
        to: impl Into<String>,
        foreign_key: impl Into<String>,
        alias: impl Into<String>,
    ) -> Self {
        Self::new(RelationshipKind::ManyToOne, from, to, foreign_key, alias)
    }

    pub fn has_one(
        from: impl Into<String>,
        to: impl Into<String>,
        foreign_key: impl Into<String>,
        alias: impl Into<String>,
    ) -> Self {
        Self::new(RelationshipKind::OneToOne, from, to, foreign_key, alias)
    }

    fn new(
        kind: RelationshipKind,
        from: impl Into<String>,
        to: impl Into<String>,
        foreign_key: impl Into<String>,
        alias: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            kind,
            foreign_key: foreign_key.into(),
            alias: alias.into(),
        }
    }

    /// Returns `(owner, referenced)`: the entity holding the key column and
    /// the entity it points at.
    pub fn owning_side(&self) -> (&str, &str) {
        match self.kind {
            RelationshipKind::ManyToOne => (self.from.as_str(), self.to.as_str()),
            RelationshipKind::OneToMany | RelationshipKind::OneToOne => {
                (self.to.as_str(), self.from.as_str())
            }
        }
    }
}

/// Foreign-key column owned by one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub column: String,
    pub references: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    InvalidIdentifier(String),
    DuplicateAlias { entity: String, alias: String },
    ConflictingForeignKey { entity: String, column: String },
}

impl Display for GraphError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidIdentifier(value) => write!(f, "invalid identifier: {value}"),
            Self::DuplicateAlias { entity, alias } => {
                write!(f, "alias `{alias}` already registered on {entity}")
            }
            Self::ConflictingForeignKey { entity, column } => write!(
                f,
                "foreign key {entity}.{column} already references a different entity"
            ),
        }
    }
}

impl Error for GraphError {}

/// Relationship registry handed to schema materialization.
#[derive(Debug, Clone, Default)]
pub struct RelationshipGraph {
    relationships: Vec<Relationship>,
}

impl RelationshipGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one relationship.
    pub fn register(&mut self, relationship: Relationship) -> Result<(), GraphError> {
        for value in [
            relationship.from.as_str(),
            relationship.to.as_str(),
            relationship.foreign_key.as_str(),
            relationship.alias.as_str(),
        ] {
            if !is_valid_identifier(value) {
                return Err(GraphError::InvalidIdentifier(value.to_string()));
            }
        }

        let alias_taken = self.relationships.iter().any(|existing| {
            existing.from == relationship.from && existing.alias == relationship.alias
        });
        if alias_taken {
            return Err(GraphError::DuplicateAlias {
                entity: relationship.from,
                alias: relationship.alias,
            });
        }

        let (owner, referenced) = relationship.owning_side();
        let conflicting = self
            .foreign_keys_for(owner)
            .into_iter()
            .any(|fk| fk.column == relationship.foreign_key && fk.references != referenced);
        if conflicting {
            return Err(GraphError::ConflictingForeignKey {
                entity: owner.to_string(),
                column: relationship.foreign_key,
            });
        }

        self.relationships.push(relationship);
        Ok(())
    }

    /// Registers every relationship, stopping at the first rejection.
    pub fn register_all(
        &mut self,
        relationships: impl IntoIterator<Item = Relationship>,
    ) -> Result<(), GraphError> {
        for relationship in relationships {
            self.register(relationship)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relationships.is_empty()
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    /// Foreign-key columns owned by `entity`, in registration order.
    ///
    /// A `has_many` and its mirrored `belongs_to` describe the same column;
    /// it is listed once.
    pub fn foreign_keys_for(&self, entity: &str) -> Vec<ForeignKey> {
        let mut seen = BTreeSet::new();
        let mut keys = Vec::new();
        for relationship in &self.relationships {
            let (owner, referenced) = relationship.owning_side();
            if owner != entity || !seen.insert(relationship.foreign_key.as_str()) {
                continue;
            }
            keys.push(ForeignKey {
                column: relationship.foreign_key.clone(),
                references: referenced.to_string(),
            });
        }
        keys
    }
}
