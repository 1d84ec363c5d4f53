/// A named link between two schemas.
///
/// Direct variants carry the target source name and the key pair joining
/// the two sides, as `(column here, column there)`. `HasManyThrough` owns
/// neither: it names a `HasMany` relation on this schema (`through`) and a
/// relation on the pivot schema (`using`), and resolves to those two hops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relation {
    BelongsTo { to: String, keys: (String, String) },
    HasOne { to: String, keys: (String, String) },
    HasMany { to: String, keys: (String, String) },
    HasManyThrough { through: String, using: String },
}

impl Relation {
    pub fn belongs_to(
        to: impl Into<String>,
        keys: (impl Into<String>, impl Into<String>),
    ) -> Self {
        Relation::BelongsTo {
            to: to.into(),
            keys: (keys.0.into(), keys.1.into()),
        }
    }

    pub fn has_one(to: impl Into<String>, keys: (impl Into<String>, impl Into<String>)) -> Self {
        Relation::HasOne {
            to: to.into(),
            keys: (keys.0.into(), keys.1.into()),
        }
    }

    pub fn has_many(to: impl Into<String>, keys: (impl Into<String>, impl Into<String>)) -> Self {
        Relation::HasMany {
            to: to.into(),
            keys: (keys.0.into(), keys.1.into()),
        }
    }

    pub fn has_many_through(through: impl Into<String>, using: impl Into<String>) -> Self {
        Relation::HasManyThrough {
            through: through.into(),
            using: using.into(),
        }
    }

    /// The target source name, `None` for the through variant.
    pub fn to(&self) -> Option<&str> {
        match self {
            Relation::BelongsTo { to, .. }
            | Relation::HasOne { to, .. }
            | Relation::HasMany { to, .. } => Some(to),
            Relation::HasManyThrough { .. } => None,
        }
    }

    pub fn keys(&self) -> Option<(&str, &str)> {
        match self {
            Relation::BelongsTo { keys, .. }
            | Relation::HasOne { keys, .. }
            | Relation::HasMany { keys, .. } => Some((&keys.0, &keys.1)),
            Relation::HasManyThrough { .. } => None,
        }
    }
}
