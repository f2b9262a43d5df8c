use crate::query::predicate::Predicate;

///
/// Spec
///
/// Named, composable predicate fragment. A fragment built from an absent
/// domain value resolves to `None` and drops out of any composition, so
/// optional search criteria never need conditional query assembly at the
/// call site.
///

#[derive(Clone, Debug)]
pub struct Spec {
    name: String,
    predicate: Option<Predicate>,
}

impl Spec {
    #[must_use]
    pub fn new(name: impl Into<String>, predicate: Option<Predicate>) -> Self {
        Self {
            name: name.into(),
            predicate,
        }
    }

    /// Fragment that always applies.
    #[must_use]
    pub fn always(name: impl Into<String>, predicate: Predicate) -> Self {
        Self::new(name, Some(predicate))
    }

    /// Fragment that never constrains (absent criterion).
    #[must_use]
    pub fn none(name: impl Into<String>) -> Self {
        Self::new(name, None)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn predicate(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }

    /// AND composition; a `None` side drops out unchanged.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        let name = format!("{} and {}", self.name, other.name);
        let predicate = match (self.predicate, other.predicate) {
            (Some(a), Some(b)) => Some(a & b),
            (Some(a), None) => Some(a),
            (None, b) => b,
        };

        Self { name, predicate }
    }

    /// OR composition; a `None` side drops out unchanged.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        let name = format!("{} or {}", self.name, other.name);
        let predicate = match (self.predicate, other.predicate) {
            (Some(a), Some(b)) => Some(a | b),
            (Some(a), None) => Some(a),
            (None, b) => b,
        };

        Self { name, predicate }
    }

    /// Final predicate; a fully absent composition matches everything.
    #[must_use]
    pub fn resolve(self) -> Predicate {
        self.predicate.unwrap_or(Predicate::True)
    }
}
