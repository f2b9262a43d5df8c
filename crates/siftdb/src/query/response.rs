use crate::error::ErrorClass;
use derive_more::{Deref, IntoIterator};
use thiserror::Error as ThisError;

///
/// ResponseError
///

#[derive(Debug, ThisError)]
#[remain::sorted]
pub enum ResponseError {
    #[error("no {entity} row matched")]
    NotFound { entity: String },

    #[error("expected one {entity} row, found {found}")]
    NotUnique { entity: String, found: usize },
}

impl ResponseError {
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound { .. } => ErrorClass::NotFound,
            Self::NotUnique { .. } => ErrorClass::NotUnique,
        }
    }
}

///
/// Response
///
/// Ordered result rows plus the single-row shaping rules: `one` demands
/// exactly one row, `one_opt` tolerates zero, `first` takes the head.
///

#[derive(Debug, Deref, IntoIterator)]
pub struct Response<T> {
    entity: String,
    #[deref]
    #[into_iterator]
    rows: Vec<T>,
}

impl<T> Response<T> {
    #[must_use]
    pub fn new(entity: impl Into<String>, rows: Vec<T>) -> Self {
        Self {
            entity: entity.into(),
            rows,
        }
    }

    #[must_use]
    pub fn all(self) -> Vec<T> {
        self.rows
    }

    /// Exactly one row.
    pub fn one(mut self) -> Result<T, ResponseError> {
        match self.rows.len() {
            1 => Ok(self.rows.remove(0)),
            0 => Err(ResponseError::NotFound {
                entity: self.entity,
            }),
            found => Err(ResponseError::NotUnique {
                entity: self.entity,
                found,
            }),
        }
    }

    /// Zero or one row.
    pub fn one_opt(mut self) -> Result<Option<T>, ResponseError> {
        match self.rows.len() {
            0 => Ok(None),
            1 => Ok(Some(self.rows.remove(0))),
            found => Err(ResponseError::NotUnique {
                entity: self.entity,
                found,
            }),
        }
    }

    /// Head row, if any.
    #[must_use]
    pub fn first_row(mut self) -> Option<T> {
        if self.rows.is_empty() {
            None
        } else {
            Some(self.rows.remove(0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_demands_exactly_one_row() {
        let hit = Response::new("member", vec![7]).one().expect("one row should pass");
        assert_eq!(hit, 7);

        let err = Response::<u32>::new("member", vec![])
            .one()
            .expect_err("empty should fail");
        assert!(matches!(err, ResponseError::NotFound { .. }));

        let err = Response::new("member", vec![1, 2])
            .one()
            .expect_err("two rows should fail");
        assert!(matches!(err, ResponseError::NotUnique { found: 2, .. }));
    }

    #[test]
    fn one_opt_tolerates_zero_rows() {
        assert_eq!(
            Response::<u32>::new("member", vec![])
                .one_opt()
                .expect("empty should pass"),
            None
        );
        assert_eq!(
            Response::new("member", vec![5])
                .one_opt()
                .expect("one row should pass"),
            Some(5)
        );
        assert!(Response::new("member", vec![1, 2]).one_opt().is_err());
    }

    #[test]
    fn first_row_takes_the_head() {
        assert_eq!(Response::new("member", vec![9, 8]).first_row(), Some(9));
        assert_eq!(Response::<u32>::new("member", vec![]).first_row(), None);
    }
}
