use crate::{
    error::Error,
    query::{Params, QueryPlan, Response, Subject},
    session::{Managed, Session, expect_subject},
};

///
/// Derived
///
/// A derived-name query parsed once and staged against one session. The
/// name fixes the subject at parse time, so every entry point checks it
/// before touching the store.
///

#[derive(Debug)]
pub struct Derived<'s> {
    pub(crate) session: &'s Session,
    pub(crate) plan: QueryPlan,
}

impl Derived<'_> {
    /// The staged plan, for inspection.
    #[must_use]
    pub const fn plan(&self) -> &QueryPlan {
        &self.plan
    }

    /// Every matching row, tracked by the session.
    pub fn all(&self, params: &Params) -> Result<Response<Managed>, Error> {
        expect_subject(&self.plan, Subject::Find)?;
        let (rows, _) = self.session.select_managed(&self.plan, params)?;

        Ok(Response::new(self.plan.entity.as_str(), rows))
    }

    /// Exactly one matching row.
    pub fn one(&self, params: &Params) -> Result<Managed, Error> {
        self.all(params)?.one().map_err(Error::from)
    }

    /// At most one matching row.
    pub fn one_opt(&self, params: &Params) -> Result<Option<Managed>, Error> {
        self.all(params)?.one_opt().map_err(Error::from)
    }

    /// First matching row in plan order, if any.
    pub fn first(&self, params: &Params) -> Result<Option<Managed>, Error> {
        Ok(self.all(params)?.first_row())
    }

    /// Matching row count, computed without materialising rows.
    pub fn count(&self, params: &Params) -> Result<u64, Error> {
        expect_subject(&self.plan, Subject::Count)?;
        self.session.count_plan(&self.plan, params)
    }

    /// Whether any row matches; the scan stops at the first hit.
    pub fn exists(&self, params: &Params) -> Result<bool, Error> {
        expect_subject(&self.plan, Subject::Exists)?;
        self.session.exists_plan(&self.plan, params)
    }

    /// Run a delete-subject query now, returning the rows removed.
    pub fn execute(&self, params: &Params) -> Result<u64, Error> {
        expect_subject(&self.plan, Subject::Delete)?;
        self.session.delete_plan(&self.plan, params)
    }
}
