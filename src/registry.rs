use crate::error::{Error, Result};
use crate::model::{AcademicYear, NewSemester, Semester, SemesterId, Term};
use crate::store::Store;
use chrono::NaiveDate;
use std::cmp::Reverse;
use tracing::{info, instrument};

/// Ordered set of academic semesters and the pointer to the current one.
pub struct Registry<'a, S> {
    store: &'a S,
}

impl<'a, S: Store> Registry<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Registry { store }
    }

    /// Every semester, newest first.
    pub async fn list(&self) -> Result<Vec<Semester>> {
        let mut semesters = self.store.semesters().await?;
        semesters.sort_by_key(|s| Reverse(s.id));
        Ok(semesters)
    }

    pub async fn current(&self) -> Result<Semester> {
        let id = self
            .store
            .current_semester_id()
            .await?
            .ok_or_else(|| Error::not_found("semester", "current"))?;
        self.semester(id).await
    }

    pub async fn semester(&self, id: SemesterId) -> Result<Semester> {
        self.store
            .semester(id)
            .await?
            .ok_or_else(|| Error::not_found("semester", id))
    }

    /// Open a new semester after whichever one is current right now.
    pub async fn advance(
        &self,
        term: Term,
        academic_year: AcademicYear,
        start_date: Option<NaiveDate>,
    ) -> Result<Semester> {
        let expected = self.store.current_semester_id().await?;
        self.advance_from(
            expected,
            NewSemester {
                term,
                academic_year,
                start_date,
            },
        )
        .await
    }

    /// Open a new semester, provided `expected` is still the current one.
    /// Of several callers targeting the same outgoing semester, only one
    /// succeeds; the others get `Error::Conflict`.
    #[instrument(skip(self, semester), fields(term = %semester.term, year = %semester.academic_year))]
    pub async fn advance_from(
        &self,
        expected: Option<SemesterId>,
        semester: NewSemester,
    ) -> Result<Semester> {
        let existing = self.store.semesters().await?;
        if let Some(duplicate) = existing
            .iter()
            .find(|s| s.is_same_period(semester.term, &semester.academic_year))
        {
            return Err(Error::validation(format!(
                "{duplicate} exists already (id {})",
                duplicate.id
            )));
        }
        let created = self.store.advance_semester(expected, semester).await?;
        info!(semester = %created.id, previous = ?expected, "current semester advanced");
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn year(start: i32) -> AcademicYear {
        AcademicYear::starting(start)
    }

    #[tokio::test]
    async fn test_no_current_semester() {
        let store = MemoryStore::new();
        let registry = Registry::new(&store);
        assert!(matches!(
            registry.current().await,
            Err(Error::NotFound { .. })
        ));
        assert!(registry.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exactly_one_latest() {
        let store = MemoryStore::new();
        let registry = Registry::new(&store);
        let periods = [
            (Term::First, 2022),
            (Term::Second, 2022),
            (Term::First, 2023),
            (Term::Second, 2023),
        ];
        for (n, (term, start)) in periods.into_iter().enumerate() {
            let created = registry.advance(term, year(start), None).await.unwrap();
            let semesters = registry.list().await.unwrap();
            assert_eq!(semesters.len(), n + 1);
            let latest = semesters.iter().filter(|s| s.is_latest).collect::<Vec<_>>();
            assert_eq!(latest.len(), 1);
            assert_eq!(latest[0].id, created.id);
            assert_eq!(registry.current().await.unwrap().id, created.id);
        }
    }

    #[tokio::test]
    async fn test_newest_first() {
        let store = MemoryStore::new();
        let registry = Registry::new(&store);
        registry.advance(Term::First, year(2023), None).await.unwrap();
        registry.advance(Term::Second, year(2023), None).await.unwrap();
        let ids = registry
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect::<Vec<_>>();
        assert!(ids[0] > ids[1]);
    }

    #[tokio::test]
    async fn test_duplicate_period() {
        let store = MemoryStore::new();
        let registry = Registry::new(&store);
        registry.advance(Term::First, year(2023), None).await.unwrap();
        assert!(matches!(
            registry.advance(Term::First, year(2023), None).await,
            Err(Error::Validation(_))
        ));
        assert_eq!(registry.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_advance() {
        let store = MemoryStore::new();
        let registry = Registry::new(&store);
        let outgoing = registry.advance(Term::First, year(2023), None).await.unwrap();
        let next = |term, start| NewSemester {
            term,
            academic_year: year(start),
            start_date: None,
        };
        let (a, b) = tokio::join!(
            registry.advance_from(Some(outgoing.id), next(Term::Second, 2023)),
            registry.advance_from(Some(outgoing.id), next(Term::First, 2024)),
        );
        let (won, lost) = if a.is_ok() { (a, b) } else { (b, a) };
        let won = won.unwrap();
        assert!(matches!(lost, Err(Error::Conflict(_))));
        let semesters = registry.list().await.unwrap();
        assert_eq!(semesters.len(), 2);
        assert_eq!(registry.current().await.unwrap().id, won.id);
    }
}
