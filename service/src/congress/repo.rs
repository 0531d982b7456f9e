//! Legislator repository
//!
//! The roster itself is imported by a separate job; this service only reads it.

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use super::types::{Chamber, District, Legislator};

#[derive(Debug, thiserror::Error)]
pub enum LegislatorRepoError {
    #[error("corrupt legislator row: {0}")]
    Corrupt(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Read access to the legislator roster.
#[async_trait]
pub trait LegislatorRepo: Send + Sync {
    /// Legislators whose stored email matches one of `emails`
    /// (compared case-insensitively).
    async fn find_by_emails(&self, emails: &[String])
        -> Result<Vec<Legislator>, LegislatorRepoError>;

    /// Every member representing `district`: the House member (or
    /// delegate) for the district plus the state-wide members.
    async fn permitted_for(&self, district: &District)
        -> Result<Vec<Legislator>, LegislatorRepoError>;
}

const LEGISLATOR_COLUMNS: &str = "id, bioguide_id, chamber, state, district, title, \
                                  first_name, last_name, email, contactable";

fn map_legislator_row(row: &sqlx::postgres::PgRow) -> Result<Legislator, LegislatorRepoError> {
    let chamber: String = row.try_get("chamber")?;
    Ok(Legislator {
        id: row.try_get("id")?,
        bioguide_id: row.try_get("bioguide_id")?,
        chamber: chamber
            .parse::<Chamber>()
            .map_err(LegislatorRepoError::Corrupt)?,
        state: row.try_get("state")?,
        district: row.try_get("district")?,
        title: row.try_get("title")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        email: row.try_get("email")?,
        contactable: row.try_get("contactable")?,
    })
}

/// Look up legislators by email address.
///
/// # Errors
///
/// Returns `LegislatorRepoError::Database` on database failures.
pub async fn find_legislators_by_emails<'e, E>(
    executor: E,
    emails: &[String],
) -> Result<Vec<Legislator>, LegislatorRepoError>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    if emails.is_empty() {
        return Ok(Vec::new());
    }
    let lowered: Vec<String> = emails.iter().map(|e| e.to_lowercase()).collect();

    let rows = sqlx::query(&format!(
        "SELECT {LEGISLATOR_COLUMNS} FROM legislators WHERE lower(email) = ANY($1)"
    ))
    .bind(&lowered)
    .fetch_all(executor)
    .await?;

    rows.iter().map(map_legislator_row).collect()
}

/// Members representing a district, senators first.
///
/// # Errors
///
/// Returns `LegislatorRepoError::Database` on database failures.
pub async fn legislators_for_district<'e, E>(
    executor: E,
    district: &District,
) -> Result<Vec<Legislator>, LegislatorRepoError>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let rows = sqlx::query(&format!(
        r"
        SELECT {LEGISLATOR_COLUMNS} FROM legislators
        WHERE state = $1 AND (district IS NULL OR district = $2)
        ORDER BY chamber DESC, last_name ASC
        "
    ))
    .bind(district.state.to_ascii_uppercase())
    .bind(district.number)
    .fetch_all(executor)
    .await?;

    rows.iter().map(map_legislator_row).collect()
}

/// `PostgreSQL` implementation of [`LegislatorRepo`].
pub struct PgLegislatorRepo {
    pool: PgPool,
}

impl PgLegislatorRepo {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LegislatorRepo for PgLegislatorRepo {
    async fn find_by_emails(
        &self,
        emails: &[String],
    ) -> Result<Vec<Legislator>, LegislatorRepoError> {
        find_legislators_by_emails(&self.pool, emails).await
    }

    async fn permitted_for(
        &self,
        district: &District,
    ) -> Result<Vec<Legislator>, LegislatorRepoError> {
        legislators_for_district(&self.pool, district).await
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[allow(clippy::expect_used)]
pub mod mock {
    //! In-memory legislator roster for unit testing.

    use super::{async_trait, District, Legislator, LegislatorRepo, LegislatorRepoError};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MockLegislatorRepo {
        legislators: Mutex<Vec<Legislator>>,
    }

    impl MockLegislatorRepo {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Seed the roster.
        ///
        /// # Panics
        ///
        /// Panics if the internal mutex is poisoned.
        pub fn insert(&self, legislator: Legislator) {
            self.legislators
                .lock()
                .expect("lock poisoned")
                .push(legislator);
        }
    }

    #[async_trait]
    impl LegislatorRepo for MockLegislatorRepo {
        async fn find_by_emails(
            &self,
            emails: &[String],
        ) -> Result<Vec<Legislator>, LegislatorRepoError> {
            let legislators = self.legislators.lock().expect("lock poisoned");
            Ok(legislators
                .iter()
                .filter(|l| emails.iter().any(|e| e.eq_ignore_ascii_case(&l.email)))
                .cloned()
                .collect())
        }

        async fn permitted_for(
            &self,
            district: &District,
        ) -> Result<Vec<Legislator>, LegislatorRepoError> {
            let legislators = self.legislators.lock().expect("lock poisoned");
            Ok(legislators
                .iter()
                .filter(|l| l.represents(district))
                .cloned()
                .collect())
        }
    }
}
