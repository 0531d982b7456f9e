//! Constituent and address-generation persistence

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::types::{Address, Constituent, NewAddress};
use crate::congress::{District, ResolvedDistrict};
use crate::geocode::Coordinates;

#[derive(Debug, thiserror::Error)]
pub enum ConstituentRepoError {
    #[error("constituent not found")]
    NotFound,
    #[error("email already registered")]
    DuplicateEmail,
    #[error("constituent has no current address")]
    NoAddress,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait ConstituentRepo: Send + Sync {
    async fn create_constituent(&self, email: &str) -> Result<Constituent, ConstituentRepoError>;

    /// Create a constituent and its first address generation together, or neither.
    async fn register(
        &self,
        email: &str,
        address: &NewAddress,
    ) -> Result<(Constituent, Address), ConstituentRepoError>;

    async fn get_constituent(&self, id: Uuid) -> Result<Constituent, ConstituentRepoError>;

    /// The one address generation flagged current.
    async fn current_address(&self, constituent_id: Uuid)
        -> Result<Address, ConstituentRepoError>;

    async fn get_address(&self, address_id: Uuid) -> Result<Address, ConstituentRepoError>;

    /// Append a generation and make it current. `address` must already be normalized.
    async fn add_address_generation(
        &self,
        constituent_id: Uuid,
        address: &NewAddress,
    ) -> Result<Address, ConstituentRepoError>;

    /// Record a resolved district, normalized state and coordinates on one generation.
    async fn record_district(
        &self,
        address_id: Uuid,
        resolved: &ResolvedDistrict,
    ) -> Result<(), ConstituentRepoError>;

    async fn record_zip4(&self, address_id: Uuid, zip4: &str) -> Result<(), ConstituentRepoError>;
}

const ADDRESS_COLUMNS: &str = "id, constituent_id, generation, prefix, first_name, last_name, \
     street_address, street_address2, city, state, zip5, zip4, phone, latitude, longitude, \
     district_resolved, district, created_at";

fn map_address_row(row: &sqlx::postgres::PgRow) -> Result<Address, sqlx::Error> {
    let state: String = row.try_get("state")?;
    let latitude: Option<f64> = row.try_get("latitude")?;
    let longitude: Option<f64> = row.try_get("longitude")?;
    let district_resolved: bool = row.try_get("district_resolved")?;
    let district_number: Option<i32> = row.try_get("district")?;

    Ok(Address {
        id: row.try_get("id")?,
        constituent_id: row.try_get("constituent_id")?,
        generation: row.try_get("generation")?,
        prefix: row.try_get("prefix")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        street_address: row.try_get("street_address")?,
        street_address2: row.try_get("street_address2")?,
        city: row.try_get("city")?,
        zip5: row.try_get("zip5")?,
        zip4: row.try_get("zip4")?,
        phone: row.try_get("phone")?,
        coordinates: latitude
            .zip(longitude)
            .map(|(latitude, longitude)| Coordinates {
                latitude,
                longitude,
            }),
        district: district_resolved.then(|| District::new(state.clone(), district_number)),
        state,
        created_at: row.try_get("created_at")?,
    })
}

fn map_constituent_row(row: &sqlx::postgres::PgRow) -> Result<Constituent, sqlx::Error> {
    Ok(Constituent {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Insert a constituent.
///
/// # Errors
///
/// Returns `ConstituentRepoError::DuplicateEmail` if the email is taken.
pub async fn create_constituent<'e, E>(
    executor: E,
    email: &str,
) -> Result<Constituent, ConstituentRepoError>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let id = Uuid::new_v4();
    let now = Utc::now();
    let email = email.trim().to_lowercase();

    let result = sqlx::query("INSERT INTO constituents (id, email, created_at) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(&email)
        .bind(now)
        .execute(executor)
        .await;

    match result {
        Ok(_) => Ok(Constituent {
            id,
            email,
            created_at: now,
        }),
        Err(e) => {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.constraint() == Some("constituents_email_key") {
                    return Err(ConstituentRepoError::DuplicateEmail);
                }
            }
            Err(ConstituentRepoError::Database(e))
        }
    }
}

/// # Errors
///
/// Returns `ConstituentRepoError::NotFound` if no constituent has this id.
pub async fn get_constituent<'e, E>(executor: E, id: Uuid) -> Result<Constituent, ConstituentRepoError>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let row = sqlx::query("SELECT id, email, created_at FROM constituents WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or(ConstituentRepoError::NotFound)?;
    Ok(map_constituent_row(&row)?)
}

/// # Errors
///
/// Returns `ConstituentRepoError::NoAddress` if the constituent has no current generation.
pub async fn current_address<'e, E>(
    executor: E,
    constituent_id: Uuid,
) -> Result<Address, ConstituentRepoError>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let row = sqlx::query(&format!(
        "SELECT {ADDRESS_COLUMNS} FROM addresses WHERE constituent_id = $1 AND is_current"
    ))
    .bind(constituent_id)
    .fetch_optional(executor)
    .await?
    .ok_or(ConstituentRepoError::NoAddress)?;
    Ok(map_address_row(&row)?)
}

/// # Errors
///
/// Returns `ConstituentRepoError::NoAddress` if the generation does not exist.
pub async fn get_address<'e, E>(executor: E, address_id: Uuid) -> Result<Address, ConstituentRepoError>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let row = sqlx::query(&format!(
        "SELECT {ADDRESS_COLUMNS} FROM addresses WHERE id = $1"
    ))
    .bind(address_id)
    .fetch_optional(executor)
    .await?
    .ok_or(ConstituentRepoError::NoAddress)?;
    Ok(map_address_row(&row)?)
}

/// Insert a constituent and its first generation inside an open transaction.
///
/// # Errors
///
/// Returns `ConstituentRepoError::DuplicateEmail` if the email is taken.
pub async fn register_with_conn(
    conn: &mut sqlx::PgConnection,
    email: &str,
    address: &NewAddress,
) -> Result<(Constituent, Address), ConstituentRepoError> {
    let constituent = create_constituent(&mut *conn, email).await?;
    let address = add_address_generation_with_conn(conn, constituent.id, address).await?;
    Ok((constituent, address))
}

/// Append an address generation inside an open transaction.
///
/// Locks the constituent row so concurrent changes get distinct generations.
///
/// # Errors
///
/// Returns `ConstituentRepoError::NotFound` if the constituent does not exist.
pub async fn add_address_generation_with_conn(
    conn: &mut sqlx::PgConnection,
    constituent_id: Uuid,
    address: &NewAddress,
) -> Result<Address, ConstituentRepoError> {
    let locked = sqlx::query("SELECT id FROM constituents WHERE id = $1 FOR UPDATE")
        .bind(constituent_id)
        .fetch_optional(&mut *conn)
        .await?;
    if locked.is_none() {
        return Err(ConstituentRepoError::NotFound);
    }

    sqlx::query("UPDATE addresses SET is_current = FALSE WHERE constituent_id = $1 AND is_current")
        .bind(constituent_id)
        .execute(&mut *conn)
        .await?;

    let row = sqlx::query(&format!(
        r"
        INSERT INTO addresses (
            id, constituent_id, generation, is_current, prefix, first_name, last_name,
            street_address, street_address2, city, state, zip5, zip4, phone
        )
        SELECT $1, $2, COALESCE(MAX(generation), 0) + 1, TRUE, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12
        FROM addresses WHERE constituent_id = $2
        RETURNING {ADDRESS_COLUMNS}
        "
    ))
    .bind(Uuid::new_v4())
    .bind(constituent_id)
    .bind(&address.prefix)
    .bind(&address.first_name)
    .bind(&address.last_name)
    .bind(&address.street_address)
    .bind(&address.street_address2)
    .bind(&address.city)
    .bind(&address.state)
    .bind(&address.zip5)
    .bind(&address.zip4)
    .bind(&address.phone)
    .fetch_one(&mut *conn)
    .await?;

    Ok(map_address_row(&row)?)
}

/// # Errors
///
/// Returns `ConstituentRepoError::NoAddress` if the generation does not exist.
pub async fn record_district<'e, E>(
    executor: E,
    address_id: Uuid,
    resolved: &ResolvedDistrict,
) -> Result<(), ConstituentRepoError>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let result = sqlx::query(
        r"
        UPDATE addresses
        SET district_resolved = TRUE,
            district = $2,
            state = $3,
            latitude = COALESCE($4, latitude),
            longitude = COALESCE($5, longitude)
        WHERE id = $1
        ",
    )
    .bind(address_id)
    .bind(resolved.district.number)
    .bind(&resolved.state)
    .bind(resolved.coordinates.map(|c| c.latitude))
    .bind(resolved.coordinates.map(|c| c.longitude))
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ConstituentRepoError::NoAddress);
    }
    Ok(())
}

/// # Errors
///
/// Returns `ConstituentRepoError::NoAddress` if the generation does not exist.
pub async fn record_zip4<'e, E>(
    executor: E,
    address_id: Uuid,
    zip4: &str,
) -> Result<(), ConstituentRepoError>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let result = sqlx::query("UPDATE addresses SET zip4 = $2 WHERE id = $1")
        .bind(address_id)
        .bind(zip4)
        .execute(executor)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ConstituentRepoError::NoAddress);
    }
    Ok(())
}

/// `PostgreSQL` implementation of [`ConstituentRepo`].
pub struct PgConstituentRepo {
    pool: PgPool,
}

impl PgConstituentRepo {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConstituentRepo for PgConstituentRepo {
    async fn create_constituent(&self, email: &str) -> Result<Constituent, ConstituentRepoError> {
        create_constituent(&self.pool, email).await
    }

    async fn register(
        &self,
        email: &str,
        address: &NewAddress,
    ) -> Result<(Constituent, Address), ConstituentRepoError> {
        let mut tx = self.pool.begin().await?;
        let registered = register_with_conn(&mut tx, email, address).await?;
        tx.commit().await?;
        Ok(registered)
    }

    async fn get_constituent(&self, id: Uuid) -> Result<Constituent, ConstituentRepoError> {
        get_constituent(&self.pool, id).await
    }

    async fn current_address(
        &self,
        constituent_id: Uuid,
    ) -> Result<Address, ConstituentRepoError> {
        current_address(&self.pool, constituent_id).await
    }

    async fn get_address(&self, address_id: Uuid) -> Result<Address, ConstituentRepoError> {
        get_address(&self.pool, address_id).await
    }

    async fn add_address_generation(
        &self,
        constituent_id: Uuid,
        address: &NewAddress,
    ) -> Result<Address, ConstituentRepoError> {
        let mut tx = self.pool.begin().await?;
        let created = add_address_generation_with_conn(&mut tx, constituent_id, address).await?;
        tx.commit().await?;
        Ok(created)
    }

    async fn record_district(
        &self,
        address_id: Uuid,
        resolved: &ResolvedDistrict,
    ) -> Result<(), ConstituentRepoError> {
        record_district(&self.pool, address_id, resolved).await
    }

    async fn record_zip4(&self, address_id: Uuid, zip4: &str) -> Result<(), ConstituentRepoError> {
        record_zip4(&self.pool, address_id, zip4).await
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[allow(clippy::expect_used)]
pub mod mock {
    //! In-memory constituent repo for unit testing.

    use super::{
        async_trait, Address, Constituent, ConstituentRepo, ConstituentRepoError, District,
        NewAddress, ResolvedDistrict, Utc, Uuid,
    };
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct State {
        constituents: HashMap<Uuid, Constituent>,
        addresses: Vec<(Address, bool)>,
    }

    impl State {
        fn insert_constituent(&mut self, email: &str) -> Result<Constituent, ConstituentRepoError> {
            let email = email.trim().to_lowercase();
            if self.constituents.values().any(|c| c.email == email) {
                return Err(ConstituentRepoError::DuplicateEmail);
            }
            let constituent = Constituent {
                id: Uuid::new_v4(),
                email,
                created_at: Utc::now(),
            };
            self.constituents.insert(constituent.id, constituent.clone());
            Ok(constituent)
        }

        fn push_generation(
            &mut self,
            constituent_id: Uuid,
            address: &NewAddress,
        ) -> Result<Address, ConstituentRepoError> {
            if !self.constituents.contains_key(&constituent_id) {
                return Err(ConstituentRepoError::NotFound);
            }
            let mut generation = 0;
            for (existing, current) in self
                .addresses
                .iter_mut()
                .filter(|(a, _)| a.constituent_id == constituent_id)
            {
                *current = false;
                generation = generation.max(existing.generation);
            }
            let created = Address {
                id: Uuid::new_v4(),
                constituent_id,
                generation: generation + 1,
                prefix: address.prefix.clone(),
                first_name: address.first_name.clone(),
                last_name: address.last_name.clone(),
                street_address: address.street_address.clone(),
                street_address2: address.street_address2.clone(),
                city: address.city.clone(),
                state: address.state.clone(),
                zip5: address.zip5.clone(),
                zip4: address.zip4.clone(),
                phone: address.phone.clone(),
                coordinates: None,
                district: None,
                created_at: Utc::now(),
            };
            self.addresses.push((created.clone(), true));
            Ok(created)
        }
    }

    /// Keeps every generation so tests can assert history is preserved.
    #[derive(Default)]
    pub struct MockConstituentRepo {
        state: Mutex<State>,
    }

    impl MockConstituentRepo {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// All generations for a constituent, oldest first.
        ///
        /// # Panics
        ///
        /// Panics if the internal mutex is poisoned.
        #[must_use]
        pub fn generations(&self, constituent_id: Uuid) -> Vec<Address> {
            let state = self.state.lock().expect("lock poisoned");
            state
                .addresses
                .iter()
                .filter(|(a, _)| a.constituent_id == constituent_id)
                .map(|(a, _)| a.clone())
                .collect()
        }

        fn update_address(
            &self,
            address_id: Uuid,
            f: impl FnOnce(&mut Address),
        ) -> Result<(), ConstituentRepoError> {
            let mut state = self.state.lock().expect("lock poisoned");
            let (address, _) = state
                .addresses
                .iter_mut()
                .find(|(a, _)| a.id == address_id)
                .ok_or(ConstituentRepoError::NoAddress)?;
            f(address);
            Ok(())
        }
    }

    #[async_trait]
    impl ConstituentRepo for MockConstituentRepo {
        async fn create_constituent(
            &self,
            email: &str,
        ) -> Result<Constituent, ConstituentRepoError> {
            let mut state = self.state.lock().expect("lock poisoned");
            state.insert_constituent(email)
        }

        async fn register(
            &self,
            email: &str,
            address: &NewAddress,
        ) -> Result<(Constituent, Address), ConstituentRepoError> {
            let mut state = self.state.lock().expect("lock poisoned");
            let constituent = state.insert_constituent(email)?;
            let address = state.push_generation(constituent.id, address)?;
            Ok((constituent, address))
        }

        async fn get_constituent(&self, id: Uuid) -> Result<Constituent, ConstituentRepoError> {
            let state = self.state.lock().expect("lock poisoned");
            state
                .constituents
                .get(&id)
                .cloned()
                .ok_or(ConstituentRepoError::NotFound)
        }

        async fn current_address(
            &self,
            constituent_id: Uuid,
        ) -> Result<Address, ConstituentRepoError> {
            let state = self.state.lock().expect("lock poisoned");
            state
                .addresses
                .iter()
                .find(|(a, current)| *current && a.constituent_id == constituent_id)
                .map(|(a, _)| a.clone())
                .ok_or(ConstituentRepoError::NoAddress)
        }

        async fn get_address(&self, address_id: Uuid) -> Result<Address, ConstituentRepoError> {
            let state = self.state.lock().expect("lock poisoned");
            state
                .addresses
                .iter()
                .find(|(a, _)| a.id == address_id)
                .map(|(a, _)| a.clone())
                .ok_or(ConstituentRepoError::NoAddress)
        }

        async fn add_address_generation(
            &self,
            constituent_id: Uuid,
            address: &NewAddress,
        ) -> Result<Address, ConstituentRepoError> {
            let mut state = self.state.lock().expect("lock poisoned");
            state.push_generation(constituent_id, address)
        }

        async fn record_district(
            &self,
            address_id: Uuid,
            resolved: &ResolvedDistrict,
        ) -> Result<(), ConstituentRepoError> {
            self.update_address(address_id, |address| {
                address.state.clone_from(&resolved.state);
                address.district = Some(District::new(
                    resolved.state.clone(),
                    resolved.district.number,
                ));
                if resolved.coordinates.is_some() {
                    address.coordinates = resolved.coordinates;
                }
            })
        }

        async fn record_zip4(
            &self,
            address_id: Uuid,
            zip4: &str,
        ) -> Result<(), ConstituentRepoError> {
            self.update_address(address_id, |address| address.zip4 = Some(zip4.to_string()))
        }
    }
}
