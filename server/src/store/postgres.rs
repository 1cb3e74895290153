//! Postgres repository built on a `sqlx` connection pool.
//!
//! Multi-statement writes (home + images, images + home) run inside a
//! transaction so a failure never leaves a half-written listing behind.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use tracing::{debug, info};

use super::{Repository, StoreError};
use crate::types::{
    Home, HomeFilters, HomeRecord, NewHome, NewUser, PropertyType, Realtor, UpdateHomeRequest,
    User, UserRole,
};

/// How long to wait for a pooled connection before failing the request.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

const HOME_COLUMNS: &str = "h.id, h.address, h.city, h.land_size, h.number_of_bedrooms, \
     h.number_of_bathrooms, h.property_type, h.realtor_id, h.listed_date, h.created_at, \
     h.updated_at";

#[derive(Debug, FromRow)]
struct UserRow {
    id: i32,
    name: String,
    email: String,
    phone: String,
    password: String,
    role: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse::<UserRole>()
            .map_err(|_| StoreError::Corrupt(format!("user {} has role '{}'", row.id, row.role)))?;
        Ok(User {
            id: row.id,
            name: row.name,
            email: row.email,
            phone: row.phone,
            password_hash: row.password,
            role,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct HomeRow {
    id: i32,
    address: String,
    city: String,
    land_size: f64,
    number_of_bedrooms: i32,
    number_of_bathrooms: i32,
    property_type: String,
    realtor_id: i32,
    listed_date: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<HomeRow> for Home {
    type Error = StoreError;

    fn try_from(row: HomeRow) -> Result<Self, Self::Error> {
        let property_type = row.property_type.parse::<PropertyType>().map_err(|_| {
            StoreError::Corrupt(format!(
                "home {} has property type '{}'",
                row.id, row.property_type
            ))
        })?;
        Ok(Home {
            id: row.id,
            address: row.address,
            city: row.city,
            land_size: row.land_size,
            number_of_bedrooms: row.number_of_bedrooms,
            number_of_bathrooms: row.number_of_bathrooms,
            property_type,
            realtor_id: row.realtor_id,
            listed_date: row.listed_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ListingRow {
    #[sqlx(flatten)]
    home: HomeRow,
    first_image: Option<String>,
}

#[derive(Debug, FromRow)]
struct RealtorRow {
    id: i32,
    name: String,
    email: String,
    phone: String,
}

/// Maps a write failure, turning unique violations into [`StoreError::Conflict`].
fn map_write_error(err: sqlx::Error, what: &str) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return StoreError::Conflict(what.to_string());
        }
    }
    StoreError::Database(err)
}

/// Repository storing rows in Postgres.
#[derive(Debug, Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    /// Connects to `database_url` and applies the embedded migrations.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(database_url)
            .await?;
        info!(max_connections, "Connected to Postgres");

        let repo = Self::from_pool(pool);
        repo.migrate().await?;
        Ok(repo)
    }

    /// Wraps an existing pool without running migrations.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the migrations under `server/migrations`.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }

    async fn image_urls(&self, home_id: i32) -> Result<Vec<String>, StoreError> {
        let urls = sqlx::query_scalar::<_, String>(
            "SELECT url FROM images WHERE home_id = $1 ORDER BY id",
        )
        .bind(home_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(urls)
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, email, phone, password, role, created_at, updated_at \
             FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        row.map(User::try_from).transpose()
    }

    async fn find_user_by_id(&self, id: i32) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, email, phone, password, role, created_at, updated_at \
             FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(User::try_from).transpose()
    }

    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (name, email, phone, password, role)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, name, email, phone, password, role, created_at, updated_at
            "#,
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|err| map_write_error(err, "email already registered"))?;
        debug!(user_id = row.id, "Inserted user row");
        User::try_from(row)
    }

    async fn list_homes(&self, filters: &HomeFilters) -> Result<Vec<HomeRecord>, StoreError> {
        let sql = format!(
            r#"
            SELECT {HOME_COLUMNS},
                (SELECT i.url FROM images i WHERE i.home_id = h.id ORDER BY i.id LIMIT 1)
                    AS first_image
            FROM homes h
            WHERE ($1::TEXT IS NULL OR h.city = $1)
              AND ($2::TEXT IS NULL OR h.property_type = $2)
            ORDER BY h.id
            "#
        );
        let rows = sqlx::query_as::<_, ListingRow>(&sql)
            .bind(filters.city.as_deref())
            .bind(filters.property_type.map(|t| t.as_str()))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                Ok(HomeRecord {
                    home: Home::try_from(row.home)?,
                    image_urls: row.first_image.into_iter().collect(),
                })
            })
            .collect()
    }

    async fn find_home(&self, id: i32) -> Result<Option<HomeRecord>, StoreError> {
        let sql = format!("SELECT {HOME_COLUMNS} FROM homes h WHERE h.id = $1");
        let Some(row) = sqlx::query_as::<_, HomeRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        Ok(Some(HomeRecord {
            home: Home::try_from(row)?,
            image_urls: self.image_urls(id).await?,
        }))
    }

    async fn find_home_realtor(&self, home_id: i32) -> Result<Option<Realtor>, StoreError> {
        let row = sqlx::query_as::<_, RealtorRow>(
            r#"
            SELECT u.id, u.name, u.email, u.phone
            FROM homes h
            JOIN users u ON u.id = h.realtor_id
            WHERE h.id = $1
            "#,
        )
        .bind(home_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Realtor {
            id: r.id,
            name: r.name,
            email: r.email,
            phone: r.phone,
        }))
    }

    async fn create_home(&self, new_home: NewHome) -> Result<HomeRecord, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, HomeRow>(
            r#"
            INSERT INTO homes (address, city, land_size, number_of_bedrooms,
                               number_of_bathrooms, property_type, realtor_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, address, city, land_size, number_of_bedrooms, number_of_bathrooms,
                      property_type, realtor_id, listed_date, created_at, updated_at
            "#,
        )
        .bind(&new_home.address)
        .bind(&new_home.city)
        .bind(new_home.land_size)
        .bind(new_home.number_of_bedrooms)
        .bind(new_home.number_of_bathrooms)
        .bind(new_home.property_type.as_str())
        .bind(new_home.realtor_id)
        .fetch_one(&mut *tx)
        .await?;

        if !new_home.image_urls.is_empty() {
            sqlx::query(
                r#"
                INSERT INTO images (url, home_id)
                SELECT t.url, $2
                FROM UNNEST($1::TEXT[]) WITH ORDINALITY AS t(url, ord)
                ORDER BY t.ord
                "#,
            )
            .bind(&new_home.image_urls)
            .bind(row.id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(
            home_id = row.id,
            image_count = new_home.image_urls.len(),
            "Inserted home and images"
        );

        Ok(HomeRecord {
            home: Home::try_from(row)?,
            image_urls: new_home.image_urls,
        })
    }

    async fn update_home(
        &self,
        id: i32,
        changes: &UpdateHomeRequest,
    ) -> Result<Option<HomeRecord>, StoreError> {
        let row = sqlx::query_as::<_, HomeRow>(
            r#"
            UPDATE homes SET
                address = COALESCE($2, address),
                number_of_bedrooms = COALESCE($3, number_of_bedrooms),
                number_of_bathrooms = COALESCE($4, number_of_bathrooms),
                city = COALESCE($5, city),
                land_size = COALESCE($6, land_size),
                property_type = COALESCE($7, property_type),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, address, city, land_size, number_of_bedrooms, number_of_bathrooms,
                      property_type, realtor_id, listed_date, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(changes.address.as_deref())
        .bind(changes.number_of_bedrooms)
        .bind(changes.number_of_bathrooms)
        .bind(changes.city.as_deref())
        .bind(changes.land_size)
        .bind(changes.property_type.map(|t| t.as_str()))
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(HomeRecord {
            home: Home::try_from(row)?,
            image_urls: self.image_urls(id).await?,
        }))
    }

    async fn delete_home(&self, id: i32) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let images = sqlx::query("DELETE FROM images WHERE home_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let homes = sqlx::query("DELETE FROM homes WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        debug!(home_id = id, images_deleted = images, "Deleted home rows");
        Ok(homes > 0)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seed_realtor(repo: &PgRepository, email: &str) -> User {
        repo.insert_user(NewUser {
            name: "Realtor".to_string(),
            email: email.to_string(),
            phone: "555 0100".to_string(),
            password_hash: "$2b$04$hash".to_string(),
            role: UserRole::Realtor,
        })
        .await
        .unwrap()
    }

    fn new_home(realtor_id: i32, city: &str, images: &[&str]) -> NewHome {
        NewHome {
            address: "1 Main St".to_string(),
            city: city.to_string(),
            land_size: 500.0,
            number_of_bedrooms: 3,
            number_of_bathrooms: 2,
            property_type: PropertyType::Residential,
            realtor_id,
            image_urls: images.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at a Postgres server"]
    async fn insert_user_rejects_duplicate_email(pool: PgPool) {
        let repo = PgRepository::from_pool(pool);
        let first = seed_realtor(&repo, "dup@example.com").await;

        let result = repo
            .insert_user(NewUser {
                name: "Other".to_string(),
                email: "dup@example.com".to_string(),
                phone: "1".to_string(),
                password_hash: "h".to_string(),
                role: UserRole::Buyer,
            })
            .await;

        assert!(matches!(result, Err(StoreError::Conflict(_))));
        assert_eq!(
            repo.find_user_by_email("dup@example.com").await.unwrap(),
            Some(first.clone())
        );
        assert_eq!(repo.find_user_by_id(first.id).await.unwrap(), Some(first));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at a Postgres server"]
    async fn list_returns_first_image_only(pool: PgPool) {
        let repo = PgRepository::from_pool(pool);
        let realtor = seed_realtor(&repo, "r@example.com").await;
        repo.create_home(new_home(realtor.id, "Brisbane", &["a.jpg", "b.jpg"]))
            .await
            .unwrap();

        let listed = repo.list_homes(&HomeFilters::default()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].image_urls, vec!["a.jpg".to_string()]);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at a Postgres server"]
    async fn list_filters_by_city_and_type(pool: PgPool) {
        let repo = PgRepository::from_pool(pool);
        let realtor = seed_realtor(&repo, "r@example.com").await;
        repo.create_home(new_home(realtor.id, "Brisbane", &[]))
            .await
            .unwrap();
        repo.create_home(NewHome {
            property_type: PropertyType::Condo,
            ..new_home(realtor.id, "Sydney", &[])
        })
        .await
        .unwrap();

        let by_city = repo
            .list_homes(&HomeFilters {
                city: Some("Sydney".to_string()),
                property_type: None,
            })
            .await
            .unwrap();
        assert_eq!(by_city.len(), 1);
        assert_eq!(by_city[0].home.city, "Sydney");
        assert!(by_city[0].image_urls.is_empty());

        let by_type = repo
            .list_homes(&HomeFilters {
                city: None,
                property_type: Some(PropertyType::Residential),
            })
            .await
            .unwrap();
        assert_eq!(by_type.len(), 1);
        assert_eq!(by_type[0].home.city, "Brisbane");
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at a Postgres server"]
    async fn find_home_returns_all_images_in_order(pool: PgPool) {
        let repo = PgRepository::from_pool(pool);
        let realtor = seed_realtor(&repo, "r@example.com").await;
        let created = repo
            .create_home(new_home(realtor.id, "Perth", &["c.jpg", "a.jpg", "b.jpg"]))
            .await
            .unwrap();

        let found = repo.find_home(created.home.id).await.unwrap().unwrap();
        assert_eq!(found.image_urls, vec!["c.jpg", "a.jpg", "b.jpg"]);
        assert_eq!(found.home.realtor_id, realtor.id);
        assert!(repo.find_home(created.home.id + 1).await.unwrap().is_none());
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at a Postgres server"]
    async fn update_changes_only_given_fields(pool: PgPool) {
        let repo = PgRepository::from_pool(pool);
        let realtor = seed_realtor(&repo, "r@example.com").await;
        let created = repo
            .create_home(new_home(realtor.id, "Perth", &["a.jpg"]))
            .await
            .unwrap();

        let changes = UpdateHomeRequest {
            city: Some("Darwin".to_string()),
            ..UpdateHomeRequest::default()
        };
        let updated = repo
            .update_home(created.home.id, &changes)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.home.city, "Darwin");
        assert_eq!(updated.home.address, created.home.address);
        assert_eq!(updated.home.number_of_bedrooms, 3);
        assert_eq!(updated.home.land_size, 500.0);
        assert_eq!(updated.home.property_type, PropertyType::Residential);
        assert_eq!(updated.image_urls, vec!["a.jpg"]);

        assert!(repo.update_home(9_999, &changes).await.unwrap().is_none());
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at a Postgres server"]
    async fn delete_removes_home_and_images(pool: PgPool) {
        let repo = PgRepository::from_pool(pool.clone());
        let realtor = seed_realtor(&repo, "r@example.com").await;
        let created = repo
            .create_home(new_home(realtor.id, "Hobart", &["a.jpg", "b.jpg"]))
            .await
            .unwrap();
        let id = created.home.id;

        assert!(repo.delete_home(id).await.unwrap());

        let (images,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM images WHERE home_id = $1")
            .bind(id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(images, 0);
        assert!(repo.find_home(id).await.unwrap().is_none());
        assert!(!repo.delete_home(id).await.unwrap());
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at a Postgres server"]
    async fn realtor_lookup_follows_home_owner(pool: PgPool) {
        let repo = PgRepository::from_pool(pool);
        let realtor = seed_realtor(&repo, "owner@example.com").await;
        let created = repo
            .create_home(new_home(realtor.id, "Cairns", &[]))
            .await
            .unwrap();

        let owner = repo
            .find_home_realtor(created.home.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(owner.id, realtor.id);
        assert_eq!(owner.email, "owner@example.com");
        assert!(repo.find_home_realtor(9_999).await.unwrap().is_none());

        repo.ping().await.unwrap();
    }
}
