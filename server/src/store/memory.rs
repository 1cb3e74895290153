//! In-process repository backed by ordered maps.
//!
//! All tables sit behind one [`RwLock`], so every operation is atomic with
//! respect to the others. The lock is never held across an `.await`.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use tracing::trace;

use super::{Repository, StoreError};
use crate::types::{
    Home, HomeFilters, HomeRecord, Image, NewHome, NewUser, Realtor, UpdateHomeRequest, User,
};

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<i32, User>,
    homes: BTreeMap<i32, Home>,
    images: BTreeMap<i32, Image>,
    last_user_id: i32,
    last_home_id: i32,
    last_image_id: i32,
}

impl Tables {
    fn image_urls(&self, home_id: i32, limit: Option<usize>) -> Vec<String> {
        self.images
            .values()
            .filter(|image| image.home_id == home_id)
            .take(limit.unwrap_or(usize::MAX))
            .map(|image| image.url.clone())
            .collect()
    }

    fn record(&self, home: &Home, limit: Option<usize>) -> HomeRecord {
        HomeRecord {
            home: home.clone(),
            image_urls: self.image_urls(home.id, limit),
        }
    }
}

/// Repository keeping every row in memory.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    tables: RwLock<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of image rows referencing `home_id`.
    pub fn image_count(&self, home_id: i32) -> usize {
        self.tables
            .read()
            .map(|t| t.images.values().filter(|i| i.home_id == home_id).count())
            .unwrap_or(0)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables.write().map_err(|_| StoreError::Poisoned)
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let tables = self.read()?;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_id(&self, id: i32) -> Result<Option<User>, StoreError> {
        Ok(self.read()?.users.get(&id).cloned())
    }

    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut tables = self.write()?;
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict("email already registered".to_string()));
        }

        tables.last_user_id += 1;
        let now = Utc::now();
        let stored = User {
            id: tables.last_user_id,
            name: user.name,
            email: user.email,
            phone: user.phone,
            password_hash: user.password_hash,
            role: user.role,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(stored.id, stored.clone());
        trace!(user_id = stored.id, "Inserted user row");
        Ok(stored)
    }

    async fn list_homes(&self, filters: &HomeFilters) -> Result<Vec<HomeRecord>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .homes
            .values()
            .filter(|home| filters.matches(home))
            .map(|home| tables.record(home, Some(1)))
            .collect())
    }

    async fn find_home(&self, id: i32) -> Result<Option<HomeRecord>, StoreError> {
        let tables = self.read()?;
        Ok(tables.homes.get(&id).map(|home| tables.record(home, None)))
    }

    async fn find_home_realtor(&self, home_id: i32) -> Result<Option<Realtor>, StoreError> {
        let tables = self.read()?;
        let Some(home) = tables.homes.get(&home_id) else {
            return Ok(None);
        };
        let realtor = tables
            .users
            .get(&home.realtor_id)
            .ok_or_else(|| StoreError::Corrupt(format!("home {home_id} has no realtor row")))?;
        Ok(Some(Realtor {
            id: realtor.id,
            name: realtor.name.clone(),
            email: realtor.email.clone(),
            phone: realtor.phone.clone(),
        }))
    }

    async fn create_home(&self, new_home: NewHome) -> Result<HomeRecord, StoreError> {
        let mut tables = self.write()?;
        if !tables.users.contains_key(&new_home.realtor_id) {
            return Err(StoreError::Corrupt(format!(
                "realtor {} does not exist",
                new_home.realtor_id
            )));
        }

        tables.last_home_id += 1;
        let now = Utc::now();
        let home = Home {
            id: tables.last_home_id,
            address: new_home.address,
            city: new_home.city,
            land_size: new_home.land_size,
            number_of_bedrooms: new_home.number_of_bedrooms,
            number_of_bathrooms: new_home.number_of_bathrooms,
            property_type: new_home.property_type,
            realtor_id: new_home.realtor_id,
            listed_date: now,
            created_at: now,
            updated_at: now,
        };
        tables.homes.insert(home.id, home.clone());

        for url in &new_home.image_urls {
            tables.last_image_id += 1;
            let image = Image {
                id: tables.last_image_id,
                url: url.clone(),
                home_id: home.id,
                created_at: now,
            };
            tables.images.insert(image.id, image);
        }

        Ok(HomeRecord {
            home,
            image_urls: new_home.image_urls,
        })
    }

    async fn update_home(
        &self,
        id: i32,
        changes: &UpdateHomeRequest,
    ) -> Result<Option<HomeRecord>, StoreError> {
        let mut tables = self.write()?;
        let Some(home) = tables.homes.get_mut(&id) else {
            return Ok(None);
        };
        changes.apply_to(home);
        home.updated_at = Utc::now();
        let home = home.clone();
        Ok(Some(tables.record(&home, None)))
    }

    async fn delete_home(&self, id: i32) -> Result<bool, StoreError> {
        let mut tables = self.write()?;
        if !tables.homes.contains_key(&id) {
            return Ok(false);
        }
        tables.images.retain(|_, image| image.home_id != id);
        tables.homes.remove(&id);
        Ok(true)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.read().map(|_| ())
    }
}
