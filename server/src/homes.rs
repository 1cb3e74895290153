//! Home listing service.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{ApiError, Result};
use crate::store::Repository;
use crate::types::{
    CreateHomeRequest, HomeFilters, HomeResponse, NewHome, Realtor, UpdateHomeRequest,
};

/// Listing queries and mutations over a [`Repository`].
#[derive(Clone)]
pub struct HomeService {
    store: Arc<dyn Repository>,
}

impl std::fmt::Debug for HomeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HomeService").finish_non_exhaustive()
    }
}

impl HomeService {
    pub fn new(store: Arc<dyn Repository>) -> Self {
        Self { store }
    }

    /// Homes matching `filters`, each with at most one image.
    ///
    /// Fails with `NotFound` when nothing matches.
    pub async fn get_homes(&self, filters: HomeFilters) -> Result<Vec<HomeResponse>> {
        let filters = filters.normalized();
        let records = self.store.list_homes(&filters).await?;
        if records.is_empty() {
            debug!(?filters, "No homes matched filters");
            return Err(ApiError::not_found("no homes match the given filters"));
        }
        Ok(records.into_iter().map(HomeResponse::from).collect())
    }

    /// One home with every image URL.
    pub async fn get_home_by_id(&self, id: i32) -> Result<HomeResponse> {
        self.store
            .find_home(id)
            .await?
            .map(HomeResponse::from)
            .ok_or_else(|| home_not_found(id))
    }

    /// Lists a new home owned by `realtor_id`.
    pub async fn create_home(
        &self,
        request: CreateHomeRequest,
        realtor_id: i32,
    ) -> Result<HomeResponse> {
        validate_create(&request)?;
        let record = self
            .store
            .create_home(NewHome::from_request(request, realtor_id))
            .await?;
        info!(
            home_id = record.home.id,
            realtor_id,
            image_count = record.image_urls.len(),
            "Home created"
        );
        Ok(record.into())
    }

    /// Applies the supplied fields to a home.
    pub async fn update_home(&self, id: i32, changes: UpdateHomeRequest) -> Result<HomeResponse> {
        validate_update(&changes)?;
        let record = self
            .store
            .update_home(id, &changes)
            .await?
            .ok_or_else(|| home_not_found(id))?;
        info!(home_id = id, "Home updated");
        Ok(record.into())
    }

    /// Deletes a home and its images.
    pub async fn delete_home(&self, id: i32) -> Result<()> {
        if !self.store.delete_home(id).await? {
            return Err(home_not_found(id));
        }
        info!(home_id = id, "Home deleted");
        Ok(())
    }

    /// The realtor who listed the home.
    pub async fn get_realtor_by_home_id(&self, id: i32) -> Result<Realtor> {
        self.store
            .find_home_realtor(id)
            .await?
            .ok_or_else(|| home_not_found(id))
    }
}

fn home_not_found(id: i32) -> ApiError {
    ApiError::not_found(format!("home {id} not found"))
}

fn validate_create(request: &CreateHomeRequest) -> Result<()> {
    require_text("address", &request.address)?;
    require_text("city", &request.city)?;
    require_count("numberOfBedrooms", request.number_of_bedrooms)?;
    require_count("numberOfBathrooms", request.number_of_bathrooms)?;
    require_land_size(request.land_size)?;
    if request.images.iter().any(|image| image.url.trim().is_empty()) {
        return Err(ApiError::validation("image urls must not be empty"));
    }
    Ok(())
}

fn validate_update(changes: &UpdateHomeRequest) -> Result<()> {
    if let Some(address) = &changes.address {
        require_text("address", address)?;
    }
    if let Some(city) = &changes.city {
        require_text("city", city)?;
    }
    if let Some(bedrooms) = changes.number_of_bedrooms {
        require_count("numberOfBedrooms", bedrooms)?;
    }
    if let Some(bathrooms) = changes.number_of_bathrooms {
        require_count("numberOfBathrooms", bathrooms)?;
    }
    if let Some(land_size) = changes.land_size {
        require_land_size(land_size)?;
    }
    Ok(())
}

fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ApiError::validation(format!("{field} must not be empty")));
    }
    Ok(())
}

fn require_count(field: &str, value: i32) -> Result<()> {
    if value < 0 {
        return Err(ApiError::validation(format!("{field} must not be negative")));
    }
    Ok(())
}

fn require_land_size(value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ApiError::validation("landSize must be a positive number"));
    }
    Ok(())
}
