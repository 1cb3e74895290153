//! Shared domain types for the Realty server.
//!
//! Rows stored by the repository ([`User`], [`Home`], [`Image`]), the
//! enums they carry, and the request/response bodies exchanged over HTTP.
//! JSON uses camelCase field names and upper-case enum values.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Role assigned to a user at signup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Buyer,
    Realtor,
    Admin,
}

impl UserRole {
    /// Canonical upper-case name, as stored and as mixed into product keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buyer => "BUYER",
            Self::Realtor => "REALTOR",
            Self::Admin => "ADMIN",
        }
    }

    /// Whether signing up with this role requires a product key.
    pub fn requires_product_key(&self) -> bool {
        !matches!(self, Self::Buyer)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = ApiError;

    /// Parses a role case-insensitively (`realtor`, `REALTOR`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUYER" => Ok(Self::Buyer),
            "REALTOR" => Ok(Self::Realtor),
            "ADMIN" => Ok(Self::Admin),
            other => Err(ApiError::validation(format!("unknown user type '{other}'"))),
        }
    }
}

/// Kind of property a home listing describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PropertyType {
    Residential,
    Condo,
}

impl PropertyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Residential => "RESIDENTIAL",
            Self::Condo => "CONDO",
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropertyType {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RESIDENTIAL" => Ok(Self::Residential),
            "CONDO" => Ok(Self::Condo),
            other => Err(ApiError::validation(format!(
                "unknown property type '{other}'"
            ))),
        }
    }
}

// ============================================================================
// Stored rows
// ============================================================================

/// A registered account.
///
/// `password_hash` is a bcrypt hash; the struct never leaves the server.
#[derive(Clone, PartialEq, Eq)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password_hash: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("role", &self.role)
            .field("password_hash", &"<redacted>")
            .finish()
    }
}

/// Values needed to insert a user row.
#[derive(Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password_hash: String,
    pub role: UserRole,
}

/// A property listing owned by one realtor.
#[derive(Debug, Clone, PartialEq)]
pub struct Home {
    pub id: i32,
    pub address: String,
    pub city: String,
    pub land_size: f64,
    pub number_of_bedrooms: i32,
    pub number_of_bathrooms: i32,
    pub property_type: PropertyType,
    pub realtor_id: i32,
    pub listed_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A picture attached to a home.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub id: i32,
    pub url: String,
    pub home_id: i32,
    pub created_at: DateTime<Utc>,
}

/// Values needed to insert a home row and its image rows.
#[derive(Debug, Clone, PartialEq)]
pub struct NewHome {
    pub address: String,
    pub city: String,
    pub land_size: f64,
    pub number_of_bedrooms: i32,
    pub number_of_bathrooms: i32,
    pub property_type: PropertyType,
    pub realtor_id: i32,
    pub image_urls: Vec<String>,
}

impl NewHome {
    /// Combines a create request with the id of the realtor listing it.
    pub fn from_request(request: CreateHomeRequest, realtor_id: i32) -> Self {
        Self {
            address: request.address,
            city: request.city,
            land_size: request.land_size,
            number_of_bedrooms: request.number_of_bedrooms,
            number_of_bathrooms: request.number_of_bathrooms,
            property_type: request.property_type,
            realtor_id,
            image_urls: request.images.into_iter().map(|image| image.url).collect(),
        }
    }
}

/// A home together with the image URLs a query selected for it.
#[derive(Debug, Clone, PartialEq)]
pub struct HomeRecord {
    pub home: Home,
    pub image_urls: Vec<String>,
}

/// The realtor owning a home.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Realtor {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub phone: String,
}

// ============================================================================
// Home requests
// ============================================================================

/// Filters accepted by the home listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeFilters {
    pub city: Option<String>,
    pub property_type: Option<PropertyType>,
}

impl HomeFilters {
    /// Drops blank filter values so `?city=` behaves like no filter.
    pub fn normalized(self) -> Self {
        Self {
            city: self
                .city
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty()),
            property_type: self.property_type,
        }
    }

    /// Whether a home satisfies every filter that is set.
    pub fn matches(&self, home: &Home) -> bool {
        self.city.as_ref().is_none_or(|city| &home.city == city)
            && self.property_type.is_none_or(|t| home.property_type == t)
    }
}

/// One image in a create-home request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInput {
    pub url: String,
}

/// Body of `POST /home`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateHomeRequest {
    pub address: String,
    pub number_of_bedrooms: i32,
    pub number_of_bathrooms: i32,
    pub city: String,
    pub land_size: f64,
    pub property_type: PropertyType,
    #[serde(default)]
    pub images: Vec<ImageInput>,
}

/// Body of `PUT /home/{id}`. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateHomeRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_of_bedrooms: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_of_bathrooms: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub land_size: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_type: Option<PropertyType>,
}

impl UpdateHomeRequest {
    /// Applies every supplied field to `home`.
    pub fn apply_to(&self, home: &mut Home) {
        if let Some(address) = &self.address {
            home.address = address.clone();
        }
        if let Some(bedrooms) = self.number_of_bedrooms {
            home.number_of_bedrooms = bedrooms;
        }
        if let Some(bathrooms) = self.number_of_bathrooms {
            home.number_of_bathrooms = bathrooms;
        }
        if let Some(city) = &self.city {
            home.city = city.clone();
        }
        if let Some(land_size) = self.land_size {
            home.land_size = land_size;
        }
        if let Some(property_type) = self.property_type {
            home.property_type = property_type;
        }
    }
}

// ============================================================================
// Home responses
// ============================================================================

/// Public projection of a home.
///
/// Listings carry at most one image URL; single-home lookups carry all of
/// them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeResponse {
    pub id: i32,
    pub address: String,
    pub city: String,
    pub land_size: f64,
    pub number_of_bedrooms: i32,
    pub number_of_bathrooms: i32,
    pub property_type: PropertyType,
    pub realtor_id: i32,
    pub listed_date: DateTime<Utc>,
    pub images: Vec<String>,
}

impl From<HomeRecord> for HomeResponse {
    fn from(record: HomeRecord) -> Self {
        let HomeRecord { home, image_urls } = record;
        Self {
            id: home.id,
            address: home.address,
            city: home.city,
            land_size: home.land_size,
            number_of_bedrooms: home.number_of_bedrooms,
            number_of_bathrooms: home.number_of_bathrooms,
            property_type: home.property_type,
            realtor_id: home.realtor_id,
            listed_date: home.listed_date,
            images: image_urls,
        }
    }
}

// ============================================================================
// Auth requests and responses
// ============================================================================

/// Body of `POST /auth/signup/{userType}`.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub product_key: Option<String>,
}

impl fmt::Debug for SignupRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignupRequest")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("product_key", &self.product_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Body of `POST /auth/signin`.
#[derive(Clone, Deserialize)]
pub struct SigninRequest {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for SigninRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigninRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Body of `POST /auth/key`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductKeyRequest {
    pub email: String,
    #[serde(rename = "type")]
    pub role: UserRole,
}

/// Response carrying a signed session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Response carrying a freshly generated product key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductKeyResponse {
    pub product_key: String,
}
