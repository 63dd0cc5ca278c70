use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A property listing, as stored and as served
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub id: String,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub bedrooms: u32,
    pub bathrooms: f64,
    pub available: bool,
    pub tags: Vec<String>,
    /// Photo URLs or object keys
    pub photos: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of a create request; every field is optional
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NewListing {
    pub title: String,
    pub description: String,
    pub price: f64,
    pub bedrooms: u32,
    pub bathrooms: f64,
    pub available: bool,
    pub tags: Vec<String>,
    pub photos: Vec<String>,
}

/// Body of an update request: only the fields present are changed
///
/// `id` and the timestamps are not part of the patch and are ignored if sent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub bedrooms: Option<u32>,
    pub bathrooms: Option<f64>,
    pub available: Option<bool>,
    pub tags: Option<Vec<String>>,
    pub photos: Option<Vec<String>>,
}

/// Filters of `GET /properties`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingQuery {
    /// Only listings whose availability equals this value
    pub available: Option<bool>,
    /// Minimum number of bedrooms
    pub beds: Option<u32>,
    /// Minimum number of bathrooms
    pub baths: Option<f64>,
    /// Maximum price, inclusive
    pub max_price: Option<f64>,
}

impl Listing {
    /// New listing with a generated id; both timestamps set to `now`
    pub fn create(new: NewListing, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: new.title,
            description: new.description,
            price: new.price,
            bedrooms: new.bedrooms,
            bathrooms: new.bathrooms,
            available: new.available,
            tags: new.tags,
            photos: new.photos,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a partial update and bump `updated_at`
    pub fn apply(&mut self, patch: ListingPatch, now: DateTime<Utc>) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(price) = patch.price {
            self.price = price;
        }
        if let Some(bedrooms) = patch.bedrooms {
            self.bedrooms = bedrooms;
        }
        if let Some(bathrooms) = patch.bathrooms {
            self.bathrooms = bathrooms;
        }
        if let Some(available) = patch.available {
            self.available = available;
        }
        if let Some(tags) = patch.tags {
            self.tags = tags;
        }
        if let Some(photos) = patch.photos {
            self.photos = photos;
        }
        self.updated_at = now;
    }
}

impl ListingQuery {
    pub fn matches(&self, listing: &Listing) -> bool {
        self.available.is_none_or(|a| listing.available == a)
            && self.beds.is_none_or(|b| listing.bedrooms >= b)
            && self.baths.is_none_or(|b| listing.bathrooms >= b)
            && self.max_price.is_none_or(|p| listing.price <= p)
    }
}

/// Filter, then order newest first by last update
pub fn select(mut listings: Vec<Listing>, query: &ListingQuery) -> Vec<Listing> {
    listings.retain(|l| query.matches(l));
    listings.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    listings
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_create_defaults() {
        let now = Utc::now();
        let listing = Listing::create(NewListing::default(), now);
        assert!(Uuid::parse_str(&listing.id).is_ok());
        assert_eq!(listing.title, "");
        assert!(!listing.available);
        assert_eq!(listing.created_at, now);
        assert_eq!(listing.updated_at, now);
    }

    #[test]
    fn test_apply_only_touches_present_fields() {
        let created = Utc::now();
        let mut listing = Listing::create(
            NewListing {
                title: "Cottage".to_string(),
                price: 250_000.0,
                bedrooms: 2,
                ..NewListing::default()
            },
            created,
        );
        let patch: ListingPatch =
            serde_json::from_str(r#"{"price": 240000, "id": "ignored"}"#).expect("patch");
        let later = created + Duration::minutes(5);
        listing.apply(patch, later);

        assert_eq!(listing.title, "Cottage");
        assert_eq!(listing.price, 240_000.0);
        assert_eq!(listing.bedrooms, 2);
        assert_eq!(listing.created_at, created);
        assert_eq!(listing.updated_at, later);
        assert_ne!(listing.id, "ignored");
    }

    #[test]
    fn test_wire_format_is_camel_case() {
        let listing = Listing::create(NewListing::default(), Utc::now());
        let json = serde_json::to_value(&listing).expect("serialize");
        assert!(json.get("createdAt").is_some());
        assert!(json.get("updatedAt").is_some());
        assert!(json.get("created_at").is_none());
    }
}
