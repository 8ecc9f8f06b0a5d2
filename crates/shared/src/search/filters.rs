use serde::{Deserialize, Serialize};

use super::location::LocationPreference;
use crate::models::Place;

pub const DEFAULT_SEARCH_RADIUS_M: u32 = 1_500;
pub const MAX_SEARCH_RADIUS_M: u32 = 50_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Budget {
    Cheap,
    Moderate,
    Expensive,
}

impl Budget {
    /// Highest Google price level (0-4) accepted for this budget.
    pub const fn price_ceiling(self) -> u8 {
        match self {
            Self::Cheap => 1,
            Self::Moderate => 2,
            Self::Expensive => 4,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "cheap" | "budget" | "low" | "$" => Some(Self::Cheap),
            "moderate" | "medium" | "mid" | "$$" => Some(Self::Moderate),
            "expensive" | "luxury" | "high" | "$$$" | "$$$$" => Some(Self::Expensive),
            _ => None,
        }
    }
}

/// Post-fetch constraints applied to nearby-search results.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlaceFilter {
    pub min_rating: f64,
    pub max_price_level: Option<u8>,
}

impl PlaceFilter {
    pub fn new(min_rating: f64, budget: Option<Budget>) -> Self {
        Self {
            min_rating,
            max_price_level: budget.map(Budget::price_ceiling),
        }
    }

    /// Unrated places fail any positive rating floor; unknown prices pass.
    pub fn accepts(&self, place: &Place) -> bool {
        if self.min_rating > 0.0 && place.rating < self.min_rating {
            return false;
        }

        match (self.max_price_level, place.price_level) {
            (Some(ceiling), Some(level)) => level <= ceiling,
            _ => true,
        }
    }
}

/// Filters in upstream order, then caps to `limit`.
pub fn apply_place_filter(places: Vec<Place>, filter: &PlaceFilter, limit: usize) -> Vec<Place> {
    places
        .into_iter()
        .filter(|place| filter.accepts(place))
        .take(limit)
        .collect()
}

/// Per-category filter panel values, kept for the life of a planning session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchFilters {
    pub radius_m: u32,
    pub location_preference: LocationPreference,
    pub keyword: Option<String>,
    pub budget: Option<Budget>,
    pub min_rating: f64,
}

impl Default for SearchFilters {
    fn default() -> Self {
        Self {
            radius_m: DEFAULT_SEARCH_RADIUS_M,
            location_preference: LocationPreference::Venue,
            keyword: None,
            budget: None,
            min_rating: 0.0,
        }
    }
}

impl SearchFilters {
    /// Clamps values coming from the browser into searchable ranges.
    pub fn normalized(mut self) -> Self {
        self.radius_m = self.radius_m.clamp(1, MAX_SEARCH_RADIUS_M);
        self.min_rating = if self.min_rating.is_finite() {
            self.min_rating.clamp(0.0, 5.0)
        } else {
            0.0
        };
        self.keyword = self
            .keyword
            .map(|keyword| keyword.trim().to_string())
            .filter(|keyword| !keyword.is_empty());
        self
    }

    pub fn place_filter(&self) -> PlaceFilter {
        PlaceFilter::new(self.min_rating, self.budget)
    }
}
