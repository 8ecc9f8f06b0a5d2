use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{PlaceCategory, SearchCategory};

/// The single stage of the event -> hotel -> food -> explore workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanningState {
    #[default]
    Idle,
    BrowsingEvents,
    EventSelected,
    /// Set by `CONFIRM_EVENT`; nothing downstream requires it.
    ConfirmingEvent,
    AwaitingHotelConfirmation,
    HotelFiltersOpen,
    AwaitingFoodConfirmation,
    FoodFiltersOpen,
    AwaitingExploreConfirmation,
    ExploreFiltersOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanningTrigger {
    EventsListed,
    EventConfirmed,
    ConfirmEventDirective,
    AskHotels,
    Accept,
    Decline,
    OpenFilters(SearchCategory),
    RunFilterSearch(SearchCategory),
    PlaceConfirmed {
        category: PlaceCategory,
        source: SearchCategory,
    },
    ClosePanel,
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("{trigger:?} is not allowed while {from:?}")]
pub struct TransitionError {
    pub from: PlanningState,
    pub trigger: PlanningTrigger,
}

impl PlanningState {
    pub const fn awaiting(category: SearchCategory) -> Self {
        match category {
            SearchCategory::Hotel => Self::AwaitingHotelConfirmation,
            SearchCategory::Food => Self::AwaitingFoodConfirmation,
            SearchCategory::Explore => Self::AwaitingExploreConfirmation,
        }
    }

    pub const fn filters_open(category: SearchCategory) -> Self {
        match category {
            SearchCategory::Hotel => Self::HotelFiltersOpen,
            SearchCategory::Food => Self::FoodFiltersOpen,
            SearchCategory::Explore => Self::ExploreFiltersOpen,
        }
    }

    /// Category of the yes/no prompt currently shown, if any.
    pub const fn prompt_category(self) -> Option<SearchCategory> {
        match self {
            Self::AwaitingHotelConfirmation => Some(SearchCategory::Hotel),
            Self::AwaitingFoodConfirmation => Some(SearchCategory::Food),
            Self::AwaitingExploreConfirmation => Some(SearchCategory::Explore),
            _ => None,
        }
    }

    /// Category of the open filter panel, if any.
    pub const fn filter_category(self) -> Option<SearchCategory> {
        match self {
            Self::HotelFiltersOpen => Some(SearchCategory::Hotel),
            Self::FoodFiltersOpen => Some(SearchCategory::Food),
            Self::ExploreFiltersOpen => Some(SearchCategory::Explore),
            _ => None,
        }
    }

    pub fn transition(self, trigger: PlanningTrigger) -> Result<Self, TransitionError> {
        let rejected = TransitionError {
            from: self,
            trigger,
        };

        match trigger {
            PlanningTrigger::EventsListed => Ok(match self {
                Self::Idle | Self::BrowsingEvents | Self::EventSelected | Self::ConfirmingEvent => {
                    Self::BrowsingEvents
                }
                // A list arriving mid-flow is shown without leaving the flow.
                other => other,
            }),
            PlanningTrigger::EventConfirmed => Ok(Self::EventSelected),
            PlanningTrigger::ConfirmEventDirective => Ok(match self {
                Self::BrowsingEvents => Self::ConfirmingEvent,
                other => other,
            }),
            PlanningTrigger::AskHotels => match self {
                Self::Idle
                | Self::BrowsingEvents
                | Self::EventSelected
                | Self::ConfirmingEvent
                | Self::AwaitingHotelConfirmation => Ok(Self::AwaitingHotelConfirmation),
                _ => Err(rejected),
            },
            PlanningTrigger::Accept => self
                .prompt_category()
                .map(Self::filters_open)
                .ok_or(rejected),
            PlanningTrigger::Decline => self
                .prompt_category()
                .map(|_| Self::Idle)
                .ok_or(rejected),
            PlanningTrigger::OpenFilters(category) => Ok(Self::filters_open(category)),
            PlanningTrigger::RunFilterSearch(category) => {
                if self.filter_category() == Some(category) {
                    Ok(self)
                } else {
                    Err(rejected)
                }
            }
            PlanningTrigger::PlaceConfirmed { category, source } => {
                Ok(if category == PlaceCategory::Hotel {
                    Self::AwaitingFoodConfirmation
                } else if source == SearchCategory::Explore {
                    Self::ExploreFiltersOpen
                } else {
                    Self::AwaitingExploreConfirmation
                })
            }
            PlanningTrigger::ClosePanel => Ok(match self {
                Self::ConfirmingEvent
                | Self::AwaitingHotelConfirmation
                | Self::HotelFiltersOpen
                | Self::AwaitingFoodConfirmation
                | Self::FoodFiltersOpen
                | Self::AwaitingExploreConfirmation
                | Self::ExploreFiltersOpen => Self::Idle,
                other => other,
            }),
        }
    }
}
