use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::model::{Cents, ServiceKind, ServiceRef, Studio};

const BUILTIN_CATALOG: &str = include_str!("../config/catalog.json");

#[derive(Debug)]
pub enum CatalogError {
    Io(String),
    Parse(String),
    Invalid(String),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::Io(e) => write!(f, "catalog unreadable: {e}"),
            CatalogError::Parse(e) => write!(f, "catalog malformed: {e}"),
            CatalogError::Invalid(e) => write!(f, "catalog invalid: {e}"),
        }
    }
}

impl std::error::Error for CatalogError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PricingError {
    /// Hour packages price a concrete session; a draft is required.
    DraftRequired,
    DurationMismatch { package_hours: u8, requested: u8 },
    ExceedsStudioMax { max: u8 },
    ExceedsIncludedHours { included: u8 },
}

impl std::fmt::Display for PricingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PricingError::DraftRequired => write!(f, "hour packages need a booking draft"),
            PricingError::DurationMismatch {
                package_hours,
                requested,
            } => write!(f, "package covers {package_hours}h but {requested}h were requested"),
            PricingError::ExceedsStudioMax { max } => {
                write!(f, "studio allows at most {max}h per booking")
            }
            PricingError::ExceedsIncludedHours { included } => {
                write!(f, "plan includes {included}h per month")
            }
        }
    }
}

impl std::error::Error for PricingError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Basic,
    Pro,
    Premium,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanFeature {
    StudioAccess,
    EngineerIncluded,
    MixingSession,
    StemExports,
    PriorityBooking,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionPlan {
    pub id: String,
    pub name: String,
    pub tier: PlanTier,
    pub monthly_price: Cents,
    /// Studio hours per month covered by the plan.
    pub included_hours: u8,
    pub features: Vec<PlanFeature>,
}

impl SubscriptionPlan {
    pub fn has(&self, feature: PlanFeature) -> bool {
        self.features.contains(&feature)
    }
}

/// A prepaid block of hours, charged at the studio's hourly rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HourPackage {
    pub id: String,
    pub name: String,
    pub hours: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServiceOffering {
    Subscription(SubscriptionPlan),
    HourPackage(HourPackage),
}

impl ServiceOffering {
    pub fn service_ref(&self) -> ServiceRef {
        match self {
            ServiceOffering::Subscription(p) => ServiceRef {
                kind: ServiceKind::Subscription,
                id: p.id.clone(),
            },
            ServiceOffering::HourPackage(p) => ServiceRef {
                kind: ServiceKind::HourPackage,
                id: p.id.clone(),
            },
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ServiceOffering::Subscription(p) => &p.name,
            ServiceOffering::HourPackage(p) => &p.name,
        }
    }
}

/// What a checkout charges and what the resulting booking records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pricing {
    pub amount_due: Cents,
    /// Stored as the booking's `total_price`. Zero for sessions covered by
    /// a subscription.
    pub booking_price: Cents,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub studios: Vec<Studio>,
    pub plans: Vec<SubscriptionPlan>,
    pub packages: Vec<HourPackage>,
}

impl Catalog {
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_json(BUILTIN_CATALOG)
    }

    /// Load from `path`, or the built-in catalog when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, CatalogError> {
        match path {
            None => Self::builtin(),
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .map_err(|e| CatalogError::Io(format!("{}: {e}", path.display())))?;
                Self::from_json(&raw)
            }
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        let catalog: Catalog =
            serde_json::from_str(raw).map_err(|e| CatalogError::Parse(e.to_string()))?;
        catalog.validate()?;
        Ok(catalog)
    }

    fn validate(&self) -> Result<(), CatalogError> {
        let mut ids = HashSet::new();
        for plan in &self.plans {
            if !ids.insert(plan.id.as_str()) {
                return Err(CatalogError::Invalid(format!("duplicate service id {}", plan.id)));
            }
            if plan.monthly_price < 0 {
                return Err(CatalogError::Invalid(format!("plan {} has a negative price", plan.id)));
            }
        }
        for package in &self.packages {
            if !ids.insert(package.id.as_str()) {
                return Err(CatalogError::Invalid(format!("duplicate service id {}", package.id)));
            }
            if package.hours == 0 {
                return Err(CatalogError::Invalid(format!("package {} has no hours", package.id)));
            }
        }
        let mut studio_ids = HashSet::new();
        for studio in &self.studios {
            if !studio_ids.insert(studio.id) {
                return Err(CatalogError::Invalid(format!("duplicate studio id {}", studio.id)));
            }
        }
        Ok(())
    }

    pub fn plan(&self, id: &str) -> Option<&SubscriptionPlan> {
        self.plans.iter().find(|p| p.id == id)
    }

    pub fn package(&self, id: &str) -> Option<&HourPackage> {
        self.packages.iter().find(|p| p.id == id)
    }

    /// Resolve an offering by kind and identifier, never by display name.
    pub fn offering(&self, kind: ServiceKind, id: &str) -> Option<ServiceOffering> {
        match kind {
            ServiceKind::Subscription => self.plan(id).cloned().map(ServiceOffering::Subscription),
            ServiceKind::HourPackage => self.package(id).cloned().map(ServiceOffering::HourPackage),
        }
    }

    /// Price an offering, optionally for a concrete session at `studio`.
    ///
    /// Hour packages cost `price_per_hour × hours` and the session must last
    /// exactly the package's hours. A subscription charges its monthly price;
    /// a session booked with it is recorded at zero and must fit the plan's
    /// included hours.
    pub fn price_for(
        &self,
        offering: &ServiceOffering,
        session: Option<(&Studio, u8)>,
    ) -> Result<Pricing, PricingError> {
        if let Some((studio, duration)) = session
            && duration > studio.max_booking_duration
        {
            return Err(PricingError::ExceedsStudioMax {
                max: studio.max_booking_duration,
            });
        }
        match offering {
            ServiceOffering::HourPackage(package) => {
                let (studio, duration) = session.ok_or(PricingError::DraftRequired)?;
                if duration != package.hours {
                    return Err(PricingError::DurationMismatch {
                        package_hours: package.hours,
                        requested: duration,
                    });
                }
                let price = studio.price_per_hour * package.hours as Cents;
                Ok(Pricing {
                    amount_due: price,
                    booking_price: price,
                })
            }
            ServiceOffering::Subscription(plan) => {
                if let Some((_, duration)) = session
                    && duration > plan.included_hours
                {
                    return Err(PricingError::ExceedsIncludedHours {
                        included: plan.included_hours,
                    });
                }
                Ok(Pricing {
                    amount_due: plan.monthly_price,
                    booking_price: 0,
                })
            }
        }
    }
}
