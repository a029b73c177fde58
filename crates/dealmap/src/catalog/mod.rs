//! Discount catalog: entity rows, immutable snapshots, and the refresh machinery that swaps
//! them in while requests are in flight.

mod credential;
pub mod domain;
mod handle;
mod snapshot;
mod source;

pub use credential::normalize_credential;
pub use domain::{
    Brand, BrandApplicability, BrandId, BranchApplicability, BranchId, BranchLocation,
    CatalogDocument, Channel, DayOfWeekMask, DiscountKind, DiscountProgram, DiscountProvider,
    PerUnitRule, ProgramId, ProviderCategory, ProviderId, QualificationPredicate,
    RequiredCredential, TimeWindow, UsagePeriod,
};
pub use handle::{spawn_refresh, CatalogHandle};
pub use snapshot::{
    ApplicabilityRule, CatalogIntegrityWarning, CatalogSnapshot, CatalogSummary, DiscountShape,
    RequiredCredentialSet, ScopeMatch, ValidatedProgram,
};
pub use source::{CatalogLoadError, CatalogSource, JsonFileCatalogSource, StaticCatalogSource};
