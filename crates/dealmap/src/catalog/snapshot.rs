use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::domain::{
    Brand, BrandId, BranchId, BranchLocation, CatalogDocument, DiscountKind, DiscountProgram,
    DiscountProvider, PerUnitRule, ProgramId, ProviderCategory, ProviderId,
};
use super::normalize_credential;

/// Brand and branch scope of a single program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicabilityRule {
    brands: BTreeMap<BrandId, bool>,
    branches: BTreeMap<BranchId, bool>,
}

/// Result of matching a venue against an [`ApplicabilityRule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeMatch {
    Brand,
    Branch,
    BranchExcluded,
    BrandExcluded,
    Unrelated,
}

impl ApplicabilityRule {
    pub fn include_brand(&mut self, brand: BrandId, excluded: bool) {
        self.brands.insert(brand, excluded);
    }

    pub fn include_branch(&mut self, branch: BranchId, excluded: bool) {
        self.branches.insert(branch, excluded);
    }

    pub fn is_empty(&self) -> bool {
        self.brands.is_empty() && self.branches.is_empty()
    }

    /// Branch rows are consulted first so an explicit branch exclusion beats a brand inclusion.
    pub fn matches(&self, brand: Option<BrandId>, branch: Option<BranchId>) -> ScopeMatch {
        if let Some(excluded) = branch.and_then(|id| self.branches.get(&id)) {
            return if *excluded {
                ScopeMatch::BranchExcluded
            } else {
                ScopeMatch::Branch
            };
        }

        match brand.and_then(|id| self.brands.get(&id)) {
            Some(true) => ScopeMatch::BrandExcluded,
            Some(false) => ScopeMatch::Brand,
            None => ScopeMatch::Unrelated,
        }
    }
}

/// Acceptable credentials per category; an empty category places no constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequiredCredentialSet {
    groups: BTreeMap<ProviderCategory, BTreeSet<String>>,
}

impl RequiredCredentialSet {
    pub fn require(&mut self, category: ProviderCategory, credential: &str) {
        self.groups
            .entry(category)
            .or_default()
            .insert(normalize_credential(category, credential));
    }

    pub fn group(&self, category: ProviderCategory) -> Option<&BTreeSet<String>> {
        self.groups.get(&category).filter(|group| !group.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.groups.values().all(BTreeSet::is_empty)
    }

    pub fn non_empty_groups(&self) -> impl Iterator<Item = (ProviderCategory, &BTreeSet<String>)> {
        self.groups
            .iter()
            .filter(|(_, group)| !group.is_empty())
            .map(|(category, group)| (*category, group))
    }
}

/// Normalized monetary shape of a validated program.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DiscountShape {
    Percent { percent: Decimal },
    Fixed { amount: Decimal },
    PerUnit { rule: PerUnitRule },
}

impl DiscountShape {
    pub fn kind(&self) -> DiscountKind {
        match self {
            DiscountShape::Percent { .. } => DiscountKind::Percent,
            DiscountShape::Fixed { .. } => DiscountKind::Fixed,
            DiscountShape::PerUnit { .. } => DiscountKind::PerUnit,
        }
    }
}

/// A program whose references and shape have been checked against the snapshot.
#[derive(Debug, Clone, Copy)]
pub struct ValidatedProgram<'a> {
    pub program: &'a DiscountProgram,
    pub provider: &'a DiscountProvider,
    pub shape: DiscountShape,
}

/// Malformed catalog entry; the program is skipped, evaluation continues.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogIntegrityWarning {
    #[error("{program_id} has no discount kind")]
    MissingDiscountKind { program_id: ProgramId },
    #[error("{program_id} references unknown provider {}", .provider_id.0)]
    DanglingProvider {
        program_id: ProgramId,
        provider_id: ProviderId,
    },
    #[error("{program_id} is PER_UNIT without a usable unit rule")]
    MissingPerUnitRule { program_id: ProgramId },
    #[error("{program_id} has a negative magnitude")]
    NegativeMagnitude { program_id: ProgramId },
    #[error("{program_id} has no brand or branch applicability rows")]
    NoApplicability { program_id: ProgramId },
}

/// Immutable, versioned view of the discount catalog.
#[derive(Debug)]
pub struct CatalogSnapshot {
    version: u64,
    label: Option<String>,
    loaded_at: DateTime<Utc>,
    brands: HashMap<BrandId, Brand>,
    branches: HashMap<BranchId, BranchLocation>,
    providers: HashMap<ProviderId, DiscountProvider>,
    programs: Vec<DiscountProgram>,
    applicability: HashMap<ProgramId, ApplicabilityRule>,
    credentials: HashMap<ProgramId, RequiredCredentialSet>,
    by_brand: HashMap<BrandId, Vec<usize>>,
    by_branch: HashMap<BranchId, Vec<usize>>,
    warnings: Vec<CatalogIntegrityWarning>,
}

impl CatalogSnapshot {
    pub fn from_document(document: CatalogDocument, version: u64) -> Self {
        let CatalogDocument {
            label,
            brands,
            branches,
            providers,
            mut programs,
            brand_applicability,
            branch_applicability,
            required_credentials,
        } = document;

        programs.sort_by_key(|program| program.id);

        let mut applicability: HashMap<ProgramId, ApplicabilityRule> = HashMap::new();
        for row in brand_applicability {
            applicability
                .entry(row.program_id)
                .or_default()
                .include_brand(row.brand_id, row.excluded);
        }
        for row in branch_applicability {
            applicability
                .entry(row.program_id)
                .or_default()
                .include_branch(row.branch_id, row.excluded);
        }

        let mut credentials: HashMap<ProgramId, RequiredCredentialSet> = HashMap::new();
        for row in required_credentials {
            credentials
                .entry(row.program_id)
                .or_default()
                .require(row.category, &row.credential);
        }

        let mut by_brand: HashMap<BrandId, Vec<usize>> = HashMap::new();
        let mut by_branch: HashMap<BranchId, Vec<usize>> = HashMap::new();
        for (index, program) in programs.iter().enumerate() {
            if let Some(rule) = applicability.get(&program.id) {
                for brand in rule.brands.keys() {
                    by_brand.entry(*brand).or_default().push(index);
                }
                for branch in rule.branches.keys() {
                    by_branch.entry(*branch).or_default().push(index);
                }
            }
        }

        let mut snapshot = Self {
            version,
            label,
            loaded_at: Utc::now(),
            brands: brands.into_iter().map(|brand| (brand.id, brand)).collect(),
            branches: branches
                .into_iter()
                .map(|branch| (branch.id, branch))
                .collect(),
            providers: providers
                .into_iter()
                .map(|provider| (provider.id, provider))
                .collect(),
            programs,
            applicability,
            credentials,
            by_brand,
            by_branch,
            warnings: Vec::new(),
        };

        snapshot.warnings = snapshot
            .programs
            .iter()
            .filter_map(|program| {
                if snapshot
                    .applicability
                    .get(&program.id)
                    .map_or(true, ApplicabilityRule::is_empty)
                {
                    return Some(CatalogIntegrityWarning::NoApplicability {
                        program_id: program.id,
                    });
                }
                snapshot.validate(program).err()
            })
            .collect();

        snapshot
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn brand(&self, id: BrandId) -> Option<&Brand> {
        self.brands.get(&id)
    }

    pub fn branch(&self, id: BranchId) -> Option<&BranchLocation> {
        self.branches.get(&id)
    }

    pub fn provider(&self, id: ProviderId) -> Option<&DiscountProvider> {
        self.providers.get(&id)
    }

    pub fn programs(&self) -> &[DiscountProgram] {
        &self.programs
    }

    pub fn warnings(&self) -> &[CatalogIntegrityWarning] {
        &self.warnings
    }

    pub fn applicability(&self, program: ProgramId) -> Option<&ApplicabilityRule> {
        self.applicability.get(&program)
    }

    pub fn required_credentials(&self, program: ProgramId) -> Option<&RequiredCredentialSet> {
        self.credentials.get(&program)
    }

    /// Programs with any brand or branch row touching the venue, in program id order.
    ///
    /// A branch without an explicit brand falls back to the brand recorded in the catalog.
    pub fn programs_touching(
        &self,
        brand: Option<BrandId>,
        branch: Option<BranchId>,
    ) -> Vec<&DiscountProgram> {
        let brand = brand.or_else(|| branch.and_then(|id| self.branch(id)).map(|b| b.brand_id));

        let mut indices: Vec<usize> = brand
            .and_then(|id| self.by_brand.get(&id))
            .into_iter()
            .chain(branch.and_then(|id| self.by_branch.get(&id)))
            .flatten()
            .copied()
            .collect();
        indices.sort_unstable();
        indices.dedup();

        indices.into_iter().map(|index| &self.programs[index]).collect()
    }

    pub fn validate<'a>(
        &'a self,
        program: &'a DiscountProgram,
    ) -> Result<ValidatedProgram<'a>, CatalogIntegrityWarning> {
        let program_id = program.id;
        let provider = self.providers.get(&program.provider_id).ok_or(
            CatalogIntegrityWarning::DanglingProvider {
                program_id,
                provider_id: program.provider_id,
            },
        )?;

        let kind = program
            .kind
            .ok_or(CatalogIntegrityWarning::MissingDiscountKind { program_id })?;

        if program.amount.is_sign_negative() {
            return Err(CatalogIntegrityWarning::NegativeMagnitude { program_id });
        }

        let shape = match kind {
            DiscountKind::Percent => DiscountShape::Percent {
                percent: program.amount,
            },
            DiscountKind::Fixed => DiscountShape::Fixed {
                amount: program.amount,
            },
            DiscountKind::PerUnit => match program.per_unit {
                Some(rule) if rule.unit_amount > Decimal::ZERO => DiscountShape::PerUnit { rule },
                _ => return Err(CatalogIntegrityWarning::MissingPerUnitRule { program_id }),
            },
        };

        Ok(ValidatedProgram {
            program,
            provider,
            shape,
        })
    }

    pub fn summary(&self) -> CatalogSummary {
        CatalogSummary {
            version: self.version,
            label: self.label.clone(),
            loaded_at: self.loaded_at,
            brands: self.brands.len(),
            branches: self.branches.len(),
            providers: self.providers.len(),
            programs: self.programs.len(),
            active_programs: self
                .programs
                .iter()
                .filter(|program| program.is_active)
                .count(),
            integrity_warnings: self.warnings.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Operator-facing description of the loaded snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSummary {
    pub version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub loaded_at: DateTime<Utc>,
    pub brands: usize,
    pub branches: usize,
    pub providers: usize,
    pub programs: usize,
    pub active_programs: usize,
    pub integrity_warnings: Vec<String>,
}
