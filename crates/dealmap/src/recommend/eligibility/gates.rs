use chrono::{Datelike, NaiveDateTime};

use crate::catalog::{Channel, DiscountProgram, QualificationPredicate, RequiredCredentialSet};
use crate::recommend::domain::{CandidateVenue, TransactionContext, UserProfile};

use super::{MatchedCredential, RejectionReason};

pub(crate) fn temporal_gate(
    program: &DiscountProgram,
    at: NaiveDateTime,
) -> Result<(), RejectionReason> {
    let date = at.date();
    let before_start = program.valid_from.is_some_and(|from| date < from);
    let after_end = program.valid_to.is_some_and(|to| date > to);
    if before_start || after_end {
        return Err(RejectionReason::OutsideValidity {
            valid_from: program.valid_from,
            valid_to: program.valid_to,
        });
    }

    if let Some(mask) = program.dow_mask {
        if !mask.allows(at.weekday()) {
            return Err(RejectionReason::DayNotAllowed {
                weekday: at.weekday().to_string(),
            });
        }
    }

    let window = program.time_window();
    if !window.contains(at.time()) {
        return Err(RejectionReason::OutsideTimeWindow {
            from: window.from,
            to: window.to,
        });
    }

    Ok(())
}

pub(crate) fn channel_gate(
    program: &DiscountProgram,
    channel: Channel,
) -> Result<(), RejectionReason> {
    match program.channel {
        Some(required) if required != channel => Err(RejectionReason::ChannelMismatch { required }),
        _ => Ok(()),
    }
}

/// Every non-empty category must be satisfied by at least one held credential.
pub(crate) fn credential_gate(
    required: Option<&RequiredCredentialSet>,
    profile: &UserProfile,
) -> Result<Vec<MatchedCredential>, RejectionReason> {
    let Some(required) = required else {
        return Ok(Vec::new());
    };

    required
        .non_empty_groups()
        .map(|(category, accepted)| {
            profile
                .matching_credential(category, accepted)
                .map(|credential| MatchedCredential {
                    category,
                    credential,
                })
                .ok_or(RejectionReason::MissingCredential { category })
        })
        .collect()
}

/// Spend and venue predicates. Brand caps need the usage tracker and are checked separately.
pub(crate) fn predicate_gate(
    program: &DiscountProgram,
    venue: &CandidateVenue,
    context: &TransactionContext,
) -> Result<(), RejectionReason> {
    for predicate in &program.predicates {
        match predicate {
            QualificationPredicate::MinimumSpend { amount } if context.spend < *amount => {
                return Err(RejectionReason::BelowMinimumSpend { minimum: *amount });
            }
            QualificationPredicate::MaximumSpend { amount } if context.spend > *amount => {
                return Err(RejectionReason::AboveMaximumSpend { maximum: *amount });
            }
            QualificationPredicate::ExcludedSubcategory { subcategory } => {
                let excluded = venue
                    .subcategory
                    .as_deref()
                    .is_some_and(|value| value.trim().eq_ignore_ascii_case(subcategory.trim()));
                if excluded {
                    return Err(RejectionReason::ExcludedSubcategory {
                        subcategory: subcategory.clone(),
                    });
                }
            }
            _ => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{
        DayOfWeekMask, ProgramId, ProviderCategory, ProviderId, UsagePeriod,
    };
    use crate::recommend::domain::VenueTags;
    use chrono::{NaiveDate, NaiveTime};
    use rust_decimal::Decimal;
    use std::collections::BTreeSet;

    fn program() -> DiscountProgram {
        DiscountProgram {
            id: ProgramId(1),
            name: "Lunch set".to_string(),
            provider_id: ProviderId(1),
            kind: None,
            amount: Decimal::from(10),
            max_amount: None,
            per_unit: None,
            max_usage_count: None,
            usage_period: UsagePeriod::Unlimited,
            valid_from: None,
            valid_to: None,
            dow_mask: None,
            time_from: None,
            time_to: None,
            channel: None,
            qualification: None,
            application_menu: None,
            required_level: None,
            is_active: true,
            is_discount: true,
            predicates: Vec::new(),
            conflicts_with: BTreeSet::new(),
            combinable: true,
        }
    }

    // 2025-11-05 is a Wednesday.
    fn wednesday_noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 11, 5)
            .and_then(|date| date.and_hms_opt(12, 0, 0))
            .expect("valid timestamp")
    }

    fn venue() -> CandidateVenue {
        CandidateVenue {
            brand_id: None,
            branch_id: None,
            name: "Corner Bistro".to_string(),
            latitude: 37.5,
            longitude: 127.0,
            distance_meters: 200.0,
            rating_signal: None,
            ownership: None,
            subcategory: Some("Dessert".to_string()),
            tags: VenueTags::default(),
        }
    }

    #[test]
    fn null_mask_allows_every_weekday() {
        let program = program();
        for offset in 0..7 {
            let at = wednesday_noon() + chrono::Duration::days(offset);
            assert!(temporal_gate(&program, at).is_ok(), "rejected on {}", at.weekday());
        }
    }

    #[test]
    fn mask_rejects_unset_weekday() {
        let mut program = program();
        program.dow_mask = Some(DayOfWeekMask::WEEKEND);
        assert_eq!(
            temporal_gate(&program, wednesday_noon()),
            Err(RejectionReason::DayNotAllowed {
                weekday: "Wed".to_string()
            })
        );
    }

    #[test]
    fn validity_window_is_inclusive() {
        let mut program = program();
        program.valid_from = NaiveDate::from_ymd_opt(2025, 11, 5);
        program.valid_to = NaiveDate::from_ymd_opt(2025, 11, 5);
        assert!(temporal_gate(&program, wednesday_noon()).is_ok());

        program.valid_to = NaiveDate::from_ymd_opt(2025, 11, 4);
        assert!(matches!(
            temporal_gate(&program, wednesday_noon()),
            Err(RejectionReason::OutsideValidity { .. })
        ));
    }

    #[test]
    fn time_window_rejects_outside_hours() {
        let mut program = program();
        program.time_from = NaiveTime::from_hms_opt(14, 0, 0);
        program.time_to = NaiveTime::from_hms_opt(17, 0, 0);
        assert!(matches!(
            temporal_gate(&program, wednesday_noon()),
            Err(RejectionReason::OutsideTimeWindow { .. })
        ));
    }

    #[test]
    fn channel_restriction_must_match() {
        let mut program = program();
        assert!(channel_gate(&program, Channel::Online).is_ok());

        program.channel = Some(Channel::Offline);
        assert!(channel_gate(&program, Channel::Offline).is_ok());
        assert_eq!(
            channel_gate(&program, Channel::Online),
            Err(RejectionReason::ChannelMismatch {
                required: Channel::Offline
            })
        );
    }

    #[test]
    fn credentials_combine_and_across_or_within() {
        let mut required = RequiredCredentialSet::default();
        required.require(ProviderCategory::Telco, "SKT");
        required.require(ProviderCategory::Telco, "KT");
        required.require(ProviderCategory::Payment, "Hyundai Card M");

        let telco_only = UserProfile {
            telco_credentials: vec!["kt".to_string()],
            ..UserProfile::default()
        };
        assert_eq!(
            credential_gate(Some(&required), &telco_only),
            Err(RejectionReason::MissingCredential {
                category: ProviderCategory::Payment
            })
        );

        let both = UserProfile {
            telco_credentials: vec!["kt".to_string()],
            payment_credentials: vec!["HYUNDAI CARD M".to_string()],
            ..UserProfile::default()
        };
        let matched = credential_gate(Some(&required), &both).expect("credentials satisfied");
        assert_eq!(matched.len(), 2);
        assert!(matched
            .iter()
            .any(|m| m.category == ProviderCategory::Telco && m.credential == "KT"));
    }

    #[test]
    fn missing_credential_set_places_no_constraint() {
        assert_eq!(
            credential_gate(None, &UserProfile::default()),
            Ok(Vec::new())
        );
    }

    #[test]
    fn spend_and_subcategory_predicates() {
        let mut program = program();
        program.predicates = vec![
            QualificationPredicate::MinimumSpend {
                amount: Decimal::from(10_000),
            },
            QualificationPredicate::ExcludedSubcategory {
                subcategory: "dessert".to_string(),
            },
        ];

        let small = TransactionContext::new(wednesday_noon(), Channel::Offline, Decimal::from(8_000));
        assert_eq!(
            predicate_gate(&program, &venue(), &small),
            Err(RejectionReason::BelowMinimumSpend {
                minimum: Decimal::from(10_000)
            })
        );

        let large =
            TransactionContext::new(wednesday_noon(), Channel::Offline, Decimal::from(12_000));
        assert!(matches!(
            predicate_gate(&program, &venue(), &large),
            Err(RejectionReason::ExcludedSubcategory { .. })
        ));

        let mut other_venue = venue();
        other_venue.subcategory = Some("coffee".to_string());
        assert!(predicate_gate(&program, &other_venue, &large).is_ok());
    }
}
