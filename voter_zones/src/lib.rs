mod config;
pub mod manual;
pub mod normalize;

use log::{debug, warn};

pub use crate::config::*;

/// Youngest age allowed to vote in any election.
pub const MIN_VOTING_AGE: i32 = 18;
/// Youth-wing eligibility band, both ends included.
pub const YOUTH_WING_MIN_AGE: i32 = 18;
pub const YOUTH_WING_MAX_AGE: i32 = 39;

/// The order in which zones are considered for the primary zone.
pub const PRIMARY_ZONE_PRECEDENCE: [ElectionType; 3] = [
    ElectionType::TradeBody,
    ElectionType::Trustee,
    ElectionType::YouthWing,
];

/// Decides if a voter of the given age may vote in this type of election,
/// independently of the zone codes.
pub fn age_eligible(election_type: ElectionType, age: i32) -> bool {
    match election_type {
        ElectionType::YouthWing => (YOUTH_WING_MIN_AGE..=YOUTH_WING_MAX_AGE).contains(&age),
        ElectionType::TradeBody | ElectionType::Trustee => age >= MIN_VOTING_AGE,
    }
}

/// Finds the zone code mapping of a canonical region.
///
/// Returns the mapping and whether the default region had to be used.
/// Unknown regions use the default region's mapping: this is not an error,
/// but callers should report it.
pub fn region_mapping<'a>(
    region_key: &str,
    config: &'a ResolverConfig,
) -> (Option<&'a ZoneCodeMapping>, bool) {
    let found = config
        .regions
        .iter()
        .find(|(name, _)| normalize::same_label(name, region_key))
        .map(|(_, m)| m);
    match found {
        Some(m) => (Some(m), false),
        None => {
            let default = config
                .regions
                .iter()
                .find(|(name, _)| normalize::same_label(name, &config.default_region))
                .map(|(_, m)| m);
            (default, true)
        }
    }
}

/// Computes the zones of a voter.
///
/// Arguments:
/// * `region_label` the free-text region of the voter, before alias resolution
/// * `age` the age of the voter
/// * `city` the city of the voter, used to split composite regions
/// * `config` the region tables
/// * `lookup` the zone table of the current batch
///
/// The primary zone is the first zone found in [`PRIMARY_ZONE_PRECEDENCE`]
/// order. A resolution without a primary zone must not be stored.
pub fn resolve_zones(
    region_label: &str,
    age: i32,
    city: Option<&str>,
    config: &ResolverConfig,
    lookup: &ZoneLookup,
) -> ZoneResolution {
    let region_key = normalize::canonical_region(region_label, city, config);
    let (mapping, used_default_mapping) = region_mapping(&region_key, config);
    if used_default_mapping {
        warn!(
            "resolve_zones: region {:?} is not mapped, using the {:?} mapping",
            region_label, config.default_region
        );
    }

    let mut res = ZoneResolution {
        region_key,
        used_default_mapping,
        youth_wing: None,
        trade_body: None,
        trustee: None,
        primary: None,
        missing_codes: Vec::new(),
    };
    let Some(mapping) = mapping else {
        warn!(
            "resolve_zones: default region {:?} has no mapping",
            config.default_region
        );
        return res;
    };

    for election_type in ElectionType::ALL {
        if !age_eligible(election_type, age) {
            continue;
        }
        let Some(code) = mapping.code(election_type) else {
            continue;
        };
        if election_type == ElectionType::YouthWing && !config.youth_wing_allowed(code) {
            debug!("resolve_zones: youth wing code {:?} is not activated", code);
            continue;
        }
        match lookup.get(code, election_type) {
            Some(zone) => {
                let slot = match election_type {
                    ElectionType::YouthWing => &mut res.youth_wing,
                    ElectionType::TradeBody => &mut res.trade_body,
                    ElectionType::Trustee => &mut res.trustee,
                };
                *slot = Some(zone.clone());
            }
            None => {
                warn!(
                    "resolve_zones: zone {}:{} is not in the zone table",
                    code, election_type
                );
                res.missing_codes.push(ZoneKey {
                    code: code.to_string(),
                    election_type,
                });
            }
        }
    }

    res.primary = PRIMARY_ZONE_PRECEDENCE
        .iter()
        .find_map(|et| match et {
            ElectionType::TradeBody => res.trade_body.clone(),
            ElectionType::Trustee => res.trustee.clone(),
            ElectionType::YouthWing => res.youth_wing.clone(),
        });
    debug!(
        "resolve_zones: {:?} age {} -> {:?}",
        res.region_key, age, res.primary
    );
    res
}

/// Resolves the zones of a normalized voter.
pub fn resolve_voter(
    voter: NormalizedVoter,
    config: &ResolverConfig,
    lookup: &ZoneLookup,
) -> ResolvedVoter {
    let zones = resolve_zones(
        &voter.region_label,
        voter.age,
        voter.city.as_deref(),
        config,
        lookup,
    );
    ResolvedVoter { voter, zones }
}
