// ********* Zone data structures ***********

use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The three election types a zone can be scoped to.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ElectionType {
    YouthWing,
    TradeBody,
    Trustee,
}

impl ElectionType {
    pub const ALL: [ElectionType; 3] = [
        ElectionType::YouthWing,
        ElectionType::TradeBody,
        ElectionType::Trustee,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ElectionType::YouthWing => "YOUTH_WING",
            ElectionType::TradeBody => "TRADE_BODY",
            ElectionType::Trustee => "TRUSTEE",
        }
    }
}

impl Display for ElectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct UnknownElectionType(pub String);

impl Error for UnknownElectionType {}

impl Display for UnknownElectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown election type {:?}", self.0)
    }
}

impl FromStr for ElectionType {
    type Err = UnknownElectionType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "YOUTH_WING" => Ok(ElectionType::YouthWing),
            "TRADE_BODY" => Ok(ElectionType::TradeBody),
            "TRUSTEE" => Ok(ElectionType::Trustee),
            _ => Err(UnknownElectionType(s.to_string())),
        }
    }
}

/// A row of the zone table, as stored by the zone collaborator.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ZoneRecord {
    pub id: String,
    pub code: String,
    pub name: String,
    #[serde(rename = "electionType")]
    pub election_type: ElectionType,
    #[serde(default)]
    pub seats: u32,
}

/// A resolved zone: what ends up on a voter profile.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub name: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Hash, Ord, PartialOrd)]
pub struct ZoneKey {
    pub code: String,
    pub election_type: ElectionType,
}

impl Display for ZoneKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.code, self.election_type)
    }
}

/// The `{code}:{electionType} -> {id, name}` map, built once per batch.
///
/// It is read-only once built.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct ZoneLookup {
    zones: HashMap<ZoneKey, Zone>,
}

impl ZoneLookup {
    pub fn from_records(records: &[ZoneRecord]) -> ZoneLookup {
        let zones = records
            .iter()
            .map(|r| {
                (
                    ZoneKey {
                        code: r.code.clone(),
                        election_type: r.election_type,
                    },
                    Zone {
                        id: r.id.clone(),
                        name: r.name.clone(),
                    },
                )
            })
            .collect();
        ZoneLookup { zones }
    }

    pub fn get(&self, code: &str, election_type: ElectionType) -> Option<&Zone> {
        self.zones.get(&ZoneKey {
            code: code.to_string(),
            election_type,
        })
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

// ********* Resolver configuration **********

/// The zone codes of one region, one per election type.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZoneCodeMapping {
    #[serde(rename = "youthWing")]
    pub youth_wing: Option<String>,
    #[serde(rename = "tradeBody")]
    pub trade_body: Option<String>,
    pub trustee: Option<String>,
}

impl ZoneCodeMapping {
    pub fn code(&self, election_type: ElectionType) -> Option<&str> {
        match election_type {
            ElectionType::YouthWing => self.youth_wing.as_deref(),
            ElectionType::TradeBody => self.trade_body.as_deref(),
            ElectionType::Trustee => self.trustee.as_deref(),
        }
    }
}

/// A composite region label that is split on the voter's city.
///
/// Voters whose city is one of `towns` go to `town_region`, everybody else
/// goes to `other_region`.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct RegionSplit {
    pub composite: String,
    pub towns: Vec<String>,
    #[serde(rename = "townRegion")]
    pub town_region: String,
    #[serde(rename = "otherRegion")]
    pub other_region: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    pub regions: BTreeMap<String, ZoneCodeMapping>,
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
    #[serde(default)]
    pub splits: Vec<RegionSplit>,
    /// Region whose mapping is used when a label matches nothing.
    #[serde(rename = "defaultRegion")]
    pub default_region: String,
    /// The youth-wing codes that are activated. `None` activates every code
    /// present in the mapping.
    #[serde(rename = "youthWingAllowList")]
    pub youth_wing_allow_list: Option<Vec<String>>,
}

impl ResolverConfig {
    pub fn youth_wing_allowed(&self, code: &str) -> bool {
        match &self.youth_wing_allow_list {
            Some(allowed) => allowed.iter().any(|c| c == code),
            None => true,
        }
    }
}

// ******** Voter data structures *********

/// A voter row after field normalization, before zone resolution.
#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct NormalizedVoter {
    pub voter_id: String,
    pub name: String,
    /// `DD/MM/YYYY`
    pub dob: Option<String>,
    pub age: i32,
    /// Exactly 10 digits.
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub region_label: String,
    pub family_number: Option<String>,
}

/// The zone fields computed for one voter.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ZoneResolution {
    /// The region after alias resolution and city splitting.
    pub region_key: String,
    /// True when the region matched nothing and the default mapping was used.
    pub used_default_mapping: bool,
    pub youth_wing: Option<Zone>,
    pub trade_body: Option<Zone>,
    pub trustee: Option<Zone>,
    pub primary: Option<Zone>,
    /// Eligible codes that are not in the zone table.
    pub missing_codes: Vec<ZoneKey>,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ResolvedVoter {
    pub voter: NormalizedVoter,
    pub zones: ZoneResolution,
}
