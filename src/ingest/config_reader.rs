use crate::ingest::*;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use voter_zones::{RegionSplit, ResolverConfig, ZoneCodeMapping, ZoneRecord};

/// The worksheet used when none is requested and it exists.
pub const PREFERRED_WORKSHEET: &str = "MASTER DATA to Import";

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub resolver: ResolverConfig,
    #[serde(rename = "placeholderEmailDomain")]
    pub placeholder_email_domain: String,
    #[serde(rename = "batchSize")]
    pub batch_size: usize,
    #[serde(rename = "progressInterval")]
    pub progress_interval: usize,
    #[serde(rename = "preferredWorksheet")]
    pub preferred_worksheet: String,
    #[serde(rename = "defaultInputFile")]
    pub default_input_file: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            resolver: default_resolver_config(),
            placeholder_email_domain: "election.local".to_string(),
            batch_size: 100,
            progress_interval: 500,
            preferred_worksheet: PREFERRED_WORKSHEET.to_string(),
            default_input_file: "voters.xlsx".to_string(),
        }
    }
}

fn codes(youth_wing: Option<&str>, trade_body: Option<&str>, trustee: Option<&str>) -> ZoneCodeMapping {
    ZoneCodeMapping {
        youth_wing: youth_wing.map(|s| s.to_string()),
        trade_body: trade_body.map(|s| s.to_string()),
        trustee: trustee.map(|s| s.to_string()),
    }
}

/// The region table of the community.
pub fn default_resolver_config() -> ResolverConfig {
    let mut regions = BTreeMap::new();
    regions.insert(
        "Mumbai".to_string(),
        codes(Some("YW-MUMBAI"), Some("MUMBAI"), Some("TR-MUMBAI")),
    );
    regions.insert(
        "Thane".to_string(),
        codes(Some("YW-MUMBAI"), Some("THANE"), Some("TR-MUMBAI")),
    );
    regions.insert(
        "Kutch".to_string(),
        codes(Some("YW-KUTCH"), Some("KUTCH"), Some("TR-KUTCH")),
    );
    regions.insert(
        "Anjar".to_string(),
        codes(Some("YW-ANJAR"), Some("ANJAR"), Some("TR-KUTCH")),
    );
    regions.insert(
        "Anya Gujarat".to_string(),
        codes(Some("YW-GUJARAT"), Some("GUJARAT"), Some("TR-GUJARAT")),
    );
    regions.insert(
        "Karnataka & Goa".to_string(),
        codes(None, Some("KARNATAKA"), Some("TR-SOUTH")),
    );
    regions.insert(
        "Rest of India".to_string(),
        codes(None, Some("ROI"), Some("TR-ROI")),
    );

    let mut aliases = BTreeMap::new();
    for (from, to) in [
        ("Bombay", "Mumbai"),
        ("Karnataka-Goa", "Karnataka & Goa"),
        ("Karnataka - Goa", "Karnataka & Goa"),
        ("Anya-Gujarat", "Anya Gujarat"),
        ("Anjar - Anya Gujarat", "Anjar-Anya Gujarat"),
    ] {
        aliases.insert(from.to_string(), to.to_string());
    }

    ResolverConfig {
        regions,
        aliases,
        splits: vec![RegionSplit {
            composite: "Anjar-Anya Gujarat".to_string(),
            towns: ["Anjar", "Adipur", "Gandhidham", "Bhachau", "Varsamedi"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            town_region: "Anjar".to_string(),
            other_region: "Anya Gujarat".to_string(),
        }],
        default_region: "Mumbai".to_string(),
        youth_wing_allow_list: Some(vec!["YW-MUMBAI".to_string(), "YW-KUTCH".to_string()]),
    }
}

fn validate_config(config: &IngestConfig) -> IngestResult<()> {
    ensure_whatever!(config.batch_size > 0, "batchSize must be at least 1");
    ensure_whatever!(
        config.progress_interval > 0,
        "progressInterval must be at least 1"
    );
    let (mapping, _) = voter_zones::region_mapping(
        &config.resolver.default_region,
        &config.resolver,
    );
    ensure_whatever!(
        mapping.is_some(),
        "defaultRegion {:?} is not in the region table",
        config.resolver.default_region
    );
    for split in config.resolver.splits.iter() {
        for region in [&split.town_region, &split.other_region] {
            if !config
                .resolver
                .regions
                .keys()
                .any(|r| voter_zones::normalize::same_label(r, region))
            {
                warn!(
                    "Region {:?} of split {:?} is not in the region table",
                    region, split.composite
                );
            }
        }
    }
    Ok(())
}

/// Reads the ingest configuration. Keys missing from the file take their
/// default value. Without a file, all the defaults are used.
pub fn read_config(path: Option<&str>) -> IngestResult<IngestConfig> {
    let config = match path {
        Some(p) => {
            let contents = fs::read_to_string(p).context(OpeningJsonSnafu { path: p })?;
            serde_json::from_str(&contents).context(ParsingJsonSnafu { path: p })?
        }
        None => IngestConfig::default(),
    };
    validate_config(&config)?;
    Ok(config)
}

/// Reads a zone table to seed the store: `[{id, code, name, electionType, seats}]`.
pub fn read_zone_seed(path: &str) -> IngestResult<Vec<ZoneRecord>> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let zones: Vec<ZoneRecord> =
        serde_json::from_str(&contents).context(ParsingJsonSnafu { path })?;
    debug!("read_zone_seed: {} zones", zones.len());
    Ok(zones)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = read_config(None).unwrap();
        assert_eq!(config, IngestConfig::default());
        assert_eq!(config.resolver.default_region, "Mumbai");
    }

    #[test]
    fn partial_files_keep_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ingest.json");
        fs::write(
            &path,
            r#"{"batchSize": 25, "placeholderEmailDomain": "example.org"}"#,
        )
        .unwrap();
        let config = read_config(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.placeholder_email_domain, "example.org");
        assert_eq!(config.progress_interval, 500);
        assert_eq!(config.resolver, default_resolver_config());
    }

    #[test]
    fn allow_list_can_be_disabled() {
        let mut js = serde_json::to_value(IngestConfig::default()).unwrap();
        js["resolver"]["youthWingAllowList"] = serde_json::Value::Null;
        let config: IngestConfig = serde_json::from_value(js).unwrap();
        assert_eq!(config.resolver.youth_wing_allow_list, None);
        assert!(config.resolver.youth_wing_allowed("YW-GUJARAT"));
    }

    #[test]
    fn bad_configs_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ingest.json");
        fs::write(&path, r#"{"batchSize": 0}"#).unwrap();
        assert!(read_config(Some(path.to_str().unwrap())).is_err());

        let mut config = IngestConfig::default();
        config.resolver.default_region = "Atlantis".to_string();
        assert!(validate_config(&config).is_err());

        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            read_config(Some(path.to_str().unwrap())),
            Err(IngestError::ParsingJson { .. })
        ));
    }

    #[test]
    fn zone_seed_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zones.json");
        fs::write(
            &path,
            r#"[
                {"id": "z1", "code": "MUMBAI", "name": "Mumbai", "electionType": "TRADE_BODY", "seats": 5},
                {"id": "z2", "code": "YW-MUMBAI", "name": "Mumbai Youth", "electionType": "YOUTH_WING"}
            ]"#,
        )
        .unwrap();
        let zones = read_zone_seed(path.to_str().unwrap()).unwrap();
        assert_eq!(zones.len(), 2);
        assert_eq!(zones[1].seats, 0);
        assert_eq!(zones[1].election_type, voter_zones::ElectionType::YouthWing);
    }
}
