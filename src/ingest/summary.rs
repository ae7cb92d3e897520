use std::collections::BTreeMap;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::ingest::sink::RowOutcome;

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    pub stored_voters: u64,
    pub expected_rows: u64,
}

/// The counters of one batch run.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub source_file: String,
    pub mode: String,
    /// Rows that are not blank.
    pub total_rows: u64,
    pub blank_rows: u64,
    /// Inserted voters.
    pub processed: u64,
    pub updated: u64,
    pub duplicates: u64,
    pub errors: u64,
    pub skipped: u64,
    pub skip_reasons: BTreeMap<String, u64>,
    /// Rows whose date of birth could not be read and whose age column was
    /// used instead.
    pub dob_fallbacks: u64,
    /// Region labels whose voters had no zone at all.
    pub no_zone_for_region: BTreeMap<String, u64>,
    /// Region labels that matched nothing and used the default region.
    pub default_region_fallbacks: BTreeMap<String, u64>,
    /// `CODE:ELECTION_TYPE` keys absent from the zone table.
    pub missing_zone_codes: BTreeMap<String, u64>,
    pub verification: Option<Verification>,
}

fn bump(m: &mut BTreeMap<String, u64>, key: &str, n: u64) {
    *m.entry(key.to_string()).or_insert(0) += n;
}

impl BatchSummary {
    pub fn record(&mut self, outcome: &RowOutcome) {
        match outcome {
            RowOutcome::Inserted => self.processed += 1,
            RowOutcome::Updated => self.updated += 1,
            RowOutcome::Duplicate => self.duplicates += 1,
            RowOutcome::Error(_) => self.errors += 1,
            RowOutcome::Skipped(reason) => {
                self.skipped += 1;
                bump(&mut self.skip_reasons, reason.as_str(), 1);
            }
        }
    }

    pub fn record_dob_fallback(&mut self) {
        self.dob_fallbacks += 1;
    }

    pub fn record_no_zone(&mut self, region_label: &str) {
        bump(&mut self.no_zone_for_region, region_label, 1);
    }

    pub fn record_default_fallback(&mut self, region_label: &str) {
        bump(&mut self.default_region_fallbacks, region_label, 1);
    }

    pub fn record_missing_code(&mut self, key: &str) {
        bump(&mut self.missing_zone_codes, key, 1);
    }

    /// Adds the counters of a partial summary. The identification fields and
    /// the verification of `self` are kept.
    pub fn merge(&mut self, other: &BatchSummary) {
        self.total_rows += other.total_rows;
        self.blank_rows += other.blank_rows;
        self.processed += other.processed;
        self.updated += other.updated;
        self.duplicates += other.duplicates;
        self.errors += other.errors;
        self.skipped += other.skipped;
        self.dob_fallbacks += other.dob_fallbacks;
        for (target, source) in [
            (&mut self.skip_reasons, &other.skip_reasons),
            (&mut self.no_zone_for_region, &other.no_zone_for_region),
            (&mut self.default_region_fallbacks, &other.default_region_fallbacks),
            (&mut self.missing_zone_codes, &other.missing_zone_codes),
        ] {
            for (k, n) in source.iter() {
                bump(target, k, *n);
            }
        }
    }

    /// Rows that reached the store, whatever the result.
    pub fn handled(&self) -> u64 {
        self.processed + self.updated + self.duplicates + self.errors + self.skipped
    }

    pub fn set_verification(&mut self, stored_voters: u64) {
        self.verification = Some(Verification {
            stored_voters,
            expected_rows: self.total_rows,
        });
    }

    pub fn log(&self) {
        info!(
            "Summary of {} ({}): {} rows, {} blank",
            self.source_file, self.mode, self.total_rows, self.blank_rows
        );
        info!(
            "  inserted {}, updated {}, duplicates {}, errors {}, skipped {}",
            self.processed, self.updated, self.duplicates, self.errors, self.skipped
        );
        for (reason, n) in self.skip_reasons.iter() {
            info!("  skipped {}: {}", reason, n);
        }
        if self.dob_fallbacks > 0 {
            warn!(
                "  unreadable dates of birth, age column used: {}",
                self.dob_fallbacks
            );
        }
        for (region, n) in self.default_region_fallbacks.iter() {
            info!("  default region used for {:?}: {}", region, n);
        }
        for (region, n) in self.no_zone_for_region.iter() {
            info!("  no zone for {:?}: {}", region, n);
        }
        for (code, n) in self.missing_zone_codes.iter() {
            info!("  zone code missing from the zone table {}: {}", code, n);
        }
        if let Some(v) = &self.verification {
            info!(
                "  verification: {} stored voters, {} rows in the source",
                v.stored_voters, v.expected_rows
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::sink::SkipReason;

    #[test]
    fn outcomes_are_counted() {
        let mut s = BatchSummary::default();
        for o in [
            RowOutcome::Inserted,
            RowOutcome::Inserted,
            RowOutcome::Updated,
            RowOutcome::Duplicate,
            RowOutcome::Error("boom".to_string()),
            RowOutcome::Skipped(SkipReason::Under18),
            RowOutcome::Skipped(SkipReason::Under18),
            RowOutcome::Skipped(SkipReason::MissingName),
        ] {
            s.record(&o);
        }
        assert_eq!(s.processed, 2);
        assert_eq!(s.updated, 1);
        assert_eq!(s.duplicates, 1);
        assert_eq!(s.errors, 1);
        assert_eq!(s.skipped, 3);
        assert_eq!(s.skip_reasons.get("under_18"), Some(&2));
        assert_eq!(s.skip_reasons.get("missing_name"), Some(&1));
        assert_eq!(s.handled(), 8);
    }

    #[test]
    fn partial_summaries_merge() {
        let mut total = BatchSummary {
            source_file: "voters.csv".to_string(),
            mode: "insert".to_string(),
            ..BatchSummary::default()
        };
        let mut a = BatchSummary::default();
        a.total_rows = 2;
        a.record(&RowOutcome::Inserted);
        a.record_default_fallback("Atlantis");
        let mut b = BatchSummary::default();
        b.total_rows = 1;
        b.blank_rows = 1;
        b.record(&RowOutcome::Skipped(SkipReason::NoZoneForRegion));
        b.record_default_fallback("Atlantis");
        b.record_missing_code("GOA:TRADE_BODY");
        b.record_dob_fallback();
        total.merge(&a);
        total.merge(&b);
        assert_eq!(total.source_file, "voters.csv");
        assert_eq!(total.total_rows, 3);
        assert_eq!(total.blank_rows, 1);
        assert_eq!(total.processed, 1);
        assert_eq!(total.skip_reasons.get("no_zone_for_region"), Some(&1));
        assert_eq!(total.default_region_fallbacks.get("Atlantis"), Some(&2));
        assert_eq!(total.missing_zone_codes.get("GOA:TRADE_BODY"), Some(&1));
        assert_eq!(total.dob_fallbacks, 1);
    }

    #[test]
    fn json_keys_are_camel_case() {
        let mut s = BatchSummary::default();
        s.total_rows = 3;
        s.set_verification(2);
        let js = serde_json::to_value(&s).unwrap();
        assert_eq!(js["totalRows"], 3);
        assert_eq!(js["verification"]["storedVoters"], 2);
        assert_eq!(js["verification"]["expectedRows"], 3);
        assert!(js.get("defaultRegionFallbacks").is_some());
        assert_eq!(js["dobFallbacks"], 0);
    }
}
