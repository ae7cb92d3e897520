// The voter sink: turns resolved voters into store records and writes them.

use log::debug;

use voter_zones::ResolvedVoter;

use crate::ingest::store::{StoreError, VoterStore};

#[derive(Eq, PartialEq, Debug, Clone, Copy, clap::ValueEnum)]
pub enum IngestMode {
    /// Create voters, count existing voter ids as duplicates.
    Insert,
    /// Update existing voters in place, create the others.
    Upsert,
}

impl IngestMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestMode::Insert => "insert",
            IngestMode::Upsert => "upsert",
        }
    }
}

/// Why a row was not written.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum SkipReason {
    MissingVoterId,
    MissingName,
    InvalidDob,
    Under18,
    NoZoneForRegion,
    UnreadableRow,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::MissingVoterId => "missing_voter_id",
            SkipReason::MissingName => "missing_name",
            SkipReason::InvalidDob => "invalid_dob",
            SkipReason::Under18 => "under_18",
            SkipReason::NoZoneForRegion => "no_zone_for_region",
            SkipReason::UnreadableRow => "unreadable_row",
        }
    }
}

/// The result of handling one row. Every row ends in exactly one outcome.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum RowOutcome {
    Inserted,
    Updated,
    Duplicate,
    Skipped(SkipReason),
    Error(String),
}

/// A voter ready to be stored: account fields, profile fields and zones.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct VoterRecord {
    pub voter_id: String,
    pub name: String,
    pub dob: Option<String>,
    pub age: i32,
    pub phone: String,
    /// Absent when the source has none and the phone is real.
    pub email: Option<String>,
    /// True when the phone was generated.
    pub placeholder_contact: bool,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub family_number: Option<String>,
    pub region_label: String,
    /// The primary zone.
    pub region_id: String,
    pub region_name: String,
    pub youth_wing_zone_id: Option<String>,
    pub trade_body_zone_id: Option<String>,
    pub trustee_zone_id: Option<String>,
}

/// A stand-in mobile number: `9999`, the last 4 digits of the voter id and
/// the last 2 digits of the row number.
///
/// The same voter id and row number always give the same number.
pub fn placeholder_phone(voter_id: &str, row_number: usize) -> String {
    let digits: Vec<char> = voter_id.chars().filter(|c| c.is_ascii_digit()).collect();
    let tail: String = digits[digits.len().saturating_sub(4)..].iter().collect();
    format!("9999{:0>4}{:02}", tail, row_number % 100)
}

pub fn placeholder_email(phone: &str, domain: &str) -> String {
    format!("{}@voter.{}", phone, domain)
}

/// Builds the store record of a resolved voter.
///
/// Fails when the voter has no zone at all. A missing phone is replaced by a
/// placeholder, and so is the email of a voter with a placeholder phone.
pub fn build_record(
    resolved: &ResolvedVoter,
    row_number: usize,
    email_domain: &str,
) -> Result<VoterRecord, SkipReason> {
    let voter = &resolved.voter;
    let zones = &resolved.zones;
    let primary = zones.primary.as_ref().ok_or(SkipReason::NoZoneForRegion)?;
    let (phone, placeholder_contact) = match &voter.phone {
        Some(p) => (p.clone(), false),
        None => {
            let p = placeholder_phone(&voter.voter_id, row_number);
            debug!(
                "build_record: voter {} gets placeholder phone {}",
                voter.voter_id, p
            );
            (p, true)
        }
    };
    let email = match &voter.email {
        Some(e) => Some(e.clone()),
        None if placeholder_contact => Some(placeholder_email(&phone, email_domain)),
        None => None,
    };
    let zone_id = |z: &Option<voter_zones::Zone>| z.as_ref().map(|z| z.id.clone());
    Ok(VoterRecord {
        voter_id: voter.voter_id.clone(),
        name: voter.name.clone(),
        dob: voter.dob.clone(),
        age: voter.age,
        phone,
        email,
        placeholder_contact,
        address: voter.address.clone(),
        city: voter.city.clone(),
        state: voter.state.clone(),
        family_number: voter.family_number.clone(),
        region_label: voter.region_label.clone(),
        region_id: primary.id.clone(),
        region_name: primary.name.clone(),
        youth_wing_zone_id: zone_id(&zones.youth_wing),
        trade_body_zone_id: zone_id(&zones.trade_body),
        trustee_zone_id: zone_id(&zones.trustee),
    })
}

fn insert_record(store: &mut dyn VoterStore, record: &VoterRecord) -> RowOutcome {
    match store.insert_voter(record) {
        Ok(_) => RowOutcome::Inserted,
        Err(StoreError::Duplicate { .. }) => RowOutcome::Duplicate,
        Err(e) => RowOutcome::Error(e.to_string()),
    }
}

/// Writes one record. Store failures become outcomes, never errors.
pub fn write_record(store: &mut dyn VoterStore, record: &VoterRecord, mode: IngestMode) -> RowOutcome {
    match mode {
        IngestMode::Insert => insert_record(store, record),
        IngestMode::Upsert => match store.find_voter(&record.voter_id) {
            Ok(Some(existing)) => {
                debug!(
                    "write_record: updating voter {} (zone {:?} -> {})",
                    existing.voter_id, existing.region_id, record.region_id
                );
                match store.update_voter(&existing, record) {
                    Ok(()) => RowOutcome::Updated,
                    Err(e) => RowOutcome::Error(e.to_string()),
                }
            }
            Ok(None) => insert_record(store, record),
            Err(e) => RowOutcome::Error(e.to_string()),
        },
    }
}
