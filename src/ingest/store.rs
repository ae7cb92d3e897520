//! SQLite persistence of zones, voter accounts and voter profiles.

use log::{debug, info};
use rusqlite::{ffi, params, Connection, ErrorCode, OptionalExtension};
use serde::Serialize;
use snafu::{prelude::*, Snafu};

use voter_zones::{ElectionType, ZoneRecord};

use crate::ingest::sink::VoterRecord;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    #[snafu(display("Voter {voter_id} already exists"))]
    Duplicate { voter_id: String },
    #[snafu(display("SQLite error while {action}: {source}"))]
    Sqlite {
        action: String,
        source: rusqlite::Error,
    },
    #[snafu(display("Zone {id} has an unknown election type {election_type:?}"))]
    BadZone { id: String, election_type: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A voter as found in the store.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct StoredVoter {
    pub id: i64,
    pub user_id: i64,
    pub voter_id: String,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub region_id: Option<String>,
}

/// What a wipe deleted.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize)]
pub struct WipeReport {
    pub votes: usize,
    pub voters: usize,
    pub users: usize,
}

/// The persistence operations the ingestion needs.
///
/// Writing one voter writes an account and a profile: implementations make
/// that pair atomic.
pub trait VoterStore {
    fn load_zones(&self) -> StoreResult<Vec<ZoneRecord>>;
    /// Inserts or refreshes zones by id. Returns the number of zones written.
    fn upsert_zones(&mut self, zones: &[ZoneRecord]) -> StoreResult<usize>;
    fn find_voter(&self, voter_id: &str) -> StoreResult<Option<StoredVoter>>;
    /// Creates the account and the profile of a voter. Fails with
    /// [`StoreError::Duplicate`] if the voter id is already stored.
    fn insert_voter(&mut self, record: &VoterRecord) -> StoreResult<StoredVoter>;
    fn update_voter(&mut self, existing: &StoredVoter, record: &VoterRecord) -> StoreResult<()>;
    fn count_voters(&self) -> StoreResult<u64>;
    /// Deletes votes, then voter profiles, then voter accounts.
    fn wipe_voters(&mut self) -> StoreResult<WipeReport>;
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS zones (
    id TEXT PRIMARY KEY,
    code TEXT NOT NULL,
    name TEXT NOT NULL,
    election_type TEXT NOT NULL,
    seats INTEGER NOT NULL DEFAULT 0,
    UNIQUE (code, election_type)
);
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    phone TEXT NOT NULL,
    email TEXT,
    role TEXT NOT NULL DEFAULT 'VOTER',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS voters (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    voter_id TEXT NOT NULL UNIQUE,
    user_id INTEGER NOT NULL UNIQUE REFERENCES users(id),
    name TEXT NOT NULL,
    dob TEXT,
    age INTEGER NOT NULL,
    phone TEXT NOT NULL,
    email TEXT,
    placeholder_contact INTEGER NOT NULL DEFAULT 0,
    address TEXT,
    city TEXT,
    state TEXT,
    family_number TEXT,
    region_label TEXT NOT NULL,
    region_id TEXT NOT NULL REFERENCES zones(id),
    youth_wing_zone_id TEXT REFERENCES zones(id),
    trade_body_zone_id TEXT REFERENCES zones(id),
    trustee_zone_id TEXT REFERENCES zones(id),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS votes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    voter_id INTEGER NOT NULL REFERENCES voters(id),
    zone_id TEXT NOT NULL REFERENCES zones(id),
    candidate TEXT,
    cast_at TEXT NOT NULL
);
";

pub struct SqliteVoterStore {
    conn: Connection,
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.code == ErrorCode::ConstraintViolation
                && (e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
        }
        _ => false,
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

impl SqliteVoterStore {
    pub fn open(path: &str) -> StoreResult<Self> {
        info!("Opening voter store {:?}", path);
        let conn = Connection::open(path).context(SqliteSnafu {
            action: format!("opening {}", path),
        })?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().context(SqliteSnafu {
            action: "opening an in-memory database",
        })?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .context(SqliteSnafu {
                action: "enabling foreign keys",
            })?;
        conn.execute_batch(SCHEMA).context(SqliteSnafu {
            action: "creating the schema",
        })?;
        Ok(SqliteVoterStore { conn })
    }
}

impl VoterStore for SqliteVoterStore {
    fn load_zones(&self) -> StoreResult<Vec<ZoneRecord>> {
        let action = "loading zones";
        let mut stmt = self
            .conn
            .prepare("SELECT id, code, name, election_type, seats FROM zones ORDER BY id")
            .context(SqliteSnafu { action })?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, u32>(4)?,
                ))
            })
            .context(SqliteSnafu { action })?;
        let mut zones = Vec::new();
        for row in rows {
            let (id, code, name, election_type, seats) = row.context(SqliteSnafu { action })?;
            let et = match election_type.parse::<ElectionType>() {
                Ok(et) => et,
                Err(_) => return BadZoneSnafu { id, election_type }.fail(),
            };
            zones.push(ZoneRecord {
                id,
                code,
                name,
                election_type: et,
                seats,
            });
        }
        debug!("load_zones: {} zones", zones.len());
        Ok(zones)
    }

    fn upsert_zones(&mut self, zones: &[ZoneRecord]) -> StoreResult<usize> {
        let action = "writing zones";
        let tx = self.conn.transaction().context(SqliteSnafu { action })?;
        for z in zones.iter() {
            tx.execute(
                "INSERT INTO zones (id, code, name, election_type, seats)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    code = excluded.code,
                    name = excluded.name,
                    election_type = excluded.election_type,
                    seats = excluded.seats",
                params![z.id, z.code, z.name, z.election_type.as_str(), z.seats],
            )
            .context(SqliteSnafu {
                action: format!("writing zone {}", z.id),
            })?;
        }
        tx.commit().context(SqliteSnafu { action })?;
        Ok(zones.len())
    }

    fn find_voter(&self, voter_id: &str) -> StoreResult<Option<StoredVoter>> {
        self.conn
            .query_row(
                "SELECT v.id, v.user_id, v.voter_id, u.name, u.phone, u.email, v.region_id
                 FROM voters v JOIN users u ON u.id = v.user_id
                 WHERE v.voter_id = ?1",
                params![voter_id],
                |row| {
                    Ok(StoredVoter {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        voter_id: row.get(2)?,
                        name: row.get(3)?,
                        phone: row.get(4)?,
                        email: row.get(5)?,
                        region_id: row.get(6)?,
                    })
                },
            )
            .optional()
            .context(SqliteSnafu {
                action: format!("looking up voter {}", voter_id),
            })
    }

    fn insert_voter(&mut self, r: &VoterRecord) -> StoreResult<StoredVoter> {
        let action = format!("inserting voter {}", r.voter_id);
        let classify = |e: rusqlite::Error| {
            if is_unique_violation(&e) {
                StoreError::Duplicate {
                    voter_id: r.voter_id.clone(),
                }
            } else {
                StoreError::Sqlite {
                    action: action.clone(),
                    source: e,
                }
            }
        };
        let ts = now();
        // Dropping the transaction on error rolls back the account.
        let tx = self.conn.transaction().map_err(classify)?;
        tx.execute(
            "INSERT INTO users (name, phone, email, role, created_at, updated_at)
             VALUES (?1, ?2, ?3, 'VOTER', ?4, ?4)",
            params![r.name, r.phone, r.email, ts],
        )
        .map_err(classify)?;
        let user_id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO voters (voter_id, user_id, name, dob, age, phone, email,
                placeholder_contact, address, city, state, family_number, region_label,
                region_id, youth_wing_zone_id, trade_body_zone_id, trustee_zone_id,
                created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                ?16, ?17, ?18, ?18)",
            params![
                r.voter_id,
                user_id,
                r.name,
                r.dob,
                r.age,
                r.phone,
                r.email,
                r.placeholder_contact,
                r.address,
                r.city,
                r.state,
                r.family_number,
                r.region_label,
                r.region_id,
                r.youth_wing_zone_id,
                r.trade_body_zone_id,
                r.trustee_zone_id,
                ts,
            ],
        )
        .map_err(classify)?;
        let id = tx.last_insert_rowid();
        tx.commit().map_err(classify)?;
        Ok(StoredVoter {
            id,
            user_id,
            voter_id: r.voter_id.clone(),
            name: r.name.clone(),
            phone: r.phone.clone(),
            email: r.email.clone(),
            region_id: Some(r.region_id.clone()),
        })
    }

    fn update_voter(&mut self, existing: &StoredVoter, r: &VoterRecord) -> StoreResult<()> {
        let action = format!("updating voter {}", r.voter_id);
        let ts = now();
        let tx = self.conn.transaction().context(SqliteSnafu {
            action: action.clone(),
        })?;
        tx.execute(
            "UPDATE users SET name = ?1, phone = ?2, email = ?3, updated_at = ?4 WHERE id = ?5",
            params![r.name, r.phone, r.email, ts, existing.user_id],
        )
        .context(SqliteSnafu {
            action: action.clone(),
        })?;
        tx.execute(
            "UPDATE voters SET name = ?1, dob = ?2, age = ?3, phone = ?4, email = ?5,
                placeholder_contact = ?6, address = ?7, city = ?8, state = ?9,
                family_number = ?10, region_label = ?11, region_id = ?12,
                youth_wing_zone_id = ?13, trade_body_zone_id = ?14, trustee_zone_id = ?15,
                updated_at = ?16
             WHERE id = ?17",
            params![
                r.name,
                r.dob,
                r.age,
                r.phone,
                r.email,
                r.placeholder_contact,
                r.address,
                r.city,
                r.state,
                r.family_number,
                r.region_label,
                r.region_id,
                r.youth_wing_zone_id,
                r.trade_body_zone_id,
                r.trustee_zone_id,
                ts,
                existing.id,
            ],
        )
        .context(SqliteSnafu {
            action: action.clone(),
        })?;
        tx.commit().context(SqliteSnafu { action })
    }

    fn count_voters(&self) -> StoreResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM voters", [], |row| row.get(0))
            .context(SqliteSnafu {
                action: "counting voters",
            })?;
        Ok(count.max(0) as u64)
    }

    fn wipe_voters(&mut self) -> StoreResult<WipeReport> {
        let action = "wiping voters";
        let tx = self.conn.transaction().context(SqliteSnafu { action })?;
        let votes = tx
            .execute("DELETE FROM votes", [])
            .context(SqliteSnafu { action })?;
        let voters = tx
            .execute("DELETE FROM voters", [])
            .context(SqliteSnafu { action })?;
        let users = tx
            .execute("DELETE FROM users WHERE role = 'VOTER'", [])
            .context(SqliteSnafu { action })?;
        tx.commit().context(SqliteSnafu { action })?;
        Ok(WipeReport {
            votes,
            voters,
            users,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ingest::config_reader::IngestConfig;

    /// One zone per code of the default region table.
    pub(crate) fn default_zones() -> Vec<ZoneRecord> {
        let config = IngestConfig::default();
        let mut zones: Vec<ZoneRecord> = Vec::new();
        for (region, mapping) in config.resolver.regions.iter() {
            for et in ElectionType::ALL {
                if let Some(code) = mapping.code(et) {
                    let id = format!("z-{}-{}", code.to_lowercase(), et.as_str().to_lowercase());
                    if zones.iter().all(|z| z.id != id) {
                        zones.push(ZoneRecord {
                            id,
                            code: code.to_string(),
                            name: format!("{} {}", region, et),
                            election_type: et,
                            seats: 3,
                        });
                    }
                }
            }
        }
        zones
    }

    pub(crate) fn seeded_store() -> SqliteVoterStore {
        let mut store = SqliteVoterStore::open_in_memory().unwrap();
        store.upsert_zones(&default_zones()).unwrap();
        store
    }

    /// A store whose voter operations always fail.
    #[derive(Default)]
    pub(crate) struct FailingStore {}

    fn io_failure() -> StoreError {
        StoreError::Sqlite {
            action: "testing".to_string(),
            source: rusqlite::Error::SqliteFailure(
                ffi::Error::new(ffi::SQLITE_IOERR),
                Some("disk I/O error".to_string()),
            ),
        }
    }

    impl VoterStore for FailingStore {
        fn load_zones(&self) -> StoreResult<Vec<ZoneRecord>> {
            Ok(default_zones())
        }
        fn upsert_zones(&mut self, zones: &[ZoneRecord]) -> StoreResult<usize> {
            Ok(zones.len())
        }
        fn find_voter(&self, _voter_id: &str) -> StoreResult<Option<StoredVoter>> {
            Err(io_failure())
        }
        fn insert_voter(&mut self, _record: &VoterRecord) -> StoreResult<StoredVoter> {
            Err(io_failure())
        }
        fn update_voter(&mut self, _existing: &StoredVoter, _record: &VoterRecord) -> StoreResult<()> {
            Err(io_failure())
        }
        fn count_voters(&self) -> StoreResult<u64> {
            Ok(0)
        }
        fn wipe_voters(&mut self) -> StoreResult<WipeReport> {
            Ok(WipeReport::default())
        }
    }

    pub(crate) fn record(voter_id: &str, phone: &str) -> VoterRecord {
        VoterRecord {
            voter_id: voter_id.to_string(),
            name: "Asha Shah".to_string(),
            dob: Some("15/06/1980".to_string()),
            age: 45,
            phone: phone.to_string(),
            email: None,
            placeholder_contact: false,
            address: None,
            city: Some("Mumbai".to_string()),
            state: None,
            family_number: None,
            region_label: "Mumbai".to_string(),
            region_id: "z-mumbai-trade_body".to_string(),
            region_name: "Mumbai TRADE_BODY".to_string(),
            youth_wing_zone_id: None,
            trade_body_zone_id: Some("z-mumbai-trade_body".to_string()),
            trustee_zone_id: Some("z-tr-mumbai-trustee".to_string()),
        }
    }

    #[test]
    fn zones_round_trip() {
        let store = seeded_store();
        let zones = store.load_zones().unwrap();
        assert_eq!(zones.len(), default_zones().len());
        assert!(zones
            .iter()
            .any(|z| z.code == "MUMBAI" && z.election_type == ElectionType::TradeBody));
    }

    #[test]
    fn zones_are_refreshed_by_id() {
        let mut store = seeded_store();
        let mut zone = default_zones()[0].clone();
        zone.seats = 11;
        store.upsert_zones(&[zone.clone()]).unwrap();
        let zones = store.load_zones().unwrap();
        assert_eq!(zones.len(), default_zones().len());
        assert_eq!(zones.iter().find(|z| z.id == zone.id).unwrap().seats, 11);
    }

    #[test]
    fn duplicates_are_recognised() {
        let mut store = seeded_store();
        store.insert_voter(&record("V1", "9876543210")).unwrap();
        match store.insert_voter(&record("V1", "9876500000")) {
            Err(StoreError::Duplicate { voter_id }) => assert_eq!(voter_id, "V1"),
            x => panic!("unexpected {:?}", x),
        }
        // The account of the failed insert was rolled back.
        let users: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap();
        assert_eq!(users, 1);
        assert_eq!(store.count_voters().unwrap(), 1);
    }

    #[test]
    fn unknown_zones_are_not_duplicates() {
        let mut store = seeded_store();
        let mut r = record("V1", "9876543210");
        r.region_id = "z-nowhere".to_string();
        let res = store.insert_voter(&r);
        assert!(matches!(res, Err(StoreError::Sqlite { .. })));
        assert_eq!(store.count_voters().unwrap(), 0);
    }

    #[test]
    fn updates_touch_account_and_profile() {
        let mut store = seeded_store();
        let stored = store.insert_voter(&record("V1", "9876543210")).unwrap();
        let mut r = record("V1", "9123456789");
        r.name = "Asha R. Shah".to_string();
        r.email = Some("asha@example.com".to_string());
        assert_eq!(stored.email, None);
        store.update_voter(&stored, &r).unwrap();
        let found = store.find_voter("V1").unwrap().unwrap();
        assert_eq!(found.phone, "9123456789");
        assert_eq!(found.name, "Asha R. Shah");
        assert_eq!(found.email.as_deref(), Some("asha@example.com"));
        assert_eq!(found.id, stored.id);
        assert_eq!(store.find_voter("V2").unwrap(), None);
    }

    #[test]
    fn wipe_deletes_votes_first() {
        let mut store = seeded_store();
        let v1 = store.insert_voter(&record("V1", "9876543210")).unwrap();
        store.insert_voter(&record("V2", "9876500000")).unwrap();
        store
            .conn
            .execute(
                "INSERT INTO users (name, phone, email, role, created_at, updated_at)
                 VALUES ('Admin', '9000000000', 'admin@example.com', 'ADMIN', 'x', 'x')",
                [],
            )
            .unwrap();
        store
            .conn
            .execute(
                "INSERT INTO votes (voter_id, zone_id, candidate, cast_at) VALUES (?1, ?2, 'C1', 'x')",
                params![v1.id, "z-mumbai-trade_body"],
            )
            .unwrap();
        let report = store.wipe_voters().unwrap();
        assert_eq!(
            report,
            WipeReport {
                votes: 1,
                voters: 2,
                users: 2
            }
        );
        assert_eq!(store.count_voters().unwrap(), 0);
        // Zones and non-voter accounts survive.
        assert_eq!(store.load_zones().unwrap().len(), default_zones().len());
        let users: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap();
        assert_eq!(users, 1);
    }

    #[test]
    fn bad_election_types_are_reported() {
        let store = seeded_store();
        store
            .conn
            .execute(
                "INSERT INTO zones (id, code, name, election_type) VALUES ('z-x', 'X', 'X', 'COUNCIL')",
                [],
            )
            .unwrap();
        assert!(matches!(
            store.load_zones(),
            Err(StoreError::BadZone { .. })
        ));
    }
}
