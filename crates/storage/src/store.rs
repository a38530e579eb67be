use std::collections::BTreeSet;

use rusqlite::types::Value;
use rusqlite::Connection;

use openview_core::{
    Account, AccountId, Condition, Owner, Record, RecordId, RecordKind, SessionKey,
};

use crate::error::StorageError;
use crate::traits::{RecordFilter, RecordStore};

/// Convert Vec<u8> to fixed-size array with proper error handling.
fn to_array<const N: usize>(v: Vec<u8>, label: &str) -> Result<[u8; N], StorageError> {
    v.try_into()
        .map_err(|_| StorageError::Serialization(format!("invalid {label} length")))
}

/// Cached cardinalities live in an INTEGER column; reject values that do not
/// survive the i64 round-trip instead of wrapping.
fn count_to_sql(count: Option<u64>) -> Result<Option<i64>, StorageError> {
    count
        .map(|n| {
            i64::try_from(n).map_err(|_| {
                StorageError::ConstraintViolation(format!("count {n} exceeds storage range"))
            })
        })
        .transpose()
}

fn count_from_sql(count: Option<i64>) -> Result<Option<u64>, StorageError> {
    count
        .map(|n| {
            u64::try_from(n).map_err(|_| {
                StorageError::ConstraintViolation(format!("negative count {n} in storage"))
            })
        })
        .transpose()
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

/// Owner scope as a WHERE fragment plus its bound value. The placeholder
/// index is supplied by the caller so the fragment composes with other
/// parameters.
fn owner_predicate(owner: &Owner, index: usize) -> (String, Value) {
    match owner {
        Owner::Identity(account) => (
            format!("owner_account = ?{index}"),
            Value::Blob(account.as_bytes().to_vec()),
        ),
        Owner::Session(key) => (
            format!("owner_session = ?{index}"),
            Value::Text(key.as_str().to_string()),
        ),
    }
}

const RECORD_COLUMNS: &str = "record_id, kind, owner_account, owner_session, name, \
     description, definition, session_default, archived, count";

type RawRecordRow = (
    Vec<u8>,
    String,
    Option<Vec<u8>>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<Vec<u8>>,
    bool,
    bool,
    Option<i64>,
);

fn read_raw_record(row: &rusqlite::Row) -> rusqlite::Result<RawRecordRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
    ))
}

fn record_from_raw(raw: RawRecordRow) -> Result<Record, StorageError> {
    let (
        id_bytes,
        kind,
        owner_account,
        owner_session,
        name,
        description,
        definition,
        session_default,
        archived,
        count,
    ) = raw;

    let owner = match (owner_account, owner_session) {
        (Some(bytes), None) => {
            Owner::Identity(AccountId::from_bytes(to_array::<16>(bytes, "owner_account")?))
        }
        (None, Some(key)) => Owner::Session(SessionKey::new(key)),
        _ => {
            return Err(StorageError::ConstraintViolation(
                "record must have exactly one owner".into(),
            ))
        }
    };

    let definition = match definition {
        Some(bytes) => Some(Condition::from_msgpack(&bytes)?),
        None => None,
    };

    let mut record = Record::draft(RecordKind::parse(&kind)?, owner);
    record.id = Some(RecordId::from_bytes(to_array::<16>(id_bytes, "record_id")?));
    record.name = name;
    record.description = description;
    record.definition = definition;
    record.session_default = session_default;
    record.archived = archived;
    record.count = count_from_sql(count)?;
    Ok(record)
}

fn load_shares(
    conn: &Connection,
    record_id: RecordId,
) -> Result<BTreeSet<AccountId>, StorageError> {
    let mut stmt = conn.prepare("SELECT account_id FROM shares WHERE record_id = ?1")?;
    let rows = stmt.query_map(
        rusqlite::params![record_id.as_bytes().as_slice()],
        |row| row.get::<_, Vec<u8>>(0),
    )?;

    let mut shares = BTreeSet::new();
    for row in rows {
        let bytes = row?;
        shares.insert(AccountId::from_bytes(to_array::<16>(bytes, "account_id")?));
    }
    Ok(shares)
}

fn record_params(record: &Record) -> Result<(RecordId, Option<Vec<u8>>), StorageError> {
    let id = record.id.ok_or_else(|| {
        StorageError::ConstraintViolation("cannot persist a record without an id".into())
    })?;
    let definition = match &record.definition {
        Some(condition) => Some(condition.to_msgpack()?),
        None => None,
    };
    Ok((id, definition))
}

/// Insert a brand new record row. Fails on primary key collision.
fn insert_record_row(conn: &Connection, record: &Record) -> Result<(), StorageError> {
    let (id, definition) = record_params(record)?;
    let count = count_to_sql(record.count)?;
    conn.execute(
        "INSERT INTO records (record_id, kind, owner_account, owner_session, name, description, definition, session_default, archived, count) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        rusqlite::params![
            id.as_bytes().as_slice(),
            record.kind.as_str(),
            record.owner.identity().map(|a| a.as_bytes().to_vec()),
            record.owner.session().map(|k| k.as_str().to_string()),
            record.name,
            record.description,
            definition,
            record.session_default,
            record.archived,
            count,
        ],
    )?;
    Ok(())
}

/// Upsert the live record row. Owner columns and kind are immutable after
/// creation and are deliberately absent from the update set.
fn upsert_record_row(conn: &Connection, record: &Record) -> Result<(), StorageError> {
    let (id, definition) = record_params(record)?;
    let count = count_to_sql(record.count)?;
    conn.execute(
        "INSERT INTO records (record_id, kind, owner_account, owner_session, name, description, definition, session_default, archived, count) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
         ON CONFLICT(record_id) DO UPDATE SET \
            name = excluded.name, \
            description = excluded.description, \
            definition = excluded.definition, \
            session_default = excluded.session_default, \
            archived = excluded.archived, \
            count = excluded.count, \
            updated_at = CAST(unixepoch('now','subsec') * 1000 AS INTEGER)",
        rusqlite::params![
            id.as_bytes().as_slice(),
            record.kind.as_str(),
            record.owner.identity().map(|a| a.as_bytes().to_vec()),
            record.owner.session().map(|k| k.as_str().to_string()),
            record.name,
            record.description,
            definition,
            record.session_default,
            record.archived,
            count,
        ],
    )?;
    Ok(())
}

impl RecordStore for SqliteStore {
    fn persist(
        &mut self,
        record: &Record,
        shares: &BTreeSet<AccountId>,
        new_accounts: &[Account],
        archive_snapshot: Option<&Record>,
    ) -> Result<RecordId, StorageError> {
        let (record_id, _) = record_params(record)?;
        let tx = self.conn.transaction()?;

        for account in new_accounts {
            tx.execute(
                "INSERT INTO accounts (account_id, username, email, active) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    account.id.as_bytes().as_slice(),
                    account.username,
                    account.email,
                    account.active,
                ],
            )?;
        }

        if let Some(snapshot) = archive_snapshot {
            insert_record_row(&tx, snapshot)?;
        }

        upsert_record_row(&tx, record)?;

        tx.execute(
            "DELETE FROM shares WHERE record_id = ?1",
            rusqlite::params![record_id.as_bytes().as_slice()],
        )?;
        for account_id in shares {
            tx.execute(
                "INSERT INTO shares (record_id, account_id) VALUES (?1, ?2)",
                rusqlite::params![
                    record_id.as_bytes().as_slice(),
                    account_id.as_bytes().as_slice(),
                ],
            )?;
        }

        tx.commit()?;
        Ok(record_id)
    }

    fn get_record(&self, owner: &Owner, id: RecordId) -> Result<Option<Record>, StorageError> {
        let (owner_sql, owner_value) = owner_predicate(owner, 2);
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM records WHERE record_id = ?1 AND {owner_sql}"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query_map(
            rusqlite::params![id.as_bytes().as_slice(), owner_value],
            read_raw_record,
        )?;

        match rows.next() {
            Some(raw) => {
                let mut record = record_from_raw(raw?)?;
                record.attach_shares(load_shares(&self.conn, id)?);
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn find_owned(
        &self,
        owner: &Owner,
        filter: &RecordFilter,
    ) -> Result<Vec<Record>, StorageError> {
        let (owner_sql, owner_value) = owner_predicate(owner, 1);
        let mut sql = format!(
            "SELECT {RECORD_COLUMNS} FROM records WHERE {owner_sql} AND archived = ?2"
        );
        let mut params: Vec<Value> = vec![owner_value, Value::from(filter.archived)];

        if let Some(kind) = filter.kind {
            params.push(Value::from(kind.as_str().to_string()));
            sql.push_str(&format!(" AND kind = ?{}", params.len()));
        }
        if let Some(flag) = filter.session_default {
            params.push(Value::from(flag));
            sql.push_str(&format!(" AND session_default = ?{}", params.len()));
        }
        sql.push_str(" ORDER BY created_at, record_id");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params), read_raw_record)?;

        let mut records = Vec::new();
        for raw in rows {
            let mut record = record_from_raw(raw?)?;
            let id = record.id.expect("row always carries an id");
            record.attach_shares(load_shares(&self.conn, id)?);
            records.push(record);
        }
        Ok(records)
    }

    fn find_default(
        &self,
        owner: &Owner,
        kind: RecordKind,
    ) -> Result<Option<Record>, StorageError> {
        let filter = RecordFilter {
            kind: Some(kind),
            archived: false,
            session_default: Some(true),
        };
        Ok(self.find_owned(owner, &filter)?.into_iter().next())
    }

    fn delete_record(&mut self, id: RecordId) -> Result<(), StorageError> {
        let affected = self.conn.execute(
            "DELETE FROM records WHERE record_id = ?1",
            rusqlite::params![id.as_bytes().as_slice()],
        )?;
        if affected == 0 {
            return Err(StorageError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn set_count(&mut self, id: RecordId, count: Option<u64>) -> Result<(), StorageError> {
        let count = count_to_sql(count)?;
        let affected = self.conn.execute(
            "UPDATE records SET count = ?1 WHERE record_id = ?2",
            rusqlite::params![count, id.as_bytes().as_slice()],
        )?;
        if affected == 0 {
            return Err(StorageError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn record_count(&self) -> Result<u64, StorageError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_by_kind(&self, owner: &Owner) -> Result<Vec<(RecordKind, u64)>, StorageError> {
        let (owner_sql, owner_value) = owner_predicate(owner, 1);
        let sql = format!(
            "SELECT kind, COUNT(*) FROM records WHERE {owner_sql} AND archived = 0 GROUP BY kind ORDER BY kind"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params![owner_value], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = Vec::new();
        for row in rows {
            let (kind, count) = row?;
            counts.push((RecordKind::parse(&kind)?, count as u64));
        }
        Ok(counts)
    }

    fn insert_account(&mut self, account: &Account) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO accounts (account_id, username, email, active) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                account.id.as_bytes().as_slice(),
                account.username,
                account.email,
                account.active,
            ],
        )?;
        Ok(())
    }

    fn account_by_username(&self, username: &str) -> Result<Option<Account>, StorageError> {
        read_account(
            &self.conn,
            "SELECT account_id, username, email, active FROM accounts WHERE username = ?1",
            username,
        )
    }

    fn account_by_email(&self, email: &str) -> Result<Option<Account>, StorageError> {
        read_account(
            &self.conn,
            "SELECT account_id, username, email, active FROM accounts WHERE email = ?1",
            email,
        )
    }

    fn account_count(&self) -> Result<u64, StorageError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM accounts", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn read_account(
    conn: &Connection,
    sql: &str,
    key: &str,
) -> Result<Option<Account>, StorageError> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query_map(rusqlite::params![key], |row| {
        let id_bytes: Vec<u8> = row.get(0)?;
        let username: String = row.get(1)?;
        let email: String = row.get(2)?;
        let active: bool = row.get(3)?;
        Ok((id_bytes, username, email, active))
    })?;

    match rows.next() {
        Some(row) => {
            let (id_bytes, username, email, active) = row?;
            Ok(Some(Account {
                id: AccountId::from_bytes(to_array::<16>(id_bytes, "account_id")?),
                username,
                email,
                active,
            }))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openview_core::{FieldValue, Operator};

    fn session_owner(token: &str) -> Owner {
        Owner::Session(SessionKey::new(token))
    }

    fn saved_record(owner: Owner) -> Record {
        let mut record = Record::draft(RecordKind::Query, owner);
        record.id = Some(RecordId::new());
        record.name = Some("salary query".into());
        record.definition = Some(Condition::filter(
            "title.salary",
            Operator::Gt,
            FieldValue::Integer(15000),
        ));
        record
    }

    #[test]
    fn persist_and_get_roundtrip() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let owner = session_owner("s1");
        let record = saved_record(owner.clone());
        let id = store
            .persist(&record, &BTreeSet::new(), &[], None)
            .unwrap();

        let loaded = store.get_record(&owner, id).unwrap().unwrap();
        assert_eq!(loaded.name.as_deref(), Some("salary query"));
        assert_eq!(loaded.definition, record.definition);
        assert!(loaded.shared_with().unwrap().is_empty());
    }

    #[test]
    fn get_is_owner_scoped() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let record = saved_record(session_owner("s1"));
        let id = store
            .persist(&record, &BTreeSet::new(), &[], None)
            .unwrap();

        assert!(store.get_record(&session_owner("s2"), id).unwrap().is_none());
        assert!(store
            .get_record(&Owner::Identity(AccountId::new()), id)
            .unwrap()
            .is_none());
    }

    #[test]
    fn upsert_does_not_duplicate() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let mut record = saved_record(session_owner("s1"));
        store.persist(&record, &BTreeSet::new(), &[], None).unwrap();

        record.name = Some("renamed".into());
        store.persist(&record, &BTreeSet::new(), &[], None).unwrap();

        assert_eq!(store.record_count().unwrap(), 1);
        let loaded = store
            .get_record(&session_owner("s1"), record.id.unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(loaded.name.as_deref(), Some("renamed"));
    }

    #[test]
    fn second_live_default_violates_the_unique_index() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let mut first = saved_record(session_owner("s1"));
        first.session_default = true;
        store.persist(&first, &BTreeSet::new(), &[], None).unwrap();

        let mut second = saved_record(session_owner("s1"));
        second.session_default = true;
        assert!(store
            .persist(&second, &BTreeSet::new(), &[], None)
            .is_err());
        assert_eq!(store.record_count().unwrap(), 1);

        // Archiving the conflicting row lifts the restriction.
        second.archived = true;
        store.persist(&second, &BTreeSet::new(), &[], None).unwrap();
        assert_eq!(store.record_count().unwrap(), 2);
    }

    #[test]
    fn snapshot_collision_rolls_back_everything() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let existing = saved_record(session_owner("s1"));
        store
            .persist(&existing, &BTreeSet::new(), &[], None)
            .unwrap();

        // Snapshot reuses an occupied primary key, so the insert half fails
        // and the whole transaction must unwind.
        let mut incoming = saved_record(session_owner("s1"));
        incoming.name = Some("new content".into());
        let mut snapshot = existing.clone();
        snapshot.archived = true;

        let account = Account::provisional("invitee@email.com");
        let shares = BTreeSet::from([account.id]);
        let result = store.persist(&incoming, &shares, &[account], Some(&snapshot));

        assert!(result.is_err());
        assert_eq!(store.record_count().unwrap(), 1);
        assert_eq!(store.account_count().unwrap(), 0);
    }

    #[test]
    fn count_outside_the_integer_column_is_rejected() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let record = saved_record(session_owner("s1"));
        let id = store
            .persist(&record, &BTreeSet::new(), &[], None)
            .unwrap();

        store.set_count(id, Some(42)).unwrap();
        let loaded = store.get_record(&session_owner("s1"), id).unwrap().unwrap();
        assert_eq!(loaded.count, Some(42));

        assert!(matches!(
            store.set_count(id, Some(u64::MAX)),
            Err(StorageError::ConstraintViolation(_))
        ));
        // The stored value is untouched by the refused write.
        let loaded = store.get_record(&session_owner("s1"), id).unwrap().unwrap();
        assert_eq!(loaded.count, Some(42));
    }

    #[test]
    fn opens_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("openview.db");
        let mut store = SqliteStore::open(path.to_str().unwrap()).unwrap();
        let record = saved_record(session_owner("s1"));
        store.persist(&record, &BTreeSet::new(), &[], None).unwrap();
        assert_eq!(store.record_count().unwrap(), 1);
    }
}
