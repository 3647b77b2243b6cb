//! libSQL backend: async `ProfileStore` implementation.
//!
//! Supports local file and in-memory databases. Aggregates are written in a
//! single transaction; keyed children and locations are synced by id.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::profile::model::{
    Account, Address, Business, BusinessLocation, ChildKind, Customer, Dealer, Expert,
    FavouriteDealer, KeyedChild, Role,
};
use crate::store::migrations;
use crate::store::traits::{NewActor, ProfileStore};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations. Writes
/// are serialised so two transactions never interleave on it.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    write_lock: Mutex<()>,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
            write_lock: Mutex::new(()),
        })
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Applied schema version.
    pub async fn schema_version(&self) -> Result<i64, DatabaseError> {
        migrations::get_current_version(self.conn()).await
    }
}

// ── Helper functions ────────────────────────────────────────────────

fn query_err(op: &'static str) -> impl FnOnce(libsql::Error) -> DatabaseError {
    move |e| DatabaseError::Query(format!("{op}: {e}"))
}

/// Map a write failure, surfacing unique-constraint violations separately.
fn write_err(op: &'static str) -> impl FnOnce(libsql::Error) -> DatabaseError {
    move |e| {
        let msg = e.to_string();
        if msg.contains("UNIQUE constraint failed") {
            DatabaseError::Constraint(format!("{op}: {msg}"))
        } else {
            DatabaseError::Query(format!("{op}: {msg}"))
        }
    }
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::Serialization(format!("bad uuid {s:?}: {e}")))
}

/// Steps are stored as their serde string form.
fn parse_step<S: DeserializeOwned>(s: String) -> Result<S, DatabaseError> {
    serde_json::from_value(serde_json::Value::String(s))
        .map_err(|e| DatabaseError::Serialization(format!("bad step: {e}")))
}

fn step_str<S: std::fmt::Display>(step: &S) -> String {
    step.to_string()
}

fn to_json<T: Serialize>(value: &T) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

fn opt_address(s: Option<String>) -> Result<Option<Address>, DatabaseError> {
    s.map(|s| serde_json::from_str(&s).map_err(|e| DatabaseError::Serialization(e.to_string())))
        .transpose()
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn opt_int(n: Option<u32>) -> libsql::Value {
    match n {
        Some(n) => libsql::Value::Integer(i64::from(n)),
        None => libsql::Value::Null,
    }
}

const ACCOUNT_COLUMNS: &str = "a.id, a.first_name, a.last_name, a.email, a.phone_number, a.role, a.onboarding_complete, a.created_at, a.updated_at";

/// Number of columns in `ACCOUNT_COLUMNS`; actor columns follow.
const ACCOUNT_WIDTH: i32 = 9;

/// Map the leading account columns of a row.
fn row_to_account(row: &libsql::Row) -> Result<Account, DatabaseError> {
    let id: String = row.get(0).map_err(query_err("account row"))?;
    let first_name: String = row.get(1).map_err(query_err("account row"))?;
    let last_name: String = row.get(2).map_err(query_err("account row"))?;
    let email: String = row.get(3).map_err(query_err("account row"))?;
    let phone_number: Option<String> = row.get::<String>(4).ok();
    let role_str: String = row.get(5).map_err(query_err("account row"))?;
    let complete: i64 = row.get(6).unwrap_or(0);
    let created_str: String = row.get(7).map_err(query_err("account row"))?;
    let updated_str: String = row.get(8).map_err(query_err("account row"))?;

    let role: Role = role_str
        .parse()
        .map_err(|e: String| DatabaseError::Serialization(e))?;

    Ok(Account {
        id: parse_uuid(&id)?,
        first_name,
        last_name,
        email,
        phone_number,
        role,
        onboarding_complete: complete != 0,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

async fn insert_account(conn: &Connection, account: &Account) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO accounts (id, first_name, last_name, email, phone_number, role, onboarding_complete, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            account.id.to_string(),
            account.first_name.as_str(),
            account.last_name.as_str(),
            account.email.as_str(),
            opt_text(account.phone_number.as_deref()),
            account.role.as_str(),
            i64::from(account.onboarding_complete),
            account.created_at.to_rfc3339(),
            account.updated_at.to_rfc3339(),
        ],
    )
    .await
    .map_err(write_err("insert_account"))?;
    Ok(())
}

async fn update_account(conn: &Connection, account: &Account) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE accounts SET first_name = ?1, last_name = ?2, phone_number = ?3, onboarding_complete = ?4, updated_at = ?5 WHERE id = ?6",
        params![
            account.first_name.as_str(),
            account.last_name.as_str(),
            opt_text(account.phone_number.as_deref()),
            i64::from(account.onboarding_complete),
            Utc::now().to_rfc3339(),
            account.id.to_string(),
        ],
    )
    .await
    .map_err(write_err("update_account"))?;
    Ok(())
}

async fn load_children(
    conn: &Connection,
    owner_id: Uuid,
    kind: ChildKind,
) -> Result<Vec<KeyedChild>, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT id, code, others_text FROM keyed_children WHERE owner_id = ?1 AND kind = ?2 ORDER BY position",
            params![owner_id.to_string(), kind.as_str()],
        )
        .await
        .map_err(query_err("load_children"))?;

    let mut children = Vec::new();
    while let Some(row) = rows.next().await.map_err(query_err("load_children"))? {
        let id: String = row.get(0).map_err(query_err("load_children"))?;
        children.push(KeyedChild {
            id: parse_uuid(&id)?,
            code: row.get(1).map_err(query_err("load_children"))?,
            others_text: row.get::<String>(2).ok(),
        });
    }
    Ok(children)
}

async fn ids_for(conn: &Connection, sql: &str, owner: Uuid) -> Result<Vec<Uuid>, DatabaseError> {
    let mut rows = conn
        .query(sql, params![owner.to_string()])
        .await
        .map_err(query_err("ids_for"))?;
    let mut ids = Vec::new();
    while let Some(row) = rows.next().await.map_err(query_err("ids_for"))? {
        let id: String = row.get(0).map_err(query_err("ids_for"))?;
        ids.push(parse_uuid(&id)?);
    }
    Ok(ids)
}

/// Make the stored children of `owner_id`/`kind` match `children` by id.
async fn sync_children(
    conn: &Connection,
    owner_id: Uuid,
    kind: ChildKind,
    children: &[KeyedChild],
) -> Result<(), DatabaseError> {
    let keep: HashSet<Uuid> = children.iter().map(|c| c.id).collect();

    let mut rows = conn
        .query(
            "SELECT id FROM keyed_children WHERE owner_id = ?1 AND kind = ?2",
            params![owner_id.to_string(), kind.as_str()],
        )
        .await
        .map_err(query_err("sync_children"))?;
    let mut stale = Vec::new();
    while let Some(row) = rows.next().await.map_err(query_err("sync_children"))? {
        let id: String = row.get(0).map_err(query_err("sync_children"))?;
        if !keep.contains(&parse_uuid(&id)?) {
            stale.push(id);
        }
    }

    for id in &stale {
        conn.execute("DELETE FROM keyed_children WHERE id = ?1", params![id.as_str()])
            .await
            .map_err(write_err("sync_children delete"))?;
    }

    for (position, child) in children.iter().enumerate() {
        conn.execute(
            "INSERT INTO keyed_children (id, owner_id, kind, code, others_text, position) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET code = excluded.code, others_text = excluded.others_text, position = excluded.position",
            params![
                child.id.to_string(),
                owner_id.to_string(),
                kind.as_str(),
                child.code.as_str(),
                opt_text(child.others_text.as_deref()),
                position as i64,
            ],
        )
        .await
        .map_err(write_err("sync_children upsert"))?;
    }

    if !stale.is_empty() {
        debug!(%owner_id, kind = kind.as_str(), removed = stale.len(), "Removed keyed children");
    }
    Ok(())
}

async fn delete_location(conn: &Connection, location_id: Uuid) -> Result<(), DatabaseError> {
    conn.execute(
        "DELETE FROM keyed_children WHERE owner_id = ?1",
        params![location_id.to_string()],
    )
    .await
    .map_err(write_err("delete_location children"))?;
    conn.execute(
        "DELETE FROM business_locations WHERE id = ?1",
        params![location_id.to_string()],
    )
    .await
    .map_err(write_err("delete_location"))?;
    Ok(())
}

async fn save_business(
    conn: &Connection,
    dealer_id: Uuid,
    business: &Business,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO businesses (id, dealer_id, name, phone_number, website, description) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name, phone_number = excluded.phone_number,
             website = excluded.website, description = excluded.description",
        params![
            business.id.to_string(),
            dealer_id.to_string(),
            business.name.as_str(),
            opt_text(business.phone_number.as_deref()),
            opt_text(business.website.as_deref()),
            opt_text(business.description.as_deref()),
        ],
    )
    .await
    .map_err(write_err("save_business"))?;

    sync_children(conn, business.id, ChildKind::Brand, &business.brands).await?;
    sync_children(conn, business.id, ChildKind::JobCategory, &business.job_categories).await?;

    let keep: HashSet<Uuid> = business.locations.iter().map(|l| l.id).collect();
    let existing = ids_for(
        conn,
        "SELECT id FROM business_locations WHERE business_id = ?1",
        business.id,
    )
    .await?;
    for id in existing.into_iter().filter(|id| !keep.contains(id)) {
        delete_location(conn, id).await?;
        debug!(business_id = %business.id, location_id = %id, "Removed business location");
    }

    for (position, location) in business.locations.iter().enumerate() {
        let address = &location.address;
        conn.execute(
            "INSERT INTO business_locations (id, business_id, name, line1, line2, city, state, zip_code, position) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, line1 = excluded.line1, line2 = excluded.line2,
                 city = excluded.city, state = excluded.state, zip_code = excluded.zip_code, position = excluded.position",
            params![
                location.id.to_string(),
                business.id.to_string(),
                opt_text(location.name.as_deref()),
                address.line1.as_str(),
                opt_text(address.line2.as_deref()),
                address.city.as_str(),
                address.state.as_str(),
                address.zip_code.as_str(),
                position as i64,
            ],
        )
        .await
        .map_err(write_err("save_location"))?;

        sync_children(
            conn,
            location.id,
            ChildKind::ServiceableCounty,
            &location.serviceable_counties,
        )
        .await?;
    }
    Ok(())
}

async fn load_business(
    conn: &Connection,
    dealer_id: Uuid,
) -> Result<Option<Business>, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT id, name, phone_number, website, description FROM businesses WHERE dealer_id = ?1",
            params![dealer_id.to_string()],
        )
        .await
        .map_err(query_err("load_business"))?;

    let Some(row) = rows.next().await.map_err(query_err("load_business"))? else {
        return Ok(None);
    };
    let id: String = row.get(0).map_err(query_err("load_business"))?;
    let mut business = Business {
        id: parse_uuid(&id)?,
        name: row.get(1).map_err(query_err("load_business"))?,
        phone_number: row.get::<String>(2).ok(),
        website: row.get::<String>(3).ok(),
        description: row.get::<String>(4).ok(),
        locations: Vec::new(),
        brands: Vec::new(),
        job_categories: Vec::new(),
    };
    drop(rows);

    business.brands = load_children(conn, business.id, ChildKind::Brand).await?;
    business.job_categories = load_children(conn, business.id, ChildKind::JobCategory).await?;

    let mut rows = conn
        .query(
            "SELECT id, name, line1, line2, city, state, zip_code FROM business_locations WHERE business_id = ?1 ORDER BY position",
            params![business.id.to_string()],
        )
        .await
        .map_err(query_err("load_locations"))?;
    let mut locations = Vec::new();
    while let Some(row) = rows.next().await.map_err(query_err("load_locations"))? {
        let id: String = row.get(0).map_err(query_err("load_locations"))?;
        locations.push(BusinessLocation {
            id: parse_uuid(&id)?,
            name: row.get::<String>(1).ok(),
            address: Address {
                line1: row.get(2).map_err(query_err("load_locations"))?,
                line2: row.get::<String>(3).ok(),
                city: row.get(4).map_err(query_err("load_locations"))?,
                state: row.get(5).map_err(query_err("load_locations"))?,
                zip_code: row.get(6).map_err(query_err("load_locations"))?,
            },
            serviceable_counties: Vec::new(),
        });
    }
    drop(rows);

    for location in &mut locations {
        location.serviceable_counties =
            load_children(conn, location.id, ChildKind::ServiceableCounty).await?;
    }
    business.locations = locations;
    Ok(Some(business))
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl ProfileStore for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Accounts ────────────────────────────────────────────────────

    async fn get_account(&self, id: Uuid) -> Result<Option<Account>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts a WHERE a.id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(query_err("get_account"))?;

        match rows.next().await.map_err(query_err("get_account"))? {
            Some(row) => Ok(Some(row_to_account(&row)?)),
            None => Ok(None),
        }
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts a WHERE a.email = ?1 COLLATE NOCASE"),
                params![email.trim()],
            )
            .await
            .map_err(query_err("find_account_by_email"))?;

        match rows.next().await.map_err(query_err("find_account_by_email"))? {
            Some(row) => Ok(Some(row_to_account(&row)?)),
            None => Ok(None),
        }
    }

    async fn create_actor(&self, actor: &NewActor) -> Result<(), DatabaseError> {
        let _guard = self.write_lock.lock().await;
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(query_err("create_actor begin"))?;

        insert_account(&tx, actor.account()).await?;

        match actor {
            NewActor::Customer(customer) => {
                tx.execute(
                    "INSERT INTO customers (id, account_id, last_completed_step, address, financial_account_id) VALUES (?1, ?2, ?3, NULL, NULL)",
                    params![
                        customer.id.to_string(),
                        customer.account.id.to_string(),
                        step_str(&customer.last_completed_step),
                    ],
                )
                .await
                .map_err(write_err("create_customer"))?;
            }
            NewActor::Dealer(dealer) => {
                tx.execute(
                    "INSERT INTO dealers (id, account_id, last_completed_step, financial_account_id) VALUES (?1, ?2, ?3, NULL)",
                    params![
                        dealer.id.to_string(),
                        dealer.account.id.to_string(),
                        step_str(&dealer.last_completed_step),
                    ],
                )
                .await
                .map_err(write_err("create_dealer"))?;
            }
            NewActor::Expert(expert) => {
                tx.execute(
                    "INSERT INTO experts (id, account_id, last_completed_step) VALUES (?1, ?2, ?3)",
                    params![
                        expert.id.to_string(),
                        expert.account.id.to_string(),
                        step_str(&expert.last_completed_step),
                    ],
                )
                .await
                .map_err(write_err("create_expert"))?;
            }
        }

        tx.commit().await.map_err(query_err("create_actor commit"))?;
        info!(
            account_id = %actor.account().id,
            actor_id = %actor.actor_id(),
            role = actor.account().role.as_str(),
            "Actor created"
        );
        Ok(())
    }

    async fn delete_actor(&self, account_id: Uuid) -> Result<bool, DatabaseError> {
        let _guard = self.write_lock.lock().await;
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(query_err("delete_actor begin"))?;

        for table in ["customers", "dealers", "experts"] {
            tx.execute(
                &format!("DELETE FROM {table} WHERE account_id = ?1"),
                params![account_id.to_string()],
            )
            .await
            .map_err(write_err("delete_actor"))?;
        }
        let deleted = tx
            .execute(
                "DELETE FROM accounts WHERE id = ?1",
                params![account_id.to_string()],
            )
            .await
            .map_err(write_err("delete_actor account"))?;

        tx.commit().await.map_err(query_err("delete_actor commit"))?;
        info!(%account_id, deleted, "Actor deleted");
        Ok(deleted > 0)
    }

    // ── Customers ───────────────────────────────────────────────────

    async fn get_customer_by_account(
        &self,
        account_id: Uuid,
    ) -> Result<Option<Customer>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {ACCOUNT_COLUMNS}, c.id, c.last_completed_step, c.address, c.financial_account_id
                     FROM customers c JOIN accounts a ON a.id = c.account_id WHERE c.account_id = ?1"
                ),
                params![account_id.to_string()],
            )
            .await
            .map_err(query_err("get_customer_by_account"))?;

        let Some(row) = rows.next().await.map_err(query_err("get_customer_by_account"))? else {
            return Ok(None);
        };
        let account = row_to_account(&row)?;
        let id: String = row.get(ACCOUNT_WIDTH).map_err(query_err("get_customer"))?;
        let step: String = row.get(ACCOUNT_WIDTH + 1).map_err(query_err("get_customer"))?;
        let mut customer = Customer {
            id: parse_uuid(&id)?,
            account,
            last_completed_step: parse_step(step)?,
            address: opt_address(row.get::<String>(ACCOUNT_WIDTH + 2).ok())?,
            languages: Vec::new(),
            financial_account_id: row.get::<String>(ACCOUNT_WIDTH + 3).ok(),
        };
        drop(rows);

        customer.languages = load_children(conn, customer.id, ChildKind::Language).await?;
        Ok(Some(customer))
    }

    async fn save_customer(&self, customer: &Customer) -> Result<(), DatabaseError> {
        let _guard = self.write_lock.lock().await;
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(query_err("save_customer begin"))?;

        update_account(&tx, &customer.account).await?;
        let address = customer.address.as_ref().map(to_json).transpose()?;
        tx.execute(
            "UPDATE customers SET last_completed_step = ?1, address = ?2, financial_account_id = ?3 WHERE id = ?4",
            params![
                step_str(&customer.last_completed_step),
                opt_text(address.as_deref()),
                opt_text(customer.financial_account_id.as_deref()),
                customer.id.to_string(),
            ],
        )
        .await
        .map_err(write_err("save_customer"))?;
        sync_children(&tx, customer.id, ChildKind::Language, &customer.languages).await?;

        tx.commit().await.map_err(query_err("save_customer commit"))?;
        debug!(customer_id = %customer.id, step = %customer.last_completed_step, "Customer saved");
        Ok(())
    }

    // ── Dealers ─────────────────────────────────────────────────────

    async fn get_dealer_by_account(
        &self,
        account_id: Uuid,
    ) -> Result<Option<Dealer>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {ACCOUNT_COLUMNS}, d.id, d.last_completed_step, d.financial_account_id
                     FROM dealers d JOIN accounts a ON a.id = d.account_id WHERE d.account_id = ?1"
                ),
                params![account_id.to_string()],
            )
            .await
            .map_err(query_err("get_dealer_by_account"))?;

        let Some(row) = rows.next().await.map_err(query_err("get_dealer_by_account"))? else {
            return Ok(None);
        };
        let account = row_to_account(&row)?;
        let id: String = row.get(ACCOUNT_WIDTH).map_err(query_err("get_dealer"))?;
        let step: String = row.get(ACCOUNT_WIDTH + 1).map_err(query_err("get_dealer"))?;
        let mut dealer = Dealer {
            id: parse_uuid(&id)?,
            account,
            last_completed_step: parse_step(step)?,
            business: None,
            financial_account_id: row.get::<String>(ACCOUNT_WIDTH + 2).ok(),
        };
        drop(rows);

        dealer.business = load_business(conn, dealer.id).await?;
        Ok(Some(dealer))
    }

    async fn save_dealer(&self, dealer: &Dealer) -> Result<(), DatabaseError> {
        let _guard = self.write_lock.lock().await;
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(query_err("save_dealer begin"))?;

        update_account(&tx, &dealer.account).await?;
        tx.execute(
            "UPDATE dealers SET last_completed_step = ?1, financial_account_id = ?2 WHERE id = ?3",
            params![
                step_str(&dealer.last_completed_step),
                opt_text(dealer.financial_account_id.as_deref()),
                dealer.id.to_string(),
            ],
        )
        .await
        .map_err(write_err("save_dealer"))?;
        if let Some(business) = &dealer.business {
            save_business(&tx, dealer.id, business).await?;
        }

        tx.commit().await.map_err(query_err("save_dealer commit"))?;
        debug!(dealer_id = %dealer.id, step = %dealer.last_completed_step, "Dealer saved");
        Ok(())
    }

    // ── Experts ─────────────────────────────────────────────────────

    async fn get_expert_by_account(
        &self,
        account_id: Uuid,
    ) -> Result<Option<Expert>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {ACCOUNT_COLUMNS}, e.id, e.last_completed_step, e.bio, e.years_of_experience, e.address, e.reminders_seeded
                     FROM experts e JOIN accounts a ON a.id = e.account_id WHERE e.account_id = ?1"
                ),
                params![account_id.to_string()],
            )
            .await
            .map_err(query_err("get_expert_by_account"))?;

        let Some(row) = rows.next().await.map_err(query_err("get_expert_by_account"))? else {
            return Ok(None);
        };
        let account = row_to_account(&row)?;
        let id: String = row.get(ACCOUNT_WIDTH).map_err(query_err("get_expert"))?;
        let step: String = row.get(ACCOUNT_WIDTH + 1).map_err(query_err("get_expert"))?;
        let mut expert = Expert {
            id: parse_uuid(&id)?,
            account,
            last_completed_step: parse_step(step)?,
            bio: row.get::<String>(ACCOUNT_WIDTH + 2).ok(),
            years_of_experience: row
                .get::<i64>(ACCOUNT_WIDTH + 3)
                .ok()
                .and_then(|n| u32::try_from(n).ok()),
            address: opt_address(row.get::<String>(ACCOUNT_WIDTH + 4).ok())?,
            skills: Vec::new(),
            languages: Vec::new(),
            reminders_seeded: row.get::<i64>(ACCOUNT_WIDTH + 5).unwrap_or(0) != 0,
        };
        drop(rows);

        expert.skills = load_children(conn, expert.id, ChildKind::Skill).await?;
        expert.languages = load_children(conn, expert.id, ChildKind::Language).await?;
        Ok(Some(expert))
    }

    async fn save_expert(&self, expert: &Expert) -> Result<(), DatabaseError> {
        let _guard = self.write_lock.lock().await;
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(query_err("save_expert begin"))?;

        update_account(&tx, &expert.account).await?;
        let address = expert.address.as_ref().map(to_json).transpose()?;
        tx.execute(
            "UPDATE experts SET last_completed_step = ?1, bio = ?2, years_of_experience = ?3, address = ?4, reminders_seeded = ?5 WHERE id = ?6",
            params![
                step_str(&expert.last_completed_step),
                opt_text(expert.bio.as_deref()),
                opt_int(expert.years_of_experience),
                opt_text(address.as_deref()),
                i64::from(expert.reminders_seeded),
                expert.id.to_string(),
            ],
        )
        .await
        .map_err(write_err("save_expert"))?;
        sync_children(&tx, expert.id, ChildKind::Skill, &expert.skills).await?;
        sync_children(&tx, expert.id, ChildKind::Language, &expert.languages).await?;

        tx.commit().await.map_err(query_err("save_expert commit"))?;
        debug!(expert_id = %expert.id, step = %expert.last_completed_step, "Expert saved");
        Ok(())
    }

    // ── Matching ────────────────────────────────────────────────────

    async fn locations_serving_county(&self, county: &str) -> Result<Vec<Uuid>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT k.owner_id FROM keyed_children k JOIN business_locations l ON l.id = k.owner_id
                 WHERE k.kind = ?1 AND k.code = ?2",
                params![ChildKind::ServiceableCounty.as_str(), county],
            )
            .await
            .map_err(query_err("locations_serving_county"))?;

        let mut ids = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err("locations_serving_county"))? {
            let id: String = row.get(0).map_err(query_err("locations_serving_county"))?;
            ids.push(parse_uuid(&id)?);
        }
        Ok(ids)
    }

    async fn dealers_for_locations(
        &self,
        location_ids: &[Uuid],
        only_complete: bool,
    ) -> Result<Vec<Dealer>, DatabaseError> {
        let mut seen = HashSet::new();
        let mut dealers = Vec::new();
        for location_id in location_ids {
            let Some(dealer) = self.dealer_by_location(*location_id).await? else {
                continue;
            };
            if only_complete && !dealer.account.onboarding_complete {
                continue;
            }
            if seen.insert(dealer.id) {
                dealers.push(dealer);
            }
        }
        Ok(dealers)
    }

    async fn dealer_by_location(
        &self,
        location_id: Uuid,
    ) -> Result<Option<Dealer>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT d.account_id FROM business_locations l
                 JOIN businesses b ON b.id = l.business_id
                 JOIN dealers d ON d.id = b.dealer_id
                 WHERE l.id = ?1",
                params![location_id.to_string()],
            )
            .await
            .map_err(query_err("dealer_by_location"))?;

        let account_id = match rows.next().await.map_err(query_err("dealer_by_location"))? {
            Some(row) => {
                let id: String = row.get(0).map_err(query_err("dealer_by_location"))?;
                parse_uuid(&id)?
            }
            None => return Ok(None),
        };
        drop(rows);
        self.get_dealer_by_account(account_id).await
    }

    // ── Favourites ──────────────────────────────────────────────────

    async fn get_favourite(
        &self,
        customer_id: Uuid,
    ) -> Result<Option<FavouriteDealer>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT business_location_id, updated_at FROM favourite_dealers WHERE customer_id = ?1",
                params![customer_id.to_string()],
            )
            .await
            .map_err(query_err("get_favourite"))?;

        match rows.next().await.map_err(query_err("get_favourite"))? {
            Some(row) => {
                let location: String = row.get(0).map_err(query_err("get_favourite"))?;
                let updated: String = row.get(1).map_err(query_err("get_favourite"))?;
                Ok(Some(FavouriteDealer {
                    customer_id,
                    business_location_id: parse_uuid(&location)?,
                    updated_at: parse_datetime(&updated),
                }))
            }
            None => Ok(None),
        }
    }

    async fn upsert_favourite(&self, favourite: &FavouriteDealer) -> Result<(), DatabaseError> {
        let _guard = self.write_lock.lock().await;
        self.conn()
            .execute(
                "INSERT INTO favourite_dealers (customer_id, business_location_id, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(customer_id) DO UPDATE SET business_location_id = excluded.business_location_id,
                     updated_at = excluded.updated_at",
                params![
                    favourite.customer_id.to_string(),
                    favourite.business_location_id.to_string(),
                    favourite.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(write_err("upsert_favourite"))?;
        debug!(
            customer_id = %favourite.customer_id,
            location_id = %favourite.business_location_id,
            "Favourite dealer set"
        );
        Ok(())
    }
}
