//! Sale records and the reconciliation engine.
//!
//! A sale record is one till-reconciliation entry: the amounts received
//! per payment method, the informational channel figures, the manual cash
//! adjustments, and the derived totals computed from them. The derived
//! figures are computed at write time and persisted with the record; they
//! are only ever recomputed through an explicit edit.
//!
//! All engine functions here are pure and cheap; the form calls them on
//! every keystroke for the live preview.

use std::collections::BTreeMap;

use chrono::{DateTime, Local, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::SalesError;
use crate::fields;
use crate::money::{self, Money};

/// Raw per-field amounts, keyed by schema field key. Absent keys and zero
/// values mean the same thing: that field was not used.
pub type AmountMap = BTreeMap<String, Money>;

/// Amount for a field, treating absent as zero.
pub fn amount(amounts: &AmountMap, key: &str) -> Money {
    amounts.get(key).copied().unwrap_or(money::ZERO)
}

// ---------------------------------------------------------------------------
// Reconciliation engine
// ---------------------------------------------------------------------------

/// Sum of the payment-method fields only. The informational iFood
/// incentive/discount fields sit next to the payment inputs in the form
/// but never sum in here.
pub fn subtotal(amounts: &AmountMap) -> Money {
    fields::payment_fields().map(|f| amount(amounts, f.key)).sum()
}

/// "Total Sagres": table sales + delivery sales, the two descriptive
/// channel figures. Informational only, never part of the financial total.
pub fn channel_total(amounts: &AmountMap) -> Money {
    fields::CHANNEL_SALES_KEYS
        .iter()
        .map(|k| amount(amounts, k))
        .sum()
}

/// Encaixe minus desencaixe. Signed; negative when more was taken out of
/// the till than put in.
pub fn cash_delta(amounts: &AmountMap) -> Money {
    amount(amounts, fields::ENCAIXE) - amount(amounts, fields::DESENCAIXE)
}

/// The financially authoritative total: payment subtotal plus the cash
/// delta. Period sums report this figure.
pub fn total(amounts: &AmountMap) -> Money {
    subtotal(amounts) + cash_delta(amounts)
}

/// Diagnostic cross-check: channel sales minus recorded payments, plus
/// the cash delta and the iFood incentive. Displayed signed for human
/// judgment; never persisted into `total` and has no pass/fail threshold.
pub fn conference(amounts: &AmountMap) -> Money {
    channel_total(amounts) - subtotal(amounts)
        + cash_delta(amounts)
        + amount(amounts, fields::INCENTIVO_IFOOD)
}

/// Derived figures persisted alongside the raw amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Derived {
    pub subtotal: Money,
    pub total: Money,
    pub total_sagres: Money,
}

/// Recompute the derived fields from raw amounts.
///
/// The create flow passes `include_adjustments = true`, matching the
/// entry form (total = subtotal + encaixe - desencaixe). The original
/// edit flow recomputed total as the bare payment subtotal, dropping the
/// adjustments; that looks like a latent inconsistency rather than
/// intent, so it is kept behind this explicit flag instead of being
/// silently fixed (see DESIGN.md).
pub fn recompute_derived(amounts: &AmountMap, include_adjustments: bool) -> Derived {
    let sub = subtotal(amounts);
    Derived {
        subtotal: sub,
        total: if include_adjustments {
            sub + cash_delta(amounts)
        } else {
            sub
        },
        total_sagres: channel_total(amounts),
    }
}

/// Reject a sale whose total would be zero, before anything is written.
pub fn validate_nonempty(derived: &Derived) -> Result<(), SalesError> {
    if derived.total.is_zero() {
        return Err(SalesError::EmptySale);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Record model
// ---------------------------------------------------------------------------

/// Incoming form data for a create or edit.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleDraft {
    /// The authoritative time axis for every period query. User-editable;
    /// the form defaults it to "now".
    pub occurred_at: DateTime<Local>,
    #[serde(default)]
    pub amounts: AmountMap,
    #[serde(default)]
    pub notes: Option<String>,
}

/// One persisted reconciliation entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleRecord {
    pub id: String,
    pub occurred_at: DateTime<Local>,
    pub amounts: AmountMap,
    pub notes: Option<String>,
    #[serde(flatten)]
    pub derived: Derived,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SaleRecord {
    pub fn amount(&self, key: &str) -> Money {
        amount(&self.amounts, key)
    }
}

/// Strip zero entries and unknown keys before persisting, so documents
/// stay in the shape the schema defines.
fn normalize_amounts(amounts: &AmountMap) -> AmountMap {
    amounts
        .iter()
        .filter(|(k, v)| !v.is_zero() && fields::field_by_key(k).is_some())
        .map(|(k, v)| (k.clone(), *v))
        .collect()
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Create a sale. Validates `EmptySale` before any write; derived fields
/// use the create-flow rule (adjustments included).
pub fn insert_sale(conn: &Connection, draft: &SaleDraft) -> Result<SaleRecord, SalesError> {
    let amounts = normalize_amounts(&draft.amounts);
    let derived = recompute_derived(&amounts, true);
    validate_nonempty(&derived)?;

    let id = format!("sale-{}", Uuid::new_v4());
    let now = Utc::now();
    let amounts_json = serde_json::to_string(&amounts)
        .map_err(|e| SalesError::Persistence(format!("encode amounts: {e}")))?;

    conn.execute(
        "INSERT INTO sales (
            id, occurred_at, amounts_json, notes,
            subtotal_cents, total_cents, total_sagres_cents,
            created_at, updated_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
        params![
            id,
            draft.occurred_at.to_rfc3339(),
            amounts_json,
            draft.notes,
            derived.subtotal.cents(),
            derived.total.cents(),
            derived.total_sagres.cents(),
            now.to_rfc3339(),
        ],
    )?;

    info!(sale_id = %id, total = %derived.total, "sale recorded");

    Ok(SaleRecord {
        id,
        occurred_at: draft.occurred_at,
        amounts,
        notes: draft.notes.clone(),
        derived,
        created_at: now,
        updated_at: now,
    })
}

/// Edit a sale: full replacement of raw amounts and derived fields, no
/// partial patches. `include_adjustments` selects the recompute rule
/// (see [`recompute_derived`]).
pub fn update_sale(
    conn: &Connection,
    id: &str,
    draft: &SaleDraft,
    include_adjustments: bool,
) -> Result<SaleRecord, SalesError> {
    let amounts = normalize_amounts(&draft.amounts);
    let derived = recompute_derived(&amounts, include_adjustments);
    validate_nonempty(&derived)?;

    let now = Utc::now();
    let amounts_json = serde_json::to_string(&amounts)
        .map_err(|e| SalesError::Persistence(format!("encode amounts: {e}")))?;

    let changed = conn.execute(
        "UPDATE sales SET
            occurred_at = ?2, amounts_json = ?3, notes = ?4,
            subtotal_cents = ?5, total_cents = ?6, total_sagres_cents = ?7,
            updated_at = ?8
         WHERE id = ?1",
        params![
            id,
            draft.occurred_at.to_rfc3339(),
            amounts_json,
            draft.notes,
            derived.subtotal.cents(),
            derived.total.cents(),
            derived.total_sagres.cents(),
            now.to_rfc3339(),
        ],
    )?;

    if changed == 0 {
        return Err(SalesError::Persistence(format!("sale not found: {id}")));
    }

    info!(sale_id = %id, total = %derived.total, "sale updated");

    get_sale(conn, id)?.ok_or_else(|| SalesError::Persistence(format!("sale not found: {id}")))
}

/// Hard delete. No tombstones.
pub fn delete_sale(conn: &Connection, id: &str) -> Result<(), SalesError> {
    let changed = conn.execute("DELETE FROM sales WHERE id = ?1", params![id])?;
    if changed == 0 {
        return Err(SalesError::Persistence(format!("sale not found: {id}")));
    }
    info!(sale_id = %id, "sale deleted");
    Ok(())
}

/// Fetch one sale by id.
pub fn get_sale(conn: &Connection, id: &str) -> Result<Option<SaleRecord>, SalesError> {
    let mut stmt = conn.prepare(
        "SELECT id, occurred_at, amounts_json, notes,
                subtotal_cents, total_cents, total_sagres_cents,
                created_at, updated_at
         FROM sales WHERE id = ?1",
    )?;
    let mut rows = stmt.query(params![id])?;
    match rows.next()? {
        // Unlike batch fetches, a broken row here is an error the caller
        // should see, not a silent "not found".
        Some(row) => Ok(Some(decode_row(row)?)),
        None => Ok(None),
    }
}

/// All sales, newest first. Malformed rows are skipped and counted, never
/// fatal for the batch.
pub fn fetch_all(conn: &Connection) -> Result<(Vec<SaleRecord>, usize), SalesError> {
    fetch_where(conn, "1=1", &[])
}

/// Sales with `occurred_at` inside `[lower, upper]`, newest first.
///
/// Stored timestamps carry whatever UTC offset the machine had at write
/// time, so comparison goes through SQLite's `datetime()`, which
/// normalizes to UTC. Plain string comparison would misorder rows after
/// a timezone change.
pub fn fetch_between(
    conn: &Connection,
    lower: &DateTime<Local>,
    upper: &DateTime<Local>,
) -> Result<(Vec<SaleRecord>, usize), SalesError> {
    fetch_where(
        conn,
        "datetime(occurred_at) >= datetime(?1) AND datetime(occurred_at) <= datetime(?2)",
        &[&lower.to_rfc3339(), &upper.to_rfc3339()],
    )
}

/// The `limit` newest sales.
pub fn fetch_recent(conn: &Connection, limit: i64) -> Result<Vec<SaleRecord>, SalesError> {
    let (mut records, _) = fetch_all(conn)?;
    records.truncate(limit.max(0) as usize);
    Ok(records)
}

fn fetch_where(
    conn: &Connection,
    predicate: &str,
    bind: &[&dyn rusqlite::ToSql],
) -> Result<(Vec<SaleRecord>, usize), SalesError> {
    let sql = format!(
        "SELECT id, occurred_at, amounts_json, notes,
                subtotal_cents, total_cents, total_sagres_cents,
                created_at, updated_at
         FROM sales WHERE {predicate}
         ORDER BY datetime(occurred_at) DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(bind)?;

    let mut records = Vec::new();
    let mut skipped = 0usize;
    while let Some(row) = rows.next()? {
        match decode_row(row) {
            Ok(record) => records.push(record),
            Err(e) => {
                skipped += 1;
                warn!("skipping malformed sale row: {e}");
            }
        }
    }
    Ok((records, skipped))
}

fn decode_row(row: &rusqlite::Row<'_>) -> Result<SaleRecord, SalesError> {
    let id: String = row.get(0)?;
    let occurred_at_raw: Option<String> = row.get(1)?;
    let amounts_json: String = row.get(2)?;
    let notes: Option<String> = row.get(3)?;
    let subtotal_cents: i64 = row.get(4)?;
    let total_cents: i64 = row.get(5)?;
    let total_sagres_cents: i64 = row.get(6)?;
    let created_at_raw: String = row.get(7)?;
    let updated_at_raw: String = row.get(8)?;

    let occurred_at_raw = occurred_at_raw
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SalesError::MalformedRecord(format!("sale {id}: missing occurred_at")))?;
    let occurred_at = DateTime::parse_from_rfc3339(&occurred_at_raw)
        .map_err(|e| SalesError::MalformedRecord(format!("sale {id}: bad occurred_at: {e}")))?
        .with_timezone(&Local);

    let amounts: AmountMap = serde_json::from_str(&amounts_json)
        .map_err(|e| SalesError::MalformedRecord(format!("sale {id}: bad amounts: {e}")))?;

    let parse_utc = |raw: &str| {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    };

    Ok(SaleRecord {
        id,
        occurred_at,
        amounts,
        notes,
        derived: Derived {
            subtotal: Money::from_cents(subtotal_cents),
            total: Money::from_cents(total_cents),
            total_sagres: Money::from_cents(total_sagres_cents),
        },
        created_at: parse_utc(&created_at_raw),
        updated_at: parse_utc(&updated_at_raw),
    })
}

// ---------------------------------------------------------------------------
// Settings-backed edit behavior
// ---------------------------------------------------------------------------

pub const EDIT_RECOMPUTE_SETTING: &str = "edit_recompute_includes_adjustments";

/// Whether the edit flow includes cash adjustments when recomputing the
/// total. Defaults to false, which is the original's observed behavior.
pub fn edit_recompute_includes_adjustments(conn: &Connection) -> bool {
    crate::db::get_setting(conn, "sales", EDIT_RECOMPUTE_SETTING)
        .map(|v| v == "true")
        .unwrap_or(false)
}
