//! Sale CRUD commands.
//!
//! The entry form sends its amounts flat ("dinheiro": "50.00", ...);
//! newer frontend code nests them under "amounts". Both shapes are
//! accepted here and normalized into a [`SaleDraft`].

use chrono::{DateTime, Local, NaiveDate, TimeZone};
use serde_json::Value;

use crate::money::Money;
use crate::sales::{self, AmountMap, SaleDraft};
use crate::{auth, db, fields};

fn parse_occurred_at(raw: Option<&str>) -> Result<DateTime<Local>, String> {
    let raw = match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(r) => r,
        None => return Ok(Local::now()),
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Local));
    }
    // Date-only input from the form's date picker.
    if let Ok(day) = raw.parse::<NaiveDate>() {
        if let Some(naive) = day.and_hms_opt(12, 0, 0) {
            if let chrono::LocalResult::Single(dt) | chrono::LocalResult::Ambiguous(dt, _) =
                Local.from_local_datetime(&naive)
            {
                return Ok(dt);
            }
        }
    }
    Err(format!("Invalid date: {raw}"))
}

fn parse_amount_value(key: &str, value: &Value) -> Result<Money, String> {
    serde_json::from_value::<Money>(value.clone())
        .map_err(|e| format!("Invalid amount for {key}: {e}"))
}

/// Normalize either payload shape into a draft.
fn parse_sale_payload(arg0: Option<Value>) -> Result<SaleDraft, String> {
    let payload = arg0.ok_or("Missing sale payload")?;
    let obj = payload
        .as_object()
        .ok_or("Invalid sale payload: expected an object")?;

    let occurred_at = parse_occurred_at(
        obj.get("occurredAt")
            .or_else(|| obj.get("dataVenda"))
            .and_then(Value::as_str),
    )?;

    let mut amounts = AmountMap::new();
    match obj.get("amounts") {
        Some(Value::Object(map)) => {
            for (key, value) in map {
                if fields::field_by_key(key).is_some() && !value.is_null() {
                    amounts.insert(key.clone(), parse_amount_value(key, value)?);
                }
            }
        }
        Some(other) if !other.is_null() => {
            return Err("Invalid sale payload: amounts must be an object".into());
        }
        _ => {
            // Flat shape: pick out the known field keys.
            for (key, value) in obj {
                if fields::field_by_key(key).is_some() && !value.is_null() {
                    amounts.insert(key.clone(), parse_amount_value(key, value)?);
                }
            }
        }
    }

    let notes = obj
        .get("notes")
        .or_else(|| obj.get("observacoes"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Ok(SaleDraft {
        occurred_at,
        amounts,
        notes,
    })
}

fn parse_sale_id_payload(arg0: &Option<Value>) -> Result<String, String> {
    match arg0 {
        Some(Value::String(id)) if !id.trim().is_empty() => Ok(id.trim().to_string()),
        Some(Value::Object(map)) => ["saleId", "sale_id", "id"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or("Missing saleId".into()),
        _ => Err("Missing saleId".into()),
    }
}

fn record_to_json(record: &sales::SaleRecord) -> Result<Value, String> {
    serde_json::to_value(record).map_err(|e| e.to_string())
}

fn records_to_json(records: &[sales::SaleRecord]) -> Result<Vec<Value>, String> {
    records.iter().map(record_to_json).collect()
}

fn require_session(auth_state: &auth::AuthState) -> Result<auth::Session, String> {
    auth::current_session(auth_state).ok_or("Sessão expirada, faça login novamente".into())
}

/// Case-insensitive match over the notes text and the formatted total,
/// the two haystacks the history search box looks at.
fn matches_search(record: &sales::SaleRecord, query: &str) -> bool {
    let query = query.to_lowercase();
    if record
        .derived
        .total
        .format_brl()
        .to_lowercase()
        .contains(&query)
    {
        return true;
    }
    record
        .notes
        .as_deref()
        .is_some_and(|notes| notes.to_lowercase().contains(&query))
}

/// Live preview for the entry form: every derived figure, including the
/// signed conference value, without persisting anything.
#[tauri::command]
pub async fn sales_preview(arg0: Option<Value>) -> Result<Value, String> {
    let draft = parse_sale_payload(arg0)?;
    let derived = sales::recompute_derived(&draft.amounts, true);
    let conference = sales::conference(&draft.amounts);
    Ok(serde_json::json!({
        "success": true,
        "subtotal": derived.subtotal,
        "total": derived.total,
        "totalSagres": derived.total_sagres,
        "cashDelta": sales::cash_delta(&draft.amounts),
        "conference": conference,
        "conferenceDisplay": conference.format_brl(),
        "isEmpty": derived.total.is_zero(),
    }))
}

#[tauri::command]
pub async fn sales_create(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    require_session(&auth_state)?;
    let draft = parse_sale_payload(arg0)?;
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let record = sales::insert_sale(&conn, &draft)?;
    Ok(serde_json::json!({ "success": true, "sale": record_to_json(&record)? }))
}

#[tauri::command]
pub async fn sales_update(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    require_session(&auth_state)?;
    let id = parse_sale_id_payload(&arg0)?;
    let draft = parse_sale_payload(arg0)?;
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let include_adjustments = sales::edit_recompute_includes_adjustments(&conn);
    let record = sales::update_sale(&conn, &id, &draft, include_adjustments)?;
    Ok(serde_json::json!({ "success": true, "sale": record_to_json(&record)? }))
}

#[tauri::command]
pub async fn sales_delete(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    auth::require_admin(&auth_state)?;
    let id = parse_sale_id_payload(&arg0)?;
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    sales::delete_sale(&conn, &id)?;
    Ok(serde_json::json!({ "success": true }))
}

#[tauri::command]
pub async fn sales_get(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    require_session(&auth_state)?;
    let id = parse_sale_id_payload(&arg0)?;
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    match sales::get_sale(&conn, &id)? {
        Some(record) => {
            Ok(serde_json::json!({ "success": true, "sale": record_to_json(&record)? }))
        }
        None => Err(format!("Venda não encontrada: {id}")),
    }
}

/// History listing with the filters the history screen offers: a date
/// range, a payment method (sales where that field is nonzero), and a
/// free-text search over notes and the formatted total.
#[tauri::command]
pub async fn sales_list(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    require_session(&auth_state)?;
    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    let filters = arg0.unwrap_or(Value::Null);
    let range = super::reports::parse_optional_range(&filters)?;
    let payment_method = filters
        .get("paymentMethod")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty() && fields::field_by_key(s).is_some())
        .map(str::to_string);
    let search = filters
        .get("search")
        .or_else(|| filters.get("searchTerm"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let (mut records, skipped) = match range {
        Some(range) => sales::fetch_between(&conn, &range.lower_bound(), &range.upper_bound())?,
        None => sales::fetch_all(&conn)?,
    };
    if let Some(ref key) = payment_method {
        records.retain(|r| !r.amount(key).is_zero());
    }
    if let Some(ref query) = search {
        records.retain(|r| matches_search(r, query));
    }

    Ok(serde_json::json!({
        "success": true,
        "sales": records_to_json(&records)?,
        "skipped": skipped,
    }))
}

/// The latest few sales for the dashboard panel.
#[tauri::command]
pub async fn sales_recent(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    require_session(&auth_state)?;
    let limit = arg0
        .as_ref()
        .and_then(|v| v.get("limit").or(Some(v)))
        .and_then(Value::as_i64)
        .unwrap_or(5);
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let records = sales::fetch_recent(&conn, limit)?;
    Ok(serde_json::json!({ "success": true, "sales": records_to_json(&records)? }))
}

#[cfg(test)]
mod dto_tests {
    use super::*;

    #[test]
    fn parse_sale_payload_accepts_flat_form_fields() {
        let draft = parse_sale_payload(Some(serde_json::json!({
            "occurredAt": "2025-04-06T19:30:00-03:00",
            "dinheiro": "50.00",
            "pixInter": "30.00",
            "encaixe": "10.00",
            "desencaixe": "5.00",
            "observacoes": "  caixa conferido  "
        })))
        .expect("valid payload");
        assert_eq!(draft.amounts["dinheiro"], Money::from_cents(5000));
        assert_eq!(draft.amounts.len(), 4);
        assert_eq!(draft.notes.as_deref(), Some("caixa conferido"));
    }

    #[test]
    fn parse_sale_payload_accepts_nested_amounts_and_numbers() {
        let draft = parse_sale_payload(Some(serde_json::json!({
            "amounts": { "dinheiro": 50, "pixStone": "30.50" }
        })))
        .expect("valid payload");
        assert_eq!(draft.amounts["dinheiro"], Money::from_cents(5000));
        assert_eq!(draft.amounts["pixStone"], Money::from_cents(3050));
    }

    #[test]
    fn parse_sale_payload_ignores_unknown_keys() {
        let draft = parse_sale_payload(Some(serde_json::json!({
            "dinheiro": "10.00",
            "userId": "user-1",
            "somethingElse": true
        })))
        .expect("valid payload");
        assert_eq!(draft.amounts.len(), 1);
    }

    #[test]
    fn parse_sale_payload_rejects_garbage_amounts() {
        let err = parse_sale_payload(Some(serde_json::json!({
            "dinheiro": "abc"
        })))
        .expect_err("bad amount");
        assert!(err.contains("dinheiro"), "got: {err}");
    }

    #[test]
    fn parse_sale_id_payload_supports_string_and_object() {
        assert_eq!(
            parse_sale_id_payload(&Some(serde_json::json!("sale-1"))).unwrap(),
            "sale-1"
        );
        assert_eq!(
            parse_sale_id_payload(&Some(serde_json::json!({ "saleId": "sale-2" }))).unwrap(),
            "sale-2"
        );
        assert!(parse_sale_id_payload(&None).is_err());
    }

    #[test]
    fn search_matches_notes_and_formatted_total() {
        let amounts: AmountMap = [("dinheiro".to_string(), Money::from_cents(123_456))]
            .into_iter()
            .collect();
        let derived = sales::recompute_derived(&amounts, true);
        let record = sales::SaleRecord {
            id: "sale-test".into(),
            occurred_at: Local::now(),
            amounts,
            notes: Some("Caixa conferido no fechamento".into()),
            derived,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };

        // Notes, case-insensitive.
        assert!(matches_search(&record, "FECHAMENTO"));
        // Formatted total: R$ 1.234,56.
        assert!(matches_search(&record, "1.234,56"));
        assert!(matches_search(&record, "r$ 1.234"));
        assert!(!matches_search(&record, "pix"));

        let no_notes = sales::SaleRecord {
            notes: None,
            ..record.clone()
        };
        assert!(!matches_search(&no_notes, "fechamento"));
    }

    #[test]
    fn parse_occurred_at_accepts_date_only() {
        let dt = parse_occurred_at(Some("2025-04-06")).expect("date-only input");
        assert_eq!(
            dt.date_naive(),
            NaiveDate::from_ymd_opt(2025, 4, 6).unwrap()
        );
        assert!(parse_occurred_at(Some("06/04/2025")).is_err());
        assert!(parse_occurred_at(None).is_ok());
    }
}
