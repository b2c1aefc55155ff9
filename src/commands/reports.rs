//! Report, dashboard, and export commands.

use chrono::{Local, NaiveDate};
use serde_json::Value;

use crate::aggregate::{self, DateRange, PeriodSummary};
use crate::money::Money;
use crate::sales::{self, SaleRecord};
use crate::{auth, db, export, fields};

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    raw.trim()
        .parse::<NaiveDate>()
        .map_err(|_| format!("Invalid date: {raw}"))
}

/// Read an optional startDate/endDate pair. Either both bounds are given
/// or neither; the range itself rejects inverted bounds.
pub(super) fn parse_optional_range(payload: &Value) -> Result<Option<DateRange>, String> {
    let get = |camel: &str, snake: &str| {
        payload
            .get(camel)
            .or_else(|| payload.get(snake))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };
    match (get("startDate", "start_date"), get("endDate", "end_date")) {
        (Some(start), Some(end)) => {
            let range = DateRange::new(parse_date(start)?, parse_date(end)?)?;
            Ok(Some(range))
        }
        (None, None) => Ok(None),
        _ => Err("Selecione a data de início e a data de fim".into()),
    }
}

fn parse_required_range(arg0: &Option<Value>) -> Result<DateRange, String> {
    let payload = arg0.as_ref().unwrap_or(&Value::Null);
    parse_optional_range(payload)?.ok_or("Selecione o período do relatório".into())
}

fn fetch_range(
    conn: &rusqlite::Connection,
    range: DateRange,
) -> Result<(Vec<SaleRecord>, usize), String> {
    sales::fetch_between(conn, &range.lower_bound(), &range.upper_bound())
        .map_err(|e| e.to_string())
}

/// Share of each payment method in the payment subtotal.
fn payment_shares(summary: &PeriodSummary) -> Value {
    let denominator: Money = fields::payment_fields()
        .filter_map(|f| summary.by_field.get(f.key))
        .copied()
        .sum();
    let mut shares = serde_json::Map::new();
    for def in fields::payment_fields() {
        let part = summary
            .by_field
            .get(def.key)
            .copied()
            .unwrap_or(crate::money::ZERO);
        shares.insert(
            def.key.to_string(),
            serde_json::json!(aggregate::share_percent(part, denominator)),
        );
    }
    Value::Object(shares)
}

fn summary_json(summary: &PeriodSummary) -> Result<Value, String> {
    serde_json::to_value(summary).map_err(|e| e.to_string())
}

/// Period report: per-day rows plus the period totals and the payment
/// mix, the data behind the report table.
#[tauri::command]
pub async fn report_period(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    auth::current_session(&auth_state).ok_or("Sessão expirada, faça login novamente")?;
    let range = parse_required_range(&arg0)?;
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let (records, skipped) = fetch_range(&conn, range)?;

    let refs: Vec<&SaleRecord> = records.iter().collect();
    let summary = aggregate::aggregate(&refs);

    let mut days = Vec::new();
    for (day, day_summary) in aggregate::bucket_by_day(&records) {
        days.push(serde_json::json!({
            "date": day.format("%Y-%m-%d").to_string(),
            "weekday": export::weekday_name_pt(chrono::Datelike::weekday(&day)),
            "summary": summary_json(&day_summary)?,
        }));
    }

    Ok(serde_json::json!({
        "success": true,
        "summary": summary_json(&summary)?,
        "paymentShares": payment_shares(&summary),
        "days": days,
        "skipped": skipped,
    }))
}

/// The period report as CSV, ready for the frontend to save.
#[tauri::command]
pub async fn report_export_csv(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    auth::current_session(&auth_state).ok_or("Sessão expirada, faça login novamente")?;
    let range = parse_required_range(&arg0)?;
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let (records, _) = fetch_range(&conn, range)?;

    let csv = export::period_csv_from_records(&records);
    let filename = format!(
        "relatorio-vendas-{}-{}.csv",
        range.start().format("%Y-%m-%d"),
        range.end().format("%Y-%m-%d"),
    );
    Ok(serde_json::json!({ "success": true, "filename": filename, "csv": csv }))
}

/// One-row-per-sale export of the history screen.
#[tauri::command]
pub async fn report_history_csv(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    auth::current_session(&auth_state).ok_or("Sessão expirada, faça login novamente")?;
    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    let payload = arg0.unwrap_or(Value::Null);
    let (records, _) = match parse_optional_range(&payload)? {
        Some(range) => fetch_range(&conn, range)?,
        None => sales::fetch_all(&conn).map_err(|e| e.to_string())?,
    };

    Ok(serde_json::json!({
        "success": true,
        "filename": format!("historico-vendas-{}.csv", Local::now().format("%Y-%m-%d")),
        "csv": export::history_csv(&records),
    }))
}

/// Everything the dashboard shows in one call: the summary for the
/// selected quick period, the payment mix, the month projection, and the
/// latest sales.
#[tauri::command]
pub async fn dashboard_summary(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    auth_state: tauri::State<'_, auth::AuthState>,
) -> Result<Value, String> {
    auth::current_session(&auth_state).ok_or("Sessão expirada, faça login novamente")?;
    let now = Local::now();

    let period = arg0
        .as_ref()
        .and_then(|v| v.get("period").and_then(Value::as_str).or_else(|| v.as_str()))
        .unwrap_or("today");
    let range = match period {
        "today" => aggregate::today_range(now),
        "week" => aggregate::week_range(now),
        "month" => aggregate::month_range(now),
        other => return Err(format!("Período desconhecido: {other}")),
    };

    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let (records, skipped) = fetch_range(&conn, range)?;
    let refs: Vec<&SaleRecord> = records.iter().collect();
    let summary = aggregate::aggregate(&refs);

    let month_range = aggregate::month_range(now);
    let (month_records, _) = fetch_range(&conn, month_range)?;
    let estimate = aggregate::estimate_month(&month_records, now.date_naive());

    let recent = sales::fetch_recent(&conn, 5).map_err(|e| e.to_string())?;
    let recent_json: Vec<Value> = recent
        .iter()
        .map(|r| serde_json::to_value(r).map_err(|e| e.to_string()))
        .collect::<Result<_, _>>()?;

    Ok(serde_json::json!({
        "success": true,
        "period": period,
        "summary": summary_json(&summary)?,
        "paymentShares": payment_shares(&summary),
        "monthlyEstimate": serde_json::to_value(estimate).map_err(|e| e.to_string())?,
        "recentSales": recent_json,
        "skipped": skipped,
    }))
}

#[cfg(test)]
mod dto_tests {
    use super::*;

    #[test]
    fn parse_optional_range_requires_both_bounds() {
        assert!(parse_optional_range(&serde_json::json!({})).unwrap().is_none());

        let range = parse_optional_range(&serde_json::json!({
            "startDate": "2025-04-01",
            "endDate": "2025-04-30"
        }))
        .unwrap()
        .expect("range present");
        assert_eq!(range.start(), NaiveDate::from_ymd_opt(2025, 4, 1).unwrap());

        assert!(parse_optional_range(&serde_json::json!({ "startDate": "2025-04-01" })).is_err());
    }

    #[test]
    fn parse_optional_range_rejects_inverted_bounds() {
        let err = parse_optional_range(&serde_json::json!({
            "startDate": "2025-04-30",
            "endDate": "2025-04-01"
        }))
        .expect_err("inverted range");
        assert!(err.contains("2025-04-30"), "got: {err}");
    }

    #[test]
    fn parse_optional_range_accepts_snake_case_aliases() {
        let range = parse_optional_range(&serde_json::json!({
            "start_date": "2025-04-01",
            "end_date": "2025-04-02"
        }))
        .unwrap()
        .expect("range present");
        assert_eq!(range.end(), NaiveDate::from_ymd_opt(2025, 4, 2).unwrap());
    }

    #[test]
    fn payment_shares_ignore_informational_fields() {
        use crate::sales::AmountMap;
        let amounts: AmountMap = [
            ("dinheiro".to_string(), Money::from_cents(7500)),
            ("pixInter".to_string(), Money::from_cents(2500)),
            ("vendasMesas".to_string(), Money::from_cents(99_999)),
        ]
        .into_iter()
        .collect();
        let derived = crate::sales::recompute_derived(&amounts, true);
        let record = SaleRecord {
            id: "sale-test".into(),
            occurred_at: Local::now(),
            amounts,
            notes: None,
            derived,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        let summary = aggregate::aggregate(&[&record]);
        let shares = payment_shares(&summary);
        assert_eq!(shares["dinheiro"], serde_json::json!(75.0));
        assert_eq!(shares["pixInter"], serde_json::json!(25.0));
    }
}
