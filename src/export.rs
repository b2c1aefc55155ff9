//! CSV export for the period report.
//!
//! Layout mirrors the on-screen report table: one row per day that had
//! sales, in ascending date order, then a final "TOTAL PERÍODO" row.
//! Every cell is double-quoted and numeric cells use plain 2-decimal
//! dot notation so spreadsheets in any locale read them the same way.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, Weekday};

use crate::aggregate::PeriodSummary;
use crate::fields;
use crate::sales::SaleRecord;

/// Portuguese weekday name, the form the report table shows.
pub fn weekday_name_pt(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Sun => "domingo",
        Weekday::Mon => "segunda-feira",
        Weekday::Tue => "terça-feira",
        Weekday::Wed => "quarta-feira",
        Weekday::Thu => "quinta-feira",
        Weekday::Fri => "sexta-feira",
        Weekday::Sat => "sábado",
    }
}

fn format_day(day: NaiveDate) -> String {
    format!("{:02}/{:02}/{:04}", day.day(), day.month(), day.year())
}

fn quote(cell: &str) -> String {
    format!("\"{}\"", cell.replace('"', "\"\""))
}

fn push_row(out: &mut String, cells: &[String]) {
    let quoted: Vec<String> = cells.iter().map(|c| quote(c)).collect();
    out.push_str(&quoted.join(","));
    out.push('\n');
}

fn summary_cells(first: String, second: String, summary: &PeriodSummary) -> Vec<String> {
    let mut cells = vec![
        first,
        second,
        summary.count.to_string(),
        summary.total.to_string(),
    ];
    for def in fields::SALE_FIELDS {
        cells.push(
            summary
                .by_field
                .get(def.key)
                .copied()
                .unwrap_or(crate::money::ZERO)
                .to_string(),
        );
    }
    cells
}

/// Build the period-report CSV from day buckets.
///
/// Header: Data, Dia da Semana, Qtd Vendas, Total, then every schema
/// field label in display order. The total row repeats the column shape
/// with an empty weekday cell.
pub fn period_csv(days: &BTreeMap<NaiveDate, PeriodSummary>) -> String {
    let mut out = String::new();

    let mut header = vec![
        "Data".to_string(),
        "Dia da Semana".to_string(),
        "Qtd Vendas".to_string(),
        "Total".to_string(),
    ];
    header.extend(fields::SALE_FIELDS.iter().map(|f| f.label.to_string()));
    push_row(&mut out, &header);

    let mut period = PeriodSummary::empty();
    for (day, summary) in days {
        push_row(
            &mut out,
            &summary_cells(
                format_day(*day),
                weekday_name_pt(day.weekday()).to_string(),
                summary,
            ),
        );
        period.count += summary.count;
        period.total += summary.total;
        for def in fields::SALE_FIELDS {
            if let (Some(sum), Some(part)) = (
                period.by_field.get_mut(def.key),
                summary.by_field.get(def.key),
            ) {
                *sum += *part;
            }
        }
    }

    push_row(
        &mut out,
        &summary_cells("TOTAL PERÍODO".to_string(), String::new(), &period),
    );

    out
}

/// One row per sale, newest first, for the history export. Same quoting
/// and number format as the period CSV.
pub fn history_csv(records: &[SaleRecord]) -> String {
    let mut out = String::new();

    let mut header = vec![
        "Data".to_string(),
        "Hora".to_string(),
        "Subtotal".to_string(),
        "Total".to_string(),
        "Total Sagres".to_string(),
    ];
    header.extend(fields::SALE_FIELDS.iter().map(|f| f.label.to_string()));
    header.push("Observações".to_string());
    push_row(&mut out, &header);

    for record in records {
        let mut cells = vec![
            format_day(record.occurred_at.date_naive()),
            record.occurred_at.format("%H:%M").to_string(),
            record.derived.subtotal.to_string(),
            record.derived.total.to_string(),
            record.derived.total_sagres.to_string(),
        ];
        for def in fields::SALE_FIELDS {
            cells.push(record.amount(def.key).to_string());
        }
        cells.push(record.notes.clone().unwrap_or_default());
        push_row(&mut out, &cells);
    }

    out
}

/// Convenience: bucket, then build the period CSV.
pub fn period_csv_from_records(records: &[SaleRecord]) -> String {
    period_csv(&crate::aggregate::bucket_by_day(records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use crate::sales::AmountMap;
    use chrono::{Local, TimeZone, Utc};

    fn record(day: u32, pairs: &[(&str, i64)], notes: Option<&str>) -> SaleRecord {
        let amounts: AmountMap = pairs
            .iter()
            .map(|(k, c)| (k.to_string(), Money::from_cents(*c)))
            .collect();
        let derived = crate::sales::recompute_derived(&amounts, true);
        SaleRecord {
            id: format!("sale-test-{day}"),
            occurred_at: Local.with_ymd_and_hms(2025, 4, day, 21, 15, 0).unwrap(),
            amounts,
            notes: notes.map(str::to_string),
            derived,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn parse_row(line: &str) -> Vec<String> {
        // Good enough for cells without embedded commas.
        line.split(',')
            .map(|c| c.trim_matches('"').to_string())
            .collect()
    }

    #[test]
    fn period_csv_has_fixed_columns_and_total_row() {
        let records = vec![
            record(6, &[("dinheiro", 5000)], None), // a Sunday
            record(7, &[("pixInter", 2500), ("encaixe", 500)], None),
        ];
        let csv = period_csv_from_records(&records);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 4); // header + 2 days + total

        let expected_cols = 4 + fields::SALE_FIELDS.len();
        for line in &lines {
            assert_eq!(parse_row(line).len(), expected_cols, "row: {line}");
        }

        let header = parse_row(lines[0]);
        assert_eq!(&header[..4], &["Data", "Dia da Semana", "Qtd Vendas", "Total"]);
        assert_eq!(header[4], "Dinheiro");

        let sunday = parse_row(lines[1]);
        assert_eq!(sunday[0], "06/04/2025");
        assert_eq!(sunday[1], "domingo");
        assert_eq!(sunday[2], "1");
        assert_eq!(sunday[3], "50.00");

        let total = parse_row(lines[3]);
        assert_eq!(total[0], "TOTAL PERÍODO");
        assert_eq!(total[1], "");
        assert_eq!(total[2], "2");
        assert_eq!(total[3], "80.00");
    }

    #[test]
    fn every_cell_is_quoted() {
        let records = vec![record(10, &[("dinheiro", 100)], None)];
        let csv = period_csv_from_records(&records);
        for line in csv.lines() {
            assert!(line.starts_with('"') && line.ends_with('"'));
            for cell in line.split(',') {
                assert!(cell.starts_with('"') && cell.ends_with('"'), "cell: {cell}");
            }
        }
    }

    #[test]
    fn history_csv_includes_notes_and_quotes_embedded_quotes() {
        let records = vec![record(12, &[("dinheiro", 100)], Some("caixa \"extra\""))];
        let csv = history_csv(&records);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("\"caixa \"\"extra\"\"\""));
        assert!(lines[1].contains("\"21:15\""));
    }
}
