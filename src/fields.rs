//! The shared sale-field schema.
//!
//! The original app re-declared the payment-method and informational field
//! lists in every screen, which is how the "which fields sum into the
//! total" rule ended up subtly different between views. Here the schema
//! lives in exactly one place: the engine, the report builders, and the
//! CSV exporter all iterate this table.

/// What a field contributes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldCategory {
    /// Tender actually received; sums into `subtotal`.
    Payment,
    /// Descriptive figure (channel sales, platform incentive/discount);
    /// tracked but excluded from the financial total.
    Informational,
    /// Manual till correction (encaixe / desencaixe).
    Adjustment,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    pub key: &'static str,
    pub label: &'static str,
    pub category: FieldCategory,
}

/// Every amount field a sale record carries, in display/export order.
#[rustfmt::skip]
pub const SALE_FIELDS: &[FieldDef] = &[
    FieldDef { key: "dinheiro",       label: "Dinheiro",        category: FieldCategory::Payment },
    FieldDef { key: "debitoInter",    label: "Débito Inter",    category: FieldCategory::Payment },
    FieldDef { key: "debitoStone",    label: "Débito Stone",    category: FieldCategory::Payment },
    FieldDef { key: "creditoInter",   label: "Crédito Inter",   category: FieldCategory::Payment },
    FieldDef { key: "creditoStone",   label: "Crédito Stone",   category: FieldCategory::Payment },
    FieldDef { key: "ifoodPG",        label: "iFood PG",        category: FieldCategory::Payment },
    FieldDef { key: "pixInter",       label: "PIX Inter",       category: FieldCategory::Payment },
    FieldDef { key: "pixStone",       label: "PIX Stone",       category: FieldCategory::Payment },
    FieldDef { key: "vendasMesas",    label: "Vendas Mesas",    category: FieldCategory::Informational },
    FieldDef { key: "vendasEntregas", label: "Vendas Entregas", category: FieldCategory::Informational },
    FieldDef { key: "incentivoIfood", label: "Incentivo iFood", category: FieldCategory::Informational },
    FieldDef { key: "ifoodDesconto",  label: "iFood Desconto",  category: FieldCategory::Informational },
    FieldDef { key: "encaixe",        label: "Encaixe",         category: FieldCategory::Adjustment },
    FieldDef { key: "desencaixe",     label: "Desencaixe",      category: FieldCategory::Adjustment },
];

/// The two channel-sales fields whose sum is the "Total Sagres" figure.
/// Incentivo/desconto iFood sit in the informational category too but are
/// never part of channel sales.
pub const CHANNEL_SALES_KEYS: &[&str] = &["vendasMesas", "vendasEntregas"];

pub const ENCAIXE: &str = "encaixe";
pub const DESENCAIXE: &str = "desencaixe";
pub const INCENTIVO_IFOOD: &str = "incentivoIfood";

pub fn payment_fields() -> impl Iterator<Item = &'static FieldDef> {
    SALE_FIELDS
        .iter()
        .filter(|f| f.category == FieldCategory::Payment)
}

pub fn informational_fields() -> impl Iterator<Item = &'static FieldDef> {
    SALE_FIELDS
        .iter()
        .filter(|f| f.category == FieldCategory::Informational)
}

pub fn adjustment_fields() -> impl Iterator<Item = &'static FieldDef> {
    SALE_FIELDS
        .iter()
        .filter(|f| f.category == FieldCategory::Adjustment)
}

/// Look up a field definition by key.
pub fn field_by_key(key: &str) -> Option<&'static FieldDef> {
    SALE_FIELDS.iter().find(|f| f.key == key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_has_no_duplicate_keys() {
        for (i, a) in SALE_FIELDS.iter().enumerate() {
            for b in &SALE_FIELDS[i + 1..] {
                assert_ne!(a.key, b.key);
            }
        }
    }

    #[test]
    fn ifood_incentive_and_discount_are_not_payment_fields() {
        for key in ["incentivoIfood", "ifoodDesconto"] {
            let def = field_by_key(key).expect("field exists");
            assert_eq!(def.category, FieldCategory::Informational);
        }
        assert_eq!(payment_fields().count(), 8);
    }

    #[test]
    fn channel_sales_are_exactly_mesas_and_entregas() {
        assert_eq!(CHANNEL_SALES_KEYS, &["vendasMesas", "vendasEntregas"]);
        for key in CHANNEL_SALES_KEYS {
            assert_eq!(
                field_by_key(key).unwrap().category,
                FieldCategory::Informational
            );
        }
    }
}
