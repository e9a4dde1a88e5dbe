//! Concept to column resolution.
//!
//! A concept ("customer", "sales", ...) is looked up in three passes: the
//! concept's default column name, then its known spelling variations (both
//! case-sensitive), then a case-insensitive substring scan for its patterns.
//! The first hit wins. Concepts with no hit are left out of the mapping.

use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Concept {
    Customer,
    Product,
    Category,
    Region,
    Sales,
    Profit,
    Discount,
    Quantity,
    Segment,
    Date,
    Order,
    ShipMode,
    City,
    State,
    Country,
}

struct ConceptRule {
    default_column: &'static str,
    variations: &'static [&'static str],
    patterns: &'static [&'static str],
}

const CUSTOMER: ConceptRule = ConceptRule {
    default_column: "CUSTOMER_NAME",
    variations: &["customer_name", "Customer Name", "Customer_Name", "Customer", "customer", "CLIENT_NAME"],
    patterns: &["customer", "client", "buyer"],
};
const PRODUCT: ConceptRule = ConceptRule {
    default_column: "PRODUCT_NAME",
    variations: &["product_name", "Product Name", "Product_Name", "Product", "product", "ITEM_NAME"],
    patterns: &["product", "item"],
};
const CATEGORY: ConceptRule = ConceptRule {
    default_column: "CATEGORY",
    variations: &["category", "Category", "PRODUCT_CATEGORY"],
    patterns: &["category"],
};
const REGION: ConceptRule = ConceptRule {
    default_column: "REGION",
    variations: &["region", "Region", "AREA"],
    patterns: &["region", "area", "territory"],
};
const SALES: ConceptRule = ConceptRule {
    default_column: "SALES",
    variations: &["sales", "Sales", "REVENUE", "Revenue", "revenue", "AMOUNT"],
    patterns: &["sales", "revenue", "amount"],
};
const PROFIT: ConceptRule = ConceptRule {
    default_column: "PROFIT",
    variations: &["profit", "Profit", "NET_PROFIT"],
    patterns: &["profit", "margin", "earning"],
};
const DISCOUNT: ConceptRule = ConceptRule {
    default_column: "DISCOUNT",
    variations: &["discount", "Discount"],
    patterns: &["discount", "rebate"],
};
const QUANTITY: ConceptRule = ConceptRule {
    default_column: "QUANTITY",
    variations: &["quantity", "Quantity", "QTY", "qty", "UNITS"],
    patterns: &["quantity", "qty", "units"],
};
const SEGMENT: ConceptRule = ConceptRule {
    default_column: "SEGMENT",
    variations: &["segment", "Segment", "CUSTOMER_SEGMENT"],
    patterns: &["segment"],
};
const DATE: ConceptRule = ConceptRule {
    default_column: "ORDER_DATE",
    variations: &["order_date", "Order Date", "Order_Date", "DATE", "Date", "date"],
    patterns: &["date", "time"],
};
const ORDER: ConceptRule = ConceptRule {
    default_column: "ORDER_ID",
    variations: &["order_id", "Order ID", "Order_ID", "ORDER_NUMBER"],
    patterns: &["order_id", "order id", "order_number", "order_no", "orderid"],
};
const SHIP_MODE: ConceptRule = ConceptRule {
    default_column: "SHIP_MODE",
    variations: &["ship_mode", "Ship Mode", "Ship_Mode", "SHIPPING_MODE", "DELIVERY_METHOD"],
    patterns: &["ship_mode", "ship mode", "shipping", "delivery"],
};
const CITY: ConceptRule = ConceptRule {
    default_column: "CITY",
    variations: &["city", "City", "TOWN"],
    patterns: &["city", "town"],
};
const STATE: ConceptRule = ConceptRule {
    default_column: "STATE",
    variations: &["state", "State", "PROVINCE"],
    patterns: &["state", "province"],
};
const COUNTRY: ConceptRule = ConceptRule {
    default_column: "COUNTRY",
    variations: &["country", "Country", "NATION"],
    patterns: &["country", "nation"],
};

impl Concept {
    pub const ALL: [Concept; 15] = [
        Concept::Customer,
        Concept::Product,
        Concept::Category,
        Concept::Region,
        Concept::Sales,
        Concept::Profit,
        Concept::Discount,
        Concept::Quantity,
        Concept::Segment,
        Concept::Date,
        Concept::Order,
        Concept::ShipMode,
        Concept::City,
        Concept::State,
        Concept::Country,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Concept::Customer => "customer",
            Concept::Product => "product",
            Concept::Category => "category",
            Concept::Region => "region",
            Concept::Sales => "sales",
            Concept::Profit => "profit",
            Concept::Discount => "discount",
            Concept::Quantity => "quantity",
            Concept::Segment => "segment",
            Concept::Date => "date",
            Concept::Order => "order",
            Concept::ShipMode => "ship_mode",
            Concept::City => "city",
            Concept::State => "state",
            Concept::Country => "country",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_lowercase().replace([' ', '-'], "_");
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }

    fn rule(&self) -> &'static ConceptRule {
        match self {
            Concept::Customer => &CUSTOMER,
            Concept::Product => &PRODUCT,
            Concept::Category => &CATEGORY,
            Concept::Region => &REGION,
            Concept::Sales => &SALES,
            Concept::Profit => &PROFIT,
            Concept::Discount => &DISCOUNT,
            Concept::Quantity => &QUANTITY,
            Concept::Segment => &SEGMENT,
            Concept::Date => &DATE,
            Concept::Order => &ORDER,
            Concept::ShipMode => &SHIP_MODE,
            Concept::City => &CITY,
            Concept::State => &STATE,
            Concept::Country => &COUNTRY,
        }
    }

    pub fn default_column(&self) -> &'static str {
        self.rule().default_column
    }

    pub fn variations(&self) -> &'static [&'static str] {
        self.rule().variations
    }

    pub fn patterns(&self) -> &'static [&'static str] {
        self.rule().patterns
    }

    /// Measures that can be summed or averaged.
    pub fn is_metric(&self) -> bool {
        matches!(
            self,
            Concept::Sales | Concept::Profit | Concept::Discount | Concept::Quantity
        )
    }
}

impl fmt::Display for Concept {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a concept was found in the column list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrength {
    /// The concept's default column name
    Exact,
    /// One of the known spelling variations
    Variation,
    /// A case-insensitive substring match
    Pattern,
}

impl MatchStrength {
    pub fn confidence(&self) -> f64 {
        match self {
            MatchStrength::Exact => 1.0,
            MatchStrength::Variation => 0.8,
            MatchStrength::Pattern => 0.6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConceptMatch {
    pub column: String,
    pub strength: MatchStrength,
}

/// Resolved concepts for one row set. Read-only once built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ColumnMapping {
    columns: BTreeMap<Concept, String>,
}

impl ColumnMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, concept: Concept) -> Option<&str> {
        self.columns.get(&concept).map(String::as_str)
    }

    pub fn contains(&self, concept: Concept) -> bool {
        self.columns.contains_key(&concept)
    }

    pub fn insert(&mut self, concept: Concept, column: impl Into<String>) {
        self.columns.insert(concept, column.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (Concept, &str)> {
        self.columns.iter().map(|(c, col)| (*c, col.as_str()))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Concepts from `required` that this mapping could not resolve.
    pub fn missing(&self, required: &[Concept]) -> Vec<Concept> {
        required
            .iter()
            .copied()
            .filter(|c| !self.contains(*c))
            .collect()
    }
}

pub fn resolve_concept<S: AsRef<str>>(concept: Concept, columns: &[S]) -> Option<ConceptMatch> {
    let has = |name: &str| columns.iter().any(|c| c.as_ref() == name);
    let rule = concept.rule();

    if has(rule.default_column) {
        return Some(ConceptMatch {
            column: rule.default_column.to_string(),
            strength: MatchStrength::Exact,
        });
    }
    if let Some(variation) = rule.variations.iter().find(|&&v| has(v)) {
        return Some(ConceptMatch {
            column: variation.to_string(),
            strength: MatchStrength::Variation,
        });
    }
    rule.patterns.iter().find_map(|pattern| {
        columns
            .iter()
            .map(AsRef::as_ref)
            .find(|c| c.to_lowercase().contains(*pattern))
            .map(|c| ConceptMatch {
                column: c.to_string(),
                strength: MatchStrength::Pattern,
            })
    })
}

/// Builds the mapping for every known concept from the actual column names.
pub fn map_columns<S: AsRef<str>>(columns: &[S]) -> ColumnMapping {
    let mut mapping = ColumnMapping::new();
    for concept in Concept::ALL {
        match resolve_concept(concept, columns) {
            Some(found) => {
                debug!(
                    "concept {} -> {} ({:?})",
                    concept, found.column, found.strength
                );
                mapping.insert(concept, found.column);
            }
            None => debug!("concept {} has no column", concept),
        }
    }
    mapping
}

/// Resolution report for one concept.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappingSuggestion {
    pub concept: Concept,
    pub column: Option<String>,
    pub confidence: f64,
    /// Other columns matching the concept's patterns
    pub alternatives: Vec<String>,
}

pub fn suggest_mappings<S: AsRef<str>>(columns: &[S]) -> Vec<MappingSuggestion> {
    Concept::ALL
        .into_iter()
        .map(|concept| {
            let found = resolve_concept(concept, columns);
            let rule = concept.rule();
            let mut alternatives: Vec<String> = Vec::new();
            for pattern in rule.patterns {
                for column in columns.iter().map(AsRef::as_ref) {
                    let known = column == rule.default_column || rule.variations.iter().any(|v| *v == column);
                    let chosen = found.as_ref().is_some_and(|f| f.column == column);
                    if !known
                        && !chosen
                        && column.to_lowercase().contains(*pattern)
                        && !alternatives.iter().any(|a| a == column)
                    {
                        alternatives.push(column.to_string());
                    }
                }
            }
            MappingSuggestion {
                concept,
                confidence: found.as_ref().map_or(0.0, |f| f.strength.confidence()),
                column: found.map(|f| f.column),
                alternatives,
            }
        })
        .collect()
}
