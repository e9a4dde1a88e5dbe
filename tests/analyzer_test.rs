mod common;

use datask::analyzer::analyze_question;
use datask::mapping::{map_columns, Concept};
use datask::sql::{AggregateFunction, SortDirection};
use datask::{build_query, parse_components, Intent};

fn superstore_columns() -> Vec<String> {
    common::superstore().column_names()
}

#[test]
fn test_mapper_exact_and_absent() {
    let mapping = map_columns(&["Region", "Sales", "Profit"]);
    assert_eq!(mapping.get(Concept::Sales), Some("Sales"));
    assert_eq!(mapping.get(Concept::Customer), None);
}

#[test]
fn test_how_many_customers() {
    let columns = superstore_columns();
    let mapping = map_columns(&columns);
    for question in [
        "How many customers are there?",
        "how many customers bought furniture",
        "So... how many customers in 2016?",
    ] {
        let plan = analyze_question(question, &columns, &mapping);
        assert_eq!(plan.aggregate_function, AggregateFunction::Count, "{}", question);
        assert_eq!(plan.group_by.as_deref(), Some("CUSTOMER_NAME"), "{}", question);
    }
}

#[test]
fn test_top_regions_by_sales() {
    let columns = superstore_columns();
    let plan = analyze_question(
        "What are the top 3 regions by sales?",
        &columns,
        &map_columns(&columns),
    );
    assert_eq!(plan.intent, Intent::Ranking);
    assert_eq!(plan.group_by.as_deref(), Some("REGION"));
    assert_eq!(plan.aggregate_column.as_deref(), Some("SALES"));
    assert_eq!(plan.aggregate_function, AggregateFunction::Sum);
    assert_eq!(plan.order_direction, SortDirection::Desc);
    assert_eq!(plan.limit, 3);
}

#[test]
fn test_every_synthesized_query_parses() {
    let columns = superstore_columns();
    let mapping = map_columns(&columns);
    for question in [
        "how many orders in march 2016",
        "Which ship mode has the lowest average discount?",
        "profit by segment in the west",
        "compare sales versus category",
        "show me 5 best products",
        "total quantity",
        "",
        "'; DROP TABLE orders; --",
    ] {
        let plan = analyze_question(question, &columns, &mapping);
        let query = build_query(&plan, 10, "ORDERS", &mapping);
        assert!(parse_components(&query.sql).is_ok(), "{} -> {}", question, query.sql);
        assert_eq!(query.suggestions.len(), 2);
    }
}

#[test]
fn test_renamed_columns_still_resolve() {
    let columns = ["Order Date", "Customer Name", "Region", "Category", "Revenue"];
    let mapping = map_columns(&columns);
    let plan = analyze_question("top customers by sales in 2017", &columns, &mapping);
    assert_eq!(plan.group_by.as_deref(), Some("Customer Name"));
    assert_eq!(plan.aggregate_column.as_deref(), Some("Revenue"));
    assert_eq!(
        plan.where_clause.as_deref(),
        Some("EXTRACT(YEAR FROM \"Order Date\") = 2017")
    );
}
