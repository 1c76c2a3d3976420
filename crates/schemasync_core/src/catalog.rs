//! Declared application schema.
//!
//! # Responsibility
//! - List the application's entities in creation order.
//! - Declare the relationships between them as data.
//!
//! # Invariants
//! - Every referenced entity appears before the entities referencing it.
//! - Foreign-key columns are declared only through relationships, never as
//!   plain columns.

use crate::schema::{
    Column, ColumnType, EntityDescriptor, GraphError, Relationship, RelationshipGraph, TableSchema,
};

fn base(entity: &str, table: &str) -> TableSchema {
    TableSchema::new(entity, table).column(
        Column::new("status", ColumnType::Integer)
            .not_null()
            .default_value("1"),
    )
}

fn timestamps(table: TableSchema) -> TableSchema {
    table
        .column(
            Column::new("createdAt", ColumnType::Timestamp)
                .not_null()
                .default_value("CURRENT_TIMESTAMP"),
        )
        .column(
            Column::new("updatedAt", ColumnType::Timestamp)
                .not_null()
                .default_value("CURRENT_TIMESTAMP"),
        )
}

/// Entities in the order they must be materialized.
pub fn entities() -> Vec<Box<dyn EntityDescriptor>> {
    let category = base("Category", "categories")
        .column(Column::new("name", ColumnType::Text).not_null());

    let product = base("Product", "products")
        .column(Column::new("name", ColumnType::Text).not_null())
        .column(Column::new("barCode", ColumnType::Text))
        .column(Column::new("value", ColumnType::Real).not_null().default_value("0"))
        .column(Column::new("amount", ColumnType::Integer).not_null().default_value("0"));

    let log = TableSchema::new("Log", "logs")
        .column(Column::new("level", ColumnType::Text).not_null())
        .column(Column::new("component", ColumnType::Text).not_null())
        .column(Column::new("code", ColumnType::Integer))
        .column(Column::new("message", ColumnType::Text))
        .column(Column::new("cause", ColumnType::Text));

    let user = base("User", "users")
        .column(Column::new("name", ColumnType::Text).not_null())
        .column(Column::new("email", ColumnType::Text).not_null())
        .column(Column::new("password", ColumnType::Text).not_null())
        .column(Column::new("score", ColumnType::Integer).not_null().default_value("0"));

    let point = base("Point", "points")
        .column(Column::new("value", ColumnType::Integer).not_null().default_value("0"));

    let donation = base("Donation", "donations")
        .column(Column::new("description", ColumnType::Text))
        .column(Column::new("amount", ColumnType::Integer).not_null().default_value("0"));

    let rank = base("Rank", "ranks")
        .column(Column::new("name", ColumnType::Text).not_null())
        .column(Column::new("minimumScore", ColumnType::Integer).not_null().default_value("0"));

    let address = base("Address", "addresses")
        .column(Column::new("street", ColumnType::Text))
        .column(Column::new("number", ColumnType::Text))
        .column(Column::new("city", ColumnType::Text))
        .column(Column::new("state", ColumnType::Text))
        .column(Column::new("zipCode", ColumnType::Text));

    [category, product, log, user, point, donation, rank, address]
        .into_iter()
        .map(|table| Box::new(timestamps(table)) as Box<dyn EntityDescriptor>)
        .collect()
}

/// Relationship declarations between catalog entities.
pub fn relationships() -> Vec<Relationship> {
    vec![
        // 1:N
        Relationship::has_many("Category", "Product", "categoryId", "products"),
        Relationship::has_many("Category", "Donation", "categoryId", "donations"),
        Relationship::has_many("User", "Point", "userId", "points"),
        Relationship::has_many("User", "Donation", "userId", "donations"),
        // N:1
        Relationship::belongs_to("Product", "Category", "categoryId", "category"),
        Relationship::belongs_to("Point", "User", "userId", "user"),
        Relationship::belongs_to("Donation", "User", "userId", "user"),
        Relationship::belongs_to("Donation", "Category", "categoryId", "category"),
        Relationship::belongs_to("Address", "User", "userId", "user"),
        // 1:1
        Relationship::has_one("User", "Address", "userId", "address"),
    ]
}

/// Builds the registered relationship graph for the catalog.
pub fn relationship_graph() -> Result<RelationshipGraph, GraphError> {
    let mut graph = RelationshipGraph::new();
    graph.register_all(relationships())?;
    Ok(graph)
}
