//! Statement builders. Values only ever reach SQL as bound parameters.

use sea_orm::{
    Value,
    sea_query::{
        Alias, DeleteStatement, Expr, InsertStatement, Query, SelectStatement, SimpleExpr,
        UpdateStatement,
    },
};

use crate::{
    Record,
    error::{StoreError, StoreResult},
    resource::{Column, Resource},
    value,
};

fn key_matches(resource: &Resource, key: Value) -> SimpleExpr {
    Expr::col(Alias::new(resource.key.column.name)).eq(key)
}

fn bound(column: &Column, body: &Record) -> SimpleExpr {
    SimpleExpr::from(value::bind(column.kind, body.get(column.name)))
}

pub(crate) fn select_all(resource: &Resource) -> SelectStatement {
    Query::select()
        .columns(resource.columns().map(|column| Alias::new(column.name)))
        .from(Alias::new(resource.table))
        .to_owned()
}

pub(crate) fn select_by_key(resource: &Resource, key: Value) -> SelectStatement {
    select_all(resource)
        .and_where(key_matches(resource, key))
        .to_owned()
}

pub(crate) fn insert(resource: &Resource, body: &Record) -> StoreResult<InsertStatement> {
    let columns: Vec<&Column> = resource.insert_columns().collect();
    let mut statement = Query::insert();
    statement
        .into_table(Alias::new(resource.table))
        .columns(columns.iter().map(|column| Alias::new(column.name)))
        .values(columns.iter().map(|column| bound(column, body)))
        .map_err(|err| StoreError::Storage(err.to_string()))?;
    Ok(statement)
}

pub(crate) fn update(resource: &Resource, key: Value, body: &Record) -> UpdateStatement {
    Query::update()
        .table(Alias::new(resource.table))
        .values(
            resource
                .fields
                .iter()
                .map(|column| (Alias::new(column.name), bound(column, body))),
        )
        .and_where(key_matches(resource, key))
        .to_owned()
}

pub(crate) fn delete(resource: &Resource, key: Value) -> DeleteStatement {
    Query::delete()
        .from_table(Alias::new(resource.table))
        .and_where(key_matches(resource, key))
        .to_owned()
}
