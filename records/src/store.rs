use std::{future::Future, time::Duration};

use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, QueryResult};
use tracing::{debug, instrument};

use crate::{
    Record,
    error::{StoreError, StoreResult},
    resource::Resource,
    statement, value,
};

/// Outcome of a delete, reported without telling a missing key apart from
/// any other reason nothing was removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Deletion {
    Removed,
    NotRemoved,
}

/// Executes one statement per call against the configured database.
#[derive(Clone, Debug)]
pub struct RecordStore {
    db: DatabaseConnection,
    timeout: Option<Duration>,
}

impl RecordStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db, timeout: None }
    }

    /// Bound every round trip; an expired statement surfaces as a storage error.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    #[instrument(name = "records.list", skip_all, fields(resource = resource.name))]
    pub async fn list(&self, resource: &Resource) -> StoreResult<Vec<Record>> {
        let stmt = self.db.get_database_backend().build(&statement::select_all(resource));
        let rows = self.round_trip(self.db.query_all(stmt)).await?;
        debug!(rows = rows.len(), "listed records");
        rows.iter()
            .map(|row| to_record(resource, row).map_err(Into::into))
            .collect()
    }

    #[instrument(name = "records.get", skip_all, fields(resource = resource.name, key = key))]
    pub async fn get(&self, resource: &Resource, key: &str) -> StoreResult<Record> {
        let Some(key) = resource.parse_key(key) else {
            return Err(StoreError::NotFound);
        };
        let stmt = self
            .db
            .get_database_backend()
            .build(&statement::select_by_key(resource, key));
        let row = self
            .round_trip(self.db.query_one(stmt))
            .await?
            .ok_or(StoreError::NotFound)?;
        Ok(to_record(resource, &row)?)
    }

    #[instrument(name = "records.create", skip_all, fields(resource = resource.name))]
    pub async fn create(&self, resource: &Resource, body: &Record) -> StoreResult<()> {
        let stmt = self
            .db
            .get_database_backend()
            .build(&statement::insert(resource, body)?);
        self.round_trip(self.db.execute(stmt)).await?;
        Ok(())
    }

    /// Overwrites every mutable field of the row addressed by `key`. A key
    /// that matches nothing is not reported.
    #[instrument(name = "records.update", skip_all, fields(resource = resource.name, key = key))]
    pub async fn update(&self, resource: &Resource, key: &str, body: &Record) -> StoreResult<()> {
        let Some(key) = resource.parse_key(key) else {
            debug!("key cannot match any row");
            return Ok(());
        };
        let stmt = self
            .db
            .get_database_backend()
            .build(&statement::update(resource, key, body));
        let result = self.round_trip(self.db.execute(stmt)).await?;
        debug!(rows = result.rows_affected(), "updated records");
        Ok(())
    }

    #[instrument(name = "records.delete", skip_all, fields(resource = resource.name, key = key))]
    pub async fn delete(&self, resource: &Resource, key: &str) -> StoreResult<Deletion> {
        let Some(key) = resource.parse_key(key) else {
            return Ok(Deletion::NotRemoved);
        };
        let stmt = self
            .db
            .get_database_backend()
            .build(&statement::delete(resource, key));
        let result = self.round_trip(self.db.execute(stmt)).await?;
        Ok(if result.rows_affected() == 0 {
            Deletion::NotRemoved
        } else {
            Deletion::Removed
        })
    }

    async fn round_trip<T, F>(&self, fut: F) -> StoreResult<T>
    where
        F: Future<Output = Result<T, DbErr>>,
    {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| {
                    StoreError::Storage(format!(
                        "statement timed out after {} ms",
                        limit.as_millis()
                    ))
                })?
                .map_err(Into::into),
            None => fut.await.map_err(Into::into),
        }
    }
}

fn to_record(resource: &Resource, row: &QueryResult) -> Result<Record, DbErr> {
    resource
        .columns()
        .map(|column| Ok((column.name.to_string(), value::read(row, column)?)))
        .collect()
}
