use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    /// Caller-assigned. Declared as `int` so SQLite does not treat it as a
    /// rowid alias and fill it in when omitted.
    #[sea_orm(primary_key, auto_increment = false, column_type = "custom(\"int\")")]
    pub code: i32,
    pub name: String,
    /// Decimal amount kept as text, e.g. `"12.50"`.
    pub price: String,
    pub brand: String,
    pub size: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
