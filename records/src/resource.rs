//! Static descriptors for every table the API serves.

use sea_orm::Value;

use crate::value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Text,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
}

impl Column {
    pub const fn integer(name: &'static str) -> Self {
        Self {
            name,
            kind: ColumnKind::Integer,
        }
    }

    pub const fn text(name: &'static str) -> Self {
        Self {
            name,
            kind: ColumnKind::Text,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyColumn {
    pub column: Column,
    /// Assigned by the engine on insert; callers never supply it.
    pub generated: bool,
}

/// How a single record is addressed over HTTP.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lookup {
    /// `/{name}/{key}` serving get, update and delete. `single` returns the
    /// matching object itself instead of a one-element array.
    Path { single: bool },
    /// `/{name}?{param}=...` on the collection route. No update or delete.
    Query { param: &'static str },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Messages {
    pub not_found: &'static str,
    pub inserted: &'static str,
    pub updated: &'static str,
    pub removed: &'static str,
    pub not_removed: &'static str,
}

#[derive(Debug, PartialEq, Eq)]
pub struct Resource {
    /// Route segment and registry name.
    pub name: &'static str,
    pub table: &'static str,
    pub key: KeyColumn,
    /// Mutable columns, in statement order.
    pub fields: &'static [Column],
    pub lookup: Lookup,
    pub messages: Messages,
    /// Human readable label used in the API description.
    pub title: &'static str,
}

impl Resource {
    /// Key followed by the mutable fields.
    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        std::iter::once(&self.key.column).chain(self.fields.iter())
    }

    /// Columns a caller provides on create.
    pub fn insert_columns(&self) -> impl Iterator<Item = &Column> {
        let key = (!self.key.generated).then_some(&self.key.column);
        key.into_iter().chain(self.fields.iter())
    }

    /// `None` when the raw segment can never equal a stored key.
    pub fn parse_key(&self, raw: &str) -> Option<Value> {
        value::parse_key(self.key.column.kind, raw)
    }

    pub fn supports_mutation(&self) -> bool {
        matches!(self.lookup, Lookup::Path { .. })
    }
}

pub static EMPLOYEES: Resource = Resource {
    name: "employees",
    table: "employees",
    key: KeyColumn {
        column: Column::integer("id"),
        generated: true,
    },
    fields: &[
        Column::text("firstName"),
        Column::text("lastName"),
        Column::text("nationalId"),
    ],
    lookup: Lookup::Path { single: false },
    messages: Messages {
        not_found: "Empleado no existe",
        inserted: "Datos insertados correctamente",
        updated: "ACTUALIZADO",
        removed: "Registro Eliminado",
        not_removed: "Registro No Eliminado",
    },
    title: "Employees",
};

pub static PRODUCTS: Resource = Resource {
    name: "products",
    table: "products",
    key: KeyColumn {
        column: Column::integer("code"),
        generated: false,
    },
    fields: &[
        Column::text("name"),
        Column::text("price"),
        Column::text("brand"),
        Column::text("size"),
    ],
    lookup: Lookup::Path { single: true },
    messages: Messages {
        not_found: "Producto no existe",
        inserted: "Producto insertado correctamente",
        updated: "ACTUALIZADO",
        removed: "Producto Eliminado",
        not_removed: "Producto No Eliminado",
    },
    title: "Products",
};

pub static USERS: Resource = Resource {
    name: "users",
    table: "users",
    key: KeyColumn {
        column: Column::integer("id"),
        generated: true,
    },
    fields: &[Column::text("firstName"), Column::text("lastName")],
    lookup: Lookup::Query { param: "id" },
    messages: Messages {
        not_found: "Datos no encontrados",
        inserted: "Usuario insertado",
        updated: "ACTUALIZADO",
        removed: "Registro Eliminado",
        not_removed: "Registro No Eliminado",
    },
    title: "Users",
};

pub static RESOURCES: &[&Resource] = &[&EMPLOYEES, &PRODUCTS, &USERS];

pub fn find(name: &str) -> Option<&'static Resource> {
    RESOURCES.iter().copied().find(|resource| resource.name == name)
}
