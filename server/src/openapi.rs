//! OpenAPI description generated from the same resource registry the router
//! is built from.

use records::{ColumnKind, Lookup, RESOURCES, Resource};
use serde_json::json;
use utoipa::openapi::{
    ArrayBuilder, ComponentsBuilder, ContentBuilder, InfoBuilder, ObjectBuilder, OpenApi,
    OpenApiBuilder, PathItem, PathItemType, PathsBuilder, Ref, RefOr, Required, Response,
    ResponseBuilder, Schema, SchemaType,
    path::{Operation, OperationBuilder, Parameter, ParameterBuilder, ParameterIn, PathItemBuilder},
    request_body::{RequestBody, RequestBodyBuilder},
    tag::TagBuilder,
};

pub const OPENAPI_PATH: &str = "/api-docs-json";

const JSON: &str = "application/json";

pub fn collection_path(resource: &Resource) -> String {
    format!("/{}", resource.name)
}

/// Item route, with the key column as the path parameter name.
pub fn item_path(resource: &Resource) -> Option<String> {
    match resource.lookup {
        Lookup::Path { .. } => Some(format!(
            "/{}/{{{}}}",
            resource.name, resource.key.column.name
        )),
        Lookup::Query { .. } => None,
    }
}

pub fn document() -> OpenApi {
    let mut paths = PathsBuilder::new();
    let message_schema = ObjectBuilder::new()
        .schema_type(SchemaType::Object)
        .property("message", scalar(SchemaType::String))
        .build();
    let mut components =
        ComponentsBuilder::new().schema("Message", RefOr::T(Schema::Object(message_schema)));
    for resource in RESOURCES {
        paths = paths.path(collection_path(resource), collection_item(resource));
        if let Some(path) = item_path(resource) {
            paths = paths.path(path, keyed_item(resource));
        }
        components = components.schema(schema_name(resource), record_schema(resource));
    }

    OpenApiBuilder::new()
        .info(
            InfoBuilder::new()
                .title("Records API")
                .version(env!("CARGO_PKG_VERSION"))
                .description(Some("CRUD access to employee, product and user records."))
                .build(),
        )
        .tags(Some(
            RESOURCES
                .iter()
                .map(|resource| TagBuilder::new().name(resource.title).build()),
        ))
        .paths(paths.build())
        .components(Some(components.build()))
        .build()
}

fn schema_name(resource: &Resource) -> String {
    resource.title.trim_end_matches('s').to_string()
}

fn schema_ref(resource: &Resource) -> RefOr<Schema> {
    RefOr::Ref(Ref::from_schema_name(schema_name(resource)))
}

fn schema_type(kind: ColumnKind) -> SchemaType {
    match kind {
        ColumnKind::Integer => SchemaType::Integer,
        ColumnKind::Text => SchemaType::String,
    }
}

fn scalar(kind: SchemaType) -> RefOr<Schema> {
    RefOr::T(Schema::Object(ObjectBuilder::new().schema_type(kind).build()))
}

fn record_schema(resource: &Resource) -> RefOr<Schema> {
    let mut object = ObjectBuilder::new().schema_type(SchemaType::Object);
    for column in resource.columns() {
        object = object.property(column.name, scalar(schema_type(column.kind)));
    }
    for column in resource.insert_columns() {
        object = object.required(column.name);
    }
    RefOr::T(Schema::Object(object.build()))
}

fn message(description: &str, example: &str) -> RefOr<Response> {
    let response = ResponseBuilder::new()
        .description(description)
        .content(
            JSON,
            ContentBuilder::new()
                .schema(RefOr::Ref(Ref::from_schema_name("Message")))
                .example(Some(json!({ "message": example })))
                .build(),
        )
        .build();
    RefOr::T(response)
}

fn storage_error() -> RefOr<Response> {
    message("Storage engine error, echoed verbatim.", "connection refused")
}

fn records_array(resource: &Resource, description: &str) -> RefOr<Response> {
    let array = ArrayBuilder::new().items(schema_ref(resource)).build();
    let response = ResponseBuilder::new()
        .description(description)
        .content(
            JSON,
            ContentBuilder::new()
                .schema(RefOr::T(Schema::Array(array)))
                .build(),
        )
        .build();
    RefOr::T(response)
}

fn body(resource: &Resource) -> RequestBody {
    RequestBodyBuilder::new()
        .content(JSON, ContentBuilder::new().schema(schema_ref(resource)).build())
        .required(Some(Required::True))
        .build()
}

fn key_parameter(resource: &Resource, name: &str, location: ParameterIn) -> Parameter {
    let required = match location {
        ParameterIn::Path => Required::True,
        _ => Required::False,
    };
    ParameterBuilder::new()
        .name(name)
        .parameter_in(location)
        .required(required)
        .schema(Some(scalar(schema_type(resource.key.column.kind))))
        .build()
}

fn collection_item(resource: &Resource) -> PathItem {
    let list = match resource.lookup {
        Lookup::Query { param } => OperationBuilder::new()
            .summary(Some(format!(
                "List {} or look one up by {param}",
                resource.name
            )))
            .parameters(Some([key_parameter(resource, param, ParameterIn::Query)]))
            .response("404", message("No record has that key.", resource.messages.not_found)),
        Lookup::Path { .. } => {
            OperationBuilder::new().summary(Some(format!("List {}", resource.name)))
        }
    }
    .tags(Some([resource.title.to_string()]))
    .response("200", records_array(resource, "All stored records."))
    .response("500", storage_error())
    .build();

    let create = OperationBuilder::new()
        .summary(Some(format!("Create a record in {}", resource.name)))
        .tags(Some([resource.title.to_string()]))
        .request_body(Some(body(resource)))
        .response("200", message("Inserted.", resource.messages.inserted))
        .response("500", storage_error())
        .build();

    PathItemBuilder::new()
        .operation(PathItemType::Get, list)
        .operation(PathItemType::Post, create)
        .build()
}

fn keyed_item(resource: &Resource) -> PathItem {
    let key = resource.key.column.name;
    let found = match resource.lookup {
        Lookup::Path { single: true } => RefOr::T(
            ResponseBuilder::new()
                .description("The matching record.")
                .content(JSON, ContentBuilder::new().schema(schema_ref(resource)).build())
                .build(),
        ),
        _ => records_array(resource, "The matching record, as a one-element array."),
    };
    let keyed = |summary: String| -> OperationBuilder {
        OperationBuilder::new()
            .summary(Some(summary))
            .tags(Some([resource.title.to_string()]))
            .parameters(Some([key_parameter(resource, key, ParameterIn::Path)]))
    };

    let fetch: Operation = keyed(format!("Fetch one record from {} by {key}", resource.name))
        .response("200", found)
        .response("404", message("No record has that key.", resource.messages.not_found))
        .response("500", storage_error())
        .build();
    let overwrite = keyed(format!("Overwrite a record in {}", resource.name))
        .request_body(Some(body(resource)))
        .response(
            "200",
            message("Confirmed, whether or not a row matched.", resource.messages.updated),
        )
        .response("500", storage_error())
        .build();
    let remove = keyed(format!("Remove a record from {}", resource.name))
        .response("200", message("Removed or not removed.", resource.messages.removed))
        .response("500", storage_error())
        .build();

    PathItemBuilder::new()
        .operation(PathItemType::Get, fetch)
        .operation(PathItemType::Put, overwrite)
        .operation(PathItemType::Delete, remove)
        .build()
}
