use std::collections::HashMap;

use axum::body::to_bytes;
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header::CONTENT_TYPE;
use axum::Form;
use serde_json::{Map, Value};
use vitrine_core::{CatalogError, GoodsUpload, UploadedFile, Uploads};
use vitrine_types::{parse_id, NewProject, ProjectPatch};

use crate::AppState;

const IMAGE_FIELD: &str = "image_file";
const GOODS_ZIP_FIELD: &str = "goods_zip_file";
const GOODS_DIR_FIELDS: [&str; 2] = ["goods_dir_upload", "goods_dir_upload[]"];

/// Scalar fields and file parts pulled out of one request body.
#[derive(Debug, Default)]
pub struct RequestInput {
    pub fields: Map<String, Value>,
    pub uploads: Uploads,
}

impl RequestInput {
    /// Decodes multipart, urlencoded or JSON bodies. An unparsable JSON body
    /// yields no fields rather than an error.
    pub async fn from_request(request: Request, state: &AppState) -> Result<Self, CatalogError> {
        let content_type = request
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::from_request(request, state)
                .await
                .map_err(|err| CatalogError::Validation(format!("Malformed form data: {err}")))?;
            return decode_multipart(multipart).await;
        }

        if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(pairs) = Form::<HashMap<String, String>>::from_request(request, state)
                .await
                .map_err(|err| CatalogError::Validation(format!("Malformed form data: {err}")))?;
            let fields = pairs
                .into_iter()
                .map(|(key, value)| (key, Value::String(value)))
                .collect();
            return Ok(Self {
                fields,
                uploads: Uploads::none(),
            });
        }

        let body = to_bytes(request.into_body(), state.body_limit)
            .await
            .map_err(|err| CatalogError::Validation(format!("Unreadable request body: {err}")))?;
        let fields = match serde_json::from_slice::<Value>(&body) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        Ok(Self {
            fields,
            uploads: Uploads::none(),
        })
    }

    pub fn text(&self, key: &str) -> Option<String> {
        match self.fields.get(key)? {
            Value::String(text) => Some(text.clone()),
            Value::Number(number) => Some(number.to_string()),
            Value::Bool(flag) => Some(flag.to_string()),
            _ => None,
        }
    }

    pub fn flag(&self, key: &str) -> bool {
        match self.fields.get(key) {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::String(text)) => matches!(text.trim(), "true" | "1" | "on"),
            Some(Value::Number(number)) => number.as_u64() == Some(1),
            _ => false,
        }
    }

    pub fn id(&self) -> Option<u64> {
        self.fields.get("id").and_then(parse_id).filter(|id| *id > 0)
    }

    /// Reorder requests carry a JSON `true`; form text never qualifies.
    pub fn requests_reorder(&self) -> bool {
        matches!(self.fields.get("reorder"), Some(Value::Bool(true)))
    }

    /// `POST` sent by an HTML form that cannot issue `PUT` itself.
    pub fn overrides_to_put(&self) -> bool {
        self.text("_method")
            .is_some_and(|method| method.eq_ignore_ascii_case("PUT"))
    }

    pub fn new_project(&self) -> NewProject {
        NewProject {
            name: self.text("name").unwrap_or_default().trim().to_string(),
            path: self.text("path").unwrap_or_default(),
            goods_folder_name: self.text("goods_folder_name").unwrap_or_default(),
            tag: self.text("tag").unwrap_or_default(),
            style: self.text("style").unwrap_or_default(),
            description: self.text("description").unwrap_or_default(),
            story: self.text("story").unwrap_or_default(),
        }
    }

    pub fn patch(&self) -> Result<ProjectPatch, CatalogError> {
        let id = self.id().ok_or_else(|| {
            CatalogError::Validation("Project ID is missing for update.".to_string())
        })?;
        Ok(ProjectPatch {
            id,
            name: self.text("name").map(|name| name.trim().to_string()),
            path: self.text("path"),
            goods_folder_name: self.text("goods_folder_name"),
            tag: self.text("tag"),
            style: self.text("style"),
            description: self.text("description"),
            story: self.text("story"),
            delete_image: self.flag("delete_image"),
            delete_goods_folder: self.flag("delete_goods_folder"),
        })
    }

    pub fn new_order(&self) -> Result<Vec<u64>, CatalogError> {
        match self.fields.get("new_order") {
            Some(Value::Array(entries)) => Ok(entries.iter().filter_map(parse_id).collect()),
            _ => Err(CatalogError::Validation(
                "Invalid data for reordering.".to_string(),
            )),
        }
    }

    pub fn delete_id(&self) -> Result<u64, CatalogError> {
        self.id().ok_or_else(|| {
            CatalogError::Validation("Project ID is missing for deletion.".to_string())
        })
    }
}

async fn decode_multipart(mut multipart: Multipart) -> Result<RequestInput, CatalogError> {
    let mut fields = Map::new();
    let mut image = None;
    let mut archive = None;
    let mut tree = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                return Err(CatalogError::Validation(format!(
                    "Malformed form data: {err}"
                )))
            }
        };
        let name = field.name().unwrap_or_default().to_string();
        let Some(file_name) = field.file_name().map(ToString::to_string) else {
            let text = field
                .text()
                .await
                .map_err(|err| CatalogError::Validation(format!("Malformed form data: {err}")))?;
            fields.insert(name, Value::String(text));
            continue;
        };

        // A part that fails mid-stream leaves the rest of the body unreadable.
        let (upload, truncated) = match field.bytes().await {
            Ok(bytes) => (UploadedFile::new(file_name, bytes.to_vec()), false),
            Err(err) => (UploadedFile::failed(file_name, err.to_string()), true),
        };
        // Browsers send an empty, unnamed part for an untouched file input.
        if upload.is_ok() && upload.file_name.is_empty() && upload.bytes.is_empty() {
            continue;
        }

        match name.as_str() {
            IMAGE_FIELD if image.is_none() => image = Some(upload),
            GOODS_ZIP_FIELD if archive.is_none() => archive = Some(upload),
            other if GOODS_DIR_FIELDS.contains(&other) => tree.push(upload),
            _ => {}
        }

        if truncated {
            break;
        }
    }

    let goods = match (archive, tree.is_empty()) {
        (Some(archive), _) => GoodsUpload::Archive(archive),
        (None, false) => GoodsUpload::Tree(tree),
        (None, true) => GoodsUpload::None,
    };
    Ok(RequestInput {
        fields,
        uploads: Uploads { image, goods },
    })
}
