use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CatalogError, Result};

/// What happens to records whose id is missing from a reorder request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ReorderPolicy {
    /// Unlisted records are dropped from the stored sequence.
    #[default]
    Strict,
    /// Unlisted records are kept, after the listed ones, in their previous order.
    #[serde(alias = "append_unlisted")]
    AppendUnlisted,
}

/// Where the catalog lives on disk. `data_file`, `image_dir` and `goods_dir` are
/// relative to `site_root`, and the same relative form is what records store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CatalogConfig {
    pub site_root: PathBuf,
    pub data_file: String,
    pub image_dir: String,
    pub goods_dir: String,
    pub reorder_policy: ReorderPolicy,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            site_root: PathBuf::from("."),
            data_file: "data/data.json".to_string(),
            image_dir: "img".to_string(),
            goods_dir: "goods".to_string(),
            reorder_policy: ReorderPolicy::Strict,
        }
    }
}

impl CatalogConfig {
    pub fn with_site_root(site_root: impl Into<PathBuf>) -> Self {
        Self {
            site_root: site_root.into(),
            ..Self::default()
        }
    }

    /// Layered resolution: defaults, then the optional JSON file, then `VITRINE_*`
    /// environment variables, then CLI overrides.
    pub fn resolve(config_file: Option<&Path>, cli_overrides: Option<Value>) -> Result<Self> {
        Self::resolve_with_env(config_file, cli_overrides, |key| std::env::var(key).ok())
    }

    pub fn resolve_with_env(
        config_file: Option<&Path>,
        cli_overrides: Option<Value>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut merged = serde_json::to_value(Self::default())
            .map_err(|e| CatalogError::Config(e.to_string()))?;
        if let Some(path) = config_file {
            deep_merge(&mut merged, &read_json_file(path));
        }
        deep_merge(&mut merged, &env_layer(lookup));
        if let Some(cli) = cli_overrides {
            deep_merge(&mut merged, &cli);
        }
        let config: Self =
            serde_json::from_value(merged).map_err(|e| CatalogError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("data_file", &self.data_file),
            ("image_dir", &self.image_dir),
            ("goods_dir", &self.goods_dir),
        ] {
            if value.trim().is_empty() {
                return Err(CatalogError::Config(format!("{key} cannot be empty")));
            }
            if safe_relative(value).is_none() {
                return Err(CatalogError::Config(format!(
                    "{key} must be a relative path inside the site root"
                )));
            }
        }
        Ok(())
    }

    pub fn data_path(&self) -> PathBuf {
        self.site_root.join(&self.data_file)
    }

    pub fn image_root(&self) -> PathBuf {
        self.site_root.join(&self.image_dir)
    }

    pub fn goods_root(&self) -> PathBuf {
        self.site_root.join(&self.goods_dir)
    }

    /// Stored form of an image path, e.g. `img/demo.png`.
    pub fn image_link(&self, file_name: &str) -> String {
        format!("{}/{}", self.image_dir.trim_end_matches('/'), file_name)
    }

    /// Stored form of a goods folder path, e.g. `goods/demo/`.
    pub fn goods_link(&self, folder: &str) -> String {
        format!("{}/{}/", self.goods_dir.trim_end_matches('/'), folder)
    }

    /// Map a stored relative path back onto the filesystem. Absolute paths and
    /// anything climbing out with `..` resolve to `None`.
    pub fn resolve_stored(&self, stored: &str) -> Option<PathBuf> {
        let relative = safe_relative(stored)?;
        if relative.as_os_str().is_empty() {
            return None;
        }
        Some(self.site_root.join(relative))
    }
}

pub(crate) fn safe_relative(raw: &str) -> Option<PathBuf> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let mut out = PathBuf::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}

fn read_json_file(path: &Path) -> Value {
    let Ok(raw) = fs::read_to_string(path) else {
        tracing::warn!("config file {} not readable, ignoring", path.display());
        return empty_object();
    };
    match serde_json::from_str::<Value>(&raw) {
        Ok(value @ Value::Object(_)) => value,
        _ => {
            tracing::warn!("config file {} is not a JSON object, ignoring", path.display());
            empty_object()
        }
    }
}

fn env_layer(lookup: impl Fn(&str) -> Option<String>) -> Value {
    let mut root = Map::new();
    for (var, key) in [
        ("VITRINE_SITE_ROOT", "site_root"),
        ("VITRINE_DATA_FILE", "data_file"),
        ("VITRINE_IMAGE_DIR", "image_dir"),
        ("VITRINE_GOODS_DIR", "goods_dir"),
        ("VITRINE_REORDER_POLICY", "reorder_policy"),
    ] {
        if let Some(value) = lookup(var) {
            let value = value.trim();
            if !value.is_empty() {
                root.insert(key.to_string(), Value::String(value.to_string()));
            }
        }
    }
    Value::Object(root)
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

fn deep_merge(base: &mut Value, overlay: &Value) {
    if overlay.is_null() {
        return;
    }
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                if value.is_null() {
                    continue;
                }
                match base_map.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base_value, overlay_value) => {
            *base_value = overlay_value.clone();
        }
    }
}
