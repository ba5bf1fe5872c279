use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// One catalog entry. Sequence order in the data file is display order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Project {
    #[serde(deserialize_with = "lenient_id")]
    pub id: u64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub path: String,
    /// Site-relative path of the project PNG, empty when there is none.
    #[serde(default, deserialize_with = "lenient_string")]
    pub image: String,
    /// Site-relative path of the goods directory (with trailing slash), empty when there is none.
    #[serde(default, deserialize_with = "lenient_string")]
    pub goods_folder: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub tag: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub style: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub story: String,
    /// Hand-added keys survive a load/save cycle untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Scalar fields supplied when creating a project. Missing values are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewProject {
    pub name: String,
    pub path: String,
    pub goods_folder_name: String,
    pub tag: String,
    pub style: String,
    pub description: String,
    pub story: String,
}

/// Partial update of an existing project. `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectPatch {
    pub id: u64,
    pub name: Option<String>,
    pub path: Option<String>,
    pub goods_folder_name: Option<String>,
    pub tag: Option<String>,
    pub style: Option<String>,
    pub description: Option<String>,
    pub story: Option<String>,
    pub delete_image: bool,
    pub delete_goods_folder: bool,
}

impl ProjectPatch {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// Merge the supplied scalar fields into `project`. Asset paths are not touched.
    pub fn apply_fields(&self, project: &mut Project) {
        fn merge(slot: &mut String, incoming: &Option<String>) {
            if let Some(value) = incoming {
                *slot = value.clone();
            }
        }
        merge(&mut project.name, &self.name);
        merge(&mut project.path, &self.path);
        merge(&mut project.tag, &self.tag);
        merge(&mut project.style, &self.style);
        merge(&mut project.description, &self.description);
        merge(&mut project.story, &self.story);
    }
}

/// Accepts an integral JSON number or a numeric string.
pub fn parse_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

fn lenient_id<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    parse_id(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid project id: {raw}")))
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}
