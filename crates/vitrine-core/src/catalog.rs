use tracing::Level;
use vitrine_observability::{emit_event, CatalogEvent, ProcessKind};
use vitrine_types::{NewProject, Project, ProjectPatch};

use crate::assets::AssetManager;
use crate::config::CatalogConfig;
use crate::error::{CatalogError, Result};
use crate::storage::{ProjectStore, Records};
use crate::uploads::Uploads;

/// The catalog operations behind the CMS endpoint.
///
/// Each call is a full load -> mutate -> save cycle against the data file;
/// asset side effects happen before the save and are not rolled back when a
/// later step fails.
#[derive(Debug, Clone)]
pub struct Catalog {
    config: CatalogConfig,
    store: ProjectStore,
    assets: AssetManager,
    process: ProcessKind,
}

impl Catalog {
    pub fn new(config: CatalogConfig) -> Self {
        Self {
            store: ProjectStore::new(config.data_path()),
            assets: AssetManager::new(config.clone()),
            config,
            process: ProcessKind::Engine,
        }
    }

    pub fn with_process(mut self, process: ProcessKind) -> Self {
        self.process = process;
        self
    }

    pub fn store(&self) -> &ProjectStore {
        &self.store
    }

    pub fn list(&self) -> Records {
        self.store.load()
    }

    pub fn create(&self, input: NewProject, uploads: &Uploads) -> Result<Project> {
        if input.name.trim().is_empty() {
            return Err(CatalogError::Validation(
                "No project name or data provided for creation.".to_string(),
            ));
        }

        let mut records = self.store.load_for_update()?;
        let id = records.next_id()?;

        let image = match &uploads.image {
            Some(upload) => self.assets.put_image(upload, &input.name, None)?,
            None => None,
        };
        let folder_seed = non_empty_or(&input.goods_folder_name, &input.name);
        let goods_folder = self.assets.put_folder(&uploads.goods, folder_seed, None)?;

        let project = Project {
            id,
            name: input.name,
            path: input.path,
            image: image.unwrap_or_default(),
            goods_folder: goods_folder.unwrap_or_default(),
            tag: input.tag,
            style: input.style,
            description: input.description,
            story: input.story,
            extra: Default::default(),
        };

        // newest first
        records.prepend(project.clone());
        self.store.save(&records)?;
        self.record("project.created", Some(id), None);
        Ok(project)
    }

    pub fn update(&self, patch: ProjectPatch, uploads: &Uploads) -> Result<Project> {
        let mut records = self.store.load_for_update()?;
        let Some(project) = records.get_mut(patch.id) else {
            return Err(CatalogError::NotFound("Project not found.".to_string()));
        };

        let name_seed = patch.name.clone().unwrap_or_else(|| project.name.clone());
        let folder_seed = patch
            .goods_folder_name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| name_seed.clone());

        if patch.delete_image && !project.image.is_empty() {
            self.assets.delete_image(&project.image);
            project.image.clear();
        }
        if let Some(upload) = &uploads.image {
            let old = Some(project.image.as_str()).filter(|p| !p.is_empty());
            if let Some(stored) = self.assets.put_image(upload, &name_seed, old)? {
                project.image = stored;
            }
        }

        if patch.delete_goods_folder && !project.goods_folder.is_empty() {
            self.assets.delete_folder(&project.goods_folder);
            project.goods_folder.clear();
        }
        let old = Some(project.goods_folder.as_str()).filter(|p| !p.is_empty());
        if let Some(stored) = self.assets.put_folder(&uploads.goods, &folder_seed, old)? {
            project.goods_folder = stored;
        }

        patch.apply_fields(project);
        let updated = project.clone();

        self.store.save(&records).map_err(|_| {
            CatalogError::Store("Failed to save updated data.".to_string())
        })?;
        self.record("project.updated", Some(updated.id), None);
        Ok(updated)
    }

    /// Rearrange the sequence to follow `order`. Ids not in the store are
    /// ignored; what happens to stored ids missing from `order` depends on the
    /// configured [`crate::ReorderPolicy`].
    pub fn reorder(&self, order: &[u64]) -> Result<Records> {
        let mut records = self.store.load_for_update()?;
        let dropped = records.reorder(order, self.config.reorder_policy);

        self.store.save(&records).map_err(|_| {
            CatalogError::Store("Failed to save reordered data.".to_string())
        })?;
        if dropped > 0 {
            self.record_warning(
                "project.reorder.dropped",
                &format!("records_dropped={dropped}"),
            );
        }
        self.record("projects.reordered", None, None);
        Ok(records)
    }

    /// Remove the record, persist, then delete its image and goods folder.
    pub fn delete(&self, id: u64) -> Result<Project> {
        let mut records = self.store.load_for_update()?;
        let Some(removed) = records.remove(id) else {
            return Err(CatalogError::NotFound(
                "Project not found or already deleted.".to_string(),
            ));
        };

        self.store.save(&records).map_err(|_| {
            CatalogError::Store("Failed to save data after deletion.".to_string())
        })?;

        self.assets.delete_image(&removed.image);
        self.assets.delete_folder(&removed.goods_folder);
        self.record("project.deleted", Some(id), None);
        Ok(removed)
    }

    fn record(&self, event: &str, project_id: Option<u64>, detail: Option<&str>) {
        emit_event(
            Level::INFO,
            self.process,
            CatalogEvent {
                event,
                component: "catalog",
                project_id,
                status: Some("ok"),
                error_code: None,
                detail,
            },
        );
    }

    fn record_warning(&self, event: &str, detail: &str) {
        emit_event(
            Level::WARN,
            self.process,
            CatalogEvent {
                event,
                component: "catalog",
                project_id: None,
                status: Some("warning"),
                error_code: None,
                detail: Some(detail),
            },
        );
    }
}

fn non_empty_or<'a>(preferred: &'a str, fallback: &'a str) -> &'a str {
    if preferred.trim().is_empty() {
        fallback
    } else {
        preferred
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReorderPolicy;
    use crate::uploads::{GoodsUpload, UploadedFile};
    use std::fs;
    use tempfile::TempDir;

    fn catalog(tmp: &TempDir) -> Catalog {
        Catalog::new(CatalogConfig::with_site_root(tmp.path()))
    }

    fn named(name: &str) -> NewProject {
        NewProject {
            name: name.to_string(),
            ..NewProject::default()
        }
    }

    #[test]
    fn ids_grow_past_deleted_maximum() {
        let tmp = TempDir::new().expect("tempdir");
        let catalog = catalog(&tmp);
        let a = catalog.create(named("A"), &Uploads::none()).expect("a");
        let b = catalog.create(named("B"), &Uploads::none()).expect("b");
        catalog.delete(a.id).expect("delete a");
        let c = catalog.create(named("C"), &Uploads::none()).expect("c");
        assert_eq!((a.id, b.id, c.id), (1, 2, 3));

        catalog.delete(c.id).expect("delete c");
        // the highest id is gone, so max + 1 lands on it again
        let d = catalog.create(named("D"), &Uploads::none()).expect("d");
        assert_eq!(d.id, 3);
        let ids = catalog.list().projects().map(|p| p.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![3, 2]);
    }

    #[test]
    fn create_requires_a_name_and_prepends() {
        let tmp = TempDir::new().expect("tempdir");
        let catalog = catalog(&tmp);
        let err = catalog.create(named("   "), &Uploads::none()).unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));

        catalog.create(named("Old"), &Uploads::none()).expect("old");
        catalog.create(named("New"), &Uploads::none()).expect("new");
        let names = catalog.list().projects().map(|p| p.name.clone()).collect::<Vec<_>>();
        assert_eq!(names, vec!["New".to_string(), "Old".to_string()]);
    }

    #[test]
    fn create_with_failing_goods_upload_writes_nothing() {
        let tmp = TempDir::new().expect("tempdir");
        let catalog = catalog(&tmp);
        catalog.create(named("Keep"), &Uploads::none()).expect("seed");
        let before = fs::read(catalog.store().path()).expect("read");

        let uploads = Uploads::none().with_goods(GoodsUpload::Archive(UploadedFile::new(
            "kit.zip",
            b"garbage".to_vec(),
        )));
        let err = catalog.create(named("Broken"), &uploads).unwrap_err();
        assert_eq!(err, CatalogError::Asset("Goods ZIP upload failed.".to_string()));
        assert_eq!(fs::read(catalog.store().path()).expect("read"), before);
    }

    #[test]
    fn goods_folder_name_falls_back_to_project_name() {
        let tmp = TempDir::new().expect("tempdir");
        let catalog = catalog(&tmp);
        let uploads = Uploads::none().with_goods(GoodsUpload::Tree(vec![UploadedFile::new(
            "pack/a.txt",
            b"a".to_vec(),
        )]));
        let created = catalog.create(named("Sound Pack"), &uploads).expect("create");
        assert_eq!(created.goods_folder, "goods/sound-pack/");
        assert!(tmp.path().join("goods/sound-pack/a.txt").exists());
    }

    #[test]
    fn update_delete_image_clears_field_and_file() {
        let tmp = TempDir::new().expect("tempdir");
        let catalog = catalog(&tmp);
        let created = catalog
            .create(
                named("Demo"),
                &Uploads::none().with_image(UploadedFile::new("d.png", b"png".to_vec())),
            )
            .expect("create");
        assert!(tmp.path().join("img/demo.png").exists());

        let patch = ProjectPatch {
            delete_image: true,
            ..ProjectPatch::new(created.id)
        };
        let updated = catalog.update(patch, &Uploads::none()).expect("update");
        assert_eq!(updated.image, "");
        assert!(!tmp.path().join("img/demo.png").exists());
        assert_eq!(catalog.list().get(created.id).expect("stored").image, "");
    }

    #[test]
    fn update_renamed_project_moves_image_and_keeps_unsent_fields() {
        let tmp = TempDir::new().expect("tempdir");
        let catalog = catalog(&tmp);
        let created = catalog
            .create(
                NewProject {
                    name: "Before".to_string(),
                    tag: "free".to_string(),
                    ..NewProject::default()
                },
                &Uploads::none().with_image(UploadedFile::new("a.png", b"1".to_vec())),
            )
            .expect("create");

        let patch = ProjectPatch {
            name: Some("After".to_string()),
            ..ProjectPatch::new(created.id)
        };
        let updated = catalog
            .update(
                patch,
                &Uploads::none().with_image(UploadedFile::new("b.png", b"2".to_vec())),
            )
            .expect("update");
        assert_eq!(updated.name, "After");
        assert_eq!(updated.tag, "free");
        assert_eq!(updated.image, "img/after.png");
        assert!(!tmp.path().join("img/before.png").exists());
        assert!(tmp.path().join("img/after.png").exists());
    }

    #[test]
    fn update_with_bad_archive_keeps_goods_folder() {
        let tmp = TempDir::new().expect("tempdir");
        let catalog = catalog(&tmp);
        let uploads = Uploads::none().with_goods(GoodsUpload::Tree(vec![UploadedFile::new(
            "kit/a.txt",
            b"a".to_vec(),
        )]));
        let created = catalog.create(named("Kit"), &uploads).expect("create");

        let bad = Uploads::none().with_goods(GoodsUpload::Archive(UploadedFile::new(
            "kit.zip",
            b"nope".to_vec(),
        )));
        let err = catalog
            .update(ProjectPatch::new(created.id), &bad)
            .unwrap_err();
        assert!(matches!(err, CatalogError::Asset(_)));
        assert_eq!(
            catalog.list().get(created.id).expect("stored").goods_folder,
            "goods/kit/"
        );
        assert!(tmp.path().join("goods/kit/a.txt").exists());
    }

    #[test]
    fn update_unknown_id_is_not_found() {
        let tmp = TempDir::new().expect("tempdir");
        let catalog = catalog(&tmp);
        let err = catalog
            .update(ProjectPatch::new(42), &Uploads::none())
            .unwrap_err();
        assert_eq!(err, CatalogError::NotFound("Project not found.".to_string()));
    }

    #[test]
    fn strict_reorder_drops_unlisted_and_unknown_ids() {
        let tmp = TempDir::new().expect("tempdir");
        let catalog = catalog(&tmp);
        for name in ["A", "B", "C"] {
            catalog.create(named(name), &Uploads::none()).expect("create");
        }
        let result = catalog.reorder(&[1, 99, 3, 1]).expect("reorder");
        assert_eq!(result.projects().map(|p| p.id).collect::<Vec<_>>(), vec![1, 3]);
        // project 2 was not listed and is gone from the store
        let stored = catalog.list().projects().map(|p| p.id).collect::<Vec<_>>();
        assert_eq!(stored, vec![1, 3]);
    }

    #[test]
    fn append_unlisted_reorder_keeps_everything() {
        let tmp = TempDir::new().expect("tempdir");
        let mut config = CatalogConfig::with_site_root(tmp.path());
        config.reorder_policy = ReorderPolicy::AppendUnlisted;
        let catalog = Catalog::new(config);
        for name in ["A", "B", "C", "D"] {
            catalog.create(named(name), &Uploads::none()).expect("create");
        }
        // stored order is 4, 3, 2, 1
        let result = catalog.reorder(&[2, 77]).expect("reorder");
        assert_eq!(
            result.projects().map(|p| p.id).collect::<Vec<_>>(),
            vec![2, 4, 3, 1]
        );
    }

    #[test]
    fn delete_missing_id_leaves_file_untouched() {
        let tmp = TempDir::new().expect("tempdir");
        let catalog = catalog(&tmp);
        catalog.create(named("Only"), &Uploads::none()).expect("create");
        let before = fs::read(catalog.store().path()).expect("read");
        let err = catalog.delete(5).unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
        assert_eq!(fs::read(catalog.store().path()).expect("read"), before);
    }

    #[test]
    fn create_keeps_records_that_do_not_decode() {
        let tmp = TempDir::new().expect("tempdir");
        let catalog = catalog(&tmp);
        fs::create_dir_all(tmp.path().join("data")).expect("mkdir");
        fs::write(
            catalog.store().path(),
            r#"[{"id": 1, "name": "Keep A"}, {"id": 2, "name": "Keep B"}, {"name": "no id"}]"#,
        )
        .expect("seed");

        let created = catalog.create(named("New"), &Uploads::none()).expect("create");
        assert_eq!(created.id, 3);

        let raw: serde_json::Value =
            serde_json::from_slice(&fs::read(catalog.store().path()).expect("read")).expect("json");
        let names = raw
            .as_array()
            .expect("list")
            .iter()
            .filter_map(|entry| entry["name"].as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["New", "Keep A", "Keep B", "no id"]);

        catalog.delete(1).expect("delete");
        assert_eq!(catalog.list().len(), 3);
    }

    #[test]
    fn mutations_refuse_to_overwrite_unreadable_data() {
        let tmp = TempDir::new().expect("tempdir");
        let catalog = catalog(&tmp);
        fs::create_dir_all(tmp.path().join("data")).expect("mkdir");
        fs::write(catalog.store().path(), "[{\"id\": 1,").expect("seed");

        assert!(catalog.list().is_empty());
        let err = catalog.create(named("New"), &Uploads::none()).unwrap_err();
        assert_eq!(err, CatalogError::Store("Failed to read project data.".to_string()));
        assert!(matches!(catalog.delete(1), Err(CatalogError::Store(_))));
        assert!(matches!(catalog.reorder(&[1]), Err(CatalogError::Store(_))));
        assert_eq!(
            fs::read_to_string(catalog.store().path()).expect("read"),
            "[{\"id\": 1,"
        );
    }

    #[test]
    fn create_fails_cleanly_when_ids_are_exhausted() {
        let tmp = TempDir::new().expect("tempdir");
        let catalog = catalog(&tmp);
        fs::create_dir_all(tmp.path().join("data")).expect("mkdir");
        fs::write(
            catalog.store().path(),
            r#"[{"id": 18446744073709551615, "name": "Max"}]"#,
        )
        .expect("seed");
        let before = fs::read(catalog.store().path()).expect("read");

        let err = catalog.create(named("Next"), &Uploads::none()).unwrap_err();
        assert!(matches!(err, CatalogError::Store(_)));
        assert_eq!(fs::read(catalog.store().path()).expect("read"), before);
    }

    #[test]
    fn delete_ignores_asset_links_pointing_at_the_data_file() {
        let tmp = TempDir::new().expect("tempdir");
        let catalog = catalog(&tmp);
        fs::create_dir_all(tmp.path().join("data")).expect("mkdir");
        fs::write(
            catalog.store().path(),
            r#"[{"id": 1, "image": "data/data.json", "goods_folder": "data/"}, {"id": 2, "name": "B"}]"#,
        )
        .expect("seed");

        catalog.delete(1).expect("delete");
        let remaining = catalog.list();
        assert_eq!(remaining.projects().map(|p| p.id).collect::<Vec<_>>(), vec![2]);
    }
}
