/// A single uploaded file as received at the HTTP boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Client-side file name. For directory uploads this is the relative path,
    /// starting with the folder the user picked (`Root/sub/file.ext`).
    pub file_name: String,
    pub bytes: Vec<u8>,
    /// Set when the part could not be received intact.
    pub error: Option<String>,
}

impl UploadedFile {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
            error: None,
        }
    }

    pub fn failed(file_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: Vec::new(),
            error: Some(reason.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn has_extension(&self, ext: &str) -> bool {
        std::path::Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(ext))
    }
}

/// Goods payload, decided once at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GoodsUpload {
    #[default]
    None,
    Archive(UploadedFile),
    Tree(Vec<UploadedFile>),
}

/// All file inputs of a create/update request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Uploads {
    pub image: Option<UploadedFile>,
    pub goods: GoodsUpload,
}

impl Uploads {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_image(mut self, image: UploadedFile) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_goods(mut self, goods: GoodsUpload) -> Self {
        self.goods = goods;
        self
    }
}
