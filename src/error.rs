use thiserror::Error;

/// Field-level rejections raised before anything is written.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("name is {len} characters long, at most {max} allowed")]
    NameTooLong { len: usize, max: usize },

    #[error("'{value}' is not a valid course choice")]
    InvalidCourse { value: String },

    #[error("image must reference an uploaded file")]
    EmptyImage,

    #[error("image path is {len} characters long, at most {max} allowed")]
    ImagePathTooLong { len: usize, max: usize },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("student {id} not found")]
    NotFound { id: i64 },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::Validation(_) => "ValidationError",
            StoreError::NotFound { .. } => "NotFound",
            StoreError::Database(_) => "InternalError",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            StoreError::Validation(_) => 400,
            StoreError::NotFound { .. } => 404,
            StoreError::Database(_) => 500,
        }
    }
}
