//! The `student` table and its store operations.

use crate::error::{StoreError, ValidationError};
use crate::orm::{BoxFuture, Db, Migration, Model};
use chrono::{DateTime, SubsecRound, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::sync::Arc;

pub const NAME_MAX_LENGTH: usize = 100;
pub const IMAGE_MAX_LENGTH: usize = 100;
pub const COURSE_MAX_LENGTH: usize = 4;

/// Allowed course codes and their display labels, as declared.
/// `BCOM` is labelled `S` in the source data; it is kept verbatim.
pub const COURSE_CHOICES: &[(&str, &str)] = &[("BCA", "BCA"), ("BCOM", "S")];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum Course {
    Bca,
    Bcom,
}

impl Course {
    pub fn from_code(code: &str) -> Option<Course> {
        match code {
            "BCA" => Some(Course::Bca),
            "BCOM" => Some(Course::Bcom),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Course::Bca => "BCA",
            Course::Bcom => "BCOM",
        }
    }

    pub fn label(self) -> &'static str {
        let code = self.code();
        COURSE_CHOICES
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, label)| *label)
            .unwrap_or(code)
    }

    pub fn choices() -> &'static [(&'static str, &'static str)] {
        COURSE_CHOICES
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Student {
    pub id: i64,
    pub name: String,
    /// Path relative to the media root, e.g. `images/ada.png`.
    pub image: String,
    pub date_added: DateTime<Utc>,
    pub stu_cors: Course,
}

impl Student {
    pub fn stu_cors_display(&self) -> &'static str {
        self.stu_cors.label()
    }

    pub fn image_url(&self, media_url: &str) -> String {
        format!("{}/{}", media_url.trim_end_matches('/'), self.image)
    }
}

/// Input for `create`. `stu_cors` stays a raw string until validated.
#[derive(Debug, Clone, Deserialize)]
pub struct NewStudent {
    pub name: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub date_added: Option<DateTime<Utc>>,
    pub stu_cors: String,
}

impl NewStudent {
    /// Checks every field and returns the parsed course.
    pub fn validate(&self) -> Result<Course, ValidationError> {
        validate_name(&self.name)?;
        validate_image(&self.image)?;
        parse_course(&self.stu_cors)
    }
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StudentUpdate {
    pub name: Option<String>,
    pub image: Option<String>,
    pub date_added: Option<DateTime<Utc>>,
    pub stu_cors: Option<String>,
}

impl StudentUpdate {
    pub fn validate(&self) -> Result<Option<Course>, ValidationError> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(image) = &self.image {
            validate_image(image)?;
        }
        self.stu_cors.as_deref().map(parse_course).transpose()
    }
}

fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    let len = name.chars().count();
    if len > NAME_MAX_LENGTH {
        return Err(ValidationError::NameTooLong {
            len,
            max: NAME_MAX_LENGTH,
        });
    }
    Ok(())
}

fn validate_image(image: &str) -> Result<(), ValidationError> {
    if image.trim().is_empty() {
        return Err(ValidationError::EmptyImage);
    }
    let len = image.chars().count();
    if len > IMAGE_MAX_LENGTH {
        return Err(ValidationError::ImagePathTooLong {
            len,
            max: IMAGE_MAX_LENGTH,
        });
    }
    Ok(())
}

fn parse_course(code: &str) -> Result<Course, ValidationError> {
    Course::from_code(code).ok_or_else(|| ValidationError::InvalidCourse {
        value: code.to_string(),
    })
}

// Stored timestamps keep microseconds.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

#[async_trait::async_trait]
impl Model for Student {
    fn table_name() -> &'static str {
        "student"
    }

    fn create_table_sql() -> String {
        let codes = COURSE_CHOICES
            .iter()
            .map(|(code, _)| format!("'{}'", code))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "CREATE TABLE IF NOT EXISTS student (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR({name}) NOT NULL,
                image VARCHAR({image}) NOT NULL,
                date_added DATETIME NOT NULL,
                stu_cors VARCHAR({course}) NOT NULL CHECK (stu_cors IN ({codes}))
            )",
            name = NAME_MAX_LENGTH,
            image = IMAGE_MAX_LENGTH,
            course = COURSE_MAX_LENGTH,
            codes = codes,
        )
    }

    fn columns() -> Vec<(String, String)> {
        vec![
            ("id".into(), "INTEGER".into()),
            (
                "name".into(),
                format!("VARCHAR({}) NOT NULL DEFAULT ''", NAME_MAX_LENGTH),
            ),
            (
                "image".into(),
                format!("VARCHAR({}) NOT NULL DEFAULT ''", IMAGE_MAX_LENGTH),
            ),
            ("date_added".into(), "DATETIME".into()),
            (
                "stu_cors".into(),
                format!("VARCHAR({}) NOT NULL DEFAULT 'BCA'", COURSE_MAX_LENGTH),
            ),
        ]
    }
}

fn migrate_student(db: Arc<Db>) -> BoxFuture<'static, Result<(), sqlx::Error>> {
    Student::migrate(db)
}

inventory::submit! {
    Migration(migrate_student)
}

const SELECT_COLUMNS: &str = "id, name, image, date_added, stu_cors";

/// Validate and insert a student. `date_added` defaults to now.
pub async fn create(db: &Db, new: NewStudent) -> Result<Student, StoreError> {
    let course = new.validate()?;
    let date_added = new.date_added.unwrap_or_else(now);

    let student: Student = sqlx::query_as(&format!(
        "INSERT INTO student (name, image, date_added, stu_cors) VALUES (?, ?, ?, ?) \
         RETURNING {}",
        SELECT_COLUMNS
    ))
    .bind(&new.name)
    .bind(&new.image)
    .bind(date_added)
    .bind(course)
    .fetch_one(db.pool())
    .await?;

    info!("Created student {} ({})", student.id, student.stu_cors.code());
    Ok(student)
}

pub async fn get(db: &Db, id: i64) -> Result<Student, StoreError> {
    sqlx::query_as(&format!("SELECT {} FROM student WHERE id = ?", SELECT_COLUMNS))
        .bind(id)
        .fetch_optional(db.pool())
        .await?
        .ok_or(StoreError::NotFound { id })
}

pub async fn list(db: &Db) -> Result<Vec<Student>, StoreError> {
    let students = sqlx::query_as(&format!(
        "SELECT {} FROM student ORDER BY date_added, id",
        SELECT_COLUMNS
    ))
    .fetch_all(db.pool())
    .await?;
    Ok(students)
}

/// Apply the fields present in `changes`. Nothing is written if any of them is invalid.
pub async fn update(db: &Db, id: i64, changes: StudentUpdate) -> Result<Student, StoreError> {
    let course = changes.validate()?;

    let mut tx = db.pool().begin().await?;
    let mut student: Student =
        sqlx::query_as(&format!("SELECT {} FROM student WHERE id = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::NotFound { id })?;

    if let Some(name) = changes.name {
        student.name = name;
    }
    if let Some(image) = changes.image {
        student.image = image;
    }
    if let Some(date_added) = changes.date_added {
        student.date_added = date_added;
    }
    if let Some(course) = course {
        student.stu_cors = course;
    }

    sqlx::query("UPDATE student SET name = ?, image = ?, date_added = ?, stu_cors = ? WHERE id = ?")
        .bind(&student.name)
        .bind(&student.image)
        .bind(student.date_added)
        .bind(student.stu_cors)
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!("Updated student {}", id);
    Ok(student)
}

pub async fn delete(db: &Db, id: i64) -> Result<(), StoreError> {
    let result = sqlx::query("DELETE FROM student WHERE id = ?")
        .bind(id)
        .execute(db.pool())
        .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound { id });
    }
    info!("Deleted student {}", id);
    Ok(())
}
