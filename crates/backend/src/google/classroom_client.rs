//! Minimal Google Classroom REST client (courses and coursework).

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;

const CLASSROOM_API: &str = "https://classroom.googleapis.com/v1";

pub struct ClassroomClient {
    http: reqwest::Client,
    access_token: String,
    base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassroomCourse {
    pub id: String,
    pub name: String,
    pub course_state: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseWork {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub work_type: Option<String>,
    pub due_date: Option<DueDate>,
    pub due_time: Option<TimeOfDay>,
    #[serde(default)]
    pub materials: Vec<Material>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DueDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

/// Google omits zero-valued fields, so `{}` means midnight
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct TimeOfDay {
    #[serde(default)]
    pub hours: u32,
    #[serde(default)]
    pub minutes: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Material {
    pub drive_file: Option<SharedDriveFile>,
    pub link: Option<Link>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedDriveFile {
    pub drive_file: DriveFile,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub title: Option<String>,
    pub alternate_link: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Link {
    pub url: String,
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListCoursesResponse {
    #[serde(default)]
    courses: Vec<ClassroomCourse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListCourseWorkResponse {
    #[serde(default)]
    course_work: Vec<CourseWork>,
}

impl CourseWork {
    /// Due instant in UTC; Classroom reports due dates in UTC already.
    pub fn due_datetime(&self) -> Option<DateTime<Utc>> {
        let date = self.due_date?;
        let time = self.due_time.unwrap_or_default();
        NaiveDate::from_ymd_opt(date.year, date.month, date.day)?
            .and_hms_opt(time.hours, time.minutes, 0)
            .map(|dt| dt.and_utc())
    }
}

impl ClassroomClient {
    pub fn new(http: reqwest::Client, access_token: impl Into<String>) -> Self {
        Self::with_base_url(http, access_token, CLASSROOM_API)
    }

    pub fn with_base_url(
        http: reqwest::Client,
        access_token: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            access_token: access_token.into(),
            base_url: base_url.into(),
        }
    }

    pub async fn list_courses(&self) -> Result<Vec<ClassroomCourse>> {
        let response: ListCoursesResponse = self
            .get("/courses?pageSize=50")
            .await
            .context("Failed to list courses")?;
        Ok(response.courses)
    }

    pub async fn list_course_work(&self, course_id: &str) -> Result<Vec<CourseWork>> {
        let path = format!(
            "/courses/{}/courseWork?pageSize=50",
            urlencoding::encode(course_id)
        );
        let response: ListCourseWorkResponse = self
            .get(&path)
            .await
            .with_context(|| format!("Failed to list coursework for course {}", course_id))?;
        Ok(response.course_work)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Classroom API returned {}: {}", status, body);
        }

        Ok(response.json().await?)
    }
}
