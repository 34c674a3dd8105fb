use serde::{Deserialize, Serialize};

use super::{full_name, Collection, Record};
use crate::validation::{ValidationContext, Validator, NAME_MAX, PHONE_MAX, TEXT_MAX};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudentStatus {
    #[default]
    Active,
    Inactive,
    Graduated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub birth_date: Option<String>,
    #[serde(default)]
    pub parent_name: Option<String>,
    #[serde(default)]
    pub parent_phone: Option<String>,
    #[serde(default)]
    pub status: StudentStatus,
    #[serde(default)]
    pub enrolled_on: Option<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl Student {
    pub fn matches_search(&self, needle: &str) -> bool {
        let needle = needle.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        let hay = [
            Some(self.first_name.as_str()),
            Some(self.last_name.as_str()),
            self.email.as_deref(),
            self.phone.as_deref(),
            self.parent_name.as_deref(),
        ];
        hay.into_iter()
            .flatten()
            .any(|s| s.to_lowercase().contains(&needle))
            || full_name(&self.first_name, &self.last_name)
                .to_lowercase()
                .contains(&needle)
    }
}

impl Record for Student {
    const COLLECTION: Collection = Collection::Students;
    const REQUIRED: &'static [&'static str] = &["firstName", "lastName"];

    fn id(&self) -> &str {
        &self.id
    }

    fn label(&self) -> String {
        full_name(&self.first_name, &self.last_name)
    }

    fn validate(&self, _ctx: &ValidationContext, v: &mut Validator) {
        v.required("firstName", &self.first_name, NAME_MAX);
        v.required("lastName", &self.last_name, NAME_MAX);
        v.optional_email("email", self.email.as_deref());
        v.optional("phone", self.phone.as_deref(), PHONE_MAX);
        v.optional("parentName", self.parent_name.as_deref(), NAME_MAX * 2);
        v.optional("parentPhone", self.parent_phone.as_deref(), PHONE_MAX);
        let birth = v.optional_date("birthDate", self.birth_date.as_deref());
        if let Some(b) = birth {
            if b > super::today() {
                v.push("birthDate", "must not be in the future");
            }
        }
        let enrolled = v.optional_date("enrolledOn", self.enrolled_on.as_deref());
        v.date_order("enrolledOn", enrolled, "birthDate", birth);
        v.optional("notes", Some(&self.notes), TEXT_MAX);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeacherStatus {
    #[default]
    Active,
    Inactive,
    OnLeave,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub subjects: Vec<String>,
    #[serde(default)]
    pub hourly_rate: f64,
    #[serde(default)]
    pub status: TeacherStatus,
    #[serde(default)]
    pub hired_on: Option<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl Teacher {
    pub fn teaches(&self, subject: &str) -> bool {
        let subject = subject.trim();
        self.subjects.iter().any(|s| s.eq_ignore_ascii_case(subject))
    }

    pub fn matches_search(&self, needle: &str) -> bool {
        let needle = needle.trim().to_lowercase();
        needle.is_empty()
            || full_name(&self.first_name, &self.last_name)
                .to_lowercase()
                .contains(&needle)
            || self.email.to_lowercase().contains(&needle)
            || self.subjects.iter().any(|s| s.to_lowercase().contains(&needle))
    }
}

impl Record for Teacher {
    const COLLECTION: Collection = Collection::Teachers;
    const REQUIRED: &'static [&'static str] = &["firstName", "lastName", "email"];

    fn id(&self) -> &str {
        &self.id
    }

    fn label(&self) -> String {
        full_name(&self.first_name, &self.last_name)
    }

    fn validate(&self, _ctx: &ValidationContext, v: &mut Validator) {
        v.required("firstName", &self.first_name, NAME_MAX);
        v.required("lastName", &self.last_name, NAME_MAX);
        v.email("email", &self.email);
        v.optional("phone", self.phone.as_deref(), PHONE_MAX);
        for (i, s) in self.subjects.iter().enumerate() {
            v.required(&format!("subjects[{}]", i), s, NAME_MAX);
        }
        v.non_negative("hourlyRate", self.hourly_rate);
        v.optional_date("hiredOn", self.hired_on.as_deref());
    }
}
