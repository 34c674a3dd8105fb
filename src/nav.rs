//! Breadcrumbs for app routes and `{value, label}` dropdown options.

use serde::Serialize;

use crate::model::{Collection, Record};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Crumb {
    pub label: String,
    pub href: String,
}

/// Route segment → collection whose ids may follow it.
fn route_collection(segment: &str) -> Option<Collection> {
    let c = match segment {
        "students" => Collection::Students,
        "teachers" => Collection::Teachers,
        "classrooms" => Collection::Classrooms,
        "classes" => Collection::Classes,
        "academic-years" => Collection::AcademicYears,
        "teaching-breaks" => Collection::TeachingBreaks,
        "lessons" => Collection::Lessons,
        "attendance" => Collection::AttendanceRecords,
        "homework" => Collection::Homework,
        "grades" => Collection::Grades,
        "finance" | "obligations" => Collection::PaymentObligations,
        "payroll" | "salaries" => Collection::SalaryCalculations,
        _ => return None,
    };
    Some(c)
}

fn static_label(segment: &str) -> String {
    match segment {
        "new" => "New".to_string(),
        "edit" => "Edit".to_string(),
        "schedule" => "Schedule".to_string(),
        "settings" => "Settings".to_string(),
        other => other
            .split('-')
            .filter(|w| !w.is_empty())
            .map(|w| {
                let mut chars = w.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" "),
    }
}

/// Splits a route into crumbs. `resolve` maps an id segment that follows a
/// collection segment to the entity's display name.
pub fn breadcrumbs<F>(path: &str, mut resolve: F) -> Vec<Crumb>
where
    F: FnMut(Collection, &str) -> Option<String>,
{
    let mut crumbs = vec![Crumb {
        label: "Dashboard".to_string(),
        href: "/".to_string(),
    }];
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let mut href = String::new();
    let mut previous: Option<Collection> = None;
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        href.push('/');
        href.push_str(segment);
        let label = if let Some(c) = route_collection(segment) {
            previous = Some(c);
            c.title().to_string()
        } else if let Some(c) = previous.take().filter(|_| !matches!(segment, "new" | "edit")) {
            resolve(c, segment).unwrap_or_else(|| segment.to_string())
        } else {
            static_label(segment)
        };
        crumbs.push(Crumb {
            label,
            href: href.clone(),
        });
    }
    crumbs
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupEntity {
    Students,
    Teachers,
    Classrooms,
    Classes,
    AcademicYears,
}

impl LookupEntity {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "students" => Some(LookupEntity::Students),
            "teachers" => Some(LookupEntity::Teachers),
            "classrooms" => Some(LookupEntity::Classrooms),
            "classes" => Some(LookupEntity::Classes),
            "academicYears" | "academic-years" => Some(LookupEntity::AcademicYears),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupOption {
    pub value: String,
    pub label: String,
}

/// Options for the rows passing `keep`, sorted by label (case-insensitive).
pub fn options<T: Record>(rows: &[T], keep: impl Fn(&T) -> bool) -> Vec<LookupOption> {
    let mut out: Vec<LookupOption> = rows
        .iter()
        .filter(|r| keep(r))
        .map(|r| LookupOption {
            value: r.id().to_string(),
            label: r.label(),
        })
        .collect();
    out.sort_by(|a, b| {
        a.label
            .to_lowercase()
            .cmp(&b.label.to_lowercase())
            .then_with(|| a.value.cmp(&b.value))
    });
    out
}
