//! Weekly schedule math: slot/lesson conflict detection and the pixel layout
//! used by the weekly calendar grid.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::config::ScheduleConfig;
use crate::model::{format_time, parse_time, Lesson, LessonStatus, ScheduleSlot, SchoolClass, Weekday};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleCandidate {
    /// Class being edited; excluded from the comparison set.
    #[serde(default)]
    pub class_id: Option<String>,
    pub teacher_id: String,
    #[serde(default)]
    pub classroom_id: Option<String>,
    #[serde(default)]
    pub student_ids: Vec<String>,
    pub schedule: Vec<ScheduleSlot>,
}

impl ScheduleCandidate {
    pub fn from_class(class: &SchoolClass) -> Self {
        Self {
            class_id: Some(class.id.clone()),
            teacher_id: class.teacher_id.clone(),
            classroom_id: class.classroom_id.clone(),
            student_ids: class.student_ids.clone(),
            schedule: class.schedule.clone(),
        }
    }

    fn slot_classroom<'a>(&'a self, slot: &'a ScheduleSlot) -> Option<&'a str> {
        slot.classroom_id
            .as_deref()
            .or(self.classroom_id.as_deref())
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    Teacher,
    Classroom,
    Student,
    /// Two slots of the same class overlap.
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotConflict {
    pub kind: ConflictKind,
    pub slot_index: usize,
    pub day: Weekday,
    pub start_time: String,
    pub end_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other_class_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other_class_name: Option<String>,
    pub other_slot_index: usize,
    pub other_start_time: String,
    pub other_end_time: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub student_ids: Vec<String>,
}

pub fn overlaps(a: (u32, u32), b: (u32, u32)) -> bool {
    a.0 < b.1 && b.0 < a.1
}

/// Conflicts between a proposed weekly schedule and the active classes.
pub fn find_slot_conflicts(candidate: &ScheduleCandidate, classes: &[SchoolClass]) -> Vec<SlotConflict> {
    let mut out = Vec::new();
    let own_students: HashSet<&str> = candidate.student_ids.iter().map(String::as_str).collect();

    for (i, slot) in candidate.schedule.iter().enumerate() {
        let Some(range) = slot.minutes() else { continue };

        for (j, other) in candidate.schedule.iter().enumerate().skip(i + 1) {
            let Some(other_range) = other.minutes() else { continue };
            if other.day == slot.day && overlaps(range, other_range) {
                out.push(SlotConflict {
                    kind: ConflictKind::Internal,
                    slot_index: i,
                    day: slot.day,
                    start_time: slot.start_time.clone(),
                    end_time: slot.end_time.clone(),
                    other_class_id: candidate.class_id.clone(),
                    other_class_name: None,
                    other_slot_index: j,
                    other_start_time: other.start_time.clone(),
                    other_end_time: other.end_time.clone(),
                    student_ids: Vec::new(),
                });
            }
        }

        for class in classes {
            if !class.is_active() || candidate.class_id.as_deref() == Some(class.id.as_str()) {
                continue;
            }
            for (j, other) in class.schedule.iter().enumerate() {
                if other.day != slot.day {
                    continue;
                }
                let Some(other_range) = other.minutes() else { continue };
                if !overlaps(range, other_range) {
                    continue;
                }
                let conflict = |kind: ConflictKind, student_ids: Vec<String>| SlotConflict {
                    kind,
                    slot_index: i,
                    day: slot.day,
                    start_time: slot.start_time.clone(),
                    end_time: slot.end_time.clone(),
                    other_class_id: Some(class.id.clone()),
                    other_class_name: Some(class.name.clone()),
                    other_slot_index: j,
                    other_start_time: other.start_time.clone(),
                    other_end_time: other.end_time.clone(),
                    student_ids,
                };
                if !candidate.teacher_id.is_empty() && class.teacher_id == candidate.teacher_id {
                    out.push(conflict(ConflictKind::Teacher, Vec::new()));
                }
                if let (Some(a), Some(b)) = (candidate.slot_classroom(slot), class.slot_classroom(other)) {
                    if a == b {
                        out.push(conflict(ConflictKind::Classroom, Vec::new()));
                    }
                }
                let shared: Vec<String> = class
                    .student_ids
                    .iter()
                    .filter(|s| own_students.contains(s.as_str()))
                    .cloned()
                    .collect();
                if !shared.is_empty() {
                    out.push(conflict(ConflictKind::Student, shared));
                }
            }
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonConflict {
    pub kind: ConflictKind,
    pub lesson_id: String,
    pub class_id: String,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
}

/// Same-date overlaps with other non-cancelled lessons sharing a teacher or room.
pub fn find_lesson_conflicts(lesson: &Lesson, others: &[Lesson]) -> Vec<LessonConflict> {
    let mut out = Vec::new();
    if lesson.status == LessonStatus::Cancelled {
        return out;
    }
    let Some(range) = lesson.minutes() else { return out };
    for other in others {
        if other.id == lesson.id
            || other.status == LessonStatus::Cancelled
            || other.date.trim() != lesson.date.trim()
        {
            continue;
        }
        let Some(other_range) = other.minutes() else { continue };
        if !overlaps(range, other_range) {
            continue;
        }
        let conflict = |kind| LessonConflict {
            kind,
            lesson_id: other.id.clone(),
            class_id: other.class_id.clone(),
            date: other.date.clone(),
            start_time: other.start_time.clone(),
            end_time: other.end_time.clone(),
        };
        if other.teacher_id == lesson.teacher_id {
            out.push(conflict(ConflictKind::Teacher));
        }
        if let (Some(a), Some(b)) = (lesson.classroom_id.as_deref(), other.classroom_id.as_deref()) {
            if !a.is_empty() && a == b {
                out.push(conflict(ConflictKind::Classroom));
            }
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSettings {
    pub day_start: u32,
    pub day_end: u32,
    pub pixels_per_hour: f64,
    pub min_event_height: f64,
}

impl GridSettings {
    pub fn from_config(cfg: &ScheduleConfig) -> Option<Self> {
        let day_start = parse_time(&cfg.day_start)?;
        let day_end = parse_time(&cfg.day_end)?;
        if day_end <= day_start || cfg.pixels_per_hour <= 0.0 {
            return None;
        }
        Some(Self {
            day_start,
            day_end,
            pixels_per_hour: cfg.pixels_per_hour,
            min_event_height: cfg.min_event_height.max(0.0),
        })
    }

    fn px(&self, minutes: u32) -> f64 {
        minutes as f64 * self.pixels_per_hour / 60.0
    }

    pub fn grid_height(&self) -> f64 {
        self.px(self.day_end - self.day_start)
    }
}

/// One block to place on the grid.
#[derive(Debug, Clone, PartialEq)]
pub struct GridItem {
    pub id: String,
    pub day: Weekday,
    pub start: u32,
    pub end: u32,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionedEvent {
    pub id: String,
    pub day: Weekday,
    pub start_time: String,
    pub end_time: String,
    pub top: f64,
    pub height: f64,
    pub lane: usize,
    pub lanes: usize,
    pub left_percent: f64,
    pub width_percent: f64,
    pub clipped_top: bool,
    pub clipped_bottom: bool,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayColumn {
    pub day: Weekday,
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    pub events: Vec<PositionedEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HourMark {
    pub label: String,
    pub top: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekLayout {
    pub grid_height: f64,
    pub pixels_per_hour: f64,
    pub hours: Vec<HourMark>,
    pub days: Vec<DayColumn>,
    /// Items entirely outside the visible day window.
    pub hidden: Vec<String>,
}

pub fn hour_marks(settings: &GridSettings) -> Vec<HourMark> {
    let first = settings.day_start.div_ceil(60) * 60;
    (first..=settings.day_end)
        .step_by(60)
        .map(|m| HourMark {
            label: format_time(m),
            top: settings.px(m - settings.day_start),
        })
        .collect()
}

/// Places items into seven Monday-first columns. `dates` optionally labels
/// each column with a calendar date.
pub fn layout_week(items: Vec<GridItem>, settings: &GridSettings, dates: Option<[String; 7]>) -> WeekLayout {
    let mut days: Vec<DayColumn> = Weekday::ALL
        .iter()
        .map(|d| DayColumn {
            day: *d,
            index: d.index(),
            date: dates.as_ref().map(|ds| ds[d.index()].clone()),
            events: Vec::new(),
        })
        .collect();
    let mut hidden = Vec::new();
    let mut per_day: Vec<Vec<GridItem>> = vec![Vec::new(); 7];
    for item in items {
        if item.end <= settings.day_start || item.start >= settings.day_end || item.end <= item.start {
            hidden.push(item.id);
            continue;
        }
        per_day[item.day.index()].push(item);
    }

    for (idx, mut day_items) in per_day.into_iter().enumerate() {
        day_items.sort_by(|a, b| {
            a.start
                .cmp(&b.start)
                .then(b.end.cmp(&a.end))
                .then(a.id.cmp(&b.id))
        });
        days[idx].events = layout_day(day_items, settings);
    }

    WeekLayout {
        grid_height: settings.grid_height(),
        pixels_per_hour: settings.pixels_per_hour,
        hours: hour_marks(settings),
        days,
        hidden,
    }
}

/// Expects items sorted by start time.
fn layout_day(items: Vec<GridItem>, settings: &GridSettings) -> Vec<PositionedEvent> {
    let mut out: Vec<PositionedEvent> = Vec::with_capacity(items.len());
    let mut cluster_start = 0usize;
    let mut cluster_end = 0u32;
    let mut lane_ends: Vec<u32> = Vec::new();

    for item in items {
        if !out.is_empty() && item.start >= cluster_end {
            close_cluster(&mut out[cluster_start..], lane_ends.len());
            cluster_start = out.len();
            lane_ends.clear();
        }
        let lane = match lane_ends.iter().position(|end| *end <= item.start) {
            Some(l) => {
                lane_ends[l] = item.end;
                l
            }
            None => {
                lane_ends.push(item.end);
                lane_ends.len() - 1
            }
        };
        cluster_end = if out.len() == cluster_start {
            item.end
        } else {
            cluster_end.max(item.end)
        };

        let visible_start = item.start.max(settings.day_start);
        let visible_end = item.end.min(settings.day_end);
        let top = settings.px(visible_start - settings.day_start);
        let height = settings
            .px(visible_end - visible_start)
            .max(settings.min_event_height);
        out.push(PositionedEvent {
            id: item.id,
            day: item.day,
            start_time: format_time(item.start),
            end_time: format_time(item.end),
            top,
            height,
            lane,
            lanes: 1,
            left_percent: 0.0,
            width_percent: 100.0,
            clipped_top: item.start < settings.day_start,
            clipped_bottom: item.end > settings.day_end,
            data: item.data,
        });
    }
    if cluster_start < out.len() {
        close_cluster(&mut out[cluster_start..], lane_ends.len());
    }
    out
}

fn close_cluster(events: &mut [PositionedEvent], lanes: usize) {
    let lanes = lanes.max(1);
    for e in events {
        e.lanes = lanes;
        e.width_percent = 100.0 / lanes as f64;
        e.left_percent = e.lane as f64 * 100.0 / lanes as f64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ClassStatus;
    use serde_json::json;

    fn slot(day: Weekday, start: &str, end: &str) -> ScheduleSlot {
        ScheduleSlot {
            day,
            start_time: start.into(),
            end_time: end.into(),
            classroom_id: None,
        }
    }

    fn class(id: &str, teacher: &str, room: &str, students: &[&str], schedule: Vec<ScheduleSlot>) -> SchoolClass {
        SchoolClass {
            id: id.into(),
            name: format!("Class {}", id),
            subject: "Math".into(),
            level: None,
            teacher_id: teacher.into(),
            classroom_id: Some(room.into()),
            academic_year_id: None,
            max_students: 15,
            student_ids: students.iter().map(|s| s.to_string()).collect(),
            schedule,
            lesson_price: 0.0,
            status: ClassStatus::Active,
            start_date: None,
            end_date: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn settings() -> GridSettings {
        GridSettings {
            day_start: 8 * 60,
            day_end: 20 * 60,
            pixels_per_hour: 60.0,
            min_event_height: 20.0,
        }
    }

    #[test]
    fn overlap_is_half_open() {
        assert!(overlaps((600, 660), (630, 700)));
        assert!(!overlaps((600, 660), (660, 720)));
    }

    #[test]
    fn detects_teacher_room_and_student_conflicts() {
        let existing = vec![
            class("a", "t1", "r1", &["s1", "s2"], vec![slot(Weekday::Monday, "16:00", "17:00")]),
            class("b", "t2", "r2", &["s9"], vec![slot(Weekday::Monday, "16:30", "17:30")]),
            class("c", "t1", "r1", &[], vec![slot(Weekday::Tuesday, "16:00", "17:00")]),
        ];
        let candidate = ScheduleCandidate {
            class_id: None,
            teacher_id: "t1".into(),
            classroom_id: Some("r2".into()),
            student_ids: vec!["s2".into()],
            schedule: vec![slot(Weekday::Monday, "16:45", "18:00")],
        };
        let conflicts = find_slot_conflicts(&candidate, &existing);
        let kinds: Vec<_> = conflicts
            .iter()
            .map(|c| (c.kind, c.other_class_id.clone().unwrap_or_default()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (ConflictKind::Teacher, "a".to_string()),
                (ConflictKind::Student, "a".to_string()),
                (ConflictKind::Classroom, "b".to_string()),
            ]
        );
        assert_eq!(conflicts[1].student_ids, vec!["s2".to_string()]);
    }

    #[test]
    fn editing_class_is_excluded_and_archived_ignored() {
        let mut archived = class("z", "t1", "r1", &[], vec![slot(Weekday::Friday, "10:00", "11:00")]);
        archived.status = ClassStatus::Archived;
        let me = class("me", "t1", "r1", &[], vec![slot(Weekday::Friday, "10:00", "11:00")]);
        let candidate = ScheduleCandidate::from_class(&me);
        assert!(find_slot_conflicts(&candidate, &[me.clone(), archived]).is_empty());
    }

    #[test]
    fn internal_overlap_reported() {
        let candidate = ScheduleCandidate {
            class_id: None,
            teacher_id: "t".into(),
            classroom_id: None,
            student_ids: vec![],
            schedule: vec![
                slot(Weekday::Monday, "10:00", "11:00"),
                slot(Weekday::Monday, "10:30", "11:30"),
                slot(Weekday::Tuesday, "10:30", "11:30"),
            ],
        };
        let c = find_slot_conflicts(&candidate, &[]);
        assert_eq!(c.len(), 1);
        assert_eq!((c[0].kind, c[0].slot_index, c[0].other_slot_index), (ConflictKind::Internal, 0, 1));
    }

    #[test]
    fn lays_out_overlapping_events_in_lanes() {
        let item = |id: &str, day, s: &str, e: &str| GridItem {
            id: id.into(),
            day,
            start: parse_time(s).expect("start"),
            end: parse_time(e).expect("end"),
            data: json!({}),
        };
        let layout = layout_week(
            vec![
                item("a", Weekday::Monday, "09:00", "10:30"),
                item("b", Weekday::Monday, "10:00", "11:00"),
                item("c", Weekday::Monday, "10:30", "12:00"),
                item("d", Weekday::Monday, "13:00", "13:10"),
                item("e", Weekday::Tuesday, "07:00", "07:45"),
                item("f", Weekday::Tuesday, "07:30", "09:00"),
            ],
            &settings(),
            None,
        );
        assert_eq!(layout.grid_height, 720.0);
        assert_eq!(layout.hours.len(), 13);
        assert_eq!(layout.hidden, vec!["e".to_string()]);

        let monday = &layout.days[0].events;
        let lanes: Vec<_> = monday.iter().map(|e| (e.id.as_str(), e.lane, e.lanes)).collect();
        assert_eq!(lanes, vec![("a", 0, 2), ("b", 1, 2), ("c", 0, 2), ("d", 0, 1)]);
        assert_eq!(monday[0].top, 60.0);
        assert_eq!(monday[0].height, 90.0);
        assert_eq!(monday[1].left_percent, 50.0);
        assert_eq!(monday[1].width_percent, 50.0);
        assert_eq!(monday[3].height, 20.0);

        let tuesday = &layout.days[1].events;
        assert_eq!(tuesday.len(), 1);
        assert!(tuesday[0].clipped_top);
        assert_eq!(tuesday[0].top, 0.0);
        assert_eq!(tuesday[0].height, 60.0);
    }
}
