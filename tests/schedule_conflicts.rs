mod test_support;

use serde_json::json;
use std::collections::HashMap;
use test_support::{
    id_of, read_response, request_err, request_ok, seed_people, select_workspace, send,
    spawn_sidecar, temp_dir,
};

fn monday_slot(start: &str, end: &str) -> serde_json::Value {
    json!({ "day": "monday", "startTime": start, "endTime": end })
}

#[test]
fn overlapping_class_schedules_conflict_unless_forced() {
    let workspace = temp_dir("tutord-class-conflicts");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, workspace.path(), "sqlite");
    let seed = seed_people(&mut stdin, &mut reader);

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "classes.create",
        json!({ "input": {
            "name": "Algebra",
            "subject": "Math",
            "teacherId": seed.teacher_id,
            "classroomId": seed.classroom_id,
            "studentIds": [seed.student_ids[0]],
            "schedule": [monday_slot("09:00", "10:00")]
        }}),
    );
    let first_id = id_of(&first);

    let overlapping = json!({
        "name": "Geometry",
        "subject": "Math",
        "teacherId": seed.teacher_id,
        "classroomId": seed.classroom_id,
        "studentIds": [seed.student_ids[0]],
        "schedule": [monday_slot("09:30", "10:30")]
    });
    let (code, error) = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "classes.create",
        json!({ "input": overlapping }),
    );
    assert_eq!(code, "conflict");
    let kinds: Vec<&str> = error["details"]["conflicts"]
        .as_array()
        .expect("conflicts array")
        .iter()
        .filter_map(|c| c["kind"].as_str())
        .collect();
    assert_eq!(kinds, vec!["teacher", "classroom", "student"]);
    assert_eq!(error["details"]["conflicts"][0]["otherClassId"], first_id.as_str());

    // Back-to-back slots share an endpoint only.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "classes.create",
        json!({ "input": {
            "name": "Statistics",
            "subject": "Math",
            "teacherId": seed.teacher_id,
            "classroomId": seed.classroom_id,
            "schedule": [monday_slot("10:00", "11:00")]
        }}),
    );

    let forced = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "classes.create",
        json!({ "input": overlapping, "force": true }),
    );
    assert_eq!(forced["item"]["name"], "Geometry");
}

#[test]
fn check_conflicts_reports_without_writing() {
    let workspace = temp_dir("tutord-check-conflicts");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, workspace.path(), "sqlite");
    let seed = seed_people(&mut stdin, &mut reader);

    let class = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "classes.create",
        json!({ "input": {
            "name": "Algebra",
            "subject": "Math",
            "teacherId": seed.teacher_id,
            "schedule": [monday_slot("09:00", "10:00")]
        }}),
    );
    let class_id = id_of(&class);

    let report = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "schedule.checkConflicts",
        json!({ "teacherId": seed.teacher_id, "schedule": [monday_slot("09:45", "11:00")] }),
    );
    assert_eq!(report["hasConflicts"], true);
    assert_eq!(report["conflicts"][0]["kind"], "teacher");

    // Editing the class itself is not a conflict with its own slots.
    let report = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "schedule.checkConflicts",
        json!({
            "classId": class_id,
            "teacherId": seed.teacher_id,
            "schedule": [monday_slot("09:45", "11:00")]
        }),
    );
    assert_eq!(report["hasConflicts"], false);

    let report = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "schedule.checkConflicts",
        json!({
            "teacherId": seed.teacher_id,
            "schedule": [monday_slot("12:00", "13:00"), monday_slot("12:30", "13:30")]
        }),
    );
    assert_eq!(report["conflicts"][0]["kind"], "internal");

    let (code, error) = request_err(
        &mut stdin,
        &mut reader,
        "5",
        "schedule.checkConflicts",
        json!({ "teacherId": seed.teacher_id, "schedule": [monday_slot("11:00", "10:00")] }),
    );
    assert_eq!(code, "validation_failed");
    assert_eq!(error["details"]["fields"][0]["field"], "schedule[0].endTime");

    let listed = request_ok(&mut stdin, &mut reader, "6", "classes.list", json!({}));
    assert_eq!(listed["total"], 1);
}

#[test]
fn debounced_checks_answer_only_the_latest_per_channel() {
    let workspace = temp_dir("tutord-debounced-conflicts");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, workspace.path(), "sqlite");
    let seed = seed_people(&mut stdin, &mut reader);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "c",
        "classes.create",
        json!({ "input": {
            "name": "Algebra",
            "subject": "Math",
            "teacherId": seed.teacher_id,
            "schedule": [monday_slot("09:00", "10:00")]
        }}),
    );

    for (id, start, end) in [("d1", "08:00", "08:30"), ("d2", "08:30", "09:00"), ("d3", "09:30", "10:30")] {
        send(
            &mut stdin,
            id,
            "schedule.checkConflictsDebounced",
            json!({
                "channel": "class-form",
                "teacherId": seed.teacher_id,
                "schedule": [monday_slot(start, end)]
            }),
        );
    }
    send(
        &mut stdin,
        "other",
        "schedule.checkConflictsDebounced",
        json!({ "teacherId": seed.teacher_id, "schedule": [monday_slot("18:00", "19:00")] }),
    );

    let mut by_id = HashMap::new();
    for _ in 0..4 {
        let resp = read_response(&mut reader);
        assert_eq!(resp["ok"], true, "{}", resp);
        let id = resp["id"].as_str().expect("response id").to_string();
        by_id.insert(id, resp["result"].clone());
    }

    assert_eq!(by_id["d1"]["superseded"], true);
    assert_eq!(by_id["d2"]["superseded"], true);
    assert_eq!(by_id["d1"]["channel"], "class-form");
    assert_eq!(by_id["d3"]["superseded"], false);
    assert_eq!(by_id["d3"]["hasConflicts"], true);
    assert_eq!(by_id["other"]["channel"], "default");
    assert_eq!(by_id["other"]["hasConflicts"], false);

    // Invalid candidates are rejected immediately.
    send(
        &mut stdin,
        "bad",
        "schedule.checkConflictsDebounced",
        json!({ "schedule": [] }),
    );
    let resp = read_response(&mut reader);
    assert_eq!(resp["id"], "bad");
    assert_eq!(resp["error"]["code"], "validation_failed");
}

#[test]
fn lessons_conflict_on_shared_teacher_time() {
    let workspace = temp_dir("tutord-lesson-conflicts");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, workspace.path(), "sqlite");
    let seed = seed_people(&mut stdin, &mut reader);

    let class = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "classes.create",
        json!({ "input": {
            "name": "Algebra",
            "subject": "Math",
            "teacherId": seed.teacher_id,
            "classroomId": seed.classroom_id
        }}),
    );
    let class_id = id_of(&class);

    let lesson = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "lessons.create",
        json!({ "input": {
            "classId": class_id,
            "date": "2025-09-01",
            "startTime": "09:00",
            "endTime": "10:00"
        }}),
    );
    assert_eq!(lesson["item"]["teacherId"], seed.teacher_id.as_str());
    assert_eq!(lesson["item"]["classroomId"], seed.classroom_id.as_str());
    assert_eq!(lesson["item"]["status"], "scheduled");

    let clash = json!({
        "classId": class_id,
        "date": "2025-09-01",
        "startTime": "09:30",
        "endTime": "10:30"
    });
    let (code, error) = request_err(&mut stdin, &mut reader, "3", "lessons.create", json!({ "input": clash }));
    assert_eq!(code, "conflict");
    assert_eq!(error["details"]["conflicts"][0]["lessonId"], id_of(&lesson).as_str());

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "lessons.create",
        json!({ "input": clash, "force": true }),
    );
    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "lessons.list",
        json!({ "filters": { "classId": class_id } }),
    );
    assert_eq!(listed["total"], 2);
}

#[test]
fn week_layout_positions_lessons_and_template_slots() {
    let workspace = temp_dir("tutord-week-layout");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, workspace.path(), "sqlite");
    let seed = seed_people(&mut stdin, &mut reader);

    let class = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "classes.create",
        json!({ "input": {
            "name": "Algebra",
            "subject": "Math",
            "teacherId": seed.teacher_id,
            "schedule": [
                { "day": "wednesday", "startTime": "09:00", "endTime": "10:30" }
            ]
        }}),
    );
    let class_id = id_of(&class);
    for (i, (start, end)) in [("09:00", "10:00"), ("09:30", "10:30")].iter().enumerate() {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("l{}", i),
            "lessons.create",
            json!({ "input": {
                "classId": class_id,
                "date": "2025-09-03",
                "startTime": start,
                "endTime": end
            }, "force": true }),
        );
    }

    let week = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "schedule.week",
        json!({ "weekStart": "2025-09-04" }),
    );
    assert_eq!(week["weekStart"], "2025-09-01");
    assert_eq!(week["weekEnd"], "2025-09-07");
    assert_eq!(week["itemCount"], 2);
    assert_eq!(week["gridHeight"], 780.0);
    let wednesday = &week["days"][2];
    assert_eq!(wednesday["day"], "wednesday");
    assert_eq!(wednesday["date"], "2025-09-03");
    let events = wednesday["events"].as_array().expect("events");
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["top"], 60.0);
    assert_eq!(events[0]["height"], 60.0);
    assert_eq!(events[0]["lanes"], 2);
    assert_eq!(events[1]["lane"], 1);
    assert_eq!(events[0]["data"]["className"], "Algebra");

    let template = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "schedule.week",
        json!({ "template": true }),
    );
    assert_eq!(template["itemCount"], 1);
    assert!(template["weekStart"].is_null());
    let slot = &template["days"][2]["events"][0];
    assert_eq!(slot["height"], 90.0);
    assert_eq!(slot["data"]["slotIndex"], 0);

    let (code, _) = request_err(&mut stdin, &mut reader, "4", "schedule.week", json!({}));
    assert_eq!(code, "validation_failed");
}
