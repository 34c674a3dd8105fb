mod test_support;

use serde_json::json;
use test_support::{
    id_of, request_err, request_ok, seed_people, select_workspace, spawn_sidecar, temp_dir,
};

fn labels(crumbs: &serde_json::Value) -> Vec<String> {
    crumbs
        .as_array()
        .expect("crumbs")
        .iter()
        .filter_map(|c| c["label"].as_str().map(str::to_string))
        .collect()
}

#[test]
fn breadcrumbs_resolve_entity_names() {
    let workspace = temp_dir("tutord-breadcrumbs");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    // No workspace: ids are shown as they are.
    let bare = request_ok(
        &mut stdin,
        &mut reader,
        "0",
        "nav.breadcrumbs",
        json!({ "path": "/students/abc/edit" }),
    );
    assert_eq!(labels(&bare["crumbs"]), vec!["Dashboard", "Students", "abc", "Edit"]);

    select_workspace(&mut stdin, &mut reader, workspace.path(), "sqlite");
    let seed = seed_people(&mut stdin, &mut reader);
    let class = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "classes.create",
        json!({ "input": { "name": "Algebra", "subject": "Math", "teacherId": seed.teacher_id } }),
    );
    let class_id = id_of(&class);

    let crumbs = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "nav.breadcrumbs",
        json!({ "path": format!("/classes/{}/schedule?week=2025-09-01", class_id) }),
    );
    assert_eq!(labels(&crumbs["crumbs"]), vec!["Dashboard", "Classes", "Algebra", "Schedule"]);
    assert_eq!(crumbs["crumbs"][2]["href"], format!("/classes/{}", class_id));

    let crumbs = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "nav.breadcrumbs",
        json!({ "path": format!("/teachers/{}", seed.teacher_id) }),
    );
    assert_eq!(labels(&crumbs["crumbs"]), vec!["Dashboard", "Teachers", "Ada Byron"]);

    let crumbs = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "nav.breadcrumbs",
        json!({ "path": "/students/new" }),
    );
    assert_eq!(labels(&crumbs["crumbs"]), vec!["Dashboard", "Students", "New"]);

    let crumbs = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "nav.breadcrumbs",
        json!({ "path": "/lessons/missing-id" }),
    );
    assert_eq!(labels(&crumbs["crumbs"]), vec!["Dashboard", "Lessons", "missing-id"]);

    let (code, _) = request_err(&mut stdin, &mut reader, "6", "nav.breadcrumbs", json!({}));
    assert_eq!(code, "bad_params");
}

#[test]
fn lookup_options_hide_inactive_unless_asked() {
    let workspace = temp_dir("tutord-lookups");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, workspace.path(), "demo");
    let seed = seed_people(&mut stdin, &mut reader);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "students.update",
        json!({ "id": seed.student_ids[0], "patch": { "status": "graduated" } }),
    );

    let active = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "lookups.options",
        json!({ "entity": "students" }),
    );
    assert_eq!(active["items"], json!([{ "value": seed.student_ids[1], "label": "Emma Jones" }]));

    let all = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "lookups.options",
        json!({ "entity": "students", "includeInactive": true }),
    );
    let names: Vec<&str> = all["items"]
        .as_array()
        .expect("items")
        .iter()
        .filter_map(|o| o["label"].as_str())
        .collect();
    assert_eq!(names, vec!["Emma Jones", "Liam Smith"]);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "classrooms.update",
        json!({ "id": seed.classroom_id, "patch": { "active": false } }),
    );
    let rooms = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "lookups.options",
        json!({ "entity": "classrooms" }),
    );
    assert_eq!(rooms["items"], json!([]));

    let teachers = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "lookups.options",
        json!({ "entity": "teachers" }),
    );
    assert_eq!(teachers["items"][0]["label"], "Ada Byron");

    let (code, _) = request_err(
        &mut stdin,
        &mut reader,
        "7",
        "lookups.options",
        json!({ "entity": "spaceships" }),
    );
    assert_eq!(code, "bad_params");
}
