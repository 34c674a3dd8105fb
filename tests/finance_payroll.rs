mod test_support;

use serde_json::json;
use std::io::BufReader;
use std::process::{ChildStdin, ChildStdout};
use test_support::{
    id_of, request_err, request_ok, seed_people, select_workspace, spawn_sidecar, temp_dir, Seed,
};

/// Priced class with four lessons: two completed and one cancelled in
/// September, one scheduled in October.
fn billed_class(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, seed: &Seed) -> String {
    let class = request_ok(
        stdin,
        reader,
        "c",
        "classes.create",
        json!({ "input": {
            "name": "Algebra",
            "subject": "Math",
            "teacherId": seed.teacher_id,
            "studentIds": seed.student_ids,
            "lessonPrice": 25.0
        }}),
    );
    let class_id = id_of(&class);
    let lessons = [
        ("2025-09-01", "09:00", "10:00", "completed"),
        ("2025-09-08", "09:00", "10:30", "completed"),
        ("2025-09-15", "09:00", "10:00", "cancelled"),
        ("2025-10-06", "09:00", "10:00", "scheduled"),
    ];
    for (i, (date, start, end, status)) in lessons.into_iter().enumerate() {
        let _ = request_ok(
            stdin,
            reader,
            &format!("l{}", i),
            "lessons.create",
            json!({ "input": {
                "classId": class_id,
                "date": date,
                "startTime": start,
                "endTime": end,
                "status": status
            }}),
        );
    }
    class_id
}

#[test]
fn monthly_billing_payments_and_overdue() {
    let workspace = temp_dir("tutord-finance");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, workspace.path(), "sqlite");
    let seed = seed_people(&mut stdin, &mut reader);
    let class_id = billed_class(&mut stdin, &mut reader, &seed);
    let (liam, emma) = (&seed.student_ids[0], &seed.student_ids[1]);

    let dry = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "obligations.generateForClass",
        json!({ "classId": class_id, "month": "2025-09", "dryRun": true }),
    );
    assert_eq!(dry["lessonCount"], 2);
    assert_eq!(dry["amount"], 50.0);
    assert_eq!(dry["created"], 2);
    assert_eq!(dry["dryRun"], true);
    let listed = request_ok(&mut stdin, &mut reader, "2", "obligations.list", json!({}));
    assert_eq!(listed["total"], 0);

    let billed = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "obligations.generateForClass",
        json!({ "classId": class_id, "month": "2025-09" }),
    );
    assert_eq!(billed["created"], 2);
    assert_eq!(billed["obligations"][0]["dueOn"], "2025-10-10");
    assert_eq!(billed["obligations"][0]["currency"], "EUR");

    let again = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "obligations.generateForClass",
        json!({ "classId": class_id, "month": "2025-09" }),
    );
    assert_eq!(again["created"], 0);
    assert_eq!(again["skippedStudents"].as_array().map(|a| a.len()), Some(2));

    let (code, error) = request_err(
        &mut stdin,
        &mut reader,
        "5",
        "obligations.generateForClass",
        json!({ "classId": class_id, "month": "2025-11" }),
    );
    assert_eq!(code, "validation_failed");
    assert_eq!(error["details"]["fields"][0]["field"], "month");

    let liam_ob = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "obligations.list",
        json!({ "filters": { "studentId": liam } }),
    );
    let liam_ob_id = liam_ob["items"][0]["id"].as_str().expect("id").to_string();
    let emma_ob = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "obligations.list",
        json!({ "filters": { "studentId": emma } }),
    );
    let emma_ob_id = emma_ob["items"][0]["id"].as_str().expect("id").to_string();

    let paid = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "obligations.recordPayment",
        json!({ "id": liam_ob_id, "amount": 20.0, "paidOn": "2025-10-01", "method": "cash" }),
    );
    assert_eq!(paid["item"]["status"], "partial");
    assert_eq!(paid["item"]["paidAmount"], 20.0);
    assert_eq!(paid["remaining"], 30.0);

    let (code, error) = request_err(
        &mut stdin,
        &mut reader,
        "9",
        "obligations.recordPayment",
        json!({ "id": liam_ob_id, "amount": 40.0 }),
    );
    assert_eq!(code, "validation_failed");
    assert_eq!(error["details"]["fields"][0]["field"], "amount");

    let (code, error) = request_err(
        &mut stdin,
        &mut reader,
        "10",
        "obligations.update",
        json!({ "id": liam_ob_id, "patch": { "paidAmount": 0 } }),
    );
    assert_eq!(code, "validation_failed");
    assert_eq!(error["details"]["fields"][0]["field"], "paidAmount");

    let (code, error) = request_err(
        &mut stdin,
        &mut reader,
        "11",
        "obligations.update",
        json!({ "id": emma_ob_id, "patch": { "amount": 5.0 } }),
    );
    assert_eq!(code, "validation_failed");
    assert_eq!(error["details"]["fields"][0]["field"], "amount");
    let untouched = request_ok(
        &mut stdin,
        &mut reader,
        "11b",
        "obligations.open",
        json!({ "id": emma_ob_id }),
    );
    assert_eq!(untouched["item"]["amount"], 50.0);
    let described = request_ok(
        &mut stdin,
        &mut reader,
        "11c",
        "obligations.update",
        json!({ "id": emma_ob_id, "patch": { "description": "September lessons" } }),
    );
    assert_eq!(described["item"]["description"], "September lessons");
    assert_eq!(described["item"]["amount"], 50.0);

    let refreshed = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "obligations.refreshOverdue",
        json!({ "asOf": "2025-10-15" }),
    );
    assert_eq!(refreshed["updated"], 2);
    let refreshed = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "obligations.refreshOverdue",
        json!({ "asOf": "2025-10-15" }),
    );
    assert_eq!(refreshed["updated"], 0);

    let balance = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "finance.studentBalance",
        json!({ "studentId": liam, "asOf": "2025-10-15" }),
    );
    assert_eq!(balance["billed"], 50.0);
    assert_eq!(balance["paid"], 20.0);
    assert_eq!(balance["outstanding"], 30.0);
    assert_eq!(balance["overdue"], 30.0);
    assert_eq!(balance["currency"], "EUR");

    let cancelled = request_ok(
        &mut stdin,
        &mut reader,
        "15",
        "obligations.cancel",
        json!({ "id": emma_ob_id }),
    );
    assert_eq!(cancelled["item"]["status"], "cancelled");
    let (code, _) = request_err(
        &mut stdin,
        &mut reader,
        "16",
        "obligations.cancel",
        json!({ "id": liam_ob_id }),
    );
    assert_eq!(code, "invalid_state");
    let (code, _) = request_err(
        &mut stdin,
        &mut reader,
        "17",
        "obligations.delete",
        json!({ "id": liam_ob_id }),
    );
    assert_eq!(code, "invalid_state");

    let overdue = request_ok(
        &mut stdin,
        &mut reader,
        "18",
        "obligations.list",
        json!({ "filters": { "status": "overdue" } }),
    );
    assert_eq!(overdue["total"], 1);
    assert_eq!(overdue["outstanding"], 30.0);

    let (code, _) = request_err(
        &mut stdin,
        &mut reader,
        "19",
        "students.delete",
        json!({ "id": liam }),
    );
    assert_eq!(code, "in_use");
}

#[test]
fn manual_obligations_get_defaults_and_ignore_ledger_input() {
    let workspace = temp_dir("tutord-obligation-create");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, workspace.path(), "demo");
    let seed = seed_people(&mut stdin, &mut reader);

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "obligations.create",
        json!({ "input": {
            "studentId": seed.student_ids[0],
            "description": "Registration fee",
            "amount": 15.0,
            "issuedOn": "2025-09-01",
            "dueOn": "2025-09-30",
            "status": "paid",
            "paidAmount": 15.0
        }}),
    );
    assert_eq!(created["item"]["status"], "pending");
    assert_eq!(created["item"]["paidAmount"], 0.0);
    assert_eq!(created["item"]["currency"], "EUR");

    let (code, error) = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "obligations.create",
        json!({ "input": {
            "studentId": "ghost",
            "description": "Fee",
            "amount": 15.0,
            "dueOn": "2099-01-01"
        }}),
    );
    assert_eq!(code, "validation_failed");
    assert_eq!(error["details"]["fields"][0]["field"], "studentId");

    let deleted = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "obligations.delete",
        json!({ "id": id_of(&created) }),
    );
    assert_eq!(deleted["deleted"], id_of(&created).as_str());
}

#[test]
fn salary_lifecycle_from_completed_lessons() {
    let workspace = temp_dir("tutord-payroll");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, workspace.path(), "sqlite");
    let seed = seed_people(&mut stdin, &mut reader);
    let _ = billed_class(&mut stdin, &mut reader, &seed);

    let period = json!({
        "teacherId": seed.teacher_id,
        "periodStart": "2025-09-01",
        "periodEnd": "2025-09-30",
        "bonus": 10.0,
        "deductions": 5.0
    });
    let first = request_ok(&mut stdin, &mut reader, "1", "salaries.calculate", period.clone());
    assert_eq!(first["replaced"], false);
    assert_eq!(first["teacherName"], "Ada Byron");
    assert_eq!(first["item"]["lessonCount"], 2);
    assert_eq!(first["item"]["totalHours"], 2.5);
    assert_eq!(first["item"]["baseAmount"], 100.0);
    assert_eq!(first["item"]["total"], 105.0);
    assert_eq!(first["item"]["status"], "draft");
    let salary_id = id_of(&first);

    let second = request_ok(&mut stdin, &mut reader, "2", "salaries.calculate", period.clone());
    assert_eq!(second["replaced"], true);
    assert_eq!(id_of(&second), salary_id);
    let listed = request_ok(&mut stdin, &mut reader, "3", "salaries.list", json!({}));
    assert_eq!(listed["total"], 1);

    let opened = request_ok(&mut stdin, &mut reader, "4", "salaries.open", json!({ "id": salary_id }));
    assert_eq!(opened["lessons"].as_array().map(|a| a.len()), Some(2));
    assert_eq!(opened["lessons"][0]["date"], "2025-09-01");

    let (code, _) = request_err(&mut stdin, &mut reader, "5", "salaries.markPaid", json!({ "id": salary_id }));
    assert_eq!(code, "invalid_state");

    let approved = request_ok(&mut stdin, &mut reader, "6", "salaries.approve", json!({ "id": salary_id }));
    assert_eq!(approved["item"]["status"], "approved");

    let (code, _) = request_err(&mut stdin, &mut reader, "7", "salaries.calculate", period);
    assert_eq!(code, "invalid_state");
    let (code, _) = request_err(&mut stdin, &mut reader, "8", "salaries.delete", json!({ "id": salary_id }));
    assert_eq!(code, "invalid_state");

    let paid = request_ok(&mut stdin, &mut reader, "9", "salaries.markPaid", json!({ "id": salary_id }));
    assert_eq!(paid["item"]["status"], "paid");

    let filtered = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "salaries.list",
        json!({ "filters": { "status": "draft" } }),
    );
    assert_eq!(filtered["total"], 0);

    let (code, error) = request_err(
        &mut stdin,
        &mut reader,
        "11",
        "teachers.delete",
        json!({ "id": seed.teacher_id }),
    );
    assert_eq!(code, "in_use");
    assert_eq!(error["details"]["salaries"], 1);
}
