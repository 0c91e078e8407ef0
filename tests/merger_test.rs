//! カテゴリ二次マージ・並べ替えの統合テスト

use food_table_ai::artifacts::{load_records, save_json, ArtifactDirs};
use food_table_ai::merger::{sort_json_files_in_directory, CategoryMerger};
use food_table_common::MergedRecord;
use tempfile::tempdir;

fn record(code: &str, name: &str) -> MergedRecord {
    let mut r = MergedRecord::new();
    r.set("foodCode", code);
    r.set("foodName", name);
    r
}

fn codes(records: &[MergedRecord]) -> Vec<&str> {
    records.iter().filter_map(|r| r.food_code()).collect()
}

/// beef1 + beef2 → beef.json、duck → duck.json
#[tokio::test]
async fn test_numbered_files_grouped_by_base_category() {
    let dir = tempdir().unwrap();
    let dirs = ArtifactDirs::new(&dir.path().join("temp"), &dir.path().join("out"));
    dirs.create_all().await.unwrap();

    save_json(
        &[record("121102", "草鱼"), record("124201x", "鲤鱼")],
        &dirs.category_artifact("beef1"),
    )
    .await
    .unwrap();
    save_json(
        &[record("124200", "鲫鱼"), record("121101", "青鱼")],
        &dirs.category_artifact("beef2"),
    )
    .await
    .unwrap();
    save_json(
        &[record("2", "鸭肝"), record("1", "鸭")],
        &dirs.category_artifact("duck"),
    )
    .await
    .unwrap();

    let summary = CategoryMerger::from_dirs(&dirs).run().await.unwrap();
    assert_eq!(summary.groups.len(), 2);
    assert!(summary.failed.is_empty());
    assert!(summary.pruned.is_empty());

    let beef = load_records(&dirs.final_artifact("beef")).await.unwrap();
    assert_eq!(codes(&beef), vec!["121101", "121102", "124200", "124201x"]);

    let duck = load_records(&dirs.final_artifact("duck")).await.unwrap();
    assert_eq!(codes(&duck), vec!["1", "2"]);

    // 番号付きファイルは最終成果物にならない
    let mut outputs: Vec<String> = std::fs::read_dir(&dirs.output)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    outputs.sort();
    assert_eq!(outputs, vec!["beef.json", "duck.json"]);

    // 既定では中間ファイルは残す
    assert!(dirs.category_artifact("beef1").exists());
}

#[tokio::test]
async fn test_prune_removes_consumed_numbered_files() {
    let dir = tempdir().unwrap();
    let dirs = ArtifactDirs::new(&dir.path().join("temp"), &dir.path().join("out"));
    dirs.create_all().await.unwrap();

    save_json(&[record("1", "a")], &dirs.category_artifact("beef1")).await.unwrap();
    save_json(&[record("2", "b")], &dirs.category_artifact("beef2")).await.unwrap();
    save_json(&[record("3", "c")], &dirs.category_artifact("duck")).await.unwrap();

    let summary = CategoryMerger::from_dirs(&dirs)
        .prune_merged(true)
        .run()
        .await
        .unwrap();

    assert_eq!(summary.pruned.len(), 2);
    assert!(!dirs.category_artifact("beef1").exists());
    assert!(!dirs.category_artifact("beef2").exists());
    assert!(dirs.category_artifact("duck").exists());
}

/// 中間ファイルのない状態でも失敗しない
#[tokio::test]
async fn test_empty_category_dir() {
    let dir = tempdir().unwrap();
    let dirs = ArtifactDirs::new(&dir.path().join("temp"), &dir.path().join("out"));
    dirs.create_all().await.unwrap();

    let summary = CategoryMerger::from_dirs(&dirs).run().await.unwrap();
    assert!(summary.groups.is_empty());
}

#[tokio::test]
async fn test_sort_in_place_keeps_unknown_keys() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fish.json");
    std::fs::write(
        &path,
        r#"[{"foodCode":"124201x","foodName":"鲤鱼","source":"p3"},{"foodCode":"121101","foodName":"青鱼"}]"#,
    )
    .unwrap();

    let sorted = sort_json_files_in_directory(dir.path()).await.unwrap();
    assert_eq!(sorted, 1);

    let records = load_records(&path).await.unwrap();
    assert_eq!(codes(&records), vec!["121101", "124201x"]);
    assert_eq!(records[1].extra().get("source"), Some(&serde_json::json!("p3")));
}

#[tokio::test]
async fn test_sort_keeps_numbers_and_nulls() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fish.json");
    std::fs::write(
        &path,
        r#"[{"foodCode":"2","foodName":"b","water":77.9,"remark":null},{"foodCode":"1","foodName":"a","water":12}]"#,
    )
    .unwrap();

    assert_eq!(sort_json_files_in_directory(dir.path()).await.unwrap(), 1);

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(
        written,
        serde_json::json!([
            {"foodCode": "1", "foodName": "a", "water": 12},
            {"foodCode": "2", "foodName": "b", "water": 77.9, "remark": null}
        ])
    );
}

/// 書き込めないファイルがあっても残りは並べ替える
#[tokio::test]
async fn test_sort_continues_after_write_failure() {
    let dir = tempdir().unwrap();
    let locked = dir.path().join("a_locked.json");
    let open = dir.path().join("b.json");
    for path in [&locked, &open] {
        std::fs::write(
            path,
            r#"[{"foodCode":"9","foodName":"x"},{"foodCode":"3","foodName":"y"}]"#,
        )
        .unwrap();
    }
    let mut perms = std::fs::metadata(&locked).unwrap().permissions();
    perms.set_readonly(true);
    std::fs::set_permissions(&locked, perms).unwrap();
    // 特権ユーザーは読み取り専用でも書き込める
    let writable = std::fs::OpenOptions::new().write(true).open(&locked).is_ok();

    let sorted = sort_json_files_in_directory(dir.path()).await.unwrap();
    assert_eq!(sorted, if writable { 2 } else { 1 });

    let records = load_records(&open).await.unwrap();
    assert_eq!(codes(&records), vec!["3", "9"]);

    let mut perms = std::fs::metadata(&locked).unwrap().permissions();
    perms.set_readonly(false);
    std::fs::set_permissions(&locked, perms).unwrap();
}
