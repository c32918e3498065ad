use std::error::Error;
use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::tempdir;

fn cli(data_dir: &Path) -> Result<Command, Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("codepad-cli")?;
    cmd.env_remove("CODEPAD_LOG")
        .arg("--data-dir")
        .arg(data_dir);
    Ok(cmd)
}

fn stdout_of(data_dir: &Path, args: &[&str]) -> Result<String, Box<dyn Error>> {
    let output = cli(data_dir)?.args(args).assert().success().get_output().clone();
    Ok(String::from_utf8(output.stdout)?)
}

/// Pulls the id out of a `... [id]` confirmation line.
fn bracketed_id(line: &str) -> String {
    let start = line.rfind('[').map(|index| index + 1).unwrap_or(0);
    let end = line.rfind(']').unwrap_or(line.len());
    line[start..end].to_string()
}

fn id_at(data_dir: &Path, path: &str) -> Result<String, Box<dyn Error>> {
    let tree: Value = serde_json::from_str(&stdout_of(data_dir, &["tree", "--json"])?)?;
    let mut pending: Vec<&Value> = tree.as_array().map(|nodes| nodes.iter().collect()).unwrap_or_default();
    while let Some(node) = pending.pop() {
        if node["path"] == path {
            return Ok(node["id"].as_str().unwrap_or_default().to_string());
        }
        if let Some(children) = node["children"].as_array() {
            pending.extend(children.iter());
        }
    }
    Err(format!("no node at {path}").into())
}

#[test]
fn create_write_and_read_a_file() -> Result<(), Box<dyn Error>> {
    let data = tempdir()?;
    cli(data.path())?
        .args(["create", "folder", "app"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created folder 'app'"));
    cli(data.path())?
        .args(["create", "file", "index.js", "--parent", "app"])
        .assert()
        .success()
        .stdout(predicate::str::contains("'app/index.js'"));

    let id = id_at(data.path(), "app/index.js")?;
    cli(data.path())?
        .args(["write", &id, "--content", "console.log(1);"])
        .assert()
        .success();
    cli(data.path())?
        .args(["read", &id])
        .assert()
        .success()
        .stdout("console.log(1);");

    cli(data.path())?
        .args(["find", "app/index.js"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with(id.as_str()));
    assert!(data.path().join("store").join("files_structure.json").exists());
    Ok(())
}

#[test]
fn duplicate_survives_deleting_the_source_folder() -> Result<(), Box<dyn Error>> {
    let data = tempdir()?;
    cli(data.path())?.args(["create", "folder", "app"]).assert().success();
    cli(data.path())?
        .args(["create", "file", "index.js", "--parent", "app"])
        .assert()
        .success();
    let index = id_at(data.path(), "app/index.js")?;
    cli(data.path())?
        .args(["write", &index, "--content", "a"])
        .assert()
        .success();

    cli(data.path())?
        .args(["duplicate", &index])
        .assert()
        .success()
        .stdout(predicate::str::contains("Copied to 'index.js - copy'"));
    let app = id_at(data.path(), "app")?;
    cli(data.path())?.args(["delete", &app]).assert().success();
    cli(data.path())?
        .arg("purge")
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 1 orphaned"));

    let copy = id_at(data.path(), "index.js - copy")?;
    cli(data.path())?.args(["read", &copy]).assert().success().stdout("a");
    Ok(())
}

#[test]
fn moving_a_folder_into_itself_is_refused() -> Result<(), Box<dyn Error>> {
    let data = tempdir()?;
    cli(data.path())?.args(["create", "folder", "app"]).assert().success();
    cli(data.path())?
        .args(["create", "folder", "src", "--parent", "app"])
        .assert()
        .success();
    let app = id_at(data.path(), "app")?;

    cli(data.path())?
        .args(["move", &app, "--target", "app/src"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error: cannot move node"));
    assert_eq!(id_at(data.path(), "app")?, app);

    let src = id_at(data.path(), "app/src")?;
    cli(data.path())?
        .args(["move", &src, "--target", "app"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Moved to 'app/src'"));
    assert_ne!(id_at(data.path(), "app/src")?, src);
    Ok(())
}

#[test]
fn unknown_ids_and_bad_names_fail_cleanly() -> Result<(), Box<dyn Error>> {
    let data = tempdir()?;
    cli(data.path())?
        .args(["read", "missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
    cli(data.path())?
        .args(["create", "file", "a/b"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid name"));
    cli(data.path())?
        .args(["create", "file", "x.txt", "--parent", "nowhere"])
        .assert()
        .failure();
    Ok(())
}

#[test]
fn project_lifecycle() -> Result<(), Box<dyn Error>> {
    let data = tempdir()?;
    let created = stdout_of(
        data.path(),
        &["project", "create", "Demo", "--language", "python"],
    )?;
    assert!(created.contains("Created project 'Demo'"));
    let id = bracketed_id(created.trim());

    cli(data.path())?
        .args(["project", "open", &id])
        .assert()
        .success();
    cli(data.path())?
        .arg("tree")
        .assert()
        .success()
        .stdout(predicate::str::contains("Project: Demo"))
        .stdout(predicate::str::contains("  main.py"))
        .stdout(predicate::str::contains("requirements.txt"));

    let main = id_at(data.path(), "Demo/main.py")?;
    cli(data.path())?
        .args(["read", &main])
        .assert()
        .success()
        .stdout(predicate::str::contains("Hello, world!"));

    cli(data.path())?
        .args(["create", "file", "utils.py", "--parent", "Demo"])
        .assert()
        .success();
    cli(data.path())?
        .args(["project", "close"])
        .assert()
        .success()
        .stdout("Closed project\n");
    cli(data.path())?
        .args(["project", "open", &id])
        .assert()
        .success();
    assert!(!id_at(data.path(), "Demo/utils.py")?.is_empty());

    cli(data.path())?
        .args(["project", "recent"])
        .assert()
        .success()
        .stdout(predicate::str::diff(format!("1. Demo [{id}]\n")));
    cli(data.path())?
        .args(["project", "search", "PYTHON"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Demo"));
    cli(data.path())?
        .args(["project", "rename", &id, "Renamed"])
        .assert()
        .success();
    cli(data.path())?
        .args(["project", "current"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Renamed"));

    cli(data.path())?
        .args(["project", "delete", &id])
        .assert()
        .success();
    cli(data.path())?
        .args(["project", "current"])
        .assert()
        .success()
        .stdout("No project is open.\n");
    cli(data.path())?
        .args(["project", "list"])
        .assert()
        .success()
        .stdout("No projects.\n");
    Ok(())
}

#[test]
fn export_and_import_round_trip() -> Result<(), Box<dyn Error>> {
    let data = tempdir()?;
    let created = stdout_of(
        data.path(),
        &["project", "create", "Site", "--language", "html"],
    )?;
    let id = bracketed_id(created.trim());
    let bundle = data.path().join("out").join("site.json");

    cli(data.path())?
        .args(["export", &id, "--output"])
        .arg(&bundle)
        .assert()
        .success()
        .stdout(predicate::str::contains("Exported project 'Site'"));
    let payload: Value = serde_json::from_str(&fs::read_to_string(&bundle)?)?;
    assert_eq!(payload["formatVersion"], 1);
    assert_eq!(payload["contents"].as_object().map(|map| map.len()), Some(3));

    let imported = stdout_of(data.path(), &["import", bundle.to_str().unwrap()])?;
    let imported_id = bracketed_id(imported.trim());
    assert_ne!(imported_id, id);

    let listing = stdout_of(data.path(), &["project", "list"])?;
    assert_eq!(listing.matches("Site [").count(), 2);
    Ok(())
}

#[test]
fn import_rejects_malformed_bundles() -> Result<(), Box<dyn Error>> {
    let data = tempdir()?;
    let bundle = data.path().join("broken.json");
    fs::write(&bundle, r#"{ "formatVersion": 7 }"#)?;
    cli(data.path())?
        .arg("import")
        .arg(&bundle)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid project bundle"));
    Ok(())
}
