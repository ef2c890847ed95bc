use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn write(root: &Path, path: &str, text: &str) {
    let path = root.join(path);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, text).unwrap();
}

fn sample_app() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "libs/lib/src/lib/Util.js", "module.exports = 1;");
    write(
        root,
        "libs/lib/alias-definitions.toml",
        "[[alias]]\nname = \"service\"\nclass = \"lib/Util\"\n",
    );
    write(root, "default-aspect/index.html", "require('app/Main');");
    write(
        root,
        "default-aspect/src/app/Main.js",
        "var util = require('lib/Util');\nmodule.exports = util;",
    );
    write(root, "default-aspect/resources/style.css", "body {}\n");
    dir
}

#[allow(deprecated)]
fn bundleflow(app: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("bundleflow").unwrap();
    let _ = cmd.arg("--app-dir").arg(app.path());
    cmd
}

#[test]
fn deps_prints_the_dependency_tree() {
    let app = sample_app();
    let _ = bundleflow(&app)
        .args(["deps", "aspect", "default"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Aspect 'default' dependencies found:"))
        .stdout(predicate::str::contains("default-aspect/src/app/Main.js"))
        .stdout(predicate::str::contains("lib/src/lib/Util.js"));
}

#[test]
fn deps_reports_an_alias() {
    let app = sample_app();
    let _ = bundleflow(&app)
        .args(["deps", "aspect", "default", "--alias", "service"])
        .assert()
        .success()
        .stdout(predicate::str::contains("lib/src/lib/Util.js"));
}

#[test]
fn paths_lists_prod_bundles() {
    let app = sample_app();
    let _ = bundleflow(&app)
        .args(["paths", "aspect", "default", "--prod"])
        .assert()
        .success()
        .stdout(predicate::str::contains("common-js/bundle.js"))
        .stdout(predicate::str::contains("js/prod/combined/bundle.js"))
        .stdout(predicate::str::contains("common-js/module/").not());
}

#[test]
fn content_writes_the_stylesheet_bundle() {
    let app = sample_app();
    let _ = bundleflow(&app)
        .args(["content", "aspect", "default", "css/bundle.css"])
        .assert()
        .success()
        .stdout("body {}\n");
}

#[test]
fn content_rejects_unknown_prefixes() {
    let app = sample_app();
    let _ = bundleflow(&app)
        .args(["content", "aspect", "default", "nope/bundle.js"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn unknown_aspect_fails() {
    let app = sample_app();
    let _ = bundleflow(&app)
        .args(["deps", "aspect", "mobile"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("mobile"));
}

#[test]
#[allow(deprecated)]
fn missing_app_dir_fails() {
    let app = sample_app();
    let missing = app.path().join("missing");
    let _ = Command::cargo_bin("bundleflow")
        .unwrap()
        .arg("--app-dir")
        .arg(&missing)
        .args(["paths", "aspect", "default"])
        .assert()
        .failure();
}
