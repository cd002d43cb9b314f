use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

fn bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_quad2spine"))
}

const DOCUMENT: &str = r##"
{
  "Keyframe": [
    {
      "name": "keyframe 0",
      "layer": [
        { "srcquad": [0, 0, 8, 0, 8, 8, 0, 8], "dstquad": [0, 0, 8, 0, 8, 8, 0, 8], "tex_id": 0 },
        { "dstquad": [0, 0, 4, 0, 4, 4, 0, 4], "fogquad": ["#ff0000", "#00ff00", "#0000ff", "#ffffff"] }
      ]
    }
  ],
  "Animation": [
    { "name": "idle 0", "timeline": [ { "time": 10, "attach": { "type": "keyframe", "id": 0 } } ] }
  ],
  "Skeleton": [
    { "name": "hero", "bone": [ { "name": "b0", "attach": { "type": "animation", "id": 0 } } ] }
  ]
}
"##;

fn write_fixture(dir: &Path, with_texture: bool) -> PathBuf {
    let doc = dir.join("hero.quad.json");
    std::fs::write(&doc, DOCUMENT).unwrap();
    if with_texture {
        image::RgbaImage::from_pixel(16, 16, image::Rgba([10, 20, 30, 255]))
            .save(dir.join("hero.quad.0.png"))
            .unwrap();
    }
    doc
}

fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn convert_status(doc: &Path, out: &Path, extra: &[&str]) -> ExitStatus {
    Command::new(bin())
        .args(["convert", "--in"])
        .arg(doc)
        .arg("--out-dir")
        .arg(out)
        .args(extra)
        .status()
        .unwrap()
}

#[test]
fn cli_convert_writes_json_and_images() {
    let dir = tempfile::tempdir().unwrap();
    let doc = write_fixture(dir.path(), true);
    let out = dir.path().join("out");

    let status = Command::new(bin())
        .args(["convert", "--in"])
        .arg(&doc)
        .arg("--out-dir")
        .arg(&out)
        .arg("--pretty")
        .status()
        .unwrap();
    assert!(status.success());

    let json = std::fs::read_to_string(out.join("hero.quad.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["skeleton"]["spine"], "3.8.99");
    assert_eq!(value["skeleton"]["images"], "./images/");
    assert_eq!(value["slots"].as_array().unwrap().len(), 2);
    assert!(value["animations"]["hero"].is_object());

    let images = entries(&out.join("images"));
    assert_eq!(images.len(), 2, "{images:?}");
    assert!(images.iter().any(|n| n.starts_with("t0_") && n.ends_with("_0_s0.png")));
    assert!(images.iter().any(|n| n.starts_with("fog_")));

    let crop_name = images.iter().find(|n| n.starts_with("t0_")).unwrap();
    let crop = image::open(out.join("images").join(crop_name))
        .unwrap()
        .to_rgba8();
    assert_eq!(crop.dimensions(), (8, 8));
    assert_eq!(crop.get_pixel(0, 0), &image::Rgba([10, 20, 30, 255]));

    assert_eq!(entries(&out), vec!["hero.quad.json", "images"]);
}

#[test]
fn cli_convert_failure_leaves_no_output() {
    let dir = tempfile::tempdir().unwrap();
    let doc = write_fixture(dir.path(), false);
    let out = dir.path().join("out");

    let output = Command::new(bin())
        .args(["convert", "--in"])
        .arg(&doc)
        .arg("--out-dir")
        .arg(&out)
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("hero.quad.0.png"), "{stderr}");

    assert!(entries(&out).is_empty());
}

#[test]
fn cli_refuses_to_overwrite_without_flag() {
    let dir = tempfile::tempdir().unwrap();
    let doc = write_fixture(dir.path(), true);
    let out = dir.path().join("out");
    assert!(convert_status(&doc, &out, &[]).success());
    assert!(!convert_status(&doc, &out, &[]).success());
    assert!(convert_status(&doc, &out, &["--overwrite", "--scale", "2"]).success());

    let images = entries(&out.join("images"));
    let crop_name = images.iter().find(|n| n.starts_with("t0_")).unwrap();
    let crop = image::open(out.join("images").join(crop_name)).unwrap();
    assert_eq!((crop.width(), crop.height()), (16, 16));
}

#[test]
fn cli_inspect_prints_summary() {
    let dir = tempfile::tempdir().unwrap();
    let doc = write_fixture(dir.path(), false);
    let output = Command::new(bin())
        .args(["inspect", "--in"])
        .arg(&doc)
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("skeletons: 1"), "{stdout}");
    assert!(stdout.contains("hero: 1 bones, 10 frames"), "{stdout}");
}
