//! Batch behaviour through `describe_path_with`, using the scripted backend
//! and the fake rasterizer from `common`.

mod common;

use common::{files_under, init_tracing, name_of, read_json, write_fake_pdf, write_image, FakeRasterizer, ScriptedBackend};
use files2knowledge::{
    describe_path_with, plan, ArtifactKind, DescribeConfig, DescribeError, FailurePolicy,
    ProgressObserver,
};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

fn config() -> DescribeConfig {
    init_tracing();
    DescribeConfig::default()
}

fn isolating() -> DescribeConfig {
    init_tracing();
    DescribeConfig::builder()
        .failure_policy(FailurePolicy::Isolate)
        .build()
        .unwrap()
}

#[tokio::test]
async fn single_image_of_each_supported_type_yields_one_record() {
    for ext in ["jpg", "jpeg", "png", "bmp", "gif"] {
        let input = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let src = input.path().join(format!("slide.{ext}"));
        write_image(&src);

        let backend = ScriptedBackend::new();
        let output = describe_path_with(&src, out.path(), &config(), backend.clone(), FakeRasterizer::new())
            .await
            .unwrap();

        assert_eq!(output.artifacts.len(), 1, "{ext}");
        let written = files_under(out.path());
        assert_eq!(written.len(), 1, "{ext}");
        let name = name_of(&written[0]);
        assert!(name.starts_with("slide_description_") && name.ends_with(".json"), "{name}");

        let record = read_json(&written[0]);
        assert_eq!(record["filename"], format!("slide.{ext}"));
        assert_eq!(record["description"], format!("description of slide.{ext}"));
        assert_eq!(record["timestamp"].as_str().unwrap().len(), 15);
        assert_eq!(backend.calls(), 1);
    }
}

#[tokio::test]
async fn uppercase_extension_is_accepted() {
    let input = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let src = input.path().join("PHOTO.JPG");
    write_image(&input.path().join("photo.jpg"));
    std::fs::rename(input.path().join("photo.jpg"), &src).unwrap();

    let output = describe_path_with(&src, out.path(), &config(), ScriptedBackend::new(), FakeRasterizer::new())
        .await
        .unwrap();
    assert_eq!(output.stats.image_records, 1);
}

#[tokio::test]
async fn pdf_yields_page_records_and_matching_summary() {
    let input = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let pdf = input.path().join("deck.pdf");
    write_fake_pdf(&pdf, 3);

    let backend = ScriptedBackend::new();
    let rasterizer = FakeRasterizer::new();
    let output = describe_path_with(&pdf, out.path(), &config(), backend.clone(), rasterizer.clone())
        .await
        .unwrap();

    assert_eq!(output.stats.page_records, 3);
    assert_eq!(output.stats.document_summaries, 1);
    assert_eq!(backend.seen(), ["page_1.png", "page_2.png", "page_3.png"]);

    // Everything lives in one `deck_{ts}` folder.
    let dirs: Vec<_> = std::fs::read_dir(out.path()).unwrap().flatten().collect();
    assert_eq!(dirs.len(), 1);
    let doc_dir = dirs[0].path();
    assert!(name_of(&doc_dir).starts_with("deck_"));

    let names: Vec<_> = files_under(&doc_dir).iter().map(|p| name_of(p)).collect();
    assert_eq!(
        names,
        [
            "deck_all_descriptions.json",
            "page_1_description.json",
            "page_2_description.json",
            "page_3_description.json",
        ]
    );

    let summary = read_json(&doc_dir.join("deck_all_descriptions.json"));
    assert_eq!(summary["filename"], "deck.pdf");
    assert_eq!(summary["total_pages"], 3);
    let pages = summary["pages"].as_object().unwrap();
    assert_eq!(pages.keys().collect::<Vec<_>>(), ["1", "2", "3"]);

    for n in 1..=3 {
        let page = read_json(&doc_dir.join(format!("page_{n}_description.json")));
        assert_eq!(page["page"], n);
        assert_eq!(page["filename"], "deck.pdf");
        assert_eq!(page["timestamp"], summary["timestamp"]);
        assert_eq!(pages[&n.to_string()], page["description"]);
    }

    // Artifacts: pages in order, then the summary.
    let kinds: Vec<_> = output.artifacts.iter().map(|a| a.kind).collect();
    assert_eq!(
        kinds,
        [
            ArtifactKind::PageRecord,
            ArtifactKind::PageRecord,
            ArtifactKind::PageRecord,
            ArtifactKind::DocumentSummary
        ]
    );

    // Rendered pages are gone.
    for scratch in rasterizer.scratch_dirs() {
        assert!(!scratch.exists(), "scratch left behind: {}", scratch.display());
    }
}

#[tokio::test]
async fn directory_walk_covers_nested_inputs_and_skips_others() {
    let input = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    write_image(&input.path().join("a.png"));
    write_image(&input.path().join("nested/b.jpg"));
    write_image(&input.path().join("nested/deeper/c.gif"));
    write_fake_pdf(&input.path().join("one.pdf"), 2);
    write_fake_pdf(&input.path().join("nested/two.pdf"), 1);
    std::fs::write(input.path().join("notes.txt"), "not an image").unwrap();

    let backend = ScriptedBackend::new();
    let output = describe_path_with(input.path(), out.path(), &config(), backend.clone(), FakeRasterizer::new())
        .await
        .unwrap();

    assert_eq!(output.stats.images, 3);
    assert_eq!(output.stats.pdfs, 2);
    assert_eq!(output.stats.image_records, 3);
    assert_eq!(output.stats.page_records, 3);
    assert_eq!(output.stats.document_summaries, 2);
    assert_eq!(output.stats.skipped, 1);
    assert_eq!(name_of(&output.skipped[0]), "notes.txt");

    // PDFs are processed before standalone images.
    let seen = backend.seen();
    assert_eq!(seen.len(), 6);
    assert!(seen[..3].iter().all(|n| n.starts_with("page_")), "{seen:?}");
    assert!(seen[3..].iter().all(|n| !n.starts_with("page_")), "{seen:?}");

    // Records land flat in the output dir, not mirrored.
    let top: Vec<_> = std::fs::read_dir(out.path())
        .unwrap()
        .flatten()
        .map(|e| e.path())
        .collect();
    assert_eq!(top.iter().filter(|p| p.is_file()).count(), 3);
    assert_eq!(top.iter().filter(|p| p.is_dir()).count(), 2);
}

#[tokio::test]
async fn repeated_runs_never_overwrite() {
    let input = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    write_image(&input.path().join("a.png"));
    write_fake_pdf(&input.path().join("deck.pdf"), 2);

    for _ in 0..2 {
        describe_path_with(input.path(), out.path(), &config(), ScriptedBackend::new(), FakeRasterizer::new())
            .await
            .unwrap();
    }

    let top: Vec<_> = std::fs::read_dir(out.path())
        .unwrap()
        .flatten()
        .map(|e| e.path())
        .collect();
    assert_eq!(top.iter().filter(|p| p.is_file()).count(), 2);
    assert_eq!(top.iter().filter(|p| p.is_dir()).count(), 2);
    assert_eq!(files_under(out.path()).len(), 2 + 2 * 3);
}

#[tokio::test]
async fn failing_page_aborts_document_and_keeps_earlier_pages() {
    let input = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let pdf = input.path().join("deck.pdf");
    write_fake_pdf(&pdf, 3);

    let backend = ScriptedBackend::failing_on(&["page_2.png"]);
    let rasterizer = FakeRasterizer::new();
    let err = describe_path_with(&pdf, out.path(), &config(), backend.clone(), rasterizer.clone())
        .await
        .unwrap_err();

    assert!(matches!(err, DescribeError::Inference { .. }), "{err}");
    // Page 3 is never attempted.
    assert_eq!(backend.seen(), ["page_1.png", "page_2.png"]);

    let names: Vec<_> = files_under(out.path()).iter().map(|p| name_of(p)).collect();
    assert_eq!(names, ["page_1_description.json"]);

    for scratch in rasterizer.scratch_dirs() {
        assert!(!scratch.exists());
    }
}

#[tokio::test]
async fn corrupt_pdf_fails_without_document_folder() {
    let input = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let pdf = input.path().join("broken.pdf");
    std::fs::write(&pdf, "%PDF-garbage").unwrap();

    let err = describe_path_with(&pdf, out.path(), &config(), ScriptedBackend::new(), FakeRasterizer::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DescribeError::Rasterization { .. }), "{err}");
    assert!(std::fs::read_dir(out.path()).unwrap().next().is_none());
}

#[tokio::test]
async fn missing_input_is_not_found_with_no_artifacts() {
    let out = TempDir::new().unwrap();
    let missing = out.path().join("nope.png");
    let results = out.path().join("results");

    let err = describe_path_with(&missing, &results, &config(), ScriptedBackend::new(), FakeRasterizer::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DescribeError::NotFound { .. }), "{err}");
    assert!(files_under(&results).is_empty());
}

#[tokio::test]
async fn unsupported_single_file_is_skipped() {
    let input = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let txt = input.path().join("readme.txt");
    std::fs::write(&txt, "hello").unwrap();

    let backend = ScriptedBackend::new();
    let output = describe_path_with(&txt, out.path(), &config(), backend.clone(), FakeRasterizer::new())
        .await
        .unwrap();
    assert!(output.artifacts.is_empty());
    assert_eq!(output.stats.skipped, 1);
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn abort_policy_stops_at_first_failing_input() {
    let input = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    write_image(&input.path().join("a.png"));
    write_image(&input.path().join("b.png"));
    write_image(&input.path().join("c.png"));

    let backend = ScriptedBackend::failing_on(&["b.png"]);
    let err = describe_path_with(input.path(), out.path(), &config(), backend.clone(), FakeRasterizer::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DescribeError::Inference { .. }));
    assert_eq!(backend.seen(), ["a.png", "b.png"]);
    assert_eq!(files_under(out.path()).len(), 1);
}

#[tokio::test]
async fn isolate_policy_continues_and_reports_failures() {
    let input = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    write_image(&input.path().join("a.png"));
    write_image(&input.path().join("b.png"));
    write_fake_pdf(&input.path().join("deck.pdf"), 2);

    let backend = ScriptedBackend::failing_on(&["a.png", "page_2.png"]);
    let output = describe_path_with(input.path(), out.path(), &isolating(), backend, FakeRasterizer::new())
        .await
        .unwrap();

    assert_eq!(output.stats.failed, 2);
    assert_eq!(output.stats.image_records, 1);
    // The failed document's first page is on disk but not reported.
    assert_eq!(output.stats.page_records, 0);
    assert_eq!(output.stats.document_summaries, 0);
    let names: Vec<_> = files_under(out.path()).iter().map(|p| name_of(p)).collect();
    assert!(names.contains(&"page_1_description.json".to_string()), "{names:?}");
    assert_eq!(names.len(), 2);
    let failed: Vec<_> = output.failures.iter().map(|f| name_of(&f.path)).collect();
    assert_eq!(failed, ["deck.pdf", "a.png"]);
    assert!(output.failures.iter().all(|f| f.kind == "inference"));

    match output.into_result() {
        Err(DescribeError::BatchFailed { failed, total, first_error }) => {
            assert_eq!((failed, total), (2, 3));
            assert!(first_error.contains("deck.pdf"), "{first_error}");
        }
        other => panic!("expected BatchFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn concurrent_inputs_keep_plan_order() {
    let input = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    for name in ["a.png", "b.png", "c.png", "d.png", "e.png"] {
        write_image(&input.path().join(name));
    }
    write_fake_pdf(&input.path().join("deck.pdf"), 2);

    let config = DescribeConfig::builder().concurrency(4).build().unwrap();
    let output = describe_path_with(input.path(), out.path(), &config, ScriptedBackend::new(), FakeRasterizer::new())
        .await
        .unwrap();

    let sources: Vec<_> = output
        .of_kind(ArtifactKind::ImageRecord)
        .map(|a| name_of(&a.source))
        .collect();
    assert_eq!(sources, ["a.png", "b.png", "c.png", "d.png", "e.png"]);
    assert_eq!(output.artifacts[0].kind, ArtifactKind::PageRecord);
    assert_eq!(output.stats.document_summaries, 1);
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl Recorder {
    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl ProgressObserver for Recorder {
    fn on_batch_start(&self, pdfs: usize, images: usize) {
        self.push(format!("batch {pdfs}/{images}"));
    }

    fn on_document_rasterized(&self, path: &Path, pages: usize) {
        self.push(format!("rasterized {} {pages}", name_of(path)));
    }

    fn on_unit_complete(&self, label: &str, _record: &Path) {
        self.push(format!("done {label}"));
    }

    fn on_unit_error(&self, label: &str, _error: &str) {
        self.push(format!("error {label}"));
    }

    fn on_document_failed(&self, path: &Path, _error: &str) {
        self.push(format!("document failed {}", name_of(path)));
    }

    fn on_input_skipped(&self, path: &Path) {
        self.push(format!("skipped {}", name_of(path)));
    }

    fn on_batch_complete(&self, stats: &files2knowledge::BatchStats) {
        self.push(format!("complete {}", stats.failed));
    }
}

#[tokio::test]
async fn progress_observer_sees_every_unit() {
    let input = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    write_image(&input.path().join("a.png"));
    write_image(&input.path().join("b.png"));
    write_fake_pdf(&input.path().join("deck.pdf"), 2);
    std::fs::write(input.path().join("x.docx"), "").unwrap();

    let recorder = Arc::new(Recorder::default());
    let config = DescribeConfig::builder()
        .failure_policy(FailurePolicy::Isolate)
        .progress(recorder.clone())
        .build()
        .unwrap();
    let backend = ScriptedBackend::failing_on(&["b.png"]);
    describe_path_with(input.path(), out.path(), &config, backend, FakeRasterizer::new())
        .await
        .unwrap();

    let events = recorder.events.lock().unwrap().clone();
    assert_eq!(
        events,
        [
            "batch 1/2",
            "skipped x.docx",
            "rasterized deck.pdf 2",
            "done deck.pdf#1",
            "done deck.pdf#2",
            "done a.png",
            "error b.png",
            "complete 1",
        ]
    );
}

#[tokio::test]
async fn unrasterizable_pdf_is_reported_as_a_document() {
    let input = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    std::fs::write(input.path().join("broken.pdf"), "%PDF-garbage").unwrap();
    write_image(&input.path().join("a.png"));

    let recorder = Arc::new(Recorder::default());
    let config = DescribeConfig::builder()
        .failure_policy(FailurePolicy::Isolate)
        .progress(recorder.clone())
        .build()
        .unwrap();
    let output = describe_path_with(input.path(), out.path(), &config, ScriptedBackend::new(), FakeRasterizer::new())
        .await
        .unwrap();
    assert_eq!(output.failures.len(), 1);

    // No pages were ever announced for the PDF, so no unit error either.
    let events = recorder.events.lock().unwrap().clone();
    assert_eq!(
        events,
        [
            "batch 1/1",
            "document failed broken.pdf",
            "done a.png",
            "complete 1",
        ]
    );
}

#[test]
fn plan_lists_inputs_without_processing() {
    let input = TempDir::new().unwrap();
    write_image(&input.path().join("z.png"));
    write_image(&input.path().join("sub/a.bmp"));
    write_fake_pdf(&input.path().join("deck.pdf"), 4);
    std::fs::write(input.path().join("data.csv"), "a,b").unwrap();

    let plan = plan(input.path()).unwrap();
    assert_eq!(plan.len(), 3);
    assert_eq!(plan.pdfs.len(), 1);
    let images: Vec<_> = plan.images.iter().map(|p| name_of(p)).collect();
    assert_eq!(images, ["a.bmp", "z.png"]);
    assert_eq!(plan.skipped.len(), 1);
}
