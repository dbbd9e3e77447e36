//! Integration tests for the font pipelines.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use font_optimizer::{Optimizer, PipelineConfig, StepOutcome, Subsetter};
use font_subset::Font;
use tempfile::TempDir;
use test_casing::test_casing;

const TITLE_FIXTURE: &str = "DejaVuSans-ExtraLight.ttf";
const MUYAO_FIXTURE: &str = "DejaVuSansMono.ttf";

fn fixture_path(file_name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../font-subset/examples")
        .join(file_name)
}

/// Creates a temporary font dir with the default font file names.
fn prepare_font_dir(title: Option<&[u8]>, muyao: Option<&[u8]>) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let font_dir = dir.path().join("font");
    fs::create_dir(&font_dir).unwrap();
    if let Some(title) = title {
        fs::write(font_dir.join("title.ttf"), title).unwrap();
    }
    if let Some(muyao) = muyao {
        fs::write(font_dir.join("Muyao-Softbrush.ttf"), muyao).unwrap();
    }
    dir
}

fn fixture(file_name: &str) -> Vec<u8> {
    fs::read(fixture_path(file_name)).unwrap()
}

fn test_config(root: &Path, base: PipelineConfig) -> PipelineConfig {
    PipelineConfig {
        font_dir: root.join("font"),
        output_dir: root.join("font/optimized"),
        ..base
    }
}

fn run_optimizer(config: PipelineConfig) -> (font_optimizer::Report, String) {
    let mut console = vec![];
    let report = Optimizer::new(config).run(&mut console).unwrap();
    (report, String::from_utf8(console).unwrap())
}

#[test_log::test]
fn optimizing_two_fonts() {
    let (title, muyao) = (fixture(TITLE_FIXTURE), fixture(MUYAO_FIXTURE));
    let dir = prepare_font_dir(Some(title.as_slice()), Some(muyao.as_slice()));
    let config = test_config(dir.path(), PipelineConfig::optimizer());
    let output_dir = config.output_dir.clone();
    let corpus_chars = config.corpus.chars();
    let (report, console) = run_optimizer(config);

    let summary = report.summary();
    assert_eq!(summary.total_fonts, 2);
    assert_eq!(
        summary.total_original_size,
        (title.len() + muyao.len()) as u64
    );
    assert!(summary.subset_saving_percent.unwrap() > 0.0);
    assert!(summary.total_saving_percent.unwrap() > summary.subset_saving_percent.unwrap());

    let mut total_subset_size = 0;
    let mut total_compressed_size = 0;
    for (name, record) in report.fonts() {
        let subset = record.subset.stats().unwrap();
        assert!(subset.subset_size <= subset.original_size, "{name}");
        let expected_reduction = (subset.original_size - subset.subset_size) as f64
            / subset.original_size as f64
            * 100.0;
        assert!((subset.reduction.unwrap() - expected_reduction).abs() < 1e-9);
        assert_eq!(subset.woff2_size, None);
        total_subset_size += subset.subset_size;

        let compress = record.compress.as_ref().unwrap().stats().unwrap();
        assert_eq!(compress.original_size, subset.subset_size);
        assert!(compress.compressed_size < compress.original_size);
        total_compressed_size += compress.compressed_size;

        let subset_path = output_dir.join(format!("{name}_subset.ttf"));
        assert_eq!(
            fs::metadata(&subset_path).unwrap().len(),
            subset.subset_size
        );
        let gz_path = output_dir.join(format!("{name}_subset.gz"));
        assert_eq!(
            fs::metadata(&gz_path).unwrap().len(),
            compress.compressed_size
        );
    }
    assert_eq!(summary.total_subset_size, total_subset_size);
    assert_eq!(summary.total_compressed_size, total_compressed_size);

    // Every corpus char supported by the source font must survive subsetting.
    let source = Font::new(&title).unwrap();
    let subset_bytes = fs::read(output_dir.join("title_subset.ttf")).unwrap();
    let subset = Font::new(&subset_bytes).unwrap();
    for &ch in &corpus_chars {
        if source.map_char(ch).unwrap() != 0 {
            assert_ne!(subset.map_char(ch).unwrap(), 0, "{ch:?}");
        }
    }
    assert!(subset_bytes.len() < title.len());

    let json = fs::read_to_string(output_dir.join(PipelineConfig::REPORT_FILE_NAME)).unwrap();
    let json: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(json, serde_json::to_value(&report).unwrap());
    assert_eq!(json["summary"]["total_fonts"], 2);
    assert_eq!(json["fonts"]["title"]["subset"]["success"], true);
    assert_eq!(json["fonts"]["muyao"]["compress"]["success"], true);

    let css = fs::read_to_string(output_dir.join(PipelineConfig::CSS_FILE_NAME)).unwrap();
    assert_eq!(css.matches("@font-face").count(), 2);
    assert!(css.contains("font-family: 'TitleFont';"), "{css}");
    assert!(css.contains("url('/font/optimized/muyao_subset.ttf')"), "{css}");
    assert_eq!(css.matches("<link rel=\"preload\"").count(), 2);

    assert!(console.contains("Processing font: title"), "{console}");
    assert!(console.contains("Total fonts: 2"), "{console}");
}

#[test_log::test]
fn missing_font_is_skipped() {
    let dir = prepare_font_dir(Some(fixture(TITLE_FIXTURE).as_slice()), None);
    let config = test_config(dir.path(), PipelineConfig::optimizer());
    let output_dir = config.output_dir.clone();
    let (report, console) = run_optimizer(config);

    assert_eq!(report.summary().total_fonts, 1);
    assert!(report.font("title").is_some());
    assert!(report.font("muyao").is_none());
    assert!(console.contains("Font file not found"), "{console}");
    assert!(console.contains("Muyao-Softbrush.ttf"), "{console}");
    assert!(!output_dir.join("muyao_subset.ttf").exists());

    let json = fs::read_to_string(output_dir.join(PipelineConfig::REPORT_FILE_NAME)).unwrap();
    let json: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert!(json["fonts"].get("muyao").is_none());
    let css = fs::read_to_string(output_dir.join(PipelineConfig::CSS_FILE_NAME)).unwrap();
    assert!(!css.contains("MuyaoFont"), "{css}");
}

#[test_log::test]
fn no_fonts_present() {
    let dir = prepare_font_dir(None, None);
    let config = test_config(dir.path(), PipelineConfig::optimizer());
    let output_dir = config.output_dir.clone();
    let (report, _) = run_optimizer(config);

    let summary = report.summary();
    assert_eq!(summary.total_fonts, 0);
    assert_eq!(summary.subset_saving_percent, None);
    assert_eq!(summary.total_saving_percent, None);

    let json = fs::read_to_string(output_dir.join(PipelineConfig::REPORT_FILE_NAME)).unwrap();
    let json: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert!(json["summary"].get("subset_saving_percent").is_none());
    assert!(json["summary"].get("total_saving_percent").is_none());
}

#[test_casing(2, [&b"definitely not a font"[..], &b"\0\x01\0\0\0\x09"[..]])]
fn corrupted_font_is_recorded_as_failure(corrupted: &[u8]) {
    let dir = prepare_font_dir(Some(fixture(TITLE_FIXTURE).as_slice()), Some(corrupted));
    let config = test_config(dir.path(), PipelineConfig::optimizer());
    let output_dir = config.output_dir.clone();
    let (report, console) = run_optimizer(config);

    assert_eq!(report.summary().total_fonts, 2);
    let title = report.font("title").unwrap();
    assert!(title.subset.is_success());
    let muyao = report.font("muyao").unwrap();
    assert!(
        matches!(&muyao.subset, StepOutcome::Failed(err) if !err.is_empty()),
        "{muyao:?}"
    );
    assert!(muyao.compress.is_none());
    assert!(console.contains("Subsetting failed"), "{console}");

    let title_original = title.subset.stats().unwrap().original_size;
    assert_eq!(report.summary().total_original_size, title_original);
    assert!(!output_dir.join("muyao_subset.gz").exists());

    let json = fs::read_to_string(output_dir.join(PipelineConfig::REPORT_FILE_NAME)).unwrap();
    let json: serde_json::Value = serde_json::from_str(&json).unwrap();
    let muyao_json = &json["fonts"]["muyao"];
    assert_eq!(muyao_json["subset"]["success"], false);
    assert!(!muyao_json["subset"]["error"].as_str().unwrap().is_empty());
    assert!(muyao_json.get("compress").is_none());
}

#[test_log::test]
fn compression_failure_is_recorded() {
    let dir = prepare_font_dir(
        Some(fixture(TITLE_FIXTURE).as_slice()),
        Some(fixture(MUYAO_FIXTURE).as_slice()),
    );
    let config = test_config(dir.path(), PipelineConfig::optimizer());
    let output_dir = config.output_dir.clone();
    // A directory in place of the archive makes creating the archive file fail.
    fs::create_dir_all(output_dir.join("title_subset.gz")).unwrap();
    let (report, console) = run_optimizer(config);

    let title = report.font("title").unwrap();
    assert!(title.subset.is_success());
    let title_compress = title.compress.as_ref().unwrap();
    assert!(
        matches!(title_compress, StepOutcome::Failed(err) if !err.is_empty()),
        "{title_compress:?}"
    );
    assert!(console.contains("Compression failed"), "{console}");
    assert!(output_dir.join("title_subset.ttf").is_file());

    let muyao = report.font("muyao").unwrap();
    let muyao_compress = muyao.compress.as_ref().unwrap().stats().unwrap();
    let summary = report.summary();
    assert_eq!(summary.total_fonts, 2);
    assert_eq!(summary.total_compressed_size, muyao_compress.compressed_size);
    let title_stats = title.subset.stats().unwrap();
    let muyao_stats = muyao.subset.stats().unwrap();
    assert_eq!(
        summary.total_subset_size,
        title_stats.subset_size + muyao_stats.subset_size
    );

    let json = fs::read_to_string(output_dir.join(PipelineConfig::REPORT_FILE_NAME)).unwrap();
    let json: serde_json::Value = serde_json::from_str(&json).unwrap();
    let title_json = &json["fonts"]["title"];
    assert_eq!(title_json["subset"]["success"], true);
    assert_eq!(title_json["compress"]["success"], false);
    assert!(!title_json["compress"]["error"].as_str().unwrap().is_empty());
    assert_eq!(json["fonts"]["muyao"]["compress"]["success"], true);
    assert_eq!(
        json["summary"]["total_compressed_size"],
        muyao_compress.compressed_size
    );

    // The subset is still referenced by the generated CSS.
    let css = fs::read_to_string(output_dir.join(PipelineConfig::CSS_FILE_NAME)).unwrap();
    assert!(css.contains("title_subset.ttf"), "{css}");
}

#[test_log::test]
fn rerunning_produces_identical_outputs() {
    let dir = prepare_font_dir(
        Some(fixture(TITLE_FIXTURE).as_slice()),
        Some(fixture(MUYAO_FIXTURE).as_slice()),
    );
    let config = test_config(dir.path(), PipelineConfig::optimizer());
    let output_dir = config.output_dir.clone();

    let read_outputs = || {
        let mut outputs: Vec<_> = fs::read_dir(&output_dir)
            .unwrap()
            .map(|entry| {
                let path = entry.unwrap().path();
                let contents = fs::read(&path).unwrap();
                (path, contents)
            })
            .collect();
        outputs.sort();
        outputs
    };

    let (first_report, _) = run_optimizer(config.clone());
    let first_outputs = read_outputs();
    assert_eq!(first_outputs.len(), 6); // 2 subsets, 2 archives, report and CSS
    let (second_report, _) = run_optimizer(config);
    assert_eq!(first_report, second_report);
    assert_eq!(first_outputs, read_outputs());
}

#[test_log::test]
fn optimizing_with_woff2() {
    let dir = prepare_font_dir(Some(fixture(TITLE_FIXTURE).as_slice()), None);
    let config = PipelineConfig {
        woff2: true,
        public_url: "https://cdn.example.com/fonts".to_owned(),
        ..test_config(dir.path(), PipelineConfig::optimizer())
    };
    let output_dir = config.output_dir.clone();
    let (report, console) = run_optimizer(config);

    let stats = report.font("title").unwrap().subset.stats().unwrap();
    let woff2_size = stats.woff2_size.unwrap();
    assert!(woff2_size < stats.subset_size);
    let woff2 = fs::read(output_dir.join("title_subset.woff2")).unwrap();
    assert_eq!(woff2.len() as u64, woff2_size);
    assert_eq!(&woff2[..4], b"wOF2");
    assert!(console.contains("WOFF2 size"), "{console}");

    let css = fs::read_to_string(output_dir.join(PipelineConfig::CSS_FILE_NAME)).unwrap();
    assert!(
        css.contains("url('https://cdn.example.com/fonts/title_subset.woff2') format('woff2')"),
        "{css}"
    );
    assert!(css.contains("type=\"font/woff2\""), "{css}");
}

#[test_log::test]
fn subsetting_without_compression() {
    let title = fixture(TITLE_FIXTURE);
    let dir = prepare_font_dir(Some(title.as_slice()), Some(&b"corrupted"[..]));
    let config = PipelineConfig {
        font_dir: dir.path().join("font"),
        output_dir: dir.path().join("font/subset"),
        ..PipelineConfig::subsetter()
    };
    let output_dir = config.output_dir.clone();

    let mut console = vec![];
    let report = Subsetter::new(config).run(&mut console).unwrap();
    let console = String::from_utf8(console).unwrap();

    assert_eq!(report.summary().total_fonts, 2);
    assert_eq!(report.summary().total_compressed_size, 0);
    assert_eq!(report.summary().total_saving_percent, None);
    let title_record = report.font("title").unwrap();
    assert!(title_record.subset.is_success());
    assert!(title_record.compress.is_none());
    assert!(!report.font("muyao").unwrap().subset.is_success());
    assert!(console.contains("title subset successfully"), "{console}");
    assert!(console.contains("muyao subsetting failed"), "{console}");

    let subset_bytes = fs::read(output_dir.join("title_subset.ttf")).unwrap();
    let subset = Font::new(&subset_bytes).unwrap();
    assert_ne!(subset.map_char('A').unwrap(), 0);
    assert!(!output_dir.join("title_subset.gz").exists());
    assert!(!output_dir.join(PipelineConfig::REPORT_FILE_NAME).exists());
    assert!(!output_dir.join(PipelineConfig::CSS_FILE_NAME).exists());
}

#[test]
fn unwritable_output_dir_is_fatal() {
    let dir = prepare_font_dir(Some(fixture(TITLE_FIXTURE).as_slice()), None);
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, b"").unwrap();
    let config = PipelineConfig {
        output_dir: blocker.join("optimized"),
        ..test_config(dir.path(), PipelineConfig::optimizer())
    };

    let err = Optimizer::new(config).run(&mut io::sink()).unwrap_err();
    assert!(
        format!("{err:#}").contains("failed creating output directory"),
        "{err:#}"
    );
}
