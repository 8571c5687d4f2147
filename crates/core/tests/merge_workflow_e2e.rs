//! End-to-end tests for the merge workflow on real odML files.
//!
//! Every test writes its inputs into a fresh `TempDir`, drives a
//! `WorkflowController` backed by `OdmlFileModel` with scripted pickers and
//! confirmations, and inspects what ended up on disk.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use odmlmerge_core::config::AppConfig;
use odmlmerge_core::errors::ValidationError;
use odmlmerge_core::{
    Confirmation, DocumentModel, ExecuteOutcome, MergeMode, OdmlFileModel, OutputValidation,
    PathHints, PathPicker, PickPurpose, Slot, WorkflowController, WorkflowState,
};

// ===========================================================================
// Helpers
// ===========================================================================

struct ScriptedPicker {
    answers: VecDeque<Option<PathBuf>>,
}

impl ScriptedPicker {
    fn new(answers: Vec<Option<PathBuf>>) -> Self {
        Self {
            answers: answers.into(),
        }
    }
}

impl PathPicker for ScriptedPicker {
    fn pick(&mut self, _: PickPurpose, _: &str, _: Option<&Path>) -> Option<PathBuf> {
        self.answers.pop_front().flatten()
    }
}

struct Answer(bool);

impl Confirmation for Answer {
    fn confirm(&mut self, _: &str) -> bool {
        self.0
    }
}

fn odml_with_x(x: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<odML version="1.1">
  <section>
    <name>Recording</name>
    <property>
      <name>x</name>
      <value>[{}]</value>
      <type>int</type>
    </property>
  </section>
</odML>
"#,
        x
    )
}

fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

fn controller() -> WorkflowController<OdmlFileModel> {
    WorkflowController::new(OdmlFileModel, PathHints::default())
}

/// Inputs chosen through the picker, mode selected, output step pending.
fn prepared(a: &Path, b: &Path, mode: MergeMode) -> WorkflowController<OdmlFileModel> {
    let mut wf = controller();
    let mut picker = ScriptedPicker::new(vec![Some(a.to_path_buf()), Some(b.to_path_buf())]);
    assert!(wf.browse_input(Slot::First, &mut picker).unwrap());
    assert!(wf.browse_input(Slot::Second, &mut picker).unwrap());
    wf.confirm_inputs().unwrap();
    wf.select_mode(mode).unwrap();
    wf
}

fn load(path: &Path) -> odmlmerge_core::Document {
    OdmlFileModel.load(path).unwrap()
}

// ===========================================================================
// Tests
// ===========================================================================

#[test]
fn strict_conflict_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let a = write(&dir, "A.odml", &odml_with_x("1"));
    let b = write(&dir, "B.odml", &odml_with_x("2"));
    let out = dir.path().join("out.odml");

    let mut wf = prepared(&a, &b, MergeMode::Strict);
    let mut picker = ScriptedPicker::new(vec![Some(out.clone())]);
    assert_eq!(wf.choose_output(&mut picker).unwrap(), OutputValidation::Ok);

    match wf.execute().unwrap() {
        ExecuteOutcome::MergeConflict(err) => {
            assert_eq!(err.conflicts().len(), 1);
            assert_eq!(err.conflicts()[0].path, "/Recording:x");
        }
        other => panic!("expected a merge conflict, got {:?}", other),
    }
    assert_eq!(wf.state(), WorkflowState::Failed);
    assert!(!out.exists());
    assert!(!wf.session().is_complete());

    // Inputs are untouched.
    assert_eq!(std::fs::read_to_string(&a).unwrap(), odml_with_x("1"));
}

#[test]
fn overwrite_takes_values_of_second_input() {
    let dir = TempDir::new().unwrap();
    let a = write(&dir, "A.odml", &odml_with_x("1"));
    let b = write(&dir, "B.odml", &odml_with_x("2"));
    let out = dir.path().join("out.odml");

    let mut wf = prepared(&a, &b, MergeMode::Overwrite);
    wf.submit_output(out.to_string_lossy()).unwrap();
    assert!(wf.execute().unwrap().is_success());
    assert_eq!(wf.state(), WorkflowState::Completed);

    let merged = load(&out);
    assert_eq!(merged.property_at("/Recording:x").unwrap().values, vec!["2"]);
}

#[test]
fn retry_after_conflict_with_overwrite() {
    let dir = TempDir::new().unwrap();
    let a = write(&dir, "A.odml", &odml_with_x("1"));
    let b = write(&dir, "B.odml", &odml_with_x("2"));
    let out = dir.path().join("out.odml");

    let mut wf = prepared(&a, &b, MergeMode::Strict);
    wf.submit_output(out.to_string_lossy()).unwrap();
    assert!(!wf.execute().unwrap().is_success());

    wf.select_mode(MergeMode::Overwrite).unwrap();
    assert!(wf.execute().unwrap().is_success());
    assert_eq!(load(&out).property_at("/Recording:x").unwrap().values, vec!["2"]);
}

#[test]
fn wrong_extension_is_rejected_before_execution() {
    let dir = TempDir::new().unwrap();
    let a = write(&dir, "A.odml", &odml_with_x("1"));
    let b = write(&dir, "B.odml", &odml_with_x("2"));
    let csv = dir.path().join("out.csv");

    let mut wf = prepared(&a, &b, MergeMode::Overwrite);
    let mut picker = ScriptedPicker::new(vec![Some(csv.clone())]);
    let check = wf.choose_output(&mut picker).unwrap();

    assert_eq!(check, OutputValidation::WrongExtension { found: ".csv".into() });
    assert_eq!(
        check.to_error(),
        Some(ValidationError::WrongExtension {
            expected: ".odml".into(),
            found: ".csv".into()
        })
    );
    assert_eq!(wf.state(), WorkflowState::ChoosingOutput);
    assert!(wf.execute().is_err());
    assert!(!csv.exists());
}

#[test]
fn output_without_extension_is_accepted_as_given() {
    let dir = TempDir::new().unwrap();
    let a = write(&dir, "A.odml", &odml_with_x("1"));
    let b = write(&dir, "B.odml", &odml_with_x("-1"));
    let out = dir.path().join("merged");

    let mut wf = prepared(&a, &b, MergeMode::Strict);
    assert_eq!(wf.submit_output(out.to_string_lossy()).unwrap(), OutputValidation::Ok);
    assert!(wf.execute().unwrap().is_success());

    assert!(out.exists());
    assert!(!dir.path().join("merged.odml").exists());
    assert_eq!(load(&out).property_at("/Recording:x").unwrap().values, vec!["1"]);
}

#[test]
fn disjoint_documents_are_unioned() {
    let dir = TempDir::new().unwrap();
    let a = write(
        &dir,
        "subject.odml",
        r#"<odML version="1.1">
  <author>alice</author>
  <section>
    <name>Subject</name>
    <property><name>Species</name><value>[Mus musculus]</value><type>string</type></property>
  </section>
</odML>"#,
    );
    let b = write(
        &dir,
        "setup.odml",
        r#"<odML version="1.1">
  <section>
    <name>Setup</name>
    <property><name>Gain</name><value>[5]</value><type>int</type><unit>mV</unit></property>
  </section>
</odML>"#,
    );
    let out = dir.path().join("both.odml");

    let mut wf = prepared(&a, &b, MergeMode::Strict);
    wf.submit_output(out.to_string_lossy()).unwrap();
    assert!(wf.execute().unwrap().is_success());

    let merged = load(&out);
    assert_eq!(merged.author.as_deref(), Some("alice"));
    let paths: Vec<String> = merged.properties().into_iter().map(|(p, _)| p).collect();
    assert_eq!(paths, vec!["/Subject:Species", "/Setup:Gain"]);
    assert_eq!(
        merged.property_at("/Setup:Gain").unwrap().unit.as_deref(),
        Some("mV")
    );
}

#[test]
fn unreadable_input_fails_without_output() {
    let dir = TempDir::new().unwrap();
    let a = write(&dir, "A.odml", &odml_with_x("1"));
    let broken = write(&dir, "broken.odml", "<odML><section><name>S</name></odML>");
    let out = dir.path().join("out.odml");

    let mut wf = prepared(&a, &broken, MergeMode::Overwrite);
    wf.submit_output(out.to_string_lossy()).unwrap();
    match wf.execute().unwrap() {
        ExecuteOutcome::UnexpectedFailure(detail) => assert!(detail.contains("broken.odml")),
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(wf.state(), WorkflowState::Failed);
    assert!(!out.exists());
}

#[test]
fn cancel_declined_keeps_everything() {
    let dir = TempDir::new().unwrap();
    let a = write(&dir, "A.odml", &odml_with_x("1"));
    let b = write(&dir, "B.odml", &odml_with_x("2"));

    let mut wf = prepared(&a, &b, MergeMode::Overwrite);
    assert!(!wf.request_exit(&mut Answer(false)));
    assert_eq!(wf.state(), WorkflowState::ChoosingMode);
    assert_eq!(wf.session().mode(), Some(MergeMode::Overwrite));
    assert_eq!(wf.session().input(Slot::First).path(), a.to_string_lossy());

    // The workflow simply continues.
    let out = dir.path().join("out.odml");
    wf.submit_output(out.to_string_lossy()).unwrap();
    assert!(wf.execute().unwrap().is_success());
}

#[test]
fn cancel_confirmed_ends_without_output() {
    let dir = TempDir::new().unwrap();
    let a = write(&dir, "A.odml", &odml_with_x("1"));
    let b = write(&dir, "B.odml", &odml_with_x("2"));

    let mut wf = prepared(&a, &b, MergeMode::Strict);
    assert!(wf.request_exit(&mut Answer(true)));
    assert_eq!(wf.state(), WorkflowState::Cancelled);
    assert!(wf.submit_output("out.odml").is_err());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
}

#[test]
fn remembered_paths_round_trip_through_config() {
    let dir = TempDir::new().unwrap();
    let a = write(&dir, "A.odml", &odml_with_x("1"));
    let b = write(&dir, "B.odml", &odml_with_x("-1"));
    let out = dir.path().join("out.odml");
    let config_path = dir.path().join("config.toml");

    let mut wf = prepared(&a, &b, MergeMode::Strict);
    wf.submit_output(out.to_string_lossy()).unwrap();
    wf.execute().unwrap();

    let mut config = AppConfig::load_or_default(&config_path).unwrap();
    config.remember_session(wf.session());
    config.save_to_file(&config_path).unwrap();

    let hints = AppConfig::load_from_file(&config_path).unwrap().path_hints();
    assert_eq!(hints.last_input.as_deref(), Some(a.as_path()));
    assert_eq!(hints.last_output.as_deref(), Some(out.as_path()));

    // A new workflow starts its pickers from the remembered directory.
    struct Recorder(Option<PathBuf>);
    impl PathPicker for Recorder {
        fn pick(&mut self, _: PickPurpose, _: &str, dir: Option<&Path>) -> Option<PathBuf> {
            self.0 = dir.map(Path::to_path_buf);
            None
        }
    }
    let mut wf = WorkflowController::new(OdmlFileModel, hints);
    let mut recorder = Recorder(None);
    assert!(!wf.browse_input(Slot::First, &mut recorder).unwrap());
    assert_eq!(recorder.0.as_deref(), Some(dir.path()));
}
