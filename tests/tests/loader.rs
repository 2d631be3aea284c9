//! Chargement depuis le système de fichiers (`FsLoader`) puis exécution.

use std::{fs, io};

use pretty_assertions::assert_eq;
use trefle_parser::{parse_file, FileLoader, FsLoader, LoadError};

#[test]
fn fs_loader_reads_and_runs_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hello.tf");
    fs::write(&path, "std.print('hello from ', 'disk')\n40 + 2").unwrap();

    let name = path.to_string_lossy().into_owned();
    let program = parse_file(&FsLoader, &name).unwrap();
    let context = trefle_compiler::compile(&program).unwrap();
    let capture = trefle_tests::Capture::default();
    let mut vm = trefle_vm::Vm::new(context).with_stdout(capture.clone());
    trefle_stdlib::install(&mut vm);

    assert_eq!(vm.run().unwrap().to_string(), "42");
    assert_eq!(capture.text(), "hello from disk\n");
}

#[test]
fn relative_targets_resolve_against_the_base_directory() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("lib")).unwrap();
    fs::write(dir.path().join("lib").join("util.tf"), "1").unwrap();

    let base = dir.path().join("main.tf").to_string_lossy().into_owned();
    assert_eq!(FsLoader.load_file(&base, "lib/util.tf").unwrap(), "1");
}

#[test]
fn missing_files_are_io_errors() {
    let dir = tempfile::tempdir().unwrap();
    let name = dir.path().join("absent.tf").to_string_lossy().into_owned();
    match parse_file(&FsLoader, &name) {
        Err(LoadError::Io { source, .. }) => assert_eq!(source.kind(), io::ErrorKind::NotFound),
        other => panic!("expected an I/O error, got {other:?}"),
    }
}

#[test]
fn syntax_errors_carry_the_file_name() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.tf");
    fs::write(&path, "local x = \n").unwrap();
    let name = path.to_string_lossy().into_owned();
    match parse_file(&FsLoader, &name) {
        Err(LoadError::Parse(e)) => assert_eq!(&*e.position.file, name.as_str()),
        other => panic!("expected a parse error, got {other:?}"),
    }
}

#[test]
fn nested_load_is_rejected() {
    let err = trefle_parser::parse("main.tf", "load 'other.tf'").unwrap_err();
    assert!(err.to_string().contains("load"), "{err}");
}

#[test]
fn cli_runs_a_script_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cli.tf");
    fs::write(&path, "local xs = [1, 2, 3]\nxs.size()").unwrap();
    let capture = trefle_tests::Capture::default();
    let code = trefle_cli::execute(
        trefle_cli::Command::Run(trefle_cli::Input::Path(path)),
        &trefle_cli::Output::new(capture.clone()),
    )
    .unwrap();
    assert_eq!(code, 0);
    assert_eq!(capture.text(), "3\n");
}
