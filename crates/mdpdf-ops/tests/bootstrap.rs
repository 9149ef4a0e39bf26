use mdpdf_ops::{ElevationPolicy, ExitCode, OperationError, Operations};
use mdpdf_test_support::{test_config, FakeFetcher, RecordingRunner, StaticProbe};
use tempfile::TempDir;

fn ops(temp: &TempDir, probe: StaticProbe, runner: RecordingRunner) -> Operations {
    Operations::with_components(test_config(temp.path()), probe, runner, FakeFetcher::unreachable())
}

#[test]
fn plan_installs_package_manager_only_when_absent() {
    let temp = TempDir::new().expect("tempdir");

    let without_brew = ops(&temp, StaticProbe::new(), RecordingRunner::new()).plan_engine_install();
    let labels: Vec<&str> = without_brew
        .steps
        .iter()
        .map(|step| step.label.as_str())
        .collect();
    assert_eq!(
        labels,
        vec![
            "install package manager",
            "install TeX distribution",
            "update TeX package manager",
            "install TeX packages",
        ]
    );
    assert!(without_brew.steps.iter().all(|step| step.elevated));

    let with_brew = ops(
        &temp,
        StaticProbe::new().with("brew", "/opt/homebrew/bin/brew"),
        RecordingRunner::new(),
    )
    .plan_engine_install();
    assert_eq!(with_brew.steps.len(), 3);
    assert_eq!(
        with_brew.steps[0].argv,
        vec!["brew", "install", "--cask", "basictex"]
    );
    assert_eq!(
        with_brew.steps[1].argv,
        vec!["sudo", "tlmgr", "update", "--self"]
    );
    let install = &with_brew.steps[2].argv;
    assert_eq!(&install[..3], ["sudo", "tlmgr", "install"]);
    assert!(install.contains(&"sourcesanspro".to_string()));
    assert!(install.contains(&"zref".to_string()));
}

#[test]
fn plan_without_elevation_command_calls_tlmgr_directly() {
    let temp = TempDir::new().expect("tempdir");
    let mut config = test_config(temp.path());
    config.bootstrap.elevation_command = None;

    let plan = Operations::with_components(
        config,
        StaticProbe::new().with("brew", "/opt/homebrew/bin/brew"),
        RecordingRunner::new(),
        FakeFetcher::unreachable(),
    )
    .plan_engine_install();

    assert_eq!(plan.steps[1].argv, vec!["tlmgr", "update", "--self"]);
}

#[test]
fn plan_renders_numbered_command_lines() {
    let temp = TempDir::new().expect("tempdir");
    let plan = ops(
        &temp,
        StaticProbe::new().with("brew", "/opt/homebrew/bin/brew"),
        RecordingRunner::new(),
    )
    .plan_engine_install();

    let rendered = plan.to_string();
    assert!(rendered.starts_with("1. install TeX distribution (elevated)\n   brew install --cask basictex\n"));
    assert!(rendered.contains("2. update TeX package manager (elevated)\n   sudo tlmgr update --self\n"));
}

#[test]
fn present_engine_needs_no_installation() {
    let temp = TempDir::new().expect("tempdir");
    let runner = RecordingRunner::new();
    let outcome = ops(
        &temp,
        StaticProbe::new().with("pdflatex", "/usr/bin/pdflatex"),
        runner.clone(),
    )
    .install_engine(ElevationPolicy::Deny)
    .expect("engine present");

    assert_eq!(outcome.engine.to_str(), Some("/usr/bin/pdflatex"));
    assert!(outcome.executed.is_empty());
    assert!(runner.invocations().is_empty());
}

#[test]
fn deny_policy_runs_nothing() {
    let temp = TempDir::new().expect("tempdir");
    let runner = RecordingRunner::new();
    let err = ops(&temp, StaticProbe::new(), runner.clone())
        .install_engine(ElevationPolicy::Deny)
        .unwrap_err();

    assert_eq!(err.exit_code(), ExitCode::RequiresElevation);
    assert!(runner.invocations().is_empty());
}

#[test]
fn failing_step_stops_the_plan() {
    let temp = TempDir::new().expect("tempdir");
    let runner = RecordingRunner::new().exit_with("brew", 1);
    let err = ops(
        &temp,
        StaticProbe::new().with("brew", "/opt/homebrew/bin/brew"),
        runner.clone(),
    )
    .install_engine(ElevationPolicy::Interactive)
    .unwrap_err();

    match &err {
        OperationError::InstallFailed { step, code } => {
            assert_eq!(step, "install TeX distribution");
            assert_eq!(*code, Some(1));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.exit_code(), ExitCode::Environment);
    assert_eq!(runner.invocations().len(), 1);
}

#[test]
fn engine_still_missing_after_install_is_an_environment_error() {
    let temp = TempDir::new().expect("tempdir");
    let runner = RecordingRunner::new();
    let err = ops(
        &temp,
        StaticProbe::new().with("brew", "/opt/homebrew/bin/brew"),
        runner.clone(),
    )
    .install_engine(ElevationPolicy::Interactive)
    .unwrap_err();

    assert!(matches!(err, OperationError::EngineUnavailable { .. }));
    assert_eq!(err.exit_code(), ExitCode::Environment);
    assert_eq!(runner.invocations().len(), 3);
}

#[test]
fn successful_install_reports_executed_steps() {
    let temp = TempDir::new().expect("tempdir");
    let probe = StaticProbe::new();
    let installed = probe.clone();
    let runner = RecordingRunner::new().with_effect("basictex-installer", move || {
        installed.insert("pdflatex", "/Library/TeX/texbin/pdflatex");
    });
    let mut config = test_config(temp.path());
    config.bootstrap.tex_distribution_install = vec!["basictex-installer".to_string()];

    let outcome = Operations::with_components(config, probe, runner.clone(), FakeFetcher::unreachable())
        .install_engine(ElevationPolicy::Interactive)
        .expect("install succeeds");

    assert_eq!(outcome.executed.len(), 4);
    assert_eq!(outcome.engine.to_str(), Some("/Library/TeX/texbin/pdflatex"));
    let first = &runner.invocations()[0];
    assert_eq!(first.program_name(), "/bin/bash");
    assert!(first.interactive);
}

#[test]
fn tex_package_manager_is_located_after_the_distribution_installs_it() {
    let temp = TempDir::new().expect("tempdir");
    let probe = StaticProbe::new().with("brew", "/opt/homebrew/bin/brew");
    let installed = probe.clone();
    let runner = RecordingRunner::new().with_effect("brew", move || {
        installed.insert("tlmgr", "/Library/TeX/texbin/tlmgr");
        installed.insert("pdflatex", "/Library/TeX/texbin/pdflatex");
    });

    let ops = ops(&temp, probe, runner.clone());
    assert_eq!(ops.plan_engine_install().steps[1].argv[1], "tlmgr");
    let outcome = ops
        .install_engine(ElevationPolicy::Interactive)
        .expect("install succeeds");

    let tlmgr_calls: Vec<Vec<String>> = runner
        .invocations_of("sudo")
        .iter()
        .map(|invocation| invocation.arg_strings())
        .collect();
    assert_eq!(tlmgr_calls.len(), 2);
    assert_eq!(
        tlmgr_calls[0],
        vec!["/Library/TeX/texbin/tlmgr", "update", "--self"]
    );
    assert_eq!(&tlmgr_calls[1][..2], ["/Library/TeX/texbin/tlmgr", "install"]);
    assert_eq!(outcome.executed[2].argv[1], "/Library/TeX/texbin/tlmgr");
}

#[cfg(unix)]
#[test]
fn system_probe_finds_tex_package_manager_in_extra_search_dirs() {
    use mdpdf_ops::{InstallPlan, SystemProbe};
    use mdpdf_test_support::write_executable;

    let temp = TempDir::new().expect("tempdir");
    let bin = temp.path().join("bin");
    let texbin = temp.path().join("texbin");
    write_executable(&bin, "brew", "#!/bin/sh\nexit 0\n");
    write_executable(&texbin, "tlmgr", "#!/bin/sh\nexit 0\n");

    let mut config = test_config(temp.path());
    config.bootstrap.elevation_command = None;
    let probe = SystemProbe::with_path(Some(bin.into_os_string()), &[texbin.clone()]);
    let runner = RecordingRunner::new();

    let executed = InstallPlan::for_environment(&config.bootstrap, &probe)
        .execute(&runner, &probe)
        .expect("plan runs");

    let expected = texbin.join("tlmgr").to_string_lossy().into_owned();
    assert_eq!(executed[1].argv, vec![expected.clone(), "update".into(), "--self".into()]);
    let calls = runner.invocations_of("tlmgr");
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].program_name(), expected);
}
