//! Integration tests for the `example run` command.
use rec_sizing::cli::RunOpts;
use rec_sizing::cli::example::handle_example_run_command;
use rec_sizing::log::LOG_LEVEL_ENV_VAR;
use rec_sizing::settings::Settings;
use tempfile::tempdir;

/// Run every example. The logger can only be set up once per process, so this is a single test.
#[test]
fn test_handle_example_run_command() {
    unsafe { std::env::set_var(LOG_LEVEL_ENV_VAR, "off") };

    for name in ["no_install", "install"] {
        let tempdir = tempdir().unwrap();
        let opts = RunOpts {
            output_dir: Some(tempdir.path().to_path_buf()),
            overwrite: false,
            debug_model: false,
        };
        handle_example_run_command(name, opts, Some(Settings::default())).unwrap();
        assert!(tempdir.path().join("meter_costs.csv").is_file(), "{name}");
    }
}
