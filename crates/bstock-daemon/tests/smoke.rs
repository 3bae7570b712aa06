use bstock_daemon::{config_from, run_server};
use bstock_core::{bootstrap, ServerMode};

#[tokio::test]
async fn server_starts_headless_with_env_data_dir() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::env::set_var("BEACON_DATA_DIR", dir.path());
    std::env::set_var("BEACON_HEADLESS", "1");
    let result = run_server().await;
    assert!(
        result.is_ok(),
        "expected headless server to start: {result:?}"
    );
}

#[tokio::test]
async fn bootstrap_from_env_opens_store_in_data_dir() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().to_path_buf();
    let config = config_from(|key| match key {
        "BEACON_DATA_DIR" => Some(path.clone().into_os_string()),
        "BEACON_HEADLESS" => Some("true".into()),
        _ => None,
    });
    assert_eq!(config.mode, ServerMode::Headless);

    let runtime = bootstrap(config).await.expect("bootstrap");
    assert_eq!(
        runtime.context().store.path(),
        dir.path().join("state.json")
    );
}
