use std::fs;

use allreduce::{Config, ConfigError, ReceiveOrder};

#[test]
fn load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.txt");
    fs::write(
        &path,
        "# benchmark settings\nMASTER_RANK = 1\nDATA_TAG = 9\nNAIVE_RECEIVE_ORDER = rank\n",
    )
    .unwrap();

    let (config, diagnostics) = Config::load(&path);
    assert!(diagnostics.is_empty());
    assert_eq!(
        config,
        Config::default()
            .with_master_rank(1)
            .with_data_tag(9)
            .with_receive_order(ReceiveOrder::RankOrder)
    );
}

#[test]
fn missing_file_gives_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.txt");

    let (config, diagnostics) = Config::load(&path);
    assert_eq!(config, Config::default());
    match &diagnostics[..] {
        [ConfigError::Unreadable { path: tried, .. }] => assert_eq!(tried, &path),
        other => panic!("unexpected {:?}", other),
    }
    assert!(diagnostics[0].to_string().contains("using defaults"));
}

#[test]
fn bad_values_are_reported_and_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.txt");
    fs::write(&path, "MASTER_RANK=one\nDATA_TAG=3\n").unwrap();

    let (config, diagnostics) = Config::load(&path);
    assert_eq!(config.master_rank, 0);
    assert_eq!(config.data_tag, 3);
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(
        diagnostics[0].to_string(),
        "invalid number format in config for key MASTER_RANK: `one`"
    );
}
